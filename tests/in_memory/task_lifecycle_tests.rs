//! In-memory integration tests for task lifecycle operations.

use rstest::rstest;
use taskflow::task::{
    domain::{TaskStatus, UserId},
    services::{
        AssignTaskRequest, ChangeStatusRequest, TaskErrorKind, UpdateTaskDetailsRequest,
    },
};

use super::helpers::{MemoryContext, context, create_task};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn full_lifecycle_round_trip(context: MemoryContext) -> eyre::Result<()> {
    let author = UserId::new();
    let worker = UserId::new();
    let task = create_task(&context.lifecycle, "Ship the release", author).await?;

    context
        .lifecycle
        .assign_task(AssignTaskRequest::new(task.id(), author, Some(worker)))
        .await?;
    context
        .lifecycle
        .change_status(ChangeStatusRequest::new(
            task.id(),
            TaskStatus::InProgress,
            worker,
        ))
        .await?;
    let done = context
        .lifecycle
        .change_status(ChangeStatusRequest::new(task.id(), TaskStatus::Done, worker))
        .await?;

    eyre::ensure!(done.status() == TaskStatus::Done);
    eyre::ensure!(done.completed_at().is_some());
    eyre::ensure!(done.assignee() == Some(worker));

    let history = context.history.history_for_task(task.id()).await?;
    eyre::ensure!(history.len() == 2, "expected two transitions");
    eyre::ensure!(history.iter().all(|record| record.changed_by() == worker));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tasks_are_listed_oldest_first(context: MemoryContext) -> eyre::Result<()> {
    let author = UserId::new();
    let first = create_task(&context.lifecycle, "First", author).await?;
    let second = create_task(&context.lifecycle, "Second", author).await?;
    create_task(&context.lifecycle, "Other author", UserId::new()).await?;

    let all = context.lifecycle.list_tasks().await?;
    let mine = context.lifecycle.tasks_by_author(author).await?;

    eyre::ensure!(all.len() == 3);
    let ids: Vec<_> = mine.iter().map(|task| task.id()).collect();
    eyre::ensure!(ids == vec![first.id(), second.id()]);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reassignment_moves_task_between_assignees(context: MemoryContext) -> eyre::Result<()> {
    let author = UserId::new();
    let alice = UserId::new();
    let bob = UserId::new();
    let task = create_task(&context.lifecycle, "Review docs", author).await?;

    context
        .lifecycle
        .assign_task(AssignTaskRequest::new(task.id(), author, Some(alice)))
        .await?;
    context
        .lifecycle
        .assign_task(AssignTaskRequest::new(task.id(), author, Some(bob)))
        .await?;

    eyre::ensure!(context.lifecycle.tasks_assigned_to(alice).await?.is_empty());
    eyre::ensure!(context.lifecycle.tasks_assigned_to(bob).await?.len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blank_title_edit_is_rejected(context: MemoryContext) -> eyre::Result<()> {
    let author = UserId::new();
    let task = create_task(&context.lifecycle, "Keep me", author).await?;

    let result = context
        .lifecycle
        .update_details(UpdateTaskDetailsRequest::new(task.id(), author).with_title("  "))
        .await;

    eyre::ensure!(result.is_err_and(|err| err.kind() == TaskErrorKind::Validation));
    let stored = context.lifecycle.find_task(task.id()).await?;
    eyre::ensure!(stored.title().as_str() == "Keep me");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deleted_task_is_gone_with_its_history(context: MemoryContext) -> eyre::Result<()> {
    let author = UserId::new();
    let task = create_task(&context.lifecycle, "Short lived", author).await?;
    let survivor = create_task(&context.lifecycle, "Survivor", author).await?;
    for id in [task.id(), survivor.id()] {
        context
            .lifecycle
            .change_status(ChangeStatusRequest::new(id, TaskStatus::Done, author))
            .await?;
    }

    context.lifecycle.delete_task(task.id(), author).await?;

    let history = context.history.history_for_task(task.id()).await;
    eyre::ensure!(history.is_err_and(|err| err.kind() == TaskErrorKind::NotFound));
    let remaining = context.history.all_records().await?;
    eyre::ensure!(remaining.len() == 1);
    eyre::ensure!(remaining.iter().all(|record| record.task_id() == survivor.id()));

    let again = context.lifecycle.delete_task(task.id(), author).await;
    eyre::ensure!(again.is_err_and(|err| err.kind() == TaskErrorKind::NotFound));
    Ok(())
}
