//! Competing writers against the in-memory repository.

use std::sync::Arc;

use mockable::DefaultClock;
use rstest::rstest;
use taskflow::task::{
    domain::{TaskStatus, UserId},
    ports::{TaskHistoryRepository, TaskRepository, TaskRepositoryError},
};

use super::helpers::{MemoryContext, context, create_task};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn only_one_stale_transition_wins(context: MemoryContext) -> eyre::Result<()> {
    let task = create_task(&context.lifecycle, "Contended", UserId::new()).await?;
    let expected = task.revision();

    let mut writers = Vec::new();
    for status in [TaskStatus::InProgress, TaskStatus::Done, TaskStatus::InProgress] {
        let repository = Arc::clone(&context.repository);
        let mut snapshot = task.clone();
        writers.push(tokio::spawn(async move {
            let record = snapshot
                .change_status(status, UserId::new(), &DefaultClock)
                .ok_or_else(|| eyre::eyre!("transition should apply"))?;
            Ok::<_, eyre::Report>(
                repository
                    .record_transition(&snapshot, expected, &record)
                    .await,
            )
        }));
    }

    let mut applied = 0_usize;
    let mut conflicts = 0_usize;
    for writer in writers {
        match writer.await?? {
            Ok(()) => applied += 1,
            Err(TaskRepositoryError::Conflict { .. }) => conflicts += 1,
            Err(other) => eyre::bail!("unexpected error: {other}"),
        }
    }

    eyre::ensure!(applied == 1 && conflicts == 2);
    let history = context.repository.history_for_task(task.id()).await?;
    eyre::ensure!(history.len() == 1);
    let stored = context
        .repository
        .find_by_id(task.id())
        .await?
        .ok_or_else(|| eyre::eyre!("task should exist"))?;
    let record = history
        .first()
        .ok_or_else(|| eyre::eyre!("one record expected"))?;
    eyre::ensure!(stored.status() == record.new_status());
    eyre::ensure!(stored.status_changes() == 1);
    Ok(())
}
