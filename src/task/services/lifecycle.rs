//! Service layer for task creation, editing, deletion and status changes.

use super::policy::{AccessDenied, AuthorOnlyPolicy, TaskAccessPolicy, TaskAction};
use crate::task::{
    domain::{
        ParseTaskStatusError, Revision, Task, TaskDomainError, TaskId, TaskStatus, TaskTitle,
        UserId,
    },
    ports::{TaskRepository, TaskRepositoryError},
};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Request payload for creating a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTaskRequest {
    title: String,
    author: UserId,
    description: Option<String>,
    assignee: Option<UserId>,
}

impl CreateTaskRequest {
    /// Creates a request with the required fields.
    #[must_use]
    pub fn new(title: impl Into<String>, author: UserId) -> Self {
        Self {
            title: title.into(),
            author,
            description: None,
            assignee: None,
        }
    }

    /// Sets the task description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the initial assignee.
    #[must_use]
    pub const fn with_assignee(mut self, assignee: UserId) -> Self {
        self.assignee = Some(assignee);
        self
    }
}

/// Request payload for editing a task's title and description.
///
/// Fields left unset keep their stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTaskDetailsRequest {
    task_id: TaskId,
    acting_user: UserId,
    title: Option<String>,
    description: Option<String>,
}

impl UpdateTaskDetailsRequest {
    /// Creates an edit request that changes nothing yet.
    #[must_use]
    pub const fn new(task_id: TaskId, acting_user: UserId) -> Self {
        Self {
            task_id,
            acting_user,
            title: None,
            description: None,
        }
    }

    /// Sets the new title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the new description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Request payload for setting or clearing a task's assignee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignTaskRequest {
    task_id: TaskId,
    acting_user: UserId,
    assignee: Option<UserId>,
}

impl AssignTaskRequest {
    /// Creates a request assigning `assignee` (or clearing it with `None`).
    #[must_use]
    pub const fn new(task_id: TaskId, acting_user: UserId, assignee: Option<UserId>) -> Self {
        Self {
            task_id,
            acting_user,
            assignee,
        }
    }
}

/// Request payload for changing a task's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeStatusRequest {
    task_id: TaskId,
    status: TaskStatus,
    acting_user: UserId,
}

impl ChangeStatusRequest {
    /// Creates a status change request.
    #[must_use]
    pub const fn new(task_id: TaskId, status: TaskStatus, acting_user: UserId) -> Self {
        Self {
            task_id,
            status,
            acting_user,
        }
    }

    /// Creates a status change request from a raw status string.
    ///
    /// # Errors
    ///
    /// Returns [`ParseTaskStatusError`] when `status` names no known status.
    pub fn parse(
        task_id: TaskId,
        status: &str,
        acting_user: UserId,
    ) -> Result<Self, ParseTaskStatusError> {
        Ok(Self::new(task_id, TaskStatus::try_from(status)?, acting_user))
    }
}

/// Transport-neutral classification of service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskErrorKind {
    /// The task or history record does not exist.
    NotFound,
    /// The task changed concurrently; the caller may retry.
    Conflict,
    /// The request carried invalid input.
    Validation,
    /// The acting user may not perform the action.
    Forbidden,
    /// The store failed or is unavailable.
    Storage,
}

/// Service-level errors for task lifecycle operations.
#[derive(Debug, Error)]
pub enum TaskLifecycleError {
    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] TaskDomainError),
    /// The requested status string is not a known status.
    #[error(transparent)]
    InvalidStatus(#[from] ParseTaskStatusError),
    /// The access policy rejected the action.
    #[error(transparent)]
    Forbidden(#[from] AccessDenied),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
}

impl TaskLifecycleError {
    /// Classifies the error for callers that map failures to their own codes.
    #[must_use]
    pub const fn kind(&self) -> TaskErrorKind {
        match self {
            Self::Domain(_)
            | Self::InvalidStatus(_)
            | Self::Repository(TaskRepositoryError::MismatchedHistory { .. }) => {
                TaskErrorKind::Validation
            }
            Self::Forbidden(_) => TaskErrorKind::Forbidden,
            Self::Repository(
                TaskRepositoryError::NotFound(_) | TaskRepositoryError::HistoryNotFound(_),
            ) => TaskErrorKind::NotFound,
            Self::Repository(
                TaskRepositoryError::Conflict { .. } | TaskRepositoryError::DuplicateTask(_),
            ) => TaskErrorKind::Conflict,
            Self::Repository(TaskRepositoryError::Persistence(_)) => TaskErrorKind::Storage,
        }
    }
}

/// Result type for task lifecycle service operations.
pub type TaskLifecycleResult<T> = Result<T, TaskLifecycleError>;

/// Task lifecycle orchestration service.
///
/// Status changes are applied without consulting the access policy; edits,
/// assignment and deletion go through it.
#[derive(Clone)]
pub struct TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
    policy: Arc<dyn TaskAccessPolicy>,
}

impl<R, C> TaskLifecycleService<R, C>
where
    R: TaskRepository,
    C: Clock + Send + Sync,
{
    /// Creates a service that lets only task authors edit or delete tasks.
    #[must_use]
    pub fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self::with_policy(repository, clock, Arc::new(AuthorOnlyPolicy))
    }

    /// Creates a service with a custom access policy.
    #[must_use]
    pub fn with_policy(
        repository: Arc<R>,
        clock: Arc<C>,
        policy: Arc<dyn TaskAccessPolicy>,
    ) -> Self {
        Self {
            repository,
            clock,
            policy,
        }
    }

    /// Creates and stores a new task in the `todo` status.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Domain`] when the title is empty, or
    /// [`TaskLifecycleError::Repository`] when persistence fails.
    pub async fn create_task(&self, request: CreateTaskRequest) -> TaskLifecycleResult<Task> {
        let title = TaskTitle::new(request.title)?;
        let task = Task::new(
            title,
            request.description,
            request.author,
            request.assignee,
            &*self.clock,
        );
        self.repository.store(&task).await?;
        info!(task_id = %task.id(), author = %task.author(), "task created");
        Ok(task)
    }

    /// Retrieves a task by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] (wrapped) when the task does
    /// not exist.
    pub async fn find_task(&self, task_id: TaskId) -> TaskLifecycleResult<Task> {
        self.load(task_id).await
    }

    /// Lists every task, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when the lookup fails.
    pub async fn list_tasks(&self) -> TaskLifecycleResult<Vec<Task>> {
        Ok(self.repository.find_all().await?)
    }

    /// Lists the tasks created by `author`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when the lookup fails.
    pub async fn tasks_by_author(&self, author: UserId) -> TaskLifecycleResult<Vec<Task>> {
        Ok(self.repository.find_by_author(author).await?)
    }

    /// Lists the tasks assigned to `assignee`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] when the lookup fails.
    pub async fn tasks_assigned_to(&self, assignee: UserId) -> TaskLifecycleResult<Vec<Task>> {
        Ok(self.repository.find_by_assignee(assignee).await?)
    }

    /// Edits a task's title and/or description.
    ///
    /// Never records status history.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Forbidden`] when the policy rejects the
    /// acting user, [`TaskLifecycleError::Domain`] for an empty title, or
    /// [`TaskLifecycleError::Repository`] for missing tasks, conflicts and
    /// persistence failures.
    pub async fn update_details(
        &self,
        request: UpdateTaskDetailsRequest,
    ) -> TaskLifecycleResult<Task> {
        let mut task = self.load(request.task_id).await?;
        self.authorize(&task, request.acting_user, TaskAction::EditDetails)?;

        let title = request.title.map(TaskTitle::new).transpose()?;
        let expected = task.revision();
        if !task.update_details(title, request.description, &*self.clock) {
            return Ok(task);
        }

        self.persist_update(&task, expected).await?;
        debug!(task_id = %task.id(), "task details updated");
        Ok(task)
    }

    /// Sets or clears a task's assignee.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Forbidden`] when the policy rejects the
    /// acting user, or [`TaskLifecycleError::Repository`] for missing tasks,
    /// conflicts and persistence failures.
    pub async fn assign_task(&self, request: AssignTaskRequest) -> TaskLifecycleResult<Task> {
        let mut task = self.load(request.task_id).await?;
        self.authorize(&task, request.acting_user, TaskAction::Assign)?;

        let expected = task.revision();
        if !task.assign(request.assignee, &*self.clock) {
            return Ok(task);
        }

        self.persist_update(&task, expected).await?;
        debug!(task_id = %task.id(), assignee = ?task.assignee(), "task assignee changed");
        Ok(task)
    }

    /// Deletes a task and, with it, its entire status history.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Forbidden`] when the policy rejects the
    /// acting user, or [`TaskLifecycleError::Repository`] when the task does
    /// not exist or persistence fails.
    pub async fn delete_task(
        &self,
        task_id: TaskId,
        acting_user: UserId,
    ) -> TaskLifecycleResult<()> {
        let task = self.load(task_id).await?;
        self.authorize(&task, acting_user, TaskAction::Delete)?;

        self.repository.delete(task_id).await?;
        info!(task_id = %task_id, deleted_by = %acting_user, "task deleted");
        Ok(())
    }

    /// Moves a task to a new status and records the transition.
    ///
    /// Requesting the current status is a no-op: nothing is written and the
    /// stored task is returned unchanged. Otherwise the status update and the
    /// new history record are persisted atomically. The acting user is
    /// recorded as given; no authorization check happens here.
    ///
    /// # Errors
    ///
    /// Returns [`TaskLifecycleError::Repository`] wrapping
    /// [`TaskRepositoryError::NotFound`] for unknown tasks,
    /// [`TaskRepositoryError::Conflict`] when another writer changed the task
    /// first, or a persistence failure. Failures are never retried here.
    pub async fn change_status(&self, request: ChangeStatusRequest) -> TaskLifecycleResult<Task> {
        let mut task = self.load(request.task_id).await?;
        let expected = task.revision();

        let Some(record) = task.change_status(request.status, request.acting_user, &*self.clock)
        else {
            debug!(
                task_id = %task.id(),
                status = %task.status(),
                "status unchanged; nothing recorded"
            );
            return Ok(task);
        };

        self.repository
            .record_transition(&task, expected, &record)
            .await
            .inspect_err(|err| log_write_failure(task.id(), err))?;

        info!(
            task_id = %task.id(),
            from = %record.old_status(),
            to = %record.new_status(),
            changed_by = %record.changed_by(),
            "task status changed"
        );
        Ok(task)
    }

    async fn load(&self, task_id: TaskId) -> TaskLifecycleResult<Task> {
        self.repository
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| TaskRepositoryError::NotFound(task_id).into())
    }

    async fn persist_update(&self, task: &Task, expected: Revision) -> TaskLifecycleResult<()> {
        self.repository
            .update(task, expected)
            .await
            .inspect_err(|err| log_write_failure(task.id(), err))?;
        Ok(())
    }

    fn authorize(
        &self,
        task: &Task,
        acting_user: UserId,
        action: TaskAction,
    ) -> TaskLifecycleResult<()> {
        self.policy
            .authorize(task, acting_user, action)
            .inspect_err(|denied| warn!(%denied, "task access denied"))?;
        Ok(())
    }
}

fn log_write_failure(task_id: TaskId, err: &TaskRepositoryError) {
    match err {
        TaskRepositoryError::Conflict { .. } => {
            warn!(task_id = %task_id, error = %err, "task write lost a concurrent update");
        }
        _ => error!(task_id = %task_id, error = %err, "task write failed"),
    }
}
