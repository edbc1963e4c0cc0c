//! Repository port for task persistence, lookup and atomic transitions.

use crate::task::domain::{HistoryId, Revision, Task, TaskId, TaskStatusHistory, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Task persistence contract.
///
/// Every write that changes an existing task names the revision it was
/// computed from. Implementations apply the write only when the stored
/// revision still matches, so concurrent writers never overwrite each
/// other silently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the task ID already
    /// exists.
    async fn store(&self, task: &Task) -> TaskRepositoryResult<()>;

    /// Persists detail and assignment changes to an existing task.
    ///
    /// Status fields are not written here; status changes go through
    /// [`TaskRepository::record_transition`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist
    /// and [`TaskRepositoryError::Conflict`] when the stored revision differs
    /// from `expected`.
    async fn update(&self, task: &Task, expected: Revision) -> TaskRepositoryResult<()>;

    /// Persists a status transition and its history record as one unit.
    ///
    /// Either the task's status fields and the appended record are both
    /// written, or neither is. `record` must describe the latest transition
    /// of `task`: same task, same new status, and a sequence equal to the
    /// task's status change count.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::MismatchedHistory`] when `record` does
    /// not describe the latest transition of `task`,
    /// [`TaskRepositoryError::NotFound`] when the task does not exist and
    /// [`TaskRepositoryError::Conflict`] when the stored revision differs
    /// from `expected`.
    async fn record_transition(
        &self,
        task: &Task,
        expected: Revision,
        record: &TaskStatusHistory,
    ) -> TaskRepositoryResult<()>;

    /// Finds a task by identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>>;

    /// Returns every task, oldest first.
    async fn find_all(&self) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns the tasks created by `author`, oldest first.
    async fn find_by_author(&self, author: UserId) -> TaskRepositoryResult<Vec<Task>>;

    /// Returns the tasks assigned to `assignee`, oldest first.
    async fn find_by_assignee(&self, assignee: UserId) -> TaskRepositoryResult<Vec<Task>>;

    /// Deletes a task together with its status history.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn delete(&self, id: TaskId) -> TaskRepositoryResult<()>;
}

/// Read-only access to recorded status transitions.
#[async_trait]
pub trait TaskHistoryRepository: Send + Sync {
    /// Returns the history of one task, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn history_for_task(&self, task_id: TaskId)
    -> TaskRepositoryResult<Vec<TaskStatusHistory>>;

    /// Finds a single history record.
    ///
    /// Returns `None` when the record does not exist.
    async fn find_history_record(
        &self,
        id: HistoryId,
    ) -> TaskRepositoryResult<Option<TaskStatusHistory>>;

    /// Returns every history record across all tasks, most recent first.
    async fn all_history(&self) -> TaskRepositoryResult<Vec<TaskStatusHistory>>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// The history record was not found.
    #[error("task status history not found: {0}")]
    HistoryNotFound(HistoryId),

    /// The task was modified concurrently.
    #[error("task {task_id} was modified concurrently: expected revision {expected}, found {actual}")]
    Conflict {
        /// Task whose write was rejected.
        task_id: TaskId,
        /// Revision the write was computed from.
        expected: Revision,
        /// Revision currently stored.
        actual: Revision,
    },

    /// The history record does not describe the task's latest transition.
    #[error("history record {record_id} does not describe the latest transition of task {task_id}")]
    MismatchedHistory {
        /// Task being written.
        task_id: TaskId,
        /// Rejected history record.
        record_id: HistoryId,
    },

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    #[must_use]
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
