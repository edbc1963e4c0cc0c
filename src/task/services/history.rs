//! Read-only queries over recorded status transitions.

use super::lifecycle::TaskLifecycleResult;
use crate::task::{
    domain::{HistoryId, TaskId, TaskStatusHistory},
    ports::{TaskHistoryRepository, TaskRepositoryError},
};
use std::sync::Arc;
use tracing::debug;

/// Service exposing task status history for display and external reporting.
#[derive(Clone)]
pub struct TaskHistoryService<R>
where
    R: TaskHistoryRepository,
{
    repository: Arc<R>,
}

impl<R> TaskHistoryService<R>
where
    R: TaskHistoryRepository,
{
    /// Creates a new history query service.
    #[must_use]
    pub const fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Returns a task's transitions, most recent first.
    ///
    /// A task that never changed status yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] (wrapped) when the task does
    /// not exist, including after it has been deleted.
    pub async fn history_for_task(
        &self,
        task_id: TaskId,
    ) -> TaskLifecycleResult<Vec<TaskStatusHistory>> {
        let records = self.repository.history_for_task(task_id).await?;
        debug!(task_id = %task_id, records = records.len(), "loaded task status history");
        Ok(records)
    }

    /// Returns a single history record.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::HistoryNotFound`] (wrapped) when no
    /// record has the identifier.
    pub async fn find_record(&self, id: HistoryId) -> TaskLifecycleResult<TaskStatusHistory> {
        self.repository
            .find_history_record(id)
            .await?
            .ok_or_else(|| TaskRepositoryError::HistoryNotFound(id).into())
    }

    /// Returns every recorded transition across all tasks, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError`] (wrapped) when the lookup fails.
    pub async fn all_records(&self) -> TaskLifecycleResult<Vec<TaskStatusHistory>> {
        Ok(self.repository.all_history().await?)
    }
}
