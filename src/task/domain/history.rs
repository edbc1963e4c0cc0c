//! Immutable audit records for task status transitions.

use super::{HistoryId, Task, TaskId, TaskStatus, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One recorded status transition of a task.
///
/// Records are created only by [`super::Task::change_status`] and are never
/// edited afterwards. `old_status` and `new_status` always differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatusHistory {
    id: HistoryId,
    task_id: TaskId,
    sequence: u64,
    old_status: TaskStatus,
    new_status: TaskStatus,
    changed_by: UserId,
    changed_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted history record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedHistoryData {
    /// Persisted record identifier.
    pub id: HistoryId,
    /// Owning task identifier.
    pub task_id: TaskId,
    /// 1-based position within the task's history.
    pub sequence: u64,
    /// Status before the transition.
    pub old_status: TaskStatus,
    /// Status after the transition.
    pub new_status: TaskStatus,
    /// User that caused the transition.
    pub changed_by: UserId,
    /// Transition timestamp.
    pub changed_at: DateTime<Utc>,
}

/// Values captured when a transition is applied.
#[derive(Debug, Clone, Copy)]
pub(super) struct TransitionFacts {
    pub(super) task_id: TaskId,
    pub(super) sequence: u64,
    pub(super) old_status: TaskStatus,
    pub(super) new_status: TaskStatus,
    pub(super) changed_by: UserId,
    pub(super) changed_at: DateTime<Utc>,
}

impl TaskStatusHistory {
    pub(super) fn record(facts: TransitionFacts) -> Self {
        Self {
            id: HistoryId::new(),
            task_id: facts.task_id,
            sequence: facts.sequence,
            old_status: facts.old_status,
            new_status: facts.new_status,
            changed_by: facts.changed_by,
            changed_at: facts.changed_at,
        }
    }

    /// Reconstructs a history record from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedHistoryData) -> Self {
        Self {
            id: data.id,
            task_id: data.task_id,
            sequence: data.sequence,
            old_status: data.old_status,
            new_status: data.new_status,
            changed_by: data.changed_by,
            changed_at: data.changed_at,
        }
    }

    /// Returns whether this record describes the most recent transition
    /// applied to `task`.
    #[must_use]
    pub fn is_latest_for(&self, task: &Task) -> bool {
        self.task_id == task.id()
            && self.new_status == task.status()
            && self.sequence == task.status_changes()
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> HistoryId {
        self.id
    }

    /// Returns the owning task identifier.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the 1-based position of this record in its task's history.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the status before the transition.
    #[must_use]
    pub const fn old_status(&self) -> TaskStatus {
        self.old_status
    }

    /// Returns the status after the transition.
    #[must_use]
    pub const fn new_status(&self) -> TaskStatus {
        self.new_status
    }

    /// Returns the user that caused the transition.
    #[must_use]
    pub const fn changed_by(&self) -> UserId {
        self.changed_by
    }

    /// Returns the transition timestamp.
    #[must_use]
    pub const fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }
}
