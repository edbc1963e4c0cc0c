//! Access policies for task mutations other than status changes.

use crate::task::domain::{Task, TaskId, UserId};
use std::fmt;
use thiserror::Error;

/// Mutations guarded by a [`TaskAccessPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskAction {
    /// Editing the title or description.
    EditDetails,
    /// Setting or clearing the assignee.
    Assign,
    /// Deleting the task and its history.
    Delete,
}

impl TaskAction {
    /// Returns a short lowercase label for logs and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EditDetails => "edit",
            Self::Assign => "assign",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection produced by a [`TaskAccessPolicy`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("user {user_id} may not {action} task {task_id}")]
pub struct AccessDenied {
    /// Task the action targeted.
    pub task_id: TaskId,
    /// Acting user.
    pub user_id: UserId,
    /// Rejected action.
    pub action: TaskAction,
}

/// Decides whether an acting user may perform an action on a task.
///
/// Status changes are deliberately outside this policy: the acting user of a
/// transition is recorded, not checked.
pub trait TaskAccessPolicy: Send + Sync {
    /// Authorizes `action` on `task` for `acting_user`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessDenied`] when the action is not permitted.
    fn authorize(
        &self,
        task: &Task,
        acting_user: UserId,
        action: TaskAction,
    ) -> Result<(), AccessDenied>;
}

/// Policy allowing only the task author to edit, assign or delete.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorOnlyPolicy;

impl TaskAccessPolicy for AuthorOnlyPolicy {
    fn authorize(
        &self,
        task: &Task,
        acting_user: UserId,
        action: TaskAction,
    ) -> Result<(), AccessDenied> {
        if task.author() == acting_user {
            return Ok(());
        }
        Err(AccessDenied {
            task_id: task.id(),
            user_id: acting_user,
            action,
        })
    }
}
