//! Domain model for task status lifecycle management.
//!
//! The task domain models task creation, status transitions and the audit
//! records they produce while keeping all infrastructure concerns outside of
//! the domain boundary.

mod error;
mod history;
mod ids;
mod task;

pub use error::{ParseTaskStatusError, TaskDomainError};
pub use history::{PersistedHistoryData, TaskStatusHistory};
pub use ids::{HistoryId, Revision, TaskId, UserId};
pub use task::{PersistedTaskData, Task, TaskStatus, TaskTitle};
