//! Diesel row models for task and history persistence.

use super::schema::{task_status_history, tasks};
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row for task records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Internal task identifier.
    pub id: uuid::Uuid,
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Workflow status.
    pub status: String,
    /// Creating user.
    pub author_id: uuid::Uuid,
    /// Optional assigned user.
    pub assignee_id: Option<uuid::Uuid>,
    /// Optimistic-concurrency revision.
    pub revision: i64,
    /// Number of recorded status transitions.
    pub status_changes: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// First completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Insert model for task records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTaskRow {
    /// Internal task identifier.
    pub id: uuid::Uuid,
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Workflow status.
    pub status: String,
    /// Creating user.
    pub author_id: uuid::Uuid,
    /// Optional assigned user.
    pub assignee_id: Option<uuid::Uuid>,
    /// Optimistic-concurrency revision.
    pub revision: i64,
    /// Number of recorded status transitions.
    pub status_changes: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// First completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Query result row for status history records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = task_status_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HistoryRow {
    /// History record identifier.
    pub id: uuid::Uuid,
    /// Owning task identifier.
    pub task_id: uuid::Uuid,
    /// 1-based position within the task's history.
    pub sequence: i64,
    /// Status before the transition.
    pub old_status: String,
    /// Status after the transition.
    pub new_status: String,
    /// User that caused the transition.
    pub changed_by: uuid::Uuid,
    /// Transition timestamp.
    pub changed_at: DateTime<Utc>,
}

/// Insert model for status history records.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = task_status_history)]
pub struct NewHistoryRow {
    /// History record identifier.
    pub id: uuid::Uuid,
    /// Owning task identifier.
    pub task_id: uuid::Uuid,
    /// 1-based position within the task's history.
    pub sequence: i64,
    /// Status before the transition.
    pub old_status: String,
    /// Status after the transition.
    pub new_status: String,
    /// User that caused the transition.
    pub changed_by: uuid::Uuid,
    /// Transition timestamp.
    pub changed_at: DateTime<Utc>,
}
