//! Task aggregate root and related task lifecycle types.

use super::{
    ParseTaskStatusError, Revision, TaskDomainError, TaskId, TaskStatusHistory, UserId,
    history::TransitionFacts,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Task workflow status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has been created but work has not started.
    #[default]
    Todo,
    /// Task is being worked on.
    InProgress,
    /// Task has been completed.
    Done,
}

impl TaskStatus {
    /// Every status, in workflow order.
    pub const ALL: [Self; 3] = [Self::Todo, Self::InProgress, Self::Done];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Returns whether reaching this status stamps the completion time.
    ///
    /// Terminal statuses are not locked: a done task may still move back to
    /// any other status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, trimmed task title of at most [`TaskTitle::MAX_CHARS`]
/// characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskTitle(String);

impl TaskTitle {
    /// Longest accepted title, counted in characters.
    pub const MAX_CHARS: usize = 255;

    /// Creates a validated title.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTitle`] when the value is empty after
    /// trimming, or [`TaskDomainError::TitleTooLong`] when it exceeds
    /// [`Self::MAX_CHARS`] characters.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TaskDomainError::EmptyTitle);
        }
        let length = trimmed.chars().count();
        if length > Self::MAX_CHARS {
            return Err(TaskDomainError::TitleTooLong {
                length,
                max: Self::MAX_CHARS,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the title as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskTitle {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskTitle> for String {
    fn from(title: TaskTitle) -> Self {
        title.0
    }
}

impl AsRef<str> for TaskTitle {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TaskTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task aggregate root.
///
/// The task holds no history collection. Each applied transition yields a
/// [`TaskStatusHistory`] record that the caller persists alongside the task.
/// Stored tasks are rebuilt through [`Task::from_persisted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    id: TaskId,
    title: TaskTitle,
    description: Option<String>,
    status: TaskStatus,
    author: UserId,
    assignee: Option<UserId>,
    revision: Revision,
    status_changes: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Persisted title.
    pub title: TaskTitle,
    /// Persisted description, if any.
    pub description: Option<String>,
    /// Persisted workflow status.
    pub status: TaskStatus,
    /// Creating user.
    pub author: UserId,
    /// Assigned user, if any.
    pub assignee: Option<UserId>,
    /// Persisted optimistic-concurrency revision.
    pub revision: Revision,
    /// Number of status transitions applied so far.
    pub status_changes: u64,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted latest mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Persisted completion timestamp, if the task was ever done.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a new task in the [`TaskStatus::Todo`] status.
    #[must_use]
    pub fn new(
        title: TaskTitle,
        description: Option<String>,
        author: UserId,
        assignee: Option<UserId>,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id: TaskId::new(),
            title,
            description,
            status: TaskStatus::default(),
            author,
            assignee,
            revision: Revision::INITIAL,
            status_changes: 0,
            created_at: timestamp,
            updated_at: timestamp,
            completed_at: None,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedTaskData) -> Self {
        Self {
            id: data.id,
            title: data.title,
            description: data.description,
            status: data.status,
            author: data.author,
            assignee: data.assignee,
            revision: data.revision,
            status_changes: data.status_changes,
            created_at: data.created_at,
            updated_at: data.updated_at,
            completed_at: data.completed_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the task title.
    #[must_use]
    pub const fn title(&self) -> &TaskTitle {
        &self.title
    }

    /// Returns the task description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the current workflow status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the creating user.
    #[must_use]
    pub const fn author(&self) -> UserId {
        self.author
    }

    /// Returns the assigned user, if any.
    #[must_use]
    pub const fn assignee(&self) -> Option<UserId> {
        self.assignee
    }

    /// Returns the optimistic-concurrency revision.
    #[must_use]
    pub const fn revision(&self) -> Revision {
        self.revision
    }

    /// Returns how many status transitions have been applied.
    #[must_use]
    pub const fn status_changes(&self) -> u64 {
        self.status_changes
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest mutation timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns when the task first reached [`TaskStatus::Done`].
    ///
    /// Once set this is never cleared, even if the task later leaves the
    /// done status.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Moves the task to `new_status` on behalf of `changed_by`.
    ///
    /// Returns `None` without touching the task when `new_status` equals the
    /// current status. Otherwise updates the status, stamps `completed_at` on
    /// the first move to a terminal status, and returns the history record
    /// describing the transition.
    pub fn change_status(
        &mut self,
        new_status: TaskStatus,
        changed_by: UserId,
        clock: &impl Clock,
    ) -> Option<TaskStatusHistory> {
        if new_status == self.status {
            return None;
        }

        let now = clock.utc();
        self.status_changes = self.status_changes.saturating_add(1);
        let record = TaskStatusHistory::record(TransitionFacts {
            task_id: self.id,
            sequence: self.status_changes,
            old_status: self.status,
            new_status,
            changed_by,
            changed_at: now,
        });

        self.status = new_status;
        if new_status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.mark_mutated(now);
        Some(record)
    }

    /// Replaces the title and/or description.
    ///
    /// Fields passed as `None` keep their current value. Returns `false` when
    /// nothing was supplied and the task is left untouched.
    pub fn update_details(
        &mut self,
        title: Option<TaskTitle>,
        description: Option<String>,
        clock: &impl Clock,
    ) -> bool {
        if title.is_none() && description.is_none() {
            return false;
        }
        if let Some(new_title) = title {
            self.title = new_title;
        }
        if let Some(new_description) = description {
            self.description = Some(new_description);
        }
        self.mark_mutated(clock.utc());
        true
    }

    /// Sets or clears the assignee.
    ///
    /// Returns `false` when the assignee is unchanged.
    pub fn assign(&mut self, assignee: Option<UserId>, clock: &impl Clock) -> bool {
        if self.assignee == assignee {
            return false;
        }
        self.assignee = assignee;
        self.mark_mutated(clock.utc());
        true
    }

    fn mark_mutated(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.revision = self.revision.next();
    }
}
