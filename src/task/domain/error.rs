//! Error types for task domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing domain task values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskDomainError {
    /// The task title is empty after trimming.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// The task title has more characters than storage accepts.
    #[error("task title has {length} characters; the limit is {max}")]
    TitleTooLong {
        /// Character count of the rejected title.
        length: usize,
        /// Maximum accepted character count.
        max: usize,
    },
}

/// Error returned while parsing task statuses from text or persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);
