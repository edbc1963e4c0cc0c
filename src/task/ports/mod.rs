//! Port contracts for task lifecycle management.
//!
//! Ports define infrastructure-agnostic interfaces used by task services.

pub mod repository;

pub use repository::{
    TaskHistoryRepository, TaskRepository, TaskRepositoryError, TaskRepositoryResult,
};

#[cfg(test)]
pub use repository::MockTaskRepository;
