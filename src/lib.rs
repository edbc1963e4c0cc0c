//! Taskflow: task status lifecycle with an append-only audit history.
//!
//! Tasks move between `todo`, `in_progress` and `done`. Every effective
//! status change is recorded as an immutable history entry written in the
//! same unit of work as the task itself, so the audit trail never disagrees
//! with the current status.
//!
//! # Architecture
//!
//! Taskflow follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for persistence
//! - **Adapters**: In-memory and `PostgreSQL` implementations of the ports
//! - **Services**: Orchestration of domain rules and repository writes
//!
//! # Modules
//!
//! - [`task`]: Task lifecycle, status history and access policy
//! - [`config`]: Database settings and connection pool construction

pub mod config;
pub mod task;
