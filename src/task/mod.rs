//! Task status lifecycle and audit history.
//!
//! Tasks move between statuses through [`services::TaskLifecycleService`].
//! Every real transition appends an immutable history record in the same
//! unit of work that updates the task, and [`services::TaskHistoryService`]
//! reads those records back. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
