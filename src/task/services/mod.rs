//! Application services for task lifecycle orchestration.

mod history;
mod lifecycle;
mod policy;

pub use history::TaskHistoryService;
pub use lifecycle::{
    AssignTaskRequest, ChangeStatusRequest, CreateTaskRequest, TaskErrorKind, TaskLifecycleError,
    TaskLifecycleResult, TaskLifecycleService, UpdateTaskDetailsRequest,
};
pub use policy::{AccessDenied, AuthorOnlyPolicy, TaskAccessPolicy, TaskAction};
