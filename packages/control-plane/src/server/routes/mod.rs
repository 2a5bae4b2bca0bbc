mod executions;
mod health;
mod invocations;
mod registration;

pub use executions::{
    finish_execution, get_execution, get_execution_logs, start_execution, update_execution,
};
pub use health::health_check;
pub use invocations::{
    cancel_invocation, create_invocation, get_invocation, list_invocations,
};
pub use registration::{
    create_project, create_project_version, get_project, get_project_version, list_project_versions,
    list_projects, request_project_deletion,
};
