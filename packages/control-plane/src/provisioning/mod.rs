//! The provisioner contract: the only component that touches external
//! infrastructure. The reconciler treats every error from these calls as
//! transient and retries on a later tick.

mod dev;
mod external;

pub use dev::DevProvisioner;
pub use external::ExternalProvisioner;

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{PreparedFunctionDetails, ResourceSpec, WorkerDetails, WorkerStatus};

/// One page of worker logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsResult {
    pub log_lines: Vec<String>,
    pub next_offset: Option<String>,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create whatever cloud-side definition is needed before workers can be
    /// provisioned for this function. Idempotent from the caller's view.
    async fn prepare_function(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        docker_image: &str,
        resource_spec: &ResourceSpec,
    ) -> Result<PreparedFunctionDetails>;

    /// Start a worker for one execution attempt.
    #[allow(clippy::too_many_arguments)]
    async fn provision_worker(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        resource_spec: &ResourceSpec,
        prepared_function_details: &PreparedFunctionDetails,
    ) -> Result<WorkerDetails>;

    /// Ask the worker to shut down gracefully. Best effort, safe to repeat.
    async fn send_termination_signal(&self, worker_details: &WorkerDetails) -> Result<()>;

    /// Whether the worker is still alive. Returns TERMINATED also when the
    /// worker record has been garbage-collected upstream; never PENDING.
    async fn check_worker_status(&self, worker_details: &WorkerDetails) -> Result<WorkerStatus>;

    /// Hook for the dev provisioner to simulate worker termination once an
    /// execution has uploaded its final result. No-op for real drivers.
    async fn notify_of_execution_completion(&self, _worker_details: &WorkerDetails) {}

    /// One page of the worker's log output.
    async fn get_worker_logs(
        &self,
        worker_details: &WorkerDetails,
        max_lines: Option<u32>,
        initial_offset: Option<&str>,
    ) -> Result<LogsResult>;
}
