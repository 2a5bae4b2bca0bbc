//! Mocked-up provisioner for local development. Creates no real resources;
//! client authors run against it to exercise the full invocation lifecycle.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{LogsResult, Provisioner};
use crate::common::{
    PreparedFunctionDetails, ResourceSpec, WorkerDetails, WorkerStatus, WorkerType,
};

const TOTAL_LOG_LINES: u32 = 100;

/// In-memory provisioner.
///
/// A provisioned worker stays RUNNING until the execution uploads its final
/// result; from then it survives `lag_cycles` further status polls before
/// reporting TERMINATED, mimicking the shutdown lag of a real backend.
pub struct DevProvisioner {
    lag_cycles: u32,
    /// worker identifier -> remaining polls before termination
    /// (None = unbounded, i.e. execution not finished yet).
    workers: Mutex<HashMap<String, Option<u32>>>,
}

impl DevProvisioner {
    pub fn new(lag_cycles: u32) -> Self {
        Self {
            lag_cycles,
            workers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Provisioner for DevProvisioner {
    async fn prepare_function(
        &self,
        _project_name: &str,
        _version_id: &str,
        _function_name: &str,
        _docker_image: &str,
        _resource_spec: &ResourceSpec,
    ) -> Result<PreparedFunctionDetails> {
        Ok(PreparedFunctionDetails {
            worker_type: WorkerType::Dev,
            identifier: "mocked".to_string(),
        })
    }

    async fn provision_worker(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        _resource_spec: &ResourceSpec,
        _prepared_function_details: &PreparedFunctionDetails,
    ) -> Result<WorkerDetails> {
        let identifier = worker_identifier(
            project_name,
            version_id,
            function_name,
            invocation_id,
            execution_id,
        );

        self.workers.lock().await.insert(identifier.clone(), None);

        Ok(WorkerDetails {
            worker_type: WorkerType::Dev,
            identifier,
            logs_identifier: "mocked".to_string(),
        })
    }

    async fn send_termination_signal(&self, _worker_details: &WorkerDetails) -> Result<()> {
        // No-op; a dev worker stays RUNNING until the client submits the
        // final result for its execution.
        Ok(())
    }

    async fn check_worker_status(&self, worker_details: &WorkerDetails) -> Result<WorkerStatus> {
        let mut workers = self.workers.lock().await;

        if let Some(remaining) = workers.get_mut(&worker_details.identifier) {
            if let Some(cycles) = remaining {
                if *cycles == 0 {
                    workers.remove(&worker_details.identifier);
                } else {
                    *cycles -= 1;
                }
            }
        }

        if workers.contains_key(&worker_details.identifier) {
            Ok(WorkerStatus::Running)
        } else {
            Ok(WorkerStatus::Terminated)
        }
    }

    async fn notify_of_execution_completion(&self, worker_details: &WorkerDetails) {
        let mut workers = self.workers.lock().await;

        if let Some(remaining) = workers.get_mut(&worker_details.identifier) {
            let capped = match *remaining {
                Some(cycles) => cycles.min(self.lag_cycles),
                None => self.lag_cycles,
            };
            *remaining = Some(capped);
        }
    }

    async fn get_worker_logs(
        &self,
        _worker_details: &WorkerDetails,
        max_lines: Option<u32>,
        initial_offset: Option<&str>,
    ) -> Result<LogsResult> {
        let left_bound: u32 = match initial_offset {
            Some(offset) => offset.parse()?,
            None => 0,
        };

        let right_bound = match max_lines {
            Some(max_lines) => TOTAL_LOG_LINES.min(left_bound.saturating_add(max_lines)),
            None => TOTAL_LOG_LINES,
        };

        let log_lines = (left_bound..right_bound)
            .map(|line| format!("line-{line}"))
            .collect();

        let next_offset = if right_bound < TOTAL_LOG_LINES {
            Some(right_bound.to_string())
        } else {
            None
        };

        Ok(LogsResult {
            log_lines,
            next_offset,
        })
    }
}

fn worker_identifier(
    project_name: &str,
    version_id: &str,
    function_name: &str,
    invocation_id: &str,
    execution_id: &str,
) -> String {
    format!("{project_name}/{version_id}/{function_name}/{invocation_id}/{execution_id}")
}
