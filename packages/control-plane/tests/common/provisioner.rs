//! Scripted provisioner for integration tests. No workers are created; tests
//! drive worker termination explicitly.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use control_plane::common::{
    PreparedFunctionDetails, ResourceSpec, WorkerDetails, WorkerStatus, WorkerType,
};
use control_plane::provisioning::{LogsResult, Provisioner};

pub const PROVISIONING_ERROR_MESSAGE: &str = "provisioning error";

#[derive(Default)]
struct FakeState {
    provisioned: HashSet<String>,
    signalled: HashSet<String>,
    terminated: HashSet<String>,
}

pub struct FakeProvisioner {
    state: Mutex<FakeState>,
    fail_provisioning: bool,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            fail_provisioning: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            fail_provisioning: true,
        }
    }

    // Test-side controls and probes, not part of the Provisioner contract.

    pub fn mock_worker_termination(&self, worker_details: &WorkerDetails) {
        self.state
            .lock()
            .unwrap()
            .terminated
            .insert(worker_details.identifier.clone());
    }

    pub fn worker_is_provisioned(&self, worker_details: &WorkerDetails) -> bool {
        self.state
            .lock()
            .unwrap()
            .provisioned
            .contains(&worker_details.identifier)
    }

    pub fn worker_has_received_termination_signal(&self, worker_details: &WorkerDetails) -> bool {
        self.state
            .lock()
            .unwrap()
            .signalled
            .contains(&worker_details.identifier)
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
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
        if self.fail_provisioning {
            bail!(PROVISIONING_ERROR_MESSAGE);
        }

        let identifier = format!(
            "{project_name}/{version_id}/{function_name}/{invocation_id}/{execution_id}"
        );

        self.state
            .lock()
            .unwrap()
            .provisioned
            .insert(identifier.clone());

        Ok(WorkerDetails {
            worker_type: WorkerType::Dev,
            identifier,
            logs_identifier: "mocked".to_string(),
        })
    }

    async fn send_termination_signal(&self, worker_details: &WorkerDetails) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if state.provisioned.contains(&worker_details.identifier) {
            state.signalled.insert(worker_details.identifier.clone());
        }

        Ok(())
    }

    async fn check_worker_status(&self, worker_details: &WorkerDetails) -> Result<WorkerStatus> {
        let state = self.state.lock().unwrap();

        if state.provisioned.contains(&worker_details.identifier)
            && !state.terminated.contains(&worker_details.identifier)
        {
            Ok(WorkerStatus::Running)
        } else {
            Ok(WorkerStatus::Terminated)
        }
    }

    async fn get_worker_logs(
        &self,
        _worker_details: &WorkerDetails,
        _max_lines: Option<u32>,
        _initial_offset: Option<&str>,
    ) -> Result<LogsResult> {
        Ok(LogsResult {
            log_lines: vec!["hello".to_string(), "world".to_string()],
            next_offset: None,
        })
    }
}
