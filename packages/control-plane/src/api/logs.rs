//! Log retrieval: resolves an execution's worker handle and pages through
//! the provisioner's log storage.

use std::sync::Arc;

use super::resolve_version_reference;
use crate::common::{ApiError, ExecutionLogs, VersionReference};
use crate::data::DataStore;
use crate::provisioning::Provisioner;

pub struct LogsApi {
    store: DataStore,
    provisioner: Arc<dyn Provisioner>,
}

impl LogsApi {
    pub fn new(store: DataStore, provisioner: Arc<dyn Provisioner>) -> Self {
        Self { store, provisioner }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn get_execution_logs(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        max_lines: Option<u32>,
        initial_offset: Option<&str>,
    ) -> Result<ExecutionLogs, ApiError> {
        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;

        let execution = self
            .store
            .executions
            .get(
                project_name,
                &version_id,
                function_name,
                invocation_id,
                execution_id,
            )
            .await?;

        // No worker yet means no logs yet; not an error.
        let (log_lines, next_offset) = match &execution.worker_details {
            Some(worker_details) => {
                let logs = self
                    .provisioner
                    .get_worker_logs(worker_details, max_lines, initial_offset)
                    .await?;
                (logs.log_lines, logs.next_offset)
            }
            None => (Vec::new(), None),
        };

        Ok(ExecutionLogs {
            project_name: project_name.to_string(),
            version_id,
            function_name: function_name.to_string(),
            invocation_id: invocation_id.to_string(),
            execution_id: execution_id.to_string(),
            log_lines,
            next_offset,
        })
    }
}
