//! Execution handlers, called by workers to report lifecycle progress and
//! results.

use std::sync::Arc;

use tracing::info;

use super::resolve_version_reference;
use crate::common::{
    ApiError, ExecutionFinalResultPayload, ExecutionInfo, ExecutionTemporaryResultPayload,
    VersionReference,
};
use crate::data::{DataStore, ExecutionUpdate};
use crate::provisioning::Provisioner;

pub struct ExecutionApi {
    store: DataStore,
    provisioner: Arc<dyn Provisioner>,
}

impl ExecutionApi {
    pub fn new(store: DataStore, provisioner: Arc<dyn Provisioner>) -> Self {
        Self { store, provisioner }
    }

    pub async fn get_execution(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
    ) -> Result<ExecutionInfo, ApiError> {
        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;

        self.store
            .executions
            .get(
                project_name,
                &version_id,
                function_name,
                invocation_id,
                execution_id,
            )
            .await
    }

    /// Record that the worker has begun user code. Fails with
    /// `ExecutionHasAlreadyStarted` on a second call.
    pub async fn mark_execution_as_started(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        time: i64,
    ) -> Result<ExecutionInfo, ApiError> {
        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;

        self.store
            .executions
            .update(
                project_name,
                &version_id,
                function_name,
                invocation_id,
                execution_id,
                time,
                ExecutionUpdate {
                    new_execution_start_time: Some(time),
                    should_already_have_started: Some(false),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            project_name = %project_name,
            invocation_id = %invocation_id,
            execution_id = %execution_id,
            "execution started"
        );

        self.store
            .executions
            .get(
                project_name,
                &version_id,
                function_name,
                invocation_id,
                execution_id,
            )
            .await
    }

    /// Overwrite the latest intermediate output. Requires a started,
    /// not-yet-finished execution.
    pub async fn upload_temporary_execution_result(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        payload: &ExecutionTemporaryResultPayload,
        time: i64,
    ) -> Result<ExecutionInfo, ApiError> {
        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;

        self.store
            .executions
            .update(
                project_name,
                &version_id,
                function_name,
                invocation_id,
                execution_id,
                time,
                ExecutionUpdate {
                    new_output: payload.latest_output.clone(),
                    should_already_have_started: Some(true),
                    should_already_have_finished: Some(false),
                    ..Default::default()
                },
            )
            .await?;

        self.store
            .executions
            .get(
                project_name,
                &version_id,
                function_name,
                invocation_id,
                execution_id,
            )
            .await
    }

    /// Record the terminal outcome exactly once, stamping the finish time.
    pub async fn set_final_execution_result(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        payload: &ExecutionFinalResultPayload,
        time: i64,
    ) -> Result<ExecutionInfo, ApiError> {
        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;

        self.store
            .executions
            .update(
                project_name,
                &version_id,
                function_name,
                invocation_id,
                execution_id,
                time,
                ExecutionUpdate {
                    new_outcome: Some(payload.outcome),
                    new_output: payload.final_output.clone(),
                    new_error_message: payload.error_message.clone(),
                    new_execution_finish_time: Some(time),
                    should_already_have_started: Some(true),
                    should_already_have_finished: Some(false),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            project_name = %project_name,
            invocation_id = %invocation_id,
            execution_id = %execution_id,
            outcome = ?payload.outcome,
            "execution finished"
        );

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

        // Lets the dev provisioner start its termination countdown; real
        // drivers ignore this.
        if let Some(worker_details) = &execution.worker_details {
            self.provisioner
                .notify_of_execution_completion(worker_details)
                .await;
        }

        Ok(execution)
    }

    // Listing executions of an invocation deliberately lives on the
    // invocation handler (the invoker's view); workers only ever address
    // their own execution by ID.
}
