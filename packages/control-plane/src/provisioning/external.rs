//! HTTP driver for a provisioner living outside this codebase.
//!
//! Every request is `POST /{verb}` with a JSON body and bearer-token auth.
//! 2xx carries a typed response body, 4xx is a permanent failure whose body
//! has a `detail` field, anything else is transient.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{LogsResult, Provisioner};
use crate::common::{
    ErrorResponse, PreparedFunctionDetails, ResourceSpec, WorkerDetails, WorkerStatus,
};

const PREPARE_PATH: &str = "/prepare";
const PROVISION_PATH: &str = "/provision";
const TERMINATE_PATH: &str = "/terminate";
const CHECK_STATUS_PATH: &str = "/check_status";
const GET_LOGS_PATH: &str = "/get_logs";

#[derive(Debug, Serialize)]
struct PrepareFunctionRequest<'a> {
    project_name: &'a str,
    version_id: &'a str,
    function_name: &'a str,
    docker_image: &'a str,
    resource_spec: &'a ResourceSpec,
}

#[derive(Debug, Deserialize)]
struct PrepareFunctionResponse {
    prepared_function_details: PreparedFunctionDetails,
}

#[derive(Debug, Serialize)]
struct ProvisionWorkerRequest<'a> {
    project_name: &'a str,
    version_id: &'a str,
    function_name: &'a str,
    invocation_id: &'a str,
    execution_id: &'a str,
    resource_spec: &'a ResourceSpec,
    prepared_function_details: &'a PreparedFunctionDetails,
}

#[derive(Debug, Deserialize)]
struct ProvisionWorkerResponse {
    worker_details: WorkerDetails,
}

#[derive(Debug, Serialize)]
struct TerminateWorkerRequest<'a> {
    worker_details: &'a WorkerDetails,
}

#[derive(Debug, Deserialize)]
struct TerminateWorkerResponse {}

#[derive(Debug, Serialize)]
struct CheckWorkerStatusRequest<'a> {
    worker_details: &'a WorkerDetails,
}

#[derive(Debug, Deserialize)]
struct CheckWorkerStatusResponse {
    worker_status: WorkerStatus,
}

#[derive(Debug, Serialize)]
struct GetLogsRequest<'a> {
    worker_details: &'a WorkerDetails,
    max_lines: Option<u32>,
    initial_offset: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GetLogsResponse {
    log_lines: Vec<String>,
    next_offset: Option<String>,
}

pub struct ExternalProvisioner {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ExternalProvisioner {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: api_key.into(),
        }
    }

    async fn post<Request, Response>(&self, path: &str, body: &Request) -> Result<Response>
    where
        Request: Serialize + Sync,
        Response: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("provisioner request to {path} failed"))?;

        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .with_context(|| format!("cannot deserialise provisioner response from {path}"));
        }

        if status.is_client_error() {
            let detail = response
                .json::<ErrorResponse>()
                .await
                .map(|body| body.detail)
                .unwrap_or_else(|_| "<no detail>".to_string());
            return Err(anyhow!(
                "provisioner rejected request to {path} (status {status}): {detail}"
            ));
        }

        Err(anyhow!("provisioner returned status {status} for {path}"))
    }
}

#[async_trait]
impl Provisioner for ExternalProvisioner {
    async fn prepare_function(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        docker_image: &str,
        resource_spec: &ResourceSpec,
    ) -> Result<PreparedFunctionDetails> {
        let response: PrepareFunctionResponse = self
            .post(
                PREPARE_PATH,
                &PrepareFunctionRequest {
                    project_name,
                    version_id,
                    function_name,
                    docker_image,
                    resource_spec,
                },
            )
            .await?;

        Ok(response.prepared_function_details)
    }

    async fn provision_worker(
        &self,
        project_name: &str,
        version_id: &str,
        function_name: &str,
        invocation_id: &str,
        execution_id: &str,
        resource_spec: &ResourceSpec,
        prepared_function_details: &PreparedFunctionDetails,
    ) -> Result<WorkerDetails> {
        let response: ProvisionWorkerResponse = self
            .post(
                PROVISION_PATH,
                &ProvisionWorkerRequest {
                    project_name,
                    version_id,
                    function_name,
                    invocation_id,
                    execution_id,
                    resource_spec,
                    prepared_function_details,
                },
            )
            .await?;

        Ok(response.worker_details)
    }

    async fn send_termination_signal(&self, worker_details: &WorkerDetails) -> Result<()> {
        let _: TerminateWorkerResponse = self
            .post(TERMINATE_PATH, &TerminateWorkerRequest { worker_details })
            .await?;

        Ok(())
    }

    async fn check_worker_status(&self, worker_details: &WorkerDetails) -> Result<WorkerStatus> {
        let response: CheckWorkerStatusResponse = self
            .post(
                CHECK_STATUS_PATH,
                &CheckWorkerStatusRequest { worker_details },
            )
            .await?;

        Ok(response.worker_status)
    }

    async fn get_worker_logs(
        &self,
        worker_details: &WorkerDetails,
        max_lines: Option<u32>,
        initial_offset: Option<&str>,
    ) -> Result<LogsResult> {
        let response: GetLogsResponse = self
            .post(
                GET_LOGS_PATH,
                &GetLogsRequest {
                    worker_details,
                    max_lines,
                    initial_offset,
                },
            )
            .await?;

        Ok(LogsResult {
            log_lines: response.log_lines,
            next_offset: response.next_offset,
        })
    }
}
