//! Execution routes, used by workers, plus log retrieval for invokers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::common::{
    current_time, ApiError, ExecutionFinalResultPayload, ExecutionInfo, ExecutionLogs,
    ExecutionTemporaryResultPayload, VersionReference,
};
use crate::server::AppState;

type ExecutionPath = (String, String, String, String, String);

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    max_lines: Option<u32>,
    initial_offset: Option<String>,
}

pub async fn get_execution(
    State(state): State<AppState>,
    Path((project_name, version_ref, function_name, invocation_id, execution_id)): Path<
        ExecutionPath,
    >,
) -> Result<Json<ExecutionInfo>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let execution = state
        .api
        .execution
        .get_execution(
            &project_name,
            &version_ref,
            &function_name,
            &invocation_id,
            &execution_id,
        )
        .await?;

    Ok(Json(execution))
}

pub async fn start_execution(
    State(state): State<AppState>,
    Path((project_name, version_ref, function_name, invocation_id, execution_id)): Path<
        ExecutionPath,
    >,
) -> Result<Json<ExecutionInfo>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let execution = state
        .api
        .execution
        .mark_execution_as_started(
            &project_name,
            &version_ref,
            &function_name,
            &invocation_id,
            &execution_id,
            current_time(),
        )
        .await?;

    Ok(Json(execution))
}

pub async fn update_execution(
    State(state): State<AppState>,
    Path((project_name, version_ref, function_name, invocation_id, execution_id)): Path<
        ExecutionPath,
    >,
    Json(payload): Json<ExecutionTemporaryResultPayload>,
) -> Result<Json<ExecutionInfo>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let execution = state
        .api
        .execution
        .upload_temporary_execution_result(
            &project_name,
            &version_ref,
            &function_name,
            &invocation_id,
            &execution_id,
            &payload,
            current_time(),
        )
        .await?;

    Ok(Json(execution))
}

pub async fn finish_execution(
    State(state): State<AppState>,
    Path((project_name, version_ref, function_name, invocation_id, execution_id)): Path<
        ExecutionPath,
    >,
    Json(payload): Json<ExecutionFinalResultPayload>,
) -> Result<Json<ExecutionInfo>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let execution = state
        .api
        .execution
        .set_final_execution_result(
            &project_name,
            &version_ref,
            &function_name,
            &invocation_id,
            &execution_id,
            &payload,
            current_time(),
        )
        .await?;

    Ok(Json(execution))
}

pub async fn get_execution_logs(
    State(state): State<AppState>,
    Path((project_name, version_ref, function_name, invocation_id, execution_id)): Path<
        ExecutionPath,
    >,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ExecutionLogs>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let logs = state
        .api
        .logs
        .get_execution_logs(
            &project_name,
            &version_ref,
            &function_name,
            &invocation_id,
            &execution_id,
            query.max_lines,
            query.initial_offset.as_deref(),
        )
        .await?;

    Ok(Json(logs))
}
