//! Invocation routes.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::invocation::parse_parent_invocation;
use crate::common::{
    current_time, ApiError, InvocationDefinition, InvocationInfo, InvocationStatus,
    InvocationsListForFunction, VersionReference,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ListInvocationsQuery {
    max_results: Option<u32>,
    initial_offset: Option<String>,
    status: Option<InvocationStatus>,
    parent_function_name: Option<String>,
    parent_invocation_id: Option<String>,
}

pub async fn create_invocation(
    State(state): State<AppState>,
    Path((project_name, version_ref, function_name)): Path<(String, String, String)>,
    Json(definition): Json<InvocationDefinition>,
) -> Result<Json<InvocationInfo>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let invocation = state
        .api
        .invocation
        .create_invocation(
            &project_name,
            &version_ref,
            &function_name,
            &definition,
            current_time(),
        )
        .await?;

    Ok(Json(invocation))
}

pub async fn cancel_invocation(
    State(state): State<AppState>,
    Path((project_name, version_ref, function_name, invocation_id)): Path<(
        String,
        String,
        String,
        String,
    )>,
) -> Result<Json<InvocationInfo>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let invocation = state
        .api
        .invocation
        .cancel_invocation(
            &project_name,
            &version_ref,
            &function_name,
            &invocation_id,
            current_time(),
        )
        .await?;

    Ok(Json(invocation))
}

pub async fn get_invocation(
    State(state): State<AppState>,
    Path((project_name, version_ref, function_name, invocation_id)): Path<(
        String,
        String,
        String,
        String,
    )>,
) -> Result<Json<InvocationInfo>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let invocation = state
        .api
        .invocation
        .get_invocation(&project_name, &version_ref, &function_name, &invocation_id)
        .await?;

    Ok(Json(invocation))
}

pub async fn list_invocations(
    State(state): State<AppState>,
    Path((project_name, version_ref, function_name)): Path<(String, String, String)>,
    Query(query): Query<ListInvocationsQuery>,
) -> Result<Json<InvocationsListForFunction>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let parent_invocation =
        parse_parent_invocation(query.parent_function_name, query.parent_invocation_id)?;

    let invocations = state
        .api
        .invocation
        .list_invocations(
            &project_name,
            &version_ref,
            &function_name,
            query.max_results,
            query.initial_offset.as_deref(),
            query.status,
            parent_invocation.as_ref(),
        )
        .await?;

    Ok(Json(invocations))
}
