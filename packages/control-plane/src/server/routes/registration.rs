//! Project and version registration routes.

use axum::extract::{Path, State};
use axum::Json;

use crate::common::{
    current_time, ApiError, ProjectInfo, ProjectsList, VersionDefinition, VersionInfo,
    VersionReference, VersionsListForProject,
};
use crate::server::AppState;

pub async fn create_project(
    State(state): State<AppState>,
    Path(project_name): Path<String>,
) -> Result<Json<ProjectInfo>, ApiError> {
    let project = state
        .api
        .registration
        .create_project(&project_name, current_time())
        .await?;

    Ok(Json(project))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(project_name): Path<String>,
) -> Result<Json<ProjectInfo>, ApiError> {
    let project = state.api.registration.get_project(&project_name).await?;

    Ok(Json(project))
}

pub async fn list_projects(
    State(state): State<AppState>,
) -> Result<Json<ProjectsList>, ApiError> {
    let projects = state.api.registration.list_projects().await?;

    Ok(Json(projects))
}

pub async fn request_project_deletion(
    State(state): State<AppState>,
    Path(project_name): Path<String>,
) -> Result<Json<ProjectInfo>, ApiError> {
    let project = state
        .api
        .registration
        .request_project_deletion(&project_name, current_time())
        .await?;

    Ok(Json(project))
}

pub async fn create_project_version(
    State(state): State<AppState>,
    Path(project_name): Path<String>,
    Json(definition): Json<VersionDefinition>,
) -> Result<Json<VersionInfo>, ApiError> {
    let version = state
        .api
        .registration
        .create_project_version(&project_name, &definition, current_time())
        .await?;

    Ok(Json(version))
}

pub async fn get_project_version(
    State(state): State<AppState>,
    Path((project_name, version_ref)): Path<(String, String)>,
) -> Result<Json<VersionInfo>, ApiError> {
    let version_ref = VersionReference::parse(&version_ref);
    let version = state
        .api
        .registration
        .get_project_version(&project_name, &version_ref)
        .await?;

    Ok(Json(version))
}

pub async fn list_project_versions(
    State(state): State<AppState>,
    Path(project_name): Path<String>,
) -> Result<Json<VersionsListForProject>, ApiError> {
    let versions = state
        .api
        .registration
        .list_project_versions(&project_name)
        .await?;

    Ok(Json(versions))
}
