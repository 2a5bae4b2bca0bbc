//! Registration handlers: projects and versions. Called by the CLI tool.

use tracing::info;

use super::{ensure_project_is_not_being_deleted, resolve_version_reference};
use crate::common::{
    generate_random_id, ApiError, ProjectInfo, ProjectsList, VersionDefinition, VersionInfo,
    VersionReference, VersionsListForProject,
};
use crate::data::DataStore;

const MAX_PROJECT_NAME_LENGTH: usize = 64;

pub struct RegistrationApi {
    store: DataStore,
}

impl RegistrationApi {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }

    pub async fn create_project(
        &self,
        project_name: &str,
        time: i64,
    ) -> Result<ProjectInfo, ApiError> {
        check_project_name_length(project_name)?;

        self.store.projects.create(project_name, time).await?;
        info!(project_name = %project_name, "project created");

        self.store.projects.get(project_name).await
    }

    pub async fn get_project(&self, project_name: &str) -> Result<ProjectInfo, ApiError> {
        self.store.projects.get(project_name).await
    }

    pub async fn list_projects(&self) -> Result<ProjectsList, ApiError> {
        self.store.projects.list().await
    }

    /// Request deletion. The project disappears asynchronously once the
    /// reconciler has cancelled and drained all of its running invocations.
    pub async fn request_project_deletion(
        &self,
        project_name: &str,
        time: i64,
    ) -> Result<ProjectInfo, ApiError> {
        self.store.projects.request_deletion(project_name, time).await?;
        info!(project_name = %project_name, "project deletion requested");

        self.store.projects.get(project_name).await
    }

    pub async fn create_project_version(
        &self,
        project_name: &str,
        definition: &VersionDefinition,
        time: i64,
    ) -> Result<VersionInfo, ApiError> {
        ensure_project_is_not_being_deleted(&self.store, project_name).await?;

        let version_id = generate_random_id("ver");

        self.store
            .versions
            .create_with_functions(project_name, &version_id, time, definition)
            .await?;

        info!(
            project_name = %project_name,
            version_id = %version_id,
            function_count = definition.functions.len(),
            "project version created"
        );

        self.store.versions.get(project_name, &version_id).await
    }

    pub async fn get_project_version(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
    ) -> Result<VersionInfo, ApiError> {
        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;

        self.store.versions.get(project_name, &version_id).await
    }

    pub async fn list_project_versions(
        &self,
        project_name: &str,
    ) -> Result<VersionsListForProject, ApiError> {
        self.store.versions.list_for_project(project_name).await
    }

    // There is deliberately no get/list-functions handler: the VersionInfo
    // returned above already carries full function information, and the API
    // should offer one way of doing each thing.
}

fn check_project_name_length(project_name: &str) -> Result<(), ApiError> {
    if project_name.len() > MAX_PROJECT_NAME_LENGTH {
        return Err(ApiError::ProjectNameIsTooLong);
    }
    Ok(())
}
