//! Request API handlers: thin translations from caller requests into store
//! operations. Every handler resolves its symbolic version reference up
//! front, then works with concrete version IDs.

pub mod execution;
pub mod invocation;
pub mod logs;
pub mod registration;

pub use execution::ExecutionApi;
pub use invocation::InvocationApi;
pub use logs::LogsApi;
pub use registration::RegistrationApi;

use std::sync::Arc;

use crate::common::{ApiError, VersionReference};
use crate::data::DataStore;
use crate::provisioning::Provisioner;

/// All handler groups behind one handle.
pub struct ApiHandler {
    pub registration: RegistrationApi,
    pub invocation: InvocationApi,
    pub execution: ExecutionApi,
    pub logs: LogsApi,
}

impl ApiHandler {
    pub fn new(store: DataStore, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            registration: RegistrationApi::new(store.clone()),
            invocation: InvocationApi::new(store.clone()),
            execution: ExecutionApi::new(store.clone(), provisioner.clone()),
            logs: LogsApi::new(store, provisioner),
        }
    }
}

/// Turn a version reference into a concrete version ID.
pub(crate) async fn resolve_version_reference(
    store: &DataStore,
    project_name: &str,
    version_ref: &VersionReference,
) -> Result<String, ApiError> {
    match version_ref {
        VersionReference::Named(version_id) => Ok(version_id.clone()),
        VersionReference::Latest => store.versions.get_id_of_latest(project_name).await,
    }
}

/// Creating new work inside a project that is being torn down is refused.
pub(crate) async fn ensure_project_is_not_being_deleted(
    store: &DataStore,
    project_name: &str,
) -> Result<(), ApiError> {
    let project = store.projects.get(project_name).await?;

    if project.deletion_requested() {
        return Err(ApiError::ProjectIsBeingDeleted);
    }

    Ok(())
}
