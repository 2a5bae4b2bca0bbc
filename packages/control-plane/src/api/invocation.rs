//! Invocation handlers, called both by external invokers and by workers
//! making nested invocations.

use tracing::info;

use super::{ensure_project_is_not_being_deleted, resolve_version_reference};
use crate::common::{
    generate_random_id, ApiError, InvocationDefinition, InvocationInfo, InvocationStatus,
    InvocationsListForFunction, ParentInvocationDefinition, VersionReference,
};
use crate::data::DataStore;

/// List endpoints never return more rows than this, whatever the caller asks.
const MAX_LIST_RESULTS: u32 = 50;

pub struct InvocationApi {
    store: DataStore,
}

impl InvocationApi {
    pub fn new(store: DataStore) -> Self {
        Self { store }
    }

    pub async fn create_invocation(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
        function_name: &str,
        definition: &InvocationDefinition,
        time: i64,
    ) -> Result<InvocationInfo, ApiError> {
        ensure_project_is_not_being_deleted(&self.store, project_name).await?;

        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;
        let invocation_id = generate_random_id("inv");

        self.store
            .invocations
            .create(
                project_name,
                &version_id,
                function_name,
                &invocation_id,
                definition.parent_invocation.as_ref(),
                &definition.input,
                time,
            )
            .await?;

        info!(
            project_name = %project_name,
            version_id = %version_id,
            function_name = %function_name,
            invocation_id = %invocation_id,
            "invocation created"
        );

        self.store
            .invocations
            .get(project_name, &version_id, function_name, &invocation_id)
            .await
    }

    /// Flag the invocation for cancellation. The reconciler signals its
    /// workers on a later tick; calling this twice keeps the original stamp.
    pub async fn cancel_invocation(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
        function_name: &str,
        invocation_id: &str,
        time: i64,
    ) -> Result<InvocationInfo, ApiError> {
        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;

        self.store
            .invocations
            .update(
                project_name,
                &version_id,
                function_name,
                invocation_id,
                time,
                true,
                None,
            )
            .await?;

        info!(
            project_name = %project_name,
            invocation_id = %invocation_id,
            "invocation cancellation requested"
        );

        self.store
            .invocations
            .get(project_name, &version_id, function_name, invocation_id)
            .await
    }

    pub async fn get_invocation(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
        function_name: &str,
        invocation_id: &str,
    ) -> Result<InvocationInfo, ApiError> {
        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;

        self.store
            .invocations
            .get(project_name, &version_id, function_name, invocation_id)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn list_invocations(
        &self,
        project_name: &str,
        version_ref: &VersionReference,
        function_name: &str,
        max_results: Option<u32>,
        initial_offset: Option<&str>,
        status: Option<InvocationStatus>,
        parent_invocation: Option<&ParentInvocationDefinition>,
    ) -> Result<InvocationsListForFunction, ApiError> {
        let version_id =
            resolve_version_reference(&self.store, project_name, version_ref).await?;

        let sanitised_max_results = sanitise_max_results(max_results);

        self.store
            .invocations
            .list_for_function(
                project_name,
                &version_id,
                function_name,
                sanitised_max_results,
                initial_offset,
                status,
                parent_invocation,
            )
            .await
    }
}

fn sanitise_max_results(max_results: Option<u32>) -> u32 {
    match max_results {
        Some(requested) if requested < MAX_LIST_RESULTS => requested,
        _ => MAX_LIST_RESULTS,
    }
}

/// Parse the pair of parent query parameters. Both or neither must be given.
pub fn parse_parent_invocation(
    parent_function_name: Option<String>,
    parent_invocation_id: Option<String>,
) -> Result<Option<ParentInvocationDefinition>, ApiError> {
    match (parent_function_name, parent_invocation_id) {
        (Some(function_name), Some(invocation_id)) => Ok(Some(ParentInvocationDefinition {
            function_name,
            invocation_id,
        })),
        (None, Some(_)) => Err(ApiError::ParentFunctionNameIsMissing),
        (Some(_), None) => Err(ApiError::ParentInvocationIdIsMissing),
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_sizes_are_capped_at_50() {
        assert_eq!(sanitise_max_results(None), 50);
        assert_eq!(sanitise_max_results(Some(10)), 10);
        assert_eq!(sanitise_max_results(Some(50)), 50);
        assert_eq!(sanitise_max_results(Some(500)), 50);
        assert_eq!(sanitise_max_results(Some(0)), 0);
    }

    #[test]
    fn parent_parameters_must_come_in_pairs() {
        assert!(parse_parent_invocation(None, None).unwrap().is_none());

        let parent = parse_parent_invocation(Some("f".to_string()), Some("inv-1".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(parent.function_name, "f");
        assert_eq!(parent.invocation_id, "inv-1");

        assert!(matches!(
            parse_parent_invocation(None, Some("inv-1".to_string())),
            Err(ApiError::ParentFunctionNameIsMissing)
        ));
        assert!(matches!(
            parse_parent_invocation(Some("f".to_string()), None),
            Err(ApiError::ParentInvocationIdIsMissing)
        ));
    }
}
