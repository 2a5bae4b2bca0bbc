//! Shared scenario fixtures: one project with three functions exercising the
//! interesting corners of the scheduling policy.

use std::sync::Arc;

use control_plane::api::ApiHandler;
use control_plane::common::{
    ExecutionSpec, FunctionSpec, InvocationDefinition, InvocationInfo,
    ParentInvocationDefinition, ResourceSpec, VersionDefinition, VersionReference,
};
use control_plane::data::DataStore;
use control_plane::reconciler::Reconciler;

use super::harness;
use super::provisioner::FakeProvisioner;

pub const PROJECT: &str = "project";
pub const LATEST: VersionReference = VersionReference::Latest;

/// max_concurrency = 100, max_retries = 0
pub const STANDARD_FUNCTION: &str = "standard-function";
/// max_concurrency = 1, max_retries = 0
pub const CONCURRENCY_LIMITED_FUNCTION: &str = "concurrency-limited-function";
/// max_concurrency = 100, max_retries = 5
pub const RETRYABLE_FUNCTION: &str = "retryable-function";

pub const TIMEOUT_SECONDS: u32 = 30;

fn function_spec(function_name: &str, max_concurrency: u32, max_retries: u32) -> FunctionSpec {
    FunctionSpec {
        function_name: function_name.to_string(),
        docker_image_override: None,
        resource_spec: ResourceSpec {
            virtual_cpus: 1.0,
            memory_gbs: 4.0,
            max_concurrency,
        },
        execution_spec: ExecutionSpec {
            max_retries,
            timeout_seconds: TIMEOUT_SECONDS,
        },
    }
}

pub fn version_definition() -> VersionDefinition {
    VersionDefinition {
        default_docker_image: "docker:latest".to_string(),
        functions: vec![
            function_spec(STANDARD_FUNCTION, 100, 0),
            function_spec(CONCURRENCY_LIMITED_FUNCTION, 1, 0),
            function_spec(RETRYABLE_FUNCTION, 100, 5),
        ],
    }
}

/// Everything an end-to-end scenario needs, sharing one store and one
/// scripted provisioner.
pub struct TestContext {
    pub store: DataStore,
    pub provisioner: Arc<FakeProvisioner>,
    pub api: ApiHandler,
    pub reconciler: Reconciler,
}

pub async fn setup() -> TestContext {
    let store = harness::setup_data_store().await;
    let provisioner = Arc::new(FakeProvisioner::new());

    let api = ApiHandler::new(store.clone(), provisioner.clone());
    let reconciler = Reconciler::new(store.clone(), provisioner.clone());

    TestContext {
        store,
        provisioner,
        api,
        reconciler,
    }
}

impl TestContext {
    /// Register the fixture project and version at the given time.
    pub async fn register_project(&self, time: i64) {
        self.api
            .registration
            .create_project(PROJECT, time)
            .await
            .expect("create project");
        self.api
            .registration
            .create_project_version(PROJECT, &version_definition(), time)
            .await
            .expect("create version");
    }

    pub async fn create_invocation(
        &self,
        function_name: &str,
        input: &str,
        parent: Option<ParentInvocationDefinition>,
        time: i64,
    ) -> InvocationInfo {
        self.api
            .invocation
            .create_invocation(
                PROJECT,
                &LATEST,
                function_name,
                &InvocationDefinition {
                    parent_invocation: parent,
                    input: input.to_string(),
                },
                time,
            )
            .await
            .expect("create invocation")
    }

    pub async fn get_invocation(
        &self,
        function_name: &str,
        invocation_id: &str,
    ) -> InvocationInfo {
        self.api
            .invocation
            .get_invocation(PROJECT, &LATEST, function_name, invocation_id)
            .await
            .expect("get invocation")
    }

    /// Tick the reconciler at `time` until `predicate` holds for the named
    /// invocation, failing the test after a bounded number of ticks.
    pub async fn drive_until(
        &self,
        function_name: &str,
        invocation_id: &str,
        time: i64,
        predicate: impl Fn(&InvocationInfo) -> bool,
    ) -> InvocationInfo {
        for _ in 0..20 {
            let invocation = self.get_invocation(function_name, invocation_id).await;
            if predicate(&invocation) {
                return invocation;
            }
            self.reconciler.run_once(time).await;
        }

        let invocation = self.get_invocation(function_name, invocation_id).await;
        assert!(
            predicate(&invocation),
            "invocation {invocation_id} did not reach the expected state: {invocation:?}"
        );
        invocation
    }
}
