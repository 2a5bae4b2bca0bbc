//! Core datatypes persisted by the store and exposed through the API.
//!
//! Status enums are mapped to Postgres enum types; the polymorphic spec and
//! details objects are stored as JSONB and decoded with `#[sqlx(json)]`.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Specs
// ============================================================================

/// Resources allocated to each worker of a function, plus the admission limit
/// enforced by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub virtual_cpus: f64,
    pub memory_gbs: f64,
    pub max_concurrency: u32,
}

/// Retry and timeout policy for invocations of a function.
///
/// `max_retries = N` allows up to `N + 1` attempts. The timeout is measured
/// from invocation creation, not execution start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSpec {
    pub max_retries: u32,
    pub timeout_seconds: u32,
}

// ============================================================================
// Statuses and outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "function_status", rename_all = "snake_case")]
pub enum FunctionStatus {
    /// Waiting for the provisioner to prepare cloud-side resources.
    Pending,
    /// Prepared; workers can be provisioned for this function.
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "invocation_status", rename_all = "snake_case")]
pub enum InvocationStatus {
    Running,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "worker_status", rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Execution row exists but no worker has been requested yet.
    Pending,
    /// A provision request is in flight (or was interrupted by a crash).
    Provisioning,
    Running,
    Terminated,
}

/// Terminal classification of an execution. ABORTED means the worker shut
/// down gracefully in response to a termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "execution_outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded,
    Failed,
    Aborted,
}

// ============================================================================
// Provisioner-owned details
// ============================================================================

/// Which provisioner implementation produced a details object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerType {
    Dev,
    External,
}

/// Opaque handle to a provisioned worker, e.g. a task ARN plus a log-stream
/// identifier. The store persists it as JSONB without interpreting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerDetails {
    #[serde(rename = "type")]
    pub worker_type: WorkerType,
    pub identifier: String,
    pub logs_identifier: String,
}

/// Opaque per-function artifact returned by `prepare_function`, e.g. a task
/// definition identifier. Presented back when provisioning workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedFunctionDetails {
    #[serde(rename = "type")]
    pub worker_type: WorkerType,
    pub identifier: String,
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectInfo {
    pub project_name: String,
    /// Set once deletion has been requested; the reconciler garbage-collects
    /// the project when no invocation is still RUNNING.
    pub deletion_request_time: Option<i64>,
    pub creation_time: i64,
}

impl ProjectInfo {
    pub fn deletion_requested(&self) -> bool {
        self.deletion_request_time.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectsList {
    pub projects: Vec<ProjectInfo>,
}

// ============================================================================
// Versions and functions
// ============================================================================

/// Declaration of one function inside a version definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub function_name: String,
    /// Overrides the version's default image for this function only.
    pub docker_image_override: Option<String>,
    pub resource_spec: ResourceSpec,
    pub execution_spec: ExecutionSpec,
}

/// Payload supplied when registering a new project version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDefinition {
    pub default_docker_image: String,
    pub functions: Vec<FunctionSpec>,
}

impl VersionDefinition {
    /// Image a given function should run, honouring any override.
    pub fn docker_image_for<'a>(&'a self, function: &'a FunctionSpec) -> &'a str {
        function
            .docker_image_override
            .as_deref()
            .unwrap_or(&self.default_docker_image)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FunctionInfoForVersion {
    pub function_name: String,
    pub docker_image: String,
    #[sqlx(json)]
    pub resource_spec: ResourceSpec,
    #[sqlx(json)]
    pub execution_spec: ExecutionSpec,
    pub function_status: FunctionStatus,
    #[sqlx(json(nullable))]
    pub prepared_function_details: Option<PreparedFunctionDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub project_name: String,
    pub version_id: String,
    pub creation_time: i64,
    pub functions: Vec<FunctionInfoForVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VersionInfoForProject {
    pub version_id: String,
    pub creation_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsListForProject {
    pub project_name: String,
    pub versions: Vec<VersionInfoForProject>,
}

/// Fully-qualified view of one function, as returned by store scans.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FunctionInfo {
    pub project_name: String,
    pub version_id: String,
    pub function_name: String,
    pub docker_image: String,
    #[sqlx(json)]
    pub resource_spec: ResourceSpec,
    #[sqlx(json)]
    pub execution_spec: ExecutionSpec,
    pub function_status: FunctionStatus,
    #[sqlx(json(nullable))]
    pub prepared_function_details: Option<PreparedFunctionDetails>,
}

// ============================================================================
// Invocations
// ============================================================================

/// Reference to a parent invocation, scoped to the same project and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentInvocationDefinition {
    pub function_name: String,
    pub invocation_id: String,
}

/// Parent reference as embedded in invocation snapshots. Carries the parent's
/// persisted cancellation stamp so cancellation propagation can run over a
/// single scan without extra lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentInvocationInfo {
    pub function_name: String,
    pub invocation_id: String,
    pub cancellation_request_time: Option<i64>,
}

/// Payload supplied when creating an invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationDefinition {
    pub parent_invocation: Option<ParentInvocationDefinition>,
    pub input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationInfo {
    pub project_name: String,
    pub version_id: String,
    pub function_name: String,
    pub invocation_id: String,
    pub parent_invocation: Option<ParentInvocationInfo>,
    pub docker_image: String,
    pub resource_spec: ResourceSpec,
    pub execution_spec: ExecutionSpec,
    pub input: String,
    pub cancellation_request_time: Option<i64>,
    pub invocation_status: InvocationStatus,
    pub creation_time: i64,
    pub last_update_time: i64,
    pub executions: Vec<ExecutionSummary>,
}

impl InvocationInfo {
    pub fn cancellation_requested(&self) -> bool {
        self.cancellation_request_time.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationSummary {
    pub project_name: String,
    pub version_id: String,
    pub function_name: String,
    pub invocation_id: String,
    pub parent_invocation: Option<ParentInvocationDefinition>,
    pub cancellation_request_time: Option<i64>,
    pub invocation_status: InvocationStatus,
    pub creation_time: i64,
    pub last_update_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationsListForFunction {
    pub project_name: String,
    pub version_id: String,
    pub function_name: String,
    pub invocations: Vec<InvocationSummary>,
    pub next_offset: Option<String>,
}

// ============================================================================
// Executions
// ============================================================================

/// Execution as embedded in its owning invocation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub worker_status: WorkerStatus,
    #[sqlx(json(nullable))]
    pub worker_details: Option<WorkerDetails>,
    pub termination_signal_time: Option<i64>,
    pub outcome: Option<ExecutionOutcome>,
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub creation_time: i64,
    pub last_update_time: i64,
    pub execution_start_time: Option<i64>,
    pub execution_finish_time: Option<i64>,
}

/// Fully-qualified view of one execution, joined with the owning invocation
/// and function so the reconciler and the worker API have everything they
/// need in one snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionInfo {
    pub project_name: String,
    pub version_id: String,
    pub function_name: String,
    pub invocation_id: String,
    pub execution_id: String,
    pub input: String,
    pub cancellation_request_time: Option<i64>,
    pub invocation_creation_time: i64,
    pub docker_image: String,
    #[sqlx(json)]
    pub resource_spec: ResourceSpec,
    #[sqlx(json)]
    pub execution_spec: ExecutionSpec,
    #[sqlx(json(nullable))]
    pub prepared_function_details: Option<PreparedFunctionDetails>,
    pub worker_status: WorkerStatus,
    #[sqlx(json(nullable))]
    pub worker_details: Option<WorkerDetails>,
    pub termination_signal_time: Option<i64>,
    pub outcome: Option<ExecutionOutcome>,
    pub output: Option<String>,
    pub error_message: Option<String>,
    pub creation_time: i64,
    pub last_update_time: i64,
    pub execution_start_time: Option<i64>,
    pub execution_finish_time: Option<i64>,
}

impl ExecutionInfo {
    pub fn cancellation_requested(&self) -> bool {
        self.cancellation_request_time.is_some()
    }
}

/// Progress update uploaded by a worker while still running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTemporaryResultPayload {
    pub latest_output: Option<String>,
}

/// Final result uploaded by a worker exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionFinalResultPayload {
    pub outcome: ExecutionOutcome,
    pub final_output: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogs {
    pub project_name: String,
    pub version_id: String,
    pub function_name: String,
    pub invocation_id: String,
    pub execution_id: String,
    pub log_lines: Vec<String>,
    pub next_offset: Option<String>,
}

// ============================================================================
// Misc
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}
