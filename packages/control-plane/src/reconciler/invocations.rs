//! Invocation passes: cancellation propagation, then scheduling/termination.
//!
//! Both classifiers are pure over their snapshots so they can be unit-tested
//! without a store or provisioner.

use std::collections::{HashMap, HashSet};

use tracing::{error, info};

use crate::common::{
    generate_random_id, ApiError, ExecutionOutcome, FunctionInfo, FunctionStatus, InvocationInfo,
    InvocationStatus, ProjectInfo, WorkerStatus,
};
use crate::data::DataStore;

/// Hashable identity of a function across all projects and versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FunctionKey {
    project_name: String,
    version_id: String,
    function_name: String,
}

impl FunctionKey {
    fn of_function(function: &FunctionInfo) -> Self {
        Self {
            project_name: function.project_name.clone(),
            version_id: function.version_id.clone(),
            function_name: function.function_name.clone(),
        }
    }

    fn of_invocation(invocation: &InvocationInfo) -> Self {
        Self {
            project_name: invocation.project_name.clone(),
            version_id: invocation.version_id.clone(),
            function_name: invocation.function_name.clone(),
        }
    }
}

/// Hashable identity of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct InvocationKey {
    project_name: String,
    version_id: String,
    function_name: String,
    invocation_id: String,
}

impl InvocationKey {
    fn of_invocation(invocation: &InvocationInfo) -> Self {
        Self {
            project_name: invocation.project_name.clone(),
            version_id: invocation.version_id.clone(),
            function_name: invocation.function_name.clone(),
            invocation_id: invocation.invocation_id.clone(),
        }
    }

    fn of_parent(invocation: &InvocationInfo) -> Option<Self> {
        invocation.parent_invocation.as_ref().map(|parent| Self {
            project_name: invocation.project_name.clone(),
            version_id: invocation.version_id.clone(),
            function_name: parent.function_name.clone(),
            invocation_id: parent.invocation_id.clone(),
        })
    }
}

// ============================================================================
// Cancellation propagation
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct CancellationRequestsClassification {
    pub to_set_cancellation_requested: Vec<InvocationInfo>,
    pub to_leave_untouched: Vec<InvocationInfo>,
}

/// Decide which RUNNING invocations must have a cancellation request stamped:
/// those of projects marked for deletion, and children of cancelled parents.
///
/// Invocations are visited in creation order so a grandparent cancelled this
/// pass propagates through parent to grandchild within a single tick.
pub(crate) fn classify_invocations_for_cancellation_requests(
    invocations: Vec<InvocationInfo>,
    projects: &[ProjectInfo],
) -> CancellationRequestsClassification {
    let deleting_projects: HashSet<&str> = projects
        .iter()
        .filter(|project| project.deletion_requested())
        .map(|project| project.project_name.as_str())
        .collect();

    let mut sorted_invocations = invocations;
    sorted_invocations.sort_by(|a, b| {
        a.creation_time
            .cmp(&b.creation_time)
            .then_with(|| a.invocation_id.cmp(&b.invocation_id))
    });

    let mut cancelled_this_pass: HashSet<InvocationKey> = HashSet::new();
    let mut classification = CancellationRequestsClassification::default();

    for invocation in sorted_invocations {
        if invocation.cancellation_requested() {
            classification.to_leave_untouched.push(invocation);
        } else if deleting_projects.contains(invocation.project_name.as_str()) {
            cancelled_this_pass.insert(InvocationKey::of_invocation(&invocation));
            classification.to_set_cancellation_requested.push(invocation);
        } else if has_cancelled_parent(&invocation, &cancelled_this_pass) {
            cancelled_this_pass.insert(InvocationKey::of_invocation(&invocation));
            classification.to_set_cancellation_requested.push(invocation);
        } else {
            classification.to_leave_untouched.push(invocation);
        }
    }

    classification
}

fn has_cancelled_parent(
    invocation: &InvocationInfo,
    cancelled_this_pass: &HashSet<InvocationKey>,
) -> bool {
    let Some(parent) = &invocation.parent_invocation else {
        return false;
    };

    let cancelled_in_previous_pass = parent.cancellation_request_time.is_some();
    let cancelled_in_this_pass = InvocationKey::of_parent(invocation)
        .is_some_and(|key| cancelled_this_pass.contains(&key));

    cancelled_in_previous_pass || cancelled_in_this_pass
}

pub(crate) async fn propagate_cancellation_requests(
    store: &DataStore,
    time: i64,
) -> Result<(), ApiError> {
    let running_invocations = store
        .invocations
        .list_all(&[InvocationStatus::Running])
        .await?;
    let projects = store.projects.list().await?.projects;

    let classification =
        classify_invocations_for_cancellation_requests(running_invocations, &projects);

    for invocation in classification.to_set_cancellation_requested {
        let update = store
            .invocations
            .update(
                &invocation.project_name,
                &invocation.version_id,
                &invocation.function_name,
                &invocation.invocation_id,
                time,
                true,
                None,
            )
            .await;

        match update {
            Ok(()) => info!(
                project_name = %invocation.project_name,
                invocation_id = %invocation.invocation_id,
                "cancellation request propagated"
            ),
            Err(err) => error!(
                project_name = %invocation.project_name,
                invocation_id = %invocation.invocation_id,
                error = %err,
                "failed to propagate cancellation request"
            ),
        }
    }

    Ok(())
}

// ============================================================================
// Scheduling and termination
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct RunningInvocationsClassification {
    pub to_terminate: Vec<InvocationInfo>,
    pub to_create_executions_for: Vec<InvocationInfo>,
    pub to_leave_untouched: Vec<InvocationInfo>,
}

/// Decide, for every RUNNING invocation with no work in flight, whether it
/// should terminate, receive a fresh execution, or wait.
///
/// Admission control happens here and only here: the capacity map starts at
/// each READY function's `max_concurrency` and is decremented by invocations
/// already holding a live execution, then by each create decision in turn.
pub(crate) fn classify_running_invocations(
    running_invocations: Vec<InvocationInfo>,
    ready_functions: &[FunctionInfo],
    time: i64,
) -> RunningInvocationsClassification {
    let mut remaining_capacity: HashMap<FunctionKey, i64> = ready_functions
        .iter()
        .map(|function| {
            (
                FunctionKey::of_function(function),
                i64::from(function.resource_spec.max_concurrency),
            )
        })
        .collect();

    for invocation in &running_invocations {
        if has_live_execution(invocation) {
            if let Some(capacity) = remaining_capacity.get_mut(&FunctionKey::of_invocation(invocation)) {
                *capacity -= 1;
            }
        }
    }

    let mut classification = RunningInvocationsClassification::default();

    for invocation in running_invocations {
        let function_key = FunctionKey::of_invocation(&invocation);

        if !remaining_capacity.contains_key(&function_key) {
            // Function not READY yet; nothing can run.
            classification.to_leave_untouched.push(invocation);
        } else if has_live_execution(&invocation) {
            // Work in progress.
            classification.to_leave_untouched.push(invocation);
        } else if has_conclusive_outcome(&invocation) {
            classification.to_terminate.push(invocation);
        } else if invocation.cancellation_requested()
            || has_timed_out(&invocation, time)
            || has_exhausted_retries(&invocation)
        {
            classification.to_terminate.push(invocation);
        } else {
            match remaining_capacity.get_mut(&function_key) {
                Some(capacity) if *capacity >= 1 => {
                    *capacity -= 1;
                    classification.to_create_executions_for.push(invocation);
                }
                _ => classification.to_leave_untouched.push(invocation),
            }
        }
    }

    classification
}

fn has_live_execution(invocation: &InvocationInfo) -> bool {
    invocation
        .executions
        .iter()
        .any(|execution| execution.worker_status != WorkerStatus::Terminated)
}

fn has_conclusive_outcome(invocation: &InvocationInfo) -> bool {
    invocation.executions.iter().any(|execution| {
        matches!(
            execution.outcome,
            Some(ExecutionOutcome::Succeeded) | Some(ExecutionOutcome::Aborted)
        )
    })
}

fn has_timed_out(invocation: &InvocationInfo, time: i64) -> bool {
    let elapsed = time - invocation.creation_time;
    elapsed > i64::from(invocation.execution_spec.timeout_seconds)
}

fn has_exhausted_retries(invocation: &InvocationInfo) -> bool {
    // max_retries = N allows N + 1 attempts.
    let max_attempts = u64::from(invocation.execution_spec.max_retries) + 1;
    invocation.executions.len() as u64 >= max_attempts
}

pub(crate) async fn advance_running_invocations(
    store: &DataStore,
    time: i64,
) -> Result<(), ApiError> {
    let running_invocations = store
        .invocations
        .list_all(&[InvocationStatus::Running])
        .await?;
    let ready_functions = store.functions.list_all(&[FunctionStatus::Ready]).await?;

    let classification =
        classify_running_invocations(running_invocations, &ready_functions, time);

    for invocation in classification.to_create_executions_for {
        if let Err(err) = create_execution_for(store, &invocation, time).await {
            error!(
                project_name = %invocation.project_name,
                invocation_id = %invocation.invocation_id,
                error = %err,
                "failed to create execution"
            );
        }
    }

    for invocation in classification.to_terminate {
        let update = store
            .invocations
            .update(
                &invocation.project_name,
                &invocation.version_id,
                &invocation.function_name,
                &invocation.invocation_id,
                time,
                false,
                Some(InvocationStatus::Terminated),
            )
            .await;

        match update {
            Ok(()) => info!(
                project_name = %invocation.project_name,
                invocation_id = %invocation.invocation_id,
                "invocation terminated"
            ),
            Err(err) => error!(
                project_name = %invocation.project_name,
                invocation_id = %invocation.invocation_id,
                error = %err,
                "failed to terminate invocation"
            ),
        }
    }

    Ok(())
}

async fn create_execution_for(
    store: &DataStore,
    invocation: &InvocationInfo,
    time: i64,
) -> Result<(), ApiError> {
    // Bump last_update_time so the invocation reflects the new attempt.
    store
        .invocations
        .update(
            &invocation.project_name,
            &invocation.version_id,
            &invocation.function_name,
            &invocation.invocation_id,
            time,
            false,
            None,
        )
        .await?;

    let execution_id = generate_random_id("exe");

    store
        .executions
        .create(
            &invocation.project_name,
            &invocation.version_id,
            &invocation.function_name,
            &invocation.invocation_id,
            &execution_id,
            time,
        )
        .await?;

    info!(
        project_name = %invocation.project_name,
        invocation_id = %invocation.invocation_id,
        execution_id = %execution_id,
        "execution created"
    );

    Ok(())
}
