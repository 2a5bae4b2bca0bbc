//! End-to-end lifecycle scenarios: API handlers and the reconciler running
//! against a real store, with worker behaviour scripted through the fake
//! provisioner.

mod common;

use common::fixtures::{
    CONCURRENCY_LIMITED_FUNCTION, LATEST, PROJECT, RETRYABLE_FUNCTION, STANDARD_FUNCTION,
    TIMEOUT_SECONDS,
};
use control_plane::common::{
    ApiError, ExecutionFinalResultPayload, ExecutionOutcome, ExecutionSummary,
    ExecutionTemporaryResultPayload, InvocationInfo, InvocationStatus,
    ParentInvocationDefinition, WorkerStatus,
};

const TIME: i64 = 0;

fn running_execution(invocation: &InvocationInfo) -> &ExecutionSummary {
    invocation
        .executions
        .iter()
        .find(|execution| execution.worker_status == WorkerStatus::Running)
        .expect("no running execution")
}

fn has_running_execution(invocation: &InvocationInfo) -> bool {
    invocation
        .executions
        .iter()
        .any(|execution| execution.worker_status == WorkerStatus::Running)
}

fn is_terminated(invocation: &InvocationInfo) -> bool {
    invocation.invocation_status == InvocationStatus::Terminated
}

async fn finish_execution(
    ctx: &common::fixtures::TestContext,
    function_name: &str,
    invocation_id: &str,
    execution_id: &str,
    outcome: ExecutionOutcome,
    output: Option<&str>,
    error_message: Option<&str>,
    time: i64,
) {
    ctx.api
        .execution
        .set_final_execution_result(
            PROJECT,
            &LATEST,
            function_name,
            invocation_id,
            execution_id,
            &ExecutionFinalResultPayload {
                outcome,
                final_output: output.map(str::to_string),
                error_message: error_message.map(str::to_string),
            },
            time,
        )
        .await
        .expect("finish execution");
}

// ----------------------------------------------------------------------------
// S1: happy path and failure path, in parallel
// ----------------------------------------------------------------------------

#[tokio::test]
async fn two_parallel_invocations_one_succeeding_one_failing() {
    let ctx = common::fixtures::setup().await;
    ctx.register_project(TIME).await;

    let invocation_1 = ctx
        .create_invocation(STANDARD_FUNCTION, "input-1", None, TIME)
        .await;
    let invocation_2 = ctx
        .create_invocation(STANDARD_FUNCTION, "input-2", None, TIME)
        .await;

    let invocation_1 = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &invocation_1.invocation_id,
            TIME,
            has_running_execution,
        )
        .await;
    let invocation_2 = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &invocation_2.invocation_id,
            TIME,
            has_running_execution,
        )
        .await;

    // Worker 1: starts, uploads a progress update, then succeeds.
    let execution_1 = running_execution(&invocation_1).clone();
    ctx.api
        .execution
        .mark_execution_as_started(
            PROJECT,
            &LATEST,
            STANDARD_FUNCTION,
            &invocation_1.invocation_id,
            &execution_1.execution_id,
            TIME,
        )
        .await
        .unwrap();
    ctx.api
        .execution
        .upload_temporary_execution_result(
            PROJECT,
            &LATEST,
            STANDARD_FUNCTION,
            &invocation_1.invocation_id,
            &execution_1.execution_id,
            &ExecutionTemporaryResultPayload {
                latest_output: Some("temp-output".to_string()),
            },
            TIME,
        )
        .await
        .unwrap();
    finish_execution(
        &ctx,
        STANDARD_FUNCTION,
        &invocation_1.invocation_id,
        &execution_1.execution_id,
        ExecutionOutcome::Succeeded,
        Some("final-output"),
        None,
        TIME,
    )
    .await;

    // Worker 2: starts, then fails.
    let execution_2 = running_execution(&invocation_2).clone();
    ctx.api
        .execution
        .mark_execution_as_started(
            PROJECT,
            &LATEST,
            STANDARD_FUNCTION,
            &invocation_2.invocation_id,
            &execution_2.execution_id,
            TIME,
        )
        .await
        .unwrap();
    finish_execution(
        &ctx,
        STANDARD_FUNCTION,
        &invocation_2.invocation_id,
        &execution_2.execution_id,
        ExecutionOutcome::Failed,
        None,
        Some("error"),
        TIME,
    )
    .await;

    // Both workers shut down.
    ctx.provisioner
        .mock_worker_termination(execution_1.worker_details.as_ref().unwrap());
    ctx.provisioner
        .mock_worker_termination(execution_2.worker_details.as_ref().unwrap());

    let invocation_1 = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &invocation_1.invocation_id,
            TIME,
            is_terminated,
        )
        .await;
    let invocation_2 = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &invocation_2.invocation_id,
            TIME,
            is_terminated,
        )
        .await;

    assert_eq!(invocation_1.executions.len(), 1);
    let finished_1 = &invocation_1.executions[0];
    assert_eq!(finished_1.outcome, Some(ExecutionOutcome::Succeeded));
    assert_eq!(finished_1.output.as_deref(), Some("final-output"));
    assert!(finished_1.execution_finish_time.is_some());

    // max_retries = 0: the failed invocation terminates with no retry.
    assert_eq!(invocation_2.executions.len(), 1);
    let finished_2 = &invocation_2.executions[0];
    assert_eq!(finished_2.outcome, Some(ExecutionOutcome::Failed));
    assert_eq!(finished_2.error_message.as_deref(), Some("error"));
}

// ----------------------------------------------------------------------------
// S2: parent/child cancellation propagation
// ----------------------------------------------------------------------------

#[tokio::test]
async fn cancelling_a_parent_cancels_its_child() {
    let ctx = common::fixtures::setup().await;
    ctx.register_project(TIME).await;

    let parent = ctx
        .create_invocation(STANDARD_FUNCTION, "parent-input", None, TIME)
        .await;
    let child = ctx
        .create_invocation(
            STANDARD_FUNCTION,
            "child-input",
            Some(ParentInvocationDefinition {
                function_name: STANDARD_FUNCTION.to_string(),
                invocation_id: parent.invocation_id.clone(),
            }),
            TIME + 1,
        )
        .await;

    let parent = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &parent.invocation_id,
            TIME + 2,
            has_running_execution,
        )
        .await;
    let child = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &child.invocation_id,
            TIME + 2,
            has_running_execution,
        )
        .await;

    ctx.api
        .invocation
        .cancel_invocation(
            PROJECT,
            &LATEST,
            STANDARD_FUNCTION,
            &parent.invocation_id,
            TIME + 3,
        )
        .await
        .unwrap();

    // Propagation and signalling happen over the following ticks.
    ctx.reconciler.run_once(TIME + 4).await;
    ctx.reconciler.run_once(TIME + 5).await;

    let parent_worker = running_execution(&parent).worker_details.clone().unwrap();
    let child_worker = running_execution(&child).worker_details.clone().unwrap();
    assert!(ctx
        .provisioner
        .worker_has_received_termination_signal(&parent_worker));
    assert!(ctx
        .provisioner
        .worker_has_received_termination_signal(&child_worker));

    ctx.provisioner.mock_worker_termination(&parent_worker);
    ctx.provisioner.mock_worker_termination(&child_worker);

    let parent = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &parent.invocation_id,
            TIME + 6,
            is_terminated,
        )
        .await;
    let child = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &child.invocation_id,
            TIME + 6,
            is_terminated,
        )
        .await;

    // The parent was cancelled by the caller, the child one tick later.
    let parent_cancelled_at = parent.cancellation_request_time.unwrap();
    let child_cancelled_at = child.cancellation_request_time.unwrap();
    assert!(parent_cancelled_at < child_cancelled_at);
}

// ----------------------------------------------------------------------------
// S3: invocation timeout while running
// ----------------------------------------------------------------------------

#[tokio::test]
async fn running_invocation_times_out_and_terminates() {
    let ctx = common::fixtures::setup().await;
    ctx.register_project(TIME).await;

    let invocation = ctx
        .create_invocation(STANDARD_FUNCTION, "input", None, TIME)
        .await;
    let invocation = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &invocation.invocation_id,
            TIME,
            has_running_execution,
        )
        .await;

    let execution = running_execution(&invocation).clone();
    ctx.api
        .execution
        .mark_execution_as_started(
            PROJECT,
            &LATEST,
            STANDARD_FUNCTION,
            &invocation.invocation_id,
            &execution.execution_id,
            TIME,
        )
        .await
        .unwrap();

    // Within the budget: no signal.
    ctx.reconciler.run_once(TIME + i64::from(TIMEOUT_SECONDS)).await;
    let worker = execution.worker_details.clone().unwrap();
    assert!(!ctx.provisioner.worker_has_received_termination_signal(&worker));

    // Strictly past the budget: signal goes out and the stamp is recorded.
    let past_deadline = TIME + i64::from(TIMEOUT_SECONDS) + 1;
    ctx.reconciler.run_once(past_deadline).await;
    assert!(ctx.provisioner.worker_has_received_termination_signal(&worker));

    let invocation = ctx
        .get_invocation(STANDARD_FUNCTION, &invocation.invocation_id)
        .await;
    assert_eq!(
        invocation.executions[0].termination_signal_time,
        Some(past_deadline)
    );

    // The worker obeys the signal; the invocation then terminates.
    ctx.provisioner.mock_worker_termination(&worker);
    let invocation = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &invocation.invocation_id,
            past_deadline + 1,
            is_terminated,
        )
        .await;

    assert_eq!(invocation.executions.len(), 1);
}

// ----------------------------------------------------------------------------
// S4: concurrency-limited queueing, then cancellation while queued
// ----------------------------------------------------------------------------

#[tokio::test]
async fn queued_invocation_can_be_cancelled_without_ever_running() {
    let ctx = common::fixtures::setup().await;
    ctx.register_project(TIME).await;

    let first = ctx
        .create_invocation(CONCURRENCY_LIMITED_FUNCTION, "input-1", None, TIME)
        .await;
    let first = ctx
        .drive_until(
            CONCURRENCY_LIMITED_FUNCTION,
            &first.invocation_id,
            TIME,
            has_running_execution,
        )
        .await;

    let second = ctx
        .create_invocation(CONCURRENCY_LIMITED_FUNCTION, "input-2", None, TIME)
        .await;

    // max_concurrency = 1: the second invocation stays execution-less.
    for _ in 0..5 {
        ctx.reconciler.run_once(TIME).await;
    }
    let second_snapshot = ctx
        .get_invocation(CONCURRENCY_LIMITED_FUNCTION, &second.invocation_id)
        .await;
    assert!(second_snapshot.executions.is_empty());

    ctx.api
        .invocation
        .cancel_invocation(
            PROJECT,
            &LATEST,
            CONCURRENCY_LIMITED_FUNCTION,
            &second.invocation_id,
            TIME + 1,
        )
        .await
        .unwrap();

    let second = ctx
        .drive_until(
            CONCURRENCY_LIMITED_FUNCTION,
            &second.invocation_id,
            TIME + 2,
            is_terminated,
        )
        .await;
    assert!(second.executions.is_empty());

    // The admitted invocation is untouched.
    let first = ctx
        .get_invocation(CONCURRENCY_LIMITED_FUNCTION, &first.invocation_id)
        .await;
    assert_eq!(first.invocation_status, InvocationStatus::Running);
    assert!(has_running_execution(&first));
}

// ----------------------------------------------------------------------------
// S5: retry after a failed attempt
// ----------------------------------------------------------------------------

#[tokio::test]
async fn failed_attempt_is_retried_and_then_succeeds() {
    let ctx = common::fixtures::setup().await;
    ctx.register_project(TIME).await;

    let invocation = ctx
        .create_invocation(RETRYABLE_FUNCTION, "input", None, TIME)
        .await;
    let invocation = ctx
        .drive_until(
            RETRYABLE_FUNCTION,
            &invocation.invocation_id,
            TIME,
            has_running_execution,
        )
        .await;

    // Attempt #1 fails.
    let first_attempt = running_execution(&invocation).clone();
    ctx.api
        .execution
        .mark_execution_as_started(
            PROJECT,
            &LATEST,
            RETRYABLE_FUNCTION,
            &invocation.invocation_id,
            &first_attempt.execution_id,
            TIME,
        )
        .await
        .unwrap();
    finish_execution(
        &ctx,
        RETRYABLE_FUNCTION,
        &invocation.invocation_id,
        &first_attempt.execution_id,
        ExecutionOutcome::Failed,
        None,
        Some("error"),
        TIME,
    )
    .await;
    ctx.provisioner
        .mock_worker_termination(first_attempt.worker_details.as_ref().unwrap());

    // A second attempt appears.
    let invocation = ctx
        .drive_until(
            RETRYABLE_FUNCTION,
            &invocation.invocation_id,
            TIME + 1,
            |invocation| invocation.executions.len() == 2 && has_running_execution(invocation),
        )
        .await;

    // Attempt #2 succeeds.
    let second_attempt = running_execution(&invocation).clone();
    assert_ne!(second_attempt.execution_id, first_attempt.execution_id);
    ctx.api
        .execution
        .mark_execution_as_started(
            PROJECT,
            &LATEST,
            RETRYABLE_FUNCTION,
            &invocation.invocation_id,
            &second_attempt.execution_id,
            TIME + 1,
        )
        .await
        .unwrap();
    finish_execution(
        &ctx,
        RETRYABLE_FUNCTION,
        &invocation.invocation_id,
        &second_attempt.execution_id,
        ExecutionOutcome::Succeeded,
        Some("final-output"),
        None,
        TIME + 1,
    )
    .await;
    ctx.provisioner
        .mock_worker_termination(second_attempt.worker_details.as_ref().unwrap());

    let invocation = ctx
        .drive_until(
            RETRYABLE_FUNCTION,
            &invocation.invocation_id,
            TIME + 2,
            is_terminated,
        )
        .await;

    assert_eq!(invocation.executions.len(), 2);
    let outcomes: Vec<Option<ExecutionOutcome>> = invocation
        .executions
        .iter()
        .map(|execution| execution.outcome)
        .collect();
    assert!(outcomes.contains(&Some(ExecutionOutcome::Failed)));
    assert!(outcomes.contains(&Some(ExecutionOutcome::Succeeded)));
}

// ----------------------------------------------------------------------------
// S6: retry after a hardware failure (no outcome recorded)
// ----------------------------------------------------------------------------

#[tokio::test]
async fn hardware_failure_is_retried_and_then_succeeds() {
    let ctx = common::fixtures::setup().await;
    ctx.register_project(TIME).await;

    let invocation = ctx
        .create_invocation(RETRYABLE_FUNCTION, "input", None, TIME)
        .await;
    let invocation = ctx
        .drive_until(
            RETRYABLE_FUNCTION,
            &invocation.invocation_id,
            TIME,
            has_running_execution,
        )
        .await;

    // The first worker dies without ever reporting anything.
    let first_attempt = running_execution(&invocation).clone();
    ctx.provisioner
        .mock_worker_termination(first_attempt.worker_details.as_ref().unwrap());

    let invocation = ctx
        .drive_until(
            RETRYABLE_FUNCTION,
            &invocation.invocation_id,
            TIME + 1,
            |invocation| invocation.executions.len() == 2 && has_running_execution(invocation),
        )
        .await;

    let second_attempt = running_execution(&invocation).clone();
    ctx.api
        .execution
        .mark_execution_as_started(
            PROJECT,
            &LATEST,
            RETRYABLE_FUNCTION,
            &invocation.invocation_id,
            &second_attempt.execution_id,
            TIME + 1,
        )
        .await
        .unwrap();
    finish_execution(
        &ctx,
        RETRYABLE_FUNCTION,
        &invocation.invocation_id,
        &second_attempt.execution_id,
        ExecutionOutcome::Succeeded,
        Some("final-output"),
        None,
        TIME + 1,
    )
    .await;
    ctx.provisioner
        .mock_worker_termination(second_attempt.worker_details.as_ref().unwrap());

    let invocation = ctx
        .drive_until(
            RETRYABLE_FUNCTION,
            &invocation.invocation_id,
            TIME + 2,
            is_terminated,
        )
        .await;

    assert_eq!(invocation.executions.len(), 2);

    let first = invocation
        .executions
        .iter()
        .find(|execution| execution.execution_id == first_attempt.execution_id)
        .unwrap();
    assert_eq!(first.outcome, None);
    assert_eq!(first.worker_status, WorkerStatus::Terminated);
    assert!(first.execution_finish_time.is_some());

    let second = invocation
        .executions
        .iter()
        .find(|execution| execution.execution_id == second_attempt.execution_id)
        .unwrap();
    assert_eq!(second.outcome, Some(ExecutionOutcome::Succeeded));
}

// ----------------------------------------------------------------------------
// Idempotence
// ----------------------------------------------------------------------------

#[tokio::test]
async fn run_once_is_idempotent_at_steady_state() {
    let ctx = common::fixtures::setup().await;
    ctx.register_project(TIME).await;

    let invocation = ctx
        .create_invocation(STANDARD_FUNCTION, "input", None, TIME)
        .await;
    let invocation = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &invocation.invocation_id,
            TIME,
            has_running_execution,
        )
        .await;

    let before = serde_json::to_value(&invocation).unwrap();

    ctx.reconciler.run_once(TIME).await;
    ctx.reconciler.run_once(TIME).await;

    let after = serde_json::to_value(
        ctx.get_invocation(STANDARD_FUNCTION, &invocation.invocation_id)
            .await,
    )
    .unwrap();

    assert_eq!(before, after);
}

#[tokio::test]
async fn cancelling_twice_keeps_the_first_stamp() {
    let ctx = common::fixtures::setup().await;
    ctx.register_project(TIME).await;

    let invocation = ctx
        .create_invocation(STANDARD_FUNCTION, "input", None, TIME)
        .await;

    ctx.api
        .invocation
        .cancel_invocation(
            PROJECT,
            &LATEST,
            STANDARD_FUNCTION,
            &invocation.invocation_id,
            TIME + 5,
        )
        .await
        .unwrap();
    let second = ctx
        .api
        .invocation
        .cancel_invocation(
            PROJECT,
            &LATEST,
            STANDARD_FUNCTION,
            &invocation.invocation_id,
            TIME + 9,
        )
        .await
        .unwrap();

    assert_eq!(second.cancellation_request_time, Some(TIME + 5));
}

// ----------------------------------------------------------------------------
// Project deletion
// ----------------------------------------------------------------------------

#[tokio::test]
async fn deletion_request_drains_and_garbage_collects_the_project() {
    let ctx = common::fixtures::setup().await;
    ctx.register_project(TIME).await;

    let invocation = ctx
        .create_invocation(STANDARD_FUNCTION, "input", None, TIME)
        .await;
    let invocation = ctx
        .drive_until(
            STANDARD_FUNCTION,
            &invocation.invocation_id,
            TIME,
            has_running_execution,
        )
        .await;

    ctx.api
        .registration
        .request_project_deletion(PROJECT, TIME + 1)
        .await
        .unwrap();

    // New invocations are refused while the project is draining.
    let refused = ctx
        .api
        .invocation
        .create_invocation(
            PROJECT,
            &LATEST,
            STANDARD_FUNCTION,
            &control_plane::common::InvocationDefinition {
                parent_invocation: None,
                input: "late".to_string(),
            },
            TIME + 2,
        )
        .await;
    assert!(matches!(refused, Err(ApiError::ProjectIsBeingDeleted)));

    // The running invocation gets cancelled and signalled.
    ctx.reconciler.run_once(TIME + 3).await;
    ctx.reconciler.run_once(TIME + 4).await;

    let worker = running_execution(&invocation).worker_details.clone().unwrap();
    assert!(ctx.provisioner.worker_has_received_termination_signal(&worker));
    ctx.provisioner.mock_worker_termination(&worker);

    // Drain, terminate, then garbage-collect.
    for tick in 5..15 {
        ctx.reconciler.run_once(TIME + tick).await;
        if ctx.api.registration.get_project(PROJECT).await.is_err() {
            break;
        }
    }

    assert!(matches!(
        ctx.api.registration.get_project(PROJECT).await,
        Err(ApiError::ProjectDoesNotExist)
    ));
    assert!(matches!(
        ctx.api
            .invocation
            .get_invocation(
                PROJECT,
                &LATEST,
                STANDARD_FUNCTION,
                &invocation.invocation_id
            )
            .await,
        Err(ApiError::ProjectDoesNotExist)
    ));
}

// ----------------------------------------------------------------------------
// Provisioning failure recovery
// ----------------------------------------------------------------------------

#[tokio::test]
async fn failed_provisioning_counts_as_an_attempt_and_retries() {
    use std::sync::Arc;

    use common::provisioner::FakeProvisioner;
    use control_plane::api::ApiHandler;
    use control_plane::reconciler::Reconciler;

    let store = common::harness::setup_data_store().await;
    let provisioner = Arc::new(FakeProvisioner::failing());
    let api = ApiHandler::new(store.clone(), provisioner.clone());
    let reconciler = Reconciler::new(store.clone(), provisioner.clone());

    api.registration.create_project(PROJECT, TIME).await.unwrap();
    api.registration
        .create_project_version(PROJECT, &common::fixtures::version_definition(), TIME)
        .await
        .unwrap();

    let invocation = api
        .invocation
        .create_invocation(
            PROJECT,
            &LATEST,
            STANDARD_FUNCTION,
            &control_plane::common::InvocationDefinition {
                parent_invocation: None,
                input: "input".to_string(),
            },
            TIME,
        )
        .await
        .unwrap();

    // Tick 1: execution created, provisioning fails, sweep terminates it.
    reconciler.run_once(TIME).await;
    reconciler.run_once(TIME + 1).await;

    let snapshot = api
        .invocation
        .get_invocation(PROJECT, &LATEST, STANDARD_FUNCTION, &invocation.invocation_id)
        .await
        .unwrap();

    // Every attempt so far was terminated by the sweep, outcome-less, and the
    // invocation keeps retrying (max_retries = 0 means one attempt: after the
    // first sweep the invocation terminates).
    assert!(snapshot
        .executions
        .iter()
        .all(|execution| execution.worker_status == WorkerStatus::Terminated
            && execution.outcome.is_none()));

    let final_snapshot = {
        let mut current = snapshot;
        for tick in 2..10 {
            if is_terminated(&current) {
                break;
            }
            reconciler.run_once(TIME + tick).await;
            current = api
                .invocation
                .get_invocation(
                    PROJECT,
                    &LATEST,
                    STANDARD_FUNCTION,
                    &invocation.invocation_id,
                )
                .await
                .unwrap();
        }
        current
    };

    assert!(is_terminated(&final_snapshot));
    assert_eq!(final_snapshot.executions.len(), 1);
}
