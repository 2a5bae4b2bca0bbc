//! Execution passes: provisioning, worker liveness, termination signals and
//! the stuck-in-provisioning sweep.

use tracing::{error, info, warn};

use crate::common::{ApiError, ExecutionInfo, WorkerStatus};
use crate::data::{DataStore, ExecutionUpdate};
use crate::provisioning::Provisioner;

// ============================================================================
// Termination-signal classifier
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct TerminationSignalsClassification {
    pub to_signal: Vec<ExecutionInfo>,
    pub to_leave_untouched: Vec<ExecutionInfo>,
}

/// A RUNNING execution needs a termination signal when its invocation has
/// been cancelled or has exceeded its timeout budget, and no signal has been
/// sent before. The timeout is measured from invocation creation.
pub(crate) fn classify_running_executions_for_termination_signals(
    running_executions: Vec<ExecutionInfo>,
    time: i64,
) -> TerminationSignalsClassification {
    let mut classification = TerminationSignalsClassification::default();

    for execution in running_executions {
        if execution.termination_signal_time.is_some() {
            // Already signalled; nothing more to do.
            classification.to_leave_untouched.push(execution);
        } else if execution.cancellation_requested() || has_timed_out(&execution, time) {
            classification.to_signal.push(execution);
        } else {
            classification.to_leave_untouched.push(execution);
        }
    }

    classification
}

fn has_timed_out(execution: &ExecutionInfo, time: i64) -> bool {
    let elapsed = time - execution.invocation_creation_time;
    elapsed > i64::from(execution.execution_spec.timeout_seconds)
}

// ============================================================================
// Passes
// ============================================================================

/// Drive PENDING executions through PROVISIONING to RUNNING. The transition
/// to PROVISIONING is persisted before the provision call so that a crash in
/// between leaves a recoverable marker for the sweep.
pub(crate) async fn provision_pending_executions(
    store: &DataStore,
    provisioner: &dyn Provisioner,
    time: i64,
) -> Result<(), ApiError> {
    let pending_executions = store.executions.list_all(&[WorkerStatus::Pending]).await?;

    for execution in pending_executions {
        let Some(prepared_details) = &execution.prepared_function_details else {
            // Executions are only created for READY functions, so this means
            // the function row was mutated out from under us.
            error!(
                project_name = %execution.project_name,
                execution_id = %execution.execution_id,
                "pending execution has no prepared function details"
            );
            continue;
        };

        let marked = store
            .executions
            .update(
                &execution.project_name,
                &execution.version_id,
                &execution.function_name,
                &execution.invocation_id,
                &execution.execution_id,
                time,
                ExecutionUpdate {
                    new_worker_status: Some(WorkerStatus::Provisioning),
                    ..Default::default()
                },
            )
            .await;

        if let Err(err) = marked {
            error!(
                project_name = %execution.project_name,
                execution_id = %execution.execution_id,
                error = %err,
                "failed to mark execution as provisioning"
            );
            continue;
        }

        let worker_details = match provisioner
            .provision_worker(
                &execution.project_name,
                &execution.version_id,
                &execution.function_name,
                &execution.invocation_id,
                &execution.execution_id,
                &execution.resource_spec,
                prepared_details,
            )
            .await
        {
            Ok(details) => details,
            Err(err) => {
                // Stays in PROVISIONING; the sweep turns it into a failed
                // attempt eligible for retry.
                error!(
                    project_name = %execution.project_name,
                    execution_id = %execution.execution_id,
                    error = %err,
                    "failed to provision worker"
                );
                continue;
            }
        };

        let update = store
            .executions
            .update(
                &execution.project_name,
                &execution.version_id,
                &execution.function_name,
                &execution.invocation_id,
                &execution.execution_id,
                time,
                ExecutionUpdate {
                    new_worker_status: Some(WorkerStatus::Running),
                    new_worker_details: Some(worker_details),
                    ..Default::default()
                },
            )
            .await;

        match update {
            Ok(()) => info!(
                project_name = %execution.project_name,
                invocation_id = %execution.invocation_id,
                execution_id = %execution.execution_id,
                "worker provisioned"
            ),
            Err(err) => error!(
                project_name = %execution.project_name,
                execution_id = %execution.execution_id,
                error = %err,
                "failed to record provisioned worker"
            ),
        }
    }

    Ok(())
}

/// Poll the provisioner for every RUNNING worker and record terminations.
/// A worker that died without reporting an outcome is a hardware failure;
/// the attempt still gets its finish stamp so retry accounting works.
pub(crate) async fn poll_running_workers(
    store: &DataStore,
    provisioner: &dyn Provisioner,
    time: i64,
) -> Result<(), ApiError> {
    let running_executions = store.executions.list_all(&[WorkerStatus::Running]).await?;

    for execution in running_executions {
        let Some(worker_details) = &execution.worker_details else {
            error!(
                project_name = %execution.project_name,
                execution_id = %execution.execution_id,
                "running execution has no worker details"
            );
            continue;
        };

        let worker_status = match provisioner.check_worker_status(worker_details).await {
            Ok(status) => status,
            Err(err) => {
                error!(
                    project_name = %execution.project_name,
                    execution_id = %execution.execution_id,
                    error = %err,
                    "failed to check worker status"
                );
                continue;
            }
        };

        if worker_status != WorkerStatus::Terminated {
            continue;
        }

        let finish_time = execution.outcome.is_none().then_some(time);

        let update = store
            .executions
            .update(
                &execution.project_name,
                &execution.version_id,
                &execution.function_name,
                &execution.invocation_id,
                &execution.execution_id,
                time,
                ExecutionUpdate {
                    new_worker_status: Some(WorkerStatus::Terminated),
                    new_execution_finish_time: finish_time,
                    ..Default::default()
                },
            )
            .await;

        match update {
            Ok(()) => info!(
                project_name = %execution.project_name,
                invocation_id = %execution.invocation_id,
                execution_id = %execution.execution_id,
                "worker terminated"
            ),
            Err(err) => error!(
                project_name = %execution.project_name,
                execution_id = %execution.execution_id,
                error = %err,
                "failed to record worker termination"
            ),
        }
    }

    Ok(())
}

/// Send termination signals to workers of cancelled or timed-out
/// invocations. The signal time is stamped only after a successful send, and
/// only once per execution.
pub(crate) async fn send_termination_signals(
    store: &DataStore,
    provisioner: &dyn Provisioner,
    time: i64,
) -> Result<(), ApiError> {
    let running_executions = store.executions.list_all(&[WorkerStatus::Running]).await?;

    let classification =
        classify_running_executions_for_termination_signals(running_executions, time);

    for execution in classification.to_signal {
        let Some(worker_details) = &execution.worker_details else {
            error!(
                project_name = %execution.project_name,
                execution_id = %execution.execution_id,
                "running execution has no worker details"
            );
            continue;
        };

        if let Err(err) = provisioner.send_termination_signal(worker_details).await {
            error!(
                project_name = %execution.project_name,
                execution_id = %execution.execution_id,
                error = %err,
                "failed to send termination signal"
            );
            continue;
        }

        let update = store
            .executions
            .update(
                &execution.project_name,
                &execution.version_id,
                &execution.function_name,
                &execution.invocation_id,
                &execution.execution_id,
                time,
                ExecutionUpdate {
                    new_termination_signal_time: Some(time),
                    ..Default::default()
                },
            )
            .await;

        match update {
            Ok(()) => info!(
                project_name = %execution.project_name,
                invocation_id = %execution.invocation_id,
                execution_id = %execution.execution_id,
                "termination signal sent"
            ),
            Err(err) => error!(
                project_name = %execution.project_name,
                execution_id = %execution.execution_id,
                error = %err,
                "failed to record termination signal"
            ),
        }
    }

    Ok(())
}

/// Executions still in PROVISIONING at this point are survivors of a crash
/// (or a failed provision call) between the PROVISIONING marker and the
/// RUNNING record. Terminate them without an outcome so they count as failed
/// attempts eligible for retry.
pub(crate) async fn sweep_stuck_provisioning(
    store: &DataStore,
    time: i64,
) -> Result<(), ApiError> {
    let stuck_executions = store
        .executions
        .list_all(&[WorkerStatus::Provisioning])
        .await?;

    for execution in stuck_executions {
        warn!(
            project_name = %execution.project_name,
            invocation_id = %execution.invocation_id,
            execution_id = %execution.execution_id,
            "terminating execution stuck in provisioning"
        );

        let finish_time = execution.outcome.is_none().then_some(time);

        let update = store
            .executions
            .update(
                &execution.project_name,
                &execution.version_id,
                &execution.function_name,
                &execution.invocation_id,
                &execution.execution_id,
                time,
                ExecutionUpdate {
                    new_worker_status: Some(WorkerStatus::Terminated),
                    new_execution_finish_time: finish_time,
                    ..Default::default()
                },
            )
            .await;

        if let Err(err) = update {
            error!(
                project_name = %execution.project_name,
                execution_id = %execution.execution_id,
                error = %err,
                "failed to terminate stuck execution"
            );
        }
    }

    Ok(())
}
