//! The lifecycle reconciler: a single-threaded periodic driver that advances
//! functions, invocations, executions and projects through their state
//! machines.
//!
//! Each tick runs eight strictly-ordered phases. Every phase takes a fresh
//! snapshot from the store, consults a pure classifier where decisions are
//! non-trivial, issues provisioner side-effects and writes back transitions.
//! A failure while handling one entity never aborts the tick; it is logged
//! and retried on a later pass.

mod executions;
mod functions;
mod invocations;
mod projects;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::common::current_time;
use crate::data::DataStore;
use crate::provisioning::Provisioner;

pub struct Reconciler {
    store: DataStore,
    provisioner: Arc<dyn Provisioner>,
    tick_interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Reconciler {
    pub fn new(store: DataStore, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            store,
            provisioner,
            tick_interval: Duration::from_secs(1),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Handle for requesting shutdown from another task.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// One reconciliation pass. Idempotent: running it twice back-to-back
    /// with no external change produces no further transitions.
    ///
    /// Phase ordering matters: cancellation propagation runs before
    /// scheduling so we rarely spawn an execution for a child of a
    /// just-cancelled parent, and project GC runs last so it observes all
    /// cascading effects of the earlier phases.
    pub async fn run_once(&self, time: i64) {
        let store = &self.store;
        let provisioner = self.provisioner.as_ref();

        if let Err(err) = functions::prepare_pending_functions(store, provisioner).await {
            error!(error = %err, "functions pass failed");
        }

        if let Err(err) = invocations::propagate_cancellation_requests(store, time).await {
            error!(error = %err, "cancellation propagation pass failed");
        }

        if let Err(err) = invocations::advance_running_invocations(store, time).await {
            error!(error = %err, "invocation scheduling pass failed");
        }

        if let Err(err) = executions::provision_pending_executions(store, provisioner, time).await {
            error!(error = %err, "execution provisioning pass failed");
        }

        if let Err(err) = executions::poll_running_workers(store, provisioner, time).await {
            error!(error = %err, "worker liveness pass failed");
        }

        if let Err(err) = executions::send_termination_signals(store, provisioner, time).await {
            error!(error = %err, "termination signal pass failed");
        }

        if let Err(err) = executions::sweep_stuck_provisioning(store, time).await {
            error!(error = %err, "stuck-provisioning sweep failed");
        }

        if let Err(err) = projects::collect_deletable_projects(store).await {
            error!(error = %err, "project garbage collection failed");
        }
    }

    /// Tick until shutdown is requested.
    pub async fn run(self) {
        info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            "reconciler starting"
        );

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            self.run_once(current_time()).await;

            tokio::time::sleep(self.tick_interval).await;
        }

        info!("reconciler stopped");
    }

    /// Tick until SIGINT/SIGTERM.
    pub async fn run_until_shutdown(self) {
        let shutdown = self.shutdown_handle();

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });

        self.run().await;
    }
}
