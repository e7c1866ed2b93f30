//! Expiry Sweeper (§4.7): a periodic background loop that cancels
//! workflows for labs whose `expires_at` has passed. Signalling is
//! idempotent — firing `CancelLab` twice on the same run is harmless —
//! so the sweeper never needs to track which labs it already handled
//! across ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::domain::models::{LabStatus, WorkflowSignal};
use crate::domain::ports::{BlueprintService, LabRepository, WorkflowStore};
use crate::services::MutationService;

pub struct ExpirySweeper<L: LabRepository, W: WorkflowStore, B: BlueprintService> {
    lab_repository: Arc<L>,
    workflow_store: Arc<W>,
    mutation: Arc<MutationService<L, B>>,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
}

impl<L: LabRepository + 'static, W: WorkflowStore + 'static, B: BlueprintService + 'static> ExpirySweeper<L, W, B> {
    #[must_use]
    pub fn new(lab_repository: Arc<L>, workflow_store: Arc<W>, mutation: Arc<MutationService<L, B>>, poll_interval: Duration) -> Self {
        Self { lab_repository, workflow_store, mutation, poll_interval, running: Arc::new(AtomicBool::new(false)) }
    }

    /// One sweep pass: find expired active labs and enqueue a cancel
    /// signal for each lab's workflow run. A lab with no workflow run at
    /// all (worker crashed before `SetWorkflowHandle`) has nothing left
    /// to signal, so the sweeper forces it straight to `expired` through
    /// the Mutation Service instead (§4.7 point 3).
    pub async fn sweep_once(&self) -> usize {
        let expired = match self.lab_repository.list_expired().await {
            Ok(labs) => labs,
            Err(err) => {
                error!(error = %err, "failed to list expired labs");
                return 0;
            }
        };

        let mut signalled = 0;
        for lab in expired {
            let run = match self.workflow_store.get_by_lab_id(lab.id).await {
                Ok(run) => run,
                Err(err) => {
                    error!(lab_id = %lab.id, error = %err, "failed to load workflow run for expired lab");
                    continue;
                }
            };

            let Some(run) = run else {
                warn!(lab_id = %lab.id, "expired lab has no workflow run, forcing status directly");
                if let Err(err) = self.mutation.update_status(lab.id, LabStatus::Expired, Some("ttl elapsed with no workflow run")).await {
                    error!(lab_id = %lab.id, error = %err, "failed to force expire lab with no workflow run");
                }
                continue;
            };

            if let Err(err) = self.workflow_store.enqueue_signal(&run.workflow_id, WorkflowSignal::CancelLab).await {
                error!(lab_id = %lab.id, workflow_id = %run.workflow_id, error = %err, "failed to enqueue cancel signal");
                continue;
            }

            info!(lab_id = %lab.id, workflow_id = %run.workflow_id, "signalled cancellation for expired lab");
            signalled += 1;
        }
        signalled
    }

    /// Start the sweep loop. Returns a `JoinHandle`; call `stop` to end it.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let sweeper = Arc::clone(&self);

        tokio::spawn(async move {
            while sweeper.running.load(Ordering::SeqCst) {
                tokio::time::sleep(sweeper.poll_interval).await;
                let signalled = sweeper.sweep_once().await;
                if signalled > 0 {
                    info!(count = signalled, "expiry sweep completed");
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
