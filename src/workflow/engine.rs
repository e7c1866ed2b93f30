//! The durable provisioning workflow (§4.4): a self-driving executor
//! over the phase sequence, built on the same ports/mutation-service
//! boundary the Lab Use Case uses. Each run's state lives in a
//! [`WorkflowRunRecord`] persisted through [`WorkflowStore`] after every
//! phase transition, so a worker restart can recover any run whose
//! lease has expired (`resume_recoverable`).
//!
//! The engine drives itself on a spawned task per run rather than
//! waiting on an external caller to advance it, since the phase
//! sequence includes genuine waits (provisioning polls, a 24-hour human
//! review timer) with no caller available to drive them forward.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::WorkflowConfig;
use crate::domain::error::ActivityError;
use crate::domain::models::{
    Blueprint, Lab, LabStatus, WorkflowErrorCategory, WorkflowHandle, WorkflowPhase, WorkflowRunRecord,
    WorkflowRunStatus, WorkflowSignal,
};
use crate::domain::ports::{BlueprintService, LabRepository, ProvisioningBackend, ReadinessProber, WorkflowInput, WorkflowLauncher, WorkflowStore};
use crate::domain::{OrchestratorError, OrchestratorResult};
use crate::infrastructure::logging::audit::AuditLogger;
use crate::services::MutationService;

use super::retry::ActivityRetryPolicy;

const PROVISION_POLL_INTERVAL: Duration = Duration::from_secs(5);
const HUMAN_REVIEW_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

/// Outcome of driving a single phase.
enum PhaseOutcome {
    Continue,
    Completed,
    Rejected(String, WorkflowErrorCategory),
    /// A `cancel-lab` signal was observed mid-phase. Distinct from
    /// `Rejected`: per §4.1 the lab must end `completed` (or `expired` if
    /// its TTL had already elapsed), never `rejected` — the rejection
    /// path is reserved for genuine phase failures.
    Cancelled,
}

pub struct WorkflowEngine<L, S, B, P, R>
where
    L: LabRepository + 'static,
    S: WorkflowStore + 'static,
    B: BlueprintService + 'static,
    P: ProvisioningBackend + 'static,
    R: ReadinessProber + 'static,
{
    workflow_store: Arc<S>,
    mutation: Arc<MutationService<L, B>>,
    provisioner: Arc<P>,
    prober: Arc<R>,
    retry: Arc<ActivityRetryPolicy>,
    poll_interval: Duration,
    prober_deadline: Duration,
    lease_duration: chrono::Duration,
    audit: Option<Arc<AuditLogger>>,
}

impl<L, S, B, P, R> Clone for WorkflowEngine<L, S, B, P, R>
where
    L: LabRepository + 'static,
    S: WorkflowStore + 'static,
    B: BlueprintService + 'static,
    P: ProvisioningBackend + 'static,
    R: ReadinessProber + 'static,
{
    fn clone(&self) -> Self {
        Self {
            workflow_store: Arc::clone(&self.workflow_store),
            mutation: Arc::clone(&self.mutation),
            provisioner: Arc::clone(&self.provisioner),
            prober: Arc::clone(&self.prober),
            retry: Arc::clone(&self.retry),
            poll_interval: self.poll_interval,
            prober_deadline: self.prober_deadline,
            lease_duration: self.lease_duration,
            audit: self.audit.clone(),
        }
    }
}

impl<L, S, B, P, R> WorkflowEngine<L, S, B, P, R>
where
    L: LabRepository + 'static,
    S: WorkflowStore + 'static,
    B: BlueprintService + 'static,
    P: ProvisioningBackend + 'static,
    R: ReadinessProber + 'static,
{
    #[must_use]
    pub fn new(
        workflow_store: Arc<S>,
        mutation: Arc<MutationService<L, B>>,
        provisioner: Arc<P>,
        prober: Arc<R>,
        config: &WorkflowConfig,
        prober_deadline: Duration,
        audit: Option<Arc<AuditLogger>>,
    ) -> Self {
        Self {
            workflow_store,
            mutation,
            provisioner,
            prober,
            retry: Arc::new(ActivityRetryPolicy::from_config(config)),
            poll_interval: Duration::from_secs(config.worker_poll_interval_secs.max(1)),
            prober_deadline,
            lease_duration: chrono::Duration::seconds(i64::try_from(config.lease_duration_secs).unwrap_or(60)),
            audit,
        }
    }

    /// Re-attach to any run left `Running` with an expired lease —
    /// recovery after a worker crash (§9 durability requirement).
    /// Intended to be called once at process startup.
    pub async fn resume_recoverable(&self) -> OrchestratorResult<usize> {
        let runs = self.workflow_store.list_expired_leases().await?;
        let count = runs.len();
        for run in runs {
            warn!(workflow_id = %run.workflow_id, phase = %run.phase.as_str(), "resuming workflow run after lease expiry");
            let engine = self.clone();
            tokio::spawn(async move { engine.drive(run.workflow_id).await });
        }
        Ok(count)
    }

    async fn audit_log(&self, operation: &str, actor: &str, resource_id: &str, success: bool, metadata: Option<serde_json::Value>) {
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.log_operation(operation, actor, Some(resource_id), success, metadata).await {
                warn!(error = %err, operation, "failed to write audit event");
            }
        }
    }

    async fn renew_lease(&self, workflow_id: &str) {
        let expiry = Utc::now() + self.lease_duration;
        if let Err(err) = self.workflow_store.renew_lease(workflow_id, expiry).await {
            warn!(workflow_id, error = %err, "failed to renew workflow lease");
        }
    }

    /// Drain any `cancel-lab` signal queued for this run.
    async fn cancel_requested(&self, workflow_id: &str) -> bool {
        match self.workflow_store.get(workflow_id).await {
            Ok(Some(run)) => run.pending_signals.iter().any(|s| matches!(s, WorkflowSignal::CancelLab)),
            Ok(None) => false,
            Err(err) => {
                error!(workflow_id, error = %err, "failed to check pending signals");
                false
            }
        }
    }

    /// The self-driving loop: fetch the run, check for cancellation,
    /// advance one phase, persist, repeat until terminal.
    async fn drive(&self, workflow_id: String) {
        loop {
            let mut run = match self.workflow_store.get(&workflow_id).await {
                Ok(Some(run)) => run,
                Ok(None) => {
                    error!(workflow_id, "workflow run vanished mid-execution");
                    return;
                }
                Err(err) => {
                    error!(workflow_id, error = %err, "failed to load workflow run");
                    return;
                }
            };

            if run.status != WorkflowRunStatus::Running {
                return;
            }

            self.renew_lease(&workflow_id).await;

            if run.phase != WorkflowPhase::Done && self.cancel_requested(&workflow_id).await {
                self.finish_cancelled(&mut run).await;
                return;
            }

            let outcome = self.run_phase(&mut run).await;
            match outcome {
                PhaseOutcome::Continue => {
                    run.phase = run.phase.next();
                    run.updated_at = Utc::now();
                    if let Err(err) = self.workflow_store.save(&run).await {
                        error!(workflow_id, error = %err, "failed to persist phase transition");
                        return;
                    }
                }
                PhaseOutcome::Completed => {
                    self.monitor_until_terminal(&mut run).await;
                    return;
                }
                PhaseOutcome::Rejected(reason, category) => {
                    self.reject(&mut run, reason, category).await;
                    return;
                }
                PhaseOutcome::Cancelled => {
                    self.finish_cancelled(&mut run).await;
                    return;
                }
            }
        }
    }

    async fn run_phase(&self, run: &mut WorkflowRunRecord) -> PhaseOutcome {
        match run.phase {
            WorkflowPhase::Lock => self.phase_lock(run).await,
            WorkflowPhase::GenerateBlueprint => self.phase_generate_blueprint(run).await,
            WorkflowPhase::ProvisionEnvironment => self.phase_provision(run).await,
            WorkflowPhase::Validate => self.phase_validate(run).await,
            WorkflowPhase::GateOnReadiness => self.phase_gate_on_readiness(run).await,
            WorkflowPhase::HumanReview => self.phase_human_review(run).await,
            WorkflowPhase::Finalize => self.phase_finalize(run).await,
            WorkflowPhase::Done => PhaseOutcome::Completed,
        }
    }

    /// Phase 1 — Lock.
    async fn phase_lock(&self, run: &WorkflowRunRecord) -> PhaseOutcome {
        match self.mutation.update_status(run.lab_id, LabStatus::Queued, None).await {
            Ok(_) => PhaseOutcome::Continue,
            Err(err) => PhaseOutcome::Rejected(format!("lock failed: {err}"), WorkflowErrorCategory::ProvisioningFailed),
        }
    }

    /// Phase 2 — Generate blueprint. By the time this activity runs the
    /// lab is already `queued` (phase 1's lock ran first, and
    /// `ConfirmRequest` moved it there before the workflow was even
    /// started) — `set_blueprint` tolerates that status for exactly this
    /// activity (§4.4 vs §4.5).
    async fn phase_generate_blueprint(&self, run: &WorkflowRunRecord) -> PhaseOutcome {
        match self.mutation.generate_blueprint(run.lab_id).await {
            Ok(_) => PhaseOutcome::Continue,
            Err(err) => PhaseOutcome::Rejected(format!("blueprint generation failed: {err}"), WorkflowErrorCategory::ProvisioningFailed),
        }
    }

    /// Phase 3 — Provision environment: start the job (retried), then
    /// poll on a fixed interval, renewing the lease as a heartbeat each
    /// tick (§4.4 "heartbeat timeout must be less than poll interval x
    /// 3" — satisfied since the lease duration is configured well above
    /// three poll intervals in the default config).
    async fn phase_provision(&self, run: &WorkflowRunRecord) -> PhaseOutcome {
        let lab = match self.mutation.get_lab(run.lab_id).await {
            Ok(lab) => lab,
            Err(err) => return PhaseOutcome::Rejected(err.to_string(), WorkflowErrorCategory::ProvisioningFailed),
        };
        let Some(blueprint) = lab.blueprint.clone() else {
            return PhaseOutcome::Rejected("lab has no blueprint to provision from".to_string(), WorkflowErrorCategory::ProvisioningFailed);
        };

        let provisioner = Arc::clone(&self.provisioner);
        let lab_id = run.lab_id;
        let start_result = self
            .retry
            .run(move || {
                let provisioner = Arc::clone(&provisioner);
                let blueprint = blueprint.clone();
                async move { provisioner.start(lab_id, &blueprint).await.map_err(ActivityError::from) }
            })
            .await;

        let job_id = match start_result {
            Ok(job_id) => job_id,
            Err(err) => return PhaseOutcome::Rejected(format!("provisioning start failed: {}", err.message()), WorkflowErrorCategory::ProvisioningFailed),
        };

        loop {
            self.renew_lease(&run.workflow_id).await;

            if self.cancel_requested(&run.workflow_id).await {
                info!(lab_id = %run.lab_id, job_id, "cancel observed while provisioning, tearing down");
                if let Err(teardown_err) = self.provisioner.teardown(&job_id).await {
                    warn!(lab_id = %run.lab_id, error = %teardown_err, "best-effort teardown after cancel during provisioning failed");
                }
                return PhaseOutcome::Cancelled;
            }

            match self.provisioner.poll(&job_id).await {
                Ok(Some(outcome)) => {
                    let details = json!({ "job_id": job_id, "host": outcome.host, "port": outcome.port, "raw": outcome.details });
                    if let Err(err) = self.mutation.set_provisioning_details(lab_id, details).await {
                        return PhaseOutcome::Rejected(err.to_string(), WorkflowErrorCategory::ProvisioningFailed);
                    }
                    return PhaseOutcome::Continue;
                }
                Ok(None) => {
                    tokio::time::sleep(PROVISION_POLL_INTERVAL).await;
                }
                Err(err) => {
                    return PhaseOutcome::Rejected(format!("provisioning job failed: {err}"), WorkflowErrorCategory::ProvisioningFailed);
                }
            }
        }
    }

    /// Phase 4 — Validate.
    async fn phase_validate(&self, run: &WorkflowRunRecord) -> PhaseOutcome {
        let lab = match self.mutation.get_lab(run.lab_id).await {
            Ok(lab) => lab,
            Err(err) => return PhaseOutcome::Rejected(err.to_string(), WorkflowErrorCategory::ValidationFailed),
        };
        let Some((job_id, _, _)) = Self::provisioned_target(&lab) else {
            return PhaseOutcome::Rejected("missing provisioning details before validation".to_string(), WorkflowErrorCategory::ValidationFailed);
        };
        let Some(blueprint) = lab.blueprint.clone() else {
            return PhaseOutcome::Rejected("lab has no blueprint to validate against".to_string(), WorkflowErrorCategory::ValidationFailed);
        };

        match self.provisioner.validate(&job_id, &blueprint).await {
            Ok(outcome) if outcome.passed => PhaseOutcome::Continue,
            Ok(outcome) => PhaseOutcome::Rejected(format!("validation reported failure: {}", outcome.details), WorkflowErrorCategory::ValidationFailed),
            Err(err) => PhaseOutcome::Rejected(format!("validation call failed: {err}"), WorkflowErrorCategory::ValidationFailed),
        }
    }

    /// Phase 5 — Gate on readiness (§4.6). Probes only the host:port the
    /// provisioning phase wrote to the lab record, never anything
    /// caller-supplied.
    async fn phase_gate_on_readiness(&self, run: &WorkflowRunRecord) -> PhaseOutcome {
        let lab = match self.mutation.get_lab(run.lab_id).await {
            Ok(lab) => lab,
            Err(err) => return PhaseOutcome::Rejected(err.to_string(), WorkflowErrorCategory::ReadinessTimeout),
        };
        let Some((job_id, host, port)) = Self::provisioned_target(&lab) else {
            return PhaseOutcome::Rejected("missing provisioning details before readiness gate".to_string(), WorkflowErrorCategory::ReadinessTimeout);
        };

        let cancel_token = CancellationToken::new();
        let watcher_token = cancel_token.clone();
        let cancel_observed = Arc::new(AtomicBool::new(false));
        let watcher_observed = Arc::clone(&cancel_observed);
        let store = Arc::clone(&self.workflow_store);
        let workflow_id = run.workflow_id.clone();
        let poll_interval = self.poll_interval;
        let watcher = tokio::spawn(async move {
            while !watcher_token.is_cancelled() {
                tokio::time::sleep(poll_interval).await;
                if let Ok(Some(r)) = store.get(&workflow_id).await {
                    if r.pending_signals.iter().any(|s| matches!(s, WorkflowSignal::CancelLab)) {
                        watcher_observed.store(true, Ordering::SeqCst);
                        watcher_token.cancel();
                        return;
                    }
                }
            }
        });

        let result = self.prober.wait_until_ready(&host, port, self.prober_deadline, cancel_token.clone()).await;
        cancel_token.cancel();
        watcher.abort();

        match result {
            Ok(()) => PhaseOutcome::Continue,
            Err(_) if cancel_observed.load(Ordering::SeqCst) => {
                info!(lab_id = %run.lab_id, "cancel observed while gating on readiness");
                PhaseOutcome::Cancelled
            }
            Err(err) => {
                warn!(lab_id = %run.lab_id, error = %err, "readiness probe failed, running best-effort teardown");
                if let Err(teardown_err) = self.provisioner.teardown(&job_id).await {
                    warn!(lab_id = %run.lab_id, error = %teardown_err, "best-effort teardown also failed");
                }
                PhaseOutcome::Rejected(format!("readiness probe did not succeed: {err}"), WorkflowErrorCategory::ReadinessTimeout)
            }
        }
    }

    /// Phase 6 — Optional human review. Skipped entirely unless
    /// `requires_review`; otherwise waits up to 24h for a `human-review`
    /// signal, polling the store on `poll_interval`.
    async fn phase_human_review(&self, run: &WorkflowRunRecord) -> PhaseOutcome {
        if !run.requires_review {
            return PhaseOutcome::Continue;
        }

        let deadline = tokio::time::Instant::now() + HUMAN_REVIEW_TIMEOUT;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return PhaseOutcome::Rejected("human review timed out after 24h".to_string(), WorkflowErrorCategory::ReviewTimeout);
            }

            self.renew_lease(&run.workflow_id).await;
            match self.workflow_store.get(&run.workflow_id).await {
                Ok(Some(latest)) => {
                    if latest.pending_signals.iter().any(|s| matches!(s, WorkflowSignal::CancelLab)) {
                        return PhaseOutcome::Cancelled;
                    }
                    if let Some(WorkflowSignal::HumanReview { approved, notes, reviewed_by }) =
                        latest.pending_signals.iter().find(|s| matches!(s, WorkflowSignal::HumanReview { .. }))
                    {
                        return if *approved {
                            info!(lab_id = %run.lab_id, reviewed_by = %reviewed_by, "human review approved");
                            PhaseOutcome::Continue
                        } else {
                            PhaseOutcome::Rejected(format!("human review rejected: {notes}"), WorkflowErrorCategory::ReviewRejected)
                        };
                    }
                }
                Ok(None) => return PhaseOutcome::Rejected("workflow run vanished during human review".to_string(), WorkflowErrorCategory::ReviewTimeout),
                Err(err) => {
                    error!(workflow_id = %run.workflow_id, error = %err, "failed to poll for human review signal");
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Phase 7 — Finalize.
    async fn phase_finalize(&self, run: &WorkflowRunRecord) -> PhaseOutcome {
        match self.mutation.update_status(run.lab_id, LabStatus::Running, None).await {
            Ok(_) => {
                self.audit_log("workflow_finalized", &run.owner_id, &run.lab_id.to_string(), true, None).await;
                PhaseOutcome::Continue
            }
            Err(err) => PhaseOutcome::Rejected(format!("finalize failed: {err}"), WorkflowErrorCategory::ProvisioningFailed),
        }
    }

    /// Once `Finalize` has moved the lab to `running`, the workflow
    /// keeps watching for the cancellation that ends its lifetime —
    /// either a user-initiated cancel (`completed`) or the sweeper's
    /// TTL-driven cancel (`expired`). Both arrive as the same
    /// `cancel-lab` signal (§4.7); `finish_cancelled` tells them apart by
    /// comparing `now` against the lab's own `expires_at`, since the
    /// signal payload carries nothing else to distinguish them.
    async fn monitor_until_terminal(&self, run: &mut WorkflowRunRecord) {
        loop {
            if self.cancel_requested(&run.workflow_id).await {
                break;
            }
            self.renew_lease(&run.workflow_id).await;
            tokio::time::sleep(self.poll_interval).await;
        }
        self.finish_cancelled(run).await;
    }

    /// Shared tail for every path that ends a lab via `cancel-lab` rather
    /// than a genuine phase failure (§4.1's `queued|running -> completed
    /// |expired` edge — the rejection path in [`Self::reject`] is
    /// reserved for phase failures, never for cancellation). Runs a
    /// best-effort provisioner teardown if a job was ever recorded
    /// against the lab (idempotent per §6, so calling it again after an
    /// earlier inline teardown in `phase_provision`/`phase_gate_on_readiness`
    /// is harmless), then routes to `completed` for a user-initiated
    /// cancel or `expired` if the lab's own TTL had already elapsed by
    /// the time the signal landed — the sweeper signals the same
    /// `cancel-lab` for both (§4.7).
    async fn finish_cancelled(&self, run: &mut WorkflowRunRecord) {
        let lab = match self.mutation.get_lab(run.lab_id).await {
            Ok(lab) => lab,
            Err(err) => {
                error!(lab_id = %run.lab_id, error = %err, "failed to load lab while finalizing cancellation");
                return;
            }
        };

        if let Some((job_id, _, _)) = Self::provisioned_target(&lab) {
            if let Err(err) = self.provisioner.teardown(&job_id).await {
                warn!(lab_id = %run.lab_id, error = %err, "best-effort teardown after cancel failed");
            }
        }

        let ttl_elapsed = lab.expires_at.is_some_and(|expiry| Utc::now() >= expiry);
        let (target_status, category) = if ttl_elapsed {
            (LabStatus::Expired, WorkflowErrorCategory::TtlExpired)
        } else {
            (LabStatus::Completed, WorkflowErrorCategory::UserCancelled)
        };

        if let Err(err) = self.mutation.update_status(run.lab_id, target_status, None).await {
            error!(lab_id = %run.lab_id, error = %err, "failed to finalize lab status after cancellation");
        }

        self.audit_log("lab_cancelled", &run.owner_id, &run.lab_id.to_string(), true, Some(json!({ "ttl_elapsed": ttl_elapsed }))).await;

        run.phase = WorkflowPhase::Done;
        run.status = WorkflowRunStatus::Completed;
        run.error_category = Some(category);
        run.updated_at = Utc::now();
        if let Err(err) = self.workflow_store.save(run).await {
            error!(workflow_id = %run.workflow_id, error = %err, "failed to persist terminal run state");
        }
    }

    /// `RejectLab(lab_id, reason)` (§4.4 rejection path).
    async fn reject(&self, run: &mut WorkflowRunRecord, reason: String, category: WorkflowErrorCategory) {
        warn!(lab_id = %run.lab_id, workflow_id = %run.workflow_id, %reason, category = %category, "rejecting lab");
        if let Err(err) = self.mutation.update_status(run.lab_id, LabStatus::Rejected, Some(&reason)).await {
            error!(lab_id = %run.lab_id, error = %err, "failed to move lab to rejected");
        }
        self.audit_log("reject_lab", &run.owner_id, &run.lab_id.to_string(), false, Some(json!({ "reason": reason, "category": category.to_string() })))
            .await;

        run.status = WorkflowRunStatus::Failed;
        run.error_category = Some(category);
        run.updated_at = Utc::now();
        if let Err(err) = self.workflow_store.save(run).await {
            error!(workflow_id = %run.workflow_id, error = %err, "failed to persist rejected run state");
        }
    }

    /// Pull `(job_id, host, port)` out of the lab's provisioning
    /// details, as written by `phase_provision`.
    fn provisioned_target(lab: &Lab) -> Option<(String, String, u16)> {
        let details = lab.provisioning_details.as_ref()?.details.as_object()?;
        let job_id = details.get("job_id")?.as_str()?.to_string();
        let host = details.get("host")?.as_str()?.to_string();
        let port = u16::try_from(details.get("port")?.as_u64()?).ok()?;
        Some((job_id, host, port))
    }
}

#[async_trait]
impl<L, S, B, P, R> WorkflowLauncher for WorkflowEngine<L, S, B, P, R>
where
    L: LabRepository + 'static,
    S: WorkflowStore + 'static,
    B: BlueprintService + 'static,
    P: ProvisioningBackend + 'static,
    R: ReadinessProber + 'static,
{
    async fn start(&self, input: WorkflowInput) -> OrchestratorResult<WorkflowHandle> {
        let workflow_id = format!("wf-{}", input.lab_id);
        let run_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let run = WorkflowRunRecord {
            workflow_id: workflow_id.clone(),
            run_id: run_id.clone(),
            lab_id: input.lab_id,
            owner_id: input.owner_id.clone(),
            cve_id: input.cve_id.clone(),
            severity: input.severity,
            ttl_hours: input.ttl_hours,
            requires_review: input.requires_review,
            phase: WorkflowPhase::Lock,
            status: WorkflowRunStatus::Running,
            retry_counts: HashMap::new(),
            pending_signals: Vec::new(),
            error_category: None,
            lease_expires_at: now + self.lease_duration,
            created_at: now,
            updated_at: now,
        };

        self.workflow_store.create(&run).await?;
        self.audit_log("workflow_started", &input.owner_id, &input.lab_id.to_string(), true, None).await;

        let engine = self.clone();
        let spawned_workflow_id = workflow_id.clone();
        tokio::spawn(async move { engine.drive(spawned_workflow_id).await });

        Ok(WorkflowHandle { workflow_id, run_id })
    }

    async fn cancel(&self, workflow_id: &str) -> OrchestratorResult<()> {
        self.workflow_store.enqueue_signal(workflow_id, WorkflowSignal::CancelLab).await?;
        self.audit_log("workflow_signalled", "system", workflow_id, true, Some(json!({ "signal": "cancel-lab" }))).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{ProbeError, ProvisionerError};
    use crate::domain::models::{AutomationHook, EnvironmentPlan, LabSource, RiskBadge, Severity};
    use crate::domain::ports::{LabFilter, ProvisionOutcome, ValidationOutcome};
    use crate::domain::OrchestratorError;
    use std::sync::Mutex;

    struct FakeLabRepo {
        labs: Mutex<HashMap<Uuid, Lab>>,
    }

    impl FakeLabRepo {
        fn seeded(lab: Lab) -> Self {
            let mut labs = HashMap::new();
            labs.insert(lab.id, lab);
            Self { labs: Mutex::new(labs) }
        }
    }

    #[async_trait]
    impl LabRepository for FakeLabRepo {
        async fn create(&self, lab: &Lab) -> OrchestratorResult<()> {
            self.labs.lock().unwrap().insert(lab.id, lab.clone());
            Ok(())
        }
        async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Lab>> {
            Ok(self.labs.lock().unwrap().get(&id).cloned())
        }
        async fn list(&self, _filter: LabFilter) -> OrchestratorResult<Vec<Lab>> {
            Ok(self.labs.lock().unwrap().values().cloned().collect())
        }
        async fn get_active_by_owner(&self, _owner_id: &str) -> OrchestratorResult<Option<Lab>> {
            Ok(None)
        }
        async fn save(&self, lab: &Lab) -> OrchestratorResult<()> {
            self.labs.lock().unwrap().insert(lab.id, lab.clone());
            Ok(())
        }
        async fn compare_and_swap_status(&self, id: Uuid, expected: LabStatus, next: Lab) -> OrchestratorResult<()> {
            let mut labs = self.labs.lock().unwrap();
            let current = labs.get(&id).ok_or(OrchestratorError::LabNotFound(id))?;
            if current.status != expected {
                return Err(OrchestratorError::Conflict("stale expected status".to_string()));
            }
            labs.insert(id, next);
            Ok(())
        }
        async fn list_expired(&self) -> OrchestratorResult<Vec<Lab>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct FakeWorkflowStore {
        runs: Mutex<HashMap<String, WorkflowRunRecord>>,
    }

    #[async_trait]
    impl WorkflowStore for FakeWorkflowStore {
        async fn create(&self, run: &WorkflowRunRecord) -> OrchestratorResult<()> {
            self.runs.lock().unwrap().insert(run.workflow_id.clone(), run.clone());
            Ok(())
        }
        async fn get(&self, workflow_id: &str) -> OrchestratorResult<Option<WorkflowRunRecord>> {
            Ok(self.runs.lock().unwrap().get(workflow_id).cloned())
        }
        async fn get_by_lab_id(&self, lab_id: Uuid) -> OrchestratorResult<Option<WorkflowRunRecord>> {
            Ok(self.runs.lock().unwrap().values().find(|r| r.lab_id == lab_id).cloned())
        }
        async fn save(&self, run: &WorkflowRunRecord) -> OrchestratorResult<()> {
            self.runs.lock().unwrap().insert(run.workflow_id.clone(), run.clone());
            Ok(())
        }
        async fn enqueue_signal(&self, workflow_id: &str, signal: WorkflowSignal) -> OrchestratorResult<()> {
            if let Some(run) = self.runs.lock().unwrap().get_mut(workflow_id) {
                run.pending_signals.retain(|s| std::mem::discriminant(s) != std::mem::discriminant(&signal));
                run.pending_signals.push(signal);
            }
            Ok(())
        }
        async fn renew_lease(&self, workflow_id: &str, new_expiry: chrono::DateTime<Utc>) -> OrchestratorResult<()> {
            if let Some(run) = self.runs.lock().unwrap().get_mut(workflow_id) {
                run.lease_expires_at = new_expiry;
            }
            Ok(())
        }
        async fn list_expired_leases(&self) -> OrchestratorResult<Vec<WorkflowRunRecord>> {
            Ok(vec![])
        }
    }

    struct FakeBlueprintService;

    #[async_trait]
    impl BlueprintService for FakeBlueprintService {
        async fn generate(&self, _lab: &Lab) -> OrchestratorResult<Blueprint> {
            Ok(Blueprint {
                summary: "s".to_string(),
                risk_badge: RiskBadge { level: "low".to_string(), reason: "r".to_string() },
                environment_plan: EnvironmentPlan { base_image: "base".to_string(), dependencies: vec![], configuration: HashMap::new() },
                validation_steps: vec![],
                automation_hooks: Vec::<AutomationHook>::new(),
            })
        }
    }

    struct FakeProvisioner {
        fail_validate: bool,
    }

    #[async_trait]
    impl ProvisioningBackend for FakeProvisioner {
        async fn start(&self, _lab_id: Uuid, _blueprint: &Blueprint) -> Result<String, ProvisionerError> {
            Ok("job-1".to_string())
        }
        async fn poll(&self, _job_id: &str) -> Result<Option<ProvisionOutcome>, ProvisionerError> {
            Ok(Some(ProvisionOutcome { host: "10.0.0.5".to_string(), port: 6080, details: json!({}) }))
        }
        async fn validate(&self, _job_id: &str, _blueprint: &Blueprint) -> Result<ValidationOutcome, ProvisionerError> {
            Ok(ValidationOutcome { passed: !self.fail_validate, details: json!({"reason": "smoke test"}) })
        }
        async fn teardown(&self, _job_id: &str) -> Result<(), ProvisionerError> {
            Ok(())
        }
    }

    /// Never reports completion, so a workflow sitting in
    /// `ProvisionEnvironment` stays there until cancelled — used to
    /// exercise the mid-provisioning cancel path (spec §8 scenario 6).
    #[derive(Default)]
    struct StallingProvisioner {
        torn_down: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ProvisioningBackend for StallingProvisioner {
        async fn start(&self, _lab_id: Uuid, _blueprint: &Blueprint) -> Result<String, ProvisionerError> {
            Ok("job-stalling".to_string())
        }
        async fn poll(&self, _job_id: &str) -> Result<Option<ProvisionOutcome>, ProvisionerError> {
            Ok(None)
        }
        async fn validate(&self, _job_id: &str, _blueprint: &Blueprint) -> Result<ValidationOutcome, ProvisionerError> {
            Ok(ValidationOutcome { passed: true, details: json!({}) })
        }
        async fn teardown(&self, _job_id: &str) -> Result<(), ProvisionerError> {
            self.torn_down.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeProber {
        fail: bool,
    }

    #[async_trait]
    impl ReadinessProber for FakeProber {
        async fn wait_until_ready(
            &self,
            _host: &str,
            _port: u16,
            _deadline: Duration,
            _cancel: CancellationToken,
        ) -> Result<(), ProbeError> {
            if self.fail {
                Err(ProbeError::DeadlineExceeded { elapsed_secs: 1, last_error: "refused".to_string() })
            } else {
                Ok(())
            }
        }
    }

    fn draft_lab(owner_id: &str, ttl_hours: u32) -> Lab {
        let now = Utc::now();
        Lab {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            source: LabSource::Manual,
            cve_id: None,
            title: "t".to_string(),
            description: "d".to_string(),
            objective: "o".to_string(),
            severity: Severity::Low,
            ttl_hours,
            status: LabStatus::Queued,
            blueprint: None,
            guardrail_snapshot: None,
            workflow_handle: None,
            provisioning_details: None,
            expires_at: Some(now + chrono::Duration::hours(i64::from(ttl_hours))),
            created_at: now,
            updated_at: now,
        }
    }

    fn fast_config() -> WorkflowConfig {
        WorkflowConfig {
            initial_backoff_ms: 1,
            max_backoff_secs: 1,
            backoff_multiplier: 2.0,
            max_attempts: 2,
            worker_poll_interval_secs: 1,
            lease_duration_secs: 300,
        }
    }

    #[allow(clippy::type_complexity)]
    fn engine(
        lab: Lab,
        fail_validate: bool,
        fail_probe: bool,
    ) -> (WorkflowEngine<FakeLabRepo, FakeWorkflowStore, FakeBlueprintService, FakeProvisioner, FakeProber>, Arc<FakeWorkflowStore>, Uuid) {
        let lab_id = lab.id;
        let lab_repo = Arc::new(FakeLabRepo::seeded(lab));
        let store = Arc::new(FakeWorkflowStore::default());
        let mutation = Arc::new(MutationService::new(Arc::clone(&lab_repo), Arc::new(FakeBlueprintService)));
        let provisioner = Arc::new(FakeProvisioner { fail_validate });
        let prober = Arc::new(FakeProber { fail: fail_probe });
        let config = fast_config();
        let engine = WorkflowEngine::new(Arc::clone(&store), mutation, provisioner, prober, &config, Duration::from_millis(50), None);
        (engine, store, lab_id)
    }

    #[tokio::test]
    async fn happy_path_reaches_running_and_then_completes_on_cancel() {
        let lab = draft_lab("owner-1", 2);
        let (engine, store, lab_id) = engine(lab, false, false);

        let handle = engine
            .start(WorkflowInput { lab_id, owner_id: "owner-1".to_string(), cve_id: None, severity: Severity::Low, ttl_hours: 2, requires_review: false })
            .await
            .unwrap();

        let mut finalized = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Ok(lab) = engine.mutation.get_lab(lab_id).await {
                if lab.status == LabStatus::Running {
                    finalized = true;
                    break;
                }
            }
        }
        assert!(finalized, "workflow should reach running");

        engine.cancel(&handle.workflow_id).await.unwrap();

        let mut completed = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Ok(lab) = engine.mutation.get_lab(lab_id).await {
                if lab.status == LabStatus::Completed {
                    completed = true;
                    break;
                }
            }
        }
        assert!(completed, "user cancel after running should complete the lab");
        let _ = store.get(&handle.workflow_id).await;
    }

    #[tokio::test]
    async fn cancel_during_provisioning_tears_down_and_completes_not_rejects() {
        let lab = draft_lab("owner-4", 2);
        let lab_id = lab.id;
        let lab_repo = Arc::new(FakeLabRepo::seeded(lab));
        let store = Arc::new(FakeWorkflowStore::default());
        let mutation = Arc::new(MutationService::new(Arc::clone(&lab_repo), Arc::new(FakeBlueprintService)));
        let provisioner = Arc::new(StallingProvisioner::default());
        let torn_down = Arc::clone(&provisioner.torn_down);
        let prober = Arc::new(FakeProber { fail: false });
        let config = fast_config();
        let engine = WorkflowEngine::new(Arc::clone(&store), mutation, provisioner, prober, &config, Duration::from_millis(50), None);

        let handle = engine
            .start(WorkflowInput { lab_id, owner_id: "owner-4".to_string(), cve_id: None, severity: Severity::Low, ttl_hours: 2, requires_review: false })
            .await
            .unwrap();

        // Give the workflow a moment to reach the provisioning poll loop,
        // then cancel it while it is stuck polling a job that never completes.
        tokio::time::sleep(Duration::from_millis(100)).await;
        engine.cancel(&handle.workflow_id).await.unwrap();

        let mut completed = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Ok(lab) = engine.mutation.get_lab(lab_id).await {
                if lab.status == LabStatus::Completed {
                    completed = true;
                    break;
                }
                assert_ne!(lab.status, LabStatus::Rejected, "mid-provisioning cancel must not reject the lab");
            }
        }
        assert!(completed, "cancel during provisioning should complete, not reject, the lab");
        assert!(torn_down.load(Ordering::SeqCst), "cancel during provisioning should run a best-effort teardown");
    }

    #[tokio::test]
    async fn validation_failure_rejects_the_lab() {
        let lab = draft_lab("owner-2", 2);
        let (engine, _store, lab_id) = engine(lab, true, false);

        engine
            .start(WorkflowInput { lab_id, owner_id: "owner-2".to_string(), cve_id: None, severity: Severity::Low, ttl_hours: 2, requires_review: false })
            .await
            .unwrap();

        let mut rejected = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Ok(lab) = engine.mutation.get_lab(lab_id).await {
                if lab.status == LabStatus::Rejected {
                    rejected = true;
                    break;
                }
            }
        }
        assert!(rejected, "failed validation should reject the lab");
    }

    #[tokio::test]
    async fn readiness_timeout_runs_teardown_and_rejects() {
        let lab = draft_lab("owner-3", 2);
        let (engine, _store, lab_id) = engine(lab, false, true);

        engine
            .start(WorkflowInput { lab_id, owner_id: "owner-3".to_string(), cve_id: None, severity: Severity::Low, ttl_hours: 2, requires_review: false })
            .await
            .unwrap();

        let mut rejected = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Ok(lab) = engine.mutation.get_lab(lab_id).await {
                if lab.status == LabStatus::Rejected {
                    rejected = true;
                    break;
                }
            }
        }
        assert!(rejected, "a readiness timeout should reject the lab");
    }
}
