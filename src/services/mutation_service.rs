//! Mutation Service (§4.1, §4.5, §6): the sole authoritative writer of
//! lab state once a lab exists. Exposes the typed, gRPC-level surface
//! consumed by both the Lab Use Case and every workflow activity —
//! nothing else is permitted to call `LabRepository::compare_and_swap_status`
//! directly (§9 design note collapsing the source's two mutation
//! surfaces into one).
//!
//! Every operation is idempotent on equal payloads: replaying the same
//! `(op, payload)` after a success returns success, while a payload that
//! conflicts with the lab's current state returns
//! `OrchestratorError::Conflict` (§4.5).

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::{Blueprint, GuardrailSnapshot, Lab, LabStatus, ProvisioningDetails, WorkflowHandle};
use crate::domain::ports::{BlueprintService, LabRepository};
use crate::domain::{OrchestratorError, OrchestratorResult};
use crate::infrastructure::logging::audit::AuditLogger;

pub struct MutationService<R: LabRepository, B: BlueprintService> {
    repository: Arc<R>,
    blueprint_service: Arc<B>,
    audit: Option<Arc<AuditLogger>>,
}

impl<R: LabRepository, B: BlueprintService> MutationService<R, B> {
    pub const fn new(repository: Arc<R>, blueprint_service: Arc<B>) -> Self {
        Self { repository, blueprint_service, audit: None }
    }

    /// Attach an audit logger so every write below emits an entry (§10.2).
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn audit_log(&self, operation: &str, actor: &str, resource_id: Uuid, success: bool, metadata: Option<serde_json::Value>) {
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.log_operation(operation, actor, Some(&resource_id.to_string()), success, metadata).await {
                warn!(error = %err, operation, "failed to write audit event");
            }
        }
    }

    /// `GetLab` (§6).
    pub async fn get_lab(&self, id: Uuid) -> OrchestratorResult<Lab> {
        self.repository.get(id).await?.ok_or(OrchestratorError::LabNotFound(id))
    }

    /// `UpdateStatus` (§4.5, §6). Validates the transition against §4.1;
    /// an illegal transition returns `conflict`, matching the wording of
    /// §4.1 exactly ("rejects any transition not present above with a
    /// `conflict` failure") rather than `validation`.
    ///
    /// Replaying a call whose `new_status` equals the lab's current
    /// status is treated as an already-applied retry and returns success
    /// without writing anything, covering both literal retries and the
    /// explicitly idempotent `queued -> queued` workflow lock (§4.1).
    pub async fn update_status(&self, id: Uuid, new_status: LabStatus, notes: Option<&str>) -> OrchestratorResult<Lab> {
        let mut lab = self.get_lab(id).await?;
        if lab.status == new_status {
            return Ok(lab);
        }

        if !lab.status.can_transition_to(new_status) {
            return Err(OrchestratorError::Conflict(format!("illegal transition {} -> {new_status}", lab.status)));
        }

        let expected = lab.status;
        lab.status = new_status;
        if new_status == LabStatus::Rejected {
            if let Some(reason) = notes {
                lab.provisioning_details = Some(match lab.provisioning_details.take() {
                    Some(mut details) => {
                        details.reason = Some(reason.to_string());
                        details
                    }
                    None => ProvisioningDetails::with_reason(reason),
                });
            }
        }
        lab.updated_at = Utc::now();

        self.repository.compare_and_swap_status(id, expected, lab.clone()).await?;
        self.audit_log("update_status", &lab.owner_id, id, true, Some(json!({ "from": expected.to_string(), "to": new_status.to_string() }))).await;
        Ok(lab)
    }

    /// `SetBlueprint` (§4.5, §6): allowed in `draft` or `pending_guardrail`,
    /// and also in `queued` for the workflow's own phase-2 "Generate
    /// blueprint" activity (§4.4) — by the time a workflow exists the use
    /// case has already moved the lab to `queued` via `ConfirmRequest`,
    /// so the activity's write has to tolerate that status rather than
    /// conflict with it. Moves `draft -> pending_guardrail`; leaves
    /// `pending_guardrail` and `queued` in place (re-running
    /// `GenerateBlueprint` before confirmation, or refreshing it from the
    /// workflow, is allowed).
    pub async fn set_blueprint(&self, id: Uuid, blueprint: Blueprint) -> OrchestratorResult<Lab> {
        let mut lab = self.get_lab(id).await?;
        let expected = lab.status;
        match expected {
            LabStatus::Draft => lab.status = LabStatus::PendingGuardrail,
            LabStatus::PendingGuardrail | LabStatus::Queued => {}
            other => {
                return Err(OrchestratorError::Conflict(format!(
                    "SetBlueprint is only valid from draft, pending_guardrail, or queued, lab is {other}"
                )))
            }
        }
        lab.blueprint = Some(blueprint);
        lab.updated_at = Utc::now();

        self.repository.compare_and_swap_status(id, expected, lab.clone()).await?;
        self.audit_log("set_blueprint", &lab.owner_id, id, true, None).await;
        Ok(lab)
    }

    /// `GenerateBlueprint` (§6): calls the Blueprint Service and persists
    /// the result via `SetBlueprint`, returning the blueprint itself.
    pub async fn generate_blueprint(&self, id: Uuid) -> OrchestratorResult<Blueprint> {
        let lab = self.get_lab(id).await?;
        let blueprint = self.blueprint_service.generate(&lab).await?;
        self.set_blueprint(id, blueprint.clone()).await?;
        Ok(blueprint)
    }

    /// Attach a guardrail snapshot and drive the resulting status move
    /// (`pending_guardrail|draft -> queued` on pass, `-> rejected` on
    /// fail) in a single compare-and-swap. Not one of the five ops named
    /// in §4.5's table verbatim, but required by invariants 2 and 3 (a
    /// queued/running/rejected lab always carries the snapshot that
    /// produced its status) — the table has no separate snapshot setter,
    /// so `ConfirmRequest` needs this combined write to keep the two
    /// fields consistent under the same CAS (§5's "same transaction as
    /// the status move to queued" requirement).
    pub async fn record_guardrail_decision(
        &self,
        id: Uuid,
        snapshot: GuardrailSnapshot,
        expires_at: Option<DateTime<Utc>>,
    ) -> OrchestratorResult<Lab> {
        let mut lab = self.get_lab(id).await?;
        if !matches!(lab.status, LabStatus::Draft | LabStatus::PendingGuardrail) {
            return Err(OrchestratorError::Conflict(format!(
                "ConfirmRequest is only valid from draft or pending_guardrail, lab is {}",
                lab.status
            )));
        }

        let expected = lab.status;
        let snapshot_passed = snapshot.passed;
        let next_status = if snapshot_passed { LabStatus::Queued } else { LabStatus::Rejected };
        if !expected.can_transition_to(next_status) {
            return Err(OrchestratorError::Conflict(format!("illegal transition {expected} -> {next_status}")));
        }

        lab.guardrail_snapshot = Some(snapshot);
        lab.status = next_status;
        if next_status == LabStatus::Queued {
            lab.expires_at = expires_at;
        }
        lab.updated_at = Utc::now();

        self.repository.compare_and_swap_status(id, expected, lab.clone()).await?;
        self.audit_log("record_guardrail_decision", &lab.owner_id, id, snapshot_passed, Some(json!({ "to": next_status.to_string() }))).await;
        Ok(lab)
    }

    /// `SetWorkflowHandle` (§4.5, §6): write-once, only in `queued`.
    /// Re-attaching the identical handle is idempotent; any other
    /// payload while a handle is already set is a conflict.
    pub async fn set_workflow_handle(&self, id: Uuid, workflow_id: &str, run_id: &str) -> OrchestratorResult<Lab> {
        let mut lab = self.get_lab(id).await?;
        if lab.status != LabStatus::Queued {
            return Err(OrchestratorError::Conflict(format!(
                "SetWorkflowHandle is only valid in status queued, lab is {}",
                lab.status
            )));
        }

        if let Some(existing) = &lab.workflow_handle {
            if existing.workflow_id == workflow_id && existing.run_id == run_id {
                return Ok(lab);
            }
            return Err(OrchestratorError::Conflict("workflow_handle is already set to a different value".to_string()));
        }

        let expected = lab.status;
        lab.workflow_handle = Some(WorkflowHandle { workflow_id: workflow_id.to_string(), run_id: run_id.to_string() });
        lab.updated_at = Utc::now();

        self.repository.compare_and_swap_status(id, expected, lab.clone()).await?;
        self.audit_log("set_workflow_handle", &lab.owner_id, id, true, Some(json!({ "workflow_id": workflow_id }))).await;
        Ok(lab)
    }

    /// `SetProvisioningDetails` (§4.5, §6): allowed in `queued` or
    /// `running`. Kept distinct from the `blueprint` field per §9's
    /// design note — never overloaded onto it.
    pub async fn set_provisioning_details(&self, id: Uuid, details: serde_json::Value) -> OrchestratorResult<Lab> {
        let mut lab = self.get_lab(id).await?;
        if !matches!(lab.status, LabStatus::Queued | LabStatus::Running) {
            return Err(OrchestratorError::Conflict(format!(
                "SetProvisioningDetails is only valid in queued or running, lab is {}",
                lab.status
            )));
        }

        let expected = lab.status;
        let reason = lab.provisioning_details.as_ref().and_then(|d| d.reason.clone());
        lab.provisioning_details = Some(ProvisioningDetails { details, reason });
        lab.updated_at = Utc::now();

        self.repository.compare_and_swap_status(id, expected, lab.clone()).await?;
        self.audit_log("set_provisioning_details", &lab.owner_id, id, true, None).await;
        Ok(lab)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AutomationHook, EnvironmentPlan, LabSource, RiskBadge, Severity};
    use crate::domain::ports::LabFilter;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct InMemoryRepo {
        labs: Mutex<HashMap<Uuid, Lab>>,
    }

    impl InMemoryRepo {
        fn seeded(lab: Lab) -> Self {
            let mut labs = HashMap::new();
            labs.insert(lab.id, lab);
            Self { labs: Mutex::new(labs) }
        }
    }

    #[async_trait]
    impl LabRepository for InMemoryRepo {
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
                return Err(OrchestratorError::Conflict(format!("expected {expected}, found {}", current.status)));
            }
            labs.insert(id, next);
            Ok(())
        }

        async fn list_expired(&self) -> OrchestratorResult<Vec<Lab>> {
            Ok(vec![])
        }
    }

    struct FakeBlueprints;

    #[async_trait]
    impl BlueprintService for FakeBlueprints {
        async fn generate(&self, _lab: &Lab) -> OrchestratorResult<Blueprint> {
            Ok(Blueprint {
                summary: "summary".to_string(),
                risk_badge: RiskBadge { level: "low".to_string(), reason: "r".to_string() },
                environment_plan: EnvironmentPlan {
                    base_image: "base".to_string(),
                    dependencies: vec![],
                    configuration: HashMap::new(),
                },
                validation_steps: vec![],
                automation_hooks: Vec::<AutomationHook>::new(),
            })
        }
    }

    fn draft() -> Lab {
        Lab {
            id: Uuid::new_v4(),
            owner_id: "owner-1".to_string(),
            source: LabSource::Manual,
            cve_id: None,
            title: "t".to_string(),
            description: "d".to_string(),
            objective: "o".to_string(),
            severity: Severity::Low,
            ttl_hours: 2,
            status: LabStatus::Draft,
            blueprint: None,
            guardrail_snapshot: None,
            workflow_handle: None,
            provisioning_details: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(lab: Lab) -> MutationService<InMemoryRepo, FakeBlueprints> {
        MutationService::new(Arc::new(InMemoryRepo::seeded(lab)), Arc::new(FakeBlueprints))
    }

    #[tokio::test]
    async fn illegal_transition_is_a_conflict_not_a_validation_error() {
        let lab = draft();
        let id = lab.id;
        let svc = service(lab);
        let result = svc.update_status(id, LabStatus::Running, None).await;
        assert!(matches!(result, Err(OrchestratorError::Conflict(_))));
    }

    #[tokio::test]
    async fn replaying_the_same_status_is_idempotent() {
        let mut lab = draft();
        lab.status = LabStatus::Queued;
        let id = lab.id;
        let svc = service(lab);
        assert!(svc.update_status(id, LabStatus::Queued, None).await.is_ok());
        assert!(svc.update_status(id, LabStatus::Queued, None).await.is_ok());
    }

    #[tokio::test]
    async fn legal_transition_succeeds() {
        let lab = draft();
        let id = lab.id;
        let svc = service(lab);
        let result = svc.update_status(id, LabStatus::Rejected, Some("guardrails failed")).await.unwrap();
        assert_eq!(result.status, LabStatus::Rejected);
        assert_eq!(result.provisioning_details.unwrap().reason.as_deref(), Some("guardrails failed"));
    }

    #[tokio::test]
    async fn set_blueprint_moves_draft_to_pending_guardrail() {
        let lab = draft();
        let id = lab.id;
        let svc = service(lab);
        let blueprint = svc.generate_blueprint(id).await.unwrap();
        assert_eq!(blueprint.summary, "summary");
        let stored = svc.get_lab(id).await.unwrap();
        assert_eq!(stored.status, LabStatus::PendingGuardrail);
        assert!(stored.blueprint.is_some());
    }

    #[tokio::test]
    async fn set_blueprint_rejected_outside_draft_pending_guardrail_or_queued() {
        let mut lab = draft();
        lab.status = LabStatus::Running;
        let id = lab.id;
        let svc = service(lab);
        let result = svc.generate_blueprint(id).await;
        assert!(matches!(result, Err(OrchestratorError::Conflict(_))));
    }

    #[tokio::test]
    async fn set_blueprint_allowed_while_queued_for_the_workflows_own_phase_two() {
        let mut lab = draft();
        lab.status = LabStatus::Queued;
        let id = lab.id;
        let svc = service(lab);
        let blueprint = svc.generate_blueprint(id).await.unwrap();
        assert_eq!(blueprint.summary, "summary");
        let stored = svc.get_lab(id).await.unwrap();
        assert_eq!(stored.status, LabStatus::Queued);
        assert!(stored.blueprint.is_some());
    }

    #[tokio::test]
    async fn set_workflow_handle_is_write_once() {
        let mut lab = draft();
        lab.status = LabStatus::Queued;
        let id = lab.id;
        let svc = service(lab);

        svc.set_workflow_handle(id, "wf-1", "run-1").await.unwrap();
        // Replaying the same handle is a no-op success.
        svc.set_workflow_handle(id, "wf-1", "run-1").await.unwrap();
        // A different handle is a conflict.
        let result = svc.set_workflow_handle(id, "wf-2", "run-2").await;
        assert!(matches!(result, Err(OrchestratorError::Conflict(_))));
    }

    #[tokio::test]
    async fn record_guardrail_decision_moves_to_queued_on_pass() {
        let mut lab = draft();
        lab.status = LabStatus::PendingGuardrail;
        let id = lab.id;
        let svc = service(lab);

        let snapshot = crate::domain::models::GuardrailSnapshot::from_checks(vec![], Utc::now());
        let expires_at = Utc::now() + chrono::Duration::hours(2);
        let result = svc.record_guardrail_decision(id, snapshot, Some(expires_at)).await.unwrap();
        assert_eq!(result.status, LabStatus::Queued);
        assert!(result.guardrail_snapshot.unwrap().passed);
        assert_eq!(result.expires_at, Some(expires_at));
    }

    #[tokio::test]
    async fn record_guardrail_decision_moves_to_rejected_on_fail() {
        let lab = draft();
        let id = lab.id;
        let svc = service(lab);

        let check = crate::domain::models::GuardrailCheck {
            name: "active_lab_limit".to_string(),
            passed: false,
            severity: crate::domain::models::CheckSeverity::Error,
            message: "blocked".to_string(),
        };
        let snapshot = crate::domain::models::GuardrailSnapshot::from_checks(vec![check], Utc::now());
        let result = svc.record_guardrail_decision(id, snapshot, None).await.unwrap();
        assert_eq!(result.status, LabStatus::Rejected);
        assert!(!result.guardrail_snapshot.unwrap().passed);
    }

    #[tokio::test]
    async fn set_provisioning_details_valid_in_queued_and_running() {
        let mut lab = draft();
        lab.status = LabStatus::Running;
        let id = lab.id;
        let svc = service(lab);

        let result = svc.set_provisioning_details(id, serde_json::json!({"host": "10.0.0.1"})).await;
        assert!(result.is_ok());
    }
}
