//! SQLite-backed `WorkflowStore` (§9 durability requirement).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Severity, WorkflowErrorCategory, WorkflowPhase, WorkflowRunRecord, WorkflowRunStatus, WorkflowSignal};
use crate::domain::ports::WorkflowStore;

use super::{parse_datetime, parse_json, parse_optional_datetime, parse_uuid};

pub struct SqliteWorkflowStore {
    pool: SqlitePool,
}

impl SqliteWorkflowStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn severity_to_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "low",
        Severity::Medium => "medium",
        Severity::High => "high",
        Severity::Critical => "critical",
    }
}

fn severity_from_str(s: &str) -> OrchestratorResult<Severity> {
    match s {
        "low" => Ok(Severity::Low),
        "medium" => Ok(Severity::Medium),
        "high" => Ok(Severity::High),
        "critical" => Ok(Severity::Critical),
        other => Err(OrchestratorError::Internal(format!("unknown severity: {other}"))),
    }
}

fn phase_to_str(phase: WorkflowPhase) -> &'static str {
    phase.as_str()
}

fn phase_from_str(s: &str) -> OrchestratorResult<WorkflowPhase> {
    match s {
        "lock" => Ok(WorkflowPhase::Lock),
        "generate_blueprint" => Ok(WorkflowPhase::GenerateBlueprint),
        "provision_environment" => Ok(WorkflowPhase::ProvisionEnvironment),
        "validate" => Ok(WorkflowPhase::Validate),
        "gate_on_readiness" => Ok(WorkflowPhase::GateOnReadiness),
        "human_review" => Ok(WorkflowPhase::HumanReview),
        "finalize" => Ok(WorkflowPhase::Finalize),
        "done" => Ok(WorkflowPhase::Done),
        other => Err(OrchestratorError::Internal(format!("unknown workflow phase: {other}"))),
    }
}

fn run_status_to_str(status: WorkflowRunStatus) -> &'static str {
    match status {
        WorkflowRunStatus::Running => "running",
        WorkflowRunStatus::Completed => "completed",
        WorkflowRunStatus::Failed => "failed",
        WorkflowRunStatus::Cancelled => "cancelled",
    }
}

fn run_status_from_str(s: &str) -> OrchestratorResult<WorkflowRunStatus> {
    match s {
        "running" => Ok(WorkflowRunStatus::Running),
        "completed" => Ok(WorkflowRunStatus::Completed),
        "failed" => Ok(WorkflowRunStatus::Failed),
        "cancelled" => Ok(WorkflowRunStatus::Cancelled),
        other => Err(OrchestratorError::Internal(format!("unknown workflow run status: {other}"))),
    }
}

fn error_category_to_str(category: WorkflowErrorCategory) -> &'static str {
    match category {
        WorkflowErrorCategory::RejectedByGuardrails => "rejected-by-guardrails",
        WorkflowErrorCategory::ProvisioningFailed => "provisioning-failed",
        WorkflowErrorCategory::ValidationFailed => "validation-failed",
        WorkflowErrorCategory::ReadinessTimeout => "readiness-timeout",
        WorkflowErrorCategory::ReviewRejected => "review-rejected",
        WorkflowErrorCategory::ReviewTimeout => "review-timeout",
        WorkflowErrorCategory::UserCancelled => "user-cancelled",
        WorkflowErrorCategory::TtlExpired => "ttl-expired",
    }
}

fn error_category_from_str(s: &str) -> OrchestratorResult<WorkflowErrorCategory> {
    match s {
        "rejected-by-guardrails" => Ok(WorkflowErrorCategory::RejectedByGuardrails),
        "provisioning-failed" => Ok(WorkflowErrorCategory::ProvisioningFailed),
        "validation-failed" => Ok(WorkflowErrorCategory::ValidationFailed),
        "readiness-timeout" => Ok(WorkflowErrorCategory::ReadinessTimeout),
        "review-rejected" => Ok(WorkflowErrorCategory::ReviewRejected),
        "review-timeout" => Ok(WorkflowErrorCategory::ReviewTimeout),
        "user-cancelled" => Ok(WorkflowErrorCategory::UserCancelled),
        "ttl-expired" => Ok(WorkflowErrorCategory::TtlExpired),
        other => Err(OrchestratorError::Internal(format!("unknown workflow error category: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowRunRow {
    workflow_id: String,
    run_id: String,
    lab_id: String,
    owner_id: String,
    cve_id: Option<String>,
    severity: String,
    ttl_hours: i64,
    requires_review: i64,
    phase: String,
    status: String,
    retry_counts_json: String,
    pending_signals_json: String,
    error_category: Option<String>,
    lease_expires_at: String,
    created_at: String,
    updated_at: String,
}

impl WorkflowRunRow {
    fn try_into_run(self) -> OrchestratorResult<WorkflowRunRecord> {
        Ok(WorkflowRunRecord {
            workflow_id: self.workflow_id,
            run_id: self.run_id,
            lab_id: parse_uuid(&self.lab_id)?,
            owner_id: self.owner_id,
            cve_id: self.cve_id,
            severity: severity_from_str(&self.severity)?,
            ttl_hours: u32::try_from(self.ttl_hours)
                .map_err(|_| OrchestratorError::Internal("ttl_hours out of range".to_string()))?,
            requires_review: self.requires_review != 0,
            phase: phase_from_str(&self.phase)?,
            status: run_status_from_str(&self.status)?,
            retry_counts: parse_json(&self.retry_counts_json)?,
            pending_signals: parse_json(&self.pending_signals_json)?,
            error_category: self.error_category.map(|s| error_category_from_str(&s)).transpose()?,
            lease_expires_at: parse_datetime(&self.lease_expires_at)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

async fn upsert(pool: &SqlitePool, run: &WorkflowRunRecord) -> OrchestratorResult<()> {
    sqlx::query(
        "INSERT INTO workflow_runs (
            workflow_id, run_id, lab_id, owner_id, cve_id, severity, ttl_hours, requires_review, phase, status,
            retry_counts_json, pending_signals_json, error_category, lease_expires_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(workflow_id) DO UPDATE SET
            phase = excluded.phase,
            status = excluded.status,
            retry_counts_json = excluded.retry_counts_json,
            pending_signals_json = excluded.pending_signals_json,
            error_category = excluded.error_category,
            lease_expires_at = excluded.lease_expires_at,
            updated_at = excluded.updated_at",
    )
    .bind(&run.workflow_id)
    .bind(&run.run_id)
    .bind(run.lab_id.to_string())
    .bind(&run.owner_id)
    .bind(&run.cve_id)
    .bind(severity_to_str(run.severity))
    .bind(i64::from(run.ttl_hours))
    .bind(i64::from(run.requires_review))
    .bind(phase_to_str(run.phase))
    .bind(run_status_to_str(run.status))
    .bind(serde_json::to_string(&run.retry_counts)?)
    .bind(serde_json::to_string(&run.pending_signals)?)
    .bind(run.error_category.map(error_category_to_str))
    .bind(run.lease_expires_at.to_rfc3339())
    .bind(run.created_at.to_rfc3339())
    .bind(run.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn create(&self, run: &WorkflowRunRecord) -> OrchestratorResult<()> {
        upsert(&self.pool, run).await
    }

    async fn get(&self, workflow_id: &str) -> OrchestratorResult<Option<WorkflowRunRecord>> {
        let row: Option<WorkflowRunRow> = sqlx::query_as("SELECT * FROM workflow_runs WHERE workflow_id = ?")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkflowRunRow::try_into_run).transpose()
    }

    async fn get_by_lab_id(&self, lab_id: Uuid) -> OrchestratorResult<Option<WorkflowRunRecord>> {
        let row: Option<WorkflowRunRow> = sqlx::query_as("SELECT * FROM workflow_runs WHERE lab_id = ?")
            .bind(lab_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkflowRunRow::try_into_run).transpose()
    }

    async fn save(&self, run: &WorkflowRunRecord) -> OrchestratorResult<()> {
        upsert(&self.pool, run).await
    }

    async fn enqueue_signal(&self, workflow_id: &str, signal: WorkflowSignal) -> OrchestratorResult<()> {
        let mut tx = self.pool.begin().await?;
        let row: Option<(String,)> = sqlx::query_as("SELECT pending_signals_json FROM workflow_runs WHERE workflow_id = ?")
            .bind(workflow_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some((pending_json,)) = row else {
            return Err(OrchestratorError::Internal(format!("no workflow run {workflow_id}")));
        };

        let mut pending: Vec<WorkflowSignal> = parse_json(&pending_json)?;
        let already_pending = pending
            .iter()
            .any(|s| std::mem::discriminant(s) == std::mem::discriminant(&signal));
        if !already_pending {
            pending.push(signal);
        }

        sqlx::query("UPDATE workflow_runs SET pending_signals_json = ?, updated_at = ? WHERE workflow_id = ?")
            .bind(serde_json::to_string(&pending)?)
            .bind(Utc::now().to_rfc3339())
            .bind(workflow_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn renew_lease(&self, workflow_id: &str, new_expiry: DateTime<Utc>) -> OrchestratorResult<()> {
        sqlx::query("UPDATE workflow_runs SET lease_expires_at = ?, updated_at = ? WHERE workflow_id = ?")
            .bind(new_expiry.to_rfc3339())
            .bind(Utc::now().to_rfc3339())
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_expired_leases(&self) -> OrchestratorResult<Vec<WorkflowRunRecord>> {
        let rows: Vec<WorkflowRunRow> = sqlx::query_as(
            "SELECT * FROM workflow_runs WHERE status = 'running' AND lease_expires_at <= ?",
        )
        .bind(Utc::now().to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WorkflowRunRow::try_into_run).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{all_embedded_migrations, create_test_pool, Migrator};
    use chrono::Duration;
    use std::collections::HashMap;

    async fn migrated_pool() -> SqlitePool {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run_embedded_migrations(all_embedded_migrations()).await.unwrap();
        pool
    }

    fn fresh_run() -> WorkflowRunRecord {
        let now = Utc::now();
        WorkflowRunRecord {
            workflow_id: format!("wf-{}", Uuid::new_v4()),
            run_id: Uuid::new_v4().to_string(),
            lab_id: Uuid::new_v4(),
            owner_id: "alice".to_string(),
            cve_id: None,
            severity: Severity::Medium,
            ttl_hours: 2,
            requires_review: false,
            phase: WorkflowPhase::Lock,
            status: WorkflowRunStatus::Running,
            retry_counts: HashMap::new(),
            pending_signals: Vec::new(),
            error_category: None,
            lease_expires_at: now + Duration::seconds(60),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let pool = migrated_pool().await;
        let store = SqliteWorkflowStore::new(pool);
        let run = fresh_run();
        store.create(&run).await.unwrap();

        let fetched = store.get(&run.workflow_id).await.unwrap().unwrap();
        assert_eq!(fetched.lab_id, run.lab_id);
        assert_eq!(fetched.phase, WorkflowPhase::Lock);
    }

    #[tokio::test]
    async fn enqueue_signal_is_idempotent() {
        let pool = migrated_pool().await;
        let store = SqliteWorkflowStore::new(pool);
        let run = fresh_run();
        store.create(&run).await.unwrap();

        store.enqueue_signal(&run.workflow_id, WorkflowSignal::CancelLab).await.unwrap();
        store.enqueue_signal(&run.workflow_id, WorkflowSignal::CancelLab).await.unwrap();

        let fetched = store.get(&run.workflow_id).await.unwrap().unwrap();
        assert_eq!(fetched.pending_signals.len(), 1);
    }

    #[tokio::test]
    async fn expired_lease_is_listed_only_while_running() {
        let pool = migrated_pool().await;
        let store = SqliteWorkflowStore::new(pool);
        let mut run = fresh_run();
        run.lease_expires_at = Utc::now() - Duration::seconds(5);
        store.create(&run).await.unwrap();

        let expired = store.list_expired_leases().await.unwrap();
        assert_eq!(expired.len(), 1);

        run.status = WorkflowRunStatus::Completed;
        store.save(&run).await.unwrap();
        let expired = store.list_expired_leases().await.unwrap();
        assert!(expired.is_empty());
    }
}
