//! SQLite-backed `LabRepository` (§10.4).

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Lab, LabSource, LabStatus, Severity};
use crate::domain::ports::{LabFilter, LabRepository};

use super::{parse_datetime, parse_optional_datetime, parse_optional_json, parse_uuid};

pub struct SqliteLabRepository {
    pool: SqlitePool,
}

impl SqliteLabRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn source_to_str(source: LabSource) -> &'static str {
    match source {
        LabSource::QuickPick => "quick_pick",
        LabSource::Manual => "manual",
    }
}

fn source_from_str(s: &str) -> OrchestratorResult<LabSource> {
    match s {
        "quick_pick" => Ok(LabSource::QuickPick),
        "manual" => Ok(LabSource::Manual),
        other => Err(OrchestratorError::Internal(format!("unknown lab source: {other}"))),
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

fn status_to_str(status: LabStatus) -> &'static str {
    match status {
        LabStatus::Draft => "draft",
        LabStatus::PendingGuardrail => "pending_guardrail",
        LabStatus::Queued => "queued",
        LabStatus::Running => "running",
        LabStatus::Rejected => "rejected",
        LabStatus::Completed => "completed",
        LabStatus::Expired => "expired",
    }
}

fn status_from_str(s: &str) -> OrchestratorResult<LabStatus> {
    match s {
        "draft" => Ok(LabStatus::Draft),
        "pending_guardrail" => Ok(LabStatus::PendingGuardrail),
        "queued" => Ok(LabStatus::Queued),
        "running" => Ok(LabStatus::Running),
        "rejected" => Ok(LabStatus::Rejected),
        "completed" => Ok(LabStatus::Completed),
        "expired" => Ok(LabStatus::Expired),
        other => Err(OrchestratorError::Internal(format!("unknown lab status: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct LabRow {
    id: String,
    owner_id: String,
    source: String,
    cve_id: Option<String>,
    title: String,
    description: String,
    objective: String,
    severity: String,
    ttl_hours: i64,
    status: String,
    blueprint_json: Option<String>,
    guardrail_snapshot_json: Option<String>,
    workflow_handle_json: Option<String>,
    provisioning_details_json: Option<String>,
    expires_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl LabRow {
    fn try_into_lab(self) -> OrchestratorResult<Lab> {
        Ok(Lab {
            id: parse_uuid(&self.id)?,
            owner_id: self.owner_id,
            source: source_from_str(&self.source)?,
            cve_id: self.cve_id,
            title: self.title,
            description: self.description,
            objective: self.objective,
            severity: severity_from_str(&self.severity)?,
            ttl_hours: u32::try_from(self.ttl_hours)
                .map_err(|_| OrchestratorError::Internal("ttl_hours out of range".to_string()))?,
            status: status_from_str(&self.status)?,
            blueprint: parse_optional_json(self.blueprint_json)?,
            guardrail_snapshot: parse_optional_json(self.guardrail_snapshot_json)?,
            workflow_handle: parse_optional_json(self.workflow_handle_json)?,
            provisioning_details: parse_optional_json(self.provisioning_details_json)?,
            expires_at: parse_optional_datetime(self.expires_at)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

async fn upsert(pool: &SqlitePool, lab: &Lab) -> OrchestratorResult<()> {
    sqlx::query(
        "INSERT INTO labs (
            id, owner_id, source, cve_id, title, description, objective, severity, ttl_hours, status,
            blueprint_json, guardrail_snapshot_json, workflow_handle_json, provisioning_details_json,
            expires_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            owner_id = excluded.owner_id,
            source = excluded.source,
            cve_id = excluded.cve_id,
            title = excluded.title,
            description = excluded.description,
            objective = excluded.objective,
            severity = excluded.severity,
            ttl_hours = excluded.ttl_hours,
            status = excluded.status,
            blueprint_json = excluded.blueprint_json,
            guardrail_snapshot_json = excluded.guardrail_snapshot_json,
            workflow_handle_json = excluded.workflow_handle_json,
            provisioning_details_json = excluded.provisioning_details_json,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at",
    )
    .bind(lab.id.to_string())
    .bind(&lab.owner_id)
    .bind(source_to_str(lab.source))
    .bind(&lab.cve_id)
    .bind(&lab.title)
    .bind(&lab.description)
    .bind(&lab.objective)
    .bind(severity_to_str(lab.severity))
    .bind(i64::from(lab.ttl_hours))
    .bind(status_to_str(lab.status))
    .bind(lab.blueprint.as_ref().map(serde_json::to_string).transpose()?)
    .bind(lab.guardrail_snapshot.as_ref().map(serde_json::to_string).transpose()?)
    .bind(lab.workflow_handle.as_ref().map(serde_json::to_string).transpose()?)
    .bind(lab.provisioning_details.as_ref().map(serde_json::to_string).transpose()?)
    .bind(lab.expires_at.map(|t| t.to_rfc3339()))
    .bind(lab.created_at.to_rfc3339())
    .bind(lab.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

#[async_trait]
impl LabRepository for SqliteLabRepository {
    async fn create(&self, lab: &Lab) -> OrchestratorResult<()> {
        upsert(&self.pool, lab).await
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Lab>> {
        let row: Option<LabRow> = sqlx::query_as("SELECT * FROM labs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(LabRow::try_into_lab).transpose()
    }

    async fn list(&self, filter: LabFilter) -> OrchestratorResult<Vec<Lab>> {
        let mut sql = "SELECT * FROM labs WHERE 1 = 1".to_string();
        if filter.owner_id.is_some() {
            sql.push_str(" AND owner_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.active_only {
            sql.push_str(" AND status IN ('queued', 'running')");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query_as::<_, LabRow>(&sql);
        if let Some(owner_id) = &filter.owner_id {
            query = query.bind(owner_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status_to_str(status));
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(LabRow::try_into_lab).collect()
    }

    async fn get_active_by_owner(&self, owner_id: &str) -> OrchestratorResult<Option<Lab>> {
        let row: Option<LabRow> = sqlx::query_as(
            "SELECT * FROM labs WHERE owner_id = ? AND status IN ('queued', 'running') LIMIT 1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(LabRow::try_into_lab).transpose()
    }

    async fn save(&self, lab: &Lab) -> OrchestratorResult<()> {
        upsert(&self.pool, lab).await
    }

    async fn compare_and_swap_status(&self, id: Uuid, expected: LabStatus, next: Lab) -> OrchestratorResult<()> {
        let mut tx = self.pool.begin().await?;
        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM labs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

        match current {
            None => return Err(OrchestratorError::LabNotFound(id)),
            Some((status,)) if status_from_str(&status)? != expected => {
                return Err(OrchestratorError::Conflict(format!(
                    "lab {id} status is {status}, expected {expected}"
                )));
            }
            Some(_) => {}
        }

        sqlx::query(
            "UPDATE labs SET
                status = ?, blueprint_json = ?, guardrail_snapshot_json = ?, workflow_handle_json = ?,
                provisioning_details_json = ?, expires_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status_to_str(next.status))
        .bind(next.blueprint.as_ref().map(serde_json::to_string).transpose()?)
        .bind(next.guardrail_snapshot.as_ref().map(serde_json::to_string).transpose()?)
        .bind(next.workflow_handle.as_ref().map(serde_json::to_string).transpose()?)
        .bind(next.provisioning_details.as_ref().map(serde_json::to_string).transpose()?)
        .bind(next.expires_at.map(|t| t.to_rfc3339()))
        .bind(next.updated_at.to_rfc3339())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_expired(&self) -> OrchestratorResult<Vec<Lab>> {
        let rows: Vec<LabRow> = sqlx::query_as(
            "SELECT * FROM labs WHERE status IN ('queued', 'running') AND expires_at IS NOT NULL AND expires_at <= ?",
        )
        .bind(Utc::now().to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LabRow::try_into_lab).collect()
    }
}
