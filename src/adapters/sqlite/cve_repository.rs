//! SQLite-backed `CveRepository` (§11 supplemented feature).

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{CveCatalogEntry, Severity};
use crate::domain::ports::CveRepository;

use super::parse_datetime;

pub struct SqliteCveRepository {
    pool: SqlitePool,
}

impl SqliteCveRepository {
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

#[derive(sqlx::FromRow)]
struct CveRow {
    id: String,
    title: String,
    severity: String,
    published_at: String,
    exploitability_score: f64,
    description: String,
}

impl CveRow {
    fn try_into_entry(self) -> OrchestratorResult<CveCatalogEntry> {
        Ok(CveCatalogEntry {
            id: self.id,
            title: self.title,
            severity: severity_from_str(&self.severity)?,
            published_at: parse_datetime(&self.published_at)?,
            exploitability_score: self.exploitability_score as f32,
            description: self.description,
        })
    }
}

#[async_trait]
impl CveRepository for SqliteCveRepository {
    async fn get(&self, id: &str) -> OrchestratorResult<Option<CveCatalogEntry>> {
        let row: Option<CveRow> = sqlx::query_as("SELECT * FROM cve_catalog WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CveRow::try_into_entry).transpose()
    }

    async fn list(&self, limit: usize) -> OrchestratorResult<Vec<CveCatalogEntry>> {
        let rows: Vec<CveRow> = sqlx::query_as("SELECT * FROM cve_catalog ORDER BY published_at DESC LIMIT ?")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CveRow::try_into_entry).collect()
    }

    async fn upsert(&self, entry: &CveCatalogEntry) -> OrchestratorResult<()> {
        sqlx::query(
            "INSERT INTO cve_catalog (id, title, severity, published_at, exploitability_score, description)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                severity = excluded.severity,
                published_at = excluded.published_at,
                exploitability_score = excluded.exploitability_score,
                description = excluded.description",
        )
        .bind(&entry.id)
        .bind(&entry.title)
        .bind(severity_to_str(entry.severity))
        .bind(entry.published_at.to_rfc3339())
        .bind(f64::from(entry.exploitability_score))
        .bind(&entry.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{all_embedded_migrations, create_test_pool, Migrator};
    use chrono::Utc;

    async fn migrated_pool() -> SqlitePool {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run_embedded_migrations(all_embedded_migrations()).await.unwrap();
        pool
    }

    fn entry() -> CveCatalogEntry {
        CveCatalogEntry {
            id: "CVE-2024-3094".to_string(),
            title: "xz backdoor".to_string(),
            severity: Severity::Critical,
            published_at: Utc::now(),
            exploitability_score: 9.9,
            description: "liblzma backdoor injecting a malicious sshd code path".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let pool = migrated_pool().await;
        let repo = SqliteCveRepository::new(pool);
        repo.upsert(&entry()).await.unwrap();

        let fetched = repo.get("CVE-2024-3094").await.unwrap().unwrap();
        assert_eq!(fetched.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_replaces() {
        let pool = migrated_pool().await;
        let repo = SqliteCveRepository::new(pool);
        repo.upsert(&entry()).await.unwrap();
        let mut updated = entry();
        updated.title = "xz utils supply chain backdoor".to_string();
        repo.upsert(&updated).await.unwrap();

        let fetched = repo.get("CVE-2024-3094").await.unwrap().unwrap();
        assert_eq!(fetched.title, "xz utils supply chain backdoor");

        let all = repo.list(10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn get_missing_entry_returns_none() {
        let pool = migrated_pool().await;
        let repo = SqliteCveRepository::new(pool);
        assert!(repo.get("CVE-0000-0000").await.unwrap().is_none());
    }
}
