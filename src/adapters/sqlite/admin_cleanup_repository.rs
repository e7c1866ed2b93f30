//! SQLite-backed `AdminCleanupRepository` (§4.8, §11 supplemented feature).

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::CleanupManifest;
use crate::domain::ports::AdminCleanupRepository;

use super::{parse_datetime, parse_json, parse_uuid};

pub struct SqliteAdminCleanupRepository {
    pool: SqlitePool,
}

impl SqliteAdminCleanupRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CleanupManifestRow {
    id: String,
    performed_at: String,
    performed_by: String,
    removed_json: String,
}

impl CleanupManifestRow {
    fn try_into_manifest(self) -> OrchestratorResult<CleanupManifest> {
        Ok(CleanupManifest {
            id: parse_uuid(&self.id)?,
            performed_at: parse_datetime(&self.performed_at)?,
            performed_by: self.performed_by,
            removed: parse_json(&self.removed_json)?,
        })
    }
}

#[async_trait]
impl AdminCleanupRepository for SqliteAdminCleanupRepository {
    async fn record(&self, manifest: &CleanupManifest) -> OrchestratorResult<()> {
        sqlx::query(
            "INSERT INTO cleanup_manifests (id, performed_at, performed_by, removed_json) VALUES (?, ?, ?, ?)",
        )
        .bind(manifest.id.to_string())
        .bind(manifest.performed_at.to_rfc3339())
        .bind(&manifest.performed_by)
        .bind(serde_json::to_string(&manifest.removed)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> OrchestratorResult<Vec<CleanupManifest>> {
        let rows: Vec<CleanupManifestRow> = sqlx::query_as(
            "SELECT * FROM cleanup_manifests ORDER BY performed_at DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CleanupManifestRow::try_into_manifest).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{all_embedded_migrations, create_test_pool, Migrator};
    use crate::domain::models::CleanupTarget;
    use chrono::Utc;
    use uuid::Uuid;

    async fn migrated_pool() -> SqlitePool {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run_embedded_migrations(all_embedded_migrations()).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn record_then_list_recent_is_newest_first() {
        let pool = migrated_pool().await;
        let repo = SqliteAdminCleanupRepository::new(pool);

        let older = CleanupManifest {
            id: Uuid::new_v4(),
            performed_at: Utc::now() - chrono::Duration::hours(1),
            performed_by: "alice".to_string(),
            removed: vec![CleanupTarget { resource_name: "rehearsal_x_network".to_string(), matched_lab_id: None }],
        };
        let newer = CleanupManifest {
            id: Uuid::new_v4(),
            performed_at: Utc::now(),
            performed_by: "bob".to_string(),
            removed: vec![],
        };
        repo.record(&older).await.unwrap();
        repo.record(&newer).await.unwrap();

        let recent = repo.list_recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].performed_by, "bob");
    }
}
