//! Persistence port for Admin Maintenance cleanup manifests (§11
//! supplemented feature: spec §4.8 says the operation "emits a
//! manifest"; we persist it so repeated runs are auditable).

use async_trait::async_trait;

use crate::domain::models::CleanupManifest;
use crate::domain::OrchestratorResult;

#[async_trait]
pub trait AdminCleanupRepository: Send + Sync {
    async fn record(&self, manifest: &CleanupManifest) -> OrchestratorResult<()>;

    /// Most recent cleanup runs, newest first.
    async fn list_recent(&self, limit: usize) -> OrchestratorResult<Vec<CleanupManifest>>;
}
