//! CVE catalog repository port (§11 supplemented feature: quick-pick
//! lookup backing `LabSource::QuickPick` drafts).

use async_trait::async_trait;

use crate::domain::models::CveCatalogEntry;
use crate::domain::OrchestratorResult;

#[async_trait]
pub trait CveRepository: Send + Sync {
    /// Fetch a catalog entry by CVE id, e.g. `"CVE-2024-3094"`.
    async fn get(&self, id: &str) -> OrchestratorResult<Option<CveCatalogEntry>>;

    /// List catalog entries, most recently published first.
    async fn list(&self, limit: usize) -> OrchestratorResult<Vec<CveCatalogEntry>>;

    /// Insert or replace a catalog entry (seeding, §10.4).
    async fn upsert(&self, entry: &CveCatalogEntry) -> OrchestratorResult<()>;
}
