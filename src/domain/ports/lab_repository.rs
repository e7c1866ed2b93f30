//! Lab repository port — the only way any service layer touches lab
//! persistence. Status changes go through `compare_and_swap_status` so
//! the Mutation Service's check-and-set semantics (§4.3) are enforced
//! at the storage boundary, not just in application code.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{Lab, LabStatus};
use crate::domain::OrchestratorResult;

/// Filter criteria for listing labs.
#[derive(Debug, Clone, Default)]
pub struct LabFilter {
    pub owner_id: Option<String>,
    pub status: Option<LabStatus>,
    pub active_only: bool,
}

#[async_trait]
pub trait LabRepository: Send + Sync {
    /// Insert a brand-new draft lab.
    async fn create(&self, lab: &Lab) -> OrchestratorResult<()>;

    /// Fetch a lab by id.
    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Lab>>;

    /// List labs matching the given filter.
    async fn list(&self, filter: LabFilter) -> OrchestratorResult<Vec<Lab>>;

    /// The caller's currently active (queued or running) lab, if any —
    /// backs the at-most-one-active-lab-per-owner invariant (§3, §8).
    async fn get_active_by_owner(&self, owner_id: &str) -> OrchestratorResult<Option<Lab>>;

    /// Overwrite mutable fields (blueprint, guardrail snapshot, workflow
    /// handle, provisioning details) without touching `status`. Used by
    /// phases that attach data but do not themselves drive the state
    /// machine.
    async fn save(&self, lab: &Lab) -> OrchestratorResult<()>;

    /// Transactional check-and-set: succeeds only if the stored status
    /// is exactly `expected`, otherwise returns
    /// `OrchestratorError::Conflict` (§4.1, §7 — conflicts are not
    /// auto-retried by the caller).
    async fn compare_and_swap_status(
        &self,
        id: Uuid,
        expected: LabStatus,
        next: Lab,
    ) -> OrchestratorResult<()>;

    /// Labs whose `expires_at` has passed and whose status is still
    /// active, for the Expiry Sweeper (§4.7).
    async fn list_expired(&self) -> OrchestratorResult<Vec<Lab>>;
}
