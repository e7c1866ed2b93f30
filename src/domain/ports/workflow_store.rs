//! Workflow run persistence port — backs the durable execution engine's
//! crash recovery (§9 durability requirement). Every phase transition
//! and signal delivery round-trips through here before it is acted on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::{WorkflowRunRecord, WorkflowSignal};
use crate::domain::OrchestratorResult;

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a freshly created run record.
    async fn create(&self, run: &WorkflowRunRecord) -> OrchestratorResult<()>;

    /// Fetch a run by its workflow id.
    async fn get(&self, workflow_id: &str) -> OrchestratorResult<Option<WorkflowRunRecord>>;

    /// Fetch the run driving a given lab, if one exists.
    async fn get_by_lab_id(&self, lab_id: Uuid) -> OrchestratorResult<Option<WorkflowRunRecord>>;

    /// Persist the full record after a phase transition or status change.
    async fn save(&self, run: &WorkflowRunRecord) -> OrchestratorResult<()>;

    /// Append a signal to a run's pending queue; delivering `CancelLab`
    /// twice is a no-op (§4.4 idempotent signalling).
    async fn enqueue_signal(&self, workflow_id: &str, signal: WorkflowSignal) -> OrchestratorResult<()>;

    /// Extend a run's lease, proving this worker is still driving it.
    async fn renew_lease(&self, workflow_id: &str, new_expiry: DateTime<Utc>) -> OrchestratorResult<()>;

    /// Runs that are `Running` but whose lease has expired — eligible
    /// for recovery by any worker (§9).
    async fn list_expired_leases(&self) -> OrchestratorResult<Vec<WorkflowRunRecord>>;
}
