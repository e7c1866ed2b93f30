//! Workflow launcher port: the boundary the Lab Use Case uses to start
//! and signal the durable provisioning workflow (§4.3, §4.4) without
//! depending on the concrete engine that drives it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{Severity, WorkflowHandle};
use crate::domain::OrchestratorResult;

/// Inputs to a new provisioning workflow execution (§4.4).
#[derive(Debug, Clone)]
pub struct WorkflowInput {
    pub lab_id: Uuid,
    pub owner_id: String,
    pub cve_id: Option<String>,
    pub severity: Severity,
    pub ttl_hours: u32,
    pub requires_review: bool,
}

#[async_trait]
pub trait WorkflowLauncher: Send + Sync {
    /// Start a new durable workflow execution for a just-confirmed lab.
    /// Returns as soon as the run is durably recorded; the workflow then
    /// drives itself to completion on the engine's own worker loop.
    async fn start(&self, input: WorkflowInput) -> OrchestratorResult<WorkflowHandle>;

    /// Deliver the idempotent `cancel-lab` signal (§4.4, §4.7).
    async fn cancel(&self, workflow_id: &str) -> OrchestratorResult<()>;
}
