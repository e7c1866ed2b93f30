//! Provisioning backend port — the boundary to the external collaborator
//! that actually stands up (and tears down) a rehearsal environment
//! (§6). Everything on the other side of this trait is out of scope for
//! this crate: we only define the contract and drive it with retries.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::ProvisionerError;
use crate::domain::models::Blueprint;

/// Result of a successful provisioning call.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub host: String,
    pub port: u16,
    pub details: Value,
}

/// Result of a successful validation call.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub details: Value,
}

#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Start provisioning per the blueprint's environment plan. Returns
    /// as soon as the backend accepts the job; completion is observed
    /// via `poll`.
    async fn start(&self, lab_id: uuid::Uuid, blueprint: &Blueprint) -> Result<String, ProvisionerError>;

    /// Poll an in-flight provisioning job. `Ok(None)` means still
    /// running; the caller is responsible for backoff between polls.
    async fn poll(&self, job_id: &str) -> Result<Option<ProvisionOutcome>, ProvisionerError>;

    /// Run the blueprint's validation steps against a provisioned
    /// environment (§4.4 `Validate` phase).
    async fn validate(&self, job_id: &str, blueprint: &Blueprint) -> Result<ValidationOutcome, ProvisionerError>;

    /// Tear down a provisioned (or partially provisioned) environment.
    /// Called on cancellation, expiry, and validation/readiness failure.
    async fn teardown(&self, job_id: &str) -> Result<(), ProvisionerError>;
}
