//! Runtime resource manager port (§4.8): the boundary to the
//! containerization/microVM runtime layer, which this crate treats as
//! an external collaborator (§1 out-of-scope). Admin Maintenance only
//! lists and removes resources through this trait — it never talks to
//! Compose/Firecracker/k8s drivers directly.

use async_trait::async_trait;

use crate::domain::models::RuntimeResource;
use crate::domain::OrchestratorResult;

#[async_trait]
pub trait RuntimeResourceManager: Send + Sync {
    /// Enumerate runtime-layer resources visible to this manager (e.g.
    /// container networks), with whatever labels the runtime attaches.
    async fn list(&self) -> OrchestratorResult<Vec<RuntimeResource>>;

    /// Remove a single resource by name. Idempotent: removing an
    /// already-gone resource is not an error.
    async fn remove(&self, resource_name: &str) -> OrchestratorResult<()>;
}
