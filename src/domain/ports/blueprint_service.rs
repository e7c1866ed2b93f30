//! Blueprint generation port (§4.3 `GenerateBlueprint`). Deliberately a
//! port rather than a concrete function: the reference implementation is
//! deterministic template expansion, but swapping in an LLM-backed
//! collaborator later should not move the caller.

use async_trait::async_trait;

use crate::domain::models::{Blueprint, Lab};
use crate::domain::OrchestratorResult;

#[async_trait]
pub trait BlueprintService: Send + Sync {
    /// Produce a blueprint for a draft lab. Pure with respect to the
    /// lab's fields; does not mutate or persist anything itself.
    async fn generate(&self, lab: &Lab) -> OrchestratorResult<Blueprint>;
}
