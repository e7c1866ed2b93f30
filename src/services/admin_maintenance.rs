//! Admin Maintenance (§4.8): a narrow surface for cleaning up leaked
//! runtime-layer resources. Admission is strict — admin role, an
//! explicit confirm flag, and zero active labs observed anywhere in the
//! system — and cleanup targets are identified only by a strict label
//! pattern owned by the core; anything that doesn't match is left
//! untouched.

use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::{CleanupManifest, CleanupTarget, LabStatus, Role};
use crate::domain::ports::{AdminCleanupRepository, LabFilter, LabRepository, RuntimeResourceManager};
use crate::domain::{OrchestratorError, OrchestratorResult};

pub struct AdminMaintenanceService<L: LabRepository, M: RuntimeResourceManager, C: AdminCleanupRepository> {
    lab_repository: Arc<L>,
    resource_manager: Arc<M>,
    cleanup_repository: Arc<C>,
    /// `<prefix>` in the strict label pattern `^<prefix>_<lab-id>_` (§4.8).
    resource_prefix: String,
}

impl<L: LabRepository, M: RuntimeResourceManager, C: AdminCleanupRepository> AdminMaintenanceService<L, M, C> {
    pub fn new(lab_repository: Arc<L>, resource_manager: Arc<M>, cleanup_repository: Arc<C>, resource_prefix: impl Into<String>) -> Self {
        Self { lab_repository, resource_manager, cleanup_repository, resource_prefix: resource_prefix.into() }
    }

    fn ownership_pattern(&self) -> Regex {
        // Constructed from a config value, not user input; `expect` is
        // appropriate — a malformed prefix is a deployment bug.
        Regex::new(&format!(
            r"^{}_(?P<lab_id>[0-9a-fA-F]{{8}}-[0-9a-fA-F]{{4}}-[0-9a-fA-F]{{4}}-[0-9a-fA-F]{{4}}-[0-9a-fA-F]{{12}})_",
            regex::escape(&self.resource_prefix)
        ))
        .expect("ownership pattern is a fixed, valid regex")
    }

    /// Run a cleanup pass. Refuses unless `role = admin`, `confirm =
    /// true`, and no lab anywhere is currently active (§4.8).
    pub async fn cleanup(&self, role: Role, confirm: bool, performed_by: &str) -> OrchestratorResult<CleanupManifest> {
        if role != Role::Admin {
            return Err(OrchestratorError::Forbidden("admin cleanup requires the admin role".to_string()));
        }
        if !confirm {
            return Err(OrchestratorError::Validation("admin cleanup requires an explicit confirm flag".to_string()));
        }

        let active = self.lab_repository.list(LabFilter { active_only: true, ..LabFilter::default() }).await?;
        if !active.is_empty() {
            return Err(OrchestratorError::Conflict(format!(
                "refusing cleanup: {} active lab(s) observed",
                active.len()
            )));
        }

        let pattern = self.ownership_pattern();
        let resources = self.resource_manager.list().await?;

        let mut removed = Vec::new();
        for resource in resources {
            let Some(captures) = pattern.captures(&resource.name) else {
                continue; // untagged / non-matching resources are never touched
            };
            let lab_id = captures.name("lab_id").and_then(|m| Uuid::parse_str(m.as_str()).ok());

            self.resource_manager.remove(&resource.name).await?;
            removed.push(CleanupTarget { resource_name: resource.name, matched_lab_id: lab_id });
        }

        let manifest = CleanupManifest {
            id: Uuid::new_v4(),
            performed_at: chrono::Utc::now(),
            performed_by: performed_by.to_string(),
            removed,
        };
        self.cleanup_repository.record(&manifest).await?;
        Ok(manifest)
    }
}

/// Convenience used by callers that only need to check whether cleanup
/// would currently be admissible, e.g. a health endpoint (out of scope
/// here, but the predicate is cheap to expose).
#[must_use]
pub const fn blocks_cleanup(status: LabStatus) -> bool {
    status.is_active()
}
