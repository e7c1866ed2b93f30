//! Admin Maintenance types (§4.8): the manifest emitted by a runtime
//! cleanup run (§11 supplemented feature — persisted so repeated runs
//! are auditable, not just printed).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A single runtime-layer resource observed by the resource lister,
/// e.g. a container network or volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeResource {
    pub name: String,
    pub labels: HashMap<String, String>,
}

/// One resource actually removed by a cleanup run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupTarget {
    pub resource_name: String,
    pub matched_lab_id: Option<Uuid>,
}

/// The manifest of a single Admin Maintenance cleanup run (§4.8).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupManifest {
    pub id: Uuid,
    pub performed_at: DateTime<Utc>,
    pub performed_by: String,
    pub removed: Vec<CleanupTarget>,
}
