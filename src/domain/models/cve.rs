//! CVE catalog entry — read-only lookup for quick-pick drafts (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lab::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CveCatalogEntry {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub published_at: DateTime<Utc>,
    /// 0.0–10.0, one decimal place of precision.
    pub exploitability_score: f32,
    pub description: String,
}
