//! The Lab record — the central entity driving one ephemeral
//! exploit-rehearsal session (spec §3, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blueprint::Blueprint;
use super::guardrail::GuardrailSnapshot;
use super::workflow::{ProvisioningDetails, WorkflowHandle};

/// How a lab draft was populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabSource {
    QuickPick,
    Manual,
}

impl std::fmt::Display for LabSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuickPick => write!(f, "quick_pick"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Severity band of the rehearsal, drives guardrail checks (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// The caller's role, used by the TTL admin-override guardrail (§4.2.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Admin,
}

/// Lifecycle status (spec §4.1). Transitions are enforced exclusively by
/// the Mutation Service against the table in that section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    Draft,
    PendingGuardrail,
    Queued,
    Running,
    /// Terminal: guardrail rejection or workflow-fatal failure.
    Rejected,
    /// Terminal: user cancel or sweeper-driven cancel once provisioned.
    Completed,
    /// Terminal: TTL elapsed while queued/running.
    Expired,
}

impl LabStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Expired)
    }

    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Validates a transition against the state machine in spec §4.1.
    /// `queued -> queued` is allowed (idempotent workflow lock).
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::PendingGuardrail)
                | (Self::Draft, Self::Rejected)
                | (Self::PendingGuardrail, Self::Queued)
                | (Self::PendingGuardrail, Self::Rejected)
                | (Self::Queued, Self::Queued)
                | (Self::Queued, Self::Running)
                | (Self::Queued, Self::Completed)
                | (Self::Queued, Self::Rejected)
                | (Self::Queued, Self::Expired)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Rejected)
                | (Self::Running, Self::Expired)
        )
    }
}

impl std::fmt::Display for LabStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::PendingGuardrail => "pending_guardrail",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
            Self::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// The central entity (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lab {
    pub id: Uuid,
    pub owner_id: String,
    pub source: LabSource,
    pub cve_id: Option<String>,
    pub title: String,
    pub description: String,
    pub objective: String,
    pub severity: Severity,
    pub ttl_hours: u32,
    pub status: LabStatus,
    pub blueprint: Option<Blueprint>,
    pub guardrail_snapshot: Option<GuardrailSnapshot>,
    pub workflow_handle: Option<WorkflowHandle>,
    pub provisioning_details: Option<ProvisioningDetails>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lab {
    /// Checks invariants 1–3 from spec §3. Used by tests and as a
    /// debug-time sanity check after mutation; never called on the hot
    /// write path (the Mutation Service enforces transitions directly).
    #[must_use]
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.status == LabStatus::Draft
            && (self.blueprint.is_some()
                || self.guardrail_snapshot.is_some()
                || self.workflow_handle.is_some()
                || self.expires_at.is_some())
        {
            return Err("draft lab must have no blueprint/guardrail/workflow/expiry".to_string());
        }

        if matches!(self.status, LabStatus::Queued | LabStatus::Running) {
            let snapshot_ok = self.guardrail_snapshot.as_ref().is_some_and(|s| s.passed);
            if !snapshot_ok || self.expires_at.is_none() || self.workflow_handle.is_none() {
                return Err("active lab must carry a passed snapshot, expiry, and workflow handle".to_string());
            }
        }

        if self.status == LabStatus::Rejected {
            let snapshot_failed = self
                .guardrail_snapshot
                .as_ref()
                .is_some_and(|s| !s.passed);
            if self.guardrail_snapshot.is_some() && !snapshot_failed {
                return Err("rejected lab's snapshot, if present, must have passed=false".to_string());
            }
        }

        if self.ttl_hours == 0 || self.ttl_hours > 8 {
            return Err(format!("ttl_hours out of range: {}", self.ttl_hours));
        }

        Ok(())
    }
}
