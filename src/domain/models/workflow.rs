//! Workflow types: the lab-facing handle/result pair (§3) and the
//! durable execution state the Workflow Engine persists between
//! activities (§4.4, §9 durability requirement).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use super::lab::Severity;

/// Opaque reference to the workflow execution driving a lab, write-once
/// per lab (§4.5 `SetWorkflowHandle`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowHandle {
    pub workflow_id: String,
    pub run_id: String,
}

/// Free-form result persisted by the provisioning phase and, on
/// failure, the rejection reason (§4.4 `RejectLab`, §9 design note on
/// not overloading the blueprint field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningDetails {
    pub details: Value,
    pub reason: Option<String>,
}

impl ProvisioningDetails {
    #[must_use]
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self { details: Value::Null, reason: Some(reason.into()) }
    }

    #[must_use]
    pub fn from_details(details: Value) -> Self {
        Self { details, reason: None }
    }
}

/// Phases of the provisioning workflow (§4.4), in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Lock,
    GenerateBlueprint,
    ProvisionEnvironment,
    Validate,
    GateOnReadiness,
    HumanReview,
    Finalize,
    Done,
}

impl WorkflowPhase {
    /// Next phase in the fixed sequence; `HumanReview` is skipped by the
    /// caller when `requires_review` is false.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Lock => Self::GenerateBlueprint,
            Self::GenerateBlueprint => Self::ProvisionEnvironment,
            Self::ProvisionEnvironment => Self::Validate,
            Self::Validate => Self::GateOnReadiness,
            Self::GateOnReadiness => Self::HumanReview,
            Self::HumanReview => Self::Finalize,
            Self::Finalize | Self::Done => Self::Done,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::GenerateBlueprint => "generate_blueprint",
            Self::ProvisionEnvironment => "provision_environment",
            Self::Validate => "validate",
            Self::GateOnReadiness => "gate_on_readiness",
            Self::HumanReview => "human_review",
            Self::Finalize => "finalize",
            Self::Done => "done",
        }
    }

    /// Percent-complete contribution of reaching this phase, queried by
    /// read APIs (§4.4 `percent_complete`).
    #[must_use]
    pub const fn percent_complete(self) -> u8 {
        match self {
            Self::Lock => 5,
            Self::GenerateBlueprint => 20,
            Self::ProvisionEnvironment => 40,
            Self::Validate => 65,
            Self::GateOnReadiness => 80,
            Self::HumanReview => 90,
            Self::Finalize => 95,
            Self::Done => 100,
        }
    }
}

/// Terminal outcome categories at the workflow boundary (§6 exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowErrorCategory {
    RejectedByGuardrails,
    ProvisioningFailed,
    ValidationFailed,
    ReadinessTimeout,
    ReviewRejected,
    ReviewTimeout,
    UserCancelled,
    TtlExpired,
}

impl std::fmt::Display for WorkflowErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RejectedByGuardrails => "rejected-by-guardrails",
            Self::ProvisioningFailed => "provisioning-failed",
            Self::ValidationFailed => "validation-failed",
            Self::ReadinessTimeout => "readiness-timeout",
            Self::ReviewRejected => "review-rejected",
            Self::ReviewTimeout => "review-timeout",
            Self::UserCancelled => "user-cancelled",
            Self::TtlExpired => "ttl-expired",
        };
        write!(f, "{s}")
    }
}

/// Status of a durable workflow run, independent of the lab's own
/// status (the run record is the engine's bookkeeping; the lab record
/// is the user-visible state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A signal delivered to a running workflow (§4.4 signals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowSignal {
    /// Idempotent; payload ignored.
    CancelLab,
    HumanReview { approved: bool, notes: String, reviewed_by: String },
}

/// Durable, resumable state for one workflow execution. Persisted after
/// every phase transition so a worker restart can pick the run back up
/// (§9 durability requirement; §4.7 sweeper relies on this surviving a
/// crashed worker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunRecord {
    pub workflow_id: String,
    pub run_id: String,
    pub lab_id: Uuid,
    pub owner_id: String,
    pub cve_id: Option<String>,
    pub severity: Severity,
    pub ttl_hours: u32,
    pub requires_review: bool,
    pub phase: WorkflowPhase,
    pub status: WorkflowRunStatus,
    /// Retry attempts used per phase, for the activity backoff policy.
    pub retry_counts: HashMap<String, u32>,
    /// Signals not yet observed by the workflow loop.
    pub pending_signals: Vec<WorkflowSignal>,
    /// Terminal failure category, set once `status != Running`.
    pub error_category: Option<WorkflowErrorCategory>,
    /// Worker lease: a worker renews this while actively driving the
    /// run; an expired lease on a `Running` record means the run is
    /// eligible for recovery by another worker.
    pub lease_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRunRecord {
    #[must_use]
    pub fn current_phase_name(&self) -> String {
        self.phase.as_str().to_string()
    }

    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        self.phase.percent_complete()
    }
}
