//! Crate-wide error taxonomy for the lab lifecycle orchestrator.
//!
//! Mirrors the error kinds laid out by the orchestrator's external
//! interfaces: `validation`, `not_found`, `forbidden`, `conflict`,
//! `unavailable`, `timeout`, `internal`. Collaborator-specific errors
//! (probe, provisioner, workflow activity) live in [`super::error`] and
//! convert into this enum at the use-case/activity boundary.

use thiserror::Error;
use uuid::Uuid;

use super::models::guardrail::GuardrailSnapshot;

/// Coarse category used by transport-layer mapping and retry policy.
///
/// The host layer (gRPC handlers, out of scope here) maps each kind to a
/// transport status code; the workflow engine uses it to decide whether
/// an activity failure is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Unavailable,
    Timeout,
    Internal,
}

impl ErrorKind {
    /// Transient errors are retried by the workflow engine's activity
    /// retry policy (§7 propagation policy); terminal errors route
    /// straight to the rejection path.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Unavailable | Self::Timeout)
    }
}

/// The crate-wide error type returned by use cases, the mutation
/// service, and workflow activities.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("lab not found: {0}")]
    LabNotFound(Uuid),

    #[error("cve not found: {0}")]
    CveNotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("deadline exceeded: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// `ConfirmRequest` failed the guardrail gate. Carries the full
    /// snapshot so the caller can render the exact blocking messages.
    #[error("guardrails rejected the request")]
    GuardrailsRejected(Box<GuardrailSnapshot>),
}

impl OrchestratorError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::GuardrailsRejected(_) => ErrorKind::Validation,
            Self::LabNotFound(_) | Self::CveNotFound(_) => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::Internal("row not found".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {err}"))
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
