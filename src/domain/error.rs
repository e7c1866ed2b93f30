//! Collaborator-specific error types.
//!
//! Each enum represents errors surfaced by a single external
//! collaborator the orchestrator drives through a port. Keeping these
//! separate from [`super::errors::OrchestratorError`] lets each
//! activity classify failures as transient or permanent before they
//! cross into the workflow engine's retry policy.

use thiserror::Error;

/// Errors from the readiness prober (§4.6).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("tcp connect failed: {0}")]
    TcpConnectFailed(String),

    #[error("http probe failed: {0}")]
    HttpFailed(String),

    #[error("deadline exceeded after {elapsed_secs}s, last error: {last_error}")]
    DeadlineExceeded { elapsed_secs: u64, last_error: String },

    #[error("probe cancelled")]
    Cancelled,
}

impl ProbeError {
    /// All probe failures are transient from the workflow's point of
    /// view up until the deadline; only the deadline itself is terminal.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::DeadlineExceeded { .. } | Self::Cancelled)
    }
}

/// Errors from the provisioner client (§4.3 of external interfaces).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionerError {
    #[error("failed to start provisioning job: {0}")]
    StartFailed(String),

    #[error("provisioning job failed: {0}")]
    JobFailed(String),

    #[error("environment validation failed: {0}")]
    ValidationFailed(String),

    #[error("status poll failed: {0}")]
    PollFailed(String),

    #[error("teardown failed: {0}")]
    TeardownFailed(String),
}

impl ProvisionerError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::PollFailed(_) | Self::StartFailed(_))
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::JobFailed(_) | Self::ValidationFailed(_))
    }
}

/// Errors surfaced by a workflow activity, classified for the engine's
/// retry policy (§4.4 activity options).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivityError {
    /// Should be retried per the activity's backoff policy.
    #[error("transient activity failure: {0}")]
    Transient(String),

    /// Must not be retried; routes the workflow straight to rejection.
    #[error("non-retryable activity failure: {0}")]
    NonRetryable(String),
}

impl ActivityError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::NonRetryable(m) => m,
        }
    }
}

impl From<ProbeError> for ActivityError {
    fn from(err: ProbeError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::NonRetryable(err.to_string())
        }
    }
}

impl From<ProvisionerError> for ActivityError {
    fn from(err: ProvisionerError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::NonRetryable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_deadline_is_not_transient() {
        let err = ProbeError::DeadlineExceeded { elapsed_secs: 120, last_error: "refused".into() };
        assert!(!err.is_transient());
    }

    #[test]
    fn probe_connect_failure_is_transient() {
        let err = ProbeError::TcpConnectFailed("refused".into());
        assert!(err.is_transient());
    }

    #[test]
    fn provisioner_job_failed_is_permanent() {
        let err = ProvisionerError::JobFailed("exploded".into());
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[test]
    fn activity_error_from_probe_deadline_is_non_retryable() {
        let probe = ProbeError::DeadlineExceeded { elapsed_secs: 5, last_error: "x".into() };
        let activity: ActivityError = probe.into();
        assert!(!activity.is_retryable());
    }
}
