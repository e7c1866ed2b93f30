//! Guardrail snapshot types produced by the Guardrail Evaluator (§4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a single guardrail check. Only `Error` can fail the
/// overall snapshot (spec §3 invariant on `GuardrailSnapshot::passed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Error,
    Warning,
    Info,
}

/// A single named check result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailCheck {
    pub name: String,
    pub passed: bool,
    pub severity: CheckSeverity,
    pub message: String,
}

impl GuardrailCheck {
    #[must_use]
    pub fn blocks_overall(&self) -> bool {
        !self.passed && self.severity == CheckSeverity::Error
    }
}

/// The full snapshot persisted on the lab record at confirmation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailSnapshot {
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
    pub checks: Vec<GuardrailCheck>,
}

impl GuardrailSnapshot {
    /// `passed` must equal `∀ check: check.passed ∨ check.severity ≠ error` (§3).
    #[must_use]
    pub fn from_checks(checks: Vec<GuardrailCheck>, timestamp: DateTime<Utc>) -> Self {
        let passed = !checks.iter().any(GuardrailCheck::blocks_overall);
        Self { passed, timestamp, checks }
    }

    /// Human-readable blocking messages, for surfacing to the caller of
    /// `ConfirmRequest` on rejection.
    #[must_use]
    pub fn blocking_messages(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| c.blocks_overall())
            .map(|c| format!("{}: {}", c.name, c.message))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, passed: bool, severity: CheckSeverity) -> GuardrailCheck {
        GuardrailCheck { name: name.to_string(), passed, severity, message: "msg".to_string() }
    }

    #[test]
    fn passes_when_no_error_check_fails() {
        let snapshot = GuardrailSnapshot::from_checks(
            vec![check("a", true, CheckSeverity::Error), check("b", false, CheckSeverity::Warning)],
            Utc::now(),
        );
        assert!(snapshot.passed);
    }

    #[test]
    fn fails_when_any_error_check_fails() {
        let snapshot = GuardrailSnapshot::from_checks(
            vec![check("a", true, CheckSeverity::Error), check("b", false, CheckSeverity::Error)],
            Utc::now(),
        );
        assert!(!snapshot.passed);
        assert_eq!(snapshot.blocking_messages().len(), 1);
    }
}
