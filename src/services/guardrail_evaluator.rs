//! Guardrail Evaluator (§4.2): a pure, deterministic function over a
//! draft lab's fields, the caller's role, and the owner's current active
//! lab count. Never touches storage or the clock beyond the timestamp it
//! is handed, so the same inputs always produce the same
//! [`GuardrailSnapshot`]. The use case is responsible for fetching
//! `active_count` transactionally before calling `evaluate` (§4.2, §5).

use chrono::{DateTime, Utc};

use crate::config::GuardrailConfig;
use crate::domain::models::{CheckSeverity, GuardrailCheck, GuardrailSnapshot, Lab, Role, Severity};

const MIN_JUSTIFICATION_LEN: usize = 50;

pub struct GuardrailEvaluator {
    config: GuardrailConfig,
}

impl GuardrailEvaluator {
    #[must_use]
    pub const fn new(config: GuardrailConfig) -> Self {
        Self { config }
    }

    /// Evaluate every check in §4.2 for a lab about to be confirmed,
    /// producing the snapshot that `ConfirmRequest` persists (§4.3).
    #[must_use]
    pub fn evaluate(
        &self,
        lab: &Lab,
        role: Role,
        justification: Option<&str>,
        active_count: u32,
        now: DateTime<Utc>,
    ) -> GuardrailSnapshot {
        let checks = vec![
            self.check_active_lab_limit(active_count),
            self.check_critical_justification(lab, justification),
            self.check_high_severity_advisory(lab),
            self.check_ttl_maximum(lab),
            self.check_ttl_admin_override(lab, role),
        ];
        GuardrailSnapshot::from_checks(checks, now)
    }

    /// Check 1 — Active-lab limit (§4.2.1, invariant 4): the owner must
    /// have zero labs currently in `{queued, running}`.
    fn check_active_lab_limit(&self, active_count: u32) -> GuardrailCheck {
        let passed = active_count == 0;
        GuardrailCheck {
            name: "active_lab_limit".to_string(),
            passed,
            severity: CheckSeverity::Error,
            message: if passed {
                "no other active lab for this owner".to_string()
            } else {
                format!("owner already has {active_count} active lab(s); only one is allowed at a time")
            },
        }
    }

    /// Check 2 — Critical-severity justification (§4.2.2, invariant 6):
    /// `severity = critical` requires a trimmed justification of at
    /// least 50 characters.
    fn check_critical_justification(&self, lab: &Lab, justification: Option<&str>) -> GuardrailCheck {
        let name = "critical_severity_justification".to_string();
        if lab.severity != Severity::Critical {
            return GuardrailCheck {
                name,
                passed: true,
                severity: CheckSeverity::Error,
                message: "not applicable below critical severity".to_string(),
            };
        }

        let trimmed_len = justification.map(str::trim).map(str::len).unwrap_or(0);
        let passed = trimmed_len >= MIN_JUSTIFICATION_LEN;
        GuardrailCheck {
            name,
            passed,
            severity: CheckSeverity::Error,
            message: if passed {
                "justification meets the minimum length".to_string()
            } else {
                format!(
                    "critical-severity labs require a justification of at least {MIN_JUSTIFICATION_LEN} \
                     trimmed characters, got {trimmed_len}"
                )
            },
        }
    }

    /// Check 3 — High-severity advisory (§4.2.3): never blocks the
    /// overall snapshot, always `warning` when it fires.
    fn check_high_severity_advisory(&self, lab: &Lab) -> GuardrailCheck {
        let fires = lab.severity == Severity::High;
        GuardrailCheck {
            name: "high_severity_advisory".to_string(),
            passed: !fires,
            severity: CheckSeverity::Warning,
            message: if fires {
                "high-severity rehearsal: review the blueprint's isolation posture before confirming".to_string()
            } else {
                "severity is not high".to_string()
            },
        }
    }

    /// Check 4 — TTL maximum (§4.2.4, invariant 5): `ttl_hours <= 8`.
    fn check_ttl_maximum(&self, lab: &Lab) -> GuardrailCheck {
        let passed = lab.ttl_hours >= 1 && lab.ttl_hours <= self.config.max_ttl_hours_absolute;
        GuardrailCheck {
            name: "ttl_maximum".to_string(),
            passed,
            severity: CheckSeverity::Error,
            message: if passed {
                "ttl_hours within the absolute maximum".to_string()
            } else {
                format!("ttl_hours {} exceeds the absolute maximum of {}h", lab.ttl_hours, self.config.max_ttl_hours_absolute)
            },
        }
    }

    /// Check 5 — TTL admin-only range (§4.2.5, invariant 5): `ttl_hours >
    /// 4` requires `role = admin`. Per the testable properties in §8,
    /// when an admin exceeds the user bound this must be recorded as
    /// `passed=true, severity=info` — never `passed=true, severity=error`.
    fn check_ttl_admin_override(&self, lab: &Lab, role: Role) -> GuardrailCheck {
        let name = "ttl_admin_override".to_string();
        let exceeds_user_bound = lab.ttl_hours > self.config.max_ttl_hours_user;

        if !exceeds_user_bound {
            return GuardrailCheck {
                name,
                passed: true,
                severity: CheckSeverity::Info,
                message: "ttl_hours within the user-role bound".to_string(),
            };
        }

        match role {
            Role::Admin => GuardrailCheck {
                name,
                passed: true,
                severity: CheckSeverity::Info,
                message: format!(
                    "ttl_hours {} exceeds the {}h user bound, permitted by admin role",
                    lab.ttl_hours, self.config.max_ttl_hours_user
                ),
            },
            Role::User => GuardrailCheck {
                name,
                passed: false,
                severity: CheckSeverity::Error,
                message: format!(
                    "ttl_hours {} exceeds the {}h limit for non-admin callers",
                    lab.ttl_hours, self.config.max_ttl_hours_user
                ),
            },
        }
    }
}
