//! Worker configuration schema (§10.3). Lives outside `domain` because it
//! composes the logging infrastructure's own config type; the domain
//! layer stays free of anything resembling a wire or storage format.

use serde::{Deserialize, Serialize};

use crate::infrastructure::logging::config::LogConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LogConfig,
    pub sweeper: SweeperConfig,
    pub prober: ProberConfig,
    pub workflow: WorkflowConfig,
    pub guardrails: GuardrailConfig,
    pub collaborators: CollaboratorConfig,
    pub admin: AdminConfig,
    /// Path for the append-only audit log (§10.2).
    pub audit_log_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LogConfig::default(),
            sweeper: SweeperConfig::default(),
            prober: ProberConfig::default(),
            workflow: WorkflowConfig::default(),
            guardrails: GuardrailConfig::default(),
            collaborators: CollaboratorConfig::default(),
            admin: AdminConfig::default(),
            audit_log_path: "./data/audit.log".to_string(),
        }
    }
}

/// Base URLs for the two HTTP-backed runtime-layer collaborators (§6):
/// the provisioner service and the runtime resource manager. Both are
/// out of scope (§1) — this is only where the core is told how to find
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CollaboratorConfig {
    pub provisioner_base_url: String,
    pub runtime_resource_manager_base_url: String,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            provisioner_base_url: "http://localhost:9090".to_string(),
            runtime_resource_manager_base_url: "http://localhost:9091".to_string(),
        }
    }
}

/// Admin Maintenance settings (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct AdminConfig {
    /// `<prefix>` in the strict ownership pattern `^<prefix>_<lab-id>_`.
    pub resource_prefix: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { resource_prefix: "rehearsal".to_string() }
    }
}

/// `SQLite` connection settings (§10.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data/orchestrator.db".to_string(),
            max_connections: 10,
            connect_timeout_secs: 30,
        }
    }
}

/// Expiry Sweeper cadence and lease behavior (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SweeperConfig {
    pub poll_interval_secs: u64,
    pub lease_duration_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 60, lease_duration_secs: 120 }
    }
}

/// Readiness Prober timing and candidate HTTP paths (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ProberConfig {
    pub tcp_connect_timeout_ms: u64,
    pub http_request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub overall_deadline_secs: u64,
    /// Tried in order on every poll once TCP connects; first 2xx/3xx wins.
    pub http_paths: Vec<String>,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            tcp_connect_timeout_ms: 2_000,
            http_request_timeout_ms: 3_000,
            poll_interval_ms: 1_000,
            overall_deadline_secs: 120,
            http_paths: vec!["/vnc.html".to_string(), "/vnc_lite.html".to_string(), "/".to_string()],
        }
    }
}

/// Workflow engine activity retry policy (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct WorkflowConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    pub max_attempts: u32,
    pub worker_poll_interval_secs: u64,
    pub lease_duration_secs: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1_000,
            max_backoff_secs: 60,
            backoff_multiplier: 2.0,
            max_attempts: 3,
            worker_poll_interval_secs: 2,
            lease_duration_secs: 60,
        }
    }
}

/// Thresholds for the guardrail evaluator (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct GuardrailConfig {
    /// Max TTL (hours) a non-admin may request without an override.
    pub max_ttl_hours_user: u32,
    /// Absolute max TTL (hours) regardless of role.
    pub max_ttl_hours_absolute: u32,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self { max_ttl_hours_user: 4, max_ttl_hours_absolute: 8 }
    }
}
