//! Audit logging for security-relevant lab lifecycle operations
//!
//! Provides a structured JSON audit trail for:
//! - Draft creation, blueprint generation, confirmation
//! - Guardrail evaluation outcomes
//! - Status transitions (including sweeper- and admin-driven ones)
//! - Workflow start/cancel
//! - Admin maintenance runs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Audit logger for security-relevant operations.
#[derive(Clone)]
pub struct AuditLogger {
    log_file: Arc<Mutex<File>>,
}

/// Audit event types for categorizing lab lifecycle operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    LabCreated,
    BlueprintGenerated,
    GuardrailEvaluated,
    LabConfirmed,
    LabRejected,
    StatusChanged,
    WorkflowStarted,
    WorkflowSignalled,
    LabCancelled,
    AdminCleanup,
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    PartialSuccess,
}

/// Complete audit event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub operation: String,
    pub actor: String,
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    pub metadata: Option<Value>,
}

impl AuditLogger {
    /// Create a new audit logger writing to the specified file.
    ///
    /// Creates parent directories if they don't exist, opens the file in
    /// append mode to preserve the existing audit trail.
    pub async fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let log_path = log_path.as_ref();

        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create audit log directory")?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .context("failed to open audit log file")?;

        Ok(Self { log_file: Arc::new(Mutex::new(file)) })
    }

    /// Log an audit event: writes the event as a JSON line to the audit
    /// log file and emits a tracing info event for structured logging.
    pub async fn log_event(&self, event: AuditEvent) -> Result<()> {
        let json = serde_json::to_string(&event).context("failed to serialize audit event")?;

        {
            let mut file = self
                .log_file
                .lock()
                .map_err(|e| anyhow::anyhow!("audit log mutex poisoned: {e}"))?;

            writeln!(file, "{json}").context("failed to write audit event")?;
            file.flush().context("failed to flush audit log")?;
        }

        info!(
            event_type = ?event.event_type,
            operation = %event.operation,
            actor = %event.actor,
            resource_id = ?event.resource_id,
            outcome = ?event.outcome,
            "audit event"
        );

        Ok(())
    }

    /// Convenience method for logging a lab operation.
    ///
    /// `resource_id` is typically the lab id; `metadata` should already be
    /// scrubbed of justification free text before it reaches here — the
    /// [`super::secret_scrubbing::SecretScrubbingLayer`] only covers the
    /// `tracing` pipeline, not this file.
    pub async fn log_operation(
        &self,
        operation: &str,
        actor: &str,
        resource_id: Option<&str>,
        success: bool,
        metadata: Option<Value>,
    ) -> Result<()> {
        let event_type = self.infer_event_type(operation);
        let outcome = if success { AuditOutcome::Success } else { AuditOutcome::Failure };

        let event = AuditEvent {
            timestamp: Utc::now(),
            event_type,
            operation: operation.to_string(),
            actor: actor.to_string(),
            resource_id: resource_id.map(String::from),
            outcome,
            metadata,
        };

        self.log_event(event).await
    }

    fn infer_event_type(&self, operation: &str) -> AuditEventType {
        let op = operation.to_lowercase();

        if op.contains("blueprint") {
            AuditEventType::BlueprintGenerated
        } else if op.contains("guardrail") {
            AuditEventType::GuardrailEvaluated
        } else if op.contains("confirm") && !op.contains("reject") {
            AuditEventType::LabConfirmed
        } else if op.contains("reject") {
            AuditEventType::LabRejected
        } else if op.contains("create") {
            AuditEventType::LabCreated
        } else if op.contains("cancel") {
            AuditEventType::LabCancelled
        } else if op.contains("signal") {
            AuditEventType::WorkflowSignalled
        } else if op.contains("workflow") {
            AuditEventType::WorkflowStarted
        } else if op.contains("admin") || op.contains("cleanup") {
            AuditEventType::AdminCleanup
        } else if op.contains("status") {
            AuditEventType::StatusChanged
        } else {
            warn!(operation = %operation, "could not infer audit event type");
            AuditEventType::StatusChanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_file_and_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("logs/audit/events.log");

        let _logger = AuditLogger::new(&log_path).await.unwrap();
        assert!(log_path.exists());
        assert!(log_path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn log_operation_writes_json() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");
        let logger = AuditLogger::new(&log_path).await.unwrap();

        logger
            .log_operation("create_lab", "user@example.com", Some("lab-123"), true, None)
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);

        let event: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(event.operation, "create_lab");
        assert_eq!(event.resource_id, Some("lab-123".to_string()));
        assert_eq!(event.outcome, AuditOutcome::Success);
        assert_eq!(event.event_type, AuditEventType::LabCreated);
    }

    #[tokio::test]
    async fn log_event_with_metadata_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");
        let logger = AuditLogger::new(&log_path).await.unwrap();

        let metadata = serde_json::json!({ "severity": "critical", "ttl_hours": 4 });

        logger
            .log_operation("guardrail_evaluated", "system", Some("lab-456"), true, Some(metadata.clone()))
            .await
            .unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let event: AuditEvent = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(event.metadata, Some(metadata));
    }

    #[tokio::test]
    async fn multiple_events_append_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");
        let logger = AuditLogger::new(&log_path).await.unwrap();

        logger.log_operation("create_lab", "user1", Some("lab-1"), true, None).await.unwrap();
        logger.log_operation("reject_lab", "system", Some("lab-2"), false, None).await.unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let event1: AuditEvent = serde_json::from_str(lines[0]).unwrap();
        let event2: AuditEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(event1.actor, "user1");
        assert_eq!(event2.outcome, AuditOutcome::Failure);
        assert_eq!(event2.event_type, AuditEventType::LabRejected);
    }

    #[tokio::test]
    async fn concurrent_writes_all_land() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");
        let logger = AuditLogger::new(&log_path).await.unwrap();

        let mut handles = vec![];
        for i in 0..10 {
            let logger_clone = logger.clone();
            handles.push(tokio::spawn(async move {
                logger_clone
                    .log_operation("cancel_lab", &format!("user{i}"), Some(&format!("lab-{i}")), true, None)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 10);
    }

    #[tokio::test]
    async fn admin_cleanup_is_inferred() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("audit.log");
        let logger = AuditLogger::new(&log_path).await.unwrap();

        logger.log_operation("admin_cleanup_by_label", "admin", None, true, None).await.unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let event: AuditEvent = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(event.event_type, AuditEventType::AdminCleanup);
    }
}
