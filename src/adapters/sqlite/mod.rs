//! SQLite adapters implementing the domain's persistence ports (§10.4).

pub mod admin_cleanup_repository;
pub mod connection;
pub mod cve_repository;
pub mod lab_repository;
pub mod migrations;
pub mod workflow_store;

pub use admin_cleanup_repository::SqliteAdminCleanupRepository;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError};
pub use cve_repository::SqliteCveRepository;
pub use lab_repository::SqliteLabRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use workflow_store::SqliteWorkflowStore;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::OrchestratorError;

pub fn parse_uuid(s: &str) -> Result<Uuid, OrchestratorError> {
    Uuid::parse_str(s).map_err(|e| OrchestratorError::Internal(format!("malformed uuid column: {e}")))
}

pub fn parse_optional_uuid(s: Option<String>) -> Result<Option<Uuid>, OrchestratorError> {
    s.map(|s| parse_uuid(&s)).transpose()
}

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, OrchestratorError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::Internal(format!("malformed datetime column: {e}")))
}

pub fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, OrchestratorError> {
    s.map(|s| parse_datetime(&s)).transpose()
}

pub fn parse_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, OrchestratorError> {
    serde_json::from_str(s).map_err(|e| OrchestratorError::Internal(format!("malformed json column: {e}")))
}

pub fn parse_optional_json<T: serde::de::DeserializeOwned>(s: Option<String>) -> Result<Option<T>, OrchestratorError> {
    s.map(|s| parse_json(&s)).transpose()
}
