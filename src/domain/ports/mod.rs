//! Domain ports (interfaces) for the lab lifecycle orchestrator.

pub mod admin_cleanup_repository;
pub mod blueprint_service;
pub mod cve_repository;
pub mod lab_repository;
pub mod provisioning_backend;
pub mod readiness_prober;
pub mod runtime_resource_manager;
pub mod workflow_launcher;
pub mod workflow_store;

pub use admin_cleanup_repository::AdminCleanupRepository;
pub use blueprint_service::BlueprintService;
pub use cve_repository::CveRepository;
pub use lab_repository::{LabFilter, LabRepository};
pub use provisioning_backend::{ProvisionOutcome, ProvisioningBackend, ValidationOutcome};
pub use readiness_prober::ReadinessProber;
pub use runtime_resource_manager::RuntimeResourceManager;
pub use workflow_launcher::{WorkflowInput, WorkflowLauncher};
pub use workflow_store::WorkflowStore;
