//! Domain models for the lab lifecycle orchestrator.

pub mod admin;
pub mod blueprint;
pub mod cve;
pub mod guardrail;
pub mod lab;
pub mod workflow;

pub use admin::{CleanupManifest, CleanupTarget, RuntimeResource};
pub use blueprint::{AutomationHook, Blueprint, EnvironmentPlan, RiskBadge};
pub use cve::CveCatalogEntry;
pub use guardrail::{CheckSeverity, GuardrailCheck, GuardrailSnapshot};
pub use lab::{Lab, LabSource, LabStatus, Role, Severity};
pub use workflow::{
    ProvisioningDetails, WorkflowErrorCategory, WorkflowHandle, WorkflowPhase, WorkflowRunRecord,
    WorkflowRunStatus, WorkflowSignal,
};
