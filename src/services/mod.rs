//! Application services: the concrete, storage-and-collaborator-bound
//! implementations that sit behind the domain ports plus the pure
//! Guardrail Evaluator.

pub mod admin_maintenance;
pub mod blueprint_service;
pub mod expiry_sweeper;
pub mod guardrail_evaluator;
pub mod mutation_service;

pub use admin_maintenance::AdminMaintenanceService;
pub use blueprint_service::TemplateBlueprintService;
pub use expiry_sweeper::ExpirySweeper;
pub use guardrail_evaluator::GuardrailEvaluator;
pub use mutation_service::MutationService;
