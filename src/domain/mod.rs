//! Domain layer: models, ports, and errors for the lab lifecycle orchestrator.
//!
//! Nothing in this module touches SQL, HTTP, or the filesystem — those
//! live behind the traits in [`ports`] and are implemented under
//! `adapters` and `services`.

pub mod error;
pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ErrorKind, OrchestratorError, OrchestratorResult};
