//! Infrastructure layer
//!
//! Ambient concerns that every adapter and service depends on, but which
//! carry no lab-domain knowledge themselves:
//! - Hierarchical configuration loading (figment)
//! - Structured logging, log rotation, secret scrubbing, audit trail
//!
//! Storage adapters implementing the domain's repository ports live
//! under `crate::adapters`, not here.

pub mod config;
pub mod logging;
