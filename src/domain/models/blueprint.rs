//! Environment blueprint produced by the Blueprint Service (§3, §4.3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A hook run at a specific provisioning stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationHook {
    pub name: String,
    pub command: String,
    pub stage: String,
}

/// The deterministic environment plan nested inside a [`Blueprint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentPlan {
    pub base_image: String,
    pub dependencies: Vec<String>,
    pub configuration: HashMap<String, String>,
}

/// A coarse risk signal surfaced to the operator alongside the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBadge {
    pub level: String,
    pub reason: String,
}

/// The structured plan attached to a lab once generated (§4.3
/// `GenerateBlueprint`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    pub summary: String,
    pub risk_badge: RiskBadge,
    pub environment_plan: EnvironmentPlan,
    pub validation_steps: Vec<String>,
    pub automation_hooks: Vec<AutomationHook>,
}
