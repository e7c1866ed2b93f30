//! Deterministic blueprint generation (§4.3 `GenerateBlueprint`).
//!
//! Expands a draft lab's severity and CVE metadata into a concrete
//! [`Blueprint`] via template rules. No external collaborator is
//! consulted; this is the reference implementation of
//! [`BlueprintService`](crate::domain::ports::BlueprintService).

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::models::{AutomationHook, Blueprint, EnvironmentPlan, Lab, RiskBadge, Severity};
use crate::domain::ports::BlueprintService as BlueprintServicePort;
use crate::domain::OrchestratorResult;

pub struct TemplateBlueprintService;

impl TemplateBlueprintService {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn base_image_for(severity: Severity) -> &'static str {
        match severity {
            Severity::Low | Severity::Medium => "rehearsal/sandbox-base:latest",
            Severity::High | Severity::Critical => "rehearsal/sandbox-hardened:latest",
        }
    }

    fn risk_badge_for(lab: &Lab) -> RiskBadge {
        let level = lab.severity.to_string();
        let reason = match lab.severity {
            Severity::Low => "low blast radius, standard sandbox isolation".to_string(),
            Severity::Medium => "moderate blast radius, network egress disabled".to_string(),
            Severity::High => "high blast radius, hardened image and no outbound network".to_string(),
            Severity::Critical => {
                "critical blast radius, hardened image, no outbound network, mandatory review".to_string()
            }
        };
        RiskBadge { level, reason }
    }

    fn validation_steps_for(lab: &Lab) -> Vec<String> {
        let mut steps = vec![
            "confirm container started and reports healthy".to_string(),
            "confirm rehearsal objective is reachable from inside the sandbox".to_string(),
        ];
        if let Some(cve_id) = &lab.cve_id {
            steps.push(format!("confirm the {cve_id} vulnerable component is present and unpatched"));
        }
        steps
    }

    fn automation_hooks_for(lab: &Lab) -> Vec<AutomationHook> {
        let mut hooks = vec![AutomationHook {
            name: "provision-log-collector".to_string(),
            command: "rehearsal-agent collect-logs --lab".to_string(),
            stage: "post_provision".to_string(),
        }];
        if lab.severity >= Severity::High {
            hooks.push(AutomationHook {
                name: "snapshot-before-exploit".to_string(),
                command: "rehearsal-agent snapshot --lab".to_string(),
                stage: "pre_validate".to_string(),
            });
        }
        hooks
    }
}

impl Default for TemplateBlueprintService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlueprintServicePort for TemplateBlueprintService {
    async fn generate(&self, lab: &Lab) -> OrchestratorResult<Blueprint> {
        let mut configuration = HashMap::new();
        configuration.insert("severity".to_string(), lab.severity.to_string());
        configuration.insert("ttl_hours".to_string(), lab.ttl_hours.to_string());
        if let Some(cve_id) = &lab.cve_id {
            configuration.insert("cve_id".to_string(), cve_id.clone());
        }

        let summary = lab.cve_id.as_ref().map_or_else(
            || format!("Manual rehearsal environment for: {}", lab.title),
            |cve_id| format!("Rehearsal environment for {cve_id}: {}", lab.title),
        );

        Ok(Blueprint {
            summary,
            risk_badge: Self::risk_badge_for(lab),
            environment_plan: EnvironmentPlan {
                base_image: Self::base_image_for(lab.severity).to_string(),
                dependencies: vec!["rehearsal-agent".to_string()],
                configuration,
            },
            validation_steps: Self::validation_steps_for(lab),
            automation_hooks: Self::automation_hooks_for(lab),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{LabSource, LabStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn draft(severity: Severity, cve_id: Option<&str>) -> Lab {
        Lab {
            id: Uuid::new_v4(),
            owner_id: "owner-1".to_string(),
            source: if cve_id.is_some() { LabSource::QuickPick } else { LabSource::Manual },
            cve_id: cve_id.map(str::to_string),
            title: "Rehearse a vuln".to_string(),
            description: "desc".to_string(),
            objective: "reproduce".to_string(),
            severity,
            ttl_hours: 2,
            status: LabStatus::PendingGuardrail,
            blueprint: None,
            guardrail_snapshot: None,
            workflow_handle: None,
            provisioning_details: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn critical_labs_get_hardened_image() {
        let service = TemplateBlueprintService::new();
        let blueprint = service.generate(&draft(Severity::Critical, None)).await.unwrap();
        assert_eq!(blueprint.environment_plan.base_image, "rehearsal/sandbox-hardened:latest");
    }

    #[tokio::test]
    async fn quick_pick_blueprint_references_cve_in_validation() {
        let service = TemplateBlueprintService::new();
        let blueprint = service.generate(&draft(Severity::High, Some("CVE-2024-3094"))).await.unwrap();
        assert!(blueprint.validation_steps.iter().any(|s| s.contains("CVE-2024-3094")));
    }

    #[tokio::test]
    async fn high_severity_adds_snapshot_hook() {
        let service = TemplateBlueprintService::new();
        let blueprint = service.generate(&draft(Severity::High, None)).await.unwrap();
        assert!(blueprint.automation_hooks.iter().any(|h| h.name == "snapshot-before-exploit"));
    }

    #[tokio::test]
    async fn low_severity_skips_snapshot_hook() {
        let service = TemplateBlueprintService::new();
        let blueprint = service.generate(&draft(Severity::Low, None)).await.unwrap();
        assert!(!blueprint.automation_hooks.iter().any(|h| h.name == "snapshot-before-exploit"));
    }
}
