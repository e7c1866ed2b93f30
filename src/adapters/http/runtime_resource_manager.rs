//! HTTP client for the containerization/microVM runtime layer's
//! resource inventory (§4.8, §6). The runtime driver itself — Compose,
//! Firecracker, or a k8s controller — is out of scope (§1); this
//! adapter only lists and removes whatever resources it reports,
//! leaving label-pattern matching to [`crate::services::AdminMaintenanceService`].

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::models::RuntimeResource;
use crate::domain::{OrchestratorError, OrchestratorResult};
use crate::domain::ports::RuntimeResourceManager;

pub struct HttpRuntimeResourceManager {
    http_client: ReqwestClient,
    base_url: String,
}

#[derive(Deserialize)]
struct ResourceEntry {
    name: String,
    #[serde(default)]
    labels: HashMap<String, String>,
}

impl HttpRuntimeResourceManager {
    pub fn new(base_url: impl Into<String>) -> OrchestratorResult<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OrchestratorError::Unavailable(format!("failed to build http client: {e}")))?;
        Ok(Self { http_client, base_url: base_url.into() })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl RuntimeResourceManager for HttpRuntimeResourceManager {
    async fn list(&self) -> OrchestratorResult<Vec<RuntimeResource>> {
        let response = self
            .http_client
            .get(self.endpoint("/resources"))
            .send()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("runtime resource list failed: {e}")))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Unavailable(format!("unexpected status {}", response.status())));
        }

        let entries: Vec<ResourceEntry> = response
            .json()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("malformed resource list response: {e}")))?;

        Ok(entries.into_iter().map(|e| RuntimeResource { name: e.name, labels: e.labels }).collect())
    }

    async fn remove(&self, resource_name: &str) -> OrchestratorResult<()> {
        let response = self
            .http_client
            .delete(self.endpoint(&format!("/resources/{resource_name}")))
            .send()
            .await
            .map_err(|e| OrchestratorError::Unavailable(format!("runtime resource removal failed: {e}")))?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(OrchestratorError::Unavailable(format!("unexpected status {}", response.status())));
        }
        Ok(())
    }
}
