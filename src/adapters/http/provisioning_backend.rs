//! HTTP client for the external provisioning backend (§6). The backend
//! itself — whatever stands up the rehearsal environment's containers
//! or microVMs — is out of scope (§1); this adapter only speaks its
//! REST contract.

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::error::ProvisionerError;
use crate::domain::models::Blueprint;
use crate::domain::ports::{ProvisionOutcome, ProvisioningBackend, ValidationOutcome};

pub struct HttpProvisioningBackend {
    http_client: ReqwestClient,
    base_url: String,
}

#[derive(Serialize)]
struct StartRequest<'a> {
    lab_id: Uuid,
    blueprint: &'a Blueprint,
}

#[derive(Deserialize)]
struct StartResponse {
    job_id: String,
}

#[derive(Deserialize)]
struct PollResponse {
    status: String,
    host: Option<String>,
    port: Option<u16>,
    details: Option<Value>,
    error: Option<String>,
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    blueprint: &'a Blueprint,
}

#[derive(Deserialize)]
struct ValidateResponse {
    passed: bool,
    details: Value,
}

impl HttpProvisioningBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProvisionerError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProvisionerError::StartFailed(format!("failed to build http client: {e}")))?;
        Ok(Self { http_client, base_url: base_url.into() })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ProvisioningBackend for HttpProvisioningBackend {
    async fn start(&self, lab_id: Uuid, blueprint: &Blueprint) -> Result<String, ProvisionerError> {
        let response = self
            .http_client
            .post(self.endpoint("/jobs"))
            .json(&StartRequest { lab_id, blueprint })
            .send()
            .await
            .map_err(|e| ProvisionerError::StartFailed(e.to_string()))?;

        if response.status() != StatusCode::OK && response.status() != StatusCode::CREATED {
            return Err(ProvisionerError::StartFailed(format!("unexpected status {}", response.status())));
        }

        let body: StartResponse =
            response.json().await.map_err(|e| ProvisionerError::StartFailed(format!("malformed response: {e}")))?;
        Ok(body.job_id)
    }

    async fn poll(&self, job_id: &str) -> Result<Option<ProvisionOutcome>, ProvisionerError> {
        let response = self
            .http_client
            .get(self.endpoint(&format!("/jobs/{job_id}")))
            .send()
            .await
            .map_err(|e| ProvisionerError::PollFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProvisionerError::PollFailed(format!("unexpected status {}", response.status())));
        }

        let body: PollResponse =
            response.json().await.map_err(|e| ProvisionerError::PollFailed(format!("malformed response: {e}")))?;

        match body.status.as_str() {
            "pending" | "running" => Ok(None),
            "ready" => {
                let host = body.host.ok_or_else(|| ProvisionerError::JobFailed("ready job missing host".to_string()))?;
                let port = body.port.ok_or_else(|| ProvisionerError::JobFailed("ready job missing port".to_string()))?;
                Ok(Some(ProvisionOutcome { host, port, details: body.details.unwrap_or(Value::Null) }))
            }
            "failed" => Err(ProvisionerError::JobFailed(body.error.unwrap_or_else(|| "job failed".to_string()))),
            other => Err(ProvisionerError::PollFailed(format!("unknown job status: {other}"))),
        }
    }

    async fn validate(&self, job_id: &str, blueprint: &Blueprint) -> Result<ValidationOutcome, ProvisionerError> {
        let response = self
            .http_client
            .post(self.endpoint(&format!("/jobs/{job_id}/validate")))
            .json(&ValidateRequest { blueprint })
            .send()
            .await
            .map_err(|e| ProvisionerError::ValidationFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProvisionerError::ValidationFailed(format!("unexpected status {}", response.status())));
        }

        let body: ValidateResponse = response
            .json()
            .await
            .map_err(|e| ProvisionerError::ValidationFailed(format!("malformed response: {e}")))?;
        Ok(ValidationOutcome { passed: body.passed, details: body.details })
    }

    async fn teardown(&self, job_id: &str) -> Result<(), ProvisionerError> {
        let response = self
            .http_client
            .delete(self.endpoint(&format!("/jobs/{job_id}")))
            .send()
            .await
            .map_err(|e| ProvisionerError::TeardownFailed(e.to_string()))?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(ProvisionerError::TeardownFailed(format!("unexpected status {}", response.status())));
        }
        Ok(())
    }
}
