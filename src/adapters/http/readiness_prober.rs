//! TCP-then-HTTP readiness prober (§4.6). Probes only the host:port it
//! is called with — callers must source that pair from the lab's own
//! provisioning details, never from a caller-supplied address (§9
//! anti-SSRF constraint); this adapter has no opinion on where `host`
//! came from, it just never resolves anything beyond it.

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ProberConfig;
use crate::domain::error::ProbeError;
use crate::domain::ports::ReadinessProber;

pub struct TcpHttpReadinessProber {
    http_client: ReqwestClient,
    tcp_connect_timeout: Duration,
    http_request_timeout: Duration,
    poll_interval: Duration,
    http_paths: Vec<String>,
}

impl TcpHttpReadinessProber {
    pub fn new(config: &ProberConfig) -> Result<Self, ProbeError> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_millis(config.http_request_timeout_ms))
            .build()
            .map_err(|e| ProbeError::HttpFailed(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http_client,
            tcp_connect_timeout: Duration::from_millis(config.tcp_connect_timeout_ms),
            http_request_timeout: Duration::from_millis(config.http_request_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            http_paths: config.http_paths.clone(),
        })
    }

    async fn probe_once(&self, host: &str, port: u16) -> Result<(), String> {
        timeout(self.tcp_connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| "tcp connect timed out".to_string())?
            .map_err(|e| format!("tcp connect refused: {e}"))?;

        if self.http_paths.is_empty() {
            return Ok(());
        }

        for path in &self.http_paths {
            let url = format!("http://{host}:{port}{path}");
            let result = timeout(self.http_request_timeout, self.http_client.get(&url).send()).await;
            if let Ok(Ok(response)) = result {
                if response.status().is_success() || response.status().is_redirection() {
                    return Ok(());
                }
            }
        }
        Err(format!("no configured http path responded ready at {host}:{port}"))
    }
}

#[async_trait]
impl ReadinessProber for TcpHttpReadinessProber {
    async fn wait_until_ready(
        &self,
        host: &str,
        port: u16,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<(), ProbeError> {
        let start = Instant::now();
        let mut last_error = String::new();

        loop {
            if cancel.is_cancelled() {
                return Err(ProbeError::Cancelled);
            }

            match self.probe_once(host, port).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(host, port, error = %e, "readiness probe attempt failed");
                    last_error = e;
                }
            }

            if start.elapsed() >= deadline {
                return Err(ProbeError::DeadlineExceeded { elapsed_secs: start.elapsed().as_secs(), last_error });
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(ProbeError::Cancelled),
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
