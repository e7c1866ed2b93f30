//! Readiness probing port (§4.6): TCP-then-HTTP polling of a
//! provisioned environment's advertised host:port, with no DNS
//! resolution or redirect-following beyond that fixed target (§9
//! anti-SSRF constraint).

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::domain::error::ProbeError;

#[async_trait]
pub trait ReadinessProber: Send + Sync {
    /// Poll `host:port` until it accepts a TCP connection and, if an
    /// HTTP health path is configured, returns a successful status, or
    /// until `deadline` elapses or `cancel` fires.
    async fn wait_until_ready(
        &self,
        host: &str,
        port: u16,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Result<(), ProbeError>;
}
