//! Best-effort liveness probing.
//!
//! Health checks never gate ordinary requests: they bypass retry and
//! credential refresh and are bounded by `ClientOptions::health_timeout`.

use reqwest::Method;
use tracing::debug;

use crate::{wire::ApiRequest, TaskDeckClient};

/// Path of the dedicated liveness endpoint.
pub const HEALTH_CHECK_PATH: &str = "/health-check";

/// Outcome of [`TaskDeckClient::health`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HealthStatus {
    /// `/health-check` answered with success.
    Healthy,
    /// `/health-check` failed but the fallback list resource answered.
    Degraded,
    /// Neither probe succeeded.
    Unavailable,
}

impl HealthStatus {
    pub fn is_reachable(self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

impl TaskDeckClient {
    /// Probes `/health-check`, then the configured fallback list resource.
    pub async fn health(&self) -> HealthStatus {
        if self.probe(ApiRequest::new(Method::GET, HEALTH_CHECK_PATH)).await {
            return HealthStatus::Healthy;
        }

        let fallback = ApiRequest::new(Method::GET, self.options().health_fallback_path.clone());
        let fallback = self.credentials().authorize(&fallback);
        if self.probe(fallback).await {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unavailable
        }
    }

    async fn probe(&self, request: ApiRequest) -> bool {
        let path = request.path().to_owned();
        let timeout = self.options().health_timeout;
        match tokio::time::timeout(timeout, self.transport().send(request)).await {
            Ok(Ok(response)) => {
                debug!(path = %path, status = response.status.as_u16(), "health probe answered");
                response.status.is_success()
            }
            Ok(Err(err)) => {
                debug!(path = %path, error = %err, "health probe failed");
                false
            }
            Err(_) => {
                debug!(path = %path, timeout_ms = timeout.as_millis() as u64, "health probe timed out");
                false
            }
        }
    }
}
