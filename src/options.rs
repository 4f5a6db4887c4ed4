use std::time::Duration;

/// Configures HTTP timeout, retry and health-check behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Upper bound on a single HTTP exchange.
    pub timeout: Duration,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Delay before retrying a connectivity failure. Server errors wait twice as long.
    pub retry_backoff: Duration,
    /// Upper bound on each health probe.
    pub health_timeout: Duration,
    /// List resource probed when `/health-check` is unavailable.
    pub health_fallback_path: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
            health_timeout: Duration::from_secs(5),
            health_fallback_path: "/projects".to_owned(),
        }
    }
}

impl ClientOptions {
    /// Total attempts one logical operation may make.
    pub fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }
}
