use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    transport::Transport,
    wire::{ApiRequest, ApiResponse},
    ApiError, ClientOptions,
};

/// Failure class that earned another attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryCause {
    /// Connection-level failure.
    Transport,
    /// 5xx response.
    ServerError,
}

/// Bounded retry with failure-class-specific backoff.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_retries: usize,
    base_delay: Duration,
}

/// Bookkeeping for one logical operation; dropped when it finishes.
struct RetryState {
    attempts_made: usize,
    max_attempts: usize,
}

impl RetryState {
    fn exhausted(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_options(options: &ClientOptions) -> Self {
        Self::new(options.max_retries, options.retry_backoff)
    }

    pub fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Server errors cool down for twice the base delay before the next attempt.
    pub fn delay_for(&self, cause: RetryCause) -> Duration {
        match cause {
            RetryCause::Transport => self.base_delay,
            RetryCause::ServerError => self.base_delay.saturating_mul(2),
        }
    }

    /// Runs attempts until one produces a non-5xx response, the budget runs
    /// out, or `cancel` fires.
    ///
    /// `request` is called once per attempt so that each attempt carries the
    /// credential that is current when it is issued. Attempts are strictly
    /// sequential. Any response below 500 (including 4xx and 401) is returned
    /// as-is for the caller to classify.
    pub async fn execute<F>(
        &self,
        transport: &dyn Transport,
        cancel: &CancellationToken,
        mut request: F,
    ) -> Result<ApiResponse, ApiError>
    where
        F: FnMut() -> ApiRequest + Send,
    {
        let mut state = RetryState {
            attempts_made: 0,
            max_attempts: self.max_attempts(),
        };

        loop {
            let outgoing = request();
            state.attempts_made += 1;
            let attempt = state.attempts_made;
            debug!(
                attempt,
                method = %outgoing.method(),
                path = outgoing.path(),
                "sending request"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                outcome = transport.send(outgoing) => outcome,
            };

            let cause = match outcome {
                Ok(response) if response.status.is_server_error() => {
                    debug!(attempt, status = response.status.as_u16(), "server error response");
                    if state.exhausted() {
                        warn!(
                            attempts = attempt,
                            status = response.status.as_u16(),
                            "max retries exceeded"
                        );
                        return Err(ApiError::ServerFailure {
                            status: response.status.as_u16(),
                            body: response.body,
                            attempts: attempt,
                        });
                    }
                    RetryCause::ServerError
                }
                Ok(response) => {
                    debug!(attempt, status = response.status.as_u16(), "received response");
                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt, error = %err, "transport failure");
                    if !err.is_retryable() {
                        return Err(ApiError::NetworkFailure {
                            attempts: attempt,
                            retries_exhausted: false,
                            source: err,
                        });
                    }
                    if state.exhausted() {
                        warn!(attempts = attempt, error = %err, "max retries exceeded");
                        return Err(ApiError::NetworkFailure {
                            attempts: attempt,
                            retries_exhausted: true,
                            source: err,
                        });
                    }
                    RetryCause::Transport
                }
            };

            let delay = self.delay_for(cause);
            warn!(
                attempt,
                remaining = state.max_attempts - state.attempts_made,
                ?cause,
                delay_ms = delay.as_millis() as u64,
                "retrying request"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
