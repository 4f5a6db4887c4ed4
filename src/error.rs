use std::{path::PathBuf, time::Duration};

/// Error type returned by this crate.
///
/// Every failure that reaches a caller is one of these variants; raw
/// transport errors never escape a logical operation unclassified.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ApiError {
    /// Connectivity failure (DNS, connect, timeout, reset) that survived the retry budget.
    #[error("network failure after {attempts} attempt(s){}: {source}", exhausted_tag(.retries_exhausted))]
    NetworkFailure {
        /// Number of attempts made before giving up.
        attempts: usize,
        /// Whether the failure was surfaced because the retry budget ran out.
        retries_exhausted: bool,
        #[source]
        source: TransportError,
    },
    /// 5xx status that survived the retry budget.
    #[error("server failure {status} after {attempts} attempt(s) (max retries exceeded): {body}")]
    ServerFailure {
        status: u16,
        body: String,
        attempts: usize,
    },
    /// 4xx status other than 401; never retried.
    #[error("request rejected with status {status}: {body}")]
    RequestRejected { status: u16, body: String },
    /// 1xx or 3xx status that was not resolved by the HTTP layer.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
    /// 401 surviving a refresh-and-replay cycle, or a failed credential refresh.
    #[error("authentication required: {0}")]
    Authentication(String),
    /// Response body could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(String),
    /// Request body could not be serialized to JSON.
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    /// The logical operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Whether a caller may reasonably offer a "try again" affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. } | Self::ServerFailure { .. })
    }

    /// Whether the caller must force the user through authentication again.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerFailure { status, .. }
            | Self::RequestRejected { status, .. }
            | Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Authentication(_) => Some(401),
            _ => None,
        }
    }
}

fn exhausted_tag(exhausted: &bool) -> &'static str {
    if *exhausted {
        " (max retries exceeded)"
    } else {
        ""
    }
}

/// Connection-level failure of a single HTTP exchange.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid request url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl TransportError {
    /// Invalid URLs are programming errors and are not worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidUrl { .. })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_builder() {
            Self::InvalidUrl {
                url: err.url().map(|url| url.to_string()).unwrap_or_default(),
                reason: err.to_string(),
            }
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Failure of the credential refresh exchange.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token is stored")]
    MissingRefreshToken,
    #[error("identity endpoint rejected the refresh token with status {status}: {body}")]
    Rejected { status: u16, body: String },
    /// Identity endpoint stayed unreachable or kept answering 5xx; the
    /// stored credential is kept.
    #[error("identity endpoint unavailable: {0}")]
    Unavailable(#[source] ApiError),
    #[error("invalid refresh response: {0}")]
    Decode(String),
    #[error("a concurrent refresh failed and credentials were cleared")]
    CredentialsCleared,
    #[error("refresh cancelled")]
    Cancelled,
}

impl RefreshError {
    /// Whether the failure left the stored credential in place.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Cancelled)
    }
}

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Cancelled => Self::Cancelled,
            RefreshError::Unavailable(outage) => outage,
            other => Self::Authentication(other.to_string()),
        }
    }
}

/// Failure reading or writing persisted tokens.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("token store io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token store contents are invalid: {0}")]
    Format(#[from] serde_json::Error),
}
