use std::{fmt, time::Duration};

use async_trait::async_trait;
use reqwest::header;

use crate::{
    wire::{ApiRequest, ApiResponse, RequestBody},
    TransportError,
};

/// Issues exactly one HTTP request/response exchange.
///
/// Status codes are not interpreted here: a `500` or `401` is a normal
/// [`ApiResponse`]. Only connection-level failures are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ReqwestTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, timeout)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Returns a transport sharing the same connection pool with a different bound.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        resolve_url(&self.base_url, path)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(request.path());
        let mut builder = self
            .http
            .request(request.method().clone(), &url)
            .headers(request.headers().clone())
            .timeout(self.timeout);

        if !request.query().is_empty() {
            let pairs: Vec<(&str, &str)> = request.query().iter().collect();
            builder = builder.query(&pairs);
        }

        builder = match request.body() {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Text(text)) => builder
                .header(header::CONTENT_TYPE, "text/plain")
                .body(text.clone()),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|err| classify_reqwest_error(err, self.timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|err| classify_reqwest_error(err, self.timeout))?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        err.into()
    }
}

/// Joins `path` onto `base_url` unless it is already absolute.
pub(crate) fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_owned();
    }
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
