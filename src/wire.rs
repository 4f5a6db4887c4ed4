use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::ApiError;

/// Payload carried by an [`ApiRequest`].
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Text(String),
}

/// One logical HTTP request.
///
/// The value is immutable once built: every retry or replay reuses it and
/// only the `Authorization` header of the outgoing copy differs.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: crate::Query,
    body: Option<RequestBody>,
    headers: HeaderMap,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: crate::Query::default(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<crate::Query>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &crate::Query {
        &self.query
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a copy stamped with `Authorization`, or with the header
    /// removed entirely when `authorization` is `None`.
    pub(crate) fn authorized(&self, authorization: Option<HeaderValue>) -> Self {
        let mut request = self.clone();
        match authorization {
            Some(value) => {
                request.headers.insert(header::AUTHORIZATION, value);
            }
            None => {
                request.headers.remove(header::AUTHORIZATION);
            }
        }
        request
    }
}

/// One HTTP response, fully buffered.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    /// `204`/`205`, or any body that is only whitespace.
    pub fn is_empty(&self) -> bool {
        self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::RESET_CONTENT
            || self.body.trim().is_empty()
    }

    /// Decodes the body as JSON. An empty body decodes as JSON `null`, so
    /// `()` and `Option<_>` targets accept bodiless responses.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        if self.is_empty() {
            return serde_json::from_value(serde_json::Value::Null).map_err(|err| {
                ApiError::Decode(format!(
                    "empty response body with status {} cannot be decoded: {err}",
                    self.status.as_u16()
                ))
            });
        }
        serde_json::from_str(&self.body).map_err(|err| {
            ApiError::Decode(format!("invalid response JSON: {err}; body: {}", self.body))
        })
    }
}

/// Body returned by `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// On-disk token record.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredTokens {
    pub access_token: String,
    pub refresh_token: String,
}
