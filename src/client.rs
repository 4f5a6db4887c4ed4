use std::{fmt, path::PathBuf, sync::Arc};

use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::{
    defaults::apply_create_defaults,
    retry::RetryPolicy,
    store::{FileTokenStore, MemoryTokenStore, TokenStore},
    transport::{resolve_url, ReqwestTransport, Transport},
    wire::{ApiRequest, ApiResponse},
    ApiError, ClientOptions, CredentialManager, Query, Result,
};

/// Path of the credential refresh endpoint on the identity service.
pub const REFRESH_PATH: &str = "/auth/refresh";

#[derive(Clone)]
/// HTTP client for the TaskDeck REST API.
///
/// Cloning is cheap and every clone shares the same credential, transport
/// and shutdown signal. Build one per process at startup, hand clones to
/// whatever needs API access, and call [`shutdown`](Self::shutdown) when
/// tearing down.
pub struct TaskDeckClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: String,
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialManager>,
    retry: RetryPolicy,
    options: ClientOptions,
    shutdown: CancellationToken,
}

impl fmt::Debug for TaskDeckClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDeckClient")
            .field("base_url", &self.inner.base_url)
            .field("credentials", &self.inner.credentials)
            .field("options", &self.inner.options)
            .finish()
    }
}

impl TaskDeckClient {
    /// Creates a client with default options and an in-memory token store.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::builder().base_url(base_url).assemble()
    }

    pub fn builder() -> TaskDeckClientBuilder {
        TaskDeckClientBuilder::default()
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `TASKDECK_BASE_URL`: REST API root (required)
    /// - `TASKDECK_IDENTITY_URL`: identity service root, when it is not the API host
    /// - `TASKDECK_TOKEN_FILE`: JSON file used to persist tokens across sessions
    ///
    /// # Example
    ///
    /// ```no_run
    /// use taskdeck_http::TaskDeckClient;
    ///
    /// let client = TaskDeckClient::from_env().expect("missing TASKDECK_* env vars");
    /// ```
    pub fn from_env() -> Result<Self> {
        let base_url = required_env("TASKDECK_BASE_URL")?;
        let mut builder = Self::builder().base_url(base_url);
        if let Some(identity_url) = optional_env("TASKDECK_IDENTITY_URL") {
            builder = builder.identity_url(identity_url);
        }
        if let Some(token_file) = optional_env("TASKDECK_TOKEN_FILE") {
            builder = builder.token_store(Arc::new(FileTokenStore::new(PathBuf::from(token_file))));
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Credential state shared by every clone of this client.
    pub fn credentials(&self) -> &CredentialManager {
        &self.inner.credentials
    }

    /// Cancels every in-flight and future operation of this client.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Fetches and decodes `path`.
    pub async fn get<T, Q>(&self, path: &str, query: Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Into<Query>,
    {
        let request = ApiRequest::new(Method::GET, path).with_query(query);
        self.run(request, &self.inner.shutdown).await?.json()
    }

    /// Creates a resource.
    ///
    /// Known collections get their missing default fields filled in before
    /// the body is sent. A bodiless success (`201`/`202`/`204` with nothing
    /// in it) yields `Ok(None)`: accepted, no payload.
    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = apply_create_defaults(path, to_json(body)?, Utc::now());
        let request = ApiRequest::new(Method::POST, path).with_json(body);
        let response = self.run(request, &self.inner.shutdown).await?;
        if response.is_empty() {
            return Ok(None);
        }
        response.json().map(Some)
    }

    /// Replaces a resource.
    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = ApiRequest::new(Method::PUT, path).with_json(to_json(body)?);
        self.run(request, &self.inner.shutdown).await?.json()
    }

    /// Deletes a resource. Use `()` or `Option<_>` as `T` for bodiless replies.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = ApiRequest::new(Method::DELETE, path);
        self.run(request, &self.inner.shutdown).await?.json()
    }

    /// Runs an arbitrary request through retry and refresh handling.
    ///
    /// The operation stops promptly when either `cancel` or the client's
    /// shutdown signal fires. Non-2xx outcomes are returned as classified
    /// errors; the response is only handed back on success.
    pub async fn execute(&self, request: ApiRequest, cancel: &CancellationToken) -> Result<ApiResponse> {
        tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => Err(ApiError::Cancelled),
            outcome = self.run(request, cancel) => outcome,
        }
    }

    /// One logical operation: retried attempts, then at most one
    /// refresh-and-replay when the server answers 401.
    #[instrument(skip_all, fields(method = %request.method(), path = request.path()))]
    async fn run(&self, request: ApiRequest, cancel: &CancellationToken) -> Result<ApiResponse> {
        let (response, generation) = self.attempt(&request, cancel).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return classify(response);
        }

        warn!("request unauthorized, refreshing credential");
        self.inner
            .credentials
            .refresh_after(generation, cancel)
            .await?;

        let (replayed, _) = self.attempt(&request, cancel).await?;
        if replayed.status == StatusCode::UNAUTHORIZED {
            warn!("request still unauthorized after refresh");
            return Err(ApiError::Authentication(format!(
                "{} {} was rejected after a credential refresh",
                request.method(),
                request.path()
            )));
        }
        classify(replayed)
    }

    /// Runs the retry policy, stamping a fresh credential on every attempt.
    ///
    /// Returns the response with the credential generation used for the
    /// attempt that produced it.
    async fn attempt(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<(ApiResponse, u64)> {
        let credentials = &self.inner.credentials;
        let mut generation = 0;
        let response = self
            .inner
            .retry
            .execute(self.inner.transport.as_ref(), cancel, || {
                let (outgoing, stamped) = credentials.authorize_tracked(request);
                generation = stamped;
                outgoing
            })
            .await?;
        Ok((response, generation))
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }
}

fn classify(response: ApiResponse) -> Result<ApiResponse> {
    let status = response.status.as_u16();
    if response.status.is_success() {
        Ok(response)
    } else if response.status.is_client_error() {
        Err(ApiError::RequestRejected {
            status,
            body: response.body,
        })
    } else {
        Err(ApiError::UnexpectedStatus {
            status,
            body: response.body,
        })
    }
}

fn to_json<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body).map_err(|err| ApiError::InvalidBody(err.to_string()))
}

fn required_env(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .map_err(|_| ApiError::Config(format!("missing {name} environment variable")))?;
    if value.trim().is_empty() {
        return Err(ApiError::Config(format!("{name} is set but empty")));
    }
    Ok(value)
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Builder for [`TaskDeckClient`].
#[derive(Default)]
pub struct TaskDeckClientBuilder {
    base_url: String,
    identity_url: Option<String>,
    options: ClientOptions,
    store: Option<Arc<dyn TokenStore>>,
    transport: Option<Arc<dyn Transport>>,
    http: Option<reqwest::Client>,
}

impl fmt::Debug for TaskDeckClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDeckClientBuilder")
            .field("base_url", &self.base_url)
            .field("identity_url", &self.identity_url)
            .field("options", &self.options)
            .field("custom_store", &self.store.is_some())
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl TaskDeckClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Root of the identity service hosting `/auth/refresh`. Defaults to the API root.
    pub fn identity_url(mut self, identity_url: impl Into<String>) -> Self {
        self.identity_url = Some(identity_url.into());
        self
    }

    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the HTTP transport, e.g. with a scripted one in tests.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Reuses an existing `reqwest` connection pool.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Validates the configuration and builds the client.
    pub fn build(self) -> Result<TaskDeckClient> {
        validate_url("base URL", &self.base_url)?;
        if let Some(identity_url) = &self.identity_url {
            validate_url("identity URL", identity_url)?;
        }
        if self.options.timeout.is_zero() {
            return Err(ApiError::Config("request timeout must be non-zero".to_owned()));
        }
        Ok(self.assemble())
    }

    fn assemble(self) -> TaskDeckClient {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::with_client(
                self.http.unwrap_or_default(),
                self.base_url.clone(),
                self.options.timeout,
            )),
        };
        let refresh_url = resolve_url(
            self.identity_url.as_deref().unwrap_or(&self.base_url),
            REFRESH_PATH,
        );
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        let retry = RetryPolicy::from_options(&self.options);
        let credentials = Arc::new(
            CredentialManager::new(transport.clone(), refresh_url, store)
                .with_retry(retry.clone()),
        );

        TaskDeckClient {
            inner: Arc::new(ClientInner {
                base_url: self.base_url,
                transport,
                credentials,
                retry,
                options: self.options,
                shutdown: CancellationToken::new(),
            }),
        }
    }
}

fn validate_url(label: &str, url: &str) -> Result<()> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Config(format!("{label} is empty")));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ApiError::Config(format!(
            "{label} '{trimmed}' must start with http:// or https://"
        )));
    }
    Ok(())
}
