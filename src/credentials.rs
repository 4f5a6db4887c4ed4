use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use reqwest::{header::HeaderValue, Method};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    retry::RetryPolicy,
    store::TokenStore,
    transport::Transport,
    wire::{ApiRequest, RefreshResponse},
    ApiError, ClientOptions, RefreshError, StoreError,
};

/// Access/refresh token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    refresh_token: String,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    fn bearer_header(&self) -> Option<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.access_token.trim()))
            .map_err(|err| warn!(error = %err, "access token is not a valid header value"))
            .ok()?;
        value.set_sensitive(true);
        Some(value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

struct CredentialState {
    credential: Option<Credential>,
    /// Bumped on every replacement or clear.
    generation: u64,
    /// Bumped whenever an exchange ends in an outage that keeps the credential.
    outages: u64,
    last_outage: Option<ApiError>,
}

/// Owns the single live [`Credential`] of a client.
///
/// Refresh is single-flight: callers that discover an expired token at the
/// same time queue on one refresh and share its outcome. A caller whose
/// token was already superseded by the time it asks gets the newer
/// credential without another identity round-trip.
///
/// The exchange itself runs under a [`RetryPolicy`]. Only a rejected refresh
/// token (or an unusable answer) clears the credential; an identity outage
/// that outlives the retry budget leaves it in place.
pub struct CredentialManager {
    state: RwLock<CredentialState>,
    refresh_lock: tokio::sync::Mutex<()>,
    store: Arc<dyn TokenStore>,
    transport: Arc<dyn Transport>,
    refresh_url: String,
    retry: RetryPolicy,
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("CredentialManager")
            .field("authenticated", &state.credential.is_some())
            .field("generation", &state.generation)
            .field("refresh_url", &self.refresh_url)
            .field("retry", &self.retry)
            .finish()
    }
}

impl CredentialManager {
    /// Builds a manager seeded from `store`.
    ///
    /// An unreadable store is logged and treated as "signed out".
    pub fn new(
        transport: Arc<dyn Transport>,
        refresh_url: impl Into<String>,
        store: Arc<dyn TokenStore>,
    ) -> Self {
        let credential = match store.load() {
            Ok(credential) => credential,
            Err(err) => {
                warn!(error = %err, "could not load persisted tokens");
                None
            }
        };
        Self {
            state: RwLock::new(CredentialState {
                credential,
                generation: 0,
                outages: 0,
                last_outage: None,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
            store,
            transport,
            refresh_url: refresh_url.into(),
            retry: RetryPolicy::from_options(&ClientOptions::default()),
        }
    }

    /// Replaces the retry policy used for the identity exchange.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().credential.is_some()
    }

    pub fn current(&self) -> Option<Credential> {
        self.state.read().credential.clone()
    }

    /// Stamps the current access token onto a copy of `request`.
    ///
    /// Without a credential the `Authorization` header is removed, not emptied.
    pub fn authorize(&self, request: &ApiRequest) -> ApiRequest {
        self.authorize_tracked(request).0
    }

    /// Same as [`authorize`](Self::authorize), also returning the credential
    /// generation that was stamped.
    pub(crate) fn authorize_tracked(&self, request: &ApiRequest) -> (ApiRequest, u64) {
        let state = self.state.read();
        let header = state.credential.as_ref().and_then(Credential::bearer_header);
        (request.authorized(header), state.generation)
    }

    /// Installs a credential obtained by logging in.
    pub fn set_credential(&self, credential: Credential) {
        self.install(credential);
    }

    /// Forgets the credential in memory and in the store.
    pub fn logout(&self) -> Result<(), StoreError> {
        {
            let mut state = self.state.write();
            state.credential = None;
            state.generation += 1;
        }
        info!("credentials cleared by logout");
        self.store.clear()
    }

    /// Refreshes the current credential now.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Result<Credential, RefreshError> {
        let generation = self.state.read().generation;
        self.refresh_after(generation, cancel).await
    }

    /// Refreshes unless the credential has moved on since `observed`.
    pub(crate) async fn refresh_after(
        &self,
        observed: u64,
        cancel: &CancellationToken,
    ) -> Result<Credential, RefreshError> {
        let outages_seen = self.state.read().outages;
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RefreshError::Cancelled),
            guard = self.refresh_lock.lock() => guard,
        };

        let refresh_token = {
            let state = self.state.read();
            if state.generation != observed {
                debug!(
                    observed,
                    current = state.generation,
                    "credential already replaced, reusing result"
                );
                return state
                    .credential
                    .clone()
                    .ok_or(RefreshError::CredentialsCleared);
            }
            if state.outages != outages_seen {
                if let Some(outage) = &state.last_outage {
                    debug!("identity endpoint failed while waiting, sharing outcome");
                    return Err(RefreshError::Unavailable(outage.clone()));
                }
            }
            state
                .credential
                .as_ref()
                .map(|credential| credential.refresh_token.clone())
                .filter(|token| !token.trim().is_empty())
        };

        let Some(refresh_token) = refresh_token else {
            return Err(self.fail(RefreshError::MissingRefreshToken));
        };

        debug!(url = %self.refresh_url, "refreshing credential");
        let request = ApiRequest::new(Method::POST, self.refresh_url.clone())
            .with_text(refresh_token.clone());

        let outcome = self
            .retry
            .execute(self.transport.as_ref(), cancel, || request.clone())
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(ApiError::Cancelled) => return Err(RefreshError::Cancelled),
            Err(outage) => return Err(self.outage(outage)),
        };

        if !response.status.is_success() {
            return Err(self.fail(RefreshError::Rejected {
                status: response.status.as_u16(),
                body: response.body,
            }));
        }

        let parsed: RefreshResponse = match serde_json::from_str(&response.body) {
            Ok(parsed) => parsed,
            Err(err) => return Err(self.fail(RefreshError::Decode(err.to_string()))),
        };
        if parsed.access_token.trim().is_empty() {
            return Err(self.fail(RefreshError::Decode(
                "accessToken is empty".to_owned(),
            )));
        }

        let credential = Credential::new(
            parsed.access_token,
            parsed
                .refresh_token
                .filter(|token| !token.trim().is_empty())
                .unwrap_or(refresh_token),
        );
        self.install(credential.clone());
        info!("credential refreshed");
        Ok(credential)
    }

    fn install(&self, credential: Credential) {
        {
            let mut state = self.state.write();
            state.credential = Some(credential.clone());
            state.generation += 1;
        }
        if let Err(err) = self.store.save(&credential) {
            warn!(error = %err, "could not persist refreshed tokens");
        }
    }

    /// Records an outage for callers queued behind this exchange.
    fn outage(&self, err: ApiError) -> RefreshError {
        {
            let mut state = self.state.write();
            state.outages += 1;
            state.last_outage = Some(err.clone());
        }
        warn!(error = %err, "identity endpoint unavailable, credentials kept");
        RefreshError::Unavailable(err)
    }

    /// Clears all credentials after an irrecoverable refresh failure.
    fn fail(&self, err: RefreshError) -> RefreshError {
        {
            let mut state = self.state.write();
            state.credential = None;
            state.generation += 1;
        }
        if let Err(store_err) = self.store.clear() {
            warn!(error = %store_err, "could not clear persisted tokens");
        }
        warn!(error = %err, "credential refresh failed, credentials cleared");
        err
    }
}
