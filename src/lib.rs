//! `taskdeck-http` is a resilient async HTTP client for the TaskDeck REST API.
//!
//! Every request issued through [`TaskDeckClient`] gets:
//! - bounded retries with longer cool-downs for server errors than for
//!   connectivity failures ([`RetryPolicy`])
//! - transparent recovery from expired access tokens: one single-flight
//!   refresh shared by all concurrent callers, then one replay
//!   ([`CredentialManager`])
//! - a structured error taxonomy instead of raw transport errors ([`ApiError`])
//!
//! [`CachedResource`] adds a TTL read-through cache in front of one
//! high-traffic collection.

mod cache;
mod client;
mod credentials;
mod defaults;
mod error;
mod health;
mod options;
mod query;
mod resource;
mod retry;
mod store;
mod transport;
mod wire;

pub use cache::{CacheState, EntityCache, Keyed, DEFAULT_TTL};
pub use client::{TaskDeckClient, TaskDeckClientBuilder, REFRESH_PATH};
pub use credentials::{Credential, CredentialManager};
pub use defaults::{apply_create_defaults, ResourceKind};
pub use error::{ApiError, RefreshError, StoreError, TransportError};
pub use health::{HealthStatus, HEALTH_CHECK_PATH};
pub use options::ClientOptions;
pub use query::Query;
pub use resource::CachedResource;
pub use retry::{RetryCause, RetryPolicy};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{ReqwestTransport, Transport};
pub use wire::{ApiRequest, ApiResponse, RequestBody};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ApiError>;
