#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use taskdeck_http::{ClientOptions, Credential, MemoryTokenStore, TaskDeckClient};

#[derive(Clone)]
pub struct MockResponse {
    status: StatusCode,
    body: Option<JsonValue>,
    delay: Duration,
}

impl MockResponse {
    pub fn json(status: StatusCode, body: JsonValue) -> Self {
        Self {
            status,
            body: Some(body),
            delay: Duration::from_millis(0),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            body: None,
            delay: Duration::from_millis(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn render(self) -> Response {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

/// Request as observed by the mock server.
#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub method: Method,
    pub path_and_query: String,
    pub authorization: Option<String>,
    pub body: String,
}

#[derive(Clone)]
struct MockState {
    api: Arc<Mutex<VecDeque<MockResponse>>>,
    refresh: Arc<Mutex<VecDeque<MockResponse>>>,
    /// When set, API requests not carrying this bearer token get a 401
    /// without consuming the queue.
    accepted_token: Arc<Mutex<Option<String>>>,
    api_hits: Arc<AtomicUsize>,
    refresh_hits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    refresh_bodies: Arc<Mutex<Vec<String>>>,
}

fn pop(queue: &Mutex<VecDeque<MockResponse>>) -> MockResponse {
    queue
        .lock()
        .expect("response queue mutex must not be poisoned")
        .pop_front()
        .unwrap_or_else(|| {
            MockResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "no mock response available"}),
            )
        })
}

async fn api_handler(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.api_hits.fetch_add(1, Ordering::SeqCst);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    state.seen.lock().expect("seen mutex").push(SeenRequest {
        method,
        path_and_query: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_owned())
            .unwrap_or_default(),
        authorization: authorization.clone(),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let accepted = state.accepted_token.lock().expect("token mutex").clone();
    if let Some(token) = accepted {
        if authorization.as_deref() != Some(format!("Bearer {token}").as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    pop(&state.api).render().await
}

async fn refresh_handler(State(state): State<MockState>, body: String) -> Response {
    state.refresh_hits.fetch_add(1, Ordering::SeqCst);
    state
        .refresh_bodies
        .lock()
        .expect("refresh bodies mutex")
        .push(body);
    pop(&state.refresh).render().await
}

pub struct TestServer {
    pub base_url: String,
    state: MockState,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    pub fn api_hits(&self) -> usize {
        self.state.api_hits.load(Ordering::SeqCst)
    }

    pub fn refresh_hits(&self) -> usize {
        self.state.refresh_hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.state.seen.lock().expect("seen mutex").clone()
    }

    pub fn refresh_bodies(&self) -> Vec<String> {
        self.state
            .refresh_bodies
            .lock()
            .expect("refresh bodies mutex")
            .clone()
    }

    pub fn accept_only(&self, token: &str) {
        *self.state.accepted_token.lock().expect("token mutex") = Some(token.to_owned());
    }

    pub fn push_api(&self, response: MockResponse) {
        self.state.api.lock().expect("api mutex").push_back(response);
    }
}

pub async fn spawn_server(api: Vec<MockResponse>, refresh: Vec<MockResponse>) -> TestServer {
    let state = MockState {
        api: Arc::new(Mutex::new(api.into())),
        refresh: Arc::new(Mutex::new(refresh.into())),
        accepted_token: Arc::new(Mutex::new(None)),
        api_hits: Arc::new(AtomicUsize::new(0)),
        refresh_hits: Arc::new(AtomicUsize::new(0)),
        seen: Arc::new(Mutex::new(Vec::new())),
        refresh_bodies: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/auth/refresh", post(refresh_handler))
        .fallback(api_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        state,
        task,
    }
}

pub fn fast_options() -> ClientOptions {
    ClientOptions {
        timeout: Duration::from_secs(2),
        max_retries: 2,
        retry_backoff: Duration::from_millis(1),
        ..ClientOptions::default()
    }
}

pub fn signed_in_store(access: &str, refresh: &str) -> Arc<MemoryTokenStore> {
    Arc::new(MemoryTokenStore::with_credential(Credential::new(
        access, refresh,
    )))
}

pub fn client_for(server: &TestServer, store: Arc<MemoryTokenStore>) -> TaskDeckClient {
    TaskDeckClient::builder()
        .base_url(server.base_url.clone())
        .options(fast_options())
        .token_store(store)
        .build()
        .expect("client must build")
}
