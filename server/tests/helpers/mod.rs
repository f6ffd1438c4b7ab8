//! Reusable test helpers for HTTP integration tests.
//!
//! Provides `TestApp` for building and sending requests through the full axum
//! router, a scriptable fake Moltbook API, and a recording webhook receiver.
//!
//! ## Test Servers
//!
//! Use [`spawn_test_server()`] to put any router on a random local port. The
//! fake upstream and the receiver both run this way so the real HTTP clients
//! are exercised end to end.
#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{self, HeaderMap, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use molthook_server::api::{create_router, AppState};
use molthook_server::config::Config;
use molthook_server::poller::{CycleScheduler, PollSettings, Poller};
use molthook_server::subscriptions::{MemoryStore, SubscriptionConfig, SubscriptionStore};
use molthook_server::upstream::UpstreamClient;
use molthook_server::webhooks::{Deliverer, DeliverySettings, EventKind};

// ============================================================================
// Test Server
// ============================================================================

/// A running test server bound to a random port.
pub struct TestServer {
    /// Server address (127.0.0.1:PORT).
    pub addr: SocketAddr,
    /// Base URL for HTTP requests (e.g., `http://127.0.0.1:12345`).
    pub url: String,
    /// Handle to the server task for cleanup.
    handle: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawn a real HTTP server on a random port.
pub async fn spawn_test_server(router: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Test server failed");
    });

    TestServer {
        addr,
        url,
        handle,
    }
}

// ============================================================================
// Test App
// ============================================================================

/// The full router plus handles on the state behind it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn SubscriptionStore>,
    pub deliverer: Deliverer,
    pub config: Arc<Config>,
    shutdown: CancellationToken,
}

impl TestApp {
    /// Build an app with [`Config::default_for_test`]. Must run inside a runtime.
    pub fn new() -> Self {
        Self::with_config(Config::default_for_test())
    }

    /// Build an app with a custom config and start its retry worker.
    pub fn with_config(config: Config) -> Self {
        let store: Arc<dyn SubscriptionStore> = Arc::new(MemoryStore::new(config.seen_capacity));
        let (deliverer, worker) =
            Deliverer::new(store.clone(), DeliverySettings::from_config(&config))
                .expect("Failed to build deliverer");

        let shutdown = CancellationToken::new();
        tokio::spawn(worker.run(shutdown.clone()));

        let state = AppState::new(store.clone(), deliverer.clone(), config.clone());
        let router = create_router(state);

        Self {
            router,
            store,
            deliverer,
            config: Arc::new(config),
            shutdown,
        }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    /// POST a JSON body to `/webhooks/subscribe`.
    pub async fn subscribe(&self, body: Value) -> Response<Body> {
        let req = Self::request(Method::POST, "/webhooks/subscribe")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.oneshot(req).await
    }

    /// DELETE `/webhooks/subscribe/{agent_id}`.
    pub async fn unsubscribe(&self, agent_id: &str) -> Response<Body> {
        let req = Self::request(Method::DELETE, &format!("/webhooks/subscribe/{agent_id}"))
            .body(Body::empty())
            .unwrap();
        self.oneshot(req).await
    }

    /// A poller reading from `upstream_url` and sharing this app's store.
    pub fn poller(&self, upstream_url: &str) -> Arc<Poller> {
        let upstream = UpstreamClient::new(
            upstream_url,
            Duration::from_secs(self.config.upstream_timeout_secs),
        )
        .expect("Failed to build upstream client");
        Arc::new(Poller::new(
            upstream,
            self.store.clone(),
            PollSettings::from_config(&self.config),
        ))
    }

    /// A scheduler wired to this app's store and deliverer.
    pub fn scheduler(&self, upstream_url: &str, interval: Duration) -> CycleScheduler {
        CycleScheduler::new(
            self.poller(upstream_url),
            self.deliverer.clone(),
            self.store.clone(),
            interval,
        )
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Subscription fields for registering directly through the store.
pub fn subscription_config(
    api_key: &str,
    url: &str,
    events: &[EventKind],
    secret: Option<&str>,
) -> SubscriptionConfig {
    SubscriptionConfig {
        api_key: api_key.to_string(),
        url: url.to_string(),
        events: events.iter().copied().collect::<BTreeSet<_>>(),
        secret: secret.map(str::to_string),
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}

// ============================================================================
// Fake Moltbook
// ============================================================================

#[derive(Default)]
struct MoltbookState {
    /// api key -> agent name
    agents: HashMap<String, String>,
    /// Newest first.
    posts: Vec<Value>,
    comments: HashMap<String, Vec<Value>>,
    /// Status forced for every request made with an api key.
    key_status: HashMap<String, u16>,
    /// Status forced for a post's comment listing.
    comment_status: HashMap<String, u16>,
    delay: Option<Duration>,
    requests: usize,
}

/// Scriptable stand-in for the Moltbook API.
#[derive(Clone, Default)]
pub struct FakeMoltbook {
    state: Arc<Mutex<MoltbookState>>,
}

impl FakeMoltbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agent(&self, api_key: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.agents.insert(api_key.to_string(), name.to_string());
    }

    /// Add a post to the top of the feed.
    pub fn add_post(&self, post: Value) {
        self.state.lock().unwrap().posts.insert(0, post);
    }

    pub fn add_comment(&self, post_id: &str, comment: Value) {
        let mut state = self.state.lock().unwrap();
        state
            .comments
            .entry(post_id.to_string())
            .or_default()
            .insert(0, comment);
    }

    pub fn fail_key(&self, api_key: &str, status: u16) {
        let mut state = self.state.lock().unwrap();
        state.key_status.insert(api_key.to_string(), status);
    }

    pub fn fail_comments(&self, post_id: &str, status: u16) {
        let mut state = self.state.lock().unwrap();
        state.comment_status.insert(post_id.to_string(), status);
    }

    /// Delay every response.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    /// Total requests served.
    pub fn requests(&self) -> usize {
        self.state.lock().unwrap().requests
    }

    pub async fn spawn(&self) -> TestServer {
        let router = Router::new()
            .route("/agents/me", get(fake_me))
            .route("/feed", get(fake_feed))
            .route("/posts/{post_id}/comments", get(fake_comments))
            .with_state(self.clone());
        spawn_test_server(router).await
    }

    /// Count the request, apply the configured delay, and resolve the caller.
    async fn authorize(&self, headers: &HeaderMap) -> Result<String, StatusCode> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.requests += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let key = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(StatusCode::UNAUTHORIZED)?
            .to_string();

        let state = self.state.lock().unwrap();
        if let Some(&status) = state.key_status.get(&key) {
            return Err(StatusCode::from_u16(status).unwrap());
        }
        state
            .agents
            .get(&key)
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

fn limit_of(query: &HashMap<String, String>) -> usize {
    query
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(usize::MAX)
}

async fn fake_me(State(fake): State<FakeMoltbook>, headers: HeaderMap) -> impl IntoResponse {
    match fake.authorize(&headers).await {
        Ok(name) => Json(json!({ "success": true, "agent": { "name": name } })).into_response(),
        Err(status) => (status, Json(json!({ "error": "nope" }))).into_response(),
    }
}

async fn fake_feed(
    State(fake): State<FakeMoltbook>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if let Err(status) = fake.authorize(&headers).await {
        return status.into_response();
    }
    let state = fake.state.lock().unwrap();
    let posts: Vec<Value> = state.posts.iter().take(limit_of(&query)).cloned().collect();
    Json(json!({ "success": true, "data": posts })).into_response()
}

async fn fake_comments(
    State(fake): State<FakeMoltbook>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if let Err(status) = fake.authorize(&headers).await {
        return status.into_response();
    }
    let state = fake.state.lock().unwrap();
    if let Some(&status) = state.comment_status.get(&post_id) {
        return StatusCode::from_u16(status).unwrap().into_response();
    }
    let comments: Vec<Value> = state
        .comments
        .get(&post_id)
        .map(|c| c.iter().take(limit_of(&query)).cloned().collect())
        .unwrap_or_default();
    Json(json!({ "success": true, "comments": comments })).into_response()
}

// ============================================================================
// Webhook Receiver
// ============================================================================

/// One request received by [`WebhookReceiver`].
#[derive(Debug, Clone)]
pub struct Hit {
    pub headers: HeaderMap,
    pub body: Bytes,
    pub at: Instant,
}

impl Hit {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("Webhook body is not JSON")
    }
}

#[derive(Default)]
struct ReceiverState {
    hits: Vec<Hit>,
    failures_left: usize,
    fail_status: u16,
}

/// Subscriber endpoint that records every delivery.
#[derive(Clone, Default)]
pub struct WebhookReceiver {
    state: Arc<Mutex<ReceiverState>>,
}

impl WebhookReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next `count` requests with `status`.
    pub fn fail_next(&self, count: usize, status: u16) {
        let mut state = self.state.lock().unwrap();
        state.failures_left = count;
        state.fail_status = status;
    }

    pub fn always_fail(&self, status: u16) {
        self.fail_next(usize::MAX, status);
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.state.lock().unwrap().hits.clone()
    }

    pub fn count(&self) -> usize {
        self.state.lock().unwrap().hits.len()
    }

    /// Wait until at least `n` requests arrived. Returns `false` on timeout.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.count() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.count() >= n
    }

    /// Serve on a random port; deliveries go to `{url}/hook`.
    pub async fn spawn(&self) -> TestServer {
        let router = Router::new()
            .route("/hook", post(receive_hook))
            .with_state(self.clone());
        spawn_test_server(router).await
    }
}

async fn receive_hook(
    State(receiver): State<WebhookReceiver>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let mut state = receiver.state.lock().unwrap();
    state.hits.push(Hit {
        headers,
        body,
        at: Instant::now(),
    });

    if state.failures_left > 0 {
        state.failures_left = state.failures_left.saturating_sub(1);
        StatusCode::from_u16(state.fail_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    } else {
        StatusCode::OK
    }
}
