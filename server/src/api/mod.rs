//! API Router and Application State
//!
//! Central routing configuration and shared state.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::Config, subscriptions, subscriptions::SubscriptionStore, webhooks::Deliverer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Subscription registry
    pub store: Arc<dyn SubscriptionStore>,
    /// Webhook deliverer, used to cancel retries on unsubscribe
    pub deliverer: Deliverer,
    /// Server configuration
    pub config: Arc<Config>,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(store: Arc<dyn SubscriptionStore>, deliverer: Deliverer, config: Config) -> Self {
        Self {
            store,
            deliverer,
            config: Arc::new(config),
            started_at: Instant::now(),
        }
    }
}

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Subscription management
        .nest("/webhooks", subscriptions::router())
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // State
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    /// Service status
    status: &'static str,
    /// Registered subscriptions
    subscriptions: usize,
    /// Seconds since start
    uptime: f64,
    /// Delivery chains in flight or awaiting retry
    pending_deliveries: usize,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscriptions: state.store.count(),
        uptime: state.started_at.elapsed().as_secs_f64(),
        pending_deliveries: state.deliverer.pending(),
    })
}
