//! Subscription Registry
//!
//! Agent subscriptions, their bounded seen-state, and the HTTP API that
//! creates and removes them.

pub mod error;
pub mod handlers;
pub mod seen;
pub mod store;
pub mod types;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::api::AppState;

pub use error::SubscriptionError;
pub use seen::{BoundedSet, SeenState, SeenSummary};
pub use store::{MemoryStore, SubscriptionStore};
pub use types::{Subscription, SubscriptionConfig, SubscriptionStatus};

/// Routes mounted under `/webhooks`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscribe", post(handlers::subscribe))
        .route("/subscribe/{agent_id}", delete(handlers::unsubscribe))
        .route("/subscriptions", get(handlers::list_subscriptions))
}
