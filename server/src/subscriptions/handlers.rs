//! Subscription API Handlers
//!
//! Subscribe, unsubscribe and list endpoints. Validation failures are the
//! only errors surfaced synchronously to callers.

use std::collections::BTreeSet;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use tracing::{info, instrument};
use validator::Validate;

use super::error::{SubscriptionError, SubscriptionResult};
use super::types::{
    SubscribeRequest, SubscribeResponse, SubscriptionConfig, SubscriptionList,
    SubscriptionSummary, UnsubscribeResponse,
};
use crate::api::AppState;
use crate::webhooks::events::EventKind;

/// Validate a subscribe request and split it into an agent id and config.
pub fn validate_subscribe(req: SubscribeRequest) -> SubscriptionResult<(String, SubscriptionConfig)> {
    let missing: Vec<&str> = [
        ("agent_id", req.agent_id.as_deref().map_or(true, str::is_empty)),
        ("api_key", req.api_key.as_deref().map_or(true, str::is_empty)),
        ("url", req.url.as_deref().map_or(true, str::is_empty)),
        ("events", req.events.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();

    if !missing.is_empty() {
        return Err(SubscriptionError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    req.validate()
        .map_err(|e| SubscriptionError::Validation(e.to_string()))?;

    let (Some(agent_id), Some(api_key), Some(url), Some(raw_events)) =
        (req.agent_id, req.api_key, req.url, req.events)
    else {
        return Err(SubscriptionError::Validation(
            "Missing required fields: agent_id, api_key, url, events".to_string(),
        ));
    };

    let parsed = reqwest::Url::parse(&url)
        .map_err(|_| SubscriptionError::Validation("Invalid URL format".to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SubscriptionError::Validation(
            "URL must start with http:// or https://".to_string(),
        ));
    }

    let mut events = BTreeSet::new();
    for raw in &raw_events {
        let kind = EventKind::parse_str(raw).ok_or_else(|| {
            SubscriptionError::Validation(format!(
                "Unknown event kind: {raw} (expected one of {})",
                EventKind::ALL.map(|k| k.as_str()).join(", ")
            ))
        })?;
        events.insert(kind);
    }

    let secret = req.secret.filter(|s| !s.is_empty());

    Ok((
        agent_id,
        SubscriptionConfig {
            api_key,
            url,
            events,
            secret,
        },
    ))
}

/// POST /webhooks/subscribe
#[instrument(skip(state, payload))]
pub async fn subscribe(
    State(state): State<AppState>,
    payload: Result<Json<SubscribeRequest>, JsonRejection>,
) -> SubscriptionResult<Json<SubscribeResponse>> {
    let Json(req) = payload.map_err(|e| SubscriptionError::Validation(e.body_text()))?;
    let (agent_id, config) = validate_subscribe(req)?;

    let sub = state.store.register(&agent_id, config);
    let events: Vec<EventKind> = sub.events.iter().copied().collect();

    info!(
        agent_id = %sub.agent_id,
        url = %sub.url,
        events = ?events,
        signed = sub.secret.is_some(),
        "Subscribed"
    );

    Ok(Json(SubscribeResponse {
        success: true,
        message: "Webhook subscription created",
        agent_id: sub.agent_id,
        events,
    }))
}

/// DELETE /webhooks/subscribe/{agent_id}
#[instrument(skip(state))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> SubscriptionResult<Json<UnsubscribeResponse>> {
    if !state.store.unregister(&agent_id) {
        return Err(SubscriptionError::NotFound);
    }

    let dropped = state.deliverer.cancel_agent(&agent_id);
    info!(agent_id = %agent_id, dropped_deliveries = dropped, "Unsubscribed");

    Ok(Json(UnsubscribeResponse {
        success: true,
        message: "Subscription removed",
    }))
}

/// GET /webhooks/subscriptions
#[instrument(skip(state))]
pub async fn list_subscriptions(State(state): State<AppState>) -> Json<SubscriptionList> {
    let subscriptions: Vec<SubscriptionSummary> = state
        .store
        .list()
        .iter()
        .map(|sub| SubscriptionSummary::new(sub, state.store.seen_summary(&sub.agent_id)))
        .collect();

    Json(SubscriptionList {
        count: subscriptions.len(),
        subscriptions,
    })
}
