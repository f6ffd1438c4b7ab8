//! Subscription Types
//!
//! Registry records plus the request/response bodies of the subscription API.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::seen::SeenSummary;
use crate::webhooks::events::EventKind;

/// Whether the poller should visit a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    /// Upstream rejected the credential; polling stops until re-subscribe.
    Suspended {
        reason: String,
        since: DateTime<Utc>,
    },
}

impl SubscriptionStatus {
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Fields supplied by the subscriber. Overwritten wholesale on re-subscribe.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub api_key: String,
    pub url: String,
    pub events: BTreeSet<EventKind>,
    pub secret: Option<String>,
}

/// A registered agent.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub agent_id: String,
    pub api_key: String,
    pub url: String,
    pub events: BTreeSet<EventKind>,
    pub secret: Option<String>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(agent_id: &str, config: SubscriptionConfig) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.to_string(),
            api_key: config.api_key,
            url: config.url,
            events: config.events,
            secret: config.secret,
            status: SubscriptionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite subscriber-supplied fields, keeping identity and creation time.
    pub fn apply(&mut self, config: SubscriptionConfig) {
        self.api_key = config.api_key;
        self.url = config.url;
        self.events = config.events;
        self.secret = config.secret;
        self.status = SubscriptionStatus::Active;
        self.updated_at = Utc::now();
    }

    pub fn wants(&self, kind: EventKind) -> bool {
        self.events.contains(&kind)
    }
}

/// `POST /webhooks/subscribe` body.
///
/// Every field is optional at the serde level so that a missing field is
/// reported as a validation error rather than a deserialization rejection.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(length(min = 1, max = 128))]
    pub agent_id: Option<String>,
    #[validate(length(min = 1))]
    pub api_key: Option<String>,
    #[validate(url)]
    pub url: Option<String>,
    #[validate(length(min = 1))]
    pub events: Option<Vec<String>>,
    pub secret: Option<String>,
}

/// Successful subscribe response.
#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub message: &'static str,
    pub agent_id: String,
    pub events: Vec<EventKind>,
}

/// Successful unsubscribe response.
#[derive(Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Listing entry. Never carries the API key or secret.
#[derive(Debug, Serialize)]
pub struct SubscriptionSummary {
    pub agent_id: String,
    pub url: String,
    pub events: Vec<EventKind>,
    pub has_secret: bool,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub seen: Option<SeenSummary>,
}

impl SubscriptionSummary {
    pub fn new(sub: &Subscription, seen: Option<SeenSummary>) -> Self {
        Self {
            agent_id: sub.agent_id.clone(),
            url: sub.url.clone(),
            events: sub.events.iter().copied().collect(),
            has_secret: sub.secret.is_some(),
            status: sub.status.clone(),
            created_at: sub.created_at,
            updated_at: sub.updated_at,
            seen,
        }
    }
}

/// `GET /webhooks/subscriptions` response.
#[derive(Debug, Serialize)]
pub struct SubscriptionList {
    pub count: usize,
    pub subscriptions: Vec<SubscriptionSummary>,
}
