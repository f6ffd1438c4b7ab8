//! Webhook Types
//!
//! Detected events, the outbound envelope, and per-delivery bookkeeping.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

use super::events::EventKind;
use crate::upstream::{Comment, Post};

/// Snapshot of the upstream activity that triggered an event.
#[derive(Debug, Clone, Serialize)]
pub struct EventData {
    pub post: Post,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<Comment>,
}

/// A detected unit of activity for one agent.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub agent_id: String,
    pub kind: EventKind,
    pub data: EventData,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn for_post(agent_id: &str, kind: EventKind, post: &Post) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            kind,
            data: EventData {
                post: post.clone(),
                comment: None,
            },
            created_at: Utc::now(),
        }
    }

    pub fn for_comment(agent_id: &str, kind: EventKind, post: &Post, comment: &Comment) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            kind,
            data: EventData {
                post: post.clone(),
                comment: Some(comment.clone()),
            },
            created_at: Utc::now(),
        }
    }
}

/// Body POSTed to the subscriber.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub event: EventKind,
    pub timestamp: String,
    pub data: &'a EventData,
}

impl<'a> WebhookPayload<'a> {
    pub fn new(event: &'a Event) -> Self {
        Self {
            event: event.kind,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data: &event.data,
        }
    }
}

/// Where an attempt chain currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// An attempt is in flight.
    Pending,
    /// Terminal success.
    Delivered,
    /// Waiting for the backoff timer.
    ScheduledRetry,
    /// Terminal failure after exhausting retries, or the subscriber went away.
    Abandoned,
}

/// Bookkeeping for a chain that is in flight or awaiting retry.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub agent_id: String,
    pub event: EventKind,
    pub attempts: u32,
    pub state: DeliveryState,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// Result of the synchronous part of a delivery (the first attempt).
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub delivery_id: String,
    pub state: DeliveryState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why a single HTTP attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Transport failure, including timeouts.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Receiver answered with a non-2xx status.
    #[error("HTTP {0}")]
    Status(u16),

    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Retries exhausted.
    #[error("Max retries exceeded after {0} attempts")]
    MaxRetriesExceeded(u32),
}
