//! Webhook Delivery
//!
//! Sends events to subscriber endpoints with HMAC signing and owns the
//! per-delivery retry state machine.
//!
//! Architecture:
//! - `Deliverer::deliver` serializes the envelope once, makes the first
//!   attempt inline and reports where the chain ended up.
//! - A failed attempt is handed to the `RetryWorker`, which parks it in a
//!   `DelayQueue` keyed by delivery id until its backoff elapses.
//! - Before a parked attempt fires, the worker checks that the chain is still
//!   tracked and the agent is still subscribed; otherwise nothing is sent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, error, info, warn};

use super::events::EventKind;
use super::signing;
use super::types::{
    DeliveryError, DeliveryOutcome, DeliveryRecord, DeliveryState, Event, WebhookPayload,
};
use crate::config::Config;
use crate::subscriptions::{Subscription, SubscriptionStore};

/// Header carrying the event kind.
pub const EVENT_HEADER: &str = "X-Moltbook-Event";

/// Header carrying the delivery id (stable across retries of one chain).
pub const DELIVERY_HEADER: &str = "X-Moltbook-Delivery";

/// Header carrying the hex HMAC-SHA256 of the body. Only sent with a secret.
pub const SIGNATURE_HEADER: &str = "X-Moltbook-Signature";

/// Exponential backoff schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay unit; the retry after failure `n` waits `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the retry that follows `failed_attempts` failures.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(failed_attempts.min(16)))
    }

    /// Whether another attempt may follow `failed_attempts` failures.
    pub const fn allows_retry(&self, failed_attempts: u32) -> bool {
        failed_attempts <= self.max_retries
    }
}

/// Delivery tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct DeliverySettings {
    pub timeout: Duration,
    pub policy: RetryPolicy,
    /// Pause between consecutive deliveries in a batch.
    pub batch_pause: Duration,
}

impl DeliverySettings {
    pub const fn from_config(config: &Config) -> Self {
        Self {
            timeout: Duration::from_secs(config.delivery_timeout_secs),
            policy: RetryPolicy {
                max_retries: config.delivery_max_retries,
                base_delay: Duration::from_millis(config.delivery_backoff_base_ms),
            },
            batch_pause: Duration::from_millis(config.delivery_batch_pause_ms),
        }
    }
}

/// One attempt chain. The body is fixed for the life of the chain.
#[derive(Debug)]
struct Chain {
    delivery_id: String,
    agent_id: String,
    kind: EventKind,
    body: Bytes,
    attempts: u32,
}

/// A chain waiting on the retry worker.
#[derive(Debug)]
struct ScheduledRetry {
    chain: Chain,
    delay: Duration,
}

struct Inner {
    http: reqwest::Client,
    store: Arc<dyn SubscriptionStore>,
    settings: DeliverySettings,
    records: DashMap<String, DeliveryRecord>,
    retry_tx: mpsc::UnboundedSender<ScheduledRetry>,
}

/// Cheap-to-clone handle to the delivery engine.
#[derive(Clone)]
pub struct Deliverer {
    inner: Arc<Inner>,
}

impl Deliverer {
    /// Build a deliverer and the worker that must be spawned to drive its retries.
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        settings: DeliverySettings,
    ) -> Result<(Self, RetryWorker), DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("molthook/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let (retry_tx, retry_rx) = mpsc::unbounded_channel();

        let deliverer = Self {
            inner: Arc::new(Inner {
                http,
                store,
                settings,
                records: DashMap::new(),
                retry_tx,
            }),
        };

        let worker = RetryWorker {
            deliverer: deliverer.clone(),
            rx: retry_rx,
        };

        Ok((deliverer, worker))
    }

    /// Deliver one event. Returns after the first attempt; any retries run
    /// on the worker and never surface to the caller.
    pub async fn deliver(&self, subscription: &Subscription, event: &Event) -> DeliveryOutcome {
        let delivery_id = signing::generate_delivery_id();

        let body = match serde_json::to_vec(&WebhookPayload::new(event)) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                let err = DeliveryError::from(e);
                error!(
                    delivery_id = %delivery_id,
                    agent_id = %subscription.agent_id,
                    event = %event.kind,
                    "{err}"
                );
                return DeliveryOutcome {
                    delivery_id,
                    state: DeliveryState::Abandoned,
                    attempts: 0,
                    error: Some(err.to_string()),
                };
            }
        };

        self.inner.records.insert(
            delivery_id.clone(),
            DeliveryRecord {
                agent_id: subscription.agent_id.clone(),
                event: event.kind,
                attempts: 0,
                state: DeliveryState::Pending,
                next_retry_at: None,
            },
        );

        let chain = Chain {
            delivery_id,
            agent_id: subscription.agent_id.clone(),
            kind: event.kind,
            body,
            attempts: 0,
        };

        self.attempt(chain, &subscription.url, subscription.secret.as_deref())
            .await
    }

    /// Deliver events to one subscriber in order, pausing between sends.
    pub async fn deliver_batch(
        &self,
        subscription: &Subscription,
        events: &[Event],
    ) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(events.len());

        for (i, event) in events.iter().enumerate() {
            if i > 0 && !self.inner.settings.batch_pause.is_zero() {
                tokio::time::sleep(self.inner.settings.batch_pause).await;
            }
            outcomes.push(self.deliver(subscription, event).await);
        }

        outcomes
    }

    /// Drop bookkeeping for every chain belonging to `agent_id`, so pending
    /// retries become no-ops. Returns how many chains were dropped.
    pub fn cancel_agent(&self, agent_id: &str) -> usize {
        let ids: Vec<String> = self
            .inner
            .records
            .iter()
            .filter(|r| r.agent_id == agent_id)
            .map(|r| r.key().clone())
            .collect();

        for id in &ids {
            self.inner.records.remove(id);
        }

        ids.len()
    }

    /// Chains in flight or awaiting retry.
    pub fn pending(&self) -> usize {
        self.inner.records.len()
    }

    pub fn record(&self, delivery_id: &str) -> Option<DeliveryRecord> {
        self.inner.records.get(delivery_id).map(|r| r.clone())
    }

    async fn attempt(&self, mut chain: Chain, url: &str, secret: Option<&str>) -> DeliveryOutcome {
        if let Some(mut record) = self.inner.records.get_mut(&chain.delivery_id) {
            record.state = DeliveryState::Pending;
            record.next_retry_at = None;
        }

        let result = self.send(&chain, url, secret).await;
        chain.attempts += 1;

        match result {
            Ok(()) => {
                self.inner.records.remove(&chain.delivery_id);
                debug!(
                    delivery_id = %chain.delivery_id,
                    agent_id = %chain.agent_id,
                    event = %chain.kind,
                    attempts = chain.attempts,
                    "Webhook delivered"
                );
                DeliveryOutcome {
                    delivery_id: chain.delivery_id,
                    state: DeliveryState::Delivered,
                    attempts: chain.attempts,
                    error: None,
                }
            }
            Err(e) => self.handle_failure(chain, &e),
        }
    }

    async fn send(&self, chain: &Chain, url: &str, secret: Option<&str>) -> Result<(), DeliveryError> {
        let mut request = self
            .inner
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header(EVENT_HEADER, chain.kind.as_str())
            .header(DELIVERY_HEADER, chain.delivery_id.as_str());

        if let Some(secret) = secret {
            request = request.header(SIGNATURE_HEADER, signing::body_signature(secret, &chain.body));
        }

        let resp = request.body(chain.body.clone()).send().await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(status.as_u16()))
        }
    }

    fn handle_failure(&self, chain: Chain, err: &DeliveryError) -> DeliveryOutcome {
        let policy = self.inner.settings.policy;

        if !policy.allows_retry(chain.attempts) {
            self.inner.records.remove(&chain.delivery_id);
            let terminal = DeliveryError::MaxRetriesExceeded(chain.attempts);
            error!(
                delivery_id = %chain.delivery_id,
                agent_id = %chain.agent_id,
                event = %chain.kind,
                last_error = %err,
                "{terminal}, abandoning webhook delivery"
            );
            return DeliveryOutcome {
                delivery_id: chain.delivery_id,
                state: DeliveryState::Abandoned,
                attempts: chain.attempts,
                error: Some(terminal.to_string()),
            };
        }

        let delay = policy.delay_for(chain.attempts);
        let next_retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        // Cancelled while the attempt was in flight.
        let Some(mut record) = self.inner.records.get_mut(&chain.delivery_id) else {
            debug!(
                delivery_id = %chain.delivery_id,
                agent_id = %chain.agent_id,
                "Delivery cancelled during attempt, not retrying"
            );
            return DeliveryOutcome {
                delivery_id: chain.delivery_id,
                state: DeliveryState::Abandoned,
                attempts: chain.attempts,
                error: Some(err.to_string()),
            };
        };
        record.attempts = chain.attempts;
        record.state = DeliveryState::ScheduledRetry;
        record.next_retry_at = Some(next_retry_at);
        drop(record);

        warn!(
            delivery_id = %chain.delivery_id,
            agent_id = %chain.agent_id,
            event = %chain.kind,
            attempt = chain.attempts,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Webhook delivery failed, scheduling retry"
        );

        let outcome = DeliveryOutcome {
            delivery_id: chain.delivery_id.clone(),
            state: DeliveryState::ScheduledRetry,
            attempts: chain.attempts,
            error: Some(err.to_string()),
        };

        if let Err(mpsc::error::SendError(rejected)) =
            self.inner.retry_tx.send(ScheduledRetry { chain, delay })
        {
            self.inner.records.remove(&rejected.chain.delivery_id);
            error!(
                delivery_id = %rejected.chain.delivery_id,
                "Retry worker is not running, abandoning webhook delivery"
            );
            return DeliveryOutcome {
                state: DeliveryState::Abandoned,
                ..outcome
            };
        }

        outcome
    }

    /// Run a parked attempt if its chain and subscriber are still live.
    async fn fire_retry(&self, chain: Chain) -> Option<DeliveryOutcome> {
        if !self.inner.records.contains_key(&chain.delivery_id) {
            debug!(
                delivery_id = %chain.delivery_id,
                agent_id = %chain.agent_id,
                "Retry cancelled, skipping"
            );
            return None;
        }

        let Some(subscription) = self.inner.store.get(&chain.agent_id) else {
            self.inner.records.remove(&chain.delivery_id);
            info!(
                delivery_id = %chain.delivery_id,
                agent_id = %chain.agent_id,
                "Subscriber no longer registered, dropping retry"
            );
            return None;
        };

        Some(
            self.attempt(chain, &subscription.url, subscription.secret.as_deref())
                .await,
        )
    }
}

/// Background task that fires parked retries when their backoff elapses.
pub struct RetryWorker {
    deliverer: Deliverer,
    rx: mpsc::UnboundedReceiver<ScheduledRetry>,
}

impl RetryWorker {
    /// Run until `shutdown` is cancelled. Parked retries are dropped on exit.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Webhook retry worker started");

        let mut queue: DelayQueue<Chain> = DelayQueue::new();
        let mut keys: HashMap<String, delay_queue::Key> = HashMap::new();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!(dropped = queue.len(), "Webhook retry worker stopping");
                    break;
                }
                Some(scheduled) = self.rx.recv() => {
                    let id = scheduled.chain.delivery_id.clone();
                    if let Some(stale) = keys.remove(&id) {
                        queue.remove(&stale);
                    }
                    let key = queue.insert(scheduled.chain, scheduled.delay);
                    keys.insert(id, key);
                }
                Some(expired) = queue.next(), if !queue.is_empty() => {
                    let chain = expired.into_inner();
                    keys.remove(&chain.delivery_id);
                    self.spawn_attempt(chain);
                }
            }
        }
    }

    fn spawn_attempt(&self, chain: Chain) {
        let deliverer = self.deliverer.clone();

        tokio::spawn(async move {
            let delivery_id = chain.delivery_id.clone();
            let agent_id = chain.agent_id.clone();
            let handle = tokio::spawn(async move {
                deliverer.fire_retry(chain).await;
            });
            if let Err(e) = handle.await {
                error!(
                    delivery_id = %delivery_id,
                    agent_id = %agent_id,
                    "Retry task panicked: {}", e
                );
            }
        });
    }
}
