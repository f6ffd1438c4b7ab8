//! Poll Engine
//!
//! Reads recent upstream activity for each subscription, records what was
//! seen, and turns new mentions and replies into events.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use super::mention;
use crate::config::Config;
use crate::subscriptions::{Subscription, SubscriptionStore};
use crate::upstream::{Post, UpstreamClient, UpstreamError};
use crate::webhooks::{Event, EventKind};

/// Page sizes and parallelism for a poll cycle.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub feed_page_size: usize,
    pub comment_page_size: usize,
    /// Subscriptions polled concurrently within one cycle.
    pub concurrency: usize,
}

impl PollSettings {
    pub const fn from_config(config: &Config) -> Self {
        Self {
            feed_page_size: config.feed_page_size,
            comment_page_size: config.comment_page_size,
            concurrency: config.poll_concurrency,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            feed_page_size: 50,
            comment_page_size: 20,
            concurrency: 4,
        }
    }
}

/// What one agent's poll produced.
#[derive(Debug, Default)]
pub struct AgentPoll {
    /// Events detected before the poll finished or stopped.
    pub events: Vec<Event>,
    /// Set when an upstream failure cut the poll short. Events detected
    /// before the failure are kept, since their ids are already marked seen.
    pub error: Option<UpstreamError>,
}

/// Detects new activity for registered agents.
pub struct Poller {
    upstream: UpstreamClient,
    store: Arc<dyn SubscriptionStore>,
    settings: PollSettings,
}

impl Poller {
    pub fn new(
        upstream: UpstreamClient,
        store: Arc<dyn SubscriptionStore>,
        settings: PollSettings,
    ) -> Self {
        Self {
            upstream,
            store,
            settings,
        }
    }

    /// Poll every active subscription. A failure for one agent is logged and
    /// does not affect the others. Events come back grouped in subscription
    /// order.
    pub async fn poll_all(&self) -> Vec<Event> {
        let subscriptions: Vec<Subscription> = self
            .store
            .list()
            .into_iter()
            .filter(|s| s.status.is_active())
            .collect();

        let per_agent: Vec<Vec<Event>> = stream::iter(subscriptions)
            .map(|sub| async move {
                let AgentPoll { events, error } = self.poll_agent(&sub).await;
                if let Some(e) = error {
                    self.handle_poll_error(&sub, &e);
                }
                events
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        per_agent.into_iter().flatten().collect()
    }

    /// Poll one subscription.
    ///
    /// Stops early, keeping whatever was found so far, if the agent is
    /// unregistered mid-poll or upstream rejects the request.
    #[instrument(skip(self, subscription), fields(agent_id = %subscription.agent_id))]
    pub async fn poll_agent(&self, subscription: &Subscription) -> AgentPoll {
        let mut events = Vec::new();
        let error = self.scan_agent(subscription, &mut events).await.err();
        AgentPoll { events, error }
    }

    async fn scan_agent(
        &self,
        subscription: &Subscription,
        events: &mut Vec<Event>,
    ) -> Result<(), UpstreamError> {
        let agent_id = subscription.agent_id.as_str();
        let api_key = subscription.api_key.as_str();

        let Some(me) = self.upstream.me(api_key).await? else {
            warn!("Upstream profile response had no agent, skipping");
            return Ok(());
        };

        let posts = self
            .upstream
            .feed(api_key, self.settings.feed_page_size)
            .await?;

        for post in &posts {
            let Some(fresh) = self.store.mark_post_seen(agent_id, &post.id) else {
                debug!("Unsubscribed during poll, stopping");
                return Ok(());
            };

            if fresh
                && subscription.wants(EventKind::AgentMentioned)
                && mention::matches(&post.mention_text(), &me.name)
            {
                events.push(Event::for_post(agent_id, EventKind::AgentMentioned, post));
            }

            if post.comment_count > 0 {
                match self.scan_comments(subscription, &me.name, post, events).await {
                    Ok(true) => {}
                    Ok(false) => return Ok(()),
                    Err(e) if e.is_not_found() => {
                        debug!(post_id = %post.id, "Post disappeared, skipping comments");
                    }
                    Err(e) if e.is_auth() => return Err(e),
                    // Unseen comments are picked up next cycle.
                    Err(e) => {
                        warn!(post_id = %post.id, error = %e, "Failed to fetch comments");
                    }
                }
            }
        }

        self.store.record_check(agent_id, Utc::now());

        debug!(
            posts = posts.len(),
            events = events.len(),
            "Polled agent"
        );

        Ok(())
    }

    /// Push events for fresh comments on `post`. `Ok(false)` means the agent
    /// was unregistered while scanning.
    async fn scan_comments(
        &self,
        subscription: &Subscription,
        agent_name: &str,
        post: &Post,
        events: &mut Vec<Event>,
    ) -> Result<bool, UpstreamError> {
        let agent_id = subscription.agent_id.as_str();
        let comments = self
            .upstream
            .comments(&subscription.api_key, &post.id, self.settings.comment_page_size)
            .await?;

        for comment in &comments {
            let Some(fresh) = self.store.mark_comment_seen(agent_id, &comment.id) else {
                return Ok(false);
            };
            if !fresh {
                continue;
            }

            if subscription.wants(EventKind::AgentMentioned)
                && mention::matches(comment.mention_text(), agent_name)
            {
                events.push(Event::for_comment(
                    agent_id,
                    EventKind::AgentMentioned,
                    post,
                    comment,
                ));
            }

            if comment.is_reply() {
                let kind = if subscription.wants(EventKind::CommentReplied) {
                    Some(EventKind::CommentReplied)
                } else if subscription.wants(EventKind::CommentCreated) {
                    Some(EventKind::CommentCreated)
                } else {
                    None
                };

                if let Some(kind) = kind {
                    events.push(Event::for_comment(agent_id, kind, post, comment));
                }
            }
        }

        Ok(true)
    }

    fn handle_poll_error(&self, subscription: &Subscription, err: &UpstreamError) {
        if err.is_auth() {
            if self
                .store
                .suspend(&subscription.agent_id, &subscription.api_key, &err.to_string())
            {
                error!(
                    agent_id = %subscription.agent_id,
                    error = %err,
                    "Upstream rejected credential, suspending subscription until re-subscribed"
                );
            } else {
                info!(
                    agent_id = %subscription.agent_id,
                    error = %err,
                    "Rejected credential was already replaced or unsubscribed"
                );
            }
        } else {
            warn!(
                agent_id = %subscription.agent_id,
                error = %err,
                "Error polling agent"
            );
        }
    }
}
