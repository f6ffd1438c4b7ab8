//! Subscription Store
//!
//! Storage interface for the registry and its paired seen-state, plus the
//! in-memory implementation used by the server.
//!
//! Each agent's subscription and seen-state live in the same `DashMap`
//! entry, so registration, unregistration and dedup updates for one agent
//! are serialized by that entry's shard lock while other agents proceed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::seen::{SeenState, SeenSummary};
use super::types::{Subscription, SubscriptionConfig, SubscriptionStatus};

/// Registry + seen-state storage.
///
/// Methods that touch seen-state return `None` when the agent is no longer
/// registered, which lets in-flight work notice an unsubscribe immediately.
pub trait SubscriptionStore: Send + Sync {
    /// Insert or overwrite a subscription. Seen-state is created on first
    /// registration and kept across re-registration.
    fn register(&self, agent_id: &str, config: SubscriptionConfig) -> Subscription;

    /// Remove the subscription and its seen-state. Returns `false` if unknown.
    fn unregister(&self, agent_id: &str) -> bool;

    fn get(&self, agent_id: &str) -> Option<Subscription>;

    fn list(&self) -> Vec<Subscription>;

    fn count(&self) -> usize;

    /// Stop polling a subscription until it is re-registered.
    ///
    /// Only applies while the stored credential is still `api_key`, so a
    /// rejection observed for a credential that has since been replaced is
    /// ignored.
    fn suspend(&self, agent_id: &str, api_key: &str, reason: &str) -> bool;

    /// Record a post id as seen. `Some(true)` when it was new.
    fn mark_post_seen(&self, agent_id: &str, post_id: &str) -> Option<bool>;

    /// Record a comment id as seen. `Some(true)` when it was new.
    fn mark_comment_seen(&self, agent_id: &str, comment_id: &str) -> Option<bool>;

    fn record_check(&self, agent_id: &str, at: DateTime<Utc>) -> bool;

    fn seen_summary(&self, agent_id: &str) -> Option<SeenSummary>;
}

struct AgentEntry {
    subscription: Subscription,
    seen: SeenState,
}

/// Volatile, process-local store. Contents are lost on restart.
pub struct MemoryStore {
    entries: DashMap<String, AgentEntry>,
    seen_capacity: usize,
}

impl MemoryStore {
    pub fn new(seen_capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            seen_capacity,
        }
    }
}

impl SubscriptionStore for MemoryStore {
    fn register(&self, agent_id: &str, config: SubscriptionConfig) -> Subscription {
        let mut entry = self
            .entries
            .entry(agent_id.to_string())
            .and_modify(|e| e.subscription.apply(config.clone()))
            .or_insert_with(|| AgentEntry {
                subscription: Subscription::new(agent_id, config.clone()),
                seen: SeenState::new(self.seen_capacity),
            });
        entry.value_mut().subscription.clone()
    }

    fn unregister(&self, agent_id: &str) -> bool {
        self.entries.remove(agent_id).is_some()
    }

    fn get(&self, agent_id: &str) -> Option<Subscription> {
        self.entries.get(agent_id).map(|e| e.subscription.clone())
    }

    fn list(&self) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .entries
            .iter()
            .map(|e| e.subscription.clone())
            .collect();
        subs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        subs
    }

    fn count(&self) -> usize {
        self.entries.len()
    }

    fn suspend(&self, agent_id: &str, api_key: &str, reason: &str) -> bool {
        let Some(mut entry) = self.entries.get_mut(agent_id) else {
            return false;
        };
        if entry.subscription.api_key != api_key {
            debug!(agent_id, "Credential replaced since it was rejected, not suspending");
            return false;
        }
        entry.subscription.status = SubscriptionStatus::Suspended {
            reason: reason.to_string(),
            since: Utc::now(),
        };
        true
    }

    fn mark_post_seen(&self, agent_id: &str, post_id: &str) -> Option<bool> {
        let mut entry = self.entries.get_mut(agent_id)?;
        let fresh = entry.seen.posts.insert(post_id);
        if !fresh {
            debug!(agent_id, post_id, "Post already seen");
        }
        Some(fresh)
    }

    fn mark_comment_seen(&self, agent_id: &str, comment_id: &str) -> Option<bool> {
        let mut entry = self.entries.get_mut(agent_id)?;
        Some(entry.seen.comments.insert(comment_id))
    }

    fn record_check(&self, agent_id: &str, at: DateTime<Utc>) -> bool {
        self.entries.get_mut(agent_id).is_some_and(|mut e| {
            e.seen.last_check = Some(at);
            true
        })
    }

    fn seen_summary(&self, agent_id: &str) -> Option<SeenSummary> {
        self.entries.get(agent_id).map(|e| e.seen.summary())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::webhooks::events::EventKind;

    fn config(url: &str) -> SubscriptionConfig {
        SubscriptionConfig {
            api_key: "key".into(),
            url: url.into(),
            events: BTreeSet::from([EventKind::AgentMentioned]),
            secret: None,
        }
    }

    #[test]
    fn register_and_get() {
        let store = MemoryStore::new(10);
        store.register("agent-1", config("https://a.example/hook"));
        assert_eq!(store.count(), 1);
        let sub = store.get("agent-1").unwrap();
        assert_eq!(sub.url, "https://a.example/hook");
        assert!(sub.status.is_active());
        assert_eq!(store.seen_summary("agent-1").unwrap().posts, 0);
    }

    #[test]
    fn reregister_overwrites_fields_but_keeps_seen_state() {
        let store = MemoryStore::new(10);
        let first = store.register("agent-1", config("https://a.example/one"));
        assert_eq!(store.mark_post_seen("agent-1", "p1"), Some(true));

        let second = store.register("agent-1", config("https://a.example/two"));
        assert_eq!(store.count(), 1);
        assert_eq!(second.url, "https://a.example/two");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(store.mark_post_seen("agent-1", "p1"), Some(false));
    }

    #[test]
    fn reregister_reactivates_suspended() {
        let store = MemoryStore::new(10);
        store.register("agent-1", config("https://a.example/hook"));
        assert!(store.suspend("agent-1", "key", "HTTP 401"));
        assert!(!store.get("agent-1").unwrap().status.is_active());

        store.register("agent-1", config("https://a.example/hook"));
        assert!(store.get("agent-1").unwrap().status.is_active());
    }

    #[test]
    fn suspend_ignores_replaced_credential() {
        let store = MemoryStore::new(10);
        store.register("agent-1", config("https://a.example/hook"));
        store.register(
            "agent-1",
            SubscriptionConfig {
                api_key: "rotated".into(),
                ..config("https://a.example/hook")
            },
        );

        assert!(!store.suspend("agent-1", "key", "HTTP 401"));
        assert!(store.get("agent-1").unwrap().status.is_active());

        assert!(store.suspend("agent-1", "rotated", "HTTP 401"));
        assert!(!store.get("agent-1").unwrap().status.is_active());
        assert!(!store.suspend("missing", "key", "HTTP 401"));
    }

    #[test]
    fn unregister_drops_seen_state() {
        let store = MemoryStore::new(10);
        store.register("agent-1", config("https://a.example/hook"));
        store.mark_comment_seen("agent-1", "c1");
        assert!(store.unregister("agent-1"));
        assert!(!store.unregister("agent-1"));
        assert_eq!(store.mark_comment_seen("agent-1", "c1"), None);
        assert!(store.seen_summary("agent-1").is_none());
        assert!(!store.record_check("agent-1", Utc::now()));

        store.register("agent-1", config("https://a.example/hook"));
        assert_eq!(store.mark_comment_seen("agent-1", "c1"), Some(true));
    }

    #[test]
    fn seen_sets_respect_capacity() {
        let store = MemoryStore::new(3);
        store.register("agent-1", config("https://a.example/hook"));
        for i in 0..10 {
            store.mark_post_seen("agent-1", &format!("p{i}"));
            store.mark_comment_seen("agent-1", &format!("c{i}"));
        }
        let summary = store.seen_summary("agent-1").unwrap();
        assert_eq!(summary.posts, 3);
        assert_eq!(summary.comments, 3);
    }

    #[test]
    fn list_is_stable() {
        let store = MemoryStore::new(10);
        store.register("b", config("https://b.example/hook"));
        store.register("a", config("https://a.example/hook"));
        let ids: Vec<String> = store.list().into_iter().map(|s| s.agent_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a".to_string()));
        assert!(ids.contains(&"b".to_string()));
    }
}
