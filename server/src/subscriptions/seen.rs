//! Seen-State
//!
//! Per-subscription memory of upstream ids that were already processed.
//! Each set is capped; inserting past the cap evicts the oldest id first.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Insertion-ordered set with a hard capacity.
#[derive(Debug, Clone)]
pub struct BoundedSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl BoundedSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Record `id`. Returns `true` when it was not already present.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }

        self.members.insert(id.to_string());
        self.order.push_back(id.to_string());

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }

        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Dedup memory for one agent.
#[derive(Debug, Clone)]
pub struct SeenState {
    pub posts: BoundedSet,
    pub comments: BoundedSet,
    pub last_check: Option<DateTime<Utc>>,
}

impl SeenState {
    pub fn new(capacity: usize) -> Self {
        Self {
            posts: BoundedSet::new(capacity),
            comments: BoundedSet::new(capacity),
            last_check: None,
        }
    }

    pub fn summary(&self) -> SeenSummary {
        SeenSummary {
            posts: self.posts.len(),
            comments: self.comments.len(),
            last_check: self.last_check,
        }
    }
}

/// Diagnostic view of a [`SeenState`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SeenSummary {
    pub posts: usize,
    pub comments: usize,
    pub last_check: Option<DateTime<Utc>>,
}
