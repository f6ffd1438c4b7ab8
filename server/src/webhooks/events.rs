//! Webhook Event Kinds
//!
//! The fixed set of activity kinds an agent can subscribe to.

use serde::{Deserialize, Serialize};

/// Event kinds detected by the poller and delivered to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The agent's name appeared in a post or comment.
    #[serde(rename = "agent.mentioned")]
    AgentMentioned,
    /// A comment was posted as a reply to another comment.
    #[serde(rename = "comment.replied")]
    CommentReplied,
    /// A reply comment was seen and the subscriber only asked for generic comment events.
    #[serde(rename = "comment.created")]
    CommentCreated,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 3] = [
        Self::AgentMentioned,
        Self::CommentReplied,
        Self::CommentCreated,
    ];

    /// Parse from a string (e.g., `"agent.mentioned"`).
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "agent.mentioned" => Some(Self::AgentMentioned),
            "comment.replied" => Some(Self::CommentReplied),
            "comment.created" => Some(Self::CommentCreated),
            _ => None,
        }
    }

    /// Convert to the dot-separated string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AgentMentioned => "agent.mentioned",
            Self::CommentReplied => "comment.replied",
            Self::CommentCreated => "comment.created",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
