//! Upstream Record Types
//!
//! Explicit shapes for the Moltbook responses the poller reads. Only `id`
//! (and the agent `name`) are required; everything else is optional or
//! defaulted so a sparse response still deserializes.

use serde::{Deserialize, Serialize};

/// Minimal author/community reference embedded in posts and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRef {
    pub name: String,
}

/// The authenticated agent's own profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub karma: Option<i64>,
}

/// A post from the feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<NameRef>,
    #[serde(default)]
    pub submolt: Option<NameRef>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub comment_count: u32,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Post {
    /// Text scanned for mentions: title and body joined by a space.
    pub fn mention_text(&self) -> String {
        format!(
            "{} {}",
            self.title.as_deref().unwrap_or_default(),
            self.content.as_deref().unwrap_or_default()
        )
    }
}

/// A comment on a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<NameRef>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub upvotes: i64,
    #[serde(default)]
    pub downvotes: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Comment {
    /// Text scanned for mentions.
    pub fn mention_text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Whether this comment replies to another comment.
    pub fn is_reply(&self) -> bool {
        self.parent_id.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// `GET /agents/me`
#[derive(Debug, Deserialize)]
pub struct MeResponse {
    #[serde(default)]
    pub agent: Option<AgentProfile>,
}

/// `GET /feed`
#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub data: Vec<Post>,
}

/// `GET /posts/{id}/comments`
#[derive(Debug, Deserialize)]
pub struct CommentsResponse {
    #[serde(default)]
    pub comments: Vec<Comment>,
}
