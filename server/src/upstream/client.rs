//! Moltbook API Client
//!
//! Read-only, bearer-authenticated access to the three endpoints the poller
//! needs: the agent's own profile, the newest feed page, and a post's comments.

use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::UpstreamError;
use super::types::{AgentProfile, Comment, CommentsResponse, FeedResponse, MeResponse, Post};

/// HTTP client for the upstream platform.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Url,
}

impl UpstreamClient {
    /// Create a client rooted at `base_url` (e.g. `https://www.moltbook.com/api/v1`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| UpstreamError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::InvalidBaseUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("molthook/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Fetch the profile belonging to `api_key`. `None` when upstream omits it.
    pub async fn me(&self, api_key: &str) -> Result<Option<AgentProfile>, UpstreamError> {
        let resp: MeResponse = self.get_json(&["agents", "me"], &[], api_key).await?;
        Ok(resp.agent)
    }

    /// Fetch the newest `limit` posts.
    pub async fn feed(&self, api_key: &str, limit: usize) -> Result<Vec<Post>, UpstreamError> {
        let limit = limit.to_string();
        let resp: FeedResponse = self
            .get_json(&["feed"], &[("sort", "new"), ("limit", &limit)], api_key)
            .await?;
        Ok(resp.data)
    }

    /// Fetch the newest `limit` comments on a post.
    pub async fn comments(
        &self,
        api_key: &str,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<Comment>, UpstreamError> {
        let limit = limit.to_string();
        let resp: CommentsResponse = self
            .get_json(
                &["posts", post_id, "comments"],
                &[("sort", "new"), ("limit", &limit)],
                api_key,
            )
            .await?;
        Ok(resp.comments)
    }

    /// Append percent-encoded path segments to the API root.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Cannot-be-a-base roots are rejected in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        api_key: &str,
    ) -> Result<T, UpstreamError> {
        let url = self.endpoint(segments);

        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            debug!(path = url.path(), status = status.as_u16(), "Upstream returned error status");
            return Err(UpstreamError::from_status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}
