//! Server Configuration
//!
//! Loads configuration from environment variables.

use anyhow::{ensure, Context, Result};
use std::env;
use std::str::FromStr;

/// Default upstream API root.
pub const DEFAULT_UPSTREAM_URL: &str = "https://www.moltbook.com/api/v1";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:3000")
    pub bind_address: String,

    /// Moltbook API root, without trailing slash
    pub upstream_base_url: String,

    /// Seconds between poll cycles (default: 30)
    pub poll_interval_secs: u64,

    /// Subscriptions polled in parallel within a cycle (default: 4)
    pub poll_concurrency: usize,

    /// Posts fetched from the feed per cycle (default: 50)
    pub feed_page_size: usize,

    /// Comments fetched per post (default: 20)
    pub comment_page_size: usize,

    /// Cap on each per-agent seen set (default: 1000)
    pub seen_capacity: usize,

    /// Upstream request timeout in seconds (default: 10)
    pub upstream_timeout_secs: u64,

    /// Webhook request timeout in seconds (default: 5)
    pub delivery_timeout_secs: u64,

    /// Retries after the first delivery attempt (default: 3)
    pub delivery_max_retries: u32,

    /// Backoff unit in milliseconds; retry n waits base * 2^n (default: 1000)
    pub delivery_backoff_base_ms: u64,

    /// Pause between deliveries to the same endpoint in milliseconds (default: 100)
    pub delivery_batch_pause_ms: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let bind_address = match (env::var("BIND_ADDRESS"), env::var("PORT")) {
            (Ok(addr), _) => addr,
            (Err(_), Ok(port)) => {
                let port: u16 = port.parse().context("PORT must be a valid port number")?;
                format!("0.0.0.0:{port}")
            }
            _ => "0.0.0.0:3000".into(),
        };

        let config = Self {
            bind_address,
            upstream_base_url: env::var("MOLTBOOK_API_URL")
                .unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.into())
                .trim_end_matches('/')
                .to_string(),
            poll_interval_secs: parse_var("POLL_INTERVAL_SECS", 30)?,
            poll_concurrency: parse_var("POLL_CONCURRENCY", 4)?,
            feed_page_size: parse_var("FEED_PAGE_SIZE", 50)?,
            comment_page_size: parse_var("COMMENT_PAGE_SIZE", 20)?,
            seen_capacity: parse_var("SEEN_CAPACITY", 1000)?,
            upstream_timeout_secs: parse_var("UPSTREAM_TIMEOUT_SECS", 10)?,
            delivery_timeout_secs: parse_var("DELIVERY_TIMEOUT_SECS", 5)?,
            delivery_max_retries: parse_var("DELIVERY_MAX_RETRIES", 3)?,
            delivery_backoff_base_ms: parse_var("DELIVERY_BACKOFF_BASE_MS", 1000)?,
            delivery_batch_pause_ms: parse_var("DELIVERY_BATCH_PAUSE_MS", 100)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or disable the poller.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.poll_interval_secs > 0, "POLL_INTERVAL_SECS must be > 0");
        ensure!(self.poll_concurrency > 0, "POLL_CONCURRENCY must be > 0");
        ensure!(self.feed_page_size > 0, "FEED_PAGE_SIZE must be > 0");
        ensure!(self.comment_page_size > 0, "COMMENT_PAGE_SIZE must be > 0");
        ensure!(self.seen_capacity > 0, "SEEN_CAPACITY must be > 0");
        ensure!(self.upstream_timeout_secs > 0, "UPSTREAM_TIMEOUT_SECS must be > 0");
        ensure!(self.delivery_timeout_secs > 0, "DELIVERY_TIMEOUT_SECS must be > 0");
        Ok(())
    }

    /// Create a default configuration for testing.
    ///
    /// Short timings so retry chains finish in well under a second.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            upstream_base_url: "http://127.0.0.1:9".into(),
            poll_interval_secs: 30,
            poll_concurrency: 4,
            feed_page_size: 50,
            comment_page_size: 20,
            seen_capacity: 1000,
            upstream_timeout_secs: 2,
            delivery_timeout_secs: 2,
            delivery_max_retries: 3,
            delivery_backoff_base_ms: 10,
            delivery_batch_pause_ms: 0,
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .with_context(|| format!("{name} has an invalid value: {val:?}")),
        Err(_) => Ok(default),
    }
}
