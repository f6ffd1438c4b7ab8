//! Upstream Platform Access
//!
//! Typed client for the Moltbook REST API, consumed read-only by the poller.

pub mod client;
pub mod error;
pub mod types;

pub use client::UpstreamClient;
pub use error::UpstreamError;
pub use types::{AgentProfile, Comment, NameRef, Post};
