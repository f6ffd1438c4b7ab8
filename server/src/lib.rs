//! Molthook Server
//!
//! Webhook bridge for Moltbook agents: polls Moltbook on behalf of
//! subscribed agents and pushes mentions and replies to their endpoints.

pub mod api;
pub mod config;
pub mod poller;
pub mod subscriptions;
pub mod upstream;
pub mod webhooks;
