//! Moltbook Poller
//!
//! One poll per cycle on behalf of every subscribed agent: detect new
//! mentions and replies, then hand them to webhook delivery.

pub mod engine;
pub mod mention;
pub mod scheduler;

pub use engine::{AgentPoll, PollSettings, Poller};
pub use scheduler::{CycleReport, CycleScheduler};
