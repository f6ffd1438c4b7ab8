//! Webhooks
//!
//! HTTP POST delivery of detected events to agent endpoints with HMAC
//! signing and exponential-backoff retries.

pub mod delivery;
pub mod events;
pub mod signing;
pub mod types;

pub use delivery::{Deliverer, DeliverySettings, RetryPolicy, RetryWorker};
pub use events::EventKind;
pub use types::{DeliveryOutcome, DeliveryState, Event, EventData};
