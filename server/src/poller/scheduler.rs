//! Cycle Scheduler
//!
//! Drives poll cycles on a fixed interval and routes detected events to the
//! deliverer. Cycles never overlap: a cycle requested while another is still
//! running is skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine::Poller;
use crate::subscriptions::SubscriptionStore;
use crate::webhooks::{Deliverer, DeliveryState, Event};

/// Summary of one completed cycle.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub subscriptions: usize,
    pub events: usize,
    pub delivered: usize,
    pub retrying: usize,
    pub abandoned: usize,
    /// Events whose agent unsubscribed before dispatch.
    pub dropped: usize,
    pub duration_ms: u64,
}

pub struct CycleScheduler {
    poller: Arc<Poller>,
    deliverer: Deliverer,
    store: Arc<dyn SubscriptionStore>,
    interval: Duration,
    cycle_lock: Mutex<()>,
    cycles: AtomicU64,
}

impl CycleScheduler {
    pub fn new(
        poller: Arc<Poller>,
        deliverer: Deliverer,
        store: Arc<dyn SubscriptionStore>,
        interval: Duration,
    ) -> Self {
        Self {
            poller,
            deliverer,
            store,
            interval,
            cycle_lock: Mutex::new(()),
            cycles: AtomicU64::new(0),
        }
    }

    /// Tick until `shutdown` is cancelled. The first cycle runs immediately.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs_f64(), "Poll scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        _ = self.run_cycle() => {}
                    }
                }
            }
        }

        info!("Poll scheduler stopped");
    }

    /// Run one cycle: poll, then deliver. `None` if a cycle was already running.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("Previous poll cycle still running, skipping");
            return None;
        };

        let started = Instant::now();
        let mut report = CycleReport {
            cycle: self.cycles.fetch_add(1, Ordering::Relaxed) + 1,
            subscriptions: self.store.count(),
            ..CycleReport::default()
        };

        debug!(cycle = report.cycle, subscriptions = report.subscriptions, "Polling Moltbook");

        let events = self.poller.poll_all().await;
        report.events = events.len();

        let mut batches = JoinSet::new();
        for (agent_id, batch) in group_by_agent(events) {
            let Some(subscription) = self.store.get(&agent_id) else {
                debug!(agent_id = %agent_id, events = batch.len(), "Agent unsubscribed before dispatch");
                report.dropped += batch.len();
                continue;
            };

            let deliverer = self.deliverer.clone();
            batches.spawn(async move { deliverer.deliver_batch(&subscription, &batch).await });
        }

        while let Some(joined) = batches.join_next().await {
            match joined {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome.state {
                            DeliveryState::Delivered => report.delivered += 1,
                            DeliveryState::ScheduledRetry | DeliveryState::Pending => {
                                report.retrying += 1;
                            }
                            DeliveryState::Abandoned => report.abandoned += 1,
                        }
                    }
                }
                Err(e) => error!("Delivery batch task panicked: {}", e),
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            cycle = report.cycle,
            subscriptions = report.subscriptions,
            events = report.events,
            delivered = report.delivered,
            retrying = report.retrying,
            abandoned = report.abandoned,
            dropped = report.dropped,
            duration_ms = report.duration_ms,
            "Poll cycle complete"
        );

        Some(report)
    }
}

/// Group events by agent, keeping first-appearance order of agents and
/// original order within each agent.
fn group_by_agent(events: Vec<Event>) -> Vec<(String, Vec<Event>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Event>)> = Vec::new();

    for event in events {
        if let Some(&i) = index.get(&event.agent_id) {
            groups[i].1.push(event);
        } else {
            index.insert(event.agent_id.clone(), groups.len());
            groups.push((event.agent_id.clone(), vec![event]));
        }
    }

    groups
}
