//! Retry scheduler task.
//!
//! A background tokio task that ticks the [`MessageStore`] on a fixed
//! interval: forward every due message, then drop every expired one. The
//! task is reached through a [`SchedulerHandle`] so the gateway can ask for
//! stats or stop it between ticks. Periodic stats include the presence
//! table (count at info, one line per handset at debug).
//!
//! The tick itself never waits on the network. Forwarded copies are queued
//! for the writer task, so a slow or failing send cannot stall the loop.

use chrono::Utc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use super::presence::PresenceTracker;
use super::store::MessageStore;
use crate::config::QueueConfig;
use crate::metrics;

pub enum SchedulerCommand {
    Snapshot(oneshot::Sender<SchedulerStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub queued: usize,
    pub handsets: usize,
    pub ticks: u64,
    pub retries_sent: u64,
    pub retry_failures: u64,
    pub expired: u64,
}

#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Stop the task after the current tick. Returns once it has exited.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SchedulerCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn snapshot(&self) -> Option<SchedulerStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(SchedulerCommand::Snapshot(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }
}

pub fn start_retry_scheduler(
    store: MessageStore,
    presence: PresenceTracker,
    cfg: &QueueConfig,
) -> SchedulerHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<SchedulerCommand>();
    let handle = SchedulerHandle { tx };
    let tick = cfg.tick();
    let stats_interval = cfg.stats_interval();

    tokio::spawn(async move {
        let mut stats = SchedulerStats::default();
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_stats_log = Instant::now();
        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::Snapshot(resp)) => {
                            let _ = resp.send(SchedulerStats {
                                queued: store.len(),
                                handsets: presence.len(),
                                ..stats.clone()
                            });
                        }
                        Some(SchedulerCommand::Shutdown(done)) => {
                            let _ = done.send(());
                            break;
                        }
                        // All handles dropped.
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    let report = store.tick(Utc::now());
                    stats.ticks += 1;
                    stats.retries_sent += report.retried.len() as u64;
                    stats.retry_failures += report.failed.len() as u64;
                    stats.expired += report.expired.len() as u64;

                    if !stats_interval.is_zero() && last_stats_log.elapsed() >= stats_interval {
                        let handsets = presence.snapshot();
                        log::info!(
                            "queue stats: queued={} handsets={} retries_sent={} retry_failures={} expired={} metrics={}",
                            store.len(),
                            handsets.len(),
                            stats.retries_sent,
                            stats.retry_failures,
                            stats.expired,
                            metrics::snapshot().to_log_line()
                        );
                        for (extension, record) in &handsets {
                            log::debug!(
                                "handset {} on {} (last seen {})",
                                extension,
                                record.origin,
                                record.last_seen.format("%Y-%m-%dT%H:%M:%SZ")
                            );
                        }
                        last_stats_log = Instant::now();
                    }
                }
            }
        }
        log::debug!("retry scheduler loop terminated");
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::outbound::Outbound;
    use crate::gateway::store::RetryPolicy;
    use crate::protocol::template::Templates;

    #[tokio::test]
    async fn snapshot_reports_queue_and_presence() {
        let (outbound, _rx) = Outbound::channel();
        let presence = PresenceTracker::new();
        let store = MessageStore::new(
            presence.clone(),
            outbound,
            Templates::new("server", "19.11.12.1403"),
            RetryPolicy::default(),
        );
        presence.upsert("23", "10.0.0.1:1300".parse().unwrap(), Utc::now());
        presence.upsert("42", "10.0.0.2:1300".parse().unwrap(), Utc::now());

        let cfg = QueueConfig {
            tick_ms: 10,
            ..QueueConfig::default()
        };
        let handle = start_retry_scheduler(store, presence, &cfg);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let stats = handle.snapshot().await.expect("scheduler running");
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.handsets, 2);
        assert!(stats.ticks >= 1);

        handle.shutdown().await;
        assert!(handle.snapshot().await.is_none());
    }
}
