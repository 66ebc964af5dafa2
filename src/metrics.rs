//! Process-wide gateway counters.
//!
//! Plain relaxed atomics; read together through [`snapshot`], which the retry
//! scheduler logs periodically and the gateway logs once at shutdown.
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

static DATAGRAMS_RECEIVED: AtomicU64 = AtomicU64::new(0);
static FRAMES_DECODED: AtomicU64 = AtomicU64::new(0);
static FRAMES_REJECTED: AtomicU64 = AtomicU64::new(0);
static FRAMES_UNHANDLED: AtomicU64 = AtomicU64::new(0);
static HANDLER_FAULTS: AtomicU64 = AtomicU64::new(0);
static MESSAGES_QUEUED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_DELIVERED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_EXPIRED: AtomicU64 = AtomicU64::new(0);
static ACKS_SENT: AtomicU64 = AtomicU64::new(0);
static RETRIES_SENT: AtomicU64 = AtomicU64::new(0);
static SEND_FAILURES: AtomicU64 = AtomicU64::new(0);
static DELIVERY_LATENCY_SUM_SECS: AtomicU64 = AtomicU64::new(0);
static DELIVERY_LATENCY_COUNT: AtomicU64 = AtomicU64::new(0);

pub fn inc_datagrams_received() {
    DATAGRAMS_RECEIVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_frames_decoded() {
    FRAMES_DECODED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_frames_rejected() {
    FRAMES_REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_frames_unhandled() {
    FRAMES_UNHANDLED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_handler_faults() {
    HANDLER_FAULTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_messages_queued() {
    MESSAGES_QUEUED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_messages_expired() {
    MESSAGES_EXPIRED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_acks_sent() {
    ACKS_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_retries_sent() {
    RETRIES_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_send_failures() {
    SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
}

/// Count a confirmed delivery and how long the message waited for it.
pub fn observe_delivery(waited_secs: u64) {
    MESSAGES_DELIVERED.fetch_add(1, Ordering::Relaxed);
    DELIVERY_LATENCY_SUM_SECS.fetch_add(waited_secs, Ordering::Relaxed);
    DELIVERY_LATENCY_COUNT.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Snapshot {
    pub datagrams_received: u64,
    pub frames_decoded: u64,
    pub frames_rejected: u64,
    pub frames_unhandled: u64,
    pub handler_faults: u64,
    pub messages_queued: u64,
    pub messages_delivered: u64,
    pub messages_expired: u64,
    pub acks_sent: u64,
    pub retries_sent: u64,
    pub send_failures: u64,
    pub delivery_latency_avg_secs: Option<u64>,
}

pub fn snapshot() -> Snapshot {
    let sum = DELIVERY_LATENCY_SUM_SECS.load(Ordering::Relaxed);
    let count = DELIVERY_LATENCY_COUNT.load(Ordering::Relaxed);
    Snapshot {
        datagrams_received: DATAGRAMS_RECEIVED.load(Ordering::Relaxed),
        frames_decoded: FRAMES_DECODED.load(Ordering::Relaxed),
        frames_rejected: FRAMES_REJECTED.load(Ordering::Relaxed),
        frames_unhandled: FRAMES_UNHANDLED.load(Ordering::Relaxed),
        handler_faults: HANDLER_FAULTS.load(Ordering::Relaxed),
        messages_queued: MESSAGES_QUEUED.load(Ordering::Relaxed),
        messages_delivered: MESSAGES_DELIVERED.load(Ordering::Relaxed),
        messages_expired: MESSAGES_EXPIRED.load(Ordering::Relaxed),
        acks_sent: ACKS_SENT.load(Ordering::Relaxed),
        retries_sent: RETRIES_SENT.load(Ordering::Relaxed),
        send_failures: SEND_FAILURES.load(Ordering::Relaxed),
        delivery_latency_avg_secs: if count > 0 { Some(sum / count) } else { None },
    }
}

impl Snapshot {
    /// Compact single-line JSON for log records.
    pub fn to_log_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are global and other tests bump them concurrently, so only
    // lower bounds are checked.
    #[test]
    fn delivery_observation_updates_counters() {
        let before = snapshot();
        observe_delivery(10);
        observe_delivery(30);
        let after = snapshot();
        assert!(after.messages_delivered >= before.messages_delivered + 2);
        assert!(after.delivery_latency_avg_secs.is_some());
    }

    #[test]
    fn snapshot_serializes_to_json() {
        inc_datagrams_received();
        let line = snapshot().to_log_line();
        assert!(line.starts_with('{'));
        assert!(line.contains("\"datagrams_received\":"));
    }
}
