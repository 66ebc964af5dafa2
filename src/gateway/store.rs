//! Store-and-forward message queue.
//!
//! A `request/job` frame from a handset is a text message for another
//! handset. The store keeps it as a [`QueuedMessage`], immediately confirms
//! reception to the sender, and then keeps re-sending it to the recipient
//! (at most once per retry interval) until the recipient's base station
//! reports delivery through a `response/job` status frame, or until it is
//! older than the maximum age and silently dropped.
//!
//! Each queued message gets its own 10-digit correlation id, used as
//! `externalid` on every forwarded copy; status frames reference that id.
//!
//! Delivery status codes reported by base stations:
//!
//! | code | meaning       | leaves the queue |
//! |------|---------------|------------------|
//! | 1    | delivered     | yes              |
//! | 11   | user absent   | no               |
//!
//! Anything else is logged and the message stays queued.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;

use super::dispatch::{required, required_number, FrameHandler, HandlerError};
use super::outbound::Outbound;
use super::presence::PresenceTracker;
use crate::config::QueueConfig;
use crate::logutil::escape_log;
use crate::metrics;
use crate::protocol::template::{JobFields, Party, Templates};
use crate::protocol::Frame;

/// Largest correlation id; ids are rendered as 10 zero-padded digits.
const MAX_INTERNAL_ID: u64 = 9_999_999_999;

/// A message waiting for a delivery confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// `externalid` of the frame that carried the message to us.
    pub ext_id: String,
    /// Correlation id used on every forwarded copy.
    pub internal_id: u64,
    pub message: String,
    pub sender: Party,
    pub recipient: String,
    /// `systemdata/datetime` and `systemdata/timestamp` of the original
    /// frame, echoed back verbatim.
    pub datetime: String,
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
    /// `None` until the first forwarding attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedMessage {
    /// Build from a `request/job` frame.
    pub fn from_frame(frame: &Frame, internal_id: u64, now: DateTime<Utc>) -> Result<Self, HandlerError> {
        Ok(Self {
            ext_id: required(frame, "externalid")?.to_string(),
            internal_id,
            message: required(frame, "jobdata/messages/messageuui")?.to_string(),
            sender: Party {
                name: required(frame, "senderdata/name")?.to_string(),
                address: required(frame, "senderdata/address")?.to_string(),
                location: required(frame, "senderdata/location")?.to_string(),
            },
            recipient: required(frame, "persondata/address")?.to_string(),
            datetime: required(frame, "systemdata/datetime")?.to_string(),
            timestamp: required(frame, "systemdata/timestamp")?.to_string(),
            created_at: now,
            last_attempt_at: None,
        })
    }

    /// Correlation id as it appears on the wire.
    pub fn correlation_id(&self) -> String {
        format!("{:010}", self.internal_id)
    }

    fn fields<'a>(&'a self, correlation_id: &'a str) -> JobFields<'a> {
        JobFields {
            correlation_id,
            sender: &self.sender,
            recipient: &self.recipient,
            datetime: &self.datetime,
            timestamp: &self.timestamp,
            message: &self.message,
        }
    }

    /// Reception confirmation for the sender, echoing the original `externalid`.
    pub fn render_ack(&self, templates: &Templates) -> String {
        templates.job_response(&self.fields(&self.ext_id))
    }

    /// Forwarded copy for the recipient, carrying our correlation id.
    pub fn render_forward(&self, templates: &Templates) -> String {
        let id = self.correlation_id();
        templates.job_request(&self.fields(&id))
    }

    /// Never attempted, or the last attempt is older than `interval`.
    pub fn is_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_attempt_at {
            None => true,
            Some(at) => now - at > interval,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.created_at > max_age
    }
}

/// Meaning of a delivery status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryStatus {
    pub description: &'static str,
    pub remove: bool,
}

pub fn delivery_status(code: i64) -> Option<DeliveryStatus> {
    match code {
        1 => Some(DeliveryStatus {
            description: "delivered",
            remove: true,
        }),
        11 => Some(DeliveryStatus {
            description: "user absent",
            remove: false,
        }),
        _ => None,
    }
}

/// Result of applying a `response/job` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// No status payload; accepted without effect.
    NoStatus,
    /// Known status that keeps the message queued.
    Kept { internal_id: u64, status: DeliveryStatus },
    /// Unknown status code; message kept.
    UnknownStatus { internal_id: u64, code: i64 },
    /// Message confirmed and dropped from the queue.
    Removed(QueuedMessage),
    /// Confirmation for an id that is not (or no longer) queued.
    NotFound { internal_id: u64 },
}

/// What one scheduler tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub retried: Vec<u64>,
    pub failed: Vec<u64>,
    pub expired: Vec<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retry_interval: Duration,
    pub max_age: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

impl From<&QueueConfig> for RetryPolicy {
    fn from(cfg: &QueueConfig) -> Self {
        Self {
            retry_interval: cfg.retry_interval(),
            max_age: cfg.max_age(),
        }
    }
}

/// Shared handle to the queue. Clones see the same messages.
#[derive(Clone)]
pub struct MessageStore {
    queue: Arc<Mutex<Vec<QueuedMessage>>>,
    presence: PresenceTracker,
    outbound: Outbound,
    templates: Arc<Templates>,
    policy: RetryPolicy,
}

impl MessageStore {
    pub fn new(
        presence: PresenceTracker,
        outbound: Outbound,
        templates: Templates,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            queue: Arc::new(Mutex::new(Vec::new())),
            presence,
            outbound,
            templates: Arc::new(templates),
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the queue in arrival order.
    pub fn messages(&self) -> Vec<QueuedMessage> {
        self.queue.lock().clone()
    }

    pub fn get(&self, internal_id: u64) -> Option<QueuedMessage> {
        self.queue
            .lock()
            .iter()
            .find(|m| m.internal_id == internal_id)
            .cloned()
    }

    /// Queue the message carried by a `request/job` frame and confirm it to
    /// the sender at `origin`. Returns the assigned correlation id.
    pub fn accept_job(&self, frame: &Frame, origin: SocketAddr, now: DateTime<Utc>) -> Result<u64, HandlerError> {
        debug!("Found incoming message. Trying to parse and add it to queue");
        let message = {
            let mut queue = self.queue.lock();
            let internal_id = next_internal_id(&queue);
            let message = QueuedMessage::from_frame(frame, internal_id, now)?;
            queue.push(message.clone());
            message
        };
        metrics::inc_messages_queued();
        info!(
            "Added message with external ID {} and internal ID {} from {},{},{} to {}: '{}'",
            message.ext_id,
            message.correlation_id(),
            escape_log(&message.sender.name),
            message.sender.address,
            escape_log(&message.sender.location),
            message.recipient,
            escape_log(&message.message)
        );

        match self.outbound.send(Some(origin), message.render_ack(&self.templates)) {
            Ok(_) => {
                metrics::inc_acks_sent();
                debug!("Confirmation for sender sent to {}", origin);
            }
            Err(e) => {
                metrics::inc_send_failures();
                warn!("Could not confirm message {} to {}: {}", message.ext_id, origin, e);
            }
        }
        Ok(message.internal_id)
    }

    /// Apply a `response/job` frame to the queue.
    pub fn reconcile(&self, frame: &Frame) -> Result<Reconciliation, HandlerError> {
        let has_status = frame
            .text("jobdata/status")
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !has_status {
            debug!("Job response without status payload; ignoring");
            return Ok(Reconciliation::NoStatus);
        }
        let internal_id: u64 = required_number(frame, "externalid")?;
        let code: i64 = required_number(frame, "jobdata/status")?;
        debug!("Status update for {:010}", internal_id);

        let Some(status) = delivery_status(code) else {
            warn!(
                "Got unknown status code {} for {:010}. Keeping message in queue",
                code, internal_id
            );
            return Ok(Reconciliation::UnknownStatus { internal_id, code });
        };
        info!(
            "Status update for {:010}: {} => '{}'. Remove from queue? {}",
            internal_id, code, status.description, status.remove
        );
        if !status.remove {
            return Ok(Reconciliation::Kept { internal_id, status });
        }

        let removed = {
            let mut queue = self.queue.lock();
            let pos = queue.iter().position(|m| m.internal_id == internal_id);
            pos.map(|pos| queue.remove(pos))
        };
        match removed {
            Some(message) => {
                let waited = (Utc::now() - message.created_at).num_seconds().max(0) as u64;
                metrics::observe_delivery(waited);
                debug!("Removed {:010} from queue", internal_id);
                Ok(Reconciliation::Removed(message))
            }
            None => {
                warn!("Got reception confirmation for unknown message: {:010}", internal_id);
                Ok(Reconciliation::NotFound { internal_id })
            }
        }
    }

    /// Forward every message that is due. Returns (sent, failed) ids.
    ///
    /// Due messages are rendered from a snapshot taken under the lock; the
    /// queue is only touched again to stamp successful attempts, so messages
    /// confirmed or expired in the meantime are simply skipped.
    pub fn retry_pass(&self, now: DateTime<Utc>) -> (Vec<u64>, Vec<u64>) {
        let due: Vec<(u64, String, String)> = self
            .queue
            .lock()
            .iter()
            .filter(|m| m.is_due(now, self.policy.retry_interval))
            .map(|m| (m.internal_id, m.recipient.clone(), m.render_forward(&self.templates)))
            .collect();

        let mut sent = Vec::new();
        let mut failed = Vec::new();
        for (internal_id, recipient, payload) in due {
            let dest = self.presence.lookup(&recipient);
            match self.outbound.send(dest, payload) {
                Ok(addr) => {
                    metrics::inc_retries_sent();
                    debug!("Sending message {:010} for {} to {}", internal_id, recipient, addr);
                    sent.push(internal_id);
                }
                Err(e) => {
                    metrics::inc_send_failures();
                    warn!("Sending message {:010} for {} failed: {}", internal_id, recipient, e);
                    failed.push(internal_id);
                }
            }
        }

        if !sent.is_empty() {
            let mut queue = self.queue.lock();
            for message in queue.iter_mut().filter(|m| sent.contains(&m.internal_id)) {
                message.last_attempt_at = Some(now);
            }
        }
        (sent, failed)
    }

    /// Drop every message older than the maximum age.
    pub fn expiry_pass(&self, now: DateTime<Utc>) -> Vec<QueuedMessage> {
        let mut expired = Vec::new();
        self.queue.lock().retain(|m| {
            if m.is_expired(now, self.policy.max_age) {
                expired.push(m.clone());
                false
            } else {
                true
            }
        });
        for message in &expired {
            metrics::inc_messages_expired();
            info!(
                "Removing undelivered message from queue: {} (from {} to {}, queued {})",
                message.correlation_id(),
                message.sender.address,
                message.recipient,
                message.created_at.format("%Y-%m-%dT%H:%M:%SZ")
            );
        }
        expired
    }

    /// One scheduler tick: retry pass, then expiry pass.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let (retried, failed) = self.retry_pass(now);
        let expired = self.expiry_pass(now).into_iter().map(|m| m.internal_id).collect();
        TickReport {
            retried,
            failed,
            expired,
        }
    }
}

/// Random 10-digit id not used by any queued message.
fn next_internal_id(queue: &[QueuedMessage]) -> u64 {
    let mut rng = rand::thread_rng();
    loop {
        let candidate = rng.gen_range(0..=MAX_INTERNAL_ID);
        if !queue.iter().any(|m| m.internal_id == candidate) {
            return candidate;
        }
    }
}

impl FrameHandler for MessageStore {
    fn name(&self) -> &'static str {
        "message-store"
    }

    fn handle(&mut self, frame: &Frame, origin: SocketAddr) -> Result<bool, HandlerError> {
        if frame.is("request", "job") {
            self.accept_job(frame, origin, Utc::now())?;
            return Ok(true);
        }
        if frame.is("response", "job") {
            self.reconcile(frame)?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(internal_id: u64) -> QueuedMessage {
        QueuedMessage {
            ext_id: "1234".into(),
            internal_id,
            message: "hi".into(),
            sender: Party {
                name: "no42".into(),
                address: "42".into(),
                location: "M700".into(),
            },
            recipient: "23".into(),
            datetime: "2019-12-29 22:05:44".into(),
            timestamp: "5e091528".into(),
            created_at: Utc::now(),
            last_attempt_at: None,
        }
    }

    #[test]
    fn status_table() {
        assert_eq!(delivery_status(1).map(|s| s.remove), Some(true));
        assert_eq!(delivery_status(11).map(|s| s.remove), Some(false));
        assert_eq!(delivery_status(11).unwrap().description, "user absent");
        assert!(delivery_status(999).is_none());
    }

    #[test]
    fn correlation_id_is_zero_padded() {
        assert_eq!(sample(42).correlation_id(), "0000000042");
        assert_eq!(sample(MAX_INTERNAL_ID).correlation_id(), "9999999999");
    }

    #[test]
    fn due_and_expiry_windows() {
        let interval = Duration::seconds(60);
        let now = Utc::now();
        let mut m = sample(1);
        assert!(m.is_due(now, interval));
        m.last_attempt_at = Some(now - Duration::seconds(60));
        assert!(!m.is_due(now, interval));
        m.last_attempt_at = Some(now - Duration::seconds(61));
        assert!(m.is_due(now, interval));

        m.created_at = now - Duration::days(7);
        assert!(!m.is_expired(now, Duration::days(7)));
        m.created_at = now - Duration::days(7) - Duration::seconds(1);
        assert!(m.is_expired(now, Duration::days(7)));
    }

    #[test]
    fn generated_ids_avoid_queued_ones() {
        let queue: Vec<QueuedMessage> = (0..50).map(sample).collect();
        for _ in 0..100 {
            let id = next_internal_id(&queue);
            assert!(!queue.iter().any(|m| m.internal_id == id));
            assert!(id <= MAX_INTERNAL_ID);
        }
    }
}
