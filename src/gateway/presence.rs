//! Presence / roaming tracker.
//!
//! Keeps, per handset extension, the base station (network origin) that last
//! reported it and when. Two frame kinds feed it:
//!
//! - `request/systeminfo` lists every handset a base station currently
//!   serves. Entries are added or refreshed, never removed.
//! - `request/login` reports a single handset logging in (`status` 1) or out
//!   (`status` 0) at the sending base station.
//!
//! The tracker only observes: it always returns "not handled" so the squelch
//! handler further down the chain still claims these frames.
//!
//! Handles are cheap clones sharing one table. The message store holds one to
//! route retries to the base station currently serving the recipient.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use super::dispatch::{required, FrameHandler, HandlerError};
use crate::protocol::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceRecord {
    pub origin: SocketAddr,
    pub last_seen: DateTime<Utc>,
}

/// What an upsert did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Added,
    Moved { from: SocketAddr },
    Refreshed,
}

#[derive(Clone, Default, Debug)]
pub struct PresenceTracker {
    table: Arc<Mutex<HashMap<String, PresenceRecord>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `extension` is served from `origin` as of `now`.
    ///
    /// `last_seen` never moves backwards for a present handset.
    pub fn upsert(&self, extension: &str, origin: SocketAddr, now: DateTime<Utc>) -> PresenceChange {
        let mut table = self.table.lock();
        match table.get_mut(extension) {
            Some(record) => {
                record.last_seen = record.last_seen.max(now);
                if record.origin != origin {
                    let from = record.origin;
                    record.origin = origin;
                    PresenceChange::Moved { from }
                } else {
                    PresenceChange::Refreshed
                }
            }
            None => {
                table.insert(
                    extension.to_string(),
                    PresenceRecord {
                        origin,
                        last_seen: now,
                    },
                );
                PresenceChange::Added
            }
        }
    }

    /// Forget `extension`. Returns the removed record, if any.
    pub fn remove(&self, extension: &str) -> Option<PresenceRecord> {
        self.table.lock().remove(extension)
    }

    /// Last known origin serving `extension`.
    pub fn lookup(&self, extension: &str) -> Option<SocketAddr> {
        self.table.lock().get(extension).map(|r| r.origin)
    }

    pub fn get(&self, extension: &str) -> Option<PresenceRecord> {
        self.table.lock().get(extension).copied()
    }

    /// All records, sorted by extension.
    pub fn snapshot(&self) -> Vec<(String, PresenceRecord)> {
        let mut all: Vec<_> = self
            .table
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a `request/systeminfo` frame.
    pub fn apply_systeminfo(&self, frame: &Frame, origin: SocketAddr, now: DateTime<Utc>) {
        debug!("Systeminfo update received from {}", origin);
        let Some(senderdata) = frame.find("senderdata") else {
            debug!("Systeminfo from {} lists no handsets", origin);
            return;
        };
        for address in senderdata.children_named("address") {
            let extension = address.text().trim();
            if extension.is_empty() {
                continue;
            }
            match self.upsert(extension, origin, now) {
                PresenceChange::Added => info!("Added {} on {}", extension, origin),
                PresenceChange::Moved { from } => {
                    info!("Updated {} from {} to {}", extension, from, origin)
                }
                PresenceChange::Refreshed => debug!("Already known: {} on {}", extension, origin),
            }
        }
    }

    /// Apply a `request/login` frame.
    pub fn apply_login(
        &self,
        frame: &Frame,
        origin: SocketAddr,
        now: DateTime<Utc>,
    ) -> Result<(), HandlerError> {
        let status = required(frame, "logindata/status")?.trim();
        let extension = required(frame, "senderdata/address")?.trim();
        if extension.is_empty() {
            warn!("Ignoring login frame from {} without a handset address", origin);
            return Ok(());
        }
        match status {
            "1" => match self.upsert(extension, origin, now) {
                PresenceChange::Added => {
                    info!("{} logged in on {} (and wasn't known until now)", extension, origin)
                }
                PresenceChange::Moved { from } => {
                    info!("{} logged in on {} (previously on {})", extension, origin, from)
                }
                PresenceChange::Refreshed => {
                    info!("{} logged in on {} and was already known", extension, origin)
                }
            },
            "0" => match self.remove(extension) {
                Some(_) => info!("{} logged out", extension),
                None => info!("{} logged out but wasn't known", extension),
            },
            other => warn!(
                "Ignoring login frame for {} from {} with unknown status {:?}",
                extension, origin, other
            ),
        }
        Ok(())
    }
}

impl FrameHandler for PresenceTracker {
    fn name(&self) -> &'static str {
        "presence"
    }

    fn handle(&mut self, frame: &Frame, origin: SocketAddr) -> Result<bool, HandlerError> {
        if frame.is("request", "systeminfo") {
            self.apply_systeminfo(frame, origin, Utc::now());
        } else if frame.is("request", "login") {
            self.apply_login(frame, origin, Utc::now())?;
        }
        Ok(false)
    }
}
