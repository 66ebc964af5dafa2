//! Outbound datagram path.
//!
//! Handlers never touch the socket. They hand rendered documents to an
//! [`Outbound`] handle, which queues them on an unbounded channel drained by
//! the gateway's writer task. The handle also remembers the origin of the
//! most recently received datagram; sends without an explicit destination go
//! there, on the assumption that the base station that spoke last is still
//! reachable.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// A rendered document on its way to a base station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingDatagram {
    pub dest: SocketAddr,
    pub payload: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("no destination known yet (nothing received so far)")]
    NoDestination,
    #[error("outbound channel closed")]
    ChannelClosed,
}

#[derive(Clone, Debug)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<OutgoingDatagram>,
    last_origin: Arc<Mutex<Option<SocketAddr>>>,
}

impl Outbound {
    pub fn new(tx: mpsc::UnboundedSender<OutgoingDatagram>) -> Self {
        Self {
            tx,
            last_origin: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle plus the receiving end the writer task (or a test) drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutgoingDatagram>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Record the origin of a received datagram.
    pub fn note_origin(&self, origin: SocketAddr) {
        *self.last_origin.lock() = Some(origin);
    }

    pub fn last_origin(&self) -> Option<SocketAddr> {
        *self.last_origin.lock()
    }

    /// Queue `payload` for `dest`, falling back to the last seen origin.
    ///
    /// Returns the address the datagram was queued for.
    pub fn send(&self, dest: Option<SocketAddr>, payload: String) -> Result<SocketAddr, SendError> {
        let dest = dest
            .or_else(|| self.last_origin())
            .ok_or(SendError::NoDestination)?;
        self.tx
            .send(OutgoingDatagram { dest, payload })
            .map_err(|_| SendError::ChannelClosed)?;
        Ok(dest)
    }
}
