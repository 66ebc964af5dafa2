//! Frame dispatch chain.
//!
//! Every decoded frame is offered to the registered handlers in registration
//! order. The first handler returning `Ok(true)` owns the frame and the chain
//! stops. A handler returning `Err` is treated like `Ok(false)`: the fault is
//! logged and counted and the next handler gets its turn. Frames nobody
//! claims are logged (with a dump of the document) and dropped.
//!
//! Registration order is therefore a priority policy. The gateway registers
//! presence tracking first (it only observes), then the message store, then
//! the squelch handler that silences known-but-uninteresting frames.

use log::{debug, warn};
use std::net::SocketAddr;
use thiserror::Error;

use crate::logutil::dump_document;
use crate::metrics;
use crate::protocol::Frame;

/// A handler failed on a frame it was interested in.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {field} is not a number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

pub trait FrameHandler: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Inspect `frame`; return `Ok(true)` to claim it and stop the chain.
    fn handle(&mut self, frame: &Frame, origin: SocketAddr) -> Result<bool, HandlerError>;
}

/// Text of a mandatory field.
pub fn required<'f>(frame: &'f Frame, path: &'static str) -> Result<&'f str, HandlerError> {
    frame.text(path).ok_or(HandlerError::MissingField(path))
}

/// Numeric value of a mandatory field.
pub fn required_number<T: std::str::FromStr>(
    frame: &Frame,
    path: &'static str,
) -> Result<T, HandlerError> {
    let raw = required(frame, path)?;
    raw.trim().parse().map_err(|_| HandlerError::InvalidNumber {
        field: path,
        value: raw.to_string(),
    })
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Claimed by the named handler.
    Handled(&'static str),
    Unhandled,
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<Box<dyn FrameHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the end of the chain.
    pub fn register(&mut self, handler: Box<dyn FrameHandler>) {
        debug!("Attached frame handler {}", handler.name());
        self.handlers.push(handler);
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn dispatch(&mut self, frame: &Frame, origin: SocketAddr) -> Disposition {
        for handler in self.handlers.iter_mut() {
            match handler.handle(frame, origin) {
                Ok(true) => {
                    debug!("{} from {} handled by {}", frame.label(), origin, handler.name());
                    return Disposition::Handled(handler.name());
                }
                Ok(false) => {}
                Err(e) => {
                    metrics::inc_handler_faults();
                    warn!(
                        "Frame handler {} failed to process {} from {}: {}",
                        handler.name(),
                        frame.label(),
                        origin,
                        e
                    );
                }
            }
        }
        metrics::inc_frames_unhandled();
        warn!(
            "No handler is interested in {} from {}. Dumping content.",
            frame.label(),
            origin
        );
        dump_document(log::Level::Warn, frame.raw());
        Disposition::Unhandled
    }
}
