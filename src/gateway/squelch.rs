//! Squelch handler for frames the gateway understands but has no use for.
//!
//! Base stations send these periodically or on handset events. Claiming them
//! here keeps the unhandled-frame warnings for frames that are genuinely new.
//! Registered last so earlier observers (presence) still see them.
//!
//! - `request/systeminfo`: handsets currently served by the base station
//! - `request/login`: handset logged in (1) or out (0)
//! - `request/alarm`: emitted when some handset models connect; `alarmdata/type` 16
//!   appears to mean "no alarm"

use log::debug;
use std::net::SocketAddr;

use super::dispatch::{FrameHandler, HandlerError};
use crate::protocol::Frame;

#[derive(Debug, Default, Clone, Copy)]
pub struct SquelchHandler;

impl FrameHandler for SquelchHandler {
    fn name(&self) -> &'static str {
        "squelch"
    }

    fn handle(&mut self, frame: &Frame, origin: SocketAddr) -> Result<bool, HandlerError> {
        if frame.kind() != "request" {
            return Ok(false);
        }
        match frame.subtype() {
            Some("systeminfo") | Some("login") => {
                debug!("squelched {} from {}", frame.label(), origin);
                Ok(true)
            }
            Some("alarm") => {
                debug!(
                    "squelched alarm type {} from {} (handset {}, rssi {})",
                    frame.text("alarmdata/type").unwrap_or("?"),
                    origin,
                    frame.text("senderdata/address").unwrap_or("?"),
                    frame.text("rssidata/rssi").unwrap_or("?")
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
