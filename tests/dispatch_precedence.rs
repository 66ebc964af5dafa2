//! Handler chain ordering through the full pipeline.

mod common;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use common::{addr, login, pipeline, JobRequest};
use dectgw::gateway::dispatch::{Disposition, FrameHandler, HandlerError};
use dectgw::protocol::Frame;

/// Claims everything it sees and remembers the labels.
struct CatchAll {
    seen: Arc<Mutex<Vec<String>>>,
}

impl FrameHandler for CatchAll {
    fn name(&self) -> &'static str {
        "catch-all"
    }

    fn handle(&mut self, frame: &Frame, _origin: SocketAddr) -> Result<bool, HandlerError> {
        self.seen.lock().unwrap().push(frame.label());
        Ok(true)
    }
}

#[test]
fn default_chain_order() {
    let (pipeline, _rx) = pipeline();
    assert_eq!(
        pipeline.dispatcher.handler_names(),
        vec!["presence", "message-store", "squelch"]
    );
}

#[test]
fn unknown_frames_are_unhandled() {
    let (mut pipeline, mut rx) = pipeline();
    let origin = addr("10.0.0.1:1300");
    let outcomes = pipeline.process_datagram(
        b"<request version=\"19.11.12.1403\" type=\"keepalive\"/>\0<response type=\"login\"/>\0",
        origin,
    );
    assert_eq!(outcomes, vec![Disposition::Unhandled, Disposition::Unhandled]);
    assert!(rx.try_recv().is_err());
}

#[test]
fn malformed_sibling_does_not_block_others() {
    let (mut pipeline, mut rx) = pipeline();
    let origin = addr("10.0.0.1:1300");
    let mut datagram = b"<request type=\"job\"><broken></request>\0".to_vec();
    datagram.extend_from_slice(&JobRequest::default().datagram());
    datagram.extend_from_slice(b"\0\n\0");
    datagram.extend_from_slice(&login("23", "1"));

    let outcomes = pipeline.process_datagram(&datagram, origin);
    assert_eq!(
        outcomes,
        vec![
            Disposition::Handled("message-store"),
            Disposition::Handled("squelch"),
        ]
    );
    assert_eq!(pipeline.store.len(), 1);
    assert_eq!(pipeline.presence.lookup("23"), Some(origin));
    assert_eq!(rx.try_recv().unwrap().dest, origin);
}

#[test]
fn faulty_job_falls_through_to_later_handlers() {
    let (mut pipeline, _rx) = pipeline();
    let seen = Arc::new(Mutex::new(Vec::new()));
    pipeline.dispatcher.register(Box::new(CatchAll { seen: seen.clone() }));

    let doc = JobRequest::default()
        .document()
        .replace("<persondata>\n<address>23</address>\n</persondata>\n", "");
    assert!(!doc.contains("persondata"));
    let outcomes = pipeline.process_datagram(doc.as_bytes(), addr("10.0.0.1:1300"));

    assert_eq!(outcomes, vec![Disposition::Handled("catch-all")]);
    assert!(pipeline.store.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec!["request/job".to_string()]);
}

#[test]
fn extra_handler_only_sees_unclaimed_frames() {
    let (mut pipeline, _rx) = pipeline();
    let seen = Arc::new(Mutex::new(Vec::new()));
    pipeline.dispatcher.register(Box::new(CatchAll { seen: seen.clone() }));
    let origin = addr("10.0.0.1:1300");

    let mut datagram = JobRequest::default().datagram();
    datagram.extend_from_slice(&login("42", "1"));
    datagram.extend_from_slice(b"<request type=\"keepalive\"/>\0");
    let outcomes = pipeline.process_datagram(&datagram, origin);

    assert_eq!(
        outcomes,
        vec![
            Disposition::Handled("message-store"),
            Disposition::Handled("squelch"),
            Disposition::Handled("catch-all"),
        ]
    );
    assert_eq!(*seen.lock().unwrap(), vec!["request/keepalive".to_string()]);
    // Presence still observed the login ahead of squelch.
    assert_eq!(pipeline.presence.lookup("42"), Some(origin));
}
