//! Test utilities & fixtures.
//! Builders for base station documents shaped like captured traffic, plus a
//! pipeline wired to an in-memory outbound channel.
#![allow(dead_code)] // each test binary uses a different subset

use std::net::SocketAddr;
use tokio::sync::mpsc;

use dectgw::config::Config;
use dectgw::gateway::outbound::{Outbound, OutgoingDatagram};
use dectgw::gateway::Pipeline;
use dectgw::protocol::Frame;

pub fn addr(s: &str) -> SocketAddr {
    s.parse().expect("socket address")
}

/// Pipeline with default config; outbound datagrams land in the receiver.
pub fn pipeline() -> (Pipeline, mpsc::UnboundedReceiver<OutgoingDatagram>) {
    let (outbound, rx) = Outbound::channel();
    (Pipeline::new(&Config::default(), outbound), rx)
}

pub struct JobRequest<'a> {
    pub ext_id: &'a str,
    pub from_name: &'a str,
    pub from_ext: &'a str,
    pub from_loc: &'a str,
    pub to_ext: &'a str,
    pub datetime: &'a str,
    pub timestamp: &'a str,
    pub message: &'a str,
}

impl Default for JobRequest<'_> {
    fn default() -> Self {
        JobRequest {
            ext_id: "3725663668",
            from_name: "no42",
            from_ext: "42",
            from_loc: "M700",
            to_ext: "23",
            datetime: "2019-12-29 22:04:48",
            timestamp: "5e0914f0",
            message: "Lunch at noon?",
        }
    }
}

impl JobRequest<'_> {
    pub fn document(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<request version="19.11.12.1403" type="job">
<externalid>{}</externalid>
<systemdata>
<name>M700</name>
<datetime>{}</datetime>
<timestamp>{}</timestamp>
<status>1</status>
<statusinfo>System running</statusinfo>
</systemdata>
<jobdata>
<priority>0</priority>
<messages>
<message1></message1>
<message2></message2>
<messageuui>{}</messageuui>
</messages>
<status>0</status>
<statusinfo></statusinfo>
</jobdata>
<senderdata>
<address>{}</address>
<name>{}</name>
<location>{}</location>
</senderdata>
<persondata>
<address>{}</address>
</persondata>
</request>
"#,
            self.ext_id,
            self.datetime,
            self.timestamp,
            self.message,
            self.from_ext,
            self.from_name,
            self.from_loc,
            self.to_ext
        )
    }

    pub fn datagram(&self) -> Vec<u8> {
        let mut bytes = self.document().into_bytes();
        bytes.push(0);
        bytes
    }

    pub fn frame(&self) -> Frame {
        Frame::parse(&self.document()).expect("job request parses")
    }
}

/// `response/job` carrying a delivery status for `correlation_id`.
pub fn job_status(correlation_id: &str, status: &str) -> Vec<u8> {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <response version=\"19.11.12.1403\" type=\"job\">\n\
         <externalid>{correlation_id}</externalid>\n\
         <systemdata><name>M700</name><status>1</status></systemdata>\n\
         <jobdata><status>{status}</status><statusinfo></statusinfo></jobdata>\n\
         </response>\n\0"
    )
    .into_bytes()
}

/// `response/job` without a `jobdata` payload.
pub fn job_response_without_status(correlation_id: &str) -> Vec<u8> {
    format!(
        "<response version=\"19.11.12.1403\" type=\"job\">\
         <externalid>{correlation_id}</externalid></response>\0"
    )
    .into_bytes()
}

pub fn login(extension: &str, status: &str) -> Vec<u8> {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <request version=\"19.11.12.1403\" type=\"login\">\n\
         <externalid>3725663668</externalid>\n\
         <logindata><status>{status}</status></logindata>\n\
         <senderdata><address>{extension}</address><name>no{extension}</name><location>M700</location></senderdata>\n\
         </request>\n\0"
    )
    .into_bytes()
}

pub fn systeminfo(extensions: &[&str]) -> Vec<u8> {
    let handsets: String = extensions
        .iter()
        .map(|e| format!("<address>{e}</address><name>no{e}</name>"))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <request version=\"19.11.12.1403\" type=\"systeminfo\">\n\
         <externalid>3485367639</externalid>\n\
         <senderdata>{handsets}</senderdata>\n\
         </request>\n\0"
    )
    .into_bytes()
}

/// Parse an outbound datagram back into a frame.
pub fn parse_outgoing(datagram: &OutgoingDatagram) -> Frame {
    assert!(
        datagram.payload.ends_with('\0'),
        "outbound documents must be NUL-terminated"
    );
    Frame::parse(datagram.payload.trim_end_matches('\0')).expect("outbound document parses")
}
