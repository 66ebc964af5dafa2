//! NUL‑delimited document framer for base station datagrams.
//!
//! Base stations terminate every XML document with a single `\0` byte:
//!
//!   `<document bytes>\0<document bytes>\0...`
//!
//! Datagrams seen in the field carry exactly one document, but nothing in the
//! protocol forbids several. This framer can be fed arbitrary chunks and yields
//! whole documents as they become available. Empty and whitespace-only
//! segments between delimiters are skipped.
use bytes::{Buf, BytesMut};

/// Byte separating documents on the wire.
pub const DELIMITER: u8 = 0;

/// Maximum buffered bytes without a delimiter before the buffer is discarded
const MAX_DOCUMENT_SIZE: usize = 64 * 1024; // 64 KB

pub struct NulFramer {
    buf: BytesMut,
}

impl Default for NulFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl NulFramer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(4096),
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
        if self.buf.len() > MAX_DOCUMENT_SIZE && !self.buf.contains(&DELIMITER) {
            log::warn!(
                "discarding {} buffered bytes without a document delimiter",
                self.buf.len()
            );
            self.buf.clear();
        }
    }

    /// Extract the next complete (delimiter-terminated) document, if any.
    pub fn next_document(&mut self) -> Option<Vec<u8>> {
        loop {
            let pos = self.buf.iter().position(|b| *b == DELIMITER)?;
            let doc = self.buf.split_to(pos);
            self.buf.advance(1); // the delimiter itself
            if !is_blank(&doc) {
                return Some(doc.to_vec());
            }
        }
    }

    /// Drain whatever trails the last delimiter.
    ///
    /// A datagram is self-contained, so text after the final `\0` is treated as
    /// one more candidate document rather than the start of the next one.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = self.buf.split();
        if is_blank(&rest) {
            None
        } else {
            Some(rest.to_vec())
        }
    }
}

/// Split one datagram into its candidate documents.
pub fn split_datagram(data: &[u8]) -> Vec<Vec<u8>> {
    let mut framer = NulFramer::new();
    framer.push(data);
    let mut docs = Vec::new();
    while let Some(doc) = framer.next_document() {
        docs.push(doc);
    }
    docs.extend(framer.finish());
    docs
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(|b| b.is_ascii_whitespace())
}
