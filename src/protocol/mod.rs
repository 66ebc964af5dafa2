//! # Frame Codec
//!
//! Base stations and the gateway exchange small XML documents over UDP, each
//! terminated by a NUL byte. A decoded document is a [`Frame`]: the root tag
//! is its *kind* (`request` / `response`), the `type` attribute its
//! *subtype* (`job`, `login`, `systeminfo`, `alarm`, ...) and the nested
//! elements carry the fields.
//!
//! ```text
//! <request version="19.11.12.1403" type="login">
//!   <externalid>3725663668</externalid>
//!   <logindata><status>1</status></logindata>
//!   <senderdata><address>42</address><name>no42</name></senderdata>
//! </request>
//! ```
//!
//! - [`framer`] splits raw datagrams on the NUL delimiter.
//! - [`template`] renders the two outbound document shapes.
//!
//! Decoding is per candidate document: one malformed document yields an
//! `Err` in its slot and does not affect its siblings.

pub mod framer;
pub mod template;

use thiserror::Error;

/// Reasons a candidate document could not become a [`Frame`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// One element of a decoded document, detached from the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Text directly inside the element, before its first child element.
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    fn from_node(node: roxmltree::Node<'_, '_>) -> Self {
        Element {
            name: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
            text: node.text().map(str::to_string),
            children: node
                .children()
                .filter(|c| c.is_element())
                .map(Element::from_node)
                .collect(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Text content, empty when the element has none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Element> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Resolve a slash-separated path of child names relative to this element.
    ///
    /// Every segment considers all matching children of the previous step, so
    /// `senderdata/address` finds the first `address` under any `senderdata`.
    pub fn find(&self, path: &str) -> Option<&Element> {
        let mut current: Vec<&Element> = vec![self];
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            current = current
                .into_iter()
                .flat_map(|e| e.children.iter().filter(move |c| c.name == segment))
                .collect();
            if current.is_empty() {
                return None;
            }
        }
        current.into_iter().next()
    }
}

/// A decoded protocol document.
#[derive(Debug, Clone)]
pub struct Frame {
    root: Element,
    raw: String,
}

impl Frame {
    /// Parse a single document.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let doc = roxmltree::Document::parse(raw)?;
        Ok(Frame {
            root: Element::from_node(doc.root_element()),
            raw: raw.to_string(),
        })
    }

    /// Root tag, e.g. `request` or `response`.
    pub fn kind(&self) -> &str {
        &self.root.name
    }

    /// The `type` attribute of the root, e.g. `job`.
    pub fn subtype(&self) -> Option<&str> {
        self.root.attribute("type")
    }

    pub fn version(&self) -> Option<&str> {
        self.root.attribute("version")
    }

    pub fn is(&self, kind: &str, subtype: &str) -> bool {
        self.kind() == kind && self.subtype() == Some(subtype)
    }

    /// The document text this frame was decoded from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn find(&self, path: &str) -> Option<&Element> {
        self.root.find(path)
    }

    /// Text of the element at `path`; `Some("")` when present but empty.
    pub fn text(&self, path: &str) -> Option<&str> {
        self.find(path).map(Element::text)
    }

    /// Short label for logs, e.g. `request/job`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.kind(), self.subtype().unwrap_or("?"))
    }
}

/// Decode every candidate document in a datagram.
pub fn decode_datagram(data: &[u8]) -> Vec<Result<Frame, FrameError>> {
    framer::split_datagram(data)
        .into_iter()
        .map(|doc| {
            let text = std::str::from_utf8(&doc)?;
            Frame::parse(text.trim())
        })
        .collect()
}
