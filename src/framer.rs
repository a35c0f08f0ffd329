//! Streaming framer: splits a byte stream into top-level INDI elements
//!
//! The framer is tolerant of noise between elements, accepts elements
//! delivered whole or in arbitrary chunks (including splits inside a
//! tag), and is restartable per connection. The same framer serves TCP
//! sockets and child-process pipes through [`MessageReader`].

use crate::error::Result;
use crate::message::{ProtocolMessage, TAGS};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Incremental splitter producing parsed [`ProtocolMessage`]s.
#[derive(Debug, Default)]
pub struct Framer {
    /// Raw bytes not yet carved into `>`-terminated slices
    incoming: BytesMut,
    /// The element being accumulated, empty if between elements
    element: Vec<u8>,
    /// Tag of the element being accumulated
    tag: Option<&'static str>,
}

/// True if `data[pos..]` starts a recognized element, returning the tag.
fn tag_at(data: &[u8], pos: usize) -> Option<&'static str> {
    let rest = &data[pos..];
    for tag in TAGS {
        if rest.len() > tag.len() + 1
            && rest[0] == b'<'
            && &rest[1..=tag.len()] == tag.as_bytes()
            && matches!(rest[tag.len() + 1], b' ' | b'\t' | b'\r' | b'\n' | b'/' | b'>')
        {
            return Some(tag);
        }
    }
    None
}

/// Find the first recognized start tag in `data`.
fn find_start(data: &[u8]) -> Option<(usize, &'static str)> {
    data.iter()
        .enumerate()
        .filter(|(_, b)| **b == b'<')
        .find_map(|(pos, _)| tag_at(data, pos).map(|tag| (pos, tag)))
}

impl Framer {
    /// A fresh framer, between elements.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all buffered state, e.g. when a connection is reused.
    pub fn reset(&mut self) {
        self.incoming.clear();
        self.element.clear();
        self.tag = None;
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.incoming.extend_from_slice(data);
    }

    /// Produce the next complete element, if the buffer holds one.
    ///
    /// Unparsable accumulations are discarded and scanning resumes at
    /// the next recognized start tag.
    pub fn next_message(&mut self) -> Option<ProtocolMessage> {
        // work in >-terminated slices so a tag split across reads is
        // only examined once it is whole
        while let Some(end) = self.incoming.iter().position(|b| *b == b'>') {
            let slice = self.incoming.split_to(end + 1);
            match self.tag {
                None => {
                    let Some((start, tag)) = find_start(&slice) else {
                        continue; // noise between elements
                    };
                    self.element.extend_from_slice(&slice[start..]);
                    self.tag = Some(tag);
                    if self.element.ends_with(b"/>") {
                        if let Some(msg) = self.take_element() {
                            return Some(msg);
                        }
                    }
                }
                Some(tag) => {
                    self.element.extend_from_slice(&slice);
                    let close = format!("</{}>", tag);
                    if self.element.ends_with(close.as_bytes()) {
                        if let Some(msg) = self.take_element() {
                            return Some(msg);
                        }
                    }
                }
            }
        }
        None
    }

    fn take_element(&mut self) -> Option<ProtocolMessage> {
        let raw = std::mem::take(&mut self.element);
        self.tag = None;
        match std::str::from_utf8(&raw).ok().and_then(|s| s.parse().ok()) {
            Some(msg) => Some(msg),
            None => {
                trace!("discarding unparsable element of {} bytes", raw.len());
                None
            }
        }
    }

    /// Bytes currently buffered, for backpressure accounting.
    pub fn buffered(&self) -> usize {
        self.incoming.remaining() + self.element.len()
    }
}

/// Pulls parsed elements from any byte source: a TCP read half, a
/// child's stdout, anything `AsyncRead`.
#[derive(Debug)]
pub struct MessageReader<R> {
    source: R,
    framer: Framer,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Wrap a byte source.
    pub fn new(source: R) -> Self {
        Self {
            source,
            framer: Framer::new(),
        }
    }

    /// The next element, or `None` once the source reaches EOF.
    pub async fn next_message(&mut self) -> Result<Option<ProtocolMessage>> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(msg) = self.framer.next_message() {
                return Ok(Some(msg));
            }
            let n = self.source.read(&mut buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.framer.push(&buf[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(framer: &mut Framer) -> Vec<ProtocolMessage> {
        let mut out = Vec::new();
        while let Some(msg) = framer.next_message() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_whole_self_closing_element() {
        let mut framer = Framer::new();
        framer.push(br#"<getProperties version="1.7"/>"#);
        let msgs = drain(&mut framer);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].tag(), "getProperties");
    }

    #[test]
    fn test_garbage_then_element() {
        let mut framer = Framer::new();
        framer.push(b"HTTP/1.1 junk > more junk ");
        framer.push(br#"<getProperties version="1.7"/> trailing"#);
        let msgs = drain(&mut framer);
        assert_eq!(msgs.len(), 1, "exactly one event from garbage plus one element");
    }

    #[test]
    fn test_split_mid_tag() {
        let mut framer = Framer::new();
        framer.push(b"<newNumberVector device=\"Thermostat\" na");
        assert!(framer.next_message().is_none());
        framer.push(b"me=\"targetvector\"><oneNumber name=\"target\">22</one");
        assert!(framer.next_message().is_none());
        framer.push(b"Number></newNumberVector>");
        let msgs = drain(&mut framer);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].name(), Some("targetvector"));
    }

    #[test]
    fn test_byte_at_a_time() {
        let xml = br#"<setSwitchVector device="Telescope" name="parkstate" state="Ok"><oneSwitch name="parked">On</oneSwitch></setSwitchVector>"#;
        let mut framer = Framer::new();
        let mut msgs = Vec::new();
        for b in xml.iter() {
            framer.push(std::slice::from_ref(b));
            msgs.extend(drain(&mut framer));
        }
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].tag(), "setSwitchVector");
    }

    #[test]
    fn test_unparsable_element_discarded() {
        let mut framer = Framer::new();
        // recognized tag, malformed body (bad switch value), then a good one
        framer.push(b"<newSwitchVector device=\"T\" name=\"p\"><oneSwitch name=\"s\">Broken</oneSwitch></newSwitchVector>");
        framer.push(br#"<getProperties version="1.7"/>"#);
        let msgs = drain(&mut framer);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].tag(), "getProperties");
    }

    #[test]
    fn test_unknown_tag_is_noise() {
        let mut framer = Framer::new();
        framer.push(br#"<pingRequest id="1"/><message message="hello"/>"#);
        let msgs = drain(&mut framer);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].tag(), "message");
    }

    #[test]
    fn test_two_elements_one_push() {
        let mut framer = Framer::new();
        framer.push(br#"<getProperties version="1.7"/><getProperties version="1.7" device="Cam"/>"#);
        let msgs = drain(&mut framer);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].device(), Some("Cam"));
    }

    #[test]
    fn test_reset_clears_partial_state() {
        let mut framer = Framer::new();
        framer.push(b"<newTextVector device=\"A\" name=\"b\"><oneText name=\"t\">half");
        framer.reset();
        framer.push(br#"<getProperties version="1.7"/>"#);
        let msgs = drain(&mut framer);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].tag(), "getProperties");
    }

    #[tokio::test]
    async fn test_message_reader_over_async_source() {
        let xml = br#"<getProperties version="1.7"/><message device="Cam" message="ready"/>"#;
        let mut reader = MessageReader::new(&xml[..]);
        let first = reader.next_message().await.unwrap().unwrap();
        assert_eq!(first.tag(), "getProperties");
        let second = reader.next_message().await.unwrap().unwrap();
        assert_eq!(second.tag(), "message");
        assert!(reader.next_message().await.unwrap().is_none());
    }
}
