//! # Messages
//!
//! The unit of data carried by the bus.

use bytes::Bytes;
use std::collections::BTreeMap;

/// A message published to, or delivered from, a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Subject the message was published to.
    pub subject: String,

    /// Optional subject a responder should publish its reply to.
    pub reply: Option<String>,

    /// String headers (trace context, content type, ...).
    pub headers: BTreeMap<String, String>,

    /// Opaque payload.
    pub payload: Bytes,
}

impl Message {
    /// Create a message without reply subject or headers.
    #[must_use]
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            headers: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// Set the reply subject.
    #[must_use]
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Add a header, replacing any previous value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Look up a header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Payload size in bytes, as accounted in pending-bytes counters.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
