//! Transport-message adaptation.
//!
//! The transport delivers `(topic, payload, qos)` triples; only payloads
//! announcing a completed lifecycle transition become `RawEvent`s. The
//! activity label is the last topic segment, the payload is kept verbatim,
//! and the receive timestamp is taken here. Broker connectivity itself is
//! the transport's concern and stays outside this crate.

use crate::core::event::RawEvent;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

/// Payload prefix announcing a completed lifecycle transition.
pub const DEFAULT_ACCEPT_PREFIX: &str = r#"{"event":{"lifecycle:transition":"complete""#;

/// One message as delivered by the transport, e.g. a JSON line on stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportMessage {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub qos: u8,
}

impl TransportMessage {
    /// Parse a JSON-line transport message.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Filters transport messages down to process-lifecycle events.
#[derive(Debug, Clone)]
pub struct LifecycleFilter {
    accept_prefix: String,
}

impl LifecycleFilter {
    pub fn new(accept_prefix: impl Into<String>) -> Self {
        Self {
            accept_prefix: accept_prefix.into(),
        }
    }

    /// Convert a transport message into a raw event stamped with the
    /// current time, or `None` if the payload is not a completed lifecycle
    /// transition.
    pub fn accept(&self, message: &TransportMessage) -> Option<RawEvent> {
        if !message.payload.starts_with(&self.accept_prefix) {
            debug!(topic = %message.topic, "payload filtered out");
            return None;
        }
        let label = message
            .topic
            .rsplit('/')
            .next()
            .unwrap_or(message.topic.as_str());
        Some(RawEvent {
            label: label.to_string(),
            payload: message.payload.clone(),
            qos: message.qos,
            received_at: Utc::now(),
        })
    }
}

impl Default for LifecycleFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ACCEPT_PREFIX)
    }
}
