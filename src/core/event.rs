//! Event data model for the triage engine.
//!
//! `RawEvent` is what the transport hands us, `ResolutionVerdict` is what the
//! resolution gateway returns, and `EmissionRequest` is the terminal artifact
//! handed to the sink. All three are immutable once constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single process-lifecycle event as delivered by a sensing source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Activity label reported by the source
    pub label: String,
    /// Opaque transport payload, kept verbatim
    pub payload: String,
    /// Transport quality-of-service level
    pub qos: u8,
    /// When this event was received by the engine
    pub received_at: DateTime<Utc>,
}

impl RawEvent {
    /// Create an event stamped with the current time.
    pub fn now(label: impl Into<String>, payload: impl Into<String>, qos: u8) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
            qos,
            received_at: Utc::now(),
        }
    }
}

/// Outcome of one external disambiguation attempt.
///
/// The wire form follows the resolver backend: `resolved_ambiguity` carries
/// the decision, `activity` and `confidence` are present only on a positive
/// verdict. The gateway owns the confidence threshold; the router only looks
/// at `resolved` and `activity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionVerdict {
    #[serde(rename = "resolved_ambiguity")]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ResolutionVerdict {
    /// The resolved activity label, if the verdict carries a usable one.
    pub fn usable_activity(&self) -> Option<&str> {
        self.activity
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}

/// A finished routing decision, ready for downstream serialization.
#[derive(Debug, Clone)]
pub enum EmissionRequest {
    /// A singleton window; the event passes through unchanged.
    Unambiguous(RawEvent),
    /// An ambiguous window the gateway resolved to one activity.
    Resolved {
        activity: String,
        source_events: Vec<RawEvent>,
    },
    /// An ambiguous window the gateway could not resolve; every candidate
    /// is surfaced for manual handling.
    Unresolved { source_events: Vec<RawEvent> },
}

/// One output log entry produced from an emission request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub label: String,
    pub payload: String,
    pub qos: u8,
    pub timestamp: DateTime<Utc>,
    pub ambiguous: bool,
}

impl OutputRecord {
    fn from_event(event: &RawEvent, ambiguous: bool) -> Self {
        Self {
            label: event.label.clone(),
            payload: event.payload.clone(),
            qos: event.qos,
            timestamp: event.received_at,
            ambiguous,
        }
    }
}

impl EmissionRequest {
    /// Expand this request into its output records.
    ///
    /// - `Unambiguous` yields one record with the original label.
    /// - `Resolved` yields one record reusing every field of the *first*
    ///   source event except the label, which is replaced by the resolved
    ///   activity.
    /// - `Unresolved` yields one record per source event, each keeping its
    ///   own label and flagged ambiguous.
    pub fn to_records(&self) -> Vec<OutputRecord> {
        match self {
            EmissionRequest::Unambiguous(event) => vec![OutputRecord::from_event(event, false)],
            EmissionRequest::Resolved {
                activity,
                source_events,
            } => match source_events.first() {
                Some(first) => {
                    let mut record = OutputRecord::from_event(first, false);
                    record.label = activity.clone();
                    vec![record]
                }
                None => Vec::new(),
            },
            EmissionRequest::Unresolved { source_events } => source_events
                .iter()
                .map(|e| OutputRecord::from_event(e, true))
                .collect(),
        }
    }

    /// Number of output records this request expands to.
    pub fn record_count(&self) -> usize {
        match self {
            EmissionRequest::Unambiguous(_) => 1,
            EmissionRequest::Resolved { source_events, .. } => usize::from(!source_events.is_empty()),
            EmissionRequest::Unresolved { source_events } => source_events.len(),
        }
    }
}
