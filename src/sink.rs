//! Emission seam and the file-backed sink.
//!
//! The router hands finished `EmissionRequest`s to an `EventSink`; the sink
//! owns record expansion and persistence. `JsonlSink` appends one JSON line
//! per output record, the crate-native stand-in for the downstream process
//! log.

use crate::core::event::EmissionRequest;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Errors from handing an emission downstream.
#[derive(Debug)]
pub enum SinkError {
    Io(String),
    Serialize(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(msg) => write!(f, "sink IO error: {msg}"),
            SinkError::Serialize(msg) => write!(f, "sink serialize error: {msg}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Accepts finished, routing-decided emissions for publication.
///
/// The engine never re-emits a request it already handed off successfully.
pub trait EventSink: Send + Sync {
    fn emit(&self, request: &EmissionRequest) -> Result<(), SinkError>;
}

/// Sink that appends output records as JSON lines to a log file.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, request: &EmissionRequest) -> Result<(), SinkError> {
        let records = request.to_records();
        if records.is_empty() {
            return Ok(());
        }

        let mut lines = String::new();
        for record in &records {
            let line =
                serde_json::to_string(record).map_err(|e| SinkError::Serialize(e.to_string()))?;
            lines.push_str(&line);
            lines.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::Io(e.to_string()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SinkError::Io(e.to_string()))?;
        file.write_all(lines.as_bytes())
            .map_err(|e| SinkError::Io(e.to_string()))?;

        info!(
            records = records.len(),
            path = %self.path.display(),
            "emitted records"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{OutputRecord, RawEvent};

    fn temp_log(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("triage-sink-{}-{name}.jsonl", std::process::id()))
    }

    #[test]
    fn test_jsonl_appends_one_line_per_record() {
        let path = temp_log("unresolved");
        let _ = std::fs::remove_file(&path);
        let sink = JsonlSink::new(&path);

        let request = EmissionRequest::Unresolved {
            source_events: vec![RawEvent::now("pick", "{}", 1), RawEvent::now("place", "{}", 1)],
        };
        sink.emit(&request).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<OutputRecord> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.ambiguous));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_jsonl_appends_across_emits() {
        let path = temp_log("append");
        let _ = std::fs::remove_file(&path);
        let sink = JsonlSink::new(&path);

        sink.emit(&EmissionRequest::Unambiguous(RawEvent::now("pick", "{}", 1)))
            .unwrap();
        sink.emit(&EmissionRequest::Unambiguous(RawEvent::now("place", "{}", 1)))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        let _ = std::fs::remove_file(&path);
    }
}
