//! Injected observability for the triage engine.
//!
//! The router reports per-window stage latencies, resolver confidence, and
//! dropped windows through the `Telemetry` trait instead of writing to
//! shared files directly, so the core stays decoupled from any particular
//! persistence mechanism. `TriageLog` is the stock implementation: atomic
//! session counters plus optional CSV rows on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Pipeline stage a latency measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// A singleton window was classified unambiguous.
    WindowUnambiguous,
    /// A multi-event window was classified ambiguous.
    WindowAmbiguous,
    /// The blocking resolution gateway round-trip.
    Resolve,
    /// Hand-off of an unambiguous emission to the sink.
    PublishUnambiguous,
    /// Hand-off of a resolved emission to the sink.
    PublishResolved,
    /// Hand-off of an unresolved emission to the sink.
    PublishUnresolved,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::WindowUnambiguous => "window_unambiguous",
            Stage::WindowAmbiguous => "window_ambiguous",
            Stage::Resolve => "resolve",
            Stage::PublishUnambiguous => "publish_unambiguous",
            Stage::PublishResolved => "publish_resolved",
            Stage::PublishUnresolved => "publish_unresolved",
        }
    }
}

/// Observability hooks the router reports into.
///
/// Measurements are reported, never used for control decisions.
pub trait Telemetry: Send + Sync {
    fn record_latency(&self, window_id: &str, stage: Stage, elapsed_ms: u64);
    fn record_confidence(&self, window_id: &str, activity: &str, confidence: f64);
    fn record_window_dropped(&self, window_id: &str);
    fn record_emission(&self, records: u64);
}

/// Telemetry that discards everything.
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn record_latency(&self, _window_id: &str, _stage: Stage, _elapsed_ms: u64) {}
    fn record_confidence(&self, _window_id: &str, _activity: &str, _confidence: f64) {}
    fn record_window_dropped(&self, _window_id: &str) {}
    fn record_emission(&self, _records: u64) {}
}

/// Session counters with optional CSV row persistence.
#[derive(Debug)]
pub struct TriageLog {
    unambiguous_windows: AtomicU64,
    ambiguous_windows: AtomicU64,
    resolved_windows: AtomicU64,
    unresolved_windows: AtomicU64,
    dropped_windows: AtomicU64,
    records_emitted: AtomicU64,
    session_start: DateTime<Utc>,
    /// Per-stage latency rows: `window_id,stage,elapsed_ms`
    latency_path: Option<PathBuf>,
    /// Resolver confidence rows: `window_id,activity,confidence`
    confidence_path: Option<PathBuf>,
}

impl TriageLog {
    pub fn new() -> Self {
        Self {
            unambiguous_windows: AtomicU64::new(0),
            ambiguous_windows: AtomicU64::new(0),
            resolved_windows: AtomicU64::new(0),
            unresolved_windows: AtomicU64::new(0),
            dropped_windows: AtomicU64::new(0),
            records_emitted: AtomicU64::new(0),
            session_start: Utc::now(),
            latency_path: None,
            confidence_path: None,
        }
    }

    /// Create a log that also appends latency and confidence rows on disk.
    pub fn with_persistence(latency_path: PathBuf, confidence_path: PathBuf) -> Self {
        let mut log = Self::new();
        log.latency_path = Some(latency_path);
        log.confidence_path = Some(confidence_path);
        log
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TriageStats {
        TriageStats {
            unambiguous_windows: self.unambiguous_windows.load(Ordering::Relaxed),
            ambiguous_windows: self.ambiguous_windows.load(Ordering::Relaxed),
            resolved_windows: self.resolved_windows.load(Ordering::Relaxed),
            unresolved_windows: self.unresolved_windows.load(Ordering::Relaxed),
            dropped_windows: self.dropped_windows.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Unambiguous windows: {}\n\
             - Ambiguous windows: {}\n\
             - Resolved by gateway: {}\n\
             - Unresolved (flagged ambiguous): {}\n\
             - Dropped on gateway failure: {}\n\
             - Records emitted: {}\n\
             - Session duration: {} seconds",
            stats.unambiguous_windows,
            stats.ambiguous_windows,
            stats.resolved_windows,
            stats.unresolved_windows,
            stats.dropped_windows,
            stats.records_emitted,
            stats.session_duration_secs
        )
    }

    fn append_row(path: &PathBuf, line: &str) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %path.display(), "could not create telemetry directory: {e}");
                return;
            }
        }
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| writeln!(f, "{line}"));
        if let Err(e) = result {
            warn!(path = %path.display(), "could not append telemetry row: {e}");
        }
    }
}

impl Default for TriageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry for TriageLog {
    fn record_latency(&self, window_id: &str, stage: Stage, elapsed_ms: u64) {
        match stage {
            Stage::WindowUnambiguous => {
                self.unambiguous_windows.fetch_add(1, Ordering::Relaxed);
            }
            Stage::WindowAmbiguous => {
                self.ambiguous_windows.fetch_add(1, Ordering::Relaxed);
            }
            Stage::PublishResolved => {
                self.resolved_windows.fetch_add(1, Ordering::Relaxed);
            }
            Stage::PublishUnresolved => {
                self.unresolved_windows.fetch_add(1, Ordering::Relaxed);
            }
            Stage::Resolve | Stage::PublishUnambiguous => {}
        }
        if let Some(ref path) = self.latency_path {
            Self::append_row(path, &format!("{window_id},{},{elapsed_ms}", stage.as_str()));
        }
    }

    fn record_confidence(&self, window_id: &str, activity: &str, confidence: f64) {
        if let Some(ref path) = self.confidence_path {
            Self::append_row(path, &format!("{window_id},{activity},{confidence}"));
        }
    }

    fn record_window_dropped(&self, window_id: &str) {
        self.dropped_windows.fetch_add(1, Ordering::Relaxed);
        warn!(window = window_id, "window dropped without emission");
    }

    fn record_emission(&self, records: u64) {
        self.records_emitted.fetch_add(records, Ordering::Relaxed);
    }
}

/// Snapshot of triage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageStats {
    pub unambiguous_windows: u64,
    pub ambiguous_windows: u64,
    pub resolved_windows: u64,
    pub unresolved_windows: u64,
    pub dropped_windows: u64,
    pub records_emitted: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared triage log.
pub type SharedTriageLog = Arc<TriageLog>;

/// Create a new shared triage log without persistence.
pub fn create_shared_log() -> SharedTriageLog {
    Arc::new(TriageLog::new())
}
