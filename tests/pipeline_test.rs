//! End-to-end tests of the triage pipeline: aggregator → router → sink,
//! with an in-memory gateway and sink standing in for the external
//! collaborators.

use chrono::Utc;
use event_triage::core::{
    AmbiguityRouter, EmissionRequest, FailurePolicy, OutputRecord, RawEvent, ResolutionVerdict,
    WindowAggregator,
};
use event_triage::resolver::{ResolutionGateway, ResolverError};
use event_triage::sink::{EventSink, SinkError};
use event_triage::telemetry::{NoopTelemetry, TriageLog};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Gateway returning a canned outcome, counting invocations.
struct ScriptedGateway {
    verdict: Option<ResolutionVerdict>,
    calls: AtomicUsize,
}

impl ScriptedGateway {
    fn resolving(activity: &str, confidence: f64) -> Arc<Self> {
        Arc::new(Self {
            verdict: Some(ResolutionVerdict {
                resolved: true,
                activity: Some(activity.to_string()),
                confidence: Some(confidence),
            }),
            calls: AtomicUsize::new(0),
        })
    }

    fn unresolving() -> Arc<Self> {
        Arc::new(Self {
            verdict: Some(ResolutionVerdict {
                resolved: false,
                activity: None,
                confidence: None,
            }),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            verdict: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResolutionGateway for ScriptedGateway {
    fn resolve(&self, _events: &[RawEvent]) -> Result<ResolutionVerdict, ResolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict
            .clone()
            .ok_or_else(|| ResolverError::Unavailable("scripted failure".to_string()))
    }
}

/// Sink recording expanded output records.
#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<OutputRecord>>,
}

impl MemorySink {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn records(&self) -> Vec<OutputRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, request: &EmissionRequest) -> Result<(), SinkError> {
        self.records.lock().unwrap().extend(request.to_records());
        Ok(())
    }
}

fn pipeline(
    window_ms: u64,
    gateway: Arc<ScriptedGateway>,
    sink: Arc<MemorySink>,
    policy: FailurePolicy,
) -> WindowAggregator {
    let router = Arc::new(AmbiguityRouter::new(
        gateway,
        sink,
        Arc::new(NoopTelemetry),
        Duration::from_millis(window_ms),
        policy,
    ));
    WindowAggregator::new(Duration::from_millis(window_ms), None, router)
}

fn event(label: &str) -> RawEvent {
    RawEvent::now(label, r#"{"event":{"lifecycle:transition":"complete"}}"#, 1)
}

fn settle(window_ms: u64) {
    thread::sleep(Duration::from_millis(window_ms * 3 + 50));
}

#[test]
fn arrivals_closer_than_the_window_share_one_window() {
    let gateway = ScriptedGateway::unresolving();
    let sink = MemorySink::new();
    let mut agg = pipeline(100, gateway.clone(), sink.clone(), FailurePolicy::Drop);

    for label in ["a", "b", "c", "d"] {
        agg.ingest(event(label));
        thread::sleep(Duration::from_millis(20));
    }
    settle(100);
    agg.shutdown();

    // One ambiguous window, one resolution attempt, all four flagged.
    assert_eq!(gateway.calls(), 1);
    let records = sink.records();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.ambiguous));
}

#[test]
fn a_quiescence_gap_starts_a_new_window() {
    let gateway = ScriptedGateway::failing();
    let sink = MemorySink::new();
    let mut agg = pipeline(60, gateway, sink.clone(), FailurePolicy::Drop);

    agg.ingest(event("pick"));
    thread::sleep(Duration::from_millis(200));
    agg.ingest(event("place"));
    settle(60);
    agg.shutdown();

    // Both windows were singletons; neither needed the gateway.
    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].label, "pick");
    assert_eq!(records[1].label, "place");
    assert!(records.iter().all(|r| !r.ambiguous));
}

#[test]
fn racing_ingest_never_loses_or_duplicates_an_event() {
    let gateway = ScriptedGateway::unresolving();
    let sink = MemorySink::new();
    let mut agg = pipeline(10, gateway, sink.clone(), FailurePolicy::Drop);

    // Spacing hovers around the debounce period, so closes keep racing
    // fresh arrivals.
    let total = 120;
    for i in 0..total {
        let mut e = event("tick");
        e.payload = format!("{{\"seq\":{i}}}");
        agg.ingest(e);
        thread::sleep(Duration::from_millis(if i % 3 == 0 { 14 } else { 6 }));
    }
    settle(10);
    agg.shutdown();

    let mut seqs: Vec<String> = sink.records().iter().map(|r| r.payload.clone()).collect();
    assert_eq!(seqs.len(), total, "every event must land in exactly one window");
    seqs.sort();
    seqs.dedup();
    assert_eq!(seqs.len(), total, "no event may appear in two windows");
}

#[test]
fn singleton_window_passes_through_unchanged() {
    let gateway = ScriptedGateway::failing();
    let sink = MemorySink::new();
    let mut agg = pipeline(50, gateway.clone(), sink.clone(), FailurePolicy::Drop);

    agg.ingest(event("inspect"));
    settle(50);
    agg.shutdown();

    assert_eq!(gateway.calls(), 0);
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label, "inspect");
    assert!(!records[0].ambiguous);
}

#[test]
fn resolved_verdict_maps_to_one_record_seeded_by_the_first_event() {
    let gateway = ScriptedGateway::resolving("B", 0.9);
    let sink = MemorySink::new();
    let mut agg = pipeline(50, gateway, sink.clone(), FailurePolicy::Drop);

    let mut first = event("A");
    first.payload = r#"{"seq":0}"#.to_string();
    agg.ingest(first.clone());
    agg.ingest(event("B"));
    settle(50);
    agg.shutdown();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label, "B");
    assert_eq!(records[0].payload, first.payload);
    assert!(!records[0].ambiguous);
}

#[test]
fn gateway_failure_drops_the_window_without_retry() {
    let gateway = ScriptedGateway::failing();
    let sink = MemorySink::new();
    let mut agg = pipeline(50, gateway.clone(), sink.clone(), FailurePolicy::Drop);

    agg.ingest(event("A"));
    agg.ingest(event("B"));
    settle(50);

    // A later window is unaffected by the earlier failure.
    agg.ingest(event("C"));
    settle(50);
    agg.shutdown();

    assert_eq!(gateway.calls(), 1, "a failed window is never retried");
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label, "C");
}

#[test]
fn failure_fallback_emits_all_candidates_flagged() {
    let gateway = ScriptedGateway::failing();
    let sink = MemorySink::new();
    let mut agg = pipeline(50, gateway, sink.clone(), FailurePolicy::EmitUnresolved);

    agg.ingest(event("A"));
    agg.ingest(event("B"));
    settle(50);
    agg.shutdown();

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.ambiguous));
}

#[test]
fn shutdown_flushes_a_window_whose_timer_has_not_fired() {
    let gateway = ScriptedGateway::unresolving();
    let sink = MemorySink::new();
    // Debounce far in the future: only the shutdown flush can close this.
    let mut agg = pipeline(60_000, gateway, sink.clone(), FailurePolicy::Drop);

    agg.ingest(event("A"));
    agg.ingest(event("B"));
    agg.shutdown();

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.ambiguous));
}

#[test]
fn windows_are_dispatched_in_close_order() {
    let gateway = ScriptedGateway::failing();
    let sink = MemorySink::new();
    let mut agg = pipeline(40, gateway, sink.clone(), FailurePolicy::Drop);

    for label in ["one", "two", "three"] {
        agg.ingest(event(label));
        thread::sleep(Duration::from_millis(150));
    }
    agg.shutdown();

    let labels: Vec<String> = sink.records().iter().map(|r| r.label.clone()).collect();
    assert_eq!(labels, ["one", "two", "three"]);
}

#[test]
fn triage_log_counts_the_session() {
    let gateway = ScriptedGateway::resolving("place", 0.95);
    let sink = MemorySink::new();
    let telemetry = Arc::new(TriageLog::new());
    let router = Arc::new(AmbiguityRouter::new(
        gateway,
        sink,
        telemetry.clone(),
        Duration::from_millis(50),
        FailurePolicy::Drop,
    ));
    let mut agg = WindowAggregator::new(Duration::from_millis(50), None, router);

    agg.ingest(event("inspect"));
    settle(50);
    agg.ingest(event("pick"));
    agg.ingest(event("place"));
    settle(50);
    agg.shutdown();

    let stats = telemetry.stats();
    assert_eq!(stats.unambiguous_windows, 1);
    assert_eq!(stats.ambiguous_windows, 1);
    assert_eq!(stats.resolved_windows, 1);
    assert_eq!(stats.records_emitted, 2);
    assert_eq!(stats.dropped_windows, 0);
}

#[test]
fn opened_at_matches_the_first_buffered_event() {
    // The window id is derived from the first arrival, which also seeds
    // the resolved record's timestamp.
    let gateway = ScriptedGateway::resolving("B", 0.9);
    let sink = MemorySink::new();
    let mut agg = pipeline(50, gateway, sink.clone(), FailurePolicy::Drop);

    let before = Utc::now();
    agg.ingest(event("A"));
    thread::sleep(Duration::from_millis(20));
    agg.ingest(event("B"));
    settle(50);
    agg.shutdown();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].timestamp >= before);
    assert!(records[0].timestamp <= Utc::now());
}
