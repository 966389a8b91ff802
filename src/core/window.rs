//! Debounce windowing for bursty event streams.
//!
//! The aggregator buffers incoming events into a single open window and
//! closes it only after a quiescence gap of `window` with no arrivals: every
//! arrival re-arms the close deadline at `last-arrival + window`. A closed
//! window is snapshotted under the buffer lock, cleared so the next window
//! can start immediately, and dispatched outside the lock on a dedicated
//! close lane, so the (possibly seconds-long) downstream resolution call
//! never blocks ingestion.

use crate::core::event::RawEvent;
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// An immutable snapshot of one closed window.
///
/// `events` preserves arrival order; the first and last event seed latency
/// accounting and the resolved output record. The aggregator only ever hands
/// out non-empty snapshots.
#[derive(Debug, Clone)]
pub struct Window {
    pub events: Vec<RawEvent>,
    pub opened_at: DateTime<Utc>,
}

impl Window {
    /// Identifier derived from the arrival time of the first event.
    pub fn id(&self) -> String {
        format!("W{}", self.opened_at.timestamp_millis())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// More than one candidate interpretation of the same activity.
    pub fn is_ambiguous(&self) -> bool {
        self.events.len() > 1
    }

    /// Milliseconds between the first and last buffered event.
    pub fn span_ms(&self) -> u64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => (last.received_at - first.received_at)
                .num_milliseconds()
                .max(0) as u64,
            _ => 0,
        }
    }
}

/// Receives closed, non-empty window snapshots from the aggregator.
///
/// Implementations must contain their own failures; the aggregator ignores
/// anything that happens downstream of the hand-off.
pub trait WindowDispatch: Send + Sync {
    fn dispatch(&self, window: Window);
}

/// The open-window buffer, shared between ingestion and the close lane.
struct Buffer {
    events: Vec<RawEvent>,
    opened_wall: Option<DateTime<Utc>>,
    opened_mono: Option<Instant>,
}

enum TimerMsg {
    /// Supersede the pending close deadline.
    Rearm(Instant),
}

/// Groups near-simultaneous events into windows and dispatches each window
/// exactly once after the debounce period elapses without a new arrival.
pub struct WindowAggregator {
    shared: Arc<Mutex<Buffer>>,
    timer_tx: Option<Sender<TimerMsg>>,
    lane: Option<JoinHandle<()>>,
    dispatch: Arc<dyn WindowDispatch>,
    window: Duration,
    max_window: Option<Duration>,
}

impl WindowAggregator {
    /// Default debounce period.
    pub const DEFAULT_WINDOW_MS: u64 = 1000;

    /// Create an aggregator with the given debounce period and optional
    /// hard cap on total window lifetime.
    ///
    /// The cap bounds worst-case window growth under a sustained sub-period
    /// trickle; with `None` a steady trickle extends the window indefinitely.
    pub fn new(
        window: Duration,
        max_window: Option<Duration>,
        dispatch: Arc<dyn WindowDispatch>,
    ) -> Self {
        let shared = Arc::new(Mutex::new(Buffer {
            events: Vec::new(),
            opened_wall: None,
            opened_mono: None,
        }));
        let (timer_tx, timer_rx) = unbounded();

        let lane_shared = Arc::clone(&shared);
        let lane_dispatch = Arc::clone(&dispatch);
        let lane = thread::Builder::new()
            .name("window-close".to_string())
            .spawn(move || close_lane(lane_shared, timer_rx, lane_dispatch))
            .ok();
        if lane.is_none() {
            warn!("could not spawn window-close lane; windows will only flush on shutdown");
        }

        Self {
            shared,
            timer_tx: Some(timer_tx),
            lane,
            dispatch,
            window,
            max_window,
        }
    }

    /// Append an event to the open window (opening one if needed) and
    /// re-arm the close timer at `now + window`, superseding any pending
    /// deadline. O(1) under the lock; nothing is visible downstream until
    /// the window closes.
    pub fn ingest(&self, event: RawEvent) {
        let Some(timer_tx) = self.timer_tx.as_ref() else {
            warn!(label = %event.label, "event received after shutdown, dropping");
            return;
        };

        let deadline = {
            let mut buf = lock(&self.shared);
            if buf.events.is_empty() {
                buf.opened_wall = Some(event.received_at);
                buf.opened_mono = Some(Instant::now());
            }
            buf.events.push(event);

            let debounce = Instant::now() + self.window;
            match (self.max_window, buf.opened_mono) {
                (Some(cap), Some(opened)) => debounce.min(opened + cap),
                _ => debounce,
            }
        };

        if timer_tx.send(TimerMsg::Rearm(deadline)).is_err() {
            warn!("window-close lane is gone; event will flush on shutdown");
        }
    }

    /// Flush any non-empty open window immediately and stop arming timers.
    ///
    /// Blocks until the close lane has drained, so a shutdown flush is
    /// dispatched before this returns.
    pub fn shutdown(&mut self) {
        // Dropping the sender wakes the lane, which flushes and exits.
        self.timer_tx = None;
        if let Some(lane) = self.lane.take() {
            if lane.join().is_err() {
                warn!("window-close lane panicked during shutdown");
            }
        }
        // Covers a lane that never started or died early; a no-op when the
        // lane already flushed.
        close_window(&self.shared, self.dispatch.as_ref());
    }

    /// Number of events currently buffered in the open window.
    pub fn buffered(&self) -> usize {
        lock(&self.shared).events.len()
    }
}

impl Drop for WindowAggregator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(shared: &Mutex<Buffer>) -> MutexGuard<'_, Buffer> {
    // The buffer holds plain data, so a poisoned lock is still usable.
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// The single close lane: waits out the pending deadline, closing the window
/// when it elapses without being superseded. At most one close is ever in
/// flight, which also makes dispatch order the chronological close order.
fn close_lane(
    shared: Arc<Mutex<Buffer>>,
    timer_rx: Receiver<TimerMsg>,
    dispatch: Arc<dyn WindowDispatch>,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        let msg = match deadline {
            Some(at) => timer_rx.recv_deadline(at),
            None => timer_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match msg {
            Ok(TimerMsg::Rearm(at)) => deadline = Some(at),
            Err(RecvTimeoutError::Timeout) => {
                deadline = None;
                close_window(&shared, dispatch.as_ref());
            }
            Err(RecvTimeoutError::Disconnected) => {
                // Shutdown: flush whatever is still buffered.
                close_window(&shared, dispatch.as_ref());
                return;
            }
        }
    }
}

/// Snapshot-and-clear under the lock, dispatch outside it. A timer firing
/// on an already-drained buffer is a no-op, and an event racing this close
/// either joins the snapshot or opens the next window.
fn close_window(shared: &Mutex<Buffer>, dispatch: &dyn WindowDispatch) {
    let snapshot = {
        let mut buf = lock(shared);
        if buf.events.is_empty() {
            return;
        }
        let events = std::mem::take(&mut buf.events);
        let opened_at = buf
            .opened_wall
            .take()
            .unwrap_or_else(|| events[0].received_at);
        buf.opened_mono = None;
        Window { events, opened_at }
    };
    debug!(window = %snapshot.id(), events = snapshot.len(), "window closed");
    dispatch.dispatch(snapshot);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect(Mutex<Vec<Window>>);

    impl Collect {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Vec::new())))
        }

        fn windows(&self) -> Vec<Window> {
            self.0.lock().unwrap().clone()
        }
    }

    impl WindowDispatch for Collect {
        fn dispatch(&self, window: Window) {
            self.0.lock().unwrap().push(window);
        }
    }

    fn event(label: &str) -> RawEvent {
        RawEvent::now(label, "{}", 1)
    }

    #[test]
    fn test_burst_lands_in_one_window() {
        let sink = Collect::new();
        let mut agg = WindowAggregator::new(
            Duration::from_millis(80),
            None,
            sink.clone() as Arc<dyn WindowDispatch>,
        );

        for label in ["a", "b", "c"] {
            agg.ingest(event(label));
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(200));

        let windows = sink.windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 3);
        assert!(windows[0].is_ambiguous());
        agg.shutdown();
        assert_eq!(sink.windows().len(), 1);
    }

    #[test]
    fn test_quiescence_gap_splits_windows() {
        let sink = Collect::new();
        let agg = WindowAggregator::new(
            Duration::from_millis(50),
            None,
            sink.clone() as Arc<dyn WindowDispatch>,
        );

        agg.ingest(event("a"));
        thread::sleep(Duration::from_millis(150));
        agg.ingest(event("b"));
        thread::sleep(Duration::from_millis(150));

        let windows = sink.windows();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].events[0].label, "a");
        assert_eq!(windows[1].events[0].label, "b");
        assert!(!windows[0].is_ambiguous());
    }

    #[test]
    fn test_shutdown_flushes_open_window() {
        let sink = Collect::new();
        let mut agg = WindowAggregator::new(
            Duration::from_secs(30),
            None,
            sink.clone() as Arc<dyn WindowDispatch>,
        );

        agg.ingest(event("a"));
        agg.ingest(event("b"));
        agg.shutdown();

        let windows = sink.windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 2);
    }

    #[test]
    fn test_shutdown_with_empty_buffer_dispatches_nothing() {
        let sink = Collect::new();
        let mut agg = WindowAggregator::new(
            Duration::from_millis(50),
            None,
            sink.clone() as Arc<dyn WindowDispatch>,
        );
        agg.shutdown();
        assert!(sink.windows().is_empty());
    }

    #[test]
    fn test_max_window_cap_closes_under_trickle() {
        let sink = Collect::new();
        let agg = WindowAggregator::new(
            Duration::from_millis(60),
            Some(Duration::from_millis(150)),
            sink.clone() as Arc<dyn WindowDispatch>,
        );

        // Arrivals every 40ms would extend a pure debounce window forever.
        for _ in 0..10 {
            agg.ingest(event("a"));
            thread::sleep(Duration::from_millis(40));
        }
        thread::sleep(Duration::from_millis(150));

        assert!(sink.windows().len() >= 2, "cap should have split the trickle");
        let total: usize = sink.windows().iter().map(Window::len).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_window_span_and_id() {
        let mut first = event("a");
        first.received_at = Utc::now();
        let mut last = event("b");
        last.received_at = first.received_at + chrono::Duration::milliseconds(250);

        let window = Window {
            opened_at: first.received_at,
            events: vec![first, last],
        };
        assert_eq!(window.span_ms(), 250);
        assert!(window.id().starts_with('W'));
    }
}
