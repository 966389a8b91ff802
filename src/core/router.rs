//! Routing of closed windows into emissions.
//!
//! One closed window in, zero or more emissions out: a singleton window
//! passes straight through; a multi-event window goes to the resolution
//! gateway and its verdict decides between one resolved record and one
//! flagged record per candidate. Every failure is contained here so the
//! aggregator stays live no matter what the gateway or sink does.

use crate::core::event::{EmissionRequest, RawEvent};
use crate::core::window::{Window, WindowDispatch};
use crate::resolver::{ResolutionGateway, ResolverError};
use crate::sink::{EventSink, SinkError};
use crate::telemetry::{Stage, Telemetry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// What to do with an ambiguous window when resolution fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log and drop the window; no emission, no retry.
    #[default]
    Drop,
    /// Fall back to the unresolved path: emit every candidate flagged
    /// ambiguous.
    EmitUnresolved,
}

/// A routing failure; always contained at the `dispatch` boundary.
#[derive(Debug)]
pub enum RouteError {
    /// The gateway claimed resolution but returned no usable activity label.
    MissingActivity,
    Resolver(ResolverError),
    Sink(SinkError),
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::MissingActivity => {
                write!(f, "positive verdict without a usable activity label")
            }
            RouteError::Resolver(e) => write!(f, "resolution failed: {e}"),
            RouteError::Sink(e) => write!(f, "emission failed: {e}"),
        }
    }
}

impl std::error::Error for RouteError {}

/// Classifies closed windows and drives resolution and emission.
///
/// No state is carried across windows; a failed window can never affect the
/// next one.
pub struct AmbiguityRouter {
    gateway: Arc<dyn ResolutionGateway>,
    sink: Arc<dyn EventSink>,
    telemetry: Arc<dyn Telemetry>,
    window_ms: u64,
    failure_policy: FailurePolicy,
}

impl AmbiguityRouter {
    pub fn new(
        gateway: Arc<dyn ResolutionGateway>,
        sink: Arc<dyn EventSink>,
        telemetry: Arc<dyn Telemetry>,
        window: Duration,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            gateway,
            sink,
            telemetry,
            window_ms: window.as_millis() as u64,
            failure_policy,
        }
    }

    fn route(&self, window: Window) -> Result<(), RouteError> {
        let window_id = window.id();
        let span_ms = window.span_ms();
        let events = window.events;

        if events.len() <= 1 {
            let Some(event) = events.into_iter().next() else {
                // The aggregator never hands out empty snapshots.
                return Ok(());
            };
            info!(window = %window_id, label = %event.label, "unambiguous window");
            // A singleton spends exactly the debounce period in the buffer.
            self.telemetry
                .record_latency(&window_id, Stage::WindowUnambiguous, self.window_ms);
            return self.emit(
                &window_id,
                EmissionRequest::Unambiguous(event),
                Stage::PublishUnambiguous,
            );
        }

        info!(
            window = %window_id,
            events = events.len(),
            first = %events[0].label,
            last = %events[events.len() - 1].label,
            "ambiguous window"
        );
        // Time the system could have reacted sooner had the later
        // candidates not arrived: first-to-last span plus the debounce.
        self.telemetry
            .record_latency(&window_id, Stage::WindowAmbiguous, span_ms + self.window_ms);

        let started = Instant::now();
        let outcome = self.gateway.resolve(&events);
        self.telemetry.record_latency(
            &window_id,
            Stage::Resolve,
            started.elapsed().as_millis() as u64,
        );

        match outcome {
            Ok(verdict) if verdict.resolved => match verdict.usable_activity() {
                Some(activity) => {
                    let activity = activity.to_string();
                    info!(window = %window_id, activity = %activity, "ambiguity resolved");
                    if let Some(confidence) = verdict.confidence {
                        self.telemetry
                            .record_confidence(&window_id, &activity, confidence);
                    }
                    self.emit(
                        &window_id,
                        EmissionRequest::Resolved {
                            activity,
                            source_events: events,
                        },
                        Stage::PublishResolved,
                    )
                }
                None => self.on_failure(&window_id, events, RouteError::MissingActivity),
            },
            Ok(_) => {
                info!(window = %window_id, "ambiguity not resolved, flagging candidates");
                self.emit(
                    &window_id,
                    EmissionRequest::Unresolved {
                        source_events: events,
                    },
                    Stage::PublishUnresolved,
                )
            }
            Err(e) => self.on_failure(&window_id, events, RouteError::Resolver(e)),
        }
    }

    /// Apply the configured failure policy to a window whose resolution
    /// failed.
    fn on_failure(
        &self,
        window_id: &str,
        events: Vec<RawEvent>,
        cause: RouteError,
    ) -> Result<(), RouteError> {
        match self.failure_policy {
            FailurePolicy::Drop => {
                self.telemetry.record_window_dropped(window_id);
                Err(cause)
            }
            FailurePolicy::EmitUnresolved => {
                warn!(window = window_id, "resolution failed ({cause}), emitting unresolved");
                self.emit(
                    window_id,
                    EmissionRequest::Unresolved {
                        source_events: events,
                    },
                    Stage::PublishUnresolved,
                )
            }
        }
    }

    fn emit(
        &self,
        window_id: &str,
        request: EmissionRequest,
        stage: Stage,
    ) -> Result<(), RouteError> {
        let records = request.record_count() as u64;
        let started = Instant::now();
        self.sink.emit(&request).map_err(RouteError::Sink)?;
        self.telemetry
            .record_latency(window_id, stage, started.elapsed().as_millis() as u64);
        self.telemetry.record_emission(records);
        Ok(())
    }
}

impl WindowDispatch for AmbiguityRouter {
    /// Sole entry point, called by the aggregator's close lane with a
    /// non-empty snapshot. Failures are logged, never propagated, so a
    /// router failure can never block or crash the aggregator.
    fn dispatch(&self, window: Window) {
        let window_id = window.id();
        if let Err(e) = self.route(window) {
            error!(window = %window_id, "window dropped: {e}");
        }
    }
}
