//! Event Triage - windowing and ambiguity routing for process-event streams.
//!
//! Independent sensing sources can report the same real-world activity as
//! several near-simultaneous process-lifecycle events. This crate coalesces
//! such bursts into debounce windows, classifies each closed window as
//! unambiguous or ambiguous, drives an external resolution step for the
//! ambiguous ones, and maps the outcome deterministically onto clean output
//! records.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Event Triage                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────────┐   ┌─────────────────┐      │
//! │  │  Source  │──▶│   Window     │──▶│   Ambiguity     │      │
//! │  │ (filter) │   │  Aggregator  │   │    Router       │      │
//! │  └──────────┘   │  (debounce)  │   └────────┬────────┘      │
//! │                 └──────────────┘      │     │               │
//! │                                       ▼     ▼               │
//! │                             ┌───────────┐ ┌──────────┐      │
//! │                             │ Resolution│ │  Event   │      │
//! │                             │  Gateway  │ │  Sink    │      │
//! │                             └───────────┘ └──────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The aggregator closes a window only after `window_ms` of quiescence, so
//! every arrival extends the same window. A closed window with one event is
//! emitted as-is; with several events the blocking resolution gateway is
//! consulted, and the verdict decides between one resolved record and one
//! flagged record per candidate.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use event_triage::core::{AmbiguityRouter, FailurePolicy, RawEvent, WindowAggregator};
//! use event_triage::resolver::CommandResolver;
//! use event_triage::sink::JsonlSink;
//! use event_triage::telemetry::NoopTelemetry;
//!
//! let router = Arc::new(AmbiguityRouter::new(
//!     Arc::new(CommandResolver::new("/opt/triage/resolve.sh")),
//!     Arc::new(JsonlSink::new("records.jsonl")),
//!     Arc::new(NoopTelemetry),
//!     Duration::from_millis(1000),
//!     FailurePolicy::Drop,
//! ));
//! let mut aggregator = WindowAggregator::new(Duration::from_millis(1000), None, router);
//!
//! aggregator.ingest(RawEvent::now("pick", "{}", 1));
//! aggregator.shutdown();
//! ```

pub mod config;
pub mod core;
pub mod resolver;
pub mod sink;
pub mod source;
pub mod telemetry;

#[cfg(feature = "gateway")]
pub mod gateway;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, ResolverConfig};
pub use core::{
    AmbiguityRouter, EmissionRequest, FailurePolicy, OutputRecord, RawEvent, ResolutionVerdict,
    Window, WindowAggregator, WindowDispatch,
};
pub use resolver::{CommandResolver, NoResolver, ResolutionGateway, ResolverError};
pub use sink::{EventSink, JsonlSink, SinkError};
pub use source::{LifecycleFilter, TransportMessage};
pub use telemetry::{NoopTelemetry, SharedTriageLog, Stage, Telemetry, TriageLog, TriageStats};

// Gateway re-exports (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::{BlockingResolverClient, GatewayConfig, HttpResolverClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
