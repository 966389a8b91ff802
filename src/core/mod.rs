//! Core triage engine.
//!
//! This module contains:
//! - The event/window/verdict/emission data model
//! - Debounce window aggregation with a dedicated close lane
//! - Ambiguity routing of closed windows into emissions

pub mod event;
pub mod router;
pub mod window;

// Re-export commonly used types
pub use event::{EmissionRequest, OutputRecord, RawEvent, ResolutionVerdict};
pub use router::{AmbiguityRouter, FailurePolicy, RouteError};
pub use window::{Window, WindowAggregator, WindowDispatch};
