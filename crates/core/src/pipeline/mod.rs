//! # Materialization Pipeline
//!
//! Orchestration of one run: the materializer state machine, the event
//! catalog/bus it publishes on, and the metrics observer.

pub mod events;
pub mod materializer;
pub mod metrics;

pub use events::{correlation_id, EventBus, EventKind, PipelineEvent};
pub use materializer::{MaterializeOptions, MaterializerService};
pub use metrics::MetricsService;
