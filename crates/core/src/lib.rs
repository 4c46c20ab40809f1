//! # WADI Core
//!
//! The "Forge" of the WADI system - the materialization pipeline that turns
//! an LLM-authored project structure into scaffolded files, a verified build,
//! and an optional deploy.
//!
//! ## Architecture
//!
//! - `pipeline/` - the materializer state machine, event bus, and metrics
//! - `tools/` - side-effecting operations behind the tool registry
//! - `state/` - SQLite persistence for projects, runs, and metric rows
//! - `policy` - SAFE/STANDARD/FULL execution gating, injected per instance
//! - `resilience` - circuit breakers around external providers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wadi_core::{EventBus, ExecutionPolicy, MaterializeOptions, MaterializerService, ToolRegistry, WadiDb};
//!
//! let db = Arc::new(WadiDb::open()?);
//! let registry = Arc::new(ToolRegistry::new());
//! let bus = Arc::new(EventBus::new());
//! let policy = ExecutionPolicy::from_env();
//! let materializer = MaterializerService::new(db, registry, bus, policy);
//! let result = materializer.materialize("p-1", MaterializeOptions::default()).await;
//! ```

pub mod models;
pub mod pipeline;
pub mod policy;
pub mod resilience;
pub mod state;
pub mod tools;

pub use models::{
    BlueprintResult, BuildFailureReason, BuildResult, BuildStatus, DeployProvider,
    DeploymentResult, FeatureRequest, ProjectFile, ProjectStructure,
};
pub use pipeline::{
    correlation_id, EventBus, EventKind, MaterializeOptions, MaterializerService, MetricsService,
    PipelineEvent,
};
pub use policy::{ExecutionMode, ExecutionPolicy, ModeProfile};
pub use resilience::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use state::{ProjectManager, Run, RunManager, RunStatus, WadiDb};
pub use tools::{register_standard_tools, FaultInjection, FaultKind, Tool, ToolDefinition, ToolError, ToolRegistry};
