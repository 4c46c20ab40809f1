//! # Pipeline Events
//!
//! Typed event catalog for one materialization run plus the in-process bus
//! that decouples the orchestrator from metrics and logging observers.
//! Delivery is synchronous and in registration order; a failing listener is
//! isolated so the remaining listeners still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::models::{BuildResult, DeploymentResult, ProjectStructure};

/// Events emitted over one run, all carrying the run's correlation id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Emitted by the (out-of-scope) brief-generation flow
    ProjectCrystallized {
        project_id: String,
        correlation_id: String,
        structure: ProjectStructure,
    },
    ScaffoldingComplete {
        project_id: String,
        correlation_id: String,
        template_id: Option<String>,
    },
    FeatureImplemented {
        project_id: String,
        correlation_id: String,
        feature_id: String,
        params: Option<serde_json::Value>,
    },
    FilesWritten {
        project_id: String,
        correlation_id: String,
        files_created: usize,
    },
    BuildVerified {
        project_id: String,
        correlation_id: String,
        result: BuildResult,
    },
    DeploymentComplete {
        project_id: String,
        correlation_id: String,
        result: DeploymentResult,
    },
    MaterializationComplete {
        project_id: String,
        correlation_id: String,
        success: bool,
        files_created: usize,
        deploy_url: Option<String>,
    },
    RunFailed {
        project_id: String,
        correlation_id: String,
        step: String,
        error: String,
    },
}

/// Subscription key for one event name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProjectCrystallized,
    ScaffoldingComplete,
    FeatureImplemented,
    FilesWritten,
    BuildVerified,
    DeploymentComplete,
    MaterializationComplete,
    RunFailed,
}

impl PipelineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ProjectCrystallized { .. } => EventKind::ProjectCrystallized,
            Self::ScaffoldingComplete { .. } => EventKind::ScaffoldingComplete,
            Self::FeatureImplemented { .. } => EventKind::FeatureImplemented,
            Self::FilesWritten { .. } => EventKind::FilesWritten,
            Self::BuildVerified { .. } => EventKind::BuildVerified,
            Self::DeploymentComplete { .. } => EventKind::DeploymentComplete,
            Self::MaterializationComplete { .. } => EventKind::MaterializationComplete,
            Self::RunFailed { .. } => EventKind::RunFailed,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::ProjectCrystallized { correlation_id, .. }
            | Self::ScaffoldingComplete { correlation_id, .. }
            | Self::FeatureImplemented { correlation_id, .. }
            | Self::FilesWritten { correlation_id, .. }
            | Self::BuildVerified { correlation_id, .. }
            | Self::DeploymentComplete { correlation_id, .. }
            | Self::MaterializationComplete { correlation_id, .. }
            | Self::RunFailed { correlation_id, .. } => correlation_id,
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            Self::ProjectCrystallized { project_id, .. }
            | Self::ScaffoldingComplete { project_id, .. }
            | Self::FeatureImplemented { project_id, .. }
            | Self::FilesWritten { project_id, .. }
            | Self::BuildVerified { project_id, .. }
            | Self::DeploymentComplete { project_id, .. }
            | Self::MaterializationComplete { project_id, .. }
            | Self::RunFailed { project_id, .. } => project_id,
        }
    }
}

type Listener = Box<dyn Fn(&PipelineEvent) -> anyhow::Result<()> + Send + Sync>;

/// In-process publish/subscribe channel.
///
/// No buffering, no cross-process delivery, no persistence: `emit` returns
/// after every currently-registered listener has run. The materializer is
/// publisher only and never depends on listener side effects.
#[derive(Default)]
pub struct EventBus {
    by_kind: Mutex<HashMap<EventKind, Vec<Listener>>>,
    all: Mutex<Vec<Listener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event name
    pub fn subscribe<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&PipelineEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut by_kind = match self.by_kind.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        by_kind.entry(kind).or_default().push(Box::new(listener));
    }

    /// Subscribe to every event (streaming observers, loggers)
    pub fn subscribe_all<F>(&self, listener: F)
    where
        F: Fn(&PipelineEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut all = match self.all.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        all.push(Box::new(listener));
    }

    /// Forward every event into an mpsc channel; events are dropped (not
    /// blocked on) when the receiver lags.
    pub fn forward_to_channel(&self, tx: tokio::sync::mpsc::Sender<PipelineEvent>) {
        self.subscribe_all(move |event| {
            let _ = tx.try_send(event.clone());
            Ok(())
        });
    }

    /// Deliver an event synchronously to all registered listeners.
    pub fn emit(&self, event: &PipelineEvent) {
        tracing::debug!(
            event = ?event.kind(),
            project_id = event.project_id(),
            correlation_id = event.correlation_id(),
            "emitting pipeline event"
        );

        {
            let by_kind = match self.by_kind.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(listeners) = by_kind.get(&event.kind()) {
                for listener in listeners {
                    Self::deliver(listener, event);
                }
            }
        }

        let all = match self.all.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for listener in all.iter() {
            Self::deliver(listener, event);
        }
    }

    // Each listener runs independently; an error or panic in one must not
    // starve the others of the same emit.
    fn deliver(listener: &Listener, event: &PipelineEvent) {
        match catch_unwind(AssertUnwindSafe(|| listener(event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(event = ?event.kind(), error = %e, "event listener failed");
            }
            Err(_) => {
                tracing::warn!(event = ?event.kind(), "event listener panicked");
            }
        }
    }
}

/// Generate a per-run correlation id: unique, opaque, never reused.
pub fn correlation_id() -> String {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    let a = RandomState::new().build_hasher().finish();
    let b = RandomState::new().build_hasher().finish();
    format!("{:x}-{:x}-{:x}", nanos, a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn files_written(n: usize) -> PipelineEvent {
        PipelineEvent::FilesWritten {
            project_id: "p-1".to_string(),
            correlation_id: "corr".to_string(),
            files_created: n,
        }
    }

    #[test]
    fn test_delivery_is_synchronous_and_keyed() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::FilesWritten, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::RunFailed, move |_| {
            counter.fetch_add(100, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(&files_written(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_listener_does_not_starve_others() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventKind::FilesWritten, |_| anyhow::bail!("listener bug"));
        bus.subscribe(EventKind::FilesWritten, |_| panic!("listener panic"));
        let counter = Arc::clone(&hits);
        bus.subscribe(EventKind::FilesWritten, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(&files_written(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_all_sees_every_kind() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        bus.subscribe_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(&files_written(1));
        bus.emit(&PipelineEvent::RunFailed {
            project_id: "p-1".to_string(),
            correlation_id: "corr".to_string(),
            step: "file_write".to_string(),
            error: "boom".to_string(),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_forward_to_channel() {
        let bus = EventBus::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        bus.forward_to_channel(tx);

        bus.emit(&files_written(3));

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            PipelineEvent::FilesWritten { files_created: 3, .. }
        ));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = correlation_id();
        let b = correlation_id();
        assert_ne!(a, b);
        assert!(a.contains('-'));
    }

    #[test]
    fn test_event_serialization_tags() {
        let json = serde_json::to_string(&files_written(2)).unwrap();
        assert!(json.contains("\"event\":\"files_written\""));
        assert!(json.contains("\"files_created\":2"));
    }
}
