//! # Metrics
//!
//! Passive EventBus subscriber deriving aggregate counters and persisting
//! metric rows. Strictly non-critical: nothing in here may throw into the
//! emitting caller's stack, so persistence failures are logged and swallowed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::events::{EventBus, EventKind, PipelineEvent};
use crate::models::BuildStatus;
use crate::state::WadiDb;

#[derive(Default)]
struct MetricsInner {
    build_statuses: HashMap<BuildStatus, u64>,
    deploy_attempts: u64,
    deploy_failures: u64,
    /// Scaffolding start instants keyed by correlation id. Absent for
    /// dry-run/SAFE runs, so those runs have no duration.
    scaffold_started: HashMap<String, Instant>,
}

/// Aggregated observability over materialization runs.
pub struct MetricsService {
    db: Arc<WadiDb>,
    inner: Mutex<MetricsInner>,
}

impl MetricsService {
    pub fn new(db: Arc<WadiDb>) -> Arc<Self> {
        Arc::new(Self {
            db,
            inner: Mutex::new(MetricsInner::default()),
        })
    }

    /// Subscribe to the bus. Call once per service instance.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) {
        let service = Arc::clone(self);
        bus.subscribe(EventKind::BuildVerified, move |event| {
            if let PipelineEvent::BuildVerified { result, .. } = event {
                service.record_build_status(result.status);
            }
            Ok(())
        });

        let service = Arc::clone(self);
        bus.subscribe(EventKind::ScaffoldingComplete, move |event| {
            if let PipelineEvent::ScaffoldingComplete { correlation_id, .. } = event {
                service.record_scaffold_start(correlation_id);
            }
            Ok(())
        });

        let service = Arc::clone(self);
        bus.subscribe(EventKind::DeploymentComplete, move |event| {
            if let PipelineEvent::DeploymentComplete {
                project_id, result, ..
            } = event
            {
                service.record_deployment(project_id, result.provider.as_str(), result.success, result.error.as_deref());
            }
            Ok(())
        });

        let service = Arc::clone(self);
        bus.subscribe(EventKind::MaterializationComplete, move |event| {
            if let PipelineEvent::MaterializationComplete {
                project_id,
                correlation_id,
                success,
                files_created,
                ..
            } = event
            {
                service.record_run_complete(project_id, correlation_id, *success, *files_created);
            }
            Ok(())
        });
    }

    /// Deploy failure rate as a percentage; 0 with no attempts yet.
    pub fn deploy_failure_rate(&self) -> f64 {
        let inner = self.lock();
        if inner.deploy_attempts == 0 {
            return 0.0;
        }
        (inner.deploy_failures as f64 / inner.deploy_attempts as f64) * 100.0
    }

    pub fn deploy_attempts(&self) -> u64 {
        self.lock().deploy_attempts
    }

    /// Snapshot of the build-status histogram
    pub fn build_status_snapshot(&self) -> HashMap<BuildStatus, u64> {
        self.lock().build_statuses.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record_build_status(&self, status: BuildStatus) {
        *self.lock().build_statuses.entry(status).or_insert(0) += 1;
    }

    fn record_scaffold_start(&self, correlation_id: &str) {
        self.lock()
            .scaffold_started
            .insert(correlation_id.to_string(), Instant::now());
    }

    fn record_deployment(
        &self,
        project_id: &str,
        provider: &str,
        success: bool,
        error: Option<&str>,
    ) {
        {
            let mut inner = self.lock();
            inner.deploy_attempts += 1;
            if !success {
                inner.deploy_failures += 1;
            }
        }
        if let Err(e) = self
            .db
            .insert_deploy_metric(project_id, provider, success, error)
        {
            tracing::warn!(error = %e, "failed to persist deploy metric");
        }
    }

    fn record_run_complete(
        &self,
        project_id: &str,
        correlation_id: &str,
        success: bool,
        files_created: usize,
    ) {
        let duration_ms = self
            .lock()
            .scaffold_started
            .remove(correlation_id)
            .map(|started| started.elapsed().as_millis() as i64);

        if let Err(e) = self.db.insert_run_metric(
            project_id,
            correlation_id,
            success,
            files_created,
            duration_ms,
        ) {
            tracing::warn!(error = %e, "failed to persist run metric");
        }
    }
}
