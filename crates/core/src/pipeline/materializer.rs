//! # Materializer
//!
//! The orchestrator that turns a project structure into scaffolded files, a
//! verified build, and an optional deploy. One `materialize()` call is one
//! sequential run: every tool call is awaited in order because the tools
//! share the project's file tree.
//!
//! The materializer is the error boundary for a run — tool failures end in a
//! structured `BlueprintResult { success: false }` plus a best-effort Run
//! record and a `RunFailed` event, never an error to the caller.

use std::sync::Arc;

use serde_json::json;

use super::events::{correlation_id, EventBus, PipelineEvent};
use crate::models::{BlueprintResult, BuildResult, BuildStatus, DeployProvider, DeploymentResult, ProjectStructure};
use crate::policy::ExecutionPolicy;
use crate::state::{ProjectManager, RunManager, RunStatus, WadiDb};
use crate::tools::{
    build_tools::VALIDATE_BUILD, deploy_tools::DEPLOY_PROJECT, file_tools::WRITE_FILE,
    git_tools::GIT_COMMIT, scaffold_tools::IMPLEMENT_FEATURE,
    scaffold_tools::INITIALIZE_SCAFFOLDING, ToolRegistry,
};

/// Options for one materialization attempt
#[derive(Debug, Clone, Default)]
pub struct MaterializeOptions {
    /// Return the blueprint without invoking any side-effecting tool
    pub dry_run: bool,
    /// Bypass the stored structure (testing, previews of unsaved briefs)
    pub override_structure: Option<ProjectStructure>,
}

/// A pipeline failure, labeled with the step that raised it
#[derive(Debug, thiserror::Error)]
#[error("step '{step}' failed: {source}")]
struct StepError {
    step: &'static str,
    #[source]
    source: anyhow::Error,
}

impl StepError {
    fn new(step: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

enum RunOutcome {
    Preview {
        blueprint: Vec<String>,
    },
    Materialized {
        files_created: usize,
        deploy_url: Option<String>,
        template_id: Option<String>,
        features: Vec<String>,
    },
}

/// The materialization orchestrator.
pub struct MaterializerService {
    db: Arc<WadiDb>,
    registry: Arc<ToolRegistry>,
    bus: Arc<EventBus>,
    policy: ExecutionPolicy,
}

impl MaterializerService {
    pub fn new(
        db: Arc<WadiDb>,
        registry: Arc<ToolRegistry>,
        bus: Arc<EventBus>,
        policy: ExecutionPolicy,
    ) -> Self {
        Self {
            db,
            registry,
            bus,
            policy,
        }
    }

    /// Materialize a project.
    ///
    /// The in-progress check is a best-effort single-flight guard: a race
    /// window exists between the check and the run insert, which is accepted
    /// for this domain. The check fails open — if it cannot be answered the
    /// run proceeds.
    #[tracing::instrument(skip(self, options), fields(project_id = %project_id, mode = self.policy.mode().as_str()))]
    pub async fn materialize(&self, project_id: &str, options: MaterializeOptions) -> BlueprintResult {
        let correlation_id = correlation_id();
        let runs = RunManager::new(&self.db);

        // Idempotency guard: at most one in-progress run per project.
        match runs.has_in_progress(project_id) {
            Ok(true) => {
                tracing::info!(
                    "{} materialization already in progress, skipping",
                    self.policy.profile().log_prefix
                );
                return BlueprintResult::failure(correlation_id);
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "idempotency check failed, proceeding");
            }
        }

        let step_name = if self.policy.is_safe_mode() {
            "SAFE_PREVIEW"
        } else if options.dry_run {
            "PREVIEW_BLUEPRINT"
        } else {
            "MATERIALIZATION"
        };

        // Run persistence is an observability aid, not a correctness gate.
        let run_id = match runs.start_run(project_id, step_name, &correlation_id) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist run record");
                None
            }
        };

        match self.run_pipeline(project_id, &correlation_id, options).await {
            Ok(RunOutcome::Preview { blueprint }) => {
                if let Some(id) = run_id {
                    let logs = json!({ "preview": true, "declared_files": blueprint.len() });
                    if let Err(e) = runs.end_run(id, RunStatus::Success, Some(&logs), None) {
                        tracing::warn!(error = %e, "failed to finalize run record");
                    }
                }
                self.bus.emit(&PipelineEvent::MaterializationComplete {
                    project_id: project_id.to_string(),
                    correlation_id: correlation_id.clone(),
                    success: true,
                    files_created: 0,
                    deploy_url: None,
                });
                BlueprintResult {
                    success: true,
                    files_created: 0,
                    blueprint: Some(blueprint),
                    deploy_url: None,
                    correlation_id,
                }
            }
            Ok(RunOutcome::Materialized {
                files_created,
                deploy_url,
                template_id,
                features,
            }) => {
                if let Some(id) = run_id {
                    let logs = json!({
                        "files_created": files_created,
                        "template_id": template_id,
                        "features": features,
                        "deploy_url": deploy_url,
                    });
                    if let Err(e) = runs.end_run(id, RunStatus::Success, Some(&logs), None) {
                        tracing::warn!(error = %e, "failed to finalize run record");
                    }
                }
                self.bus.emit(&PipelineEvent::MaterializationComplete {
                    project_id: project_id.to_string(),
                    correlation_id: correlation_id.clone(),
                    success: true,
                    files_created,
                    deploy_url: deploy_url.clone(),
                });
                BlueprintResult {
                    success: true,
                    files_created,
                    blueprint: None,
                    deploy_url,
                    correlation_id,
                }
            }
            Err(err) => {
                tracing::error!(step = err.step, error = %err.source, "materialization failed");
                if let Some(id) = run_id {
                    if let Err(e) =
                        runs.end_run(id, RunStatus::Failed, None, Some(&err.source.to_string()))
                    {
                        tracing::warn!(error = %e, "failed to finalize run record");
                    }
                }
                self.bus.emit(&PipelineEvent::RunFailed {
                    project_id: project_id.to_string(),
                    correlation_id: correlation_id.clone(),
                    step: err.step.to_string(),
                    error: err.source.to_string(),
                });
                BlueprintResult::failure(correlation_id)
            }
        }
    }

    async fn run_pipeline(
        &self,
        project_id: &str,
        correlation_id: &str,
        options: MaterializeOptions,
    ) -> Result<RunOutcome, StepError> {
        // Structure resolution: override wins, else the stored blob.
        let structure = match options.override_structure {
            Some(structure) => structure,
            None => ProjectManager::new(&self.db)
                .load_structure(project_id)
                .map_err(|e| StepError::new("structure_resolution", e))?
                .ok_or_else(|| {
                    StepError::new(
                        "structure_resolution",
                        anyhow::anyhow!("no structure found for project '{}'", project_id),
                    )
                })?,
        };

        // Preview short-circuit: SAFE mode and dry runs never reach a
        // side-effecting tool.
        if options.dry_run || self.policy.is_safe_mode() {
            tracing::info!(
                "{} returning blueprint preview ({} files)",
                self.policy.profile().log_prefix,
                structure.files.len()
            );
            return Ok(RunOutcome::Preview {
                blueprint: structure.file_paths(),
            });
        }

        // Scaffolding
        if let Some(template_id) = &structure.template_id {
            self.registry
                .call_tool(
                    INITIALIZE_SCAFFOLDING,
                    json!({ "project_id": project_id, "template_id": template_id }),
                )
                .await
                .map_err(|e| StepError::new("scaffolding", e))?;
            self.bus.emit(&PipelineEvent::ScaffoldingComplete {
                project_id: project_id.to_string(),
                correlation_id: correlation_id.to_string(),
                template_id: Some(template_id.clone()),
            });
        }

        // Feature implementation, in declared order; the tools write to a
        // shared file tree and must not race.
        for feature in &structure.features {
            self.registry
                .call_tool(
                    IMPLEMENT_FEATURE,
                    json!({
                        "project_id": project_id,
                        "feature_id": feature.id,
                        "params": feature.params,
                    }),
                )
                .await
                .map_err(|e| StepError::new("feature_implementation", e))?;
            self.bus.emit(&PipelineEvent::FeatureImplemented {
                project_id: project_id.to_string(),
                correlation_id: correlation_id.to_string(),
                feature_id: feature.id.clone(),
                params: feature.params.clone(),
            });
        }

        // Safety limit: only explicit files[] entries count against the cap;
        // scaffolding and feature writes above do not.
        let max_files = self.policy.profile().max_files_per_project;
        if structure.files.len() > max_files {
            return Err(StepError::new(
                "safety_limit",
                anyhow::anyhow!(
                    "safety limit exceeded: {} files declared, mode allows {}",
                    structure.files.len(),
                    max_files
                ),
            ));
        }

        // File writing
        let mut files_created = 0usize;
        for file in &structure.files {
            self.registry
                .call_tool(
                    WRITE_FILE,
                    json!({
                        "path": format!("{}/{}", project_id, file.path),
                        "content": file.content,
                    }),
                )
                .await
                .map_err(|e| StepError::new("file_write", e))?;
            files_created += 1;
        }
        self.bus.emit(&PipelineEvent::FilesWritten {
            project_id: project_id.to_string(),
            correlation_id: correlation_id.to_string(),
            files_created,
        });

        // Build verification: a tool failure downgrades to WARN, it never
        // aborts the run.
        let build_result = match self
            .registry
            .call_tool(VALIDATE_BUILD, json!({ "project_id": project_id }))
            .await
        {
            Ok(value) => serde_json::from_value::<BuildResult>(value).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "build result did not parse, downgrading to WARN");
                BuildResult {
                    status: BuildStatus::Warn,
                    reason: None,
                    details: Some(e.to_string()),
                }
            }),
            Err(e) => {
                tracing::warn!(error = %e, "build verification failed, downgrading to WARN");
                BuildResult {
                    status: BuildStatus::Warn,
                    reason: None,
                    details: Some(e.to_string()),
                }
            }
        };
        self.bus.emit(&PipelineEvent::BuildVerified {
            project_id: project_id.to_string(),
            correlation_id: correlation_id.to_string(),
            result: build_result.clone(),
        });

        // Conditional deploy
        let mut deploy_url = None;
        if structure.should_deploy {
            let provider = structure.deploy_provider.unwrap_or(DeployProvider::Render);
            if build_result.status == BuildStatus::Error && self.policy.block_deploy_on_build_error()
            {
                tracing::warn!(
                    provider = provider.as_str(),
                    "skipping deploy: build classified as ERROR"
                );
            } else if !self.policy.is_deploy_allowed(provider) {
                tracing::info!(
                    provider = provider.as_str(),
                    "skipping deploy: not permitted by execution policy"
                );
            } else {
                // Deploy failures are recorded in the result, not thrown.
                let result = match self
                    .registry
                    .call_tool(
                        DEPLOY_PROJECT,
                        json!({ "project_id": project_id, "provider": provider }),
                    )
                    .await
                {
                    Ok(value) => {
                        serde_json::from_value::<DeploymentResult>(value).unwrap_or_else(|e| {
                            DeploymentResult {
                                success: false,
                                url: None,
                                provider,
                                error: Some(format!("deploy result did not parse: {}", e)),
                                degraded: false,
                            }
                        })
                    }
                    Err(e) => DeploymentResult {
                        success: false,
                        url: None,
                        provider,
                        error: Some(e.to_string()),
                        degraded: false,
                    },
                };
                if result.success {
                    deploy_url = result.url.clone();
                }
                self.bus.emit(&PipelineEvent::DeploymentComplete {
                    project_id: project_id.to_string(),
                    correlation_id: correlation_id.to_string(),
                    result,
                });
            }
        }

        // Conditional git commit, best-effort.
        if self.policy.profile().allow_git_commit {
            let short: String = correlation_id.chars().take(8).collect();
            let message = format!(
                "wadi: materialize {} [{}/{}]",
                structure.name,
                self.policy.mode().as_str(),
                short
            );
            if let Err(e) = self
                .registry
                .call_tool(
                    GIT_COMMIT,
                    json!({ "project_id": project_id, "message": message }),
                )
                .await
            {
                tracing::warn!(error = %e, "git commit failed, continuing");
            }
        }

        Ok(RunOutcome::Materialized {
            files_created,
            deploy_url,
            template_id: structure.template_id.clone(),
            features: structure.features.iter().map(|f| f.id.clone()).collect(),
        })
    }
}
