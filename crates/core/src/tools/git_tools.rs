//! # Git Tools
//!
//! Best-effort version control for materialized projects. Commits go through
//! libgit2; push shells out to the git CLI (the one operation git2 makes
//! painful with credentials) and is gated by the execution policy.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use git2::{IndexAddOption, Repository, Signature};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use super::file_tools::sandboxed_join;
use super::registry::{parse_args, schema_for, Tool, ToolDefinition, ToolError};

pub const GIT_COMMIT: &str = "git_commit";

/// Arguments for committing a project's working tree
#[derive(Deserialize, JsonSchema)]
pub struct GitCommitArgs {
    pub project_id: String,
    /// Commit message (includes the mode and a correlation-id fragment)
    pub message: String,
}

/// Stage everything and commit. "Nothing to commit" is success, not failure.
pub struct GitCommitTool {
    sandbox_root: PathBuf,
    allow_push: bool,
}

impl GitCommitTool {
    pub fn new(sandbox_root: impl Into<PathBuf>, allow_push: bool) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            allow_push,
        }
    }

    fn commit(&self, project_id: &str, message: &str) -> Result<Option<String>> {
        let project_dir = sandboxed_join(&self.sandbox_root, project_id)?;

        let repo = match Repository::open(&project_dir) {
            Ok(repo) => repo,
            Err(_) => Repository::init(&project_dir)
                .with_context(|| format!("Failed to init repository at {:?}", project_dir))?,
        };

        let mut status_options = git2::StatusOptions::new();
        status_options.include_untracked(true);
        let statuses = repo
            .statuses(Some(&mut status_options))
            .context("Failed to read repository status")?;
        if statuses.is_empty() {
            return Ok(None);
        }

        let mut index = repo.index().context("Failed to open index")?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .context("Failed to stage changes")?;
        index.write().context("Failed to write index")?;

        let tree_id = index.write_tree().context("Failed to write tree")?;
        let tree = repo.find_tree(tree_id).context("Failed to find tree")?;
        let signature =
            Signature::now("WADI Forge", "forge@wadi.app").context("Failed to build signature")?;

        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();

        let commit_id = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .context("Failed to commit")?;

        if self.allow_push {
            // Best-effort; a project without a remote is not an error.
            let output = Command::new("git")
                .args(["push", "origin", "HEAD"])
                .current_dir(&project_dir)
                .output();
            match output {
                Ok(out) if !out.status.success() => {
                    tracing::warn!(
                        project_id = %project_id,
                        stderr = %String::from_utf8_lossy(&out.stderr),
                        "git push failed"
                    );
                }
                Err(e) => tracing::warn!(project_id = %project_id, error = %e, "git push failed"),
                _ => {}
            }
        }

        Ok(Some(commit_id.to_string()))
    }
}

#[async_trait]
impl Tool for GitCommitTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: GIT_COMMIT.to_string(),
            description: "Stage and commit the project working tree. Nothing to commit is success."
                .to_string(),
            parameters: schema_for::<GitCommitArgs>(),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: GitCommitArgs = parse_args(GIT_COMMIT, args)?;

        let outcome = self
            .commit(&args.project_id, &args.message)
            .map_err(|e| ToolError::Failed {
                tool: GIT_COMMIT.to_string(),
                source: e,
            })?;

        Ok(match outcome {
            Some(commit_id) => json!({ "committed": true, "commit_id": commit_id }),
            None => json!({ "committed": false, "note": "nothing to commit" }),
        })
    }
}
