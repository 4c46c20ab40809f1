//! # Build Tools
//!
//! Build verification for materialized projects. Runs an allow-listed build
//! command and classifies the captured output with ordered predicates — no
//! structured compiler API is assumed, so classification is deliberately
//! substring-based.

use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::file_tools::sandboxed_join;
use super::registry::{parse_args, schema_for, Tool, ToolDefinition, ToolError};
use crate::models::{BuildFailureReason, BuildResult, BuildStatus};

pub const VALIDATE_BUILD: &str = "validate_build";

/// Allowed build commands whitelist
const ALLOWED_BUILD_COMMANDS: &[&str] = &[
    "npm run build",
    "npm test",
    "npm install",
    "npx tsc --noEmit",
    "yarn build",
];

const DEFAULT_BUILD_COMMAND: &str = "npm run build";

/// Markers that indicate missing dependencies
const DEPENDENCY_MARKERS: &[&str] = &[
    "Cannot find module",
    "Module not found",
    "ERESOLVE",
    "npm ERR! missing",
];

fn has_typescript_errors(output: &str) -> bool {
    if let Ok(re) = Regex::new(r"error TS\d+") {
        re.is_match(output)
    } else {
        output.contains("error TS")
    }
}

/// Classify captured build output.
///
/// Precedence is fixed: TypeScript errors win even when dependency markers
/// are also present; unclassifiable failures are RISK; success is OK.
pub fn classify_build_output(success: bool, stdout: &str, stderr: &str) -> BuildResult {
    let combined = format!("{}\n{}", stdout, stderr);

    if has_typescript_errors(&combined) {
        return BuildResult {
            status: BuildStatus::Error,
            reason: Some(BuildFailureReason::TypescriptErrors),
            details: Some(truncate(&combined)),
        };
    }

    if DEPENDENCY_MARKERS.iter().any(|m| combined.contains(m)) {
        return BuildResult {
            status: BuildStatus::Warn,
            reason: Some(BuildFailureReason::DependenciesMissing),
            details: Some(truncate(&combined)),
        };
    }

    if !success {
        return BuildResult {
            status: BuildStatus::Risk,
            reason: Some(BuildFailureReason::TestsFailed),
            details: Some(truncate(&combined)),
        };
    }

    BuildResult::ok()
}

fn truncate(output: &str) -> String {
    const MAX: usize = 2_000;
    if output.len() <= MAX {
        output.trim().to_string()
    } else {
        let mut end = MAX;
        while !output.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &output[..end])
    }
}

/// Arguments for build validation
#[derive(Deserialize, JsonSchema)]
pub struct ValidateBuildArgs {
    pub project_id: String,
    /// Build command; must be on the allow-list
    #[serde(default)]
    pub command: Option<String>,
}

/// Run an allow-listed build command in the project sandbox and classify
/// the result.
pub struct ValidateBuildTool {
    sandbox_root: PathBuf,
}

impl ValidateBuildTool {
    pub fn new(sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
        }
    }

    fn run(&self, project_id: &str, command: &str) -> Result<BuildResult> {
        if !ALLOWED_BUILD_COMMANDS.contains(&command) {
            anyhow::bail!(
                "Build command '{}' is not allowed. Allowed: {:?}",
                command,
                ALLOWED_BUILD_COMMANDS
            );
        }

        let project_dir = sandboxed_join(&self.sandbox_root, project_id)?;

        let mut parts = command.split_whitespace();
        let program = parts.next().context("Empty build command")?;
        let args: Vec<&str> = parts.collect();

        let output = Command::new(program)
            .args(&args)
            .current_dir(&project_dir)
            .output()
            .with_context(|| format!("Failed to run build command '{}'", command))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        Ok(classify_build_output(
            output.status.success(),
            &stdout,
            &stderr,
        ))
    }
}

#[async_trait]
impl Tool for ValidateBuildTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: VALIDATE_BUILD.to_string(),
            description:
                "Run the project's build command and classify the outcome as OK/WARN/ERROR/RISK."
                    .to_string(),
            parameters: schema_for::<ValidateBuildArgs>(),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: ValidateBuildArgs = parse_args(VALIDATE_BUILD, args)?;
        let command = args.command.as_deref().unwrap_or(DEFAULT_BUILD_COMMAND);

        let result = self
            .run(&args.project_id, command)
            .map_err(|e| ToolError::Failed {
                tool: VALIDATE_BUILD.to_string(),
                source: e,
            })?;

        serde_json::to_value(&result).map_err(|e| ToolError::Failed {
            tool: VALIDATE_BUILD.to_string(),
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typescript_errors_classify_as_error() {
        let result = classify_build_output(
            false,
            "",
            "src/index.ts(3,1): error TS2304: Cannot find name 'foo'.",
        );
        assert_eq!(result.status, BuildStatus::Error);
        assert_eq!(result.reason, Some(BuildFailureReason::TypescriptErrors));
    }

    #[test]
    fn test_typescript_errors_win_over_dependency_markers() {
        // Both markers present: TS errors must never be masked.
        let output = "error TS2307: Cannot find module 'express'";
        let result = classify_build_output(false, output, "");
        assert_eq!(result.status, BuildStatus::Error);
        assert_eq!(result.reason, Some(BuildFailureReason::TypescriptErrors));
    }

    #[test]
    fn test_dependency_markers_classify_as_warn() {
        let result = classify_build_output(false, "", "npm ERR! missing: express@^4");
        assert_eq!(result.status, BuildStatus::Warn);
        assert_eq!(result.reason, Some(BuildFailureReason::DependenciesMissing));
    }

    #[test]
    fn test_unclassified_failure_is_risk() {
        let result = classify_build_output(false, "", "segmentation fault");
        assert_eq!(result.status, BuildStatus::Risk);
        assert_eq!(result.reason, Some(BuildFailureReason::TestsFailed));
    }

    #[test]
    fn test_clean_build_is_ok() {
        let result = classify_build_output(true, "built in 2.3s", "");
        assert_eq!(result.status, BuildStatus::Ok);
        assert!(result.reason.is_none());
    }

    #[tokio::test]
    async fn test_disallowed_command_rejected() {
        let tool = ValidateBuildTool::new(std::env::temp_dir());
        let err = tool
            .call(json!({"project_id": "p-1", "command": "rm -rf /"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
    }
}
