//! # File Tools
//!
//! Sandboxed file writes for materialized projects. Every path is resolved
//! against the policy write root and may not escape it.

use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use super::registry::{parse_args, schema_for, Tool, ToolDefinition, ToolError};

pub const WRITE_FILE: &str = "write_file";

/// Resolve `relative` under `root`, rejecting absolute paths and any parent
/// components before the filesystem is touched.
pub(crate) fn sandboxed_join(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        anyhow::bail!("Path escapes project sandbox: {}", relative);
    }
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        anyhow::bail!("Path escapes project sandbox: {}", relative);
    }
    Ok(root.join(candidate))
}

/// Arguments for writing a file
#[derive(Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// Relative path within the write root (prefixed with the project id)
    pub path: String,
    /// Content to write to the file
    pub content: String,
}

/// Write one file inside the sandbox, creating parent directories.
pub struct WriteFileTool {
    sandbox_root: PathBuf,
}

impl WriteFileTool {
    pub fn new(sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: WRITE_FILE.to_string(),
            description: "Write content to a file in the project sandbox. Creates parent directories if needed.".to_string(),
            parameters: schema_for::<WriteFileArgs>(),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: WriteFileArgs = parse_args(WRITE_FILE, args)?;

        let full_path = sandboxed_join(&self.sandbox_root, &args.path).map_err(|e| {
            ToolError::Failed {
                tool: WRITE_FILE.to_string(),
                source: e,
            }
        })?;

        let write = || -> Result<()> {
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&full_path, &args.content)?;
            Ok(())
        };

        write().map_err(|e| ToolError::Failed {
            tool: WRITE_FILE.to_string(),
            source: e.context(format!("Failed to write '{}'", args.path)),
        })?;

        Ok(json!({
            "path": args.path,
            "bytes_written": args.content.len()
        }))
    }
}
