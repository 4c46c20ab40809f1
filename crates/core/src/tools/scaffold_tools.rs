//! # Scaffold Tools
//!
//! Template scaffolding and feature stubs. A template is a directory tree
//! under the configured templates root, copied verbatim into the project
//! sandbox; a small set of built-in templates covers installs with no
//! templates directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use walkdir::WalkDir;

use super::file_tools::sandboxed_join;
use super::registry::{parse_args, schema_for, Tool, ToolDefinition, ToolError};

pub const INITIALIZE_SCAFFOLDING: &str = "initialize_scaffolding";
pub const IMPLEMENT_FEATURE: &str = "implement_feature";

/// Built-in fallback templates: (relative path, content)
fn builtin_template(template_id: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match template_id {
        "node-express" => Some(&[
            (
                "package.json",
                "{\n  \"name\": \"wadi-app\",\n  \"private\": true,\n  \"scripts\": {\n    \"build\": \"tsc\",\n    \"start\": \"node dist/index.js\"\n  }\n}\n",
            ),
            (
                "src/index.ts",
                "import express from \"express\";\n\nconst app = express();\napp.get(\"/health\", (_req, res) => res.json({ ok: true }));\napp.listen(process.env.PORT ?? 3000);\n",
            ),
            ("tsconfig.json", "{\n  \"compilerOptions\": {\n    \"outDir\": \"dist\",\n    \"strict\": true\n  }\n}\n"),
        ]),
        "static-site" => Some(&[
            (
                "index.html",
                "<!doctype html>\n<html>\n  <head><title>WADI App</title></head>\n  <body><main id=\"app\"></main></body>\n</html>\n",
            ),
            ("styles.css", "main { margin: 0 auto; max-width: 60ch; }\n"),
        ]),
        _ => None,
    }
}

/// Arguments for initializing project scaffolding
#[derive(Deserialize, JsonSchema)]
pub struct InitializeScaffoldingArgs {
    pub project_id: String,
    /// Template to apply (directory under the templates root, or a built-in)
    pub template_id: String,
}

/// Copy a scaffolding template into the project sandbox.
pub struct InitializeScaffoldingTool {
    sandbox_root: PathBuf,
    templates_root: Option<PathBuf>,
}

impl InitializeScaffoldingTool {
    pub fn new(sandbox_root: impl Into<PathBuf>, templates_root: Option<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            templates_root,
        }
    }

    fn scaffold(&self, project_id: &str, template_id: &str) -> Result<usize> {
        let target = sandboxed_join(&self.sandbox_root, project_id)?;
        std::fs::create_dir_all(&target)
            .with_context(|| format!("Failed to create project dir {:?}", target))?;

        // Prefer an on-disk template tree when one exists.
        if let Some(templates_root) = &self.templates_root {
            let source = templates_root.join(template_id);
            if source.is_dir() {
                let mut copied = 0usize;
                for entry in WalkDir::new(&source).into_iter().filter_map(|e| e.ok()) {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let relative = entry
                        .path()
                        .strip_prefix(&source)
                        .context("Template entry outside template root")?;
                    let dest = target.join(relative);
                    if let Some(parent) = dest.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::copy(entry.path(), &dest).with_context(|| {
                        format!("Failed to copy template file {:?}", entry.path())
                    })?;
                    copied += 1;
                }
                return Ok(copied);
            }
        }

        let files = builtin_template(template_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown scaffolding template: {}", template_id))?;

        for (relative, content) in files {
            let dest = target.join(relative);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, content)
                .with_context(|| format!("Failed to write template file {}", relative))?;
        }

        Ok(files.len())
    }
}

#[async_trait]
impl Tool for InitializeScaffoldingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: INITIALIZE_SCAFFOLDING.to_string(),
            description: "Apply a scaffolding template to a project, writing its base files."
                .to_string(),
            parameters: schema_for::<InitializeScaffoldingArgs>(),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: InitializeScaffoldingArgs = parse_args(INITIALIZE_SCAFFOLDING, args)?;

        let files_written = self
            .scaffold(&args.project_id, &args.template_id)
            .map_err(|e| ToolError::Failed {
                tool: INITIALIZE_SCAFFOLDING.to_string(),
                source: e,
            })?;

        Ok(json!({
            "project_id": args.project_id,
            "template_id": args.template_id,
            "files_written": files_written
        }))
    }
}

/// Arguments for implementing a feature
#[derive(Deserialize, JsonSchema)]
pub struct ImplementFeatureArgs {
    pub project_id: String,
    pub feature_id: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Render a feature module into the project tree.
///
/// The wider product delegates feature content to the brain layer; this
/// handler owns the filesystem side: one module file per feature under
/// `src/features/`, capturing the requested parameters.
pub struct ImplementFeatureTool {
    sandbox_root: PathBuf,
}

impl ImplementFeatureTool {
    pub fn new(sandbox_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
        }
    }
}

#[async_trait]
impl Tool for ImplementFeatureTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: IMPLEMENT_FEATURE.to_string(),
            description: "Implement a requested feature, writing its module into the project tree."
                .to_string(),
            parameters: schema_for::<ImplementFeatureArgs>(),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: ImplementFeatureArgs = parse_args(IMPLEMENT_FEATURE, args)?;

        let relative = format!("{}/src/features/{}.ts", args.project_id, args.feature_id);
        let params_json = args
            .params
            .as_ref()
            .and_then(|p| serde_json::to_string_pretty(p).ok())
            .unwrap_or_else(|| "{}".to_string());
        let content = format!(
            "// Feature: {}\nexport const config = {} as const;\n\nexport function register(app: unknown): void {{\n  void app;\n}}\n",
            args.feature_id, params_json
        );

        let write = || -> Result<String> {
            let dest = sandboxed_join(&self.sandbox_root, &relative)?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, &content)?;
            Ok(relative.clone())
        };

        let path = write().map_err(|e| ToolError::Failed {
            tool: IMPLEMENT_FEATURE.to_string(),
            source: e.context(format!("Failed to implement feature '{}'", args.feature_id)),
        })?;

        Ok(json!({
            "feature_id": args.feature_id,
            "path": path
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_builtin_template_scaffolds() {
        let root = scratch("wadi_test_scaffold_builtin");
        let tool = InitializeScaffoldingTool::new(&root, None);

        let result = tool
            .call(json!({"project_id": "p-1", "template_id": "node-express"}))
            .await
            .unwrap();
        assert_eq!(result["files_written"], 3);
        assert!(root.join("p-1/package.json").exists());
        assert!(root.join("p-1/src/index.ts").exists());

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_directory_template_copied_recursively() {
        let root = scratch("wadi_test_scaffold_dir");
        let templates = scratch("wadi_test_scaffold_templates");
        fs::create_dir_all(templates.join("custom/src")).unwrap();
        fs::write(templates.join("custom/README.md"), "# T").unwrap();
        fs::write(templates.join("custom/src/app.js"), "x").unwrap();

        let tool = InitializeScaffoldingTool::new(&root, Some(templates.clone()));
        let result = tool
            .call(json!({"project_id": "p-2", "template_id": "custom"}))
            .await
            .unwrap();
        assert_eq!(result["files_written"], 2);
        assert!(root.join("p-2/src/app.js").exists());

        let _ = fs::remove_dir_all(&root);
        let _ = fs::remove_dir_all(&templates);
    }

    #[tokio::test]
    async fn test_unknown_template_fails() {
        let root = scratch("wadi_test_scaffold_unknown");
        let tool = InitializeScaffoldingTool::new(&root, None);

        let err = tool
            .call(json!({"project_id": "p-3", "template_id": "nope"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));

        let _ = fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_feature_stub_written_with_params() {
        let root = scratch("wadi_test_feature");
        let tool = ImplementFeatureTool::new(&root);

        let result = tool
            .call(json!({
                "project_id": "p-1",
                "feature_id": "auth",
                "params": {"provider": "supabase"}
            }))
            .await
            .unwrap();
        assert_eq!(result["path"], "p-1/src/features/auth.ts");

        let written = fs::read_to_string(root.join("p-1/src/features/auth.ts")).unwrap();
        assert!(written.contains("supabase"));
        assert!(Path::new(&root).join("p-1/src/features").is_dir());

        let _ = fs::remove_dir_all(&root);
    }
}
