//! # WADI Models
//!
//! Domain types flowing through the materialization pipeline: the
//! LLM-authored project blueprint, per-run results, and the build/deploy
//! outcome classifications consumed by the orchestrator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A feature requested by the blueprint, implemented one tool call at a time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FeatureRequest {
    /// Feature identifier (e.g. "auth", "crud-notes")
    pub id: String,
    /// Free-form parameters forwarded to the feature tool
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// A file declared by the blueprint, written verbatim into the project tree.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectFile {
    /// Path relative to the project root
    pub path: String,
    /// Full file content
    pub content: String,
}

/// Supported deploy providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeployProvider {
    Render,
    Vercel,
}

impl DeployProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Vercel => "vercel",
        }
    }
}

/// The LLM-authored blueprint for one project.
///
/// Immutable input to a single materialization; every field beyond `name` is
/// optional because the authoring model may emit partial structures.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectStructure {
    /// Project display name
    pub name: String,
    /// Optional human-readable description
    #[serde(default)]
    pub description: Option<String>,
    /// Scaffolding template to apply before anything else
    #[serde(default)]
    pub template_id: Option<String>,
    /// Features to implement, in order
    #[serde(default)]
    pub features: Vec<FeatureRequest>,
    /// Files to write, in order
    #[serde(default)]
    pub files: Vec<ProjectFile>,
    /// Whether the blueprint asks for a deploy after a clean build
    #[serde(default)]
    pub should_deploy: bool,
    /// Target provider when deploying
    #[serde(default)]
    pub deploy_provider: Option<DeployProvider>,
}

impl ProjectStructure {
    /// Path-only projection of the declared files, used for previews.
    pub fn file_paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Result of one `materialize()` call, returned to the caller.
///
/// Never an error: failures surface as `success: false` plus the correlation
/// id for server-side log lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintResult {
    pub success: bool,
    pub files_created: usize,
    /// Declared file paths, present only for previews (dry-run / SAFE mode)
    #[serde(default)]
    pub blueprint: Option<Vec<String>>,
    #[serde(default)]
    pub deploy_url: Option<String>,
    pub correlation_id: String,
}

impl BlueprintResult {
    pub(crate) fn failure(correlation_id: String) -> Self {
        Self {
            success: false,
            files_created: 0,
            blueprint: None,
            deploy_url: None,
            correlation_id,
        }
    }
}

/// Classification of a build verification attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildStatus {
    /// Build succeeded cleanly
    Ok,
    /// Recoverable problem (missing deps, or the check itself could not run)
    Warn,
    /// Compile errors; blocks deployment
    Error,
    /// Command failed for a reason we could not classify
    Risk,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Risk => "RISK",
        }
    }
}

/// Why a build was classified as non-OK
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildFailureReason {
    DependenciesMissing,
    TypescriptErrors,
    TestsFailed,
}

/// Outcome of the build-check tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BuildResult {
    pub status: BuildStatus,
    #[serde(default)]
    pub reason: Option<BuildFailureReason>,
    /// Captured output excerpt for diagnostics
    #[serde(default)]
    pub details: Option<String>,
}

impl BuildResult {
    pub fn ok() -> Self {
        Self {
            status: BuildStatus::Ok,
            reason: None,
            details: None,
        }
    }
}

/// Outcome of the deploy tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeploymentResult {
    pub success: bool,
    #[serde(default)]
    pub url: Option<String>,
    pub provider: DeployProvider,
    #[serde(default)]
    pub error: Option<String>,
    /// True when the provider was skipped because its circuit breaker is open
    #[serde(default)]
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_parses_partial_json() {
        let structure: ProjectStructure = serde_json::from_str(r#"{"name":"Demo"}"#).unwrap();
        assert_eq!(structure.name, "Demo");
        assert!(structure.files.is_empty());
        assert!(structure.features.is_empty());
        assert!(!structure.should_deploy);
        assert!(structure.template_id.is_none());
    }

    #[test]
    fn test_build_status_serialization() {
        let json = serde_json::to_string(&BuildStatus::Error).unwrap();
        assert_eq!(json, "\"ERROR\"");
        let reason = serde_json::to_string(&BuildFailureReason::DependenciesMissing).unwrap();
        assert_eq!(reason, "\"dependencies_missing\"");
    }

    #[test]
    fn test_deploy_provider_roundtrip() {
        let provider: DeployProvider = serde_json::from_str("\"render\"").unwrap();
        assert_eq!(provider, DeployProvider::Render);
        assert_eq!(provider.as_str(), "render");
    }

    #[test]
    fn test_file_paths_projection() {
        let structure = ProjectStructure {
            name: "Demo".to_string(),
            description: None,
            template_id: None,
            features: vec![],
            files: vec![
                ProjectFile {
                    path: "a.ts".to_string(),
                    content: "x".to_string(),
                },
                ProjectFile {
                    path: "src/b.ts".to_string(),
                    content: "y".to_string(),
                },
            ],
            should_deploy: false,
            deploy_provider: None,
        };
        assert_eq!(structure.file_paths(), vec!["a.ts", "src/b.ts"]);
    }
}
