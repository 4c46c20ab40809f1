//! # Materializer Tools
//!
//! Side-effecting operations behind the [`registry::ToolRegistry`] dispatch
//! table. Each module owns its own safety checks; the registry holds no
//! domain logic.

pub mod build_tools;
pub mod deploy_tools;
pub mod fault;
pub mod file_tools;
pub mod git_tools;
pub mod registry;
pub mod scaffold_tools;

pub use fault::{FaultInjection, FaultKind};
pub use registry::{Tool, ToolDefinition, ToolError, ToolRegistry};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::models::DeployProvider;
use crate::policy::ExecutionPolicy;

/// Register the standard tool set against a policy.
///
/// The write root and push permission come from the policy; deploy hooks and
/// an optional templates directory are deployment configuration.
pub fn register_standard_tools(
    registry: &ToolRegistry,
    policy: &ExecutionPolicy,
    deploy_hooks: HashMap<DeployProvider, String>,
    templates_root: Option<PathBuf>,
    faults: Arc<FaultInjection>,
) {
    let root = policy.write_root().to_path_buf();

    registry.register(Arc::new(file_tools::WriteFileTool::new(root.clone())));
    registry.register(Arc::new(scaffold_tools::InitializeScaffoldingTool::new(
        root.clone(),
        templates_root,
    )));
    registry.register(Arc::new(scaffold_tools::ImplementFeatureTool::new(
        root.clone(),
    )));
    registry.register(Arc::new(build_tools::ValidateBuildTool::new(root.clone())));
    registry.register(Arc::new(git_tools::GitCommitTool::new(
        root,
        policy.profile().allow_git_push,
    )));
    registry.register(Arc::new(deploy_tools::DeployProjectTool::new(
        deploy_hooks,
        faults,
    )));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ExecutionMode;

    #[test]
    fn test_standard_tool_set_registered() {
        let registry = ToolRegistry::new();
        let policy = ExecutionPolicy::new(ExecutionMode::Standard, false, "/tmp/wadi");
        register_standard_tools(
            &registry,
            &policy,
            HashMap::new(),
            None,
            Arc::new(FaultInjection::new()),
        );

        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "deploy_project",
                "git_commit",
                "implement_feature",
                "initialize_scaffolding",
                "validate_build",
                "write_file",
            ]
        );
    }
}
