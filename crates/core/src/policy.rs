//! # Execution Policy
//!
//! Mode-gated permissions and ceilings for one materializer instance.
//! The mode is resolved once at process start and the policy is passed into
//! `MaterializerService::new` as a plain value, so tests can swap modes
//! per-case instead of per-process.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::DeployProvider;

/// Execution mode determines which side effects are permitted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Preview only, zero external side effects
    Safe,
    /// Writes and commits allowed, deploy behind an explicit opt-in
    #[default]
    Standard,
    /// Everything allowed, including push and deploy
    Full,
}

impl ExecutionMode {
    /// Resolve a mode from a configuration value, defaulting to `Standard`
    /// on absent or unrecognized input.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("safe") => Self::Safe,
            Some("full") => Self::Full,
            Some("standard") => Self::Standard,
            _ => Self::Standard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Standard => "standard",
            Self::Full => "full",
        }
    }
}

/// Fixed permission/ceiling profile bound to a mode
#[derive(Debug, Clone, Serialize)]
pub struct ModeProfile {
    pub allow_deploy: bool,
    pub allow_git_commit: bool,
    pub allow_git_push: bool,
    pub max_files_per_project: usize,
    pub max_tool_iterations: u32,
    pub max_tokens_per_run: u32,
    pub log_prefix: &'static str,
}

impl ModeProfile {
    pub fn for_mode(mode: ExecutionMode) -> Self {
        match mode {
            ExecutionMode::Safe => Self {
                allow_deploy: false,
                allow_git_commit: false,
                allow_git_push: false,
                max_files_per_project: 20,
                max_tool_iterations: 5,
                max_tokens_per_run: 2_000,
                log_prefix: "[SAFE]",
            },
            ExecutionMode::Standard => Self {
                allow_deploy: true,
                allow_git_commit: true,
                allow_git_push: false,
                max_files_per_project: 50,
                max_tool_iterations: 10,
                max_tokens_per_run: 4_000,
                log_prefix: "[STD]",
            },
            ExecutionMode::Full => Self {
                allow_deploy: true,
                allow_git_commit: true,
                allow_git_push: true,
                max_files_per_project: 100,
                max_tool_iterations: 20,
                max_tokens_per_run: 8_000,
                log_prefix: "[FULL]",
            },
        }
    }
}

/// Immutable-after-construction policy injected into the materializer.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    mode: ExecutionMode,
    profile: ModeProfile,
    /// Separate operator opt-in required for deploys in `Standard` mode
    deploy_opt_in: bool,
    allowed_providers: Vec<DeployProvider>,
    block_deploy_on_build_error: bool,
    write_root: PathBuf,
}

impl ExecutionPolicy {
    pub fn new(mode: ExecutionMode, deploy_opt_in: bool, write_root: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            profile: ModeProfile::for_mode(mode),
            deploy_opt_in,
            allowed_providers: vec![DeployProvider::Render, DeployProvider::Vercel],
            block_deploy_on_build_error: true,
            write_root: write_root.into(),
        }
    }

    /// Convenience for the process entry point. Nothing reads the environment
    /// after this returns.
    pub fn from_env() -> Self {
        let mode = ExecutionMode::from_env_value(std::env::var("WADI_EXECUTION_MODE").ok().as_deref());
        let deploy_opt_in = std::env::var("WADI_ALLOW_DEPLOY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let write_root = std::env::var("WADI_WRITE_ROOT").unwrap_or_else(|_| ".wadi/projects".to_string());
        Self::new(mode, deploy_opt_in, write_root)
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn profile(&self) -> &ModeProfile {
        &self.profile
    }

    pub fn write_root(&self) -> &Path {
        &self.write_root
    }

    pub fn is_safe_mode(&self) -> bool {
        self.mode == ExecutionMode::Safe
    }

    pub fn block_deploy_on_build_error(&self) -> bool {
        self.block_deploy_on_build_error
    }

    /// Whether a deploy to `provider` is permitted right now: the mode must
    /// permit deploys (with `Standard` additionally gated by the operator
    /// opt-in flag) and the provider must be on the allow-list.
    pub fn is_deploy_allowed(&self, provider: DeployProvider) -> bool {
        let mode_permits = match self.mode {
            ExecutionMode::Safe => false,
            ExecutionMode::Standard => self.deploy_opt_in,
            ExecutionMode::Full => true,
        };
        mode_permits && self.allowed_providers.contains(&provider)
    }

    /// Whether `path` stays under the restricted write root. Relative paths
    /// must not contain parent components; absolute paths must already live
    /// under the root.
    pub fn is_path_allowed(&self, path: &Path) -> bool {
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes {
            return false;
        }
        if path.is_absolute() {
            return path.starts_with(&self.write_root);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_resolution_defaults_to_standard() {
        assert_eq!(ExecutionMode::from_env_value(None), ExecutionMode::Standard);
        assert_eq!(
            ExecutionMode::from_env_value(Some("bogus")),
            ExecutionMode::Standard
        );
        assert_eq!(ExecutionMode::from_env_value(Some("SAFE")), ExecutionMode::Safe);
        assert_eq!(ExecutionMode::from_env_value(Some("full")), ExecutionMode::Full);
    }

    #[test]
    fn test_profile_table() {
        let safe = ModeProfile::for_mode(ExecutionMode::Safe);
        assert!(!safe.allow_deploy && !safe.allow_git_commit && !safe.allow_git_push);
        assert_eq!(safe.max_files_per_project, 20);

        let standard = ModeProfile::for_mode(ExecutionMode::Standard);
        assert!(standard.allow_git_commit && !standard.allow_git_push);
        assert_eq!(standard.max_files_per_project, 50);
        assert_eq!(standard.max_tokens_per_run, 4_000);

        let full = ModeProfile::for_mode(ExecutionMode::Full);
        assert!(full.allow_deploy && full.allow_git_push);
        assert_eq!(full.max_tool_iterations, 20);
    }

    #[test]
    fn test_deploy_gating() {
        let safe = ExecutionPolicy::new(ExecutionMode::Safe, true, "/tmp/wadi");
        assert!(!safe.is_deploy_allowed(DeployProvider::Render));

        let standard_no_flag = ExecutionPolicy::new(ExecutionMode::Standard, false, "/tmp/wadi");
        assert!(!standard_no_flag.is_deploy_allowed(DeployProvider::Render));

        let standard = ExecutionPolicy::new(ExecutionMode::Standard, true, "/tmp/wadi");
        assert!(standard.is_deploy_allowed(DeployProvider::Vercel));

        let full = ExecutionPolicy::new(ExecutionMode::Full, false, "/tmp/wadi");
        assert!(full.is_deploy_allowed(DeployProvider::Render));
    }

    #[test]
    fn test_path_allowed() {
        let policy = ExecutionPolicy::new(ExecutionMode::Standard, false, "/tmp/wadi");
        assert!(policy.is_path_allowed(Path::new("proj-1/src/index.ts")));
        assert!(!policy.is_path_allowed(Path::new("../outside")));
        assert!(!policy.is_path_allowed(Path::new("proj-1/../../etc/passwd")));
        assert!(policy.is_path_allowed(Path::new("/tmp/wadi/proj-1/a.ts")));
        assert!(!policy.is_path_allowed(Path::new("/etc/passwd")));
    }
}
