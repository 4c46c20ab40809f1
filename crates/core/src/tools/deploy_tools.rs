//! # Deploy Tools
//!
//! Deployment via provider deploy hooks. Each provider's hook POST runs
//! behind that provider's circuit breaker; repeated provider faults open the
//! breaker and subsequent calls fail fast as degraded results instead of
//! hammering a dead service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use super::fault::FaultInjection;
use super::registry::{parse_args, schema_for, Tool, ToolDefinition, ToolError};
use crate::models::{DeployProvider, DeploymentResult};
use crate::resilience::{BreakerError, CircuitBreaker, CircuitBreakerConfig};

pub const DEPLOY_PROJECT: &str = "deploy_project";

/// Arguments for deploying a project
#[derive(Deserialize, JsonSchema)]
pub struct DeployProjectArgs {
    pub project_id: String,
    pub provider: DeployProvider,
}

/// Trigger a provider deploy hook.
///
/// Failures are recorded in the returned [`DeploymentResult`], never raised
/// as tool errors — the orchestrator treats a failed deploy as a degraded
/// outcome, not a failed run.
pub struct DeployProjectTool {
    client: reqwest::Client,
    hooks: HashMap<DeployProvider, String>,
    breakers: HashMap<DeployProvider, CircuitBreaker>,
    faults: Arc<FaultInjection>,
}

impl DeployProjectTool {
    pub fn new(hooks: HashMap<DeployProvider, String>, faults: Arc<FaultInjection>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let mut breakers = HashMap::new();
        for provider in [DeployProvider::Render, DeployProvider::Vercel] {
            let breaker = CircuitBreaker::new(provider.as_str(), CircuitBreakerConfig::default())
                .with_transition_callback(Arc::new(|name, from, to| {
                    tracing::warn!(
                        provider = %name,
                        from = from.as_str(),
                        to = to.as_str(),
                        "deploy provider breaker transition"
                    );
                }));
            breakers.insert(provider, breaker);
        }

        Self {
            client,
            hooks,
            breakers,
            faults,
        }
    }

    async fn trigger(&self, project_id: &str, provider: DeployProvider) -> DeploymentResult {
        let breaker = match self.breakers.get(&provider) {
            Some(breaker) => breaker,
            None => {
                return DeploymentResult {
                    success: false,
                    url: None,
                    provider,
                    error: Some(format!("no breaker configured for {}", provider.as_str())),
                    degraded: false,
                }
            }
        };

        let outcome = breaker
            .execute(|| self.call_hook(project_id, provider))
            .await;

        match outcome {
            Ok(url) => DeploymentResult {
                success: true,
                url,
                provider,
                error: None,
                degraded: false,
            },
            Err(BreakerError::Open { name }) => DeploymentResult {
                success: false,
                url: None,
                provider,
                error: Some(format!("circuit breaker '{}' is open", name)),
                degraded: true,
            },
            Err(BreakerError::Inner(err)) => DeploymentResult {
                success: false,
                url: None,
                provider,
                error: Some(err.to_string()),
                degraded: false,
            },
        }
    }

    async fn call_hook(&self, project_id: &str, provider: DeployProvider) -> Result<Option<String>> {
        // Armed faults take the same failure path a real provider outage would.
        if let Some(fault) = self.faults.peek(provider.as_str()) {
            return Err(fault.to_error().into());
        }

        let hook_url = self
            .hooks
            .get(&provider)
            .with_context(|| format!("no deploy hook configured for {}", provider.as_str()))?;

        let response = self
            .client
            .post(hook_url)
            .json(&json!({ "project_id": project_id }))
            .send()
            .await
            .with_context(|| format!("deploy hook request to {} failed", provider.as_str()))?
            .error_for_status()
            .with_context(|| format!("deploy hook for {} returned an error", provider.as_str()))?;

        // Hook responses are provider-specific; a url field is optional.
        let url = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| body.get("url").and_then(|u| u.as_str()).map(String::from));

        Ok(url)
    }
}

#[async_trait]
impl Tool for DeployProjectTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: DEPLOY_PROJECT.to_string(),
            description: "Trigger the provider deploy hook for a project. Returns the deployment outcome.".to_string(),
            parameters: schema_for::<DeployProjectArgs>(),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let args: DeployProjectArgs = parse_args(DEPLOY_PROJECT, args)?;

        let result = self.trigger(&args.project_id, args.provider).await;
        if !result.success {
            tracing::warn!(
                project_id = %args.project_id,
                provider = result.provider.as_str(),
                degraded = result.degraded,
                error = result.error.as_deref().unwrap_or("unknown"),
                "deployment failed"
            );
        }

        serde_json::to_value(&result).map_err(|e| ToolError::Failed {
            tool: DEPLOY_PROJECT.to_string(),
            source: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fault::FaultKind;
    use serde_json::json;

    fn tool_with_faults() -> (DeployProjectTool, Arc<FaultInjection>) {
        let faults = Arc::new(FaultInjection::new());
        let mut hooks = HashMap::new();
        // Unroutable per RFC 5737; never actually reached in these tests.
        hooks.insert(
            DeployProvider::Render,
            "http://192.0.2.1/deploy-hook".to_string(),
        );
        (
            DeployProjectTool::new(hooks, Arc::clone(&faults)),
            faults,
        )
    }

    #[tokio::test]
    async fn test_injected_fault_fails_deployment() {
        let (tool, faults) = tool_with_faults();
        faults.arm("render", FaultKind::Http503);

        let result = tool
            .call(json!({"project_id": "p-1", "provider": "render"}))
            .await
            .unwrap();
        let result: DeploymentResult = serde_json::from_value(result).unwrap();

        assert!(!result.success);
        assert!(!result.degraded);
        assert!(result.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_repeated_faults_open_breaker_and_degrade() {
        let (tool, faults) = tool_with_faults();
        faults.arm("render", FaultKind::NetworkError);

        // Default breaker opens after 5 consecutive failures.
        for _ in 0..5 {
            let _ = tool.trigger("p-1", DeployProvider::Render).await;
        }

        let result = tool.trigger("p-1", DeployProvider::Render).await;
        assert!(!result.success);
        assert!(result.degraded);
        assert!(result.error.unwrap().contains("open"));
    }

    #[tokio::test]
    async fn test_missing_hook_is_recorded_not_thrown() {
        let faults = Arc::new(FaultInjection::new());
        let tool = DeployProjectTool::new(HashMap::new(), faults);

        let result = tool.trigger("p-1", DeployProvider::Vercel).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no deploy hook"));
    }
}
