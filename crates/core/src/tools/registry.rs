//! # Tool Registry
//!
//! Name-to-handler dispatch for every side-effecting operation the
//! materializer drives. Definitions carry a JSON schema per tool so the set
//! can be exposed to an LLM's function-calling interface; dispatch itself is
//! pure — each tool validates its own typed arguments before doing work.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Metadata describing one tool to callers (and to the LLM)
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the argument object
    pub parameters: Value,
}

/// Errors surfaced by tool dispatch
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArgs { tool: String, message: String },
    #[error("tool '{tool}' failed: {source}")]
    Failed {
        tool: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A registered tool handler
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn call(&self, args: Value) -> Result<Value, ToolError>;
}

/// Generate the JSON schema for a tool's argument struct
pub fn schema_for<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null)
}

/// Deserialize a tool's typed arguments, mapping failures to `InvalidArgs`.
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// The dispatch table. Holds no domain logic; each tool module encapsulates
/// its own side effects and safety checks.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its definition name. Re-registering a name
    /// replaces the previous handler.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        let mut tools = match self.tools.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "replacing previously registered tool");
        }
    }

    /// Full definition list, for the LLM function-calling surface
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let tools = match self.tools.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut defs: Vec<ToolDefinition> = tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Invoke a tool by name.
    ///
    /// `args` may be a JSON object or a JSON-encoded string (the LLM surface
    /// produces both); strings are parsed at this boundary. Handler errors
    /// are logged and propagated unchanged — no retry, no swallowing.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value, ToolError> {
        let args = match args {
            Value::String(raw) => {
                serde_json::from_str(&raw).map_err(|e| ToolError::InvalidArgs {
                    tool: name.to_string(),
                    message: format!("argument string is not valid JSON: {}", e),
                })?
            }
            other => other,
        };

        let tool = {
            let tools = match self.tools.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            tools.get(name).cloned()
        }
        .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        tracing::debug!(tool = %name, "dispatching tool call");
        match tool.call(args).await {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::error!(tool = %name, error = %err, "tool call failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        message: String,
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "echo".to_string(),
                description: "Echo the message back".to_string(),
                parameters: schema_for::<EchoArgs>(),
            }
        }

        async fn call(&self, args: Value) -> Result<Value, ToolError> {
            let args: EchoArgs = parse_args("echo", args)?;
            Ok(json!({ "message": args.message }))
        }
    }

    #[tokio::test]
    async fn test_call_with_object_args() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let result = registry
            .call_tool("echo", json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(result["message"], "hi");
    }

    #[tokio::test]
    async fn test_call_with_json_string_args() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let result = registry
            .call_tool("echo", json!(r#"{"message":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(result["message"], "hi");
    }

    #[tokio::test]
    async fn test_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let err = registry.call_tool("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_args_rejected_before_dispatch() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let err = registry
            .call_tool("echo", json!({"wrong": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs { .. }));
    }

    #[test]
    fn test_definitions_sorted_and_complete() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert!(defs[0].parameters.is_object());
    }
}
