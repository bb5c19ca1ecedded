use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::{AgentError, AgentResult};
use crate::models::tool::ToolSpec;

/// A capability the agent can offer to the model.
///
/// Tool bodies are expected to be pure given their backing data, to tolerate
/// missing or malformed arguments by returning an in-band error payload, and
/// to return structured JSON rather than prose; the model does the prose.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The schema advertised to the model.
    fn spec(&self) -> ToolSpec;

    /// Execute with parsed arguments.
    async fn invoke(&self, arguments: Value) -> AgentResult<Value>;
}

/// An ordered set of tools, dispatched by name.
///
/// Registration order is the order schemas are presented to the model, so it
/// stays identical across every call within a process.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry { tools: Vec::new() }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.push(Arc::new(tool));
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// The declared schemas, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec()).collect()
    }

    /// Execute a tool by exact name and return its result text.
    ///
    /// Never fails the caller: an unknown name or a failing tool body comes
    /// back as a structured `{"error": ...}` payload so the model can recover
    /// conversationally instead of the run aborting.
    pub async fn invoke(&self, name: &str, arguments: Value) -> String {
        let outcome = match self.tools.iter().find(|tool| tool.spec().name == name) {
            Some(tool) => tool.invoke(arguments).await,
            None => Err(AgentError::UnknownTool(name.to_string())),
        };

        let payload = match outcome {
            Ok(value) => value,
            Err(err) => json!({ "error": err.to_string() }),
        };
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec::new(
                "echo",
                "Echoes back the input",
                json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }),
            )
        }

        async fn invoke(&self, arguments: Value) -> AgentResult<Value> {
            Ok(json!({ "echo": arguments["message"].as_str().unwrap_or("") }))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec::new("broken", "Always fails", json!({"type": "object", "properties": {}}))
        }

        async fn invoke(&self, _arguments: Value) -> AgentResult<Value> {
            Err(AgentError::Execution("backing store unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let result = registry.invoke("echo", json!({"message": "hi"})).await;
        let value: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(value["echo"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_payload() {
        let registry = ToolRegistry::new();

        let result = registry.invoke("get_weather", json!({})).await;
        let value: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(value["error"], "Unknown tool: get_weather");
    }

    #[tokio::test]
    async fn tool_failure_degrades_to_payload() {
        let mut registry = ToolRegistry::new();
        registry.register(BrokenTool);

        let result = registry.invoke("broken", json!({})).await;
        let value: Value = serde_json::from_str(&result).unwrap();
        assert_eq!(
            value["error"],
            "Tool execution failed: backing store unavailable"
        );
    }

    #[test]
    fn specs_preserve_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(BrokenTool);
        registry.register(EchoTool);

        let names: Vec<String> = registry.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["broken", "echo"]);
    }
}
