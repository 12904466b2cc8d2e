//! Tool implementations registered by name (spec §1 "Out of scope: the
//! tool-implementation library; each tool is a pure `(input)→output`
//! function registered by name").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use zerg_common::CoreError;

#[async_trait]
pub trait Tool: Send + Sync {
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, CoreError>;
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, tool: Arc<dyn Tool>) {
        self.tools.insert(name.into(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }
}

/// A tool that echoes its input back, useful for tests and as a template
/// for real tool implementations.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    async fn execute(&self, args: serde_json::Value) -> Result<serde_json::Value, CoreError> {
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_resolves_registered_tool_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register("echo", Arc::new(EchoTool));

        let tool = registry.get("echo").expect("tool should be registered");
        let result = tool.execute(serde_json::json!({ "x": 1 })).await.unwrap();
        assert_eq!(result, serde_json::json!({ "x": 1 }));

        assert!(registry.get("missing").is_none());
    }
}
