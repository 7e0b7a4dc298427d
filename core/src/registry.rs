use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type ToolArguments = HashMap<String, String>;

// The "Passport" an agent sees for each local function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    // JSON Schema for the arguments, as registered on the hosted agent
    pub parameters: Value,
}

/// A local function a remote run can ask us to execute.
///
/// Failures are returned, not raised past the relay loop: the runtime turns
/// them into error results for the run.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(&self, args: &ToolArguments) -> Result<String>;
}

/// Reads a required string argument.
pub fn required_arg<'a>(args: &'a ToolArguments, name: &str) -> Result<&'a str> {
    args.get(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing required argument '{}'", name))
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.definition().name;
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            tracing::warn!("Tool '{}' registered twice; keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions sorted by name, for listing.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shout;

    #[async_trait]
    impl Tool for Shout {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "shout".to_string(),
                description: "Upper-cases its input".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            }
        }

        async fn execute(&self, args: &ToolArguments) -> Result<String> {
            Ok(required_arg(args, "text")?.to_uppercase())
        }
    }

    #[tokio::test]
    async fn registered_tool_is_found_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Shout);

        assert_eq!(registry.len(), 1);
        let tool = registry.get("shout").unwrap();
        let args = ToolArguments::from([("text".to_string(), "hi".to_string())]);
        assert_eq!(tool.execute(&args).await.unwrap(), "HI");
        assert!(registry.get("whisper").is_none());
    }

    #[tokio::test]
    async fn missing_argument_is_an_error() {
        let err = Shout.execute(&ToolArguments::new()).await.unwrap_err();
        assert!(err.to_string().contains("'text'"));
    }

    #[test]
    fn definitions_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Shout);
        let defs = registry.definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "shout");
        assert!(!ToolRegistry::new().definitions().iter().any(|d| d.name == "shout"));
    }
}
