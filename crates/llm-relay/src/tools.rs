use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::errors::ToolError;
use crate::event::ToolArguments;

/// Successful tool execution payload.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolOutput {
    pub result: Value,
}

/// Lookup and execution of named tools.
#[async_trait::async_trait]
pub trait ToolRegistry: Send + Sync {
    fn has_tool(&self, name: &str) -> bool;

    async fn execute_tool(&self, name: &str, args: ToolArguments) -> Result<ToolOutput, ToolError>;
}

/// Async tool handler stored by [`InMemoryToolRegistry`].
pub type ToolHandler =
    Arc<dyn Fn(ToolArguments) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Registry of async handlers keyed by tool name. Tools can be registered
/// while other tools are executing.
#[derive(Default)]
pub struct InMemoryToolRegistry {
    tools: DashMap<String, ToolHandler>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a tool. The handler's `Err` message becomes a
    /// `ToolError::Execution` carrying the tool name.
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let handler: ToolHandler = Arc::new(move |args| Box::pin(handler(args)));
        self.tools.insert(name.into(), handler);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait::async_trait]
impl ToolRegistry for InMemoryToolRegistry {
    fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    async fn execute_tool(&self, name: &str, args: ToolArguments) -> Result<ToolOutput, ToolError> {
        // Clone the handler out so the map shard is not held across the await.
        let handler = self
            .tools
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ToolError::NotFound {
                tool: name.to_string(),
            })?;
        handler(args)
            .await
            .map(|result| ToolOutput { result })
            .map_err(|message| ToolError::execution(name, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> InMemoryToolRegistry {
        let registry = InMemoryToolRegistry::new();
        registry.register("echo", |args: ToolArguments| async move {
            Ok(args.to_json().unwrap_or(Value::Null))
        });
        registry.register("fail", |_args| async move { Err("boom".to_string()) });
        registry
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let registry = registry();
        assert!(registry.has_tool("echo"));
        let output = registry
            .execute_tool("echo", ToolArguments::Raw("{\"a\":1}".into()))
            .await
            .expect("echo");
        assert_eq!(output.result, serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn handler_error_carries_tool_name() {
        let err = registry()
            .execute_tool("fail", ToolArguments::default())
            .await
            .expect_err("should fail");
        assert_eq!(err, ToolError::execution("fail", "boom"));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = registry();
        assert!(!registry.has_tool("missing"));
        assert!(registry.unregister("echo"));
        assert!(matches!(
            registry.execute_tool("echo", ToolArguments::default()).await,
            Err(ToolError::NotFound { tool }) if tool == "echo"
        ));
    }
}
