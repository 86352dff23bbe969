//! Tool registry: maps tool name to {definition, executor}.
//!
//! Pattern mirrors the builder used by the upstream extension registry this
//! crate grew out of: `register()` once per tool group, `build()` to freeze.
//! Adding a tool group means adding a `builtin::*::tools()` call here, not
//! touching the agent loop.

pub mod builtin;

use std::sync::Arc;

use crate::ports::{AccessibilityBackend, InputController, ScreenshotProvider};
use crate::types::{ToolCall, ToolDefinition, ToolResult};

/// Everything an executor might need to do its job. Cheap to clone (all
/// fields are `Arc`s or small copies).
#[derive(Clone)]
pub struct ToolContext {
    pub screenshot: Arc<dyn ScreenshotProvider>,
    pub input: Arc<dyn InputController>,
    pub accessibility: Option<Arc<dyn AccessibilityBackend>>,
    pub workspace: std::path::PathBuf,
    pub screenshot_dir: std::path::PathBuf,
    pub screen_width: u32,
    pub screen_height: u32,
    pub step_count: u64,
}

pub type Executor = Arc<dyn Fn(serde_json::Value, ToolContext) -> BoxFuture<ToolResult> + Send + Sync>;

type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;

#[derive(Clone)]
struct RegisteredTool {
    definition: ToolDefinition,
    executor: Executor,
}

/// Holds every registered tool's definition and executor.
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

pub struct ToolRegistryBuilder {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register one tool group's (definition, executor) pairs.
    #[must_use]
    pub fn register(mut self, group: Vec<(ToolDefinition, Executor)>) -> Self {
        for (definition, executor) in group {
            self.tools.push(RegisteredTool { definition, executor });
        }
        self
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

impl Default for ToolRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// The full, default-wired registry: every builtin tool group.
    pub fn with_builtins() -> Self {
        ToolRegistryBuilder::new()
            .register(builtin::pointer::tools())
            .register(builtin::keyboard::tools())
            .register(builtin::screenshot::tools())
            .register(builtin::task::tools())
            .register(builtin::files::tools())
            .build()
    }

    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn owns(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.definition.name == name)
    }

    /// Execute a tool call. Never propagates an error across this boundary —
    /// any executor failure, including a panic, becomes `ToolResult::fail`
    /// (§4.1 error policy). Panics are caught by running the executor on its
    /// own task and inspecting the `JoinError` rather than letting an unwind
    /// cross into the step loop.
    pub async fn execute(&self, call: &ToolCall, ctx: ToolContext) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|t| t.definition.name == call.name) else {
            return ToolResult::fail(format!("unknown tool: {}", call.name));
        };
        let fut = (tool.executor)(call.arguments.clone(), ctx);
        match tokio::spawn(fut).await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                let panic_msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool executor panicked".to_string());
                tracing::error!(tool = %call.name, panic = %panic_msg, "tool executor panicked");
                ToolResult::fail(format!("tool '{}' panicked: {}", call.name, panic_msg))
            }
            Err(join_err) => {
                tracing::error!(tool = %call.name, error = %join_err, "tool executor task failed");
                ToolResult::fail(format!("tool '{}' failed: {}", call.name, join_err))
            }
        }
    }
}

/// Helper for builtin tool modules: wraps a plain async fn into the
/// `(ToolDefinition, Executor)` pair the registry expects.
pub(crate) fn tool<F, Fut>(definition: ToolDefinition, f: F) -> (ToolDefinition, Executor)
where
    F: Fn(serde_json::Value, ToolContext) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ToolResult> + Send + 'static,
{
    let executor: Executor = Arc::new(move |args, ctx| Box::pin(f(args, ctx)));
    (definition, executor)
}

/// Build a `ToolDefinition` from name/description/schema literals.
pub(crate) fn def(name: &str, description: &str, parameters: serde_json::Value) -> ToolDefinition {
    ToolDefinition { name: name.to_string(), description: description.to_string(), parameters }
}
