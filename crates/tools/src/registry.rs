use std::collections::HashMap;
use std::sync::Arc;

use clawbot_core::ToolResult;
use serde_json::Value;
use tracing::{debug, warn};

use crate::browser::tool::{
    BrowserClickTool, BrowserCloseTool, BrowserGoogleTool, BrowserInputTool, BrowserLinksTool,
    BrowserOpenTool, BrowserReadTool, BrowserScreenshotTool, BrowserScrollTool,
};
use crate::exec::{PythonTool, ShellTool};
use crate::fs::{ReadFileTool, WriteFileTool};
use crate::image::ImageTool;
use crate::system_info::SystemInfoTool;
use crate::web::{FetchUrlTool, WebSearchTool};
use crate::{Tool, ToolContext};

/// Dispatcher mapping tool names to implementations.
///
/// `execute` is total: unknown names, validation failures and execution
/// errors are all folded into a `ToolResult`; no fault crosses this boundary
/// to the agent loop.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        // System tools
        registry.register(Arc::new(ShellTool));
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(WriteFileTool));
        registry.register(Arc::new(PythonTool));
        registry.register(Arc::new(SystemInfoTool));

        // Web tools
        registry.register(Arc::new(WebSearchTool));
        registry.register(Arc::new(FetchUrlTool));

        // Generation tools
        registry.register(Arc::new(ImageTool));

        // Browser tools
        registry.register(Arc::new(BrowserOpenTool));
        registry.register(Arc::new(BrowserScreenshotTool));
        registry.register(Arc::new(BrowserReadTool));
        registry.register(Arc::new(BrowserGoogleTool));
        registry.register(Arc::new(BrowserClickTool));
        registry.register(Arc::new(BrowserInputTool));
        registry.register(Arc::new(BrowserLinksTool));
        registry.register(Arc::new(BrowserScrollTool));
        registry.register(Arc::new(BrowserCloseTool));

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        debug!(name = schema.name, "Registering tool");
        self.tools.insert(schema.name.to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// All registered tool names.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Render name + description lines for prompt injection.
    pub fn describe(&self) -> String {
        let mut schemas: Vec<_> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by_key(|s| s.name);
        schemas
            .iter()
            .map(|s| format!("- {}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Execute a tool by name and fold every outcome into the uniform result
    /// envelope. Never returns an error and never panics on unknown input.
    pub async fn execute(&self, name: &str, ctx: ToolContext, params: Value) -> ToolResult {
        let tool = match self.get(name) {
            Some(tool) => tool,
            None => {
                warn!(tool = name, "Unknown tool requested");
                return ToolResult::fail("unknown tool");
            }
        };

        if let Err(e) = tool.validate(&params) {
            warn!(tool = name, error = %e, "Tool validation failed");
            return ToolResult::fail(e.to_string());
        }

        debug!(tool = name, "Executing tool");
        tool.execute(ctx, params).await.into()
    }
}
