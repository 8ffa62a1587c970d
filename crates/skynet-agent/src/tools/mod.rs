//! Tool system for AI agent tool calling.
//!
//! Defines the `Tool` trait that all tools implement, plus a registry
//! for managing available tools and converting them to LLM API format.

pub mod bash_session;
pub mod build;
pub mod execute_command;
pub mod list_files;
pub mod patch_file;
pub mod policy;
pub mod read_file;
pub mod script_tool;
pub mod search_files;
pub mod send_message;
pub mod skill;
pub mod write_file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::provider::ToolDefinition;

/// Result of executing a tool (spec.md §4.5: text content plus optional
/// structured detail, e.g. a diff or file listing, for UI-level surfaces
/// that want more than plain text).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolResult {
    /// Text content returned to the LLM.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
    /// Optional structured payload alongside `content` (e.g. matches,
    /// a diff, a file tree) for callers that want more than plain text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false, details: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { content: message.into(), is_error: true, details: None }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name for this tool (e.g. "read_file").
    fn name(&self) -> &str;
    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input parameters.
    fn input_schema(&self) -> serde_json::Value;
    /// Execute the tool with the given input.
    async fn execute(&self, input: serde_json::Value) -> ToolResult;

    /// Short label shown in turn-progress UI (e.g. "Reading file"). Defaults
    /// to the tool's name.
    fn label(&self) -> String {
        self.name().to_string()
    }

    /// Execute with a call id and cancellation signal, for tools invoked
    /// from the streaming turn loop (spec.md §4.5). Tools that don't need
    /// either can rely on the default, which just forwards to `execute`.
    async fn execute_cancellable(
        &self,
        _call_id: &str,
        input: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        self.execute(input).await
    }
}

/// Static catalog of all built-in tools (name, description).
///
/// Does not require instantiation or context â€” useful for `/tools` listing.
pub fn tool_catalog() -> Vec<(&'static str, &'static str)> {
    vec![
        ("read_file", "Read the contents of a file"),
        ("write_file", "Write content to a file"),
        ("list_files", "List files in a directory"),
        ("search_files", "Search for text patterns in files"),
        ("patch_file", "Apply a patch to modify a file"),
        ("execute_command", "Execute a shell command (one-shot)"),
        ("bash", "Persistent interactive bash session"),
        ("send_message", "Send a message to another channel"),
    ]
}

/// Convert a slice of tools to API-level tool definitions.
pub fn to_definitions(tools: &[std::sync::Arc<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}
