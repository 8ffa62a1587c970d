//! Tool registry — builds the canonical tool list for the agent turn loop.

use std::sync::Arc;

use skynet_channels::manager::ChannelManager;
use skynet_terminal::manager::TerminalManager;
use tokio::sync::Mutex;

use crate::provider::ToolDefinition;

use super::bash_session::BashSessionTool;
use super::execute_command::ExecuteCommandTool;
use super::send_message::SendMessageTool;
use super::{to_definitions, Tool};

/// Build the full list of tools available to the AI for a given turn.
///
/// Includes:
/// - `read_file`, `write_file`, `list_files`, `search_files`, `patch_file` (filesystem)
/// - `execute_command` (one-shot sh -c via TerminalManager)
/// - `bash` (persistent PTY bash session via TerminalManager)
/// - `send_message` (deliver a message to a registered channel adapter)
/// - any script plugins found under `~/.skynet/tools/`
pub fn build_tools(
    terminal: Arc<Mutex<TerminalManager>>,
    channels: Arc<Mutex<ChannelManager>>,
) -> Vec<Arc<dyn Tool>> {
    let mut tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(super::read_file::ReadFileTool),
        Arc::new(super::write_file::WriteFileTool),
        Arc::new(super::list_files::ListFilesTool),
        Arc::new(super::search_files::SearchFilesTool),
        Arc::new(super::patch_file::PatchFileTool),
        Arc::new(ExecuteCommandTool::new(Arc::clone(&terminal))),
        Arc::new(BashSessionTool::new(Arc::clone(&terminal))),
        Arc::new(SendMessageTool::new(Arc::clone(&channels))),
    ];

    // Load script plugins from ~/.skynet/tools/ — no restart needed after adding a plugin,
    // tools are re-scanned on each build_tools() call.
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let tools_dir = std::path::Path::new(&home).join(".skynet/tools");
    tools.extend(
        super::script_tool::load_script_tools(&tools_dir)
            .into_iter()
            .map(Arc::from),
    );

    tools
}

/// Convert a tool list to API-level definitions for the LLM request.
pub fn tool_definitions(tools: &[Arc<dyn Tool>]) -> Vec<ToolDefinition> {
    to_definitions(tools)
}
