//! Built-in tool implementations for TaskTier.
//!
//! The model gets exactly five tools: `read`, `write` and `run` for the
//! project tree, `search` over task records, and `discover` for skills.
//! Every path argument is confined to the project root.

pub mod discover;
pub mod read;
pub mod run;
pub mod search;
pub mod write;

use std::path::PathBuf;
use std::sync::Arc;

use tasktier_core::error::ToolError;
use tasktier_core::store::RecordStore;
use tasktier_core::tool::{ToolName, ToolRegistry};
use tasktier_security::resolve_in_root;
use tasktier_store::{Layout, SearchEngine};

pub use discover::DiscoverTool;
pub use read::ReadTool;
pub use run::{RunSettings, RunTool};
pub use search::SearchTool;
pub use write::WriteTool;

/// Create the registry with all five built-in tools.
pub fn default_registry(
    layout: Layout,
    store: Arc<dyn RecordStore>,
    run: RunSettings,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadTool::new(layout.clone())));
    registry.register(Box::new(WriteTool::new(layout.clone(), store.clone())));
    registry.register(Box::new(RunTool::new(layout.root().to_path_buf(), run)));
    registry.register(Box::new(SearchTool::new(SearchEngine::new(store))));
    registry.register(Box::new(DiscoverTool::new(layout)));
    registry
}

/// Resolve a model-supplied path inside the project root, or refuse.
pub(crate) fn confine(layout: &Layout, tool: ToolName, path: &str) -> Result<PathBuf, ToolError> {
    resolve_in_root(layout.root(), path).map_err(|e| ToolError::PermissionDenied {
        tool_name: tool.to_string(),
        reason: e.to_string(),
    })
}
