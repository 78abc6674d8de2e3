//! `read`: return a file's content.

use async_trait::async_trait;
use tasktier_core::error::ToolError;
use tasktier_core::tool::{Tool, ToolName, required_str};
use tasktier_store::Layout;
use tracing::debug;

use crate::confine;

pub struct ReadTool {
    layout: Layout,
}

impl ReadTool {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> ToolName {
        ToolName::Read
    }

    fn description(&self) -> &str {
        "Read a file in the project. Use it to open a task record found with `search` \
         (memories/tasks/<id>.md) or a skill's SKILL.md found with `discover`."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: &serde_json::Value) -> Result<String, ToolError> {
        let requested = required_str(input, "path")?;
        let path = confine(&self.layout, ToolName::Read, requested)?;

        debug!(path = %path.display(), "Reading file");
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ToolError::NotFound {
                path: requested.to_string(),
            }),
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: ToolName::Read.to_string(),
                reason: format!("{requested}: {e}"),
            }),
        }
    }
}
