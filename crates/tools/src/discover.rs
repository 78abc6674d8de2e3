//! `discover`: list available skills by name and description.

use async_trait::async_trait;
use tasktier_core::error::ToolError;
use tasktier_core::tool::{Tool, ToolName};
use tasktier_store::{Layout, discover_skills};

pub struct DiscoverTool {
    layout: Layout,
}

impl DiscoverTool {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Tool for DiscoverTool {
    fn name(&self) -> ToolName {
        ToolName::Discover
    }

    fn description(&self) -> &str {
        "List available skills (reusable procedures) as JSON with name, description and \
         path. Read <path>/SKILL.md to load a skill's instructions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _input: &serde_json::Value) -> Result<String, ToolError> {
        let skills = discover_skills(&self.layout).await;
        serde_json::to_string_pretty(&skills).map_err(|e| ToolError::ExecutionFailed {
            tool_name: ToolName::Discover.to_string(),
            reason: e.to_string(),
        })
    }
}
