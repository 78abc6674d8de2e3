//! `search`: find task records by header predicates, returning paths only.

use async_trait::async_trait;
use tasktier_core::error::ToolError;
use tasktier_core::tool::{Tool, ToolName};
use tasktier_store::{SearchEngine, SearchQuery};

pub const NO_MATCHES: &str = "No tasks found matching criteria";

pub struct SearchTool {
    engine: SearchEngine,
}

impl SearchTool {
    pub fn new(engine: SearchEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> ToolName {
        ToolName::Search
    }

    fn description(&self) -> &str {
        "Find task records without loading them. All given filters must match. \
         Returns one record path per line; open a record with `read` only if you need it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["pending", "in_progress", "completed", "blocked"]
                },
                "priority": {
                    "type": "string",
                    "enum": ["low", "medium", "high", "critical"]
                },
                "date_after": {
                    "type": "string",
                    "description": "Due on or after this date (YYYY-MM-DD)"
                },
                "date_before": {
                    "type": "string",
                    "description": "Due on or before this date (YYYY-MM-DD)"
                },
                "project": {
                    "type": "string",
                    "description": "Exact project name"
                },
                "text": {
                    "type": "string",
                    "description": "Case-insensitive text to find in the record body"
                },
                "sort": {
                    "type": "string",
                    "enum": ["id", "date", "created", "priority"],
                    "description": "Result order (default: id)"
                }
            }
        })
    }

    async fn execute(&self, input: &serde_json::Value) -> Result<String, ToolError> {
        let query: SearchQuery = serde_json::from_value(input.clone())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let report = self
            .engine
            .search(&query)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: ToolName::Search.to_string(),
                reason: e.to_string(),
            })?;

        let mut out = if report.ids.is_empty() {
            NO_MATCHES.to_string()
        } else {
            self.engine.locations(&report).join("\n")
        };
        if !report.warnings.is_empty() {
            out.push_str(&format!(
                "\n\nNote: {} record(s) skipped as unreadable:",
                report.warnings.len()
            ));
            for warning in &report.warnings {
                out.push_str(&format!("\n- {warning}"));
            }
        }
        Ok(out)
    }
}
