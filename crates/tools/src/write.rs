//! `write`: create or replace a file atomically.
//!
//! A write to `<records_dir>/<id>.md` must be a valid entity whose header id
//! matches the file name; it is stored through the record store byte for
//! byte as given. Any other path inside the root is written verbatim.

use async_trait::async_trait;
use std::sync::Arc;
use tasktier_core::entity::Entity;
use tasktier_core::error::{EntityError, ToolError};
use tasktier_core::store::RecordStore;
use tasktier_core::tool::{Tool, ToolName, required_str};
use tasktier_store::{Layout, write_atomic};
use tracing::{debug, info};

use crate::confine;

pub struct WriteTool {
    layout: Layout,
    store: Arc<dyn RecordStore>,
}

impl WriteTool {
    pub fn new(layout: Layout, store: Arc<dyn RecordStore>) -> Self {
        Self { layout, store }
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: ToolName::Write.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> ToolName {
        ToolName::Write
    }

    fn description(&self) -> &str {
        "Create or overwrite a file in the project. Task records go to \
         memories/tasks/<id>.md and must have a header (id, title, date YYYY-MM-DD, \
         status, created RFC 3339; optional priority, project, tags), a blank line, \
         then the body."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the project root"
                },
                "content": {
                    "type": "string",
                    "description": "Full new file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: &serde_json::Value) -> Result<String, ToolError> {
        let requested = required_str(input, "path")?;
        let content = required_str(input, "content")?;
        let path = confine(&self.layout, ToolName::Write, requested)?;
        let shown = self.layout.relative(&path);

        if let Some(id) = self.layout.record_id_for(&path) {
            let entity = Entity::parse(content).map_err(|e| {
                ToolError::InvalidArguments(format!("{shown} is not a valid task record: {e}"))
            })?;
            if entity.id() != &id {
                let mismatch = EntityError::IdMismatch {
                    header: entity.id().to_string(),
                    file: id.to_string(),
                };
                return Err(ToolError::InvalidArguments(format!("{shown}: {mismatch}")));
            }
            self.store
                .put_document(&id, content)
                .await
                .map_err(|e| Self::failed(e.to_string()))?;
            info!(id = %id, "Task record written");
            return Ok(format!("Stored task {id} at {shown}"));
        }

        write_atomic(&path, content.as_bytes())
            .await
            .map_err(|e| Self::failed(format!("{shown}: {e}")))?;
        debug!(path = %shown, bytes = content.len(), "File written");
        Ok(format!("Wrote {} bytes to {shown}", content.len()))
    }
}
