//! Tool trait: the abstraction over agent capabilities.
//!
//! The capability set is closed: [`ToolName`] enumerates every tool the
//! model may call, and the [`ToolRegistry`] resolves a model-supplied name
//! through [`ToolName::parse`] with an explicit unknown branch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::error::{ToolError, ToolErrorKind};
use crate::provider::ToolDefinition;

/// The closed set of tools exposed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolName {
    Read,
    Write,
    Run,
    Search,
    Discover,
}

impl ToolName {
    /// Every tool, in the order definitions are presented to the model.
    pub const ALL: [ToolName; 5] = [
        ToolName::Read,
        ToolName::Write,
        ToolName::Run,
        ToolName::Search,
        ToolName::Discover,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::Read => "read",
            ToolName::Write => "write",
            ToolName::Run => "run",
            ToolName::Search => "search",
            ToolName::Discover => "discover",
        }
    }

    /// Exact, case-sensitive lookup. `None` is the unknown-tool branch.
    pub fn parse(name: &str) -> Option<ToolName> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to execute a tool, emitted by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_use id)
    pub id: String,

    /// Name of the tool to execute, as the model spelled it
    pub name: String,

    /// Arguments; expected to be a JSON object
    pub input: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result answers
    pub tool_call_id: String,

    /// The output content (or error description)
    pub content: String,

    /// Whether the tool failed
    #[serde(default)]
    pub is_error: bool,

    #[serde(skip)]
    pub error_kind: Option<ToolErrorKind>,
}

impl ToolResult {
    pub fn success(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
            error_kind: None,
        }
    }

    pub fn error(tool_call_id: impl Into<String>, error: &ToolError) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: format!("Error: {error}"),
            is_error: true,
            error_kind: Some(error.kind()),
        }
    }
}

/// The core Tool trait.
///
/// Executors are stateless between calls beyond the filesystem; they never
/// see the transcript.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Which member of the closed set this executor implements.
    fn name(&self) -> ToolName;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. `input` has already been checked to be an object.
    async fn execute(&self, input: &serde_json::Value) -> Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().as_str().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Fetch a required string argument.
pub fn required_str<'a>(input: &'a serde_json::Value, field: &str) -> Result<&'a str, ToolError> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{field}' argument")))
}

/// A registry of available tools, keyed by the closed [`ToolName`] set.
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: ToolName) -> Option<&dyn Tool> {
        self.tools.get(&name).map(|t| t.as_ref())
    }

    /// Tool definitions in [`ToolName`] order, so the schema is stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<ToolName> {
        self.tools.keys().copied().collect()
    }

    /// Execute a tool call. Never fails: every error becomes an error result.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        match self.try_dispatch(call).await {
            Ok(output) => ToolResult::success(&call.id, output),
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                ToolResult::error(&call.id, &e)
            }
        }
    }

    async fn try_dispatch(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = ToolName::parse(&call.name)
            .and_then(|name| self.get(name))
            .ok_or_else(|| ToolError::UnknownTool(call.name.clone()))?;

        if !call.input.is_object() {
            return Err(ToolError::InvalidArguments(format!(
                "expected an object of arguments, got {}",
                call.input
            )));
        }

        debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
        tool.execute(&call.input).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> ToolName {
            ToolName::Read
        }
        fn description(&self) -> &str {
            "Echoes back the path"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" }
                },
                "required": ["path"]
            })
        }
        async fn execute(&self, input: &serde_json::Value) -> Result<String, ToolError> {
            Ok(required_str(input, "path")?.to_string())
        }
    }

    fn call(name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            input,
        }
    }

    #[test]
    fn parse_is_exact() {
        assert_eq!(ToolName::parse("search"), Some(ToolName::Search));
        assert_eq!(ToolName::parse("Search"), None);
        assert_eq!(ToolName::parse("shell"), None);
        for name in ToolName::ALL {
            assert_eq!(ToolName::parse(name.as_str()), Some(name));
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get(ToolName::Read).is_some());
        assert!(registry.get(ToolName::Run).is_none());
        assert_eq!(registry.definitions()[0].name, "read");
    }

    #[tokio::test]
    async fn dispatch_success() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let result = registry
            .dispatch(&call("read", serde_json::json!({"path": "a.md"})))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.content, "a.md");
    }

    #[tokio::test]
    async fn unknown_tool_is_error_result() {
        let registry = ToolRegistry::new();
        let result = registry
            .dispatch(&call("rm_rf", serde_json::json!({})))
            .await;
        assert!(result.is_error);
        assert_eq!(result.error_kind, Some(ToolErrorKind::UnknownTool));
        assert!(result.content.contains("rm_rf"));
    }

    #[tokio::test]
    async fn registered_name_without_executor_is_unknown() {
        let registry = ToolRegistry::new();
        let result = registry
            .dispatch(&call("read", serde_json::json!({"path": "x"})))
            .await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::UnknownTool));
    }

    #[tokio::test]
    async fn non_object_input_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let result = registry
            .dispatch(&call("read", serde_json::json!("a.md")))
            .await;
        assert_eq!(result.error_kind, Some(ToolErrorKind::InvalidArguments));
    }

    #[tokio::test]
    async fn missing_argument_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let result = registry.dispatch(&call("read", serde_json::json!({}))).await;
        assert!(result.is_error);
        assert!(result.content.contains("Missing 'path'"));
    }
}
