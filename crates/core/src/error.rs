//! Error types for the TaskTier domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The response body could not be decoded into a model turn
    #[error("Provider returned a malformed response: {0}")]
    MalformedResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures raised by tool executors.
///
/// These never abort the agent loop: the registry folds them into an error
/// [`ToolResult`](crate::tool::ToolResult) that is handed back to the model.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

/// Coarse classification of a [`ToolError`], kept on error results so
/// callers can branch without parsing the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    UnknownTool,
    NotFound,
    PermissionDenied,
    Timeout,
    InvalidArguments,
    ExecutionFailed,
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::UnknownTool(_) => ToolErrorKind::UnknownTool,
            Self::NotFound { .. } => ToolErrorKind::NotFound,
            Self::PermissionDenied { .. } => ToolErrorKind::PermissionDenied,
            Self::Timeout { .. } => ToolErrorKind::Timeout,
            Self::InvalidArguments(_) => ToolErrorKind::InvalidArguments,
            Self::ExecutionFailed { .. } => ToolErrorKind::ExecutionFailed,
        }
    }
}

/// Record-store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid entity '{id}': {source}")]
    InvalidEntity {
        id: String,
        #[source]
        source: EntityError,
    },

    #[error("Storage I/O failed at {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Failures parsing or validating an entity file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' has invalid value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("header line {line} is not a 'key: value' pair")]
    MalformedLine { line: usize },

    #[error("field '{0}' appears more than once")]
    DuplicateField(String),

    #[error("header id '{header}' does not match file identity '{file}'")]
    IdMismatch { header: String, file: String },
}

/// Violations of the transcript's causality rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("message has no content blocks")]
    EmptyMessage,

    #[error("tool calls may only be emitted by the assistant role")]
    ToolCallOutsideAssistant,

    #[error("tool results may only be carried by tool-role messages")]
    ToolResultOutsideToolMessage,

    #[error("a tool message must carry exactly one tool result")]
    MalformedToolMessage,

    #[error("tool call id '{0}' is repeated within one assistant message")]
    DuplicateToolCallId(String),

    #[error("tool result '{0}' does not match an outstanding tool call")]
    UnexpectedToolResult(String),

    #[error("{0} tool call(s) are still awaiting results")]
    OutstandingToolCalls(usize),
}
