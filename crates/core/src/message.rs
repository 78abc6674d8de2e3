//! Message and Conversation domain types.
//!
//! A [`Conversation`] is the append-only transcript of one session. Messages
//! carry ordered content blocks; tool calls and their results are blocks too,
//! and [`Conversation::push`] refuses any append that would break the
//! call/result pairing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::TranscriptError;
use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The reasoning model
    Assistant,
    /// Tool execution result
    Tool,
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// Ordered content blocks
    pub content: Vec<ContentBlock>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_blocks(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_blocks(Role::User, vec![ContentBlock::Text { text: text.into() }])
    }

    /// Create a new text-only assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_blocks(Role::Assistant, vec![ContentBlock::Text { text: text.into() }])
    }

    /// Create an assistant message from explicit blocks (text and tool calls).
    pub fn assistant_blocks(content: Vec<ContentBlock>) -> Self {
        Self::with_blocks(Role::Assistant, content)
    }

    /// Create a tool-role message carrying one result.
    pub fn tool_result(result: ToolResult) -> Self {
        Self::with_blocks(Role::Tool, vec![ContentBlock::ToolResult(result)])
    }

    /// Concatenated text blocks, newline separated.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tool calls in emission order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|b| match b {
            ContentBlock::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    /// The tool result carried by this message, if any.
    pub fn tool_result_block(&self) -> Option<&ToolResult> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    /// Same message with tool-call blocks removed.
    pub fn without_tool_calls(mut self) -> Self {
        self.content.retain(|b| !matches!(b, ContentBlock::ToolCall(_)));
        self
    }

    /// Rough content size in characters (tool inputs serialized).
    pub fn content_len(&self) -> usize {
        self.content
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.len(),
                ContentBlock::ToolCall(call) => call.name.len() + call.input.to_string().len(),
                ContentBlock::ToolResult(result) => result.content.len(),
            })
            .sum()
    }
}

/// A conversation is an ordered, append-only sequence of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message, enforcing tool-call/result causality.
    ///
    /// - tool calls only in assistant messages, ids unique per message
    /// - a tool message holds exactly one result, answering a call from the
    ///   nearest preceding assistant message that has not been answered yet
    /// - no user or assistant message while calls are outstanding
    pub fn push(&mut self, message: Message) -> Result<(), TranscriptError> {
        if message.content.is_empty() {
            return Err(TranscriptError::EmptyMessage);
        }

        let outstanding = self.outstanding_call_ids();
        match message.role {
            Role::User | Role::Assistant => {
                if message
                    .content
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolResult(_)))
                {
                    return Err(TranscriptError::ToolResultOutsideToolMessage);
                }
                if message.role == Role::User && message.tool_calls().next().is_some() {
                    return Err(TranscriptError::ToolCallOutsideAssistant);
                }
                if !outstanding.is_empty() {
                    return Err(TranscriptError::OutstandingToolCalls(outstanding.len()));
                }
                let mut seen = HashSet::new();
                for call in message.tool_calls() {
                    if !seen.insert(call.id.as_str()) {
                        return Err(TranscriptError::DuplicateToolCallId(call.id.clone()));
                    }
                }
            }
            Role::Tool => {
                let [ContentBlock::ToolResult(result)] = message.content.as_slice() else {
                    if message.tool_calls().next().is_some() {
                        return Err(TranscriptError::ToolCallOutsideAssistant);
                    }
                    return Err(TranscriptError::MalformedToolMessage);
                };
                if !outstanding.contains(&result.tool_call_id) {
                    return Err(TranscriptError::UnexpectedToolResult(
                        result.tool_call_id.clone(),
                    ));
                }
            }
        }

        self.updated_at = Utc::now();
        self.messages.push(message);
        Ok(())
    }

    /// The transcript in append order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Calls from the latest assistant message that have no result yet.
    pub fn outstanding_call_ids(&self) -> Vec<String> {
        let mut answered = HashSet::new();
        for message in self.messages.iter().rev() {
            match message.role {
                Role::Tool => {
                    if let Some(result) = message.tool_result_block() {
                        answered.insert(result.tool_call_id.as_str());
                    }
                }
                Role::Assistant => {
                    return message
                        .tool_calls()
                        .filter(|c| !answered.contains(c.id.as_str()))
                        .map(|c| c.id.clone())
                        .collect();
                }
                Role::User => return Vec::new(),
            }
        }
        Vec::new()
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.content_len() / 4).sum()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
