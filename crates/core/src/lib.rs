//! # TaskTier Core
//!
//! Domain types, traits, and error definitions for the TaskTier agent.
//! Every seam of the system is defined here; implementations live in their
//! respective crates:
//!
//! - the transcript ([`Conversation`]) and its causality rules
//! - the closed tool set ([`ToolName`]) and the [`ToolRegistry`]
//! - the reasoning-model seam ([`Provider`])
//! - the record format ([`Entity`]) and the [`RecordStore`] repository
//! - the always-loaded preamble ([`StaticContext`])

pub mod context;
pub mod entity;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use context::{ContextSources, StaticContext};
pub use entity::{Entity, EntityHeader, EntityId, Priority, Status};
pub use event::{DomainEvent, EventBus};
pub use message::{ContentBlock, Conversation, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StopReason, ToolDefinition, Usage};
pub use store::RecordStore;
pub use tool::{Tool, ToolCall, ToolName, ToolRegistry, ToolResult};
