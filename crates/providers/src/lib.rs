//! Reasoning-model providers for TaskTier.
//!
//! All providers implement the `tasktier_core::Provider` trait. The agent
//! loop only ever sees that trait; tests substitute a scripted provider.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
