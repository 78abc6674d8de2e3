//! Shared test helpers for session tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use tasktier_core::error::ProviderError;
use tasktier_core::message::{ContentBlock, Message};
use tasktier_core::provider::{Provider, ProviderRequest, ProviderResponse, StopReason, Usage};
use tasktier_core::tool::ToolCall;

/// A mock provider that returns a sequence of scripted responses and
/// records every request it was given.
///
/// Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose only call fails.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(error)])),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no response for call #{}", requests.len()))
    }
}

fn response(message: Message, stop_reason: StopReason) -> ProviderResponse {
    ProviderResponse {
        message,
        stop_reason,
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
            ..Usage::default()
        }),
        model: "mock-model".into(),
    }
}

/// A final answer.
pub fn text_response(text: &str) -> ProviderResponse {
    response(Message::assistant(text), StopReason::EndTurn)
}

/// A tool-use turn carrying the given calls.
pub fn tool_response(calls: Vec<ToolCall>) -> ProviderResponse {
    let blocks = calls.into_iter().map(ContentBlock::ToolCall).collect();
    response(Message::assistant_blocks(blocks), StopReason::ToolUse)
}

/// An answer cut at the length limit.
pub fn truncated_response(text: &str) -> ProviderResponse {
    response(Message::assistant(text), StopReason::MaxTokens)
}
