//! The conversation session: the agentic tool-use loop.
//!
//! One `submit` drives the model until it gives a final answer or ends in an
//! [`Exhaustion`]: cut at the length limit, out of tool rounds, or out of
//! session tokens. Tool calls from one
//! model turn are dispatched sequentially in emission order and every result
//! is appended before the next model call.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tasktier_config::AgentConfig;
use tasktier_core::context::StaticContext;
use tasktier_core::error::{ProviderError, ToolError, TranscriptError};
use tasktier_core::event::{DomainEvent, EventBus};
use tasktier_core::message::{Conversation, Message};
use tasktier_core::provider::{Provider, ProviderRequest, StopReason};
use tasktier_core::tool::{ToolCall, ToolRegistry, ToolResult};
use tasktier_store::TierPolicy;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::accountant::{AccountingReport, TokenAccountant};

/// Sent by [`Session::resume`] after a truncated answer.
pub const CONTINUE_PROMPT: &str = "Please continue exactly where you left off.";

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInput,
    ModelCall,
    ToolDispatch,
    /// The last submit failed; the next submit is still accepted.
    Error,
}

/// How a submit ended without a final answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exhaustion {
    /// The model hit the output length limit
    Truncated { partial: String },
    /// The tool-round cap was reached while the model still wanted tools
    RoundLimit { rounds: usize },
    /// Provider-reported tokens for the session reached the configured limit
    TokenBudget { used: u64, limit: u64 },
}

/// Terminal result of one submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Final(String),
    Exhausted(Exhaustion),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Final(_) => "final",
            Outcome::Exhausted(Exhaustion::Truncated { .. }) => "truncated",
            Outcome::Exhausted(Exhaustion::RoundLimit { .. }) => "round_limit",
            Outcome::Exhausted(Exhaustion::TokenBudget { .. }) => "token_budget",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Final(text) => f.write_str(text),
            Outcome::Exhausted(Exhaustion::Truncated { partial }) => {
                write!(f, "{partial}\n[response truncated at the length limit]")
            }
            Outcome::Exhausted(Exhaustion::RoundLimit { rounds }) => write!(
                f,
                "[stopped after {rounds} tool round(s) without a final answer]"
            ),
            Outcome::Exhausted(Exhaustion::TokenBudget { used, limit }) => write!(
                f,
                "[stopped: session used {used} of its {limit} token budget]"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid input: {0}")]
    Input(String),

    /// The transcript holds `transcript_len` messages; the offending model
    /// message was not appended.
    #[error("Model protocol violation: {reason} (transcript length {transcript_len})")]
    Protocol { reason: String, transcript_len: usize },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),
}

/// Model parameters for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_tool_rounds: usize,
    /// Checked before every model call against provider-reported totals
    pub max_session_tokens: Option<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl From<&AgentConfig> for SessionSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
            max_tool_rounds: config.max_tool_rounds,
            max_session_tokens: config.max_session_tokens,
        }
    }
}

pub struct Session {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    context: StaticContext,
    settings: SessionSettings,
    event_bus: Arc<EventBus>,
    conversation: Conversation,
    accountant: TokenAccountant,
    state: SessionState,
}

impl Session {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        context: StaticContext,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            tools,
            context,
            settings: SessionSettings::default(),
            event_bus,
            conversation: Conversation::new(),
            accountant: TokenAccountant::new(None),
            state: SessionState::AwaitingInput,
        }
    }

    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Attribute loaded record and skill content to their tiers.
    pub fn with_tier_policy(mut self, policy: TierPolicy) -> Self {
        self.accountant = TokenAccountant::new(Some(policy));
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Conversation {
        &self.conversation
    }

    pub fn report(&self) -> &AccountingReport {
        self.accountant.report()
    }

    pub fn context(&self) -> &StaticContext {
        &self.context
    }

    /// Start over with an empty transcript, zeroed accounting, and a fresh
    /// token budget.
    pub fn reset(&mut self) {
        self.conversation = Conversation::new();
        self.accountant.reset();
        self.state = SessionState::AwaitingInput;
    }

    /// Ask the model to continue a truncated answer.
    pub async fn resume(&mut self) -> Result<Outcome, SessionError> {
        self.submit(CONTINUE_PROMPT).await
    }

    /// Append the user's text and run the loop to a terminal outcome.
    pub async fn submit(&mut self, text: &str) -> Result<Outcome, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::Input("message is empty".into()));
        }

        info!(
            conversation_id = %self.conversation.id,
            messages = self.conversation.len(),
            "Processing user message"
        );

        let result = match self.settle_cancelled_calls() {
            Ok(()) => {
                self.accountant.begin_turn();
                match self.conversation.push(Message::user(text)) {
                    Ok(()) => {
                        self.accountant.record_text(text);
                        self.drive().await
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e),
        };

        self.state = match &result {
            Ok(_) => SessionState::AwaitingInput,
            Err(e) => {
                warn!(conversation_id = %self.conversation.id, error = %e, "Submit failed");
                SessionState::Error
            }
        };
        result
    }

    async fn drive(&mut self) -> Result<Outcome, SessionError> {
        let definitions = self.tools.definitions();
        let mut rounds = 0usize;

        let outcome = loop {
            if let Some(exhausted) = self.budget_exhausted() {
                break exhausted;
            }

            self.state = SessionState::ModelCall;
            debug!(
                conversation_id = %self.conversation.id,
                round = rounds,
                "Calling model"
            );

            let request = ProviderRequest {
                model: self.settings.model.clone(),
                system: Some(self.context.system_prompt.clone()),
                messages: self.conversation.messages().to_vec(),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                tools: definitions.clone(),
            };
            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(ProviderError::MalformedResponse(reason)) => {
                    return Err(self.protocol(format!("malformed model response: {reason}")));
                }
                Err(e) => return Err(e.into()),
            };

            self.accountant
                .record_model_call(&self.context.system_prompt, response.usage);
            let usage = response.usage.unwrap_or_default();
            self.event_bus.publish(DomainEvent::ModelCalled {
                conversation_id: self.conversation.id.to_string(),
                model: response.model.clone(),
                stop_reason: format!("{:?}", response.stop_reason),
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                timestamp: Utc::now(),
            });

            let calls: Vec<ToolCall> = response.message.tool_calls().cloned().collect();

            match response.stop_reason {
                StopReason::EndTurn | StopReason::StopSequence => {
                    if !calls.is_empty() {
                        return Err(self.protocol(format!(
                            "final answer carries {} tool call(s)",
                            calls.len()
                        )));
                    }
                    let text = response.message.text();
                    self.append_text_message(response.message)?;
                    break Outcome::Final(text);
                }
                StopReason::MaxTokens => {
                    let message = response.message.without_tool_calls();
                    let partial = message.text();
                    if !calls.is_empty() {
                        debug!(dropped = calls.len(), "Dropping tool calls from truncated response");
                    }
                    self.append_text_message(message)?;
                    break Outcome::Exhausted(Exhaustion::Truncated { partial });
                }
                StopReason::ToolUse => {
                    if calls.is_empty() {
                        return Err(self.protocol("tool_use stop without any tool calls".into()));
                    }
                    let mut seen = HashSet::new();
                    if let Some(dup) = calls.iter().find(|c| !seen.insert(c.id.as_str())) {
                        return Err(self.protocol(format!("duplicate tool call id '{}'", dup.id)));
                    }
                    if rounds >= self.settings.max_tool_rounds {
                        warn!(
                            conversation_id = %self.conversation.id,
                            rounds,
                            "Tool round limit reached"
                        );
                        break Outcome::Exhausted(Exhaustion::RoundLimit { rounds });
                    }
                    rounds += 1;
                    self.dispatch_round(response.message, &calls).await?;
                }
                StopReason::Other(reason) => {
                    return Err(self.protocol(format!("unrecognized stop reason '{reason}'")));
                }
            }
        };

        self.event_bus.publish(DomainEvent::TurnCompleted {
            conversation_id: self.conversation.id.to_string(),
            outcome: outcome.label().to_string(),
            tool_rounds: rounds,
            timestamp: Utc::now(),
        });
        info!(
            conversation_id = %self.conversation.id,
            outcome = outcome.label(),
            tool_rounds = rounds,
            "Turn complete"
        );
        Ok(outcome)
    }

    fn budget_exhausted(&self) -> Option<Outcome> {
        let limit = self.settings.max_session_tokens?;
        let used = self.accountant.report().reported.total();
        if used < limit {
            return None;
        }
        warn!(
            conversation_id = %self.conversation.id,
            used,
            limit,
            "Session token budget exhausted"
        );
        Some(Outcome::Exhausted(Exhaustion::TokenBudget { used, limit }))
    }

    /// A submit dropped mid-dispatch leaves calls without results, and the
    /// transcript then refuses the next user message. Answer each with a
    /// cancellation error so the conversation can go on.
    fn settle_cancelled_calls(&mut self) -> Result<(), SessionError> {
        let outstanding = self.conversation.outstanding_call_ids();
        if outstanding.is_empty() {
            return Ok(());
        }
        let calls: Vec<ToolCall> = self
            .conversation
            .messages()
            .iter()
            .rev()
            .find(|m| m.tool_calls().next().is_some())
            .map(|m| {
                m.tool_calls()
                    .filter(|c| outstanding.contains(&c.id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        warn!(
            conversation_id = %self.conversation.id,
            count = calls.len(),
            "Settling tool calls left open by a cancelled turn"
        );

        for call in &calls {
            let error = ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: "cancelled before completion".into(),
            };
            let result = ToolResult::error(&call.id, &error);
            self.accountant.record_tool_result(call, &result);
            self.conversation.push(Message::tool_result(result))?;
        }
        Ok(())
    }

    /// Append the assistant's tool-use message, then dispatch and append
    /// each result in emission order.
    async fn dispatch_round(
        &mut self,
        message: Message,
        calls: &[ToolCall],
    ) -> Result<(), SessionError> {
        let text = message.text();
        self.conversation.push(message)?;
        self.accountant.record_text(&text);
        for call in calls {
            self.accountant.record_tool_call(call);
        }

        self.state = SessionState::ToolDispatch;
        debug!(tool_count = calls.len(), "Executing tool calls");

        for call in calls {
            let start = Instant::now();
            let result = self.tools.dispatch(call).await;
            let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                call_id: call.id.clone(),
                success: !result.is_error,
                duration_ms,
                timestamp: Utc::now(),
            });
            debug!(
                tool = %call.name,
                call_id = %call.id,
                success = !result.is_error,
                duration_ms,
                "Tool call finished"
            );

            self.accountant.record_tool_result(call, &result);
            self.conversation.push(Message::tool_result(result))?;
        }
        Ok(())
    }

    /// An assistant message with no text blocks is not appended.
    fn append_text_message(&mut self, message: Message) -> Result<(), SessionError> {
        if message.content.is_empty() {
            return Ok(());
        }
        self.accountant.record_text(&message.text());
        self.conversation.push(message)?;
        Ok(())
    }

    fn protocol(&self, reason: String) -> SessionError {
        warn!(conversation_id = %self.conversation.id, reason = %reason, "Protocol violation");
        self.event_bus.publish(DomainEvent::ProtocolViolation {
            conversation_id: self.conversation.id.to_string(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        SessionError::Protocol {
            reason,
            transcript_len: self.conversation.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, text_response, tool_response, truncated_response};
    use async_trait::async_trait;
    use serde_json::json;
    use tasktier_core::error::ToolError;
    use tasktier_core::message::{ContentBlock, Role};
    use tasktier_core::provider::ProviderResponse;
    use tasktier_core::tool::{Tool, ToolName};

    /// Echoes its `path` argument; fails when the path is "missing".
    struct EchoRead;

    #[async_trait]
    impl Tool for EchoRead {
        fn name(&self) -> ToolName {
            ToolName::Read
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, input: &serde_json::Value) -> Result<String, ToolError> {
            let path = input["path"].as_str().unwrap_or_default();
            if path == "missing" {
                return Err(ToolError::NotFound { path: path.into() });
            }
            Ok(format!("contents of {path}"))
        }
    }

    /// Never finishes; stands in for a `run` the user gave up on.
    struct Hang;

    #[async_trait]
    impl Tool for Hang {
        fn name(&self) -> ToolName {
            ToolName::Run
        }
        fn description(&self) -> &str {
            "hang"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _input: &serde_json::Value) -> Result<String, ToolError> {
            std::future::pending().await
        }
    }

    fn session(provider: Arc<ScriptedProvider>) -> Session {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoRead));
        Session::new(
            provider,
            Arc::new(registry),
            StaticContext::from_prompt("You manage tasks."),
            Arc::new(EventBus::default()),
        )
    }

    fn read(id: &str, path: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "read".into(),
            input: json!({ "path": path }),
        }
    }

    #[tokio::test]
    async fn final_answer_without_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hello!")]));
        let mut s = session(provider.clone());

        let outcome = s.submit("hi").await.unwrap();
        assert_eq!(outcome, Outcome::Final("Hello!".into()));
        assert_eq!(s.transcript().len(), 2);
        assert_eq!(s.state(), SessionState::AwaitingInput);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn static_context_sent_as_preamble() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("ok")]));
        let mut s = session(provider.clone());
        s.submit("hi").await.unwrap();

        let request = &provider.requests()[0];
        assert_eq!(request.system.as_deref(), Some("You manage tasks."));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
        assert_eq!(request.tools.len(), 1);
    }

    #[tokio::test]
    async fn two_calls_resolved_in_order_before_next_model_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![read("a", "one.md"), read("b", "two.md")]),
            text_response("done"),
        ]));
        let mut s = session(provider.clone());
        let outcome = s.submit("read both").await.unwrap();
        assert_eq!(outcome, Outcome::Final("done".into()));

        // second request saw the assistant turn plus both results, in order
        let second = &provider.requests()[1];
        let ids: Vec<_> = second
            .messages
            .iter()
            .filter_map(|m| m.tool_result_block())
            .map(|r| r.tool_call_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(second.messages.len(), 4);
        assert_eq!(s.transcript().len(), 5);
    }

    #[tokio::test]
    async fn tool_error_fed_back_to_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![read("a", "missing")]),
            text_response("That task does not exist."),
        ]));
        let mut s = session(provider);
        let outcome = s.submit("open it").await.unwrap();
        assert!(matches!(outcome, Outcome::Final(_)));

        let result = s.transcript().messages()[2].tool_result_block().unwrap();
        assert!(result.is_error);
        assert!(result.content.starts_with("Error: Not found"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result() {
        let call = ToolCall {
            id: "x".into(),
            name: "delete_everything".into(),
            input: json!({}),
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![call]),
            text_response("sorry"),
        ]));
        let mut s = session(provider);
        s.submit("go").await.unwrap();
        let result = s.transcript().messages()[2].tool_result_block().unwrap();
        assert!(result.content.contains("Unknown tool"));
    }

    #[tokio::test]
    async fn round_limit_is_exhaustion() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![read("a", "x")]),
            tool_response(vec![read("b", "x")]),
            tool_response(vec![read("c", "x")]),
        ]));
        let mut s = session(provider.clone()).with_settings(SessionSettings {
            max_tool_rounds: 2,
            ..SessionSettings::default()
        });

        let outcome = s.submit("loop forever").await.unwrap();
        assert_eq!(outcome, Outcome::Exhausted(Exhaustion::RoundLimit { rounds: 2 }));
        assert_eq!(provider.call_count(), 3);
        // the third tool request was never appended, so nothing is outstanding
        assert!(s.transcript().outstanding_call_ids().is_empty());
        assert_eq!(s.transcript().len(), 5);
    }

    #[tokio::test]
    async fn truncation_is_distinct_and_resumable() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            truncated_response("Here is the first half"),
            text_response("and the second half."),
        ]));
        let mut s = session(provider);

        let outcome = s.submit("write a lot").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Exhausted(Exhaustion::Truncated {
                partial: "Here is the first half".into()
            })
        );
        let resumed = s.resume().await.unwrap();
        assert_eq!(resumed, Outcome::Final("and the second half.".into()));
        assert_eq!(s.transcript().messages()[2].text(), CONTINUE_PROMPT);
    }

    #[tokio::test]
    async fn truncated_tool_calls_are_dropped() {
        let mut response = tool_response(vec![read("a", "x")]);
        response.stop_reason = StopReason::MaxTokens;
        response
            .message
            .content
            .insert(0, ContentBlock::Text { text: "Let me".into() });
        let provider = Arc::new(ScriptedProvider::new(vec![response]));
        let mut s = session(provider);

        s.submit("go").await.unwrap();
        let last = s.transcript().messages().last().unwrap();
        assert_eq!(last.tool_calls().count(), 0);
        assert!(s.transcript().outstanding_call_ids().is_empty());
    }

    #[tokio::test]
    async fn tool_use_without_calls_is_protocol_error() {
        let mut response = text_response("I will use a tool");
        response.stop_reason = StopReason::ToolUse;
        let provider = Arc::new(ScriptedProvider::new(vec![response, text_response("ok")]));
        let mut s = session(provider);

        let err = s.submit("go").await.unwrap_err();
        match err {
            SessionError::Protocol { transcript_len, .. } => assert_eq!(transcript_len, 1),
            other => panic!("expected protocol error, got {other:?}"),
        }
        assert_eq!(s.state(), SessionState::Error);
        assert_eq!(s.transcript().len(), 1);

        // the session stays usable
        assert!(s.submit("again").await.is_ok());
        assert_eq!(s.state(), SessionState::AwaitingInput);
    }

    #[tokio::test]
    async fn duplicate_call_ids_are_protocol_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_response(vec![
            read("a", "x"),
            read("a", "y"),
        ])]));
        let mut s = session(provider);
        let err = s.submit("go").await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol { .. }));
        assert!(err.to_string().contains("duplicate"));
    }

    #[tokio::test]
    async fn end_turn_with_calls_is_protocol_error() {
        let mut response = tool_response(vec![read("a", "x")]);
        response.stop_reason = StopReason::EndTurn;
        let provider = Arc::new(ScriptedProvider::new(vec![response]));
        let mut s = session(provider);
        assert!(matches!(
            s.submit("go").await.unwrap_err(),
            SessionError::Protocol { .. }
        ));
    }

    #[tokio::test]
    async fn unknown_stop_reason_is_protocol_error() {
        let mut response = text_response("hmm");
        response.stop_reason = StopReason::Other("refusal".into());
        let provider = Arc::new(ScriptedProvider::new(vec![response]));
        let mut s = session(provider);
        let err = s.submit("go").await.unwrap_err();
        assert!(err.to_string().contains("refusal"));
    }

    #[tokio::test]
    async fn empty_input_rejected_without_touching_transcript() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut s = session(provider.clone());
        assert!(matches!(
            s.submit("   \n").await.unwrap_err(),
            SessionError::Input(_)
        ));
        assert!(s.transcript().is_empty());
        assert_eq!(provider.call_count(), 0);
        assert_eq!(s.state(), SessionState::AwaitingInput);
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::Network(
            "connection refused".into(),
        )));
        let mut s = session(provider);
        let err = s.submit("hi").await.unwrap_err();
        assert!(matches!(err, SessionError::Provider(ProviderError::Network(_))));
        assert_eq!(s.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn events_published_for_each_step() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![read("a", "x")]),
            text_response("done"),
        ]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoRead));
        let mut s = Session::new(
            provider,
            Arc::new(registry),
            StaticContext::from_prompt("p"),
            bus,
        );
        s.submit("go").await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::ModelCalled { .. } => "model",
                DomainEvent::ToolExecuted { .. } => "tool",
                DomainEvent::TurnCompleted { .. } => "turn",
                DomainEvent::ProtocolViolation { .. } => "violation",
            });
        }
        assert_eq!(kinds, vec!["model", "tool", "model", "turn"]);
    }

    #[tokio::test]
    async fn accounting_tracks_turns_and_resets() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            text_response("one"),
            text_response("two"),
        ]));
        let mut s = session(provider);
        s.submit("first").await.unwrap();
        s.submit("second").await.unwrap();

        let report = s.report();
        assert_eq!(report.turns.len(), 2);
        assert_eq!(report.model_calls, 2);
        assert_eq!(report.reported.input_tokens, 20);
        assert!(report.totals.always_loaded > 0);

        s.reset();
        assert!(s.transcript().is_empty());
        assert_eq!(s.report().model_calls, 0);
    }

    #[tokio::test]
    async fn empty_final_message_not_appended() {
        let response = ProviderResponse {
            message: Message::assistant_blocks(vec![]),
            ..text_response("")
        };
        let provider = Arc::new(ScriptedProvider::new(vec![response]));
        let mut s = session(provider);
        assert_eq!(s.submit("hi").await.unwrap(), Outcome::Final(String::new()));
        assert_eq!(s.transcript().len(), 1);
    }

    #[tokio::test]
    async fn malformed_response_is_protocol_error() {
        let provider = Arc::new(ScriptedProvider::failing(ProviderError::MalformedResponse(
            "expected value at line 1 column 1".into(),
        )));
        let mut s = session(provider);
        let err = s.submit("hi").await.unwrap_err();
        match err {
            SessionError::Protocol {
                reason,
                transcript_len,
            } => {
                assert!(reason.contains("malformed"));
                assert_eq!(transcript_len, 1);
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
        assert_eq!(s.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn token_budget_ends_submit_between_rounds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![read("a", "x")]),
            tool_response(vec![read("b", "x")]),
            text_response("after reset"),
        ]));
        let mut s = session(provider.clone()).with_settings(SessionSettings {
            max_session_tokens: Some(20),
            ..SessionSettings::default()
        });

        // each scripted call reports 15 tokens
        let outcome = s.submit("keep going").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Exhausted(Exhaustion::TokenBudget { used: 30, limit: 20 })
        );
        assert_eq!(outcome.label(), "token_budget");
        assert_eq!(provider.call_count(), 2);
        assert!(s.transcript().outstanding_call_ids().is_empty());
        assert_eq!(s.transcript().len(), 5);

        // spent budget stops the next submit before any model call
        let again = s.submit("more").await.unwrap();
        assert!(matches!(again, Outcome::Exhausted(Exhaustion::TokenBudget { .. })));
        assert_eq!(provider.call_count(), 2);

        s.reset();
        assert_eq!(
            s.submit("fresh").await.unwrap(),
            Outcome::Final("after reset".into())
        );
    }

    #[tokio::test]
    async fn cancelled_submit_settles_open_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_response(vec![
                read("a", "one.md"),
                ToolCall {
                    id: "b".into(),
                    name: "run".into(),
                    input: json!({"command": "sleep 600"}),
                },
            ]),
            text_response("ok"),
        ]));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoRead));
        registry.register(Box::new(Hang));
        let mut s = Session::new(
            provider,
            Arc::new(registry),
            StaticContext::from_prompt("p"),
            Arc::new(EventBus::default()),
        );

        let cancelled =
            tokio::time::timeout(std::time::Duration::from_millis(50), s.submit("go")).await;
        assert!(cancelled.is_err());
        assert_eq!(s.transcript().outstanding_call_ids(), vec!["b"]);

        let outcome = s.submit("never mind").await.unwrap();
        assert_eq!(outcome, Outcome::Final("ok".into()));
        let settled = s.transcript().messages()[3].tool_result_block().unwrap();
        assert_eq!(settled.tool_call_id, "b");
        assert!(settled.is_error);
        assert!(settled.content.contains("cancelled"));
        assert_eq!(s.transcript().messages()[4].role, Role::User);
        assert_eq!(s.state(), SessionState::AwaitingInput);
    }
}
