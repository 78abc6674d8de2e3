//! Token accounting per memory tier and per turn.
//!
//! Sizes are estimated with a character heuristic (~4 bytes per token,
//! rounded up). Accounting is observational only: every recording method is
//! infallible, arithmetic saturates, and a panic inside attribution is
//! caught and logged instead of reaching the loop.

use serde::Serialize;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tasktier_core::provider::Usage;
use tasktier_core::tool::{ToolCall, ToolResult};
use tasktier_store::{Tier, TierPolicy};
use tracing::warn;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Estimated tokens per tier, plus everything that belongs to no tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierUsage {
    pub always_loaded: usize,
    pub records: usize,
    pub procedures: usize,
    /// User text, assistant text, tool calls, and non-tier tool output
    pub conversation: usize,
}

impl TierUsage {
    fn add(&mut self, tier: Option<Tier>, tokens: usize) {
        let slot = match tier {
            Some(Tier::AlwaysLoaded) => &mut self.always_loaded,
            Some(Tier::Records) => &mut self.records,
            Some(Tier::Procedures) => &mut self.procedures,
            None => &mut self.conversation,
        };
        *slot = slot.saturating_add(tokens);
    }

    pub fn get(&self, tier: Tier) -> usize {
        match tier {
            Tier::AlwaysLoaded => self.always_loaded,
            Tier::Records => self.records,
            Tier::Procedures => self.procedures,
        }
    }

    pub fn total(&self) -> usize {
        self.always_loaded
            .saturating_add(self.records)
            .saturating_add(self.procedures)
            .saturating_add(self.conversation)
    }
}

/// Usage of one submit (including all of its tool rounds).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnUsage {
    pub turn: usize,
    pub estimated: TierUsage,
    pub model_calls: u32,
    pub reported: ReportedTokens,
}

/// Provider-reported token counts, summed over model calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportedTokens {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

impl ReportedTokens {
    fn add(&mut self, usage: &Usage) {
        self.input_tokens = self.input_tokens.saturating_add(u64::from(usage.input_tokens));
        self.output_tokens = self.output_tokens.saturating_add(u64::from(usage.output_tokens));
        self.cache_creation_input_tokens = self
            .cache_creation_input_tokens
            .saturating_add(u64::from(usage.cache_creation_input_tokens));
        self.cache_read_input_tokens = self
            .cache_read_input_tokens
            .saturating_add(u64::from(usage.cache_read_input_tokens));
    }

    /// All four counts; this is what a session token budget is charged.
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_input_tokens)
            .saturating_add(self.cache_read_input_tokens)
    }
}

/// Everything accumulated since the session started (or was reset).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountingReport {
    pub totals: TierUsage,
    pub model_calls: u32,
    pub reported: ReportedTokens,
    pub turns: Vec<TurnUsage>,
}

impl AccountingReport {
    pub fn last_turn(&self) -> Option<&TurnUsage> {
        self.turns.last()
    }
}

impl fmt::Display for AccountingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Turns: {}", self.turns.len())?;
        writeln!(f, "Model calls: {}", self.model_calls)?;
        writeln!(f, "Token usage (provider-reported):")?;
        let reported = &self.reported;
        writeln!(f, "  Input Tokens: {}", reported.input_tokens)?;
        writeln!(f, "  Output Tokens: {}", reported.output_tokens)?;
        writeln!(f, "  Cache Write Tokens: {}", reported.cache_creation_input_tokens)?;
        writeln!(f, "  Cache Read Tokens: {}", reported.cache_read_input_tokens)?;
        writeln!(f, "  Total Tokens: {}", reported.total())?;
        writeln!(f, "Estimated tokens by tier:")?;
        for tier in Tier::ALL {
            writeln!(f, "  {tier}: {}", self.totals.get(tier))?;
        }
        write!(f, "  conversation: {}", self.totals.conversation)
    }
}

pub struct TokenAccountant {
    policy: Option<TierPolicy>,
    report: AccountingReport,
}

impl TokenAccountant {
    /// Without a policy every tool result counts as conversation.
    pub fn new(policy: Option<TierPolicy>) -> Self {
        Self {
            policy,
            report: AccountingReport::default(),
        }
    }

    pub fn report(&self) -> &AccountingReport {
        &self.report
    }

    pub fn reset(&mut self) {
        self.report = AccountingReport::default();
    }

    /// Start accounting a new submit.
    pub fn begin_turn(&mut self) {
        let turn = self.report.turns.len().saturating_add(1);
        self.report.turns.push(TurnUsage {
            turn,
            ..TurnUsage::default()
        });
    }

    /// One model call: the preamble is re-sent each time.
    pub fn record_model_call(&mut self, static_context: &str, usage: Option<Usage>) {
        let tokens = estimate_tokens(static_context);
        self.add(Some(Tier::AlwaysLoaded), tokens);
        self.report.model_calls = self.report.model_calls.saturating_add(1);
        if let Some(u) = &usage {
            self.report.reported.add(u);
        }
        if let Some(turn) = self.report.turns.last_mut() {
            turn.model_calls = turn.model_calls.saturating_add(1);
            if let Some(u) = &usage {
                turn.reported.add(u);
            }
        }
    }

    /// Text entering the transcript outside any tier.
    pub fn record_text(&mut self, text: &str) {
        self.add(None, estimate_tokens(text));
    }

    /// A tool call's input entering the transcript.
    pub fn record_tool_call(&mut self, call: &ToolCall) {
        let tokens = estimate_tokens(&call.name).saturating_add(estimate_tokens(&call.input.to_string()));
        self.add(None, tokens);
    }

    /// A tool result entering the transcript, attributed through the policy.
    /// Error results never count as tier content.
    pub fn record_tool_result(&mut self, call: &ToolCall, result: &ToolResult) {
        let policy = self.policy.as_ref();
        let tier = if result.is_error {
            None
        } else {
            match catch_unwind(AssertUnwindSafe(|| policy.and_then(|p| p.classify_call(call)))) {
                Ok(tier) => tier,
                Err(_) => {
                    warn!(call_id = %call.id, "Tier attribution panicked; counting as conversation");
                    None
                }
            }
        };
        self.add(tier, estimate_tokens(&result.content));
    }

    fn add(&mut self, tier: Option<Tier>, tokens: usize) {
        self.report.totals.add(tier, tokens);
        if let Some(turn) = self.report.turns.last_mut() {
            turn.estimated.add(tier, tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasktier_store::Layout;

    fn read_call(path: &str) -> ToolCall {
        ToolCall {
            id: "c1".into(),
            name: "read".into(),
            input: serde_json::json!({ "path": path }),
        }
    }

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("test"), 1);
        assert_eq!(estimate_tokens("hello"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(100)), 25);
    }

    #[test]
    fn attributes_by_tier() {
        let dir = tempfile::tempdir().unwrap();
        let policy = TierPolicy::new(Layout::with_defaults(dir.path()).unwrap());
        let mut acc = TokenAccountant::new(Some(policy));
        acc.begin_turn();
        acc.record_model_call(
            "abcdefgh",
            Some(Usage {
                input_tokens: 100,
                output_tokens: 20,
                ..Usage::default()
            }),
        );
        acc.record_text("user says hi");
        acc.record_tool_result(
            &read_call("memories/tasks/task-001.md"),
            &ToolResult::success("c1", "x".repeat(40)),
        );
        acc.record_tool_result(
            &read_call("skills/plan/SKILL.md"),
            &ToolResult::success("c1", "y".repeat(8)),
        );

        let report = acc.report();
        assert_eq!(report.totals.always_loaded, 2);
        assert_eq!(report.totals.records, 10);
        assert_eq!(report.totals.procedures, 2);
        assert_eq!(report.totals.conversation, 3);
        assert_eq!(report.reported.input_tokens, 100);
        assert_eq!(report.reported.total(), 120);
        assert_eq!(report.turns[0].model_calls, 1);
        assert_eq!(report.turns[0].estimated, report.totals);
    }

    #[test]
    fn error_results_are_conversation() {
        let dir = tempfile::tempdir().unwrap();
        let policy = TierPolicy::new(Layout::with_defaults(dir.path()).unwrap());
        let mut acc = TokenAccountant::new(Some(policy));
        let failed = ToolResult {
            is_error: true,
            ..ToolResult::success("c1", "Error: Not found")
        };
        acc.record_tool_result(&read_call("memories/tasks/missing.md"), &failed);
        assert_eq!(acc.report().totals.records, 0);
        assert_eq!(acc.report().totals.conversation, 4);
    }

    #[test]
    fn monotonic_until_reset() {
        let mut acc = TokenAccountant::new(None);
        acc.begin_turn();
        acc.record_text("aaaa");
        let first = acc.report().totals.total();
        acc.begin_turn();
        acc.record_text("bbbb");
        assert!(acc.report().totals.total() > first);
        assert_eq!(acc.report().turns.len(), 2);
        acc.reset();
        assert_eq!(acc.report(), &AccountingReport::default());
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let mut usage = TierUsage {
            conversation: usize::MAX,
            ..TierUsage::default()
        };
        usage.add(None, 10);
        assert_eq!(usage.conversation, usize::MAX);
        assert_eq!(usage.total(), usize::MAX);
    }

    #[test]
    fn cache_tokens_reported_per_turn_and_session() {
        let mut acc = TokenAccountant::new(None);
        let cached = Usage {
            input_tokens: 10,
            output_tokens: 5,
            cache_creation_input_tokens: 300,
            cache_read_input_tokens: 0,
        };
        acc.begin_turn();
        acc.record_model_call("", Some(cached));
        acc.begin_turn();
        acc.record_model_call(
            "",
            Some(Usage {
                cache_creation_input_tokens: 0,
                cache_read_input_tokens: 300,
                ..cached
            }),
        );
        acc.record_model_call("", None);

        let report = acc.report();
        assert_eq!(report.model_calls, 3);
        assert_eq!(report.reported.cache_creation_input_tokens, 300);
        assert_eq!(report.reported.cache_read_input_tokens, 300);
        assert_eq!(report.reported.total(), 630);
        assert_eq!(report.turns[1].model_calls, 2);
        assert_eq!(report.turns[1].reported.cache_read_input_tokens, 300);

        let text = report.to_string();
        assert!(text.contains("Cache Write Tokens: 300"));
        assert!(text.contains("Total Tokens: 630"));
    }

    #[test]
    fn report_display_lists_tiers() {
        let acc = TokenAccountant::new(None);
        let text = acc.report().to_string();
        assert!(text.contains("always_loaded: 0"));
        assert!(text.contains("records: 0"));
        assert!(text.contains("procedures: 0"));
        assert!(text.contains("conversation: 0"));
    }
}
