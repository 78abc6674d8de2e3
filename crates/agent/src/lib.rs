//! The agentic loop for TaskTier.
//!
//! A [`Session`] follows a **call → dispatch → observe** cycle:
//!
//! 1. **Receive** the user's text and append it to the transcript
//! 2. **Call the model** with the transcript and the always-loaded preamble
//! 3. **If tool calls**: dispatch each in order, append results, loop back to 2
//! 4. **If a final answer**: return it to the caller
//!
//! Truncation, the tool-round cap, and the session token budget end a submit
//! as an [`Exhaustion`] so the caller can decide whether to resume. The
//! [`TokenAccountant`] watches every step without affecting it.

pub mod accountant;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use accountant::{
    AccountingReport, ReportedTokens, TierUsage, TokenAccountant, TurnUsage, estimate_tokens,
};
pub use session::{
    CONTINUE_PROMPT, Exhaustion, Outcome, Session, SessionError, SessionSettings, SessionState,
};
