//! Summarization backends.
//!
//! The engine talks to summarization only through the [`Summarizer`] trait.
//! Two request modes exist: [`SummaryMode::Leaf`] condenses a rendered chunk
//! of raw turns, [`SummaryMode::Merge`] fuses two consecutive summaries into
//! one. Calls within one build pass are awaited strictly in sequence.
//!
//! - [`openai`]: OpenAI-compatible `chat/completions` backend.
//! - [`retry`]: exponential backoff for transient transport errors.
//! - [`scripted`]: deterministic backend for tests and offline dry runs.

pub mod openai;
pub mod retry;
pub mod scripted;

pub use openai::{BackendConfig, OpenAiSummarizer};
pub use retry::RetryConfig;
pub use scripted::ScriptedSummarizer;

use crate::Message;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

const LEAF_SYSTEM_PROMPT: &str = "\
You are a precise summarizer. Summarize the following conversation excerpt.
Focus on: key facts, character actions, plot developments, emotional states.
Output only the summary, no preamble or meta-commentary.";

const MERGE_SYSTEM_PROMPT: &str = "\
You are a precise summarizer. Merge these two consecutive summaries into one cohesive summary.
Preserve chronological order and key information from both.
Output only the merged summary, no preamble or meta-commentary.";

/// Boxed future returned by [`Summarizer::summarize`].
pub type SummaryFuture<'a> = Pin<Box<dyn Future<Output = Result<Summary>> + Send + 'a>>;

/// Which kind of summary is being requested.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    Leaf,
    Merge,
}

impl std::fmt::Display for SummaryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryMode::Leaf => write!(f, "leaf"),
            SummaryMode::Merge => write!(f, "merge"),
        }
    }
}

/// One summarization call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SummaryRequest {
    pub mode: SummaryMode,
    /// Rendered chunk (leaf) or `S1:`/`S2:` pair (merge).
    pub text: String,
    pub max_words: usize,
    /// Start of the eligible-turn range this summary will cover.
    pub start: usize,
    /// End (exclusive) of the covered range.
    pub end: usize,
}

impl SummaryRequest {
    /// Build the (system, user) prompt pair for a one-shot chat completion.
    pub fn to_messages(&self) -> Vec<Message> {
        let (system, user) = match self.mode {
            SummaryMode::Leaf => (
                LEAF_SYSTEM_PROMPT,
                format!(
                    "Summarize the following conversation in under {} words:\n\n{}",
                    self.max_words, self.text
                ),
            ),
            SummaryMode::Merge => (
                MERGE_SYSTEM_PROMPT,
                format!(
                    "Merge these summaries into one summary under {} words:\n\n{}",
                    self.max_words, self.text
                ),
            ),
        };
        vec![Message::system(system), Message::user(user)]
    }
}

/// A summary returned by a backend.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    /// Token count reported by the backend, `0` when unknown.
    pub token_count: usize,
}

/// Turns text into a short summary.
///
/// Implementations must fail with [`HbsError::Configuration`](crate::HbsError::Configuration)
/// when no backend is usable, [`HbsError::Transport`](crate::HbsError::Transport)
/// when the call fails or times out, and [`HbsError::EmptyResult`](crate::HbsError::EmptyResult)
/// when the backend returns no text.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, request: SummaryRequest) -> SummaryFuture<'_>;
}
