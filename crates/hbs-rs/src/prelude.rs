//! Convenience re-exports for common `hbs-rs` types.
//!
//! ```ignore
//! use hbs_rs::prelude::*;
//! ```
//!
//! Pulls in what a host needs to drive one conversation: turns and messages,
//! settings, the engine entry points, and the summarizer backends.
//! Lower-level pieces (fingerprint helpers, the merge cascade, wire types)
//! stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{HbsError, Message, MessageRole, Result, Turn, eligible_turns};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{HbsSettings, InjectionRole, RenderConfig};

// ── Engine ──────────────────────────────────────────────────────────
pub use crate::engine::chunker::BuildReport;
pub use crate::engine::{
    Bucket, BucketManager, Conversation, EngineState, PrepareOutcome, TokenStats, ViewEntry,
    build_virtual_view, compute_stats, view_to_messages,
};

// ── Summarization ───────────────────────────────────────────────────
pub use crate::summarize::{
    BackendConfig, OpenAiSummarizer, RetryConfig, ScriptedSummarizer, Summarizer, SummaryMode,
    SummaryRequest,
};

// ── Tokens and persistence ──────────────────────────────────────────
pub use crate::store::StateStore;
pub use crate::tokens::{CharRatioCounter, TokenCounter};
