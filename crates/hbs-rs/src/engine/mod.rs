//! The bucket engine: folding old turns into hierarchical summaries.
//!
//! Data flows leaves first:
//!
//! - [`chunker`]: [`BucketManager`] creates level-0 buckets for every full
//!   chunk of unsummarized history and owns the atomic rebuild.
//! - [`cascade`]: merges equal-level neighbours after every new bucket.
//! - [`fingerprint`]: detects edits to summarized history and clamps the
//!   state when the live window grows.
//! - [`view`]: composes `[summary block]?, remainder…, live window…`.
//! - [`stats`]: per-zone token totals for the caller's budget decisions.
//! - [`conversation`]: one state behind a re-entrancy guard, plus the
//!   pre-generation flow.
//!
//! Turn indices everywhere refer to the *eligible* sequence (system turns
//! removed, see [`eligible_turns`](crate::eligible_turns)).

pub mod cascade;
pub mod chunker;
pub mod conversation;
pub mod fingerprint;
pub mod state;
pub mod stats;
pub mod view;

pub use chunker::{BucketManager, format_turns_for_leaf};
pub use conversation::{Conversation, PrepareOutcome};
pub use fingerprint::{check_dirty, clamp_to_history_end, compute_fingerprint};
pub use state::{Bucket, EngineState};
pub use stats::{TokenStats, compute_stats};
pub use view::{SummaryBlock, ViewEntry, build_virtual_view, view_to_messages};

use crate::summarize::Summary;
use crate::tokens::TokenCounter;

/// Token count stored on a new bucket: the local counter when it answers,
/// otherwise whatever the backend reported.
pub(crate) fn summary_token_count(counter: Option<&dyn TokenCounter>, summary: &Summary) -> usize {
    counter
        .and_then(|c| c.count_tokens(&summary.text))
        .unwrap_or(summary.token_count)
}
