//! Merge cascade: binary-counter carry over the bucket stack.
//!
//! While the two most recent buckets share a level and touch, they are
//! replaced by one bucket a level higher. At most one bucket per level
//! survives a full cascade, so the stack stays logarithmic in the number of
//! folded chunks.

use super::state::{Bucket, EngineState};
use super::summary_token_count;
use crate::error::Result;
use crate::summarize::{Summarizer, SummaryMode, SummaryRequest};
use crate::tokens::TokenCounter;
use tracing::debug;

/// Text sent to the summarizer for a merge.
pub fn format_merge(first: &str, second: &str) -> String {
    format!("S1: {first}\n\nS2: {second}")
}

/// The two topmost buckets when they are mergeable.
fn mergeable_pair(buckets: &[Bucket]) -> Option<(&Bucket, &Bucket)> {
    let [.., first, second] = buckets else {
        return None;
    };
    (first.level == second.level && first.end == second.start).then_some((first, second))
}

/// Collapse the top of the stack until no mergeable pair remains.
///
/// Operands are only removed once their merged summary exists, so a failed
/// call leaves the stack as it was before that step. Merges completed
/// earlier in the same cascade stay committed. Returns the number of merges.
pub async fn merge_carry(
    state: &mut EngineState,
    summarizer: &dyn Summarizer,
    counter: Option<&dyn TokenCounter>,
) -> Result<usize> {
    let mut merges = 0;

    while let Some((first, second)) = mergeable_pair(&state.buckets) {
        let level = first.level;
        let (start, end) = (first.start, second.end);
        debug!(level, start, end, "merging buckets");

        let request = SummaryRequest {
            mode: SummaryMode::Merge,
            text: format_merge(&first.summary, &second.summary),
            max_words: state.max_summary_words,
            start,
            end,
        };
        let summary = summarizer.summarize(request).await?;
        let tokens = summary_token_count(counter, &summary);

        let keep = state.buckets.len() - 2;
        state.buckets.truncate(keep);
        state
            .buckets
            .push(Bucket::new(level + 1, start, end, summary.text, tokens));
        merges += 1;
    }

    Ok(merges)
}
