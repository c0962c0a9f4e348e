//! Leaf creation and atomic rebuild.

use super::cascade::merge_carry;
use super::fingerprint::compute_fingerprint;
use super::state::{Bucket, EngineState};
use super::summary_token_count;
use crate::Turn;
use crate::error::Result;
use crate::summarize::{Summarizer, SummaryMode, SummaryRequest};
use crate::tokens::TokenCounter;
use tracing::{debug, error, info};

/// Render a chunk as `U: …` / `A: …` lines separated by blank lines.
pub fn format_turns_for_leaf(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| {
            let role = if t.is_user { "U" } else { "A" };
            format!("{role}: {}", t.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// What one build pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Leaf buckets created.
    pub leaves: usize,
    /// Merges performed by the cascade.
    pub merges: usize,
}

impl BuildReport {
    /// Number of summarizer calls made.
    pub fn calls(&self) -> usize {
        self.leaves + self.merges
    }
}

/// Drives the summarizer over an [`EngineState`].
///
/// Holds no state of its own; one manager can serve any number of
/// conversations as long as each state sees one operation at a time.
pub struct BucketManager<'a> {
    summarizer: &'a dyn Summarizer,
    counter: Option<&'a dyn TokenCounter>,
}

impl<'a> BucketManager<'a> {
    pub fn new(summarizer: &'a dyn Summarizer) -> Self {
        Self {
            summarizer,
            counter: None,
        }
    }

    /// Count bucket summary tokens locally instead of trusting the backend.
    pub fn with_token_counter(mut self, counter: &'a dyn TokenCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn token_counter(&self) -> Option<&'a dyn TokenCounter> {
        self.counter
    }

    /// Fold every full chunk of history before the live window.
    ///
    /// A summarizer failure aborts the pass. Buckets created earlier in the
    /// same pass stay committed; use [`rebuild`](Self::rebuild) when the
    /// whole operation must be all-or-nothing.
    pub async fn ensure_up_to_date(
        &self,
        state: &mut EngineState,
        turns: &[Turn],
    ) -> Result<BuildReport> {
        state.validate()?;
        let history_end = state.history_end(turns.len());
        debug!(
            processed_until = state.processed_until,
            history_end,
            total = turns.len(),
            chunk_size = state.chunk_size,
            "bucket check"
        );

        let mut report = BuildReport::default();

        // Pairs can be left over when an earlier cascade failed mid-way.
        report.merges += merge_carry(state, self.summarizer, self.counter).await?;

        // A loaded state may carry an arbitrarily large chunk size.
        while let Some(end) = state
            .processed_until
            .checked_add(state.chunk_size)
            .filter(|end| *end <= history_end)
        {
            let start = state.processed_until;
            debug!(start, end, "creating leaf bucket");

            let request = SummaryRequest {
                mode: SummaryMode::Leaf,
                text: format_turns_for_leaf(&turns[start..end]),
                max_words: state.max_summary_words,
                start,
                end,
            };
            let summary = self.summarizer.summarize(request).await?;
            let tokens = summary_token_count(self.counter, &summary);

            state
                .buckets
                .push(Bucket::new(0, start, end, summary.text, tokens));
            state.processed_until = end;
            report.leaves += 1;

            report.merges += merge_carry(state, self.summarizer, self.counter).await?;
        }

        state.fingerprint = compute_fingerprint(turns, history_end);
        state.dirty = false;
        debug!(
            leaves = report.leaves,
            merges = report.merges,
            processed_until = state.processed_until,
            levels = %state.format_levels(),
            "bucket build complete"
        );
        Ok(report)
    }

    /// Discard all buckets and re-derive them from scratch.
    ///
    /// On failure the state is restored exactly as it was and the error is
    /// returned.
    pub async fn rebuild(&self, state: &mut EngineState, turns: &[Turn]) -> Result<BuildReport> {
        state.validate()?;
        let snapshot = state.clone();
        state.reset();

        match self.ensure_up_to_date(state, turns).await {
            Ok(report) => {
                info!(
                    old = snapshot.buckets.len(),
                    new = state.buckets.len(),
                    "rebuilt buckets"
                );
                Ok(report)
            }
            Err(e) => {
                error!("rebuild failed, restoring previous state: {e}");
                *state = snapshot;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HbsError;
    use crate::summarize::ScriptedSummarizer;
    use crate::tokens::CharRatioCounter;

    fn turns(n: usize) -> Vec<Turn> {
        (0..n)
            .map(|i| Turn::new(format!("message {i}"), i % 2 == 0))
            .collect()
    }

    fn state(chunk: usize, live: usize) -> EngineState {
        EngineState::with_sizes(chunk, live, 50).unwrap()
    }

    #[test]
    fn leaf_format_prefixes_speaker() {
        let chunk = vec![Turn::user("  hello "), Turn::assistant("hi there")];
        assert_eq!(format_turns_for_leaf(&chunk), "U: hello\n\nA: hi there");
    }

    #[tokio::test]
    async fn five_turns_fold_into_one_level_one_bucket() {
        let summarizer = ScriptedSummarizer::new();
        let mut s = state(2, 1);
        let t = turns(5);

        let report = BucketManager::new(&summarizer)
            .ensure_up_to_date(&mut s, &t)
            .await
            .unwrap();

        assert_eq!(report, BuildReport { leaves: 2, merges: 1 });
        assert_eq!(summarizer.calls(), 3);
        assert_eq!(s.buckets.len(), 1);
        assert_eq!(s.buckets[0].level, 1);
        assert_eq!((s.buckets[0].start, s.buckets[0].end), (0, 4));
        assert_eq!(s.processed_until, 4);
        assert!(s.fingerprint.is_some());
        assert!(!s.dirty);

        let requests = summarizer.requests();
        assert_eq!(requests[0].mode, SummaryMode::Leaf);
        assert_eq!(requests[0].text, "U: message 0\n\nA: message 1");
        assert_eq!(requests[2].mode, SummaryMode::Merge);
    }

    #[tokio::test]
    async fn live_window_covering_everything_builds_nothing() {
        let summarizer = ScriptedSummarizer::new();
        let mut s = state(2, 10);
        let report = BucketManager::new(&summarizer)
            .ensure_up_to_date(&mut s, &turns(5))
            .await
            .unwrap();
        assert_eq!(report.calls(), 0);
        assert!(s.buckets.is_empty());
        assert!(s.fingerprint.is_none());
    }

    #[tokio::test]
    async fn partial_chunk_left_as_remainder() {
        let summarizer = ScriptedSummarizer::new();
        let mut s = state(3, 1);
        BucketManager::new(&summarizer)
            .ensure_up_to_date(&mut s, &turns(6))
            .await
            .unwrap();
        // history_end = 5: one leaf [0,3), remainder [3,5)
        assert_eq!(s.processed_until, 3);
        assert_eq!(s.buckets.len(), 1);
    }

    #[tokio::test]
    async fn second_run_makes_no_calls() {
        let summarizer = ScriptedSummarizer::new();
        let manager = BucketManager::new(&summarizer);
        let mut s = state(2, 1);
        let t = turns(9);

        manager.ensure_up_to_date(&mut s, &t).await.unwrap();
        let calls = summarizer.calls();
        let report = manager.ensure_up_to_date(&mut s, &t).await.unwrap();

        assert_eq!(report.calls(), 0);
        assert_eq!(summarizer.calls(), calls);
    }

    #[tokio::test]
    async fn failure_keeps_earlier_leaves() {
        let summarizer = ScriptedSummarizer::new().fail_on(2);
        let mut s = state(2, 1);
        let err = BucketManager::new(&summarizer)
            .ensure_up_to_date(&mut s, &turns(5))
            .await
            .unwrap_err();

        assert!(matches!(err, HbsError::Transport(_)));
        assert_eq!(s.buckets.len(), 1);
        assert_eq!(s.processed_until, 2);
    }

    #[tokio::test]
    async fn failed_merge_is_retried_on_next_build() {
        let summarizer = ScriptedSummarizer::new().fail_on(3);
        let manager = BucketManager::new(&summarizer);
        let mut s = state(2, 1);
        let t = turns(5);

        let err = manager.ensure_up_to_date(&mut s, &t).await.unwrap_err();
        assert!(matches!(err, HbsError::Transport(_)));
        // both leaves survive the failed merge
        assert_eq!(s.format_levels(), "L0:2");
        assert_eq!(s.processed_until, 4);

        let report = manager.ensure_up_to_date(&mut s, &t).await.unwrap();
        assert_eq!(report, BuildReport { leaves: 0, merges: 1 });
        assert_eq!(summarizer.calls(), 4);
        assert_eq!(s.buckets.len(), 1);
        assert_eq!((s.buckets[0].level, s.buckets[0].start, s.buckets[0].end), (1, 0, 4));
    }

    #[tokio::test]
    async fn huge_chunk_size_builds_nothing() {
        let summarizer = ScriptedSummarizer::new();
        let mut s = state(2, 1);
        s.chunk_size = usize::MAX;
        s.processed_until = 2;
        s.buckets = vec![Bucket::new(0, 0, 2, "old", 1)];

        let report = BucketManager::new(&summarizer)
            .ensure_up_to_date(&mut s, &turns(9))
            .await
            .unwrap();
        assert_eq!(report.calls(), 0);
        assert_eq!(s.processed_until, 2);
    }

    #[tokio::test]
    async fn invalid_state_fails_before_any_call() {
        let summarizer = ScriptedSummarizer::new();
        let mut s = state(2, 1);
        s.chunk_size = 0;
        let err = BucketManager::new(&summarizer)
            .ensure_up_to_date(&mut s, &turns(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HbsError::InvalidArgument(_)));
        assert_eq!(summarizer.calls(), 0);
    }

    #[tokio::test]
    async fn local_counter_sets_bucket_tokens() {
        let summarizer = ScriptedSummarizer::new();
        let counter = CharRatioCounter::default();
        let mut s = state(2, 1);
        BucketManager::new(&summarizer)
            .with_token_counter(&counter)
            .ensure_up_to_date(&mut s, &turns(3))
            .await
            .unwrap();
        // "leaf[0-2)" is 9 chars
        assert_eq!(s.buckets[0].summary_token_count, 3);
    }

    #[tokio::test]
    async fn rebuild_failure_restores_state() {
        let mut s = state(2, 1);
        s.buckets = vec![Bucket::new(0, 0, 2, "old", 1)];
        s.processed_until = 2;
        s.dirty = true;
        s.fingerprint = Some("stale".into());
        let before = s.clone();

        let summarizer = ScriptedSummarizer::new().fail_on(1);
        let result = BucketManager::new(&summarizer)
            .rebuild(&mut s, &turns(5))
            .await;

        assert!(result.is_err());
        assert_eq!(s, before);
        assert_eq!(s.buckets[0].summary, "old");
    }

    #[tokio::test]
    async fn rebuild_rederives_from_scratch() {
        let mut s = state(2, 1);
        s.buckets = vec![Bucket::new(0, 0, 2, "old", 1)];
        s.processed_until = 2;
        s.dirty = true;

        let summarizer = ScriptedSummarizer::new();
        let report = BucketManager::new(&summarizer)
            .rebuild(&mut s, &turns(5))
            .await
            .unwrap();

        assert_eq!(report.calls(), 3);
        assert_eq!(s.buckets.len(), 1);
        assert_eq!(s.buckets[0].summary, "merge[0-4)");
        assert!(!s.dirty);
    }
}
