//! Deterministic summarizer for tests and offline dry runs.
//!
//! Returns `leaf[start-end)` / `merge[start-end)` without any network I/O
//! and records every request it receives.

use super::{Summarizer, Summary, SummaryFuture, SummaryMode, SummaryRequest};
use crate::error::HbsError;
use std::sync::Mutex;

/// Records calls and answers with a predictable label.
#[derive(Debug, Default)]
pub struct ScriptedSummarizer {
    requests: Mutex<Vec<SummaryRequest>>,
    /// 1-based call number that fails with a transport error.
    fail_on: Option<usize>,
    /// Answer with whitespace instead of text.
    empty: bool,
}

impl ScriptedSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th call (1-based) with [`HbsError::Transport`].
    pub fn fail_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    /// Answer every call with empty content.
    pub fn returning_empty(mut self) -> Self {
        self.empty = true;
        self
    }

    /// Number of calls received so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.requests.lock().map_or(0, |r| r.len())
    }

    /// Copy of every request received so far.
    pub fn requests(&self) -> Vec<SummaryRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Forget recorded calls. The failure trigger keeps counting from 1.
    pub fn clear(&self) {
        if let Ok(mut r) = self.requests.lock() {
            r.clear();
        }
    }

    fn answer(&self, request: SummaryRequest) -> Result<Summary, HbsError> {
        let call = {
            let mut log = self
                .requests
                .lock()
                .map_err(|_| HbsError::Transport("scripted summarizer poisoned".into()))?;
            log.push(request.clone());
            log.len()
        };

        if self.fail_on == Some(call) {
            return Err(HbsError::Transport(format!(
                "scripted failure on call {call}"
            )));
        }
        if self.empty {
            return Err(HbsError::EmptyResult(format!("{} call {call}", request.mode)));
        }

        let label = match request.mode {
            SummaryMode::Leaf => "leaf",
            SummaryMode::Merge => "merge",
        };
        let text = format!("{label}[{}-{})", request.start, request.end);
        let token_count = text.split_whitespace().count();
        Ok(Summary { text, token_count })
    }
}

impl Summarizer for ScriptedSummarizer {
    fn summarize(&self, request: SummaryRequest) -> SummaryFuture<'_> {
        let result = self.answer(request);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(start: usize, end: usize) -> SummaryRequest {
        SummaryRequest {
            mode: SummaryMode::Leaf,
            text: "U: a".into(),
            max_words: 10,
            start,
            end,
        }
    }

    #[tokio::test]
    async fn labels_follow_range() {
        let s = ScriptedSummarizer::new();
        let out = s.summarize(leaf(0, 2)).await.unwrap();
        assert_eq!(out.text, "leaf[0-2)");
        assert_eq!(s.calls(), 1);
        assert_eq!(s.requests()[0].start, 0);
    }

    #[tokio::test]
    async fn fails_on_requested_call() {
        let s = ScriptedSummarizer::new().fail_on(2);
        assert!(s.summarize(leaf(0, 2)).await.is_ok());
        let err = s.summarize(leaf(2, 4)).await.unwrap_err();
        assert!(matches!(err, HbsError::Transport(_)));
        assert!(s.summarize(leaf(4, 6)).await.is_ok());
        assert_eq!(s.calls(), 3);
    }

    #[tokio::test]
    async fn empty_mode_reports_empty_result() {
        let s = ScriptedSummarizer::new().returning_empty();
        let err = s.summarize(leaf(0, 2)).await.unwrap_err();
        assert!(matches!(err, HbsError::EmptyResult(_)));
    }
}
