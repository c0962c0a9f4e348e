//! Bucket and per-conversation engine state.

use crate::config::{HbsSettings, validate_sizes};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current on-disk state version.
pub const STATE_VERSION: u32 = 1;

/// A folded range `[start, end)` of the eligible-turn sequence.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    /// 0 for leaves, `n + 1` for a merge of two level-`n` buckets.
    pub level: u32,
    pub start: usize,
    pub end: usize,
    pub summary: String,
    pub summary_token_count: usize,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl Bucket {
    pub fn new(
        level: u32,
        start: usize,
        end: usize,
        summary: impl Into<String>,
        summary_token_count: usize,
    ) -> Self {
        Self {
            level,
            start,
            end,
            summary: summary.into(),
            summary_token_count,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Number of turns covered.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the engine knows about one conversation.
///
/// Exclusively owned by one conversation. The engine mutates it in place and
/// the caller persists it after every mutating call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EngineState {
    pub version: u32,
    /// Per-conversation switch, checked by the pre-generation flow.
    pub enabled: bool,
    pub chunk_size: usize,
    pub live_window_size: usize,
    pub max_summary_words: usize,
    /// Every eligible turn before this index is covered by a bucket.
    pub processed_until: usize,
    /// Bucket stack in creation order.
    pub buckets: Vec<Bucket>,
    /// Summarized history changed since the last build.
    pub dirty: bool,
    /// Hash of `[0, history_end)` at the last build. `None` until a baseline exists.
    pub fingerprint: Option<String>,
}

impl EngineState {
    /// Fresh state seeded from the global defaults.
    pub fn new(settings: &HbsSettings) -> Result<Self> {
        Self::with_sizes(
            settings.default_chunk_size,
            settings.default_live_window,
            settings.default_max_summary_words,
        )
    }

    /// Fresh state with explicit sizes.
    pub fn with_sizes(
        chunk_size: usize,
        live_window_size: usize,
        max_summary_words: usize,
    ) -> Result<Self> {
        validate_sizes(chunk_size, live_window_size, max_summary_words)?;
        Ok(Self {
            version: STATE_VERSION,
            enabled: true,
            chunk_size,
            live_window_size,
            max_summary_words,
            processed_until: 0,
            buckets: Vec::new(),
            dirty: false,
            fingerprint: None,
        })
    }

    /// Re-check sizes. Deserialized or hand-edited states may be out of range.
    pub fn validate(&self) -> Result<()> {
        validate_sizes(
            self.chunk_size,
            self.live_window_size,
            self.max_summary_words,
        )
    }

    /// Start of the live window for `total_turns` eligible turns.
    pub fn history_end(&self, total_turns: usize) -> usize {
        total_turns.saturating_sub(self.live_window_size)
    }

    /// Drop all buckets and the fingerprint baseline. Sizes are kept.
    pub fn reset(&mut self) {
        self.processed_until = 0;
        self.buckets.clear();
        self.dirty = false;
        self.fingerprint = None;
    }

    /// Buckets ordered by `start`.
    pub fn sorted_buckets(&self) -> Vec<&Bucket> {
        let mut sorted: Vec<&Bucket> = self.buckets.iter().collect();
        sorted.sort_by_key(|b| b.start);
        sorted
    }

    pub fn bucket_counts_by_level(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for bucket in &self.buckets {
            *counts.entry(bucket.level).or_insert(0) += 1;
        }
        counts
    }

    /// Level tally such as `"L0:1, L1:2"`, or `"none"` without buckets.
    pub fn format_levels(&self) -> String {
        let counts = self.bucket_counts_by_level();
        if counts.is_empty() {
            return "none".to_string();
        }
        counts
            .iter()
            .map(|(level, n)| format!("L{level}:{n}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
