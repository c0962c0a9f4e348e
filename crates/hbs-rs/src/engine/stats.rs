//! Per-zone token accounting. Reports only; budget enforcement is the
//! caller's job.

use super::state::EngineState;
use crate::Turn;
use crate::tokens::{TokenCounter, count_or_zero};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Token totals for the three zones of the view.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenStats {
    /// Sum of every bucket's `summary_token_count`.
    pub bucket_tokens: usize,
    /// Turns in `[processed_until, history_end)`.
    pub remainder_tokens: usize,
    /// Turns in `[history_end, N)`.
    pub live_tokens: usize,
    pub total_virtual: usize,
    pub processed_until: usize,
    pub history_end: usize,
    pub total_turns: usize,
    pub bucket_count: usize,
}

impl TokenStats {
    /// Single-line summary for logs and the CLI.
    pub fn to_log_string(&self) -> String {
        format!(
            "total={} (buckets={} remainder={} live={}) | processed={}/{} turns={} buckets={}",
            self.total_virtual,
            self.bucket_tokens,
            self.remainder_tokens,
            self.live_tokens,
            self.processed_until,
            self.history_end,
            self.total_turns,
            self.bucket_count,
        )
    }
}

fn count_turns(counter: Option<&dyn TokenCounter>, turns: &[Turn]) -> usize {
    let Some(counter) = counter else {
        if !turns.is_empty() {
            warn!("token counting not available, reporting 0");
        }
        return 0;
    };
    turns
        .iter()
        .filter(|t| !t.text.is_empty())
        .map(|t| count_or_zero(Some(counter), &t.text))
        .sum()
}

/// Compute zone totals without modifying the state.
pub fn compute_stats(
    state: &EngineState,
    turns: &[Turn],
    counter: Option<&dyn TokenCounter>,
) -> TokenStats {
    let history_end = state.history_end(turns.len());
    let remainder_start = state.processed_until.min(history_end);

    let bucket_tokens = state.buckets.iter().map(|b| b.summary_token_count).sum();
    let remainder_tokens = count_turns(counter, &turns[remainder_start..history_end]);
    let live_tokens = count_turns(counter, &turns[history_end..]);

    let stats = TokenStats {
        bucket_tokens,
        remainder_tokens,
        live_tokens,
        total_virtual: bucket_tokens + remainder_tokens + live_tokens,
        processed_until: state.processed_until,
        history_end,
        total_turns: turns.len(),
        bucket_count: state.buckets.len(),
    };
    debug!("token stats: {}", stats.to_log_string());
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::Bucket;

    /// One token per character.
    struct PerChar;

    impl TokenCounter for PerChar {
        fn count_tokens(&self, text: &str) -> Option<usize> {
            Some(text.chars().count())
        }
    }

    fn turns(texts: &[&str]) -> Vec<Turn> {
        texts.iter().map(|t| Turn::user(*t)).collect()
    }

    #[test]
    fn zones_sum_to_total() {
        let mut s = EngineState::with_sizes(2, 1, 50).unwrap();
        s.buckets = vec![Bucket::new(0, 0, 2, "x", 7)];
        s.processed_until = 2;
        // history_end = 4: remainder [2,4), live [4,5)
        let t = turns(&["aa", "bb", "ccc", "dddd", "eeeee"]);

        let stats = compute_stats(&s, &t, Some(&PerChar));
        assert_eq!(stats.bucket_tokens, 7);
        assert_eq!(stats.remainder_tokens, 7);
        assert_eq!(stats.live_tokens, 5);
        assert_eq!(stats.total_virtual, 19);
        assert_eq!(stats.history_end, 4);
        assert_eq!(stats.total_turns, 5);
        assert_eq!(stats.bucket_count, 1);
    }

    #[test]
    fn missing_counter_reports_zero_for_turns() {
        let mut s = EngineState::with_sizes(2, 1, 50).unwrap();
        s.buckets = vec![Bucket::new(0, 0, 2, "x", 3)];
        s.processed_until = 2;
        let stats = compute_stats(&s, &turns(&["a", "b", "c", "d"]), None);
        assert_eq!(stats.remainder_tokens, 0);
        assert_eq!(stats.live_tokens, 0);
        assert_eq!(stats.total_virtual, 3);
    }

    #[test]
    fn unclamped_state_has_empty_remainder() {
        let mut s = EngineState::with_sizes(2, 1, 50).unwrap();
        s.processed_until = 8;
        let stats = compute_stats(&s, &turns(&["a", "b", "c"]), Some(&PerChar));
        assert_eq!(stats.remainder_tokens, 0);
        assert_eq!(stats.live_tokens, 1);
    }

    #[test]
    fn log_string_mentions_every_zone() {
        let stats = TokenStats {
            bucket_tokens: 1,
            remainder_tokens: 2,
            live_tokens: 3,
            total_virtual: 6,
            ..Default::default()
        };
        let line = stats.to_log_string();
        assert!(line.starts_with("total=6"));
        assert!(line.contains("remainder=2"));
        assert!(line.contains("live=3"));
    }
}
