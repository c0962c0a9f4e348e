//! Token counting for budget reporting.
//!
//! The engine never needs exact counts; it reports per-zone totals so the
//! caller can decide whether a prompt fits. Any tokenizer can be plugged in
//! through [`TokenCounter`]. [`CharRatioCounter`] is a dependency-free
//! estimate good enough for budget warnings.

use tracing::warn;

/// Characters per token assumed when no calibration is given.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Estimates the token cost of arbitrary text.
pub trait TokenCounter: Send + Sync {
    /// Count tokens in `text`, or `None` if the counter is unavailable.
    fn count_tokens(&self, text: &str) -> Option<usize>;
}

/// Character-ratio estimator.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioCounter {
    chars_per_token: f64,
}

impl CharRatioCounter {
    /// Use a calibrated ratio. Pass `None` for [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn with_calibration(chars_per_token: Option<f64>) -> Self {
        Self {
            chars_per_token: chars_per_token
                .filter(|r| *r > 0.0)
                .unwrap_or(DEFAULT_CHARS_PER_TOKEN),
        }
    }
}

impl Default for CharRatioCounter {
    fn default() -> Self {
        Self::with_calibration(None)
    }
}

impl TokenCounter for CharRatioCounter {
    fn count_tokens(&self, text: &str) -> Option<usize> {
        let chars = text.chars().count();
        Some((chars as f64 / self.chars_per_token).ceil() as usize)
    }
}

/// Count tokens, falling back to `0` with a warning when no count is available.
///
/// Token counts only feed reports, so an unavailable counter must never fail
/// the caller.
pub fn count_or_zero(counter: Option<&dyn TokenCounter>, text: &str) -> usize {
    match counter.and_then(|c| c.count_tokens(text)) {
        Some(n) => n,
        None => {
            warn!("token counting not available, reporting 0");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable;

    impl TokenCounter for Unavailable {
        fn count_tokens(&self, _text: &str) -> Option<usize> {
            None
        }
    }

    #[test]
    fn ratio_counter_rounds_up() {
        let counter = CharRatioCounter::default();
        assert_eq!(counter.count_tokens(""), Some(0));
        assert_eq!(counter.count_tokens("abc"), Some(1));
        assert_eq!(counter.count_tokens(&"a".repeat(35)), Some(10));
        assert_eq!(counter.count_tokens(&"a".repeat(36)), Some(11));
    }

    #[test]
    fn calibrated_ratio_changes_estimate() {
        let coarse = CharRatioCounter::with_calibration(Some(7.0));
        let fine = CharRatioCounter::default();
        let text = "x".repeat(70);
        assert!(coarse.count_tokens(&text) < fine.count_tokens(&text));
    }

    #[test]
    fn non_positive_calibration_ignored() {
        let counter = CharRatioCounter::with_calibration(Some(0.0));
        assert_eq!(counter.count_tokens(&"a".repeat(7)), Some(2));
    }

    #[test]
    fn unavailable_counter_reports_zero() {
        assert_eq!(count_or_zero(Some(&Unavailable), "hello world"), 0);
        assert_eq!(count_or_zero(None, "hello world"), 0);
        assert_eq!(count_or_zero(Some(&CharRatioCounter::default()), "hello w"), 2);
    }
}
