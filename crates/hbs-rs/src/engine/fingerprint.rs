//! Staleness detection for already-summarized history.
//!
//! The fingerprint is an FNV-1a hash over the texts of `[0, history_end)`
//! joined with `|||`. It detects retroactive edits or deletions without
//! per-turn versioning.

use super::state::EngineState;
use crate::Turn;
use tracing::{debug, info};

const SEPARATOR: &str = "|||";

/// Hash of the turns before `history_end`, `None` when that range is empty.
pub fn compute_fingerprint(turns: &[Turn], history_end: usize) -> Option<String> {
    let end = history_end.min(turns.len());
    if end == 0 {
        return None;
    }

    let mut hash: u64 = 0xcbf29ce484222325;
    let mut feed = |bytes: &[u8]| {
        for byte in bytes {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    };
    for (i, turn) in turns[..end].iter().enumerate() {
        if i > 0 {
            feed(SEPARATOR.as_bytes());
        }
        feed(turn.text.as_bytes());
    }
    Some(format!("{hash:016x}"))
}

/// Compare the stored fingerprint with current content.
///
/// The first call only records a baseline. A mismatch marks the state dirty
/// once anything has been summarized; otherwise the stored flag is returned.
pub fn check_dirty(state: &mut EngineState, turns: &[Turn], history_end: usize) -> bool {
    let current = compute_fingerprint(turns, history_end);

    if state.fingerprint.is_none() {
        debug!("no fingerprint stored, recording baseline");
        state.fingerprint = current;
        return false;
    }

    if state.processed_until > 0 && current != state.fingerprint {
        debug!(
            processed_until = state.processed_until,
            history_end, "fingerprint mismatch, summarized history changed"
        );
        state.dirty = true;
        return true;
    }

    state.dirty
}

/// Drop buckets that reach past `history_end`.
///
/// Runs when the live window grew or history was truncated. Returns whether
/// anything changed; a clamp always marks the state dirty.
pub fn clamp_to_history_end(state: &mut EngineState, history_end: usize) -> bool {
    if state.processed_until <= history_end {
        return false;
    }

    let before = state.buckets.len();
    let old_processed = state.processed_until;
    state.buckets.retain(|b| b.end <= history_end);
    state.processed_until = state.buckets.last().map_or(0, |b| b.end);
    state.dirty = true;

    info!(
        history_end,
        old_processed_until = old_processed,
        processed_until = state.processed_until,
        dropped = before - state.buckets.len(),
        "history shrank below processed range, clamped buckets"
    );
    true
}
