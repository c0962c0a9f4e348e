//! One conversation's state behind a re-entrancy guard.
//!
//! Every operation first tries to take the guard. If another operation on the
//! same conversation is still in flight the call is skipped and returns
//! `None`; it is never queued. Conversations share nothing, so operations on
//! different conversations never contend.
//!
//! Methods take the host's full turn list and filter out system turns
//! themselves.

use super::chunker::{BucketManager, BuildReport};
use super::fingerprint::check_dirty;
use super::state::EngineState;
use super::stats::{TokenStats, compute_stats};
use super::view::{build_virtual_view, view_to_messages};
use crate::config::{HbsSettings, RenderConfig};
use crate::error::Result;
use crate::tokens::TokenCounter;
use crate::{Message, Turn, eligible_turns};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Result of [`Conversation::prepare`].
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PrepareOutcome {
    /// Send `messages` instead of the original turns.
    Ready {
        messages: Vec<Message>,
        stats: TokenStats,
    },
    /// Generation must not proceed.
    Abort {
        reason: String,
        stats: Option<TokenStats>,
    },
}

/// Owner of one [`EngineState`].
pub struct Conversation {
    id: String,
    state: Mutex<EngineState>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, state: EngineState) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether an operation currently holds the guard.
    pub fn is_busy(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// Copy of the current state, waiting for any in-flight operation.
    pub async fn snapshot(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    pub fn into_state(self) -> EngineState {
        self.state.into_inner()
    }

    fn guard(&self, op: &str) -> Option<MutexGuard<'_, EngineState>> {
        match self.state.try_lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                debug!(conversation = %self.id, op, "operation already in progress, skipping");
                None
            }
        }
    }

    /// Fold any newly foldable history. `Ok(None)` when skipped or disabled.
    pub async fn force_build(
        &self,
        manager: &BucketManager<'_>,
        chat: &[Turn],
    ) -> Result<Option<BuildReport>> {
        let Some(mut state) = self.guard("build") else {
            return Ok(None);
        };
        if !state.enabled {
            warn!(conversation = %self.id, "summarization disabled for this conversation");
            return Ok(None);
        }

        let turns = eligible_turns(chat);
        match manager.ensure_up_to_date(&mut state, &turns).await {
            Ok(report) => {
                info!(
                    conversation = %self.id,
                    leaves = report.leaves,
                    merges = report.merges,
                    levels = %state.format_levels(),
                    "buckets built"
                );
                Ok(Some(report))
            }
            Err(e) => {
                error!(conversation = %self.id, "failed to build buckets: {e}");
                Err(e)
            }
        }
    }

    /// Re-derive every bucket. The state is unchanged on error.
    pub async fn rebuild(
        &self,
        manager: &BucketManager<'_>,
        chat: &[Turn],
    ) -> Result<Option<BuildReport>> {
        let Some(mut state) = self.guard("rebuild") else {
            return Ok(None);
        };
        if !state.enabled {
            warn!(conversation = %self.id, "summarization disabled for this conversation");
            return Ok(None);
        }

        let turns = eligible_turns(chat);
        manager.rebuild(&mut state, &turns).await.map(Some)
    }

    /// Drop every bucket. Returns `false` when skipped.
    pub fn reset(&self) -> bool {
        let Some(mut state) = self.guard("reset") else {
            return false;
        };
        state.reset();
        info!(conversation = %self.id, "state reset");
        true
    }

    /// Fingerprint check against the current history.
    pub fn check_dirty(&self, chat: &[Turn]) -> Option<bool> {
        let mut state = self.guard("check")?;
        let turns = eligible_turns(chat);
        let history_end = state.history_end(turns.len());
        Some(check_dirty(&mut state, &turns, history_end))
    }

    pub fn stats(&self, chat: &[Turn], counter: Option<&dyn TokenCounter>) -> Option<TokenStats> {
        let state = self.guard("stats")?;
        Some(compute_stats(&state, &eligible_turns(chat), counter))
    }

    /// The composed view as prompt messages. May clamp the state.
    pub fn view(&self, chat: &[Turn], render: &RenderConfig) -> Option<Vec<Message>> {
        let mut state = self.guard("view")?;
        let turns = eligible_turns(chat);
        Some(view_to_messages(&build_virtual_view(
            &mut state, &turns, render,
        )))
    }

    /// Pre-generation flow: build, compose, and check the budget.
    ///
    /// Returns `None` when nothing should change: summarization is disabled
    /// or another operation is in flight. A build failure is logged and the
    /// existing buckets are used.
    pub async fn prepare(
        &self,
        manager: &BucketManager<'_>,
        settings: &HbsSettings,
        chat: &[Turn],
        context_tokens: usize,
    ) -> Option<PrepareOutcome> {
        if !settings.enabled_globally {
            return None;
        }
        let mut state = self.guard("prepare")?;
        if !state.enabled {
            return None;
        }

        let turns = eligible_turns(chat);
        let counter = manager.token_counter();
        debug!(
            conversation = %self.id,
            turns = turns.len(),
            context_tokens,
            "preparing virtual prompt"
        );

        let live = compute_stats(&state, &turns, counter).live_tokens;
        if live > context_tokens {
            let reason = format!(
                "live window alone ({live} tokens) exceeds context ({context_tokens}); \
                 reduce the live window or shorten recent turns"
            );
            error!(conversation = %self.id, "{reason}");
            return Some(PrepareOutcome::Abort {
                reason,
                stats: None,
            });
        }

        if let Err(e) = manager.ensure_up_to_date(&mut state, &turns).await {
            warn!(conversation = %self.id, "{e}. continuing without new summaries");
        }

        let messages = view_to_messages(&build_virtual_view(
            &mut state,
            &turns,
            &settings.render_config(),
        ));
        let stats = compute_stats(&state, &turns, counter);
        debug!(
            conversation = %self.id,
            messages = messages.len(),
            original = chat.len(),
            "virtual prompt: {}",
            stats.to_log_string()
        );

        if stats.total_virtual > context_tokens {
            let reason = format!(
                "virtual prompt ({} tokens) exceeds context ({context_tokens}); \
                 reduce the live window or max summary words",
                stats.total_virtual
            );
            error!(conversation = %self.id, "{reason}");
            return Some(PrepareOutcome::Abort {
                reason,
                stats: Some(stats),
            });
        }

        Some(PrepareOutcome::Ready { messages, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::ScriptedSummarizer;
    use crate::tokens::CharRatioCounter;

    fn chat(n: usize) -> Vec<Turn> {
        (0..n)
            .map(|i| Turn::new(format!("message number {i}"), i % 2 == 0))
            .collect()
    }

    fn conversation() -> Conversation {
        Conversation::new("chat-1", EngineState::with_sizes(2, 1, 50).unwrap())
    }

    #[tokio::test]
    async fn force_build_ignores_system_turns() {
        let summarizer = ScriptedSummarizer::new();
        let manager = BucketManager::new(&summarizer);
        let conv = conversation();
        let mut turns = chat(5);
        turns.insert(1, Turn::system("[scene change]"));

        let report = conv.force_build(&manager, &turns).await.unwrap().unwrap();
        assert_eq!(report.calls(), 3);
        assert!(!summarizer.requests()[0].text.contains("scene change"));
        assert_eq!(conv.snapshot().await.processed_until, 4);
    }

    #[tokio::test]
    async fn disabled_conversation_skips_build() {
        let summarizer = ScriptedSummarizer::new();
        let mut state = EngineState::with_sizes(2, 1, 50).unwrap();
        state.enabled = false;
        let conv = Conversation::new("c", state);

        let out = conv
            .force_build(&BucketManager::new(&summarizer), &chat(5))
            .await
            .unwrap();
        assert!(out.is_none());
        assert_eq!(summarizer.calls(), 0);
    }

    #[tokio::test]
    async fn held_guard_skips_operations() {
        let conv = conversation();
        let held = conv.state.try_lock().unwrap();
        assert!(conv.is_busy());
        assert!(!conv.reset());
        assert!(conv.check_dirty(&chat(3)).is_none());
        drop(held);
        assert!(conv.reset());
    }

    #[tokio::test]
    async fn prepare_returns_view_and_stats() {
        let summarizer = ScriptedSummarizer::new();
        let counter = CharRatioCounter::default();
        let manager = BucketManager::new(&summarizer).with_token_counter(&counter);
        let conv = conversation();

        let outcome = conv
            .prepare(&manager, &HbsSettings::default(), &chat(5), 10_000)
            .await
            .unwrap();
        let PrepareOutcome::Ready { messages, stats } = outcome else {
            panic!("expected ready outcome");
        };
        assert_eq!(messages.len(), 2);
        assert_eq!(stats.bucket_count, 1);
        assert!(stats.total_virtual > 0);
    }

    #[tokio::test]
    async fn prepare_aborts_when_live_window_too_large() {
        let summarizer = ScriptedSummarizer::new();
        let counter = CharRatioCounter::default();
        let manager = BucketManager::new(&summarizer).with_token_counter(&counter);

        let outcome = conversation()
            .prepare(&manager, &HbsSettings::default(), &chat(5), 1)
            .await
            .unwrap();
        assert!(matches!(outcome, PrepareOutcome::Abort { stats: None, .. }));
        assert_eq!(summarizer.calls(), 0);
    }

    #[tokio::test]
    async fn prepare_aborts_when_virtual_prompt_too_large() {
        let summarizer = ScriptedSummarizer::new();
        let counter = CharRatioCounter::default();
        let manager = BucketManager::new(&summarizer).with_token_counter(&counter);

        // live turn "message number 4" is 5 tokens; summary block adds more
        let outcome = conversation()
            .prepare(&manager, &HbsSettings::default(), &chat(5), 6)
            .await
            .unwrap();
        let PrepareOutcome::Abort { stats, .. } = outcome else {
            panic!("expected abort");
        };
        assert!(stats.unwrap().total_virtual > 6);
    }

    #[tokio::test]
    async fn prepare_continues_after_build_failure() {
        let summarizer = ScriptedSummarizer::new().fail_on(1);
        let manager = BucketManager::new(&summarizer);
        let conv = conversation();

        let outcome = conv
            .prepare(&manager, &HbsSettings::default(), &chat(5), 10_000)
            .await
            .unwrap();
        let PrepareOutcome::Ready { messages, .. } = outcome else {
            panic!("expected ready outcome");
        };
        // No buckets: every eligible turn is shown verbatim.
        assert_eq!(messages.len(), 5);
    }

    #[tokio::test]
    async fn prepare_skipped_when_globally_disabled() {
        let summarizer = ScriptedSummarizer::new();
        let settings = HbsSettings {
            enabled_globally: false,
            ..HbsSettings::default()
        };
        let out = conversation()
            .prepare(&BucketManager::new(&summarizer), &settings, &chat(5), 100)
            .await;
        assert!(out.is_none());
    }
}
