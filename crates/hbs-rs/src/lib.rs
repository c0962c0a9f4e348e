//! Hierarchical bucket summarization for long conversations.
//!
//! `hbs-rs` keeps a compact, size-bounded representation of an ever-growing
//! log of conversational turns. Old ranges are lazily folded into summary
//! *buckets* that merge like the digits of a binary counter, while the most
//! recent turns stay verbatim. The linear view handed to a prompt builder
//! therefore grows logarithmically, not linearly, with conversation length.
//!
//! The core is [`engine::BucketManager`]: it chunks unsummarized turns into
//! leaf buckets, runs the merge cascade, and guards already-summarized history
//! with a content fingerprint. Summaries come from any [`Summarizer`]
//! implementation; the crate ships an OpenAI-compatible HTTP backend and a
//! deterministic scripted one.
//!
//! # Getting started
//!
//! ```
//! use hbs_rs::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hbs_rs::Result<()> {
//! let settings = HbsSettings::default().with_chunk_size(2).with_live_window(1);
//! let mut state = EngineState::new(&settings)?;
//! let turns: Vec<Turn> = (0..5)
//!     .map(|i| Turn::new(format!("turn {i}"), i % 2 == 0))
//!     .collect();
//!
//! let summarizer = ScriptedSummarizer::new();
//! BucketManager::new(&summarizer)
//!     .ensure_up_to_date(&mut state, &turns)
//!     .await?;
//!
//! // Two leaves folded into one level-1 bucket, one live turn kept verbatim.
//! assert_eq!(state.buckets.len(), 1);
//! assert_eq!(state.buckets[0].level, 1);
//!
//! let view = build_virtual_view(&mut state, &turns, &settings.render_config());
//! assert_eq!(view.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`engine`] | Bucket state, chunker, merge cascade, fingerprint guard, view composer, token stats, per-conversation facade |
//! | [`summarize`] | [`Summarizer`] trait, OpenAI-compatible backend, retry policy, scripted backend |
//! | [`config`] | [`HbsSettings`](config::HbsSettings) defaults and render options |
//! | [`tokens`] | [`TokenCounter`](tokens::TokenCounter) trait and a char-ratio estimator |
//! | [`store`] | Atomic JSON persistence for [`EngineState`](engine::EngineState) |
//!
//! The engine holds no durable storage of its own. Callers persist the state
//! after every mutating call, typically through [`store::StateStore`].

pub mod config;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod store;
pub mod summarize;
pub mod tokens;

pub use error::{HbsError, Result};
pub use summarize::Summarizer;

use serde::{Deserialize, Serialize};

// ── Turn types ─────────────────────────────────────────────────────

/// One conversational entry as supplied by the host.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub text: String,
    /// Spoken by the user (`U:`) rather than the assistant (`A:`).
    pub is_user: bool,
    /// Authored by the host itself. Never summarized or shown.
    #[serde(default)]
    pub is_system: bool,
}

impl Turn {
    pub fn new(text: impl Into<String>, is_user: bool) -> Self {
        Self {
            text: text.into(),
            is_user,
            is_system: false,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    /// Host-authored entry, excluded from the eligible sequence.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_user: false,
            is_system: true,
        }
    }

    /// A user or assistant turn.
    pub fn is_dialogue(&self) -> bool {
        !self.is_system
    }

    /// Prompt message for this turn.
    pub fn to_message(&self) -> Message {
        if self.is_user {
            Message::user(&self.text)
        } else {
            Message::assistant(&self.text)
        }
    }
}

/// The eligible subsequence: every non-system turn, in order.
pub fn eligible_turns(turns: &[Turn]) -> Vec<Turn> {
    turns.iter().filter(|t| t.is_dialogue()).cloned().collect()
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in a prompt.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in a chat-completions prompt.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    /// Display name, set on the injected summary block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
