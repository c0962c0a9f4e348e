//! Virtual view composition.
//!
//! The view is always `[summary block]?, remainder…, live window…`, which is
//! the chronological order a prompt builder expects.

use super::fingerprint::clamp_to_history_end;
use super::state::EngineState;
use crate::config::{InjectionRole, RenderConfig, SUMMARY_PLACEHOLDER};
use crate::{Message, MessageRole, Turn};
use serde::Serialize;
use tracing::debug;

/// The injected block carrying every bucket summary.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SummaryBlock {
    pub role: InjectionRole,
    /// Display name derived from the role.
    pub name: String,
    pub text: String,
}

impl SummaryBlock {
    pub fn to_message(&self) -> Message {
        let role = match self.role {
            InjectionRole::System => MessageRole::System,
            InjectionRole::User => MessageRole::User,
            InjectionRole::Assistant => MessageRole::Assistant,
        };
        Message {
            role,
            content: self.text.clone(),
            name: Some(self.name.clone()),
        }
    }
}

/// One element of the virtual view.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "zone", rename_all = "lowercase")]
pub enum ViewEntry<'a> {
    Summary(SummaryBlock),
    /// Verbatim turn in `[processed_until, history_end)`.
    Remainder(&'a Turn),
    /// Verbatim turn in `[history_end, N)`.
    Live(&'a Turn),
}

impl ViewEntry<'_> {
    pub fn to_message(&self) -> Message {
        match self {
            ViewEntry::Summary(block) => block.to_message(),
            ViewEntry::Remainder(turn) | ViewEntry::Live(turn) => turn.to_message(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ViewEntry::Summary(block) => &block.text,
            ViewEntry::Remainder(turn) | ViewEntry::Live(turn) => &turn.text,
        }
    }
}

/// Compose the linear view for `turns`.
///
/// Applies the shrink-clamp first, so the state may be modified.
pub fn build_virtual_view<'a>(
    state: &mut EngineState,
    turns: &'a [Turn],
    render: &RenderConfig,
) -> Vec<ViewEntry<'a>> {
    let history_end = state.history_end(turns.len());
    clamp_to_history_end(state, history_end);

    let mut view = Vec::with_capacity(turns.len().saturating_sub(state.processed_until) + 1);

    if !state.buckets.is_empty() {
        let joined = state
            .sorted_buckets()
            .iter()
            .map(|b| b.summary.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        debug!(buckets = state.buckets.len(), "injecting summary block");
        view.push(ViewEntry::Summary(SummaryBlock {
            role: render.injection_role,
            name: render.injection_role.display_name().to_string(),
            text: render
                .injection_template
                .replacen(SUMMARY_PLACEHOLDER, &joined, 1),
        }));
    }

    view.extend(
        turns[state.processed_until..history_end]
            .iter()
            .map(ViewEntry::Remainder),
    );
    view.extend(turns[history_end..].iter().map(ViewEntry::Live));

    debug!(
        processed_until = state.processed_until,
        history_end,
        entries = view.len(),
        "virtual view built"
    );
    view
}

/// Prompt messages for a composed view.
pub fn view_to_messages(view: &[ViewEntry<'_>]) -> Vec<Message> {
    view.iter().map(ViewEntry::to_message).collect()
}
