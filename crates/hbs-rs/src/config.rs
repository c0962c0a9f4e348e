//! Global settings with defaults resolved once at load time.
//!
//! [`HbsSettings`] holds the values a host keeps across conversations: the
//! defaults used to seed each new [`EngineState`](crate::engine::EngineState)
//! and the options controlling how the summary block is injected into the
//! view. Per-conversation values live in the state itself.
//!
//! # Example
//!
//! ```
//! use hbs_rs::config::{HbsSettings, InjectionRole};
//!
//! let settings = HbsSettings::default()
//!     .with_chunk_size(4)
//!     .with_injection_role(InjectionRole::User);
//! assert!(settings.validate().is_ok());
//! ```

use crate::error::{HbsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Placeholder replaced by the joined bucket summaries.
pub const SUMMARY_PLACEHOLDER: &str = "{{summary}}";

/// Default injection template.
pub const DEFAULT_INJECTION_TEMPLATE: &str = "[Summary of earlier conversation:]\n{{summary}}";

/// Default number of turns folded into one leaf bucket.
pub const DEFAULT_CHUNK_SIZE: usize = 8;

/// Default number of most recent turns kept verbatim.
pub const DEFAULT_LIVE_WINDOW: usize = 12;

/// Default word limit passed to the summarizer.
pub const DEFAULT_MAX_SUMMARY_WORDS: usize = 120;

/// Role under which the summary block is injected.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InjectionRole {
    #[default]
    System,
    User,
    Assistant,
}

impl InjectionRole {
    /// Display name attached to the injected entry.
    pub fn display_name(self) -> &'static str {
        match self {
            InjectionRole::System => "System",
            InjectionRole::User => "User",
            InjectionRole::Assistant => "HBS Summary",
        }
    }
}

impl std::fmt::Display for InjectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InjectionRole::System => write!(f, "system"),
            InjectionRole::User => write!(f, "user"),
            InjectionRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for InjectionRole {
    type Err = HbsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(InjectionRole::System),
            "user" => Ok(InjectionRole::User),
            "assistant" => Ok(InjectionRole::Assistant),
            other => Err(HbsError::InvalidArgument(format!(
                "injection role must be one of system|user|assistant, got '{other}'"
            ))),
        }
    }
}

/// How the summary block is rendered into the view.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    /// Template containing [`SUMMARY_PLACEHOLDER`].
    pub injection_template: String,
    /// Role of the injected entry.
    pub injection_role: InjectionRole,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            injection_template: DEFAULT_INJECTION_TEMPLATE.to_string(),
            injection_role: InjectionRole::System,
        }
    }
}

/// Settings shared by every conversation on a host.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct HbsSettings {
    /// Master switch. When off, the pre-generation hook does nothing.
    pub enabled_globally: bool,
    /// Chunk size for newly created conversation states.
    pub default_chunk_size: usize,
    /// Live window for newly created conversation states.
    pub default_live_window: usize,
    /// Word limit for newly created conversation states.
    pub default_max_summary_words: usize,
    /// Template for the injected summary block.
    pub injection_template: String,
    /// Role of the injected summary block.
    pub injection_role: InjectionRole,
    /// Emit debug-level engine logs.
    pub debug_output: bool,
}

impl Default for HbsSettings {
    fn default() -> Self {
        Self {
            enabled_globally: true,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            default_live_window: DEFAULT_LIVE_WINDOW,
            default_max_summary_words: DEFAULT_MAX_SUMMARY_WORDS,
            injection_template: DEFAULT_INJECTION_TEMPLATE.to_string(),
            injection_role: InjectionRole::System,
            debug_output: false,
        }
    }
}

impl HbsSettings {
    /// Load settings from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            HbsError::Persistence(format!("failed to read settings {}: {e}", path.display()))
        })?;
        let settings: Self = serde_json::from_str(&json).map_err(|e| {
            HbsError::InvalidArgument(format!("failed to parse settings {}: {e}", path.display()))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_chunk_size(mut self, n: usize) -> Self {
        self.default_chunk_size = n;
        self
    }

    pub fn with_live_window(mut self, n: usize) -> Self {
        self.default_live_window = n;
        self
    }

    pub fn with_max_summary_words(mut self, n: usize) -> Self {
        self.default_max_summary_words = n;
        self
    }

    pub fn with_injection_template(mut self, template: impl Into<String>) -> Self {
        self.injection_template = template.into();
        self
    }

    pub fn with_injection_role(mut self, role: InjectionRole) -> Self {
        self.injection_role = role;
        self
    }

    /// Check every recognized option against its allowed range.
    pub fn validate(&self) -> Result<()> {
        validate_sizes(
            self.default_chunk_size,
            self.default_live_window,
            self.default_max_summary_words,
        )?;
        validate_template(&self.injection_template)
    }

    /// The render options for the view composer.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            injection_template: self.injection_template.clone(),
            injection_role: self.injection_role,
        }
    }
}

/// Reject non-positive sizes. Shared by settings and engine state.
pub fn validate_sizes(chunk_size: usize, live_window: usize, max_words: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(HbsError::InvalidArgument(
            "chunk_size must be at least 1".into(),
        ));
    }
    if live_window == 0 {
        return Err(HbsError::InvalidArgument(
            "live_window_size must be at least 1".into(),
        ));
    }
    if max_words == 0 {
        return Err(HbsError::InvalidArgument(
            "max_summary_words must be at least 1".into(),
        ));
    }
    Ok(())
}

/// The injection template must contain the summary placeholder.
pub fn validate_template(template: &str) -> Result<()> {
    if !template.contains(SUMMARY_PLACEHOLDER) {
        return Err(HbsError::InvalidArgument(format!(
            "injection template must contain {SUMMARY_PLACEHOLDER}"
        )));
    }
    Ok(())
}
