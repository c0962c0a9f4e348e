//! OpenAI-compatible `chat/completions` backend.
//!
//! Configuration comes from the environment (see [`BackendConfig::from_env`]).
//! An unconfigured backend is not an error until the first call, so hosts can
//! construct it eagerly and surface [`health`](OpenAiSummarizer::health) to
//! the user.

use super::{RetryConfig, Summarizer, Summary, SummaryFuture, SummaryRequest};
use crate::Message;
use crate::error::{HbsError, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default model when `HBS_SUMM_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Per-request timeout when `HBS_SUMM_TIMEOUT_SECS` is unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const NOT_CONFIGURED: &str =
    "set environment variables HBS_SUMM_BASE_URL, HBS_SUMM_API_KEY, HBS_SUMM_MODEL";

// ── Configuration ──────────────────────────────────────────────────

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct BackendConfig {
    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Whole-request timeout, connect through body.
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 256,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl BackendConfig {
    /// Read `HBS_SUMM_BASE_URL`, `HBS_SUMM_API_KEY`, `HBS_SUMM_MODEL`,
    /// `HBS_SUMM_TEMPERATURE`, `HBS_SUMM_MAX_TOKENS` and
    /// `HBS_SUMM_TIMEOUT_SECS`. Unparseable numbers fall back to their
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            base_url: var("HBS_SUMM_BASE_URL").unwrap_or_default(),
            api_key: var("HBS_SUMM_API_KEY").unwrap_or_default(),
            model: var("HBS_SUMM_MODEL").unwrap_or(defaults.model),
            temperature: var("HBS_SUMM_TEMPERATURE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.temperature),
            max_tokens: var("HBS_SUMM_MAX_TOKENS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_tokens),
            timeout: var("HBS_SUMM_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map_or(defaults.timeout, Duration::from_secs),
        }
    }

    /// Explicit endpoint and key, other fields defaulted.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL, API key and model are all present.
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty() && !self.model.is_empty()
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Result of [`OpenAiSummarizer::health`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BackendHealth {
    pub configured: bool,
    pub model: String,
    pub message: String,
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: Option<RawResponseMessage>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
struct UsageInfo {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Summarizer backed by an OpenAI-compatible HTTP endpoint.
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    config: BackendConfig,
    retry: RetryConfig,
}

impl OpenAiSummarizer {
    /// Build a client with the configured request timeout.
    pub fn new(config: BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("hbs-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| HbsError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            retry: RetryConfig::default(),
        })
    }

    /// Shorthand for `new(BackendConfig::from_env())`.
    pub fn from_env() -> Result<Self> {
        Self::new(BackendConfig::from_env())
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn health(&self) -> BackendHealth {
        let configured = self.config.is_configured();
        BackendHealth {
            configured,
            model: self.config.model.clone(),
            message: if configured {
                "summarization backend is configured and ready".into()
            } else {
                format!("summarization backend not configured: {NOT_CONFIGURED}")
            },
        }
    }

    async fn complete(&self, request: &SummaryRequest) -> Result<Summary> {
        if !self.config.is_configured() {
            return Err(HbsError::Configuration(NOT_CONFIGURED.into()));
        }

        let messages = request.to_messages();
        let body = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        debug!(
            mode = %request.mode,
            start = request.start,
            end = request.end,
            "summarize request: model={}, max_words={}, text_len={}",
            self.config.model,
            request.max_words,
            request.text.len()
        );
        trace!(
            body_bytes = serde_json::to_string(&body).map_or(0, |s| s.len()),
            "summary request body"
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| self.map_send_error(e))?;

        debug!(
            "summarize response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(HbsError::Transport(format!("HTTP {status}: {text}")));
        }

        let parsed: RawChatResponse = serde_json::from_str(&text)
            .map_err(|e| HbsError::Transport(format!("invalid response format: {e}")))?;

        if let Some(ref usage) = parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens.unwrap_or(0),
                completion_tokens = usage.completion_tokens.unwrap_or(0),
                "summarizer usage"
            );
        }

        let message = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .ok_or_else(|| HbsError::Transport("invalid response format: no choices".into()))?;

        let summary = message.content.unwrap_or_default().trim().to_string();
        if summary.is_empty() {
            return Err(HbsError::EmptyResult(format!(
                "{} [{}, {})",
                request.mode, request.start, request.end
            )));
        }

        debug!("summary generated: {} chars", summary.len());

        Ok(Summary {
            text: summary,
            token_count: parsed
                .usage
                .and_then(|u| u.completion_tokens)
                .map_or(0, |n| n as usize),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> HbsError {
        if e.is_timeout() {
            HbsError::Transport(format!(
                "request timed out after {}",
                describe_timeout(self.config.timeout)
            ))
        } else {
            HbsError::Transport(format!("request failed: {e}"))
        }
    }
}

/// `"30 seconds"` for whole seconds, `"250 ms"` otherwise.
fn describe_timeout(timeout: Duration) -> String {
    if timeout.subsec_nanos() == 0 {
        format!("{} seconds", timeout.as_secs())
    } else {
        format!("{} ms", timeout.as_millis())
    }
}

impl Summarizer for OpenAiSummarizer {
    fn summarize(&self, request: SummaryRequest) -> SummaryFuture<'_> {
        Box::pin(async move { self.retry.run(|| self.complete(&request)).await })
    }
}
