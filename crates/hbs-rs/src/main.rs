//! Fold a conversation into hierarchical summary buckets and print the result.
//!
//! The summarization backend is configured through `HBS_SUMM_BASE_URL`,
//! `HBS_SUMM_API_KEY` and `HBS_SUMM_MODEL`. `--dry-run` swaps it for a
//! deterministic offline summarizer.
//!
//! # Examples
//!
//! ```sh
//! # Fold everything older than the live window
//! hbs --chat chat.json --state chat.hbs.json build
//!
//! # Try settings without touching the network
//! hbs --chat chat.json --state /tmp/s.json --chunk-size 4 --live-window 6 --dry-run view
//!
//! # Pre-generation check against a 4k context
//! hbs --chat chat.json --state chat.hbs.json prepare --context-tokens 4096
//!
//! # Start over
//! hbs --state chat.hbs.json reset
//! ```

use clap::{Parser, Subcommand};
use hbs_rs::config::{HbsSettings, InjectionRole, validate_template};
use hbs_rs::engine::{BucketManager, Conversation, EngineState};
use hbs_rs::store::{load_state, save_state};
use hbs_rs::summarize::{OpenAiSummarizer, RetryConfig, ScriptedSummarizer, Summarizer};
use hbs_rs::tokens::CharRatioCounter;
use hbs_rs::{HbsError, Result, Turn};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Hierarchical bucket summarizer for long conversations.
#[derive(Parser)]
#[command(name = "hbs", version)]
struct Cli {
    // ── Inputs ─────────────────────────────────────────────────
    /// JSON array of turns: [{"text": "...", "is_user": true, "is_system": false}]
    #[arg(long, global = true)]
    chat: Option<PathBuf>,

    /// Engine state file (created on first use)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Settings JSON file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    // ── Overrides ──────────────────────────────────────────────
    /// Turns per leaf bucket
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Most recent turns kept verbatim
    #[arg(long, global = true)]
    live_window: Option<usize>,

    /// Word limit per summary
    #[arg(long, global = true)]
    max_words: Option<usize>,

    /// Injection template; must contain {{summary}}
    #[arg(long, global = true)]
    template: Option<String>,

    /// Role of the injected summary block (system, user, assistant)
    #[arg(long, global = true)]
    role: Option<InjectionRole>,

    // ── Backend ────────────────────────────────────────────────
    /// Use the deterministic offline summarizer
    #[arg(long, global = true)]
    dry_run: bool,

    /// Retries for transient backend errors
    #[arg(long, global = true, default_value_t = 0)]
    retries: u32,

    /// Characters per token for the token estimate
    #[arg(long, global = true)]
    chars_per_token: Option<f64>,

    // ── Output ─────────────────────────────────────────────────
    /// Debug-level logs
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fold every full chunk older than the live window
    Build,
    /// Discard all buckets and re-summarize from scratch
    Rebuild,
    /// Delete all buckets
    Reset,
    /// Print the virtual view as JSON messages
    View,
    /// Print per-zone token totals
    Stats,
    /// Report whether summarized history changed
    Check,
    /// Build, compose and check the view against a context budget
    Prepare {
        /// Context size in tokens
        #[arg(long)]
        context_tokens: usize,
    },
    /// Report backend configuration
    Health,
}

impl Command {
    fn mutates_state(&self) -> bool {
        !matches!(self, Command::Stats | Command::Health)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(debug: bool) {
    let default = if debug { "hbs_rs=debug,hbs=debug" } else { "info" };
    let filter = if debug {
        EnvFilter::new(default)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn require<'a>(path: &'a Option<PathBuf>, flag: &str) -> Result<&'a Path> {
    path.as_deref()
        .ok_or_else(|| HbsError::InvalidArgument(format!("{flag} is required for this command")))
}

fn load_settings(cli: &Cli) -> Result<HbsSettings> {
    let mut settings = match &cli.settings {
        Some(path) => HbsSettings::load(path)?,
        None => HbsSettings::default(),
    };
    if let Some(template) = &cli.template {
        validate_template(template)?;
        settings.injection_template = template.clone();
    }
    if let Some(role) = cli.role {
        settings.injection_role = role;
    }
    Ok(settings)
}

fn load_chat(path: &Path) -> Result<Vec<Turn>> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        HbsError::InvalidArgument(format!("failed to read chat '{}': {e}", path.display()))
    })?;
    serde_json::from_str(&json).map_err(|e| {
        HbsError::InvalidArgument(format!("failed to parse chat '{}': {e}", path.display()))
    })
}

/// Stored state (or a fresh one) with per-invocation size overrides applied.
fn load_engine_state(cli: &Cli, path: &Path, settings: &HbsSettings) -> Result<EngineState> {
    let mut state = match load_state(path)? {
        Some(state) => state,
        None => {
            info!(path = %path.display(), "no state file, starting fresh");
            EngineState::new(settings)?
        }
    };
    if let Some(n) = cli.chunk_size {
        state.chunk_size = n;
    }
    if let Some(n) = cli.live_window {
        state.live_window_size = n;
    }
    if let Some(n) = cli.max_words {
        state.max_summary_words = n;
    }
    state.validate()?;
    Ok(state)
}

fn make_summarizer(cli: &Cli) -> Result<Box<dyn Summarizer>> {
    if cli.dry_run {
        return Ok(Box::new(ScriptedSummarizer::new()));
    }
    let summarizer =
        OpenAiSummarizer::from_env()?.with_retry(RetryConfig::with_retries(cli.retries));
    Ok(Box::new(summarizer))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| HbsError::InvalidArgument(format!("failed to serialize output: {e}")))?;
    println!("{json}");
    Ok(())
}

fn skipped() {
    eprintln!("skipped: another operation is in progress or summarization is disabled");
}

// ── Main ───────────────────────────────────────────────────────────

async fn run(cli: Cli, settings: HbsSettings) -> Result<()> {
    if let Command::Health = cli.command {
        return print_json(&OpenAiSummarizer::from_env()?.health());
    }

    let summarizer = make_summarizer(&cli)?;
    let state_path = require(&cli.state, "--state")?;
    let state = load_engine_state(&cli, state_path, &settings)?;
    let chat = match (&cli.chat, &cli.command) {
        (Some(path), _) => load_chat(path)?,
        (None, Command::Reset) => Vec::new(),
        (None, _) => require(&cli.chat, "--chat").map(|_| Vec::new())?,
    };
    debug!(turns = chat.len(), "chat loaded");

    let id = state_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "conversation".into());
    let conversation = Conversation::new(id, state);
    let counter = CharRatioCounter::with_calibration(cli.chars_per_token);
    let manager = BucketManager::new(summarizer.as_ref()).with_token_counter(&counter);

    let outcome = execute(&cli, &settings, &conversation, &manager, &counter, &chat).await;

    // Saved even on error: buckets committed before the failure stay.
    if cli.command.mutates_state() {
        save_state(state_path, &conversation.into_state())?;
    }
    outcome
}

async fn execute(
    cli: &Cli,
    settings: &HbsSettings,
    conversation: &Conversation,
    manager: &BucketManager<'_>,
    counter: &CharRatioCounter,
    chat: &[Turn],
) -> Result<()> {
    match &cli.command {
        Command::Build => match conversation.force_build(manager, chat).await? {
            Some(report) => println!(
                "built {} leaf bucket(s), {} merge(s)",
                report.leaves, report.merges
            ),
            None => skipped(),
        },
        Command::Rebuild => match conversation.rebuild(manager, chat).await? {
            Some(report) => println!("rebuilt with {} summarizer call(s)", report.calls()),
            None => skipped(),
        },
        Command::Reset => {
            if conversation.reset() {
                println!("state reset");
            } else {
                skipped();
            }
        }
        Command::View => match conversation.view(chat, &settings.render_config()) {
            Some(messages) => print_json(&messages)?,
            None => skipped(),
        },
        Command::Stats => match conversation.stats(chat, Some(counter)) {
            Some(stats) => {
                print_json(&stats)?;
                eprintln!("levels: {}", conversation.snapshot().await.format_levels());
            }
            None => skipped(),
        },
        Command::Check => match conversation.check_dirty(chat) {
            Some(true) => println!("dirty: summarized history changed, consider `hbs rebuild`"),
            Some(false) => println!("clean"),
            None => skipped(),
        },
        Command::Prepare { context_tokens } => {
            match conversation
                .prepare(manager, settings, chat, *context_tokens)
                .await
            {
                Some(outcome) => print_json(&outcome)?,
                None => skipped(),
            }
        }
        Command::Health => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = load_settings(&cli);
    init_tracing(cli.debug || settings.as_ref().is_ok_and(|s| s.debug_output));

    let result = match settings {
        Ok(settings) => run(cli, settings).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
