//! JSON persistence for [`EngineState`].
//!
//! The engine itself never touches disk. Hosts call [`StateStore::save`]
//! after every mutating operation. Writes are atomic (temp file + rename),
//! so a crash mid-write leaves the previous state intact.
//!
//! Directory layout:
//! ```text
//! state_dir/
//!   chat-1.json
//!   chat-2.json
//! ```

use crate::config::HbsSettings;
use crate::engine::EngineState;
use crate::engine::state::STATE_VERSION;
use crate::error::{HbsError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Atomic write: serialize to a temp file next to `path`, then rename into place.
pub fn save_state(path: &Path, state: &EngineState) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            HbsError::Persistence(format!("failed to create {}: {e}", dir.display()))
        })?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| HbsError::Persistence(format!("not a file path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let json = serde_json::to_string_pretty(state)
        .map_err(|e| HbsError::Persistence(format!("failed to serialize state: {e}")))?;
    std::fs::write(&tmp_path, json)
        .map_err(|e| HbsError::Persistence(format!("failed to write temp state: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| HbsError::Persistence(format!("failed to rename state: {e}")))?;

    debug!(path = %path.display(), buckets = state.buckets.len(), "state saved");
    Ok(())
}

/// Load a state file. Returns `None` if it doesn't exist.
pub fn load_state(path: &Path) -> Result<Option<EngineState>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)
        .map_err(|e| HbsError::Persistence(format!("failed to read state: {e}")))?;
    let state: EngineState = serde_json::from_str(&json)
        .map_err(|e| HbsError::Persistence(format!("failed to parse state: {e}")))?;
    if state.version != STATE_VERSION {
        warn!(
            path = %path.display(),
            version = state.version,
            "state written by a different version"
        );
    }
    state.validate()?;
    Ok(Some(state))
}

/// One state file per conversation under a root directory.
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    /// Create a new store, ensuring the root directory exists.
    pub fn new(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        std::fs::create_dir_all(&state_dir).map_err(|e| {
            HbsError::Persistence(format!("failed to create {}: {e}", state_dir.display()))
        })?;
        Ok(Self { state_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.state_dir
    }

    /// Path of a conversation's state file. Unsafe filename characters become `_`.
    pub fn path_for(&self, conversation_id: &str) -> PathBuf {
        let name: String = conversation_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.state_dir.join(format!("{name}.json"))
    }

    pub fn save(&self, conversation_id: &str, state: &EngineState) -> Result<()> {
        save_state(&self.path_for(conversation_id), state)
    }

    pub fn load(&self, conversation_id: &str) -> Result<Option<EngineState>> {
        load_state(&self.path_for(conversation_id))
    }

    /// Stored state, or a fresh one from `settings` on first use.
    pub fn load_or_init(&self, conversation_id: &str, settings: &HbsSettings) -> Result<EngineState> {
        match self.load(conversation_id)? {
            Some(state) => Ok(state),
            None => {
                debug!(conversation = conversation_id, "initializing new state");
                EngineState::new(settings)
            }
        }
    }

    /// Remove a conversation's state file. Missing files are not an error.
    pub fn delete(&self, conversation_id: &str) -> Result<()> {
        let path = self.path_for(conversation_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HbsError::Persistence(format!(
                "failed to delete {}: {e}",
                path.display()
            ))),
        }
    }
}
