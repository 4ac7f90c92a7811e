//! Durable conversation records
//!
//! One JSON file per conversation. Missing or unreadable records are treated
//! as absent: `load` hands back a fresh default state instead of failing.

use super::model::{ConversationId, ConversationState, Message, PendingInput, Preset, StateDefaults};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Keyed load/save of conversation state
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a conversation; never fails, absent records yield defaults
    async fn load(&self, id: ConversationId) -> ConversationState;

    /// Persist a conversation
    async fn save(&self, id: ConversationId, state: &ConversationState) -> Result<(), StoreError>;
}

/// On-disk shape of a record.
///
/// Every field is optional so partial records still load; the capitalised
/// aliases accept records written by the earlier relay.
#[derive(Debug, Deserialize)]
struct StoredConversation {
    #[serde(default, alias = "Model")]
    model: Option<String>,
    #[serde(default, alias = "SystemPrompt")]
    system_prompt: Option<String>,
    #[serde(default)]
    history: Vec<Message>,
    #[serde(default)]
    presets: HashMap<String, Preset>,
    #[serde(default)]
    pending_input: PendingInput,
}

impl StoredConversation {
    fn into_state(self, defaults: &StateDefaults) -> ConversationState {
        let model = self
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| defaults.model.clone());
        let system_prompt = self
            .system_prompt
            .unwrap_or_else(|| defaults.system_prompt.clone());

        let mut state = ConversationState {
            model,
            system_prompt,
            history: self.history,
            presets: self.presets,
            pending_input: self.pending_input,
        };
        state.trim_history();
        state.seed_default_preset();
        state
    }
}

/// Decode a record, applying defaults for anything it leaves out
pub(crate) fn decode_record(
    bytes: &[u8],
    defaults: &StateDefaults,
) -> Result<ConversationState, serde_json::Error> {
    let stored: StoredConversation = serde_json::from_slice(bytes)?;
    Ok(stored.into_state(defaults))
}

/// `StateStore` backed by a directory of JSON files
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    defaults: StateDefaults,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>, defaults: StateDefaults) -> Self {
        Self {
            dir: dir.into(),
            defaults,
        }
    }

    /// Create the storage directory if needed
    pub async fn ensure_dir(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record location for a conversation
    pub fn path_for(&self, id: ConversationId) -> PathBuf {
        self.dir.join(format!("user_{id}.json"))
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self, id: ConversationId) -> ConversationState {
        let path = self.path_for(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(conv_id = %id, "No stored state, using defaults");
                return ConversationState::new(&self.defaults);
            }
            Err(e) => {
                tracing::warn!(conv_id = %id, path = %path.display(), error = %e, "Failed to read stored state, using defaults");
                return ConversationState::new(&self.defaults);
            }
        };

        match decode_record(&bytes, &self.defaults) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(conv_id = %id, path = %path.display(), error = %e, "Stored state is corrupt, using defaults");
                ConversationState::new(&self.defaults)
            }
        }
    }

    async fn save(&self, id: ConversationId, state: &ConversationState) -> Result<(), StoreError> {
        let path = self.path_for(id);
        let bytes = serde_json::to_vec_pretty(state)?;

        // Write beside the record and rename over it so a failed write
        // leaves the previous record intact.
        let tmp = path.with_extension("json.tmp");
        if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}
