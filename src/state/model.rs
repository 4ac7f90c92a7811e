//! Conversation state types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Upper bound on retained history turns
pub const MAX_HISTORY: usize = 40;

/// Preset slot seeded from the defaults when a conversation has none
pub const DEFAULT_PRESET_SLOT: &str = "1";

/// Identity of one chat (a user or a group)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub i64);

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A named (model, system prompt) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub model: String,
    pub system_prompt: String,
}

/// What the next plain-text message should be read as.
///
/// Kept explicit so an intentionally empty system prompt is never confused
/// with "waiting for a system prompt".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingInput {
    #[default]
    None,
    AwaitingModel,
    AwaitingSystemPrompt,
}

/// Process-wide defaults for new conversations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDefaults {
    pub model: String,
    pub system_prompt: String,
}

/// Everything the relay remembers about one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub model: String,
    pub system_prompt: String,
    pub history: Vec<Message>,
    pub presets: HashMap<String, Preset>,
    pub pending_input: PendingInput,
}

impl ConversationState {
    /// Fresh state with the default preset seeded
    pub fn new(defaults: &StateDefaults) -> Self {
        let mut state = Self {
            model: defaults.model.clone(),
            system_prompt: defaults.system_prompt.clone(),
            history: Vec::new(),
            presets: HashMap::new(),
            pending_input: PendingInput::None,
        };
        state.seed_default_preset();
        state
    }

    /// Seed preset "1" from the current model and prompt if no presets exist.
    ///
    /// Returns true if a preset was added.
    pub fn seed_default_preset(&mut self) -> bool {
        if !self.presets.is_empty() {
            return false;
        }
        self.presets
            .insert(DEFAULT_PRESET_SLOT.to_string(), self.current_preset());
        true
    }

    pub fn current_preset(&self) -> Preset {
        Preset {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }

    /// Append a completed user/assistant exchange and enforce the history bound
    pub fn record_exchange(&mut self, user_text: &str, reply: &str) {
        self.history.push(Message::user(user_text));
        self.history.push(Message::assistant(reply));
        self.trim_history();
    }

    /// Drop the oldest turns, two at a time, until the bound holds.
    ///
    /// Removing whole pairs keeps a history that began on a user turn
    /// beginning on a user turn.
    pub fn trim_history(&mut self) {
        while self.history.len() > MAX_HISTORY {
            let excess = 2.min(self.history.len());
            self.history.drain(..excess);
        }
    }

    /// Store the current model and prompt under `slot`, replacing any previous value
    pub fn save_preset(&mut self, slot: &str) -> Preset {
        let preset = self.current_preset();
        self.presets.insert(slot.to_string(), preset.clone());
        preset
    }

    /// Switch to the preset stored under `slot`
    pub fn load_preset(&mut self, slot: &str) -> Option<Preset> {
        let preset = self.presets.get(slot)?.clone();
        self.model.clone_from(&preset.model);
        self.system_prompt.clone_from(&preset.system_prompt);
        Some(preset)
    }

    /// Back to default model and prompt with an empty history. Presets survive.
    pub fn start_fresh(&mut self, defaults: &StateDefaults) {
        self.model.clone_from(&defaults.model);
        self.system_prompt.clone_from(&defaults.system_prompt);
        self.history.clear();
        self.pending_input = PendingInput::None;
    }
}
