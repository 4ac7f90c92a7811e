//! Configuration commands
//!
//! Commands never reach the completion endpoint (apart from `/models`, which
//! only lists models) and so bypass the dispatch queue. Everything here is a
//! pure function of the conversation state.

use crate::state::{ConversationState, PendingInput, StateDefaults};
use std::fmt::Write as _;

/// Ids shown by `/models` before the rest is summarised
pub const MODEL_LIST_LIMIT: usize = 20;

/// System prompt argument meaning "no system prompt"
const NO_PROMPT_ARG: &str = "none";

const PROMPT_PREVIEW_CHARS: usize = 40;

const COMMAND_LIST: &str = "Commands:\n\
/model [name] - Switch model\n\
/models - List available models\n\
/system [prompt] - Set system prompt (/system none for no prompt)\n\
/reset - Restore the default system prompt\n\
/clear - Clear conversation history\n\
/new - Start fresh with default settings (presets are kept)\n\
/save <slot> - Save current model and prompt as a preset\n\
/load <slot> - Switch to a saved preset\n\
/presets - List saved presets\n\
/cancel - Cancel a pending /model or /system\n\
/help - Show this list";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Model(Option<String>),
    Models,
    System(Option<String>),
    Reset,
    Clear,
    New,
    Save(Option<String>),
    Load(Option<String>),
    Presets,
    Cancel,
    Unknown(String),
}

impl Command {
    /// Parse `/name[@bot] [args]`. Returns `None` for text that is not a command.
    pub fn parse(text: &str) -> Option<Self> {
        let rest = text.trim_start().strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or_default().to_lowercase();
        if name.is_empty() {
            return None;
        }
        let arg = (!args.is_empty()).then(|| args.to_string());

        Some(match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "model" => Self::Model(arg),
            "models" => Self::Models,
            "system" => Self::System(arg),
            "reset" => Self::Reset,
            "clear" => Self::Clear,
            "new" => Self::New,
            "save" => Self::Save(arg),
            "load" => Self::Load(arg),
            "presets" => Self::Presets,
            "cancel" => Self::Cancel,
            _ => Self::Unknown(name),
        })
    }
}

/// Result of applying a command to a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Reply text; `changed` asks the caller to persist
    Reply { text: String, changed: bool },
    /// The reply needs the endpoint's model list
    ListModels,
}

impl Outcome {
    fn changed(text: impl Into<String>) -> Self {
        Self::Reply {
            text: text.into(),
            changed: true,
        }
    }

    fn unchanged(text: impl Into<String>) -> Self {
        Self::Reply {
            text: text.into(),
            changed: false,
        }
    }
}

pub fn execute(state: &mut ConversationState, command: &Command, defaults: &StateDefaults) -> Outcome {
    match command {
        Command::Start => Outcome::unchanged(format!(
            "Welcome! I'm your AI assistant.\n\nCurrent model: {}\n\n{COMMAND_LIST}",
            state.model
        )),
        Command::Help => Outcome::unchanged(format!("Current model: {}\n\n{COMMAND_LIST}", state.model)),
        Command::Models => Outcome::ListModels,
        Command::Model(Some(name)) => {
            state.model.clone_from(name);
            state.pending_input = PendingInput::None;
            Outcome::changed(format!("Model set to: {name}"))
        }
        Command::Model(None) => {
            state.pending_input = PendingInput::AwaitingModel;
            Outcome::changed("Send me the model name you want to use. Use /models to see available options.")
        }
        Command::System(Some(prompt)) => {
            state.pending_input = PendingInput::None;
            if prompt.eq_ignore_ascii_case(NO_PROMPT_ARG) {
                state.system_prompt.clear();
                Outcome::changed("System prompt removed.")
            } else {
                state.system_prompt.clone_from(prompt);
                Outcome::changed("System prompt updated.")
            }
        }
        Command::System(None) => {
            state.pending_input = PendingInput::AwaitingSystemPrompt;
            Outcome::changed("Send me the system prompt you want to use.")
        }
        Command::Reset => {
            state.system_prompt.clone_from(&defaults.system_prompt);
            Outcome::changed("System prompt reset to default.")
        }
        Command::Clear => {
            state.history.clear();
            Outcome::changed("Conversation history cleared.")
        }
        Command::New => {
            state.start_fresh(defaults);
            Outcome::changed(format!(
                "Started a new conversation with {}. Saved presets are kept.",
                state.model
            ))
        }
        Command::Save(Some(slot)) => {
            let preset = state.save_preset(slot);
            Outcome::changed(format!("Saved preset {slot}: {}", preset.model))
        }
        Command::Load(Some(slot)) => match state.load_preset(slot) {
            Some(preset) => Outcome::changed(format!("Loaded preset {slot}: {}", preset.model)),
            None => Outcome::unchanged(format!(
                "No preset named {slot}. Use /presets to see saved presets."
            )),
        },
        Command::Save(None) => Outcome::unchanged("Usage: /save <slot>"),
        Command::Load(None) => Outcome::unchanged("Usage: /load <slot>"),
        Command::Presets => Outcome::unchanged(format_presets(state)),
        Command::Cancel => {
            if state.pending_input == PendingInput::None {
                Outcome::unchanged("Nothing to cancel.")
            } else {
                state.pending_input = PendingInput::None;
                Outcome::changed("Cancelled.")
            }
        }
        Command::Unknown(name) => Outcome::unchanged(format!(
            "Unknown command /{name}. Send /help for the list of commands."
        )),
    }
}

/// Apply plain text as the answer to a pending `/model` or `/system`.
///
/// Returns the reply, or `None` when nothing was pending and the text is a
/// chat turn.
pub fn consume_pending(state: &mut ConversationState, text: &str) -> Option<String> {
    match state.pending_input {
        PendingInput::None => None,
        PendingInput::AwaitingModel => {
            let name = text.trim();
            state.model = name.to_string();
            state.pending_input = PendingInput::None;
            Some(format!("Model set to: {name}"))
        }
        PendingInput::AwaitingSystemPrompt => {
            state.system_prompt = text.trim().to_string();
            state.pending_input = PendingInput::None;
            Some("System prompt updated.".to_string())
        }
    }
}

pub fn format_model_list(models: &[String]) -> String {
    if models.is_empty() {
        return "No models available.".to_string();
    }
    let mut out = String::from("Available models:\n\n");
    for model in models.iter().take(MODEL_LIST_LIMIT) {
        let _ = writeln!(out, "- {model}");
    }
    if models.len() > MODEL_LIST_LIMIT {
        let _ = write!(out, "\n...and {} more", models.len() - MODEL_LIST_LIMIT);
    }
    out
}

fn format_presets(state: &ConversationState) -> String {
    let mut slots: Vec<_> = state.presets.iter().collect();
    slots.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::from("Saved presets:\n");
    for (slot, preset) in slots {
        let prompt = if preset.system_prompt.is_empty() {
            "(no system prompt)".to_string()
        } else if preset.system_prompt.chars().count() > PROMPT_PREVIEW_CHARS {
            let head: String = preset.system_prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            preset.system_prompt.clone()
        };
        let _ = write!(out, "\n{slot}: {} | {prompt}", preset.model);
    }
    out
}
