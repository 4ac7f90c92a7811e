//! Conversation state
//!
//! Per-conversation configuration and bounded history, the durable JSON
//! store behind it, and the in-memory cache shared by the dispatch workers.

mod cache;
mod model;
mod store;

pub use cache::{SharedState, StateCache};
pub use model::{
    ConversationId, ConversationState, Message, PendingInput, Preset, Role, StateDefaults,
    DEFAULT_PRESET_SLOT, MAX_HISTORY,
};
pub use store::{JsonFileStore, StateStore, StoreError};
