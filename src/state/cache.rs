//! In-memory conversation cache
//!
//! Conversations are loaded lazily from the store and handed out as shared,
//! individually locked handles. The map lock only guards insert/remove; a
//! conversation's own lock is what serializes mutations of its state.

use super::model::{ConversationId, ConversationState};
use super::store::StateStore;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to one conversation's live state
pub type SharedState = Arc<tokio::sync::Mutex<ConversationState>>;

pub struct StateCache {
    store: Arc<dyn StateStore>,
    entries: Mutex<HashMap<ConversationId, SharedState>>,
    /// Conversations whose last save failed; never evicted
    unsaved: Mutex<HashSet<ConversationId>>,
}

impl StateCache {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
            unsaved: Mutex::new(HashSet::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ConversationId, SharedState>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unsaved(&self) -> MutexGuard<'_, HashSet<ConversationId>> {
        self.unsaved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the live state for a conversation, loading it on a miss
    pub async fn get(&self, id: ConversationId) -> SharedState {
        if let Some(state) = self.entries().get(&id) {
            return Arc::clone(state);
        }

        let loaded = self.store.load(id).await;

        // Another task may have loaded the same conversation meanwhile;
        // whoever inserted first wins.
        let mut entries = self.entries();
        Arc::clone(
            entries
                .entry(id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(loaded))),
        )
    }

    /// Save a conversation. Failures are logged and remembered, not returned.
    pub async fn persist(&self, id: ConversationId, state: &ConversationState) -> bool {
        match self.store.save(id, state).await {
            Ok(()) => {
                self.unsaved().remove(&id);
                true
            }
            Err(e) => {
                tracing::warn!(conv_id = %id, error = %e, "Failed to persist conversation state");
                self.unsaved().insert(id);
                false
            }
        }
    }

    /// Drop entries nobody is holding. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let unsaved = self.unsaved().clone();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|id, state| Arc::strong_count(state) > 1 || unsaved.contains(id));
        before - entries.len()
    }

    /// Run `sweep` every `interval` until cancelled
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = cache.sweep();
                        tracing::debug!(evicted, remaining = cache.len(), "Swept conversation cache");
                    }
                    () = cancel.cancelled() => break,
                }
            }
            tracing::info!("Cache sweeper stopped");
        })
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[allow(dead_code)] // Pairs with len()
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    #[allow(dead_code)] // Used by tests
    pub fn contains(&self, id: ConversationId) -> bool {
        self.entries().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::testing::{test_defaults, InMemoryStore};

    #[tokio::test]
    async fn test_get_loads_once_and_shares_handle() {
        let store = Arc::new(InMemoryStore::new(test_defaults()));
        let cache = StateCache::new(store.clone());
        let id = ConversationId(1);

        let a = cache.get(id).await;
        let b = cache.get(id).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.load_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_unreferenced() {
        let store = Arc::new(InMemoryStore::new(test_defaults()));
        let cache = StateCache::new(store);

        let held = cache.get(ConversationId(1)).await;
        drop(cache.get(ConversationId(2)).await);

        assert_eq!(cache.sweep(), 1);
        assert!(cache.contains(ConversationId(1)));
        assert!(!cache.contains(ConversationId(2)));
        drop(held);
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_evicted_entry_reloads_from_store() {
        let store = Arc::new(InMemoryStore::new(test_defaults()));
        let cache = StateCache::new(store.clone());
        let id = ConversationId(3);

        {
            let state = cache.get(id).await;
            let mut guard = state.lock().await;
            guard.model = "persisted-model".to_string();
            assert!(cache.persist(id, &guard).await);
        }
        assert_eq!(cache.sweep(), 1);

        let state = cache.get(id).await;
        assert_eq!(state.lock().await.model, "persisted-model");
        assert_eq!(store.load_count(), 2);
    }

    #[tokio::test]
    async fn test_unsaved_entries_survive_sweep() {
        let store = Arc::new(InMemoryStore::new(test_defaults()));
        let cache = StateCache::new(store.clone());
        let id = ConversationId(4);

        store.fail_saves(true);
        {
            let state = cache.get(id).await;
            let mut guard = state.lock().await;
            guard.model = "in-memory-only".to_string();
            assert!(!cache.persist(id, &guard).await);
        }
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.get(id).await.lock().await.model, "in-memory-only");

        store.fail_saves(false);
        {
            let state = cache.get(id).await;
            let guard = state.lock().await;
            assert!(cache.persist(id, &guard).await);
        }
        assert_eq!(cache.sweep(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_cancelled() {
        let store = Arc::new(InMemoryStore::new(test_defaults()));
        let cache = Arc::new(StateCache::new(store));
        drop(cache.get(ConversationId(8)).await);

        let cancel = CancellationToken::new();
        let handle = cache.spawn_sweeper(Duration::from_secs(600), cancel.clone());

        tokio::time::sleep(Duration::from_secs(601)).await;
        assert!(cache.is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
