//! Per-conversation dispatch
//!
//! Each conversation with pending messages owns a lane: a bounded FIFO channel
//! drained by exactly one worker task. The worker exits when the lane runs
//! dry and the next message spawns a fresh one. The lane map lock only guards
//! lane insert/remove and is never held across an await.

use super::traits::TurnHandler;
use crate::state::ConversationId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};

/// Default number of messages a conversation may have pending
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("too many messages pending for this conversation")]
    Saturated,
}

/// A queued message. The permit is released once the turn has been handled,
/// so capacity counts the message in progress as well as the waiting ones.
struct Turn {
    text: String,
    permit: OwnedSemaphorePermit,
}

struct Lane {
    tx: mpsc::Sender<Turn>,
    permits: Arc<Semaphore>,
}

type LaneMap = Arc<Mutex<HashMap<ConversationId, Lane>>>;

fn lock(lanes: &LaneMap) -> MutexGuard<'_, HashMap<ConversationId, Lane>> {
    lanes.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Dispatcher {
    capacity: usize,
    handler: Arc<dyn TurnHandler>,
    lanes: LaneMap,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn TurnHandler>, capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            handler,
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue a message without waiting. Rejects when the lane is full.
    pub fn enqueue(&self, id: ConversationId, text: String) -> Result<(), EnqueueError> {
        let mut lanes = lock(&self.lanes);

        // A lane whose worker died (panicked handler) is replaced
        if lanes.get(&id).is_some_and(|lane| lane.tx.is_closed()) {
            tracing::warn!(conv_id = %id, "Replacing lane with a dead worker");
            lanes.remove(&id);
        }

        match lanes.entry(id) {
            Entry::Occupied(entry) => {
                let lane = entry.get();
                let permit = Arc::clone(&lane.permits)
                    .try_acquire_owned()
                    .map_err(|_| EnqueueError::Saturated)?;
                lane.tx
                    .try_send(Turn { text, permit })
                    .map_err(|_| EnqueueError::Saturated)?;
            }
            Entry::Vacant(entry) => {
                let permits = Arc::new(Semaphore::new(self.capacity));
                let permit = Arc::clone(&permits)
                    .try_acquire_owned()
                    .map_err(|_| EnqueueError::Saturated)?;
                let (tx, rx) = mpsc::channel(self.capacity);
                tx.try_send(Turn { text, permit })
                    .map_err(|_| EnqueueError::Saturated)?;
                entry.insert(Lane { tx, permits });

                tracing::debug!(conv_id = %id, "Starting conversation worker");
                tokio::spawn(drain(
                    id,
                    rx,
                    Arc::clone(&self.handler),
                    Arc::clone(&self.lanes),
                ));
            }
        }
        Ok(())
    }

    /// Messages queued or in progress for a conversation
    pub fn pending(&self, id: ConversationId) -> usize {
        lock(&self.lanes)
            .get(&id)
            .map_or(0, |lane| self.capacity - lane.permits.available_permits())
    }

    /// Number of conversations with a live worker
    #[allow(dead_code)] // Used by tests
    pub fn active_lanes(&self) -> usize {
        lock(&self.lanes).len()
    }
}

/// Worker loop: handle turns in order until the lane is empty, then retire it.
///
/// Emptiness is re-checked under the map lock before removing the lane, so a
/// message enqueued concurrently is either seen here or lands on a new lane.
async fn drain(
    id: ConversationId,
    mut rx: mpsc::Receiver<Turn>,
    handler: Arc<dyn TurnHandler>,
    lanes: LaneMap,
) {
    loop {
        let turn = match rx.try_recv() {
            Ok(turn) => turn,
            Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {
                let mut guard = lock(&lanes);
                if let Ok(turn) = rx.try_recv() {
                    turn
                } else {
                    guard.remove(&id);
                    break;
                }
            }
        };

        let Turn { text, permit } = turn;
        handler.handle_turn(id, text).await;
        drop(permit);
    }
    tracing::debug!(conv_id = %id, "Conversation worker finished");
}
