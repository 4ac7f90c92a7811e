//! Mock implementations for testing
//!
//! These mocks let the dispatch, completion and delivery paths run without
//! real I/O.

use super::traits::{DeliveryError, Transport};
use crate::llm::{CompletionApi, CompletionRequest, UpstreamError};
use crate::state::{ConversationId, ConversationState, StateDefaults, StateStore, StoreError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

pub fn test_defaults() -> StateDefaults {
    StateDefaults {
        model: "gpt-4o-mini".to_string(),
        system_prompt: "You are a helpful assistant.".to_string(),
    }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// State store backed by a map, optionally failing every save
pub struct InMemoryStore {
    defaults: StateDefaults,
    records: Mutex<HashMap<ConversationId, ConversationState>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new(defaults: StateDefaults) -> Self {
        Self {
            defaults,
            records: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stored(&self, id: ConversationId) -> Option<ConversationState> {
        self.records.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn load(&self, id: ConversationId) -> ConversationState {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| ConversationState::new(&self.defaults))
    }

    async fn save(&self, id: ConversationId, state: &ConversationState) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "mock save failure",
            )));
        }
        self.records.lock().unwrap().insert(id, state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Mock Completion API
// ============================================================================

/// Completion API returning queued results, or `reply to <text>` when none is queued
pub struct MockCompletionApi {
    results: Mutex<VecDeque<Result<String, UpstreamError>>>,
    /// Record of all requests made
    requests: Mutex<Vec<CompletionRequest>>,
    /// User texts in the order their completions finished
    completed: Mutex<Vec<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    models: Mutex<Result<Vec<String>, UpstreamError>>,
    held: AtomicBool,
    gate: Semaphore,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCompletionApi {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            delays: Mutex::new(HashMap::new()),
            models: Mutex::new(Ok(Vec::new())),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.results.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn queue_error(&self, error: UpstreamError) {
        self.results.lock().unwrap().push_back(Err(error));
    }

    /// Sleep this long before answering `user_text`
    pub fn delay_for(&self, user_text: impl Into<String>, delay: Duration) {
        self.delays.lock().unwrap().insert(user_text.into(), delay);
    }

    pub fn set_models(&self, models: Result<Vec<String>, UpstreamError>) {
        *self.models.lock().unwrap() = models;
    }

    /// Block every request until released with `release_requests`
    pub fn hold_requests(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release_requests(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionApi for MockCompletionApi {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());
        let text = request.last_user_text().unwrap_or_default().to_string();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.held.load(Ordering::SeqCst) {
            self.gate.acquire().await.unwrap().forget();
        }
        let delay = self.delays.lock().unwrap().get(&text).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("reply to {text}")));

        self.completed.lock().unwrap().push(text);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_models(&self) -> Result<Vec<String>, UpstreamError> {
        self.models.lock().unwrap().clone()
    }
}

// ============================================================================
// Recording Transport
// ============================================================================

/// One call made against the recording transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Plain(ConversationId, String),
    Markup(ConversationId, String),
    Typing(ConversationId),
}

/// Transport that records deliveries and can be told to reject them
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    reject_plain: AtomicBool,
    reject_markup: AtomicBool,
    /// Text deliveries allowed before every further one fails
    fail_after: Mutex<Option<usize>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject_plain: AtomicBool::new(false),
            reject_markup: AtomicBool::new(false),
            fail_after: Mutex::new(None),
        }
    }

    pub fn reject_plain(&self) {
        self.reject_plain.store(true, Ordering::SeqCst);
    }

    pub fn reject_markup(&self) {
        self.reject_markup.store(true, Ordering::SeqCst);
    }

    pub fn fail_after(&self, deliveries: usize) {
        *self.fail_after.lock().unwrap() = Some(deliveries);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Delivered texts for one conversation, typing indicators excluded
    pub fn texts_for(&self, id: ConversationId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::Plain(to, text) | Sent::Markup(to, text) if to == id => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record_text(&self, sent: Sent, rejected: bool) -> Result<(), DeliveryError> {
        if rejected {
            return Err(DeliveryError::new("rejected by mock transport"));
        }
        let mut log = self.sent.lock().unwrap();
        let delivered = log.iter().filter(|s| !matches!(s, Sent::Typing(_))).count();
        if self.fail_after.lock().unwrap().is_some_and(|limit| delivered >= limit) {
            return Err(DeliveryError::new("mock transport failure"));
        }
        log.push(sent);
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_plain(&self, id: ConversationId, text: &str) -> Result<(), DeliveryError> {
        let rejected = self.reject_plain.load(Ordering::SeqCst);
        self.record_text(Sent::Plain(id, text.to_string()), rejected)
    }

    async fn send_markup(&self, id: ConversationId, markup: &str) -> Result<(), DeliveryError> {
        let rejected = self.reject_markup.load(Ordering::SeqCst);
        self.record_text(Sent::Markup(id, markup.to_string()), rejected)
    }

    async fn send_typing(&self, id: ConversationId) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(Sent::Typing(id));
        Ok(())
    }
}
