//! Deterministic in-memory stand-ins for the language backend and the
//! search surface. No network, scripted outcomes, call counting.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backend::LanguageBackend;
use crate::candidate::RawHit;
use crate::error::{BackendError, SearchError};
use crate::search::{SearchQuery, SearchSurface};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend that replays queued replies in order.
pub struct MockBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    prompts: Mutex<Vec<String>>,
    name: String,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            name: "MockBackend".to_string(),
        }
    }

    /// Backend that answers the next call with `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        let backend = Self::new();
        backend.push_reply(reply);
        backend
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.replies).push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: BackendError) {
        lock(&self.replies).push_back(Err(error));
    }

    pub fn calls(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageBackend for MockBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.replies).pop_front().unwrap_or_else(|| {
            Err(BackendError::InvalidResponse(
                "MockBackend: no more replies queued".to_string(),
            ))
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Search surface with scripted outcomes.
///
/// Each call takes the next queued outcome if there is one, otherwise the
/// outcome registered for that exact query text, otherwise the fallback
/// (zero hits unless built with [`MockSearchSurface::failing`]).
pub struct MockSearchSurface {
    queue: Mutex<VecDeque<Result<Vec<RawHit>, SearchError>>>,
    by_query: Mutex<HashMap<String, Result<Vec<RawHit>, SearchError>>>,
    fallback: Result<Vec<RawHit>, SearchError>,
    latency: Option<Duration>,
    calls: AtomicU32,
    queries: Mutex<Vec<String>>,
}

impl MockSearchSurface {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            by_query: Mutex::new(HashMap::new()),
            fallback: Ok(Vec::new()),
            latency: None,
            calls: AtomicU32::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Surface that fails every call with `error`.
    pub fn failing(error: SearchError) -> Self {
        Self {
            fallback: Err(error),
            ..Self::new()
        }
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_query_hits(self, query: impl Into<String>, hits: Vec<RawHit>) -> Self {
        lock(&self.by_query).insert(query.into(), Ok(hits));
        self
    }

    pub fn with_query_error(self, query: impl Into<String>, error: SearchError) -> Self {
        lock(&self.by_query).insert(query.into(), Err(error));
        self
    }

    pub fn push_hits(&self, hits: Vec<RawHit>) {
        lock(&self.queue).push_back(Ok(hits));
    }

    pub fn push_error(&self, error: SearchError) {
        lock(&self.queue).push_back(Err(error));
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Query texts in the order the calls arrived.
    pub fn queries(&self) -> Vec<String> {
        lock(&self.queries).clone()
    }
}

impl Default for MockSearchSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchSurface for MockSearchSurface {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.queries).push(query.text.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(outcome) = lock(&self.queue).pop_front() {
            return outcome;
        }
        if let Some(outcome) = lock(&self.by_query).get(&query.text) {
            return outcome.clone();
        }
        self.fallback.clone()
    }

    fn name(&self) -> &str {
        "MockSearch"
    }
}
