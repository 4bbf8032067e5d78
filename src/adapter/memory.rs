use super::PersistenceAdapter;
use crate::core::{Result, StoreError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

struct MemoryState<P> {
    stored: Option<P>,
    saved_payloads: Vec<P>,
    save_instants: Vec<Instant>,
    save_calls: usize,
    load_calls: usize,
    reset_calls: usize,
    save_failures: VecDeque<StoreError>,
    persistent_save_failure: Option<StoreError>,
    load_failures: VecDeque<StoreError>,
    reset_failures: VecDeque<StoreError>,
    save_latency: Duration,
}

/// Process-local adapter that records every call and can be told to fail.
///
/// Call instants come from tokio's clock, so they follow paused time in tests.
pub struct InMemoryAdapter<P> {
    inner: Mutex<MemoryState<P>>,
}

impl<P: Clone + Send + Sync + 'static> InMemoryAdapter<P> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryState {
                stored: None,
                saved_payloads: Vec::new(),
                save_instants: Vec::new(),
                save_calls: 0,
                load_calls: 0,
                reset_calls: 0,
                save_failures: VecDeque::new(),
                persistent_save_failure: None,
                load_failures: VecDeque::new(),
                reset_failures: VecDeque::new(),
                save_latency: Duration::ZERO,
            }),
        }
    }

    /// Adapter whose storage already holds `data`.
    pub fn with_data(data: P) -> Self {
        let adapter = Self::new();
        adapter.lock().stored = Some(data);
        adapter
    }

    pub fn with_save_latency(self, latency: Duration) -> Self {
        self.lock().save_latency = latency;
        self
    }

    pub fn stored(&self) -> Option<P> {
        self.lock().stored.clone()
    }

    /// Overwrites storage without going through `save`, as another writer would.
    pub fn set_stored(&self, data: Option<P>) {
        self.lock().stored = data;
    }

    pub fn saved_payloads(&self) -> Vec<P> {
        self.lock().saved_payloads.clone()
    }

    /// Instants at which `save` was entered, successful or not.
    pub fn save_instants(&self) -> Vec<Instant> {
        self.lock().save_instants.clone()
    }

    pub fn save_calls(&self) -> usize {
        self.lock().save_calls
    }

    pub fn load_calls(&self) -> usize {
        self.lock().load_calls
    }

    pub fn reset_calls(&self) -> usize {
        self.lock().reset_calls
    }

    /// Queues a failure for the next `save` call.
    pub fn fail_next_save(&self, err: StoreError) {
        self.lock().save_failures.push_back(err);
    }

    /// Makes every `save` fail with `err` until cleared with `None`.
    pub fn fail_saves_with(&self, err: Option<StoreError>) {
        self.lock().persistent_save_failure = err;
    }

    pub fn fail_next_load(&self, err: StoreError) {
        self.lock().load_failures.push_back(err);
    }

    pub fn fail_next_reset(&self, err: StoreError) {
        self.lock().reset_failures.push_back(err);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState<P>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<P: Clone + Send + Sync + 'static> Default for InMemoryAdapter<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P: Clone + Send + Sync + 'static> PersistenceAdapter<P> for InMemoryAdapter<P> {
    async fn save(&self, data: &P) -> Result<()> {
        let latency = {
            let mut state = self.lock();
            state.save_calls += 1;
            state.save_instants.push(Instant::now());
            state.save_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        let failure = state
            .save_failures
            .pop_front()
            .or_else(|| state.persistent_save_failure.clone());
        if let Some(err) = failure {
            return Err(err);
        }
        state.stored = Some(data.clone());
        state.saved_payloads.push(data.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<P>> {
        let mut state = self.lock();
        state.load_calls += 1;
        if let Some(err) = state.load_failures.pop_front() {
            return Err(err);
        }
        Ok(state.stored.clone())
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.lock();
        state.reset_calls += 1;
        if let Some(err) = state.reset_failures.pop_front() {
            return Err(err);
        }
        state.stored = None;
        Ok(())
    }
}
