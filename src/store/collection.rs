use super::classify::classify_failure;
use super::operations::{FlushBatch, OperationLog, PendingOperation};
use super::policy::StorePolicy;
use super::record::{Mapper, Record, RecordFields, Validation, Validator};
use super::retry::RetryController;
use super::state::{CollectionState, CollectionStoreStats, ErrorState};
use super::timers::{DebounceScheduler, TimerArena, TimerSlot};
use crate::adapter::PersistenceAdapter;
use crate::core::{Clock, FieldError, OperationKind, Result, StoreError, SystemClock};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{Instrument, Level, event, info_span};

// Store implementation is split by concern; all parts share this module scope.
include!("collection/mutations.rs");
include!("collection/persistence.rs");
include!("collection/sync_and_bulk.rs");

type Fields<V> = <V as Validator>::Output;
type Persisted<M> = <M as Mapper>::Persisted;
type SharedAdapter<M> = Arc<dyn PersistenceAdapter<Persisted<M>>>;

/// Construction-time dependencies of a store besides its validator and mapper.
#[derive(Clone)]
pub struct StoreOptions {
    pub policy: StorePolicy,
    pub clock: Arc<dyn Clock>,
}

impl StoreOptions {
    pub fn policy(mut self, policy: StorePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            policy: StorePolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

pub(crate) struct StoreShared<V, M>
where
    V: Validator,
    M: Mapper<Fields = Fields<V>>,
{
    name: String,
    validator: V,
    mapper: M,
    policy: StorePolicy,
    clock: Arc<dyn Clock>,
    debounce: DebounceScheduler,
    retry: RetryController,
    timers: TimerArena,
    state: Mutex<CollectionState<Fields<V>, Persisted<M>>>,
    revision_tx: watch::Sender<u64>,
}

/// Handle to an optimistic persisted collection.
///
/// Cloning is cheap; every clone drives the same collection. Dropping the
/// last handle cancels all waiting timers.
pub struct CollectionStore<V, M>
where
    V: Validator,
    M: Mapper<Fields = Fields<V>>,
{
    shared: Arc<StoreShared<V, M>>,
}

impl<V, M> Clone for CollectionStore<V, M>
where
    V: Validator,
    M: Mapper<Fields = Fields<V>>,
{
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<V, M> CollectionStore<V, M>
where
    V: Validator,
    M: Mapper<Fields = Fields<V>>,
{
    pub fn new(name: impl Into<String>, validator: V, mapper: M) -> Self {
        Self::with_options(name, validator, mapper, StoreOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        validator: V,
        mapper: M,
        options: StoreOptions,
    ) -> Self {
        let policy = options.policy;
        let operations =
            OperationLog::new(policy.operation_retention(), policy.max_operations);
        let (revision_tx, _) = watch::channel(0);

        Self {
            shared: Arc::new(StoreShared {
                name: name.into(),
                validator,
                mapper,
                debounce: DebounceScheduler::new(policy.debounce_window()),
                retry: RetryController::new(policy.retry.clone()),
                policy,
                clock: options.clock,
                timers: TimerArena::new(),
                state: Mutex::new(CollectionState::new(operations)),
                revision_tx,
            }),
        }
    }

    /// Logical name of this collection, used in logs.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn policy(&self) -> &StorePolicy {
        &self.shared.policy
    }

    pub fn items(&self) -> Vec<Record<Fields<V>>> {
        self.state().items.clone()
    }

    pub fn len(&self) -> usize {
        self.state().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    pub fn get_by_id(&self, id: &str) -> Option<Record<Fields<V>>> {
        self.state().items.iter().find(|item| item.id == id).cloned()
    }

    /// Returns `true` when no item other than `exclude_id` carries `name`
    /// (case-insensitive, surrounding whitespace ignored).
    pub fn is_name_unique(&self, name: &str, exclude_id: Option<&str>) -> bool {
        self.state().is_name_unique(name, exclude_id)
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    pub fn is_saving(&self) -> bool {
        self.state().is_saving
    }

    pub fn is_initialized(&self) -> bool {
        self.state().is_initialized
    }

    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        self.state().last_sync_time
    }

    pub fn retry_count(&self) -> u32 {
        self.state().retry_count
    }

    pub fn pending_operations(&self) -> Vec<PendingOperation<Fields<V>>> {
        self.state().operations.entries().to_vec()
    }

    pub fn get_error_details(&self) -> Option<ErrorState> {
        self.state().error.clone()
    }

    pub fn clear_error_state(&self) {
        let mut state = self.state();
        if state.error.take().is_some() {
            self.touch(&mut state);
        }
    }

    /// Receiver of the change counter, bumped after every observable change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision_tx.subscribe()
    }

    pub fn stats(&self) -> CollectionStoreStats {
        let state = self.state();
        let counts = state.operations.counts();
        CollectionStoreStats {
            store_name: self.shared.name.clone(),
            item_count: state.items.len(),
            pending_operations: counts.pending,
            failed_operations: counts.failed,
            completed_operations: counts.completed,
            is_saving: state.is_saving,
            is_initialized: state.is_initialized,
            retry_count: state.retry_count,
            armed_timers: self.shared.timers.armed_count(),
            last_sync_time: state.last_sync_time,
            revision: state.revision,
        }
    }

    /// Tears the store down: cancels the debounce timer and every retry
    /// timer, discards rollback data and refuses to arm new timers.
    ///
    /// A save that is already in flight is not cancelled.
    pub fn destroy(&self) {
        let cancelled = self.shared.timers.close();
        let mut state = self.state();
        state.operations.clear_rollback_data();
        self.touch(&mut state);
        debug!(
            "store '{}' destroyed, {} waiting timer(s) cancelled",
            self.shared.name, cancelled
        );
    }

    fn state(&self) -> MutexGuard<'_, CollectionState<Fields<V>, Persisted<M>>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn now(&self) -> DateTime<Utc> {
        self.shared.clock.now()
    }

    /// Bumps the revision and notifies subscribers.
    fn touch(&self, state: &mut CollectionState<Fields<V>, Persisted<M>>) {
        state.revision += 1;
        self.shared.revision_tx.send_replace(state.revision);
    }

    fn weak_shared(&self) -> std::sync::Weak<StoreShared<V, M>> {
        Arc::downgrade(&self.shared)
    }

    fn from_shared(shared: Arc<StoreShared<V, M>>) -> Self {
        Self { shared }
    }
}
