//! Optimistic persisted collection store.
//!
//! Mutations apply to the in-memory collection immediately and are written
//! through a [`PersistenceAdapter`](crate::adapter::PersistenceAdapter) after a
//! debounce window. Failed writes roll the optimistic changes back and are
//! retried with exponential backoff when the failure looks transient.

pub mod classify;
pub mod collection;
pub mod operations;
pub mod policy;
pub mod record;
pub mod retry;
pub mod state;
pub mod timers;

pub use classify::{FailureClassification, FailureKind, classify_failure};
pub use collection::{CollectionStore, StoreOptions};
pub use operations::{
    FlushBatch, OperationCounts, OperationLog, OperationStatus, OperationType, PendingOperation,
};
pub use policy::{RetryPolicy, StorePolicy};
pub use record::{Mapper, Record, RecordFields, Validation, Validator, new_record_id};
pub use retry::RetryController;
pub use state::{CollectionStoreStats, ErrorState};
pub use timers::{DebounceScheduler, TimerArena, TimerSlot};
