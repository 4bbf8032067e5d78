use super::classify::{FailureClassification, FailureKind, classify_failure};
use super::operations::OperationLog;
use super::record::{Record, RecordFields, names_collide};
use crate::adapter::PersistenceAdapter;
use crate::core::{FieldError, OperationKind, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The single active failure of a store, shaped for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorState {
    pub message: String,
    pub kind: FailureKind,
    /// `None` for mutation-time failures.
    pub operation: Option<OperationKind>,
    pub is_retryable: bool,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
    pub field_errors: Option<Vec<FieldError>>,
}

impl ErrorState {
    pub fn from_classification(
        classification: FailureClassification,
        operation: Option<OperationKind>,
        retry_count: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            message: classification.message,
            kind: classification.kind,
            operation,
            is_retryable: classification.retryable,
            retry_count,
            timestamp,
            field_errors: classification.field_errors,
        }
    }

    /// Error state for a rejected mutation: never retryable, no operation.
    pub fn for_mutation(err: &StoreError, timestamp: DateTime<Utc>) -> Self {
        let mut state = Self::from_classification(classify_failure(err), None, 0, timestamp);
        state.is_retryable = false;
        state
    }
}

pub(crate) struct CollectionState<T, P> {
    pub(crate) items: Vec<Record<T>>,
    pub(crate) is_loading: bool,
    pub(crate) is_saving: bool,
    pub(crate) error: Option<ErrorState>,
    pub(crate) adapter: Option<Arc<dyn PersistenceAdapter<P>>>,
    pub(crate) is_initialized: bool,
    pub(crate) last_sync_time: Option<DateTime<Utc>>,
    pub(crate) operations: OperationLog<T>,
    pub(crate) retry_count: u32,
    /// Set when a deferred flush was skipped because a save was in flight.
    pub(crate) follow_up_flush: bool,
    pub(crate) revision: u64,
}

impl<T: RecordFields, P> CollectionState<T, P> {
    pub(crate) fn new(operations: OperationLog<T>) -> Self {
        Self {
            items: Vec::new(),
            is_loading: false,
            is_saving: false,
            error: None,
            adapter: None,
            is_initialized: false,
            last_sync_time: None,
            operations,
            retry_count: 0,
            follow_up_flush: false,
            revision: 0,
        }
    }

    pub(crate) fn position_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub(crate) fn is_name_unique(&self, name: &str, exclude_id: Option<&str>) -> bool {
        !self.items.iter().any(|item| {
            exclude_id != Some(item.id.as_str()) && names_collide(item.fields.name(), name)
        })
    }
}

/// Point-in-time counters of a collection store.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStoreStats {
    pub store_name: String,
    pub item_count: usize,
    pub pending_operations: usize,
    pub failed_operations: usize,
    pub completed_operations: usize,
    pub is_saving: bool,
    pub is_initialized: bool,
    pub retry_count: u32,
    pub armed_timers: usize,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub revision: u64,
}
