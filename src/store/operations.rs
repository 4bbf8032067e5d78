use super::record::{Record, new_record_id};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Failed,
    Completed,
}

/// Audit record of one mutation, carrying what is needed to undo it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation<T> {
    pub id: String,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
    /// Pre-mutation copy of the record; `None` for creates.
    pub rollback_snapshot: Option<Record<T>>,
    /// Index the record occupied before the mutation.
    pub position: Option<usize>,
    pub status: OperationStatus,
}

impl<T> PendingOperation<T> {
    pub fn is_settled(&self) -> bool {
        !matches!(self.status, OperationStatus::Pending)
    }
}

/// Operations captured when a flush starts; settled together when it ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushBatch {
    pub(crate) operation_ids: Vec<String>,
}

impl FlushBatch {
    pub fn len(&self) -> usize {
        self.operation_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operation_ids.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub pending: usize,
    pub failed: usize,
    pub completed: usize,
}

/// Append-only log of mutations, pruned by age and bounded in size.
///
/// While a flush is in flight the log also holds its restore point: the
/// collection as it was before any of the unsaved mutations were applied.
#[derive(Debug, Clone)]
pub struct OperationLog<T> {
    entries: Vec<PendingOperation<T>>,
    restore_point: Option<Vec<Record<T>>>,
    retention: Duration,
    max_entries: usize,
}

impl<T: Clone> OperationLog<T> {
    pub fn new(retention: Duration, max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            restore_point: None,
            retention,
            max_entries: max_entries.max(1),
        }
    }

    pub fn entries(&self) -> &[PendingOperation<T>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn counts(&self) -> OperationCounts {
        let mut counts = OperationCounts::default();
        for entry in &self.entries {
            match entry.status {
                OperationStatus::Pending => counts.pending += 1,
                OperationStatus::Failed => counts.failed += 1,
                OperationStatus::Completed => counts.completed += 1,
            }
        }
        counts
    }

    pub fn record_create(&mut self, target_id: &str, now: DateTime<Utc>) -> String {
        self.push(OperationType::Create, target_id, None, None, now)
    }

    pub fn record_update(
        &mut self,
        before: Record<T>,
        position: usize,
        now: DateTime<Utc>,
    ) -> String {
        let target_id = before.id.clone();
        self.push(OperationType::Update, &target_id, Some(before), Some(position), now)
    }

    pub fn record_delete(
        &mut self,
        removed: Record<T>,
        position: usize,
        now: DateTime<Utc>,
    ) -> String {
        let target_id = removed.id.clone();
        self.push(OperationType::Delete, &target_id, Some(removed), Some(position), now)
    }

    fn push(
        &mut self,
        op_type: OperationType,
        target_id: &str,
        rollback_snapshot: Option<Record<T>>,
        position: Option<usize>,
        now: DateTime<Utc>,
    ) -> String {
        let id = new_record_id();
        self.entries.push(PendingOperation {
            id: id.clone(),
            op_type,
            target_id: target_id.to_string(),
            timestamp: now,
            rollback_snapshot,
            position,
            status: OperationStatus::Pending,
        });
        self.enforce_bound();
        id
    }

    /// Captures every operation still pending as the batch of a starting flush
    /// and derives the restore point by undoing them, newest first, on a copy
    /// of `items`.
    ///
    /// No restore point is kept when rollback data was already discarded.
    pub fn begin_flush(&mut self, items: &[Record<T>]) -> FlushBatch {
        let pending = self
            .entries
            .iter()
            .filter(|entry| entry.status == OperationStatus::Pending)
            .collect::<Vec<_>>();

        let revertible = pending.iter().all(|entry| {
            entry.op_type == OperationType::Create || entry.rollback_snapshot.is_some()
        });
        self.restore_point = revertible.then(|| {
            let mut restored = items.to_vec();
            for entry in pending.iter().rev() {
                revert_operation(entry, &mut restored);
            }
            restored
        });

        FlushBatch {
            operation_ids: pending.iter().map(|entry| entry.id.clone()).collect(),
        }
    }

    pub fn has_restore_point(&self) -> bool {
        self.restore_point.is_some()
    }

    /// Marks the batch completed, drops its rollback data and prunes old entries.
    pub fn complete(&mut self, batch: &FlushBatch, now: DateTime<Utc>) {
        self.restore_point = None;
        for entry in &mut self.entries {
            if entry.status == OperationStatus::Pending && batch.operation_ids.contains(&entry.id) {
                entry.status = OperationStatus::Completed;
                entry.rollback_snapshot = None;
            }
        }
        self.prune(now);
    }

    /// Rolls `items` back to the restore point of the failed flush.
    ///
    /// Every operation still pending is marked failed, including the ones
    /// recorded while the flush was in flight, since their changes are gone
    /// too. Returns how many operations were discarded, or `None` when there
    /// was no restore point; the batch is then only marked failed.
    pub fn fail_and_restore(
        &mut self,
        batch: &FlushBatch,
        items: &mut Vec<Record<T>>,
    ) -> Option<usize> {
        let Some(restored) = self.restore_point.take() else {
            self.fail(batch);
            return None;
        };
        *items = restored;
        Some(self.fail_pending())
    }

    /// Marks the batch failed without touching the collection.
    pub fn fail(&mut self, batch: &FlushBatch) {
        self.restore_point = None;
        for entry in &mut self.entries {
            if entry.status == OperationStatus::Pending && batch.operation_ids.contains(&entry.id) {
                entry.status = OperationStatus::Failed;
                entry.rollback_snapshot = None;
            }
        }
    }

    /// Marks every pending operation failed after the collection was replaced
    /// from storage; returns how many were discarded.
    pub fn discard_pending(&mut self) -> usize {
        self.restore_point = None;
        self.fail_pending()
    }

    fn fail_pending(&mut self) -> usize {
        let mut failed = 0;
        for entry in &mut self.entries {
            if entry.status == OperationStatus::Pending {
                entry.status = OperationStatus::Failed;
                entry.rollback_snapshot = None;
                failed += 1;
            }
        }
        failed
    }

    /// Drops settled entries older than the retention window.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let retention = self.retention;
        self.entries
            .retain(|entry| !entry.is_settled() || now - entry.timestamp < retention);
        self.enforce_bound();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.restore_point = None;
    }

    pub fn clear_rollback_data(&mut self) {
        self.restore_point = None;
        for entry in &mut self.entries {
            entry.rollback_snapshot = None;
        }
    }

    // Pending entries are never evicted; they may still have to be reverted.
    fn enforce_bound(&mut self) {
        while self.entries.len() > self.max_entries {
            let Some(index) = self.entries.iter().position(PendingOperation::is_settled) else {
                break;
            };
            self.entries.remove(index);
        }
    }
}

fn revert_operation<T: Clone>(entry: &PendingOperation<T>, items: &mut Vec<Record<T>>) {
    match entry.op_type {
        OperationType::Create => {
            items.retain(|item| item.id != entry.target_id);
        }
        OperationType::Update => {
            let Some(before) = entry.rollback_snapshot.as_ref() else {
                return;
            };
            if let Some(current) = items.iter_mut().find(|item| item.id == entry.target_id) {
                *current = before.clone();
            }
        }
        OperationType::Delete => {
            let Some(removed) = entry.rollback_snapshot.as_ref() else {
                return;
            };
            if items.iter().any(|item| item.id == entry.target_id) {
                return;
            }
            let position = entry.position.unwrap_or(items.len()).min(items.len());
            items.insert(position, removed.clone());
        }
    }
}
