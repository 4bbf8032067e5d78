#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushOutcome {
    Saved,
    /// Another save was in flight.
    Skipped,
}

impl<V, M> CollectionStore<V, M>
where
    V: Validator,
    M: Mapper<Fields = Fields<V>>,
{
    /// Writes the current collection through the adapter.
    ///
    /// A call made while another save is in flight does nothing. On failure
    /// the collection is restored to its state before every unsaved change,
    /// including changes made while the save was in flight, the failure is
    /// classified into the error state and, when it looks transient, an
    /// automatic retry is scheduled. The failure is returned either way.
    pub async fn persist_changes(&self) -> Result<()> {
        self.flush(OperationKind::Save, false).await.map(|_| ())
    }

    /// Re-runs the operation that produced the current error, if it is retryable.
    ///
    /// Resets the automatic retry counter and cancels waiting retry timers.
    pub async fn retry_last_operation(&self) -> Result<()> {
        let Some(error) = self.get_error_details() else {
            debug!("store '{}': nothing to retry", self.shared.name);
            return Ok(());
        };
        if !error.is_retryable {
            debug!(
                "store '{}': last error is not retryable ({})",
                self.shared.name, error.kind
            );
            return Ok(());
        }

        self.shared
            .timers
            .cancel_where(|slot| matches!(slot, TimerSlot::Retry(_)));
        {
            let mut state = self.state();
            state.retry_count = 0;
            self.touch(&mut state);
        }

        match error.operation {
            Some(OperationKind::Save | OperationKind::Import) => self.persist_changes().await,
            Some(OperationKind::Load | OperationKind::Sync) => self.sync_with_storage().await,
            Some(OperationKind::Reset) => self.reset_collection().await,
            None => {
                debug!(
                    "store '{}': last error has no operation to retry",
                    self.shared.name
                );
                Ok(())
            }
        }
    }

    /// Runs one save. `deferred` flushes that find a save in flight ask for a
    /// follow-up flush once it settles instead of being dropped.
    async fn flush(&self, operation: OperationKind, deferred: bool) -> Result<FlushOutcome> {
        let span = info_span!(
            "store.flush",
            store = %self.shared.name,
            operation = %operation
        );
        self.flush_inner(operation, deferred).instrument(span).await
    }

    async fn flush_inner(&self, operation: OperationKind, deferred: bool) -> Result<FlushOutcome> {
        let (adapter, payload, batch) = {
            let mut guard = self.state();
            let state = &mut *guard;

            if state.is_saving {
                if deferred {
                    state.follow_up_flush = true;
                }
                event!(Level::DEBUG, "save already in flight, flush skipped");
                return Ok(FlushOutcome::Skipped);
            }
            let Some(adapter) = state.adapter.clone() else {
                let err = StoreError::NotInitialized(self.shared.name.clone());
                self.record_failure(state, operation, &err);
                return Err(err);
            };

            let batch = state.operations.begin_flush(&state.items);
            state.is_saving = true;
            state.error = None;
            let payload = self.shared.mapper.to_persisted(&state.items);
            // This save carries every change so far; later mutations re-arm.
            self.shared.debounce.cancel(&self.shared.timers);
            self.touch(state);
            (adapter, payload, batch)
        };

        event!(Level::DEBUG, operations = batch.len(), "saving collection");
        match adapter.save(&payload).await {
            Ok(()) => {
                self.finish_flush(&batch);
                event!(Level::INFO, operations = batch.len(), "collection saved");
                Ok(FlushOutcome::Saved)
            }
            Err(cause) => {
                self.fail_flush(operation, &batch, &cause);
                let err = match cause {
                    tagged @ StoreError::Persistence { .. } => tagged,
                    other => StoreError::persistence(operation, other.to_string(), other),
                };
                event!(Level::ERROR, error = %err, "collection save failed");
                Err(err)
            }
        }
    }

    fn finish_flush(&self, batch: &FlushBatch) {
        let now = self.now();
        let mut guard = self.state();
        let state = &mut *guard;
        state.is_saving = false;
        state.last_sync_time = Some(now);
        state.operations.complete(batch, now);
        state.retry_count = 0;
        let follow_up = std::mem::take(&mut state.follow_up_flush);
        self.touch(state);
        drop(guard);

        self.shared
            .timers
            .cancel_where(|slot| matches!(slot, TimerSlot::Retry(_)));
        if follow_up {
            self.schedule_flush();
        }
    }

    /// Settles a failed save. `cause` is the adapter's own error, classified
    /// as is.
    fn fail_flush(&self, operation: OperationKind, batch: &FlushBatch, cause: &StoreError) {
        let classification = classify_failure(cause);
        let now = self.now();
        let mut guard = self.state();
        let state = &mut *guard;
        state.is_saving = false;

        // Imports keep the replaced collection even when the write fails.
        let discarded = if operation == OperationKind::Save {
            state.operations.fail_and_restore(batch, &mut state.items)
        } else {
            state.operations.fail(batch);
            None
        };
        let follow_up = std::mem::take(&mut state.follow_up_flush);
        if discarded.is_some() {
            // Nothing newer than the restored collection is left to flush.
            self.shared.debounce.cancel(&self.shared.timers);
        }

        let retry_attempt = (operation == OperationKind::Save
            && self.shared.retry.should_retry(&classification, state.retry_count))
        .then(|| {
            state.retry_count += 1;
            state.retry_count
        });
        let retry_count = if operation == OperationKind::Save {
            state.retry_count
        } else {
            0
        };
        let kind = classification.kind;
        let retryable = classification.retryable;
        state.error = Some(ErrorState::from_classification(
            classification,
            Some(operation),
            retry_count,
            now,
        ));
        self.touch(state);
        drop(guard);

        match discarded {
            Some(count) => warn!(
                "store '{}': {} failed ({}, retryable: {}), {} change(s) rolled back: {}",
                self.shared.name, operation, kind, retryable, count, cause
            ),
            None => warn!(
                "store '{}': {} failed ({}, retryable: {}): {}",
                self.shared.name, operation, kind, retryable, cause
            ),
        }

        match retry_attempt {
            Some(attempt) => self.schedule_retry(attempt),
            None if retryable && operation == OperationKind::Save => warn!(
                "store '{}': giving up after {} automatic retries",
                self.shared.name,
                self.shared.retry.max_attempts()
            ),
            None => {}
        }
        if follow_up && discarded.is_none() {
            self.schedule_flush();
        }
    }

    fn schedule_retry(&self, attempt: u32) {
        let delay = self.shared.retry.backoff(attempt);
        let shared = self.weak_shared();
        let armed = self
            .shared
            .timers
            .schedule(TimerSlot::Retry(attempt), delay, async move {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                let store = Self::from_shared(shared);
                if let Err(err) = store.flush(OperationKind::Save, true).await {
                    debug!(
                        "store '{}': retry {} failed: {}",
                        store.name(),
                        attempt,
                        err
                    );
                }
            });

        if armed {
            debug!(
                "store '{}': retry {} of {} in {:?}",
                self.shared.name,
                attempt,
                self.shared.retry.max_attempts(),
                delay
            );
        }
    }
}
