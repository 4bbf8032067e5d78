impl<V, M> CollectionStore<V, M>
where
    V: Validator,
    M: Mapper<Fields = Fields<V>>,
{
    /// Attaches `adapter` and performs the initial load.
    ///
    /// An empty storage (`None`) yields an empty collection. On failure the
    /// adapter stays attached and the store stays uninitialized, so the load
    /// can be retried through [`Self::sync_with_storage`] or
    /// [`Self::retry_last_operation`].
    pub async fn initialize(&self, adapter: SharedAdapter<M>) -> Result<()> {
        {
            let mut state = self.state();
            if state.is_initialized {
                debug!("store '{}': already initialized", self.shared.name);
                return Ok(());
            }
            state.adapter = Some(adapter.clone());
        }
        self.load_from(adapter, OperationKind::Load).await
    }

    /// Replaces the in-memory collection with what storage holds.
    ///
    /// Last writer wins: nothing is merged, local changes not yet saved are
    /// discarded and their operations marked failed.
    pub async fn sync_with_storage(&self) -> Result<()> {
        let adapter = {
            let mut state = self.state();
            match state.adapter.clone() {
                Some(adapter) => adapter,
                None => {
                    let err = StoreError::NotInitialized(self.shared.name.clone());
                    self.record_failure(&mut state, OperationKind::Sync, &err);
                    return Err(err);
                }
            }
        };
        self.load_from(adapter, OperationKind::Sync).await
    }

    /// Mapped snapshot of the collection; storage is not touched.
    pub fn export_collection(&self) -> Persisted<M> {
        let state = self.state();
        self.shared.mapper.to_persisted(&state.items)
    }

    /// Replaces the whole collection with `records` and saves it.
    ///
    /// Records go through the mapper both ways, ids must be unique and every
    /// `updated_at` is refreshed. The pending operation log is cleared. A
    /// failed save is reported and returned but the imported collection is
    /// kept. When a save is already in flight the imported state is flushed
    /// after it settles.
    pub async fn import_collection(&self, records: Vec<Record<Fields<V>>>) -> Result<()> {
        let mapper = &self.shared.mapper;
        let mut imported = mapper.from_persisted(mapper.to_persisted(&records));

        let mut seen = HashSet::new();
        let duplicates = imported
            .iter()
            .enumerate()
            .filter(|(_, record)| !seen.insert(record.id.clone()))
            .map(|(index, record)| {
                FieldError::new(
                    format!("[{index}].id"),
                    format!("duplicate id '{}'", record.id),
                )
            })
            .collect::<Vec<_>>();
        if !duplicates.is_empty() {
            let err = StoreError::Validation(duplicates);
            let mut state = self.state();
            self.record_failure(&mut state, OperationKind::Import, &err);
            return Err(err);
        }

        let now = self.now();
        for record in &mut imported {
            record.updated_at = record.updated_at.max(now);
        }

        self.shared.debounce.cancel(&self.shared.timers);
        {
            let mut state = self.state();
            state.items = imported;
            state.operations.clear();
            state.error = None;
            self.touch(&mut state);
        }
        debug!(
            "store '{}': imported {} record(s)",
            self.shared.name,
            records.len()
        );

        match self.flush(OperationKind::Import, true).await? {
            FlushOutcome::Saved => Ok(()),
            FlushOutcome::Skipped => {
                self.schedule_flush();
                Ok(())
            }
        }
    }

    /// Clears the collection locally, then resets storage.
    ///
    /// The local collection stays cleared even if the adapter fails.
    pub async fn reset_collection(&self) -> Result<()> {
        let cancelled = self.shared.timers.cancel_all();
        let adapter = {
            let mut state = self.state();
            state.items.clear();
            state.operations.clear();
            state.is_initialized = false;
            state.retry_count = 0;
            state.follow_up_flush = false;
            state.error = None;
            self.touch(&mut state);

            match state.adapter.clone() {
                Some(adapter) => adapter,
                None => {
                    let err = StoreError::NotInitialized(self.shared.name.clone());
                    self.record_failure(&mut state, OperationKind::Reset, &err);
                    return Err(err);
                }
            }
        };
        debug!(
            "store '{}': cleared locally, {} timer(s) cancelled",
            self.shared.name, cancelled
        );

        match adapter.reset().await {
            Ok(()) => {
                debug!("store '{}': storage reset", self.shared.name);
                Ok(())
            }
            Err(err) => {
                let err = StoreError::persistence(OperationKind::Reset, err.to_string(), err);
                let mut state = self.state();
                self.record_failure(&mut state, OperationKind::Reset, &err);
                Err(err)
            }
        }
    }

    async fn load_from(&self, adapter: SharedAdapter<M>, operation: OperationKind) -> Result<()> {
        {
            let mut state = self.state();
            state.is_loading = true;
            self.touch(&mut state);
        }

        let loaded = adapter.load().await;
        let now = self.now();
        let mut state = self.state();
        state.is_loading = false;

        match loaded {
            Ok(persisted) => {
                let items = persisted
                    .map(|persisted| self.shared.mapper.from_persisted(persisted))
                    .map(|records| self.dedupe_by_id(records))
                    .unwrap_or_default();
                debug!(
                    "store '{}': {} loaded {} record(s)",
                    self.shared.name,
                    operation,
                    items.len()
                );
                let discarded = state.operations.discard_pending();
                if discarded > 0 {
                    debug!(
                        "store '{}': {} unsaved change(s) replaced from storage",
                        self.shared.name, discarded
                    );
                }
                state.items = items;
                state.is_initialized = true;
                state.last_sync_time = Some(now);
                state.error = None;
                self.touch(&mut state);
                Ok(())
            }
            Err(err) => {
                let err = StoreError::persistence(operation, err.to_string(), err);
                self.record_failure(&mut state, operation, &err);
                Err(err)
            }
        }
    }

    /// Keeps the first occurrence of every id.
    fn dedupe_by_id(&self, records: Vec<Record<Fields<V>>>) -> Vec<Record<Fields<V>>> {
        let total = records.len();
        let mut seen = HashSet::new();
        let unique = records
            .into_iter()
            .filter(|record| seen.insert(record.id.clone()))
            .collect::<Vec<_>>();
        if unique.len() < total {
            warn!(
                "store '{}': dropped {} record(s) with duplicate ids",
                self.shared.name,
                total - unique.len()
            );
        }
        unique
    }

    fn record_failure(
        &self,
        state: &mut CollectionState<Fields<V>, Persisted<M>>,
        operation: OperationKind,
        err: &StoreError,
    ) {
        let classification = classify_failure(err);
        warn!(
            "store '{}': {} failed ({}): {}",
            self.shared.name, operation, classification.kind, err
        );
        // None of these operations retries on its own.
        state.error = Some(ErrorState::from_classification(
            classification,
            Some(operation),
            0,
            self.now(),
        ));
        self.touch(state);
    }
}
