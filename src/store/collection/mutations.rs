impl<V, M> CollectionStore<V, M>
where
    V: Validator,
    M: Mapper<Fields = Fields<V>>,
{
    /// Validates `input` and appends it as a new record.
    ///
    /// The change is visible immediately; durability follows after the
    /// debounce window. Returns the new record id. A rejected input leaves
    /// the collection untouched and is also recorded as the store's error.
    pub fn create_item(&self, input: V::Input) -> Result<String> {
        let validated = self.shared.validator.validate(input);
        let now = self.now();
        let mut guard = self.state();
        let state = &mut *guard;

        let fields = match validated {
            Validation::Valid(fields) => fields,
            Validation::Invalid(field_errors) => {
                return Err(self.reject(state, StoreError::Validation(field_errors)));
            }
        };
        if !state.is_name_unique(fields.name(), None) {
            let name = fields.name().trim().to_string();
            return Err(self.reject(state, StoreError::DuplicateName(name)));
        }

        let record = Record::new(fields, now);
        let id = record.id.clone();
        state.items.push(record);
        state.operations.record_create(&id, now);
        state.error = None;
        self.touch(state);
        drop(guard);

        debug!("store '{}': created {}", self.shared.name, id);
        self.schedule_flush();
        Ok(id)
    }

    /// Replaces the fields of an existing record and refreshes `updated_at`.
    pub fn update_item(&self, id: &str, input: V::Input) -> Result<()> {
        let validated = self.shared.validator.validate(input);
        let now = self.now();
        let mut guard = self.state();
        let state = &mut *guard;

        let fields = match validated {
            Validation::Valid(fields) => fields,
            Validation::Invalid(field_errors) => {
                return Err(self.reject(state, StoreError::Validation(field_errors)));
            }
        };
        let Some(position) = state.position_of(id) else {
            return Err(self.reject(state, StoreError::NotFound(id.to_string())));
        };
        if !state.is_name_unique(fields.name(), Some(id)) {
            let name = fields.name().trim().to_string();
            return Err(self.reject(state, StoreError::DuplicateName(name)));
        }

        let before = state.items[position].clone();
        let current = &mut state.items[position];
        current.fields = fields;
        current.updated_at = now.max(before.updated_at);
        state.operations.record_update(before, position, now);
        state.error = None;
        self.touch(state);
        drop(guard);

        debug!("store '{}': updated {}", self.shared.name, id);
        self.schedule_flush();
        Ok(())
    }

    pub fn delete_item(&self, id: &str) -> Result<()> {
        let now = self.now();
        let mut guard = self.state();
        let state = &mut *guard;

        let Some(position) = state.position_of(id) else {
            return Err(self.reject(state, StoreError::NotFound(id.to_string())));
        };
        let removed = state.items.remove(position);
        state.operations.record_delete(removed, position, now);
        state.error = None;
        self.touch(state);
        drop(guard);

        debug!("store '{}': deleted {}", self.shared.name, id);
        self.schedule_flush();
        Ok(())
    }

    /// Records a mutation-time failure as the store's error and hands it back.
    fn reject(
        &self,
        state: &mut CollectionState<Fields<V>, Persisted<M>>,
        err: StoreError,
    ) -> StoreError {
        warn!("store '{}': mutation rejected: {}", self.shared.name, err);
        state.error = Some(ErrorState::for_mutation(&err, self.now()));
        self.touch(state);
        err
    }

    /// Arms (or re-arms) the debounce timer that flushes the collection.
    fn schedule_flush(&self) {
        let shared = self.weak_shared();
        let armed = self.shared.debounce.arm(&self.shared.timers, async move {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let store = Self::from_shared(shared);
            if let Err(err) = store.flush(OperationKind::Save, true).await {
                debug!("store '{}': debounced flush failed: {}", store.name(), err);
            }
        });
        if !armed {
            debug!(
                "store '{}': flush timer not armed, changes stay in memory",
                self.shared.name
            );
        }
    }
}
