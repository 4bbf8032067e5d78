use agentconf::entities::PersistedRole;
use agentconf::{
    FailureKind, InMemoryAdapter, OperationKind, OperationStatus, OperationType, RoleInput,
    RoleStore, RolesDocument, StoreError, StoreOptions, StorePolicy,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

type RolesAdapter = InMemoryAdapter<RolesDocument>;

async fn initialized_store(adapter: RolesAdapter) -> (RoleStore, Arc<RolesAdapter>) {
    initialized_store_with(adapter, StorePolicy::default()).await
}

async fn initialized_store_with(
    adapter: RolesAdapter,
    policy: StorePolicy,
) -> (RoleStore, Arc<RolesAdapter>) {
    let store = RoleStore::roles(StoreOptions::default().policy(policy));
    let adapter = Arc::new(adapter);
    store
        .initialize(adapter.clone())
        .await
        .expect("initialize roles");
    (store, adapter)
}

fn stored_role(id: &str, name: &str) -> PersistedRole {
    let now = Utc::now();
    PersistedRole {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        instructions: String::new(),
        created_at: now,
        updated_at: now,
    }
}

fn names(store: &RoleStore) -> Vec<String> {
    store
        .items()
        .into_iter()
        .map(|record| record.fields.name)
        .collect()
}

fn assert_gap_ms(gap: Duration, expected_ms: u64) {
    let actual = gap.as_millis() as u64;
    assert!(
        actual.abs_diff(expected_ms) <= 2,
        "expected a gap of ~{expected_ms}ms, got {actual}ms"
    );
}

#[tokio::test(start_paused = true)]
async fn rapid_mutations_are_coalesced_into_one_save() {
    let (store, adapter) = initialized_store(InMemoryAdapter::new()).await;

    for index in 0..5 {
        store
            .create_item(RoleInput::new(format!("Role {index}")))
            .expect("create role");
        sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(adapter.save_calls(), 0);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(adapter.save_calls(), 1);
    let saved = adapter.saved_payloads();
    assert_eq!(saved[0].roles.len(), 5);
    assert_eq!(saved[0].roles[4].name, "Role 4");
    assert!(store.last_sync_time().is_some());
}

#[tokio::test(start_paused = true)]
async fn rename_within_window_saves_final_state_once() {
    let (store, adapter) = initialized_store(InMemoryAdapter::new()).await;

    let id = store
        .create_item(RoleInput::new("Manager"))
        .expect("create manager");
    sleep(Duration::from_millis(50)).await;
    store
        .update_item(&id, RoleInput::new("Lead Manager"))
        .expect("rename manager");

    sleep(Duration::from_millis(600)).await;
    assert_eq!(adapter.save_calls(), 1);
    let saved = adapter.stored().expect("saved roles");
    assert_eq!(saved.roles.len(), 1);
    assert_eq!(saved.roles[0].name, "Lead Manager");

    let operations = store.pending_operations();
    assert_eq!(operations.len(), 2);
    assert_eq!(operations[0].op_type, OperationType::Create);
    assert_eq!(operations[1].op_type, OperationType::Update);
    assert!(
        operations
            .iter()
            .all(|op| op.status == OperationStatus::Completed && op.rollback_snapshot.is_none())
    );
}

#[tokio::test(start_paused = true)]
async fn failed_save_rolls_back_every_change_of_the_batch() {
    let existing = RolesDocument {
        version: 1,
        roles: vec![
            stored_role("a", "Alpha"),
            stored_role("b", "Beta"),
            stored_role("c", "Gamma"),
        ],
    };
    let (store, adapter) = initialized_store(InMemoryAdapter::with_data(existing)).await;
    let before = store.items();

    adapter.fail_saves_with(Some(StoreError::storage("EACCES", "permission denied")));
    store.create_item(RoleInput::new("Delta")).expect("create");
    store
        .update_item("a", RoleInput::new("Alpha 2"))
        .expect("update");
    store.delete_item("b").expect("delete");
    assert_eq!(names(&store), vec!["Alpha 2", "Gamma", "Delta"]);

    sleep(Duration::from_millis(600)).await;
    assert_eq!(store.items(), before);
    assert_eq!(adapter.save_calls(), 1);

    let error = store.get_error_details().expect("error state");
    assert_eq!(error.kind, FailureKind::Permission);
    assert_eq!(error.operation, Some(OperationKind::Save));
    assert!(!error.is_retryable);
    assert!(error.message.contains("check storage permissions"));
    assert!(
        store
            .pending_operations()
            .iter()
            .all(|op| op.status == OperationStatus::Failed)
    );
    assert!(!store.is_saving());
}

#[tokio::test(start_paused = true)]
async fn disk_full_save_leaves_an_empty_collection_and_no_retry() {
    let (store, adapter) = initialized_store(InMemoryAdapter::new()).await;
    adapter.fail_next_save(StoreError::storage("ENOSPC", "no space left on device"));

    store.create_item(RoleInput::new("Manager")).expect("create");
    sleep(Duration::from_millis(600)).await;

    assert!(store.items().is_empty());
    let error = store.get_error_details().expect("error state");
    assert_eq!(error.kind, FailureKind::DiskSpace);
    assert!(!error.is_retryable);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(adapter.save_calls(), 1);
    assert_eq!(store.retry_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_with_doubling_backoff_up_to_the_bound() {
    let (store, adapter) = initialized_store(InMemoryAdapter::new()).await;
    adapter.fail_saves_with(Some(StoreError::storage("ETIMEDOUT", "timed out")));

    store.create_item(RoleInput::new("Manager")).expect("create");
    sleep(Duration::from_secs(20)).await;

    let instants = adapter.save_instants();
    assert_eq!(instants.len(), 4, "initial save plus three retries");
    assert_gap_ms(instants[1] - instants[0], 1_000);
    assert_gap_ms(instants[2] - instants[1], 2_000);
    assert_gap_ms(instants[3] - instants[2], 4_000);

    let error = store.get_error_details().expect("error stands");
    assert_eq!(error.kind, FailureKind::NetworkTimeout);
    assert!(error.is_retryable);
    assert_eq!(error.retry_count, 3);
    assert_eq!(store.retry_count(), 3);
    assert_eq!(store.stats().armed_timers, 0);
}

#[tokio::test(start_paused = true)]
async fn retry_succeeds_and_resets_the_counter() {
    let (store, adapter) = initialized_store(InMemoryAdapter::new()).await;
    adapter.fail_next_save(StoreError::storage("ECONNRESET", "connection reset"));

    store.create_item(RoleInput::new("Manager")).expect("create");
    sleep(Duration::from_millis(600)).await;
    assert_eq!(store.retry_count(), 1);
    assert!(store.get_error_details().is_some());

    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(adapter.save_calls(), 2);
    assert_eq!(store.retry_count(), 0);
    assert!(store.get_error_details().is_none());
}

#[tokio::test(start_paused = true)]
async fn validation_failures_from_storage_are_not_retried() {
    let (store, adapter) = initialized_store(InMemoryAdapter::new()).await;
    adapter.fail_saves_with(Some(StoreError::Validation(vec![agentconf::FieldError::new(
        "roles[0].name",
        "rejected by schema",
    )])));

    store.create_item(RoleInput::new("Manager")).expect("create");
    let result = store.persist_changes().await;
    assert!(result.is_err());
    assert!(store.is_empty());

    sleep(Duration::from_secs(30)).await;
    assert_eq!(adapter.save_calls(), 1);
    let error = store.get_error_details().expect("error state");
    assert_eq!(error.kind, FailureKind::Validation);
    assert_eq!(error.field_errors.map(|fields| fields.len()), Some(1));
}

#[tokio::test(start_paused = true)]
async fn concurrent_flushes_issue_a_single_save() {
    let adapter = InMemoryAdapter::new().with_save_latency(Duration::from_secs(1));
    let (store, adapter) = initialized_store(adapter).await;
    store.create_item(RoleInput::new("Manager")).expect("create");

    let (first, second) = tokio::join!(store.persist_changes(), store.persist_changes());
    first.expect("first flush");
    second.expect("second flush");
    assert_eq!(adapter.save_calls(), 1);
    assert!(!store.is_saving());
    store.destroy();
}

fn manager_document() -> RolesDocument {
    RolesDocument {
        version: 1,
        roles: vec![stored_role("m", "Manager")],
    }
}

fn slow_adapter(data: Option<RolesDocument>) -> RolesAdapter {
    let adapter = match data {
        Some(document) => InMemoryAdapter::with_data(document),
        None => InMemoryAdapter::new(),
    };
    adapter.with_save_latency(Duration::from_secs(1))
}

#[tokio::test(start_paused = true)]
async fn mutation_during_an_inflight_save_is_flushed_after_it() {
    let (store, adapter) = initialized_store(slow_adapter(None)).await;

    store.create_item(RoleInput::new("First")).expect("create first");
    let inflight = tokio::spawn({
        let store = store.clone();
        async move { store.persist_changes().await }
    });
    sleep(Duration::from_millis(100)).await;
    assert!(store.is_saving());
    store.create_item(RoleInput::new("Second")).expect("create second");
    assert_eq!(store.stats().armed_timers, 1);

    inflight.await.expect("flush task").expect("first save");
    sleep(Duration::from_secs(2)).await;

    assert_eq!(adapter.save_calls(), 2);
    let stored = adapter.stored().expect("stored roles");
    let stored_names = stored
        .roles
        .iter()
        .map(|role| role.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(stored_names, vec!["First", "Second"]);
    assert!(
        store
            .pending_operations()
            .iter()
            .all(|op| op.status == OperationStatus::Completed)
    );
}

#[tokio::test(start_paused = true)]
async fn failed_save_discards_updates_made_while_it_was_in_flight() {
    let (store, adapter) = initialized_store(slow_adapter(Some(manager_document()))).await;
    adapter.fail_next_save(StoreError::storage("ENOSPC", "disk full"));

    store.update_item("m", RoleInput::new("Lead")).expect("rename to lead");
    let inflight = tokio::spawn({
        let store = store.clone();
        async move { store.persist_changes().await }
    });
    sleep(Duration::from_millis(100)).await;
    store
        .update_item("m", RoleInput::new("Director"))
        .expect("rename to director");

    let result = inflight.await.expect("flush task");
    assert!(result.is_err());
    assert_eq!(names(&store), vec!["Manager"]);

    let operations = store.pending_operations();
    assert_eq!(operations.len(), 2);
    assert!(
        operations
            .iter()
            .all(|op| op.status == OperationStatus::Failed && op.rollback_snapshot.is_none())
    );
    let error = store.get_error_details().expect("error state");
    assert_eq!(error.kind, FailureKind::DiskSpace);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(adapter.save_calls(), 1);
    assert_eq!(adapter.stored().expect("stored roles").roles[0].name, "Manager");
    assert_eq!(names(&store), vec!["Manager"]);
}

#[tokio::test(start_paused = true)]
async fn failed_save_never_duplicates_a_name_taken_again_while_in_flight() {
    let (store, adapter) = initialized_store(slow_adapter(Some(manager_document()))).await;
    adapter.fail_next_save(StoreError::storage("ENOSPC", "disk full"));

    store.delete_item("m").expect("delete manager");
    let inflight = tokio::spawn({
        let store = store.clone();
        async move { store.persist_changes().await }
    });
    sleep(Duration::from_millis(100)).await;
    let recreated = store
        .create_item(RoleInput::new("Manager"))
        .expect("name is free again");

    assert!(inflight.await.expect("flush task").is_err());
    let items = store.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "m");
    assert!(store.get_by_id(&recreated).is_none());
    assert!(!store.is_name_unique("Manager", None));
    assert!(store.is_name_unique("Manager", Some("m")));

    sleep(Duration::from_secs(3)).await;
    assert_eq!(adapter.save_calls(), 1);
    let stored = adapter.stored().expect("stored roles");
    assert_eq!(stored.roles.len(), 1);
    assert_eq!(stored.roles[0].id, "m");
}

#[tokio::test(start_paused = true)]
async fn sync_during_a_failing_save_keeps_the_synced_collection() {
    let (store, adapter) = initialized_store(slow_adapter(None)).await;
    adapter.fail_next_save(StoreError::storage("EACCES", "permission denied"));

    store.create_item(RoleInput::new("Local")).expect("create local");
    let inflight = tokio::spawn({
        let store = store.clone();
        async move { store.persist_changes().await }
    });
    sleep(Duration::from_millis(100)).await;
    adapter.set_stored(Some(RolesDocument {
        version: 1,
        roles: vec![stored_role("r", "Remote")],
    }));
    store.sync_with_storage().await.expect("sync while saving");
    assert_eq!(names(&store), vec!["Remote"]);

    assert!(inflight.await.expect("flush task").is_err());
    assert_eq!(names(&store), vec!["Remote"]);
    assert!(
        store
            .pending_operations()
            .iter()
            .all(|op| op.status == OperationStatus::Failed)
    );
    let error = store.get_error_details().expect("error state");
    assert_eq!(error.kind, FailureKind::Permission);
    assert_eq!(error.operation, Some(OperationKind::Save));
}

#[tokio::test(start_paused = true)]
async fn unrecognised_storage_errors_are_retried() {
    let (store, adapter) = initialized_store(InMemoryAdapter::new()).await;
    adapter.fail_next_save(StoreError::Storage {
        code: None,
        message: "invalid handle".to_string(),
    });

    store.create_item(RoleInput::new("Manager")).expect("create");
    sleep(Duration::from_millis(600)).await;
    let error = store.get_error_details().expect("error state");
    assert_eq!(error.kind, FailureKind::Unknown);
    assert!(error.is_retryable);
    assert_eq!(error.retry_count, 1);

    sleep(Duration::from_millis(1_100)).await;
    assert_eq!(adapter.save_calls(), 2);
    assert!(store.get_error_details().is_none());
}

#[tokio::test]
async fn mutation_errors_are_local_and_not_retryable() {
    let (store, adapter) = initialized_store(InMemoryAdapter::new()).await;
    let id = store.create_item(RoleInput::new("Manager")).expect("create");

    let duplicate = store.create_item(RoleInput::new("  MANAGER "));
    assert!(matches!(duplicate, Err(StoreError::DuplicateName(_))));
    let error = store.get_error_details().expect("duplicate error");
    assert_eq!(error.kind, FailureKind::Validation);
    assert_eq!(error.operation, None);
    assert!(!error.is_retryable);
    assert!(error.field_errors.is_some());
    assert_eq!(store.len(), 1);

    let missing = store.update_item("nope", RoleInput::new("Other"));
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
    assert_eq!(
        store.get_error_details().map(|error| error.kind),
        Some(FailureKind::NotFound)
    );
    assert!(matches!(
        store.delete_item("nope"),
        Err(StoreError::NotFound(_))
    ));

    let invalid = store.create_item(RoleInput::new(""));
    assert!(matches!(invalid, Err(StoreError::Validation(_))));
    let error = store.get_error_details().expect("validation error");
    assert_eq!(
        error.field_errors.expect("field errors")[0].path,
        "name".to_string()
    );

    // Keeping its own name is not a collision.
    store
        .update_item(&id, RoleInput::new("manager").description("Runs things"))
        .expect("update in place");
    assert!(store.get_error_details().is_none());
    assert!(store.is_name_unique("Reviewer", None));
    assert!(!store.is_name_unique("MANAGER", None));
    assert!(store.is_name_unique("MANAGER", Some(&id)));

    assert_eq!(store.pending_operations().len(), 2);
    store.destroy();
    assert_eq!(adapter.save_calls(), 0);
}

#[tokio::test]
async fn flushing_without_an_adapter_keeps_changes_and_reports() {
    let store = RoleStore::default();
    store.create_item(RoleInput::new("Manager")).expect("create");

    let result = store.persist_changes().await;
    assert!(matches!(result, Err(StoreError::NotInitialized(_))));
    assert_eq!(names(&store), vec!["Manager"]);

    let error = store.get_error_details().expect("error state");
    assert_eq!(error.operation, Some(OperationKind::Save));
    assert!(!error.is_retryable);
    store.destroy();
}

#[tokio::test(start_paused = true)]
async fn manual_retry_resends_and_is_a_noop_for_terminal_errors() {
    let policy = StorePolicy::default().max_retry_attempts(0);
    let (store, adapter) = initialized_store_with(InMemoryAdapter::new(), policy).await;
    adapter.fail_next_save(StoreError::storage("ETIMEDOUT", "timed out"));

    store.create_item(RoleInput::new("Manager")).expect("create");
    sleep(Duration::from_millis(600)).await;
    let error = store.get_error_details().expect("error stands");
    assert!(error.is_retryable);
    assert_eq!(adapter.save_calls(), 1);

    store.retry_last_operation().await.expect("manual retry");
    assert_eq!(adapter.save_calls(), 2);
    assert!(store.get_error_details().is_none());

    adapter.fail_next_save(StoreError::storage("EROFS", "read-only file system"));
    store.create_item(RoleInput::new("Reviewer")).expect("create");
    sleep(Duration::from_millis(600)).await;
    assert_eq!(adapter.save_calls(), 3);
    assert!(!store.get_error_details().expect("terminal error").is_retryable);

    store.retry_last_operation().await.expect("no-op retry");
    assert_eq!(adapter.save_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn destroy_cancels_timers_and_discards_rollback_data() {
    let (store, adapter) = initialized_store(InMemoryAdapter::new()).await;
    let id = store.create_item(RoleInput::new("Manager")).expect("create");
    store
        .update_item(&id, RoleInput::new("Lead"))
        .expect("update");
    assert_eq!(store.stats().armed_timers, 1);

    store.destroy();
    sleep(Duration::from_secs(5)).await;

    assert_eq!(adapter.save_calls(), 0);
    assert_eq!(store.stats().armed_timers, 0);
    assert_eq!(names(&store), vec!["Lead"]);
    assert!(
        store
            .pending_operations()
            .iter()
            .all(|op| op.rollback_snapshot.is_none())
    );

    store.create_item(RoleInput::new("Other")).expect("create after destroy");
    sleep(Duration::from_secs(5)).await;
    assert_eq!(adapter.save_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn subscribers_observe_every_change() {
    let (store, _adapter) = initialized_store(InMemoryAdapter::new()).await;
    let mut changes = store.subscribe();
    changes.borrow_and_update();

    store.create_item(RoleInput::new("Manager")).expect("create");
    assert!(changes.has_changed().expect("store alive"));
    let after_create = *changes.borrow_and_update();

    sleep(Duration::from_millis(600)).await;
    assert!(*changes.borrow_and_update() > after_create);

    let stats = store.stats();
    assert_eq!(stats.store_name, "roles");
    assert_eq!(stats.item_count, 1);
    assert_eq!(stats.completed_operations, 1);
    assert_eq!(stats.pending_operations, 0);
    assert_eq!(stats.revision, *changes.borrow());
}
