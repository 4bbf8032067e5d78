// ============================================================================
// agentconf Library
// ============================================================================

//! Settings layer for AI-agent configuration.
//!
//! The core is [`CollectionStore`]: an in-memory collection that applies
//! mutations immediately, coalesces bursts of changes into one debounced
//! write, keeps an auditable log of pending operations, rolls optimistic
//! changes back when a write fails and retries transient failures with
//! exponential backoff.
//!
//! ```
//! use agentconf::{InMemoryAdapter, RoleInput, RoleStore, RolesDocument};
//! use std::sync::Arc;
//!
//! # fn main() -> agentconf::Result<()> {
//! tokio_test::block_on(async {
//!     let roles = RoleStore::default();
//!     let adapter = Arc::new(InMemoryAdapter::<RolesDocument>::new());
//!     roles.initialize(adapter.clone()).await?;
//!
//!     let id = roles.create_item(RoleInput::new("Manager"))?;
//!     roles.update_item(&id, RoleInput::new("Lead Manager"))?;
//!     roles.persist_changes().await?;
//!
//!     let stored = adapter.stored().expect("saved document");
//!     assert_eq!(stored.roles[0].name, "Lead Manager");
//!     roles.destroy();
//!     Ok::<_, agentconf::StoreError>(())
//! })
//! # }
//! ```

pub mod adapter;
pub mod core;
pub mod entities;
pub mod store;

// Re-export main types for convenience
pub use crate::adapter::{InMemoryAdapter, JsonFileAdapter, PersistenceAdapter};
pub use crate::core::{
    Clock, FieldError, ManualClock, OperationKind, Result, StoreError, SystemClock,
};
pub use entities::{AgentInput, AgentStore, AgentsDocument, RoleInput, RoleStore, RolesDocument};
pub use store::{
    CollectionStore, CollectionStoreStats, ErrorState, FailureKind, OperationStatus,
    OperationType, PendingOperation, Record, RetryPolicy, StoreOptions, StorePolicy,
};
