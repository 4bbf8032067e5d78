//! Storage back ends a [`CollectionStore`](crate::store::CollectionStore) writes through.

mod json_file;
mod memory;

pub use json_file::JsonFileAdapter;
pub use memory::InMemoryAdapter;

use crate::core::Result;
use async_trait::async_trait;

/// Durable home of one collection, holding a single persisted document `P`.
#[async_trait]
pub trait PersistenceAdapter<P>: Send + Sync {
    /// Replaces the stored document with `data`.
    async fn save(&self, data: &P) -> Result<()>;

    /// Returns the stored document, or `None` when nothing was saved yet.
    async fn load(&self) -> Result<Option<P>>;

    /// Removes the stored document.
    async fn reset(&self) -> Result<()>;
}
