pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use crate::document::{DocPath, Document, Fields};
use crate::error::StoreError;
use crate::live::LiveStream;
use serde_json::Value;

/// The document database boundary. Documents are untyped field maps here;
/// typing happens in `DataAccessService`.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// `Ok(None)` when the document does not exist.
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Upsert: replaces whatever is stored at `path`.
    async fn set(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError>;

    /// Merges top-level fields into an existing document.
    /// Fails with `StoreError::NotFound` when the document is missing.
    async fn update(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError>;

    /// Idempotent.
    async fn delete(&self, path: &DocPath) -> Result<(), StoreError>;

    /// Every document directly inside `collection`, ordered by id.
    async fn list(&self, collection: &DocPath) -> Result<Vec<Document>, StoreError>;

    /// Documents in `collection` whose `field` equals `value`.
    async fn query_eq(
        &self,
        collection: &DocPath,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError>;

    /// Allocates an id for a new document in `collection`.
    fn new_document_id(&self, collection: &DocPath) -> String;

    /// Live view of one document. The initial value is fetched before returning.
    async fn watch_document(
        &self,
        path: &DocPath,
    ) -> Result<LiveStream<Option<Document>>, StoreError>;

    /// Live view of a whole collection; every emission is the full current set.
    async fn watch_collection(
        &self,
        collection: &DocPath,
    ) -> Result<LiveStream<Vec<Document>>, StoreError>;
}

/// Firestore-style auto id: 20 alphanumeric characters.
pub fn auto_id() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_id_shape() {
        let a = auto_id();
        let b = auto_id();
        assert_eq!(a.len(), 20);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
