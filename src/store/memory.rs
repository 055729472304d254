use super::{auto_id, DocumentStore};
use crate::document::{DocPath, Document, Fields};
use crate::error::StoreError;
use crate::live::LiveStream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, RwLock};

/// In-process document store. Every write bumps a revision counter, and live
/// streams re-read their slice of the store on each bump and publish when it
/// differs from what they last sent.
#[derive(Clone)]
pub struct MemoryStore {
    docs: Arc<RwLock<BTreeMap<DocPath, Fields>>>,
    revision: Arc<watch::Sender<u64>>,
    // Failure injection for tests of error propagation
    fail_next: Arc<Mutex<Option<String>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            docs: Arc::new(RwLock::new(BTreeMap::new())),
            revision: Arc::new(revision),
            fail_next: Arc::new(Mutex::new(None)),
        }
    }

    /// Makes the next store call fail with a transport error.
    pub fn set_failure(&self, msg: &str) {
        if let Ok(mut fail) = self.fail_next.lock() {
            *fail = Some(msg.to_string());
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    /// Live streams currently following this store.
    pub fn watcher_count(&self) -> usize {
        self.revision.receiver_count()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        if let Ok(mut fail) = self.fail_next.lock() {
            if let Some(msg) = fail.take() {
                return Err(StoreError::Transport(msg));
            }
        }
        Ok(())
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    async fn snapshot_document(&self, path: &DocPath) -> Option<Document> {
        self.docs
            .read()
            .await
            .get(path)
            .map(|fields| Document::new(path.clone(), fields.clone()))
    }

    async fn snapshot_collection(&self, collection: &DocPath) -> Vec<Document> {
        self.docs
            .read()
            .await
            .iter()
            .filter(|(path, _)| path.is_child_of(collection))
            .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
            .collect()
    }
}

fn require_document(path: &DocPath) -> Result<(), StoreError> {
    if path.is_document() {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(path.to_string()))
    }
}

fn require_collection(path: &DocPath) -> Result<(), StoreError> {
    if path.is_collection() {
        Ok(())
    } else {
        Err(StoreError::InvalidPath(path.to_string()))
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        self.check_failure()?;
        require_document(path)?;
        Ok(self.snapshot_document(path).await)
    }

    async fn set(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        self.check_failure()?;
        require_document(path)?;
        self.docs.write().await.insert(path.clone(), fields);
        self.bump();
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Fields) -> Result<(), StoreError> {
        self.check_failure()?;
        require_document(path)?;
        {
            let mut docs = self.docs.write().await;
            let existing = docs
                .get_mut(path)
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            for (key, value) in fields {
                existing.insert(key, value);
            }
        }
        self.bump();
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.check_failure()?;
        require_document(path)?;
        let removed = self.docs.write().await.remove(path).is_some();
        if removed {
            self.bump();
        }
        Ok(())
    }

    async fn list(&self, collection: &DocPath) -> Result<Vec<Document>, StoreError> {
        self.check_failure()?;
        require_collection(collection)?;
        Ok(self.snapshot_collection(collection).await)
    }

    async fn query_eq(
        &self,
        collection: &DocPath,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StoreError> {
        self.check_failure()?;
        require_collection(collection)?;
        Ok(self
            .snapshot_collection(collection)
            .await
            .into_iter()
            .filter(|doc| doc.fields.get(field) == Some(value))
            .collect())
    }

    fn new_document_id(&self, _collection: &DocPath) -> String {
        auto_id()
    }

    async fn watch_document(
        &self,
        path: &DocPath,
    ) -> Result<LiveStream<Option<Document>>, StoreError> {
        self.check_failure()?;
        require_document(path)?;

        let mut revisions = self.revision.subscribe();
        let initial = self.snapshot_document(path).await;
        let (tx, rx) = watch::channel(initial.clone());

        let store = self.clone();
        let path = path.clone();
        let producer = tokio::spawn(async move {
            let mut last = initial;
            while revisions.changed().await.is_ok() {
                let next = store.snapshot_document(&path).await;
                if next != last {
                    last = next.clone();
                    if tx.send(next).is_err() {
                        break;
                    }
                }
            }
        });
        Ok(LiveStream::new(rx, producer))
    }

    async fn watch_collection(
        &self,
        collection: &DocPath,
    ) -> Result<LiveStream<Vec<Document>>, StoreError> {
        self.check_failure()?;
        require_collection(collection)?;

        let mut revisions = self.revision.subscribe();
        let initial = self.snapshot_collection(collection).await;
        let (tx, rx) = watch::channel(initial.clone());

        let store = self.clone();
        let collection = collection.clone();
        let producer = tokio::spawn(async move {
            let mut last = initial;
            while revisions.changed().await.is_ok() {
                let next = store.snapshot_collection(&collection).await;
                if next != last {
                    last = next.clone();
                    if tx.send(next).is_err() {
                        break;
                    }
                }
            }
        });
        Ok(LiveStream::new(rx, producer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    fn path(raw: &str) -> DocPath {
        DocPath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.get(&path("apks/nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::new();
        let p = path("apks/1");
        store.set(&p, fields(json!({"a": 1, "b": 2}))).await.unwrap();
        store.set(&p, fields(json!({"a": 3}))).await.unwrap();
        let doc = store.get(&p).await.unwrap().unwrap();
        assert_eq!(doc.fields, fields(json!({"a": 3})));
        assert_eq!(doc.id, "1");
    }

    #[tokio::test]
    async fn test_update_merges_and_requires_existence() {
        let store = MemoryStore::new();
        let p = path("categorias/c1");
        let missing = store.update(&p, fields(json!({"nombre": "x"}))).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));

        store
            .set(&p, fields(json!({"nombre": "Juegos", "orden": 1})))
            .await
            .unwrap();
        store
            .update(&p, fields(json!({"nombre": "Games"})))
            .await
            .unwrap();
        let doc = store.get(&p).await.unwrap().unwrap();
        assert_eq!(doc.fields, fields(json!({"nombre": "Games", "orden": 1})));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let p = path("apks/1");
        store.set(&p, Fields::new()).await.unwrap();
        store.delete(&p).await.unwrap();
        store.delete(&p).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_list_only_direct_children() {
        let store = MemoryStore::new();
        store.set(&path("Usuarios/u1"), Fields::new()).await.unwrap();
        store
            .set(&path("Usuarios/u1/sueldos/s1"), Fields::new())
            .await
            .unwrap();
        store.set(&path("apks/a"), Fields::new()).await.unwrap();

        let users = store.list(&path("Usuarios")).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "u1");

        let sueldos = store.list(&path("Usuarios/u1/sueldos")).await.unwrap();
        assert_eq!(sueldos.len(), 1);
    }

    #[tokio::test]
    async fn test_query_eq() {
        let store = MemoryStore::new();
        store
            .set(&path("Usuarios/a"), fields(json!({"dni": "1"})))
            .await
            .unwrap();
        store
            .set(&path("Usuarios/b"), fields(json!({"dni": "2"})))
            .await
            .unwrap();
        let hits = store
            .query_eq(&path("Usuarios"), "dni", &json!("2"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[tokio::test]
    async fn test_wrong_path_kind_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get(&path("apks")).await,
            Err(StoreError::InvalidPath(_))
        ));
        assert!(matches!(
            store.list(&path("apks/1")).await,
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_failure_injection_is_one_shot() {
        let store = MemoryStore::new();
        store.set_failure("offline");
        let err = store.get(&path("apks/1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(ref m) if m == "offline"));
        assert!(store.get(&path("apks/1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_watch_collection_emits_full_set() {
        let store = MemoryStore::new();
        store
            .set(&path("apks/1"), fields(json!({"n": 1})))
            .await
            .unwrap();
        let mut live = store.watch_collection(&path("apks")).await.unwrap();
        assert_eq!(live.current().len(), 1);

        store
            .set(&path("apks/2"), fields(json!({"n": 2})))
            .await
            .unwrap();
        let next = tokio::time::timeout(Duration::from_secs(2), live.changed())
            .await
            .unwrap()
            .unwrap();
        let ids: Vec<_> = next.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_watch_document_sees_delete() {
        let store = MemoryStore::new();
        let p = path("apks/1");
        store.set(&p, fields(json!({"n": 1}))).await.unwrap();
        let mut live = store.watch_document(&p).await.unwrap();
        assert!(live.current().is_some());

        store.delete(&p).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(2), live.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(next.is_none());
    }
}
