use crate::blob_store::BlobStore;
use crate::document::{to_fields, DocPath, Fields};
use crate::error::{DecodeError, StoreError};
use crate::live::LiveStream;
use crate::models::{
    Apk, Categoria, CategoriaPatch, UserRecord, APKS_COLLECTION, CATEGORIAS_COLLECTION,
    USERS_COLLECTION, USER_SUBCOLLECTIONS,
};
use crate::password;
use crate::session::{Session, SessionSlot};
use crate::store::DocumentStore;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Typed access to the document store plus the catalog/user operations built on it.
pub struct DataAccessService<S: DocumentStore> {
    store: Arc<S>,
    blobs: Arc<dyn BlobStore>,
    session: Arc<SessionSlot>,
}

impl<S: DocumentStore> Clone for DataAccessService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            blobs: self.blobs.clone(),
            session: self.session.clone(),
        }
    }
}

impl<S: DocumentStore> DataAccessService<S> {
    pub fn new(store: Arc<S>, blobs: Arc<dyn BlobStore>, session: Arc<SessionSlot>) -> Self {
        Self {
            store,
            blobs,
            session,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn session(&self) -> &Arc<SessionSlot> {
        &self.session
    }

    // ----------------------
    // Generic document access
    // ----------------------

    /// `Ok(None)` when nothing is stored at `path`.
    pub async fn read_once<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let result: Result<Option<T>, StoreError> = async {
            let path = DocPath::document(path)?;
            self.get_decoded(&path).await
        }
        .await;
        logged("read", path, result)
    }

    /// Typed read of `{collection}/{id}`. `id` must be a single path segment.
    pub async fn read_by_id<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let result: Result<Option<T>, StoreError> = async {
            let path = doc_path(collection, id)?;
            self.get_decoded(&path).await
        }
        .await;
        logged("read", format!("{}/{}", collection, id), result)
    }

    async fn get_decoded<T: DeserializeOwned>(
        &self,
        path: &DocPath,
    ) -> Result<Option<T>, StoreError> {
        match self.store.get(path).await? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Live single document. A malformed revision is reported in-band so the
    /// stream keeps running.
    pub async fn watch<T>(
        &self,
        path: &str,
    ) -> Result<LiveStream<Result<Option<T>, DecodeError>>, StoreError>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let result: Result<_, StoreError> = async {
            let path = DocPath::document(path)?;
            self.store.watch_document(&path).await
        }
        .await;
        let raw = logged("watch", path, result)?;
        Ok(raw.map(|doc| match doc {
            Some(doc) => doc.decode().map(Some),
            None => Ok(None),
        }))
    }

    /// Live collection with document ids merged into `id`. Documents that fail
    /// to decode are skipped.
    pub async fn watch_collection<T>(&self, path: &str) -> Result<LiveStream<Vec<T>>, StoreError>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let result: Result<_, StoreError> = async {
            let collection = DocPath::collection(path)?;
            self.store.watch_collection(&collection).await
        }
        .await;
        let raw = logged("watch", path, result)?;
        Ok(raw.map(|docs| {
            docs.iter()
                .filter_map(|doc| match doc.decode::<T>() {
                    Ok(item) => Some(item),
                    Err(e) => {
                        log::warn!("Skipping document: {}", e);
                        None
                    }
                })
                .collect()
        }))
    }

    /// Upsert at an explicit document path.
    pub async fn create<T: Serialize>(&self, value: &T, path: &str) -> Result<(), StoreError> {
        let result: Result<(), StoreError> = async {
            let path = DocPath::document(path)?;
            self.store.set(&path, to_fields(value)?).await
        }
        .await;
        logged("write", path, result)
    }

    /// Upsert at `{collection}/{id}`. `id` must be a single path segment.
    pub async fn create_by_id<T: Serialize>(
        &self,
        value: &T,
        collection: &str,
        id: &str,
    ) -> Result<(), StoreError> {
        let result: Result<(), StoreError> = async {
            let path = doc_path(collection, id)?;
            self.store.set(&path, to_fields(value)?).await
        }
        .await;
        logged("write", format!("{}/{}", collection, id), result)
    }

    /// Writes `value` under a store-allocated id and returns that id.
    pub async fn create_with_generated_id<T: Serialize>(
        &self,
        value: &T,
        collection: &str,
    ) -> Result<String, StoreError> {
        let result: Result<String, StoreError> = async {
            let collection = DocPath::collection(collection)?;
            let id = self.store.new_document_id(&collection);
            self.store.set(&collection.child(&id)?, to_fields(value)?).await?;
            Ok(id)
        }
        .await;
        logged("write", collection, result)
    }

    pub async fn update<T: Serialize>(
        &self,
        partial: &T,
        collection: &str,
        id: &str,
    ) -> Result<(), StoreError> {
        let result: Result<(), StoreError> = async {
            let path = doc_path(collection, id)?;
            self.store.update(&path, to_fields(partial)?).await
        }
        .await;
        logged("update", format!("{}/{}", collection, id), result)
    }

    pub async fn delete_by_id(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let result: Result<(), StoreError> = async {
            let path = doc_path(collection, id)?;
            self.store.delete(&path).await
        }
        .await;
        logged("delete", format!("{}/{}", collection, id), result)
    }

    pub async fn delete_by_reference(&self, reference: &DocPath) -> Result<(), StoreError> {
        let result = self.store.delete(reference).await;
        logged("delete", reference, result)
    }

    /// UUID v4 usable as a document key before the write happens.
    pub fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Untyped read.
    pub async fn document_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Fields>, StoreError> {
        let result = async {
            let path = doc_path(collection, id)?;
            Ok::<_, StoreError>(self.store.get(&path).await?.map(|doc| doc.fields))
        }
        .await;
        logged("read", format!("{}/{}", collection, id), result)
    }

    /// Writes the user document, then seeds each fixed subcollection with one
    /// placeholder document.
    pub async fn create_user_with_subcollections<T: Serialize>(
        &self,
        user: &T,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let result = async {
            let user_path = doc_path(USERS_COLLECTION, user_id)?;
            self.store.set(&user_path, to_fields(user)?).await?;

            let seed = json!({ "initialized": true })
                .as_object()
                .cloned()
                .unwrap_or_default();
            let mut writes = Vec::with_capacity(USER_SUBCOLLECTIONS.len());
            for name in USER_SUBCOLLECTIONS {
                let sub = user_path.child(name)?;
                let doc = sub.child(&self.store.new_document_id(&sub))?;
                let seed = seed.clone();
                writes.push(async move { self.store.set(&doc, seed).await });
            }
            // Seeded in parallel
            futures::future::try_join_all(writes).await?;
            Ok::<_, StoreError>(())
        }
        .await;
        logged("create user", user_id, result)?;
        log::info!("Created user {} with {} subcollections", user_id, USER_SUBCOLLECTIONS.len());
        Ok(())
    }

    /// Id of the first document in `{path}/{subcollection}`, if any.
    pub async fn document_id_in_subcollection(
        &self,
        path: &str,
        subcollection: &str,
    ) -> Result<Option<String>, StoreError> {
        let result = async {
            let collection = DocPath::document(path)?.child(subcollection)?;
            let docs = self.store.list(&collection).await?;
            Ok::<_, StoreError>(docs.into_iter().next().map(|doc| doc.id))
        }
        .await;
        logged("list", format!("{}/{}", path, subcollection), result)
    }

    // ----------------------
    // Categories
    // ----------------------

    pub async fn create_categoria(&self, mut categoria: Categoria) -> Result<String, StoreError> {
        let id = self.generate_id();
        categoria.id.clear();
        categoria.fecha_creacion = Some(Utc::now());
        self.create_by_id(&categoria, CATEGORIAS_COLLECTION, &id)
            .await?;
        Ok(id)
    }

    pub async fn categorias(&self) -> Result<LiveStream<Vec<Categoria>>, StoreError> {
        self.watch_collection(CATEGORIAS_COLLECTION).await
    }

    pub async fn update_categoria(&self, id: &str, patch: &CategoriaPatch) -> Result<(), StoreError> {
        self.update(patch, CATEGORIAS_COLLECTION, id).await
    }

    pub async fn delete_categoria(&self, id: &str) -> Result<(), StoreError> {
        self.delete_by_id(CATEGORIAS_COLLECTION, id).await
    }

    // ----------------------
    // APKs
    // ----------------------

    pub async fn create_apk(&self, mut apk: Apk) -> Result<String, StoreError> {
        let id = self.generate_id();
        apk.id.clear();
        apk.fecha_creacion = Some(Utc::now());
        self.create_by_id(&apk, APKS_COLLECTION, &id).await?;
        Ok(id)
    }

    pub async fn apks(&self) -> Result<LiveStream<Vec<Apk>>, StoreError> {
        self.watch_collection(APKS_COLLECTION).await
    }

    pub async fn delete_apk(&self, id: &str) -> Result<(), StoreError> {
        self.delete_by_id(APKS_COLLECTION, id).await
    }

    pub async fn apk_by_id(&self, id: &str) -> Result<Option<Apk>, StoreError> {
        self.read_by_id(APKS_COLLECTION, id).await
    }

    pub async fn apk_download_url(&self, apk_path: &str) -> Result<String, StoreError> {
        let result = self.blobs.download_url(apk_path).await;
        logged("resolve", apk_path, result)
    }

    // ----------------------
    // Users
    // ----------------------

    /// Looks the user up by `dni` and checks the password against the stored
    /// hash. On success a session is started; on mismatch nothing is recorded.
    pub async fn login_user(
        &self,
        dni: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let lookup: Result<Option<UserRecord>, StoreError> = async {
            let users = DocPath::collection(USERS_COLLECTION)?;
            let matches = self
                .store
                .query_eq(&users, "dni", &Value::String(dni.to_string()))
                .await?;
            match matches.into_iter().next() {
                Some(doc) => Ok(Some(doc.decode()?)),
                None => Ok(None),
            }
        }
        .await;
        let Some(user) = logged("look up credentials in", USERS_COLLECTION, lookup)? else {
            log::info!("No user found with the given DNI");
            return Ok(None);
        };

        if !password::verify_password(password, &user.password_hash) {
            log::info!("Password mismatch for user {}", user.id);
            return Ok(None);
        }

        let session = self.session.begin(&user.id);
        log::info!(
            "User {} logged in, session valid until {}",
            user.id,
            session.expires_at
        );
        Ok(Some(user))
    }

    pub async fn user_data(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.read_by_id(USERS_COLLECTION, user_id).await
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.current()
    }

    /// The user behind the active session, if one is live.
    pub async fn current_user(&self) -> Result<Option<UserRecord>, StoreError> {
        match self.session.current() {
            Some(session) => self.user_data(&session.user_id).await,
            None => Ok(None),
        }
    }

    pub fn logout(&self) {
        if let Some(session) = self.session.current() {
            log::info!("User {} logged out", session.user_id);
        }
        self.session.end();
    }
}

/// `{collection}/{id}` with `id` confined to a single segment.
fn doc_path(collection: &str, id: &str) -> Result<DocPath, StoreError> {
    DocPath::collection(collection)?.child(id)
}

/// Logs a failed operation once, at the service boundary, and hands the
/// result back unchanged.
fn logged<T>(
    action: &str,
    target: impl std::fmt::Display,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    if let Err(ref e) = result {
        log::error!("Failed to {} {}: {}", action, target, e);
    }
    result
}
