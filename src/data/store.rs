//! Object storage
//!
//! [`ObjectStore`] is the storage collaborator of the read pipeline.
//! [`MemoryStore`] is a volatile implementation that applies the audience
//! checks a real database would: anonymous readers only see publicly
//! addressed objects, verified readers additionally see objects addressed to
//! or authored by them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::async_trait;
use tokio::sync::RwLock;
use url::Url;

use super::object::{ApObject, FederatedObject};
use crate::error::AppError;

/// The special collection addressing everyone.
pub const PUBLIC_COLLECTION: &str = "https://www.w3.org/ns/activitystreams#Public";

const ADDRESSING_FIELDS: [&str; 5] = ["to", "cc", "bto", "bcc", "audience"];
const AUTHORSHIP_FIELDS: [&str; 2] = ["attributedTo", "actor"];

/// Storage capabilities needed to serve a federated read.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether `iri` is hosted by this server.
    async fn owns(&self, iri: &Url) -> Result<bool, AppError>;

    /// Fetch for an unauthenticated reader.
    async fn fetch_public(&self, iri: &Url) -> Result<Box<dyn FederatedObject>, AppError>;

    /// Fetch on behalf of a verified remote user.
    async fn fetch_as(&self, iri: &Url, user: &Url)
    -> Result<Box<dyn FederatedObject>, AppError>;
}

/// In-memory object store
pub struct MemoryStore {
    /// Object id -> document
    objects: Arc<RwLock<HashMap<String, ApObject>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load a JSON array of ActivityStreams documents.
    pub async fn from_seed_file(path: &Path) -> Result<Self, AppError> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            AppError::Config(format!("Failed to read seed file {}: {}", path.display(), e))
        })?;
        let documents: Vec<serde_json::Value> = serde_json::from_slice(&raw)
            .map_err(|e| AppError::Config(format!("Invalid seed file {}: {}", path.display(), e)))?;

        let store = Self::new();
        for document in documents {
            store.insert(ApObject::from_value(document)?).await;
        }

        tracing::info!(
            path = %path.display(),
            objects = store.len().await,
            "Object store seeded"
        );
        Ok(store)
    }

    /// Insert or replace an object, keyed by its id.
    pub async fn insert(&self, object: ApObject) {
        let mut objects = self.objects.write().await;
        objects.insert(object.id().to_string(), object);
    }

    pub async fn remove(&self, iri: &str) -> Option<ApObject> {
        let mut objects = self.objects.write().await;
        objects.remove(iri)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn lookup(&self, iri: &Url) -> Result<ApObject, AppError> {
        let objects = self.objects.read().await;
        objects.get(iri.as_str()).cloned().ok_or(AppError::NotFound)
    }
}

/// Whether anyone may read the object.
///
/// Objects that carry no addressing at all (actors, collections,
/// tombstones) are public.
pub fn is_publicly_addressed(object: &ApObject) -> bool {
    let mut addressed = false;
    for field in ADDRESSING_FIELDS {
        for iri in object.addressees(field) {
            addressed = true;
            if matches!(iri, PUBLIC_COLLECTION | "as:Public" | "Public") {
                return true;
            }
        }
    }
    !addressed
}

/// Whether `user` is an addressee or the author of the object.
pub fn is_visible_to(object: &ApObject, user: &Url) -> bool {
    let user = user.as_str();
    if object.id() == user {
        return true;
    }
    ADDRESSING_FIELDS
        .iter()
        .chain(AUTHORSHIP_FIELDS.iter())
        .any(|field| object.addressees(field).contains(&user))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn owns(&self, iri: &Url) -> Result<bool, AppError> {
        Ok(self.objects.read().await.contains_key(iri.as_str()))
    }

    async fn fetch_public(&self, iri: &Url) -> Result<Box<dyn FederatedObject>, AppError> {
        let object = self.lookup(iri).await?;
        if !is_publicly_addressed(&object) {
            // Hide existence from anonymous readers.
            return Err(AppError::NotFound);
        }
        Ok(Box::new(object))
    }

    async fn fetch_as(
        &self,
        iri: &Url,
        user: &Url,
    ) -> Result<Box<dyn FederatedObject>, AppError> {
        let object = self.lookup(iri).await?;
        if !is_publicly_addressed(&object) && !is_visible_to(&object, user) {
            tracing::debug!(object = %iri, user = %user, "Object not addressed to reader");
            return Err(AppError::Forbidden);
        }
        Ok(Box::new(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    async fn store_with(documents: Vec<serde_json::Value>) -> MemoryStore {
        let store = MemoryStore::new();
        for document in documents {
            store.insert(ApObject::from_value(document).unwrap()).await;
        }
        store
    }

    fn followers_only_note() -> serde_json::Value {
        json!({
            "id": "https://local.example/notes/private",
            "type": "Note",
            "attributedTo": "https://local.example/users/admin",
            "to": ["https://local.example/users/admin/followers"],
            "cc": ["https://remote.example/users/alice"]
        })
    }

    #[tokio::test]
    async fn owns_only_stored_objects() {
        let store = store_with(vec![followers_only_note()]).await;
        assert!(
            store
                .owns(&url("https://local.example/notes/private"))
                .await
                .unwrap()
        );
        assert!(
            !store
                .owns(&url("https://local.example/notes/missing"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn anonymous_fetch_hides_non_public_objects() {
        let store = store_with(vec![followers_only_note()]).await;
        let result = store
            .fetch_public(&url("https://local.example/notes/private"))
            .await;
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn verified_fetch_allows_addressees() {
        let store = store_with(vec![followers_only_note()]).await;
        let object = store
            .fetch_as(
                &url("https://local.example/notes/private"),
                &url("https://remote.example/users/alice"),
            )
            .await
            .expect("alice is addressed");
        assert_eq!(
            object.serialize().unwrap()["id"],
            "https://local.example/notes/private"
        );
    }

    #[tokio::test]
    async fn verified_fetch_rejects_strangers() {
        let store = store_with(vec![followers_only_note()]).await;
        let result = store
            .fetch_as(
                &url("https://local.example/notes/private"),
                &url("https://remote.example/users/mallory"),
            )
            .await;
        assert!(matches!(result, Err(AppError::Forbidden)));
    }

    #[test]
    fn unaddressed_objects_are_public() {
        let actor = ApObject::from_value(json!({
            "id": "https://local.example/users/admin",
            "type": "Person"
        }))
        .unwrap();
        assert!(is_publicly_addressed(&actor));

        let compact = ApObject::from_value(json!({
            "id": "https://local.example/notes/1",
            "type": "Note",
            "to": "as:Public"
        }))
        .unwrap();
        assert!(is_publicly_addressed(&compact));
    }

    #[tokio::test]
    async fn seed_file_loads_documents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&json!([followers_only_note()])).unwrap(),
        )
        .unwrap();

        let store = MemoryStore::from_seed_file(&path).await.unwrap();
        assert_eq!(store.len().await, 1);
    }
}
