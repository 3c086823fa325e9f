//! In-process object store.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{ObjectLocation, ObjectStore, PutObject, PutReceipt, StoreError, StoredObjectMeta};

/// A stored object: body plus the metadata a HEAD would return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryObject {
    pub body: Vec<u8>,
    pub meta: StoredObjectMeta,
}

/// A canned provider failure.
#[derive(Debug, Clone)]
struct Injected {
    status: u16,
    code: String,
    message: String,
}

impl Injected {
    fn to_error(&self, location: &ObjectLocation) -> StoreError {
        StoreError::Provider {
            location: location.clone(),
            status: Some(self.status),
            code: Some(self.code.clone()),
            message: self.message.clone(),
        }
    }
}

/// [`ObjectStore`] keeping objects in a map.
///
/// Failures can be injected per operation to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<ObjectLocation, MemoryObject>>,
    head_failure: RwLock<Option<Injected>>,
    put_failure: RwLock<Option<Injected>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object with an explicit ETag (quotes included, as S3 sends it).
    pub async fn insert(
        &self,
        location: ObjectLocation,
        body: impl Into<Vec<u8>>,
        etag: impl Into<String>,
        metadata: HashMap<String, String>,
    ) {
        let body = body.into();
        let meta = StoredObjectMeta {
            etag: etag.into(),
            metadata,
            content_length: Some(body.len() as i64),
            content_type: None,
        };
        self.objects
            .write()
            .await
            .insert(location, MemoryObject { body, meta });
    }

    pub async fn get(&self, location: &ObjectLocation) -> Option<MemoryObject> {
        self.objects.read().await.get(location).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Make every subsequent HEAD fail with the given provider error.
    pub async fn fail_heads_with(&self, status: u16, code: &str, message: &str) {
        *self.head_failure.write().await = Some(Injected {
            status,
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    /// Make every subsequent PUT fail with the given provider error.
    pub async fn fail_puts_with(&self, status: u16, code: &str, message: &str) {
        *self.put_failure.write().await = Some(Injected {
            status,
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    fn not_found(location: &ObjectLocation) -> StoreError {
        StoreError::NotFound {
            location: location.clone(),
            status: Some(404),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, location: &ObjectLocation) -> Result<StoredObjectMeta, StoreError> {
        if let Some(failure) = self.head_failure.read().await.as_ref() {
            return Err(failure.to_error(location));
        }
        self.objects
            .read()
            .await
            .get(location)
            .map(|o| o.meta.clone())
            .ok_or_else(|| Self::not_found(location))
    }

    async fn fetch_to_file(&self, location: &ObjectLocation, dest: &Path) -> Result<u64, StoreError> {
        let body = self
            .objects
            .read()
            .await
            .get(location)
            .map(|o| o.body.clone())
            .ok_or_else(|| Self::not_found(location))?;

        tokio::fs::write(dest, &body)
            .await
            .map_err(|source| StoreError::Io {
                location: location.clone(),
                source,
            })?;
        Ok(body.len() as u64)
    }

    async fn put(&self, object: PutObject) -> Result<PutReceipt, StoreError> {
        if let Some(failure) = self.put_failure.read().await.as_ref() {
            return Err(failure.to_error(&object.location));
        }

        let mut hasher = DefaultHasher::new();
        object.body.hash(&mut hasher);
        let etag = format!("\"{:016x}\"", hasher.finish());

        let meta = StoredObjectMeta {
            etag: etag.clone(),
            metadata: object.metadata,
            content_length: Some(object.body.len() as i64),
            content_type: object.content_type,
        };
        self.objects.write().await.insert(
            object.location,
            MemoryObject {
                body: object.body,
                meta,
            },
        );

        Ok(PutReceipt {
            etag: Some(etag),
            version_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(key: &str) -> ObjectLocation {
        ObjectLocation::new("bucket", key)
    }

    #[tokio::test]
    async fn head_missing_object_is_not_found() {
        let store = MemoryObjectStore::new();
        let err = store.head(&loc("nope.txt")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn fetch_writes_body_to_file() {
        let store = MemoryObjectStore::new();
        store
            .insert(loc("a.txt"), b"hello".to_vec(), "\"e1\"", HashMap::new())
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.txt");
        let n = store.fetch_to_file(&loc("a.txt"), &dest).await.unwrap();

        assert_eq!(n, 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn put_overwrites_and_reports_etag() {
        let store = MemoryObjectStore::new();
        store
            .insert(loc("a.pdf"), b"old".to_vec(), "\"old\"", HashMap::new())
            .await;

        let mut metadata = HashMap::new();
        metadata.insert("name".to_string(), "a.pdf".to_string());
        let receipt = store
            .put(PutObject {
                location: loc("a.pdf"),
                body: b"new".to_vec(),
                metadata: metadata.clone(),
                content_type: None,
            })
            .await
            .unwrap();

        let stored = store.get(&loc("a.pdf")).await.unwrap();
        assert_eq!(stored.body, b"new");
        assert_eq!(stored.meta.metadata, metadata);
        assert_eq!(receipt.etag.as_deref(), Some(stored.meta.etag.as_str()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn injected_failures_carry_provider_details() {
        let store = MemoryObjectStore::new();
        store.fail_heads_with(403, "AccessDenied", "Access Denied").await;
        store.fail_puts_with(500, "InternalError", "boom").await;

        let head = store.head(&loc("x")).await.unwrap_err();
        assert_eq!(head.status(), Some(403));
        assert_eq!(head.provider_code(), Some("AccessDenied"));

        let put = store
            .put(PutObject {
                location: loc("y"),
                body: Vec::new(),
                metadata: HashMap::new(),
                content_type: None,
            })
            .await
            .unwrap_err();
        assert_eq!(put.provider_message(), Some("boom"));
        assert!(store.is_empty().await);
    }
}
