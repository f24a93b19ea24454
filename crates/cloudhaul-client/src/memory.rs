//! In-memory [`ObjectStore`] implementation.
//!
//! Backs the test suites and serves as the reference implementation of
//! the store contract: unquoted tags, composite tags for multipart
//! completions, metadata-replacing copies, and idempotent deletes.
//!
//! Thread-safe via [`DashMap`]; objects, in-progress uploads, and part
//! bodies live in separate maps so an aborted upload never leaves
//! partial object state behind.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use cloudhaul_core::checksums;
use cloudhaul_core::{CloudHaulError, CloudHaulResult, ObjectId};
use dashmap::DashMap;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::store::{ObjectStore, ObjectSummary, PartTag, RemoteObject};

/// Composite key identifying a stored object: `(bucket, key)`.
type StoreKey = (String, String);

/// Composite key identifying an uploaded part: `(upload_id, part_number)`.
type PartKey = (String, u32);

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: Option<String>,
    headers: HashMap<String, String>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingUpload {
    bucket: String,
    key: String,
    headers: HashMap<String, String>,
}

/// In-memory object store.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use cloudhaul_client::memory::InMemoryStore;
/// use cloudhaul_client::store::ObjectStore;
/// use cloudhaul_core::ObjectId;
/// use std::collections::HashMap;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryStore::new();
/// let id = ObjectId::new("bucket", "hello.txt");
/// store
///     .put_simple(&id, HashMap::new(), Bytes::from("hello"))
///     .await
///     .unwrap();
///
/// let object = store.get_metadata(&id).await.unwrap().unwrap();
/// assert_eq!(object.size, 5);
/// # });
/// ```
#[derive(Default)]
pub struct InMemoryStore {
    objects: DashMap<StoreKey, StoredObject>,
    uploads: DashMap<String, PendingUpload>,
    parts: DashMap<PartKey, Bytes>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("objects", &self.objects.len())
            .field("uploads", &self.uploads.len())
            .field("parts", &self.parts.len())
            .finish()
    }
}

fn store_key(id: &ObjectId) -> StoreKey {
    (id.bucket.clone(), id.key.clone())
}

fn client_error(message: impl Into<String>) -> CloudHaulError {
    CloudHaulError::Remote {
        message: message.into(),
        client_fault: true,
    }
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every object, upload, and part.
    pub fn reset(&self) {
        debug!("resetting store");
        self.objects.clear();
        self.uploads.clear();
        self.parts.clear();
    }

    /// Number of stored objects, across all buckets.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Number of in-progress multipart uploads.
    #[must_use]
    pub fn pending_upload_count(&self) -> usize {
        self.uploads.len()
    }

    /// Replace the tag of a stored object.
    ///
    /// Test support: lets integrity checks observe a store whose
    /// advertised checksum disagrees with the stored bytes.
    pub fn set_etag(&self, id: &ObjectId, etag: impl Into<String>) {
        if let Some(mut object) = self.objects.get_mut(&store_key(id)) {
            object.etag = Some(etag.into());
        }
    }

    /// Drop the tag of a stored object, as stores without checksum
    /// support present themselves.
    pub fn clear_etag(&self, id: &ObjectId) {
        if let Some(mut object) = self.objects.get_mut(&store_key(id)) {
            object.etag = None;
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get_metadata(&self, id: &ObjectId) -> CloudHaulResult<Option<RemoteObject>> {
        Ok(self.objects.get(&store_key(id)).map(|object| RemoteObject {
            size: object.data.len() as u64,
            etag: object.etag.clone(),
            headers: object.headers.clone(),
        }))
    }

    async fn get_range(&self, id: &ObjectId, start: u64, end: u64) -> CloudHaulResult<Bytes> {
        let object = self
            .objects
            .get(&store_key(id))
            .ok_or_else(|| client_error(format!("no such object: {id}")))?;

        let total = object.data.len() as u64;
        if start > end || end >= total {
            return Err(client_error(format!(
                "invalid range {start}..={end} for object of {total} bytes"
            )));
        }
        let start = usize::try_from(start).map_err(|_| client_error("range beyond addressable size"))?;
        let end = usize::try_from(end).map_err(|_| client_error("range beyond addressable size"))?;
        Ok(object.data.slice(start..=end))
    }

    async fn put_simple(
        &self,
        id: &ObjectId,
        headers: HashMap<String, String>,
        data: Bytes,
    ) -> CloudHaulResult<String> {
        let etag = checksums::md5_hex(&data);
        trace!(object = %id, size = data.len(), "stored object");
        self.objects.insert(
            store_key(id),
            StoredObject {
                data,
                etag: Some(etag.clone()),
                headers,
                last_modified: Utc::now(),
            },
        );
        Ok(etag)
    }

    async fn initiate_multipart(
        &self,
        id: &ObjectId,
        headers: HashMap<String, String>,
    ) -> CloudHaulResult<String> {
        let upload_id = Uuid::new_v4().to_string();
        trace!(object = %id, upload_id = %upload_id, "initiated multipart upload");
        self.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: id.bucket.clone(),
                key: id.key.clone(),
                headers,
            },
        );
        Ok(upload_id)
    }

    async fn put_part(
        &self,
        id: &ObjectId,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> CloudHaulResult<String> {
        if !self.uploads.contains_key(upload_id) {
            return Err(client_error(format!("no such upload: {upload_id}")));
        }
        let etag = checksums::md5_hex(&data);
        trace!(object = %id, upload_id = %upload_id, part_number, size = data.len(), "stored part");
        self.parts.insert((upload_id.to_owned(), part_number), data);
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        id: &ObjectId,
        upload_id: &str,
        parts: &[PartTag],
    ) -> CloudHaulResult<String> {
        let pending = self
            .uploads
            .get(upload_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| client_error(format!("no such upload: {upload_id}")))?;
        if parts.is_empty() {
            return Err(client_error("multipart completion with no parts"));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(client_error("part numbers must be ascending"));
        }

        let mut combined = BytesMut::new();
        let mut digests = Vec::with_capacity(parts.len());
        for tag in parts {
            let data = self
                .parts
                .get(&(upload_id.to_owned(), tag.part_number))
                .map(|entry| entry.clone())
                .ok_or_else(|| {
                    client_error(format!("upload {upload_id} has no part {}", tag.part_number))
                })?;
            let digest = checksums::md5_digest(&data);
            if checksums::single_tag(&digest) != tag.etag {
                return Err(client_error(format!(
                    "tag mismatch for part {} of upload {upload_id}",
                    tag.part_number
                )));
            }
            digests.push(digest);
            combined.extend_from_slice(&data);
        }

        let etag = checksums::composite_tag(&digests);
        let data = combined.freeze();
        debug!(
            object = %id,
            upload_id = %upload_id,
            parts = parts.len(),
            size = data.len(),
            "completed multipart upload"
        );
        self.objects.insert(
            (pending.bucket, pending.key),
            StoredObject {
                data,
                etag: Some(etag.clone()),
                headers: pending.headers,
                last_modified: Utc::now(),
            },
        );
        self.uploads.remove(upload_id);
        self.parts.retain(|(uid, _), _| uid != upload_id);
        Ok(etag)
    }

    async fn abort_multipart(&self, id: &ObjectId, upload_id: &str) -> CloudHaulResult<()> {
        if self.uploads.remove(upload_id).is_some() {
            trace!(object = %id, upload_id = %upload_id, "aborted multipart upload");
        }
        self.parts.retain(|(uid, _), _| uid != upload_id);
        Ok(())
    }

    async fn copy_object(
        &self,
        src: &ObjectId,
        dst: &ObjectId,
        replace_headers: Option<HashMap<String, String>>,
    ) -> CloudHaulResult<String> {
        let source = self
            .objects
            .get(&store_key(src))
            .map(|entry| entry.clone())
            .ok_or_else(|| client_error(format!("copy source not found: {src}")))?;

        debug!(source = %src, destination = %dst, size = source.data.len(), "copying object");
        // The bytes are unchanged, so the tag carries over even when the
        // user metadata is replaced.
        let etag = source.etag.clone().unwrap_or_default();
        self.objects.insert(
            store_key(dst),
            StoredObject {
                data: source.data,
                etag: source.etag,
                headers: replace_headers.unwrap_or(source.headers),
                last_modified: Utc::now(),
            },
        );
        Ok(etag)
    }

    async fn delete_object(&self, id: &ObjectId) -> CloudHaulResult<()> {
        if self.objects.remove(&store_key(id)).is_some() {
            trace!(object = %id, "deleted object");
        }
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> CloudHaulResult<Vec<ObjectSummary>> {
        let mut summaries: Vec<ObjectSummary> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket && entry.key().1.starts_with(prefix))
            .map(|entry| ObjectSummary {
                bucket: entry.key().0.clone(),
                key: entry.key().1.clone(),
                size: entry.value().data.len() as u64,
                last_modified: entry.value().last_modified,
            })
            .collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(summaries)
    }
}
