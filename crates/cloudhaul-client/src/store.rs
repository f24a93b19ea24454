//! Remote object store interface.
//!
//! [`ObjectStore`] is the seam between the transfer logic and a concrete
//! storage backend. It exposes the small set of primitives the client
//! needs: metadata lookup, ranged reads, multipart writes, server-side
//! copy, delete, and flat prefix listing.
//!
//! The trait uses `#[async_trait]` so stores can be held behind
//! `Arc<dyn ObjectStore>` and shared across transfer tasks.
//!
//! Conventions at this boundary:
//!
//! - Object tags (ETags) are passed around *unquoted*; adapters strip the
//!   surrounding double quotes their wire protocol may add.
//! - Part numbers are 1-based, as on the S3 wire.
//! - `get_metadata` distinguishes "no such object" (`Ok(None)`) from a
//!   request failure (`Err`); existence checks rely on that.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloudhaul_core::{CloudHaulResult, ObjectId};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Description of a stored object, as returned by [`ObjectStore::get_metadata`].
#[derive(Debug, Clone)]
pub struct RemoteObject {
    /// Stored length in bytes (ciphertext length for encrypted objects).
    pub size: u64,
    /// Unquoted object tag, when the store provides one.
    pub etag: Option<String>,
    /// Raw user metadata headers.
    pub headers: HashMap<String, String>,
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Bucket holding the object.
    pub bucket: String,
    /// Full object key.
    pub key: String,
    /// Stored length in bytes.
    pub size: u64,
    /// Last modification time recorded by the store.
    pub last_modified: DateTime<Utc>,
}

impl ObjectSummary {
    /// The object's identifier.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        ObjectId::new(&self.bucket, &self.key)
    }
}

/// Tag of one uploaded part, passed back when completing a multipart
/// upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartTag {
    /// 1-based part number.
    pub part_number: u32,
    /// Unquoted tag returned by the store for this part.
    pub etag: String,
}

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// Storage backend primitives used by the transfer client.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Look up an object's size, tag, and user metadata.
    ///
    /// Returns `Ok(None)` when no object exists at `id`.
    async fn get_metadata(&self, id: &ObjectId) -> CloudHaulResult<Option<RemoteObject>>;

    /// Read the stored bytes `start..=end` (inclusive, as in an HTTP
    /// `Range` header).
    async fn get_range(&self, id: &ObjectId, start: u64, end: u64) -> CloudHaulResult<Bytes>;

    /// Write a whole object in one call, returning its unquoted tag.
    async fn put_simple(
        &self,
        id: &ObjectId,
        headers: HashMap<String, String>,
        data: Bytes,
    ) -> CloudHaulResult<String>;

    /// Start a multipart upload, returning the upload id.
    ///
    /// `headers` become the object's user metadata once the upload
    /// completes.
    async fn initiate_multipart(
        &self,
        id: &ObjectId,
        headers: HashMap<String, String>,
    ) -> CloudHaulResult<String>;

    /// Write one part of a multipart upload, returning its unquoted tag.
    async fn put_part(
        &self,
        id: &ObjectId,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> CloudHaulResult<String>;

    /// Assemble the listed parts into the final object, returning its
    /// unquoted (composite) tag.
    async fn complete_multipart(
        &self,
        id: &ObjectId,
        upload_id: &str,
        parts: &[PartTag],
    ) -> CloudHaulResult<String>;

    /// Discard an in-progress multipart upload and its parts.
    async fn abort_multipart(&self, id: &ObjectId, upload_id: &str) -> CloudHaulResult<()>;

    /// Server-side copy of `src` to `dst`, returning the destination's
    /// unquoted tag.
    ///
    /// With `replace_headers` set, the destination gets the given user
    /// metadata instead of a copy of the source's. Copying an object onto
    /// its own key with replacement headers rewrites metadata in place.
    async fn copy_object(
        &self,
        src: &ObjectId,
        dst: &ObjectId,
        replace_headers: Option<HashMap<String, String>>,
    ) -> CloudHaulResult<String>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete_object(&self, id: &ObjectId) -> CloudHaulResult<()>;

    /// List objects in `bucket` whose keys start with `prefix`, in key
    /// order.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> CloudHaulResult<Vec<ObjectSummary>>;
}
