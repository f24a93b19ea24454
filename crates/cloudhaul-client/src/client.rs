//! Client facade.
//!
//! [`CloudHaulClient`] ties a storage backend, an optional key provider,
//! and the retry and fault-injection machinery together behind one
//! object-level API. All operations are asynchronous and safe to issue
//! concurrently from multiple tasks; two semaphores bound the number of
//! in-flight remote calls and part-transfer tasks.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use cloudhaul_client::{CloudHaulClient, InMemoryStore};
//! use cloudhaul_core::{ClientConfig, ObjectId};
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(InMemoryStore::new());
//! let client = CloudHaulClient::new(store, None, ClientConfig::default());
//!
//! assert!(!client.exists(&ObjectId::new("bucket", "key")).await.unwrap());
//! # });
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use cloudhaul_core::{ClientConfig, CloudHaulError, CloudHaulResult, KeyProvider, ObjectId};
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use typed_builder::TypedBuilder;

use crate::inject::{FaultInjector, NoFaults};
use crate::ops;
use crate::progress::ProgressListener;
use crate::retry::{Retrier, RetryListener};
use crate::store::{ObjectStore, ObjectSummary};

// ---------------------------------------------------------------------------
// Request options
// ---------------------------------------------------------------------------

/// Options for one upload. Build with [`UploadRequest::builder`].
#[derive(TypedBuilder)]
pub struct UploadRequest {
    /// Local file to upload.
    #[builder(setter(into))]
    pub source: PathBuf,

    /// Destination object.
    pub destination: ObjectId,

    /// Name of the key pair to envelope-encrypt with. `None` uploads
    /// plaintext.
    #[builder(default, setter(strip_option, into))]
    pub encrypt_key: Option<String>,

    /// Chunk size override for this upload. `None` falls back to the
    /// client configuration.
    #[builder(default, setter(strip_option))]
    pub chunk_size: Option<u64>,

    /// Progress observer, called as parts complete.
    #[builder(default, setter(strip_option))]
    pub progress: Option<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("encrypt_key", &self.encrypt_key)
            .field("chunk_size", &self.chunk_size)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Options for one download. Build with [`DownloadRequest::builder`].
#[derive(TypedBuilder)]
pub struct DownloadRequest {
    /// Object to download.
    pub source: ObjectId,

    /// Local destination path.
    #[builder(setter(into))]
    pub destination: PathBuf,

    /// Replace an existing local file instead of failing.
    #[builder(default = false)]
    pub overwrite: bool,

    /// Progress observer, called as parts complete.
    #[builder(default, setter(strip_option))]
    pub progress: Option<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for DownloadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("overwrite", &self.overwrite)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// CloudHaulClient
// ---------------------------------------------------------------------------

/// Object-transfer client over an [`ObjectStore`] backend.
pub struct CloudHaulClient {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) keys: Option<Arc<dyn KeyProvider>>,
    pub(crate) config: ClientConfig,
    pub(crate) injector: Arc<dyn FaultInjector>,
    listeners: RwLock<Vec<Arc<dyn RetryListener>>>,
    pub(crate) api_permits: Arc<Semaphore>,
    pub(crate) part_permits: Arc<Semaphore>,
}

impl std::fmt::Debug for CloudHaulClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudHaulClient")
            .field("config", &self.config)
            .field("has_key_provider", &self.keys.is_some())
            .field("retry_listeners", &self.listeners.read().len())
            .finish()
    }
}

impl CloudHaulClient {
    /// Create a client over `store`.
    ///
    /// `keys` is required only for operations touching encrypted objects;
    /// plaintext transfers work without one.
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        keys: Option<Arc<dyn KeyProvider>>,
        config: ClientConfig,
    ) -> Self {
        let api_permits = Arc::new(Semaphore::new(config.api_concurrency.max(1)));
        let part_permits = Arc::new(Semaphore::new(config.internal_concurrency.max(1)));
        Self {
            store,
            keys,
            config,
            injector: Arc::new(NoFaults),
            listeners: RwLock::new(Vec::new()),
            api_permits,
            part_permits,
        }
    }

    /// Replace the fault injector. Tests install an
    /// [`AbortInjector`](crate::inject::AbortInjector) here.
    #[must_use]
    pub fn with_injector(mut self, injector: Arc<dyn FaultInjector>) -> Self {
        self.injector = injector;
        self
    }

    /// Register an observer notified on every retry.
    pub fn add_retry_listener(&self, listener: Arc<dyn RetryListener>) {
        self.listeners.write().push(listener);
    }

    /// Snapshot the retry policy and current listeners.
    pub(crate) fn retrier(&self) -> Retrier {
        Retrier::new(&self.config, self.listeners.read().clone())
    }

    /// Run one remote-store call under an API-pool permit.
    pub(crate) async fn api_call<T>(
        &self,
        operation: impl Future<Output = CloudHaulResult<T>>,
    ) -> CloudHaulResult<T> {
        let _permit = self
            .api_permits
            .acquire()
            .await
            .map_err(|e| CloudHaulError::Internal(anyhow::anyhow!("api pool closed: {e}")))?;
        operation.await
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Upload a local file, returning the remote object tag.
    ///
    /// The file is split into chunks uploaded in parallel; with
    /// `encrypt_key` set each chunk is AES-256-CBC encrypted under a fresh
    /// session key wrapped for the named key pair. Every part tag returned
    /// by the store is checked against the locally computed digest.
    pub async fn upload(&self, request: UploadRequest) -> CloudHaulResult<String> {
        ops::upload::run(self, request).await
    }

    /// Download an object to a local file.
    ///
    /// Parts download in parallel into the destination file; encrypted
    /// objects are decrypted with the session key recovered through the
    /// key provider. The remote tag is validated against the downloaded
    /// bytes where the tag form allows it. On any failure the partial
    /// local file is removed.
    pub async fn download(&self, request: DownloadRequest) -> CloudHaulResult<()> {
        ops::download::run(self, request).await
    }

    // -----------------------------------------------------------------------
    // Object management
    // -----------------------------------------------------------------------

    /// Whether an object exists at `id`.
    pub async fn exists(&self, id: &ObjectId) -> CloudHaulResult<bool> {
        Ok(ops::stat(self, id).await?.is_some())
    }

    /// Server-side copy of `src` to `dst`. The destination is overwritten
    /// if present.
    pub async fn copy(&self, src: &ObjectId, dst: &ObjectId) -> CloudHaulResult<()> {
        ops::copy::run(self, src, dst).await
    }

    /// Delete the object at `id`. Fails if it does not exist.
    pub async fn delete(&self, id: &ObjectId) -> CloudHaulResult<()> {
        ops::delete::run(self, id).await
    }

    /// Move `src` to `dst` as copy-then-delete.
    ///
    /// Fails without touching anything when the source is missing or the
    /// destination already exists. If the source delete fails after the
    /// copy, the destination copy is removed before the failure is
    /// reported, so a failed rename leaves both sides as they were.
    pub async fn rename(&self, src: &ObjectId, dst: &ObjectId) -> CloudHaulResult<()> {
        ops::rename::run(self, src, dst).await
    }

    /// List objects under `prefix`, in key order.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> CloudHaulResult<Vec<ObjectSummary>> {
        ops::list(self, bucket, prefix).await
    }

    /// Delete every object under the prefix of `id`, returning the
    /// deleted ids. Keys ending in `/` (folder markers) are skipped.
    pub async fn delete_dir(&self, id: &ObjectId) -> CloudHaulResult<Vec<ObjectId>> {
        ops::dir::delete_dir(self, id).await
    }

    /// Rename every object under the prefix of `src` to the same suffix
    /// under `dst`, returning the new ids.
    ///
    /// Objects are renamed one at a time and the operation stops at the
    /// first failure, so an aborted rename never leaves an object present
    /// on both sides.
    pub async fn rename_directory(
        &self,
        src: &ObjectId,
        dst: &ObjectId,
    ) -> CloudHaulResult<Vec<ObjectId>> {
        ops::dir::rename_directory(self, src, dst).await
    }

    // -----------------------------------------------------------------------
    // Encryption key management
    // -----------------------------------------------------------------------

    /// Wrap the object's session key for one more key pair.
    pub async fn add_encryption_key(&self, id: &ObjectId, key_name: &str) -> CloudHaulResult<()> {
        ops::keys::add(self, id, key_name).await
    }

    /// Drop one key pair's wrapped copy of the object's session key.
    pub async fn remove_encryption_key(
        &self,
        id: &ObjectId,
        key_name: &str,
    ) -> CloudHaulResult<()> {
        ops::keys::remove(self, id, key_name).await
    }
}
