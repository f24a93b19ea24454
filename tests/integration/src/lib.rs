//! End-to-end tests for the CloudHaul transfer client.
//!
//! The suites drive the full client pipeline (chunk planning, envelope
//! encryption, retries, fault injection, checksum reconciliation)
//! in-process against [`InMemoryStore`], so `cargo test` needs no
//! external object store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use bytes::Bytes;
use cloudhaul_client::store::ObjectStore;
use cloudhaul_client::{
    AbortInjector, CloudHaulClient, DownloadRequest, InMemoryStore, ProgressEvent,
    ProgressListener, RetryListener, UploadRequest,
};
use cloudhaul_core::{ClientConfig, CloudHaulError, MemoryKeyProvider, ObjectId};
use parking_lot::Mutex;
use rand::RngExt;
use rand_core::OsRng;
use rsa::RsaPrivateKey;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// RSA size for test key pairs; small keys keep key generation fast.
const TEST_KEY_BITS: usize = 1024;

/// A client wired to fresh in-memory fixtures, plus handles to them.
#[derive(Debug)]
pub struct TestRig {
    /// The client under test.
    pub client: CloudHaulClient,
    /// The store behind the client, for seeding and inspection.
    pub store: Arc<InMemoryStore>,
    /// The key provider behind the client.
    pub keys: Arc<MemoryKeyProvider>,
    /// The fault injector installed on the client.
    pub injector: Arc<AbortInjector>,
}

fn test_config(retry_count: usize) -> ClientConfig {
    ClientConfig {
        retry_count,
        retry_initial_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..ClientConfig::default()
    }
}

/// Build a rig with retries disabled, so injected faults surface
/// immediately.
#[must_use]
pub fn rig() -> TestRig {
    rig_with_retries(0)
}

/// Build a rig with the given retry budget and fast backoff.
#[must_use]
pub fn rig_with_retries(retry_count: usize) -> TestRig {
    init_tracing();

    let store = Arc::new(InMemoryStore::new());
    let keys = Arc::new(MemoryKeyProvider::new());
    let injector = Arc::new(AbortInjector::new());
    let client = CloudHaulClient::new(
        store.clone(),
        Some(keys.clone()),
        test_config(retry_count),
    )
    .with_injector(injector.clone());

    TestRig {
        client,
        store,
        keys,
        injector,
    }
}

/// Build a client over `store` with no key provider attached.
#[must_use]
pub fn client_without_keys(store: Arc<InMemoryStore>) -> CloudHaulClient {
    init_tracing();
    CloudHaulClient::new(store, None, test_config(0))
}

/// Generate an RSA pair without registering it anywhere.
#[must_use]
pub fn generate_keypair() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut OsRng, TEST_KEY_BITS)
        .unwrap_or_else(|e| panic!("failed to generate test key: {e}"))
}

/// Generate an RSA pair and register it with the rig's provider.
pub fn register_key(rig: &TestRig, name: &str) {
    rig.keys.register(name, generate_keypair());
}

/// Generate a unique object id for a test, under the given key prefix.
#[must_use]
pub fn test_object_id(prefix: &str) -> ObjectId {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    ObjectId::new("cloudhaul-test", format!("{prefix}/{id}"))
}

/// Random payload of `len` bytes.
#[must_use]
pub fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    let mut data = vec![0_u8; len];
    rng.fill(data.as_mut_slice());
    data
}

/// Write `data` to a fresh file in a new temp directory. Returns the
/// directory guard (dropping it removes the file) and the file's path.
pub async fn temp_source(data: &[u8]) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create temp dir: {e}"));
    let path = dir.path().join("source.bin");
    tokio::fs::write(&path, data)
        .await
        .unwrap_or_else(|e| panic!("failed to write source file: {e}"));
    (dir, path)
}

/// Upload `data` to `id` with the given transfer options, returning the
/// object tag reported by the store.
pub async fn upload_bytes(
    rig: &TestRig,
    id: &ObjectId,
    data: &[u8],
    chunk_size: Option<u64>,
    encrypt_key: Option<&str>,
) -> String {
    let (_dir, path) = temp_source(data).await;
    let request = UploadRequest {
        source: path,
        destination: id.clone(),
        encrypt_key: encrypt_key.map(ToOwned::to_owned),
        chunk_size,
        progress: None,
    };
    rig.client
        .upload(request)
        .await
        .unwrap_or_else(|e| panic!("upload of {id} failed: {e}"))
}

/// Download `id` to a fresh local path and return the file's bytes.
pub async fn download_bytes(rig: &TestRig, id: &ObjectId) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create temp dir: {e}"));
    let path = dir.path().join("downloaded.bin");
    let request = DownloadRequest {
        source: id.clone(),
        destination: path.clone(),
        overwrite: false,
        progress: None,
    };
    rig.client
        .download(request)
        .await
        .unwrap_or_else(|e| panic!("download of {id} failed: {e}"));
    tokio::fs::read(&path)
        .await
        .unwrap_or_else(|e| panic!("failed to read downloaded file: {e}"))
}

/// Download `id` expecting failure, and return the error.
pub async fn download_err(rig: &TestRig, id: &ObjectId) -> CloudHaulError {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("failed to create temp dir: {e}"));
    let request = DownloadRequest {
        source: id.clone(),
        destination: dir.path().join("out.bin"),
        overwrite: false,
        progress: None,
    };
    match rig.client.download(request).await {
        Ok(()) => panic!("download of {id} unexpectedly succeeded"),
        Err(error) => error,
    }
}

/// Store `data` at `id` directly, bypassing the client. The object looks
/// like one written by another tool: no transfer headers.
pub async fn seed_foreign(rig: &TestRig, id: &ObjectId, data: &[u8]) -> String {
    rig.store
        .put_simple(id, HashMap::new(), Bytes::from(data.to_vec()))
        .await
        .unwrap_or_else(|e| panic!("failed to seed {id}: {e}"))
}

/// Retry listener that records every notification.
#[derive(Debug, Default)]
pub struct RetryLog {
    events: Mutex<Vec<(String, usize)>>,
}

impl RetryLog {
    /// Number of retries observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether no retry was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// The recorded `(url, attempt)` pairs.
    #[must_use]
    pub fn events(&self) -> Vec<(String, usize)> {
        self.events.lock().clone()
    }
}

impl RetryListener for RetryLog {
    fn on_retry(&self, url: &str, attempt: usize, _error: &CloudHaulError) {
        self.events.lock().push((url.to_owned(), attempt));
    }
}

/// Progress listener that records every event.
#[derive(Debug, Default)]
pub struct ProgressLog {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressLog {
    /// The recorded events, in callback order.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }
}

impl ProgressListener for ProgressLog {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().push(event.clone());
    }
}

mod test_checksum;
mod test_keys;
mod test_rename;
