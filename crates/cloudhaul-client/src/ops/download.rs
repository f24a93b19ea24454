//! Multipart download with decryption and integrity validation.
//!
//! A download stats the object, interprets its metadata (format version,
//! geometry, envelope keys), then fans one task per part out to read a
//! stored byte range, decrypt it when a session key was recovered, and
//! write it at its plaintext offset in the destination file. After all
//! parts land, the remote tag is validated against the part digests.
//! Any failure after the local file has been created removes it again.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use cloudhaul_core::checksums::{self, TagValidation};
use cloudhaul_core::chunk::{self, PartDescriptor};
use cloudhaul_core::metadata::{FORMAT_VERSION, ObjectMetadata};
use cloudhaul_core::{CloudHaulError, CloudHaulResult, FaultKind, ObjectId, cipher, keys};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::client::{CloudHaulClient, DownloadRequest};
use crate::ops;
use crate::progress::ProgressTracker;
use crate::retry::Retrier;
use crate::store::ObjectStore;

pub(crate) async fn run(
    client: &CloudHaulClient,
    request: DownloadRequest,
) -> CloudHaulResult<()> {
    let DownloadRequest {
        source,
        destination,
        overwrite,
        progress,
    } = request;
    let url = source.to_string();

    let remote = ops::stat(client, &source)
        .await?
        .ok_or_else(|| CloudHaulError::NoSuchObject { url: url.clone() })?;
    let metadata = ObjectMetadata::from_headers(&url, &remote.headers)?;

    if let Some(version) = metadata.version
        && version != FORMAT_VERSION
    {
        return Err(CloudHaulError::UnsupportedVersion {
            url,
            found: version.to_string(),
            expected: FORMAT_VERSION,
        });
    }

    // Objects written by other tools are downloaded byte-for-byte; any
    // key headers they carry use an unknown layout and are ignored.
    let session_key = if metadata.is_tool_object() && metadata.is_encrypted() {
        let provider =
            client
                .keys
                .as_deref()
                .ok_or_else(|| CloudHaulError::MissingKeyProvider {
                    url: url.clone(),
                })?;
        Some(Arc::new(keys::unwrap_key(provider, &url, &metadata.keys)?))
    } else {
        None
    };

    let (file_length, mut chunk_size) = match (metadata.file_length, metadata.chunk_size) {
        (Some(file_length), Some(chunk_size)) if metadata.is_tool_object() => {
            (file_length, chunk_size)
        }
        _ => (remote.size, client.config.resolve_chunk_size(remote.size)),
    };
    if chunk_size == 0 {
        chunk_size = chunk::default_chunk_size(file_length);
    }

    if !overwrite && tokio::fs::try_exists(&destination).await? {
        return Err(CloudHaulError::LocalFileExists {
            path: destination.display().to_string(),
        });
    }
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    File::create(&destination).await?;

    let parts = chunk::plan(file_length, chunk_size, session_key.is_some());
    debug!(
        object = %source,
        file_length,
        chunk_size,
        parts = parts.len(),
        encrypted = session_key.is_some(),
        "starting download"
    );

    let retrier = client.retrier();
    let tracker = ProgressTracker::new(url.clone(), file_length, progress);
    let path = Arc::new(destination.clone());

    let outcome = ops::run_parts(client, &parts, |part| {
        download_part(
            client.store.clone(),
            client.api_permits.clone(),
            retrier.clone(),
            source.clone(),
            path.clone(),
            session_key.clone(),
            tracker.clone(),
            part,
        )
    })
    .await;

    let digests = match outcome {
        Ok(digests) => digests,
        Err(error) => {
            remove_partial(&destination).await;
            return Err(wrap_transfer_failure(url, error));
        }
    };

    match checksums::validate_object_tag(remote.etag.as_deref(), metadata.is_tool_object(), &digests)
    {
        TagValidation::Matched => {
            debug!(object = %source, "checksum validated");
        }
        TagValidation::Skipped { reason } => {
            warn!(object = %source, reason, "skipping checksum validation");
        }
        TagValidation::Mismatch {
            calculated,
            expected,
        } => {
            remove_partial(&destination).await;
            return Err(CloudHaulError::BadHash {
                url,
                calculated,
                expected,
            });
        }
    }

    debug!(object = %source, path = %destination.display(), "download complete");
    Ok(())
}

/// Usage and integrity faults keep their own message; everything else is
/// reported as a failed download with the fault as its source.
fn wrap_transfer_failure(url: String, error: CloudHaulError) -> CloudHaulError {
    match error.kind() {
        FaultKind::Usage | FaultKind::Integrity => error,
        _ => CloudHaulError::DownloadFailed {
            url,
            source: Box::new(error),
        },
    }
}

/// Download one part, retrying the whole read-decrypt-write unit.
///
/// Returns the digest of the stored (pre-decryption) bytes, which is what
/// the remote tag covers.
#[allow(clippy::too_many_arguments)]
async fn download_part(
    store: Arc<dyn ObjectStore>,
    api_permits: Arc<Semaphore>,
    retrier: Retrier,
    id: ObjectId,
    path: Arc<PathBuf>,
    session_key: Option<Arc<Zeroizing<Vec<u8>>>>,
    tracker: Arc<ProgressTracker>,
    part: PartDescriptor,
) -> CloudHaulResult<[u8; 16]> {
    let url = id.to_string();
    let digest = retrier
        .run(&url, || {
            let store = store.clone();
            let api_permits = api_permits.clone();
            let id = id.clone();
            let path = path.clone();
            let session_key = session_key.clone();
            let part = part.clone();
            async move {
                let stored = if part.stored_size == 0 {
                    Bytes::new()
                } else {
                    let _permit = api_permits.acquire().await.map_err(|e| {
                        CloudHaulError::Internal(anyhow::anyhow!("api pool closed: {e}"))
                    })?;
                    let last = part.stored_offset + part.stored_size - 1;
                    store.get_range(&id, part.stored_offset, last).await?
                };
                let digest = checksums::md5_digest(&stored);

                match &session_key {
                    Some(key) => {
                        let plaintext = cipher::decrypt_part(key, &stored)?;
                        write_part(&path, part.offset, &plaintext).await?;
                    }
                    None => write_part(&path, part.offset, &stored).await?,
                }
                Ok(digest)
            }
        })
        .await?;

    tracker.part_done(part.size);
    Ok(digest)
}

async fn write_part(path: &Path, offset: u64, data: &[u8]) -> CloudHaulResult<()> {
    let mut file = OpenOptions::new().write(true).open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    file.write_all(data).await?;
    file.flush().await?;
    Ok(())
}

async fn remove_partial(path: &Path) {
    if let Err(error) = tokio::fs::remove_file(path).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %error, "failed to remove partial download");
    }
}
