//! Multipart upload with optional envelope encryption.
//!
//! An upload runs in three stages: initiate (writes the object metadata),
//! part fan-out (each part reads its file range, encrypts it when a
//! session key is present, and writes it under retry), and complete.
//! Every part tag the store returns is checked against the locally
//! computed digest, and the final composite tag is checked against the
//! digests of all parts. If any stage fails permanently the upload is
//! aborted remotely and nothing becomes visible at the destination.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use cloudhaul_core::chunk::{self, PartDescriptor};
use cloudhaul_core::metadata::ObjectMetadata;
use cloudhaul_core::{CloudHaulError, CloudHaulResult, ObjectId, checksums, cipher, keys};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::client::{CloudHaulClient, UploadRequest};
use crate::inject::{FaultInjector, InjectionPoint};
use crate::ops;
use crate::progress::ProgressTracker;
use crate::retry::Retrier;
use crate::store::{ObjectStore, PartTag};

pub(crate) async fn run(
    client: &CloudHaulClient,
    request: UploadRequest,
) -> CloudHaulResult<String> {
    let UploadRequest {
        source,
        destination,
        encrypt_key,
        chunk_size,
        progress,
    } = request;
    let url = destination.to_string();

    let file_length = tokio::fs::metadata(&source).await?.len();
    let chunk_size = chunk_size.unwrap_or_else(|| client.config.resolve_chunk_size(file_length));

    let (session_key, registrations) = match &encrypt_key {
        Some(name) => {
            let provider =
                client
                    .keys
                    .as_deref()
                    .ok_or_else(|| CloudHaulError::MissingKeyProvider {
                        url: url.clone(),
                    })?;
            let (key, registration) = keys::wrap_new_key(provider, name)?;
            (Some(Arc::new(key)), vec![registration])
        }
        None => (None, Vec::new()),
    };

    let headers = ObjectMetadata::for_upload(chunk_size, file_length, registrations).to_headers();
    let parts = chunk::plan(file_length, chunk_size, session_key.is_some());
    debug!(
        object = %destination,
        file_length,
        chunk_size,
        parts = parts.len(),
        encrypted = session_key.is_some(),
        "starting upload"
    );

    let retrier = client.retrier();
    let upload_id = retrier
        .run(&url, || {
            client.api_call(
                client
                    .store
                    .initiate_multipart(&destination, headers.clone()),
            )
        })
        .await?;

    let tracker = ProgressTracker::new(url.clone(), file_length, progress);
    let source = Arc::new(source);
    let shared_upload_id = Arc::new(upload_id.clone());

    let outcome = ops::run_parts(client, &parts, |part| {
        upload_part(
            client.store.clone(),
            client.injector.clone(),
            client.api_permits.clone(),
            retrier.clone(),
            source.clone(),
            destination.clone(),
            shared_upload_id.clone(),
            session_key.clone(),
            tracker.clone(),
            part,
        )
    })
    .await;

    let digests = match outcome {
        Ok(digests) => digests,
        Err(error) => {
            abort_upload(client, &destination, &upload_id).await;
            return Err(error);
        }
    };

    let part_tags = digests
        .iter()
        .zip(1u32..)
        .map(|(digest, part_number)| PartTag {
            part_number,
            etag: checksums::single_tag(digest),
        })
        .collect::<Vec<_>>();

    let final_tag = match retrier
        .run(&url, || {
            client.api_call(
                client
                    .store
                    .complete_multipart(&destination, &upload_id, &part_tags),
            )
        })
        .await
    {
        Ok(tag) => tag,
        Err(error) => {
            abort_upload(client, &destination, &upload_id).await;
            return Err(error);
        }
    };

    let calculated = checksums::composite_tag(&digests);
    if final_tag != calculated {
        return Err(CloudHaulError::BadHash {
            url,
            calculated,
            expected: final_tag,
        });
    }

    debug!(object = %destination, etag = %final_tag, "upload complete");
    Ok(final_tag)
}

/// Upload one part, retrying the whole read-encrypt-write unit.
///
/// Encryption restarts per attempt so every retry writes a fresh IV; the
/// digest compared against the store's part tag is always the digest of
/// the bytes that attempt sent.
#[allow(clippy::too_many_arguments)]
async fn upload_part(
    store: Arc<dyn ObjectStore>,
    injector: Arc<dyn FaultInjector>,
    api_permits: Arc<Semaphore>,
    retrier: Retrier,
    source: Arc<PathBuf>,
    id: ObjectId,
    upload_id: Arc<String>,
    session_key: Option<Arc<Zeroizing<Vec<u8>>>>,
    tracker: Arc<ProgressTracker>,
    part: PartDescriptor,
) -> CloudHaulResult<[u8; 16]> {
    let url = id.to_string();
    let digest = retrier
        .run(&url, || {
            let store = store.clone();
            let injector = injector.clone();
            let api_permits = api_permits.clone();
            let source = source.clone();
            let id = id.clone();
            let upload_id = upload_id.clone();
            let session_key = session_key.clone();
            let part = part.clone();
            async move {
                injector.check(InjectionPoint::UploadPart, &upload_id)?;

                let plaintext = read_part(&source, &part).await?;
                let data = match &session_key {
                    Some(key) => Bytes::from(cipher::encrypt_part(key, &plaintext)?),
                    None => Bytes::from(plaintext),
                };
                let digest = checksums::md5_digest(&data);

                let _permit = api_permits.acquire().await.map_err(|e| {
                    CloudHaulError::Internal(anyhow::anyhow!("api pool closed: {e}"))
                })?;
                let etag = store
                    .put_part(&id, &upload_id, part.part_number + 1, data)
                    .await?;

                let calculated = checksums::single_tag(&digest);
                if etag != calculated {
                    return Err(CloudHaulError::BadHash {
                        url: id.to_string(),
                        calculated,
                        expected: etag,
                    });
                }
                Ok(digest)
            }
        })
        .await?;

    tracker.part_done(part.size);
    Ok(digest)
}

async fn read_part(path: &Path, part: &PartDescriptor) -> CloudHaulResult<Vec<u8>> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(part.offset)).await?;
    let mut buffer = Vec::with_capacity(usize::try_from(part.size).unwrap_or(0));
    let read = (&mut file).take(part.size).read_to_end(&mut buffer).await?;
    if (read as u64) < part.size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("file shrank while uploading: read {read} of {} bytes", part.size),
        )
        .into());
    }
    Ok(buffer)
}

/// Best-effort remote cleanup after a failed upload.
async fn abort_upload(client: &CloudHaulClient, id: &ObjectId, upload_id: &str) {
    if let Err(error) = client
        .api_call(client.store.abort_multipart(id, upload_id))
        .await
    {
        warn!(object = %id, upload_id, error = %error, "failed to abort incomplete upload");
    }
}
