//! Encryption-key registration changes on stored objects.
//!
//! Adding a key unwraps the object's session key with an existing
//! registration and wraps it once more for the new pair; removing one
//! drops its registration. Either way only the user metadata changes,
//! rewritten by copying the object onto its own key with replacement
//! headers. The stored bytes, and with them the object tag, are
//! untouched.

use cloudhaul_core::metadata::ObjectMetadata;
use cloudhaul_core::{CloudHaulError, CloudHaulResult, KeyRegistration, ObjectId, keys};
use tracing::debug;

use crate::client::CloudHaulClient;
use crate::ops::{self, copy};

pub(crate) async fn add(
    client: &CloudHaulClient,
    id: &ObjectId,
    key_name: &str,
) -> CloudHaulResult<()> {
    let url = id.to_string();
    let metadata = load_metadata(client, id, &url).await?;
    let provider = client
        .keys
        .as_deref()
        .ok_or_else(|| CloudHaulError::MissingKeyProvider { url: url.clone() })?;

    let keys = keys::add_key_registration(provider, &url, &metadata.keys, key_name)?;
    rewrite_metadata(client, id, metadata, keys).await?;
    debug!(object = %id, key = key_name, "added encryption key");
    Ok(())
}

pub(crate) async fn remove(
    client: &CloudHaulClient,
    id: &ObjectId,
    key_name: &str,
) -> CloudHaulResult<()> {
    let url = id.to_string();
    let metadata = load_metadata(client, id, &url).await?;

    let keys = keys::remove_key_registration(&metadata.keys, key_name)?;
    rewrite_metadata(client, id, metadata, keys).await?;
    debug!(object = %id, key = key_name, "removed encryption key");
    Ok(())
}

async fn load_metadata(
    client: &CloudHaulClient,
    id: &ObjectId,
    url: &str,
) -> CloudHaulResult<ObjectMetadata> {
    let remote = ops::stat(client, id)
        .await?
        .ok_or_else(|| CloudHaulError::NoSuchObject {
            url: url.to_owned(),
        })?;
    ObjectMetadata::from_headers(url, &remote.headers)
}

/// Swap the object's key registrations, keeping version and geometry.
async fn rewrite_metadata(
    client: &CloudHaulClient,
    id: &ObjectId,
    mut metadata: ObjectMetadata,
    keys: Vec<KeyRegistration>,
) -> CloudHaulResult<()> {
    metadata.keys = keys;
    copy::copy_raw(client, id, id, Some(metadata.to_headers())).await
}
