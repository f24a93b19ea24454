//! Directory (prefix) operations.
//!
//! A "directory" is every object whose key starts with the given prefix,
//! minus folder-marker keys ending in `/`. Deletes fan out in parallel;
//! renames run one object at a time with fail-fast, because each rename
//! must finish its own copy-delete-rollback cycle before the next starts
//! for an aborted run to leave no object present on both sides.

use cloudhaul_core::{CloudHaulError, CloudHaulResult, ObjectId};
use tokio::task::JoinSet;
use tracing::debug;

use crate::client::CloudHaulClient;
use crate::ops::{self, delete, rename};
use crate::store::ObjectSummary;

pub(crate) async fn delete_dir(
    client: &CloudHaulClient,
    id: &ObjectId,
) -> CloudHaulResult<Vec<ObjectId>> {
    let targets = match_prefix(client, id).await?;
    debug!(prefix = %id, objects = targets.len(), "deleting directory");

    let mut tasks = JoinSet::new();
    for target in &targets {
        let store = client.store.clone();
        let injector = client.injector.clone();
        let api_permits = client.api_permits.clone();
        let permits = client.part_permits.clone();
        let retrier = client.retrier();
        let target = target.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|e| {
                CloudHaulError::Internal(anyhow::anyhow!("internal pool closed: {e}"))
            })?;
            delete::delete_object(store, injector, api_permits, retrier, target, false).await
        });
    }

    let mut first_error: Option<CloudHaulError> = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap_or_else(|e| {
            Err(CloudHaulError::Internal(anyhow::anyhow!(
                "delete task failed: {e}"
            )))
        });
        if let Err(error) = result
            && first_error.is_none()
        {
            first_error = Some(error);
        }
    }
    if let Some(error) = first_error {
        return Err(error);
    }
    Ok(targets)
}

pub(crate) async fn rename_directory(
    client: &CloudHaulClient,
    src: &ObjectId,
    dst: &ObjectId,
) -> CloudHaulResult<Vec<ObjectId>> {
    let sources = match_prefix(client, src).await?;
    debug!(
        source = %src,
        destination = %dst,
        objects = sources.len(),
        "renaming directory"
    );

    let mut renamed = Vec::with_capacity(sources.len());
    for source in sources {
        let suffix = source.key.strip_prefix(&src.key).unwrap_or(&source.key);
        let target = ObjectId::new(&dst.bucket, format!("{}{suffix}", dst.key));
        rename::run(client, &source, &target).await?;
        renamed.push(target);
    }
    Ok(renamed)
}

/// List the prefix and keep real objects, in key order.
async fn match_prefix(client: &CloudHaulClient, id: &ObjectId) -> CloudHaulResult<Vec<ObjectId>> {
    let listed = ops::list(client, &id.bucket, &id.key).await?;
    let matches: Vec<ObjectId> = listed
        .iter()
        .filter(|summary| !summary.key.ends_with('/'))
        .map(ObjectSummary::id)
        .collect();
    if matches.is_empty() {
        return Err(CloudHaulError::NoObjectsFound {
            url: id.to_string(),
        });
    }
    Ok(matches)
}
