//! Operation implementations behind the [`CloudHaulClient`] facade.
//!
//! Each submodule owns one object-level operation. This module holds the
//! pieces they share: retried metadata and listing lookups, and the
//! part fan-out used by both transfer directions.

pub(crate) mod copy;
pub(crate) mod delete;
pub(crate) mod dir;
pub(crate) mod download;
pub(crate) mod keys;
pub(crate) mod rename;
pub(crate) mod upload;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cloudhaul_core::chunk::PartDescriptor;
use cloudhaul_core::{CloudHaulError, CloudHaulResult, ObjectId};
use tokio::task::JoinSet;

use crate::client::CloudHaulClient;
use crate::store::{ObjectSummary, RemoteObject};

/// Retried metadata lookup. `Ok(None)` means no object exists at `id`.
pub(crate) async fn stat(
    client: &CloudHaulClient,
    id: &ObjectId,
) -> CloudHaulResult<Option<RemoteObject>> {
    let url = id.to_string();
    client
        .retrier()
        .run(&url, || client.api_call(client.store.get_metadata(id)))
        .await
}

/// Retried prefix listing.
pub(crate) async fn list(
    client: &CloudHaulClient,
    bucket: &str,
    prefix: &str,
) -> CloudHaulResult<Vec<ObjectSummary>> {
    let url = format!("s3://{bucket}/{prefix}");
    client
        .retrier()
        .run(&url, || {
            client.api_call(client.store.list_objects(bucket, prefix))
        })
        .await
}

/// Run one task per part on the internal pool and collect the results in
/// ascending part order.
///
/// Parts are independent and complete in any order. The first permanent
/// failure marks the transfer cancelled: parts that have not started yet
/// return without doing work, in-flight parts drain, and that first
/// failure is returned once every task has finished.
pub(crate) async fn run_parts<T, F, Fut>(
    client: &CloudHaulClient,
    parts: &[PartDescriptor],
    part_op: F,
) -> CloudHaulResult<Vec<T>>
where
    T: Send + 'static,
    F: Fn(PartDescriptor) -> Fut,
    Fut: Future<Output = CloudHaulResult<T>> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let mut tasks = JoinSet::new();
    for part in parts {
        let permits = client.part_permits.clone();
        let cancelled = cancelled.clone();
        let number = part.part_number;
        let work = part_op(part.clone());
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|e| {
                CloudHaulError::Internal(anyhow::anyhow!("internal pool closed: {e}"))
            })?;
            if cancelled.load(Ordering::Acquire) {
                return Ok(None);
            }
            work.await.map(|value| Some((number, value)))
        });
    }

    let mut completed = BTreeMap::new();
    let mut first_error: Option<CloudHaulError> = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap_or_else(|e| {
            Err(CloudHaulError::Internal(anyhow::anyhow!(
                "part task failed: {e}"
            )))
        });
        match result {
            Ok(Some((number, value))) => {
                completed.insert(number, value);
            }
            Ok(None) => {}
            Err(error) => {
                cancelled.store(true, Ordering::Release);
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
    }

    if let Some(error) = first_error {
        return Err(error);
    }
    Ok(completed.into_values().collect())
}
