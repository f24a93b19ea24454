//! Object delete.

use std::sync::Arc;

use cloudhaul_core::{CloudHaulError, CloudHaulResult, ObjectId};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::client::CloudHaulClient;
use crate::inject::{FaultInjector, InjectionPoint};
use crate::ops;
use crate::retry::Retrier;
use crate::store::ObjectStore;

pub(crate) async fn run(client: &CloudHaulClient, id: &ObjectId) -> CloudHaulResult<()> {
    if ops::stat(client, id).await?.is_none() {
        return Err(CloudHaulError::NoSuchObject {
            url: id.to_string(),
        });
    }
    delete_raw(client, id, false).await
}

/// Retried delete without the existence pre-check.
///
/// `ignore_abort` exempts the call from fault injection; rename rollback
/// uses it so cleaning up after an injected failure is not itself
/// aborted.
pub(crate) async fn delete_raw(
    client: &CloudHaulClient,
    id: &ObjectId,
    ignore_abort: bool,
) -> CloudHaulResult<()> {
    delete_object(
        client.store.clone(),
        client.injector.clone(),
        client.api_permits.clone(),
        client.retrier(),
        id.clone(),
        ignore_abort,
    )
    .await
}

/// Ownership-based delete unit, spawnable from directory fan-out tasks.
pub(crate) async fn delete_object(
    store: Arc<dyn ObjectStore>,
    injector: Arc<dyn FaultInjector>,
    api_permits: Arc<Semaphore>,
    retrier: Retrier,
    id: ObjectId,
    ignore_abort: bool,
) -> CloudHaulResult<()> {
    let url = id.to_string();
    retrier
        .run(&url, || {
            let store = store.clone();
            let injector = injector.clone();
            let api_permits = api_permits.clone();
            let id = id.clone();
            let url = url.clone();
            async move {
                if !ignore_abort {
                    injector.check(InjectionPoint::Delete, &url)?;
                }
                let _permit = api_permits.acquire().await.map_err(|e| {
                    CloudHaulError::Internal(anyhow::anyhow!("api pool closed: {e}"))
                })?;
                store.delete_object(&id).await
            }
        })
        .await?;
    debug!(object = %id, "deleted object");
    Ok(())
}
