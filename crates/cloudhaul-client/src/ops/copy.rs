//! Server-side object copy.

use std::collections::HashMap;

use cloudhaul_core::{CloudHaulError, CloudHaulResult, ObjectId};
use tracing::debug;

use crate::client::CloudHaulClient;
use crate::inject::InjectionPoint;
use crate::ops;

pub(crate) async fn run(
    client: &CloudHaulClient,
    src: &ObjectId,
    dst: &ObjectId,
) -> CloudHaulResult<()> {
    if ops::stat(client, src).await?.is_none() {
        return Err(CloudHaulError::NoSuchObject {
            url: src.to_string(),
        });
    }
    copy_raw(client, src, dst, None).await
}

/// Retried copy without the source pre-check.
///
/// With `replace_headers` set the destination gets that user metadata
/// instead of the source's; key mutations copy an object onto its own key
/// this way to rewrite metadata in place. The fault-injection token is
/// the source URL.
pub(crate) async fn copy_raw(
    client: &CloudHaulClient,
    src: &ObjectId,
    dst: &ObjectId,
    replace_headers: Option<HashMap<String, String>>,
) -> CloudHaulResult<()> {
    let src_url = src.to_string();
    client
        .retrier()
        .run(&src_url, || {
            let url = src_url.clone();
            let replace_headers = replace_headers.clone();
            async move {
                client.injector.check(InjectionPoint::Copy, &url)?;
                client
                    .api_call(client.store.copy_object(src, dst, replace_headers))
                    .await
            }
        })
        .await?;
    debug!(source = %src, destination = %dst, "copied object");
    Ok(())
}
