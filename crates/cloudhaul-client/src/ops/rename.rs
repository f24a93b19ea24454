//! Object rename as copy-then-delete with rollback.

use cloudhaul_core::{CloudHaulError, CloudHaulResult, ObjectId};
use tracing::{debug, warn};

use crate::client::CloudHaulClient;
use crate::ops::{self, copy, delete};

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
    // Also rejects renaming an object onto itself.
    if ops::stat(client, dst).await?.is_some() {
        return Err(CloudHaulError::DestinationExists {
            url: dst.to_string(),
        });
    }

    copy::copy_raw(client, src, dst, None).await?;

    if let Err(error) = delete::delete_raw(client, src, false).await {
        // Roll the copy back so a failed rename leaves both sides as they
        // were. The rollback delete is exempt from fault injection.
        warn!(
            source = %src,
            destination = %dst,
            error = %error,
            "rename could not delete source, removing destination copy"
        );
        if let Err(cleanup) = delete::delete_raw(client, dst, true).await {
            warn!(destination = %dst, error = %cleanup, "failed to remove destination copy");
        }
        return Err(error);
    }

    debug!(source = %src, destination = %dst, "renamed object");
    Ok(())
}
