//! Checksum reconciliation against a store whose advertised tags can be
//! doctored.

#[cfg(test)]
mod tests {
    use cloudhaul_client::DownloadRequest;
    use cloudhaul_core::checksums;

    use crate::{
        download_bytes, download_err, random_payload, rig, seed_foreign, test_object_id,
        upload_bytes,
    };

    #[tokio::test]
    async fn test_should_fail_download_when_remote_tag_disagrees() {
        let rig = rig();
        let id = test_object_id("tags");
        let data = random_payload(100);
        let tag = upload_bytes(&rig, &id, &data, None, None).await;

        let corrupt = "00000000000000000000000000000000-1";
        rig.store.set_etag(&id, corrupt);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let request = DownloadRequest::builder()
            .source(id.clone())
            .destination(path.clone())
            .build();
        let err = rig.client.download(request).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "Failed checksum validation for '{id}'. Calculated MD5: {tag}, Expected MD5: {corrupt}"
            )
        );
        // The partial download was removed.
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_should_validate_plain_tags_on_foreign_objects() {
        let rig = rig();
        let id = test_object_id("tags");
        let data = random_payload(256);
        seed_foreign(&rig, &id, &data).await;

        let corrupt = "11111111111111111111111111111111";
        rig.store.set_etag(&id, corrupt);

        let err = download_err(&rig, &id).await;
        let calculated = checksums::md5_hex(&data);
        assert_eq!(
            err.to_string(),
            format!(
                "Failed checksum validation for '{id}'. Calculated MD5: {calculated}, Expected MD5: {corrupt}"
            )
        );
    }

    #[tokio::test]
    async fn test_should_skip_validation_without_remote_tag() {
        let rig = rig();
        let id = test_object_id("tags");
        let data = random_payload(512);
        upload_bytes(&rig, &id, &data, None, None).await;

        rig.store.clear_etag(&id);
        assert_eq!(download_bytes(&rig, &id).await, data);
    }

    #[tokio::test]
    async fn test_should_skip_validation_on_part_count_mismatch() {
        let rig = rig();
        let id = test_object_id("tags");
        let data = random_payload(2048);
        upload_bytes(&rig, &id, &data, Some(1024), None).await;

        // A tag recorded for five parts cannot be checked against a
        // two-part download.
        rig.store.set_etag(&id, "00000000000000000000000000000000-5");
        assert_eq!(download_bytes(&rig, &id).await, data);
    }

    #[tokio::test]
    async fn test_should_skip_composite_tags_on_foreign_objects() {
        let rig = rig();
        let id = test_object_id("tags");
        let data = random_payload(2048);
        seed_foreign(&rig, &id, &data).await;

        // Foreign multipart tags use unknowable part boundaries.
        rig.store.set_etag(&id, "00000000000000000000000000000000-2");
        assert_eq!(download_bytes(&rig, &id).await, data);
    }
}
