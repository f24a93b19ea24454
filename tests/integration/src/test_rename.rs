//! Rename tests: copy-then-delete with rollback on injected faults, and
//! directory renames.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cloudhaul_client::InjectionPoint;
    use cloudhaul_core::ObjectId;

    use crate::{
        RetryLog, download_bytes, random_payload, register_key, rig, rig_with_retries,
        seed_foreign, test_object_id, upload_bytes,
    };

    // -----------------------------------------------------------------------
    // Single objects
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_rename_object_with_metadata() {
        let rig = rig();
        register_key(&rig, "alice");
        let src = test_object_id("rename-src");
        let dst = test_object_id("rename-dst");
        let data = random_payload(1500);
        upload_bytes(&rig, &src, &data, None, Some("alice")).await;

        rig.client.rename(&src, &dst).await.unwrap();

        assert!(!rig.client.exists(&src).await.unwrap());
        // Headers moved with the object: it still decrypts.
        assert_eq!(download_bytes(&rig, &dst).await, data);
    }

    #[tokio::test]
    async fn test_should_reject_rename_of_missing_source() {
        let rig = rig();
        let src = test_object_id("rename-src");
        let dst = test_object_id("rename-dst");

        let err = rig.client.rename(&src, &dst).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Object '{src}' does not exist"));
    }

    #[tokio::test]
    async fn test_should_reject_rename_onto_existing_object() {
        let rig = rig();
        let src = test_object_id("rename-src");
        let dst = test_object_id("rename-dst");
        seed_foreign(&rig, &src, b"source").await;
        seed_foreign(&rig, &dst, b"occupied").await;

        let err = rig.client.rename(&src, &dst).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Cannot overwrite existing destination object '{dst}'")
        );

        // Renaming an object onto itself is the same refusal.
        let err = rig.client.rename(&src, &src).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Cannot overwrite existing destination object '{src}'")
        );
    }

    // -----------------------------------------------------------------------
    // Injected faults
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_leave_source_intact_when_copy_aborts() {
        let rig = rig();
        let src = test_object_id("rename-src");
        let dst = test_object_id("rename-dst");
        seed_foreign(&rig, &src, b"payload").await;

        rig.injector
            .counters(InjectionPoint::Copy)
            .set_injection_counter(1);

        let err = rig.client.rename(&src, &dst).await.unwrap_err();
        assert_eq!(err.to_string(), "forcing copy abort");
        assert!(rig.client.exists(&src).await.unwrap());
        assert!(!rig.client.exists(&dst).await.unwrap());
    }

    #[tokio::test]
    async fn test_should_remove_copy_when_source_delete_aborts() {
        let rig = rig();
        let src = test_object_id("rename-src");
        let dst = test_object_id("rename-dst");
        seed_foreign(&rig, &src, b"payload").await;

        rig.injector
            .counters(InjectionPoint::Delete)
            .set_injection_counter(1);

        let err = rig.client.rename(&src, &dst).await.unwrap_err();
        assert_eq!(err.to_string(), "forcing delete abort");
        // Rolled back: the half-finished copy is gone, the source stays.
        assert!(rig.client.exists(&src).await.unwrap());
        assert!(!rig.client.exists(&dst).await.unwrap());
    }

    #[tokio::test]
    async fn test_should_absorb_copy_faults_within_retry_budget() {
        let rig = rig_with_retries(10);
        let retries = Arc::new(RetryLog::default());
        rig.client.add_retry_listener(retries.clone());

        let src = test_object_id("rename-src");
        let dst = test_object_id("rename-dst");
        seed_foreign(&rig, &src, b"payload").await;

        rig.injector
            .counters(InjectionPoint::Copy)
            .set_injection_counter(3);

        rig.client.rename(&src, &dst).await.unwrap();

        assert!(!rig.client.exists(&src).await.unwrap());
        assert!(rig.client.exists(&dst).await.unwrap());
        // One notification per injected copy fault, nothing more.
        assert_eq!(retries.len(), 3);
    }

    #[tokio::test]
    async fn test_should_absorb_delete_faults_within_retry_budget() {
        let rig = rig_with_retries(10);
        let retries = Arc::new(RetryLog::default());
        rig.client.add_retry_listener(retries.clone());

        let src = test_object_id("rename-src");
        let dst = test_object_id("rename-dst");
        seed_foreign(&rig, &src, b"payload").await;

        rig.injector
            .counters(InjectionPoint::Delete)
            .set_injection_counter(3);

        rig.client.rename(&src, &dst).await.unwrap();

        assert!(!rig.client.exists(&src).await.unwrap());
        assert!(rig.client.exists(&dst).await.unwrap());
        assert_eq!(retries.len(), 3);
    }

    // -----------------------------------------------------------------------
    // Directories
    // -----------------------------------------------------------------------

    async fn seed_directory(rig: &crate::TestRig, prefix: &str) -> Vec<String> {
        let names = vec!["a.bin", "b.bin", "nested/c.bin"];
        for name in &names {
            let id = ObjectId::new("cloudhaul-test", format!("{prefix}{name}"));
            seed_foreign(rig, &id, name.as_bytes()).await;
        }
        // Folder marker, as consoles create them.
        seed_foreign(rig, &ObjectId::new("cloudhaul-test", prefix), &[]).await;
        names.into_iter().map(ToOwned::to_owned).collect()
    }

    #[tokio::test]
    async fn test_should_rename_directory_preserving_suffixes() {
        let rig = rig();
        let names = seed_directory(&rig, "dir-src/").await;
        let src = ObjectId::new("cloudhaul-test", "dir-src/");
        let dst = ObjectId::new("cloudhaul-test", "dir-dst/");

        let renamed = rig.client.rename_directory(&src, &dst).await.unwrap();
        assert_eq!(renamed.len(), 3);

        for name in &names {
            let target = ObjectId::new("cloudhaul-test", format!("dir-dst/{name}"));
            assert_eq!(download_bytes(&rig, &target).await, name.as_bytes());
        }
        // Only the folder marker remains under the source prefix.
        let left = rig
            .client
            .list_objects("cloudhaul-test", "dir-src/")
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].key, "dir-src/");
    }

    #[tokio::test]
    async fn test_should_reject_directory_rename_without_matches() {
        let rig = rig();
        let src = ObjectId::new("cloudhaul-test", "missing/");
        let dst = ObjectId::new("cloudhaul-test", "elsewhere/");

        let err = rig.client.rename_directory(&src, &dst).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("No objects found that match '{src}'")
        );
    }

    #[tokio::test]
    async fn test_should_move_nothing_when_directory_copy_aborts() {
        let rig = rig();
        seed_directory(&rig, "dir-abort/").await;
        let src = ObjectId::new("cloudhaul-test", "dir-abort/");
        let dst = ObjectId::new("cloudhaul-test", "dir-abort-dst/");

        let counters = rig.injector.counters(InjectionPoint::Copy);
        counters.use_global_counter(true);
        counters.set_injection_counter(1);

        let err = rig.client.rename_directory(&src, &dst).await.unwrap_err();
        assert_eq!(err.to_string(), "forcing copy abort");

        let sources = rig
            .client
            .list_objects("cloudhaul-test", "dir-abort/")
            .await
            .unwrap();
        // Three files plus the folder marker.
        assert_eq!(sources.len(), 4);
        assert!(
            rig.client
                .list_objects("cloudhaul-test", "dir-abort-dst/")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_should_move_nothing_when_directory_delete_aborts() {
        let rig = rig();
        seed_directory(&rig, "dir-abort/").await;
        let src = ObjectId::new("cloudhaul-test", "dir-abort/");
        let dst = ObjectId::new("cloudhaul-test", "dir-abort-dst/");

        let counters = rig.injector.counters(InjectionPoint::Delete);
        counters.use_global_counter(true);
        counters.set_injection_counter(1);

        let err = rig.client.rename_directory(&src, &dst).await.unwrap_err();
        assert_eq!(err.to_string(), "forcing delete abort");

        // The aborted file's copy was rolled back, so every source file
        // is still in place and nothing reached the destination.
        let sources = rig
            .client
            .list_objects("cloudhaul-test", "dir-abort/")
            .await
            .unwrap();
        assert_eq!(sources.len(), 4);
        assert!(
            rig.client
                .list_objects("cloudhaul-test", "dir-abort-dst/")
                .await
                .unwrap()
                .is_empty()
        );
    }
}
