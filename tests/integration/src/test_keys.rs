//! Key management: registration mutations, every decryption path, and
//! compatibility with objects recorded before fingerprints existed.

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use cloudhaul_client::store::ObjectStore;
    use cloudhaul_core::{KeyProvider, KeyRegistration, ObjectMetadata, cipher, keys};

    use crate::{
        client_without_keys, download_bytes, download_err, generate_keypair, random_payload,
        register_key, rig, test_object_id, upload_bytes,
    };

    // -----------------------------------------------------------------------
    // Adding and removing keys
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_decrypt_with_any_registered_key() {
        let rig = rig();
        for name in ["alice", "bob", "carol"] {
            register_key(&rig, name);
        }
        let id = test_object_id("keys");
        let data = random_payload(2000);
        upload_bytes(&rig, &id, &data, None, Some("alice")).await;

        rig.client.add_encryption_key(&id, "bob").await.unwrap();
        rig.client.add_encryption_key(&id, "carol").await.unwrap();

        // Only carol's private key remains available.
        rig.keys.hide("alice");
        rig.keys.hide("bob");
        assert_eq!(download_bytes(&rig, &id).await, data);

        // Only bob's.
        rig.keys.restore("bob");
        rig.keys.hide("carol");
        assert_eq!(download_bytes(&rig, &id).await, data);
    }

    #[tokio::test]
    async fn test_should_keep_object_decryptable_at_key_capacity() {
        let rig = rig();
        for name in ["k1", "k2", "k3", "k4", "k5"] {
            register_key(&rig, name);
        }
        let id = test_object_id("keys");
        let data = random_payload(500);
        upload_bytes(&rig, &id, &data, None, Some("k1")).await;

        rig.client.add_encryption_key(&id, "k2").await.unwrap();
        rig.client.add_encryption_key(&id, "k3").await.unwrap();
        rig.client.add_encryption_key(&id, "k4").await.unwrap();

        let err = rig.client.add_encryption_key(&id, "k5").await.unwrap_err();
        assert_eq!(err.to_string(), "No more than 4 keys are allowed");

        // The failed add left the object intact.
        rig.keys.hide("k1");
        rig.keys.hide("k2");
        rig.keys.hide("k3");
        assert_eq!(download_bytes(&rig, &id).await, data);
    }

    #[tokio::test]
    async fn test_should_reject_duplicate_key_registration() {
        let rig = rig();
        register_key(&rig, "alice");
        let id = test_object_id("keys");
        upload_bytes(&rig, &id, b"secret", None, Some("alice")).await;

        let err = rig
            .client
            .add_encryption_key(&id, "alice")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Encryption key 'alice' already exists");
    }

    #[tokio::test]
    async fn test_should_reject_adding_key_unknown_to_provider() {
        let rig = rig();
        register_key(&rig, "alice");
        let id = test_object_id("keys");
        upload_bytes(&rig, &id, b"secret", None, Some("alice")).await;

        let err = rig
            .client
            .add_encryption_key(&id, "ghost")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing encryption key: ghost");
    }

    #[tokio::test]
    async fn test_should_remove_key_and_guard_the_last_one() {
        let rig = rig();
        register_key(&rig, "alice");
        register_key(&rig, "bob");
        let id = test_object_id("keys");
        let data = random_payload(700);
        upload_bytes(&rig, &id, &data, None, Some("alice")).await;
        rig.client.add_encryption_key(&id, "bob").await.unwrap();

        rig.client.remove_encryption_key(&id, "alice").await.unwrap();

        // Alice no longer grants access; bob still does.
        rig.keys.hide("alice");
        assert_eq!(download_bytes(&rig, &id).await, data);

        let err = rig
            .client
            .remove_encryption_key(&id, "bob")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot remove the last remaining key");
    }

    #[tokio::test]
    async fn test_should_reject_removing_key_not_on_object() {
        let rig = rig();
        register_key(&rig, "alice");
        register_key(&rig, "bob");
        let id = test_object_id("keys");
        upload_bytes(&rig, &id, b"secret", None, Some("alice")).await;
        rig.client.add_encryption_key(&id, "bob").await.unwrap();

        let err = rig
            .client
            .remove_encryption_key(&id, "mallory")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Encryption key 'mallory' doesn't exist");
    }

    #[tokio::test]
    async fn test_should_reject_key_changes_on_unencrypted_objects() {
        let rig = rig();
        register_key(&rig, "alice");
        let id = test_object_id("keys");
        upload_bytes(&rig, &id, b"plain", None, None).await;

        let err = rig
            .client
            .add_encryption_key(&id, "alice")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Object doesn't seem to be encrypted");

        let err = rig
            .client
            .remove_encryption_key(&id, "alice")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Object doesn't seem to be encrypted");
    }

    #[tokio::test]
    async fn test_should_preserve_object_tag_across_key_changes() {
        let rig = rig();
        register_key(&rig, "alice");
        register_key(&rig, "bob");
        let id = test_object_id("keys");
        let data = random_payload(900);
        let tag = upload_bytes(&rig, &id, &data, None, Some("alice")).await;

        rig.client.add_encryption_key(&id, "bob").await.unwrap();
        rig.client.remove_encryption_key(&id, "alice").await.unwrap();

        // Key changes rewrite metadata only; the stored bytes and their
        // tag are untouched.
        let remote = rig.store.get_metadata(&id).await.unwrap().unwrap();
        assert_eq!(remote.etag.as_deref(), Some(tag.as_str()));
        assert_eq!(download_bytes(&rig, &id).await, data);
    }

    // -----------------------------------------------------------------------
    // Decryption edge cases
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_should_upload_with_public_half_only() {
        let rig = rig();
        let private = generate_keypair();
        rig.keys.register_public("writeonly", private.to_public_key());

        let id = test_object_id("keys");
        let data = random_payload(400);
        upload_bytes(&rig, &id, &data, None, Some("writeonly")).await;

        let err = download_err(&rig, &id).await;
        assert_eq!(
            err.to_string(),
            format!("{id}: private key 'writeonly' is not available to decrypt")
        );

        // Once the private half arrives, the object opens.
        rig.keys.register("writeonly", private);
        assert_eq!(download_bytes(&rig, &id).await, data);
    }

    #[tokio::test]
    async fn test_should_decrypt_legacy_objects_without_fingerprints() {
        let rig = rig();
        register_key(&rig, "alice");
        let id = test_object_id("legacy");
        let data = random_payload(600);

        // Objects written before fingerprints were recorded carry a
        // single registration with no hash; craft one directly.
        let (session_key, mut registration) =
            keys::wrap_new_key(rig.keys.as_ref(), "alice").unwrap();
        registration.pubkey_hash = None;
        let stored = cipher::encrypt_part(&session_key, &data).unwrap();
        let metadata = ObjectMetadata::for_upload(1024, data.len() as u64, vec![registration]);
        rig.store
            .put_simple(&id, metadata.to_headers(), Bytes::from(stored))
            .await
            .unwrap();

        assert_eq!(download_bytes(&rig, &id).await, data);
    }

    #[tokio::test]
    async fn test_should_reject_key_whose_fingerprint_disagrees() {
        let rig = rig();
        register_key(&rig, "alice");
        let id = test_object_id("legacy");
        let data = random_payload(100);

        let (session_key, mut registration) =
            keys::wrap_new_key(rig.keys.as_ref(), "alice").unwrap();
        registration.pubkey_hash = Some("AAAAAAAA".to_owned());
        let stored = cipher::encrypt_part(&session_key, &data).unwrap();
        let metadata = ObjectMetadata::for_upload(1024, data.len() as u64, vec![registration]);
        rig.store
            .put_simple(&id, metadata.to_headers(), Bytes::from(stored))
            .await
            .unwrap();

        let err = download_err(&rig, &id).await;
        assert!(
            err.to_string()
                .starts_with("Public-key checksums do not match"),
            "{err}"
        );
        assert!(err.to_string().ends_with("Expected hash: AAAAAAAA"), "{err}");
    }

    #[tokio::test]
    async fn test_should_require_fingerprints_on_multi_key_objects() {
        let rig = rig();
        register_key(&rig, "alice");
        register_key(&rig, "bob");
        let id = test_object_id("legacy");
        let data = random_payload(50);

        // Two registrations, one without a hash: the header layout is
        // all-or-nothing, so the object records no fingerprints at all.
        let (session_key, mut alice_reg) =
            keys::wrap_new_key(rig.keys.as_ref(), "alice").unwrap();
        alice_reg.pubkey_hash = None;
        let bob_public = rig.keys.public_key("bob").unwrap();
        let bob_reg = KeyRegistration {
            name: "bob".to_owned(),
            wrapped_key: keys::wrap_session_key(&bob_public, &session_key).unwrap(),
            pubkey_hash: None,
        };
        let stored = cipher::encrypt_part(&session_key, &data).unwrap();
        let metadata =
            ObjectMetadata::for_upload(1024, data.len() as u64, vec![alice_reg, bob_reg]);
        rig.store
            .put_simple(&id, metadata.to_headers(), Bytes::from(stored))
            .await
            .unwrap();

        let err = download_err(&rig, &id).await;
        assert!(
            err.to_string()
                .ends_with("public key hashes are required when object has multiple encryption keys"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_should_fail_when_no_private_key_is_available() {
        let rig = rig();
        register_key(&rig, "alice");
        register_key(&rig, "bob");
        let data = random_payload(200);

        let shared = test_object_id("keys");
        upload_bytes(&rig, &shared, &data, None, Some("alice")).await;
        rig.client.add_encryption_key(&shared, "bob").await.unwrap();

        let solo = test_object_id("keys");
        upload_bytes(&rig, &solo, &data, None, Some("alice")).await;

        rig.keys.hide("alice");
        rig.keys.hide("bob");

        let err = download_err(&rig, &shared).await;
        assert!(
            err.to_string().ends_with("No eligible private key found"),
            "{err}"
        );

        let err = download_err(&rig, &solo).await;
        assert_eq!(
            err.to_string(),
            format!("{solo}: private key 'alice' is not available to decrypt")
        );
    }

    #[tokio::test]
    async fn test_should_require_provider_for_encrypted_operations() {
        let rig = rig();
        register_key(&rig, "alice");
        let id = test_object_id("keys");
        upload_bytes(&rig, &id, b"secret", None, Some("alice")).await;

        let keyless = client_without_keys(rig.store.clone());

        let dir = tempfile::tempdir().unwrap();
        let request = cloudhaul_client::DownloadRequest::builder()
            .source(id.clone())
            .destination(dir.path().join("out.bin"))
            .build();
        let err = keyless.download(request).await.unwrap_err();
        assert!(
            err.to_string()
                .ends_with("No encryption key provider is specified"),
            "{err}"
        );

        let err = keyless.add_encryption_key(&id, "bob").await.unwrap_err();
        assert!(
            err.to_string()
                .ends_with("No encryption key provider is specified"),
            "{err}"
        );
    }
}
