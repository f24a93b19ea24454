//! Envelope encryption keys.
//!
//! Each encrypted object uses a single 256-bit session key for its part
//! ciphers. The session key is wrapped with RSA once per registered key
//! pair, up to [`MAX_KEYS`] registrations per object, so holding any one
//! of the matching private keys is enough to decrypt.
//!
//! Registrations are matched to local key pairs by fingerprint: the first
//! [`FINGERPRINT_LEN`] characters of the base64 SHA-256 of the public
//! key's DER encoding. Objects written before fingerprints were recorded
//! carry none and are matched by registration name instead, which only
//! works while they hold a single key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use dashmap::DashMap;
use digest::Digest;
use rand_core::{OsRng, RngCore};
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{CloudHaulError, CloudHaulResult};
use crate::metadata::{KeyRegistration, MAX_KEYS};

/// Session key length in bytes (AES-256).
pub const SESSION_KEY_LEN: usize = 32;

/// Length of a public-key fingerprint in characters.
pub const FINGERPRINT_LEN: usize = 8;

// ---------------------------------------------------------------------------
// KeyProvider
// ---------------------------------------------------------------------------

/// Source of RSA key pairs, looked up by registration name.
///
/// A provider may hold only part of a pair: a public key is enough to
/// upload or to be added to an object, a private key is needed to
/// download or to mutate an object's registrations.
pub trait KeyProvider: Send + Sync {
    /// The private key registered under `name`, if available.
    fn private_key(&self, name: &str) -> Option<RsaPrivateKey>;

    /// The public key registered under `name`, if available.
    fn public_key(&self, name: &str) -> Option<RsaPublicKey>;
}

struct StoredKeyPair {
    private: Option<RsaPrivateKey>,
    public: RsaPublicKey,
    hidden: bool,
}

/// In-memory [`KeyProvider`] backed by a concurrent map.
#[derive(Default)]
pub struct MemoryKeyProvider {
    keys: DashMap<String, StoredKeyPair>,
}

impl std::fmt::Debug for MemoryKeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryKeyProvider")
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl MemoryKeyProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a full key pair under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, private: RsaPrivateKey) {
        let public = private.to_public_key();
        self.keys.insert(
            name.into(),
            StoredKeyPair {
                private: Some(private),
                public,
                hidden: false,
            },
        );
    }

    /// Register a public key only; the pair can encrypt but never decrypt.
    pub fn register_public(&self, name: impl Into<String>, public: RsaPublicKey) {
        self.keys.insert(
            name.into(),
            StoredKeyPair {
                private: None,
                public,
                hidden: false,
            },
        );
    }

    /// Make `name` temporarily unavailable, as if its key material were
    /// removed from the key store.
    pub fn hide(&self, name: &str) {
        if let Some(mut entry) = self.keys.get_mut(name) {
            entry.hidden = true;
        }
    }

    /// Undo a previous [`hide`](Self::hide).
    pub fn restore(&self, name: &str) {
        if let Some(mut entry) = self.keys.get_mut(name) {
            entry.hidden = false;
        }
    }
}

impl KeyProvider for MemoryKeyProvider {
    fn private_key(&self, name: &str) -> Option<RsaPrivateKey> {
        self.keys
            .get(name)
            .filter(|entry| !entry.hidden)
            .and_then(|entry| entry.private.clone())
    }

    fn public_key(&self, name: &str) -> Option<RsaPublicKey> {
        self.keys
            .get(name)
            .filter(|entry| !entry.hidden)
            .map(|entry| entry.public.clone())
    }
}

// ---------------------------------------------------------------------------
// Fingerprints and wrapping
// ---------------------------------------------------------------------------

/// Fingerprint of a public key.
///
/// The first [`FINGERPRINT_LEN`] characters of the base64 SHA-256 digest
/// of the key's DER-encoded SubjectPublicKeyInfo.
pub fn fingerprint(public: &RsaPublicKey) -> CloudHaulResult<String> {
    let der = public.to_public_key_der().map_err(|e| CloudHaulError::Cipher {
        message: format!("failed to encode public key: {e}"),
    })?;
    let hash = BASE64_STANDARD.encode(sha2::Sha256::digest(der.as_bytes()));
    Ok(hash[..FINGERPRINT_LEN].to_owned())
}

/// Generate a fresh random session key.
#[must_use]
pub fn generate_session_key() -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0_u8; SESSION_KEY_LEN]);
    OsRng.fill_bytes(key.as_mut_slice());
    key
}

/// Wrap a session key with a registration's public key.
pub fn wrap_session_key(public: &RsaPublicKey, session_key: &[u8]) -> CloudHaulResult<Vec<u8>> {
    public
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, session_key)
        .map_err(|e| CloudHaulError::Cipher {
            message: format!("failed to wrap session key: {e}"),
        })
}

/// Unwrap a session key with the matching private key.
pub fn unwrap_session_key(
    private: &RsaPrivateKey,
    wrapped: &[u8],
) -> CloudHaulResult<Zeroizing<Vec<u8>>> {
    private
        .decrypt(Pkcs1v15Encrypt, wrapped)
        .map(Zeroizing::new)
        .map_err(|e| CloudHaulError::Cipher {
            message: format!("failed to unwrap session key: {e}"),
        })
}

/// Generate a session key and wrap it for the key pair named `name`.
///
/// This is the upload entry point: the provider only needs the public
/// half of the pair.
pub fn wrap_new_key(
    provider: &dyn KeyProvider,
    name: &str,
) -> CloudHaulResult<(Zeroizing<Vec<u8>>, KeyRegistration)> {
    let public = provider
        .public_key(name)
        .ok_or_else(|| CloudHaulError::MissingEncryptionKey {
            name: name.to_owned(),
        })?;
    let session_key = generate_session_key();
    let wrapped_key = wrap_session_key(&public, &session_key)?;
    let pubkey_hash = fingerprint(&public)?;
    Ok((
        session_key,
        KeyRegistration {
            name: name.to_owned(),
            wrapped_key,
            pubkey_hash: Some(pubkey_hash),
        },
    ))
}

// ---------------------------------------------------------------------------
// Unwrapping against an object's registrations
// ---------------------------------------------------------------------------

/// Recover the session key of the object at `url` from its registrations.
///
/// A single registration without a fingerprint is matched by name. A
/// single registration with a fingerprint must also match the local
/// pair's fingerprint. With multiple registrations fingerprints are
/// mandatory; registrations whose private key is not locally available
/// are skipped and the first fingerprint match wins.
pub fn unwrap_key(
    provider: &dyn KeyProvider,
    url: &str,
    registrations: &[KeyRegistration],
) -> CloudHaulResult<Zeroizing<Vec<u8>>> {
    if let [registration] = registrations {
        let private = provider.private_key(&registration.name).ok_or_else(|| {
            CloudHaulError::PrivateKeyUnavailable {
                url: url.to_owned(),
                name: registration.name.clone(),
            }
        })?;
        if let Some(expected) = &registration.pubkey_hash {
            let calculated = fingerprint(&private.to_public_key())?;
            if calculated != *expected {
                return Err(CloudHaulError::PubKeyHashMismatch {
                    calculated,
                    expected: expected.clone(),
                });
            }
        }
        debug!(key = %registration.name, "unwrapping session key");
        return unwrap_session_key(&private, &registration.wrapped_key);
    }

    if registrations.iter().any(|r| r.pubkey_hash.is_none()) {
        return Err(CloudHaulError::HashesRequired {
            url: url.to_owned(),
        });
    }
    for registration in registrations {
        let Some(private) = provider.private_key(&registration.name) else {
            continue;
        };
        let calculated = fingerprint(&private.to_public_key())?;
        if Some(&calculated) == registration.pubkey_hash.as_ref() {
            debug!(key = %registration.name, "unwrapping session key");
            return unwrap_session_key(&private, &registration.wrapped_key);
        }
    }
    Err(CloudHaulError::NoEligibleKey {
        url: url.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Registration mutations
// ---------------------------------------------------------------------------

/// Build the registration list that adds the key pair `new_name` to an
/// object currently holding `existing`.
///
/// The session key is unwrapped with one of the existing registrations
/// and rewrapped for the new pair; existing registrations are untouched
/// apart from filling in a fingerprint where one can now be derived.
pub fn add_key_registration(
    provider: &dyn KeyProvider,
    url: &str,
    existing: &[KeyRegistration],
    new_name: &str,
) -> CloudHaulResult<Vec<KeyRegistration>> {
    if existing.is_empty() {
        return Err(CloudHaulError::NotEncrypted);
    }
    if existing.iter().any(|r| r.name == new_name) {
        return Err(CloudHaulError::KeyExists {
            name: new_name.to_owned(),
        });
    }
    if existing.len() >= MAX_KEYS {
        return Err(CloudHaulError::TooManyKeys { max: MAX_KEYS });
    }
    let public = provider
        .public_key(new_name)
        .ok_or_else(|| CloudHaulError::MissingEncryptionKey {
            name: new_name.to_owned(),
        })?;

    let session_key = unwrap_key(provider, url, existing)?;

    let mut keys = existing.to_vec();
    for registration in &mut keys {
        if registration.pubkey_hash.is_none()
            && let Some(private) = provider.private_key(&registration.name)
        {
            registration.pubkey_hash = Some(fingerprint(&private.to_public_key())?);
        }
    }
    keys.push(KeyRegistration {
        name: new_name.to_owned(),
        wrapped_key: wrap_session_key(&public, &session_key)?,
        pubkey_hash: Some(fingerprint(&public)?),
    });
    Ok(keys)
}

/// Build the registration list that removes the key pair `name` from an
/// object currently holding `existing`.
///
/// Purely structural: no key material is needed, the remaining wrapped
/// copies stay valid as they are.
pub fn remove_key_registration(
    existing: &[KeyRegistration],
    name: &str,
) -> CloudHaulResult<Vec<KeyRegistration>> {
    if existing.is_empty() {
        return Err(CloudHaulError::NotEncrypted);
    }
    if existing.len() == 1 {
        return Err(CloudHaulError::LastKey);
    }
    if !existing.iter().any(|r| r.name == name) {
        return Err(CloudHaulError::KeyNotRegistered {
            name: name.to_owned(),
        });
    }
    Ok(existing
        .iter()
        .filter(|r| r.name != name)
        .cloned()
        .collect())
}
