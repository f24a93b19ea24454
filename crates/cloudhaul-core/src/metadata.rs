//! Object metadata headers.
//!
//! Every object uploaded by this tool carries a set of user-metadata
//! headers describing how it was stored: the format version, the chunk
//! size and plaintext length used for part planning, and (for encrypted
//! objects) the envelope key registrations. Registrations are encoded as
//! parallel comma-joined lists so the format stays compatible with
//! objects written before multi-key support existed: such objects carry
//! a single name and wrapped key and no fingerprint header at all.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

use crate::error::{CloudHaulError, CloudHaulResult};

/// Format version written to every uploaded object.
pub const FORMAT_VERSION: u32 = 1;

/// The most encryption keys one object may carry.
pub const MAX_KEYS: usize = 4;

/// Header holding the writer's format version.
pub const HEADER_VERSION: &str = "s3tool-version";
/// Header holding the chunk size used for part planning, in bytes.
pub const HEADER_CHUNK_SIZE: &str = "s3tool-chunk-size";
/// Header holding the plaintext file length, in bytes.
pub const HEADER_FILE_LENGTH: &str = "s3tool-file-length";
/// Header holding the comma-joined encryption key names.
pub const HEADER_KEY_NAME: &str = "s3tool-key-name";
/// Header holding the comma-joined base64 wrapped session keys.
pub const HEADER_SYMMETRIC_KEY: &str = "s3tool-symmetric-key";
/// Header holding the comma-joined public-key fingerprints.
pub const HEADER_PUBKEY_HASH: &str = "s3tool-pubkey-hash";

// ---------------------------------------------------------------------------
// KeyRegistration
// ---------------------------------------------------------------------------

/// One envelope-key registration on an encrypted object.
///
/// The same session key is wrapped once per registration, so holding any
/// one of the matching private keys is enough to decrypt the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRegistration {
    /// Name the key pair is registered under.
    pub name: String,
    /// Session key wrapped with this registration's public key.
    pub wrapped_key: Vec<u8>,
    /// Fingerprint of the public key, absent on objects written before
    /// fingerprints were recorded.
    pub pubkey_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// ObjectMetadata
// ---------------------------------------------------------------------------

/// Parsed user metadata of a remote object.
///
/// `version` is `None` for objects not written by this tool; such objects
/// can still be downloaded but skip version and composite-checksum
/// handling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectMetadata {
    /// Writer format version, when the object was uploaded by this tool.
    pub version: Option<u32>,
    /// Chunk size used at upload, in bytes.
    pub chunk_size: Option<u64>,
    /// Plaintext length recorded at upload, in bytes.
    pub file_length: Option<u64>,
    /// Envelope key registrations, empty for unencrypted objects.
    pub keys: Vec<KeyRegistration>,
}

impl ObjectMetadata {
    /// Metadata for a fresh upload.
    #[must_use]
    pub fn for_upload(chunk_size: u64, file_length: u64, keys: Vec<KeyRegistration>) -> Self {
        Self {
            version: Some(FORMAT_VERSION),
            chunk_size: Some(chunk_size),
            file_length: Some(file_length),
            keys,
        }
    }

    /// Whether the object was written by this tool.
    #[must_use]
    pub fn is_tool_object(&self) -> bool {
        self.version.is_some()
    }

    /// Whether the object is envelope encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Parse metadata from the raw header map of the object at `url`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cloudhaul_core::metadata::ObjectMetadata;
    ///
    /// let meta = ObjectMetadata::for_upload(1024, 5000, Vec::new());
    /// let headers = meta.to_headers();
    /// let parsed = ObjectMetadata::from_headers("s3://bucket/key", &headers).unwrap();
    /// assert_eq!(parsed, meta);
    /// ```
    pub fn from_headers(url: &str, headers: &HashMap<String, String>) -> CloudHaulResult<Self> {
        let corrupt = |reason: String| CloudHaulError::MetadataCorrupt {
            url: url.to_owned(),
            reason,
        };

        let version = headers
            .get(HEADER_VERSION)
            .map(|v| {
                v.parse::<u32>()
                    .map_err(|_| corrupt(format!("invalid {HEADER_VERSION} header '{v}'")))
            })
            .transpose()?;
        let chunk_size = headers
            .get(HEADER_CHUNK_SIZE)
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|_| corrupt(format!("invalid {HEADER_CHUNK_SIZE} header '{v}'")))
            })
            .transpose()?;
        let file_length = headers
            .get(HEADER_FILE_LENGTH)
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|_| corrupt(format!("invalid {HEADER_FILE_LENGTH} header '{v}'")))
            })
            .transpose()?;

        if version.is_some() && chunk_size.is_none() {
            return Err(corrupt(format!("missing {HEADER_CHUNK_SIZE} header")));
        }
        if version.is_some() && file_length.is_none() {
            return Err(corrupt(format!("missing {HEADER_FILE_LENGTH} header")));
        }

        let keys = match headers.get(HEADER_SYMMETRIC_KEY) {
            None => Vec::new(),
            Some(wrapped_joined) => {
                let names: Vec<&str> = headers
                    .get(HEADER_KEY_NAME)
                    .ok_or_else(|| corrupt(format!("missing {HEADER_KEY_NAME} header")))?
                    .split(',')
                    .collect();
                let wrapped: Vec<&str> = wrapped_joined.split(',').collect();
                if names.len() != wrapped.len() {
                    return Err(corrupt(format!(
                        "{HEADER_KEY_NAME} lists {} keys but {HEADER_SYMMETRIC_KEY} lists {}",
                        names.len(),
                        wrapped.len()
                    )));
                }

                let hashes: Option<Vec<&str>> = headers
                    .get(HEADER_PUBKEY_HASH)
                    .map(|joined| joined.split(',').collect());
                if let Some(ref hashes) = hashes
                    && hashes.len() != names.len()
                {
                    return Err(corrupt(format!(
                        "{HEADER_PUBKEY_HASH} lists {} fingerprints but object has {} keys",
                        hashes.len(),
                        names.len()
                    )));
                }

                let mut keys = Vec::with_capacity(names.len());
                for (i, (name, encoded)) in names.iter().zip(&wrapped).enumerate() {
                    let wrapped_key = BASE64_STANDARD.decode(encoded).map_err(|_| {
                        corrupt(format!("invalid base64 in {HEADER_SYMMETRIC_KEY} header"))
                    })?;
                    keys.push(KeyRegistration {
                        name: (*name).to_owned(),
                        wrapped_key,
                        pubkey_hash: hashes.as_ref().map(|h| h[i].to_owned()),
                    });
                }
                keys
            }
        };

        Ok(Self {
            version,
            chunk_size,
            file_length,
            keys,
        })
    }

    /// Encode metadata into the header map stored alongside the object.
    ///
    /// The fingerprint header is written only when every registration has
    /// one, matching the all-or-nothing layout of the parallel lists.
    #[must_use]
    pub fn to_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        if let Some(version) = self.version {
            headers.insert(HEADER_VERSION.to_owned(), version.to_string());
        }
        if let Some(chunk_size) = self.chunk_size {
            headers.insert(HEADER_CHUNK_SIZE.to_owned(), chunk_size.to_string());
        }
        if let Some(file_length) = self.file_length {
            headers.insert(HEADER_FILE_LENGTH.to_owned(), file_length.to_string());
        }
        if !self.keys.is_empty() {
            let names: Vec<&str> = self.keys.iter().map(|k| k.name.as_str()).collect();
            headers.insert(HEADER_KEY_NAME.to_owned(), names.join(","));

            let wrapped: Vec<String> = self
                .keys
                .iter()
                .map(|k| BASE64_STANDARD.encode(&k.wrapped_key))
                .collect();
            headers.insert(HEADER_SYMMETRIC_KEY.to_owned(), wrapped.join(","));

            let hashes: Option<Vec<&str>> = self
                .keys
                .iter()
                .map(|k| k.pubkey_hash.as_deref())
                .collect();
            if let Some(hashes) = hashes {
                headers.insert(HEADER_PUBKEY_HASH.to_owned(), hashes.join(","));
            }
        }
        headers
    }
}
