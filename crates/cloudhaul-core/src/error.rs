//! Error types for CloudHaul.
//!
//! Defines [`CloudHaulError`], a domain-specific error enum covering every
//! fault the transfer engine can surface, and [`FaultKind`], the
//! classification the retry controller uses to decide whether an operation
//! is worth re-executing. Usage and integrity faults are never retried;
//! transient faults and injected aborts are retried up to the configured
//! budget; client faults are retried only when explicitly enabled.

/// Classification of a fault, consumed by the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Bad caller input or a policy violation. Surfaced immediately.
    Usage,
    /// Data corruption detected (checksum or key-fingerprint mismatch).
    /// Fatal; partial local output is discarded.
    Integrity,
    /// A remote fault attributed to the caller (4xx-style). Retried only
    /// when the client is configured to retry client faults.
    Client,
    /// A server-side or environmental fault. Retried.
    Transient,
    /// A test-injected abort. Retried like a transient fault.
    Abort,
}

impl FaultKind {
    /// Whether an operation that failed with this kind should be retried.
    #[must_use]
    pub fn is_retryable(self, retry_client_faults: bool) -> bool {
        match self {
            Self::Transient | Self::Abort => true,
            Self::Client => retry_client_faults,
            Self::Usage | Self::Integrity => false,
        }
    }
}

/// Error type for all CloudHaul operations.
#[derive(Debug, thiserror::Error)]
pub enum CloudHaulError {
    // -----------------------------------------------------------------------
    // Key management policy errors
    // -----------------------------------------------------------------------
    /// A key operation was attempted on an object without encryption
    /// metadata.
    #[error("Object doesn't seem to be encrypted")]
    NotEncrypted,

    /// The key name is already registered on the object.
    #[error("Encryption key '{name}' already exists")]
    KeyExists {
        /// The duplicate key name.
        name: String,
    },

    /// The object already carries the maximum number of key registrations.
    #[error("No more than {max} keys are allowed")]
    TooManyKeys {
        /// The registration limit.
        max: usize,
    },

    /// Removing the only remaining key would make the object undecryptable.
    #[error("Cannot remove the last remaining key")]
    LastKey,

    /// The named key is not registered on the object.
    #[error("Encryption key '{name}' doesn't exist")]
    KeyNotRegistered {
        /// The key name that was not found on the object.
        name: String,
    },

    /// The key provider has no public key under the requested name.
    #[error("Missing encryption key: {name}")]
    MissingEncryptionKey {
        /// The key name the provider could not supply.
        name: String,
    },

    // -----------------------------------------------------------------------
    // Decryption / unwrap errors
    // -----------------------------------------------------------------------
    /// The single registered private key is not available locally.
    #[error("{url}: private key '{name}' is not available to decrypt")]
    PrivateKeyUnavailable {
        /// The object being decrypted.
        url: String,
        /// The registered key name.
        name: String,
    },

    /// None of the registered keys could be matched to a local private key.
    #[error("{url}: No eligible private key found")]
    NoEligibleKey {
        /// The object being decrypted.
        url: String,
    },

    /// The object is encrypted but the client has no key provider.
    #[error("{url}: No encryption key provider is specified")]
    MissingKeyProvider {
        /// The object being decrypted.
        url: String,
    },

    /// A multi-key object is missing its public-key hash metadata.
    #[error("{url}: public key hashes are required when object has multiple encryption keys")]
    HashesRequired {
        /// The object being decrypted.
        url: String,
    },

    /// The object was written by an incompatible tool version.
    #[error("{url}: file uploaded with unsupported version: {found}, should be {expected}")]
    UnsupportedVersion {
        /// The object being read.
        url: String,
        /// The version recorded on the object.
        found: String,
        /// The version this library writes.
        expected: u32,
    },

    // -----------------------------------------------------------------------
    // Object addressing errors
    // -----------------------------------------------------------------------
    /// The object does not exist in the remote store.
    #[error("Object '{url}' does not exist")]
    NoSuchObject {
        /// The missing object.
        url: String,
    },

    /// A prefix operation matched no objects.
    #[error("No objects found that match '{url}'")]
    NoObjectsFound {
        /// The prefix that matched nothing.
        url: String,
    },

    /// The rename destination is already occupied.
    #[error("Cannot overwrite existing destination object '{url}'")]
    DestinationExists {
        /// The occupied destination.
        url: String,
    },

    /// The download destination file already exists.
    #[error("File '{path}' already exists. Please delete or use overwrite")]
    LocalFileExists {
        /// The local path that is in the way.
        path: String,
    },

    /// An object URL could not be parsed.
    #[error("invalid object URL '{url}': expected s3://bucket/key")]
    InvalidObjectUrl {
        /// The unparseable input.
        url: String,
    },

    // -----------------------------------------------------------------------
    // Integrity errors
    // -----------------------------------------------------------------------
    /// A computed digest disagreed with the remote integrity tag.
    #[error(
        "Failed checksum validation for '{url}'. Calculated MD5: {calculated}, Expected MD5: {expected}"
    )]
    BadHash {
        /// The object whose digests disagree.
        url: String,
        /// The locally computed digest.
        calculated: String,
        /// The digest reported by the remote store.
        expected: String,
    },

    /// A private key's derived fingerprint disagreed with the recorded one.
    #[error(
        "Public-key checksums do not match. Calculated hash: {calculated}, Expected hash: {expected}"
    )]
    PubKeyHashMismatch {
        /// The fingerprint derived from the local key.
        calculated: String,
        /// The fingerprint recorded on the object.
        expected: String,
    },

    /// Encrypted part data could not be deciphered.
    #[error("cipher error: {message}")]
    Cipher {
        /// What went wrong while encrypting or decrypting.
        message: String,
    },

    /// The object's metadata headers are internally inconsistent.
    #[error("{url}: malformed object metadata: {reason}")]
    MetadataCorrupt {
        /// The object carrying the bad metadata.
        url: String,
        /// The inconsistency that was detected.
        reason: String,
    },

    // -----------------------------------------------------------------------
    // Remote / environmental errors
    // -----------------------------------------------------------------------
    /// A fault reported by the remote store.
    #[error("remote store error: {message}")]
    Remote {
        /// The fault description.
        message: String,
        /// Whether the store attributed the fault to the caller.
        client_fault: bool,
    },

    /// A local filesystem fault.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A test-injected abort, raised in place of a remote call.
    #[error("{message}")]
    AbortInjected {
        /// The injection-site message, e.g. `forcing copy abort`.
        message: String,
    },

    /// A download that failed after its pipeline started.
    #[error("Error downloading '{url}'.")]
    DownloadFailed {
        /// The object being downloaded.
        url: String,
        /// The underlying fault.
        #[source]
        source: Box<CloudHaulError>,
    },

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CloudHaulError {
    /// Classify this error for the retry controller.
    #[must_use]
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::NotEncrypted
            | Self::KeyExists { .. }
            | Self::TooManyKeys { .. }
            | Self::LastKey
            | Self::KeyNotRegistered { .. }
            | Self::MissingEncryptionKey { .. }
            | Self::PrivateKeyUnavailable { .. }
            | Self::NoEligibleKey { .. }
            | Self::MissingKeyProvider { .. }
            | Self::HashesRequired { .. }
            | Self::UnsupportedVersion { .. }
            | Self::NoSuchObject { .. }
            | Self::NoObjectsFound { .. }
            | Self::DestinationExists { .. }
            | Self::LocalFileExists { .. }
            | Self::InvalidObjectUrl { .. } => FaultKind::Usage,

            Self::BadHash { .. }
            | Self::PubKeyHashMismatch { .. }
            | Self::Cipher { .. }
            | Self::MetadataCorrupt { .. } => FaultKind::Integrity,

            Self::Remote { client_fault, .. } => {
                if *client_fault {
                    FaultKind::Client
                } else {
                    FaultKind::Transient
                }
            }

            Self::AbortInjected { .. } => FaultKind::Abort,

            Self::DownloadFailed { source, .. } => source.kind(),

            Self::Io(_) | Self::Internal(_) => FaultKind::Transient,
        }
    }
}

/// Convenience result type for CloudHaul operations.
pub type CloudHaulResult<T> = Result<T, CloudHaulError>;
