//! Domain logic for CloudHaul, a client library for encrypted multipart
//! transfers to and from S3-compatible object stores.
//!
//! This crate holds everything that does not need an async runtime: the
//! error taxonomy, client configuration, chunk planning, the `s3tool-*`
//! object metadata protocol, envelope-encryption key management, per-part
//! AES-CBC encryption, and checksum reconciliation. The async transfer
//! machinery lives in `cloudhaul-client` and composes these pieces.

pub mod checksums;
pub mod chunk;
pub mod cipher;
pub mod config;
pub mod error;
pub mod keys;
pub mod metadata;
pub mod types;

pub use config::ClientConfig;
pub use error::{CloudHaulError, CloudHaulResult, FaultKind};
pub use keys::{KeyProvider, MemoryKeyProvider};
pub use metadata::{KeyRegistration, MAX_KEYS, ObjectMetadata};
pub use types::ObjectId;
