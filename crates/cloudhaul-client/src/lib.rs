//! Object-store transfer client with envelope encryption.
//!
//! This crate implements the transfer engine over the [`ObjectStore`]
//! capability trait: parallel multipart uploads and downloads, AES-256-CBC
//! envelope encryption with RSA-wrapped session keys, end-to-end checksum
//! validation, and retry with exponential backoff. A fault-injection seam
//! lets tests force remote calls to fail and verify that multi-step
//! operations recover without leaving partial state.
//!
//! # Architecture
//!
//! ```text
//! CloudHaulClient (facade, request options)
//!        |
//!        v
//!   ops::* (per-operation orchestration, part fan-out)
//!        |
//!   Retrier + FaultInjector (per remote call)
//!        |
//!        v
//!   ObjectStore (backend trait; InMemoryStore for tests)
//! ```

mod client;
pub mod inject;
pub mod memory;
mod ops;
pub mod progress;
pub mod retry;
pub mod store;

pub use client::{CloudHaulClient, DownloadRequest, UploadRequest};
pub use inject::{AbortInjector, FaultInjector, InjectionPoint, NoFaults};
pub use memory::InMemoryStore;
pub use progress::{ProgressEvent, ProgressListener};
pub use retry::RetryListener;
pub use store::{ObjectStore, ObjectSummary, PartTag, RemoteObject};
