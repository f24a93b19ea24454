//! Transfer progress reporting.
//!
//! Uploads and downloads report progress as parts complete. Listeners
//! are called from transfer tasks and must be cheap and non-blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Progress snapshot for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// URL of the object being transferred.
    pub url: String,
    /// Plaintext bytes transferred so far.
    pub transferred: u64,
    /// Total plaintext bytes of the transfer.
    pub total: u64,
}

/// Observer for transfer progress.
pub trait ProgressListener: Send + Sync {
    /// Called after each completed part.
    fn on_progress(&self, event: &ProgressEvent);
}

/// Aggregates per-part completions into overall progress events.
///
/// Shared across the part tasks of one transfer; without a listener it
/// does nothing.
pub(crate) struct ProgressTracker {
    url: String,
    total: u64,
    transferred: AtomicU64,
    listener: Option<Arc<dyn ProgressListener>>,
}

impl ProgressTracker {
    pub(crate) fn new(
        url: String,
        total: u64,
        listener: Option<Arc<dyn ProgressListener>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            url,
            total,
            transferred: AtomicU64::new(0),
            listener,
        })
    }

    /// Record `bytes` more plaintext transferred and notify the listener.
    pub(crate) fn part_done(&self, bytes: u64) {
        let Some(listener) = &self.listener else {
            return;
        };
        let transferred = self.transferred.fetch_add(bytes, Ordering::AcqRel) + bytes;
        listener.on_progress(&ProgressEvent {
            url: self.url.clone(),
            transferred,
            total: self.total,
        });
    }
}
