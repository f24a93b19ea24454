//! Fault injection for exercising retry and cleanup paths.
//!
//! Operations consult a [`FaultInjector`] right before their store calls.
//! The production injector is [`NoFaults`]; tests install an
//! [`AbortInjector`] whose counters force a configurable number of
//! failures per operation kind before letting calls through. Because the
//! check sits inside the retried closure, injected aborts exercise the
//! same retry machinery as real transport failures.
//!
//! Counters are keyed by a token specific to the injection point (the
//! source URL for copies, the object URL for deletes, the upload id for
//! part uploads). Upload ids are unpredictable, so tests targeting
//! uploads collapse all tokens into one slot with
//! [`AbortCounters::use_global_counter`].

use std::collections::HashMap;

use cloudhaul_core::{CloudHaulError, CloudHaulResult};
use parking_lot::Mutex;
use tracing::debug;

// ---------------------------------------------------------------------------
// InjectionPoint
// ---------------------------------------------------------------------------

/// Store interaction that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionPoint {
    /// Server-side object copy; token is the source URL.
    Copy,
    /// Object delete; token is the object URL.
    Delete,
    /// Multipart part write; token is the upload id.
    UploadPart,
}

impl InjectionPoint {
    fn abort_message(self) -> &'static str {
        match self {
            Self::Copy => "forcing copy abort",
            Self::Delete => "forcing delete abort",
            Self::UploadPart => "forcing upload abort",
        }
    }
}

// ---------------------------------------------------------------------------
// FaultInjector
// ---------------------------------------------------------------------------

/// Decides whether the next store call at an injection point fails.
pub trait FaultInjector: Send + Sync {
    /// Called before the store call identified by `point` and `token`.
    /// Returning an error aborts the call before it reaches the store.
    fn check(&self, point: InjectionPoint, token: &str) -> CloudHaulResult<()>;
}

/// Injector that never fires. The production default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn check(&self, _point: InjectionPoint, _token: &str) -> CloudHaulResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AbortCounters
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CounterState {
    default_count: i32,
    use_global: bool,
    counters: HashMap<String, i32>,
}

/// Per-token countdown of failures still to inject.
///
/// A token's counter is seeded from the configured default on its first
/// use and counts down to zero; while it is positive the call fails.
#[derive(Debug, Default)]
pub struct AbortCounters {
    state: Mutex<CounterState>,
}

impl AbortCounters {
    /// Create counters that never fire.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure count new tokens are seeded with.
    pub fn set_injection_counter(&self, count: i32) {
        self.state.lock().default_count = count;
    }

    /// Forget every seeded token.
    pub fn clear_injection_counters(&self) {
        self.state.lock().counters.clear();
    }

    /// Collapse all tokens into a single shared counter (or undo that).
    /// Returns the previous setting.
    pub fn use_global_counter(&self, enabled: bool) -> bool {
        let mut state = self.state.lock();
        std::mem::replace(&mut state.use_global, enabled)
    }

    /// Count down the counter for `token`, seeding it on first use, and
    /// return its value before the decrement.
    pub fn decrement(&self, token: &str) -> i32 {
        let mut state = self.state.lock();
        let key = if state.use_global {
            String::new()
        } else {
            token.to_owned()
        };
        let default_count = state.default_count;
        let counter = state.counters.entry(key).or_insert(default_count);
        let previous = *counter;
        if previous > 0 {
            *counter -= 1;
        }
        previous
    }
}

// ---------------------------------------------------------------------------
// AbortInjector
// ---------------------------------------------------------------------------

/// [`FaultInjector`] driven by per-point [`AbortCounters`].
#[derive(Debug, Default)]
pub struct AbortInjector {
    copy: AbortCounters,
    delete: AbortCounters,
    upload: AbortCounters,
}

impl AbortInjector {
    /// Create an injector with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The counters controlling `point`.
    #[must_use]
    pub fn counters(&self, point: InjectionPoint) -> &AbortCounters {
        match point {
            InjectionPoint::Copy => &self.copy,
            InjectionPoint::Delete => &self.delete,
            InjectionPoint::UploadPart => &self.upload,
        }
    }
}

impl FaultInjector for AbortInjector {
    fn check(&self, point: InjectionPoint, token: &str) -> CloudHaulResult<()> {
        let previous = self.counters(point).decrement(token);
        if previous > 0 {
            debug!(?point, token, remaining = previous - 1, "injecting abort");
            return Err(CloudHaulError::AbortInjected {
                message: point.abort_message().to_owned(),
            });
        }
        Ok(())
    }
}
