//! Client configuration.
//!
//! All knobs can be set programmatically or through `CLOUDHAUL_*`
//! environment variables. Retry defaults follow the upstream service
//! clients: 50 attempts, client faults not retried.

use crate::chunk;

/// Tunable configuration for a CloudHaul client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Chunk size in bytes for multipart transfers. `0` derives a default
    /// from the file length, bounded by the remote part-count limit.
    pub chunk_size: u64,
    /// Maximum number of retries per remote operation.
    pub retry_count: usize,
    /// Whether caller-attributed (4xx-style) remote faults are retried.
    pub retry_client_faults: bool,
    /// Bound on concurrent remote-store calls.
    pub api_concurrency: usize,
    /// Bound on concurrent orchestration tasks (part fan-out).
    pub internal_concurrency: usize,
    /// First retry delay in milliseconds; doubles per attempt.
    pub retry_initial_delay_ms: u64,
    /// Upper bound on the retry delay in milliseconds.
    pub retry_max_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chunk_size: 0,
            retry_count: 50,
            retry_client_faults: false,
            api_concurrency: 10,
            internal_concurrency: 50,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 10_000,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("CLOUDHAUL_CHUNK_SIZE")
            && let Ok(n) = v.parse()
        {
            config.chunk_size = n;
        }
        if let Ok(v) = std::env::var("CLOUDHAUL_RETRY_COUNT")
            && let Ok(n) = v.parse()
        {
            config.retry_count = n;
        }
        if let Ok(v) = std::env::var("CLOUDHAUL_RETRY_CLIENT_FAULTS") {
            config.retry_client_faults = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("CLOUDHAUL_API_CONCURRENCY")
            && let Ok(n) = v.parse()
        {
            config.api_concurrency = n;
        }
        if let Ok(v) = std::env::var("CLOUDHAUL_INTERNAL_CONCURRENCY")
            && let Ok(n) = v.parse()
        {
            config.internal_concurrency = n;
        }

        config
    }

    /// Resolve the chunk size to use for a file of `file_length` bytes.
    ///
    /// A configured non-zero chunk size wins; otherwise a default is derived
    /// from the file length.
    #[must_use]
    pub fn resolve_chunk_size(&self, file_length: u64) -> u64 {
        if self.chunk_size > 0 {
            self.chunk_size
        } else {
            chunk::default_chunk_size(file_length)
        }
    }
}
