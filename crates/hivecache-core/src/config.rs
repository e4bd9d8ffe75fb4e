//! Cache pipeline configuration.

use serde::{Deserialize, Serialize};

/// Accounts per store submission.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Configuration for a [`CachePipeline`](crate::pipeline::CachePipeline).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Accounts per chunk. Bounds memory and transaction size of one submission.
    pub chunk_size: usize,
    /// Emit the per-chunk progress line at `info` level.
    pub log_progress: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_progress: true,
        }
    }
}

impl CacheConfig {
    /// Set the chunk size. Zero is treated as one.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Enable or disable the per-chunk progress line.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.log_progress = enabled;
        self
    }

    /// Effective chunk size, never zero.
    pub fn effective_chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }
}
