//! Per-chunk throughput reporting.

use std::fmt;
use std::time::Duration;

/// Shortest elapsed time used for rate math, so an instant chunk does not divide by zero.
const MIN_ELAPSED: Duration = Duration::from_micros(1);

/// Timing of one processed chunk, plus the running totals of its run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkProgress {
    /// Accounts processed so far in this run, including this chunk.
    pub processed: usize,
    /// Accounts in the whole run.
    pub total: usize,
    /// Accounts in this chunk.
    pub chunk_len: usize,
    /// Wall time of this chunk: build plus store submission.
    pub chunk_elapsed: Duration,
    /// Wall time spent in the store submission alone.
    pub db_elapsed: Duration,
}

impl ChunkProgress {
    /// Accounts per second over the whole chunk.
    pub fn rate(&self) -> f64 {
        self.chunk_len as f64 / self.chunk_elapsed.max(MIN_ELAPSED).as_secs_f64()
    }

    /// Share of the chunk's wall time spent in the store, as a whole percentage.
    pub fn db_percent(&self) -> u32 {
        let total = self.chunk_elapsed.max(MIN_ELAPSED).as_secs_f64();
        let pct = 100.0 * self.db_elapsed.as_secs_f64() / total;
        pct.clamp(0.0, 100.0) as u32
    }

    /// Estimated minutes until the run completes at the current rate.
    pub fn eta_minutes(&self) -> f64 {
        let remaining = self.total.saturating_sub(self.processed) as f64;
        let rate = self.rate();
        if rate > 0.0 {
            remaining / rate / 60.0
        } else {
            0.0
        }
    }
}

impl fmt::Display for ChunkProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " -- {} of {} ({:.1}/s, {}% db) -- {:.2}m remaining",
            self.processed,
            self.total,
            self.rate(),
            self.db_percent(),
            self.eta_minutes()
        )
    }
}

/// Summary of a completed cache run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheRunStats {
    /// Accounts handed to the builder.
    pub processed: usize,
    /// Accounts in the run after de-duplication.
    pub total: usize,
    /// Store submissions issued.
    pub batches: usize,
    /// Wall time of the whole run.
    pub elapsed: Duration,
}
