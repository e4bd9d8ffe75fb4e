//! The batch cache pipeline: refreshes cache rows chunk by chunk.
//!
//! # Per chunk
//! 1. Build rows: one adapter call + two grouped follow-count queries.
//! 2. Submit every row of the chunk as one store transaction.
//! 3. Log a progress line.
//!
//! Chunks run sequentially. A failed chunk stops the run; chunks committed
//! before it stay committed. Rows are overwritten wholesale, so re-running
//! after a failure is safe.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::adapter::AccountAdapter;
use crate::builder::CacheRowBuilder;
use crate::config::CacheConfig;
use crate::error::AccountsError;
use crate::follows::FollowStatsAggregator;
use crate::progress::{CacheRunStats, ChunkProgress};
use crate::registry::AccountRegistry;
use crate::store::AccountStore;

/// Drives cache refreshes for arbitrary account sets.
pub struct CachePipeline {
    store: Arc<dyn AccountStore>,
    builder: CacheRowBuilder,
    config: CacheConfig,
}

impl CachePipeline {
    pub fn new(
        store: Arc<dyn AccountStore>,
        adapter: Arc<dyn AccountAdapter>,
        config: CacheConfig,
    ) -> Self {
        let follows = FollowStatsAggregator::new(store.clone());
        Self {
            builder: CacheRowBuilder::new(adapter, follows),
            store,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Refresh every account in the store.
    pub async fn cache_all(&self) -> Result<CacheRunStats, AccountsError> {
        let names = self.store.all_names().await?;
        info!(accounts = names.len(), "caching all accounts");
        self.cache_accounts(&names).await
    }

    /// Refresh the accounts currently marked dirty in `registry`.
    ///
    /// The dirty set is drained once, up front. Names dirtied while the run
    /// is in progress wait for the next call. If the run fails, every name of
    /// the snapshot that was not committed is marked dirty again.
    pub async fn cache_dirty(&self, registry: &AccountRegistry) -> Result<CacheRunStats, AccountsError> {
        let names = registry.take_dirty();
        if names.is_empty() {
            return Ok(CacheRunStats::default());
        }
        match self.cache_accounts(&names).await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                // `names` is sorted and unique, so the committed prefix lines up.
                let committed = e.committed().min(names.len());
                let pending = &names[committed..];
                warn!(requeued = pending.len(), error = %e, "dirty cache run failed");
                registry.dirty_all(pending.iter().cloned());
                Err(e)
            }
        }
    }

    /// Refresh `names` in fixed-size chunks.
    ///
    /// Duplicate names are refreshed once. Each chunk is submitted as a
    /// single batch; the first failure is returned as
    /// [`AccountsError::ChunkFailed`].
    pub async fn cache_accounts(&self, names: &[String]) -> Result<CacheRunStats, AccountsError> {
        let names = dedup(names);
        let total = names.len();
        let chunk_size = self.config.effective_chunk_size();
        let run_start = Instant::now();

        let mut processed = 0usize;
        let mut batches = 0usize;

        for (index, chunk) in names.chunks(chunk_size).enumerate() {
            let lap_0 = Instant::now();
            let rows = self
                .builder
                .build(chunk)
                .await
                .map_err(|e| chunk_failed(index, processed, e))?;
            let lap_1 = Instant::now();
            self.store
                .batch_update(&rows)
                .await
                .map_err(|e| chunk_failed(index, processed, e))?;
            let lap_2 = Instant::now();

            batches += 1;
            processed += chunk.len();

            let progress = ChunkProgress {
                processed,
                total,
                chunk_len: chunk.len(),
                chunk_elapsed: lap_2 - lap_0,
                db_elapsed: lap_2 - lap_1,
            };
            if self.config.log_progress {
                info!(
                    processed,
                    total,
                    rows = rows.len(),
                    rate = progress.rate(),
                    db_pct = progress.db_percent(),
                    "{progress}"
                );
            }
        }

        Ok(CacheRunStats {
            processed,
            total,
            batches,
            elapsed: run_start.elapsed(),
        })
    }
}

fn chunk_failed(chunk: usize, committed: usize, source: AccountsError) -> AccountsError {
    warn!(chunk, committed, error = %source, "cache chunk failed");
    AccountsError::ChunkFailed {
        chunk,
        committed,
        source: Box::new(source),
    }
}

/// Drop repeated names, keeping first occurrences in order.
fn dedup(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(names.len());
    names
        .iter()
        .filter(|n| seen.insert(n.as_str()))
        .cloned()
        .collect()
}
