//! Cache row builder: joins adapter records, follow stats, and sanitized
//! metadata into one [`CacheRow`] per account.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::adapter::AccountAdapter;
use crate::error::AccountsError;
use crate::follows::{FollowCounts, FollowStatsAggregator};
use crate::metadata::sanitize;
use crate::normalize::{kb_used, rep_log10};
use crate::types::{AccountRecord, CacheRow};

/// Builds cache rows for a chunk of accounts.
#[derive(Clone)]
pub struct CacheRowBuilder {
    adapter: Arc<dyn AccountAdapter>,
    follows: FollowStatsAggregator,
}

impl CacheRowBuilder {
    pub fn new(adapter: Arc<dyn AccountAdapter>, follows: FollowStatsAggregator) -> Self {
        Self { adapter, follows }
    }

    /// Build rows for `names` with one adapter call and one follow-stats pass.
    ///
    /// Accounts the adapter does not return are skipped. Any error fails the
    /// whole chunk.
    pub async fn build(&self, names: &[String]) -> Result<Vec<CacheRow>, AccountsError> {
        let (records, stats) = futures::try_join!(
            self.adapter.get_accounts(names),
            self.follows.stats(names),
        )?;

        if records.len() < names.len() {
            let returned: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();
            let missing: Vec<&str> = names
                .iter()
                .map(String::as_str)
                .filter(|n| !returned.contains(n))
                .collect();
            warn!(count = missing.len(), ?missing, "adapter did not return some accounts");
        }

        records
            .into_iter()
            .map(|record| {
                let counts = stats.get(&record.name).ok_or_else(|| {
                    AccountsError::UnexpectedAccount {
                        name: record.name.clone(),
                    }
                })?;
                build_row(record, counts)
            })
            .collect()
    }
}

/// Build a single cache row.
pub fn build_row(record: AccountRecord, counts: FollowCounts) -> Result<CacheRow, AccountsError> {
    let vests = record.vesting_shares.value()?;
    let profile = sanitize(&record.json_metadata);
    Ok(CacheRow {
        reputation: rep_log10(record.reputation),
        followers: counts.followers,
        following: counts.following,
        proxy_weight: vests,
        vote_weight: vests,
        kb_used: kb_used(record.lifetime_bandwidth),
        profile,
        name: record.name,
        proxy: record.proxy,
        post_count: record.post_count,
    })
}
