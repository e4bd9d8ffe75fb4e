//! Follow-stats aggregation for a chunk of accounts.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AccountsError;
use crate::store::{AccountStore, FollowSide};

/// Follower and following counts of one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowCounts {
    pub followers: i64,
    pub following: i64,
}

/// Follow counts keyed by account name.
///
/// Produced by [`FollowStatsAggregator::stats`], which covers every requested
/// name, including names with no edges at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowStats {
    counts: HashMap<String, FollowCounts>,
}

impl FollowStats {
    /// Counts for `name`, or `None` if it was not part of the request.
    pub fn get(&self, name: &str) -> Option<FollowCounts> {
        self.counts.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FollowCounts)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Computes follower/following counts with two grouped queries per call.
#[derive(Clone)]
pub struct FollowStatsAggregator {
    store: Arc<dyn AccountStore>,
}

impl FollowStatsAggregator {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Counts for every name in `names`; names without edges get zero.
    pub async fn stats(&self, names: &[String]) -> Result<FollowStats, AccountsError> {
        let following = self.store.follow_counts(FollowSide::Follower, names).await?;
        let followers = self.store.follow_counts(FollowSide::Following, names).await?;
        Ok(merge(names, following, followers))
    }
}

fn merge(
    names: &[String],
    following: Vec<(String, i64)>,
    followers: Vec<(String, i64)>,
) -> FollowStats {
    let mut counts: HashMap<String, FollowCounts> = names
        .iter()
        .map(|n| (n.clone(), FollowCounts::default()))
        .collect();

    // Only requested names are kept, whatever the store returns.
    for (name, n) in following {
        if let Some(c) = counts.get_mut(&name) {
            c.following = n;
        }
    }
    for (name, n) in followers {
        if let Some(c) = counts.get_mut(&name) {
            c.followers = n;
        }
    }
    FollowStats { counts }
}
