//! Storage trait for the accounts table and the follow graph.
//!
//! Implementations live in `hivecache-storage`: `InMemoryStore`,
//! `SqliteStore`, and `PostgresStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AccountsError;
use crate::types::CacheRow;

/// Which side of a `hive_follows` edge to group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FollowSide {
    /// Group by `follower`: how many accounts each name follows.
    Follower,
    /// Group by `following`: how many followers each name has.
    Following,
}

impl FollowSide {
    /// Column name in `hive_follows`.
    pub fn column(self) -> &'static str {
        match self {
            Self::Follower => "follower",
            Self::Following => "following",
        }
    }
}

/// Queries the account cache needs from the database.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Every `(name, id)` pair in the accounts table.
    async fn load_ids(&self) -> Result<Vec<(String, i64)>, AccountsError>;

    /// Every account name, for full rebuilds.
    async fn all_names(&self) -> Result<Vec<String>, AccountsError>;

    /// Insert one row per name with the given creation time.
    ///
    /// Callers only pass names that are not yet present.
    async fn insert_accounts(
        &self,
        names: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<(), AccountsError>;

    /// `(name, id)` pairs for the listed names. Unknown names are omitted.
    async fn ids_for(&self, names: &[String]) -> Result<Vec<(String, i64)>, AccountsError>;

    /// Edge counts grouped by `side`, restricted to `names`.
    ///
    /// Names with no edges are omitted.
    async fn follow_counts(
        &self,
        side: FollowSide,
        names: &[String],
    ) -> Result<Vec<(String, i64)>, AccountsError>;

    /// Overwrite the cache columns of every row in one transaction.
    async fn batch_update(&self, rows: &[CacheRow]) -> Result<(), AccountsError>;
}
