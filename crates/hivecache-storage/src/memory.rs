//! In-memory storage backend.
//!
//! Holds the accounts table, the follow edges, and the latest cache row per
//! account in RAM. Useful for tests and short-lived tools.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use hivecache_core::error::AccountsError;
use hivecache_core::store::{AccountStore, FollowSide};
use hivecache_core::types::CacheRow;

/// A stored account row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAccount {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    /// Latest cache projection, `None` until the first refresh.
    pub cache: Option<CacheRow>,
}

#[derive(Default)]
struct Tables {
    accounts: BTreeMap<String, StoredAccount>,
    follows: Vec<(String, String)>,
    next_id: i64,
}

/// In-memory account store.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    /// Row counts of every successful `batch_update`, in order.
    batches: Mutex<Vec<usize>>,
    /// Index of the `batch_update` call that should fail, if any.
    fail_batch: Mutex<Option<usize>>,
    /// Total `batch_update` calls, including failed ones.
    batch_calls: Mutex<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an account directly, bypassing registration. Returns its id.
    pub fn insert_account(&self, name: &str, created_at: DateTime<Utc>) -> i64 {
        let mut t = self.tables.lock().unwrap();
        if let Some(existing) = t.accounts.get(name) {
            return existing.id;
        }
        t.next_id += 1;
        let id = t.next_id;
        t.accounts.insert(
            name.to_string(),
            StoredAccount {
                id,
                created_at,
                cache: None,
            },
        );
        id
    }

    /// Record a `follower → following` edge.
    pub fn insert_follow(&self, follower: &str, following: &str) {
        self.tables
            .lock()
            .unwrap()
            .follows
            .push((follower.to_string(), following.to_string()));
    }

    /// Look up a stored account.
    pub fn account(&self, name: &str) -> Option<StoredAccount> {
        self.tables.lock().unwrap().accounts.get(name).cloned()
    }

    /// Latest cache row of `name`.
    pub fn cache_row(&self, name: &str) -> Option<CacheRow> {
        self.account(name).and_then(|a| a.cache)
    }

    /// Every cache row, ordered by account name.
    pub fn cache_rows(&self) -> Vec<CacheRow> {
        self.tables
            .lock()
            .unwrap()
            .accounts
            .values()
            .filter_map(|a| a.cache.clone())
            .collect()
    }

    /// Total number of accounts.
    pub fn account_count(&self) -> usize {
        self.tables.lock().unwrap().accounts.len()
    }

    /// Row counts of the successful batch submissions so far.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    /// Make the `n`-th (zero-based) `batch_update` call fail.
    pub fn fail_batch(&self, n: usize) {
        *self.fail_batch.lock().unwrap() = Some(n);
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn load_ids(&self) -> Result<Vec<(String, i64)>, AccountsError> {
        let t = self.tables.lock().unwrap();
        Ok(t.accounts.iter().map(|(n, a)| (n.clone(), a.id)).collect())
    }

    async fn all_names(&self) -> Result<Vec<String>, AccountsError> {
        Ok(self.tables.lock().unwrap().accounts.keys().cloned().collect())
    }

    async fn insert_accounts(
        &self,
        names: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<(), AccountsError> {
        let mut t = self.tables.lock().unwrap();
        if let Some(dup) = names.iter().find(|n| t.accounts.contains_key(*n)) {
            return Err(AccountsError::Storage(format!(
                "duplicate key value violates unique constraint: name={dup}"
            )));
        }
        for name in names {
            t.next_id += 1;
            let id = t.next_id;
            t.accounts.insert(
                name.clone(),
                StoredAccount {
                    id,
                    created_at,
                    cache: None,
                },
            );
        }
        Ok(())
    }

    async fn ids_for(&self, names: &[String]) -> Result<Vec<(String, i64)>, AccountsError> {
        let t = self.tables.lock().unwrap();
        Ok(names
            .iter()
            .filter_map(|n| t.accounts.get(n).map(|a| (n.clone(), a.id)))
            .collect())
    }

    async fn follow_counts(
        &self,
        side: FollowSide,
        names: &[String],
    ) -> Result<Vec<(String, i64)>, AccountsError> {
        let t = self.tables.lock().unwrap();
        let mut counts: HashMap<&str, i64> = names.iter().map(|n| (n.as_str(), 0)).collect();
        for (follower, following) in &t.follows {
            let key = match side {
                FollowSide::Follower => follower,
                FollowSide::Following => following,
            };
            if let Some(c) = counts.get_mut(key.as_str()) {
                *c += 1;
            }
        }
        // GROUP BY only yields names that have edges
        Ok(counts
            .into_iter()
            .filter(|(_, c)| *c > 0)
            .map(|(n, c)| (n.to_string(), c))
            .collect())
    }

    async fn batch_update(&self, rows: &[CacheRow]) -> Result<(), AccountsError> {
        let call = {
            let mut calls = self.batch_calls.lock().unwrap();
            let call = *calls;
            *calls += 1;
            call
        };
        if *self.fail_batch.lock().unwrap() == Some(call) {
            return Err(AccountsError::Storage(format!("injected failure on batch {call}")));
        }

        let mut t = self.tables.lock().unwrap();
        for row in rows {
            // UPDATE ... WHERE name = ? touches nothing for unknown names
            if let Some(account) = t.accounts.get_mut(&row.name) {
                account.cache = Some(row.clone());
            }
        }
        self.batches.lock().unwrap().push(rows.len());
        Ok(())
    }
}
