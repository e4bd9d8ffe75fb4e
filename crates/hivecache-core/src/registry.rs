//! Account registry: the name → id map and the dirty set.
//!
//! One registry is created per process and shared (behind an `Arc`) by
//! every component that registers, looks up, or dirties accounts.
//!
//! # Lifecycle
//! 1. [`AccountRegistry::load_ids`] exactly once at startup.
//! 2. [`AccountRegistry::register`] as new names appear; ids are only ever
//!    appended, never reassigned or removed.
//! 3. [`AccountRegistry::dirty`] to queue an account for a cache refresh;
//!    the pipeline drains the queue with [`AccountRegistry::take_dirty`].

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::AccountsError;
use crate::store::AccountStore;

/// Process-wide account identity map plus the set of accounts awaiting refresh.
pub struct AccountRegistry {
    store: Arc<dyn AccountStore>,
    ids: RwLock<HashMap<String, i64>>,
    loaded: AtomicBool,
    dirty: Mutex<HashSet<String>>,
    /// Serializes `register` so overlapping calls never insert the same name twice.
    register_lock: tokio::sync::Mutex<()>,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self {
            store,
            ids: RwLock::new(HashMap::new()),
            loaded: AtomicBool::new(false),
            dirty: Mutex::new(HashSet::new()),
            register_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Populate the id map from the store in one bulk read.
    ///
    /// A failed read leaves the map empty and may be retried.
    ///
    /// # Panics
    /// If called again after a successful load. The map is extended by
    /// `register`, never reloaded.
    pub async fn load_ids(&self) -> Result<(), AccountsError> {
        let already = self.loaded.swap(true, Ordering::SeqCst);
        assert!(!already, "id map only needs to be loaded once");

        let rows = match self.store.load_ids().await {
            Ok(rows) => rows,
            Err(e) => {
                self.loaded.store(false, Ordering::SeqCst);
                warn!(error = %e, "account id load failed");
                return Err(e);
            }
        };
        let mut ids = self.ids.write().unwrap();
        ids.extend(rows);
        info!(accounts = ids.len(), "account ids loaded");
        Ok(())
    }

    /// Id of a registered account.
    ///
    /// # Panics
    /// If `name` was never registered.
    pub fn get_id(&self, name: &str) -> i64 {
        match self.try_get_id(name) {
            Some(id) => id,
            None => panic!("account '{name}' does not exist or was not registered"),
        }
    }

    /// Id of `name`, or `None` when it is not registered.
    pub fn try_get_id(&self, name: &str) -> Option<i64> {
        self.ids.read().unwrap().get(name).copied()
    }

    /// Returns `true` if `name` is registered.
    pub fn exists(&self, name: &str) -> bool {
        self.ids.read().unwrap().contains_key(name)
    }

    /// Number of registered accounts.
    pub fn len(&self) -> usize {
        self.ids.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register every name that is not yet known, created at `as_of`.
    ///
    /// Duplicates in `names` are fine. Only the new names are inserted, and
    /// only their ids are fetched back. Returns how many were registered.
    ///
    /// Names that are already stored but missing from the map (an earlier
    /// call inserted them and then failed to fetch their ids) are adopted
    /// with their stored ids instead of being inserted again.
    pub async fn register<I, S>(&self, names: I, as_of: DateTime<Utc>) -> Result<usize, AccountsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _guard = self.register_lock.lock().await;

        let new_names: Vec<String> = {
            let ids = self.ids.read().unwrap();
            names
                .into_iter()
                .map(Into::into)
                .filter(|n| !ids.contains_key(n))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        };
        if new_names.is_empty() {
            return Ok(0);
        }

        let registered = new_names.len();
        let mut pending = new_names;
        if let Err(e) = self.store.insert_accounts(&pending, as_of).await {
            let stored = match self.store.ids_for(&pending).await {
                Ok(stored) if !stored.is_empty() => stored,
                _ => return Err(e),
            };
            warn!(adopted = stored.len(), error = %e, "names already stored, adopting their ids");
            self.merge_ids(stored);
            pending.retain(|n| !self.exists(n));
            self.store.insert_accounts(&pending, as_of).await?;
        }
        let assigned = self.store.ids_for(&pending).await?;
        let total = self.merge_ids(assigned);

        debug!(registered, total, "accounts registered");
        Ok(registered)
    }

    /// Add `(name, id)` pairs to the map and return its new size.
    fn merge_ids(&self, pairs: Vec<(String, i64)>) -> usize {
        let mut ids = self.ids.write().unwrap();
        for (name, id) in pairs {
            // existing entries win; ids are never reassigned
            ids.entry(name).or_insert(id);
        }
        ids.len()
    }

    /// Queue `name` for a cache refresh.
    pub fn dirty(&self, name: impl Into<String>) {
        self.dirty.lock().unwrap().insert(name.into());
    }

    /// Queue several names for a cache refresh.
    pub fn dirty_all<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dirty
            .lock()
            .unwrap()
            .extend(names.into_iter().map(Into::into));
    }

    /// Number of accounts awaiting refresh.
    pub fn dirty_count(&self) -> usize {
        self.dirty.lock().unwrap().len()
    }

    /// Snapshot and clear the dirty set in one step, sorted by name.
    ///
    /// Names dirtied after this call stay queued for the next drain.
    pub fn take_dirty(&self) -> Vec<String> {
        let taken = std::mem::take(&mut *self.dirty.lock().unwrap());
        let mut names: Vec<String> = taken.into_iter().collect();
        names.sort_unstable();
        names
    }
}
