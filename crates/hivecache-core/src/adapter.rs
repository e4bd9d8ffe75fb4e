//! Chain adapter trait: the source of raw account state.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::AccountsError;
use crate::types::AccountRecord;

/// Fetches raw account records from the chain.
///
/// Called once per chunk with every name of the chunk.
#[async_trait]
pub trait AccountAdapter: Send + Sync {
    async fn get_accounts(&self, names: &[String]) -> Result<Vec<AccountRecord>, AccountsError>;
}

// ─── In-memory adapter (for testing) ──────────────────────────────────────────

/// Serves account records from memory. Used in tests and for replaying
/// captured node responses.
#[derive(Default)]
pub struct StaticAdapter {
    records: RwLock<HashMap<String, AccountRecord>>,
}

impl StaticAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an adapter from a set of records.
    pub fn with_records(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        let adapter = Self::new();
        for record in records {
            adapter.upsert(record);
        }
        adapter
    }

    /// Insert or replace the record for `record.name`.
    pub fn upsert(&self, record: AccountRecord) {
        self.records
            .write()
            .unwrap()
            .insert(record.name.clone(), record);
    }
}

#[async_trait]
impl AccountAdapter for StaticAdapter {
    async fn get_accounts(&self, names: &[String]) -> Result<Vec<AccountRecord>, AccountsError> {
        let records = self.records.read().unwrap();
        Ok(names.iter().filter_map(|n| records.get(n).cloned()).collect())
    }
}
