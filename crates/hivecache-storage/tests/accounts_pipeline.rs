//! End-to-end tests: registry, follow stats, row building, and the batch
//! pipeline against the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hivecache_core::{
    AccountAdapter, AccountRecord, AccountRegistry, AccountStore, AccountsError, AssetAmount,
    CacheConfig, CachePipeline, CacheRow, FollowCounts, FollowSide, FollowStatsAggregator,
    ProfileMetadata, StaticAdapter,
};
use hivecache_storage::InMemoryStore;

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 3, 24, 16, 5, 0).unwrap()
}

fn record(name: &str, i: i64) -> AccountRecord {
    AccountRecord {
        name: name.to_string(),
        proxy: String::new(),
        post_count: i,
        reputation: 1_000_000_000 * (i + 1),
        vesting_shares: AssetAmount::legacy(format!("{i}.000000 VESTS")),
        lifetime_bandwidth: 1_024_000_000 * i,
        json_metadata: serde_json::json!({"profile": {"name": format!("User {i}")}}).to_string(),
    }
}

fn account_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("user{i:05}")).collect()
}

/// Store + adapter pre-populated with `n` accounts.
fn fixture(n: usize) -> (Arc<InMemoryStore>, Arc<StaticAdapter>, Vec<String>) {
    let store = Arc::new(InMemoryStore::new());
    let names = account_names(n);
    let adapter = StaticAdapter::new();
    for (i, name) in names.iter().enumerate() {
        store.insert_account(name, t0());
        adapter.upsert(record(name, i as i64));
    }
    (store, Arc::new(adapter), names)
}

fn pipeline(store: &Arc<InMemoryStore>, adapter: Arc<dyn AccountAdapter>) -> CachePipeline {
    CachePipeline::new(store.clone(), adapter, CacheConfig::default())
}

/// Wraps an [`InMemoryStore`] and fails the next `load_ids` or `ids_for`
/// call on request, like a dropped connection would.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    fail_load: AtomicBool,
    fail_ids_for: AtomicBool,
}

fn connection_reset() -> AccountsError {
    AccountsError::Storage("connection reset".into())
}

#[async_trait]
impl AccountStore for FlakyStore {
    async fn load_ids(&self) -> Result<Vec<(String, i64)>, AccountsError> {
        if self.fail_load.swap(false, Ordering::SeqCst) {
            return Err(connection_reset());
        }
        self.inner.load_ids().await
    }

    async fn all_names(&self) -> Result<Vec<String>, AccountsError> {
        self.inner.all_names().await
    }

    async fn insert_accounts(&self, names: &[String], created_at: DateTime<Utc>) -> Result<(), AccountsError> {
        self.inner.insert_accounts(names, created_at).await
    }

    async fn ids_for(&self, names: &[String]) -> Result<Vec<(String, i64)>, AccountsError> {
        if self.fail_ids_for.swap(false, Ordering::SeqCst) {
            return Err(connection_reset());
        }
        self.inner.ids_for(names).await
    }

    async fn follow_counts(&self, side: FollowSide, names: &[String]) -> Result<Vec<(String, i64)>, AccountsError> {
        self.inner.follow_counts(side, names).await
    }

    async fn batch_update(&self, rows: &[CacheRow]) -> Result<(), AccountsError> {
        self.inner.batch_update(rows).await
    }
}

// ─── Registry ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_dedups_and_keeps_ids() {
    let store = Arc::new(InMemoryStore::new());
    let registry = AccountRegistry::new(store.clone());
    registry.load_ids().await.unwrap();

    let added = registry.register(["a", "a", "b"], t0()).await.unwrap();
    assert_eq!(added, 2);
    let a_id = registry.get_id("a");

    // a second insert of "a" would be rejected by the store
    let added = registry.register(["a", "c"], t0()).await.unwrap();
    assert_eq!(added, 1);

    assert_eq!(registry.len(), 3);
    assert_eq!(store.account_count(), 3);
    assert_eq!(registry.get_id("a"), a_id);
    assert!(registry.exists("b"));
    assert!(registry.exists("c"));
    assert!(!registry.exists("d"));
}

#[tokio::test]
async fn register_all_known_is_noop() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_account("alice", t0());
    let registry = AccountRegistry::new(store.clone());
    registry.load_ids().await.unwrap();

    assert_eq!(registry.register(["alice"], t0()).await.unwrap(), 0);
    assert_eq!(store.account_count(), 1);
}

#[tokio::test]
async fn register_records_creation_time() {
    let store = Arc::new(InMemoryStore::new());
    let registry = AccountRegistry::new(store.clone());
    registry.load_ids().await.unwrap();

    let created = Utc.with_ymd_and_hms(2020, 3, 20, 14, 0, 0).unwrap();
    registry.register(["alice"], created).await.unwrap();
    assert_eq!(store.account("alice").unwrap().created_at, created);
    assert_eq!(store.account("alice").unwrap().id, registry.get_id("alice"));
}

#[tokio::test]
async fn load_ids_reads_existing_accounts() {
    let (store, _, names) = fixture(5);
    let registry = AccountRegistry::new(store.clone());
    registry.load_ids().await.unwrap();

    assert_eq!(registry.len(), 5);
    for name in &names {
        assert_eq!(Some(registry.get_id(name)), store.account(name).map(|a| a.id));
    }
}

#[tokio::test]
#[should_panic(expected = "id map only needs to be loaded once")]
async fn load_ids_twice_panics() {
    let registry = AccountRegistry::new(Arc::new(InMemoryStore::new()));
    registry.load_ids().await.unwrap();
    registry.load_ids().await.unwrap();
}

#[tokio::test]
async fn failed_load_can_be_retried() {
    let store = Arc::new(FlakyStore::default());
    store.inner.insert_account("alice", t0());
    store.fail_load.store(true, Ordering::SeqCst);
    let registry = AccountRegistry::new(store.clone());

    let err = registry.load_ids().await.unwrap_err();
    assert!(matches!(err, AccountsError::Storage(_)));
    assert!(registry.is_empty());

    registry.load_ids().await.unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.exists("alice"));
}

#[tokio::test]
async fn register_recovers_names_stored_by_a_failed_call() {
    let store = Arc::new(FlakyStore::default());
    let registry = AccountRegistry::new(store.clone());
    registry.load_ids().await.unwrap();

    store.fail_ids_for.store(true, Ordering::SeqCst);
    assert!(registry.register(["alice", "bob"], t0()).await.is_err());
    // the rows landed, the map did not
    assert_eq!(store.inner.account_count(), 2);
    assert!(!registry.exists("alice"));

    let added = registry.register(["alice", "bob", "carol"], t0()).await.unwrap();
    assert_eq!(added, 3);
    assert_eq!(store.inner.account_count(), 3);
    for name in ["alice", "bob", "carol"] {
        assert_eq!(Some(registry.get_id(name)), store.inner.account(name).map(|a| a.id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_registrations_insert_each_name_once() {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(AccountRegistry::new(store.clone()));
    registry.load_ids().await.unwrap();

    let left: Vec<String> = (0..200).map(|i| format!("acct{i:03}")).collect();
    let right: Vec<String> = (100..300).map(|i| format!("acct{i:03}")).collect();

    let (r1, r2) = {
        let (a, b) = (registry.clone(), registry.clone());
        tokio::join!(
            tokio::spawn(async move { a.register(left, t0()).await }),
            tokio::spawn(async move { b.register(right, t0()).await }),
        )
    };
    let added = r1.unwrap().unwrap() + r2.unwrap().unwrap();

    assert_eq!(added, 300);
    assert_eq!(registry.len(), 300);
    assert_eq!(store.account_count(), 300);

    let ids: Vec<i64> = (0..300).map(|i| registry.get_id(&format!("acct{i:03}"))).collect();
    let unique: std::collections::HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 300);
    for i in 0..300 {
        let name = format!("acct{i:03}");
        assert_eq!(Some(registry.get_id(&name)), store.account(&name).map(|a| a.id));
    }

    // a later overlapping call is a no-op and keeps every id
    assert_eq!(registry.register(["acct000", "acct299"], t0()).await.unwrap(), 0);
    assert_eq!(registry.get_id("acct000"), ids[0]);
}

#[tokio::test]
#[should_panic(expected = "does not exist or was not registered")]
async fn get_id_of_unknown_account_panics() {
    let registry = AccountRegistry::new(Arc::new(InMemoryStore::new()));
    registry.load_ids().await.unwrap();
    registry.get_id("ghost");
}

#[test]
fn dirty_is_a_set() {
    let registry = AccountRegistry::new(Arc::new(InMemoryStore::new()));
    registry.dirty("bob");
    registry.dirty("alice");
    registry.dirty("bob");
    assert_eq!(registry.dirty_count(), 2);
    assert_eq!(registry.take_dirty(), ["alice", "bob"]);
    assert_eq!(registry.dirty_count(), 0);
}

// ─── Follow stats ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn follow_stats_cover_every_requested_name() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_follow("alice", "bob");
    store.insert_follow("alice", "carol");
    store.insert_follow("carol", "bob");
    store.insert_follow("dave", "erin"); // outside the request

    let names: Vec<String> = ["alice", "bob", "carol", "loner"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let stats = FollowStatsAggregator::new(store.clone())
        .stats(&names)
        .await
        .unwrap();

    assert_eq!(stats.len(), names.len());
    assert_eq!(stats.get("alice"), Some(FollowCounts { followers: 0, following: 2 }));
    assert_eq!(stats.get("bob"), Some(FollowCounts { followers: 2, following: 0 }));
    assert_eq!(stats.get("carol"), Some(FollowCounts { followers: 1, following: 1 }));
    assert_eq!(stats.get("loner"), Some(FollowCounts::default()));
    assert!(stats.iter().all(|(_, c)| c.followers >= 0 && c.following >= 0));
}

// ─── Pipeline ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chunks_are_at_most_one_thousand() {
    let (store, adapter, names) = fixture(2500);
    let stats = pipeline(&store, adapter).cache_accounts(&names).await.unwrap();

    assert_eq!(stats.batches, 3);
    assert_eq!(stats.processed, 2500);
    assert_eq!(stats.total, 2500);
    assert_eq!(store.batch_sizes(), vec![1000, 1000, 500]);
}

#[tokio::test]
async fn exact_multiple_has_no_empty_tail() {
    let (store, adapter, names) = fixture(2000);
    let stats = pipeline(&store, adapter).cache_accounts(&names).await.unwrap();
    assert_eq!(stats.batches, 2);
    assert_eq!(store.batch_sizes(), vec![1000, 1000]);
}

#[tokio::test]
async fn empty_input_issues_no_batches() {
    let (store, adapter, _) = fixture(3);
    let stats = pipeline(&store, adapter).cache_accounts(&[]).await.unwrap();
    assert_eq!(stats.batches, 0);
    assert!(store.batch_sizes().is_empty());
}

#[tokio::test]
async fn duplicate_names_are_cached_once() {
    let (store, adapter, names) = fixture(3);
    let mut input = names.clone();
    input.extend(names.iter().cloned());
    let stats = pipeline(&store, adapter).cache_accounts(&input).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(store.batch_sizes(), vec![3]);
}

#[tokio::test]
async fn cache_rows_combine_all_sources() {
    let (store, adapter, names) = fixture(3);
    store.insert_follow(&names[0], &names[1]);
    store.insert_follow(&names[2], &names[1]);

    pipeline(&store, adapter).cache_accounts(&names).await.unwrap();

    let row = store.cache_row(&names[1]).unwrap();
    assert_eq!(row.post_count, 1);
    assert_eq!(row.followers, 2);
    assert_eq!(row.following, 0);
    assert_eq!(row.proxy_weight, 1.0);
    assert_eq!(row.vote_weight, 1.0);
    assert_eq!(row.kb_used, 1.0);
    assert_eq!(row.reputation, 27.71);
    assert_eq!(row.profile.display_name, "User 1");

    let row = store.cache_row(&names[0]).unwrap();
    assert_eq!(row.following, 1);
    assert_eq!(row.followers, 0);
}

#[tokio::test]
async fn refresh_is_idempotent() {
    let (store, adapter, names) = fixture(1200);
    store.insert_follow(&names[0], &names[1]);
    let p = pipeline(&store, adapter);

    p.cache_accounts(&names).await.unwrap();
    let first = store.cache_rows();
    p.cache_accounts(&names).await.unwrap();
    let second = store.cache_rows();

    assert_eq!(first.len(), 1200);
    assert_eq!(first, second);
}

#[tokio::test]
async fn malformed_metadata_yields_empty_profile() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_account("alice", t0());
    let mut rec = record("alice", 1);
    rec.json_metadata = "{not json".into();
    let adapter = Arc::new(StaticAdapter::with_records([rec]));

    pipeline(&store, adapter)
        .cache_accounts(&["alice".to_string()])
        .await
        .unwrap();
    let row = store.cache_row("alice").unwrap();
    assert_eq!(row.profile, ProfileMetadata::default());
}

#[tokio::test]
async fn accounts_missing_from_adapter_are_skipped() {
    let (store, _, names) = fixture(3);
    let adapter = Arc::new(StaticAdapter::with_records([record(&names[0], 0)]));

    let stats = pipeline(&store, adapter).cache_accounts(&names).await.unwrap();
    assert_eq!(stats.processed, 3);
    assert_eq!(store.batch_sizes(), vec![1]);
    assert!(store.cache_row(&names[0]).is_some());
    assert!(store.cache_row(&names[1]).is_none());
}

struct UnrequestedAdapter;

#[async_trait]
impl AccountAdapter for UnrequestedAdapter {
    async fn get_accounts(&self, _names: &[String]) -> Result<Vec<AccountRecord>, AccountsError> {
        Ok(vec![record("mallory", 0)])
    }
}

#[tokio::test]
async fn unrequested_adapter_record_fails_chunk() {
    let (store, _, names) = fixture(2);
    let err = pipeline(&store, Arc::new(UnrequestedAdapter))
        .cache_accounts(&names)
        .await
        .unwrap_err();
    match err {
        AccountsError::ChunkFailed { chunk, committed, source } => {
            assert_eq!(chunk, 0);
            assert_eq!(committed, 0);
            assert!(matches!(*source, AccountsError::UnexpectedAccount { .. }));
        }
        other => panic!("expected ChunkFailed, got {other:?}"),
    }
    assert!(store.batch_sizes().is_empty());
}

#[tokio::test]
async fn cache_all_refreshes_every_stored_account() {
    let (store, adapter, names) = fixture(1500);
    let stats = pipeline(&store, adapter).cache_all().await.unwrap();
    assert_eq!(stats.processed, 1500);
    assert_eq!(store.batch_sizes(), vec![1000, 500]);
    assert!(names.iter().all(|n| store.cache_row(n).is_some()));
}

// ─── Dirty runs ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn cache_dirty_drains_the_dirty_set() {
    let (store, adapter, names) = fixture(10);
    let registry = AccountRegistry::new(store.clone());
    registry.load_ids().await.unwrap();
    registry.dirty(names[3].clone());
    registry.dirty(names[7].clone());

    let stats = pipeline(&store, adapter).cache_dirty(&registry).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(registry.dirty_count(), 0);
    assert!(store.cache_row(&names[3]).is_some());
    assert!(store.cache_row(&names[0]).is_none());
}

#[tokio::test]
async fn cache_dirty_with_nothing_dirty_does_nothing() {
    let (store, adapter, _) = fixture(3);
    let registry = AccountRegistry::new(store.clone());
    let stats = pipeline(&store, adapter).cache_dirty(&registry).await.unwrap();
    assert_eq!(stats.batches, 0);
    assert!(store.batch_sizes().is_empty());
}

/// Marks an account dirty the first time it is asked for records, standing in
/// for a block processor that runs while a refresh is in flight.
struct DirtyingAdapter {
    inner: StaticAdapter,
    registry: Arc<AccountRegistry>,
    fired: AtomicBool,
}

#[async_trait]
impl AccountAdapter for DirtyingAdapter {
    async fn get_accounts(&self, names: &[String]) -> Result<Vec<AccountRecord>, AccountsError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.registry.dirty("late-arrival");
        }
        self.inner.get_accounts(names).await
    }
}

#[tokio::test]
async fn marks_made_during_a_run_survive_it() {
    let (store, _, names) = fixture(5);
    let registry = Arc::new(AccountRegistry::new(store.clone()));
    registry.load_ids().await.unwrap();
    registry.dirty_all(names.iter().cloned());

    let adapter = Arc::new(DirtyingAdapter {
        inner: StaticAdapter::with_records(names.iter().enumerate().map(|(i, n)| record(n, i as i64))),
        registry: registry.clone(),
        fired: AtomicBool::new(false),
    });

    pipeline(&store, adapter).cache_dirty(&registry).await.unwrap();
    assert_eq!(registry.take_dirty(), ["late-arrival"]);
}

#[tokio::test]
async fn failed_dirty_run_requeues_uncommitted_names() {
    let (store, adapter, names) = fixture(2500);
    let registry = AccountRegistry::new(store.clone());
    registry.load_ids().await.unwrap();
    registry.dirty_all(names.iter().cloned());

    store.fail_batch(1);
    let p = pipeline(&store, adapter);
    let err = p.cache_dirty(&registry).await.unwrap_err();
    assert_eq!(err.committed(), 1000);

    // the first chunk stays committed, the rest is queued again
    assert_eq!(store.batch_sizes(), vec![1000]);
    assert!(store.cache_row(&names[999]).is_some());
    assert!(store.cache_row(&names[1000]).is_none());
    assert_eq!(registry.dirty_count(), 1500);

    // retrying picks up exactly the remainder
    let stats = p.cache_dirty(&registry).await.unwrap();
    assert_eq!(stats.processed, 1500);
    assert_eq!(registry.dirty_count(), 0);
    assert!(names.iter().all(|n| store.cache_row(n).is_some()));
}

#[tokio::test]
async fn registered_then_dirtied_accounts_get_cached() {
    let store = Arc::new(InMemoryStore::new());
    let registry = AccountRegistry::new(store.clone());
    registry.load_ids().await.unwrap();

    registry.register(["alice", "bob"], t0()).await.unwrap();
    registry.dirty("alice");

    let adapter = Arc::new(StaticAdapter::with_records([record("alice", 4), record("bob", 5)]));
    pipeline(&store, adapter).cache_dirty(&registry).await.unwrap();

    assert_eq!(store.cache_row("alice").unwrap().post_count, 4);
    assert!(store.cache_row("bob").is_none());
    assert_eq!(store.all_names().await.unwrap(), ["alice", "bob"]);
}
