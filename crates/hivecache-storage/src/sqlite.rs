//! SQLite storage backend.
//!
//! Reads and writes `hive_accounts` and `hive_follows` in a single SQLite
//! file. Uses `sqlx` with WAL mode.
//!
//! # Usage
//! ```rust,no_run
//! use hivecache_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./hive.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use hivecache_core::error::AccountsError;
use hivecache_core::store::{AccountStore, FollowSide};
use hivecache_core::types::{update_statement, CacheRow, CacheValue, ParamStyle};

/// Names bound per `IN (...)` list. Older SQLite builds cap a statement at 999 variables.
const IN_LIST_CHUNK: usize = 500;

/// SQLite-backed account store.
pub struct SqliteStore {
    pool: SqlitePool,
    update_sql: String,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./hive.db"`) or a full
    /// SQLite URL (`"sqlite:./hive.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, AccountsError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| AccountsError::Storage(e.to_string()))?;

        let store = Self::from_pool(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, AccountsError> {
        // every connection to `:memory:` is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AccountsError::Storage(e.to_string()))?;

        let store = Self::from_pool(pool);
        store.init_schema().await?;
        Ok(store)
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            update_sql: update_statement(ParamStyle::Question),
        }
    }

    /// Create the two tables this store touches, if missing.
    async fn init_schema(&self) -> Result<(), AccountsError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| AccountsError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS hive_accounts (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                name          TEXT    NOT NULL UNIQUE,
                created_at    TEXT    NOT NULL,
                proxy         TEXT    NOT NULL DEFAULT '',
                post_count    INTEGER NOT NULL DEFAULT 0,
                reputation    REAL    NOT NULL DEFAULT 25,
                followers     INTEGER NOT NULL DEFAULT 0,
                following     INTEGER NOT NULL DEFAULT 0,
                proxy_weight  REAL    NOT NULL DEFAULT 0,
                vote_weight   REAL    NOT NULL DEFAULT 0,
                kb_used       REAL    NOT NULL DEFAULT 0,
                display_name  TEXT    NOT NULL DEFAULT '',
                about         TEXT    NOT NULL DEFAULT '',
                location      TEXT    NOT NULL DEFAULT '',
                website       TEXT    NOT NULL DEFAULT '',
                profile_image TEXT    NOT NULL DEFAULT '',
                cover_image   TEXT    NOT NULL DEFAULT ''
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AccountsError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS hive_follows (
                follower  TEXT NOT NULL,
                following TEXT NOT NULL,
                PRIMARY KEY (follower, following)
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AccountsError::Storage(e.to_string()))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_hive_follows_following ON hive_follows (following);",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AccountsError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Record a `follower → following` edge. Repeated edges are ignored.
    pub async fn insert_follow(&self, follower: &str, following: &str) -> Result<(), AccountsError> {
        sqlx::query("INSERT OR IGNORE INTO hive_follows (follower, following) VALUES (?, ?)")
            .bind(follower)
            .bind(following)
            .execute(&self.pool)
            .await
            .map_err(|e| AccountsError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Read back the cache columns of `name`.
    pub async fn cache_row(&self, name: &str) -> Result<Option<CacheRow>, AccountsError> {
        let row = sqlx::query(
            "SELECT name, proxy, post_count, reputation, followers, following,
                    proxy_weight, vote_weight, kb_used, display_name, about, location,
                    website, profile_image, cover_image
             FROM hive_accounts WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AccountsError::Storage(e.to_string()))?;

        Ok(row.map(|r| CacheRow {
            name: r.get("name"),
            proxy: r.get("proxy"),
            post_count: r.get("post_count"),
            reputation: r.get("reputation"),
            followers: r.get("followers"),
            following: r.get("following"),
            proxy_weight: r.get("proxy_weight"),
            vote_weight: r.get("vote_weight"),
            kb_used: r.get("kb_used"),
            profile: hivecache_core::ProfileMetadata {
                display_name: r.get("display_name"),
                about: r.get("about"),
                location: r.get("location"),
                website: r.get("website"),
                profile_image: r.get("profile_image"),
                cover_image: r.get("cover_image"),
            },
        }))
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: CacheValue<'q>,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        CacheValue::Text(s) => query.bind(s),
        CacheValue::Int(i) => query.bind(i),
        CacheValue::Float(f) => query.bind(f),
    }
}

/// `SELECT <prefix> ... WHERE <column> IN (?, ?, ...) <suffix>`
fn in_list_query<'a>(
    prefix: &str,
    column: &str,
    names: &'a [String],
    suffix: &str,
) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(prefix);
    qb.push(" WHERE ").push(column).push(" IN (");
    let mut list = qb.separated(", ");
    for name in names {
        list.push_bind(name.as_str());
    }
    list.push_unseparated(")");
    qb.push(suffix);
    qb
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn load_ids(&self) -> Result<Vec<(String, i64)>, AccountsError> {
        let rows = sqlx::query("SELECT name, id FROM hive_accounts")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AccountsError::Storage(e.to_string()))?;
        Ok(rows.iter().map(|r| (r.get("name"), r.get("id"))).collect())
    }

    async fn all_names(&self) -> Result<Vec<String>, AccountsError> {
        let rows = sqlx::query("SELECT name FROM hive_accounts")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AccountsError::Storage(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get("name")).collect())
    }

    async fn insert_accounts(
        &self,
        names: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<(), AccountsError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AccountsError::Storage(e.to_string()))?;

        for name in names {
            sqlx::query("INSERT INTO hive_accounts (name, created_at) VALUES (?, ?)")
                .bind(name)
                .bind(created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| AccountsError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AccountsError::Storage(format!("commit insert: {e}")))?;
        debug!(count = names.len(), "accounts inserted");
        Ok(())
    }

    async fn ids_for(&self, names: &[String]) -> Result<Vec<(String, i64)>, AccountsError> {
        let mut out: Vec<(String, i64)> = Vec::with_capacity(names.len());
        for part in names.chunks(IN_LIST_CHUNK) {
            let mut qb = in_list_query("SELECT name, id FROM hive_accounts", "name", part, "");
            let rows = qb
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AccountsError::Storage(e.to_string()))?;
            out.extend(rows.iter().map(|r| (r.get("name"), r.get("id"))));
        }
        Ok(out)
    }

    async fn follow_counts(
        &self,
        side: FollowSide,
        names: &[String],
    ) -> Result<Vec<(String, i64)>, AccountsError> {
        let column = side.column();
        let prefix = format!("SELECT {column} AS name, COUNT(*) AS cnt FROM hive_follows");
        let suffix = format!(" GROUP BY {column}");

        let mut out: Vec<(String, i64)> = Vec::new();
        for part in names.chunks(IN_LIST_CHUNK) {
            let mut qb = in_list_query(&prefix, column, part, &suffix);
            let rows = qb
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AccountsError::Storage(e.to_string()))?;
            out.extend(rows.iter().map(|r| (r.get("name"), r.get("cnt"))));
        }
        Ok(out)
    }

    async fn batch_update(&self, rows: &[CacheRow]) -> Result<(), AccountsError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AccountsError::Storage(e.to_string()))?;

        for row in rows {
            let mut query = sqlx::query(&self.update_sql);
            for (_, value) in row.values() {
                query = bind_value(query, value);
            }
            query
                .bind(row.name.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| AccountsError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AccountsError::Storage(format!("commit batch: {e}")))?;

        debug!(rows = rows.len(), "cache batch committed");
        Ok(())
    }
}
