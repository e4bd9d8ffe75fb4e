//! hivecache-storage: account store backends for hivecache.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - `sqlite`: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx` (the Hive indexer database)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStore};
