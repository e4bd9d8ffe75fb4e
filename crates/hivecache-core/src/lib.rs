//! hivecache-core: account registry and batched cache-row refresh.
//!
//! # Architecture
//!
//! ```text
//! AccountRegistry ── register / dirty ──┐
//!                                       ▼
//!                        CachePipeline (chunks of 1000)
//!                            ├── CacheRowBuilder
//!                            │     ├── AccountAdapter       (raw chain state)
//!                            │     ├── FollowStatsAggregator (grouped counts)
//!                            │     └── metadata::sanitize   (profile fields)
//!                            └── AccountStore::batch_update (one tx per chunk)
//! ```

pub mod adapter;
pub mod builder;
pub mod config;
pub mod error;
pub mod follows;
pub mod metadata;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod store;
pub mod types;

pub use adapter::{AccountAdapter, StaticAdapter};
pub use builder::CacheRowBuilder;
pub use config::CacheConfig;
pub use error::AccountsError;
pub use follows::{FollowCounts, FollowStats, FollowStatsAggregator};
pub use metadata::{sanitize, ProfileMetadata};
pub use pipeline::CachePipeline;
pub use progress::{CacheRunStats, ChunkProgress};
pub use registry::AccountRegistry;
pub use store::{AccountStore, FollowSide};
pub use types::{AccountRecord, AssetAmount, CacheColumn, CacheRow, CacheValue, ParamStyle};
