//! Partitioned response cache with strategy dispatch.
//!
//! This module provides the offline-serving core:
//! - Versioned cache partitions (static and dynamic) keyed by request URL
//! - Three serving strategies: cache-first, network-first,
//!   stale-while-revalidate
//! - Offline fallbacks chosen by request destination
//! - Pluggable storage so strategies can be tested against an in-memory fake

mod dispatcher;
mod storage;
mod traits;

pub use dispatcher::{Dispatcher, Served};
pub use storage::{MemoryStorage, SqliteStorage};
pub use traits::{prune_stale, CachedResponse, CacheStore, Partitions};
