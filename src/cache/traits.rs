//! Core traits and types for the partitioned response cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use tracing::info;

use crate::fetch::Response;

/// A cached response plus the time it was stored.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

/// The two current cache partition names, derived from a version string.
///
/// Bumping the version is the only invalidation mechanism: activation
/// drops every partition whose name is not one of these two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitions {
  static_name: String,
  dynamic_name: String,
}

impl Partitions {
  pub fn new(version: &str) -> Self {
    Self {
      static_name: format!("static-{}", version),
      dynamic_name: format!("dynamic-{}", version),
    }
  }

  /// Partition holding the precached app shell and long-lived assets.
  pub fn static_name(&self) -> &str {
    &self.static_name
  }

  /// Partition holding responses stored at runtime.
  pub fn dynamic_name(&self) -> &str {
    &self.dynamic_name
  }

  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}

/// Trait for cache storage backends.
///
/// Entries are keyed by (partition, url); at most one entry per URL per
/// partition. Writes overwrite, nothing expires, and partitions are only
/// ever removed wholesale.
pub trait CacheStore: Send + Sync + 'static {
  /// Look up a cached response by exact URL.
  fn get(&self, partition: &str, url: &str) -> Result<Option<CachedResponse>>;

  /// Store (or overwrite) a response copy.
  fn put(&self, partition: &str, url: &str, response: &Response) -> Result<()>;

  /// Remove one entry; returns whether anything was removed.
  fn delete(&self, partition: &str, url: &str) -> Result<bool>;

  /// URLs currently stored in a partition.
  fn list(&self, partition: &str) -> Result<Vec<String>>;

  /// Names of all partitions that currently hold entries.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Drop a whole partition and everything in it.
  fn drop_partition(&self, partition: &str) -> Result<()>;
}

/// Delete every partition whose name is not one of the current pair.
///
/// This is the activation-time cleanup; returns the names that were
/// dropped.
pub fn prune_stale<S: CacheStore>(store: &S, current: &Partitions) -> Result<Vec<String>> {
  let mut dropped = Vec::new();
  for name in store.partitions()? {
    if !current.is_current(&name) {
      info!(partition = name.as_str(), "dropping stale partition");
      store.drop_partition(&name)?;
      dropped.push(name);
    }
  }
  Ok(dropped)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;

  fn body(text: &str) -> Response {
    Response::new(200, vec![], text.as_bytes().to_vec())
  }

  #[test]
  fn test_prune_stale_drops_only_old_partitions() {
    let store = MemoryStorage::new();
    store.put("static-v1", "/", &body("old")).unwrap();
    store.put("dynamic-v1", "/a", &body("old")).unwrap();
    store.put("static-v2", "/", &body("new")).unwrap();

    let mut dropped = prune_stale(&store, &Partitions::new("v2")).unwrap();
    dropped.sort();
    assert_eq!(
      dropped,
      vec!["dynamic-v1".to_string(), "static-v1".to_string()]
    );
    assert_eq!(store.partitions().unwrap(), vec!["static-v2".to_string()]);
  }
}
