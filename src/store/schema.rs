//! Record store definitions and SQL schema for the local store.

/// The fixed set of record stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreName {
  CachedQuestions,
  Bookmarks,
  Progress,
  Tests,
  CacheMeta,
}

impl StoreName {
  pub const ALL: &'static [StoreName] = &[
    StoreName::CachedQuestions,
    StoreName::Bookmarks,
    StoreName::Progress,
    StoreName::Tests,
    StoreName::CacheMeta,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      StoreName::CachedQuestions => "cached_questions",
      StoreName::Bookmarks => "bookmarks",
      StoreName::Progress => "progress",
      StoreName::Tests => "tests",
      StoreName::CacheMeta => "cache_meta",
    }
  }

  pub fn parse(name: &str) -> Option<Self> {
    Self::ALL.iter().copied().find(|s| s.as_str() == name)
  }

  /// Field used as the record's primary key.
  pub fn key_field(&self) -> &'static str {
    match self {
      StoreName::CachedQuestions => "id",
      StoreName::Bookmarks => "questionId",
      StoreName::Progress => "id",
      StoreName::Tests => "id",
      StoreName::CacheMeta => "key",
    }
  }

  /// Fields that can be queried via `get_by_index`.
  pub fn index_fields(&self) -> &'static [&'static str] {
    match self {
      StoreName::CachedQuestions => &["subject", "examType"],
      StoreName::Bookmarks => &["userId"],
      StoreName::Progress => &["userId", "subject"],
      StoreName::Tests => &["userId"],
      StoreName::CacheMeta => &[],
    }
  }
}

impl std::fmt::Display for StoreName {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Current schema version, written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Schema for the local record stores.
///
/// Records are stored as JSON; index rows are extracted at write time so
/// index lookups stay plain SQL.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    store TEXT NOT NULL,
    key TEXT NOT NULL,
    data TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, key)
);

CREATE TABLE IF NOT EXISTS record_index (
    store TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    key TEXT NOT NULL,
    PRIMARY KEY (store, field, key)
);

CREATE INDEX IF NOT EXISTS idx_record_index_lookup
    ON record_index(store, field, value);
"#;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_store_name_round_trip() {
    for store in StoreName::ALL {
      assert_eq!(StoreName::parse(store.as_str()), Some(*store));
    }
    assert_eq!(StoreName::parse("nope"), None);
  }

  #[test]
  fn test_index_fields_are_declared() {
    assert!(StoreName::Bookmarks.index_fields().contains(&"userId"));
    assert!(StoreName::CacheMeta.index_fields().is_empty());
  }
}
