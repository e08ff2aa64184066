//! Structured local storage: key- and index-based CRUD over a fixed set of
//! record stores.
//!
//! Records are JSON objects keyed by a store-specific primary-key field.
//! `put` upserts and stamps a retrieval timestamp; index lookups cover the
//! fields each store declares in [`schema::StoreName::index_fields`]. No
//! transaction ever spans more than one store.

pub mod schema;

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub use schema::StoreName;

/// Local record store over SQLite.
pub struct LocalStore {
  conn: Mutex<Connection>,
}

impl LocalStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open local store at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Ephemeral in-memory store, used by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.upgrade_schema()?;
    Ok(store)
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offcache").join("store.db"))
  }

  /// Single-step schema upgrade: create the stores if absent.
  fn upgrade_schema(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let version: i32 = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read schema version: {}", e))?;

    if version < schema::SCHEMA_VERSION {
      conn
        .execute_batch(schema::SCHEMA)
        .map_err(|e| eyre!("Failed to create stores: {}", e))?;
      conn
        .pragma_update(None, "user_version", schema::SCHEMA_VERSION)
        .map_err(|e| eyre!("Failed to set schema version: {}", e))?;
    }

    Ok(())
  }

  /// Upsert a record by its primary key and stamp a retrieval timestamp.
  ///
  /// Returns the stored record (with the `cachedAt` stamp applied).
  pub fn put(&self, store: StoreName, record: Value) -> Result<Value> {
    let mut record = match record {
      Value::Object(map) => map,
      other => {
        return Err(eyre!(
          "Record for store {} must be a JSON object, got {}",
          store,
          json_type_name(&other)
        ))
      }
    };

    let key = record
      .get(store.key_field())
      .and_then(json_key_string)
      .ok_or_else(|| {
        eyre!(
          "Record for store {} is missing key field '{}'",
          store,
          store.key_field()
        )
      })?;

    record.insert(
      "cachedAt".to_string(),
      Value::String(Utc::now().to_rfc3339()),
    );
    let record = Value::Object(record);
    let data = serde_json::to_string(&record)
      .map_err(|e| eyre!("Failed to serialize record: {}", e))?;

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO records (store, key, data, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![store.as_str(), key, data],
      )
      .map_err(|e| eyre!("Failed to store record: {}", e))?;

    // Rebuild index rows for this record
    conn
      .execute(
        "DELETE FROM record_index WHERE store = ? AND key = ?",
        params![store.as_str(), key],
      )
      .map_err(|e| eyre!("Failed to clear index rows: {}", e))?;

    for field in store.index_fields() {
      if let Some(value) = record.get(field).and_then(json_key_string) {
        conn
          .execute(
            "INSERT OR REPLACE INTO record_index (store, field, value, key)
             VALUES (?, ?, ?, ?)",
            params![store.as_str(), field, value, key],
          )
          .map_err(|e| eyre!("Failed to store index row: {}", e))?;
      }
    }

    conn
      .execute("COMMIT", [])
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(record)
  }

  /// Get one record by primary key. None is the not-found signal.
  pub fn get(&self, store: StoreName, key: &str) -> Result<Option<Value>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT data FROM records WHERE store = ? AND key = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let data: Option<String> = stmt
      .query_row(params![store.as_str(), key], |row| row.get(0))
      .ok();

    match data {
      Some(data) => {
        let record = serde_json::from_str(&data)
          .map_err(|e| eyre!("Failed to deserialize record: {}", e))?;
        Ok(Some(record))
      }
      None => Ok(None),
    }
  }

  /// All records in a store, in no particular order.
  pub fn get_all(&self, store: StoreName) -> Result<Vec<Value>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT data FROM records WHERE store = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let records = stmt
      .query_map(params![store.as_str()], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to query records: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|data| serde_json::from_str(&data).ok())
      .collect();

    Ok(records)
  }

  /// Records whose indexed field equals the given value, unordered.
  pub fn get_by_index(&self, store: StoreName, field: &str, value: &str) -> Result<Vec<Value>> {
    if !store.index_fields().contains(&field) {
      return Err(eyre!("Store {} has no index on '{}'", store, field));
    }

    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT r.data FROM records r
         INNER JOIN record_index i ON i.store = r.store AND i.key = r.key
         WHERE i.store = ? AND i.field = ? AND i.value = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let records = stmt
      .query_map(params![store.as_str(), field, value], |row| {
        row.get::<_, String>(0)
      })
      .map_err(|e| eyre!("Failed to query index: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|data| serde_json::from_str(&data).ok())
      .collect();

    Ok(records)
  }

  /// Remove one record; returns whether anything was removed.
  pub fn delete(&self, store: StoreName, key: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM record_index WHERE store = ? AND key = ?",
        params![store.as_str(), key],
      )
      .map_err(|e| eyre!("Failed to delete index rows: {}", e))?;

    let removed = conn
      .execute(
        "DELETE FROM records WHERE store = ? AND key = ?",
        params![store.as_str(), key],
      )
      .map_err(|e| eyre!("Failed to delete record: {}", e))?;

    Ok(removed > 0)
  }

  /// Remove every record in a store.
  pub fn clear(&self, store: StoreName) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM record_index WHERE store = ?",
        params![store.as_str()],
      )
      .map_err(|e| eyre!("Failed to clear index rows: {}", e))?;

    conn
      .execute("DELETE FROM records WHERE store = ?", params![store.as_str()])
      .map_err(|e| eyre!("Failed to clear store: {}", e))?;

    Ok(())
  }
}

/// Primary keys and index values are stored as text; accept strings and
/// numbers, reject anything else.
fn json_key_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn json_type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn store() -> LocalStore {
    LocalStore::open_in_memory().unwrap()
  }

  #[test]
  fn test_put_then_get_stamps_timestamp() {
    let s = store();
    s.put(
      StoreName::Bookmarks,
      json!({"questionId": "q1", "userId": "u1"}),
    )
    .unwrap();

    let record = s.get(StoreName::Bookmarks, "q1").unwrap().unwrap();
    assert_eq!(record["questionId"], "q1");
    assert_eq!(record["userId"], "u1");
    assert!(!record["cachedAt"].as_str().unwrap().is_empty());
  }

  #[test]
  fn test_put_upserts_by_primary_key() {
    let s = store();
    s.put(
      StoreName::Progress,
      json!({"id": "p1", "userId": "u1", "score": 40}),
    )
    .unwrap();
    s.put(
      StoreName::Progress,
      json!({"id": "p1", "userId": "u1", "score": 85}),
    )
    .unwrap();

    assert_eq!(s.get_all(StoreName::Progress).unwrap().len(), 1);
    let record = s.get(StoreName::Progress, "p1").unwrap().unwrap();
    assert_eq!(record["score"], 85);
  }

  #[test]
  fn test_get_missing_returns_none() {
    let s = store();
    assert!(s.get(StoreName::Tests, "nope").unwrap().is_none());
  }

  #[test]
  fn test_get_by_index() {
    let s = store();
    s.put(
      StoreName::Bookmarks,
      json!({"questionId": "q1", "userId": "u1"}),
    )
    .unwrap();
    s.put(
      StoreName::Bookmarks,
      json!({"questionId": "q2", "userId": "u1"}),
    )
    .unwrap();
    s.put(
      StoreName::Bookmarks,
      json!({"questionId": "q3", "userId": "u2"}),
    )
    .unwrap();

    let records = s
      .get_by_index(StoreName::Bookmarks, "userId", "u1")
      .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["userId"] == "u1"));
  }

  #[test]
  fn test_index_rows_follow_updates() {
    let s = store();
    s.put(
      StoreName::Bookmarks,
      json!({"questionId": "q1", "userId": "u1"}),
    )
    .unwrap();
    // Re-bookmark under a different user
    s.put(
      StoreName::Bookmarks,
      json!({"questionId": "q1", "userId": "u2"}),
    )
    .unwrap();

    assert!(s
      .get_by_index(StoreName::Bookmarks, "userId", "u1")
      .unwrap()
      .is_empty());
    assert_eq!(
      s.get_by_index(StoreName::Bookmarks, "userId", "u2")
        .unwrap()
        .len(),
      1
    );
  }

  #[test]
  fn test_unknown_index_is_an_error() {
    let s = store();
    assert!(s
      .get_by_index(StoreName::Bookmarks, "subject", "physics")
      .is_err());
  }

  #[test]
  fn test_delete_and_clear() {
    let s = store();
    s.put(StoreName::Tests, json!({"id": "t1", "userId": "u1"}))
      .unwrap();
    s.put(StoreName::Tests, json!({"id": "t2", "userId": "u1"}))
      .unwrap();

    assert!(s.delete(StoreName::Tests, "t1").unwrap());
    assert!(!s.delete(StoreName::Tests, "t1").unwrap());
    assert_eq!(s.get_all(StoreName::Tests).unwrap().len(), 1);

    s.clear(StoreName::Tests).unwrap();
    assert!(s.get_all(StoreName::Tests).unwrap().is_empty());
  }

  #[test]
  fn test_stores_are_isolated() {
    let s = store();
    s.put(StoreName::CacheMeta, json!({"key": "lastSync", "value": "never"}))
      .unwrap();
    s.put(StoreName::Tests, json!({"id": "lastSync"})).unwrap();

    s.clear(StoreName::Tests).unwrap();
    assert!(s.get(StoreName::CacheMeta, "lastSync").unwrap().is_some());
  }

  #[test]
  fn test_non_object_record_rejected() {
    let s = store();
    assert!(s.put(StoreName::Tests, json!("just a string")).is_err());
    assert!(s
      .put(StoreName::Tests, json!({"userId": "u1"}))
      .is_err());
  }
}
