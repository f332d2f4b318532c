//! In-memory adapter used by tests and local experiments.
//!
//! Supports scripted failures (per-table upsert faults, global offline
//! mode, missing probe columns) so retry, abandonment and orphan-cleanup
//! paths can be exercised without a backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::mapper::Row;
use crate::remote::RemoteAdapter;

#[derive(Default)]
struct Inner {
    tables: HashMap<String, BTreeMap<String, Row>>,
    blobs: HashMap<String, Vec<u8>>,
    missing_columns: HashSet<(String, String)>,
    fail_upserts: HashMap<String, u32>,
    fail_deletes: HashMap<String, u32>,
    offline: bool,
    log: Vec<(String, String)>,
}

/// Clonable in-memory implementation of [`RemoteAdapter`]; clones share
/// state, so a test can keep a handle after giving one to the engine.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, bypassing the adapter surface.
    pub fn seed_row(&self, table: &str, row: Row) {
        let mut inner = self.lock();
        let key = row
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        inner.tables.entry(table.to_string()).or_default().insert(key, row);
    }

    /// Current rows of a table, in key order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Bytes stored at `bucket/path`, if any.
    #[must_use]
    pub fn blob_at(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(&blob_key(bucket, path)).cloned()
    }

    /// Make the probe report this table/column as missing.
    pub fn remove_column(&self, table: &str, column: &str) {
        self.lock()
            .missing_columns
            .insert((table.to_string(), column.to_string()));
    }

    /// Fail the next `count` upsert calls against a table with a network
    /// error.
    pub fn fail_next_upserts(&self, table: &str, count: u32) {
        self.lock().fail_upserts.insert(table.to_string(), count);
    }

    /// Fail the next `count` delete calls against a table with a network
    /// error.
    pub fn fail_next_deletes(&self, table: &str, count: u32) {
        self.lock().fail_deletes.insert(table.to_string(), count);
    }

    /// Toggle global unreachability.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Every adapter call so far, as `(operation, target)` pairs in call
    /// order.
    #[must_use]
    pub fn call_log(&self) -> Vec<(String, String)> {
        self.lock().log.clone()
    }

    /// How many upsert calls were issued against a table.
    #[must_use]
    pub fn upsert_attempts(&self, table: &str) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|(op, target)| op == "upsert" && target == table)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn guard_online(inner: &mut Inner, op: &str, target: &str) -> Result<()> {
        inner.log.push((op.to_string(), target.to_string()));
        if inner.offline {
            return Err(Error::Network("remote unreachable".to_string()));
        }
        Ok(())
    }
}

impl RemoteAdapter for MemoryRemote {
    async fn select(&self, table: &str, columns: &[&str]) -> Result<Vec<Row>> {
        let mut inner = self.lock();
        Self::guard_online(&mut inner, "select", table)?;
        let rows = inner.tables.get(table).cloned().unwrap_or_default();
        Ok(rows
            .into_values()
            .map(|row| {
                if columns.is_empty() {
                    row
                } else {
                    row.into_iter()
                        .filter(|(column, _)| columns.contains(&column.as_str()))
                        .collect()
                }
            })
            .collect())
    }

    async fn upsert(&self, table: &str, rows: &[Row], conflict_key: &str) -> Result<Vec<Row>> {
        let mut inner = self.lock();
        Self::guard_online(&mut inner, "upsert", table)?;

        if let Some(remaining) = inner.fail_upserts.get_mut(table) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Network(format!("{table}: injected fault")));
            }
        }

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let key = conflict_key
                .split(',')
                .map(|column| {
                    row.get(column)
                        .and_then(Value::as_str)
                        .map(ToOwned::to_owned)
                        .ok_or_else(|| {
                            Error::Api(format!("{table}: row missing conflict column {column}"))
                        })
                })
                .collect::<Result<Vec<_>>>()?
                .join("\u{1f}");
            inner
                .tables
                .entry(table.to_string())
                .or_default()
                .insert(key.clone(), row.clone());
            stored.push(row.clone());
        }
        Ok(stored)
    }

    async fn delete(&self, table: &str, key: &str, ids: &[String]) -> Result<()> {
        let mut inner = self.lock();
        Self::guard_online(&mut inner, "delete", table)?;
        if let Some(remaining) = inner.fail_deletes.get_mut(table) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Error::Network(format!("{table}: injected fault")));
            }
        }
        if let Some(rows) = inner.tables.get_mut(table) {
            rows.retain(|_, row| {
                row.get(key)
                    .and_then(Value::as_str)
                    .is_none_or(|value| !ids.iter().any(|id| id == value))
            });
        }
        Ok(())
    }

    async fn probe(&self, table: &str, column: &str) -> Result<()> {
        let mut inner = self.lock();
        Self::guard_online(&mut inner, "probe", table)?;
        if inner
            .missing_columns
            .contains(&(table.to_string(), column.to_string()))
        {
            return Err(Error::Schema {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        Ok(())
    }

    async fn upload_blob(&self, bucket: &str, path: &str, bytes: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        Self::guard_online(&mut inner, "upload_blob", path)?;
        inner.blobs.insert(blob_key(bucket, path), bytes.to_vec());
        Ok(())
    }

    async fn download_blob(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let mut inner = self.lock();
        Self::guard_online(&mut inner, "download_blob", path)?;
        inner
            .blobs
            .get(&blob_key(bucket, path))
            .cloned()
            .ok_or_else(|| Error::Storage(format!("{bucket}/{path}: no such object")))
    }

    async fn delete_blob(&self, bucket: &str, path: &str) -> Result<()> {
        let mut inner = self.lock();
        Self::guard_online(&mut inner, "delete_blob", path)?;
        inner.blobs.remove(&blob_key(bucket, path));
        Ok(())
    }
}

fn blob_key(bucket: &str, path: &str) -> String {
    format!("{bucket}/{path}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(pairs: Value) -> Row {
        let Value::Object(map) = pairs else {
            unreachable!()
        };
        map
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_the_conflict_key() {
        let remote = MemoryRemote::new();
        let record = row(json!({ "id": "c-1", "name": "Amina" }));

        remote.upsert("clients", &[record.clone()], "id").await.unwrap();
        remote.upsert("clients", &[record], "id").await.unwrap();

        assert_eq!(remote.rows("clients").len(), 1);
    }

    #[tokio::test]
    async fn natural_keys_deduplicate_assistants() {
        let remote = MemoryRemote::new();
        let first = row(json!({ "id": "a-1", "owner_id": "o-1", "name": "Huda" }));
        let second = row(json!({ "id": "a-2", "owner_id": "o-1", "name": "Huda" }));

        remote
            .upsert("assistants", &[first], "owner_id,name")
            .await
            .unwrap();
        remote
            .upsert("assistants", &[second], "owner_id,name")
            .await
            .unwrap();

        assert_eq!(remote.rows("assistants").len(), 1);
    }

    #[tokio::test]
    async fn scripted_faults_burn_down() {
        let remote = MemoryRemote::new();
        remote.fail_next_upserts("clients", 1);
        let record = row(json!({ "id": "c-1" }));

        assert!(remote.upsert("clients", &[record.clone()], "id").await.is_err());
        assert!(remote.upsert("clients", &[record], "id").await.is_ok());
    }

    #[tokio::test]
    async fn missing_columns_fail_the_probe() {
        let remote = MemoryRemote::new();
        remote.remove_column("case_documents", "updated_at");

        let error = remote.probe("case_documents", "updated_at").await.unwrap_err();
        assert!(matches!(error, Error::Schema { .. }));
        assert!(remote.probe("clients", "updated_at").await.is_ok());
    }
}
