//! The durable local store: one transactional record table per entity
//! kind plus a blob table for document bytes.
//!
//! The store is the source of truth for the UI. Every operation is
//! individually atomic; nothing here assumes a consistent cross-entity
//! snapshot, because the UI keeps writing while a sync pass runs.

mod migrations;

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{Entity, EntityKind, LocalRecord};
use crate::util::unix_millis_now;

/// Durable, transactional store for all synced entities.
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    /// Open (or create) a store at the given path and run migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.configure()?;
        migrations::run(&store.conn)?;
        Ok(store)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.configure()?;
        migrations::run(&store.conn)?;
        Ok(store)
    }

    /// Configure `SQLite` for concurrent reader-friendly durability.
    fn configure(&self) -> Result<()> {
        self.conn
            .pragma_update(None, "journal_mode", "WAL")
            .ok();
        self.conn
            .pragma_update(None, "synchronous", "NORMAL")
            .ok();
        Ok(())
    }

    /// Persist a local mutation. The record is marked dirty and its
    /// timestamp is stamped strictly greater than whatever the row held
    /// before, so last-writer-wins comparisons always see the change.
    pub fn save(&self, kind: EntityKind, record: &LocalRecord) -> Result<LocalRecord> {
        let table = kind.table();
        let tx = self.conn.unchecked_transaction()?;

        let previous: Option<i64> = tx
            .query_row(
                &format!("SELECT updated_at FROM {table} WHERE id = ?"),
                params![record.id],
                |row| row.get(0),
            )
            .optional()?;

        let mut stamped = record.clone();
        stamped.updated_at = previous.map_or_else(unix_millis_now, |prev| {
            unix_millis_now().max(prev + 1)
        });
        stamped.dirty = true;
        stamped.deleted = false;
        stamped
            .payload
            .insert("updatedAt".to_string(), Value::from(stamped.updated_at));

        insert_record(&tx, kind, &stamped)?;
        tx.commit()?;
        Ok(stamped)
    }

    /// Persist a typed entity as a local mutation.
    pub fn save_entity<E: Entity>(&self, entity: &E) -> Result<LocalRecord> {
        self.save(E::KIND, &entity.to_record()?)
    }

    /// Write a record merged down from the backend, exactly as given and
    /// marked clean.
    pub fn apply_remote(&self, kind: EntityKind, record: &LocalRecord) -> Result<()> {
        let mut merged = record.clone();
        merged.dirty = false;
        merged.deleted = false;
        insert_record(&self.conn, kind, &merged)
    }

    /// Fetch a live record by id. Tombstones read as absent.
    pub fn get(&self, kind: EntityKind, id: &str) -> Result<Option<LocalRecord>> {
        let table = kind.table();
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, payload, updated_at, dirty, deleted
                     FROM {table} WHERE id = ? AND deleted = 0"
                ),
                params![id],
                row_to_parts,
            )
            .optional()?;
        record.map(parts_to_record).transpose()
    }

    /// Fetch a typed entity by id.
    pub fn get_entity<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        self.get(E::KIND, id)?
            .as_ref()
            .map(E::from_record)
            .transpose()
    }

    /// List live records, most recently updated first.
    pub fn list(&self, kind: EntityKind) -> Result<Vec<LocalRecord>> {
        self.query_records(kind, "deleted = 0")
    }

    /// List typed entities, most recently updated first.
    pub fn list_entities<E: Entity>(&self) -> Result<Vec<E>> {
        self.list(E::KIND)?.iter().map(E::from_record).collect()
    }

    /// Every row of a kind, tombstones included. The reconciler diffs
    /// against this.
    pub fn all_records(&self, kind: EntityKind) -> Result<Vec<LocalRecord>> {
        self.query_records(kind, "1 = 1")
    }

    /// Live records mutated since their last confirmed sync.
    pub fn dirty_records(&self, kind: EntityKind) -> Result<Vec<LocalRecord>> {
        self.query_records(kind, "dirty = 1 AND deleted = 0")
    }

    /// Pending-deletion markers awaiting remote confirmation.
    pub fn tombstones(&self, kind: EntityKind) -> Result<Vec<LocalRecord>> {
        self.query_records(kind, "deleted = 1")
    }

    fn query_records(&self, kind: EntityKind, filter: &str) -> Result<Vec<LocalRecord>> {
        let table = kind.table();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, payload, updated_at, dirty, deleted
             FROM {table} WHERE {filter} ORDER BY updated_at DESC"
        ))?;
        let parts = stmt
            .query_map([], row_to_parts)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        parts.into_iter().map(parts_to_record).collect()
    }

    /// Tombstone a record. It stays in the store until the deletion
    /// pipeline confirms remote removal.
    pub fn mark_deleted(&self, kind: EntityKind, id: &str) -> Result<()> {
        let table = kind.table();
        let now = unix_millis_now();
        let rows = self.conn.execute(
            &format!(
                "UPDATE {table}
                 SET deleted = 1, dirty = 1, updated_at = MAX(?1, updated_at + 1)
                 WHERE id = ?2"
            ),
            params![now, id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Stamp rows clean after a confirmed upload.
    pub fn mark_synced(&self, kind: EntityKind, ids: &[String]) -> Result<()> {
        let table = kind.table();
        let tx = self.conn.unchecked_transaction()?;
        for id in ids {
            tx.execute(
                &format!("UPDATE {table} SET dirty = 0 WHERE id = ?"),
                params![id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Drop a row entirely, tombstone or not.
    pub fn purge(&self, kind: EntityKind, id: &str) -> Result<()> {
        let table = kind.table();
        self.conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?"), params![id])?;
        if kind == EntityKind::CaseDocument {
            self.conn.execute(
                "DELETE FROM document_blobs WHERE document_id = ?",
                params![id],
            )?;
        }
        Ok(())
    }

    /// Replace an offline-generated id with the server-assigned one,
    /// rewriting every field in other tables that referenced it (soft
    /// references included) in the same transaction.
    pub fn rewrite_id(&self, kind: EntityKind, old_id: &str, new_id: &str) -> Result<()> {
        let table = kind.table();
        let tx = self.conn.unchecked_transaction()?;

        let payload_json: Option<String> = tx
            .query_row(
                &format!("SELECT payload FROM {table} WHERE id = ?"),
                params![old_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload_json) = payload_json else {
            return Err(Error::NotFound(old_id.to_string()));
        };

        let mut payload: Map<String, Value> = serde_json::from_str(&payload_json)?;
        payload.insert("id".to_string(), Value::String(new_id.to_string()));
        tx.execute(
            &format!("UPDATE {table} SET id = ?1, payload = ?2 WHERE id = ?3"),
            params![new_id, serde_json::to_string(&payload)?, old_id],
        )?;

        for (child_kind, field) in kind.referencing_fields() {
            rewrite_reference(&tx, *child_kind, field, old_id, new_id)?;
        }

        if kind == EntityKind::CaseDocument {
            tx.execute(
                "UPDATE document_blobs SET document_id = ?1 WHERE document_id = ?2",
                params![new_id, old_id],
            )?;
        }

        tx.commit()?;
        tracing::debug!(kind = %kind, old_id, new_id, "rewrote record id");
        Ok(())
    }

    /// Persist a document captured offline: metadata row and blob land in
    /// one transaction so the pair is never half-present.
    pub fn store_document(&self, record: &LocalRecord, bytes: &[u8]) -> Result<LocalRecord> {
        let tx = self.conn.unchecked_transaction()?;

        let mut stamped = record.clone();
        stamped.updated_at = unix_millis_now();
        stamped.dirty = true;
        stamped.deleted = false;
        stamped
            .payload
            .insert("updatedAt".to_string(), Value::from(stamped.updated_at));

        insert_record(&tx, EntityKind::CaseDocument, &stamped)?;
        tx.execute(
            "INSERT OR REPLACE INTO document_blobs (document_id, bytes) VALUES (?1, ?2)",
            params![stamped.id, bytes],
        )?;

        tx.commit()?;
        Ok(stamped)
    }

    /// Write a document pair pulled from the backend, marked clean.
    pub fn apply_remote_document(&self, record: &LocalRecord, bytes: &[u8]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        let mut merged = record.clone();
        merged.dirty = false;
        merged.deleted = false;
        insert_record(&tx, EntityKind::CaseDocument, &merged)?;
        tx.execute(
            "INSERT OR REPLACE INTO document_blobs (document_id, bytes) VALUES (?1, ?2)",
            params![merged.id, bytes],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Remove a document pair: metadata row and blob go together.
    pub fn remove_document(&self, id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM case_documents WHERE id = ?", params![id])?;
        tx.execute(
            "DELETE FROM document_blobs WHERE document_id = ?",
            params![id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Read a document's bytes from the blob table.
    pub fn blob(&self, document_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .conn
            .query_row(
                "SELECT bytes FROM document_blobs WHERE document_id = ?",
                params![document_id],
                |row| row.get(0),
            )
            .optional()?)
    }
}

/// Upsert a record row exactly as given.
fn insert_record(conn: &Connection, kind: EntityKind, record: &LocalRecord) -> Result<()> {
    let table = kind.table();
    conn.execute(
        &format!(
            "INSERT OR REPLACE INTO {table} (id, payload, updated_at, dirty, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        params![
            record.id,
            serde_json::to_string(&record.payload)?,
            record.updated_at,
            i32::from(record.dirty),
            i32::from(record.deleted),
        ],
    )?;
    Ok(())
}

/// Rewrite one referencing field across a whole table, marking touched
/// rows dirty so the new value reaches the backend.
fn rewrite_reference(
    conn: &Connection,
    kind: EntityKind,
    ref_field: &str,
    old_id: &str,
    new_id: &str,
) -> Result<()> {
    let table = kind.table();
    let mut stmt = conn.prepare(&format!("SELECT id, payload FROM {table}"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);

    for (row_id, payload_json) in rows {
        let mut payload: Map<String, Value> = serde_json::from_str(&payload_json)?;
        if payload.get(ref_field).and_then(Value::as_str) != Some(old_id) {
            continue;
        }
        payload.insert(ref_field.to_string(), Value::String(new_id.to_string()));
        conn.execute(
            &format!("UPDATE {table} SET payload = ?1, dirty = 1 WHERE id = ?2"),
            params![serde_json::to_string(&payload)?, row_id],
        )?;
    }
    Ok(())
}

type RecordParts = (String, String, i64, bool, bool);

fn row_to_parts(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordParts> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get::<_, i32>(3)? != 0,
        row.get::<_, i32>(4)? != 0,
    ))
}

fn parts_to_record(parts: RecordParts) -> Result<LocalRecord> {
    let (id, payload_json, updated_at, dirty, deleted) = parts;
    Ok(LocalRecord {
        id,
        payload: serde_json::from_str(&payload_json)?,
        updated_at,
        dirty,
        deleted,
    })
}
