//! Local store migrations.

use rusqlite::Connection;

use crate::error::Result;
use crate::models::EntityKind;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    debug_assert!(get_version(conn)? == CURRENT_VERSION);
    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: one record table per entity kind, the blob
/// table for document bytes, and version tracking.
fn migrate_v1(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    for kind in EntityKind::ALL {
        let table = kind.table();
        tx.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    dirty INTEGER NOT NULL DEFAULT 0,
                    deleted INTEGER NOT NULL DEFAULT 0
                )"
            ),
            [],
        )?;
        tx.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_dirty ON {table}(dirty)"),
            [],
        )?;
        tx.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_updated ON {table}(updated_at DESC)"),
            [],
        )?;
    }

    tx.execute(
        "CREATE TABLE IF NOT EXISTS document_blobs (
            document_id TEXT PRIMARY KEY,
            bytes BLOB NOT NULL
        )",
        [],
    )?;

    tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn every_kind_gets_a_table() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        for kind in EntityKind::ALL {
            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [kind.table()],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table for {kind}");
        }
    }
}
