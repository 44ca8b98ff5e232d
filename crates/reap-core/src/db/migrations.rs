//! Database migrations
//!
//! The registry database and every folder database carry their own
//! `schema_version` table and are migrated independently.

use crate::error::Result;
use rusqlite::Connection;

/// Current registry schema version
const MAIN_VERSION: i32 = 1;

/// Current folder schema version
const FOLDER_VERSION: i32 = 2;

/// Run all pending migrations on the folder registry
pub fn run_main(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(
            conn,
            1,
            &[
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY
                )",
                "CREATE TABLE IF NOT EXISTS folders (
                    idx INTEGER PRIMARY KEY AUTOINCREMENT,
                    folder_id TEXT NOT NULL UNIQUE,
                    database_name TEXT NOT NULL
                )",
            ],
        )?;
    }

    debug_assert_eq!(get_version(conn)?, MAIN_VERSION);
    Ok(())
}

/// Run all pending migrations on a folder database
pub fn run_folder(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(
            conn,
            1,
            &[
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY
                )",
                "CREATE TABLE IF NOT EXISTS devices (
                    idx INTEGER PRIMARY KEY AUTOINCREMENT,
                    device_id TEXT NOT NULL UNIQUE
                )",
                // AUTOINCREMENT keeps sequences from being reused after the
                // highest row is collected
                "CREATE TABLE IF NOT EXISTS files (
                    sequence INTEGER PRIMARY KEY AUTOINCREMENT,
                    device_idx INTEGER NOT NULL REFERENCES devices(idx),
                    name TEXT NOT NULL,
                    name_hash BLOB NOT NULL,
                    modified INTEGER NOT NULL,
                    size INTEGER NOT NULL,
                    deleted INTEGER NOT NULL DEFAULT 0,
                    local_flags INTEGER NOT NULL DEFAULT 0,
                    version TEXT NOT NULL,
                    UNIQUE (device_idx, name)
                )",
                "CREATE INDEX IF NOT EXISTS idx_files_name_hash ON files(name_hash)",
            ],
        )?;
    }
    if version < 2 {
        apply(
            conn,
            2,
            &[
                // Internal bookkeeping, kept apart from file data
                "CREATE TABLE IF NOT EXISTS kv (
                    key TEXT PRIMARY KEY,
                    value BLOB NOT NULL
                )",
                "CREATE INDEX IF NOT EXISTS idx_files_deleted ON files(deleted, modified)",
            ],
        )?;
    }

    debug_assert_eq!(get_version(conn)?, FOLDER_VERSION);
    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply(conn: &mut Connection, version: i32, statements: &[&str]) -> Result<()> {
    // Rolled back on drop if any statement fails
    let tx = conn.transaction()?;
    for stmt in statements {
        tx.execute(stmt, [])?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        [version],
    )?;
    tx.commit()?;

    tracing::debug!("Migrated database to version {version}");
    Ok(())
}
