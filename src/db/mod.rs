// Database module - SQLite provenance archive, schema and key material

pub mod models;
pub mod store;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use crate::crypto::{generate_salt, KdfParams};
use crate::error::ImportError;
pub use models::{FileRecord, FileStatus, ValuationRecord};
pub use store::{
    ArchiveStore, DecodedPayload, ImportItem, InsertOutcome, VerifyFailure, VerifyReport,
    PLANNED_ARCHIVE_NOTE,
};

pub const SCHEMA_VERSION: &str = "1";

pub const META_SCHEMA_VERSION: &str = "schema_version";
pub const META_KDF_SALT: &str = "kdf_salt";
pub const META_KDF_PARAMS: &str = "kdf_params";
pub const META_KEY_CHECK: &str = "key_check";

/// Salt and KDF cost recorded in `meta`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub salt: Vec<u8>,
    pub params: KdfParams,
}

/// Open (creating if needed) a read-write database connection
pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }

    let conn =
        Connection::open(path).with_context(|| format!("Failed to open database at {:?}", path))?;

    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("Failed to enable foreign keys")?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .context("Failed to enable WAL journal")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("Failed to set synchronous mode")?;

    Ok(conn)
}

/// Open an existing database without write access
pub fn open_db_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open database at {:?} read-only", path))
}

/// Initialize the schema and key material
///
/// Safe to call on every run: tables are created only when absent, and the
/// salt and KDF parameters are generated only the first time. Existing values
/// are never replaced.
pub fn init_database(conn: &Connection, kdf: &KdfParams) -> Result<KeyMaterial> {
    let schema_sql = include_str!("schema.sql");
    conn.execute_batch(schema_sql)
        .context("Failed to execute schema")?;

    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![META_SCHEMA_VERSION, SCHEMA_VERSION],
    )?;

    if insert_meta_once(conn, META_KDF_SALT, &hex::encode(generate_salt()))? {
        info!("Generated key-derivation salt for new database");
    }
    insert_meta_once(conn, META_KDF_PARAMS, &serde_json::to_string(kdf)?)?;

    read_key_material(conn)
}

/// Read salt and KDF parameters recorded at initialization
pub fn read_key_material(conn: &Connection) -> Result<KeyMaterial> {
    let salt_hex = get_meta(conn, META_KDF_SALT)?
        .ok_or_else(|| ImportError::Db("database has no kdf_salt".to_string()))?;
    let salt = hex::decode(&salt_hex)
        .map_err(|e| ImportError::Db(format!("kdf_salt is not valid hex: {}", e)))?;

    let params = match get_meta(conn, META_KDF_PARAMS)? {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| ImportError::Db(format!("kdf_params is invalid: {}", e)))?,
        None => KdfParams::default(),
    };

    Ok(KeyMaterial { salt, params })
}

pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

/// Insert a meta value unless the key exists; returns whether it was written
pub fn insert_meta_once(conn: &Connection, key: &str, value: &str) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(changed > 0)
}

/// Id of the file record holding `content_hash`, if any
pub fn find_file_by_hash(conn: &Connection, content_hash: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM files WHERE content_hash = ?1",
            [content_hash],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Read-only lookup used by dry runs; never creates the database
pub fn content_hash_known(db_path: &Path, content_hash: &str) -> Result<Option<i64>> {
    if !db_path.is_file() {
        return Ok(None);
    }
    let conn = open_db_read_only(db_path)?;
    let has_files_table: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'files'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if has_files_table.is_none() {
        debug!("Database at {:?} has no files table yet", db_path);
        return Ok(None);
    }
    find_file_by_hash(&conn, content_hash)
}

/// All file records, oldest first (metadata only)
pub fn list_files(conn: &Connection) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, source, original_name, canonical_path, content_hash, size, mtime,
                imported_at, status, archive_path, notes, content_cipher IS NOT NULL
         FROM files
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        let status: String = row.get(8)?;
        Ok(FileRecord {
            id: row.get(0)?,
            source: row.get(1)?,
            original_name: row.get(2)?,
            canonical_path: row.get(3)?,
            content_hash: row.get(4)?,
            size: row.get(5)?,
            mtime: row.get(6)?,
            imported_at: row.get(7)?,
            status: status.parse().unwrap_or(FileStatus::Imported),
            archive_path: row.get(9)?,
            notes: row.get(10)?,
            encrypted: row.get(11)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

/// All valuation records, oldest first (metadata only)
pub fn list_valuations(conn: &Connection) -> Result<Vec<ValuationRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, as_of_date, source, file_id, ingested_at
         FROM valuations
         ORDER BY id ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(ValuationRecord {
            id: row.get(0)?,
            as_of_date: row.get(1)?,
            source: row.get(2)?,
            file_id: row.get(3)?,
            ingested_at: row.get(4)?,
        })
    })?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FAST: KdfParams = KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    };

    fn fresh_db() -> (TempDir, Connection) {
        let dir = TempDir::new().unwrap();
        let conn = open_db(&dir.path().join("nested").join("local.sqlite3")).unwrap();
        (dir, conn)
    }

    #[test]
    fn test_init_is_idempotent_and_keeps_salt() {
        let (_dir, conn) = fresh_db();
        let first = init_database(&conn, &FAST).unwrap();
        let second = init_database(&conn, &KdfParams::default()).unwrap();

        assert_eq!(first.salt.len(), crate::crypto::SALT_LEN);
        assert_eq!(first, second, "salt and params must survive re-init");
        assert_eq!(second.params, FAST);
        assert_eq!(
            get_meta(&conn, META_SCHEMA_VERSION).unwrap().as_deref(),
            Some(SCHEMA_VERSION)
        );
    }

    #[test]
    fn test_salt_cannot_be_overwritten() {
        let (_dir, conn) = fresh_db();
        init_database(&conn, &FAST).unwrap();

        let err = conn
            .execute(
                "UPDATE meta SET value = '00' WHERE key = ?1",
                [META_KDF_SALT],
            )
            .unwrap_err();
        assert!(err.to_string().contains("cannot change"));
        assert!(conn
            .execute("DELETE FROM meta WHERE key = ?1", [META_KDF_SALT])
            .is_err());
    }

    #[test]
    fn test_content_hash_known_without_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.sqlite3");
        assert_eq!(content_hash_known(&path, "abc").unwrap(), None);
        assert!(!path.exists(), "lookup must not create the database");
    }

    #[test]
    fn test_empty_listing() {
        let (_dir, conn) = fresh_db();
        init_database(&conn, &FAST).unwrap();
        assert!(list_files(&conn).unwrap().is_empty());
        assert!(list_valuations(&conn).unwrap().is_empty());
    }
}
