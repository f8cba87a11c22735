//! Encrypted archive store
//!
//! Owns every persisted row. File content and decoded payloads are sealed
//! with AES-256-GCM under a key derived from the operator passphrase; the
//! content hash stays in clear so re-imports can be detected without a key.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use super::{
    find_file_by_hash, get_meta, init_database, insert_meta_once, list_files, list_valuations,
    open_db, FileRecord, FileStatus, ValuationRecord, META_KEY_CHECK,
};
use crate::crypto::{derive_key, CryptoError, KdfParams, Passphrase, Sealer};
use crate::error::ImportError;
use crate::importers::SourceKind;

const KEY_CHECK_TOKEN: &[u8] = b"folio key check v1";

/// Notes on rows whose archive path is written before the original is moved
pub const PLANNED_ARCHIVE_NOTE: &str = "archive_path is the planned destination, recorded before the move";

/// Decoded payload ready for sealing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub as_of_date: NaiveDate,
    pub bytes: Vec<u8>,
}

/// Everything the store records about one selected file
#[derive(Debug, Clone)]
pub struct ImportItem<'a> {
    pub kind: SourceKind,
    pub original_name: &'a str,
    pub canonical_path: &'a Path,
    pub content_hash: &'a str,
    pub bytes: &'a [u8],
    pub modified: DateTime<Utc>,
    /// Where the original will live after archiving
    pub archive_path: Option<&'a Path>,
    pub payload: Option<DecodedPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum InsertOutcome {
    Inserted {
        file_id: i64,
        valuation_id: Option<i64>,
    },
    /// Byte-identical content was already archived; nothing written
    Duplicate { file_id: i64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyFailure {
    pub table: &'static str,
    pub id: i64,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub failures: Vec<VerifyFailure>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ArchiveStore {
    conn: Connection,
    sealer: Sealer,
}

impl ArchiveStore {
    /// Open (initializing if needed) the archive and derive the key.
    ///
    /// Fails with [`CryptoError::AuthenticationFailed`] when the passphrase
    /// does not match the one the database was first opened with.
    pub fn open(path: &Path, passphrase: &Passphrase, kdf: &KdfParams) -> Result<Self> {
        let conn = open_db(path)?;
        let material = init_database(&conn, kdf)?;
        let key = derive_key(passphrase, &material.salt, &material.params)?;
        let sealer = Sealer::new(&key);

        check_passphrase(&conn, &sealer)
            .with_context(|| format!("Passphrase does not match database {:?}", path))?;

        info!("Opened encrypted archive at {:?}", path);
        Ok(Self { conn, sealer })
    }

    /// Record one imported file.
    ///
    /// Idempotent on content hash: byte-identical content already on record
    /// yields [`InsertOutcome::Duplicate`] and writes nothing. The file row and
    /// its valuation row are written in one transaction.
    pub fn insert_import(&mut self, item: &ImportItem<'_>) -> Result<InsertOutcome> {
        if let Some(file_id) = find_file_by_hash(&self.conn, item.content_hash)? {
            debug!(
                "{} already archived as file #{} ({})",
                item.original_name, file_id, item.content_hash
            );
            return Ok(InsertOutcome::Duplicate { file_id });
        }

        let content = self.sealer.seal(item.bytes)?;
        let payload = match &item.payload {
            Some(p) => Some((p.as_of_date, self.sealer.seal(&p.bytes)?)),
            None => None,
        };

        let (status, notes) = if item.archive_path.is_some() {
            (FileStatus::Archived, Some(PLANNED_ARCHIVE_NOTE))
        } else {
            (FileStatus::Imported, None)
        };
        let now = Utc::now();

        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "INSERT INTO files (
                source, original_name, canonical_path, content_hash, size, mtime,
                imported_at, status, archive_path, notes, content_cipher, content_nonce
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(content_hash) DO NOTHING",
            params![
                item.kind.as_str(),
                item.original_name,
                item.canonical_path.to_string_lossy().into_owned(),
                item.content_hash,
                item.bytes.len() as i64,
                item.modified,
                now,
                status.as_str(),
                item.archive_path
                    .map(|p| p.to_string_lossy().into_owned()),
                notes,
                content.ciphertext,
                content.nonce,
            ],
        )?;

        if inserted == 0 {
            let file_id = find_file_by_hash(&tx, item.content_hash)?
                .ok_or_else(|| ImportError::Db("hash conflict without a row".to_string()))?;
            tx.commit()?;
            return Ok(InsertOutcome::Duplicate { file_id });
        }
        let file_id = tx.last_insert_rowid();

        let valuation_id = match payload {
            Some((as_of_date, blob)) => {
                tx.execute(
                    "INSERT INTO valuations (
                        as_of_date, source, file_id, payload_cipher, payload_nonce, ingested_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        as_of_date,
                        item.kind.as_str(),
                        file_id,
                        blob.ciphertext,
                        blob.nonce,
                        now
                    ],
                )?;
                Some(tx.last_insert_rowid())
            }
            None => None,
        };

        tx.commit()?;
        info!(
            "Archived {} as file #{}{}",
            item.original_name,
            file_id,
            valuation_id
                .map(|id| format!(" with valuation #{}", id))
                .unwrap_or_default()
        );
        Ok(InsertOutcome::Inserted {
            file_id,
            valuation_id,
        })
    }

    /// Decrypt and authenticate the stored bytes of file record `id`
    pub fn file_content(&self, id: i64) -> Result<Vec<u8>> {
        let row: Option<(Option<Vec<u8>>, Option<Vec<u8>>)> = self
            .conn
            .query_row(
                "SELECT content_cipher, content_nonce FROM files WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Err(ImportError::Db(format!("no file record with id {}", id)).into()),
            Some((Some(cipher), Some(nonce))) => Ok(self.sealer.open(&cipher, &nonce)?),
            Some(_) => {
                Err(ImportError::Db(format!("file record {} has no encrypted content", id)).into())
            }
        }
    }

    /// Decrypt and authenticate the payload of valuation record `id`
    pub fn valuation_payload(&self, id: i64) -> Result<Vec<u8>> {
        let (cipher, nonce): (Vec<u8>, Vec<u8>) = self
            .conn
            .query_row(
                "SELECT payload_cipher, payload_nonce FROM valuations WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| ImportError::Db(format!("no valuation record with id {}", id)))?;

        Ok(self.sealer.open(&cipher, &nonce)?)
    }

    /// Authenticate every sealed blob in the archive
    pub fn verify(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport::default();

        let mut stmt = self.conn.prepare(
            "SELECT id, content_cipher, content_nonce FROM files
             WHERE content_cipher IS NOT NULL ORDER BY id",
        )?;
        let files = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?, row.get::<_, Option<Vec<u8>>>(2)?))
        })?;
        for row in files {
            let (id, cipher, nonce) = row?;
            report.checked += 1;
            let nonce = nonce.unwrap_or_default();
            if let Err(e) = self.sealer.open(&cipher, &nonce) {
                report.failures.push(VerifyFailure {
                    table: "files",
                    id,
                    error: e.to_string(),
                });
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, payload_cipher, payload_nonce FROM valuations ORDER BY id",
        )?;
        let valuations = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?, row.get::<_, Vec<u8>>(2)?))
        })?;
        for row in valuations {
            let (id, cipher, nonce) = row?;
            report.checked += 1;
            if let Err(e) = self.sealer.open(&cipher, &nonce) {
                report.failures.push(VerifyFailure {
                    table: "valuations",
                    id,
                    error: e.to_string(),
                });
            }
        }

        Ok(report)
    }

    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        list_files(&self.conn)
    }

    pub fn list_valuations(&self) -> Result<Vec<ValuationRecord>> {
        list_valuations(&self.conn)
    }
}

/// Compare against the sealed token in `meta`, recording one on first use.
fn check_passphrase(conn: &Connection, sealer: &Sealer) -> Result<()> {
    match get_meta(conn, META_KEY_CHECK)? {
        Some(encoded) => {
            let (nonce_hex, cipher_hex) = encoded
                .split_once(':')
                .ok_or_else(|| ImportError::Db("key_check is malformed".to_string()))?;
            let nonce = hex::decode(nonce_hex)
                .map_err(|e| ImportError::Db(format!("key_check nonce: {}", e)))?;
            let cipher = hex::decode(cipher_hex)
                .map_err(|e| ImportError::Db(format!("key_check cipher: {}", e)))?;

            let plain = sealer.open(&cipher, &nonce)?;
            if plain != KEY_CHECK_TOKEN {
                return Err(CryptoError::AuthenticationFailed.into());
            }
            Ok(())
        }
        None => {
            let blob = sealer.seal(KEY_CHECK_TOKEN)?;
            let encoded = format!("{}:{}", hex::encode(&blob.nonce), hex::encode(&blob.ciphertext));
            insert_meta_once(conn, META_KEY_CHECK, &encoded)?;
            debug!("Recorded passphrase check token");
            Ok(())
        }
    }
}
