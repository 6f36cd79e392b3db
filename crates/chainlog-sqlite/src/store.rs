//! `SQLite`-backed chain store.
//!
//! Each append runs in a `BEGIN IMMEDIATE` transaction, so the tail read,
//! the insert and the back-reference update are serialized against every
//! other connection to the same database file, including connections held
//! by other processes. WAL mode keeps readers from blocking the writer.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chainlog_ledger::{
    ensure_extends, ChainAdmin, ChainStore, EntryBuilder, LedgerError, ResetSummary,
};
use chainlog_types::{
    BackReference, ChainEntry, ChainTail, Checkpoint, EntryHash, EntryKind, EntryTimestamp,
    Payload,
};
use rusqlite::{ffi, params, Connection, ErrorCode, OpenFlags, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::options::{ReferenceColumn, SqliteOptions};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

const ENTRY_COLUMNS: &str = "sequence, type, timestamp, data, metadata, previous_hash, hash";

/// Chain store over a single `SQLite` connection.
pub struct SqliteChainStore {
    conn: Mutex<Connection>,
    references: Vec<ReferenceColumn>,
    path: Option<PathBuf>,
}

impl SqliteChainStore {
    /// Open or create the chain tables in the database at `path`.
    pub fn open(path: impl AsRef<Path>, options: SqliteOptions) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(map_sql)?;
        let store = Self::initialize(conn, options, Some(path.to_path_buf()))?;
        debug!(path = %path.display(), "opened sqlite chain store");
        Ok(store)
    }

    /// A private in-memory database, mainly for tests.
    pub fn in_memory(options: SqliteOptions) -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().map_err(map_sql)?;
        Self::initialize(conn, options, None)
    }

    fn initialize(
        conn: Connection,
        options: SqliteOptions,
        path: Option<PathBuf>,
    ) -> Result<Self, LedgerError> {
        for reference in &options.references {
            reference.validate()?;
        }
        conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))
            .map_err(map_sql)?;
        conn.execute_batch(SCHEMA_SQL).map_err(map_sql)?;
        Ok(Self {
            conn: Mutex::new(conn),
            references: options.references,
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    fn reference_column(&self, table: &str) -> Result<&ReferenceColumn, LedgerError> {
        self.references
            .iter()
            .find(|r| r.table == table)
            .ok_or_else(|| LedgerError::UnknownReferenceTable(table.to_string()))
    }

    fn apply_reference(
        &self,
        conn: &Connection,
        link: &BackReference,
        sequence: u64,
    ) -> Result<(), LedgerError> {
        let column = self.reference_column(&link.table)?;
        let sql = format!(
            "UPDATE \"{}\" SET \"{}\" = ?1 WHERE \"{}\" = ?2",
            column.table, column.column, column.key_column
        );
        let updated = conn
            .execute(&sql, params![sequence, link.record_id])
            .map_err(map_sql)?;
        if updated == 0 {
            return Err(LedgerError::ReferenceNotFound {
                table: link.table.clone(),
                record_id: link.record_id.clone(),
            });
        }
        Ok(())
    }
}

/// Busy/locked databases and a racing insert at the same sequence (primary
/// key or unique violation) are conflicts. Every other failure, including
/// CHECK, NOT NULL and foreign key violations from a back-reference update,
/// is a storage error and is not retried.
fn map_sql(err: rusqlite::Error) -> LedgerError {
    if is_transient(&err) {
        LedgerError::Conflict(err.to_string())
    } else {
        LedgerError::Storage(err.to_string())
    }
}

fn is_transient(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => true,
            ErrorCode::ConstraintViolation => matches!(
                failure.extended_code,
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
            ),
            _ => false,
        },
        _ => false,
    }
}

/// Row as stored, before decoding.
struct RawEntry {
    sequence: i64,
    kind: String,
    timestamp: String,
    data: String,
    metadata: String,
    previous_hash: Option<String>,
    hash: String,
}

impl RawEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sequence: row.get(0)?,
            kind: row.get(1)?,
            timestamp: row.get(2)?,
            data: row.get(3)?,
            metadata: row.get(4)?,
            previous_hash: row.get(5)?,
            hash: row.get(6)?,
        })
    }

    /// Decode into an entry. A malformed `type` is kept verbatim so that the
    /// verifier reports it; other undecodable columns are corruption.
    fn decode(self) -> Result<ChainEntry, LedgerError> {
        let sequence = self.sequence as u64;
        let corrupt = |reason: String| LedgerError::Corrupt { sequence, reason };

        let kind = self
            .kind
            .parse::<EntryKind>()
            .unwrap_or_else(|_| EntryKind::Custom(self.kind.clone()));
        let timestamp = EntryTimestamp::parse(&self.timestamp)
            .map_err(|e| corrupt(format!("timestamp: {e}")))?;
        let data: Payload =
            serde_json::from_str(&self.data).map_err(|e| corrupt(format!("data: {e}")))?;
        let metadata: Payload =
            serde_json::from_str(&self.metadata).map_err(|e| corrupt(format!("metadata: {e}")))?;
        let previous_hash = self
            .previous_hash
            .as_deref()
            .map(EntryHash::from_hex)
            .transpose()
            .map_err(|e| corrupt(format!("previous_hash: {e}")))?;
        let hash = EntryHash::from_hex(&self.hash).map_err(|e| corrupt(format!("hash: {e}")))?;

        Ok(ChainEntry {
            sequence,
            kind,
            timestamp,
            data,
            metadata,
            previous_hash,
            hash,
        })
    }
}

fn encode_payload(sequence: u64, payload: &Payload) -> Result<String, LedgerError> {
    serde_json::to_string(payload)
        .map_err(|e| LedgerError::Storage(format!("serializing payload of seq {sequence}: {e}")))
}

fn insert_entry(conn: &Connection, entry: &ChainEntry) -> Result<(), LedgerError> {
    let data = encode_payload(entry.sequence, &entry.data)?;
    let metadata = encode_payload(entry.sequence, &entry.metadata)?;
    conn.execute(
        "INSERT INTO chain_entries (sequence, type, timestamp, data, metadata, previous_hash, hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.sequence,
            entry.kind.as_str(),
            entry.timestamp.to_canonical(),
            data,
            metadata,
            entry.previous_hash.map(|h| h.to_hex()),
            entry.hash.to_hex(),
        ],
    )
    .map_err(map_sql)?;
    Ok(())
}

fn query_tail(conn: &Connection) -> Result<Option<ChainTail>, LedgerError> {
    let row = conn
        .query_row(
            "SELECT sequence, hash FROM chain_entries ORDER BY sequence DESC LIMIT 1",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(map_sql)?;
    row.map(|(sequence, hash)| {
        let sequence = sequence as u64;
        let hash = EntryHash::from_hex(&hash).map_err(|e| LedgerError::Corrupt {
            sequence,
            reason: format!("hash: {e}"),
        })?;
        Ok(ChainTail { sequence, hash })
    })
    .transpose()
}

fn decode_checkpoint(sequence: i64, hash: &str, created_at: &str) -> Result<Checkpoint, LedgerError> {
    let sequence = sequence as u64;
    let corrupt = |reason: String| LedgerError::Corrupt { sequence, reason };
    Ok(Checkpoint {
        sequence,
        hash: EntryHash::from_hex(hash).map_err(|e| corrupt(format!("checkpoint hash: {e}")))?,
        created_at: EntryTimestamp::parse(created_at)
            .map_err(|e| corrupt(format!("checkpoint created_at: {e}")))?,
    })
}

fn query_checkpoints(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Checkpoint>, LedgerError> {
    let mut stmt = conn.prepare(sql).map_err(map_sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(map_sql)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sql)?;
    rows.iter()
        .map(|(sequence, hash, created_at)| decode_checkpoint(*sequence, hash, created_at))
        .collect()
}

impl ChainStore for SqliteChainStore {
    fn append_atomic(
        &self,
        build: &mut EntryBuilder<'_>,
        link: Option<&BackReference>,
    ) -> Result<ChainEntry, LedgerError> {
        let mut conn = self.lock()?;
        // Dropping `tx` on any early return rolls the whole append back.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql)?;

        let tail = query_tail(&tx)?;
        let entry = build(tail.as_ref())?;
        ensure_extends(tail.as_ref(), &entry)?;
        insert_entry(&tx, &entry)?;
        if let Some(link) = link {
            self.apply_reference(&tx, link, entry.sequence)?;
        }

        tx.commit().map_err(map_sql)?;
        Ok(entry)
    }

    fn tail(&self) -> Result<Option<ChainTail>, LedgerError> {
        let conn = self.lock()?;
        query_tail(&conn)
    }

    fn get(&self, sequence: u64) -> Result<Option<ChainEntry>, LedgerError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM chain_entries WHERE sequence = ?1"),
                params![sequence],
                RawEntry::from_row,
            )
            .optional()
            .map_err(map_sql)?;
        raw.map(RawEntry::decode).transpose()
    }

    fn read_range(&self, from: u64, to: u64) -> Result<Vec<ChainEntry>, LedgerError> {
        if from == 0 || from > to {
            return Err(LedgerError::InvalidRange { from, to });
        }
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM chain_entries
                 WHERE sequence BETWEEN ?1 AND ?2
                 ORDER BY sequence ASC"
            ))
            .map_err(map_sql)?;
        let rows = stmt
            .query_map(params![from, to], RawEntry::from_row)
            .map_err(map_sql)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sql)?;
        rows.into_iter().map(RawEntry::decode).collect()
    }

    fn entry_count(&self) -> Result<u64, LedgerError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chain_entries", [], |row| row.get(0))
            .map_err(map_sql)?;
        Ok(count as u64)
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), LedgerError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO chain_checkpoints (sequence, hash, created_at)
             VALUES (?1, ?2, ?3)",
            params![
                checkpoint.sequence,
                checkpoint.hash.to_hex(),
                checkpoint.created_at.to_canonical(),
            ],
        )
        .map_err(map_sql)?;
        Ok(())
    }

    fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, LedgerError> {
        let conn = self.lock()?;
        Ok(query_checkpoints(
            &conn,
            "SELECT sequence, hash, created_at FROM chain_checkpoints
             ORDER BY sequence DESC LIMIT 1",
            [],
        )?
        .pop())
    }

    fn checkpoint_at(&self, sequence: u64) -> Result<Option<Checkpoint>, LedgerError> {
        let conn = self.lock()?;
        Ok(query_checkpoints(
            &conn,
            "SELECT sequence, hash, created_at FROM chain_checkpoints WHERE sequence = ?1",
            params![sequence],
        )?
        .pop())
    }

    fn checkpoints(&self) -> Result<Vec<Checkpoint>, LedgerError> {
        let conn = self.lock()?;
        query_checkpoints(
            &conn,
            "SELECT sequence, hash, created_at FROM chain_checkpoints ORDER BY sequence ASC",
            [],
        )
    }
}

impl ChainAdmin for SqliteChainStore {
    fn wipe(&self) -> Result<ResetSummary, LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql)?;

        let checkpoints_deleted = tx
            .execute("DELETE FROM chain_checkpoints", [])
            .map_err(map_sql)? as u64;
        let entries_deleted = tx.execute("DELETE FROM chain_entries", []).map_err(map_sql)? as u64;
        let mut references_cleared = 0;
        for column in &self.references {
            let sql = format!(
                "UPDATE \"{table}\" SET \"{col}\" = NULL WHERE \"{col}\" IS NOT NULL",
                table = column.table,
                col = column.column
            );
            references_cleared += tx.execute(&sql, []).map_err(map_sql)? as u64;
        }

        tx.commit().map_err(map_sql)?;
        Ok(ResetSummary {
            entries_deleted,
            checkpoints_deleted,
            references_cleared,
        })
    }
}
