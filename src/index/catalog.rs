//! Catalog storage: schema, open/create, checkpoint and line-anchor queries.
//!
//! One SQLite database per archive. A build holds the single writer; any
//! number of readers open the catalog read-only afterwards. The `files` row
//! is written last inside the build transaction, so its absence marks a
//! partial or foreign database.

use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, params};

use crate::error::Result;
use crate::utils::config::CatalogConsts;

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Applied
/// after PRAGMA journal_mode = WAL on writable connections.
const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

/// Schema for files, checkpoints, and line-anchor tables.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    file_id INTEGER PRIMARY KEY,
    path TEXT UNIQUE NOT NULL,
    size_compressed INTEGER NOT NULL,
    size_decompressed INTEGER NOT NULL,
    num_lines INTEGER NOT NULL,
    checkpoint_size INTEGER NOT NULL,
    schema_version INTEGER NOT NULL,
    built_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS checkpoints (
    file_id INTEGER NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
    ckpt_idx INTEGER NOT NULL,
    compressed_off INTEGER NOT NULL,
    decompressed_off INTEGER NOT NULL,
    line_number INTEGER NOT NULL,
    bits INTEGER NOT NULL,
    num_unused_bits INTEGER NOT NULL,
    window BLOB NOT NULL,
    PRIMARY KEY (file_id, ckpt_idx)
);
CREATE INDEX IF NOT EXISTS checkpoints_off_idx
    ON checkpoints(file_id, decompressed_off);

CREATE TABLE IF NOT EXISTS lines (
    file_id INTEGER NOT NULL REFERENCES files(file_id) ON DELETE CASCADE,
    line_number INTEGER NOT NULL,
    decompressed_off INTEGER NOT NULL,
    PRIMARY KEY (file_id, line_number)
);
CREATE INDEX IF NOT EXISTS lines_off_idx
    ON lines(file_id, decompressed_off);
"#;

const INSERT_CHECKPOINT_SQL: &str = "INSERT INTO checkpoints \
     (file_id, ckpt_idx, compressed_off, decompressed_off, line_number, bits, num_unused_bits, window) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const INSERT_LINE_SQL: &str =
    "INSERT INTO lines (file_id, line_number, decompressed_off) VALUES (?1, ?2, ?3)";

/// `files` row as stored.
#[derive(Clone, Debug)]
pub struct FileRow {
    pub file_id: i64,
    pub path: String,
    pub size_compressed: u64,
    pub size_decompressed: u64,
    pub num_lines: u64,
    pub checkpoint_size: u64,
    pub schema_version: i64,
    pub built_at: i64,
}

/// A checkpoint as stored: offsets, bit state, and the window blob still in
/// its compressed form. The blob stays compressed until a stream actually
/// resumes from it.
#[derive(Clone, Debug)]
pub struct CheckpointRecord {
    pub ckpt_idx: u64,
    pub compressed_off: u64,
    pub decompressed_off: u64,
    pub line_number: u64,
    pub bits: u8,
    pub num_unused_bits: u8,
    pub window_blob: Vec<u8>,
}

impl CheckpointRecord {
    /// The initial checkpoint: gzip-framed decode from offset 0.
    pub fn initial() -> Self {
        Self {
            ckpt_idx: 0,
            compressed_off: 0,
            decompressed_off: 0,
            line_number: 1,
            bits: 0,
            num_unused_bits: 0,
            window_blob: Vec::new(),
        }
    }

    /// True when resuming means a fresh gzip decode rather than a raw one.
    pub fn is_initial(&self) -> bool {
        self.decompressed_off == 0 && self.window_blob.is_empty()
    }

    /// Inflate the stored window blob back to the raw sliding window.
    pub fn decompress_window(&self) -> std::io::Result<Vec<u8>> {
        let mut window = Vec::with_capacity(crate::utils::config::IndexerConsts::WINDOW_SIZE);
        ZlibDecoder::new(self.window_blob.as_slice()).read_to_end(&mut window)?;
        Ok(window)
    }
}

/// Sparse line-map entry: a known line start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineAnchor {
    pub line_number: u64,
    pub decompressed_off: u64,
}

/// An open catalog database.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create a writable catalog and ensure schema + WAL.
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch(WAL_PRAGMAS)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open an existing catalog read-only. Fails if the file is absent.
    pub fn open_readonly(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    pub(crate) fn transaction(&mut self) -> Result<Transaction<'_>> {
        let tx = self.conn.transaction()?;
        // The `files` row is written last within a build transaction (see
        // module docs), so FK checks on `checkpoints`/`lines` must be
        // deferred to commit time; this pragma is reset after each commit.
        tx.execute_batch("PRAGMA defer_foreign_keys = ON;")?;
        Ok(tx)
    }

    pub fn file_by_path(&self, path: &str) -> Result<Option<FileRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT file_id, path, size_compressed, size_decompressed, num_lines, \
                 checkpoint_size, schema_version, built_at FROM files WHERE path = ?1",
                [path],
                |row| {
                    Ok(FileRow {
                        file_id: row.get(0)?,
                        path: row.get(1)?,
                        size_compressed: row.get::<_, i64>(2)? as u64,
                        size_decompressed: row.get::<_, i64>(3)? as u64,
                        num_lines: row.get::<_, i64>(4)? as u64,
                        checkpoint_size: row.get::<_, i64>(5)? as u64,
                        schema_version: row.get(6)?,
                        built_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Greatest checkpoint with `decompressed_off <= off`. Always present
    /// for a built file (the initial checkpoint sits at offset 0).
    pub fn checkpoint_at_or_before(
        &self,
        file_id: i64,
        off: u64,
    ) -> Result<Option<CheckpointRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT ckpt_idx, compressed_off, decompressed_off, line_number, bits, \
                 num_unused_bits, window FROM checkpoints \
                 WHERE file_id = ?1 AND decompressed_off <= ?2 \
                 ORDER BY decompressed_off DESC LIMIT 1",
                params![file_id, off as i64],
                Self::map_checkpoint,
            )
            .optional()?;
        Ok(row)
    }

    /// All checkpoints for a file in index order (diagnostics and tests).
    pub fn checkpoints(&self, file_id: i64) -> Result<Vec<CheckpointRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT ckpt_idx, compressed_off, decompressed_off, line_number, bits, \
             num_unused_bits, window FROM checkpoints WHERE file_id = ?1 ORDER BY ckpt_idx",
        )?;
        let rows = stmt.query_map([file_id], Self::map_checkpoint)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Greatest line anchor with `line_number <= line`.
    pub fn line_anchor_for_line(&self, file_id: i64, line: u64) -> Result<Option<LineAnchor>> {
        let row = self
            .conn
            .query_row(
                "SELECT line_number, decompressed_off FROM lines \
                 WHERE file_id = ?1 AND line_number <= ?2 \
                 ORDER BY line_number DESC LIMIT 1",
                params![file_id, line as i64],
                Self::map_anchor,
            )
            .optional()?;
        Ok(row)
    }

    /// Greatest line anchor with `decompressed_off <= off`.
    pub fn line_anchor_for_offset(&self, file_id: i64, off: u64) -> Result<Option<LineAnchor>> {
        let row = self
            .conn
            .query_row(
                "SELECT line_number, decompressed_off FROM lines \
                 WHERE file_id = ?1 AND decompressed_off <= ?2 \
                 ORDER BY decompressed_off DESC LIMIT 1",
                params![file_id, off as i64],
                Self::map_anchor,
            )
            .optional()?;
        Ok(row)
    }

    fn map_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<CheckpointRecord> {
        Ok(CheckpointRecord {
            ckpt_idx: row.get::<_, i64>(0)? as u64,
            compressed_off: row.get::<_, i64>(1)? as u64,
            decompressed_off: row.get::<_, i64>(2)? as u64,
            line_number: row.get::<_, i64>(3)? as u64,
            bits: row.get::<_, i64>(4)? as u8,
            num_unused_bits: row.get::<_, i64>(5)? as u8,
            window_blob: row.get(6)?,
        })
    }

    fn map_anchor(row: &rusqlite::Row<'_>) -> rusqlite::Result<LineAnchor> {
        Ok(LineAnchor {
            line_number: row.get::<_, i64>(0)? as u64,
            decompressed_off: row.get::<_, i64>(1)? as u64,
        })
    }
}

/// Next free file id. Safe under the single-writer build discipline.
pub(crate) fn next_file_id(tx: &Transaction<'_>) -> Result<i64> {
    let id: i64 = tx.query_row("SELECT COALESCE(MAX(file_id), 0) + 1 FROM files", [], |r| {
        r.get(0)
    })?;
    Ok(id)
}

/// Remove every row belonging to `path` (rebuild preparation).
pub(crate) fn delete_file_data(tx: &Transaction<'_>, path: &str) -> Result<()> {
    let file_id: Option<i64> = tx
        .query_row("SELECT file_id FROM files WHERE path = ?1", [path], |r| {
            r.get(0)
        })
        .optional()?;
    if let Some(id) = file_id {
        tx.execute("DELETE FROM checkpoints WHERE file_id = ?1", [id])?;
        tx.execute("DELETE FROM lines WHERE file_id = ?1", [id])?;
        tx.execute("DELETE FROM files WHERE file_id = ?1", [id])?;
    }
    Ok(())
}

/// Insert one checkpoint, compressing the raw window for storage.
pub(crate) fn insert_checkpoint(
    tx: &Transaction<'_>,
    file_id: i64,
    ckpt_idx: u64,
    compressed_off: u64,
    decompressed_off: u64,
    line_number: u64,
    bits: u8,
    num_unused_bits: u8,
    window: &[u8],
) -> Result<()> {
    let blob = if window.is_empty() {
        Vec::new()
    } else {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::best());
        enc.write_all(window)
            .and_then(|_| enc.finish())
            .map_err(|e| crate::error::SplitError::io("<window blob>", e))?
    };
    tx.execute(
        INSERT_CHECKPOINT_SQL,
        params![
            file_id,
            ckpt_idx as i64,
            compressed_off as i64,
            decompressed_off as i64,
            line_number as i64,
            bits as i64,
            num_unused_bits as i64,
            blob
        ],
    )?;
    Ok(())
}

/// Insert line anchors in prepared-statement batches.
pub(crate) fn insert_line_anchors(
    tx: &Transaction<'_>,
    file_id: i64,
    anchors: &[LineAnchor],
) -> Result<()> {
    let mut stmt = tx.prepare(INSERT_LINE_SQL)?;
    for chunk in anchors.chunks(CatalogConsts::INSERT_BATCH_SIZE) {
        for a in chunk {
            stmt.execute(params![
                file_id,
                a.line_number as i64,
                a.decompressed_off as i64
            ])?;
        }
    }
    Ok(())
}

/// Insert the `files` row. Must be the last write of a build transaction.
pub(crate) fn insert_file_row(tx: &Transaction<'_>, row: &FileRow) -> Result<()> {
    tx.execute(
        "INSERT INTO files (file_id, path, size_compressed, size_decompressed, num_lines, \
         checkpoint_size, schema_version, built_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            row.file_id,
            row.path,
            row.size_compressed as i64,
            row.size_decompressed as i64,
            row.num_lines as i64,
            row.checkpoint_size as i64,
            row.schema_version,
            row.built_at
        ],
    )?;
    Ok(())
}
