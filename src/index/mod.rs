//! Archive indexing: a one-pass scan that records checkpoints and line
//! anchors into the catalog, enabling random access into gzip archives.

pub mod catalog;
pub mod inflater;

pub use catalog::{Catalog, CheckpointRecord, FileRow, LineAnchor};

use std::fs::File;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;

use crate::error::{Result, SplitError};
use crate::utils::config::{CatalogConsts, IndexerConsts};
use inflater::{InflateError, Inflater};

/// Result of an index build request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildOutcome {
    /// A matching index already existed; nothing was written.
    AlreadyBuilt { num_lines: u64, num_bytes: u64 },
    /// The index was (re)built in this call.
    Built {
        num_lines: u64,
        num_bytes: u64,
        checkpoints: u64,
    },
}

impl BuildOutcome {
    pub fn num_lines(&self) -> u64 {
        match *self {
            BuildOutcome::AlreadyBuilt { num_lines, .. } => num_lines,
            BuildOutcome::Built { num_lines, .. } => num_lines,
        }
    }

    pub fn num_bytes(&self) -> u64 {
        match *self {
            BuildOutcome::AlreadyBuilt { num_bytes, .. } => num_bytes,
            BuildOutcome::Built { num_bytes, .. } => num_bytes,
        }
    }
}

/// Build options. A `checkpoint_size` of 0 is treated as 1 byte.
#[derive(Clone, Copy, Debug)]
pub struct IndexOptions {
    pub checkpoint_size: u64,
    pub force_rebuild: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            checkpoint_size: IndexerConsts::DEFAULT_CHECKPOINT_SIZE,
            force_rebuild: false,
        }
    }
}

/// Canonical path string used as the `files.path` key. Readers must resolve
/// paths the same way or lookups will miss.
pub(crate) fn canonical_path_string(path: &Path) -> Result<String> {
    let canon = std::fs::canonicalize(path).map_err(|e| SplitError::io(path, e))?;
    Ok(canon.to_string_lossy().into_owned())
}

/// Build (or reuse) the index for `archive` inside `catalog_path`.
///
/// The scan decompresses the archive exactly once, counting lines and
/// recording a checkpoint at the first DEFLATE block boundary after every
/// `checkpoint_size` decompressed bytes. All rows land in one transaction
/// with the `files` row last, so a crashed build leaves no visible entry.
///
/// Multi-member archives are treated as a single stream ending at the first
/// member's trailer; bytes past it are ignored.
pub fn build(archive: &Path, catalog_path: &Path, opts: &IndexOptions) -> Result<BuildOutcome> {
    let checkpoint_size = opts.checkpoint_size.max(1);
    let canon = canonical_path_string(archive)?;
    let size_compressed = std::fs::metadata(archive)
        .map_err(|e| SplitError::io(archive, e))?
        .len();

    let mut catalog = Catalog::create(catalog_path)?;

    if !opts.force_rebuild
        && let Some(row) = catalog.file_by_path(&canon)?
    {
        if row.size_compressed == size_compressed
            && row.checkpoint_size == checkpoint_size
            && row.schema_version == CatalogConsts::SCHEMA_VERSION
        {
            debug!("index for {} is current, skipping rebuild", canon);
            return Ok(BuildOutcome::AlreadyBuilt {
                num_lines: row.num_lines,
                num_bytes: row.size_decompressed,
            });
        }
        debug!(
            "index for {} is stale (size {} vs {}, checkpoint_size {} vs {}), rebuilding",
            canon, row.size_compressed, size_compressed, row.checkpoint_size, checkpoint_size
        );
    }

    let mut file = File::open(archive).map_err(|e| SplitError::io(archive, e))?;

    let tx = catalog.transaction()?;
    catalog::delete_file_data(&tx, &canon)?;
    let file_id = catalog::next_file_id(&tx)?;

    // Initial checkpoint: plain gzip decode from offset 0.
    catalog::insert_checkpoint(&tx, file_id, 0, 0, 0, 1, 0, 0, &[])?;

    let scan = scan_archive(&mut file, archive, &tx, file_id, checkpoint_size)?;

    if !scan.anchors.is_empty() {
        catalog::insert_line_anchors(&tx, file_id, &scan.anchors)?;
    }

    let built_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    catalog::insert_file_row(
        &tx,
        &FileRow {
            file_id,
            path: canon.clone(),
            size_compressed,
            size_decompressed: scan.num_bytes,
            num_lines: scan.num_lines,
            checkpoint_size,
            schema_version: CatalogConsts::SCHEMA_VERSION,
            built_at,
        },
    )?;
    tx.commit()?;

    debug!(
        "indexed {}: {} lines, {} bytes, {} checkpoints",
        canon, scan.num_lines, scan.num_bytes, scan.checkpoints
    );
    Ok(BuildOutcome::Built {
        num_lines: scan.num_lines,
        num_bytes: scan.num_bytes,
        checkpoints: scan.checkpoints,
    })
}

struct ScanSummary {
    num_lines: u64,
    num_bytes: u64,
    checkpoints: u64,
    anchors: Vec<LineAnchor>,
}

fn scan_archive(
    file: &mut File,
    archive: &Path,
    tx: &rusqlite::Transaction<'_>,
    file_id: i64,
    checkpoint_size: u64,
) -> Result<ScanSummary> {
    let anchor_interval = IndexerConsts::line_map_interval(checkpoint_size);
    let mut inflater = Inflater::gzip().map_err(|e| map_inflate(archive, e))?;
    let mut out = vec![0u8; IndexerConsts::PROCESS_BUFFER_SIZE];

    let mut uc_off: u64 = 0;
    let mut newlines: u64 = 0;
    let mut cur_line_start: u64 = 0;
    let mut prev_line_start: u64 = 0;
    let mut last_byte: u8 = 0;
    let mut anchors: Vec<LineAnchor> = Vec::new();
    let mut last_anchor_off: u64 = 0;
    let mut last_ckpt_uc: u64 = 0;
    let mut ckpt_idx: u64 = 1;

    loop {
        let n = inflater
            .read(file, &mut out)
            .map_err(|e| map_inflate(archive, e))?;
        if n == 0 {
            break;
        }

        if anchors.is_empty() {
            anchors.push(LineAnchor {
                line_number: 1,
                decompressed_off: 0,
            });
        }

        for (i, &b) in out[..n].iter().enumerate() {
            if b == b'\n' {
                newlines += 1;
                let next_start = uc_off + i as u64 + 1;
                prev_line_start = cur_line_start;
                cur_line_start = next_start;
                if next_start - last_anchor_off >= anchor_interval {
                    // Provisional anchor for the next line; dropped at end of
                    // scan if the stream stops exactly here.
                    anchors.push(LineAnchor {
                        line_number: newlines + 1,
                        decompressed_off: next_start,
                    });
                    last_anchor_off = next_start;
                }
            }
        }
        last_byte = out[n - 1];
        uc_off += n as u64;

        if uc_off - last_ckpt_uc >= checkpoint_size
            && !inflater.finished()
            && inflater.at_block_boundary()
            && let Some((num_unused_bits, bits)) = inflater.unused_bits()
        {
            let window = inflater.window().map_err(|e| map_inflate(archive, e))?;
            if !window.is_empty() {
                let line_number = if cur_line_start == uc_off {
                    newlines + 1
                } else {
                    newlines + 2
                };
                catalog::insert_checkpoint(
                    tx,
                    file_id,
                    ckpt_idx,
                    inflater.compressed_off(),
                    uc_off,
                    line_number,
                    bits,
                    num_unused_bits,
                    &window,
                )?;
                ckpt_idx += 1;
                last_ckpt_uc = uc_off;
            }
        }
    }

    // A final line without a trailing newline still counts.
    let num_lines = if uc_off == 0 {
        0
    } else if last_byte == b'\n' {
        newlines
    } else {
        newlines + 1
    };

    // Drop the provisional anchor past the last line (file ended on '\n'),
    // then make sure the last line's start is anchored.
    while anchors.last().is_some_and(|a| a.line_number > num_lines) {
        anchors.pop();
    }
    if num_lines > 0 {
        let final_start = if last_byte == b'\n' {
            prev_line_start
        } else {
            cur_line_start
        };
        if anchors.last().is_none_or(|a| a.line_number < num_lines) {
            anchors.push(LineAnchor {
                line_number: num_lines,
                decompressed_off: final_start,
            });
        }
    }

    Ok(ScanSummary {
        num_lines,
        num_bytes: uc_off,
        checkpoints: ckpt_idx,
        anchors,
    })
}

fn map_inflate(archive: &Path, e: InflateError) -> SplitError {
    match e {
        InflateError::Io(e) => SplitError::io(archive, e),
        InflateError::Data(msg) => SplitError::corrupt_archive(archive, msg),
    }
}
