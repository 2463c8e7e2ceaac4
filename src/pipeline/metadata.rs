//! Per-file metadata collection: sizes, line ranges, event estimates.

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::Result;
use crate::index::{self, IndexOptions};
use crate::io::{json, plain::PlainLines};
use crate::reader::Reader;
use crate::types::FileMetadata;
use crate::utils::config::BYTES_PER_MB;

/// Options threaded to every metadata task.
#[derive(Clone, Debug)]
pub struct MetadataOptions {
    pub checkpoint_size: u64,
    pub force_rebuild: bool,
    /// Directory receiving one catalog per archive.
    pub index_dir: PathBuf,
}

/// Catalog path for an archive inside the index directory. The full path is
/// hashed into the name so equal basenames in different subdirectories get
/// distinct catalogs.
pub fn catalog_path_for(archive: &Path, index_dir: &Path) -> PathBuf {
    let base = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".into());
    let tag = xxhash_rust::xxh3::xxh3_64(archive.as_os_str().as_encoded_bytes());
    index_dir.join(format!("{base}-{tag:08x}.idx"))
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

/// Collect metadata for one file. Never fails outright: problems produce a
/// result with `success = false` so sibling tasks keep running.
pub fn collect_file_metadata(path: &Path, opts: &MetadataOptions) -> FileMetadata {
    let outcome = if is_gzip(path) {
        collect_compressed(path, opts)
    } else {
        collect_plain(path)
    };
    match outcome {
        Ok(meta) => meta,
        Err(e) => {
            warn!("failed to collect metadata for {}: {}", path.display(), e);
            FileMetadata::failed(path.to_path_buf())
        }
    }
}

/// Indexed path: build (or reuse) the catalog, then answer from it without
/// a second decompression pass. `valid_events` is the `num_lines - 2`
/// wrapper-line estimate, good enough for proportional chunk planning.
fn collect_compressed(path: &Path, opts: &MetadataOptions) -> Result<FileMetadata> {
    let catalog_path = catalog_path_for(path, &opts.index_dir);
    index::build(
        path,
        &catalog_path,
        &IndexOptions {
            checkpoint_size: opts.checkpoint_size,
            force_rebuild: opts.force_rebuild,
        },
    )?;

    let reader = Reader::open(path, &catalog_path)?;
    let num_lines = reader.num_lines();
    let size_mb = reader.num_bytes() as f64 / BYTES_PER_MB;
    let valid_events = num_lines.saturating_sub(2);
    let size_per_event = if valid_events > 0 {
        size_mb / valid_events as f64
    } else {
        0.0
    };

    debug!(
        "{}: {:.2} MB, ~{} events from {} lines (indexed)",
        path.display(),
        size_mb,
        valid_events,
        num_lines
    );
    Ok(FileMetadata {
        path: path.to_path_buf(),
        catalog_path: Some(catalog_path),
        size_mb,
        start_line: 1,
        end_line: num_lines,
        valid_events,
        size_per_event,
        success: true,
    })
}

/// Plain path: one scan, counting valid events exactly.
fn collect_plain(path: &Path) -> Result<FileMetadata> {
    let mut lines = PlainLines::open(path)?;
    let num_lines = lines.total_lines();
    let size_mb = lines.total_bytes() as f64 / BYTES_PER_MB;

    let mut valid_events = 0u64;
    while let Some(line) = lines.next() {
        if json::validate_event(line.content).is_some() {
            valid_events += 1;
        }
    }
    let size_per_event = if valid_events > 0 {
        size_mb / valid_events as f64
    } else {
        0.0
    };

    debug!(
        "{}: {:.2} MB, {} events from {} lines (plain)",
        path.display(),
        size_mb,
        valid_events,
        num_lines
    );
    Ok(FileMetadata {
        path: path.to_path_buf(),
        catalog_path: None,
        size_mb,
        start_line: 1,
        end_line: num_lines,
        valid_events,
        size_per_event,
        success: true,
    })
}
