//! Library error type. CLI and pipeline plumbing use `anyhow` on top of this.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used by the tracesplit library API.
pub type Result<T> = std::result::Result<T, SplitError>;

/// Failure kinds surfaced by the indexer, reader, and split pipeline.
///
/// Invalid JSON lines are not represented here: they are filtered and
/// counted, never raised.
#[derive(Debug, Error)]
pub enum SplitError {
    /// Read/write/seek failed after local retries were exhausted.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The gzip stream itself is bad (CRC mismatch, bad DEFLATE data,
    /// truncation). Fatal to the stream that hit it.
    #[error("corrupt archive {path}: {detail}")]
    CorruptArchive { path: PathBuf, detail: String },

    /// No catalog, or no `files` row for this archive.
    #[error("no index found for {path} in catalog {catalog}")]
    IndexMissing { path: PathBuf, catalog: PathBuf },

    /// The catalog exists but disagrees with the archive on disk.
    #[error("stale index for {path}: {detail} (rebuild with force_rebuild)")]
    IndexStale { path: PathBuf, detail: String },

    /// A checkpoint snapshot failed to restore a decoder. The catalog is
    /// untrustworthy and must be rebuilt.
    #[error("corrupt index for {path}: {detail}")]
    CorruptIndex { path: PathBuf, detail: String },

    /// Caller passed a range with `start > end` or out of bounds.
    #[error("invalid range [{start}, {end}) (limit {limit})")]
    InvalidRange { start: u64, end: u64, limit: u64 },

    /// A line-bytes read was handed a buffer smaller than the next line.
    /// Recoverable: retry the same call with `needed` capacity.
    #[error("buffer of {capacity} bytes too small for line of {needed} bytes")]
    BufferTooSmall { capacity: usize, needed: usize },

    /// Catalog storage error.
    #[error("catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// One output chunk did not write cleanly. Siblings continue.
    #[error("chunk {index} extraction failed: {detail}")]
    ChunkExtractFailed { index: usize, detail: String },
}

impl SplitError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SplitError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt_archive(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        SplitError::CorruptArchive {
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn corrupt_index(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        SplitError::CorruptIndex {
            path: path.into(),
            detail: detail.into(),
        }
    }

    /// True for errors a caller can recover from by adjusting its input
    /// (larger buffer); everything else is terminal for the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SplitError::BufferTooSmall { .. })
    }
}
