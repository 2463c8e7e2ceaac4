//! Public and internal types for the tracesplit API and split pipeline.

use std::path::PathBuf;

/// Half-open range of decompressed byte offsets `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Inclusive range of 1-based line numbers `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineRange {
    pub start: u64,
    pub end: u64,
}

impl LineRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn count(&self) -> u64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }
}

/// Either range kind, for stream constructors that accept both.
#[derive(Clone, Copy, Debug)]
pub enum RangeSpec {
    Bytes(ByteRange),
    Lines(LineRange),
}

impl From<ByteRange> for RangeSpec {
    fn from(r: ByteRange) -> Self {
        RangeSpec::Bytes(r)
    }
}

impl From<LineRange> for RangeSpec {
    fn from(r: LineRange) -> Self {
        RangeSpec::Lines(r)
    }
}

/// One parsed line: content without the trailing newline, plus its 1-based
/// number. Borrowed from the stream's internal buffer; valid until the next
/// call on the same stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Line<'a> {
    pub content: &'a [u8],
    pub number: u64,
}

/// Trace event identity: the `(id, pid, tid)` triple. Events with `id < 0`
/// (including events missing an integer `id`) are invalid and filtered from
/// verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventId {
    pub id: i64,
    pub pid: i64,
    pub tid: i64,
}

impl EventId {
    pub fn new(id: i64, pid: i64, tid: i64) -> Self {
        Self { id, pid, tid }
    }

    pub fn is_valid(&self) -> bool {
        self.id >= 0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self {
            id: -1,
            pid: -1,
            tid: -1,
        }
    }
}

/// Per-file aggregate produced by the metadata phase and consumed by the
/// planner. `size_mb` is the decompressed size; `valid_events` is exact for
/// plain files and the `num_lines - 2` wrapper-line estimate for indexed
/// archives.
#[derive(Clone, Debug)]
pub struct FileMetadata {
    pub path: PathBuf,
    /// Catalog path when the file is an indexed gzip archive.
    pub catalog_path: Option<PathBuf>,
    pub size_mb: f64,
    pub start_line: u64,
    pub end_line: u64,
    pub valid_events: u64,
    /// Estimated MB per event, used by the planner to split files.
    pub size_per_event: f64,
    pub success: bool,
}

impl FileMetadata {
    /// Failed placeholder for a file the metadata phase could not process.
    pub fn failed(path: PathBuf) -> Self {
        Self {
            path,
            catalog_path: None,
            size_mb: 0.0,
            start_line: 0,
            end_line: 0,
            valid_events: 0,
            size_per_event: 0.0,
            success: false,
        }
    }

    pub fn num_lines(&self) -> u64 {
        if self.end_line >= self.start_line && self.start_line > 0 {
            self.end_line - self.start_line + 1
        } else {
            0
        }
    }
}

/// One contiguous slice of one file destined for an output chunk. When
/// `line_range` is present it is authoritative; the byte offsets are
/// advisory estimates for logging and byte-mode fallback.
#[derive(Clone, Debug)]
pub struct ChunkSpec {
    pub path: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub size_mb: f64,
    pub start_byte: u64,
    pub end_byte: u64,
    pub line_range: Option<LineRange>,
}

/// Ordered list of chunk specs forming one output chunk.
#[derive(Clone, Debug, Default)]
pub struct ChunkManifest {
    pub specs: Vec<ChunkSpec>,
    pub total_size_mb: f64,
}

impl ChunkManifest {
    pub fn add_spec(&mut self, spec: ChunkSpec) {
        self.total_size_mb += spec.size_mb;
        self.specs.push(spec);
    }

    pub fn total_lines(&self) -> u64 {
        self.specs
            .iter()
            .filter_map(|s| s.line_range.map(|r| r.count()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Outcome of extracting one chunk. `event_ids` holds the valid ids written
/// to this chunk, used by verification without re-reading the output.
#[derive(Clone, Debug)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub output_path: PathBuf,
    pub events_written: u64,
    pub size_mb: f64,
    pub success: bool,
    /// XXH3-64 (seed 0) over every written event line including its newline.
    pub content_hash: u64,
    pub event_ids: Vec<EventId>,
}

/// Outcome of the order-insensitive event verification pass.
#[derive(Clone, Copy, Debug)]
pub struct VerifyResult {
    pub passed: bool,
    pub input_hash: u64,
    pub output_hash: u64,
    pub input_events: u64,
    pub output_events: u64,
}
