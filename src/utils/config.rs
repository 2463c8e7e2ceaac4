//! Application configuration constants.
//! Tuning and thresholds in one place.

// ---- Indexing ----

/// Inflate and checkpoint tuning for the index builder.
pub struct IndexerConsts;

impl IndexerConsts {
    /// Compressed-input buffer handed to the inflater (bytes).
    pub const INFLATE_BUFFER_SIZE: usize = 16 * 1024;
    /// Decompressed-output buffer per inflate pass (bytes).
    pub const PROCESS_BUFFER_SIZE: usize = 64 * 1024;
    /// DEFLATE sliding window (bytes). Fixed by RFC 1951.
    pub const WINDOW_SIZE: usize = 32 * 1024;
    /// Default spacing between checkpoints in decompressed bytes. 8 MB.
    pub const DEFAULT_CHECKPOINT_SIZE: u64 = 8 * 1024 * 1024;
    /// Spacing between line-map anchors in decompressed bytes (clamped to the
    /// checkpoint size so a line lookup never scans more than one checkpoint
    /// interval). 1 MB.
    pub const LINE_MAP_BYTE_INTERVAL: u64 = 1024 * 1024;

    /// Effective anchor spacing for a given checkpoint size.
    pub fn line_map_interval(checkpoint_size: u64) -> u64 {
        Self::LINE_MAP_BYTE_INTERVAL.min(checkpoint_size).max(1)
    }
}

// ---- Reading ----

/// Stream-side buffer sizes and retry policy.
pub struct ReaderConsts;

impl ReaderConsts {
    /// Internal decompressed read buffer for line streams (bytes). 1 MB.
    pub const STREAM_BUFFER_SIZE: usize = 1024 * 1024;
    /// Raw file reads are retried this many times before surfacing an error.
    /// Retries cover the read syscall only, never the decoder.
    pub const IO_RETRY_ATTEMPTS: u32 = 3;
    /// Over-estimate factor for line-count estimates (pre-allocation bias).
    pub const LINE_ESTIMATE_BIAS: f64 = 1.1;
}

// ---- Catalog ----

/// Catalog schema versioning and write batching.
pub struct CatalogConsts;

impl CatalogConsts {
    /// Bumped whenever the table layout changes; a mismatch on open is a
    /// stale index.
    pub const SCHEMA_VERSION: i64 = 1;
    /// Line-anchor rows inserted per prepared-statement batch.
    pub const INSERT_BATCH_SIZE: usize = 1000;
}

// ---- JSON events ----

/// Shortest byte length a trimmed line can have and still be an event.
/// Filters the `[` / `]` wrapper lines and fragments cheaply.
pub const MIN_EVENT_LEN: usize = 8;

// ---- Plain files ----

/// Plain files at or above this size are memory-mapped for line iteration;
/// smaller files are read whole. 1 MB.
pub const PLAIN_MMAP_THRESHOLD: u64 = 1024 * 1024;

// ---- Split pipeline ----

/// Chunk-split defaults matching the CLI surface.
pub struct SplitConsts;

impl SplitConsts {
    /// Default target chunk size in MB.
    pub const DEFAULT_CHUNK_SIZE_MB: u64 = 4;
    /// Output chunk extension (plain form).
    pub const OUTPUT_EXTENSION: &'static str = "pfw";
    /// Buffered-writer capacity for chunk outputs (bytes). 1 MB.
    pub const OUTPUT_BUFFER_SIZE: usize = 1024 * 1024;
    /// Chunk size used when streaming a finished file into gzip (bytes).
    pub const COMPRESS_CHUNK_SIZE: usize = 64 * 1024;
    /// Pre-allocation for per-chunk event-id collection.
    pub const EVENT_ID_RESERVE: usize = 5000;
}

/// Bytes per MB used everywhere sizes cross between bytes and MB.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// ---- Progress ----

/// Progress bar batching (reduce lock contention from parallel workers).
pub struct ProgressConsts;

impl ProgressConsts {
    /// Target number of progress updates across all workers in a batch phase.
    pub const TARGET_UPDATES: usize = 100;
    /// Minimum chunk size for adaptive progress updates.
    pub const CHUNK_MIN: usize = 10;
}
