//! Decompressed byte source primed from a catalog checkpoint.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::PathBuf;

use crate::error::{Result, SplitError};
use crate::index::CheckpointRecord;
use crate::index::inflater::{InflateError, Inflater};
use crate::utils::config::IndexerConsts;

/// A positioned decompression source: opens the archive, restores the
/// decoder from a checkpoint, discards the priming skip, then serves
/// sequential reads starting at `start`.
///
/// All of that happens lazily on the first read, so a snapshot that cannot
/// be restored surfaces `CorruptIndex` from the first call rather than from
/// construction.
pub struct InflateSource {
    path: PathBuf,
    checkpoint: CheckpointRecord,
    start: u64,
    state: Option<Active>,
    /// Decompressed bytes produced since priming, including skipped ones.
    /// A data error before any output means the snapshot itself is bad.
    produced: u64,
}

struct Active {
    file: File,
    inflater: Inflater,
}

impl InflateSource {
    /// `start` is the absolute decompressed offset reads should begin at;
    /// it must be at or past the checkpoint's decompressed offset.
    pub fn new(path: PathBuf, checkpoint: CheckpointRecord, start: u64) -> Self {
        debug_assert!(start >= checkpoint.decompressed_off);
        Self {
            path,
            checkpoint,
            start,
            state: None,
            produced: 0,
        }
    }

    /// Absolute decompressed offset of the next byte `read` will return.
    pub fn position(&self) -> u64 {
        match &self.state {
            Some(_) => self.checkpoint.decompressed_off + self.produced,
            None => self.start,
        }
    }

    fn resumed(&self) -> bool {
        !self.checkpoint.is_initial()
    }

    fn map_err(&self, e: InflateError) -> SplitError {
        match e {
            InflateError::Io(e) => SplitError::io(&self.path, e),
            InflateError::Data(msg) => {
                if self.resumed() && self.produced == 0 {
                    SplitError::corrupt_index(
                        &self.path,
                        format!("checkpoint {} failed to resume: {}", self.checkpoint.ckpt_idx, msg),
                    )
                } else {
                    SplitError::corrupt_archive(&self.path, msg)
                }
            }
        }
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.state.is_some() {
            return Ok(());
        }
        let mut file = File::open(&self.path).map_err(|e| SplitError::io(&self.path, e))?;

        let mut inflater = if self.checkpoint.is_initial() {
            Inflater::gzip().map_err(|e| self.map_err(e))?
        } else {
            file.seek(SeekFrom::Start(self.checkpoint.compressed_off))
                .map_err(|e| SplitError::io(&self.path, e))?;
            let mut inf = Inflater::raw().map_err(|e| self.map_err(e))?;
            if self.checkpoint.num_unused_bits > 0 {
                inf.prime(self.checkpoint.num_unused_bits, self.checkpoint.bits)
                    .map_err(|e| self.map_err(e))?;
            }
            let window = self.checkpoint.decompress_window().map_err(|e| {
                SplitError::corrupt_index(
                    &self.path,
                    format!(
                        "checkpoint {} window blob is unreadable: {}",
                        self.checkpoint.ckpt_idx, e
                    ),
                )
            })?;
            if !window.is_empty() {
                inf.set_dictionary(&window).map_err(|e| self.map_err(e))?;
            }
            inf
        };

        // Priming skip: decompress and discard up to the requested start.
        let mut remaining = self.start - self.checkpoint.decompressed_off;
        let mut scratch = vec![0u8; IndexerConsts::PROCESS_BUFFER_SIZE];
        while remaining > 0 {
            let want = scratch.len().min(remaining as usize);
            let n = match inflater.read(&mut file, &mut scratch[..want]) {
                Ok(n) => n,
                Err(e) => return Err(self.map_err(e)),
            };
            if n == 0 {
                break;
            }
            self.produced += n as u64;
            remaining -= n as u64;
        }

        self.state = Some(Active { file, inflater });
        Ok(())
    }

    /// Read up to `out.len()` decompressed bytes. Returns 0 at end of
    /// stream; never partial-fills for any reason other than block-boundary
    /// pauses or end of data.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let state = self.state.as_mut().expect("source opened above");
        let n = match state.inflater.read(&mut state.file, out) {
            Ok(n) => n,
            Err(e) => {
                let err = self.map_err(e);
                return Err(err);
            }
        };
        self.produced += n as u64;
        Ok(n)
    }
}
