//! Streaming gzip encoder for output chunks.
//!
//! Output is deterministic for identical input at a given level: the header
//! mtime is pinned to zero so repeated runs produce byte-identical files.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};

use crate::utils::config::SplitConsts;

/// Chunk-at-a-time gzip compressor with an explicit finalize step.
pub struct StreamingGzipEncoder<W: Write> {
    inner: GzEncoder<W>,
}

impl<W: Write> StreamingGzipEncoder<W> {
    pub fn new(writer: W, level: u32) -> Self {
        Self {
            inner: GzBuilder::new().mtime(0).write(writer, Compression::new(level)),
        }
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.inner.write_all(chunk)
    }

    /// Flush the trailer and return the underlying writer. Dropping the
    /// encoder without finishing produces a truncated stream.
    pub fn finish(self) -> io::Result<W> {
        self.inner.finish()
    }
}

/// Gzip `src` into `dst` chunk by chunk. Returns (original, compressed)
/// byte sizes.
pub fn compress_file(src: &Path, dst: &Path, level: u32) -> io::Result<(u64, u64)> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut encoder = StreamingGzipEncoder::new(File::create(dst)?, level);
    let mut buf = vec![0u8; SplitConsts::COMPRESS_CHUNK_SIZE];
    let mut original = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        original += n as u64;
        encoder.write_chunk(&buf[..n])?;
    }
    encoder.finish()?;
    let compressed = std::fs::metadata(dst)?.len();
    Ok((original, compressed))
}
