//! Chunk extraction: stream each planned range, filter valid events, write
//! one wrapped output file per manifest.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, error};
use xxhash_rust::xxh3::Xxh3;

use crate::error::{Result, SplitError};
use crate::io::{gzip, json, plain::PlainLines};
use crate::reader::Reader;
use crate::types::{ByteRange, ChunkManifest, ChunkResult, EventId};
use crate::utils::config::{BYTES_PER_MB, SplitConsts};

/// Options threaded to every extraction task.
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    pub output_dir: PathBuf,
    pub app_name: String,
    pub compress: bool,
    pub compress_level: u32,
}

/// Extract one chunk. Failures clean up the partial output and produce a
/// `success = false` result; sibling chunks are unaffected.
pub fn extract_chunk(
    chunk_index: usize,
    manifest: &ChunkManifest,
    opts: &ExtractOptions,
) -> ChunkResult {
    let plain_path = opts.output_dir.join(format!(
        "{}-{}.{}",
        opts.app_name,
        chunk_index,
        SplitConsts::OUTPUT_EXTENSION
    ));
    match extract_and_write(chunk_index, manifest, &plain_path, opts) {
        Ok(result) => result,
        Err(e) => {
            let e = SplitError::ChunkExtractFailed {
                index: chunk_index,
                detail: e.to_string(),
            };
            error!("{}", e);
            let _ = std::fs::remove_file(&plain_path);
            let _ = std::fs::remove_file(gz_path_for(&plain_path));
            ChunkResult {
                chunk_index,
                output_path: plain_path,
                events_written: 0,
                size_mb: 0.0,
                success: false,
                content_hash: 0,
                event_ids: Vec::new(),
            }
        }
    }
}

fn gz_path_for(plain_path: &Path) -> PathBuf {
    let mut os = plain_path.as_os_str().to_owned();
    os.push(".gz");
    PathBuf::from(os)
}

struct ChunkSink<W: Write> {
    writer: W,
    path: PathBuf,
    hasher: Xxh3,
    event_ids: Vec<EventId>,
    events: u64,
}

impl<W: Write> ChunkSink<W> {
    /// Validate one line; write it (trimmed) and account for it if valid.
    fn consume(&mut self, content: &[u8]) -> Result<()> {
        let Some((trimmed, id)) = json::parse_event(content) else {
            return Ok(());
        };
        self.writer
            .write_all(trimmed)
            .and_then(|_| self.writer.write_all(b"\n"))
            .map_err(|e| SplitError::io(&self.path, e))?;
        self.hasher.update(trimmed);
        self.hasher.update(b"\n");
        if id.is_valid() {
            self.event_ids.push(id);
        }
        self.events += 1;
        Ok(())
    }
}

fn extract_and_write(
    chunk_index: usize,
    manifest: &ChunkManifest,
    plain_path: &Path,
    opts: &ExtractOptions,
) -> Result<ChunkResult> {
    let file = File::create(plain_path).map_err(|e| SplitError::io(plain_path, e))?;
    let mut sink = ChunkSink {
        writer: BufWriter::with_capacity(SplitConsts::OUTPUT_BUFFER_SIZE, file),
        path: plain_path.to_path_buf(),
        hasher: Xxh3::with_seed(0),
        event_ids: Vec::with_capacity(SplitConsts::EVENT_ID_RESERVE),
        events: 0,
    };
    sink.writer
        .write_all(b"[\n")
        .map_err(|e| SplitError::io(plain_path, e))?;

    for spec in &manifest.specs {
        match &spec.catalog_path {
            Some(catalog_path) => {
                let reader = Reader::open(&spec.path, catalog_path)?;
                // Line info is authoritative when present; byte offsets are
                // the advisory fallback.
                let mut stream = match spec.line_range {
                    Some(range) => reader.line_stream(range)?,
                    None => {
                        reader.line_stream(ByteRange::new(spec.start_byte, spec.end_byte))?
                    }
                };
                while let Some(line) = stream.next()? {
                    sink.consume(line.content)?;
                }
            }
            None => {
                let mut lines = match spec.line_range {
                    Some(range) => PlainLines::open(&spec.path)?.with_line_range(range)?,
                    None => PlainLines::open(&spec.path)?
                        .with_byte_range(ByteRange::new(spec.start_byte, spec.end_byte))?,
                };
                while let Some(line) = lines.next() {
                    sink.consume(line.content)?;
                }
            }
        }
    }

    sink.writer
        .write_all(b"]\n")
        .and_then(|_| sink.writer.flush())
        .map_err(|e| SplitError::io(plain_path, e))?;
    drop(sink.writer);

    let written = std::fs::metadata(plain_path)
        .map_err(|e| SplitError::io(plain_path, e))?
        .len();

    let mut output_path = plain_path.to_path_buf();
    if opts.compress {
        let gz_path = gz_path_for(plain_path);
        gzip::compress_file(plain_path, &gz_path, opts.compress_level)
            .map_err(|e| SplitError::io(&gz_path, e))?;
        std::fs::remove_file(plain_path).map_err(|e| SplitError::io(plain_path, e))?;
        output_path = gz_path;
    }

    debug!(
        "chunk {}: {} events, {:.2} MB written to {}",
        chunk_index,
        sink.events,
        written as f64 / BYTES_PER_MB,
        output_path.display()
    );
    Ok(ChunkResult {
        chunk_index,
        output_path,
        events_written: sink.events,
        size_mb: written as f64 / BYTES_PER_MB,
        success: true,
        content_hash: sink.hasher.digest(),
        event_ids: sink.event_ids,
    })
}
