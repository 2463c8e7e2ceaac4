//! Random-access reader over an indexed gzip archive.

mod byte_stream;
mod line_stream;
mod source;

pub use byte_stream::ByteStream;
pub use line_stream::{LineByteStream, LineStream, MultiLine, MultiLineByteStream, MultiLineStream};

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use line_stream::{Limit, LineCursor, YieldFrom};
use source::InflateSource;

use crate::error::{Result, SplitError};
use crate::index::catalog::{Catalog, CheckpointRecord, LineAnchor};
use crate::index::canonical_path_string;
use crate::types::{ByteRange, RangeSpec};
use crate::utils::config::{CatalogConsts, ReaderConsts};

/// Open handle on an archive + catalog pair.
///
/// Safe to share read-only across threads; every stream constructor returns
/// an independent stream owning its own file handle and decoder. The catalog
/// connection is only touched during stream construction, behind a mutex.
pub struct Reader {
    archive_path: PathBuf,
    catalog: Mutex<Catalog>,
    file_id: i64,
    num_lines: u64,
    num_bytes: u64,
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("archive_path", &self.archive_path)
            .field("file_id", &self.file_id)
            .field("num_lines", &self.num_lines)
            .field("num_bytes", &self.num_bytes)
            .finish_non_exhaustive()
    }
}

impl Reader {
    /// Open and validate. Fails with `IndexMissing` when the catalog or the
    /// archive's `files` row is absent, `IndexStale` when the catalog
    /// disagrees with the archive on disk or carries a different schema
    /// version.
    pub fn open(archive: &Path, catalog_path: &Path) -> Result<Self> {
        let canon = canonical_path_string(archive)?;
        if !catalog_path.exists() {
            return Err(SplitError::IndexMissing {
                path: archive.to_path_buf(),
                catalog: catalog_path.to_path_buf(),
            });
        }
        let catalog = Catalog::open_readonly(catalog_path)?;
        let row = catalog
            .file_by_path(&canon)?
            .ok_or_else(|| SplitError::IndexMissing {
                path: archive.to_path_buf(),
                catalog: catalog_path.to_path_buf(),
            })?;

        if row.schema_version != CatalogConsts::SCHEMA_VERSION {
            return Err(SplitError::IndexStale {
                path: archive.to_path_buf(),
                detail: format!(
                    "catalog schema version {} does not match {}",
                    row.schema_version,
                    CatalogConsts::SCHEMA_VERSION
                ),
            });
        }
        let size_compressed = std::fs::metadata(archive)
            .map_err(|e| SplitError::io(archive, e))?
            .len();
        if row.size_compressed != size_compressed {
            return Err(SplitError::IndexStale {
                path: archive.to_path_buf(),
                detail: format!(
                    "archive is {} compressed bytes but the index recorded {}",
                    size_compressed, row.size_compressed
                ),
            });
        }

        Ok(Self {
            archive_path: PathBuf::from(canon),
            catalog: Mutex::new(catalog),
            file_id: row.file_id,
            num_lines: row.num_lines,
            num_bytes: row.size_decompressed,
        })
    }

    /// Total lines in the archive's decompressed content.
    pub fn num_lines(&self) -> u64 {
        self.num_lines
    }

    /// Total decompressed bytes.
    pub fn num_bytes(&self) -> u64 {
        self.num_bytes
    }

    /// Estimated line count inside `[start, end)` by density interpolation,
    /// biased ~10% high for pre-allocation.
    pub fn estimate_lines_in_range(&self, start: u64, end: u64) -> u64 {
        if self.num_bytes == 0 || end <= start {
            return 0;
        }
        let density = self.num_lines as f64 / self.num_bytes as f64;
        let estimate = (end - start) as f64 * density * ReaderConsts::LINE_ESTIMATE_BIAS;
        estimate.ceil() as u64
    }

    /// BYTES stream over `[range.start, range.end)`.
    pub fn byte_stream(&self, range: ByteRange) -> Result<ByteStream> {
        let Some((start, end)) = self.clamp_bytes(range)? else {
            return Ok(ByteStream::empty());
        };
        let source = self.source_at(start)?;
        Ok(ByteStream::new(source, start, end))
    }

    /// LINE stream over either range kind.
    pub fn line_stream(&self, range: impl Into<RangeSpec>) -> Result<LineStream> {
        match self.cursor_for(range.into())? {
            Some(cursor) => Ok(LineStream::new(cursor)),
            None => Ok(LineStream::empty()),
        }
    }

    /// LINE_BYTES stream over either range kind.
    pub fn line_byte_stream(&self, range: impl Into<RangeSpec>) -> Result<LineByteStream> {
        match self.cursor_for(range.into())? {
            Some(cursor) => Ok(LineByteStream::new(cursor)),
            None => Ok(LineByteStream::empty()),
        }
    }

    /// MULTI_LINE stream over either range kind.
    pub fn multi_line_stream(&self, range: impl Into<RangeSpec>) -> Result<MultiLineStream> {
        match self.cursor_for(range.into())? {
            Some(cursor) => Ok(MultiLineStream::new(cursor)),
            None => Ok(MultiLineStream::empty()),
        }
    }

    /// MULTI_LINE_BYTES stream over either range kind.
    pub fn multi_line_byte_stream(
        &self,
        range: impl Into<RangeSpec>,
    ) -> Result<MultiLineByteStream> {
        match self.cursor_for(range.into())? {
            Some(cursor) => Ok(MultiLineByteStream::new(cursor)),
            None => Ok(MultiLineByteStream::empty()),
        }
    }

    /// Validate and clamp a byte range. `None` means an empty stream: the
    /// start sits at or past the data, or the range is zero length. A
    /// reversed range is a programmer error.
    fn clamp_bytes(&self, range: ByteRange) -> Result<Option<(u64, u64)>> {
        if range.start > range.end {
            return Err(SplitError::InvalidRange {
                start: range.start,
                end: range.end,
                limit: self.num_bytes,
            });
        }
        let end = range.end.min(self.num_bytes);
        if range.start >= end {
            return Ok(None);
        }
        Ok(Some((range.start, end)))
    }

    fn cursor_for(&self, range: RangeSpec) -> Result<Option<LineCursor>> {
        match range {
            RangeSpec::Bytes(r) => {
                let Some((start, end)) = self.clamp_bytes(r)? else {
                    return Ok(None);
                };
                if self.num_lines == 0 {
                    return Ok(None);
                }
                let anchor = self.anchor_for_offset(start)?;
                let source = self.line_source(anchor)?;
                Ok(Some(LineCursor::new(
                    source,
                    anchor.line_number,
                    YieldFrom::Byte(start),
                    Limit::Byte(end),
                )))
            }
            RangeSpec::Lines(r) => {
                if r.start == 0 || r.start > r.end {
                    return Err(SplitError::InvalidRange {
                        start: r.start,
                        end: r.end,
                        limit: self.num_lines,
                    });
                }
                if self.num_lines == 0 || r.start > self.num_lines {
                    return Ok(None);
                }
                let end = r.end.min(self.num_lines);
                let anchor = self.anchor_for_line(r.start)?;
                let source = self.line_source(anchor)?;
                Ok(Some(LineCursor::new(
                    source,
                    anchor.line_number,
                    YieldFrom::Line(r.start),
                    Limit::Line(end),
                )))
            }
        }
    }

    fn line_source(&self, anchor: LineAnchor) -> Result<InflateSource> {
        let checkpoint = self.checkpoint_at_or_before(anchor.decompressed_off)?;
        Ok(InflateSource::new(
            self.archive_path.clone(),
            checkpoint,
            anchor.decompressed_off,
        ))
    }

    fn source_at(&self, offset: u64) -> Result<InflateSource> {
        let checkpoint = self.checkpoint_at_or_before(offset)?;
        Ok(InflateSource::new(
            self.archive_path.clone(),
            checkpoint,
            offset,
        ))
    }

    fn checkpoint_at_or_before(&self, offset: u64) -> Result<CheckpointRecord> {
        let catalog = self.catalog.lock().expect("catalog mutex poisoned");
        catalog
            .checkpoint_at_or_before(self.file_id, offset)?
            .ok_or_else(|| {
                SplitError::corrupt_index(
                    &self.archive_path,
                    format!("no checkpoint at or before offset {}", offset),
                )
            })
    }

    fn anchor_for_offset(&self, offset: u64) -> Result<LineAnchor> {
        let catalog = self.catalog.lock().expect("catalog mutex poisoned");
        Ok(catalog
            .line_anchor_for_offset(self.file_id, offset)?
            .unwrap_or(LineAnchor {
                line_number: 1,
                decompressed_off: 0,
            }))
    }

    fn anchor_for_line(&self, line: u64) -> Result<LineAnchor> {
        let catalog = self.catalog.lock().expect("catalog mutex poisoned");
        Ok(catalog
            .line_anchor_for_line(self.file_id, line)?
            .unwrap_or(LineAnchor {
                line_number: 1,
                decompressed_off: 0,
            }))
    }
}
