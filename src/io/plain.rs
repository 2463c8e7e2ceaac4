//! Line iteration over plain (uncompressed) trace files.
//!
//! Large files are memory-mapped, small ones read whole; either way the
//! iterator hands out borrowed slices with 1-based line numbers. Byte
//! ranges follow the same boundary rule as the gzip streams: the iterator
//! owns exactly the lines that start inside `[start, end)`.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Result, SplitError};
use crate::types::{ByteRange, Line, LineRange};
use crate::utils::config::PLAIN_MMAP_THRESHOLD;

enum PlainData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl PlainData {
    fn bytes(&self) -> &[u8] {
        match self {
            PlainData::Mapped(map) => map,
            PlainData::Owned(buf) => buf,
        }
    }
}

/// Line iterator over one plain file, optionally restricted to a line or
/// byte range.
pub struct PlainLines {
    data: PlainData,
    pos: usize,
    line_no: u64,
    start_line: u64,
    /// Inclusive; 0 means unbounded.
    end_line: u64,
    /// Lines starting at or past this offset are out of range.
    end_byte: usize,
    done: bool,
}

impl PlainLines {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SplitError::io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| SplitError::io(path, e))?
            .len();
        let data = if len >= PLAIN_MMAP_THRESHOLD {
            let map = unsafe { Mmap::map(&file) }.map_err(|e| SplitError::io(path, e))?;
            PlainData::Mapped(map)
        } else {
            let buf = std::fs::read(path).map_err(|e| SplitError::io(path, e))?;
            PlainData::Owned(buf)
        };
        let end_byte = data.bytes().len();
        Ok(Self {
            data,
            pos: 0,
            line_no: 1,
            start_line: 1,
            end_line: 0,
            end_byte,
            done: false,
        })
    }

    /// Restrict to lines `[range.start, range.end]` (1-based, inclusive).
    pub fn with_line_range(mut self, range: LineRange) -> Result<Self> {
        if range.start == 0 || range.start > range.end {
            return Err(SplitError::InvalidRange {
                start: range.start,
                end: range.end,
                limit: 0,
            });
        }
        self.start_line = range.start;
        self.end_line = range.end;
        Ok(self)
    }

    /// Restrict to lines starting inside `[range.start, range.end)`.
    pub fn with_byte_range(mut self, range: ByteRange) -> Result<Self> {
        let len = self.data.bytes().len() as u64;
        if range.start > range.end {
            return Err(SplitError::InvalidRange {
                start: range.start,
                end: range.end,
                limit: len,
            });
        }
        let start = range.start.min(len) as usize;
        self.end_byte = range.end.min(len) as usize;

        // Position at the first line start at or after `start`, counting the
        // lines skipped so numbering stays absolute.
        let data = self.data.bytes();
        if start > 0 {
            let line_start = match data[..start].iter().rposition(|&b| b == b'\n') {
                // `start` itself begins a line only if the previous byte is
                // a newline; otherwise skip to the end of the cut line.
                Some(nl) if nl + 1 == start => start,
                _ => match data[start..].iter().position(|&b| b == b'\n') {
                    Some(rel) => start + rel + 1,
                    None => data.len(),
                },
            };
            self.line_no = 1 + data[..line_start].iter().filter(|&&b| b == b'\n').count() as u64;
            self.pos = line_start;
        }
        Ok(self)
    }

    /// Next line in range; `None` once exhausted. The slice is valid for
    /// the iterator's lifetime (it borrows the underlying file data).
    pub fn next(&mut self) -> Option<Line<'_>> {
        loop {
            if self.done {
                return None;
            }
            let data = self.data.bytes();
            if self.pos >= data.len() || self.pos >= self.end_byte {
                self.done = true;
                return None;
            }
            let start = self.pos;
            let number = self.line_no;
            let content_end = match data[start..].iter().position(|&b| b == b'\n') {
                Some(rel) => {
                    self.pos = start + rel + 1;
                    start + rel
                }
                None => {
                    self.pos = data.len();
                    data.len()
                }
            };
            self.line_no += 1;

            if self.end_line > 0 && number > self.end_line {
                self.done = true;
                return None;
            }
            if number < self.start_line {
                continue;
            }
            return Some(Line {
                content: &self.data.bytes()[start..content_end],
                number,
            });
        }
    }

    /// Total number of lines in the file, ignoring any range restriction.
    pub fn total_lines(&self) -> u64 {
        let data = self.data.bytes();
        if data.is_empty() {
            return 0;
        }
        let newlines = data.iter().filter(|&&b| b == b'\n').count() as u64;
        if data.last() == Some(&b'\n') {
            newlines
        } else {
            newlines + 1
        }
    }

    /// File size in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.data.bytes().len() as u64
    }
}
