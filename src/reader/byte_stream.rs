//! BYTES stream kind: raw decompressed bytes, arbitrary alignment.

use crate::error::Result;
use crate::reader::source::InflateSource;

/// Raw byte stream over a decompressed range `[start, end)`.
pub struct ByteStream {
    source: Option<InflateSource>,
    pos: u64,
    end: u64,
    done: bool,
}

impl ByteStream {
    pub(crate) fn new(source: InflateSource, start: u64, end: u64) -> Self {
        Self {
            source: Some(source),
            pos: start,
            end,
            done: start >= end,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            source: None,
            pos: 0,
            end: 0,
            done: true,
        }
    }

    /// Fill `buf` with as many bytes as fit, stopping at the range end.
    /// Returns 0 once the range is exhausted.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        let source = self.source.as_mut().expect("non-empty stream has a source");
        let want = buf.len().min((self.end - self.pos) as usize);
        let n = source.read(&mut buf[..want])?;
        if n == 0 {
            self.done = true;
            return Ok(0);
        }
        self.pos += n as u64;
        if self.pos >= self.end {
            self.done = true;
        }
        Ok(n)
    }

    pub fn done(&self) -> bool {
        self.done
    }
}
