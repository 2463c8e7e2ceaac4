//! Line-aligned stream kinds: LINE, LINE_BYTES, MULTI_LINE, MULTI_LINE_BYTES.
//!
//! All four share `LineCursor`, which walks decompressed bytes from a
//! line-anchored position, tracks 1-based line numbers, and applies the
//! boundary rule: a byte-range stream owns exactly the lines that *start*
//! inside its range, so adjacent ranges cover every line exactly once.

use crate::error::{Result, SplitError};
use crate::reader::source::InflateSource;
use crate::types::Line;
use crate::utils::config::ReaderConsts;

/// Which lines the cursor starts yielding.
#[derive(Clone, Copy, Debug)]
pub(crate) enum YieldFrom {
    /// First line whose start offset is `>= a`.
    Byte(u64),
    /// First line with number `>= a`.
    Line(u64),
}

/// Where the cursor stops.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Limit {
    /// Stop before any line starting at `>= b`.
    Byte(u64),
    /// Stop after line number `b`.
    Line(u64),
}

/// Sequential line walker over an [`InflateSource`].
///
/// The source must be positioned at a known line start (an anchor) at or
/// before the requested range so line numbering stays correct; lines before
/// the range are decoded and discarded.
pub(crate) struct LineCursor {
    source: InflateSource,
    buf: Box<[u8]>,
    buf_pos: usize,
    buf_len: usize,
    /// Accumulates the line currently being assembled across refills.
    acc: Vec<u8>,
    /// Completed line handed to callers, including its '\n' when present.
    line_buf: Vec<u8>,
    line_no: u64,
    /// Number and start offset of the line currently accumulating.
    next_line_no: u64,
    next_line_start: u64,
    yield_from: YieldFrom,
    limit: Limit,
    eof: bool,
    done: bool,
}

impl LineCursor {
    pub(crate) fn new(
        source: InflateSource,
        anchor_line: u64,
        yield_from: YieldFrom,
        limit: Limit,
    ) -> Self {
        let start = source.position();
        Self {
            source,
            buf: vec![0u8; ReaderConsts::STREAM_BUFFER_SIZE].into_boxed_slice(),
            buf_pos: 0,
            buf_len: 0,
            acc: Vec::new(),
            line_buf: Vec::new(),
            line_no: 0,
            next_line_no: anchor_line,
            next_line_start: start,
            yield_from,
            limit,
            eof: false,
            done: false,
        }
    }

    pub(crate) fn done(&self) -> bool {
        self.done
    }

    /// 1-based number of the line in `line_bytes`.
    pub(crate) fn line_no(&self) -> u64 {
        self.line_no
    }

    /// Current line including its terminating '\n' (absent only for a final
    /// line at end of file).
    pub(crate) fn line_bytes(&self) -> &[u8] {
        &self.line_buf
    }

    /// Current line without the terminating '\n'.
    pub(crate) fn line_content(&self) -> &[u8] {
        match self.line_buf.last() {
            Some(b'\n') => &self.line_buf[..self.line_buf.len() - 1],
            _ => &self.line_buf,
        }
    }

    fn in_range(&self, line_no: u64, line_start: u64) -> bool {
        match self.yield_from {
            YieldFrom::Byte(a) => line_start >= a,
            YieldFrom::Line(a) => line_no >= a,
        }
    }

    fn past_limit(&self, line_no: u64, line_start: u64) -> bool {
        match self.limit {
            Limit::Byte(b) => line_start >= b,
            Limit::Line(b) => line_no > b,
        }
    }

    /// Parse forward to the next yieldable line. Returns false once the
    /// range is exhausted; the cursor is then terminal.
    pub(crate) fn advance(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        loop {
            if self.buf_pos >= self.buf_len {
                if self.eof {
                    self.done = true;
                    return Ok(false);
                }
                let n = self.source.read(&mut self.buf)?;
                self.buf_pos = 0;
                self.buf_len = n;
                if n == 0 {
                    self.eof = true;
                    // Final line without a trailing newline.
                    if !self.acc.is_empty() {
                        if let Some(yielded) = self.complete_line(false) {
                            return Ok(yielded);
                        }
                    }
                    self.done = true;
                    return Ok(false);
                }
                continue;
            }

            let window = &self.buf[self.buf_pos..self.buf_len];
            match window.iter().position(|&b| b == b'\n') {
                Some(rel) => {
                    self.acc.extend_from_slice(&window[..=rel]);
                    self.buf_pos += rel + 1;
                    if let Some(yielded) = self.complete_line(true) {
                        return Ok(yielded);
                    }
                }
                None => {
                    self.acc.extend_from_slice(window);
                    self.buf_pos = self.buf_len;
                }
            }
        }
    }

    /// Close out the accumulated line. Returns `Some(true)` when it was
    /// yielded, `Some(false)` when the cursor just became terminal, and
    /// `None` when the line was before the range and parsing continues.
    fn complete_line(&mut self, has_newline: bool) -> Option<bool> {
        let line_no = self.next_line_no;
        let line_start = self.next_line_start;

        if self.past_limit(line_no, line_start) {
            self.acc.clear();
            self.done = true;
            return Some(false);
        }

        let line_len = self.acc.len() as u64;
        if has_newline {
            self.next_line_no = line_no + 1;
            self.next_line_start = line_start + line_len;
            // The upcoming line may already sit past the limit; stop there
            // instead of decoding it.
            if self.past_limit(self.next_line_no, self.next_line_start) {
                // Deferred: flag checked on the next advance().
                self.eof = true;
                self.buf_pos = self.buf_len;
            }
        }

        if self.in_range(line_no, line_start) {
            std::mem::swap(&mut self.line_buf, &mut self.acc);
            self.acc.clear();
            self.line_no = line_no;
            Some(true)
        } else {
            self.acc.clear();
            None
        }
    }
}

/// LINE kind: one parsed line per call, newline stripped.
pub struct LineStream {
    cursor: Option<LineCursor>,
}

impl LineStream {
    pub(crate) fn new(cursor: LineCursor) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }

    pub(crate) fn empty() -> Self {
        Self { cursor: None }
    }

    /// Next line in the range, or `None` once exhausted. The returned slice
    /// is valid until the next call on this stream.
    pub fn next(&mut self) -> Result<Option<Line<'_>>> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        if !cursor.advance()? {
            return Ok(None);
        }
        Ok(Some(Line {
            content: cursor.line_content(),
            number: cursor.line_no(),
        }))
    }

    pub fn done(&self) -> bool {
        self.cursor.as_ref().is_none_or(|c| c.done())
    }
}

/// LINE_BYTES kind: exactly one line's raw bytes per call, including the
/// terminating '\n' (except a final line at end of file).
pub struct LineByteStream {
    cursor: Option<LineCursor>,
    pending: bool,
}

impl LineByteStream {
    pub(crate) fn new(cursor: LineCursor) -> Self {
        Self {
            cursor: Some(cursor),
            pending: false,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            cursor: None,
            pending: false,
        }
    }

    /// Copy the next line into `buf` and return its length; 0 at the end of
    /// the range. A buffer smaller than the next line fails with
    /// `BufferTooSmall` and leaves the line pending, so the same call can be
    /// retried with a larger buffer.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(0);
        };
        if !self.pending {
            if !cursor.advance()? {
                return Ok(0);
            }
            self.pending = true;
        }
        let bytes = cursor.line_bytes();
        if buf.len() < bytes.len() {
            return Err(SplitError::BufferTooSmall {
                capacity: buf.len(),
                needed: bytes.len(),
            });
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        self.pending = false;
        Ok(bytes.len())
    }

    pub fn done(&self) -> bool {
        !self.pending && self.cursor.as_ref().is_none_or(|c| c.done())
    }
}

/// MULTI_LINE_BYTES kind: fills the caller's buffer with complete lines
/// only; a line that does not fit is carried to the next call.
pub struct MultiLineByteStream {
    cursor: Option<LineCursor>,
    pending: bool,
}

impl MultiLineByteStream {
    pub(crate) fn new(cursor: LineCursor) -> Self {
        Self {
            cursor: Some(cursor),
            pending: false,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            cursor: None,
            pending: false,
        }
    }

    /// Fill `buf` with whole lines and return the byte count; 0 at the end
    /// of the range. Fails with `BufferTooSmall` only when not even the
    /// first pending line fits.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(0);
        };
        let mut written = 0;
        loop {
            if !self.pending {
                if !cursor.advance()? {
                    break;
                }
                self.pending = true;
            }
            let bytes = cursor.line_bytes();
            if written + bytes.len() > buf.len() {
                break;
            }
            buf[written..written + bytes.len()].copy_from_slice(bytes);
            written += bytes.len();
            self.pending = false;
        }
        if written == 0 && self.pending {
            return Err(SplitError::BufferTooSmall {
                capacity: buf.len(),
                needed: cursor.line_bytes().len(),
            });
        }
        Ok(written)
    }

    pub fn done(&self) -> bool {
        !self.pending && self.cursor.as_ref().is_none_or(|c| c.done())
    }
}

/// A batch of parsed lines borrowed from a [`MultiLineStream`].
pub struct MultiLine<'a> {
    buf: &'a [u8],
    spans: &'a [(u64, usize, usize)],
}

impl<'a> MultiLine<'a> {
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Line<'a>> + '_ {
        self.spans.iter().map(|&(number, start, end)| Line {
            content: &self.buf[start..end],
            number,
        })
    }
}

/// MULTI_LINE kind: a batch of parsed lines per call.
pub struct MultiLineStream {
    cursor: Option<LineCursor>,
    batch_buf: Vec<u8>,
    spans: Vec<(u64, usize, usize)>,
    batch_cap: usize,
}

impl MultiLineStream {
    pub(crate) fn new(cursor: LineCursor) -> Self {
        Self {
            cursor: Some(cursor),
            batch_buf: Vec::new(),
            spans: Vec::new(),
            batch_cap: ReaderConsts::STREAM_BUFFER_SIZE,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            cursor: None,
            batch_buf: Vec::new(),
            spans: Vec::new(),
            batch_cap: 0,
        }
    }

    /// Next batch of lines, or `None` once exhausted. The batch is valid
    /// until the next call on this stream.
    pub fn next(&mut self) -> Result<Option<MultiLine<'_>>> {
        self.batch_buf.clear();
        self.spans.clear();
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        while self.batch_buf.len() < self.batch_cap {
            if !cursor.advance()? {
                break;
            }
            let start = self.batch_buf.len();
            self.batch_buf.extend_from_slice(cursor.line_content());
            self.spans
                .push((cursor.line_no(), start, self.batch_buf.len()));
        }
        if self.spans.is_empty() {
            return Ok(None);
        }
        Ok(Some(MultiLine {
            buf: &self.batch_buf,
            spans: &self.spans,
        }))
    }

    pub fn done(&self) -> bool {
        self.cursor.as_ref().is_none_or(|c| c.done())
    }
}
