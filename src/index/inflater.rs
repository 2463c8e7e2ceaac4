//! zlib inflate wrapper with block-boundary scanning and resumable state.
//!
//! The index builder runs a gzip-framed decoder with `Z_BLOCK` so it can
//! observe DEFLATE block boundaries and snapshot (window, unused bits,
//! offsets) there. Streams resume by opening a raw-DEFLATE decoder, priming
//! the unused bits, and loading the window as the dictionary, the approach
//! zlib's zran contrib established. `flate2` does not expose `inflatePrime`
//! or `inflateGetDictionary`, hence the direct `libz-sys` calls here.

use std::alloc::Layout;
use std::ffi::CStr;
use std::io::Read;
use std::os::raw::c_int;
use std::ptr;

use libz_sys::{
    Bytef, Z_BLOCK, Z_BUF_ERROR, Z_OK, Z_STREAM_END, inflate, inflateEnd, inflateInit2_,
    inflatePrime, inflateSetDictionary, uInt, voidpf, z_stream, z_streamp, zlibVersion,
};

// Not exposed by `libz-sys` (it only declares zlib symbols up to 1.2.3.4),
// but present in the bundled zlib since 1.2.7.1, which this crate links.
unsafe extern "C" {
    fn inflateGetDictionary(strm: z_streamp, dictionary: *mut Bytef, dictLength: *mut uInt) -> c_int;
}

use crate::utils::config::{IndexerConsts, ReaderConsts};

// zlib's zalloc/zfree fields are non-nullable function pointers, so the
// stream cannot be zero-initialized; route allocations through the Rust
// allocator, stashing the layout size just ahead of the returned block.
const ALLOC_ALIGN: usize = std::mem::align_of::<usize>();

extern "C" fn zalloc(_opaque: voidpf, items: uInt, item_size: uInt) -> voidpf {
    let wanted = (items as usize).saturating_mul(item_size as usize);
    let size = match wanted.checked_add(ALLOC_ALIGN) {
        Some(s) => s,
        None => return ptr::null_mut(),
    };
    unsafe {
        let layout = match Layout::from_size_align(size, ALLOC_ALIGN) {
            Ok(l) => l,
            Err(_) => return ptr::null_mut(),
        };
        let p = std::alloc::alloc(layout);
        if p.is_null() {
            return ptr::null_mut();
        }
        *(p as *mut usize) = size;
        p.add(ALLOC_ALIGN) as voidpf
    }
}

extern "C" fn zfree(_opaque: voidpf, address: voidpf) {
    unsafe {
        let p = (address as *mut u8).sub(ALLOC_ALIGN);
        let size = *(p as *mut usize);
        let layout = Layout::from_size_align_unchecked(size, ALLOC_ALIGN);
        std::alloc::dealloc(p, layout)
    }
}

fn blank_stream() -> Box<z_stream> {
    Box::new(z_stream {
        next_in: ptr::null_mut(),
        avail_in: 0,
        total_in: 0,
        next_out: ptr::null_mut(),
        avail_out: 0,
        total_out: 0,
        msg: ptr::null_mut(),
        state: ptr::null_mut(),
        zalloc,
        zfree,
        opaque: ptr::null_mut(),
        data_type: 0,
        adler: 0,
        reserved: 0,
    })
}

/// gzip framing: 15-bit window plus gzip header/trailer handling.
const GZIP_WINDOW_BITS: c_int = 15 + 16;
/// Raw DEFLATE, no framing. Used when resuming from a checkpoint.
const RAW_WINDOW_BITS: c_int = -15;

/// Inflate failure, split into the two classes callers care about: the read
/// side failed, or the compressed data itself is bad.
#[derive(Debug)]
pub enum InflateError {
    Io(std::io::Error),
    Data(String),
}

impl std::fmt::Display for InflateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InflateError::Io(e) => write!(f, "read failed: {}", e),
            InflateError::Data(msg) => write!(f, "{}", msg),
        }
    }
}

impl From<std::io::Error> for InflateError {
    fn from(e: std::io::Error) -> Self {
        InflateError::Io(e)
    }
}

/// Read with local retries. `ErrorKind::Interrupted` never counts against
/// the attempt budget; other errors do.
fn read_retrying<R: Read>(src: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut failures = 0;
    loop {
        match src.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                failures += 1;
                if failures >= ReaderConsts::IO_RETRY_ATTEMPTS {
                    return Err(e);
                }
                log::debug!("read error (attempt {}): {}", failures, e);
            }
        }
    }
}

/// A zlib inflate stream plus its compressed-input buffer.
///
/// `read` stops early at DEFLATE block boundaries once it has produced any
/// output, so the caller can probe `at_block_boundary` / `unused_bits` /
/// `window` for checkpointing between calls.
pub struct Inflater {
    strm: Box<z_stream>,
    in_buf: Box<[u8]>,
    in_len: usize,
    /// Total compressed bytes fetched from the source so far.
    in_pos: u64,
    finished: bool,
}

// The raw pointers inside `strm` reference only the boxed stream state and
// `in_buf`, both owned by this struct and heap-stable across moves.
unsafe impl Send for Inflater {}

impl Inflater {
    fn init(window_bits: c_int) -> Result<Box<z_stream>, InflateError> {
        let mut strm = blank_stream();
        let ret = unsafe {
            inflateInit2_(
                strm.as_mut(),
                window_bits,
                zlibVersion(),
                std::mem::size_of::<z_stream>() as c_int,
            )
        };
        if ret != Z_OK {
            return Err(InflateError::Data(format!(
                "inflateInit2 failed with code {}",
                ret
            )));
        }
        Ok(strm)
    }

    /// Decoder for a gzip-framed archive read from its start.
    pub fn gzip() -> Result<Self, InflateError> {
        Ok(Self {
            strm: Self::init(GZIP_WINDOW_BITS)?,
            in_buf: vec![0u8; IndexerConsts::INFLATE_BUFFER_SIZE].into_boxed_slice(),
            in_len: 0,
            in_pos: 0,
            finished: false,
        })
    }

    /// Raw-DEFLATE decoder for resuming mid-stream. The caller seeds the bit
    /// buffer with [`prime`](Self::prime) and the window with
    /// [`set_dictionary`](Self::set_dictionary), then positions the source at
    /// the checkpoint's compressed offset before the first `read`.
    pub fn raw() -> Result<Self, InflateError> {
        Ok(Self {
            strm: Self::init(RAW_WINDOW_BITS)?,
            in_buf: vec![0u8; IndexerConsts::INFLATE_BUFFER_SIZE].into_boxed_slice(),
            in_len: 0,
            in_pos: 0,
            finished: false,
        })
    }

    /// Insert the unused bits of the byte preceding the resume point.
    pub fn prime(&mut self, num_bits: u8, value: u8) -> Result<(), InflateError> {
        let ret = unsafe { inflatePrime(self.strm.as_mut(), num_bits as c_int, value as c_int) };
        if ret != Z_OK {
            return Err(InflateError::Data(format!(
                "inflatePrime({} bits) failed with code {}",
                num_bits, ret
            )));
        }
        Ok(())
    }

    /// Load a checkpoint's sliding window as the decoder dictionary.
    pub fn set_dictionary(&mut self, window: &[u8]) -> Result<(), InflateError> {
        let ret = unsafe {
            inflateSetDictionary(self.strm.as_mut(), window.as_ptr(), window.len() as uInt)
        };
        if ret != Z_OK {
            return Err(InflateError::Data(format!(
                "inflateSetDictionary({} bytes) failed with code {}",
                window.len(),
                ret
            )));
        }
        Ok(())
    }

    /// Decompress into `out`, refilling the input buffer from `src` as
    /// needed. Returns the bytes produced; 0 only at end of stream. Stops
    /// early at a DEFLATE block boundary once any output exists.
    pub fn read<R: Read>(&mut self, src: &mut R, out: &mut [u8]) -> Result<usize, InflateError> {
        if self.finished || out.is_empty() {
            return Ok(0);
        }
        self.strm.next_out = out.as_mut_ptr();
        self.strm.avail_out = out.len() as uInt;
        loop {
            if self.strm.avail_in == 0 {
                let n = read_retrying(src, &mut self.in_buf)?;
                if n == 0 {
                    let produced = out.len() - self.strm.avail_out as usize;
                    if produced == 0 {
                        return Err(InflateError::Data(
                            "unexpected end of compressed stream".into(),
                        ));
                    }
                    return Ok(produced);
                }
                self.in_len = n;
                self.in_pos += n as u64;
                self.strm.next_in = self.in_buf.as_mut_ptr();
                self.strm.avail_in = n as uInt;
            }
            let ret = unsafe { inflate(self.strm.as_mut(), Z_BLOCK) };
            match ret {
                Z_STREAM_END => {
                    self.finished = true;
                    break;
                }
                Z_OK => {}
                // No forward progress possible without more input.
                Z_BUF_ERROR => continue,
                _ => return Err(InflateError::Data(self.describe(ret))),
            }
            if self.strm.avail_out == 0 {
                break;
            }
            let produced = out.len() - self.strm.avail_out as usize;
            if produced > 0 && self.at_block_boundary() {
                break;
            }
        }
        Ok(out.len() - self.strm.avail_out as usize)
    }

    /// True once the gzip member has fully decoded (trailer verified).
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// True when the decoder sits exactly between two DEFLATE blocks and the
    /// current block was not the final one.
    pub fn at_block_boundary(&self) -> bool {
        self.strm.data_type & 0xc0 == 0x80
    }

    /// `(count, value)` of the unused bits in the last consumed byte.
    /// `None` when the count is nonzero but the byte is no longer buffered,
    /// in which case this boundary cannot be checkpointed.
    pub fn unused_bits(&self) -> Option<(u8, u8)> {
        let count = (self.strm.data_type & 7) as u8;
        if count == 0 {
            return Some((0, 0));
        }
        let consumed = self.in_len - self.strm.avail_in as usize;
        if consumed == 0 {
            return None;
        }
        let byte = self.in_buf[consumed - 1];
        Some((count, byte >> (8 - count)))
    }

    /// Copy of the current sliding window (up to 32 KiB, true length).
    pub fn window(&mut self) -> Result<Vec<u8>, InflateError> {
        let mut win = vec![0u8; IndexerConsts::WINDOW_SIZE];
        let mut have: uInt = 0;
        let ret =
            unsafe { inflateGetDictionary(self.strm.as_mut(), win.as_mut_ptr(), &mut have) };
        if ret != Z_OK {
            return Err(InflateError::Data(format!(
                "inflateGetDictionary failed with code {}",
                ret
            )));
        }
        win.truncate(have as usize);
        Ok(win)
    }

    /// Compressed offset of the next unconsumed input byte.
    pub fn compressed_off(&self) -> u64 {
        self.in_pos - self.strm.avail_in as u64
    }

    fn describe(&self, code: c_int) -> String {
        let msg = if self.strm.msg.is_null() {
            None
        } else {
            unsafe { CStr::from_ptr(self.strm.msg) }.to_str().ok()
        };
        match msg {
            Some(m) => format!("inflate failed: {} (code {})", m, code),
            None => format!("inflate failed with code {}", code),
        }
    }
}

impl Drop for Inflater {
    fn drop(&mut self) {
        unsafe {
            inflateEnd(self.strm.as_mut());
        }
    }
}
