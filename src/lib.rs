//! tracesplit: random-access indexed reading of gzip trace archives and a
//! parallel pipeline that splits trace directories into fixed-size chunks.
//!
//! The index records periodic DEFLATE checkpoints (compressed/decompressed
//! offsets, bit state, sliding window) plus sparse line anchors in a SQLite
//! catalog, so a [`reader::Reader`] can open any byte or line range in
//! `O(checkpoint_size)` decompression work instead of a full pass.

pub mod engine;
pub mod error;
pub mod index;
pub mod io;
pub mod pipeline;
pub mod reader;
pub mod types;
pub mod utils;

pub use error::{Result, SplitError};
pub use index::{BuildOutcome, IndexOptions};
pub use pipeline::{SplitOptions, SplitReport, run_split};
pub use reader::Reader;
pub use types::*;
