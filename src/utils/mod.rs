//! Configuration constants, logging setup, and temp-directory helpers.

pub mod config;
pub mod logger;
pub mod tempfiles;

pub use logger::setup_logging;
pub use tempfiles::{IndexDirGuard, default_index_dir};
