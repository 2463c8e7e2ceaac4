//! Engine module: CLI surface, parallel runner, progress plumbing.

pub mod arg_parser;
pub mod handlers;
pub mod parallel;
pub mod progress;

pub use arg_parser::{Cli, Commands};
pub use handlers::{handle_info, handle_pgzip, handle_read, handle_split};
