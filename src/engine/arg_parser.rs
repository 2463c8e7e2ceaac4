use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::utils::config::{IndexerConsts, ReaderConsts, SplitConsts};

struct DefaultArgs;

impl DefaultArgs {
    pub const DIR: &'static str = ".";
    pub const OUTPUT_DIR: &'static str = "./split";
    pub const APP_NAME: &'static str = "app";
}

/// Index gzip trace archives for random access and split them into
/// fixed-size chunks.
#[derive(Clone, Parser)]
#[command(name = "tracesplit")]
#[command(about = "Split trace directories into equal-sized chunks; pgzip compresses them back.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Split a directory of .pfw / .pfw.gz traces into equal-sized chunks.
    Split(SplitArgs),
    /// Gzip every .pfw in a directory in parallel, removing the originals.
    Pgzip(PgzipArgs),
    /// Read a byte or line range from an indexed archive to stdout.
    Read(ReadArgs),
    /// Show size, line, and checkpoint statistics for archives.
    Info(InfoArgs),
}

#[derive(Args, Clone)]
pub struct SplitArgs {
    /// Input directory containing .pfw or .pfw.gz files.
    #[arg(long = "directory", short = 'd', default_value = DefaultArgs::DIR)]
    pub directory: PathBuf,

    /// Output directory for split chunks.
    #[arg(long = "output", short = 'o', default_value = DefaultArgs::OUTPUT_DIR)]
    pub output: PathBuf,

    /// Application name used as the output file prefix.
    #[arg(long = "app-name", short = 'n', default_value = DefaultArgs::APP_NAME)]
    pub app_name: String,

    /// Target chunk size in MB.
    #[arg(long = "chunk-size", short = 's', default_value_t = SplitConsts::DEFAULT_CHUNK_SIZE_MB)]
    pub chunk_size_mb: u64,

    /// Force index rebuild even when a current index exists.
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Compress output chunks with gzip (on by default; pass -c false to keep plain files).
    #[arg(long, short = 'c', num_args = 0..=1, default_value_t = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub compress: bool,

    /// Checkpoint spacing for indexing, in decompressed bytes.
    #[arg(long = "checkpoint-size", default_value_t = IndexerConsts::DEFAULT_CHECKPOINT_SIZE)]
    pub checkpoint_size: u64,

    /// Worker threads for the parallel phases. Default: available cores.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Directory for index files. Default: a temp directory removed on exit.
    #[arg(long = "index-dir")]
    pub index_dir: Option<PathBuf>,

    /// Verify that output chunks match the input by comparing event ids.
    #[arg(long)]
    pub verify: bool,

    /// Verbose output with progress bars.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

/// What one `read` call yields per iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReadMode {
    /// Raw decompressed bytes, arbitrary alignment.
    Bytes,
    /// Line-aligned raw bytes (ranges are byte offsets).
    LineBytes,
    /// Parsed lines (ranges are 1-based line numbers).
    Lines,
}

#[derive(Args, Clone)]
pub struct ReadArgs {
    /// Compressed trace file to read.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Index file to use. Default: `<FILE>.idx` next to the archive.
    #[arg(long = "index", short = 'i')]
    pub index: Option<PathBuf>,

    /// Start of the range (bytes, or lines in `lines` mode). Default: 0 / 1.
    #[arg(long = "start", short = 's')]
    pub start: Option<u64>,

    /// End of the range (exclusive bytes, or inclusive line). Default: end.
    #[arg(long = "end", short = 'e')]
    pub end: Option<u64>,

    /// Reading mode.
    #[arg(long = "mode", value_enum, default_value = "bytes")]
    pub mode: ReadMode,

    /// Checkpoint spacing when the index has to be built, in bytes.
    #[arg(long = "checkpoint-size", default_value_t = IndexerConsts::DEFAULT_CHECKPOINT_SIZE)]
    pub checkpoint_size: u64,

    /// Force index rebuild.
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Read buffer size in bytes.
    #[arg(long = "read-buffer-size", default_value_t = ReaderConsts::STREAM_BUFFER_SIZE)]
    pub read_buffer_size: usize,

    /// Verbose output.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Args, Clone)]
pub struct InfoArgs {
    /// Archives to describe.
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Checkpoint spacing when an index has to be built, in bytes.
    #[arg(long = "checkpoint-size", default_value_t = IndexerConsts::DEFAULT_CHECKPOINT_SIZE)]
    pub checkpoint_size: u64,

    /// Force index rebuild.
    #[arg(long, short = 'f')]
    pub force: bool,

    /// Verbose output.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Args, Clone)]
pub struct PgzipArgs {
    /// Directory containing .pfw files.
    #[arg(long = "directory", short = 'd', default_value = DefaultArgs::DIR)]
    pub directory: PathBuf,

    /// gzip compression level (0-9).
    #[arg(long = "level", short = 'l', default_value_t = 6)]
    pub level: u32,

    /// Worker threads for the parallel phases. Default: available cores.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Verbose output with progress bars.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
