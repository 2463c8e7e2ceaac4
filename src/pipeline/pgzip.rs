//! Parallel gzip of plain trace files: every `.pfw` in a directory is
//! compressed to `.pfw.gz` and the original removed on success.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, warn};

use crate::engine::parallel;
use crate::engine::progress::ProgressBar;
use crate::io::gzip;
use crate::pipeline::scan;

/// Outcome of compressing one file.
#[derive(Clone, Debug)]
pub struct FileCompression {
    pub path: PathBuf,
    pub output_path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
    pub success: bool,
}

/// Totals over one pgzip run.
#[derive(Clone, Debug, Default)]
pub struct PgzipSummary {
    pub results: Vec<FileCompression>,
    pub successful: usize,
    pub total_original: u64,
    pub total_compressed: u64,
}

impl PgzipSummary {
    pub fn all_ok(&self) -> bool {
        self.successful == self.results.len()
    }
}

fn compress_one(path: &Path, level: u32) -> FileCompression {
    let mut os = path.as_os_str().to_owned();
    os.push(".gz");
    let output_path = PathBuf::from(os);

    match gzip::compress_file(path, &output_path, level) {
        Ok((original_size, compressed_size)) => {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("compressed {} but could not remove it: {}", path.display(), e);
            }
            debug!(
                "{}: {} -> {} bytes",
                path.display(),
                original_size,
                compressed_size
            );
            FileCompression {
                path: path.to_path_buf(),
                output_path,
                original_size,
                compressed_size,
                success: true,
            }
        }
        Err(e) => {
            warn!("failed to compress {}: {}", path.display(), e);
            let _ = std::fs::remove_file(&output_path);
            FileCompression {
                path: path.to_path_buf(),
                output_path,
                original_size: 0,
                compressed_size: 0,
                success: false,
            }
        }
    }
}

/// Compress every `.pfw` directly under `dir` in parallel.
pub fn compress_directory(
    dir: &Path,
    pool: &rayon::ThreadPool,
    level: u32,
    pb: Option<&ProgressBar>,
) -> Result<PgzipSummary> {
    let files = scan::scan_plain_files(dir)?;
    if files.is_empty() {
        anyhow::bail!("no .pfw files found in {}", dir.display());
    }

    let results = parallel::run_batch(pool, files, pb, |path| compress_one(&path, level));

    let mut summary = PgzipSummary {
        results,
        ..Default::default()
    };
    for r in &summary.results {
        if r.success {
            summary.successful += 1;
            summary.total_original += r.original_size;
            summary.total_compressed += r.compressed_size;
        }
    }
    Ok(summary)
}
