//! Input directory scan: find trace files by extension.

use anyhow::{Context, Result};
use jwalk::WalkDir;
use log::debug;
use std::path::{Path, PathBuf};

/// True for the file names the split pipeline understands.
pub fn is_trace_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(".pfw") || name.ends_with(".pfw.gz"))
}

/// Collect every `.pfw` / `.pfw.gz` file under `dir`, sorted so the file
/// order (and therefore the chunk plan) is deterministic.
pub fn scan_trace_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .skip_hidden(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type.is_file())
        .map(|entry| entry.path())
        .filter(|path| is_trace_file(path))
        .collect();
    files.sort();
    debug!("found {} trace files under {}", files.len(), dir.display());
    if files.is_empty() {
        anyhow::bail!("no .pfw or .pfw.gz files found in {}", dir.display());
    }
    files
        .iter()
        .map(|p| {
            std::fs::canonicalize(p).with_context(|| format!("canonicalize {}", p.display()))
        })
        .collect()
}

/// Collect plain `.pfw` files only (the pgzip inputs).
pub fn scan_plain_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| name.ends_with(".pfw"))
        })
        .collect();
    files.sort();
    Ok(files)
}
