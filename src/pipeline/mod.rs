//! The split pipeline: scan, metadata, plan, extract, verify.

pub mod extractor;
pub mod metadata;
pub mod pgzip;
pub mod planner;
pub mod scan;
pub mod verify;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use kdam::Animation;
use log::{debug, info};

use crate::engine::parallel;
use crate::engine::progress::{self, ProgressBarConfig};
use crate::types::{ChunkResult, FileMetadata, VerifyResult};
use crate::utils::IndexDirGuard;

/// Everything the split run needs, resolved from the CLI surface.
#[derive(Clone, Debug)]
pub struct SplitOptions {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub app_name: String,
    pub target_size_mb: f64,
    pub checkpoint_size: u64,
    pub force_rebuild: bool,
    pub compress: bool,
    pub compress_level: u32,
    pub threads: usize,
    /// Explicit index directory; `None` uses a process-private temp dir
    /// removed on exit.
    pub index_dir: Option<PathBuf>,
    pub verify: bool,
    pub verbose: bool,
}

/// Full account of one split run.
pub struct SplitReport {
    pub metadata: Vec<FileMetadata>,
    pub results: Vec<ChunkResult>,
    pub verify: Option<VerifyResult>,
    pub successful_files: usize,
    pub input_size_mb: f64,
    pub total_events: u64,
    pub elapsed: Duration,
}

impl SplitReport {
    pub fn successful_chunks(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    /// Overall success: every chunk wrote cleanly and, when requested,
    /// verification passed.
    pub fn passed(&self) -> bool {
        self.successful_chunks() == self.results.len()
            && self.verify.is_none_or(|v| v.passed)
    }
}

/// Run the whole split pipeline over one input directory.
pub fn run_split(opts: &SplitOptions) -> Result<SplitReport> {
    let start = Instant::now();
    std::fs::create_dir_all(&opts.output_dir)
        .with_context(|| format!("create output directory {}", opts.output_dir.display()))?;

    let files = scan::scan_trace_files(&opts.input_dir)?;
    info!("found {} files to process", files.len());

    let index_dir = IndexDirGuard::new(opts.index_dir.clone())
        .context("create index directory")?;
    let pool = parallel::build_pool(opts.threads)?;

    // Phase 1: per-file indexing and metadata, in parallel.
    info!("phase 1: collecting file metadata");
    let meta_opts = metadata::MetadataOptions {
        checkpoint_size: opts.checkpoint_size,
        force_rebuild: opts.force_rebuild,
        index_dir: index_dir.path().to_path_buf(),
    };
    let pb = opts.verbose.then(|| {
        progress::create_progress_bar(ProgressBarConfig::new(
            files.len(),
            "Collecting metadata",
            Animation::Classic,
        ))
    });
    let metadata = parallel::run_batch(&pool, files, pb.as_ref(), |path| {
        metadata::collect_file_metadata(&path, &meta_opts)
    });
    if let Some(pb) = &pb {
        progress::clear_progress_bar(pb);
    }

    let successful_files = metadata.iter().filter(|m| m.success).count();
    let input_size_mb: f64 = metadata
        .iter()
        .filter(|m| m.success)
        .map(|m| m.size_mb)
        .sum();
    info!(
        "collected metadata from {}/{} files, total size: {:.2} MB",
        successful_files,
        metadata.len(),
        input_size_mb
    );
    if successful_files == 0 {
        anyhow::bail!("no files were successfully processed");
    }

    // Phase 2: plan chunk manifests.
    info!("phase 2: planning chunks");
    let manifests = planner::plan_chunks(&metadata, opts.target_size_mb);
    if manifests.is_empty() {
        anyhow::bail!("no chunks planned (inputs contain no events)");
    }
    for (i, m) in manifests.iter().enumerate() {
        debug!(
            "chunk {}: {:.2} MB, {} lines across {} files",
            i + 1,
            m.total_size_mb,
            m.total_lines(),
            m.specs.len()
        );
    }

    // Phase 3: extract chunks in parallel.
    info!("phase 3: extracting {} chunks", manifests.len());
    let extract_opts = extractor::ExtractOptions {
        output_dir: opts.output_dir.clone(),
        app_name: opts.app_name.clone(),
        compress: opts.compress,
        compress_level: opts.compress_level,
    };
    let pb = opts.verbose.then(|| {
        progress::create_progress_bar(ProgressBarConfig::new(
            manifests.len(),
            "Extracting chunks",
            Animation::Classic,
        ))
    });
    let numbered: Vec<(usize, crate::types::ChunkManifest)> = manifests
        .into_iter()
        .enumerate()
        .map(|(i, m)| (i + 1, m))
        .collect();
    let mut results = parallel::run_batch(&pool, numbered, pb.as_ref(), |(index, manifest)| {
        extractor::extract_chunk(index, &manifest, &extract_opts)
    });
    if let Some(pb) = &pb {
        progress::clear_progress_bar(pb);
    }
    // Completion order is nondeterministic across threads; keep the report
    // stable.
    results.sort_by_key(|r| r.chunk_index);
    let total_events = results.iter().map(|r| r.events_written).sum();

    // Phase 4: optional event verification.
    let verify_result = if opts.verify {
        info!("phase 4: verifying output chunks against input");
        Some(verify::verify_chunks(&metadata, &results, &pool)?)
    } else {
        None
    };

    Ok(SplitReport {
        metadata,
        results,
        verify: verify_result,
        successful_files,
        input_size_mb,
        total_events,
        elapsed: start.elapsed(),
    })
}
