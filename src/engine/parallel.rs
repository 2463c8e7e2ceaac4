//! Parallel batch runner for the pipeline phases.
//!
//! The contract is deliberately narrow: a batch of independent inputs, a
//! pure per-item function, results in input order. Each output carries its
//! own success flag; one failed item never aborts its siblings. Execution
//! order across threads is unspecified and callers must not rely on it.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::sync::atomic::AtomicUsize;

use crate::engine::progress::{self, ProgressBar};
use crate::utils::config::ProgressConsts;

/// Build a dedicated thread pool for the batch phases.
pub fn build_pool(num_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.max(1))
        .build()
        .context("failed to build thread pool")
}

/// Progress update stride that lands near `TARGET_UPDATES` total updates.
pub fn adaptive_progress_chunk_size(total: usize, num_threads: usize) -> usize {
    let target = ProgressConsts::TARGET_UPDATES.max(num_threads);
    (total / target).max(ProgressConsts::CHUNK_MIN)
}

/// Run `f` over every item on `pool`, preserving input order in the output.
/// The optional bar is updated in batches to keep lock contention down.
pub fn run_batch<I, O, F>(
    pool: &rayon::ThreadPool,
    items: Vec<I>,
    pb: Option<&ProgressBar>,
    f: F,
) -> Vec<O>
where
    I: Send,
    O: Send,
    F: Fn(I) -> O + Sync,
{
    let total = items.len();
    let chunk_size = adaptive_progress_chunk_size(total, pool.current_num_threads());
    let counter = AtomicUsize::new(0);

    let results: Vec<O> = pool.install(|| {
        items
            .into_par_iter()
            .map(|item| {
                let out = f(item);
                progress::report_progress_batched(pb, &counter, chunk_size);
                out
            })
            .collect()
    });

    progress::flush_progress_remainder(pb, total, chunk_size);
    results
}
