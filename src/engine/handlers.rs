//! Command handlers for the split, pgzip, read, and info operations.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kdam::Animation;
use log::{error, info};

use crate::engine::arg_parser::{InfoArgs, PgzipArgs, ReadArgs, ReadMode, SplitArgs};
use crate::engine::{parallel, progress};
use crate::index::{self, Catalog, IndexOptions};
use crate::pipeline::{self, SplitOptions, pgzip};
use crate::reader::Reader;
use crate::types::{ByteRange, LineRange};
use crate::utils::setup_logging;

fn effective_threads(requested: Option<usize>) -> usize {
    requested.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    })
}

/// Handle the split command. Returns true when every chunk succeeded and
/// (if requested) verification passed.
pub fn handle_split(args: &SplitArgs) -> Result<bool> {
    setup_logging(args.verbose);
    let threads = effective_threads(args.threads);

    info!("==========================================");
    info!("  App name: {}", args.app_name);
    info!("  Data dir: {}", args.directory.display());
    info!("  Output dir: {}", args.output.display());
    info!("  Chunk size: {} MB", args.chunk_size_mb);
    info!("  Compress: {}", args.compress);
    info!("  Force rebuild: {}", args.force);
    info!("  Threads: {}", threads);
    info!("==========================================");

    let opts = SplitOptions {
        input_dir: args.directory.clone(),
        output_dir: args.output.clone(),
        app_name: args.app_name.clone(),
        target_size_mb: args.chunk_size_mb as f64,
        checkpoint_size: args.checkpoint_size,
        force_rebuild: args.force,
        compress: args.compress,
        compress_level: 6,
        threads,
        index_dir: args.index_dir.clone(),
        verify: args.verify,
        verbose: args.verbose,
    };

    let report = pipeline::run_split(&opts)?;

    info!(
        "split completed in {:.2} s",
        report.elapsed.as_secs_f64()
    );
    info!(
        "  input: {} files, {:.2} MB",
        report.successful_files, report.input_size_mb
    );
    info!(
        "  output: {}/{} chunks, {} events",
        report.successful_chunks(),
        report.results.len(),
        report.total_events
    );
    for r in report.results.iter().filter(|r| !r.success) {
        error!("chunk {} failed ({})", r.chunk_index, r.output_path.display());
    }
    if let Some(v) = &report.verify {
        if v.passed {
            info!(
                "  verification: PASSED - all {} events present in output",
                v.input_events
            );
        } else {
            error!(
                "  verification: FAILED - input hash {:016x} ({} events) != output hash {:016x} ({} events)",
                v.input_hash, v.input_events, v.output_hash, v.output_events
            );
        }
    }

    Ok(report.passed())
}

fn default_index_path(archive: &Path) -> PathBuf {
    let mut os = archive.as_os_str().to_owned();
    os.push(".idx");
    PathBuf::from(os)
}

fn open_indexed(
    archive: &Path,
    index: Option<&Path>,
    checkpoint_size: u64,
    force: bool,
) -> Result<(Reader, PathBuf)> {
    let index_path = index
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_index_path(archive));
    index::build(
        archive,
        &index_path,
        &IndexOptions {
            checkpoint_size,
            force_rebuild: force,
        },
    )
    .with_context(|| format!("index {}", archive.display()))?;
    let reader = Reader::open(archive, &index_path)?;
    Ok((reader, index_path))
}

/// Handle the read command: stream a range of the archive to stdout.
pub fn handle_read(args: &ReadArgs) -> Result<bool> {
    setup_logging(args.verbose);
    let (reader, _) = open_indexed(
        &args.file,
        args.index.as_deref(),
        args.checkpoint_size,
        args.force,
    )?;

    let stdout = std::io::stdout().lock();
    let mut out = std::io::BufWriter::new(stdout);

    match args.mode {
        ReadMode::Bytes => {
            let range = ByteRange::new(
                args.start.unwrap_or(0),
                args.end.unwrap_or(reader.num_bytes()),
            );
            let mut stream = reader.byte_stream(range)?;
            let mut buf = vec![0u8; args.read_buffer_size.max(1)];
            loop {
                let n = stream.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n])?;
            }
        }
        ReadMode::LineBytes => {
            let range = ByteRange::new(
                args.start.unwrap_or(0),
                args.end.unwrap_or(reader.num_bytes()),
            );
            let mut stream = reader.line_byte_stream(range)?;
            let mut buf = vec![0u8; args.read_buffer_size.max(1)];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => out.write_all(&buf[..n])?,
                    // A line longer than the buffer; grow and retry.
                    Err(crate::SplitError::BufferTooSmall { needed, .. }) => {
                        buf.resize(needed, 0);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        ReadMode::Lines => {
            if reader.num_lines() == 0 {
                return Ok(true);
            }
            let range = LineRange::new(
                args.start.unwrap_or(1),
                args.end.unwrap_or(reader.num_lines()),
            );
            let mut stream = reader.line_stream(range)?;
            while let Some(line) = stream.next()? {
                out.write_all(line.content)?;
                out.write_all(b"\n")?;
            }
        }
    }
    out.flush()?;
    Ok(true)
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Handle the info command: per-archive size/line/checkpoint statistics.
pub fn handle_info(args: &InfoArgs) -> Result<bool> {
    setup_logging(args.verbose);
    let mut all_ok = true;

    for file in &args.files {
        println!("========================================");
        println!("File: {}", file.display());
        println!("========================================");

        let outcome = open_indexed(file, None, args.checkpoint_size, args.force).and_then(
            |(reader, index_path)| {
                let catalog = Catalog::open_readonly(&index_path)?;
                let canon = index::canonical_path_string(file)?;
                let row = catalog.file_by_path(&canon)?.ok_or_else(|| {
                    crate::SplitError::IndexMissing {
                        path: file.clone(),
                        catalog: index_path.clone(),
                    }
                })?;
                let checkpoints = catalog.checkpoints(row.file_id)?.len();
                Ok((reader, row, checkpoints))
            },
        );

        match outcome {
            Ok((reader, row, checkpoints)) => {
                let compressed = row.size_compressed;
                let uncompressed = reader.num_bytes();
                let ratio = if uncompressed > 0 {
                    compressed as f64 / uncompressed as f64 * 100.0
                } else {
                    0.0
                };
                println!("  Compressed:   {:>12} ({} bytes)", format_size(compressed), compressed);
                println!(
                    "  Uncompressed: {:>12} ({} bytes)",
                    format_size(uncompressed),
                    uncompressed
                );
                println!("  Ratio:        {:>11.2}%", ratio);
                println!("  Lines:        {:>12}", reader.num_lines());
                println!(
                    "  Events (est): {:>12}",
                    reader.num_lines().saturating_sub(2)
                );
                println!("  Checkpoints:  {:>12}", checkpoints);
                println!(
                    "  Ckpt spacing: {:>12}",
                    format_size(row.checkpoint_size)
                );
            }
            Err(e) => {
                all_ok = false;
                println!("  Status: ERROR - {:#}", e);
            }
        }
        println!();
    }
    Ok(all_ok)
}

/// Handle the pgzip command. Returns true when every file compressed.
pub fn handle_pgzip(args: &PgzipArgs) -> Result<bool> {
    setup_logging(args.verbose);
    let threads = effective_threads(args.threads);
    let pool = parallel::build_pool(threads)?;

    info!(
        "compressing .pfw files under {} with {} threads (level {})",
        args.directory.display(),
        threads,
        args.level
    );

    let pb = args.verbose.then(|| {
        progress::create_progress_bar(progress::ProgressBarConfig::new(
            0,
            "Compressing",
            Animation::Classic,
        ))
    });
    let summary = pgzip::compress_directory(&args.directory, &pool, args.level, pb.as_ref())?;
    if let Some(pb) = &pb {
        progress::clear_progress_bar(pb);
    }

    info!(
        "compressed {}/{} files ({} -> {} bytes)",
        summary.successful,
        summary.results.len(),
        summary.total_original,
        summary.total_compressed
    );
    for r in summary.results.iter().filter(|r| !r.success) {
        error!("failed to compress {}", r.path.display());
    }
    Ok(summary.all_ok())
}
