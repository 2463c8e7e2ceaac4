//! Chunk planning: greedy first-fit packing of files into target-size
//! manifests.
//!
//! Files are consumed in input order. A file that fits in the open manifest
//! goes in whole; otherwise a prefix sized to the remaining capacity is
//! placed and the manifest closes. Split points are proportional: a piece
//! covering an MB fraction of the file covers the same fraction of its
//! lines. Line ranges are authoritative; byte offsets are advisory because
//! extraction aligns to line boundaries anyway.
//!
//! Concatenating every manifest's specs reproduces each input file's full
//! line range exactly once, in order.

use log::debug;

use crate::types::{ChunkManifest, ChunkSpec, FileMetadata, LineRange};
use crate::utils::config::BYTES_PER_MB;

const EPS: f64 = 1e-9;

pub fn plan_chunks(metadata: &[FileMetadata], target_size_mb: f64) -> Vec<ChunkManifest> {
    let mut manifests: Vec<ChunkManifest> = Vec::new();
    let mut current = ChunkManifest::default();

    for file in metadata {
        if !file.success || file.size_mb <= EPS || file.valid_events == 0 {
            continue;
        }
        let size_bytes = file.size_mb * BYTES_PER_MB;
        let line_span = (file.end_line - file.start_line) as f64;
        let mut placed_mb = 0.0;
        let mut cur_line = file.start_line;

        loop {
            let remaining = file.size_mb - placed_mb;
            if remaining <= EPS || cur_line > file.end_line {
                break;
            }
            let capacity = target_size_mb - current.total_size_mb;
            if capacity <= EPS && !current.is_empty() {
                manifests.push(std::mem::take(&mut current));
                continue;
            }

            let take_mb = if capacity > EPS {
                remaining.min(capacity)
            } else {
                // Degenerate target; place the rest rather than spin.
                remaining
            };
            let is_last = remaining - take_mb <= EPS;

            let start_frac = placed_mb / file.size_mb;
            let end_frac = (placed_mb + take_mb) / file.size_mb;
            let piece_end = if is_last {
                file.end_line
            } else {
                let line = file.start_line + (end_frac * line_span).round() as u64;
                line.clamp(cur_line, file.end_line)
            };
            let start_byte = (start_frac * size_bytes).round() as u64;
            let end_byte = if is_last {
                size_bytes.round() as u64
            } else {
                (end_frac * size_bytes).round() as u64
            };

            current.add_spec(ChunkSpec {
                path: file.path.clone(),
                catalog_path: file.catalog_path.clone(),
                size_mb: take_mb,
                start_byte,
                end_byte,
                line_range: Some(LineRange::new(cur_line, piece_end)),
            });

            cur_line = piece_end + 1;
            placed_mb += take_mb;
            if piece_end >= file.end_line {
                // Rounding exhausted the lines; the residual MB is slack.
                placed_mb = file.size_mb;
            }
            if target_size_mb - current.total_size_mb <= EPS {
                manifests.push(std::mem::take(&mut current));
            }
        }
    }

    if !current.is_empty() {
        manifests.push(current);
    }

    debug!(
        "planned {} chunks at {:.2} MB target",
        manifests.len(),
        target_size_mb
    );
    manifests
}
