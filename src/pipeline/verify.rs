//! Order-insensitive verification that every input event landed in exactly
//! one output chunk.
//!
//! Input events are re-read from the source files in parallel; output
//! events come from the ids the extractor collected while writing. Both
//! sides are sorted by `(id, pid, tid)` before hashing, so thread
//! scheduling and chunk packing cannot affect the comparison.

use log::debug;
use rayon::prelude::*;
use xxhash_rust::xxh3::Xxh3;

use crate::error::Result;
use crate::io::{json, plain::PlainLines};
use crate::reader::Reader;
use crate::types::{ChunkResult, EventId, FileMetadata, LineRange, VerifyResult};

/// Hash seed shared by both sides of the comparison.
const VERIFY_SEED: u64 = 0;

/// Collect the valid event ids of one input file over its metadata range.
fn collect_events_for_file(meta: &FileMetadata) -> Result<Vec<EventId>> {
    let mut events = Vec::new();
    if meta.num_lines() == 0 {
        return Ok(events);
    }
    let range = LineRange::new(meta.start_line, meta.end_line);
    match &meta.catalog_path {
        Some(catalog_path) => {
            let reader = Reader::open(&meta.path, catalog_path)?;
            let mut stream = reader.line_stream(range)?;
            while let Some(line) = stream.next()? {
                if let Some((_, id)) = json::parse_event(line.content)
                    && id.is_valid()
                {
                    events.push(id);
                }
            }
        }
        None => {
            let mut lines = PlainLines::open(&meta.path)?.with_line_range(range)?;
            while let Some(line) = lines.next() {
                if let Some((_, id)) = json::parse_event(line.content)
                    && id.is_valid()
                {
                    events.push(id);
                }
            }
        }
    }
    Ok(events)
}

/// Re-read every successful input file in parallel, streaming per-file
/// batches to a collector thread.
pub fn collect_input_events(
    metadata: &[FileMetadata],
    pool: &rayon::ThreadPool,
) -> Result<Vec<EventId>> {
    let (tx, rx) = crossbeam_channel::unbounded::<Result<Vec<EventId>>>();

    let collector = std::thread::spawn(move || {
        let mut all: Vec<EventId> = Vec::new();
        let mut first_err = None;
        while let Ok(batch) = rx.recv() {
            match batch {
                Ok(events) => all.extend(events),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(all),
        }
    });

    pool.install(|| {
        metadata
            .par_iter()
            .filter(|m| m.success)
            .for_each_with(tx, |tx, meta| {
                let _ = tx.send(collect_events_for_file(meta));
            });
    });

    collector.join().expect("event collector thread panicked")
}

/// Sort ascending by `(id, pid, tid)` and hash the triples with a fixed
/// seed. Returns `(hash, count)`.
pub fn hash_events(events: &mut Vec<EventId>) -> (u64, u64) {
    events.sort_unstable();
    let mut hasher = Xxh3::with_seed(VERIFY_SEED);
    for e in events.iter() {
        hasher.update(&e.id.to_le_bytes());
        hasher.update(&e.pid.to_le_bytes());
        hasher.update(&e.tid.to_le_bytes());
    }
    (hasher.digest(), events.len() as u64)
}

/// Compare the sorted event hash of the inputs against the extractor's
/// collected output ids.
pub fn verify_chunks(
    metadata: &[FileMetadata],
    results: &[ChunkResult],
    pool: &rayon::ThreadPool,
) -> Result<VerifyResult> {
    let mut input_events = collect_input_events(metadata, pool)?;
    let (input_hash, input_count) = hash_events(&mut input_events);
    drop(input_events);

    let mut output_events: Vec<EventId> = results
        .iter()
        .filter(|r| r.success)
        .flat_map(|r| r.event_ids.iter().copied())
        .collect();
    let (output_hash, output_count) = hash_events(&mut output_events);

    let passed = input_hash == output_hash;
    debug!(
        "verification: input {:016x} ({} events) vs output {:016x} ({} events)",
        input_hash, input_count, output_hash, output_count
    );
    Ok(VerifyResult {
        passed,
        input_hash,
        output_hash,
        input_events: input_count,
        output_events: output_count,
    })
}
