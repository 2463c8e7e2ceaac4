//! Stream engine tests: range semantics, boundary rules, checkpoint resume.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;

use tracesplit::index::{self, Catalog, IndexOptions};
use tracesplit::types::{ByteRange, LineRange};
use tracesplit::{Reader, SplitError};

const S1_CONTENT: &[u8] =
    b"{\"id\":0,\"pid\":1,\"tid\":2}\n{\"id\":1,\"pid\":1,\"tid\":2}\n{\"id\":2,\"pid\":1,\"tid\":3}\n";

fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn write_archive(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, gzip_bytes(content)).unwrap();
    path
}

fn catalog_path(archive: &Path) -> PathBuf {
    let mut os = archive.as_os_str().to_owned();
    os.push(".idx");
    PathBuf::from(os)
}

fn build_reader(archive: &Path, checkpoint_size: u64) -> Reader {
    let catalog = catalog_path(archive);
    index::build(
        archive,
        &catalog,
        &IndexOptions {
            checkpoint_size,
            force_rebuild: false,
        },
    )
    .unwrap();
    Reader::open(archive, &catalog).unwrap()
}

/// Collect `(number, content)` pairs from a LINE stream.
fn collect_lines(reader: &Reader, range: impl Into<tracesplit::types::RangeSpec>) -> Vec<(u64, Vec<u8>)> {
    let mut stream = reader.line_stream(range).unwrap();
    let mut out = Vec::new();
    while let Some(line) = stream.next().unwrap() {
        out.push((line.number, line.content.to_vec()));
    }
    out
}

fn expected_lines(content: &[u8]) -> Vec<Vec<u8>> {
    let mut lines: Vec<Vec<u8>> = content.split(|&b| b == b'\n').map(<[u8]>::to_vec).collect();
    if content.last() == Some(&b'\n') {
        lines.pop();
    }
    lines
}

/// Content with uneven line lengths for boundary tests.
fn wavy_content(num_lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..num_lines {
        let pad = "x".repeat((i * 7) % 23);
        out.extend_from_slice(
            format!("{{\"id\":{},\"pid\":1,\"tid\":1,\"pad\":\"{}\"}}\n", i, pad).as_bytes(),
        );
    }
    out
}

/// Large content with enough entropy that deflate emits many blocks.
fn big_content(num_lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut seed: u64 = 0x243f_6a88_85a3_08d3;
    for i in 0..num_lines {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        out.extend_from_slice(
            format!(
                "{{\"id\":{},\"pid\":1,\"tid\":1,\"ts\":{},\"name\":\"op-{:x}\"}}\n",
                i,
                seed % 1_000_000_000,
                seed
            )
            .as_bytes(),
        );
    }
    out
}

#[test]
fn s1_tiny_sequential_read() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "s1.pfw.gz", S1_CONTENT);
    let reader = build_reader(&archive, 1024);

    assert_eq!(reader.num_lines(), 3);
    assert_eq!(reader.num_bytes(), 75);

    // Only the initial checkpoint at offset 0.
    let catalog = Catalog::open_readonly(&catalog_path(&archive)).unwrap();
    let row = catalog
        .file_by_path(&std::fs::canonicalize(&archive).unwrap().to_string_lossy())
        .unwrap()
        .unwrap();
    let checkpoints = catalog.checkpoints(row.file_id).unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].decompressed_off, 0);

    let lines = collect_lines(&reader, LineRange::new(2, 3));
    assert_eq!(
        lines,
        vec![
            (2, b"{\"id\":1,\"pid\":1,\"tid\":2}".to_vec()),
            (3, b"{\"id\":2,\"pid\":1,\"tid\":3}".to_vec()),
        ]
    );
}

#[test]
fn s2_byte_range_split() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "s2.pfw.gz", S1_CONTENT);
    let reader = build_reader(&archive, 1024);

    let first = collect_lines(&reader, ByteRange::new(0, 25));
    assert_eq!(first, vec![(1, b"{\"id\":0,\"pid\":1,\"tid\":2}".to_vec())]);

    let rest = collect_lines(&reader, ByteRange::new(25, 75));
    assert_eq!(
        rest.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
        vec![2, 3]
    );

    let mut union = first;
    union.extend(rest);
    assert_eq!(union, collect_lines(&reader, LineRange::new(1, 3)));
}

#[test]
fn full_byte_stream_yields_exact_content() {
    let dir = TempDir::new().unwrap();
    let content = wavy_content(200);
    let archive = write_archive(dir.path(), "full.pfw.gz", &content);
    let reader = build_reader(&archive, 1024);

    let mut stream = reader.byte_stream(ByteRange::new(0, reader.num_bytes())).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 777];
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert!(stream.done());
    assert_eq!(out, content);
}

#[test]
fn byte_range_partitions_cover_lines_exactly_once() {
    let dir = TempDir::new().unwrap();
    let content = wavy_content(120);
    let archive = write_archive(dir.path(), "partition.pfw.gz", &content);
    let reader = build_reader(&archive, 512);
    let end = reader.num_bytes();

    let full = collect_lines(&reader, ByteRange::new(0, end));
    assert_eq!(full.len(), 120);

    for m in [0, 1, 17, 100, end / 3, end / 2, end - 1, end] {
        let mut parts = collect_lines(&reader, ByteRange::new(0, m));
        parts.extend(collect_lines(&reader, ByteRange::new(m, end)));
        assert_eq!(parts, full, "partition at m={m} must cover all lines once");
    }
}

#[test]
fn single_line_ranges_yield_one_line_each() {
    let dir = TempDir::new().unwrap();
    let content = wavy_content(40);
    let archive = write_archive(dir.path(), "singles.pfw.gz", &content);
    let reader = build_reader(&archive, 256);
    let expected = expected_lines(&content);

    for k in 1..=reader.num_lines() {
        let lines = collect_lines(&reader, LineRange::new(k, k));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, k);
        assert_eq!(lines[0].1, expected[(k - 1) as usize]);
    }
}

#[test]
fn line_bytes_matches_line_stream() {
    let dir = TempDir::new().unwrap();
    let content = wavy_content(60);
    let archive = write_archive(dir.path(), "linebytes.pfw.gz", &content);
    let reader = build_reader(&archive, 1024);
    let range = LineRange::new(5, 42);

    let parsed = collect_lines(&reader, range);
    let mut byte_stream = reader.line_byte_stream(range).unwrap();
    let mut buf = vec![0u8; 4096];
    for (number, content) in &parsed {
        let n = byte_stream.read(&mut buf).unwrap();
        assert!(n > 0, "line {number} missing from LINE_BYTES stream");
        let payload = &buf[..n];
        assert_eq!(payload.last(), Some(&b'\n'));
        assert_eq!(&payload[..n - 1], content.as_slice());
    }
    assert_eq!(byte_stream.read(&mut buf).unwrap(), 0);
    assert!(byte_stream.done());
}

#[test]
fn multi_line_stream_matches_line_stream() {
    let dir = TempDir::new().unwrap();
    let content = wavy_content(80);
    let archive = write_archive(dir.path(), "multi.pfw.gz", &content);
    let reader = build_reader(&archive, 1024);
    let range = LineRange::new(3, 77);

    let parsed = collect_lines(&reader, range);
    let mut stream = reader.multi_line_stream(range).unwrap();
    let mut batched = Vec::new();
    while let Some(batch) = stream.next().unwrap() {
        assert!(!batch.is_empty());
        for line in batch.iter() {
            batched.push((line.number, line.content.to_vec()));
        }
    }
    assert!(stream.done());
    assert_eq!(batched, parsed);
}

#[test]
fn multi_line_bytes_yields_whole_lines_only() {
    let dir = TempDir::new().unwrap();
    let content = wavy_content(100);
    let archive = write_archive(dir.path(), "multibytes.pfw.gz", &content);
    let reader = build_reader(&archive, 1024);

    let mut stream = reader
        .multi_line_byte_stream(ByteRange::new(0, reader.num_bytes()))
        .unwrap();
    let mut out = Vec::new();
    let mut buf = vec![0u8; 160];
    loop {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        // Every yielded buffer is line-aligned.
        assert_eq!(buf[n - 1], b'\n');
        out.extend_from_slice(&buf[..n]);
    }
    assert!(stream.done());
    assert_eq!(out, content);
}

#[test]
fn empty_archive_yields_empty_streams() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "empty.pfw.gz", b"");
    let reader = build_reader(&archive, 1024);

    assert_eq!(reader.num_lines(), 0);
    assert_eq!(reader.num_bytes(), 0);

    let mut bytes = reader.byte_stream(ByteRange::new(0, 0)).unwrap();
    assert!(bytes.done());
    assert_eq!(bytes.read(&mut [0u8; 16]).unwrap(), 0);

    let mut lines = reader.line_stream(LineRange::new(1, 1)).unwrap();
    assert!(lines.done());
    assert!(lines.next().unwrap().is_none());

    let catalog = Catalog::open_readonly(&catalog_path(&archive)).unwrap();
    let row = catalog
        .file_by_path(&std::fs::canonicalize(&archive).unwrap().to_string_lossy())
        .unwrap()
        .unwrap();
    assert_eq!(catalog.checkpoints(row.file_id).unwrap().len(), 1);
}

#[test]
fn final_line_without_newline_counts() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "noeol.pfw.gz", b"{\"id\":7,\"pid\":1,\"tid\":1}");
    let reader = build_reader(&archive, 1024);

    assert_eq!(reader.num_lines(), 1);
    let lines = collect_lines(&reader, LineRange::new(1, 1));
    assert_eq!(lines, vec![(1, b"{\"id\":7,\"pid\":1,\"tid\":1}".to_vec())]);
}

#[test]
fn empty_byte_range_is_done_immediately() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "emptyrange.pfw.gz", S1_CONTENT);
    let reader = build_reader(&archive, 1024);

    let mut stream = reader.byte_stream(ByteRange::new(5, 5)).unwrap();
    assert!(stream.done());
    assert_eq!(stream.read(&mut [0u8; 8]).unwrap(), 0);

    // Start past the end: empty, not an error.
    let mut past = reader.byte_stream(ByteRange::new(1000, 2000)).unwrap();
    assert!(past.done());

    // Reversed range: programmer error.
    assert!(matches!(
        reader.byte_stream(ByteRange::new(10, 5)),
        Err(SplitError::InvalidRange { .. })
    ));
}

#[test]
fn buffer_too_small_surfaces_and_retry_succeeds() {
    let dir = TempDir::new().unwrap();
    let archive = write_archive(dir.path(), "small.pfw.gz", S1_CONTENT);
    let reader = build_reader(&archive, 1024);

    let mut stream = reader.line_byte_stream(LineRange::new(1, 3)).unwrap();
    let mut tiny = [0u8; 4];
    let needed = match stream.read(&mut tiny) {
        Err(SplitError::BufferTooSmall { capacity, needed }) => {
            assert_eq!(capacity, 4);
            needed
        }
        other => panic!("expected BufferTooSmall, got {other:?}"),
    };
    // The failed line is still pending; a larger buffer picks it up.
    let mut big = vec![0u8; needed * 2];
    let n = stream.read(&mut big).unwrap();
    assert_eq!(n, 25);
    assert_eq!(&big[..n], b"{\"id\":0,\"pid\":1,\"tid\":2}\n");
}

#[test]
fn resume_from_mid_file_checkpoints() {
    let dir = TempDir::new().unwrap();
    let content = big_content(30_000);
    let archive = write_archive(dir.path(), "big.pfw.gz", &content);
    let reader = build_reader(&archive, 128 * 1024);
    let expected = expected_lines(&content);

    assert_eq!(reader.num_lines(), 30_000);
    assert_eq!(reader.num_bytes(), content.len() as u64);

    // The archive is large enough that mid-stream checkpoints must exist.
    let catalog = Catalog::open_readonly(&catalog_path(&archive)).unwrap();
    let row = catalog
        .file_by_path(&std::fs::canonicalize(&archive).unwrap().to_string_lossy())
        .unwrap()
        .unwrap();
    let checkpoints = catalog.checkpoints(row.file_id).unwrap();
    assert!(
        checkpoints.len() >= 3,
        "expected mid-stream checkpoints, got {}",
        checkpoints.len()
    );
    for pair in checkpoints.windows(2) {
        assert!(pair[0].compressed_off < pair[1].compressed_off);
        assert!(pair[0].decompressed_off < pair[1].decompressed_off);
    }

    // Late line range: resumes from a late checkpoint, not a full pass.
    let lines = collect_lines(&reader, LineRange::new(29_000, 29_010));
    assert_eq!(lines.len(), 11);
    for (i, (number, content)) in lines.iter().enumerate() {
        let expect_no = 29_000 + i as u64;
        assert_eq!(*number, expect_no);
        assert_eq!(content, &expected[(expect_no - 1) as usize]);
    }

    // Mid-file byte range agrees with the reference content.
    let a = reader.num_bytes() / 2;
    let b = a + 64 * 1024;
    let lines = collect_lines(&reader, ByteRange::new(a, b));
    assert!(!lines.is_empty());
    for (number, content) in &lines {
        assert_eq!(content, &expected[(*number - 1) as usize]);
    }
}

#[test]
fn corrupt_checkpoint_window_surfaces_corrupt_index() {
    let dir = TempDir::new().unwrap();
    let content = big_content(30_000);
    let archive = write_archive(dir.path(), "corrupt.pfw.gz", &content);
    let catalog_file = catalog_path(&archive);
    index::build(
        &archive,
        &catalog_file,
        &IndexOptions {
            checkpoint_size: 128 * 1024,
            force_rebuild: false,
        },
    )
    .unwrap();

    // Flip one byte in every mid-stream checkpoint's window blob; the
    // initial checkpoint (a plain gzip restart) stays intact.
    {
        let conn = rusqlite::Connection::open(&catalog_file).unwrap();
        let mut stmt = conn
            .prepare("SELECT ckpt_idx, window FROM checkpoints WHERE ckpt_idx >= 1")
            .unwrap();
        let blobs: Vec<(i64, Vec<u8>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        drop(stmt);
        assert!(!blobs.is_empty(), "need a non-initial checkpoint to corrupt");
        for (idx, mut blob) in blobs {
            let mid = blob.len() / 2;
            blob[mid] ^= 0xff;
            conn.execute(
                "UPDATE checkpoints SET window = ?1 WHERE ckpt_idx = ?2",
                rusqlite::params![blob, idx],
            )
            .unwrap();
        }
    }

    let reader = Reader::open(&archive, &catalog_file).unwrap();

    // The final line resolves through the corrupted checkpoint.
    let mut stream = reader.line_stream(LineRange::new(30_000, 30_000)).unwrap();
    match stream.next() {
        Err(SplitError::CorruptIndex { .. }) => {}
        other => panic!("expected CorruptIndex, got {other:?}"),
    }

    // Ranges served by earlier checkpoints still work.
    let expected = expected_lines(&content);
    let lines = collect_lines(&reader, LineRange::new(1, 5));
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0].1, expected[0]);
}

#[test]
fn estimate_lines_overestimates_slightly() {
    let dir = TempDir::new().unwrap();
    let content = wavy_content(500);
    let archive = write_archive(dir.path(), "estimate.pfw.gz", &content);
    let reader = build_reader(&archive, 4096);

    let estimate = reader.estimate_lines_in_range(0, reader.num_bytes());
    assert!(estimate >= reader.num_lines());
    assert!(estimate <= reader.num_lines() * 12 / 10 + 1);
    assert_eq!(reader.estimate_lines_in_range(10, 10), 0);
}
