//! Benchmarks for checksum and container open operations

#![allow(clippy::unwrap_used)]

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use mpak_format::ArchiveSession;
use mpak_format::checksum::crc32;
use std::hint::black_box;
use std::path::Path;

// One member name, one extraction chunk, a whole level pack
const SMALL_DATA: &[u8] = b"title_screen.png";
const MEDIUM_DATA: &[u8] = &[0x5au8; 16 * 1024];
const LARGE_DATA: &[u8] = &[0xa5u8; 4 * 1024 * 1024];

fn bench_crc32(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32");

    for (name, data) in &[
        ("small", SMALL_DATA),
        ("medium", MEDIUM_DATA),
        ("large", LARGE_DATA),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), data, |b, &data| {
            b.iter(|| crc32(black_box(data)));
        });
    }

    group.finish();
}

fn bench_open_read(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.mpk");

    let mut writer = ArchiveSession::new();
    writer.open_write(&path).unwrap();
    for i in 0..1000 {
        writer.add_member(&format!("asset_{i:04}.bin"), SMALL_DATA).unwrap();
    }
    writer.close().unwrap();

    c.bench_function("open_read_1000_members", |b| {
        b.iter_batched(
            ArchiveSession::new,
            |mut session| {
                session.open_read(&path, None::<&Path>).unwrap();
                black_box(session.member_count())
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_crc32, bench_open_read);

criterion_main!(benches);
