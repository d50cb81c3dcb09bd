//! WAL read benchmarks.

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use std::fs::File;
use tempfile::TempDir;
use tidewal_core::dir::segment_name;
use tidewal_core::{checkpoint, LiveReader, Reader, SegmentRange, Wal, WalOptions};

#[path = "../src/utils.rs"]
mod utils;

use utils::{random_records, samples_record, series_record};

/// Creates a WAL holding `count` records of `size` bytes.
fn populated_wal(count: usize, size: usize, compress: bool) -> TempDir {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(
        dir.path(),
        WalOptions::new().segment_pages(64).compress(compress),
    )
    .unwrap();
    for batch in random_records(count, size).chunks(100) {
        wal.log(batch).unwrap();
    }
    wal.close().unwrap();
    dir
}

/// Benchmark replaying a whole directory.
fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    group.sample_size(20);

    for size in [128, 4096, 40_000].iter() {
        let count = 8 * 1024 * 1024 / size;
        let dir = populated_wal(count, *size, false);
        group.throughput(Throughput::Bytes((count * size) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut reader = Reader::open(&[SegmentRange::all(dir.path())]).unwrap();
                let mut n = 0;
                while reader.next().unwrap() {
                    n += black_box(reader.record()).len();
                }
                black_box(n);
            });
        });
    }

    group.finish();
}

/// Benchmark reading a finished segment with the live reader.
fn bench_live_reader(c: &mut Criterion) {
    let dir = populated_wal(10_000, 256, false);
    let path = segment_name(dir.path(), 0);

    c.bench_function("live_reader_segment", |b| {
        b.iter(|| {
            let mut reader = LiveReader::new(File::open(&path).unwrap());
            let mut n = 0;
            while reader.next().unwrap() {
                n += 1;
            }
            black_box(n);
        });
    });
}

/// Benchmark checkpointing two segments of series and samples.
fn bench_checkpoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkpoint");
    group.sample_size(10);

    group.bench_function("series_and_samples", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let wal = Wal::open(dir.path(), WalOptions::new()).unwrap();
                wal.log(&[series_record(1000)]).unwrap();
                for i in 0..100 {
                    wal.log(&[samples_record(1000, i * 15_000)]).unwrap();
                }
                wal.next_segment().unwrap();
                (dir, wal)
            },
            |(dir, wal)| {
                let stats = checkpoint(&wal, 0, 0, |r| r % 2 == 0, 500_000).unwrap();
                black_box(stats);
                wal.close().unwrap();
                drop(dir);
            },
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_replay, bench_live_reader, bench_checkpoint);

criterion_main!(benches);
