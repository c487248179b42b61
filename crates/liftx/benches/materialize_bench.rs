// ai
//! 🏎️ Materializer benchmarks: how long does one batch take to become a Parquet file?
//!
//! 🎬 *[the stopwatch clicks. ten thousand fake skiers line up at the gondola.]*
//!
//! Run with `cargo bench -p liftx`. Seeded tickets, so runs compare against each other.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use liftx::common::Batch;
use liftx::generator::{ResortCatalog, TicketGenerator, TimestampStyle};
use liftx::materializer::{ColumnarMaterializer, MaterializerConfig, NestedEncoding, ParquetCompression};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn tickets(count: usize) -> Batch {
    let catalog = ResortCatalog::default();
    let mut generator = TicketGenerator::new(&catalog, StdRng::seed_from_u64(0xC0FFEE), TimestampStyle::Iso);
    Batch {
        number: 1,
        records: (0..count).map(|_| generator.next_ticket()).collect(),
    }
}

fn bench_materialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize");
    for size in [100usize, 1_000, 10_000] {
        let batch = tickets(size);
        group.throughput(Throughput::Elements(size as u64));

        for (label, config) in [
            ("snappy_struct", MaterializerConfig::default()),
            (
                "zstd_json_text",
                MaterializerConfig {
                    compression: ParquetCompression::Zstd,
                    nested_encoding: NestedEncoding::JsonText,
                    ..MaterializerConfig::default()
                },
            ),
        ] {
            let mut materializer = ColumnarMaterializer::new(config).unwrap();
            group.bench_with_input(BenchmarkId::new(label, size), &batch, |b, batch| {
                b.iter(|| {
                    let file = materializer.materialize(batch).unwrap();
                    // -- 🧹 keep the scope from filling up mid-bench
                    file.discard().unwrap();
                    file.bytes
                })
            });
            materializer.release().unwrap();
        }
    }
    group.finish();
}

criterion_group!(benches, bench_materialize);
criterion_main!(benches);
