//! Benchmarks for MasterState upsert and erase.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::schema::{Schema, SchemaBuilder};
use tessera_core::{DataType, Scalar};
use tessera_storage::MasterState;

fn create_test_schema() -> Schema {
    SchemaBuilder::new("quotes")
        .unwrap()
        .add_column("id", DataType::Int64)
        .unwrap()
        .add_column("price", DataType::Float64)
        .unwrap()
        .add_column("sector", DataType::Str)
        .unwrap()
        .primary_key("id")
        .unwrap()
        .build()
        .unwrap()
}

fn make_row(i: i64) -> Vec<Scalar> {
    let sectors = ["Tech", "Finance", "Health", "Energy", "Consumer"];
    vec![
        Scalar::Int64(i),
        Scalar::Float64(100.0 + (i as f64) * 0.1),
        Scalar::from(sectors[(i as usize) % sectors.len()]),
    ]
}

fn populate(state: &mut MasterState, count: i64) {
    for i in 0..count {
        state.upsert(&Scalar::Int64(i), &make_row(i)).unwrap();
    }
}

fn bench_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("master_upsert");
    for count in [1_000i64, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("fresh", count), &count, |b, &count| {
            b.iter(|| {
                let mut state = MasterState::new(create_test_schema());
                populate(&mut state, black_box(count));
                state
            })
        });
    }
    group.finish();
}

fn bench_erase_recycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("master_erase");
    for count in [1_000i64, 10_000] {
        group.bench_with_input(BenchmarkId::new("erase_then_reuse", count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let mut state = MasterState::new(create_test_schema());
                    populate(&mut state, count);
                    state
                },
                |mut state| {
                    for i in (0..count).step_by(2) {
                        state.erase(&Scalar::Int64(i));
                    }
                    for i in count..count + count / 2 {
                        state.upsert(&Scalar::Int64(i), &make_row(i)).unwrap();
                    }
                    state
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_upsert, bench_erase_recycle);
criterion_main!(benches);
