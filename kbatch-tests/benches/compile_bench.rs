//! Compile-path benchmarks for kbatch
//!
//! Run with: cargo bench -p kbatch-tests

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kbatch_core::{BatchCompiler, BatchQuery, DialectKind, Filter, Mutation, Projection, ValueExpr};
use kbatch_test_utils::{item_mapping, TestDatabase};

fn bench_compile_membership(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_membership");
    let mapping = item_mapping();

    for size in [10u64, 100, 1000] {
        let values: Vec<i64> = (0..size as i64).collect();
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("values", size), &values, |b, values| {
            let compiler = BatchCompiler::new(DialectKind::Sqlite.dialect());
            b.iter(|| {
                let query = BatchQuery::new(&mapping).filter(Filter::field("item_id").is_in(values.clone()));
                compiler.compile_delete(black_box(&query)).unwrap()
            });
        });
    }
    group.finish();
}

fn bench_compile_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_update");
    let mapping = item_mapping();
    let mutation: Mutation = Projection::new()
        .set("name", ValueExpr::field("name") + ValueExpr::param(" Concatenated"))
        .set("quantity", ValueExpr::field("quantity") + ValueExpr::param(100))
        .into();

    for kind in DialectKind::ALL {
        group.bench_function(BenchmarkId::new("dialect", kind), |b| {
            let compiler = BatchCompiler::new(kind.dialect());
            let query = BatchQuery::new(&mapping).filter(
                Filter::field("item_id").le(500).and(Filter::field("price").ge_param(0.0)),
            );
            b.iter(|| compiler.compile_update(black_box(&query), black_box(&mutation)).unwrap());
        });
    }
    group.finish();
}

fn bench_batch_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_update");
    group.sample_size(10);

    for rows in [1000i64, 10_000] {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("rows", rows), &rows, |b, &rows| {
            let mut db = TestDatabase::new();
            db.seed_items(rows).unwrap();
            let mapping = item_mapping();
            let mutation: Mutation = Projection::new()
                .set("quantity", ValueExpr::field("quantity") + ValueExpr::param(1))
                .into();

            b.iter(|| {
                db.session
                    .batch_update(&BatchQuery::new(&mapping), black_box(&mutation))
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_compile_membership,
    bench_compile_update,
    bench_batch_update
);
criterion_main!(benches);
