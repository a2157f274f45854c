//! Benchmarks for query operations.
//!
//! These benchmarks measure execution time by:
//! 1. Using iter_batched to exclude setup from measurement
//! 2. Using shuffled data to avoid sorted-input optimizations
//! 3. Separating tokenize/parse cost from execution cost
//!
//! End-to-end benchmarks go through `Engine` to include statement caching.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rowql_core::{record, Record, Row, Value};
use rowql_query::executor::{distinct_rows, Evaluator, SortExecutor, SortSpec};
use rowql_query::{
    bind, execute, execute_with, parse_query, tokenize, Engine, ExecutionOptions, InMemoryDataSource,
    Params, PreparedQuery,
};

// ============================================================================
// Data Generation Utilities
// ============================================================================

/// Simple LCG for reproducible pseudo-random shuffling
fn shuffle_indices(count: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..count).collect();
    let mut s = seed;
    for i in (1..count).rev() {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        let j = (s as usize) % (i + 1);
        indices.swap(i, j);
    }
    indices
}

/// Creates records with shuffled ids.
fn create_records(count: usize, seed: u64) -> Vec<Record> {
    shuffle_indices(count, seed)
        .into_iter()
        .map(|i| {
            record! {
                "id" => i as i64,
                "name" => format!("name_{}", i),
                "group_id" => (i % 100) as i64,
                "score" => (i % 1000) as f64 / 10.0,
            }
        })
        .collect()
}

/// Creates rows with shuffled order for direct executor benchmarks.
fn create_shuffled_rows(count: usize) -> Vec<Row> {
    shuffle_indices(count, 12345)
        .into_iter()
        .map(|i| {
            Row::new(vec![
                Value::Int64((i % 100) as i64),
                Value::Int64(i as i64),
                Value::String(format!("name_{}", i)),
            ])
        })
        .collect()
}

fn create_sources(count: usize) -> InMemoryDataSource {
    InMemoryDataSource::new()
        .with_table("users", create_records(count, 12345))
        .with_table("groups", create_records(100, 67890))
}

const SELECTIVE_QUERY: &str = "SELECT id, name FROM users WHERE group_id = :g AND score > 10.5 ORDER BY id LIMIT 50";

// ============================================================================
// Front End Benchmarks
// ============================================================================

fn bench_tokenize(c: &mut Criterion) {
    let long_query = format!(
        "SELECT {} FROM users WHERE id IN ({})",
        (0..50).map(|i| format!("c{}", i)).collect::<Vec<_>>().join(", "),
        (0..200).map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
    );

    let mut group = c.benchmark_group("tokenize");
    group.bench_function("selective", |b| b.iter(|| tokenize(black_box(SELECTIVE_QUERY))));
    group.bench_function("long", |b| b.iter(|| tokenize(black_box(&long_query))));
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let queries = [
        ("selective", SELECTIVE_QUERY),
        (
            "join",
            "SELECT u.name, g.name FROM users u LEFT JOIN groups g ON u.group_id = g.id WHERE u.score > 1",
        ),
        (
            "compound",
            "SELECT id FROM users UNION SELECT id FROM groups EXCEPT (SELECT id FROM users WHERE id > 10)",
        ),
    ];

    let mut group = c.benchmark_group("parse");
    for (name, sql) in queries.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), sql, |b, sql| {
            b.iter(|| parse_query(black_box(sql)))
        });
    }
    group.finish();
}

fn bench_bind(c: &mut Criterion) {
    let statement = PreparedQuery::new(SELECTIVE_QUERY).unwrap();
    let params = Params::new().with("g", 7);

    c.bench_function("bind", |b| b.iter(|| statement.bind(black_box(&params))));
}

// ============================================================================
// Executor Benchmarks - Measure direct stage execution
// ============================================================================

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort");
    let options = ExecutionOptions::default();

    for size in [100, 1000, 10000].iter() {
        let rows = create_shuffled_rows(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter_batched(
                || rows.clone(),
                |rows| {
                    let sort = SortExecutor::new(
                        vec![SortSpec::asc(0), SortSpec::desc(1)],
                        Evaluator::new(&options),
                    );
                    black_box(sort.execute(rows))
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_distinct(c: &mut Criterion) {
    let mut group = c.benchmark_group("distinct");

    for size in [100, 1000, 10000].iter() {
        let rows = create_shuffled_rows(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter_batched(
                || rows.clone(),
                // Only the group column, so most rows are duplicates.
                |rows| black_box(distinct_rows(rows, 1)),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// End-to-End Benchmarks
// ============================================================================

fn bench_execute(c: &mut Criterion) {
    let queries = [
        ("filter", "SELECT id, name FROM users WHERE score > 50 AND name LIKE 'name_1%'"),
        (
            "join",
            "SELECT u.id, g.name FROM users u JOIN groups g ON u.group_id = g.id",
        ),
        (
            "aggregate",
            "SELECT group_id, COUNT(*), AVG(score), MAX(name) FROM users GROUP BY group_id HAVING COUNT(*) > 1",
        ),
        ("sort_limit", "SELECT id, score FROM users ORDER BY score DESC, id LIMIT 10"),
        (
            "subquery",
            "SELECT id FROM users WHERE group_id IN (SELECT id FROM groups WHERE score > 5)",
        ),
    ];

    for (name, sql) in queries.iter() {
        let mut group = c.benchmark_group(format!("execute_{}", name));
        let bound = bind(&parse_query(sql).unwrap(), &Params::new()).unwrap();

        for size in [1000, 10000].iter() {
            let sources = create_sources(*size);
            group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
                b.iter(|| black_box(execute(&bound, &sources).unwrap()))
            });
        }
        group.finish();
    }
}

fn bench_hash_vs_nested_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_strategy");
    let sql = "SELECT u.id, g.name FROM users u JOIN groups g ON u.group_id = g.id";
    let bound = bind(&parse_query(sql).unwrap(), &Params::new()).unwrap();
    let sources = create_sources(1000);

    for (name, hash_joins) in [("hash", true), ("nested_loop", false)].iter() {
        let options = ExecutionOptions::default().with_hash_joins(*hash_joins);
        group.bench_with_input(BenchmarkId::from_parameter(name), name, |b, _| {
            b.iter(|| black_box(execute_with(&bound, &sources, &options).unwrap()))
        });
    }

    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let sources = create_sources(1000);
    let mut group = c.benchmark_group("engine");

    group.bench_function("cached", |b| {
        let mut engine = Engine::new();
        let mut g = 0;
        b.iter(|| {
            g = (g + 1) % 100;
            let params = Params::new().with("g", g);
            black_box(engine.query(SELECTIVE_QUERY, &params, &sources).unwrap())
        })
    });

    group.bench_function("uncached", |b| {
        let mut engine = Engine::with_capacity(0);
        let params = Params::new().with("g", 7);
        b.iter(|| black_box(engine.query(SELECTIVE_QUERY, &params, &sources).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    // Front end
    bench_tokenize,
    bench_parse,
    bench_bind,
    // Direct executor benchmarks
    bench_sort,
    bench_distinct,
    // End-to-end benchmarks
    bench_execute,
    bench_hash_vs_nested_join,
    bench_engine,
);

criterion_main!(benches);
