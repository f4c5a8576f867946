//! Memoria Core Scoring Benchmarks
//!
//! Benchmarks for the hot paths shared by every search: the Wilson score
//! recompute on each outcome, FTS5 query sanitisation on each lexical
//! search, entity extraction on each query, and the cosine similarity
//! used by the in-memory vector index.
//! Run with: cargo bench -p memoria-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use memoria_core::embedder::cosine_similarity;
use memoria_core::kg::extract_entities;
use memoria_core::store::sanitize_fts5_query;
use memoria_core::wilson::wilson_default;

fn bench_wilson_default(c: &mut Criterion) {
    c.bench_function("wilson_default_100_uses", |b| {
        b.iter(|| black_box(wilson_default(black_box(72.0), black_box(100))));
    });
}

fn bench_sanitize_fts5(c: &mut Criterion) {
    c.bench_function("sanitize_fts5_query", |b| {
        b.iter(|| black_box(sanitize_fts5_query(black_box("docker bridge \"exact phrase\" OR restart-daemon!@#"))));
    });
}

fn bench_extract_entities(c: &mut Criterion) {
    let text = "Docker Compose restarted the Nginx container after the Kubernetes health check failed in us-east-1";
    c.bench_function("extract_entities", |b| {
        b.iter(|| black_box(extract_entities(black_box(text))));
    });
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..256).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..256).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_256d", |bencher| {
        bencher.iter(|| black_box(cosine_similarity(black_box(&a), black_box(&b))));
    });
}

criterion_group!(
    benches,
    bench_wilson_default,
    bench_sanitize_fts5,
    bench_extract_entities,
    bench_cosine_similarity,
);
criterion_main!(benches);
