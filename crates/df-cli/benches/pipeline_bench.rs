//! Benchmarks for the offline half of the pipeline.
//!
//! Run with: `cargo bench --package df-cli --bench pipeline_bench`
//!
//! Rendering is left out; it is dominated by the Graphviz process.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use df_metrics::analyze;
use df_parser::{Sanitizer, extract_candidate, prepare_document, validate};
use std::hint::black_box;

/// A chatty response wrapping a chain of `steps` nodes with a few branches.
fn response(steps: usize) -> String {
    let mut body = String::from("digraph G {\n  rankdir=TB;\n");
    for index in 0..steps {
        body.push_str(&format!("  s{index} [label=\"Step {index}\"];\n"));
    }
    for index in 1..steps {
        body.push_str(&format!("  s{} -> s{index};\n", index - 1));
        if index % 7 == 0 {
            body.push_str(&format!("  s{index} -> s{} [label=|retry|];\n", index - 3));
        }
    }
    body.push('}');
    format!("Here is the flow you asked for.\n\n```dot\n{body}\n```\nLet me know if it needs work.")
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    for steps in [10, 100, 1_000] {
        let raw = response(steps);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(steps), &raw, |b, raw| {
            b.iter(|| extract_candidate(black_box(raw)));
        });
    }
    group.finish();
}

fn bench_prepare(c: &mut Criterion) {
    let sanitizer = Sanitizer::default();
    let mut group = c.benchmark_group("prepare_document");
    for steps in [10, 100, 1_000] {
        let raw = response(steps);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(steps), &raw, |b, raw| {
            b.iter(|| prepare_document(black_box(raw), &sanitizer));
        });
    }
    group.finish();
}

fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    for steps in [10, 100, 1_000] {
        let candidate = extract_candidate(&response(steps)).unwrap_or_default();
        let Ok(sanitized) = Sanitizer::default().apply(&candidate) else {
            continue;
        };
        let Ok(document) = validate(&sanitized) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::from_parameter(steps), &document, |b, document| {
            b.iter(|| analyze(black_box(document)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extract, bench_prepare, bench_metrics);
criterion_main!(benches);
