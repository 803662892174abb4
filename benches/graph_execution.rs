//! Benchmarks for graph execution and document handling
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use specgraph::graph::{builtin_registry, Graph, NodeId};

/// `gen -> stretch -> crop -> stretch -> ...` with `len` stages after the source
fn image_chain(len: usize, size: u64) -> (Graph, NodeId) {
    let registry = builtin_registry();
    let mut g = Graph::new();
    g.set_auto_perform(false);
    let src = g.create(registry, "gen").unwrap();
    g.set_param(src, "width", size).unwrap();
    g.set_param(src, "height", size).unwrap();

    let mut prev = src;
    for i in 0..len {
        let next = if i % 2 == 0 {
            g.create(registry, "stretch").unwrap()
        } else {
            let crop = g.create(registry, "crop").unwrap();
            g.set_param(crop, "w", size).unwrap();
            g.set_param(crop, "h", size).unwrap();
            crop
        };
        assert!(g.connect(next, 0, prev, 0).is_connected());
        prev = next;
    }
    let mean = g.create(registry, "mean").unwrap();
    g.connect(mean, 0, prev, 0);
    (g, src)
}

/// Layers of binops, each reading two nodes of the layer before
fn number_lattice(width: usize, depth: usize) -> Graph {
    let registry = builtin_registry();
    let mut g = Graph::new();
    g.set_auto_perform(false);

    let mut layer: Vec<NodeId> = (0..width)
        .map(|i| {
            let k = g.create(registry, "constant").unwrap();
            g.set_param(k, "value", i as f64 + 1.0).unwrap();
            k
        })
        .collect();
    for _ in 0..depth {
        let next: Vec<NodeId> = (0..width)
            .map(|i| {
                let op = g.create(registry, "binop").unwrap();
                g.connect(op, 0, layer[i], 0);
                g.connect(op, 1, layer[(i + 1) % width], 0);
                op
            })
            .collect();
        layer = next;
    }
    g
}

fn bench_targeted_perform(c: &mut Criterion) {
    let mut group = c.benchmark_group("targeted_perform");

    for len in [4, 16, 64].iter() {
        let (mut g, src) = image_chain(*len, 64);
        group.throughput(Throughput::Elements(*len as u64 + 2));
        group.bench_with_input(BenchmarkId::new("image_chain", len), &src, |b, &src| {
            b.iter(|| black_box(g.perform(src)));
        });
    }

    group.finish();
}

fn bench_bulk_perform(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_perform");

    for depth in [8, 32, 128].iter() {
        let mut g = number_lattice(8, *depth);
        group.throughput(Throughput::Elements(g.len() as u64));
        group.bench_function(BenchmarkId::new("number_lattice", depth), |b| {
            b.iter(|| black_box(g.perform_all()));
        });
    }

    let (mut g, _) = image_chain(32, 128);
    group.bench_function("image_chain_128px", |b| {
        b.iter(|| black_box(g.perform_all()));
    });

    group.finish();
}

fn bench_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("document");

    let g = number_lattice(8, 32);
    let saved = g.save();
    let text = saved.to_json_string().unwrap();

    group.bench_function("save", |b| {
        b.iter(|| black_box(g.save()));
    });

    group.bench_function("load", |b| {
        b.iter(|| black_box(Graph::load(&saved, builtin_registry()).unwrap()));
    });

    group.bench_function("to_json", |b| {
        b.iter(|| black_box(saved.to_json_string().unwrap()));
    });

    group.bench_function("from_json", |b| {
        b.iter(|| {
            black_box(specgraph::graph::SavedGraph::from_json_str(&text).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_targeted_perform,
    bench_bulk_perform,
    bench_document
);
criterion_main!(benches);
