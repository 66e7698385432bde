// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use polyframe_preview::ast::Context;
use polyframe_preview::cache::GeometryCache;
use polyframe_preview::csg::{RenderChain, TermEvaluator, TermNormalizer};
use polyframe_preview::geometry::MeshKernel;
use polyframe_preview::progress::NoProgress;
use polyframe_preview::tree::instantiate;
use polyframe_preview::{CancelToken, ScadParser, SourceParser};
use std::path::Path;

const NESTED: &str = r#"
    difference() {
        union() {
            cube(20, center = true);
            translate([0, 0, 10]) sphere(12);
        }
        intersection() {
            cylinder(h = 40, r = 6, center = true);
            rotate([90, 0, 0]) cylinder(h = 40, r = 6, center = true);
        }
        translate([8, 8, 0]) cube(4);
    }
"#;

fn grid(n: usize) -> String {
    (0..n)
        .map(|i| format!("translate([{}, {}, 0]) cube(1);\n", (i % 10) * 2, (i / 10) * 2))
        .collect()
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let parser = ScadParser::new();

    group.bench_with_input(BenchmarkId::new("nested", ""), &NESTED, |b, source| {
        b.iter(|| parser.parse(black_box(source), Path::new(".")).unwrap());
    });

    for n in [10, 100, 1000] {
        let source = grid(n);
        group.bench_with_input(BenchmarkId::new("grid", n), &source, |b, source| {
            b.iter(|| parser.parse(black_box(source), Path::new(".")).unwrap());
        });
    }

    group.finish();
}

fn bench_instantiate(c: &mut Criterion) {
    let mut group = c.benchmark_group("instantiate");
    let parser = ScadParser::new();

    for n in [10, 100, 1000] {
        let module = parser.parse(&grid(n), Path::new(".")).unwrap();
        group.bench_with_input(BenchmarkId::new("grid", n), &module, |b, module| {
            b.iter(|| instantiate(black_box(module), &Context::global()).unwrap());
        });
    }

    group.finish();
}

fn bench_products(c: &mut Criterion) {
    let mut group = c.benchmark_group("products");
    let parser = ScadParser::new();
    let kernel = MeshKernel::default();
    let cancel = CancelToken::new();

    let module = parser.parse(NESTED, Path::new(".")).unwrap();
    let tree = instantiate(&module, &Context::global()).unwrap();

    // warm cache: measures tree walking and term building only
    let cache = GeometryCache::new("bench", 1 << 28);
    group.bench_function("evaluate_nested", |b| {
        b.iter(|| {
            TermEvaluator::new(&tree, &kernel, &cache, &cancel)
                .evaluate(&mut NoProgress)
                .unwrap()
        });
    });

    let terms = TermEvaluator::new(&tree, &kernel, &cache, &cancel)
        .evaluate(&mut NoProgress)
        .unwrap();
    let primary = terms.primary.unwrap();

    for budget in [8, 64, 20000] {
        let normalizer = TermNormalizer::new(budget);
        group.bench_with_input(BenchmarkId::new("normalize_nested", budget), &primary, |b, term| {
            b.iter(|| normalizer.normalize(black_box(term), &cancel).unwrap());
        });
    }

    let normalized = TermNormalizer::new(20000).normalize(&primary, &cancel).unwrap();
    group.bench_function("chain_nested", |b| {
        b.iter(|| RenderChain::from_term(black_box(normalized.term.as_ref())));
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_instantiate, bench_products);
criterion_main!(benches);
