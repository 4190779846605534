//! Universe assembly and lookup benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pod_benchmarks::{criterion_config, environments, layered_universe};
use pod_core::types::{Requirement, VersionRange, PACKAGE_NAMESPACE};
use pod_core::{Filter, FilterCache};

fn bench_universe_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("universe_build");
    group.sample_size(20);

    for size in [1_000, 10_000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("units", size), &size, |b, &size| {
            b.iter(|| black_box(layered_universe(size).unwrap().len()));
        });
    }

    group.finish();
}

/// Indexed capability lookup, including filter evaluation of candidates
fn bench_find_matches(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_matches");
    let environment = environments(1).remove(0);

    for size in [1_000, 10_000] {
        let universe = layered_universe(size).unwrap();
        let package = Requirement::new(PACKAGE_NAMESPACE, format!("pkg.{}", size / 2), VersionRange::UNCONSTRAINED);
        let platform = Requirement::new(PACKAGE_NAMESPACE, "platform", VersionRange::UNCONSTRAINED);

        group.bench_with_input(BenchmarkId::new("package", size), &size, |b, _| {
            b.iter(|| black_box(universe.find_matches(&package, &environment).unwrap().len()));
        });
        group.bench_with_input(BenchmarkId::new("filtered_fragment", size), &size, |b, _| {
            b.iter(|| black_box(universe.find_matches(&platform, &environment).unwrap().len()));
        });
    }

    group.finish();
}

/// Parsing a filter on every evaluation versus the shared cache
fn bench_filter_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_evaluation");
    let properties = environments(1).remove(0).to_filter_properties();
    let text = "(&(|(os=linux)(os=macosx))(ws=gtk)(!(arch=ppc64))(osgi.ee=JavaSE*))";
    let cache = FilterCache::new();

    group.bench_function("parse_each_time", |b| {
        b.iter(|| black_box(Filter::parse(text).unwrap().matches(&properties)));
    });
    group.bench_function("cached", |b| {
        b.iter(|| black_box(cache.evaluate(Some(text), &properties).unwrap()));
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_universe_build, bench_find_matches, bench_filter_evaluation
}
criterion_main!(benches);
