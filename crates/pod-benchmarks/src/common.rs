//! Common utilities for benchmarks

use criterion::Criterion;
use pprof::criterion::{Output, PProfProfiler};

use pod_core::error::PodResult;
use pod_core::types::{Capability, Requirement, TargetEnvironment, Unit, Version, VersionRange, PACKAGE_NAMESPACE};
use pod_resolver::{UniverseBuilder, UnitUniverse};

/// Configure criterion with flamegraph profiling support
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(2))
        .measurement_time(std::time::Duration::from_secs(8))
        .sample_size(50)
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

/// Platforms the synthetic universes ship fragments for
pub const PLATFORMS: [(&str, &str, &str); 3] = [
    ("linux", "gtk", "x86_64"),
    ("win32", "win32", "x86_64"),
    ("macosx", "cocoa", "aarch64"),
];

pub fn environments(count: usize) -> Vec<TargetEnvironment> {
    PLATFORMS
        .iter()
        .cycle()
        .take(count)
        .enumerate()
        .map(|(index, (os, ws, arch))| {
            let environment = TargetEnvironment::new(*os, *ws, *arch);
            // Repeat platforms with distinct locales past the first round
            if index < PLATFORMS.len() {
                environment
            } else {
                environment.with_nl(format!("l{}", index))
            }
        })
        .collect()
}

/// Layered universe of `size` repository units plus one reactor module `app`.
///
/// Unit `lib.N` requires `lib.N+1` and `lib.N+2` through package imports, and
/// every tenth unit also needs a platform fragment, so resolving `app` walks
/// the whole chain and evaluates filters along the way.
pub fn layered_universe(size: usize) -> PodResult<UnitUniverse> {
    let one = Version::new(1, 0, 0);
    let mut builder = UniverseBuilder::new();

    for index in 0..size {
        let mut unit = Unit::new(format!("lib.{}", index), one.clone())
            .provides(Capability::new(PACKAGE_NAMESPACE, format!("pkg.{}", index), one.clone()));
        for next in [index + 1, index + 2] {
            if next < size {
                unit = unit.requires(Requirement::new(
                    PACKAGE_NAMESPACE,
                    format!("pkg.{}", next),
                    VersionRange::at_least(one.clone()),
                ));
            }
        }
        if index % 10 == 0 {
            unit = unit.requires(Requirement::new(PACKAGE_NAMESPACE, "platform", VersionRange::UNCONSTRAINED));
        }
        builder.add_repository_unit(unit)?;
    }

    for (os, ws, _) in PLATFORMS {
        let fragment = Unit::new(format!("platform.{}", os), one.clone())
            .with_filter(format!("(&(os={})(ws={}))", os, ws))
            .provides(Capability::new(PACKAGE_NAMESPACE, "platform", one.clone()));
        builder.add_repository_unit(fragment)?;
    }

    let app = Unit::new("app", one.clone()).requires(Requirement::unit("lib.0", VersionRange::exact(one)));
    builder.add_reactor_unit("app", app)?;

    Ok(builder.build())
}
