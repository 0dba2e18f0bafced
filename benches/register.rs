use criterion::*;
use std::hint::black_box;

use tile_registry::{GridPosition, GridWorld, RegistryConfig, SurfaceId, TileRegistry};

mod common;
use common::*;

fn register_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("register");

    for side in [SIDE_SMALL, SIDE_MED] {
        let cells = (side * side) as u64;
        group.throughput(Throughput::Elements(cells));

        group.bench_with_input(BenchmarkId::new("place_square", side), &side, |b, &side| {
            b.iter_batched(
                || {
                    let mut world = GridWorld::new();
                    world.load_surface(SurfaceId(0));
                    let registry = TileRegistry::with_world(RegistryConfig::default(), &world);
                    (world, registry)
                },
                |(_world, mut registry)| {
                    for y in 0..side {
                        for x in 0..side {
                            let tile = block(x, y);
                            registry.register(&tile, GridPosition::new(x, y), SurfaceId(0)).unwrap();
                        }
                    }
                    black_box(registry);
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("unregister_square", side), &side, |b, &side| {
            b.iter_batched(
                || TileRegistry::with_world(RegistryConfig::default(), &filled_world(side)),
                |mut registry| {
                    for y in 0..side {
                        for x in 0..side {
                            registry.unregister(SurfaceId(0), GridPosition::new(x, y), true).unwrap();
                        }
                    }
                    black_box(registry);
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.bench_function("tag_lookup", |b| {
        let registry = TileRegistry::with_world(RegistryConfig::default(), &filled_world(SIDE_MED));
        b.iter(|| black_box(registry.get_all_with_tag(Some(SurfaceId(1)), "even", None).len()));
    });

    group.finish();
}

criterion_group!(benches, register_benchmark);
criterion_main!(benches);
