#![allow(dead_code)]

use archecs::World;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[derive(Debug, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Debug, Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
    dz: f32,
}

fn populated_world(n: usize) -> World {
    let mut world = World::new();
    for i in 0..n {
        let p = Position { x: i as f32, y: 0.0, z: 0.0 };
        let v = Velocity { dx: 1.0, dy: 0.0, dz: 0.0 };
        world.spawn((p, v));
    }
    world
}

fn spawn_benchmark(c: &mut Criterion) {
    c.bench_function("spawn_2_components", |b| {
        b.iter(|| {
            let mut world = World::new();
            for i in 0..1000 {
                black_box(world.spawn((
                    Position { x: i as f32, y: 0.0, z: 0.0 },
                    Velocity { dx: 1.0, dy: 0.0, dz: 0.0 },
                )));
            }
        });
    });
}

fn iteration_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iteration");

    group.bench_function("for_all_single_component", |b| {
        let mut world = populated_world(10_000);
        b.iter(|| {
            let mut total = 0.0f32;
            world.for_all::<&Position>(|p| total += p.x);
            black_box(total);
        });
    });

    group.bench_function("for_all_mut_two_components", |b| {
        let mut world = populated_world(10_000);
        b.iter(|| {
            world.for_all::<(&mut Position, &Velocity)>(|(p, v)| {
                p.x += v.dx;
                p.y += v.dy;
                p.z += v.dz;
            });
        });
    });

    group.bench_function("for_all_parallel_two_components", |b| {
        let mut world = populated_world(10_000);
        b.iter(|| {
            world.for_all_parallel::<(&mut Position, &Velocity)>(4, |(p, v)| {
                p.x += v.dx;
                p.y += v.dy;
                p.z += v.dz;
            });
        });
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark, iteration_benchmark);
criterion_main!(benches);
