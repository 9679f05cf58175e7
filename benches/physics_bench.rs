//! Benchmarks for ALICE-Physics2D
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use alice_physics2d::dynamic_bvh::DynamicTree;
use alice_physics2d::narrowphase::collide_polygons;
use alice_physics2d::{
    Aabb, BodyDef, CircleShape, FixtureDef, ParticleGroupDef, PolygonShape, Transform, Vec2, World,
};

const DT: f32 = 1.0 / 60.0;

fn ground(world: &mut World) {
    let g = world.create_body(&BodyDef::fixed(Vec2::new(0.0, -0.5))).unwrap();
    world
        .create_fixture(g, &FixtureDef::new(PolygonShape::new_box(50.0, 0.5)))
        .unwrap();
}

// ============================================================================
// World step benchmarks
// ============================================================================

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");

    group.bench_function("pyramid_20_rows_60_steps", |b| {
        b.iter(|| {
            let mut world = World::new(Vec2::new(0.0, -10.0));
            ground(&mut world);
            let shape = PolygonShape::new_box(0.5, 0.5);
            for row in 0..20 {
                for i in 0..(20 - row) {
                    let x = (i as f32 - (20 - row) as f32 * 0.5) * 1.05;
                    let y = 0.5 + row as f32 * 1.0;
                    let body = world.create_body(&BodyDef::dynamic(Vec2::new(x, y))).unwrap();
                    world
                        .create_fixture(body, &FixtureDef::new(shape).with_density(1.0))
                        .unwrap();
                }
            }
            for _ in 0..60 {
                world.step(black_box(DT), 8, 3);
            }
            world.body_count()
        });
    });

    group.bench_function("falling_circles_200_30_steps", |b| {
        b.iter(|| {
            let mut world = World::new(Vec2::new(0.0, -10.0));
            ground(&mut world);
            for i in 0..200 {
                let x = (i % 20) as f32 * 1.2 - 12.0;
                let y = 2.0 + (i / 20) as f32 * 1.2;
                let body = world.create_body(&BodyDef::dynamic(Vec2::new(x, y))).unwrap();
                world
                    .create_fixture(body, &FixtureDef::new(CircleShape::new(0.5)).with_density(1.0))
                    .unwrap();
            }
            for _ in 0..30 {
                world.step(black_box(DT), 8, 3);
            }
            world.contact_count()
        });
    });

    group.finish();
}

// ============================================================================
// Particle benchmarks
// ============================================================================

fn bench_particles(c: &mut Criterion) {
    let mut group = c.benchmark_group("particles");

    group.bench_function("liquid_block_30_steps", |b| {
        b.iter(|| {
            let mut world = World::new(Vec2::new(0.0, -10.0));
            ground(&mut world);
            world.set_particle_radius(0.05).unwrap();
            let def = ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0), Vec2::new(0.0, 1.5));
            world.create_particle_group(&def).unwrap();
            for _ in 0..30 {
                world.step(black_box(DT), 8, 3);
            }
            world.particle_count()
        });
    });

    group.finish();
}

// ============================================================================
// Collision benchmarks
// ============================================================================

fn bench_collision(c: &mut Criterion) {
    let mut group = c.benchmark_group("collision");

    let a = PolygonShape::new_box(0.5, 0.5);
    let b = PolygonShape::new_box(0.5, 0.5);
    let xf_a = Transform::new(Vec2::ZERO, 0.0);
    let xf_b = Transform::new(Vec2::new(0.9, 0.2), 0.3);
    group.bench_function("collide_polygons", |bench| {
        bench.iter(|| black_box(collide_polygons(black_box(&a), &xf_a, black_box(&b), &xf_b)));
    });

    let mut tree = DynamicTree::<u32>::new();
    for i in 0..1000u32 {
        let x = (i % 40) as f32 * 2.0;
        let y = (i / 40) as f32 * 2.0;
        let aabb = Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0));
        tree.create_proxy(&aabb, i);
    }
    group.bench_function("tree_query_1000_proxies", |bench| {
        let q = Aabb::new(Vec2::new(10.0, 10.0), Vec2::new(20.0, 20.0));
        bench.iter(|| {
            let mut hits = 0;
            tree.query(black_box(&q), |_| {
                hits += 1;
                true
            });
            hits
        });
    });

    group.finish();
}

criterion_group!(benches, bench_world_step, bench_particles, bench_collision);
criterion_main!(benches);
