#![no_main]
use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;
use alice_physics2d::{
    BodyDef, CircleShape, FixtureDef, ParticleDef, PolygonShape, Vec2, World,
};

#[derive(Debug, Arbitrary)]
struct FuzzBody {
    /// Position (i8 keeps bodies near each other)
    x: i8,
    y: i8,
    /// Circle radius or box half-extent in tenths of a meter
    size: u8,
    is_box: bool,
    is_bullet: bool,
    /// Initial velocity
    vx: i16,
    vy: i16,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    bodies: Vec<FuzzBody>,
    particles: Vec<(i8, i8)>,
    /// Number of simulation steps (capped)
    step_count: u8,
    continuous: bool,
}

// Fuzz the world: add random bodies and particles and step.
// Must never panic regardless of input.
fuzz_target!(|input: FuzzInput| {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    world.set_continuous_physics(input.continuous);

    let ground = match world.create_body(&BodyDef::fixed(Vec2::new(0.0, -140.0))) {
        Ok(g) => g,
        Err(_) => return,
    };
    let _ = world.create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(200.0, 1.0)));

    for fb in input.bodies.iter().take(32) {
        let mut def = BodyDef::dynamic(Vec2::new(fb.x as f32, fb.y as f32));
        def.bullet = fb.is_bullet;
        def.linear_velocity = Vec2::new(fb.vx as f32 * 0.01, fb.vy as f32 * 0.01);
        let Ok(body) = world.create_body(&def) else {
            continue;
        };
        let size = 0.05 + fb.size as f32 * 0.1;
        let fixture = if fb.is_box {
            FixtureDef::new(PolygonShape::new_box(size, size))
        } else {
            FixtureDef::new(CircleShape::new(size))
        };
        let _ = world.create_fixture(body, &fixture.with_density(1.0));
    }

    for &(x, y) in input.particles.iter().take(256) {
        let _ = world.create_particle(&ParticleDef::new(Vec2::new(x as f32 * 0.1, y as f32 * 0.1)));
    }

    let steps = (input.step_count as usize).min(32);
    for _ in 0..steps {
        world.step(1.0 / 60.0, 8, 3);
    }
});
