//! Integration tests for ALICE-Physics2D
//!
//! These tests drive the engine through the public API re-exported from the
//! crate root only.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use alice_physics2d::settings::{LINEAR_SLOP, TIME_TO_SLEEP};
use alice_physics2d::{
    Aabb, BodyDef, BodyId, CircleShape, ContactEventType, ContactId, ContactListener, EdgeShape,
    FixtureDef, Filter, ParticleDef, ParticleDestructionListener, ParticleFlags,
    ParticleGroupDef, PhysicsError, PolygonShape, RevoluteJointDef, Vec2, World,
};

const DT: f32 = 1.0 / 60.0;

// ============================================================================
// Helpers
// ============================================================================

fn run_world(world: &mut World, steps: usize) {
    for _ in 0..steps {
        world.step(DT, 8, 3);
    }
}

/// Static box whose top face lies on y = 0
fn ground_box(world: &mut World) -> BodyId {
    let ground = world.create_body(&BodyDef::fixed(Vec2::new(0.0, -0.5))).unwrap();
    world
        .create_fixture(ground, &FixtureDef::new(PolygonShape::new_box(20.0, 0.5)))
        .unwrap();
    ground
}

fn ground_edge(world: &mut World) -> BodyId {
    let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
    let edge = EdgeShape::new(Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0));
    world.create_fixture(ground, &FixtureDef::new(edge)).unwrap();
    ground
}

fn ball(world: &mut World, position: Vec2, radius: f32) -> BodyId {
    let body = world.create_body(&BodyDef::dynamic(position)).unwrap();
    world
        .create_fixture(body, &FixtureDef::new(CircleShape::new(radius)).with_density(1.0))
        .unwrap();
    body
}

// ============================================================================
// Resting contact and sleep
// ============================================================================

#[test]
fn test_circle_settles_on_ground_then_sleeps() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_box(&mut world);
    let b = ball(&mut world, Vec2::new(0.0, 10.0), 0.5);

    // Free fall from 10 m takes about 1.4 s
    run_world(&mut world, 150);
    let y = world.body(b).unwrap().position().y;
    assert!(
        (y - (0.5 + LINEAR_SLOP)).abs() < 1e-3,
        "resting height {y}"
    );

    let mut slept_after = None;
    for i in 0..120 {
        world.step(DT, 8, 3);
        if !world.body(b).unwrap().is_awake() {
            slept_after = Some(i as f32 * DT);
            break;
        }
    }
    let slept_after = slept_after.expect("body never fell asleep");
    assert!(slept_after <= TIME_TO_SLEEP + 0.1);
    assert_eq!(world.body(b).unwrap().linear_velocity(), Vec2::ZERO);
}

#[test]
fn test_box_stack_stays_upright() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_box(&mut world);
    let mut boxes = Vec::new();
    for i in 0..4 {
        let body = world
            .create_body(&BodyDef::dynamic(Vec2::new(0.0, 0.5 + 1.0 * i as f32)))
            .unwrap();
        world
            .create_fixture(body, &FixtureDef::new(PolygonShape::new_box(0.5, 0.5)).with_density(1.0))
            .unwrap();
        boxes.push(body);
    }
    run_world(&mut world, 240);
    for (i, &body) in boxes.iter().enumerate() {
        let b = world.body(body).unwrap();
        assert!(b.position().x.abs() < 0.05, "box {i} slid to {:?}", b.position());
        assert!((b.position().y - (0.5 + i as f32)).abs() < 0.1);
        assert!(b.angle().abs() < 0.05);
    }
}

// ============================================================================
// Continuous collision
// ============================================================================

#[test]
fn test_fast_circle_stopped_by_thin_edge() {
    let radius = 0.1;
    let launch = |continuous: bool| {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        world.set_continuous_physics(continuous);
        ground_edge(&mut world);
        let b = ball(&mut world, Vec2::new(0.0, 0.5), radius);
        world
            .body_mut(b)
            .unwrap()
            .set_linear_velocity(Vec2::new(0.0, -50.0));
        world.step(DT, 8, 3);
        world.body(b).unwrap().position().y
    };

    assert!(launch(false) < 0.0);

    let y = launch(true);
    assert!(y > 0.0, "tunneled to {y}");
    // Resting within one slop of the edge surface
    assert!((y - radius).abs() < LINEAR_SLOP, "stopped at {y}");
}

#[test]
fn test_sweep_endpoints_match_step_poses() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let b = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 3.0))).unwrap();
    world
        .create_fixture(b, &FixtureDef::new(PolygonShape::new_box(1.0, 0.25)).with_density(1.0))
        .unwrap();
    world.body_mut(b).unwrap().set_angular_velocity(2.0);
    run_world(&mut world, 10);

    let body = world.body(b).unwrap();
    let sweep = *body.sweep();
    assert!(sweep.c0 != sweep.c);

    // End of the sweep is the body's current pose
    let end = sweep.get_transform(1.0);
    assert_eq!(end.p, body.transform().p);
    assert!((end.q.angle() - body.angle()).abs() < 1e-6);

    // Start of the sweep is the pose at c0, a0
    let start = sweep.get_transform(0.0);
    assert_eq!(start.p + start.q.mul_vec(sweep.local_center), sweep.c0);
    assert!((start.q.angle() - sweep.a0).abs() < 1e-6);
}

// ============================================================================
// Structural changes
// ============================================================================

#[test]
fn test_destroy_body_removes_its_joint_and_fixtures() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let a = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 4.0))).unwrap();
    world
        .create_fixture(a, &FixtureDef::new(CircleShape::new(0.5)).with_density(1.0))
        .unwrap();
    world
        .create_fixture(a, &FixtureDef::new(PolygonShape::new_box(0.25, 0.25)).with_density(1.0))
        .unwrap();
    let b = ball(&mut world, Vec2::new(2.0, 4.0), 0.5);
    let def = RevoluteJointDef::initialize(&world, a, b, Vec2::new(1.0, 4.0)).unwrap();
    world.create_joint(def).unwrap();
    run_world(&mut world, 5);

    let bodies = world.body_count();
    let joints = world.joint_count();
    world.destroy_body(a).unwrap();

    assert_eq!(world.body_count(), bodies - 1);
    assert_eq!(world.joint_count(), joints - 1);
    assert!(world.body(b).unwrap().joint_edges().is_empty());
    assert!(world.body(a).is_none());
    assert_eq!(world.proxy_count(), 1);
    run_world(&mut world, 5);
}

struct LockedCalls {
    saw_lock: Rc<Cell<bool>>,
    errors: Rc<RefCell<Vec<PhysicsError>>>,
    other: BodyId,
}

impl ContactListener for LockedCalls {
    fn begin_contact(&mut self, world: &mut World, _contact: ContactId) {
        self.saw_lock.set(world.is_locked());
        let mut errors = self.errors.borrow_mut();
        if let Err(e) = world.create_body(&BodyDef::dynamic(Vec2::ZERO)) {
            errors.push(e);
        }
        if let Err(e) = world.destroy_body(self.other) {
            errors.push(e);
        }
        let fixture = FixtureDef::new(CircleShape::new(1.0));
        if let Err(e) = world.create_fixture(self.other, &fixture) {
            errors.push(e);
        }
    }
}

#[test]
fn test_callbacks_cannot_change_structure() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_box(&mut world);
    let falling = ball(&mut world, Vec2::new(0.0, 1.0), 0.5);
    let other = ball(&mut world, Vec2::new(10.0, 5.0), 0.5);
    let saw_lock = Rc::new(Cell::new(false));
    let errors = Rc::new(RefCell::new(Vec::new()));
    world.set_contact_listener(LockedCalls {
        saw_lock: saw_lock.clone(),
        errors: errors.clone(),
        other,
    });

    run_world(&mut world, 30);

    assert!(saw_lock.get());
    let errors = errors.borrow();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|e| *e == PhysicsError::WorldLocked));
    assert!(!world.is_locked());
    assert_eq!(world.body_count(), 3);
    assert_eq!(world.body(other).unwrap().fixtures().len(), 1);
    assert!(world.body(falling).unwrap().position().y > 0.0);

    // The world keeps working once unlocked
    world.destroy_body(other).unwrap();
    run_world(&mut world, 5);
    assert_eq!(world.body_count(), 2);
}

// ============================================================================
// Filtering and sensors
// ============================================================================

#[test]
fn test_refilter_is_idempotent() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_box(&mut world);
    let b = ball(&mut world, Vec2::new(0.0, 0.49), 0.5);
    run_world(&mut world, 2);
    let fixture = world.body(b).unwrap().fixtures()[0];
    let before = world.contact_count();
    assert_eq!(before, 1);

    world.refilter(fixture).unwrap();
    world.refilter(fixture).unwrap();
    run_world(&mut world, 1);
    assert_eq!(world.contact_count(), before);

    // Mask out everything: the contact goes away on the next step
    let filter = Filter {
        mask_bits: 0,
        ..Filter::default()
    };
    world.set_filter_data(fixture, filter).unwrap();
    run_world(&mut world, 1);
    assert_eq!(world.contact_count(), 0);
}

#[test]
fn test_sensor_reports_begin_and_end_without_response() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    let zone = world.create_body(&BodyDef::fixed(Vec2::new(0.0, 2.0))).unwrap();
    world
        .create_fixture(zone, &FixtureDef::new(PolygonShape::new_box(2.0, 0.5)).with_sensor(true))
        .unwrap();
    let b = ball(&mut world, Vec2::new(0.0, 4.0), 0.25);

    let mut begins = 0;
    let mut ends = 0;
    for _ in 0..90 {
        world.step(DT, 8, 3);
        begins += world
            .events()
            .events_of(ContactEventType::Begin)
            .filter(|e| e.sensor)
            .count();
        ends += world
            .events()
            .events_of(ContactEventType::End)
            .filter(|e| e.sensor)
            .count();
    }
    assert_eq!(begins, 1);
    assert_eq!(ends, 1);
    // Passed straight through
    assert!(world.body(b).unwrap().position().y < 1.0);
}

// ============================================================================
// Particles
// ============================================================================

#[derive(Default)]
struct Goodbyes(Rc<RefCell<Vec<usize>>>);

impl ParticleDestructionListener for Goodbyes {
    fn say_goodbye_particle(&mut self, index: usize) {
        self.0.borrow_mut().push(index);
    }
}

#[test]
fn test_particle_destruction_is_deferred_to_step() {
    let mut world = World::new(Vec2::ZERO);
    let seen = Rc::new(RefCell::new(Vec::new()));
    world.set_particle_destruction_listener(Goodbyes(seen.clone()));
    for i in 0..4 {
        world
            .create_particle(&ParticleDef::new(Vec2::new(i as f32 * 3.0, 0.0)))
            .unwrap();
    }
    world.destroy_particle(1, true).unwrap();
    assert_eq!(world.particle_count(), 4);
    assert!(world.particle_flags()[1].contains(ParticleFlags::ZOMBIE));
    assert!(seen.borrow().is_empty());

    world.step(DT, 8, 3);
    assert_eq!(world.particle_count(), 3);
    assert_eq!(*seen.borrow(), vec![1]);
    // Survivors keep their relative order
    let xs: Vec<f32> = world.particle_positions().iter().map(|p| p.x).collect();
    assert!(xs.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_liquid_block_spreads_on_ground() {
    let mut world = World::new(Vec2::new(0.0, -10.0));
    ground_box(&mut world);
    world.set_particle_radius(0.1).unwrap();
    let def = ParticleGroupDef::new(PolygonShape::new_box(0.5, 0.5), Vec2::new(0.0, 1.0));
    world.create_particle_group(&def).unwrap();
    let count = world.particle_count();
    assert!(count > 0);

    run_world(&mut world, 180);

    assert_eq!(world.particle_count(), count);
    let positions = world.particle_positions();
    assert!(positions.iter().all(|p| p.y > -0.1));
    let width = positions.iter().map(|p| p.x).fold(f32::MIN, f32::max)
        - positions.iter().map(|p| p.x).fold(f32::MAX, f32::min);
    assert!(width > 1.0, "liquid did not spread, width {width}");
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_queries_find_fixtures() {
    let mut world = World::new(Vec2::ZERO);
    let left = ball(&mut world, Vec2::new(-3.0, 0.0), 0.5);
    let right = ball(&mut world, Vec2::new(3.0, 0.0), 0.5);
    let left_fixture = world.body(left).unwrap().fixtures()[0];
    let right_fixture = world.body(right).unwrap().fixtures()[0];

    let mut found = Vec::new();
    world.query_aabb(&Aabb::new(Vec2::new(-4.0, -1.0), Vec2::new(-2.0, 1.0)), |f| {
        found.push(f);
        true
    });
    assert_eq!(found, vec![left_fixture]);

    assert_eq!(world.query_point(Vec2::new(3.1, 0.1)), vec![right_fixture]);
    assert!(world.query_point(Vec2::ZERO).is_empty());

    let hit = world
        .raycast_closest(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0))
        .unwrap();
    assert_eq!(hit.fixture, left_fixture);
    assert!((hit.point.x + 3.5).abs() < 1e-4);
    assert!((hit.normal - Vec2::new(-1.0, 0.0)).length() < 1e-4);

    let hit = world
        .raycast_closest(Vec2::new(10.0, 0.0), Vec2::new(-10.0, 0.0))
        .unwrap();
    assert_eq!(hit.fixture, right_fixture);
}
