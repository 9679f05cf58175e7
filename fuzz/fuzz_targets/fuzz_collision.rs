#![no_main]
use libfuzzer_sys::fuzz_target;
use arbitrary::Arbitrary;
use alice_physics2d::collision::test_overlap;
use alice_physics2d::narrowphase::collide;
use alice_physics2d::{ChainShape, CircleShape, EdgeShape, PolygonShape, Shape, Transform, Vec2};

#[derive(Debug, Arbitrary)]
struct CollisionInput {
    /// Polygon hull points (may be degenerate)
    points: Vec<(i8, i8)>,
    /// Circle radius in tenths of a meter
    radius: u8,
    /// Pose of the second shape
    x: i8,
    y: i8,
    angle: i8,
    /// Shape kinds to collide
    kind_a: u8,
    kind_b: u8,
}

fn make_shape(kind: u8, input: &CollisionInput, points: &[Vec2]) -> Option<Shape> {
    match kind % 4 {
        0 => Some(CircleShape::new(0.05 + input.radius as f32 * 0.1).into()),
        1 => PolygonShape::from_points(points).ok().map(Shape::from),
        2 => Some(EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)).into()),
        _ => ChainShape::create_loop(points).ok().map(Shape::from),
    }
}

// Fuzz the narrow phase with arbitrary shape pairs and poses.
// Must never panic, even for degenerate hulls or coincident shapes.
fuzz_target!(|input: CollisionInput| {
    let points: Vec<Vec2> = input
        .points
        .iter()
        .take(16)
        .map(|&(x, y)| Vec2::new(x as f32 * 0.1, y as f32 * 0.1))
        .collect();
    let (Some(a), Some(b)) = (
        make_shape(input.kind_a, &input, &points),
        make_shape(input.kind_b, &input, &points),
    ) else {
        return;
    };

    let xf_a = Transform::new(Vec2::ZERO, 0.0);
    let xf_b = Transform::new(
        Vec2::new(input.x as f32 * 0.05, input.y as f32 * 0.05),
        input.angle as f32 * 0.05,
    );

    for child_a in 0..a.child_count() {
        for child_b in 0..b.child_count() {
            let _ = test_overlap(&a, child_a, &b, child_b, &xf_a, &xf_b);
        }
        let manifold = collide(&a, child_a, &xf_a, &b, &xf_b);
        assert!(manifold.point_count <= 2);
    }
});
