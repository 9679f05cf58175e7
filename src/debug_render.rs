//! Debug Visualization API
//!
//! Abstract debug rendering interface for visualizing physics state.
//! The world emits polygons, circles, segments and transforms to any
//! [`DebugDraw`] sink; the engine never owns rendering resources.
//!
//! # Usage
//!
//! Implement `DebugDraw` for your graphics backend (or use the recording
//! [`DebugDrawData`]), then call `World::draw_debug_data()` each frame.

use bitflags::bitflags;

use crate::body::{Body, BodyType};
use crate::fixture::Fixture;
use crate::joint::{JointKind, JointType};
use crate::math::{Transform, Vec2};
use crate::particle::ParticleColor;
use crate::shape::Shape;
use crate::world::World;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// RGBA color for debug rendering (0-255 per channel)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel
    pub a: u8,
}

impl Color {
    /// Create a new color
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Shape of an inactive body
    pub const INACTIVE: Self = Self::new(128, 128, 77, 255);
    /// Shape of a static body
    pub const STATIC: Self = Self::new(128, 230, 128, 255);
    /// Shape of a kinematic body
    pub const KINEMATIC: Self = Self::new(128, 128, 230, 255);
    /// Shape of a sleeping body
    pub const ASLEEP: Self = Self::new(153, 153, 153, 255);
    /// Shape of an awake body
    pub const AWAKE: Self = Self::new(230, 179, 179, 255);
    /// Joint lines
    pub const JOINT: Self = Self::new(128, 204, 204, 255);
    /// Broad-phase pair lines
    pub const PAIR: Self = Self::new(77, 230, 230, 255);
    /// Fixture bounding boxes
    pub const AABB: Self = Self::new(230, 77, 230, 255);
    /// Dynamic tree nodes
    pub const TREE: Self = Self::new(230, 230, 77, 255);
}

bitflags! {
    /// What to draw in debug mode
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DrawFlags: u32 {
        /// Fixture shapes and particles
        const SHAPE = 1 << 0;
        /// Joint connections
        const JOINT = 1 << 1;
        /// Fixture bounding boxes
        const AABB = 1 << 2;
        /// Contact pairs
        const PAIR = 1 << 3;
        /// Body centers of mass
        const CENTER_OF_MASS = 1 << 4;
        /// Every node of the broad-phase tree
        const DYNAMIC_TREE = 1 << 5;
        /// Outline shapes instead of filling them
        const WIREFRAME = 1 << 6;
    }
}

/// Sink for debug geometry
pub trait DebugDraw {
    /// Which layers to emit
    fn flags(&self) -> DrawFlags;

    /// Closed polygon outline
    fn draw_polygon(&mut self, vertices: &[Vec2], color: Color);

    /// Filled polygon
    fn draw_solid_polygon(&mut self, vertices: &[Vec2], color: Color);

    /// Circle outline
    fn draw_circle(&mut self, center: Vec2, radius: f32, color: Color);

    /// Filled circle with a radius line along `axis`
    fn draw_solid_circle(&mut self, center: Vec2, radius: f32, axis: Vec2, color: Color);

    fn draw_segment(&mut self, p1: Vec2, p2: Vec2, color: Color);

    /// Coordinate axes of a transform
    fn draw_transform(&mut self, xf: &Transform);

    /// Particle disks. `colors` is empty when no particle has a color.
    fn draw_particles(&mut self, _centers: &[Vec2], _radius: f32, _colors: &[ParticleColor]) {}
}

// ============================================================================
// Recording sink
// ============================================================================

/// A debug line segment
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugLine {
    pub start: Vec2,
    pub end: Vec2,
    pub color: Color,
}

/// A debug circle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugCircle {
    pub center: Vec2,
    pub radius: f32,
    pub color: Color,
    pub solid: bool,
}

/// A debug polygon
#[derive(Clone, Debug, PartialEq)]
pub struct DebugPolygon {
    pub vertices: Vec<Vec2>,
    pub color: Color,
    pub solid: bool,
}

/// Collected debug geometry for one frame
#[derive(Clone, Debug, Default)]
pub struct DebugDrawData {
    /// Layers to record
    pub flags: DrawFlags,
    /// Line segments (including transform axes)
    pub lines: Vec<DebugLine>,
    /// Circles
    pub circles: Vec<DebugCircle>,
    /// Polygons
    pub polygons: Vec<DebugPolygon>,
    /// Particle centers
    pub particles: Vec<Vec2>,
}

impl DebugDrawData {
    /// Create an empty recorder drawing `flags`
    pub fn new(flags: DrawFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    /// Clear all primitives
    pub fn clear(&mut self) {
        self.lines.clear();
        self.circles.clear();
        self.polygons.clear();
        self.particles.clear();
    }

    /// Total number of primitives
    pub fn primitive_count(&self) -> usize {
        self.lines.len() + self.circles.len() + self.polygons.len() + self.particles.len()
    }
}

impl DebugDraw for DebugDrawData {
    fn flags(&self) -> DrawFlags {
        self.flags
    }

    fn draw_polygon(&mut self, vertices: &[Vec2], color: Color) {
        self.polygons.push(DebugPolygon {
            vertices: vertices.to_vec(),
            color,
            solid: false,
        });
    }

    fn draw_solid_polygon(&mut self, vertices: &[Vec2], color: Color) {
        self.polygons.push(DebugPolygon {
            vertices: vertices.to_vec(),
            color,
            solid: true,
        });
    }

    fn draw_circle(&mut self, center: Vec2, radius: f32, color: Color) {
        self.circles.push(DebugCircle {
            center,
            radius,
            color,
            solid: false,
        });
    }

    fn draw_solid_circle(&mut self, center: Vec2, radius: f32, _axis: Vec2, color: Color) {
        self.circles.push(DebugCircle {
            center,
            radius,
            color,
            solid: true,
        });
    }

    fn draw_segment(&mut self, p1: Vec2, p2: Vec2, color: Color) {
        self.lines.push(DebugLine {
            start: p1,
            end: p2,
            color,
        });
    }

    fn draw_transform(&mut self, xf: &Transform) {
        const AXIS_SCALE: f32 = 0.4;
        self.draw_segment(xf.p, xf.p + xf.q.x_axis() * AXIS_SCALE, Color::new(255, 0, 0, 255));
        self.draw_segment(xf.p, xf.p + xf.q.y_axis() * AXIS_SCALE, Color::new(0, 255, 0, 255));
    }

    fn draw_particles(&mut self, centers: &[Vec2], _radius: f32, _colors: &[ParticleColor]) {
        self.particles.extend_from_slice(centers);
    }
}

// ============================================================================
// World drawing
// ============================================================================

fn body_color(body: &Body) -> Color {
    if !body.is_active() {
        Color::INACTIVE
    } else if body.body_type() == BodyType::Static {
        Color::STATIC
    } else if body.body_type() == BodyType::Kinematic {
        Color::KINEMATIC
    } else if !body.is_awake() {
        Color::ASLEEP
    } else {
        Color::AWAKE
    }
}

fn aabb_vertices(lower: Vec2, upper: Vec2) -> [Vec2; 4] {
    [
        lower,
        Vec2::new(upper.x, lower.y),
        upper,
        Vec2::new(lower.x, upper.y),
    ]
}

fn draw_shape(draw: &mut dyn DebugDraw, fixture: &Fixture, xf: &Transform, color: Color, wireframe: bool) {
    match &fixture.shape {
        Shape::Circle(circle) => {
            let center = xf.mul_vec(circle.p);
            if wireframe {
                draw.draw_circle(center, circle.radius, color);
            } else {
                draw.draw_solid_circle(center, circle.radius, xf.q.x_axis(), color);
            }
        }
        Shape::Edge(edge) => {
            draw.draw_segment(xf.mul_vec(edge.vertex1), xf.mul_vec(edge.vertex2), color);
        }
        Shape::Chain(chain) => {
            for w in chain.vertices.windows(2) {
                draw.draw_segment(xf.mul_vec(w[0]), xf.mul_vec(w[1]), color);
            }
        }
        Shape::Polygon(polygon) => {
            let vertices: Vec<Vec2> = polygon.vertices().iter().map(|&v| xf.mul_vec(v)).collect();
            if wireframe {
                draw.draw_polygon(&vertices, color);
            } else {
                draw.draw_solid_polygon(&vertices, color);
            }
        }
    }
}

impl World {
    /// Emit debug geometry for the layers selected by `draw.flags()`
    pub fn draw_debug_data(&self, draw: &mut dyn DebugDraw) {
        let flags = draw.flags();
        let wireframe = flags.contains(DrawFlags::WIREFRAME);

        if flags.contains(DrawFlags::SHAPE) {
            for (_, body) in self.bodies.iter() {
                let color = body_color(body);
                for &id in body.fixtures() {
                    if let Some(fixture) = self.fixtures.get(id) {
                        draw_shape(draw, fixture, body.transform(), color, wireframe);
                    }
                }
            }
            let particles = self.particle_system();
            if !particles.is_empty() {
                let colors = particles.colors();
                let colors = if colors.iter().all(ParticleColor::is_zero) {
                    &[][..]
                } else {
                    colors
                };
                draw.draw_particles(particles.positions(), particles.radius(), colors);
            }
        }

        if flags.contains(DrawFlags::JOINT) {
            for (id, joint) in self.joints.iter() {
                let Some((p1, p2)) = self.joint_anchors(id) else {
                    continue;
                };
                let (Some(body_a), Some(body_b)) = (self.bodies.get(joint.body_a()), self.bodies.get(joint.body_b())) else {
                    continue;
                };
                match joint.joint_type() {
                    JointType::Distance | JointType::Rope => draw.draw_segment(p1, p2, Color::JOINT),
                    JointType::Mouse => {}
                    JointType::Pulley => {
                        if let JointKind::Pulley(j) = joint.kind() {
                            let (s1, s2) = j.ground_anchors();
                            draw.draw_segment(s1, p1, Color::JOINT);
                            draw.draw_segment(s2, p2, Color::JOINT);
                            draw.draw_segment(s1, s2, Color::JOINT);
                        }
                    }
                    _ => {
                        let x1 = body_a.position();
                        let x2 = body_b.position();
                        draw.draw_segment(x1, p1, Color::JOINT);
                        draw.draw_segment(p1, p2, Color::JOINT);
                        draw.draw_segment(x2, p2, Color::JOINT);
                    }
                }
            }
        }

        if flags.contains(DrawFlags::PAIR) {
            for (_, contact) in self.contacts() {
                let a = self.fixture_aabb(contact.fixture_a(), contact.child_index_a());
                let b = self.fixture_aabb(contact.fixture_b(), contact.child_index_b());
                if let (Some(a), Some(b)) = (a, b) {
                    draw.draw_segment(a.center(), b.center(), Color::PAIR);
                }
            }
        }

        if flags.contains(DrawFlags::AABB) {
            let broad_phase = &self.contact_manager.broad_phase;
            for (_, body) in self.bodies.iter() {
                if !body.is_active() {
                    continue;
                }
                for &id in body.fixtures() {
                    let Some(fixture) = self.fixtures.get(id) else {
                        continue;
                    };
                    for proxy in fixture.proxies() {
                        let aabb = broad_phase.fat_aabb(proxy.proxy_id);
                        draw.draw_polygon(&aabb_vertices(aabb.lower_bound, aabb.upper_bound), Color::AABB);
                    }
                }
            }
        }

        if flags.contains(DrawFlags::CENTER_OF_MASS) {
            for (_, body) in self.bodies.iter() {
                let xf = Transform {
                    p: body.world_center(),
                    q: body.transform().q,
                };
                draw.draw_transform(&xf);
            }
        }

        if flags.contains(DrawFlags::DYNAMIC_TREE) {
            for (aabb, _) in self.contact_manager.broad_phase.tree().node_aabbs() {
                draw.draw_polygon(&aabb_vertices(aabb.lower_bound, aabb.upper_bound), Color::TREE);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::joint::DistanceJointDef;
    use crate::particle::ParticleDef;
    use crate::shape::{CircleShape, EdgeShape, PolygonShape};

    fn scene() -> World {
        let mut world = World::default();
        let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
        world
            .create_fixture_from_shape(ground, EdgeShape::new(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)), 0.0)
            .unwrap();
        let a = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 2.0))).unwrap();
        world.create_fixture_from_shape(a, CircleShape::new(0.5), 1.0).unwrap();
        let b = world.create_body(&BodyDef::dynamic(Vec2::new(2.0, 2.0))).unwrap();
        world
            .create_fixture_from_shape(b, PolygonShape::new_box(0.5, 0.5), 1.0)
            .unwrap();
        world.create_joint(DistanceJointDef::new(a, b)).unwrap();
        world
    }

    #[test]
    fn test_nothing_without_flags() {
        let world = scene();
        let mut data = DebugDrawData::new(DrawFlags::empty());
        world.draw_debug_data(&mut data);
        assert_eq!(data.primitive_count(), 0);
    }

    #[test]
    fn test_shapes() {
        let world = scene();
        let mut data = DebugDrawData::new(DrawFlags::SHAPE);
        world.draw_debug_data(&mut data);
        assert_eq!(data.lines.len(), 1);
        assert_eq!(data.circles.len(), 1);
        assert_eq!(data.polygons.len(), 1);
        assert!(data.circles[0].solid);
        assert_eq!(data.circles[0].color, Color::AWAKE);
        assert_eq!(data.lines[0].color, Color::STATIC);
        assert_eq!(data.polygons[0].vertices.len(), 4);
    }

    #[test]
    fn test_wireframe() {
        let world = scene();
        let mut data = DebugDrawData::new(DrawFlags::SHAPE | DrawFlags::WIREFRAME);
        world.draw_debug_data(&mut data);
        assert!(data.circles.iter().all(|c| !c.solid));
        assert!(data.polygons.iter().all(|p| !p.solid));
    }

    #[test]
    fn test_joints_and_aabbs() {
        let world = scene();
        let mut data = DebugDrawData::new(DrawFlags::JOINT);
        world.draw_debug_data(&mut data);
        assert_eq!(data.lines.len(), 1);
        assert_eq!(data.lines[0].start, Vec2::new(0.0, 2.0));
        assert_eq!(data.lines[0].end, Vec2::new(2.0, 2.0));

        let mut data = DebugDrawData::new(DrawFlags::AABB);
        world.draw_debug_data(&mut data);
        assert_eq!(data.polygons.len(), 3);

        let mut data = DebugDrawData::new(DrawFlags::DYNAMIC_TREE);
        world.draw_debug_data(&mut data);
        // Three leaves and two internal nodes
        assert_eq!(data.polygons.len(), 5);
    }

    #[test]
    fn test_center_of_mass_and_pairs() {
        let mut world = scene();
        let mut data = DebugDrawData::new(DrawFlags::CENTER_OF_MASS);
        world.draw_debug_data(&mut data);
        assert_eq!(data.lines.len(), 6);

        for _ in 0..60 {
            world.step(1.0 / 60.0, 8, 3);
        }
        let mut data = DebugDrawData::new(DrawFlags::PAIR);
        world.draw_debug_data(&mut data);
        assert_eq!(data.lines.len(), world.contact_count());
        assert!(!data.lines.is_empty());
    }

    #[test]
    fn test_particles_drawn() {
        let mut world = World::default();
        world.create_particle(&ParticleDef::new(Vec2::new(1.0, 1.0))).unwrap();
        world.create_particle(&ParticleDef::new(Vec2::new(3.0, 1.0))).unwrap();
        let mut data = DebugDrawData::new(DrawFlags::SHAPE);
        world.draw_debug_data(&mut data);
        assert_eq!(data.particles, vec![Vec2::new(1.0, 1.0), Vec2::new(3.0, 1.0)]);
    }
}
