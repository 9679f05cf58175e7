//! World Queries
//!
//! Overlap and ray queries against fixtures and particles.
//!
//! # Features
//!
//! - `query_aabb`: every fixture child whose broad-phase box overlaps
//! - `query_point`: fixtures whose shape contains a point
//! - `raycast`: user-clipped ray cast, `raycast_closest` for the first hit
//! - `raycast_closest_batch`: many rays at once (parallel with `parallel`)
//! - `query_particles_aabb`, `raycast_particles`: particle queries on the
//!   tag-sorted particle grid
//!
//! Ray cast callbacks return the new maximum fraction: `-1` ignores the
//! hit, `0` stops the cast, the hit fraction clips the ray and `1`
//! continues unclipped.

use crate::arena::{Arena, BodyId, FixtureId};
use crate::body::Body;
use crate::broad_phase::BroadPhase;
use crate::collision::{Aabb, RayCastInput};
use crate::fixture::{Fixture, FixtureProxyKey};
use crate::math::Vec2;
use crate::world::World;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

// ============================================================================
// Query Results
// ============================================================================

/// Result of a ray cast against fixtures
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastHit {
    /// The fixture that was hit
    pub fixture: FixtureId,
    /// World-space hit point
    pub point: Vec2,
    /// Surface normal at the hit point
    pub normal: Vec2,
    /// Fraction along `p2 - p1`
    pub fraction: f32,
}

/// Read-only slice of the world that ray casts need. Free of listeners,
/// so it can be shared across threads.
#[derive(Clone, Copy)]
struct FixtureView<'a> {
    broad_phase: &'a BroadPhase<FixtureProxyKey>,
    fixtures: &'a Arena<FixtureId, Fixture>,
    bodies: &'a Arena<BodyId, Body>,
}

impl FixtureView<'_> {
    fn raycast<F: FnMut(FixtureId, Vec2, Vec2, f32) -> f32>(&self, p1: Vec2, p2: Vec2, mut callback: F) {
        if (p2 - p1).length_squared() <= 0.0 {
            return;
        }
        let input = RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        };
        self.broad_phase.raycast(&input, |sub_input, proxy_id| {
            let key = self.broad_phase.user_data(proxy_id);
            let Some(fixture) = self.fixtures.get(key.fixture) else {
                return sub_input.max_fraction;
            };
            let Some(body) = self.bodies.get(fixture.body) else {
                return sub_input.max_fraction;
            };
            match fixture.shape.raycast(sub_input, &body.xf, key.child_index as usize) {
                Some(output) => {
                    let fraction = output.fraction;
                    let point = p1 * (1.0 - fraction) + p2 * fraction;
                    callback(key.fixture, point, output.normal, fraction)
                }
                None => sub_input.max_fraction,
            }
        });
    }

    fn raycast_closest(&self, p1: Vec2, p2: Vec2) -> Option<RayCastHit> {
        let mut closest = None;
        self.raycast(p1, p2, |fixture, point, normal, fraction| {
            closest = Some(RayCastHit {
                fixture,
                point,
                normal,
                fraction,
            });
            fraction
        });
        closest
    }
}

// ============================================================================
// World API
// ============================================================================

impl World {
    fn fixture_view(&self) -> FixtureView<'_> {
        FixtureView {
            broad_phase: &self.contact_manager.broad_phase,
            fixtures: &self.fixtures,
            bodies: &self.bodies,
        }
    }

    /// Report every fixture whose broad-phase box overlaps `aabb`.
    ///
    /// Chain fixtures are reported once per overlapping child. Return
    /// false from the callback to stop the query.
    pub fn query_aabb<F: FnMut(FixtureId) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        let broad_phase = &self.contact_manager.broad_phase;
        broad_phase.query(aabb, |proxy_id| callback(broad_phase.user_data(proxy_id).fixture));
    }

    /// Fixtures whose shape contains `p`
    pub fn query_point(&self, p: Vec2) -> Vec<FixtureId> {
        let aabb = Aabb::new(p, p);
        let mut found = Vec::new();
        self.query_aabb(&aabb, |id| {
            let hit = self.fixtures.get(id).is_some_and(|fixture| {
                self.bodies
                    .get(fixture.body)
                    .is_some_and(|body| fixture.shape.test_point(&body.xf, p))
            });
            if hit && !found.contains(&id) {
                found.push(id);
            }
            true
        });
        found
    }

    /// Cast a ray from `p1` to `p2` against every fixture.
    ///
    /// The callback gets `(fixture, point, normal, fraction)` for each hit,
    /// in no particular order.
    pub fn raycast<F: FnMut(FixtureId, Vec2, Vec2, f32) -> f32>(&self, p1: Vec2, p2: Vec2, callback: F) {
        self.fixture_view().raycast(p1, p2, callback);
    }

    /// First fixture hit by the ray from `p1` to `p2`
    pub fn raycast_closest(&self, p1: Vec2, p2: Vec2) -> Option<RayCastHit> {
        self.fixture_view().raycast_closest(p1, p2)
    }

    /// Closest hit for each `(p1, p2)` ray.
    ///
    /// When `parallel` feature is enabled, rays are cast in parallel via Rayon.
    pub fn raycast_closest_batch(&self, rays: &[(Vec2, Vec2)]) -> Vec<Option<RayCastHit>> {
        let view = self.fixture_view();

        #[cfg(feature = "parallel")]
        {
            rays.par_iter()
                .map(|&(p1, p2)| view.raycast_closest(p1, p2))
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            rays.iter()
                .map(|&(p1, p2)| view.raycast_closest(p1, p2))
                .collect()
        }
    }

    /// Report every particle inside `aabb`. Return false to stop.
    pub fn query_particles_aabb<F: FnMut(usize) -> bool>(&self, aabb: &Aabb, callback: F) {
        self.particle_system.query_aabb(aabb, callback);
    }

    /// Cast a ray against the particles.
    ///
    /// The callback gets `(particle_index, point, normal, fraction)`.
    /// Destroying particles from the callback is deferred to the next step,
    /// so indices stay valid for the whole cast.
    pub fn raycast_particles<F: FnMut(usize, Vec2, Vec2, f32) -> f32>(&self, p1: Vec2, p2: Vec2, callback: F) {
        self.particle_system.raycast(p1, p2, callback);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::particle::ParticleDef;
    use crate::shape::{CircleShape, PolygonShape};

    fn scene() -> (World, FixtureId, FixtureId) {
        let mut world = World::new(Vec2::ZERO);
        let ground = world.create_body(&BodyDef::fixed(Vec2::new(0.0, -1.0))).unwrap();
        let ground_fixture = world
            .create_fixture_from_shape(ground, PolygonShape::new_box(10.0, 1.0), 0.0)
            .unwrap();
        let ball = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 3.0))).unwrap();
        let ball_fixture = world
            .create_fixture_from_shape(ball, CircleShape::new(0.5), 1.0)
            .unwrap();
        (world, ground_fixture, ball_fixture)
    }

    #[test]
    fn test_query_aabb() {
        let (world, ground, ball) = scene();
        let mut found = Vec::new();
        world.query_aabb(&Aabb::new(Vec2::new(-1.0, 2.0), Vec2::new(1.0, 4.0)), |id| {
            found.push(id);
            true
        });
        assert_eq!(found, vec![ball]);

        let mut all = Vec::new();
        world.query_aabb(&Aabb::new(Vec2::new(-20.0, -20.0), Vec2::new(20.0, 20.0)), |id| {
            all.push(id);
            true
        });
        assert_eq!(all.len(), 2);
        assert!(all.contains(&ground));
    }

    #[test]
    fn test_query_aabb_stops_early() {
        let (world, _, _) = scene();
        let mut calls = 0;
        world.query_aabb(&Aabb::new(Vec2::new(-20.0, -20.0), Vec2::new(20.0, 20.0)), |_| {
            calls += 1;
            false
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_query_point() {
        let (world, ground, ball) = scene();
        assert_eq!(world.query_point(Vec2::new(0.0, 3.0)), vec![ball]);
        assert_eq!(world.query_point(Vec2::new(5.0, -1.0)), vec![ground]);
        assert!(world.query_point(Vec2::new(5.0, 5.0)).is_empty());
    }

    #[test]
    fn test_raycast_closest() {
        let (world, ground, ball) = scene();
        let hit = world
            .raycast_closest(Vec2::new(0.0, 10.0), Vec2::new(0.0, -10.0))
            .unwrap();
        assert_eq!(hit.fixture, ball);
        assert!((hit.point.y - 3.5).abs() < 1e-3);
        assert!((hit.normal.y - 1.0).abs() < 1e-3);

        let hit = world
            .raycast_closest(Vec2::new(5.0, 10.0), Vec2::new(5.0, -10.0))
            .unwrap();
        assert_eq!(hit.fixture, ground);
        assert!(hit.point.y.abs() < 0.02);

        assert!(world
            .raycast_closest(Vec2::new(-20.0, 10.0), Vec2::new(20.0, 10.0))
            .is_none());
    }

    #[test]
    fn test_raycast_ignore_and_continue() {
        let (world, _, _) = scene();
        let mut hits = 0;
        world.raycast(Vec2::new(0.0, 10.0), Vec2::new(0.0, -10.0), |_, _, _, _| {
            hits += 1;
            -1.0
        });
        assert_eq!(hits, 2);

        let mut hits = 0;
        world.raycast(Vec2::new(0.0, 10.0), Vec2::new(0.0, -10.0), |_, _, _, _| {
            hits += 1;
            0.0
        });
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_raycast_batch_matches_single() {
        let (world, _, _) = scene();
        let rays = [
            (Vec2::new(0.0, 10.0), Vec2::new(0.0, -10.0)),
            (Vec2::new(5.0, 10.0), Vec2::new(5.0, -10.0)),
            (Vec2::new(-20.0, 10.0), Vec2::new(20.0, 10.0)),
        ];
        let batch = world.raycast_closest_batch(&rays);
        assert_eq!(batch.len(), 3);
        for (hit, &(p1, p2)) in batch.iter().zip(rays.iter()) {
            assert_eq!(*hit, world.raycast_closest(p1, p2));
        }
    }

    #[test]
    fn test_particle_queries() {
        let mut world = World::new(Vec2::ZERO);
        for x in [0.0, 3.0, 6.0] {
            world.create_particle(&ParticleDef::new(Vec2::new(x, 0.0))).unwrap();
        }
        let mut found = Vec::new();
        world.query_particles_aabb(&Aabb::new(Vec2::new(2.0, -1.0), Vec2::new(7.0, 1.0)), |i| {
            found.push(i);
            true
        });
        found.sort_unstable();
        assert_eq!(found, vec![1, 2]);

        let mut hits = Vec::new();
        world.raycast_particles(Vec2::new(-5.0, 0.0), Vec2::new(10.0, 0.0), |i, point, normal, fraction| {
            hits.push((i, point, normal, fraction));
            1.0
        });
        assert_eq!(hits.len(), 3);
        let first = hits.iter().find(|h| h.0 == 0).unwrap();
        // Particles are hit at one diameter from their center
        assert!((first.1.x + 1.0).abs() < 1e-4);
        assert!((first.2.x + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_raycast_particles_clip() {
        let mut world = World::new(Vec2::ZERO);
        for x in [0.0, 3.0, 6.0] {
            world.create_particle(&ParticleDef::new(Vec2::new(x, 0.0))).unwrap();
        }
        let mut closest = None;
        world.raycast_particles(Vec2::new(-5.0, 0.0), Vec2::new(10.0, 0.0), |i, _, _, fraction| {
            closest = Some(i);
            fraction
        });
        assert_eq!(closest, Some(0));
    }
}
