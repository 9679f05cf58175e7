//! Fixtures
//!
//! A fixture binds a shape to a body together with material properties
//! (density, friction, restitution), a collision filter and a sensor flag.
//! It owns one broad-phase proxy per shape child while its body is active.

use log::debug;

use crate::arena::{BodyId, FixtureId};
use crate::broad_phase::BroadPhase;
use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::error::PhysicsError;
use crate::filter::Filter;
use crate::math::{Transform, Vec2};
use crate::shape::{MassData, Shape, ShapeType};
use crate::world::{World, WorldFlags};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Construction parameters of a fixture
#[derive(Clone, Debug, PartialEq)]
pub struct FixtureDef {
    /// Shape, cloned into the fixture
    pub shape: Shape,
    /// Coulomb friction coefficient
    pub friction: f32,
    /// Restitution (bounciness)
    pub restitution: f32,
    /// Density in kg/m^2
    pub density: f32,
    /// Detect overlap without collision response
    pub is_sensor: bool,
    /// Contact filtering data
    pub filter: Filter,
    /// Opaque application data
    pub user_data: u64,
}

impl FixtureDef {
    /// Default material for `shape`: friction 0.2, no restitution, no density
    pub fn new(shape: impl Into<Shape>) -> Self {
        Self {
            shape: shape.into(),
            friction: 0.2,
            restitution: 0.0,
            density: 0.0,
            is_sensor: false,
            filter: Filter::DEFAULT,
            user_data: 0,
        }
    }

    /// Set the density
    #[must_use]
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Set the friction
    #[must_use]
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    /// Set the restitution
    #[must_use]
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    /// Make the fixture a sensor
    #[must_use]
    pub fn with_sensor(mut self, is_sensor: bool) -> Self {
        self.is_sensor = is_sensor;
        self
    }

    /// Set the filter
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Set the application data
    #[must_use]
    pub fn with_user_data(mut self, user_data: u64) -> Self {
        self.user_data = user_data;
        self
    }
}

/// Broad-phase payload: one shape child of a fixture
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FixtureProxyKey {
    /// Owning fixture
    pub fixture: FixtureId,
    /// Child index within the fixture's shape
    pub child_index: u32,
}

/// Broad-phase proxy of one shape child
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixtureProxy {
    /// Tight AABB swept over the last step
    pub aabb: Aabb,
    /// Child index within the shape
    pub child_index: u32,
    /// Proxy id in the broad phase
    pub proxy_id: u32,
}

/// A shape attached to a body
#[derive(Clone, Debug)]
pub struct Fixture {
    pub(crate) body: BodyId,
    pub(crate) shape: Shape,
    pub(crate) density: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) is_sensor: bool,
    pub(crate) filter: Filter,
    pub(crate) proxies: Vec<FixtureProxy>,
    pub(crate) user_data: u64,
}

impl Fixture {
    pub(crate) fn new(body: BodyId, def: &FixtureDef) -> Self {
        Self {
            body,
            shape: def.shape.clone(),
            density: def.density,
            friction: def.friction,
            restitution: def.restitution,
            is_sensor: def.is_sensor,
            filter: def.filter,
            proxies: Vec::new(),
            user_data: def.user_data,
        }
    }

    /// Parent body
    #[inline]
    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Attached shape
    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Kind of the attached shape
    #[inline]
    pub fn shape_type(&self) -> ShapeType {
        self.shape.shape_type()
    }

    /// True for sensors
    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.is_sensor
    }

    /// Filtering data
    #[inline]
    pub fn filter_data(&self) -> Filter {
        self.filter
    }

    /// Density in kg/m^2
    #[inline]
    pub fn density(&self) -> f32 {
        self.density
    }

    /// Set the density. Call [`World::reset_mass_data`] afterwards.
    #[inline]
    pub fn set_density(&mut self, density: f32) {
        self.density = density.max(0.0);
    }

    /// Friction coefficient
    #[inline]
    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Set the friction. Existing contacts keep their mixed value.
    #[inline]
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    /// Restitution
    #[inline]
    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    /// Set the restitution. Existing contacts keep their mixed value.
    #[inline]
    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    /// Opaque application data
    #[inline]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    /// Set the application data
    #[inline]
    pub fn set_user_data(&mut self, data: u64) {
        self.user_data = data;
    }

    /// Mass properties of the shape at this fixture's density
    #[inline]
    pub fn mass_data(&self) -> MassData {
        self.shape.compute_mass(self.density)
    }

    /// Broad-phase proxies (empty while the body is inactive)
    #[inline]
    pub fn proxies(&self) -> &[FixtureProxy] {
        &self.proxies
    }

    /// Number of broad-phase proxies
    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Swept AABB of a child, if the fixture has proxies
    #[inline]
    pub fn aabb(&self, child: usize) -> Option<Aabb> {
        self.proxies.get(child).map(|p| p.aabb)
    }

    // ---------- Proxies ----------

    pub(crate) fn create_proxies(&mut self, bp: &mut BroadPhase<FixtureProxyKey>, xf: &Transform, id: FixtureId) {
        debug_assert!(self.proxies.is_empty());
        for child in 0..self.shape.child_count() {
            let aabb = self.shape.compute_aabb(xf, child);
            let key = FixtureProxyKey {
                fixture: id,
                child_index: child as u32,
            };
            let proxy_id = bp.create_proxy(&aabb, key);
            self.proxies.push(FixtureProxy {
                aabb,
                child_index: child as u32,
                proxy_id,
            });
        }
    }

    pub(crate) fn destroy_proxies(&mut self, bp: &mut BroadPhase<FixtureProxyKey>) {
        for proxy in self.proxies.drain(..) {
            bp.destroy_proxy(proxy.proxy_id);
        }
    }

    /// Move the proxies to cover the motion from `xf1` to `xf2`
    pub(crate) fn synchronize(&mut self, bp: &mut BroadPhase<FixtureProxyKey>, xf1: &Transform, xf2: &Transform) {
        for proxy in &mut self.proxies {
            let child = proxy.child_index as usize;
            let aabb1 = self.shape.compute_aabb(xf1, child);
            let aabb2 = self.shape.compute_aabb(xf2, child);
            proxy.aabb = aabb1.combine(&aabb2);
            let displacement = xf2.p - xf1.p;
            bp.move_proxy(proxy.proxy_id, &proxy.aabb, displacement);
        }
    }
}

// ============================================================================
// World-level fixture operations
// ============================================================================

impl World {
    /// Attach a fixture to a body.
    ///
    /// Contacts with the new fixture appear on the next step. A positive
    /// density updates the body's mass.
    pub fn create_fixture(&mut self, body: BodyId, def: &FixtureDef) -> Result<FixtureId, PhysicsError> {
        self.check_unlocked("create_fixture")?;
        if def.density < 0.0 || !def.density.is_finite() {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "fixture density must be non-negative",
            });
        }
        if def.shape.child_count() == 0 {
            return Err(PhysicsError::DegenerateGeometry {
                reason: "shape has no children",
            });
        }
        let b = self.body_ref(body)?;
        let active = b.is_active();
        let xf = b.xf;

        let id = self.fixtures.insert(Fixture::new(body, def));
        if active {
            self.fixtures[id].create_proxies(&mut self.contact_manager.broad_phase, &xf, id);
        }
        self.bodies[body].fixtures.push(id);

        if def.density > 0.0 {
            self.reset_mass_data(body)?;
        }

        // Let the world know we have a new fixture
        self.flags.insert(WorldFlags::NEW_FIXTURE);
        Ok(id)
    }

    /// Attach a shape with default material and the given density
    pub fn create_fixture_from_shape(
        &mut self,
        body: BodyId,
        shape: impl Into<Shape>,
        density: f32,
    ) -> Result<FixtureId, PhysicsError> {
        self.create_fixture(body, &FixtureDef::new(shape).with_density(density))
    }

    /// Detach and destroy a fixture together with its contacts.
    ///
    /// The destruction listener is not called.
    pub fn destroy_fixture(&mut self, id: FixtureId) -> Result<(), PhysicsError> {
        self.check_unlocked("destroy_fixture")?;
        let body = self.fixture_ref(id)?.body;

        self.bodies[body].fixtures.retain(|&f| f != id);

        // Destroy any contacts associated with the fixture
        let contacts: Vec<_> = self.bodies[body]
            .contact_edges
            .iter()
            .map(|e| e.contact)
            .filter(|&c| {
                self.contact_manager
                    .contacts
                    .get(c)
                    .is_some_and(|c| c.fixture_a == id || c.fixture_b == id)
            })
            .collect();
        for c in contacts {
            self.destroy_contact(c);
        }

        if let Some(mut fixture) = self.fixtures.remove(id) {
            fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
        }

        self.reset_mass_data(body)?;
        debug!("destroyed fixture {:?}", id);
        Ok(())
    }

    /// Shared access to a fixture
    #[inline]
    pub fn fixture(&self, id: FixtureId) -> Option<&Fixture> {
        self.fixtures.get(id)
    }

    /// Exclusive access to a fixture (material and user data)
    #[inline]
    pub fn fixture_mut(&mut self, id: FixtureId) -> Option<&mut Fixture> {
        self.fixtures.get_mut(id)
    }

    /// Replace the filter data and re-filter the fixture's contacts
    pub fn set_filter_data(&mut self, id: FixtureId, filter: Filter) -> Result<(), PhysicsError> {
        self.fixture_mut_ref(id)?.filter = filter;
        self.refilter(id)
    }

    /// Flag every contact of the fixture for filtering and touch its
    /// proxies so that new pairs are found on the next step.
    pub fn refilter(&mut self, id: FixtureId) -> Result<(), PhysicsError> {
        let body = self.fixture_ref(id)?.body;

        // Flag associated contacts for filtering
        let contacts: Vec<_> = self.body_ref(body)?.contact_edges.iter().map(|e| e.contact).collect();
        for c in contacts {
            if let Some(contact) = self.contact_manager.contacts.get_mut(c) {
                if contact.fixture_a == id || contact.fixture_b == id {
                    contact.flag_for_filtering();
                }
            }
        }

        // Touch each proxy so that new pairs may be created
        for proxy in &self.fixtures[id].proxies {
            self.contact_manager.broad_phase.touch_proxy(proxy.proxy_id);
        }
        Ok(())
    }

    /// Turn a fixture into a sensor or back. Wakes the body.
    pub fn set_sensor(&mut self, id: FixtureId, is_sensor: bool) -> Result<(), PhysicsError> {
        let fixture = self.fixture_mut_ref(id)?;
        if fixture.is_sensor != is_sensor {
            fixture.is_sensor = is_sensor;
            let body = fixture.body;
            if let Some(b) = self.bodies.get_mut(body) {
                b.set_awake(true);
            }
        }
        Ok(())
    }

    /// Test a world point against a fixture
    pub fn fixture_test_point(&self, id: FixtureId, p: Vec2) -> bool {
        let Some(f) = self.fixtures.get(id) else {
            return false;
        };
        self.bodies
            .get(f.body)
            .is_some_and(|b| f.shape.test_point(&b.xf, p))
    }

    /// Cast a ray against one child of a fixture
    pub fn fixture_raycast(&self, id: FixtureId, input: &RayCastInput, child: usize) -> Option<RayCastOutput> {
        let fixture = self.fixtures.get(id)?;
        let body = self.bodies.get(fixture.body)?;
        if child >= fixture.shape.child_count() {
            return None;
        }
        fixture.shape.raycast(input, &body.xf, child)
    }

    /// Swept AABB of a fixture child
    pub fn fixture_aabb(&self, id: FixtureId, child: usize) -> Option<Aabb> {
        self.fixtures.get(id)?.aabb(child)
    }

    /// Mass properties of a fixture
    pub fn fixture_mass_data(&self, id: FixtureId) -> Option<MassData> {
        self.fixtures.get(id).map(Fixture::mass_data)
    }

    pub(crate) fn fixture_ref(&self, id: FixtureId) -> Result<&Fixture, PhysicsError> {
        self.fixtures.get(id).ok_or(PhysicsError::InvalidHandle { kind: "fixture" })
    }

    pub(crate) fn fixture_mut_ref(&mut self, id: FixtureId) -> Result<&mut Fixture, PhysicsError> {
        self.fixtures
            .get_mut(id)
            .ok_or(PhysicsError::InvalidHandle { kind: "fixture" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::shape::{ChainShape, CircleShape, PolygonShape};

    #[test]
    fn test_fixture_def_defaults() {
        let def = FixtureDef::new(CircleShape::new(1.0));
        assert_eq!(def.friction, 0.2);
        assert_eq!(def.restitution, 0.0);
        assert_eq!(def.density, 0.0);
        assert!(!def.is_sensor);
        assert_eq!(def.filter, Filter::DEFAULT);
    }

    #[test]
    fn test_proxy_per_chain_child() {
        let mut world = World::new(Vec2::ZERO);
        let body = world.create_body(&BodyDef::default()).unwrap();
        let chain = ChainShape::create_chain(
            &[
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(2.0, 0.5),
                Vec2::new(3.0, 0.0),
            ],
            Vec2::new(-1.0, 0.0),
            Vec2::new(4.0, 0.0),
        )
        .unwrap();
        let f = world.create_fixture_from_shape(body, chain, 0.0).unwrap();
        assert_eq!(world.fixture(f).unwrap().proxy_count(), 3);
        assert_eq!(world.proxy_count(), 3);
    }

    #[test]
    fn test_negative_density_rejected() {
        let mut world = World::new(Vec2::ZERO);
        let body = world.create_body(&BodyDef::default()).unwrap();
        let err = world
            .create_fixture(body, &FixtureDef::new(CircleShape::new(1.0)).with_density(-1.0))
            .unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_destroy_fixture_resets_mass() {
        let mut world = World::new(Vec2::ZERO);
        let body = world.create_body(&BodyDef::dynamic(Vec2::ZERO)).unwrap();
        let f1 = world
            .create_fixture_from_shape(body, PolygonShape::new_box(1.0, 1.0), 1.0)
            .unwrap();
        world
            .create_fixture_from_shape(body, CircleShape::new(1.0), 0.0)
            .unwrap();
        assert!((world.body(body).unwrap().mass() - 4.0).abs() < 1e-4);

        world.destroy_fixture(f1).unwrap();
        assert_eq!(world.body(body).unwrap().fixtures().len(), 1);
        // Only a massless fixture remains
        assert_eq!(world.body(body).unwrap().mass(), 1.0);
        assert_eq!(world.proxy_count(), 1);
    }

    #[test]
    fn test_fixture_test_point_and_raycast() {
        let mut world = World::new(Vec2::ZERO);
        let body = world.create_body(&BodyDef::fixed(Vec2::new(2.0, 0.0))).unwrap();
        let f = world
            .create_fixture_from_shape(body, PolygonShape::new_box(0.5, 0.5), 0.0)
            .unwrap();
        assert!(world.fixture_test_point(f, Vec2::new(2.2, 0.1)));
        assert!(!world.fixture_test_point(f, Vec2::new(0.0, 0.0)));

        let input = RayCastInput {
            p1: Vec2::new(0.0, 0.0),
            p2: Vec2::new(4.0, 0.0),
            max_fraction: 1.0,
        };
        let out = world.fixture_raycast(f, &input, 0).unwrap();
        assert!((out.fraction - 0.375).abs() < 1e-5);
        assert!((out.normal.x + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_set_sensor_wakes_body() {
        let mut world = World::new(Vec2::ZERO);
        let body = world.create_body(&BodyDef::dynamic(Vec2::ZERO)).unwrap();
        let f = world
            .create_fixture_from_shape(body, CircleShape::new(0.5), 1.0)
            .unwrap();
        world.body_mut(body).unwrap().set_awake(false);
        world.set_sensor(f, true).unwrap();
        assert!(world.fixture(f).unwrap().is_sensor());
        assert!(world.body(body).unwrap().is_awake());
    }
}
