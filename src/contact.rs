//! Contacts
//!
//! A contact tracks a potential collision between two fixture children whose
//! fat AABBs overlap. It lives from the moment the broad phase reports the
//! pair until the AABBs separate, and caches the manifold, the mixed
//! material and the time-of-impact estimate of the current step.
//!
//! # Lifecycle
//!
//! ```text
//! Created --(points > 0)--> Touching --(points == 0)--> NotTouching
//!    \__________________________|______________________/
//!                               v
//!                Destroyed (fat AABBs stop overlapping)
//! ```

use bitflags::bitflags;

use crate::arena::{BodyId, ContactId, FixtureId};
use crate::collision::{Manifold, WorldManifold};
use crate::fixture::Fixture;
use crate::math::{sqrt, Transform};
use crate::narrowphase;
use crate::shape::Shape;
use crate::world::World;

bitflags! {
    /// Contact state bits
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContactFlags: u8 {
        /// Already collected into the current island
        const ISLAND = 1 << 0;
        /// The manifold has points
        const TOUCHING = 1 << 1;
        /// Solved this step (cleared by `pre_solve` listeners)
        const ENABLED = 1 << 2;
        /// Filtering must be re-evaluated
        const FILTER = 1 << 3;
        /// `toi` holds a valid time of impact for this step
        const TOI = 1 << 4;
    }
}

/// Friction mixing: geometric mean
#[inline]
pub fn mix_friction(friction_a: f32, friction_b: f32) -> f32 {
    sqrt(friction_a * friction_b)
}

/// Restitution mixing: maximum
#[inline]
pub fn mix_restitution(restitution_a: f32, restitution_b: f32) -> f32 {
    restitution_a.max(restitution_b)
}

/// Result of one narrow-phase update
#[derive(Clone, Copy, Debug)]
pub(crate) struct ContactUpdate {
    pub old_manifold: Manifold,
    pub was_touching: bool,
    pub touching: bool,
}

/// A potential collision between two fixture children
#[derive(Clone, Debug)]
pub struct Contact {
    pub(crate) flags: ContactFlags,
    pub(crate) fixture_a: FixtureId,
    pub(crate) fixture_b: FixtureId,
    pub(crate) index_a: usize,
    pub(crate) index_b: usize,
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) manifold: Manifold,
    pub(crate) toi_count: u32,
    pub(crate) toi: f32,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    pub(crate) tangent_speed: f32,
}

impl Contact {
    /// New contact. `fixture_a` must have the lower shape rank.
    pub(crate) fn new(
        fixture_a: FixtureId,
        fa: &Fixture,
        index_a: usize,
        fixture_b: FixtureId,
        fb: &Fixture,
        index_b: usize,
    ) -> Self {
        Self {
            flags: ContactFlags::ENABLED,
            fixture_a,
            fixture_b,
            index_a,
            index_b,
            body_a: fa.body,
            body_b: fb.body,
            manifold: Manifold::default(),
            toi_count: 0,
            toi: 0.0,
            friction: mix_friction(fa.friction, fb.friction),
            restitution: mix_restitution(fa.restitution, fb.restitution),
            tangent_speed: 0.0,
        }
    }

    /// First fixture
    #[inline]
    pub fn fixture_a(&self) -> FixtureId {
        self.fixture_a
    }

    /// Second fixture
    #[inline]
    pub fn fixture_b(&self) -> FixtureId {
        self.fixture_b
    }

    /// Child index of the first fixture's shape
    #[inline]
    pub fn child_index_a(&self) -> usize {
        self.index_a
    }

    /// Child index of the second fixture's shape
    #[inline]
    pub fn child_index_b(&self) -> usize {
        self.index_b
    }

    /// Body of the first fixture
    #[inline]
    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    /// Body of the second fixture
    #[inline]
    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    /// Local contact manifold
    #[inline]
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    /// Raw state bits
    #[inline]
    pub fn flags(&self) -> ContactFlags {
        self.flags
    }

    /// True if the manifold has points
    #[inline]
    pub fn is_touching(&self) -> bool {
        self.flags.contains(ContactFlags::TOUCHING)
    }

    /// True unless disabled for this step
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ContactFlags::ENABLED)
    }

    /// Enable or disable the contact for the current step only.
    ///
    /// Meant to be called from [`ContactListener::pre_solve`](crate::event::ContactListener::pre_solve).
    #[inline]
    pub fn set_enabled(&mut self, flag: bool) {
        self.flags.set(ContactFlags::ENABLED, flag);
    }

    /// True if filtering will be re-evaluated on the next step
    #[inline]
    pub fn needs_filtering(&self) -> bool {
        self.flags.contains(ContactFlags::FILTER)
    }

    #[inline]
    pub(crate) fn flag_for_filtering(&mut self) {
        self.flags.insert(ContactFlags::FILTER);
    }

    /// Mixed friction
    #[inline]
    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Override the mixed friction (persists for the life of the contact)
    #[inline]
    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    /// Mixed restitution
    #[inline]
    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    /// Override the mixed restitution (persists for the life of the contact)
    #[inline]
    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    /// Desired tangent speed (conveyor belts), in meters per second
    #[inline]
    pub fn tangent_speed(&self) -> f32 {
        self.tangent_speed
    }

    /// Set the desired tangent speed
    #[inline]
    pub fn set_tangent_speed(&mut self, speed: f32) {
        self.tangent_speed = speed;
    }

    /// Number of TOI sub-steps this contact took part in this step
    #[inline]
    pub fn toi_count(&self) -> u32 {
        self.toi_count
    }

    /// Compute the manifold for the given shapes and transforms
    pub(crate) fn evaluate(&self, shape_a: &Shape, xf_a: &Transform, shape_b: &Shape, xf_b: &Transform) -> Manifold {
        narrowphase::collide(shape_a, self.index_a, xf_a, shape_b, xf_b)
    }

    /// Run the narrow phase and carry impulses over matching points.
    ///
    /// Sensors get a full manifold so that `is_touching` keeps meaning
    /// "has points", but their impulses stay zero.
    pub(crate) fn update(
        &mut self,
        shape_a: &Shape,
        xf_a: &Transform,
        shape_b: &Shape,
        xf_b: &Transform,
        sensor: bool,
    ) -> ContactUpdate {
        let old_manifold = self.manifold;

        // Re-enable this contact
        self.flags.insert(ContactFlags::ENABLED);

        let was_touching = self.is_touching();
        let mut manifold = self.evaluate(shape_a, xf_a, shape_b, xf_b);
        let touching = manifold.point_count > 0;

        // Match old contact ids to new contact ids and copy the stored
        // impulses to warm start the solver
        if !sensor {
            for mp2 in manifold.points.iter_mut().take(manifold.point_count) {
                mp2.normal_impulse = 0.0;
                mp2.tangent_impulse = 0.0;
                let key = mp2.id.key();
                if let Some(mp1) = old_manifold.points().iter().find(|mp1| mp1.id.key() == key) {
                    mp2.normal_impulse = mp1.normal_impulse;
                    mp2.tangent_impulse = mp1.tangent_impulse;
                }
            }
        }

        self.manifold = manifold;
        self.flags.set(ContactFlags::TOUCHING, touching);

        ContactUpdate {
            old_manifold,
            was_touching,
            touching,
        }
    }
}

// ============================================================================
// World-level contact access
// ============================================================================

impl World {
    /// Shared access to a contact
    #[inline]
    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contact_manager.contacts.get(id)
    }

    /// Exclusive access to a contact (enable flag, material overrides)
    #[inline]
    pub fn contact_mut(&mut self, id: ContactId) -> Option<&mut Contact> {
        self.contact_manager.contacts.get_mut(id)
    }

    /// Iterate over all contacts
    pub fn contacts(&self) -> impl Iterator<Item = (ContactId, &Contact)> {
        self.contact_manager.contacts.iter()
    }

    /// Number of contacts
    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contact_manager.contacts.len()
    }

    /// World-space manifold of a contact
    pub fn world_manifold(&self, id: ContactId) -> Option<WorldManifold> {
        let c = self.contact_manager.contacts.get(id)?;
        let fa = self.fixtures.get(c.fixture_a)?;
        let fb = self.fixtures.get(c.fixture_b)?;
        let ba = self.bodies.get(c.body_a)?;
        let bb = self.bodies.get(c.body_b)?;
        Some(WorldManifold::new(
            &c.manifold,
            &ba.xf,
            fa.shape.radius(),
            &bb.xf,
            fb.shape.radius(),
        ))
    }

    /// Restore the mixed friction of the two fixtures
    pub fn reset_contact_friction(&mut self, id: ContactId) {
        let Some(c) = self.contact_manager.contacts.get(id) else {
            return;
        };
        let (Some(fa), Some(fb)) = (self.fixtures.get(c.fixture_a), self.fixtures.get(c.fixture_b)) else {
            return;
        };
        let friction = mix_friction(fa.friction, fb.friction);
        self.contact_manager.contacts[id].friction = friction;
    }

    /// Restore the mixed restitution of the two fixtures
    pub fn reset_contact_restitution(&mut self, id: ContactId) {
        let Some(c) = self.contact_manager.contacts.get(id) else {
            return;
        };
        let (Some(fa), Some(fb)) = (self.fixtures.get(c.fixture_a), self.fixtures.get(c.fixture_b)) else {
            return;
        };
        let restitution = mix_restitution(fa.restitution, fb.restitution);
        self.contact_manager.contacts[id].restitution = restitution;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::fixture::FixtureDef;
    use crate::math::Vec2;
    use crate::shape::{CircleShape, PolygonShape};

    fn make_pair(def_a: FixtureDef, def_b: FixtureDef) -> (Contact, Fixture, Fixture) {
        let mut bodies: Arena<BodyId, ()> = Arena::new();
        let mut ids: Arena<FixtureId, ()> = Arena::new();
        let (ba, bb) = (bodies.insert(()), bodies.insert(()));
        let fa = Fixture::new(ba, &def_a);
        let fb = Fixture::new(bb, &def_b);
        let c = Contact::new(ids.insert(()), &fa, 0, ids.insert(()), &fb, 0);
        (c, fa, fb)
    }

    #[test]
    fn test_material_mixing() {
        assert!((mix_friction(0.4, 0.9) - 0.6).abs() < 1e-6);
        assert_eq!(mix_restitution(0.1, 0.7), 0.7);

        let (c, _, _) = make_pair(
            FixtureDef::new(CircleShape::new(1.0)).with_friction(0.25).with_restitution(0.3),
            FixtureDef::new(CircleShape::new(1.0)).with_friction(1.0),
        );
        assert!((c.friction() - 0.5).abs() < 1e-6);
        assert_eq!(c.restitution(), 0.3);
        assert!(c.is_enabled());
        assert!(!c.is_touching());
    }

    #[test]
    fn test_update_touching_transitions() {
        let (mut c, fa, fb) = make_pair(
            FixtureDef::new(CircleShape::new(0.5)),
            FixtureDef::new(CircleShape::new(0.5)),
        );
        let xf_a = Transform::IDENTITY;
        let near = Transform::new(Vec2::new(0.9, 0.0), 0.0);
        let far = Transform::new(Vec2::new(3.0, 0.0), 0.0);

        let u = c.update(&fa.shape, &xf_a, &fb.shape, &near, false);
        assert!(!u.was_touching && u.touching);
        assert!(c.is_touching());
        assert_eq!(c.manifold().point_count, 1);

        let u = c.update(&fa.shape, &xf_a, &fb.shape, &far, false);
        assert!(u.was_touching && !u.touching);
        assert!(!c.is_touching());
        assert_eq!(c.manifold().point_count, 0);
    }

    #[test]
    fn test_impulses_carried_over_by_feature_id() {
        let (mut c, fa, fb) = make_pair(
            FixtureDef::new(PolygonShape::new_box(1.0, 1.0)),
            FixtureDef::new(PolygonShape::new_box(1.0, 1.0)),
        );
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::new(Vec2::new(0.0, 1.99), 0.0);
        c.update(&fa.shape, &xf_a, &fb.shape, &xf_b, false);
        assert_eq!(c.manifold.point_count, 2);
        c.manifold.points[0].normal_impulse = 1.5;
        c.manifold.points[1].tangent_impulse = -0.5;

        c.update(&fa.shape, &xf_a, &fb.shape, &xf_b, false);
        assert_eq!(c.manifold.points[0].normal_impulse, 1.5);
        assert_eq!(c.manifold.points[1].tangent_impulse, -0.5);
    }

    #[test]
    fn test_sensor_keeps_zero_impulses() {
        let (mut c, fa, fb) = make_pair(
            FixtureDef::new(CircleShape::new(0.5)).with_sensor(true),
            FixtureDef::new(CircleShape::new(0.5)),
        );
        let near = Transform::new(Vec2::new(0.5, 0.0), 0.0);
        let u = c.update(&fa.shape, &Transform::IDENTITY, &fb.shape, &near, true);
        assert!(u.touching);
        assert_eq!(c.manifold.points[0].normal_impulse, 0.0);
    }

    #[test]
    fn test_update_reenables() {
        let (mut c, fa, fb) = make_pair(
            FixtureDef::new(CircleShape::new(0.5)),
            FixtureDef::new(CircleShape::new(0.5)),
        );
        c.set_enabled(false);
        c.update(&fa.shape, &Transform::IDENTITY, &fb.shape, &Transform::IDENTITY, false);
        assert!(c.is_enabled());
    }
}
