//! Contact Manager
//!
//! Owns the broad phase and the live contacts. Turns new broad-phase pairs
//! into contacts, runs the narrow phase once per step, destroys contacts
//! whose fat AABBs separated and dispatches the contact callbacks.
//!
//! # Pipeline
//!
//! 1. `find_new_contacts`: broad-phase pairs -> filtered, canonical contacts
//! 2. `collide`: re-filter flagged contacts, drop separated ones, update the rest
//! 3. `destroy_contact`: end-touch callback, unlink from both bodies

use crate::arena::{Arena, ContactId, FixtureId};
use crate::body::{BodyType, ContactEdge};
use crate::broad_phase::BroadPhase;
use crate::collision::Manifold;
use crate::contact::{Contact, ContactFlags};
use crate::event::{ContactEvent, ContactEventType, ContactImpulse, ContactListener};
use crate::filter::{ContactFilter, Filter};
use crate::fixture::FixtureProxyKey;
use crate::narrowphase;
use crate::world::World;

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

/// Broad phase, contacts and the user hooks that act on them
#[derive(Default)]
pub struct ContactManager {
    pub(crate) broad_phase: BroadPhase<FixtureProxyKey>,
    pub(crate) contacts: Arena<ContactId, Contact>,
    pub(crate) contact_filter: Option<Box<dyn ContactFilter>>,
    pub(crate) contact_listener: Option<Box<dyn ContactListener>>,
    pair_scratch: Vec<(FixtureProxyKey, FixtureProxyKey)>,
    id_scratch: Vec<ContactId>,
}

impl ContactManager {
    /// Broad phase
    #[inline]
    pub fn broad_phase(&self) -> &BroadPhase<FixtureProxyKey> {
        &self.broad_phase
    }

    /// Number of contacts
    #[inline]
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }
}

impl World {
    /// Turn the broad phase's new pairs into contacts
    pub(crate) fn find_new_contacts(&mut self) {
        let mut pairs = core::mem::take(&mut self.contact_manager.pair_scratch);
        pairs.clear();
        self.contact_manager
            .broad_phase
            .update_pairs(|a, b| pairs.push((a, b)));
        for &(a, b) in &pairs {
            self.add_pair(a, b);
        }
        self.contact_manager.pair_scratch = pairs;
    }

    fn add_pair(&mut self, proxy_a: FixtureProxyKey, proxy_b: FixtureProxyKey) {
        let (mut fixture_a, mut fixture_b) = (proxy_a.fixture, proxy_b.fixture);
        let (mut index_a, mut index_b) = (proxy_a.child_index as usize, proxy_b.child_index as usize);

        let (Some(fa), Some(fb)) = (self.fixtures.get(fixture_a), self.fixtures.get(fixture_b)) else {
            return;
        };
        let (body_a, body_b) = (fa.body, fb.body);

        // Are the fixtures on the same body?
        if body_a == body_b {
            return;
        }

        // Does a contact already exist?
        let Some(bb) = self.bodies.get(body_b) else {
            return;
        };
        let contacts = &self.contact_manager.contacts;
        let exists = bb.contact_edges.iter().any(|edge| {
            edge.other == body_a
                && contacts.get(edge.contact).is_some_and(|c| {
                    (c.fixture_a == fixture_a
                        && c.fixture_b == fixture_b
                        && c.index_a == index_a
                        && c.index_b == index_b)
                        || (c.fixture_a == fixture_b
                            && c.fixture_b == fixture_a
                            && c.index_a == index_b
                            && c.index_b == index_a)
                })
        });
        if exists {
            return;
        }

        // Does a joint override collision? Is at least one body dynamic?
        if !self.should_collide(body_b, body_a) {
            return;
        }

        // Check user filtering
        if !self.filter_allows(fixture_a, fixture_b) {
            return;
        }

        let (fa, fb) = (&self.fixtures[fixture_a], &self.fixtures[fixture_b]);
        if !narrowphase::is_supported_pair(&fa.shape, &fb.shape) {
            return;
        }

        // Canonical order: the lower shape rank is shape A
        if fa.shape_type().rank() > fb.shape_type().rank() {
            core::mem::swap(&mut fixture_a, &mut fixture_b);
            core::mem::swap(&mut index_a, &mut index_b);
        }
        let (fa, fb) = (&self.fixtures[fixture_a], &self.fixtures[fixture_b]);
        let contact = Contact::new(fixture_a, fa, index_a, fixture_b, fb, index_b);
        let (body_a, body_b) = (contact.body_a, contact.body_b);
        let id = self.contact_manager.contacts.insert(contact);

        // Connect to the island graph
        self.bodies[body_a].contact_edges.push(ContactEdge {
            other: body_b,
            contact: id,
        });
        self.bodies[body_b].contact_edges.push(ContactEdge {
            other: body_a,
            contact: id,
        });
    }

    /// Ask the contact filter (or the fixture filters) about a pair
    fn filter_allows(&mut self, fixture_a: FixtureId, fixture_b: FixtureId) -> bool {
        let (Some(fa), Some(fb)) = (self.fixtures.get(fixture_a), self.fixtures.get(fixture_b)) else {
            return false;
        };
        match self.contact_manager.contact_filter.as_mut() {
            Some(filter) => filter.should_collide(fa, fb),
            None => Filter::should_collide(&fa.filter, &fb.filter),
        }
    }

    /// Destroy a contact, firing `end_contact` if it was touching
    pub(crate) fn destroy_contact(&mut self, id: ContactId) {
        let Some(c) = self.contact_manager.contacts.get(id) else {
            return;
        };
        if c.is_touching() {
            self.notify_contact(id, ContactEventType::End);
        }

        let Some(c) = self.contact_manager.contacts.remove(id) else {
            return;
        };
        for body in [c.body_a, c.body_b] {
            if let Some(b) = self.bodies.get_mut(body) {
                b.contact_edges.retain(|e| e.contact != id);
            }
        }
    }

    /// Narrow phase over every contact.
    ///
    /// Flagged contacts are re-filtered, contacts whose fat AABBs no longer
    /// overlap are destroyed and the rest get a new manifold.
    pub(crate) fn collide(&mut self) {
        let mut ids = core::mem::take(&mut self.contact_manager.id_scratch);
        ids.clear();
        ids.extend(self.contact_manager.contacts.iter().map(|(id, _)| id));

        for &id in &ids {
            let Some(c) = self.contact_manager.contacts.get(id) else {
                continue;
            };
            let (fixture_a, fixture_b) = (c.fixture_a, c.fixture_b);
            let (index_a, index_b) = (c.index_a, c.index_b);
            let (body_a, body_b) = (c.body_a, c.body_b);

            // Is this contact flagged for filtering?
            if c.flags.contains(ContactFlags::FILTER) {
                // Should these bodies collide?
                if !self.should_collide(body_b, body_a) || !self.filter_allows(fixture_a, fixture_b) {
                    self.destroy_contact(id);
                    continue;
                }
                self.contact_manager.contacts[id].flags.remove(ContactFlags::FILTER);
            }

            let is_active = |t: BodyType, awake: bool| awake && t != BodyType::Static;
            let (Some(ba), Some(bb)) = (self.bodies.get(body_a), self.bodies.get(body_b)) else {
                continue;
            };
            let active_a = is_active(ba.body_type, ba.is_awake());
            let active_b = is_active(bb.body_type, bb.is_awake());

            // At least one body must be awake and it must be dynamic or kinematic
            if !active_a && !active_b {
                continue;
            }

            let proxy_a = self.fixtures.get(fixture_a).and_then(|f| f.proxies.get(index_a));
            let proxy_b = self.fixtures.get(fixture_b).and_then(|f| f.proxies.get(index_b));
            let overlap = match (proxy_a, proxy_b) {
                (Some(pa), Some(pb)) => self
                    .contact_manager
                    .broad_phase
                    .test_overlap(pa.proxy_id, pb.proxy_id),
                _ => false,
            };

            // Here we destroy contacts that cease to overlap in the broad phase
            if !overlap {
                self.destroy_contact(id);
                continue;
            }

            // The contact persists
            self.update_contact(id);
        }

        self.contact_manager.id_scratch = ids;
    }

    /// Narrow-phase update of one contact with the callbacks it triggers
    pub(crate) fn update_contact(&mut self, id: ContactId) {
        let Some(c) = self.contact_manager.contacts.get(id) else {
            return;
        };
        let (body_a, body_b) = (c.body_a, c.body_b);
        let (Some(fa), Some(fb)) = (self.fixtures.get(c.fixture_a), self.fixtures.get(c.fixture_b)) else {
            return;
        };
        let (Some(ba), Some(bb)) = (self.bodies.get(body_a), self.bodies.get(body_b)) else {
            return;
        };
        let sensor = fa.is_sensor || fb.is_sensor;
        let (xf_a, xf_b) = (ba.xf, bb.xf);

        let update = self.contact_manager.contacts[id].update(&fa.shape, &xf_a, &fb.shape, &xf_b, sensor);

        if !sensor && update.touching != update.was_touching {
            self.bodies[body_a].set_awake(true);
            self.bodies[body_b].set_awake(true);
        }

        match (update.was_touching, update.touching) {
            (false, true) => self.notify_contact(id, ContactEventType::Begin),
            (true, false) => self.notify_contact(id, ContactEventType::End),
            (true, true) => self.record_event(id, ContactEventType::Persist),
            (false, false) => {}
        }

        if !sensor && update.touching {
            self.notify_pre_solve(id, &update.old_manifold);
        }
    }

    // ---------- Callback dispatch ----------

    fn record_event(&mut self, id: ContactId, event_type: ContactEventType) {
        let Some(c) = self.contact_manager.contacts.get(id) else {
            return;
        };
        let sensor = [c.fixture_a, c.fixture_b]
            .iter()
            .any(|&f| self.fixtures.get(f).is_some_and(|f| f.is_sensor));
        self.events.report(ContactEvent {
            contact: id,
            fixture_a: c.fixture_a,
            fixture_b: c.fixture_b,
            event_type,
            sensor,
        });
    }

    /// Record a begin/end event and call the listener
    fn notify_contact(&mut self, id: ContactId, event_type: ContactEventType) {
        self.record_event(id, event_type);
        if let Some(mut listener) = self.contact_manager.contact_listener.take() {
            match event_type {
                ContactEventType::Begin => listener.begin_contact(self, id),
                ContactEventType::End => listener.end_contact(self, id),
                ContactEventType::Persist => {}
            }
            self.restore_contact_listener(listener);
        }
    }

    fn notify_pre_solve(&mut self, id: ContactId, old_manifold: &Manifold) {
        if let Some(mut listener) = self.contact_manager.contact_listener.take() {
            listener.pre_solve(self, id, old_manifold);
            self.restore_contact_listener(listener);
        }
    }

    pub(crate) fn notify_post_solve(&mut self, id: ContactId, impulse: &ContactImpulse) {
        if let Some(mut listener) = self.contact_manager.contact_listener.take() {
            listener.post_solve(self, id, impulse);
            self.restore_contact_listener(listener);
        }
    }

    /// Put a listener back unless the callback installed a new one
    fn restore_contact_listener(&mut self, listener: Box<dyn ContactListener>) {
        if self.contact_manager.contact_listener.is_none() {
            self.contact_manager.contact_listener = Some(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::body::BodyDef;
    use crate::filter::Filter;
    use crate::fixture::FixtureDef;
    use crate::math::Vec2;
    use crate::shape::{CircleShape, EdgeShape, PolygonShape, ShapeType};
    use crate::world::World;

    fn overlapping_world() -> (World, crate::BodyId, crate::BodyId) {
        let mut world = World::new(Vec2::ZERO);
        let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
        world
            .create_fixture_from_shape(ground, PolygonShape::new_box(5.0, 0.5), 0.0)
            .unwrap();
        let ball = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 0.9))).unwrap();
        world
            .create_fixture_from_shape(ball, CircleShape::new(0.5), 1.0)
            .unwrap();
        (world, ground, ball)
    }

    #[test]
    fn test_find_new_contacts_creates_one_contact() {
        let (mut world, ground, ball) = overlapping_world();
        world.find_new_contacts();
        assert_eq!(world.contact_count(), 1);
        // Running again does not duplicate the contact
        world.find_new_contacts();
        assert_eq!(world.contact_count(), 1);

        assert_eq!(world.body(ground).unwrap().contact_edges().len(), 1);
        assert_eq!(world.body(ball).unwrap().contact_edges()[0].other, ground);
    }

    #[test]
    fn test_canonical_order_polygon_first() {
        let (mut world, _, _) = overlapping_world();
        world.find_new_contacts();
        let (_, c) = world.contacts().next().unwrap();
        let fa = world.fixture(c.fixture_a()).unwrap();
        let fb = world.fixture(c.fixture_b()).unwrap();
        assert_eq!(fa.shape_type(), ShapeType::Polygon);
        assert_eq!(fb.shape_type(), ShapeType::Circle);
    }

    #[test]
    fn test_static_pairs_never_create_contacts() {
        let mut world = World::new(Vec2::ZERO);
        let a = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
        let b = world.create_body(&BodyDef::fixed(Vec2::new(0.1, 0.0))).unwrap();
        world.create_fixture_from_shape(a, CircleShape::new(1.0), 0.0).unwrap();
        world.create_fixture_from_shape(b, CircleShape::new(1.0), 0.0).unwrap();
        world.find_new_contacts();
        assert_eq!(world.contact_count(), 0);
    }

    #[test]
    fn test_filter_blocks_pair() {
        let mut world = World::new(Vec2::ZERO);
        let a = world.create_body(&BodyDef::dynamic(Vec2::ZERO)).unwrap();
        let b = world.create_body(&BodyDef::dynamic(Vec2::new(0.5, 0.0))).unwrap();
        let ghost = FixtureDef::new(CircleShape::new(1.0)).with_filter(Filter::new(2, 0));
        world.create_fixture(a, &ghost).unwrap();
        world.create_fixture_from_shape(b, CircleShape::new(1.0), 1.0).unwrap();
        world.find_new_contacts();
        assert_eq!(world.contact_count(), 0);
    }

    #[test]
    fn test_unsupported_pair_is_skipped() {
        let mut world = World::new(Vec2::ZERO);
        let a = world.create_body(&BodyDef::dynamic(Vec2::ZERO)).unwrap();
        let b = world.create_body(&BodyDef::dynamic(Vec2::ZERO)).unwrap();
        let edge = EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        world.create_fixture_from_shape(a, edge, 0.0).unwrap();
        world.create_fixture_from_shape(b, edge, 0.0).unwrap();
        world.find_new_contacts();
        assert_eq!(world.contact_count(), 0);
    }

    #[test]
    fn test_collide_updates_and_destroys() {
        let (mut world, _, ball) = overlapping_world();
        world.find_new_contacts();
        world.collide();
        let (id, c) = world.contacts().next().unwrap();
        assert!(c.is_touching());
        assert!(c.manifold().point_count > 0);

        // Teleport far away: the fat AABBs separate and the contact dies
        world.set_transform(ball, Vec2::new(0.0, 50.0), 0.0).unwrap();
        world.collide();
        assert!(world.contact(id).is_none());
        assert_eq!(world.contact_count(), 0);
        assert!(world.body(ball).unwrap().contact_edges().is_empty());
    }

    #[test]
    fn test_refilter_destroys_filtered_contact() {
        let (mut world, _, ball) = overlapping_world();
        world.find_new_contacts();
        world.collide();
        let f = world.body(ball).unwrap().fixtures()[0];
        world.set_filter_data(f, Filter::new(4, 0)).unwrap();
        let (_, c) = world.contacts().next().unwrap();
        assert!(c.needs_filtering());
        world.collide();
        assert_eq!(world.contact_count(), 0);
    }
}
