//! Physics Event System
//!
//! Listener traits invoked synchronously during `step()` and a built-in
//! [`EventCollector`] that records begin/persist/end contact events so they
//! can be consumed after each frame without installing a listener.
//!
//! Contact listeners receive `&mut World`. The world is locked while they
//! run: structural calls (`create_body`, `destroy_joint`, ...) return
//! [`PhysicsError::WorldLocked`](crate::PhysicsError::WorldLocked) and leave
//! the step untouched.

use crate::arena::{ContactId, FixtureId, JointId, ParticleGroupId};
use crate::collision::Manifold;
use crate::settings::MAX_MANIFOLD_POINTS;
use crate::world::World;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

// ============================================================================
// Listener traits
// ============================================================================

/// Impulses applied by the solver to one contact
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContactImpulse {
    /// Normal impulse per manifold point
    pub normal_impulses: [f32; MAX_MANIFOLD_POINTS],
    /// Tangent (friction) impulse per manifold point
    pub tangent_impulses: [f32; MAX_MANIFOLD_POINTS],
    /// Number of valid entries
    pub count: usize,
}

/// Contact lifecycle callbacks.
///
/// All methods have empty default implementations.
pub trait ContactListener {
    /// Two fixtures started touching
    fn begin_contact(&mut self, _world: &mut World, _contact: ContactId) {}

    /// Two fixtures stopped touching (also called when a touching contact
    /// is destroyed)
    fn end_contact(&mut self, _world: &mut World, _contact: ContactId) {}

    /// Called for touching, non-sensor contacts after the narrow phase and
    /// before the solver. Disabling the contact here skips it for this step.
    fn pre_solve(&mut self, _world: &mut World, _contact: ContactId, _old_manifold: &Manifold) {}

    /// Impulses applied to a touching contact by the solver
    fn post_solve(&mut self, _world: &mut World, _contact: ContactId, _impulse: &ContactImpulse) {}
}

/// Notification for objects destroyed implicitly by `destroy_body`
pub trait DestructionListener {
    /// A joint is about to be destroyed because one of its bodies is
    fn say_goodbye_joint(&mut self, joint: JointId);

    /// A fixture is about to be destroyed because its body is
    fn say_goodbye_fixture(&mut self, fixture: FixtureId);
}

/// Notification for particles and groups removed by the particle solver
pub trait ParticleDestructionListener {
    /// A particle flagged with `DESTRUCTION_LISTENER` is being removed.
    /// The index is the one the particle had before removal.
    fn say_goodbye_particle(&mut self, index: usize);

    /// A particle group is being removed
    fn say_goodbye_particle_group(&mut self, _group: ParticleGroupId) {}
}

// ============================================================================
// Event collector
// ============================================================================

/// Type of contact event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactEventType {
    /// First step of touching
    Begin,
    /// Still touching after the narrow phase
    Persist,
    /// Stopped touching or destroyed while touching
    End,
}

/// A recorded contact event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEvent {
    /// The contact (may already be destroyed for `End`)
    pub contact: ContactId,
    /// First fixture
    pub fixture_a: FixtureId,
    /// Second fixture
    pub fixture_b: FixtureId,
    /// Event type
    pub event_type: ContactEventType,
    /// Either fixture is a sensor
    pub sensor: bool,
}

/// Records contact events of the last step
#[derive(Clone, Debug, Default)]
pub struct EventCollector {
    events: Vec<ContactEvent>,
}

impl EventCollector {
    /// Create a new event collector
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Forget the events of the previous frame
    pub fn begin_frame(&mut self) {
        self.events.clear();
    }

    /// Record an event
    pub fn report(&mut self, event: ContactEvent) {
        self.events.push(event);
    }

    /// All recorded events in the order they happened
    #[inline]
    pub fn contact_events(&self) -> &[ContactEvent] {
        &self.events
    }

    /// Recorded events of one type
    pub fn events_of(&self, event_type: ContactEventType) -> impl Iterator<Item = &ContactEvent> {
        self.events.iter().filter(move |e| e.event_type == event_type)
    }

    /// Drain contact events (consumes them)
    #[inline]
    pub fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        core::mem::take(&mut self.events)
    }

    /// Check if there are any events this frame
    #[inline]
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, ArenaId};

    fn event(event_type: ContactEventType, sensor: bool) -> ContactEvent {
        let mut fixtures: Arena<FixtureId, ()> = Arena::new();
        let a = fixtures.insert(());
        let b = fixtures.insert(());
        ContactEvent {
            contact: ContactId::from_raw(0, 0),
            fixture_a: a,
            fixture_b: b,
            event_type,
            sensor,
        }
    }

    #[test]
    fn test_begin_frame_clears() {
        let mut events = EventCollector::new();
        events.report(event(ContactEventType::Begin, false));
        assert!(events.has_events());
        events.begin_frame();
        assert!(!events.has_events());
    }

    #[test]
    fn test_filter_by_type() {
        let mut events = EventCollector::new();
        events.report(event(ContactEventType::Begin, false));
        events.report(event(ContactEventType::Persist, false));
        events.report(event(ContactEventType::End, true));

        assert_eq!(events.events_of(ContactEventType::Begin).count(), 1);
        let ends: Vec<_> = events.events_of(ContactEventType::End).collect();
        assert_eq!(ends.len(), 1);
        assert!(ends[0].sensor);
    }

    #[test]
    fn test_drain() {
        let mut events = EventCollector::new();
        events.report(event(ContactEventType::Begin, false));
        let drained = events.drain_contact_events();
        assert_eq!(drained.len(), 1);
        assert!(events.contact_events().is_empty());
    }
}
