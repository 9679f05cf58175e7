//! Physics World
//!
//! The [`World`] owns every body, fixture, joint, contact and particle and
//! advances them with [`World::step`].
//!
//! # Step pipeline
//!
//! 1. Turn new broad-phase pairs into contacts (after fixture creation)
//! 2. Narrow phase over every contact
//! 3. Particle solve
//! 4. Island solve: velocity and position constraints, sleeping
//! 5. Time-of-impact pass for fast bodies
//! 6. Clear forces
//!
//! Structural calls made while the world is stepping (from a listener)
//! return [`PhysicsError::WorldLocked`] and change nothing.

use bitflags::bitflags;
use log::{trace, warn};

use crate::arena::{Arena, BodyId, ContactId, FixtureId, JointId};
use crate::body::{Body, BodyFlags, BodyType};
use crate::ccd::{time_of_impact, ToiInput, ToiState};
use crate::contact::{Contact, ContactFlags};
use crate::contact_manager::ContactManager;
use crate::distance::DistanceProxy;
use crate::error::PhysicsError;
use crate::event::{
    ContactEvent, ContactListener, DestructionListener, EventCollector, ParticleDestructionListener,
};
use crate::filter::ContactFilter;
use crate::fixture::Fixture;
use crate::island::Island;
use crate::joint::Joint;
use crate::math::{Sweep, Vec2, EPSILON};
use crate::particle::{ParticleSystem, ParticleSystemConfig};
use crate::profiling::{Profile, StepStats, StepTimes, Timer};
use crate::settings::{TimeStep, WorldConfig, MAX_SUB_STEPS, MAX_TOI_CONTACTS};

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, vec::Vec};

bitflags! {
    /// World state bits
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct WorldFlags: u8 {
        /// A fixture was created since the last step
        const NEW_FIXTURE = 1 << 0;
        /// Inside `step`
        const LOCKED = 1 << 1;
        /// Clear forces after every step
        const CLEAR_FORCES = 1 << 2;
    }
}

/// The simulation world
pub struct World {
    pub(crate) bodies: Arena<BodyId, Body>,
    pub(crate) fixtures: Arena<FixtureId, Fixture>,
    pub(crate) joints: Arena<JointId, Joint>,
    pub(crate) contact_manager: ContactManager,
    pub(crate) particle_system: ParticleSystem,
    pub(crate) flags: WorldFlags,
    pub(crate) config: WorldConfig,
    /// Inverse of the previous step's dt, used for warm starting
    inv_dt0: f32,
    /// False while TOI events of the previous step are pending
    step_complete: bool,
    pub(crate) destruction_listener: Option<Box<dyn DestructionListener>>,
    pub(crate) particle_destruction_listener: Option<Box<dyn ParticleDestructionListener>>,
    pub(crate) events: EventCollector,
    profile: Profile,
    pub(crate) step_times: StepTimes,
    pub(crate) stats: StepStats,
    island: Island,
    stack: Vec<BodyId>,
}

impl Default for World {
    fn default() -> Self {
        Self::with_config(WorldConfig::default())
    }
}

impl World {
    /// Create a world with default configuration and the given gravity
    pub fn new(gravity: Vec2) -> Self {
        Self::with_config(WorldConfig {
            gravity,
            ..WorldConfig::default()
        })
    }

    /// Create a world from a full configuration
    pub fn with_config(config: WorldConfig) -> Self {
        let mut flags = WorldFlags::empty();
        if config.auto_clear_forces {
            flags.insert(WorldFlags::CLEAR_FORCES);
        }
        Self {
            bodies: Arena::new(),
            fixtures: Arena::new(),
            joints: Arena::new(),
            contact_manager: ContactManager::default(),
            particle_system: ParticleSystem::new(ParticleSystemConfig::default()),
            flags,
            config,
            inv_dt0: 0.0,
            step_complete: true,
            destruction_listener: None,
            particle_destruction_listener: None,
            events: EventCollector::new(),
            profile: Profile::default(),
            step_times: StepTimes::default(),
            stats: StepStats::default(),
            island: Island::default(),
            stack: Vec::new(),
        }
    }

    // ---------- Stepping ----------

    /// Advance the simulation by `dt` seconds.
    ///
    /// Does nothing when called from a listener during another step.
    pub fn step(&mut self, dt: f32, velocity_iterations: u32, position_iterations: u32) {
        if self.is_locked() {
            warn!("step called while the world is locked");
            return;
        }
        let step_timer = Timer::new();
        self.step_times = StepTimes::default();
        self.stats = StepStats::default();
        self.events.begin_frame();

        // If new fixtures were added, we need to find the new contacts.
        if self.flags.contains(WorldFlags::NEW_FIXTURE) {
            self.find_new_contacts();
            self.flags.remove(WorldFlags::NEW_FIXTURE);
        }

        self.flags.insert(WorldFlags::LOCKED);

        let inv_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        let step = TimeStep {
            dt,
            inv_dt,
            dt_ratio: self.inv_dt0 * dt,
            velocity_iterations,
            position_iterations,
            warm_starting: self.config.warm_starting,
        };

        // Update contacts. This is where some contacts are destroyed.
        let timer = Timer::new();
        self.collide();
        self.step_times.collide = timer.milliseconds();
        self.stats.contacts = self.contact_manager.contacts.len() as u32;

        // Integrate velocities, solve velocity constraints, and integrate positions.
        if self.step_complete && step.dt > 0.0 {
            let timer = Timer::new();
            self.solve_particles(&step);
            self.step_times.solve_particle_system = timer.milliseconds();

            let timer = Timer::new();
            self.solve(&step);
            self.step_times.solve = timer.milliseconds();
        }

        // Handle TOI events.
        if self.config.continuous_physics && step.dt > 0.0 {
            let timer = Timer::new();
            self.solve_toi(&step);
            self.step_times.solve_toi = timer.milliseconds();
        }

        if step.dt > 0.0 {
            self.inv_dt0 = step.inv_dt;
        }

        if self.flags.contains(WorldFlags::CLEAR_FORCES) {
            self.clear_forces();
        }

        self.flags.remove(WorldFlags::LOCKED);

        self.stats.awake_bodies = self.bodies.iter().filter(|(_, b)| b.is_awake()).count() as u32;
        self.step_times.step = step_timer.milliseconds();
        self.profile.record(&self.step_times, self.stats);
        trace!(
            "step: contacts={} islands={} toi_events={} awake={}",
            self.stats.contacts,
            self.stats.islands,
            self.stats.toi_events,
            self.stats.awake_bodies
        );
    }

    /// Zero the accumulated force and torque of every body.
    ///
    /// Called by `step` unless automatic clearing is turned off.
    pub fn clear_forces(&mut self) {
        for (_, body) in self.bodies.iter_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }
    }

    /// Build and solve islands of awake bodies
    pub(crate) fn solve(&mut self, step: &TimeStep) {
        // Clear all the island flags.
        for (_, b) in self.bodies.iter_mut() {
            b.flags.remove(BodyFlags::ISLAND);
        }
        for (_, c) in self.contact_manager.contacts.iter_mut() {
            c.flags.remove(ContactFlags::ISLAND);
        }
        for (_, j) in self.joints.iter_mut() {
            j.island = false;
        }

        let mut island = core::mem::take(&mut self.island);
        let mut stack = core::mem::take(&mut self.stack);
        let gravity = self.config.gravity;
        let allow_sleep = self.config.allow_sleep;

        // Build and simulate all awake islands.
        for seed in self.bodies.ids() {
            let b = &self.bodies[seed];
            if b.flags.contains(BodyFlags::ISLAND) || !b.is_awake() || !b.is_active() {
                continue;
            }
            // The seed can be dynamic or kinematic.
            if b.body_type == BodyType::Static {
                continue;
            }

            // Reset island and stack.
            island.clear();
            stack.clear();
            stack.push(seed);
            self.bodies[seed].flags.insert(BodyFlags::ISLAND);

            // Perform a depth first search (DFS) on the constraint graph.
            while let Some(id) = stack.pop() {
                let b = &mut self.bodies[id];
                island.add_body(id, b);

                // Make sure the body is awake (without resetting sleep timer).
                b.flags.insert(BodyFlags::AWAKE);

                // To keep islands as small as possible, we don't
                // propagate islands across static bodies.
                if b.body_type == BodyType::Static {
                    continue;
                }

                for i in 0..self.bodies[id].contact_edges.len() {
                    let edge = self.bodies[id].contact_edges[i];
                    let Some(contact) = self.contact_manager.contacts.get(edge.contact) else {
                        continue;
                    };

                    // Has this contact already been added to an island?
                    if contact.flags.contains(ContactFlags::ISLAND) {
                        continue;
                    }
                    // Is this contact solid and touching?
                    if !contact.flags.contains(ContactFlags::ENABLED | ContactFlags::TOUCHING) {
                        continue;
                    }
                    if self.is_sensor_contact(contact) {
                        continue;
                    }

                    self.contact_manager.contacts[edge.contact].flags.insert(ContactFlags::ISLAND);
                    island.add_contact(edge.contact);

                    // Was the other body already added to this island?
                    let other = &mut self.bodies[edge.other];
                    if other.flags.contains(BodyFlags::ISLAND) {
                        continue;
                    }
                    other.flags.insert(BodyFlags::ISLAND);
                    stack.push(edge.other);
                }

                for i in 0..self.bodies[id].joint_edges.len() {
                    let edge = self.bodies[id].joint_edges[i];
                    if self.joints[edge.joint].island {
                        continue;
                    }

                    // Don't simulate joints connected to inactive bodies.
                    let other = &self.bodies[edge.other];
                    if !other.is_active() {
                        continue;
                    }

                    island.add_joint(edge.joint);
                    self.joints[edge.joint].island = true;

                    if other.flags.contains(BodyFlags::ISLAND) {
                        continue;
                    }
                    self.bodies[edge.other].flags.insert(BodyFlags::ISLAND);
                    stack.push(edge.other);
                }
            }

            island.solve(self, step, gravity, allow_sleep);
            self.stats.islands += 1;
            self.stats.solved_contacts += island.contacts.len() as u32;

            // Post solve cleanup. Allow static bodies to participate in other islands.
            for &id in &island.bodies {
                let b = &mut self.bodies[id];
                if b.body_type == BodyType::Static {
                    b.flags.remove(BodyFlags::ISLAND);
                }
            }
        }

        self.island = island;
        self.stack = stack;

        let timer = Timer::new();
        // Synchronize fixtures, check for out of range bodies.
        for id in self.bodies.ids() {
            let b = &self.bodies[id];
            // If a body was not in an island then it did not move.
            if !b.flags.contains(BodyFlags::ISLAND) || b.body_type == BodyType::Static {
                continue;
            }
            // Update fixtures (for broad-phase).
            self.synchronize_fixtures(id);
        }

        // Look for new contacts.
        self.find_new_contacts();
        self.step_times.broadphase = timer.milliseconds();
    }

    /// Find TOI contacts and solve them
    pub(crate) fn solve_toi(&mut self, step: &TimeStep) {
        let mut island = core::mem::take(&mut self.island);

        if self.step_complete {
            for (_, b) in self.bodies.iter_mut() {
                b.flags.remove(BodyFlags::ISLAND);
                b.sweep.alpha0 = 0.0;
            }
            for (_, c) in self.contact_manager.contacts.iter_mut() {
                // Invalidate TOI
                c.flags.remove(ContactFlags::TOI | ContactFlags::ISLAND);
                c.toi_count = 0;
                c.toi = 1.0;
            }
        }

        // Find TOI events and solve them.
        loop {
            // Find the first TOI.
            let mut min_contact: Option<ContactId> = None;
            let mut min_alpha = 1.0;

            for id in self.contact_manager.contacts.ids() {
                let Some(alpha) = self.contact_toi(id) else {
                    continue;
                };
                if alpha < min_alpha {
                    // This is the minimum TOI found so far.
                    min_contact = Some(id);
                    min_alpha = alpha;
                }
            }

            let Some(cid) = min_contact.filter(|_| min_alpha <= 1.0 - 10.0 * EPSILON) else {
                // No more TOI events. Done!
                self.step_complete = true;
                break;
            };

            // Advance the bodies to the TOI.
            let (body_a, body_b) = {
                let c = &self.contact_manager.contacts[cid];
                (c.body_a, c.body_b)
            };
            let backup_a = self.bodies[body_a].sweep;
            let backup_b = self.bodies[body_b].sweep;

            self.bodies[body_a].advance(min_alpha);
            self.bodies[body_b].advance(min_alpha);

            // The TOI contact likely has some new contact points.
            self.update_contact(cid);
            let Some(c) = self.contact_manager.contacts.get_mut(cid) else {
                continue;
            };
            c.flags.remove(ContactFlags::TOI);
            c.toi_count += 1;

            // Is the contact solid?
            if !c.flags.contains(ContactFlags::ENABLED | ContactFlags::TOUCHING) {
                // Restore the sweeps.
                c.set_enabled(false);
                self.restore_sweep(body_a, backup_a);
                self.restore_sweep(body_b, backup_b);
                continue;
            }

            self.bodies[body_a].set_awake(true);
            self.bodies[body_b].set_awake(true);

            // Build the island
            island.clear();
            island.add_body(body_a, &mut self.bodies[body_a]);
            island.add_body(body_b, &mut self.bodies[body_b]);
            island.add_contact(cid);

            self.bodies[body_a].flags.insert(BodyFlags::ISLAND);
            self.bodies[body_b].flags.insert(BodyFlags::ISLAND);
            self.contact_manager.contacts[cid].flags.insert(ContactFlags::ISLAND);

            // Get contacts on body_a and body_b.
            for body in [body_a, body_b] {
                if self.bodies[body].body_type == BodyType::Dynamic {
                    self.add_toi_neighbors(&mut island, body, min_alpha);
                }
            }

            let dt = (1.0 - min_alpha) * step.dt;
            let sub_step = TimeStep {
                dt,
                inv_dt: 1.0 / dt,
                dt_ratio: 1.0,
                position_iterations: 20,
                velocity_iterations: step.velocity_iterations,
                warm_starting: false,
            };
            let (index_a, index_b) = (self.bodies[body_a].island_index, self.bodies[body_b].island_index);
            island.solve_toi(self, &sub_step, index_a, index_b);

            // Reset island flags and synchronize broad-phase proxies.
            for i in 0..island.bodies.len() {
                let id = island.bodies[i];
                let body = &mut self.bodies[id];
                body.flags.remove(BodyFlags::ISLAND);

                if body.body_type != BodyType::Dynamic {
                    continue;
                }

                self.synchronize_fixtures(id);

                // Invalidate all contact TOIs on this displaced body.
                for e in 0..self.bodies[id].contact_edges.len() {
                    let contact = self.bodies[id].contact_edges[e].contact;
                    if let Some(c) = self.contact_manager.contacts.get_mut(contact) {
                        c.flags.remove(ContactFlags::TOI | ContactFlags::ISLAND);
                    }
                }
            }

            // Commit fixture proxy movements to the broad-phase so that new contacts are created.
            // Also, some contacts can be destroyed.
            self.find_new_contacts();
            self.stats.toi_events += 1;

            if self.config.sub_stepping {
                self.step_complete = false;
                break;
            }
        }

        self.island = island;
    }

    /// Cached or freshly computed TOI of a contact, `None` if it is not a
    /// TOI candidate
    fn contact_toi(&mut self, id: ContactId) -> Option<f32> {
        let c = self.contact_manager.contacts.get(id)?;

        // Is this contact disabled?
        if !c.flags.contains(ContactFlags::ENABLED) {
            return None;
        }
        // Prevent excessive sub-stepping.
        if c.toi_count > MAX_SUB_STEPS {
            return None;
        }
        if c.flags.contains(ContactFlags::TOI) {
            // This contact has a valid cached TOI.
            return Some(c.toi);
        }
        if self.is_sensor_contact(c) {
            return None;
        }

        let (id_a, id_b) = (c.body_a, c.body_b);
        let (index_a, index_b) = (c.index_a, c.index_b);
        let (fixture_a, fixture_b) = (c.fixture_a, c.fixture_b);
        let (b_a, b_b) = (&self.bodies[id_a], &self.bodies[id_b]);

        let active_a = b_a.is_awake() && b_a.body_type != BodyType::Static;
        let active_b = b_b.is_awake() && b_b.body_type != BodyType::Static;

        // Is at least one body active (awake and dynamic or kinematic)?
        if !active_a && !active_b {
            return None;
        }

        let collide_a = b_a.is_bullet() || b_a.body_type != BodyType::Dynamic;
        let collide_b = b_b.is_bullet() || b_b.body_type != BodyType::Dynamic;

        // Are these two non-bullet dynamic bodies?
        if !collide_a && !collide_b {
            return None;
        }

        // Put the sweeps onto the same time interval.
        let mut alpha0 = b_a.sweep.alpha0;
        if b_a.sweep.alpha0 < b_b.sweep.alpha0 {
            alpha0 = b_b.sweep.alpha0;
            self.bodies[id_a].sweep.advance(alpha0);
        } else if b_b.sweep.alpha0 < b_a.sweep.alpha0 {
            alpha0 = b_a.sweep.alpha0;
            self.bodies[id_b].sweep.advance(alpha0);
        }

        // Compute the time of impact in interval [0, min_toi]
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&self.fixtures[fixture_a].shape, index_a),
            proxy_b: DistanceProxy::new(&self.fixtures[fixture_b].shape, index_b),
            sweep_a: self.bodies[id_a].sweep,
            sweep_b: self.bodies[id_b].sweep,
            t_max: 1.0,
        };
        let output = time_of_impact(&input);

        // Beta is the fraction of the remaining portion of the step.
        let alpha = if output.state == ToiState::Touching {
            (alpha0 + (1.0 - alpha0) * output.t).min(1.0)
        } else {
            1.0
        };

        let c = &mut self.contact_manager.contacts[id];
        c.toi = alpha;
        c.flags.insert(ContactFlags::TOI);
        Some(alpha)
    }

    /// Pull the TOI neighbors of a dynamic body into the island
    fn add_toi_neighbors(&mut self, island: &mut Island, body: BodyId, min_alpha: f32) {
        let bullet = self.bodies[body].is_bullet();
        for e in 0..self.bodies[body].contact_edges.len() {
            if island.bodies.len() >= 2 * MAX_TOI_CONTACTS || island.contacts.len() >= MAX_TOI_CONTACTS {
                warn!("TOI island budget exhausted, deferring contacts to the next step");
                break;
            }
            let edge = self.bodies[body].contact_edges[e];
            let Some(contact) = self.contact_manager.contacts.get(edge.contact) else {
                continue;
            };

            // Has this contact already been added to the island?
            if contact.flags.contains(ContactFlags::ISLAND) {
                continue;
            }

            // Only add static, kinematic, or bullet bodies.
            let other = &self.bodies[edge.other];
            if other.body_type == BodyType::Dynamic && !bullet && !other.is_bullet() {
                continue;
            }

            // Skip sensors.
            if self.is_sensor_contact(contact) {
                continue;
            }

            // Tentatively advance the body to the TOI.
            let backup = other.sweep;
            let other_in_island = other.flags.contains(BodyFlags::ISLAND);
            if !other_in_island {
                self.bodies[edge.other].advance(min_alpha);
            }

            // Update the contact points
            self.update_contact(edge.contact);
            let Some(contact) = self.contact_manager.contacts.get(edge.contact) else {
                continue;
            };

            // Was the contact disabled by the user? Are there contact points?
            if !contact.flags.contains(ContactFlags::ENABLED | ContactFlags::TOUCHING) {
                self.restore_sweep(edge.other, backup);
                continue;
            }

            // Add the contact to the island
            self.contact_manager.contacts[edge.contact].flags.insert(ContactFlags::ISLAND);
            island.add_contact(edge.contact);

            // Has the other body already been added to the island?
            if other_in_island {
                continue;
            }

            // Add the other body to the island.
            let other = &mut self.bodies[edge.other];
            other.flags.insert(BodyFlags::ISLAND);
            if other.body_type != BodyType::Static {
                other.set_awake(true);
            }
            island.add_body(edge.other, other);
        }
    }

    fn restore_sweep(&mut self, id: BodyId, sweep: Sweep) {
        let body = &mut self.bodies[id];
        body.sweep = sweep;
        body.synchronize_transform();
    }

    fn is_sensor_contact(&self, c: &Contact) -> bool {
        [c.fixture_a, c.fixture_b]
            .iter()
            .any(|&f| self.fixtures.get(f).is_some_and(|f| f.is_sensor))
    }

    /// Reject structural changes while stepping
    pub(crate) fn check_unlocked(&self, operation: &'static str) -> Result<(), PhysicsError> {
        if self.is_locked() {
            warn!("{} rejected: world is locked", operation);
            return Err(PhysicsError::WorldLocked);
        }
        Ok(())
    }

    // ---------- Origin ----------

    /// Shift the world origin. Useful for large worlds.
    ///
    /// The body shift formula is `position -= new_origin`.
    pub fn shift_origin(&mut self, new_origin: Vec2) -> Result<(), PhysicsError> {
        self.check_unlocked("shift_origin")?;
        for (_, b) in self.bodies.iter_mut() {
            b.xf.p -= new_origin;
            b.sweep.c0 -= new_origin;
            b.sweep.c -= new_origin;
        }
        for (_, j) in self.joints.iter_mut() {
            j.shift_origin(new_origin);
        }
        for (_, f) in self.fixtures.iter_mut() {
            for proxy in &mut f.proxies {
                proxy.aabb.lower_bound -= new_origin;
                proxy.aabb.upper_bound -= new_origin;
            }
        }
        self.contact_manager.broad_phase.shift_origin(new_origin);
        self.particle_system.shift_origin(new_origin);
        Ok(())
    }

    // ---------- Configuration ----------

    /// True while the world is inside `step`
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.flags.contains(WorldFlags::LOCKED)
    }

    /// Current configuration
    #[inline]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Global gravity vector
    #[inline]
    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    /// Change the global gravity vector
    #[inline]
    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    /// Whether resting bodies may fall asleep
    #[inline]
    pub fn allow_sleeping(&self) -> bool {
        self.config.allow_sleep
    }

    /// Enable or disable sleeping. Disabling wakes every body.
    pub fn set_allow_sleeping(&mut self, flag: bool) {
        if flag == self.config.allow_sleep {
            return;
        }
        self.config.allow_sleep = flag;
        if !flag {
            for (_, b) in self.bodies.iter_mut() {
                b.set_awake(true);
            }
        }
    }

    /// Whether solver impulses carry over between steps
    #[inline]
    pub fn warm_starting(&self) -> bool {
        self.config.warm_starting
    }

    /// Enable or disable warm starting (for testing)
    #[inline]
    pub fn set_warm_starting(&mut self, flag: bool) {
        self.config.warm_starting = flag;
    }

    /// Whether time of impact sub-stepping runs after the discrete step
    #[inline]
    pub fn continuous_physics(&self) -> bool {
        self.config.continuous_physics
    }

    /// Enable or disable continuous collision (for testing)
    #[inline]
    pub fn set_continuous_physics(&mut self, flag: bool) {
        self.config.continuous_physics = flag;
    }

    /// Whether the step stops after the first time of impact event
    #[inline]
    pub fn sub_stepping(&self) -> bool {
        self.config.sub_stepping
    }

    /// Enable or disable single time of impact sub-stepping (for debugging)
    #[inline]
    pub fn set_sub_stepping(&mut self, flag: bool) {
        self.config.sub_stepping = flag;
    }

    /// Whether forces are cleared at the end of each step
    #[inline]
    pub fn auto_clear_forces(&self) -> bool {
        self.flags.contains(WorldFlags::CLEAR_FORCES)
    }

    /// Keep forces across steps when false, for sub-stepped callers
    pub fn set_auto_clear_forces(&mut self, flag: bool) {
        self.config.auto_clear_forces = flag;
        self.flags.set(WorldFlags::CLEAR_FORCES, flag);
    }

    // ---------- Listeners ----------

    /// Install the contact listener. Replaces any previous one.
    pub fn set_contact_listener(&mut self, listener: impl ContactListener + 'static) {
        self.contact_manager.contact_listener = Some(Box::new(listener));
    }

    /// Remove and return the contact listener
    pub fn take_contact_listener(&mut self) -> Option<Box<dyn ContactListener>> {
        self.contact_manager.contact_listener.take()
    }

    /// Install a contact filter. Replaces the default category/mask/group test.
    pub fn set_contact_filter(&mut self, filter: impl ContactFilter + 'static) {
        self.contact_manager.contact_filter = Some(Box::new(filter));
    }

    /// Install the listener told about implicitly destroyed joints and fixtures
    pub fn set_destruction_listener(&mut self, listener: impl DestructionListener + 'static) {
        self.destruction_listener = Some(Box::new(listener));
    }

    /// Install the listener told about destroyed particles and groups
    pub fn set_particle_destruction_listener(&mut self, listener: impl ParticleDestructionListener + 'static) {
        self.particle_destruction_listener = Some(Box::new(listener));
    }

    // ---------- Events ----------

    /// Contact events recorded by the last step
    #[inline]
    pub fn events(&self) -> &EventCollector {
        &self.events
    }

    /// Take the contact events of the last step
    pub fn drain_contact_events(&mut self) -> Vec<ContactEvent> {
        self.events.drain_contact_events()
    }

    // ---------- Metrics ----------

    /// Stage timings and counters
    #[inline]
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Zero the accumulated profile
    pub fn reset_profile(&mut self) {
        self.profile.reset();
    }

    /// Number of fixtures attached to bodies
    #[inline]
    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Number of broad-phase proxies
    #[inline]
    pub fn proxy_count(&self) -> usize {
        self.contact_manager.broad_phase.proxy_count()
    }

    /// Height of the dynamic tree
    #[inline]
    pub fn tree_height(&self) -> i32 {
        self.contact_manager.broad_phase.tree_height()
    }

    /// Largest height difference between sibling subtrees
    #[inline]
    pub fn tree_balance(&self) -> i32 {
        self.contact_manager.broad_phase.tree_balance()
    }

    /// Sum of node perimeters divided by the root perimeter
    #[inline]
    pub fn tree_quality(&self) -> f32 {
        self.contact_manager.broad_phase.tree_quality()
    }

    /// Broad phase and contacts
    #[inline]
    pub fn contact_manager(&self) -> &ContactManager {
        &self.contact_manager
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::event::ContactEventType;
    use crate::fixture::FixtureDef;
    use crate::shape::{CircleShape, EdgeShape, PolygonShape};
    use std::cell::Cell;
    use std::rc::Rc;

    fn ground(world: &mut World) -> BodyId {
        let g = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
        world
            .create_fixture_from_shape(g, PolygonShape::new_box(20.0, 0.5), 0.0)
            .unwrap();
        g
    }

    fn ball(world: &mut World, position: Vec2, radius: f32) -> BodyId {
        let b = world.create_body(&BodyDef::dynamic(position)).unwrap();
        world
            .create_fixture_from_shape(b, CircleShape::new(radius), 1.0)
            .unwrap();
        b
    }

    #[test]
    fn test_new_world_defaults() {
        let world = World::new(Vec2::new(0.0, -9.8));
        assert_eq!(world.gravity(), Vec2::new(0.0, -9.8));
        assert!(world.allow_sleeping());
        assert!(world.warm_starting());
        assert!(world.continuous_physics());
        assert!(!world.sub_stepping());
        assert!(world.auto_clear_forces());
        assert!(!world.is_locked());
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn test_free_fall() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let b = ball(&mut world, Vec2::new(0.0, 10.0), 0.5);
        for _ in 0..60 {
            world.step(1.0 / 60.0, 8, 3);
        }
        let body = world.body(b).unwrap();
        // Semi-implicit Euler: v = -10 after one second
        assert!((body.linear_velocity().y + 10.0).abs() < 1e-3);
        assert!(body.position().y < 5.5 && body.position().y > 4.5);
    }

    #[test]
    fn test_ball_rests_on_ground_and_sleeps() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        ground(&mut world);
        let b = ball(&mut world, Vec2::new(0.0, 3.0), 0.5);
        for _ in 0..300 {
            world.step(1.0 / 60.0, 8, 3);
        }
        let body = world.body(b).unwrap();
        assert!((body.position().y - 1.0).abs() < 0.02);
        assert!(!body.is_awake());
    }

    #[test]
    fn test_sleeping_body_keeps_exact_pose() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        ground(&mut world);
        let resting = ball(&mut world, Vec2::new(0.0, 3.0), 0.5);
        for _ in 0..300 {
            world.step(1.0 / 60.0, 8, 3);
        }
        assert!(!world.body(resting).unwrap().is_awake());

        // Put to sleep in mid-air: gravity must not be integrated
        let floating = ball(&mut world, Vec2::new(5.0, 5.0), 0.5);
        world.body_mut(floating).unwrap().set_awake(false);

        let before: Vec<_> = [resting, floating]
            .iter()
            .map(|&id| {
                let b = world.body(id).unwrap();
                (b.position(), b.angle(), b.transform().q)
            })
            .collect();
        world.step(1.0 / 60.0, 8, 3);

        assert_eq!(world.profile().stats.islands, 0);
        for (&id, pose) in [resting, floating].iter().zip(&before) {
            let b = world.body(id).unwrap();
            assert_eq!((b.position(), b.angle(), b.transform().q), *pose);
            assert_eq!(b.linear_velocity(), Vec2::ZERO);
            assert_eq!(b.angular_velocity(), 0.0);
        }
    }

    #[test]
    fn test_fixture_count_tracks_bodies() {
        let mut world = World::new(Vec2::ZERO);
        assert_eq!(world.fixture_count(), 0);
        ground(&mut world);
        let b = ball(&mut world, Vec2::new(0.0, 3.0), 0.5);
        world
            .create_fixture_from_shape(b, PolygonShape::new_box(0.25, 0.25), 1.0)
            .unwrap();
        assert_eq!(world.fixture_count(), 3);

        let extra = world.body(b).unwrap().fixtures()[1];
        world.destroy_fixture(extra).unwrap();
        assert_eq!(world.fixture_count(), 2);

        world.destroy_body(b).unwrap();
        assert_eq!(world.fixture_count(), 1);
        assert_eq!(world.proxy_count(), 1);
    }

    #[test]
    fn test_islands_counted_per_component() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        ground(&mut world);
        ball(&mut world, Vec2::new(-5.0, 0.9), 0.5);
        ball(&mut world, Vec2::new(5.0, 0.9), 0.5);
        world.step(1.0 / 60.0, 8, 3);
        world.step(1.0 / 60.0, 8, 3);
        // The static ground does not merge the two balls into one island
        assert_eq!(world.profile().stats.islands, 2);
        assert_eq!(world.profile().frame_count, 2);
    }

    #[test]
    fn test_zero_dt_step_does_not_move() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let b = ball(&mut world, Vec2::new(0.0, 2.0), 0.5);
        world.step(0.0, 8, 3);
        assert_eq!(world.body(b).unwrap().position(), Vec2::new(0.0, 2.0));
    }

    #[test]
    fn test_clear_forces_flag() {
        let mut world = World::new(Vec2::ZERO);
        let b = ball(&mut world, Vec2::ZERO, 0.5);
        world.set_auto_clear_forces(false);
        world.body_mut(b).unwrap().apply_force_to_center(Vec2::new(1.0, 0.0), true);
        world.step(1.0 / 60.0, 8, 3);
        assert_eq!(world.body(b).unwrap().force(), Vec2::new(1.0, 0.0));
        world.clear_forces();
        assert_eq!(world.body(b).unwrap().force(), Vec2::ZERO);
    }

    #[test]
    fn test_bullet_does_not_tunnel_through_edge() {
        let mut world = World::new(Vec2::ZERO);
        let g = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
        world
            .create_fixture_from_shape(g, EdgeShape::new(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)), 0.0)
            .unwrap();
        let b = ball(&mut world, Vec2::new(0.0, 0.5), 0.1);
        world
            .body_mut(b)
            .unwrap()
            .set_linear_velocity(Vec2::new(0.0, -50.0));
        world.step(1.0 / 60.0, 8, 3);
        let y = world.body(b).unwrap().position().y;
        assert!(y > 0.0, "ball tunneled to y = {y}");
        assert!(world.profile().stats.toi_events >= 1);
    }

    #[test]
    fn test_without_continuous_physics_ball_tunnels() {
        let mut world = World::new(Vec2::ZERO);
        world.set_continuous_physics(false);
        let g = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
        world
            .create_fixture_from_shape(g, EdgeShape::new(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)), 0.0)
            .unwrap();
        let b = ball(&mut world, Vec2::new(0.0, 0.5), 0.1);
        world
            .body_mut(b)
            .unwrap()
            .set_linear_velocity(Vec2::new(0.0, -50.0));
        world.step(1.0 / 60.0, 8, 3);
        assert!(world.body(b).unwrap().position().y < 0.0);
    }

    struct LockChecker {
        saw_lock: Rc<Cell<bool>>,
        rejected: Rc<Cell<bool>>,
    }

    impl ContactListener for LockChecker {
        fn begin_contact(&mut self, world: &mut World, _contact: ContactId) {
            self.saw_lock.set(world.is_locked());
            let result = world.create_body(&BodyDef::dynamic(Vec2::ZERO));
            self.rejected.set(result == Err(PhysicsError::WorldLocked));
        }
    }

    #[test]
    fn test_structural_calls_rejected_inside_callbacks() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        ground(&mut world);
        ball(&mut world, Vec2::new(0.0, 1.2), 0.5);
        let saw_lock = Rc::new(Cell::new(false));
        let rejected = Rc::new(Cell::new(false));
        world.set_contact_listener(LockChecker {
            saw_lock: saw_lock.clone(),
            rejected: rejected.clone(),
        });
        for _ in 0..60 {
            world.step(1.0 / 60.0, 8, 3);
        }
        assert!(saw_lock.get());
        assert!(rejected.get());
        assert!(!world.is_locked());
        assert_eq!(world.body_count(), 2);
    }

    #[test]
    fn test_sensor_not_solved() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let g = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
        world
            .create_fixture(g, &FixtureDef::new(PolygonShape::new_box(5.0, 0.5)).with_sensor(true))
            .unwrap();
        let b = ball(&mut world, Vec2::new(0.0, 1.2), 0.5);
        let mut sensor_begins = 0;
        for _ in 0..60 {
            world.step(1.0 / 60.0, 8, 3);
            sensor_begins += world
                .events()
                .events_of(ContactEventType::Begin)
                .filter(|e| e.sensor)
                .count();
        }
        // Falls through the sensor
        assert!(world.body(b).unwrap().position().y < 0.0);
        assert_eq!(sensor_begins, 1);
    }

    #[test]
    fn test_shift_origin_moves_bodies_and_tree() {
        let mut world = World::new(Vec2::ZERO);
        let b = ball(&mut world, Vec2::new(10.0, 5.0), 0.5);
        world.shift_origin(Vec2::new(10.0, 0.0)).unwrap();
        assert!((world.body(b).unwrap().position() - Vec2::new(0.0, 5.0)).length() < 1e-6);
        let aabb = world.fixture(world.body(b).unwrap().fixtures()[0]).unwrap().aabb(0).unwrap();
        assert!(aabb.center().x.abs() < 1e-5);
    }

    #[test]
    fn test_tree_metrics() {
        let mut world = World::new(Vec2::ZERO);
        for i in 0..8 {
            ball(&mut world, Vec2::new(i as f32 * 3.0, 0.0), 0.5);
        }
        assert_eq!(world.proxy_count(), 8);
        assert!(world.tree_height() >= 3);
        assert!(world.tree_balance() <= 2);
        assert!(world.tree_quality() >= 1.0);
    }

    #[test]
    fn test_sub_stepping_leaves_step_incomplete() {
        let mut world = World::new(Vec2::ZERO);
        world.set_sub_stepping(true);
        let g = world.create_body(&BodyDef::fixed(Vec2::ZERO)).unwrap();
        world
            .create_fixture_from_shape(g, EdgeShape::new(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)), 0.0)
            .unwrap();
        let b = ball(&mut world, Vec2::new(0.0, 0.5), 0.1);
        world
            .body_mut(b)
            .unwrap()
            .set_linear_velocity(Vec2::new(0.0, -50.0));
        world.step(1.0 / 60.0, 8, 3);
        assert_eq!(world.profile().stats.toi_events, 1);
        assert!(!world.step_complete);
    }
}
