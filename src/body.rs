//! Rigid Bodies
//!
//! A body carries the pose, velocity and mass of a rigid object. Its
//! fixtures attach collision shapes and its edge lists link it into the
//! contact/joint graph that the island solver walks.
//!
//! # Body types
//!
//! - **Static**: zero mass, zero velocity, moved only by the user
//! - **Kinematic**: zero mass, velocity set by the user, moved by the solver
//! - **Dynamic**: positive mass, moved by forces, contacts and joints

use bitflags::bitflags;
use log::debug;

use crate::arena::{BodyId, ContactId, FixtureId, JointId};
use crate::error::PhysicsError;
use crate::math::{is_valid, Rot, Sweep, Transform, Vec2};
use crate::shape::MassData;
use crate::world::{World, WorldFlags};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

// ============================================================================
// Definitions
// ============================================================================

/// Simulation class of a body
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BodyType {
    /// Zero mass, never moves on its own
    #[default]
    Static,
    /// Zero mass, moves with a user-set velocity
    Kinematic,
    /// Positive mass, fully simulated
    Dynamic,
}

/// Construction parameters of a body
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyDef {
    /// Body type
    pub body_type: BodyType,
    /// World position of the body origin
    pub position: Vec2,
    /// World angle in radians
    pub angle: f32,
    /// Linear velocity of the body origin
    pub linear_velocity: Vec2,
    /// Angular velocity in radians per second
    pub angular_velocity: f32,
    /// Linear damping coefficient
    pub linear_damping: f32,
    /// Angular damping coefficient
    pub angular_damping: f32,
    /// The body may fall asleep
    pub allow_sleep: bool,
    /// Initial awake state
    pub awake: bool,
    /// Prevent rotation
    pub fixed_rotation: bool,
    /// Continuous collision against other dynamic bodies
    pub bullet: bool,
    /// Initially active (participates in collision and simulation)
    pub active: bool,
    /// Scale applied to the world gravity
    pub gravity_scale: f32,
    /// Opaque application data
    pub user_data: u64,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            body_type: BodyType::Static,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            allow_sleep: true,
            awake: true,
            fixed_rotation: false,
            bullet: false,
            active: true,
            gravity_scale: 1.0,
            user_data: 0,
        }
    }
}

impl BodyDef {
    /// Dynamic body at `position`
    pub fn dynamic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position,
            ..Self::default()
        }
    }

    /// Static body at `position`
    pub fn fixed(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Kinematic body at `position`
    pub fn kinematic(position: Vec2) -> Self {
        Self {
            body_type: BodyType::Kinematic,
            position,
            ..Self::default()
        }
    }
}

bitflags! {
    /// Body state bits
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BodyFlags: u16 {
        /// Already collected into the current island
        const ISLAND = 1 << 0;
        /// Awake
        const AWAKE = 1 << 1;
        /// Sleeping allowed
        const AUTO_SLEEP = 1 << 2;
        /// Continuous collision against dynamic bodies
        const BULLET = 1 << 3;
        /// Rotation locked
        const FIXED_ROTATION = 1 << 4;
        /// Participates in simulation
        const ACTIVE = 1 << 5;
        /// Already processed by the TOI pass this step
        const TOI = 1 << 6;
    }
}

/// Link from a body to a joint and the body on its other side
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JointEdge {
    /// Body on the other side of the joint
    pub other: BodyId,
    /// The joint
    pub joint: JointId,
}

/// Link from a body to a contact and the body on its other side
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactEdge {
    /// Body on the other side of the contact
    pub other: BodyId,
    /// The contact
    pub contact: ContactId,
}

// ============================================================================
// Body
// ============================================================================

/// A rigid body
#[derive(Clone, Debug)]
pub struct Body {
    pub(crate) body_type: BodyType,
    pub(crate) flags: BodyFlags,
    pub(crate) island_index: usize,
    pub(crate) xf: Transform,
    pub(crate) sweep: Sweep,
    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,
    pub(crate) fixtures: Vec<FixtureId>,
    pub(crate) joint_edges: Vec<JointEdge>,
    pub(crate) contact_edges: Vec<ContactEdge>,
    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,
    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) gravity_scale: f32,
    pub(crate) sleep_time: f32,
    pub(crate) user_data: u64,
}

impl Body {
    pub(crate) fn new(def: &BodyDef) -> Self {
        let mut flags = BodyFlags::empty();
        flags.set(BodyFlags::BULLET, def.bullet);
        flags.set(BodyFlags::FIXED_ROTATION, def.fixed_rotation);
        flags.set(BodyFlags::AUTO_SLEEP, def.allow_sleep);
        flags.set(BodyFlags::AWAKE, def.awake);
        flags.set(BodyFlags::ACTIVE, def.active);

        let xf = Transform::new(def.position, def.angle);
        let sweep = Sweep {
            local_center: Vec2::ZERO,
            c0: xf.p,
            c: xf.p,
            a0: def.angle,
            a: def.angle,
            alpha0: 0.0,
        };

        let (mass, inv_mass) = if def.body_type == BodyType::Dynamic {
            (1.0, 1.0)
        } else {
            (0.0, 0.0)
        };

        Self {
            body_type: def.body_type,
            flags,
            island_index: 0,
            xf,
            sweep,
            linear_velocity: def.linear_velocity,
            angular_velocity: def.angular_velocity,
            force: Vec2::ZERO,
            torque: 0.0,
            fixtures: Vec::new(),
            joint_edges: Vec::new(),
            contact_edges: Vec::new(),
            mass,
            inv_mass,
            inertia: 0.0,
            inv_inertia: 0.0,
            linear_damping: def.linear_damping,
            angular_damping: def.angular_damping,
            gravity_scale: def.gravity_scale,
            sleep_time: 0.0,
            user_data: def.user_data,
        }
    }

    // ---------- State ----------

    /// Body type
    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// Transform of the body origin
    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.xf
    }

    /// World position of the body origin
    #[inline]
    pub fn position(&self) -> Vec2 {
        self.xf.p
    }

    /// World angle in radians
    #[inline]
    pub fn angle(&self) -> f32 {
        self.sweep.a
    }

    /// Motion sweep of the current step
    #[inline]
    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    /// World position of the center of mass
    #[inline]
    pub fn world_center(&self) -> Vec2 {
        self.sweep.c
    }

    /// Center of mass in body coordinates
    #[inline]
    pub fn local_center(&self) -> Vec2 {
        self.sweep.local_center
    }

    /// Linear velocity of the center of mass
    #[inline]
    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    /// Angular velocity in radians per second
    #[inline]
    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    /// Set the linear velocity. Ignored for static bodies.
    pub fn set_linear_velocity(&mut self, v: Vec2) {
        if self.body_type == BodyType::Static {
            return;
        }
        if v.dot(v) > 0.0 {
            self.set_awake(true);
        }
        self.linear_velocity = v;
    }

    /// Set the angular velocity. Ignored for static bodies.
    pub fn set_angular_velocity(&mut self, w: f32) {
        if self.body_type == BodyType::Static {
            return;
        }
        if w * w > 0.0 {
            self.set_awake(true);
        }
        self.angular_velocity = w;
    }

    /// Accumulated force of the current step
    #[inline]
    pub fn force(&self) -> Vec2 {
        self.force
    }

    /// Accumulated torque of the current step
    #[inline]
    pub fn torque(&self) -> f32 {
        self.torque
    }

    /// Total mass in kg
    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Rotational inertia about the body origin
    #[inline]
    pub fn inertia(&self) -> f32 {
        self.inertia + self.mass * self.sweep.local_center.dot(self.sweep.local_center)
    }

    /// Mass, center of mass and inertia about the body origin
    pub fn mass_data(&self) -> MassData {
        MassData {
            mass: self.mass,
            center: self.sweep.local_center,
            i: self.inertia(),
        }
    }

    /// Linear damping coefficient
    #[inline]
    pub fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    /// Set the linear damping coefficient
    #[inline]
    pub fn set_linear_damping(&mut self, d: f32) {
        self.linear_damping = d;
    }

    /// Angular damping coefficient
    #[inline]
    pub fn angular_damping(&self) -> f32 {
        self.angular_damping
    }

    /// Set the angular damping coefficient
    #[inline]
    pub fn set_angular_damping(&mut self, d: f32) {
        self.angular_damping = d;
    }

    /// Gravity scale
    #[inline]
    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    /// Set the gravity scale
    #[inline]
    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    /// Attached fixtures
    #[inline]
    pub fn fixtures(&self) -> &[FixtureId] {
        &self.fixtures
    }

    /// Joints attached to this body
    #[inline]
    pub fn joint_edges(&self) -> &[JointEdge] {
        &self.joint_edges
    }

    /// Contacts involving this body
    #[inline]
    pub fn contact_edges(&self) -> &[ContactEdge] {
        &self.contact_edges
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

    /// Seconds spent below the sleep tolerances
    #[inline]
    pub fn sleep_time(&self) -> f32 {
        self.sleep_time
    }

    // ---------- Flags ----------

    /// Raw state bits
    #[inline]
    pub fn flags(&self) -> BodyFlags {
        self.flags
    }

    /// True if the body is awake
    #[inline]
    pub fn is_awake(&self) -> bool {
        self.flags.contains(BodyFlags::AWAKE)
    }

    /// Wake the body up or put it to sleep.
    ///
    /// A sleeping body has zero velocity and no accumulated force.
    pub fn set_awake(&mut self, flag: bool) {
        if flag {
            if self.body_type != BodyType::Static && !self.is_awake() {
                self.flags.insert(BodyFlags::AWAKE);
                self.sleep_time = 0.0;
            }
        } else {
            self.flags.remove(BodyFlags::AWAKE);
            self.sleep_time = 0.0;
            self.linear_velocity = Vec2::ZERO;
            self.angular_velocity = 0.0;
            self.force = Vec2::ZERO;
            self.torque = 0.0;
        }
    }

    /// True if the body may fall asleep
    #[inline]
    pub fn is_sleeping_allowed(&self) -> bool {
        self.flags.contains(BodyFlags::AUTO_SLEEP)
    }

    /// Allow or forbid sleeping. Forbidding wakes the body.
    pub fn set_sleeping_allowed(&mut self, flag: bool) {
        if flag {
            self.flags.insert(BodyFlags::AUTO_SLEEP);
        } else {
            self.flags.remove(BodyFlags::AUTO_SLEEP);
            self.set_awake(true);
        }
    }

    /// True if the body uses continuous collision against dynamic bodies
    #[inline]
    pub fn is_bullet(&self) -> bool {
        self.flags.contains(BodyFlags::BULLET)
    }

    /// Mark the body as a bullet
    #[inline]
    pub fn set_bullet(&mut self, flag: bool) {
        self.flags.set(BodyFlags::BULLET, flag);
    }

    /// True if rotation is locked
    #[inline]
    pub fn is_fixed_rotation(&self) -> bool {
        self.flags.contains(BodyFlags::FIXED_ROTATION)
    }

    /// True if the body participates in simulation
    #[inline]
    pub fn is_active(&self) -> bool {
        self.flags.contains(BodyFlags::ACTIVE)
    }

    // ---------- Forces ----------

    /// Apply a force at a world point
    pub fn apply_force(&mut self, force: Vec2, point: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake {
            self.set_awake(true);
        }
        if self.is_awake() {
            self.force += force;
            self.torque += (point - self.sweep.c).cross(force);
        }
    }

    /// Apply a force at the center of mass
    pub fn apply_force_to_center(&mut self, force: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake {
            self.set_awake(true);
        }
        if self.is_awake() {
            self.force += force;
        }
    }

    /// Apply a torque
    pub fn apply_torque(&mut self, torque: f32, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake {
            self.set_awake(true);
        }
        if self.is_awake() {
            self.torque += torque;
        }
    }

    /// Apply an impulse at a world point
    pub fn apply_linear_impulse(&mut self, impulse: Vec2, point: Vec2, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake {
            self.set_awake(true);
        }
        if self.is_awake() {
            self.linear_velocity += impulse * self.inv_mass;
            self.angular_velocity += self.inv_inertia * (point - self.sweep.c).cross(impulse);
        }
    }

    /// Apply an angular impulse
    pub fn apply_angular_impulse(&mut self, impulse: f32, wake: bool) {
        if self.body_type != BodyType::Dynamic {
            return;
        }
        if wake {
            self.set_awake(true);
        }
        if self.is_awake() {
            self.angular_velocity += self.inv_inertia * impulse;
        }
    }

    // ---------- Coordinate helpers ----------

    /// Body point to world point
    #[inline]
    pub fn world_point(&self, local_point: Vec2) -> Vec2 {
        self.xf.mul_vec(local_point)
    }

    /// Body vector to world vector
    #[inline]
    pub fn world_vector(&self, local_vector: Vec2) -> Vec2 {
        self.xf.q.mul_vec(local_vector)
    }

    /// World point to body point
    #[inline]
    pub fn local_point(&self, world_point: Vec2) -> Vec2 {
        self.xf.mul_t_vec(world_point)
    }

    /// World vector to body vector
    #[inline]
    pub fn local_vector(&self, world_vector: Vec2) -> Vec2 {
        self.xf.q.mul_t_vec(world_vector)
    }

    /// Velocity of a world point attached to this body
    #[inline]
    pub fn linear_velocity_from_world_point(&self, world_point: Vec2) -> Vec2 {
        self.linear_velocity + Vec2::scalar_cross(self.angular_velocity, world_point - self.sweep.c)
    }

    /// Velocity of a body point attached to this body
    #[inline]
    pub fn linear_velocity_from_local_point(&self, local_point: Vec2) -> Vec2 {
        self.linear_velocity_from_world_point(self.world_point(local_point))
    }

    // ---------- Internal ----------

    /// Rebuild `xf` from the end of the sweep
    #[inline]
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.q = Rot::new(self.sweep.a);
        self.xf.p = self.sweep.c - self.xf.q.mul_vec(self.sweep.local_center);
    }

    /// Transform at the start of the sweep
    #[inline]
    pub(crate) fn start_transform(&self) -> Transform {
        let q = Rot::new(self.sweep.a0);
        Transform {
            p: self.sweep.c0 - q.mul_vec(self.sweep.local_center),
            q,
        }
    }

    /// Move the body to the sweep pose at `alpha` and freeze it there
    pub(crate) fn advance(&mut self, alpha: f32) {
        self.sweep.advance(alpha);
        self.sweep.c = self.sweep.c0;
        self.sweep.a = self.sweep.a0;
        self.synchronize_transform();
    }
}

// ============================================================================
// World-level body operations
// ============================================================================

impl World {
    /// Create a rigid body
    pub fn create_body(&mut self, def: &BodyDef) -> Result<BodyId, PhysicsError> {
        self.check_unlocked("create_body")?;
        if !def.position.is_valid() || !is_valid(def.angle) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "body pose is not finite",
            });
        }
        if def.linear_damping < 0.0 || def.angular_damping < 0.0 {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "body damping must be non-negative",
            });
        }
        let id = self.bodies.insert(Body::new(def));
        debug!("created {:?} body {:?}", def.body_type, id);
        Ok(id)
    }

    /// Destroy a body with all its fixtures, contacts and joints.
    ///
    /// The destruction listener is told about every implicitly destroyed
    /// joint and fixture.
    pub fn destroy_body(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        self.check_unlocked("destroy_body")?;
        let body = self.body_ref(id)?;
        let joints: Vec<JointId> = body.joint_edges.iter().map(|e| e.joint).collect();
        let contacts: Vec<ContactId> = body.contact_edges.iter().map(|e| e.contact).collect();
        let fixtures = body.fixtures.clone();

        for joint in joints {
            if let Some(listener) = self.destruction_listener.as_mut() {
                listener.say_goodbye_joint(joint);
            }
            self.destroy_joint_internal(joint);
        }

        for contact in contacts {
            self.destroy_contact(contact);
        }

        for fixture in fixtures {
            if let Some(listener) = self.destruction_listener.as_mut() {
                listener.say_goodbye_fixture(fixture);
            }
            if let Some(mut f) = self.fixtures.remove(fixture) {
                f.destroy_proxies(&mut self.contact_manager.broad_phase);
            }
        }

        self.bodies.remove(id);
        debug!("destroyed body {:?}", id);
        Ok(())
    }

    /// Shared access to a body
    #[inline]
    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id)
    }

    /// Exclusive access to a body (velocities, forces, flags)
    #[inline]
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(id)
    }

    /// Iterate over all bodies
    pub fn bodies(&self) -> impl Iterator<Item = (BodyId, &Body)> {
        self.bodies.iter()
    }

    /// Number of bodies
    #[inline]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Teleport a body. Contacts are updated on the next step.
    pub fn set_transform(&mut self, id: BodyId, position: Vec2, angle: f32) -> Result<(), PhysicsError> {
        self.check_unlocked("set_transform")?;
        let body = self.body_mut_ref(id)?;
        body.xf = Transform::new(position, angle);
        body.sweep.c = body.xf.mul_vec(body.sweep.local_center);
        body.sweep.a = angle;
        body.sweep.c0 = body.sweep.c;
        body.sweep.a0 = angle;

        let xf = body.xf;
        let fixtures = body.fixtures.clone();
        for f in fixtures {
            if let Some(fixture) = self.fixtures.get_mut(f) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &xf, &xf);
            }
        }
        self.flags.insert(WorldFlags::NEW_FIXTURE);
        Ok(())
    }

    /// Change the body type. Contacts of the body are rebuilt.
    pub fn set_body_type(&mut self, id: BodyId, body_type: BodyType) -> Result<(), PhysicsError> {
        self.check_unlocked("set_body_type")?;
        if self.body_ref(id)?.body_type == body_type {
            return Ok(());
        }
        self.bodies[id].body_type = body_type;
        self.reset_mass_data(id)?;

        if body_type == BodyType::Static {
            let body = &mut self.bodies[id];
            body.linear_velocity = Vec2::ZERO;
            body.angular_velocity = 0.0;
            body.sweep.a0 = body.sweep.a;
            body.sweep.c0 = body.sweep.c;
            self.synchronize_fixtures(id);
        }

        let body = &mut self.bodies[id];
        body.set_awake(true);
        body.force = Vec2::ZERO;
        body.torque = 0.0;

        // Delete the attached contacts
        let contacts: Vec<ContactId> = body.contact_edges.iter().map(|e| e.contact).collect();
        for c in contacts {
            self.destroy_contact(c);
        }

        // Touch the proxies so that new contacts will be created
        self.touch_body_proxies(id);
        Ok(())
    }

    /// Activate or deactivate a body.
    ///
    /// An inactive body has no proxies and no contacts and is not simulated.
    /// Joints stay attached.
    pub fn set_active(&mut self, id: BodyId, flag: bool) -> Result<(), PhysicsError> {
        self.check_unlocked("set_active")?;
        if self.body_ref(id)?.is_active() == flag {
            return Ok(());
        }

        let body = &mut self.bodies[id];
        body.flags.set(BodyFlags::ACTIVE, flag);
        let xf = body.xf;
        let fixtures = body.fixtures.clone();

        if flag {
            for f in fixtures {
                if let Some(fixture) = self.fixtures.get_mut(f) {
                    fixture.create_proxies(&mut self.contact_manager.broad_phase, &xf, f);
                }
            }
            self.flags.insert(WorldFlags::NEW_FIXTURE);
        } else {
            for f in fixtures {
                if let Some(fixture) = self.fixtures.get_mut(f) {
                    fixture.destroy_proxies(&mut self.contact_manager.broad_phase);
                }
            }
            let contacts: Vec<ContactId> = self.bodies[id]
                .contact_edges
                .iter()
                .map(|e| e.contact)
                .collect();
            for c in contacts {
                self.destroy_contact(c);
            }
        }
        Ok(())
    }

    /// Lock or unlock rotation
    pub fn set_fixed_rotation(&mut self, id: BodyId, flag: bool) -> Result<(), PhysicsError> {
        let body = self.body_mut_ref(id)?;
        if body.is_fixed_rotation() == flag {
            return Ok(());
        }
        body.flags.set(BodyFlags::FIXED_ROTATION, flag);
        body.angular_velocity = 0.0;
        self.reset_mass_data(id)
    }

    /// Recompute mass, center of mass and inertia from the fixtures.
    ///
    /// A dynamic body without massive fixtures gets a mass of one.
    pub fn reset_mass_data(&mut self, id: BodyId) -> Result<(), PhysicsError> {
        let body = self.bodies.get(id).ok_or(PhysicsError::InvalidHandle { kind: "body" })?;

        let mut mass = 0.0;
        let mut inertia = 0.0;
        let mut local_center = Vec2::ZERO;
        if body.body_type == BodyType::Dynamic {
            for &f in &body.fixtures {
                let Some(fixture) = self.fixtures.get(f) else {
                    continue;
                };
                if fixture.density == 0.0 {
                    continue;
                }
                let md = fixture.mass_data();
                mass += md.mass;
                local_center += md.center * md.mass;
                inertia += md.i;
            }
        }

        let body = &mut self.bodies[id];
        body.mass = 0.0;
        body.inv_mass = 0.0;
        body.inertia = 0.0;
        body.inv_inertia = 0.0;
        body.sweep.local_center = Vec2::ZERO;

        // Static and kinematic bodies have zero mass
        if body.body_type != BodyType::Dynamic {
            body.sweep.c0 = body.xf.p;
            body.sweep.c = body.xf.p;
            body.sweep.a0 = body.sweep.a;
            return Ok(());
        }

        if mass > 0.0 {
            body.mass = mass;
            body.inv_mass = 1.0 / mass;
            local_center *= body.inv_mass;
        } else {
            // Force all dynamic bodies to have positive mass
            body.mass = 1.0;
            body.inv_mass = 1.0;
        }

        if inertia > 0.0 && !body.is_fixed_rotation() {
            // Center the inertia about the center of mass
            body.inertia = inertia - body.mass * local_center.dot(local_center);
            body.inv_inertia = if body.inertia > 0.0 { 1.0 / body.inertia } else { 0.0 };
        }

        body.apply_local_center(local_center);
        Ok(())
    }

    /// Override the mass properties of a dynamic body
    pub fn set_mass_data(&mut self, id: BodyId, data: &MassData) -> Result<(), PhysicsError> {
        self.check_unlocked("set_mass_data")?;
        let body = self.body_mut_ref(id)?;
        if body.body_type != BodyType::Dynamic {
            return Ok(());
        }

        body.mass = if data.mass > 0.0 { data.mass } else { 1.0 };
        body.inv_mass = 1.0 / body.mass;
        body.inertia = 0.0;
        body.inv_inertia = 0.0;

        if data.i > 0.0 && !body.is_fixed_rotation() {
            body.inertia = data.i - body.mass * data.center.dot(data.center);
            if body.inertia > 0.0 {
                body.inv_inertia = 1.0 / body.inertia;
            }
        }

        body.apply_local_center(data.center);
        Ok(())
    }

    /// True if contacts between the two bodies are allowed.
    ///
    /// At least one body must be dynamic and no joint between them may
    /// disable collision.
    pub fn should_collide(&self, a: BodyId, b: BodyId) -> bool {
        let (Some(body_a), Some(body_b)) = (self.bodies.get(a), self.bodies.get(b)) else {
            return false;
        };
        if body_a.body_type != BodyType::Dynamic && body_b.body_type != BodyType::Dynamic {
            return false;
        }
        body_b.joint_edges.iter().all(|edge| {
            edge.other != a
                || self
                    .joints
                    .get(edge.joint)
                    .map_or(true, |j| j.collide_connected())
        })
    }

    // ---------- Internal ----------

    pub(crate) fn body_ref(&self, id: BodyId) -> Result<&Body, PhysicsError> {
        self.bodies.get(id).ok_or(PhysicsError::InvalidHandle { kind: "body" })
    }

    pub(crate) fn body_mut_ref(&mut self, id: BodyId) -> Result<&mut Body, PhysicsError> {
        self.bodies
            .get_mut(id)
            .ok_or(PhysicsError::InvalidHandle { kind: "body" })
    }

    /// Move the proxies of a body from its sweep start to its transform
    pub(crate) fn synchronize_fixtures(&mut self, id: BodyId) {
        let Some(body) = self.bodies.get(id) else {
            return;
        };
        let xf1 = body.start_transform();
        let xf2 = body.xf;
        for &f in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(f) {
                fixture.synchronize(&mut self.contact_manager.broad_phase, &xf1, &xf2);
            }
        }
    }

    pub(crate) fn touch_body_proxies(&mut self, id: BodyId) {
        let Some(body) = self.bodies.get(id) else {
            return;
        };
        for &f in &body.fixtures {
            if let Some(fixture) = self.fixtures.get(f) {
                for proxy in &fixture.proxies {
                    self.contact_manager.broad_phase.touch_proxy(proxy.proxy_id);
                }
            }
        }
    }
}

impl Body {
    /// Move the center of mass, keeping the velocity of the old center
    fn apply_local_center(&mut self, local_center: Vec2) {
        let old_center = self.sweep.c;
        self.sweep.local_center = local_center;
        self.sweep.c = self.xf.mul_vec(local_center);
        self.sweep.c0 = self.sweep.c;
        self.linear_velocity += Vec2::scalar_cross(self.angular_velocity, self.sweep.c - old_center);
    }
}
