//! Joint System for Rigid Body Connections
//!
//! Impulse-based joint constraints solved alongside contacts in each island.
//!
//! # Joint Types
//!
//! - **Distance**: keeps two anchors at a fixed length, optionally soft
//!   (spring frequency and damping ratio)
//! - **Revolute**: shared anchor point with optional angle limits and motor
//! - **Mouse**: soft spring dragging one body toward a world target
//! - **Prismatic**, **Weld**, **Rope**, **Wheel**, **Pulley**, **Friction**,
//!   **Motor**, **Gear**: see [`joint_extra`](crate::joint_extra)
//!
//! Joints are created through [`World::create_joint`] and live in the world's
//! joint arena. Both bodies keep a [`JointEdge`](crate::body::JointEdge)
//! pointing at the joint.

use log::debug;

use crate::arena::{BodyId, JointId};
use crate::body::{Body, JointEdge};
use crate::error::PhysicsError;
use crate::island::SolverData;
use crate::joint_extra::{
    FrictionJoint, FrictionJointDef, GearJoint, GearJointDef, MotorJoint, MotorJointDef,
    PrismaticJoint, PrismaticJointDef, PulleyJoint, PulleyJointDef, RopeJoint, RopeJointDef,
    WeldJoint, WeldJointDef, WheelJoint, WheelJointDef,
};
use crate::math::{clamp, Mat22, Mat33, Rot, Vec2, Vec3, PI};
use crate::settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_ANGULAR_CORRECTION, MAX_LINEAR_CORRECTION};
use crate::world::World;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Joint type enumeration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointType {
    Distance,
    Revolute,
    Prismatic,
    Weld,
    Rope,
    Mouse,
    Wheel,
    Pulley,
    Friction,
    Motor,
    Gear,
}

/// State of a one-sided or two-sided limit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimitState {
    #[default]
    Inactive,
    AtLower,
    AtUpper,
    Equal,
}

// ============================================================================
// Definitions
// ============================================================================

/// Joint definition passed to [`World::create_joint`]
#[derive(Clone, Debug)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Prismatic(PrismaticJointDef),
    Weld(WeldJointDef),
    Rope(RopeJointDef),
    Mouse(MouseJointDef),
    Wheel(WheelJointDef),
    Pulley(PulleyJointDef),
    Friction(FrictionJointDef),
    Motor(MotorJointDef),
    Gear(GearJointDef),
}

impl JointDef {
    /// `(body_a, body_b, collide_connected, user_data)`
    fn common(&self) -> (BodyId, BodyId, bool, u64) {
        match self {
            Self::Distance(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Revolute(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Prismatic(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Weld(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Rope(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Mouse(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Wheel(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Pulley(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Friction(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Motor(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
            Self::Gear(d) => (d.body_a, d.body_b, d.collide_connected, d.user_data),
        }
    }
}

macro_rules! impl_into_joint_def {
    ($($def:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$def> for JointDef {
                fn from(def: $def) -> Self {
                    Self::$variant(def)
                }
            }
        )*
    };
}

impl_into_joint_def!(
    DistanceJointDef => Distance,
    RevoluteJointDef => Revolute,
    PrismaticJointDef => Prismatic,
    WeldJointDef => Weld,
    RopeJointDef => Rope,
    MouseJointDef => Mouse,
    WheelJointDef => Wheel,
    PulleyJointDef => Pulley,
    FrictionJointDef => Friction,
    MotorJointDef => Motor,
    GearJointDef => Gear,
);

/// Distance joint definition
#[derive(Clone, Debug)]
pub struct DistanceJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    /// Anchor relative to body A's origin
    pub local_anchor_a: Vec2,
    /// Anchor relative to body B's origin
    pub local_anchor_b: Vec2,
    /// Rest length
    pub length: f32,
    /// Spring frequency in Hz (0 = rigid)
    pub frequency_hz: f32,
    /// 0 = no damping, 1 = critical
    pub damping_ratio: f32,
}

impl DistanceJointDef {
    /// Rigid distance joint of length 1 between the body origins
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            length: 1.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    /// Anchors given in world space; the rest length is their current distance
    pub fn initialize(
        world: &World,
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Vec2,
        anchor_b: Vec2,
    ) -> Result<Self, PhysicsError> {
        let a = world.body_ref(body_a)?;
        let b = world.body_ref(body_b)?;
        Ok(Self {
            local_anchor_a: a.local_point(anchor_a),
            local_anchor_b: b.local_point(anchor_b),
            length: (anchor_b - anchor_a).length(),
            ..Self::new(body_a, body_b)
        })
    }

    /// Make the joint soft
    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

/// Revolute joint definition
#[derive(Clone, Debug)]
pub struct RevoluteJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Body B angle minus body A angle in the reference state
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,
    pub enable_motor: bool,
    /// Target relative angular speed (rad/s)
    pub motor_speed: f32,
    /// Maximum motor torque (N·m)
    pub max_motor_torque: f32,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
        }
    }

    /// Shared world anchor; the reference angle is the current relative angle
    pub fn initialize(world: &World, body_a: BodyId, body_b: BodyId, anchor: Vec2) -> Result<Self, PhysicsError> {
        let a = world.body_ref(body_a)?;
        let b = world.body_ref(body_b)?;
        Ok(Self {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            reference_angle: b.angle() - a.angle(),
            ..Self::new(body_a, body_b)
        })
    }

    pub fn with_limit(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }
}

/// Mouse joint definition. Body A is ignored by the solver but must exist;
/// usually a static ground body.
#[derive(Clone, Debug)]
pub struct MouseJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    /// Initial world target; also fixes the anchor on body B
    pub target: Vec2,
    /// Maximum constraint force, usually a multiple of the body weight
    pub max_force: f32,
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl MouseJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, target: Vec2, max_force: f32) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            target,
            max_force,
            frequency_hz: 5.0,
            damping_ratio: 0.7,
        }
    }
}

// ============================================================================
// Joint
// ============================================================================

/// Island-local view of one joint body
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SolverBody {
    pub index: usize,
    pub local_center: Vec2,
    pub inv_mass: f32,
    pub inv_i: f32,
}

impl SolverBody {
    pub fn new(body: &Body) -> Self {
        Self {
            index: body.island_index,
            local_center: body.sweep.local_center,
            inv_mass: body.inv_mass,
            inv_i: body.inv_inertia,
        }
    }
}

/// Type-specific joint state
#[derive(Clone, Debug)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Prismatic(PrismaticJoint),
    Weld(WeldJoint),
    Rope(RopeJoint),
    Mouse(MouseJoint),
    Wheel(WheelJoint),
    Pulley(PulleyJoint),
    Friction(FrictionJoint),
    Motor(MotorJoint),
    Gear(GearJoint),
}

/// A constraint between two bodies
#[derive(Clone, Debug)]
pub struct Joint {
    pub(crate) body_a: BodyId,
    pub(crate) body_b: BodyId,
    pub(crate) collide_connected: bool,
    pub(crate) island: bool,
    pub(crate) user_data: u64,
    pub(crate) solver_a: SolverBody,
    pub(crate) solver_b: SolverBody,
    pub(crate) kind: JointKind,
}

impl Joint {
    #[inline]
    pub fn joint_type(&self) -> JointType {
        match self.kind {
            JointKind::Distance(_) => JointType::Distance,
            JointKind::Revolute(_) => JointType::Revolute,
            JointKind::Prismatic(_) => JointType::Prismatic,
            JointKind::Weld(_) => JointType::Weld,
            JointKind::Rope(_) => JointType::Rope,
            JointKind::Mouse(_) => JointType::Mouse,
            JointKind::Wheel(_) => JointType::Wheel,
            JointKind::Pulley(_) => JointType::Pulley,
            JointKind::Friction(_) => JointType::Friction,
            JointKind::Motor(_) => JointType::Motor,
            JointKind::Gear(_) => JointType::Gear,
        }
    }

    #[inline]
    pub fn bodies(&self) -> (BodyId, BodyId) {
        (self.body_a, self.body_b)
    }

    #[inline]
    pub fn body_a(&self) -> BodyId {
        self.body_a
    }

    #[inline]
    pub fn body_b(&self) -> BodyId {
        self.body_b
    }

    /// Contacts between the two bodies are allowed
    #[inline]
    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    #[inline]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, data: u64) {
        self.user_data = data;
    }

    /// Type-specific state
    #[inline]
    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    /// Type-specific state, for tuning motors, limits and targets
    #[inline]
    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// Reaction force on body B at the anchor, in newtons
    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        match &self.kind {
            JointKind::Distance(j) => j.u * (inv_dt * j.impulse),
            JointKind::Revolute(j) => Vec2::new(j.impulse.x, j.impulse.y) * inv_dt,
            JointKind::Prismatic(j) => j.reaction_force(inv_dt),
            JointKind::Weld(j) => Vec2::new(j.impulse.x, j.impulse.y) * inv_dt,
            JointKind::Rope(j) => j.reaction_force(inv_dt),
            JointKind::Mouse(j) => j.impulse * inv_dt,
            JointKind::Wheel(j) => j.reaction_force(inv_dt),
            JointKind::Pulley(j) => j.reaction_force(inv_dt),
            JointKind::Friction(j) => j.linear_impulse * inv_dt,
            JointKind::Motor(j) => j.linear_impulse * inv_dt,
            JointKind::Gear(j) => j.reaction_force(inv_dt),
        }
    }

    /// Reaction torque on body B, in N·m
    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        match &self.kind {
            JointKind::Revolute(j) => inv_dt * j.impulse.z,
            JointKind::Prismatic(j) => inv_dt * j.impulse.y,
            JointKind::Weld(j) => inv_dt * j.impulse.z,
            JointKind::Wheel(j) => inv_dt * j.motor_impulse,
            JointKind::Friction(j) => inv_dt * j.angular_impulse,
            JointKind::Motor(j) => inv_dt * j.angular_impulse,
            JointKind::Gear(j) => j.reaction_torque(inv_dt),
            JointKind::Distance(_) | JointKind::Rope(_) | JointKind::Mouse(_) | JointKind::Pulley(_) => 0.0,
        }
    }

    /// Capture island indices and mass properties of both bodies
    pub(crate) fn prepare(&mut self, body_a: &Body, body_b: &Body) {
        self.solver_a = SolverBody::new(body_a);
        self.solver_b = SolverBody::new(body_b);
        if let JointKind::Gear(j) = &mut self.kind {
            j.deactivate();
        }
    }

    /// Ground bodies of the joints a gear couples. They carry no joint edge
    /// to this joint but are solved with it.
    pub(crate) fn coupled_bodies(&self) -> Option<(BodyId, BodyId)> {
        match &self.kind {
            JointKind::Gear(j) => Some((j.body_c, j.body_d)),
            _ => None,
        }
    }

    pub(crate) fn prepare_coupled(&mut self, body_c: &Body, body_d: &Body) {
        if let JointKind::Gear(j) = &mut self.kind {
            j.prepare(body_c, body_d);
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (a, b) = (self.solver_a, self.solver_b);
        match &mut self.kind {
            JointKind::Distance(j) => j.init_velocity_constraints(&a, &b, data),
            JointKind::Revolute(j) => j.init_velocity_constraints(&a, &b, data),
            JointKind::Prismatic(j) => j.init_velocity_constraints(&a, &b, data),
            JointKind::Weld(j) => j.init_velocity_constraints(&a, &b, data),
            JointKind::Rope(j) => j.init_velocity_constraints(&a, &b, data),
            JointKind::Mouse(j) => j.init_velocity_constraints(&b, data),
            JointKind::Wheel(j) => j.init_velocity_constraints(&a, &b, data),
            JointKind::Pulley(j) => j.init_velocity_constraints(&a, &b, data),
            JointKind::Friction(j) => j.init_velocity_constraints(&a, &b, data),
            JointKind::Motor(j) => j.init_velocity_constraints(&a, &b, data),
            JointKind::Gear(j) => j.init_velocity_constraints(&a, &b, data),
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (a, b) = (self.solver_a, self.solver_b);
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_velocity_constraints(&a, &b, data),
            JointKind::Revolute(j) => j.solve_velocity_constraints(&a, &b, data),
            JointKind::Prismatic(j) => j.solve_velocity_constraints(&a, &b, data),
            JointKind::Weld(j) => j.solve_velocity_constraints(&a, &b, data),
            JointKind::Rope(j) => j.solve_velocity_constraints(&a, &b, data),
            JointKind::Mouse(j) => j.solve_velocity_constraints(&b, data),
            JointKind::Wheel(j) => j.solve_velocity_constraints(&a, &b, data),
            JointKind::Pulley(j) => j.solve_velocity_constraints(&a, &b, data),
            JointKind::Friction(j) => j.solve_velocity_constraints(&a, &b, data),
            JointKind::Motor(j) => j.solve_velocity_constraints(&a, &b, data),
            JointKind::Gear(j) => j.solve_velocity_constraints(&a, &b, data),
        }
    }

    /// Returns true when the position error is within tolerance
    pub(crate) fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (a, b) = (self.solver_a, self.solver_b);
        match &mut self.kind {
            JointKind::Distance(j) => j.solve_position_constraints(&a, &b, data),
            JointKind::Revolute(j) => j.solve_position_constraints(&a, &b, data),
            JointKind::Prismatic(j) => j.solve_position_constraints(&a, &b, data),
            JointKind::Weld(j) => j.solve_position_constraints(&a, &b, data),
            JointKind::Rope(j) => j.solve_position_constraints(&a, &b, data),
            JointKind::Wheel(j) => j.solve_position_constraints(&a, &b, data),
            JointKind::Pulley(j) => j.solve_position_constraints(&a, &b, data),
            JointKind::Gear(j) => j.solve_position_constraints(&a, &b, data),
            JointKind::Mouse(_) | JointKind::Friction(_) | JointKind::Motor(_) => true,
        }
    }

    /// World anchors given both bodies
    fn anchors(&self, body_a: &Body, body_b: &Body) -> (Vec2, Vec2) {
        match &self.kind {
            JointKind::Distance(j) => (body_a.world_point(j.local_anchor_a), body_b.world_point(j.local_anchor_b)),
            JointKind::Revolute(j) => (body_a.world_point(j.local_anchor_a), body_b.world_point(j.local_anchor_b)),
            JointKind::Prismatic(j) => (body_a.world_point(j.local_anchor_a), body_b.world_point(j.local_anchor_b)),
            JointKind::Weld(j) => (body_a.world_point(j.local_anchor_a), body_b.world_point(j.local_anchor_b)),
            JointKind::Rope(j) => (body_a.world_point(j.local_anchor_a), body_b.world_point(j.local_anchor_b)),
            JointKind::Mouse(j) => (j.target, body_b.world_point(j.local_anchor_b)),
            JointKind::Wheel(j) => (body_a.world_point(j.local_anchor_a), body_b.world_point(j.local_anchor_b)),
            JointKind::Pulley(j) => (body_a.world_point(j.local_anchor_a), body_b.world_point(j.local_anchor_b)),
            JointKind::Friction(j) => (body_a.world_point(j.local_anchor_a), body_b.world_point(j.local_anchor_b)),
            JointKind::Motor(_) => (body_a.position(), body_b.position()),
            JointKind::Gear(j) => (body_a.world_point(j.local_anchor_a()), body_b.world_point(j.local_anchor_b())),
        }
    }

    /// Only world-space state needs to move with the origin
    pub(crate) fn shift_origin(&mut self, new_origin: Vec2) {
        match &mut self.kind {
            JointKind::Mouse(j) => j.target -= new_origin,
            JointKind::Pulley(j) => j.shift_origin(new_origin),
            _ => {}
        }
    }
}

// ============================================================================
// Solver helpers
// ============================================================================

#[inline]
pub(crate) fn load_position(data: &SolverData<'_>, body: &SolverBody) -> (Vec2, f32) {
    let p = data.positions[body.index];
    (p.c, p.a)
}

#[inline]
pub(crate) fn load_velocity(data: &SolverData<'_>, body: &SolverBody) -> (Vec2, f32) {
    let v = data.velocities[body.index];
    (v.v, v.w)
}

#[inline]
pub(crate) fn store_position(data: &mut SolverData<'_>, body: &SolverBody, c: Vec2, a: f32) {
    data.positions[body.index].c = c;
    data.positions[body.index].a = a;
}

#[inline]
pub(crate) fn store_velocity(data: &mut SolverData<'_>, body: &SolverBody, v: Vec2, w: f32) {
    data.velocities[body.index].v = v;
    data.velocities[body.index].w = w;
}

/// Soft constraint coefficients `(gamma, bias_factor)` for a spring of the
/// given effective mass. Zero gamma means rigid.
pub(crate) fn spring_coefficients(mass: f32, frequency_hz: f32, damping_ratio: f32, h: f32) -> (f32, f32) {
    let omega = 2.0 * PI * frequency_hz;
    let d = 2.0 * mass * damping_ratio * omega;
    let k = mass * omega * omega;
    let mut gamma = h * (d + h * k);
    if gamma != 0.0 {
        gamma = 1.0 / gamma;
    }
    (gamma, h * k * gamma)
}

/// Point-to-point mass matrix with the angular row, shared by revolute
/// and weld joints
pub(crate) fn point_angle_mass(r_a: Vec2, r_b: Vec2, a: &SolverBody, b: &SolverBody) -> Mat33 {
    let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
    let ex_x = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
    let ey_x = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
    let ez_x = -r_a.y * i_a - r_b.y * i_b;
    let ey_y = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
    let ez_y = r_a.x * i_a + r_b.x * i_b;
    Mat33::new(
        Vec3::new(ex_x, ey_x, ez_x),
        Vec3::new(ey_x, ey_y, ez_y),
        Vec3::new(ez_x, ez_y, i_a + i_b),
    )
}

// ============================================================================
// Distance joint
// ============================================================================

/// Keeps the anchors at a fixed distance
#[derive(Clone, Debug, Default)]
pub struct DistanceJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) length: f32,
    pub(crate) frequency_hz: f32,
    pub(crate) damping_ratio: f32,
    pub(crate) impulse: f32,
    gamma: f32,
    bias: f32,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl DistanceJoint {
    fn new(def: &DistanceJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            ..Self::default()
        }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length;
    }

    pub fn set_spring(&mut self, frequency_hz: f32, damping_ratio: f32) {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
    }

    fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (c_a, a_a) = load_position(data, a);
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (c_b, a_b) = load_position(data, b);
        let (mut v_b, mut w_b) = load_velocity(data, b);

        let (q_a, q_b) = (Rot::new(a_a), Rot::new(a_b));
        self.r_a = q_a.mul_vec(self.local_anchor_a - a.local_center);
        self.r_b = q_b.mul_vec(self.local_anchor_b - b.local_center);
        self.u = c_b + self.r_b - c_a - self.r_a;

        // Handle singularity
        let length = self.u.length();
        if length > LINEAR_SLOP {
            self.u *= 1.0 / length;
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_au = self.r_a.cross(self.u);
        let cr_bu = self.r_b.cross(self.u);
        let mut inv_mass = a.inv_mass + a.inv_i * cr_au * cr_au + b.inv_mass + b.inv_i * cr_bu * cr_bu;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.frequency_hz > 0.0 {
            let c = length - self.length;
            let (gamma, bias_factor) =
                spring_coefficients(self.mass, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;

            inv_mass += self.gamma;
            self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            // Scale the impulse to support a variable time step
            self.impulse *= data.step.dt_ratio;
            let p = self.u * self.impulse;
            v_a -= p * a.inv_mass;
            w_a -= a.inv_i * self.r_a.cross(p);
            v_b += p * b.inv_mass;
            w_b += b.inv_i * self.r_b.cross(p);
        } else {
            self.impulse = 0.0;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);

        // Cdot = dot(u, v + cross(w, r))
        let vp_a = v_a + Vec2::scalar_cross(w_a, self.r_a);
        let vp_b = v_b + Vec2::scalar_cross(w_b, self.r_b);
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = self.u * impulse;
        v_a -= p * a.inv_mass;
        w_a -= a.inv_i * self.r_a.cross(p);
        v_b += p * b.inv_mass;
        w_b += b.inv_i * self.r_b.cross(p);

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) -> bool {
        if self.frequency_hz > 0.0 {
            // There is no position correction for soft distance constraints
            return true;
        }

        let (mut c_a, mut a_a) = load_position(data, a);
        let (mut c_b, mut a_b) = load_position(data, b);

        let r_a = Rot::new(a_a).mul_vec(self.local_anchor_a - a.local_center);
        let r_b = Rot::new(a_b).mul_vec(self.local_anchor_b - b.local_center);
        let mut u = c_b + r_b - c_a - r_a;

        let length = u.normalize();
        let c = clamp(length - self.length, -MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = u * impulse;

        c_a -= p * a.inv_mass;
        a_a -= a.inv_i * r_a.cross(p);
        c_b += p * b.inv_mass;
        a_b += b.inv_i * r_b.cross(p);

        store_position(data, a, c_a, a_a);
        store_position(data, b, c_b, a_b);

        crate::math::abs(c) < LINEAR_SLOP
    }
}

// ============================================================================
// Revolute joint
// ============================================================================

/// Shared anchor point with optional angle limits and motor
#[derive(Clone, Debug, Default)]
pub struct RevoluteJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f32,
    pub(crate) impulse: Vec3,
    pub(crate) motor_impulse: f32,
    pub(crate) enable_limit: bool,
    pub(crate) lower_angle: f32,
    pub(crate) upper_angle: f32,
    pub(crate) enable_motor: bool,
    pub(crate) motor_speed: f32,
    pub(crate) max_motor_torque: f32,
    pub(crate) limit_state: LimitState,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat33,
    motor_mass: f32,
}

impl RevoluteJoint {
    fn new(def: &RevoluteJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            ..Self::default()
        }
    }

    /// Current relative angle minus the reference angle
    pub fn joint_angle(&self, body_a: &Body, body_b: &Body) -> f32 {
        body_b.sweep.a - body_a.sweep.a - self.reference_angle
    }

    /// Current relative angular speed
    pub fn joint_speed(&self, body_a: &Body, body_b: &Body) -> f32 {
        body_b.angular_velocity - body_a.angular_velocity
    }

    pub fn enable_limit(&mut self, flag: bool) {
        if flag != self.enable_limit {
            self.enable_limit = flag;
            self.impulse.z = 0.0;
        }
    }

    pub fn set_limits(&mut self, lower: f32, upper: f32) {
        if lower != self.lower_angle || upper != self.upper_angle {
            self.impulse.z = 0.0;
            self.lower_angle = lower;
            self.upper_angle = upper;
        }
    }

    #[inline]
    pub fn limits(&self) -> (f32, f32) {
        (self.lower_angle, self.upper_angle)
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    pub fn set_max_motor_torque(&mut self, torque: f32) {
        self.max_motor_torque = torque;
    }

    /// Motor torque applied during the last step
    pub fn motor_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
    }

    fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (_, a_a) = load_position(data, a);
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (_, a_b) = load_position(data, b);
        let (mut v_b, mut w_b) = load_velocity(data, b);

        let (q_a, q_b) = (Rot::new(a_a), Rot::new(a_b));
        self.r_a = q_a.mul_vec(self.local_anchor_a - a.local_center);
        self.r_b = q_b.mul_vec(self.local_anchor_b - b.local_center);

        // J = [-I -r1_skew I r2_skew]
        //     [ 0       -1 0       1]
        let (i_a, i_b) = (a.inv_i, b.inv_i);
        let fixed_rotation = i_a + i_b == 0.0;

        self.mass = point_angle_mass(self.r_a, self.r_b, a, b);

        self.motor_mass = i_a + i_b;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if self.enable_limit && !fixed_rotation {
            let joint_angle = a_b - a_a - self.reference_angle;
            if crate::math::abs(self.upper_angle - self.lower_angle) < 2.0 * ANGULAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if joint_angle <= self.lower_angle {
                if self.limit_state != LimitState::AtLower {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtLower;
            } else if joint_angle >= self.upper_angle {
                if self.limit_state != LimitState::AtUpper {
                    self.impulse.z = 0.0;
                }
                self.limit_state = LimitState::AtUpper;
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.impulse = self.impulse * data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = Vec2::new(self.impulse.x, self.impulse.y);
            v_a -= p * a.inv_mass;
            w_a -= i_a * (self.r_a.cross(p) + self.motor_impulse + self.impulse.z);
            v_b += p * b.inv_mass;
            w_b += i_b * (self.r_b.cross(p) + self.motor_impulse + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let fixed_rotation = i_a + i_b == 0.0;

        // Solve motor constraint
        if self.enable_motor && self.limit_state != LimitState::Equal && !fixed_rotation {
            let cdot = w_b - w_a - self.motor_speed;
            let mut impulse = -self.motor_mass * cdot;
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = clamp(self.motor_impulse + impulse, -max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Solve limit constraint
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let cdot1 = v_b + Vec2::scalar_cross(w_b, self.r_b) - v_a - Vec2::scalar_cross(w_a, self.r_a);
            let cdot2 = w_b - w_a;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let mut impulse = -self.mass.solve33(cdot);

            match self.limit_state {
                LimitState::Equal => self.impulse += impulse,
                LimitState::AtLower | LimitState::AtUpper => {
                    let new_impulse = self.impulse.z + impulse.z;
                    let clamped = if self.limit_state == LimitState::AtLower {
                        new_impulse < 0.0
                    } else {
                        new_impulse > 0.0
                    };
                    if clamped {
                        let rhs = -cdot1 + Vec2::new(self.mass.ez.x, self.mass.ez.y) * self.impulse.z;
                        let reduced = self.mass.solve22(rhs);
                        impulse.x = reduced.x;
                        impulse.y = reduced.y;
                        impulse.z = -self.impulse.z;
                        self.impulse.x += reduced.x;
                        self.impulse.y += reduced.y;
                        self.impulse.z = 0.0;
                    } else {
                        self.impulse += impulse;
                    }
                }
                LimitState::Inactive => {}
            }

            let p = Vec2::new(impulse.x, impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (self.r_a.cross(p) + impulse.z);
            v_b += p * m_b;
            w_b += i_b * (self.r_b.cross(p) + impulse.z);
        } else {
            // Solve point to point constraint
            let cdot = v_b + Vec2::scalar_cross(w_b, self.r_b) - v_a - Vec2::scalar_cross(w_a, self.r_a);
            let impulse = self.mass.solve22(-cdot);

            self.impulse.x += impulse.x;
            self.impulse.y += impulse.y;

            v_a -= impulse * m_a;
            w_a -= i_a * self.r_a.cross(impulse);
            v_b += impulse * m_b;
            w_b += i_b * self.r_b.cross(impulse);
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) -> bool {
        let (mut c_a, mut a_a) = load_position(data, a);
        let (mut c_b, mut a_b) = load_position(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let mut angular_error = 0.0;
        let fixed_rotation = i_a + i_b == 0.0;

        // Solve angular limit constraint
        if self.enable_limit && self.limit_state != LimitState::Inactive && !fixed_rotation {
            let angle = a_b - a_a - self.reference_angle;
            let limit_impulse = match self.limit_state {
                LimitState::Equal => {
                    // Prevent large angular corrections
                    let c = clamp(angle - self.lower_angle, -MAX_ANGULAR_CORRECTION, MAX_ANGULAR_CORRECTION);
                    angular_error = crate::math::abs(c);
                    -self.motor_mass * c
                }
                LimitState::AtLower => {
                    let c = angle - self.lower_angle;
                    angular_error = -c;
                    // Prevent large angular corrections and allow some slop
                    let c = clamp(c + ANGULAR_SLOP, -MAX_ANGULAR_CORRECTION, 0.0);
                    -self.motor_mass * c
                }
                LimitState::AtUpper => {
                    let c = angle - self.upper_angle;
                    angular_error = c;
                    let c = clamp(c - ANGULAR_SLOP, 0.0, MAX_ANGULAR_CORRECTION);
                    -self.motor_mass * c
                }
                LimitState::Inactive => 0.0,
            };

            a_a -= i_a * limit_impulse;
            a_b += i_b * limit_impulse;
        }

        // Solve point to point constraint
        let (q_a, q_b) = (Rot::new(a_a), Rot::new(a_b));
        let r_a = q_a.mul_vec(self.local_anchor_a - a.local_center);
        let r_b = q_b.mul_vec(self.local_anchor_b - b.local_center);

        let c = c_b + r_b - c_a - r_a;
        let position_error = c.length();

        let k = Mat22::new(
            Vec2::new(
                m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y,
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
            ),
            Vec2::new(
                -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y,
                m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x,
            ),
        );

        let impulse = -k.solve(c);

        c_a -= impulse * m_a;
        a_a -= i_a * r_a.cross(impulse);
        c_b += impulse * m_b;
        a_b += i_b * r_b.cross(impulse);

        store_position(data, a, c_a, a_a);
        store_position(data, b, c_b, a_b);

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}

// ============================================================================
// Mouse joint
// ============================================================================

/// Soft spring pulling an anchor on body B toward a world target
#[derive(Clone, Debug, Default)]
pub struct MouseJoint {
    pub(crate) local_anchor_b: Vec2,
    pub(crate) target: Vec2,
    pub(crate) frequency_hz: f32,
    pub(crate) damping_ratio: f32,
    pub(crate) max_force: f32,
    pub(crate) impulse: Vec2,
    beta: f32,
    gamma: f32,
    r_b: Vec2,
    mass: Mat22,
    c: Vec2,
}

impl MouseJoint {
    fn new(def: &MouseJointDef, body_b: &Body) -> Self {
        Self {
            local_anchor_b: body_b.local_point(def.target),
            target: def.target,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            max_force: def.max_force,
            ..Self::default()
        }
    }

    #[inline]
    pub fn target(&self) -> Vec2 {
        self.target
    }

    /// Move the target. Use [`World::joint_mut`] so body B wakes up.
    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = force;
    }

    fn init_velocity_constraints(&mut self, b: &SolverBody, data: &mut SolverData<'_>) {
        let (c_b, a_b) = load_position(data, b);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let q_b = Rot::new(a_b);

        let mass = if b.inv_mass > 0.0 { 1.0 / b.inv_mass } else { 0.0 };
        let (gamma, beta) = spring_coefficients(mass, self.frequency_hz, self.damping_ratio, data.step.dt);
        self.gamma = gamma;
        self.beta = beta;

        // Compute the effective mass matrix
        self.r_b = q_b.mul_vec(self.local_anchor_b - b.local_center);

        // K = [(1/m1 + 1/m2) * eye(2) - skew(r1) * invI1 * skew(r1) - skew(r2) * invI2 * skew(r2)]
        let (m_b, i_b, r_b) = (b.inv_mass, b.inv_i, self.r_b);
        let k = Mat22::new(
            Vec2::new(m_b + i_b * r_b.y * r_b.y + self.gamma, -i_b * r_b.x * r_b.y),
            Vec2::new(-i_b * r_b.x * r_b.y, m_b + i_b * r_b.x * r_b.x + self.gamma),
        );
        self.mass = k.inverse();

        self.c = (c_b + self.r_b - self.target) * self.beta;

        // Cheat with some damping
        w_b *= 0.98;

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            v_b += self.impulse * m_b;
            w_b += i_b * self.r_b.cross(self.impulse);
        } else {
            self.impulse = Vec2::ZERO;
        }

        store_velocity(data, b, v_b, w_b);
    }

    fn solve_velocity_constraints(&mut self, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_b, mut w_b) = load_velocity(data, b);

        // Cdot = v + cross(w, r)
        let cdot = v_b + Vec2::scalar_cross(w_b, self.r_b);
        let mut impulse = self.mass.mul_vec(-(cdot + self.c + self.impulse * self.gamma));

        let old_impulse = self.impulse;
        self.impulse += impulse;
        let max_impulse = data.step.dt * self.max_force;
        if self.impulse.length_squared() > max_impulse * max_impulse {
            self.impulse *= max_impulse / self.impulse.length();
        }
        impulse = self.impulse - old_impulse;

        v_b += impulse * b.inv_mass;
        w_b += b.inv_i * self.r_b.cross(impulse);

        store_velocity(data, b, v_b, w_b);
    }
}

// ============================================================================
// World operations
// ============================================================================

impl World {
    /// Create a joint between two existing bodies.
    ///
    /// Unless `collide_connected` is set, contacts between the bodies are
    /// flagged for filtering and go away on the next collide pass.
    pub fn create_joint(&mut self, def: impl Into<JointDef>) -> Result<JointId, PhysicsError> {
        self.check_unlocked("create_joint")?;
        let def = def.into();
        let (body_a, body_b, collide_connected, user_data) = def.common();
        if body_a == body_b {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "joint bodies must differ",
            });
        }
        self.body_ref(body_a)?;
        let b = self.body_ref(body_b)?;

        let kind = match &def {
            JointDef::Distance(d) => JointKind::Distance(DistanceJoint::new(d)),
            JointDef::Revolute(d) => JointKind::Revolute(RevoluteJoint::new(d)),
            JointDef::Prismatic(d) => JointKind::Prismatic(PrismaticJoint::new(d)),
            JointDef::Weld(d) => JointKind::Weld(WeldJoint::new(d)),
            JointDef::Rope(d) => JointKind::Rope(RopeJoint::new(d)),
            JointDef::Mouse(d) => JointKind::Mouse(MouseJoint::new(d, b)),
            JointDef::Wheel(d) => JointKind::Wheel(WheelJoint::new(d)),
            JointDef::Pulley(d) => JointKind::Pulley(PulleyJoint::new(d)?),
            JointDef::Friction(d) => JointKind::Friction(FrictionJoint::new(d)),
            JointDef::Motor(d) => JointKind::Motor(MotorJoint::new(d)),
            JointDef::Gear(d) => JointKind::Gear(GearJoint::new(d, self)?),
        };

        let joint = Joint {
            body_a,
            body_b,
            collide_connected,
            island: false,
            user_data,
            solver_a: SolverBody::default(),
            solver_b: SolverBody::default(),
            kind,
        };
        let joint_type = joint.joint_type();
        let id = self.joints.insert(joint);

        self.bodies[body_a].joint_edges.push(JointEdge {
            other: body_b,
            joint: id,
        });
        self.bodies[body_b].joint_edges.push(JointEdge {
            other: body_a,
            joint: id,
        });

        if !collide_connected {
            self.flag_contacts_between(body_a, body_b);
        }

        debug!("created {:?} joint {:?}", joint_type, id);
        Ok(id)
    }

    /// Destroy a joint and wake both bodies
    pub fn destroy_joint(&mut self, id: JointId) -> Result<(), PhysicsError> {
        self.check_unlocked("destroy_joint")?;
        if !self.joints.contains(id) {
            return Err(PhysicsError::InvalidHandle { kind: "joint" });
        }
        self.destroy_joint_internal(id);
        Ok(())
    }

    pub(crate) fn destroy_joint_internal(&mut self, id: JointId) {
        let Some(joint) = self.joints.remove(id) else {
            return;
        };

        for body_id in [joint.body_a, joint.body_b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.set_awake(true);
                body.joint_edges.retain(|edge| edge.joint != id);
            }
        }

        if !joint.collide_connected {
            self.flag_contacts_between(joint.body_a, joint.body_b);
        }

        debug!("destroyed joint {:?}", id);
    }

    /// Flag every contact between two bodies for filtering
    fn flag_contacts_between(&mut self, body_a: BodyId, body_b: BodyId) {
        let Some(body) = self.bodies.get(body_b) else {
            return;
        };
        let contacts: Vec<_> = body
            .contact_edges
            .iter()
            .filter(|edge| edge.other == body_a)
            .map(|edge| edge.contact)
            .collect();
        for contact in contacts {
            if let Some(c) = self.contact_manager.contacts.get_mut(contact) {
                c.flag_for_filtering();
            }
        }
    }

    #[inline]
    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id)
    }

    /// Exclusive access to a joint. Both bodies are woken so the change
    /// takes effect on the next step.
    pub fn joint_mut(&mut self, id: JointId) -> Option<&mut Joint> {
        let (body_a, body_b) = self.joints.get(id)?.bodies();
        for body_id in [body_a, body_b] {
            if let Some(body) = self.bodies.get_mut(body_id) {
                body.set_awake(true);
            }
        }
        self.joints.get_mut(id)
    }

    pub fn joints(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints.iter()
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// World-space anchors `(anchor_a, anchor_b)`
    pub fn joint_anchors(&self, id: JointId) -> Option<(Vec2, Vec2)> {
        let joint = self.joints.get(id)?;
        let body_a = self.bodies.get(joint.body_a)?;
        let body_b = self.bodies.get(joint.body_b)?;
        Some(joint.anchors(body_a, body_b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::shape::{CircleShape, PolygonShape};

    fn world() -> World {
        World::new(Vec2::new(0.0, -10.0))
    }

    fn dynamic_box(world: &mut World, position: Vec2) -> BodyId {
        let body = world.create_body(&BodyDef::dynamic(position)).unwrap();
        world
            .create_fixture_from_shape(body, PolygonShape::new_box(0.5, 0.5), 1.0)
            .unwrap();
        body
    }

    #[test]
    fn test_create_and_destroy_joint_edges() {
        let mut w = world();
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::new(0.0, 2.0));
        let joint = w
            .create_joint(DistanceJointDef::initialize(&w, ground, body, Vec2::ZERO, Vec2::new(0.0, 2.0)).unwrap())
            .unwrap();

        assert_eq!(w.joint_count(), 1);
        assert_eq!(w.body(ground).unwrap().joint_edges().len(), 1);
        assert_eq!(w.body(body).unwrap().joint_edges()[0].other, ground);
        assert_eq!(w.joint(joint).unwrap().joint_type(), JointType::Distance);

        w.body_mut(body).unwrap().set_awake(false);
        w.destroy_joint(joint).unwrap();
        assert_eq!(w.joint_count(), 0);
        assert!(w.body(ground).unwrap().joint_edges().is_empty());
        assert!(w.body(body).unwrap().joint_edges().is_empty());
        // Destroying a joint wakes its bodies
        assert!(w.body(body).unwrap().is_awake());
        assert!(w.destroy_joint(joint).is_err());
    }

    #[test]
    fn test_joint_needs_distinct_bodies() {
        let mut w = world();
        let body = dynamic_box(&mut w, Vec2::ZERO);
        let err = w.create_joint(RevoluteJointDef::new(body, body)).unwrap_err();
        assert!(matches!(err, PhysicsError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_distance_joint_holds_length() {
        let mut w = world();
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::new(3.0, 0.0));
        let def = DistanceJointDef::initialize(&w, ground, body, Vec2::ZERO, Vec2::new(3.0, 0.0)).unwrap();
        let joint = w.create_joint(def).unwrap();

        for _ in 0..60 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let (a, b) = w.joint_anchors(joint).unwrap();
        assert!(((b - a).length() - 3.0).abs() < 0.05);
        // The pendulum has swung below the pivot
        assert!(w.body(body).unwrap().position().y < 0.0);
    }

    #[test]
    fn test_revolute_joint_pins_anchor() {
        let mut w = world();
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::new(1.0, 5.0));
        let def = RevoluteJointDef::initialize(&w, ground, body, Vec2::new(0.0, 5.0)).unwrap();
        let joint = w.create_joint(def).unwrap();

        for _ in 0..60 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let (a, b) = w.joint_anchors(joint).unwrap();
        assert!((b - a).length() < 0.02);
        assert!(w.body(body).unwrap().angular_velocity().abs() > 0.0);
    }

    #[test]
    fn test_revolute_limit_and_motor() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::ZERO);
        let def = RevoluteJointDef::initialize(&w, ground, body, Vec2::ZERO)
            .unwrap()
            .with_limit(-0.25 * PI, 0.25 * PI)
            .with_motor(2.0, 1000.0);
        let joint = w.create_joint(def).unwrap();

        for _ in 0..120 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let j = w.joint(joint).unwrap();
        let JointKind::Revolute(rev) = j.kind() else {
            panic!("expected revolute joint");
        };
        let angle = rev.joint_angle(w.body(ground).unwrap(), w.body(body).unwrap());
        // The motor drives into the upper limit and stops there
        assert!((angle - 0.25 * PI).abs() < 0.05);
        assert_eq!(rev.limit_state, LimitState::AtUpper);
    }

    #[test]
    fn test_mouse_joint_drags_body() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = w.create_body(&BodyDef::dynamic(Vec2::ZERO)).unwrap();
        w.create_fixture_from_shape(body, CircleShape::new(0.5), 1.0).unwrap();
        let mass = w.body(body).unwrap().mass();
        let joint = w
            .create_joint(MouseJointDef::new(ground, body, Vec2::ZERO, 1000.0 * mass))
            .unwrap();

        if let Some(JointKind::Mouse(m)) = w.joint_mut(joint).map(|j| j.kind_mut()) {
            m.set_target(Vec2::new(2.0, 0.0));
        }
        for _ in 0..180 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let p = w.body(body).unwrap().position();
        assert!((p.x - 2.0).abs() < 0.1);
        assert!(w.joint(joint).unwrap().reaction_torque(60.0) == 0.0);
    }

    #[test]
    fn test_joint_disables_collision_between_bodies() {
        let mut w = World::new(Vec2::ZERO);
        let a = dynamic_box(&mut w, Vec2::ZERO);
        let b = dynamic_box(&mut w, Vec2::new(0.5, 0.0));
        w.step(1.0 / 60.0, 8, 3);
        assert_eq!(w.contact_count(), 1);

        w.create_joint(RevoluteJointDef::initialize(&w, a, b, Vec2::new(0.25, 0.0)).unwrap())
            .unwrap();
        assert!(!w.should_collide(a, b));
        w.step(1.0 / 60.0, 8, 3);
        assert_eq!(w.contact_count(), 0);
    }

    #[test]
    fn test_spring_coefficients() {
        let (gamma, beta) = spring_coefficients(1.0, 0.0, 0.0, 1.0 / 60.0);
        assert_eq!(gamma, 0.0);
        assert_eq!(beta, 0.0);
        let (gamma, beta) = spring_coefficients(2.0, 5.0, 0.7, 1.0 / 60.0);
        assert!(gamma > 0.0);
        assert!(beta > 0.0 && beta < 60.0);
    }
}
