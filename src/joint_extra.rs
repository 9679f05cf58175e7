//! Additional Joint Types
//!
//! # Joints
//!
//! - **PrismaticJoint**: one translational DOF along an axis fixed in body A,
//!   with optional translation limits and a linear motor
//! - **WeldJoint**: glues two bodies together, rigid or soft in rotation
//! - **RopeJoint**: upper bound on the anchor distance (slack below it)
//! - **WheelJoint**: point on a line with a suspension spring and a
//!   rotational motor, for vehicles
//! - **PulleyJoint**: two ropes over fixed ground points sharing one length
//! - **FrictionJoint**: bounded relative motion damping for top-down games
//! - **MotorJoint**: drives body B toward a target offset from body A
//! - **GearJoint**: couples two revolute or prismatic joints by a ratio

use crate::arena::{BodyId, JointId};
use crate::error::PhysicsError;
use crate::island::SolverData;
use crate::joint::{
    load_position, load_velocity, point_angle_mass, spring_coefficients, store_position,
    store_velocity, JointKind, LimitState, SolverBody,
};
use crate::math::{abs, clamp, Mat22, Mat33, Rot, Vec2, Vec3, EPSILON};
use crate::settings::{ANGULAR_SLOP, LINEAR_SLOP, MAX_LINEAR_CORRECTION};
use crate::world::World;

// ============================================================================
// Prismatic Joint
// ============================================================================

/// Prismatic joint definition
#[derive(Clone, Debug)]
pub struct PrismaticJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Translation axis in body A's frame (unit length)
    pub local_axis_a: Vec2,
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_translation: f32,
    pub upper_translation: f32,
    pub enable_motor: bool,
    pub max_motor_force: f32,
    /// Target translation speed (m/s)
    pub motor_speed: f32,
}

impl PrismaticJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis_a: Vec2::UNIT_X,
            reference_angle: 0.0,
            enable_limit: false,
            lower_translation: 0.0,
            upper_translation: 0.0,
            enable_motor: false,
            max_motor_force: 0.0,
            motor_speed: 0.0,
        }
    }

    /// World anchor and world axis
    pub fn initialize(
        world: &World,
        body_a: BodyId,
        body_b: BodyId,
        anchor: Vec2,
        axis: Vec2,
    ) -> Result<Self, PhysicsError> {
        let a = world.body_ref(body_a)?;
        let b = world.body_ref(body_b)?;
        Ok(Self {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            local_axis_a: a.local_vector(axis).normalized(),
            reference_angle: b.angle() - a.angle(),
            ..Self::new(body_a, body_b)
        })
    }

    pub fn with_limit(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_translation = lower;
        self.upper_translation = upper;
        self
    }

    pub fn with_motor(mut self, speed: f32, max_force: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_force = max_force;
        self
    }
}

/// Slider constraint: body B translates along an axis fixed in body A
#[derive(Clone, Debug, Default)]
pub struct PrismaticJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) local_x_axis_a: Vec2,
    pub(crate) local_y_axis_a: Vec2,
    pub(crate) reference_angle: f32,
    pub(crate) impulse: Vec3,
    pub(crate) motor_impulse: f32,
    pub(crate) lower_translation: f32,
    pub(crate) upper_translation: f32,
    pub(crate) max_motor_force: f32,
    pub(crate) motor_speed: f32,
    pub(crate) enable_limit: bool,
    pub(crate) enable_motor: bool,
    pub(crate) limit_state: LimitState,
    axis: Vec2,
    perp: Vec2,
    s1: f32,
    s2: f32,
    a1: f32,
    a2: f32,
    k: Mat33,
    motor_mass: f32,
}

impl PrismaticJoint {
    pub(crate) fn new(def: &PrismaticJointDef) -> Self {
        let x_axis = def.local_axis_a.normalized();
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis_a: x_axis,
            local_y_axis_a: Vec2::scalar_cross(1.0, x_axis),
            reference_angle: def.reference_angle,
            lower_translation: def.lower_translation,
            upper_translation: def.upper_translation,
            max_motor_force: def.max_motor_force,
            motor_speed: def.motor_speed,
            enable_limit: def.enable_limit,
            enable_motor: def.enable_motor,
            ..Self::default()
        }
    }

    /// Current translation of anchor B along the axis, measured from anchor A
    pub fn joint_translation(&self, body_a: &crate::body::Body, body_b: &crate::body::Body) -> f32 {
        let p_a = body_a.world_point(self.local_anchor_a);
        let p_b = body_b.world_point(self.local_anchor_b);
        let axis = body_a.world_vector(self.local_x_axis_a);
        (p_b - p_a).dot(axis)
    }

    pub fn enable_limit(&mut self, flag: bool) {
        if flag != self.enable_limit {
            self.enable_limit = flag;
            self.impulse.z = 0.0;
        }
    }

    pub fn set_limits(&mut self, lower: f32, upper: f32) {
        if lower != self.lower_translation || upper != self.upper_translation {
            self.lower_translation = lower;
            self.upper_translation = upper;
            self.impulse.z = 0.0;
        }
    }

    #[inline]
    pub fn limits(&self) -> (f32, f32) {
        (self.lower_translation, self.upper_translation)
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    pub fn set_max_motor_force(&mut self, force: f32) {
        self.max_motor_force = force;
    }

    /// Motor force applied during the last step
    pub fn motor_force(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        (self.perp * self.impulse.x + self.axis * (self.motor_impulse + self.impulse.z)) * inv_dt
    }

    /// Constraint matrix for the perpendicular, angular and axial rows
    fn mass_matrix(&self, a: &SolverBody, b: &SolverBody) -> Mat33 {
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let (s1, s2, a1, a2) = (self.s1, self.s2, self.a1, self.a2);
        let k11 = m_a + m_b + i_a * s1 * s1 + i_b * s2 * s2;
        let k12 = i_a * s1 + i_b * s2;
        let k13 = i_a * s1 * a1 + i_b * s2 * a2;
        let mut k22 = i_a + i_b;
        if k22 == 0.0 {
            // For bodies with fixed rotation
            k22 = 1.0;
        }
        let k23 = i_a * a1 + i_b * a2;
        let k33 = m_a + m_b + i_a * a1 * a1 + i_b * a2 * a2;
        Mat33::new(
            Vec3::new(k11, k12, k13),
            Vec3::new(k12, k22, k23),
            Vec3::new(k13, k23, k33),
        )
    }

    /// Axis, perpendicular and lever arms from the current positions
    fn compute_axes(&mut self, a: &SolverBody, b: &SolverBody, data: &SolverData<'_>) -> Vec2 {
        let (c_a, a_a) = load_position(data, a);
        let (c_b, a_b) = load_position(data, b);
        let (q_a, q_b) = (Rot::new(a_a), Rot::new(a_b));

        let r_a = q_a.mul_vec(self.local_anchor_a - a.local_center);
        let r_b = q_b.mul_vec(self.local_anchor_b - b.local_center);
        let d = c_b - c_a + r_b - r_a;

        self.axis = q_a.mul_vec(self.local_x_axis_a);
        self.a1 = (d + r_a).cross(self.axis);
        self.a2 = r_b.cross(self.axis);

        self.perp = q_a.mul_vec(self.local_y_axis_a);
        self.s1 = (d + r_a).cross(self.perp);
        self.s2 = r_b.cross(self.perp);
        d
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let d = self.compute_axes(a, b, data);

        // Compute motor Jacobian and effective mass
        self.motor_mass = m_a + m_b + i_a * self.a1 * self.a1 + i_b * self.a2 * self.a2;
        if self.motor_mass > 0.0 {
            self.motor_mass = 1.0 / self.motor_mass;
        }

        self.k = self.mass_matrix(a, b);

        // Compute motor and limit terms
        if self.enable_limit {
            let joint_translation = self.axis.dot(d);
            if abs(self.upper_translation - self.lower_translation) < 2.0 * LINEAR_SLOP {
                self.limit_state = LimitState::Equal;
            } else if joint_translation <= self.lower_translation {
                if self.limit_state != LimitState::AtLower {
                    self.limit_state = LimitState::AtLower;
                    self.impulse.z = 0.0;
                }
            } else if joint_translation >= self.upper_translation {
                if self.limit_state != LimitState::AtUpper {
                    self.limit_state = LimitState::AtUpper;
                    self.impulse.z = 0.0;
                }
            } else {
                self.limit_state = LimitState::Inactive;
                self.impulse.z = 0.0;
            }
        } else {
            self.limit_state = LimitState::Inactive;
            self.impulse.z = 0.0;
        }

        if !self.enable_motor {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            // Account for variable time step
            self.impulse = self.impulse * data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let axial = self.motor_impulse + self.impulse.z;
            let p = self.perp * self.impulse.x + self.axis * axial;
            let l_a = self.impulse.x * self.s1 + self.impulse.y + axial * self.a1;
            let l_b = self.impulse.x * self.s2 + self.impulse.y + axial * self.a2;

            v_a -= p * m_a;
            w_a -= i_a * l_a;
            v_b += p * m_b;
            w_b += i_b * l_b;
        } else {
            self.impulse = Vec3::ZERO;
            self.motor_impulse = 0.0;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        // Solve linear motor constraint
        if self.enable_motor && self.limit_state != LimitState::Equal {
            let cdot = self.axis.dot(v_b - v_a) + self.a2 * w_b - self.a1 * w_a;
            let mut impulse = self.motor_mass * (self.motor_speed - cdot);
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_force;
            self.motor_impulse = clamp(self.motor_impulse + impulse, -max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            let p = self.axis * impulse;
            v_a -= p * m_a;
            w_a -= i_a * impulse * self.a1;
            v_b += p * m_b;
            w_b += i_b * impulse * self.a2;
        }

        let cdot1 = Vec2::new(
            self.perp.dot(v_b - v_a) + self.s2 * w_b - self.s1 * w_a,
            w_b - w_a,
        );

        let df = if self.enable_limit && self.limit_state != LimitState::Inactive {
            // Solve prismatic and limit constraint in block form
            let cdot2 = self.axis.dot(v_b - v_a) + self.a2 * w_b - self.a1 * w_a;
            let cdot = Vec3::new(cdot1.x, cdot1.y, cdot2);

            let f1 = self.impulse;
            self.impulse += self.k.solve33(-cdot);

            match self.limit_state {
                LimitState::AtLower => self.impulse.z = self.impulse.z.max(0.0),
                LimitState::AtUpper => self.impulse.z = self.impulse.z.min(0.0),
                LimitState::Equal | LimitState::Inactive => {}
            }

            // f2(1:2) = invK(1:2,1:2) * (-Cdot(1:2) - K(1:2,3) * (f2(3) - f1(3))) + f1(1:2)
            let b = -cdot1 - Vec2::new(self.k.ez.x, self.k.ez.y) * (self.impulse.z - f1.z);
            let f2r = self.k.solve22(b) + Vec2::new(f1.x, f1.y);
            self.impulse.x = f2r.x;
            self.impulse.y = f2r.y;

            self.impulse - f1
        } else {
            // Limit is inactive, just solve the prismatic constraint in block form
            let df = self.k.solve22(-cdot1);
            self.impulse.x += df.x;
            self.impulse.y += df.y;
            Vec3::new(df.x, df.y, 0.0)
        };

        let p = self.perp * df.x + self.axis * df.z;
        let l_a = df.x * self.s1 + df.y + df.z * self.a1;
        let l_b = df.x * self.s2 + df.y + df.z * self.a2;

        v_a -= p * m_a;
        w_a -= i_a * l_a;
        v_b += p * m_b;
        w_b += i_b * l_b;

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) -> bool {
        let (mut c_a, mut a_a) = load_position(data, a);
        let (mut c_b, mut a_b) = load_position(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        // Solve linear limit constraint
        let d = self.compute_axes(a, b, data);

        let c1 = Vec2::new(self.perp.dot(d), a_b - a_a - self.reference_angle);

        let mut linear_error = abs(c1.x);
        let angular_error = abs(c1.y);

        let mut active = false;
        let mut c2 = 0.0;
        if self.enable_limit {
            let translation = self.axis.dot(d);
            if abs(self.upper_translation - self.lower_translation) < 2.0 * LINEAR_SLOP {
                // Prevent large angular corrections
                c2 = clamp(translation, -MAX_LINEAR_CORRECTION, MAX_LINEAR_CORRECTION);
                linear_error = linear_error.max(abs(translation));
                active = true;
            } else if translation <= self.lower_translation {
                // Prevent large linear corrections and allow some slop
                c2 = clamp(translation - self.lower_translation + LINEAR_SLOP, -MAX_LINEAR_CORRECTION, 0.0);
                linear_error = linear_error.max(self.lower_translation - translation);
                active = true;
            } else if translation >= self.upper_translation {
                c2 = clamp(translation - self.upper_translation - LINEAR_SLOP, 0.0, MAX_LINEAR_CORRECTION);
                linear_error = linear_error.max(translation - self.upper_translation);
                active = true;
            }
        }

        let k = self.mass_matrix(a, b);
        let impulse = if active {
            k.solve33(-Vec3::new(c1.x, c1.y, c2))
        } else {
            let k2 = Mat22::new(Vec2::new(k.ex.x, k.ex.y), Vec2::new(k.ey.x, k.ey.y));
            let impulse1 = k2.solve(-c1);
            Vec3::new(impulse1.x, impulse1.y, 0.0)
        };

        let p = self.perp * impulse.x + self.axis * impulse.z;
        let l_a = impulse.x * self.s1 + impulse.y + impulse.z * self.a1;
        let l_b = impulse.x * self.s2 + impulse.y + impulse.z * self.a2;

        c_a -= p * m_a;
        a_a -= i_a * l_a;
        c_b += p * m_b;
        a_b += i_b * l_b;

        store_position(data, a, c_a, a_a);
        store_position(data, b, c_b, a_b);

        linear_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}

// ============================================================================
// Weld Joint
// ============================================================================

/// Weld joint definition
#[derive(Clone, Debug)]
pub struct WeldJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub reference_angle: f32,
    /// Angular spring frequency in Hz (0 = rigid)
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl WeldJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            reference_angle: 0.0,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
        }
    }

    /// Weld at a world anchor in the current relative pose
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

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

/// Removes all relative motion between two bodies
#[derive(Clone, Debug, Default)]
pub struct WeldJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) reference_angle: f32,
    pub(crate) frequency_hz: f32,
    pub(crate) damping_ratio: f32,
    pub(crate) impulse: Vec3,
    bias: f32,
    gamma: f32,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat33,
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            ..Self::default()
        }
    }

    pub fn set_spring(&mut self, frequency_hz: f32, damping_ratio: f32) {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (_, a_a) = load_position(data, a);
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (_, a_b) = load_position(data, b);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        self.r_a = Rot::new(a_a).mul_vec(self.local_anchor_a - a.local_center);
        self.r_b = Rot::new(a_b).mul_vec(self.local_anchor_b - b.local_center);

        let k = point_angle_mass(self.r_a, self.r_b, a, b);

        if self.frequency_hz > 0.0 {
            self.mass = k.get_inverse22();

            let mut inv_m = i_a + i_b;
            let m = if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 };

            let c = a_b - a_a - self.reference_angle;
            let (gamma, bias_factor) = spring_coefficients(m, self.frequency_hz, self.damping_ratio, data.step.dt);
            self.gamma = gamma;
            self.bias = c * bias_factor;

            inv_m += self.gamma;
            self.mass.ez.z = if inv_m != 0.0 { 1.0 / inv_m } else { 0.0 };
        } else if k.ez.z == 0.0 {
            self.mass = k.get_inverse22();
            self.gamma = 0.0;
            self.bias = 0.0;
        } else {
            self.mass = k.get_sym_inverse33();
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.impulse = self.impulse * data.step.dt_ratio;

            let p = Vec2::new(self.impulse.x, self.impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (self.r_a.cross(p) + self.impulse.z);
            v_b += p * m_b;
            w_b += i_b * (self.r_b.cross(p) + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        if self.frequency_hz > 0.0 {
            let cdot2 = w_b - w_a;
            let impulse2 = -self.mass.ez.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;

            w_a -= i_a * impulse2;
            w_b += i_b * impulse2;

            let cdot1 = v_b + Vec2::scalar_cross(w_b, self.r_b) - v_a - Vec2::scalar_cross(w_a, self.r_a);
            let impulse1 = -self.mass.mul_vec22(cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            v_a -= impulse1 * m_a;
            w_a -= i_a * self.r_a.cross(impulse1);
            v_b += impulse1 * m_b;
            w_b += i_b * self.r_b.cross(impulse1);
        } else {
            let cdot1 = v_b + Vec2::scalar_cross(w_b, self.r_b) - v_a - Vec2::scalar_cross(w_a, self.r_a);
            let cdot2 = w_b - w_a;
            let impulse = -self.mass.mul_vec(Vec3::new(cdot1.x, cdot1.y, cdot2));
            self.impulse += impulse;

            let p = Vec2::new(impulse.x, impulse.y);
            v_a -= p * m_a;
            w_a -= i_a * (self.r_a.cross(p) + impulse.z);
            v_b += p * m_b;
            w_b += i_b * (self.r_b.cross(p) + impulse.z);
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) -> bool {
        let (mut c_a, mut a_a) = load_position(data, a);
        let (mut c_b, mut a_b) = load_position(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        let r_a = Rot::new(a_a).mul_vec(self.local_anchor_a - a.local_center);
        let r_b = Rot::new(a_b).mul_vec(self.local_anchor_b - b.local_center);

        let k = point_angle_mass(r_a, r_b, a, b);
        let c1 = c_b + r_b - c_a - r_a;
        let position_error = c1.length();

        let angular_error = if self.frequency_hz > 0.0 {
            let p = -k.solve22(c1);
            c_a -= p * m_a;
            a_a -= i_a * r_a.cross(p);
            c_b += p * m_b;
            a_b += i_b * r_b.cross(p);
            0.0
        } else {
            let c2 = a_b - a_a - self.reference_angle;
            let impulse = if k.ez.z > 0.0 {
                -k.solve33(Vec3::new(c1.x, c1.y, c2))
            } else {
                let impulse2 = -k.solve22(c1);
                Vec3::new(impulse2.x, impulse2.y, 0.0)
            };

            let p = Vec2::new(impulse.x, impulse.y);
            c_a -= p * m_a;
            a_a -= i_a * (r_a.cross(p) + impulse.z);
            c_b += p * m_b;
            a_b += i_b * (r_b.cross(p) + impulse.z);
            abs(c2)
        };

        store_position(data, a, c_a, a_a);
        store_position(data, b, c_b, a_b);

        position_error <= LINEAR_SLOP && angular_error <= ANGULAR_SLOP
    }
}

// ============================================================================
// Rope Joint
// ============================================================================

/// Rope joint definition
#[derive(Clone, Debug)]
pub struct RopeJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Maximum anchor distance
    pub max_length: f32,
}

impl RopeJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId, max_length: f32) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_length,
        }
    }

    pub fn with_anchors(mut self, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        self.local_anchor_a = local_anchor_a;
        self.local_anchor_b = local_anchor_b;
        self
    }
}

/// Enforces a maximum distance between two anchors
#[derive(Clone, Debug, Default)]
pub struct RopeJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) max_length: f32,
    pub(crate) length: f32,
    pub(crate) impulse: f32,
    pub(crate) state: LimitState,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl RopeJoint {
    pub(crate) fn new(def: &RopeJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_length: def.max_length,
            ..Self::default()
        }
    }

    #[inline]
    pub fn max_length(&self) -> f32 {
        self.max_length
    }

    pub fn set_max_length(&mut self, length: f32) {
        self.max_length = length;
    }

    /// `AtUpper` while the rope is taut
    #[inline]
    pub fn limit_state(&self) -> LimitState {
        self.state
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.u * (inv_dt * self.impulse)
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (c_a, a_a) = load_position(data, a);
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (c_b, a_b) = load_position(data, b);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        self.r_a = Rot::new(a_a).mul_vec(self.local_anchor_a - a.local_center);
        self.r_b = Rot::new(a_b).mul_vec(self.local_anchor_b - b.local_center);
        self.u = c_b + self.r_b - c_a - self.r_a;

        self.length = self.u.length();

        let c = self.length - self.max_length;
        self.state = if c > 0.0 {
            LimitState::AtUpper
        } else {
            LimitState::Inactive
        };

        if self.length > LINEAR_SLOP {
            self.u *= 1.0 / self.length;
        } else {
            self.u = Vec2::ZERO;
            self.mass = 0.0;
            self.impulse = 0.0;
            return;
        }

        // Compute effective mass
        let cr_a = self.r_a.cross(self.u);
        let cr_b = self.r_b.cross(self.u);
        let inv_mass = m_a + i_a * cr_a * cr_a + m_b + i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if data.step.warm_starting {
            // Scale the impulse to support a variable time step
            self.impulse *= data.step.dt_ratio;

            let p = self.u * self.impulse;
            v_a -= p * m_a;
            w_a -= i_a * self.r_a.cross(p);
            v_b += p * m_b;
            w_b += i_b * self.r_b.cross(p);
        } else {
            self.impulse = 0.0;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);

        // Cdot = dot(u, v + cross(w, r))
        let vp_a = v_a + Vec2::scalar_cross(w_a, self.r_a);
        let vp_b = v_b + Vec2::scalar_cross(w_b, self.r_b);
        let c = self.length - self.max_length;
        let mut cdot = self.u.dot(vp_b - vp_a);

        // Predictive constraint
        if c < 0.0 {
            cdot += data.step.inv_dt * c;
        }

        let mut impulse = -self.mass * cdot;
        let old_impulse = self.impulse;
        self.impulse = (self.impulse + impulse).min(0.0);
        impulse = self.impulse - old_impulse;

        let p = self.u * impulse;
        v_a -= p * a.inv_mass;
        w_a -= a.inv_i * self.r_a.cross(p);
        v_b += p * b.inv_mass;
        w_b += b.inv_i * self.r_b.cross(p);

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) -> bool {
        let (mut c_a, mut a_a) = load_position(data, a);
        let (mut c_b, mut a_b) = load_position(data, b);

        let r_a = Rot::new(a_a).mul_vec(self.local_anchor_a - a.local_center);
        let r_b = Rot::new(a_b).mul_vec(self.local_anchor_b - b.local_center);
        let mut u = c_b + r_b - c_a - r_a;

        let length = u.normalize();
        let c = clamp(length - self.max_length, 0.0, MAX_LINEAR_CORRECTION);

        let impulse = -self.mass * c;
        let p = u * impulse;

        c_a -= p * a.inv_mass;
        a_a -= a.inv_i * r_a.cross(p);
        c_b += p * b.inv_mass;
        a_b += b.inv_i * r_b.cross(p);

        store_position(data, a, c_a, a_a);
        store_position(data, b, c_b, a_b);

        length - self.max_length < LINEAR_SLOP
    }
}

// ============================================================================
// Wheel Joint
// ============================================================================

/// Wheel joint definition
#[derive(Clone, Debug)]
pub struct WheelJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Suspension axis in body A's frame
    pub local_axis_a: Vec2,
    pub enable_motor: bool,
    pub max_motor_torque: f32,
    /// Target wheel speed (rad/s)
    pub motor_speed: f32,
    /// Suspension frequency in Hz (0 = rigid)
    pub frequency_hz: f32,
    pub damping_ratio: f32,
}

impl WheelJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            local_axis_a: Vec2::UNIT_X,
            enable_motor: false,
            max_motor_torque: 0.0,
            motor_speed: 0.0,
            frequency_hz: 2.0,
            damping_ratio: 0.7,
        }
    }

    /// Wheel center as the world anchor, plus a world suspension axis
    pub fn initialize(
        world: &World,
        body_a: BodyId,
        body_b: BodyId,
        anchor: Vec2,
        axis: Vec2,
    ) -> Result<Self, PhysicsError> {
        let a = world.body_ref(body_a)?;
        let b = world.body_ref(body_b)?;
        Ok(Self {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            local_axis_a: a.local_vector(axis).normalized(),
            ..Self::new(body_a, body_b)
        })
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }
}

/// Body B's anchor slides on a line fixed in body A, sprung along it and
/// free to rotate. A rotational motor drives the wheel.
#[derive(Clone, Debug, Default)]
pub struct WheelJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) local_x_axis_a: Vec2,
    pub(crate) local_y_axis_a: Vec2,
    pub(crate) impulse: f32,
    pub(crate) motor_impulse: f32,
    pub(crate) spring_impulse: f32,
    pub(crate) max_motor_torque: f32,
    pub(crate) motor_speed: f32,
    pub(crate) enable_motor: bool,
    pub(crate) frequency_hz: f32,
    pub(crate) damping_ratio: f32,
    ax: Vec2,
    ay: Vec2,
    s_ax: f32,
    s_bx: f32,
    s_ay: f32,
    s_by: f32,
    mass: f32,
    motor_mass: f32,
    spring_mass: f32,
    bias: f32,
    gamma: f32,
}

impl WheelJoint {
    pub(crate) fn new(def: &WheelJointDef) -> Self {
        let x_axis = def.local_axis_a.normalized();
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            local_x_axis_a: x_axis,
            local_y_axis_a: Vec2::scalar_cross(1.0, x_axis),
            max_motor_torque: def.max_motor_torque,
            motor_speed: def.motor_speed,
            enable_motor: def.enable_motor,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            ..Self::default()
        }
    }

    /// Suspension travel of anchor B along the axis
    pub fn joint_translation(&self, body_a: &crate::body::Body, body_b: &crate::body::Body) -> f32 {
        let p_a = body_a.world_point(self.local_anchor_a);
        let p_b = body_b.world_point(self.local_anchor_b);
        (p_b - p_a).dot(body_a.world_vector(self.local_x_axis_a))
    }

    pub fn enable_motor(&mut self, flag: bool) {
        self.enable_motor = flag;
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    #[inline]
    pub fn motor_speed(&self) -> f32 {
        self.motor_speed
    }

    pub fn set_max_motor_torque(&mut self, torque: f32) {
        self.max_motor_torque = torque;
    }

    /// Motor torque applied during the last step
    pub fn motor_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
    }

    pub fn set_spring(&mut self, frequency_hz: f32, damping_ratio: f32) {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        (self.ay * self.impulse + self.ax * self.spring_impulse) * inv_dt
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (c_a, a_a) = load_position(data, a);
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (c_b, a_b) = load_position(data, b);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let (q_a, q_b) = (Rot::new(a_a), Rot::new(a_b));

        let r_a = q_a.mul_vec(self.local_anchor_a - a.local_center);
        let r_b = q_b.mul_vec(self.local_anchor_b - b.local_center);
        let d = c_b + r_b - c_a - r_a;

        // Point to line constraint
        self.ay = q_a.mul_vec(self.local_y_axis_a);
        self.s_ay = (d + r_a).cross(self.ay);
        self.s_by = r_b.cross(self.ay);
        self.mass = m_a + m_b + i_a * self.s_ay * self.s_ay + i_b * self.s_by * self.s_by;
        if self.mass > 0.0 {
            self.mass = 1.0 / self.mass;
        }

        // Spring constraint
        self.spring_mass = 0.0;
        self.bias = 0.0;
        self.gamma = 0.0;
        if self.frequency_hz > 0.0 {
            self.ax = q_a.mul_vec(self.local_x_axis_a);
            self.s_ax = (d + r_a).cross(self.ax);
            self.s_bx = r_b.cross(self.ax);

            let inv_mass = m_a + m_b + i_a * self.s_ax * self.s_ax + i_b * self.s_bx * self.s_bx;
            if inv_mass > 0.0 {
                let c = d.dot(self.ax);
                let (gamma, bias_factor) =
                    spring_coefficients(1.0 / inv_mass, self.frequency_hz, self.damping_ratio, data.step.dt);
                self.gamma = gamma;
                self.bias = c * bias_factor;

                self.spring_mass = inv_mass + self.gamma;
                if self.spring_mass > 0.0 {
                    self.spring_mass = 1.0 / self.spring_mass;
                }
            }
        } else {
            self.spring_impulse = 0.0;
        }

        // Rotational motor
        if self.enable_motor {
            self.motor_mass = i_a + i_b;
            if self.motor_mass > 0.0 {
                self.motor_mass = 1.0 / self.motor_mass;
            }
        } else {
            self.motor_mass = 0.0;
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            // Account for variable time step
            self.impulse *= data.step.dt_ratio;
            self.spring_impulse *= data.step.dt_ratio;
            self.motor_impulse *= data.step.dt_ratio;

            let p = self.ay * self.impulse + self.ax * self.spring_impulse;
            let l_a = self.impulse * self.s_ay + self.spring_impulse * self.s_ax + self.motor_impulse;
            let l_b = self.impulse * self.s_by + self.spring_impulse * self.s_bx + self.motor_impulse;

            v_a -= p * m_a;
            w_a -= i_a * l_a;
            v_b += p * m_b;
            w_b += i_b * l_b;
        } else {
            self.impulse = 0.0;
            self.spring_impulse = 0.0;
            self.motor_impulse = 0.0;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);

        // Solve spring constraint
        {
            let cdot = self.ax.dot(v_b - v_a) + self.s_bx * w_b - self.s_ax * w_a;
            let impulse = -self.spring_mass * (cdot + self.bias + self.gamma * self.spring_impulse);
            self.spring_impulse += impulse;

            let p = self.ax * impulse;
            v_a -= p * m_a;
            w_a -= i_a * impulse * self.s_ax;
            v_b += p * m_b;
            w_b += i_b * impulse * self.s_bx;
        }

        // Solve rotational motor constraint
        {
            let cdot = w_b - w_a - self.motor_speed;
            let mut impulse = -self.motor_mass * cdot;
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = clamp(self.motor_impulse + impulse, -max_impulse, max_impulse);
            impulse = self.motor_impulse - old_impulse;

            w_a -= i_a * impulse;
            w_b += i_b * impulse;
        }

        // Solve point to line constraint
        {
            let cdot = self.ay.dot(v_b - v_a) + self.s_by * w_b - self.s_ay * w_a;
            let impulse = -self.mass * cdot;
            self.impulse += impulse;

            let p = self.ay * impulse;
            v_a -= p * m_a;
            w_a -= i_a * impulse * self.s_ay;
            v_b += p * m_b;
            w_b += i_b * impulse * self.s_by;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) -> bool {
        let (mut c_a, mut a_a) = load_position(data, a);
        let (mut c_b, mut a_b) = load_position(data, b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
        let (q_a, q_b) = (Rot::new(a_a), Rot::new(a_b));

        let r_a = q_a.mul_vec(self.local_anchor_a - a.local_center);
        let r_b = q_b.mul_vec(self.local_anchor_b - b.local_center);
        let d = c_b - c_a + r_b - r_a;

        let ay = q_a.mul_vec(self.local_y_axis_a);
        let s_ay = (d + r_a).cross(ay);
        let s_by = r_b.cross(ay);

        let c = d.dot(ay);
        let k = m_a + m_b + i_a * s_ay * s_ay + i_b * s_by * s_by;
        let impulse = if k != 0.0 { -c / k } else { 0.0 };

        let p = ay * impulse;
        c_a -= p * m_a;
        a_a -= i_a * impulse * s_ay;
        c_b += p * m_b;
        a_b += i_b * impulse * s_by;

        store_position(data, a, c_a, a_a);
        store_position(data, b, c_b, a_b);

        abs(c) <= LINEAR_SLOP
    }
}

// ============================================================================
// Pulley Joint
// ============================================================================

/// Pulley joint definition
#[derive(Clone, Debug)]
pub struct PulleyJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    /// Fixed world point the rope of body A hangs from
    pub ground_anchor_a: Vec2,
    /// Fixed world point the rope of body B hangs from
    pub ground_anchor_b: Vec2,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Reference rope length on side A
    pub length_a: f32,
    /// Reference rope length on side B
    pub length_b: f32,
    /// Block-and-tackle ratio: `length_a + ratio * length_b` stays constant
    pub ratio: f32,
}

impl PulleyJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: true,
            user_data: 0,
            ground_anchor_a: Vec2::new(-1.0, 1.0),
            ground_anchor_b: Vec2::new(1.0, 1.0),
            local_anchor_a: Vec2::new(-1.0, 0.0),
            local_anchor_b: Vec2::new(1.0, 0.0),
            length_a: 0.0,
            length_b: 0.0,
            ratio: 1.0,
        }
    }

    /// World ground anchors and body anchors; lengths are the current rope lengths
    #[allow(clippy::too_many_arguments)]
    pub fn initialize(
        world: &World,
        body_a: BodyId,
        body_b: BodyId,
        ground_anchor_a: Vec2,
        ground_anchor_b: Vec2,
        anchor_a: Vec2,
        anchor_b: Vec2,
        ratio: f32,
    ) -> Result<Self, PhysicsError> {
        if ratio <= EPSILON {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "pulley ratio must be positive",
            });
        }
        let a = world.body_ref(body_a)?;
        let b = world.body_ref(body_b)?;
        Ok(Self {
            ground_anchor_a,
            ground_anchor_b,
            local_anchor_a: a.local_point(anchor_a),
            local_anchor_b: b.local_point(anchor_b),
            length_a: (anchor_a - ground_anchor_a).length(),
            length_b: (anchor_b - ground_anchor_b).length(),
            ratio,
            ..Self::new(body_a, body_b)
        })
    }
}

/// Two bodies hanging from fixed ground points by one rope
#[derive(Clone, Debug, Default)]
pub struct PulleyJoint {
    pub(crate) ground_anchor_a: Vec2,
    pub(crate) ground_anchor_b: Vec2,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) length_a: f32,
    pub(crate) length_b: f32,
    pub(crate) ratio: f32,
    pub(crate) constant: f32,
    pub(crate) impulse: f32,
    u_a: Vec2,
    u_b: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl PulleyJoint {
    pub(crate) fn new(def: &PulleyJointDef) -> Result<Self, PhysicsError> {
        if def.ratio <= EPSILON {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "pulley ratio must be positive",
            });
        }
        Ok(Self {
            ground_anchor_a: def.ground_anchor_a,
            ground_anchor_b: def.ground_anchor_b,
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length_a: def.length_a,
            length_b: def.length_b,
            ratio: def.ratio,
            constant: def.length_a + def.ratio * def.length_b,
            ..Self::default()
        })
    }

    #[inline]
    pub fn ground_anchors(&self) -> (Vec2, Vec2) {
        (self.ground_anchor_a, self.ground_anchor_b)
    }

    /// Reference rope lengths `(length_a, length_b)`
    #[inline]
    pub fn lengths(&self) -> (f32, f32) {
        (self.length_a, self.length_b)
    }

    #[inline]
    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Current rope length on side A
    pub fn current_length_a(&self, body_a: &crate::body::Body) -> f32 {
        (body_a.world_point(self.local_anchor_a) - self.ground_anchor_a).length()
    }

    /// Current rope length on side B
    pub fn current_length_b(&self, body_b: &crate::body::Body) -> f32 {
        (body_b.world_point(self.local_anchor_b) - self.ground_anchor_b).length()
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.u_b * (inv_dt * self.impulse)
    }

    pub(crate) fn shift_origin(&mut self, new_origin: Vec2) {
        self.ground_anchor_a -= new_origin;
        self.ground_anchor_b -= new_origin;
    }

    /// Rope direction from a ground anchor; zero when the rope is too short
    fn rope_direction(u: Vec2) -> (Vec2, f32) {
        let length = u.length();
        if length > 10.0 * LINEAR_SLOP {
            (u * (1.0 / length), length)
        } else {
            (Vec2::ZERO, length)
        }
    }

    fn effective_mass(&self, r_a: Vec2, u_a: Vec2, r_b: Vec2, u_b: Vec2, a: &SolverBody, b: &SolverBody) -> f32 {
        let ru_a = r_a.cross(u_a);
        let ru_b = r_b.cross(u_b);
        let m_a = a.inv_mass + a.inv_i * ru_a * ru_a;
        let m_b = b.inv_mass + b.inv_i * ru_b * ru_b;
        let mass = m_a + self.ratio * self.ratio * m_b;
        if mass > 0.0 {
            1.0 / mass
        } else {
            mass
        }
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (c_a, a_a) = load_position(data, a);
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (c_b, a_b) = load_position(data, b);
        let (mut v_b, mut w_b) = load_velocity(data, b);

        self.r_a = Rot::new(a_a).mul_vec(self.local_anchor_a - a.local_center);
        self.r_b = Rot::new(a_b).mul_vec(self.local_anchor_b - b.local_center);

        // Get the pulley axes
        self.u_a = Self::rope_direction(c_a + self.r_a - self.ground_anchor_a).0;
        self.u_b = Self::rope_direction(c_b + self.r_b - self.ground_anchor_b).0;

        self.mass = self.effective_mass(self.r_a, self.u_a, self.r_b, self.u_b, a, b);

        if data.step.warm_starting {
            // Scale impulses to support variable time steps
            self.impulse *= data.step.dt_ratio;

            let p_a = self.u_a * -self.impulse;
            let p_b = self.u_b * (-self.ratio * self.impulse);
            v_a += p_a * a.inv_mass;
            w_a += a.inv_i * self.r_a.cross(p_a);
            v_b += p_b * b.inv_mass;
            w_b += b.inv_i * self.r_b.cross(p_b);
        } else {
            self.impulse = 0.0;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);

        let vp_a = v_a + Vec2::scalar_cross(w_a, self.r_a);
        let vp_b = v_b + Vec2::scalar_cross(w_b, self.r_b);

        let cdot = -self.u_a.dot(vp_a) - self.ratio * self.u_b.dot(vp_b);
        let impulse = -self.mass * cdot;
        self.impulse += impulse;

        let p_a = self.u_a * -impulse;
        let p_b = self.u_b * (-self.ratio * impulse);
        v_a += p_a * a.inv_mass;
        w_a += a.inv_i * self.r_a.cross(p_a);
        v_b += p_b * b.inv_mass;
        w_b += b.inv_i * self.r_b.cross(p_b);

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) -> bool {
        let (mut c_a, mut a_a) = load_position(data, a);
        let (mut c_b, mut a_b) = load_position(data, b);

        let r_a = Rot::new(a_a).mul_vec(self.local_anchor_a - a.local_center);
        let r_b = Rot::new(a_b).mul_vec(self.local_anchor_b - b.local_center);

        let (u_a, length_a) = Self::rope_direction(c_a + r_a - self.ground_anchor_a);
        let (u_b, length_b) = Self::rope_direction(c_b + r_b - self.ground_anchor_b);

        let mass = self.effective_mass(r_a, u_a, r_b, u_b, a, b);

        let c = self.constant - length_a - self.ratio * length_b;
        let linear_error = abs(c);

        let impulse = -mass * c;
        let p_a = u_a * -impulse;
        let p_b = u_b * (-self.ratio * impulse);

        c_a += p_a * a.inv_mass;
        a_a += a.inv_i * r_a.cross(p_a);
        c_b += p_b * b.inv_mass;
        a_b += b.inv_i * r_b.cross(p_b);

        store_position(data, a, c_a, a_a);
        store_position(data, b, c_b, a_b);

        linear_error < LINEAR_SLOP
    }
}

// ============================================================================
// Friction Joint
// ============================================================================

/// Friction joint definition
#[derive(Clone, Debug)]
pub struct FrictionJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Maximum friction force (N)
    pub max_force: f32,
    /// Maximum friction torque (N·m)
    pub max_torque: f32,
}

impl FrictionJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            max_force: 0.0,
            max_torque: 0.0,
        }
    }

    pub fn initialize(world: &World, body_a: BodyId, body_b: BodyId, anchor: Vec2) -> Result<Self, PhysicsError> {
        let a = world.body_ref(body_a)?;
        let b = world.body_ref(body_b)?;
        Ok(Self {
            local_anchor_a: a.local_point(anchor),
            local_anchor_b: b.local_point(anchor),
            ..Self::new(body_a, body_b)
        })
    }

    pub fn with_max(mut self, max_force: f32, max_torque: f32) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
        self
    }
}

/// Top-down friction: resists relative translation and rotation up to a
/// maximum force and torque
#[derive(Clone, Debug, Default)]
pub struct FrictionJoint {
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) max_force: f32,
    pub(crate) max_torque: f32,
    pub(crate) linear_impulse: Vec2,
    pub(crate) angular_impulse: f32,
    r_a: Vec2,
    r_b: Vec2,
    linear_mass: Mat22,
    angular_mass: f32,
}

impl FrictionJoint {
    pub(crate) fn new(def: &FrictionJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            max_force: def.max_force,
            max_torque: def.max_torque,
            ..Self::default()
        }
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = force.max(0.0);
    }

    #[inline]
    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn set_max_torque(&mut self, torque: f32) {
        self.max_torque = torque.max(0.0);
    }

    #[inline]
    pub fn max_torque(&self) -> f32 {
        self.max_torque
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (_, a_a) = load_position(data, a);
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (_, a_b) = load_position(data, b);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (i_a, i_b) = (a.inv_i, b.inv_i);

        self.r_a = Rot::new(a_a).mul_vec(self.local_anchor_a - a.local_center);
        self.r_b = Rot::new(a_b).mul_vec(self.local_anchor_b - b.local_center);

        self.linear_mass = linear_mass(self.r_a, self.r_b, a, b);
        self.angular_mass = i_a + i_b;
        if self.angular_mass > 0.0 {
            self.angular_mass = 1.0 / self.angular_mass;
        }

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;

            let p = self.linear_impulse;
            v_a -= p * a.inv_mass;
            w_a -= i_a * (self.r_a.cross(p) + self.angular_impulse);
            v_b += p * b.inv_mass;
            w_b += i_b * (self.r_b.cross(p) + self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let h = data.step.dt;

        // Solve angular friction
        {
            let cdot = w_b - w_a;
            let mut impulse = -self.angular_mass * cdot;
            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = clamp(self.angular_impulse + impulse, -max_impulse, max_impulse);
            impulse = self.angular_impulse - old_impulse;

            w_a -= a.inv_i * impulse;
            w_b += b.inv_i * impulse;
        }

        // Solve linear friction
        {
            let cdot = v_b + Vec2::scalar_cross(w_b, self.r_b) - v_a - Vec2::scalar_cross(w_a, self.r_a);
            let impulse = -self.linear_mass.mul_vec(cdot);
            let old_impulse = self.linear_impulse;
            self.linear_impulse = clamp_length(self.linear_impulse + impulse, h * self.max_force);
            let impulse = self.linear_impulse - old_impulse;

            v_a -= impulse * a.inv_mass;
            w_a -= a.inv_i * self.r_a.cross(impulse);
            v_b += impulse * b.inv_mass;
            w_b += b.inv_i * self.r_b.cross(impulse);
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }
}

/// Point-to-point effective mass, inverted
fn linear_mass(r_a: Vec2, r_b: Vec2, a: &SolverBody, b: &SolverBody) -> Mat22 {
    let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_i, b.inv_i);
    let k_xy = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
    let k = Mat22::new(
        Vec2::new(m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y, k_xy),
        Vec2::new(k_xy, m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x),
    );
    k.inverse()
}

#[inline]
fn clamp_length(v: Vec2, max_length: f32) -> Vec2 {
    if v.length_squared() > max_length * max_length {
        v.normalized() * max_length
    } else {
        v
    }
}

// ============================================================================
// Motor Joint
// ============================================================================

/// Motor joint definition
#[derive(Clone, Debug)]
pub struct MotorJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    /// Target position of body B in body A's frame
    pub linear_offset: Vec2,
    /// Target angle of body B minus the angle of body A
    pub angular_offset: f32,
    pub max_force: f32,
    pub max_torque: f32,
    /// Fraction of the position error corrected per step, in `[0, 1]`
    pub correction_factor: f32,
}

impl MotorJointDef {
    pub fn new(body_a: BodyId, body_b: BodyId) -> Self {
        Self {
            body_a,
            body_b,
            collide_connected: false,
            user_data: 0,
            linear_offset: Vec2::ZERO,
            angular_offset: 0.0,
            max_force: 1.0,
            max_torque: 1.0,
            correction_factor: 0.3,
        }
    }

    /// Offsets taken from the current relative pose
    pub fn initialize(world: &World, body_a: BodyId, body_b: BodyId) -> Result<Self, PhysicsError> {
        let a = world.body_ref(body_a)?;
        let b = world.body_ref(body_b)?;
        Ok(Self {
            linear_offset: a.local_point(b.position()),
            angular_offset: b.angle() - a.angle(),
            ..Self::new(body_a, body_b)
        })
    }

    pub fn with_max(mut self, max_force: f32, max_torque: f32) -> Self {
        self.max_force = max_force;
        self.max_torque = max_torque;
        self
    }
}

/// Drives body B toward a pose relative to body A with bounded force and torque
#[derive(Clone, Debug, Default)]
pub struct MotorJoint {
    pub(crate) linear_offset: Vec2,
    pub(crate) angular_offset: f32,
    pub(crate) max_force: f32,
    pub(crate) max_torque: f32,
    pub(crate) correction_factor: f32,
    pub(crate) linear_impulse: Vec2,
    pub(crate) angular_impulse: f32,
    r_a: Vec2,
    r_b: Vec2,
    linear_error: Vec2,
    angular_error: f32,
    linear_mass: Mat22,
    angular_mass: f32,
}

impl MotorJoint {
    pub(crate) fn new(def: &MotorJointDef) -> Self {
        Self {
            linear_offset: def.linear_offset,
            angular_offset: def.angular_offset,
            max_force: def.max_force,
            max_torque: def.max_torque,
            correction_factor: clamp(def.correction_factor, 0.0, 1.0),
            ..Self::default()
        }
    }

    pub fn set_linear_offset(&mut self, offset: Vec2) {
        self.linear_offset = offset;
    }

    #[inline]
    pub fn linear_offset(&self) -> Vec2 {
        self.linear_offset
    }

    pub fn set_angular_offset(&mut self, offset: f32) {
        self.angular_offset = offset;
    }

    #[inline]
    pub fn angular_offset(&self) -> f32 {
        self.angular_offset
    }

    pub fn set_max_force(&mut self, force: f32) {
        self.max_force = force.max(0.0);
    }

    pub fn set_max_torque(&mut self, torque: f32) {
        self.max_torque = torque.max(0.0);
    }

    pub fn set_correction_factor(&mut self, factor: f32) {
        self.correction_factor = clamp(factor, 0.0, 1.0);
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (c_a, a_a) = load_position(data, a);
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (c_b, a_b) = load_position(data, b);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (i_a, i_b) = (a.inv_i, b.inv_i);
        let q_a = Rot::new(a_a);

        // Lever arms to the body origins
        self.r_a = q_a.mul_vec(-a.local_center);
        self.r_b = Rot::new(a_b).mul_vec(-b.local_center);

        self.linear_mass = linear_mass(self.r_a, self.r_b, a, b);
        self.angular_mass = i_a + i_b;
        if self.angular_mass > 0.0 {
            self.angular_mass = 1.0 / self.angular_mass;
        }

        self.linear_error = c_b + self.r_b - c_a - self.r_a - q_a.mul_vec(self.linear_offset);
        self.angular_error = a_b - a_a - self.angular_offset;

        if data.step.warm_starting {
            // Scale impulses to support a variable time step
            self.linear_impulse *= data.step.dt_ratio;
            self.angular_impulse *= data.step.dt_ratio;

            let p = self.linear_impulse;
            v_a -= p * a.inv_mass;
            w_a -= i_a * (self.r_a.cross(p) + self.angular_impulse);
            v_b += p * b.inv_mass;
            w_b += i_b * (self.r_b.cross(p) + self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }

    pub(crate) fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let h = data.step.dt;
        let inv_h = data.step.inv_dt;

        // Solve angular constraint
        {
            let cdot = w_b - w_a + inv_h * self.correction_factor * self.angular_error;
            let mut impulse = -self.angular_mass * cdot;
            let old_impulse = self.angular_impulse;
            let max_impulse = h * self.max_torque;
            self.angular_impulse = clamp(self.angular_impulse + impulse, -max_impulse, max_impulse);
            impulse = self.angular_impulse - old_impulse;

            w_a -= a.inv_i * impulse;
            w_b += b.inv_i * impulse;
        }

        // Solve linear constraint
        {
            let cdot = v_b + Vec2::scalar_cross(w_b, self.r_b) - v_a - Vec2::scalar_cross(w_a, self.r_a)
                + self.linear_error * (inv_h * self.correction_factor);
            let impulse = -self.linear_mass.mul_vec(cdot);
            let old_impulse = self.linear_impulse;
            self.linear_impulse = clamp_length(self.linear_impulse + impulse, h * self.max_force);
            let impulse = self.linear_impulse - old_impulse;

            v_a -= impulse * a.inv_mass;
            w_a -= a.inv_i * self.r_a.cross(impulse);
            v_b += impulse * b.inv_mass;
            w_b += b.inv_i * self.r_b.cross(impulse);
        }

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
    }
}

// ============================================================================
// Gear Joint
// ============================================================================

/// Gear joint definition. Both coupled joints must be revolute or
/// prismatic; body A is the second body of `joint1` and body B the second
/// body of `joint2`.
#[derive(Clone, Debug)]
pub struct GearJointDef {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub collide_connected: bool,
    pub user_data: u64,
    pub joint1: JointId,
    pub joint2: JointId,
    /// `coordinate1 + ratio * coordinate2` stays constant
    pub ratio: f32,
}

impl GearJointDef {
    /// Couple two existing joints, taking the gear bodies from them
    pub fn initialize(world: &World, joint1: JointId, joint2: JointId, ratio: f32) -> Result<Self, PhysicsError> {
        let j1 = world.joint(joint1).ok_or(PhysicsError::InvalidHandle { kind: "joint" })?;
        let j2 = world.joint(joint2).ok_or(PhysicsError::InvalidHandle { kind: "joint" })?;
        Ok(Self {
            body_a: j1.body_b(),
            body_b: j2.body_b(),
            collide_connected: false,
            user_data: 0,
            joint1,
            joint2,
            ratio,
        })
    }
}

/// Local frame of one side of a gear, copied from the coupled joint
#[derive(Clone, Copy, Debug, Default)]
struct GearSide {
    prismatic: bool,
    /// Anchor on the ground body of the coupled joint
    local_anchor_ground: Vec2,
    /// Anchor on the geared body
    local_anchor: Vec2,
    /// Slide axis in the ground body frame (prismatic only)
    local_axis: Vec2,
    reference_angle: f32,
}

impl GearSide {
    fn from_joint(world: &World, id: JointId) -> Result<(Self, BodyId), PhysicsError> {
        let joint = world.joint(id).ok_or(PhysicsError::InvalidHandle { kind: "joint" })?;
        let side = match joint.kind() {
            JointKind::Revolute(j) => Self {
                prismatic: false,
                local_anchor_ground: j.local_anchor_a,
                local_anchor: j.local_anchor_b,
                local_axis: Vec2::ZERO,
                reference_angle: j.reference_angle,
            },
            JointKind::Prismatic(j) => Self {
                prismatic: true,
                local_anchor_ground: j.local_anchor_a,
                local_anchor: j.local_anchor_b,
                local_axis: j.local_x_axis_a,
                reference_angle: j.reference_angle,
            },
            _ => {
                return Err(PhysicsError::InvalidConfiguration {
                    reason: "gear joints couple revolute or prismatic joints",
                })
            }
        };
        Ok((side, joint.body_a()))
    }

    /// Joint coordinate: relative angle, or translation along the axis
    fn coordinate(&self, ground: &crate::body::Body, body: &crate::body::Body) -> f32 {
        if self.prismatic {
            let p = ground.local_point(body.world_point(self.local_anchor));
            (p - self.local_anchor_ground).dot(self.local_axis)
        } else {
            body.angle() - ground.angle() - self.reference_angle
        }
    }

    /// Coordinate from island positions `(center, angle)`
    fn solver_coordinate(&self, body: &SolverBody, ground: &SolverBody, (c, a): (Vec2, f32), (c_ground, a_ground): (Vec2, f32)) -> f32 {
        if self.prismatic {
            let r = Rot::new(a).mul_vec(self.local_anchor - body.local_center);
            let p_ground = self.local_anchor_ground - ground.local_center;
            let p = Rot::new(a_ground).mul_t_vec(r + (c - c_ground));
            (p - p_ground).dot(self.local_axis)
        } else {
            a - a_ground - self.reference_angle
        }
    }

    /// Jacobian scaled by `scale`: `(jv, jw_body, jw_ground, inverse mass)`
    fn jacobian(&self, body: &SolverBody, ground: &SolverBody, q: Rot, q_ground: Rot, scale: f32) -> (Vec2, f32, f32, f32) {
        if !self.prismatic {
            return (Vec2::ZERO, scale, scale, scale * scale * (body.inv_i + ground.inv_i));
        }
        let u = q_ground.mul_vec(self.local_axis);
        let r_ground = q_ground.mul_vec(self.local_anchor_ground - ground.local_center);
        let r = q.mul_vec(self.local_anchor - body.local_center);
        let jw_ground = scale * r_ground.cross(u);
        let jw = scale * r.cross(u);
        let inv_mass = scale * scale * (ground.inv_mass + body.inv_mass)
            + ground.inv_i * jw_ground * jw_ground
            + body.inv_i * jw * jw;
        (u * scale, jw, jw_ground, inv_mass)
    }
}

/// Couples the coordinates of two revolute or prismatic joints:
/// `coordinate1 + ratio * coordinate2 = constant`
#[derive(Clone, Debug)]
pub struct GearJoint {
    pub(crate) joint1: JointId,
    pub(crate) joint2: JointId,
    pub(crate) body_c: BodyId,
    pub(crate) body_d: BodyId,
    pub(crate) ratio: f32,
    pub(crate) constant: f32,
    pub(crate) impulse: f32,
    side_a: GearSide,
    side_b: GearSide,
    solver_c: SolverBody,
    solver_d: SolverBody,
    /// Both ground bodies are in the island being solved
    active: bool,
    jv_ac: Vec2,
    jv_bd: Vec2,
    jw_a: f32,
    jw_b: f32,
    jw_c: f32,
    jw_d: f32,
    mass: f32,
}

impl GearJoint {
    pub(crate) fn new(def: &GearJointDef, world: &World) -> Result<Self, PhysicsError> {
        let (side_a, body_c) = GearSide::from_joint(world, def.joint1)?;
        let (side_b, body_d) = GearSide::from_joint(world, def.joint2)?;
        let body_a = world.joint(def.joint1).map(|j| j.body_b());
        let body_b = world.joint(def.joint2).map(|j| j.body_b());
        if body_a != Some(def.body_a) || body_b != Some(def.body_b) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "gear bodies must be the second bodies of the coupled joints",
            });
        }

        let coordinate_a = side_a.coordinate(world.body_ref(body_c)?, world.body_ref(def.body_a)?);
        let coordinate_b = side_b.coordinate(world.body_ref(body_d)?, world.body_ref(def.body_b)?);

        Ok(Self {
            joint1: def.joint1,
            joint2: def.joint2,
            body_c,
            body_d,
            ratio: def.ratio,
            constant: coordinate_a + def.ratio * coordinate_b,
            impulse: 0.0,
            side_a,
            side_b,
            solver_c: SolverBody::default(),
            solver_d: SolverBody::default(),
            active: false,
            jv_ac: Vec2::ZERO,
            jv_bd: Vec2::ZERO,
            jw_a: 0.0,
            jw_b: 0.0,
            jw_c: 0.0,
            jw_d: 0.0,
            mass: 0.0,
        })
    }

    /// The coupled joints `(joint1, joint2)`
    #[inline]
    pub fn joints(&self) -> (JointId, JointId) {
        (self.joint1, self.joint2)
    }

    #[inline]
    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = ratio;
    }

    #[inline]
    pub(crate) fn local_anchor_a(&self) -> Vec2 {
        self.side_a.local_anchor
    }

    #[inline]
    pub(crate) fn local_anchor_b(&self) -> Vec2 {
        self.side_b.local_anchor
    }

    pub(crate) fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.jv_ac * (inv_dt * self.impulse)
    }

    pub(crate) fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse * self.jw_a
    }

    pub(crate) fn deactivate(&mut self) {
        self.active = false;
    }

    /// Capture island indices of the ground bodies of both coupled joints
    pub(crate) fn prepare(&mut self, body_c: &crate::body::Body, body_d: &crate::body::Body) {
        self.solver_c = SolverBody::new(body_c);
        self.solver_d = SolverBody::new(body_d);
        self.active = true;
    }

    fn apply(&self, impulse: f32, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        let (c, d) = (self.solver_c, self.solver_d);
        let (mut v_a, mut w_a) = load_velocity(data, a);
        let (mut v_b, mut w_b) = load_velocity(data, b);
        let (mut v_c, mut w_c) = load_velocity(data, &c);
        let (mut v_d, mut w_d) = load_velocity(data, &d);

        v_a += self.jv_ac * (a.inv_mass * impulse);
        w_a += a.inv_i * impulse * self.jw_a;
        v_b += self.jv_bd * (b.inv_mass * impulse);
        w_b += b.inv_i * impulse * self.jw_b;
        v_c -= self.jv_ac * (c.inv_mass * impulse);
        w_c -= c.inv_i * impulse * self.jw_c;
        v_d -= self.jv_bd * (d.inv_mass * impulse);
        w_d -= d.inv_i * impulse * self.jw_d;

        store_velocity(data, a, v_a, w_a);
        store_velocity(data, b, v_b, w_b);
        store_velocity(data, &c, v_c, w_c);
        store_velocity(data, &d, v_d, w_d);
    }

    pub(crate) fn init_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        if !self.active {
            return;
        }
        let (c, d) = (self.solver_c, self.solver_d);
        let q_a = Rot::new(load_position(data, a).1);
        let q_b = Rot::new(load_position(data, b).1);
        let q_c = Rot::new(load_position(data, &c).1);
        let q_d = Rot::new(load_position(data, &d).1);

        let (jv_ac, jw_a, jw_c, mass_a) = self.side_a.jacobian(a, &c, q_a, q_c, 1.0);
        let (jv_bd, jw_b, jw_d, mass_b) = self.side_b.jacobian(b, &d, q_b, q_d, self.ratio);
        self.jv_ac = jv_ac;
        self.jv_bd = jv_bd;
        self.jw_a = jw_a;
        self.jw_b = jw_b;
        self.jw_c = jw_c;
        self.jw_d = jw_d;

        let mass = mass_a + mass_b;
        self.mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;
            self.apply(self.impulse, a, b, data);
        } else {
            self.impulse = 0.0;
        }
    }

    pub(crate) fn solve_velocity_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) {
        if !self.active {
            return;
        }
        let (c, d) = (self.solver_c, self.solver_d);
        let (v_a, w_a) = load_velocity(data, a);
        let (v_b, w_b) = load_velocity(data, b);
        let (v_c, w_c) = load_velocity(data, &c);
        let (v_d, w_d) = load_velocity(data, &d);

        let cdot = self.jv_ac.dot(v_a - v_c) + self.jv_bd.dot(v_b - v_d)
            + (self.jw_a * w_a - self.jw_c * w_c)
            + (self.jw_b * w_b - self.jw_d * w_d);

        let impulse = -self.mass * cdot;
        self.impulse += impulse;
        self.apply(impulse, a, b, data);
    }

    pub(crate) fn solve_position_constraints(&mut self, a: &SolverBody, b: &SolverBody, data: &mut SolverData<'_>) -> bool {
        if !self.active {
            return true;
        }
        let (c, d) = (self.solver_c, self.solver_d);
        let (mut c_a, mut a_a) = load_position(data, a);
        let (mut c_b, mut a_b) = load_position(data, b);
        let (mut c_c, mut a_c) = load_position(data, &c);
        let (mut c_d, mut a_d) = load_position(data, &d);
        let (q_a, q_b, q_c, q_d) = (Rot::new(a_a), Rot::new(a_b), Rot::new(a_c), Rot::new(a_d));

        let (jv_ac, jw_a, jw_c, mass_a) = self.side_a.jacobian(a, &c, q_a, q_c, 1.0);
        let (jv_bd, jw_b, jw_d, mass_b) = self.side_b.jacobian(b, &d, q_b, q_d, self.ratio);

        let coordinate_a = self.side_a.solver_coordinate(a, &c, (c_a, a_a), (c_c, a_c));
        let coordinate_b = self.side_b.solver_coordinate(b, &d, (c_b, a_b), (c_d, a_d));

        let error = coordinate_a + self.ratio * coordinate_b - self.constant;
        let mass = mass_a + mass_b;
        let impulse = if mass > 0.0 { -error / mass } else { 0.0 };

        c_a += jv_ac * (a.inv_mass * impulse);
        a_a += a.inv_i * impulse * jw_a;
        c_b += jv_bd * (b.inv_mass * impulse);
        a_b += b.inv_i * impulse * jw_b;
        c_c -= jv_ac * (c.inv_mass * impulse);
        a_c -= c.inv_i * impulse * jw_c;
        c_d -= jv_bd * (d.inv_mass * impulse);
        a_d -= d.inv_i * impulse * jw_d;

        store_position(data, a, c_a, a_a);
        store_position(data, b, c_b, a_b);
        store_position(data, &c, c_c, a_c);
        store_position(data, &d, c_d, a_d);

        abs(error) < LINEAR_SLOP
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::joint::{DistanceJointDef, JointType, RevoluteJointDef};
    use crate::shape::{CircleShape, PolygonShape};

    fn dynamic_box(world: &mut World, position: Vec2) -> BodyId {
        let body = world.create_body(&BodyDef::dynamic(position)).unwrap();
        world
            .create_fixture_from_shape(body, PolygonShape::new_box(0.5, 0.5), 1.0)
            .unwrap();
        body
    }

    #[test]
    fn test_prismatic_joint_keeps_body_on_axis() {
        let mut w = World::new(Vec2::new(0.0, -10.0));
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::ZERO);
        // Axis tilted 45 degrees: gravity slides the body down the rail
        let axis = Vec2::new(1.0, 1.0).normalized();
        let def = PrismaticJointDef::initialize(&w, ground, body, Vec2::ZERO, axis).unwrap();
        w.create_joint(def).unwrap();

        for _ in 0..60 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let b = w.body(body).unwrap();
        let p = b.position();
        assert!(p.y < -0.5);
        assert!((p.x - p.y).abs() < 0.02);
        assert!(b.angle().abs() < 0.01);
    }

    #[test]
    fn test_prismatic_limit_stops_body() {
        let mut w = World::new(Vec2::new(0.0, -10.0));
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::ZERO);
        let def = PrismaticJointDef::initialize(&w, ground, body, Vec2::ZERO, Vec2::UNIT_Y)
            .unwrap()
            .with_limit(-1.0, 1.0);
        let joint = w.create_joint(def).unwrap();

        for _ in 0..120 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let JointKind::Prismatic(pj) = w.joint(joint).unwrap().kind() else {
            panic!("expected prismatic joint");
        };
        let t = pj.joint_translation(w.body(ground).unwrap(), w.body(body).unwrap());
        assert!((t + 1.0).abs() < 0.02);
        assert_eq!(pj.limit_state, LimitState::AtLower);
    }

    #[test]
    fn test_prismatic_motor_drives_body() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::ZERO);
        let def = PrismaticJointDef::initialize(&w, ground, body, Vec2::ZERO, Vec2::UNIT_X)
            .unwrap()
            .with_motor(1.0, 100.0);
        w.create_joint(def).unwrap();

        for _ in 0..60 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let v = w.body(body).unwrap().linear_velocity();
        assert!((v.x - 1.0).abs() < 0.01);
        assert!(v.y.abs() < 0.01);
    }

    #[test]
    fn test_weld_joint_holds_pose() {
        let mut w = World::new(Vec2::new(0.0, -10.0));
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::new(1.0, 0.0));
        let def = WeldJointDef::initialize(&w, ground, body, Vec2::new(0.5, 0.0)).unwrap();
        let joint = w.create_joint(def).unwrap();

        for _ in 0..60 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let b = w.body(body).unwrap();
        assert!((b.position() - Vec2::new(1.0, 0.0)).length() < 0.05);
        assert!(b.angle().abs() < 0.05);
        // Holding a cantilevered box needs both a force and a torque
        let j = w.joint(joint).unwrap();
        assert!(j.reaction_force(60.0).y > 0.0);
        assert!(j.reaction_torque(60.0).abs() > 0.0);
    }

    #[test]
    fn test_rope_joint_limits_distance() {
        let mut w = World::new(Vec2::new(0.0, -10.0));
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::new(0.0, -1.0));
        let joint = w.create_joint(RopeJointDef::new(ground, body, 2.0)).unwrap();

        for _ in 0..120 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let (a, b) = w.joint_anchors(joint).unwrap();
        assert!((b - a).length() < 2.0 + 0.05);
        assert!(w.body(body).unwrap().position().y < -1.9);
        // The taut rope carries the weight of the box
        assert!(w.joint(joint).unwrap().reaction_force(60.0).y > 0.0);
    }

    #[test]
    fn test_slack_rope_applies_no_force() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::new(0.0, -1.0));
        let joint = w.create_joint(RopeJointDef::new(ground, body, 5.0)).unwrap();
        w.step(1.0 / 60.0, 8, 3);
        assert_eq!(w.joint(joint).unwrap().reaction_force(60.0), Vec2::ZERO);
        assert_eq!(w.body(body).unwrap().linear_velocity(), Vec2::ZERO);
    }

    fn dynamic_disc(world: &mut World, position: Vec2) -> BodyId {
        let body = world.create_body(&BodyDef::dynamic(position)).unwrap();
        world
            .create_fixture_from_shape(body, CircleShape::new(0.5), 1.0)
            .unwrap();
        body
    }

    #[test]
    fn test_wheel_suspension_sags_along_axis() {
        let mut w = World::new(Vec2::new(0.0, -10.0));
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let wheel = dynamic_disc(&mut w, Vec2::ZERO);
        let def = WheelJointDef::initialize(&w, ground, wheel, Vec2::ZERO, Vec2::UNIT_Y).unwrap();
        let joint = w.create_joint(def).unwrap();
        assert_eq!(w.joint(joint).unwrap().joint_type(), JointType::Wheel);

        for _ in 0..120 {
            w.step(1.0 / 60.0, 8, 3);
        }
        // Static sag of a 2 Hz spring is g / omega^2
        let p = w.body(wheel).unwrap().position();
        assert!(p.x.abs() < 1e-3);
        assert!(p.y < -0.05 && p.y > -0.08, "sag {}", p.y);
    }

    #[test]
    fn test_wheel_motor_spins_wheel() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let wheel = dynamic_disc(&mut w, Vec2::ZERO);
        let def = WheelJointDef::initialize(&w, ground, wheel, Vec2::ZERO, Vec2::UNIT_Y)
            .unwrap()
            .with_motor(-5.0, 100.0);
        w.create_joint(def).unwrap();

        for _ in 0..30 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let b = w.body(wheel).unwrap();
        assert!((b.angular_velocity() + 5.0).abs() < 1e-3);
        assert!(b.position().length() < 1e-3);
    }

    #[test]
    fn test_pulley_keeps_total_rope_length() {
        let mut w = World::new(Vec2::new(0.0, -10.0));
        let heavy = w.create_body(&BodyDef::dynamic(Vec2::new(-2.0, 2.0))).unwrap();
        w.create_fixture_from_shape(heavy, PolygonShape::new_box(0.5, 0.5), 2.0)
            .unwrap();
        let light = dynamic_box(&mut w, Vec2::new(2.0, 2.0));
        let def = PulleyJointDef::initialize(
            &w,
            heavy,
            light,
            Vec2::new(-2.0, 5.0),
            Vec2::new(2.0, 5.0),
            Vec2::new(-2.0, 2.0),
            Vec2::new(2.0, 2.0),
            1.0,
        )
        .unwrap();
        let joint = w.create_joint(def).unwrap();

        for _ in 0..60 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let JointKind::Pulley(pj) = w.joint(joint).unwrap().kind() else {
            panic!("expected pulley joint");
        };
        let length_a = pj.current_length_a(w.body(heavy).unwrap());
        let length_b = pj.current_length_b(w.body(light).unwrap());
        assert!((length_a + length_b - 6.0).abs() < 0.02);
        assert!(w.body(heavy).unwrap().position().y < 1.0);
        assert!(w.body(light).unwrap().position().y > 3.0);
        // Reaction on body B points down its rope, away from the ground anchor
        assert!(w.joint(joint).unwrap().reaction_force(60.0).y < 0.0);

        w.shift_origin(Vec2::new(1.0, 0.0)).unwrap();
        let JointKind::Pulley(pj) = w.joint(joint).unwrap().kind() else {
            panic!("expected pulley joint");
        };
        assert_eq!(pj.ground_anchors().0, Vec2::new(-3.0, 5.0));
    }

    #[test]
    fn test_pulley_rejects_zero_ratio() {
        let mut w = World::new(Vec2::ZERO);
        let a = dynamic_box(&mut w, Vec2::new(-2.0, 0.0));
        let b = dynamic_box(&mut w, Vec2::new(2.0, 0.0));
        let result = PulleyJointDef::initialize(
            &w,
            a,
            b,
            Vec2::new(-2.0, 2.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(-2.0, 0.0),
            Vec2::new(2.0, 0.0),
            0.0,
        );
        assert!(matches!(result, Err(PhysicsError::InvalidConfiguration { .. })));

        let def = PulleyJointDef {
            ratio: 0.0,
            ..PulleyJointDef::new(a, b)
        };
        assert!(matches!(w.create_joint(def), Err(PhysicsError::InvalidConfiguration { .. })));
        assert_eq!(w.joint_count(), 0);
    }

    #[test]
    fn test_friction_joint_bounds_deceleration() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::ZERO);
        let def = FrictionJointDef::initialize(&w, ground, body, Vec2::ZERO)
            .unwrap()
            .with_max(10.0, 10.0);
        let joint = w.create_joint(def).unwrap();
        {
            let b = w.body_mut(body).unwrap();
            b.set_linear_velocity(Vec2::new(3.0, 0.0));
            b.set_angular_velocity(2.0);
        }

        // Unit mass: at most 10 N of friction removes 1 m/s in 0.1 s
        for _ in 0..6 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let v = w.body(body).unwrap().linear_velocity();
        assert!((v.x - 2.0).abs() < 0.01, "speed {}", v.x);
        assert!(w.body(body).unwrap().angular_velocity().abs() < 1e-3);
        assert!((w.joint(joint).unwrap().reaction_force(60.0).x + 10.0).abs() < 0.01);

        for _ in 0..30 {
            w.step(1.0 / 60.0, 8, 3);
        }
        assert!(w.body(body).unwrap().linear_velocity().length() < 1e-3);
    }

    #[test]
    fn test_motor_joint_reaches_offset() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let body = dynamic_box(&mut w, Vec2::ZERO);
        let mut def = MotorJointDef::initialize(&w, ground, body).unwrap().with_max(50.0, 50.0);
        def.linear_offset = Vec2::new(2.0, 1.0);
        def.angular_offset = 0.5;
        let joint = w.create_joint(def).unwrap();

        w.step(1.0 / 60.0, 8, 3);
        // One step of at most 50 N on a unit mass
        assert!(w.body(body).unwrap().linear_velocity().length() <= 50.0 / 60.0 + 1e-4);

        for _ in 0..180 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let b = w.body(body).unwrap();
        assert!((b.position() - Vec2::new(2.0, 1.0)).length() < 0.05);
        assert!((b.angle() - 0.5).abs() < 0.05);

        if let JointKind::Motor(mj) = w.joint_mut(joint).unwrap().kind_mut() {
            mj.set_linear_offset(Vec2::ZERO);
        }
        for _ in 0..180 {
            w.step(1.0 / 60.0, 8, 3);
        }
        assert!(w.body(body).unwrap().position().length() < 0.05);
    }

    #[test]
    fn test_gear_couples_revolute_joints() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let left = dynamic_disc(&mut w, Vec2::ZERO);
        let right = dynamic_disc(&mut w, Vec2::new(2.0, 0.0));
        let j1 = w
            .create_joint(RevoluteJointDef::initialize(&w, ground, left, Vec2::ZERO).unwrap())
            .unwrap();
        let j2 = w
            .create_joint(RevoluteJointDef::initialize(&w, ground, right, Vec2::new(2.0, 0.0)).unwrap())
            .unwrap();
        let gear = w.create_joint(GearJointDef::initialize(&w, j1, j2, 1.0).unwrap()).unwrap();
        assert_eq!(w.joint(gear).unwrap().bodies(), (left, right));

        w.body_mut(left).unwrap().set_angular_velocity(2.0);
        for _ in 0..60 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let angle_left = w.body(left).unwrap().angle();
        let angle_right = w.body(right).unwrap().angle();
        assert!(angle_left > 0.5);
        assert!((angle_left + angle_right).abs() < 0.01);
        assert!(w.body(right).unwrap().position().distance(Vec2::new(2.0, 0.0)) < 1e-3);
    }

    #[test]
    fn test_gear_drives_rack_from_pinion() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let pinion = dynamic_disc(&mut w, Vec2::ZERO);
        let rack = dynamic_box(&mut w, Vec2::new(0.0, -2.0));
        let j1 = w
            .create_joint(RevoluteJointDef::initialize(&w, ground, pinion, Vec2::ZERO).unwrap())
            .unwrap();
        let j2 = w
            .create_joint(PrismaticJointDef::initialize(&w, ground, rack, Vec2::new(0.0, -2.0), Vec2::UNIT_X).unwrap())
            .unwrap();
        w.create_joint(GearJointDef::initialize(&w, j1, j2, 2.0).unwrap()).unwrap();

        w.body_mut(rack).unwrap().set_linear_velocity(Vec2::new(1.0, 0.0));
        for _ in 0..60 {
            w.step(1.0 / 60.0, 8, 3);
        }
        let angle = w.body(pinion).unwrap().angle();
        let x = w.body(rack).unwrap().position().x;
        assert!(x.abs() > 0.1);
        assert!((angle + 2.0 * x).abs() < 0.02);
    }

    #[test]
    fn test_gear_requires_revolute_or_prismatic() {
        let mut w = World::new(Vec2::ZERO);
        let ground = w.create_body(&BodyDef::default()).unwrap();
        let a = dynamic_disc(&mut w, Vec2::ZERO);
        let b = dynamic_disc(&mut w, Vec2::new(2.0, 0.0));
        let distance = w
            .create_joint(DistanceJointDef::initialize(&w, ground, a, Vec2::new(0.0, 1.0), Vec2::ZERO).unwrap())
            .unwrap();
        let revolute = w
            .create_joint(RevoluteJointDef::initialize(&w, ground, b, Vec2::new(2.0, 0.0)).unwrap())
            .unwrap();

        let def = GearJointDef::initialize(&w, distance, revolute, 1.0).unwrap();
        assert!(matches!(w.create_joint(def), Err(PhysicsError::InvalidConfiguration { .. })));
        assert_eq!(w.joint_count(), 2);

        w.destroy_joint(distance).unwrap();
        assert_eq!(
            GearJointDef::initialize(&w, distance, revolute, 1.0).err(),
            Some(PhysicsError::InvalidHandle { kind: "joint" })
        );
    }
}
