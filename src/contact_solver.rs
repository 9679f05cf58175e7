//! Contact Solver
//!
//! Sequential-impulse contact resolution for one island.
//!
//! # Algorithm
//!
//! 1. **Initialize**: world manifold, effective masses and restitution bias
//!    per contact point; two-point manifolds get a block (LCP) mass matrix
//!    unless it is ill-conditioned
//! 2. **Warm start**: apply the impulses carried over from the last step
//! 3. **Velocity iterations**: friction first (clamped by the normal impulse),
//!    then non-penetration, either per point or as a 2x2 block
//! 4. **Position iterations**: Baumgarte-style push-out of the remaining
//!    overlap, clamped by `MAX_LINEAR_CORRECTION`
//!
//! The TOI variant of the position solver moves only the two bodies of the
//! time-of-impact event.

use crate::collision::{Manifold, ManifoldType, WorldManifold};
use crate::island::{Position, Velocity};
use crate::math::{clamp, Mat22, Rot, Transform, Vec2};
use crate::settings::{
    TimeStep, BAUMGARTE, LINEAR_SLOP, MAX_LINEAR_CORRECTION, MAX_MANIFOLD_POINTS, TOI_BAUMGARTE,
    VELOCITY_THRESHOLD,
};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Ensure a reasonable condition number for the block solver
const MAX_CONDITION_NUMBER: f32 = 1000.0;

/// Per-contact data gathered by the island
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ContactSolverInput {
    pub manifold: Manifold,
    pub radius_a: f32,
    pub radius_b: f32,
    pub friction: f32,
    pub restitution: f32,
    pub tangent_speed: f32,
    pub index_a: usize,
    pub index_b: usize,
    pub inv_mass_a: f32,
    pub inv_mass_b: f32,
    pub inv_i_a: f32,
    pub inv_i_b: f32,
    pub local_center_a: Vec2,
    pub local_center_b: Vec2,
}

#[derive(Clone, Copy, Debug, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Clone, Copy, Debug, Default)]
struct ContactVelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    normal_mass: Mat22,
    k: Mat22,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    point_count: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct ContactPositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    local_normal: Vec2,
    local_point: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_i_a: f32,
    inv_i_b: f32,
    manifold_type: ManifoldType,
    radius_a: f32,
    radius_b: f32,
    point_count: usize,
}

/// Solver state of one island's contacts
#[derive(Clone, Debug, Default)]
pub(crate) struct ContactSolver {
    step: TimeStep,
    manifolds: Vec<Manifold>,
    velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

impl ContactSolver {
    /// Build the constraints. Impulses are scaled by `dt_ratio` when warm
    /// starting and zeroed otherwise.
    pub fn new(step: TimeStep, inputs: &[ContactSolverInput]) -> Self {
        let mut solver = Self {
            step,
            manifolds: Vec::with_capacity(inputs.len()),
            velocity_constraints: Vec::with_capacity(inputs.len()),
            position_constraints: Vec::with_capacity(inputs.len()),
        };

        for input in inputs {
            let manifold = &input.manifold;
            let point_count = manifold.point_count;

            let mut vc = ContactVelocityConstraint {
                friction: input.friction,
                restitution: input.restitution,
                tangent_speed: input.tangent_speed,
                index_a: input.index_a,
                index_b: input.index_b,
                inv_mass_a: input.inv_mass_a,
                inv_mass_b: input.inv_mass_b,
                inv_i_a: input.inv_i_a,
                inv_i_b: input.inv_i_b,
                point_count,
                ..ContactVelocityConstraint::default()
            };

            let mut pc = ContactPositionConstraint {
                index_a: input.index_a,
                index_b: input.index_b,
                inv_mass_a: input.inv_mass_a,
                inv_mass_b: input.inv_mass_b,
                local_center_a: input.local_center_a,
                local_center_b: input.local_center_b,
                inv_i_a: input.inv_i_a,
                inv_i_b: input.inv_i_b,
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                point_count,
                radius_a: input.radius_a,
                radius_b: input.radius_b,
                manifold_type: manifold.manifold_type,
                ..ContactPositionConstraint::default()
            };

            for (j, cp) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * cp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * cp.tangent_impulse;
                }
                pc.local_points[j] = cp.local_point;
            }

            solver.manifolds.push(*manifold);
            solver.velocity_constraints.push(vc);
            solver.position_constraints.push(pc);
        }

        solver
    }

    /// Compute effective masses and restitution bias from the current state
    pub fn initialize_velocity_constraints(&mut self, positions: &[Position], velocities: &[Velocity]) {
        for ((vc, pc), manifold) in self
            .velocity_constraints
            .iter_mut()
            .zip(&self.position_constraints)
            .zip(&self.manifolds)
        {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);

            let (c_a, a_a) = (positions[vc.index_a].c, positions[vc.index_a].a);
            let (v_a, w_a) = (velocities[vc.index_a].v, velocities[vc.index_a].w);
            let (c_b, a_b) = (positions[vc.index_b].c, positions[vc.index_b].a);
            let (v_b, w_b) = (velocities[vc.index_b].v, velocities[vc.index_b].w);

            let xf_a = body_transform(c_a, a_a, pc.local_center_a);
            let xf_b = body_transform(c_b, a_b, pc.local_center_b);

            let wm = WorldManifold::new(manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b);
            vc.normal = wm.normal;
            let tangent = vc.normal.cross_scalar(1.0);

            for j in 0..vc.point_count {
                let vcp = &mut vc.points[j];
                vcp.r_a = wm.points[j] - c_a;
                vcp.r_b = wm.points[j] - c_b;

                let rn_a = vcp.r_a.cross(vc.normal);
                let rn_b = vcp.r_b.cross(vc.normal);
                let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
                vcp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = vcp.r_a.cross(tangent);
                let rt_b = vcp.r_b.cross(tangent);
                let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
                vcp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                // Setup a velocity bias for restitution
                vcp.velocity_bias = 0.0;
                let v_rel = vc.normal.dot(
                    v_b + Vec2::scalar_cross(w_b, vcp.r_b) - v_a - Vec2::scalar_cross(w_a, vcp.r_a),
                );
                if v_rel < -VELOCITY_THRESHOLD {
                    vcp.velocity_bias = -vc.restitution * v_rel;
                }
            }

            // If we have two points, then prepare the block solver
            if vc.point_count == 2 {
                let (p1, p2) = (vc.points[0], vc.points[1]);
                let rn1_a = p1.r_a.cross(vc.normal);
                let rn1_b = p1.r_b.cross(vc.normal);
                let rn2_a = p2.r_a.cross(vc.normal);
                let rn2_b = p2.r_b.cross(vc.normal);

                let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
                let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
                let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    // K is safe to invert
                    vc.k = Mat22::new(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    vc.normal_mass = vc.k.inverse();
                } else {
                    // The constraints are redundant, just use one
                    vc.point_count = 1;
                }
            }
        }
    }

    /// Apply the carried-over impulses
    pub fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);
            let mut va = velocities[vc.index_a];
            let mut vb = velocities[vc.index_b];
            let normal = vc.normal;
            let tangent = normal.cross_scalar(1.0);

            for vcp in &vc.points[..vc.point_count] {
                let p = normal * vcp.normal_impulse + tangent * vcp.tangent_impulse;
                va.w -= i_a * vcp.r_a.cross(p);
                va.v -= p * m_a;
                vb.w += i_b * vcp.r_b.cross(p);
                vb.v += p * m_b;
            }

            velocities[vc.index_a] = va;
            velocities[vc.index_b] = vb;
        }
    }

    /// One sequential-impulse pass over every contact
    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity]) {
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b) = (vc.inv_mass_a, vc.inv_mass_b);
            let (i_a, i_b) = (vc.inv_i_a, vc.inv_i_b);
            let Velocity { v: mut v_a, w: mut w_a } = velocities[vc.index_a];
            let Velocity { v: mut v_b, w: mut w_b } = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = normal.cross_scalar(1.0);
            let friction = vc.friction;

            // Solve tangent constraints first because non-penetration is
            // more important than friction
            for vcp in &mut vc.points[..vc.point_count] {
                // Relative velocity at contact
                let dv = v_b + Vec2::scalar_cross(w_b, vcp.r_b) - v_a - Vec2::scalar_cross(w_a, vcp.r_a);

                // Compute tangent force
                let vt = dv.dot(tangent) - vc.tangent_speed;
                let mut lambda = vcp.tangent_mass * (-vt);

                // Clamp the accumulated force
                let max_friction = friction * vcp.normal_impulse;
                let new_impulse = clamp(vcp.tangent_impulse + lambda, -max_friction, max_friction);
                lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                // Apply contact impulse
                let p = tangent * lambda;
                v_a -= p * m_a;
                w_a -= i_a * vcp.r_a.cross(p);
                v_b += p * m_b;
                w_b += i_b * vcp.r_b.cross(p);
            }

            if vc.point_count == 1 {
                let vcp = &mut vc.points[0];

                // Relative velocity at contact
                let dv = v_b + Vec2::scalar_cross(w_b, vcp.r_b) - v_a - Vec2::scalar_cross(w_a, vcp.r_a);

                // Compute normal impulse
                let vn = dv.dot(normal);
                let mut lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                // Clamp the accumulated impulse
                let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                lambda = new_impulse - vcp.normal_impulse;
                vcp.normal_impulse = new_impulse;

                // Apply contact impulse
                let p = normal * lambda;
                v_a -= p * m_a;
                w_a -= i_a * vcp.r_a.cross(p);
                v_b += p * m_b;
                w_b += i_b * vcp.r_b.cross(p);
            } else if vc.point_count == 2 {
                // Block solver: solve the 2x2 linear complementarity problem
                //
                //   vn = A * x + b, vn >= 0, x >= 0 and vn_i * x_i = 0
                //
                // in terms of the incremental impulse x - a, where a is the
                // accumulated impulse of the previous iterations.
                let (cp1, cp2) = (vc.points[0], vc.points[1]);
                let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);

                // Relative velocity at contact
                let dv1 = v_b + Vec2::scalar_cross(w_b, cp1.r_b) - v_a - Vec2::scalar_cross(w_a, cp1.r_a);
                let dv2 = v_b + Vec2::scalar_cross(w_b, cp2.r_b) - v_a - Vec2::scalar_cross(w_a, cp2.r_a);

                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                // Compute b'
                let b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k.mul_vec(a);

                let x = solve_block(&vc.k, &vc.normal_mass, cp1.normal_mass, cp2.normal_mass, b);

                if let Some(x) = x {
                    // Incremental impulse
                    let d = x - a;
                    let p1 = normal * d.x;
                    let p2 = normal * d.y;
                    v_a -= (p1 + p2) * m_a;
                    w_a -= i_a * (cp1.r_a.cross(p1) + cp2.r_a.cross(p2));
                    v_b += (p1 + p2) * m_b;
                    w_b += i_b * (cp1.r_b.cross(p1) + cp2.r_b.cross(p2));

                    // Accumulate
                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                }
            }

            velocities[vc.index_a] = Velocity { v: v_a, w: w_a };
            velocities[vc.index_b] = Velocity { v: v_b, w: w_b };
        }
    }

    /// Accumulated `(normal, tangent)` impulses per contact, for warm
    /// starting the next step and for `post_solve`
    pub fn impulses(&self) -> impl Iterator<Item = ([f32; MAX_MANIFOLD_POINTS], [f32; MAX_MANIFOLD_POINTS], usize)> + '_ {
        self.velocity_constraints.iter().zip(&self.manifolds).map(|(vc, m)| {
            let mut normal = [0.0; MAX_MANIFOLD_POINTS];
            let mut tangent = [0.0; MAX_MANIFOLD_POINTS];
            for j in 0..m.point_count {
                normal[j] = vc.points[j].normal_impulse;
                tangent[j] = vc.points[j].tangent_impulse;
            }
            (normal, tangent, m.point_count)
        })
    }

    /// One position pass over every contact.
    ///
    /// Returns true once the largest penetration is within `3 * LINEAR_SLOP`.
    pub fn solve_position_constraints(&self, positions: &mut [Position]) -> bool {
        let mut min_separation: f32 = 0.0;
        for pc in &self.position_constraints {
            let masses = (pc.inv_mass_a, pc.inv_i_a, pc.inv_mass_b, pc.inv_i_b);
            let sep = solve_position_constraint(pc, positions, masses, BAUMGARTE);
            min_separation = min_separation.min(sep);
        }

        // We can't expect min_separation >= -LINEAR_SLOP because we don't
        // push the separation above -LINEAR_SLOP
        min_separation >= -3.0 * LINEAR_SLOP
    }

    /// Position pass of a TOI sub-step. Only the bodies at `toi_index_a`
    /// and `toi_index_b` move.
    pub fn solve_toi_position_constraints(
        &self,
        positions: &mut [Position],
        toi_index_a: usize,
        toi_index_b: usize,
    ) -> bool {
        let mut min_separation: f32 = 0.0;
        for pc in &self.position_constraints {
            let moves = |index: usize| index == toi_index_a || index == toi_index_b;
            let (m_a, i_a) = if moves(pc.index_a) {
                (pc.inv_mass_a, pc.inv_i_a)
            } else {
                (0.0, 0.0)
            };
            let (m_b, i_b) = if moves(pc.index_b) {
                (pc.inv_mass_b, pc.inv_i_b)
            } else {
                (0.0, 0.0)
            };
            let sep = solve_position_constraint(pc, positions, (m_a, i_a, m_b, i_b), TOI_BAUMGARTE);
            min_separation = min_separation.min(sep);
        }

        // We can't expect min_separation >= -LINEAR_SLOP because we don't
        // push the separation above -LINEAR_SLOP
        min_separation >= -1.5 * LINEAR_SLOP
    }

    /// Number of constraints
    #[inline]
    pub fn len(&self) -> usize {
        self.velocity_constraints.len()
    }
}

/// Body transform from its center-of-mass pose
#[inline]
fn body_transform(c: Vec2, a: f32, local_center: Vec2) -> Transform {
    let q = Rot::new(a);
    Transform {
        p: c - q.mul_vec(local_center),
        q,
    }
}

/// Enumerate the four LCP cases of the 2-point block solver.
///
/// Returns the new accumulated impulses, or `None` when no case applies
/// (the previous impulses are kept).
fn solve_block(k: &Mat22, normal_mass: &Mat22, normal_mass1: f32, normal_mass2: f32, b: Vec2) -> Option<Vec2> {
    // Case 1: vn = 0 for both points
    let x = -normal_mass.mul_vec(b);
    if x.x >= 0.0 && x.y >= 0.0 {
        return Some(x);
    }

    // Case 2: vn1 = 0 and x2 = 0
    let x1 = -normal_mass1 * b.x;
    let vn2 = k.ex.y * x1 + b.y;
    if x1 >= 0.0 && vn2 >= 0.0 {
        return Some(Vec2::new(x1, 0.0));
    }

    // Case 3: vn2 = 0 and x1 = 0
    let x2 = -normal_mass2 * b.y;
    let vn1 = k.ey.x * x2 + b.x;
    if x2 >= 0.0 && vn1 >= 0.0 {
        return Some(Vec2::new(0.0, x2));
    }

    // Case 4: x1 = x2 = 0
    if b.x >= 0.0 && b.y >= 0.0 {
        return Some(Vec2::ZERO);
    }

    // No solution, give up. This is hit sometimes, but it doesn't seem to matter.
    None
}

/// Push one contact apart; returns its smallest separation
fn solve_position_constraint(
    pc: &ContactPositionConstraint,
    positions: &mut [Position],
    (m_a, i_a, m_b, i_b): (f32, f32, f32, f32),
    baumgarte: f32,
) -> f32 {
    let mut c_a = positions[pc.index_a].c;
    let mut a_a = positions[pc.index_a].a;
    let mut c_b = positions[pc.index_b].c;
    let mut a_b = positions[pc.index_b].a;
    let mut min_separation = f32::MAX;

    // Solve normal constraints
    for j in 0..pc.point_count {
        let xf_a = body_transform(c_a, a_a, pc.local_center_a);
        let xf_b = body_transform(c_b, a_b, pc.local_center_b);

        let (normal, point, separation) = position_manifold(pc, &xf_a, &xf_b, j);

        let r_a = point - c_a;
        let r_b = point - c_b;

        // Track max constraint error
        min_separation = min_separation.min(separation);

        // Prevent large corrections and allow slop
        let c = clamp(baumgarte * (separation + LINEAR_SLOP), -MAX_LINEAR_CORRECTION, 0.0);

        // Compute the effective mass
        let rn_a = r_a.cross(normal);
        let rn_b = r_b.cross(normal);
        let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

        // Compute normal impulse
        let impulse = if k > 0.0 { -c / k } else { 0.0 };
        let p = normal * impulse;

        c_a -= p * m_a;
        a_a -= i_a * r_a.cross(p);
        c_b += p * m_b;
        a_b += i_b * r_b.cross(p);
    }

    positions[pc.index_a] = Position { c: c_a, a: a_a };
    positions[pc.index_b] = Position { c: c_b, a: a_b };

    if pc.point_count == 0 {
        0.0
    } else {
        min_separation
    }
}

/// World normal, point and separation of one manifold point at the
/// current positions
fn position_manifold(pc: &ContactPositionConstraint, xf_a: &Transform, xf_b: &Transform, index: usize) -> (Vec2, Vec2, f32) {
    match pc.manifold_type {
        ManifoldType::Circles => {
            let point_a = xf_a.mul_vec(pc.local_point);
            let point_b = xf_b.mul_vec(pc.local_points[0]);
            let normal = (point_b - point_a).normalized();
            let point = (point_a + point_b) * 0.5;
            let separation = (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldType::FaceA => {
            let normal = xf_a.q.mul_vec(pc.local_normal);
            let plane_point = xf_a.mul_vec(pc.local_point);
            let clip_point = xf_b.mul_vec(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldType::FaceB => {
            let normal = xf_b.q.mul_vec(pc.local_normal);
            let plane_point = xf_b.mul_vec(pc.local_point);
            let clip_point = xf_a.mul_vec(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // Ensure normal points from A to B
            (-normal, clip_point, separation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrowphase::collide_polygons;
    use crate::shape::PolygonShape;

    fn step() -> TimeStep {
        TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        }
    }

    /// Static ground box (index 0) under a unit dynamic box (index 1)
    fn stacked_input(overlap: f32) -> (ContactSolverInput, Vec<Position>) {
        let ground = PolygonShape::new_box(5.0, 0.5);
        let boxy = PolygonShape::new_box(0.5, 0.5);
        let xf_a = Transform::new(Vec2::new(0.0, 0.0), 0.0);
        let xf_b = Transform::new(Vec2::new(0.0, 1.0 - overlap), 0.0);
        let manifold = collide_polygons(&ground, &xf_a, &boxy, &xf_b);
        let input = ContactSolverInput {
            manifold,
            radius_a: ground.radius,
            radius_b: boxy.radius,
            friction: 0.6,
            restitution: 0.0,
            tangent_speed: 0.0,
            index_a: 0,
            index_b: 1,
            inv_mass_a: 0.0,
            inv_mass_b: 1.0,
            inv_i_a: 0.0,
            inv_i_b: 6.0,
            local_center_a: Vec2::ZERO,
            local_center_b: Vec2::ZERO,
        };
        let positions = vec![
            Position { c: xf_a.p, a: 0.0 },
            Position { c: xf_b.p, a: 0.0 },
        ];
        (input, positions)
    }

    #[test]
    fn test_velocity_solver_stops_falling_box() {
        let (input, positions) = stacked_input(0.0);
        assert_eq!(input.manifold.point_count, 2);
        let mut velocities = vec![
            Velocity::default(),
            Velocity {
                v: Vec2::new(0.0, -2.0),
                w: 0.0,
            },
        ];

        let mut solver = ContactSolver::new(step(), &[input]);
        solver.initialize_velocity_constraints(&positions, &velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }
        // Inelastic: the box stops along the normal and does not spin
        assert!(velocities[1].v.y.abs() < 1e-3);
        assert!(velocities[1].w.abs() < 1e-3);
        assert_eq!(velocities[0].v, Vec2::ZERO);

        let (normal, _, count) = solver.impulses().next().unwrap();
        assert_eq!(count, 2);
        // Total impulse equals the momentum removed
        assert!((normal[0] + normal[1] - 2.0).abs() < 1e-2);
    }

    #[test]
    fn test_restitution_bias() {
        let (mut input, positions) = stacked_input(0.0);
        input.restitution = 1.0;
        let mut velocities = vec![
            Velocity::default(),
            Velocity {
                v: Vec2::new(0.0, -4.0),
                w: 0.0,
            },
        ];
        let mut solver = ContactSolver::new(step(), &[input]);
        solver.initialize_velocity_constraints(&positions, &velocities);
        for _ in 0..10 {
            solver.solve_velocity_constraints(&mut velocities);
        }
        assert!((velocities[1].v.y - 4.0).abs() < 1e-2);
    }

    #[test]
    fn test_friction_clamped_by_normal_impulse() {
        let (input, positions) = stacked_input(0.0);
        let mut velocities = vec![
            Velocity::default(),
            Velocity {
                v: Vec2::new(10.0, -1.0),
                w: 0.0,
            },
        ];
        let mut solver = ContactSolver::new(step(), &[input]);
        solver.initialize_velocity_constraints(&positions, &velocities);
        for _ in 0..8 {
            solver.solve_velocity_constraints(&mut velocities);
        }
        // Friction removes at most mu * normal impulse = 0.6 of tangential momentum
        assert!(velocities[1].v.x > 9.0);
        assert!(velocities[1].v.x < 10.0);
    }

    #[test]
    fn test_position_solver_pushes_out() {
        let (input, mut positions) = stacked_input(0.1);
        let solver = ContactSolver::new(step(), &[input]);
        let before = positions[1].c.y;
        let mut solved = false;
        for _ in 0..50 {
            if solver.solve_position_constraints(&mut positions) {
                solved = true;
                break;
            }
        }
        assert!(solved);
        assert!(positions[1].c.y > before);
        // Static body never moves
        assert_eq!(positions[0].c, Vec2::ZERO);
    }

    #[test]
    fn test_toi_position_solver_moves_only_toi_bodies() {
        let (input, mut positions) = stacked_input(0.1);
        let solver = ContactSolver::new(step(), &[input]);
        let before = positions[1].c;
        // Neither body is part of the TOI event
        solver.solve_toi_position_constraints(&mut positions, 5, 6);
        assert_eq!(positions[1].c, before);
        solver.solve_toi_position_constraints(&mut positions, 0, 1);
        assert!(positions[1].c.y > before.y);
    }

    #[test]
    fn test_warm_start_scales_by_dt_ratio() {
        let (mut input, positions) = stacked_input(0.0);
        input.manifold.points[0].normal_impulse = 1.0;
        input.manifold.points[1].normal_impulse = 1.0;
        let mut s = step();
        s.dt_ratio = 0.5;
        let mut velocities = vec![Velocity::default(); 2];
        let mut solver = ContactSolver::new(s, &[input]);
        solver.initialize_velocity_constraints(&positions, &velocities);
        solver.warm_start(&mut velocities);
        // Two points at 0.5 each push the unit-mass box up by 1
        assert!((velocities[1].v.y - 1.0).abs() < 1e-5);
    }
}
