//! Island Solver
//!
//! An island is a set of bodies connected through touching contacts and
//! joints. Islands are built by [`World`] every step and solved one at a
//! time with a shared scratch [`Island`].
//!
//! # Pipeline per island
//!
//! 1. Integrate velocities (gravity, forces, damping)
//! 2. Initialize contact and joint constraints, warm start
//! 3. Velocity iterations (joints, then contacts)
//! 4. Integrate positions with translation/rotation clamping
//! 5. Position iterations until contacts and joints are within tolerance
//! 6. Write back, report impulses, update sleep timers

use crate::arena::{BodyId, ContactId, JointId};
use crate::body::{Body, BodyFlags, BodyType};
use crate::contact_solver::{ContactSolver, ContactSolverInput};
use crate::event::ContactImpulse;
use crate::math::{abs, Vec2};
use crate::profiling::Timer;
use crate::settings::{
    TimeStep, ANGULAR_SLEEP_TOLERANCE, LINEAR_SLEEP_TOLERANCE, MAX_ROTATION, MAX_ROTATION_SQUARED,
    MAX_TRANSLATION, MAX_TRANSLATION_SQUARED, TIME_TO_SLEEP,
};
use crate::world::World;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Center-of-mass position and angle of an island body
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Linear and angular velocity of an island body
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Velocity {
    pub v: Vec2,
    pub w: f32,
}

/// Island state handed to the joint solvers
pub(crate) struct SolverData<'a> {
    pub step: TimeStep,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}

/// Scratch island reused across the step
#[derive(Debug, Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyId>,
    pub contacts: Vec<ContactId>,
    pub joints: Vec<JointId>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    inputs: Vec<ContactSolverInput>,
}

impl Island {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    /// Add a body and record its island index
    pub fn add_body(&mut self, id: BodyId, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(id);
    }

    #[inline]
    pub fn add_contact(&mut self, id: ContactId) {
        self.contacts.push(id);
    }

    #[inline]
    pub fn add_joint(&mut self, id: JointId) {
        self.joints.push(id);
    }

    /// Solve the island for a full step
    pub fn solve(&mut self, world: &mut World, step: &TimeStep, gravity: Vec2, allow_sleep: bool) {
        let mut timer = Timer::new();
        let h = step.dt;

        // Integrate velocities and apply damping. Initialize the body state.
        self.positions.clear();
        self.velocities.clear();
        for &id in &self.bodies {
            let b = &mut world.bodies[id];

            let c = b.sweep.c;
            let a = b.sweep.a;
            let mut v = b.linear_velocity;
            let mut w = b.angular_velocity;

            // Store positions for continuous collision
            b.sweep.c0 = b.sweep.c;
            b.sweep.a0 = b.sweep.a;

            if b.body_type == BodyType::Dynamic {
                v += (gravity * b.gravity_scale + b.force * b.inv_mass) * h;
                w += h * b.inv_inertia * b.torque;

                // Pade approximation of the ODE dv/dt + c * v = 0
                v *= 1.0 / (1.0 + h * b.linear_damping);
                w *= 1.0 / (1.0 + h * b.angular_damping);
            }

            self.positions.push(Position { c, a });
            self.velocities.push(Velocity { v, w });
        }

        // Initialize velocity constraints
        self.gather_contacts(world);
        let mut contact_solver = ContactSolver::new(*step, &self.inputs);
        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);
        if step.warm_starting {
            contact_solver.warm_start(&mut self.velocities);
        }

        {
            let mut data = SolverData {
                step: *step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            for &id in &self.joints {
                let joint = &world.joints[id];
                let (body_a, body_b) = (joint.body_a, joint.body_b);
                let (Some(a), Some(b)) = (world.bodies.get(body_a), world.bodies.get(body_b)) else {
                    continue;
                };
                let joint = &mut world.joints[id];
                joint.prepare(a, b);
                if let Some((body_c, body_d)) = joint.coupled_bodies() {
                    // Coupled bodies must already sit in this island
                    if let (Some(c), Some(d)) = (world.bodies.get(body_c), world.bodies.get(body_d)) {
                        if self.bodies.get(c.island_index) == Some(&body_c)
                            && self.bodies.get(d.island_index) == Some(&body_d)
                        {
                            joint.prepare_coupled(c, d);
                        }
                    }
                }
                joint.init_velocity_constraints(&mut data);
            }
        }
        world.step_times.solve_init += timer.milliseconds();

        // Solve velocity constraints
        timer.reset();
        for _ in 0..step.velocity_iterations {
            let mut data = SolverData {
                step: *step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            for &id in &self.joints {
                world.joints[id].solve_velocity_constraints(&mut data);
            }
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        // Store impulses for warm starting
        self.store_impulses(world, &contact_solver);
        world.step_times.solve_velocity += timer.milliseconds();

        // Integrate positions
        self.integrate_positions(h);

        // Solve position constraints
        timer.reset();
        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = contact_solver.solve_position_constraints(&mut self.positions);

            let mut data = SolverData {
                step: *step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            let mut joints_okay = true;
            for &id in &self.joints {
                let joint_okay = world.joints[id].solve_position_constraints(&mut data);
                joints_okay = joints_okay && joint_okay;
            }

            if contacts_okay && joints_okay {
                // Exit early if the position errors are small
                position_solved = true;
                break;
            }
        }

        // Copy state buffers back to the bodies
        self.write_back(world);
        world.step_times.solve_position += timer.milliseconds();

        self.report(world, &contact_solver);

        if allow_sleep {
            self.update_sleep(world, h, position_solved);
        }
    }

    /// Solve a TOI sub-step. Only the bodies at `toi_index_a` and
    /// `toi_index_b` are moved by the position solver.
    pub fn solve_toi(&mut self, world: &mut World, sub_step: &TimeStep, toi_index_a: usize, toi_index_b: usize) {
        // Initialize the body state
        self.positions.clear();
        self.velocities.clear();
        for &id in &self.bodies {
            let b = &world.bodies[id];
            self.positions.push(Position {
                c: b.sweep.c,
                a: b.sweep.a,
            });
            self.velocities.push(Velocity {
                v: b.linear_velocity,
                w: b.angular_velocity,
            });
        }

        self.gather_contacts(world);
        let mut contact_solver = ContactSolver::new(*sub_step, &self.inputs);

        // Solve position constraints
        for _ in 0..sub_step.position_iterations {
            if contact_solver.solve_toi_position_constraints(&mut self.positions, toi_index_a, toi_index_b) {
                break;
            }
        }

        // Leap of faith to new safe state
        for index in [toi_index_a, toi_index_b] {
            let b = &mut world.bodies[self.bodies[index]];
            b.sweep.c0 = self.positions[index].c;
            b.sweep.a0 = self.positions[index].a;
        }

        // No warm starting is needed for TOI events because warm starting
        // impulses were applied in the discrete solver.
        contact_solver.initialize_velocity_constraints(&self.positions, &self.velocities);

        // Solve velocity constraints
        for _ in 0..sub_step.velocity_iterations {
            contact_solver.solve_velocity_constraints(&mut self.velocities);
        }

        // Don't store the TOI contact forces for warm starting because they
        // can be quite large.

        self.integrate_positions(sub_step.dt);
        self.write_back(world);

        self.report(world, &contact_solver);
    }

    /// Integrate positions, clamping large motions
    fn integrate_positions(&mut self, h: f32) {
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            let mut v = velocity.v;
            let mut w = velocity.w;

            // Check for large velocities
            let translation = v * h;
            if translation.dot(translation) > MAX_TRANSLATION_SQUARED {
                let ratio = MAX_TRANSLATION / translation.length();
                v *= ratio;
            }

            let rotation = h * w;
            if rotation * rotation > MAX_ROTATION_SQUARED {
                let ratio = MAX_ROTATION / abs(rotation);
                w *= ratio;
            }

            position.c += v * h;
            position.a += h * w;
            *velocity = Velocity { v, w };
        }
    }

    fn write_back(&self, world: &mut World) {
        for (i, &id) in self.bodies.iter().enumerate() {
            let body = &mut world.bodies[id];
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }
    }

    /// Collect solver input for every island contact
    fn gather_contacts(&mut self, world: &World) {
        self.inputs.clear();
        for &id in &self.contacts {
            let c = &world.contact_manager.contacts[id];
            let (fa, fb) = (&world.fixtures[c.fixture_a], &world.fixtures[c.fixture_b]);
            let (ba, bb) = (&world.bodies[c.body_a], &world.bodies[c.body_b]);
            self.inputs.push(ContactSolverInput {
                manifold: c.manifold,
                radius_a: fa.shape.radius(),
                radius_b: fb.shape.radius(),
                friction: c.friction,
                restitution: c.restitution,
                tangent_speed: c.tangent_speed,
                index_a: ba.island_index,
                index_b: bb.island_index,
                inv_mass_a: ba.inv_mass,
                inv_mass_b: bb.inv_mass,
                inv_i_a: ba.inv_inertia,
                inv_i_b: bb.inv_inertia,
                local_center_a: ba.sweep.local_center,
                local_center_b: bb.sweep.local_center,
            });
        }
    }

    fn store_impulses(&self, world: &mut World, solver: &ContactSolver) {
        for (&id, (normal, tangent, count)) in self.contacts.iter().zip(solver.impulses()) {
            let manifold = &mut world.contact_manager.contacts[id].manifold;
            for j in 0..count {
                manifold.points[j].normal_impulse = normal[j];
                manifold.points[j].tangent_impulse = tangent[j];
            }
        }
    }

    /// Hand the solver impulses to the contact listener
    fn report(&self, world: &mut World, solver: &ContactSolver) {
        if world.contact_manager.contact_listener.is_none() {
            return;
        }
        for (&id, (normal_impulses, tangent_impulses, count)) in self.contacts.iter().zip(solver.impulses()) {
            let impulse = ContactImpulse {
                normal_impulses,
                tangent_impulses,
                count,
            };
            world.notify_post_solve(id, &impulse);
        }
    }

    fn update_sleep(&self, world: &mut World, h: f32, position_solved: bool) {
        let mut min_sleep_time = f32::MAX;

        let lin_tol_sqr = LINEAR_SLEEP_TOLERANCE * LINEAR_SLEEP_TOLERANCE;
        let ang_tol_sqr = ANGULAR_SLEEP_TOLERANCE * ANGULAR_SLEEP_TOLERANCE;

        for &id in &self.bodies {
            let b = &mut world.bodies[id];
            if b.body_type == BodyType::Static {
                continue;
            }

            if !b.flags.contains(BodyFlags::AUTO_SLEEP)
                || b.angular_velocity * b.angular_velocity > ang_tol_sqr
                || b.linear_velocity.dot(b.linear_velocity) > lin_tol_sqr
            {
                b.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                b.sleep_time += h;
                min_sleep_time = min_sleep_time.min(b.sleep_time);
            }
        }

        if min_sleep_time >= TIME_TO_SLEEP && position_solved {
            for &id in &self.bodies {
                world.bodies[id].set_awake(false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::shape::PolygonShape;

    #[test]
    fn test_add_body_sets_island_index() {
        let mut world = World::new(Vec2::ZERO);
        let a = world.create_body(&BodyDef::dynamic(Vec2::ZERO)).unwrap();
        let b = world.create_body(&BodyDef::dynamic(Vec2::new(5.0, 0.0))).unwrap();
        let mut island = Island::default();
        island.add_body(a, &mut world.bodies[a]);
        island.add_body(b, &mut world.bodies[b]);
        assert_eq!(world.bodies[a].island_index, 0);
        assert_eq!(world.bodies[b].island_index, 1);
        island.clear();
        assert!(island.bodies.is_empty());
    }

    #[test]
    fn test_integrate_positions_clamps_translation() {
        let mut island = Island::default();
        island.positions.push(Position::default());
        island.velocities.push(Velocity {
            v: Vec2::new(1000.0, 0.0),
            w: 1000.0,
        });
        island.integrate_positions(1.0 / 60.0);
        assert!((island.positions[0].c.x - MAX_TRANSLATION).abs() < 1e-4);
        assert!((island.positions[0].a - MAX_ROTATION).abs() < 1e-4);
        // Velocity is clamped too
        assert!((island.velocities[0].v.x - MAX_TRANSLATION * 60.0).abs() < 1e-2);
    }

    #[test]
    fn test_solve_applies_gravity_and_damping() {
        let mut world = World::new(Vec2::new(0.0, -10.0));
        let id = world.create_body(&BodyDef::dynamic(Vec2::ZERO)).unwrap();
        world
            .create_fixture_from_shape(id, PolygonShape::new_box(0.5, 0.5), 1.0)
            .unwrap();
        world.body_mut(id).unwrap().set_linear_damping(1.0);

        let step = TimeStep {
            dt: 0.1,
            inv_dt: 10.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        };
        let mut island = Island::default();
        island.add_body(id, &mut world.bodies[id]);
        island.solve(&mut world, &step, Vec2::new(0.0, -10.0), true);

        let v = world.body(id).unwrap().linear_velocity();
        // v = (0 - 10 * 0.1) / (1 + 0.1 * 1)
        assert!((v.y + 1.0 / 1.1).abs() < 1e-5);
        assert!(world.body(id).unwrap().position().y < 0.0);
    }

    #[test]
    fn test_resting_island_falls_asleep() {
        let mut world = World::new(Vec2::ZERO);
        let id = world.create_body(&BodyDef::dynamic(Vec2::ZERO)).unwrap();
        world
            .create_fixture_from_shape(id, PolygonShape::new_box(0.5, 0.5), 1.0)
            .unwrap();
        let step = TimeStep {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
        };
        let mut island = Island::default();
        for _ in 0..40 {
            island.clear();
            island.add_body(id, &mut world.bodies[id]);
            island.solve(&mut world, &step, Vec2::ZERO, true);
        }
        assert!(!world.body(id).unwrap().is_awake());
    }
}
