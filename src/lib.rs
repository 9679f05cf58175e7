//! # ALICE-Physics2D
//!
//! **2D Rigid-Body and Particle Physics**
//!
//! A single-precision 2D physics engine: dynamic AABB tree broad phase,
//! GJK distance and conservative-advancement time of impact, an island
//! based sequential-impulse solver with warm starting and sleeping, and a
//! grid-based particle system for liquids, powders and soft groups.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Shapes** | Circle, convex polygon, edge (one or two sided), chain |
//! | **Broad Phase** | Dynamic AABB tree with fat AABBs and a move buffer |
//! | **Narrow Phase** | Persistent contact manifolds with feature ids |
//! | **Solver** | Sequential impulses, 2-point block solver, Baumgarte position correction |
//! | **CCD** | Time-of-impact sub-stepping for bullets and static geometry |
//! | **Joints** | Distance, revolute, mouse, prismatic, weld, rope, wheel, pulley, friction, motor, gear |
//! | **Particles** | Pressure, viscosity, springs, elastic triads, walls, rigid and solid groups |
//! | **Queries** | AABB, point and ray queries over fixtures and particles |
//!
//! ## Design Principles
//!
//! - **Handles, not pointers**: bodies, fixtures, joints and contacts live in
//!   generational arenas owned by the [`World`]
//! - **Deferred structure changes**: structural calls during `step` return
//!   [`PhysicsError::WorldLocked`] instead of corrupting solver state
//! - **no_std Compatible**: builds with `alloc` only (disable `std`)
//! - **Optional parallelism**: the `parallel` feature runs per-particle loops
//!   and batch ray casts through rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use alice_physics2d::prelude::*;
//!
//! # fn main() -> Result<(), PhysicsError> {
//! let mut world = World::new(Vec2::new(0.0, -10.0));
//!
//! // Ground
//! let ground = world.create_body(&BodyDef::fixed(Vec2::ZERO))?;
//! let edge = EdgeShape::new(Vec2::new(-20.0, 0.0), Vec2::new(20.0, 0.0));
//! world.create_fixture(ground, &FixtureDef::new(edge))?;
//!
//! // Falling box
//! let body = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 4.0)))?;
//! let shape = PolygonShape::new_box(0.5, 0.5);
//! world.create_fixture(body, &FixtureDef::new(shape).with_density(1.0))?;
//!
//! for _ in 0..120 {
//!     world.step(1.0 / 60.0, 8, 3);
//! }
//! let y = world.body(body).map(|b| b.position().y).unwrap_or(0.0);
//! assert!(y < 1.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Particles
//!
//! ```rust
//! use alice_physics2d::prelude::*;
//!
//! # fn main() -> Result<(), PhysicsError> {
//! let mut world = World::new(Vec2::new(0.0, -10.0));
//! world.set_particle_radius(0.1)?;
//!
//! let def = ParticleGroupDef::new(PolygonShape::new_box(0.5, 0.5), Vec2::new(0.0, 2.0))
//!     .with_flags(ParticleFlags::ELASTIC);
//! world.create_particle_group(&def)?;
//! world.step(1.0 / 60.0, 8, 3);
//! assert!(world.particle_count() > 0);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
#[macro_use]
extern crate alloc;

pub mod arena;
pub mod body;
pub mod broad_phase;
pub mod ccd;
pub mod collision;
pub mod contact;
pub mod contact_manager;
pub(crate) mod contact_solver;
pub mod debug_render;
pub mod distance;
pub mod dynamic_bvh;
pub mod error;
pub mod event;
pub mod filter;
pub mod fixture;
pub(crate) mod island;
pub mod joint;
pub mod joint_extra;
pub mod math;
pub mod narrowphase;
pub mod particle;
pub mod profiling;
pub mod query;
pub mod settings;
pub mod shape;
mod voronoi;
pub mod world;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::arena::{BodyId, ContactId, FixtureId, JointId, ParticleGroupId};
    pub use crate::body::{Body, BodyDef, BodyFlags, BodyType, ContactEdge, JointEdge};
    pub use crate::collision::{
        test_overlap, Aabb, ContactFeature, Manifold, ManifoldPoint, ManifoldType, RayCastInput,
        RayCastOutput, WorldManifold,
    };
    pub use crate::contact::{mix_friction, mix_restitution, Contact, ContactFlags};
    pub use crate::debug_render::{Color, DebugDraw, DebugDrawData, DrawFlags};
    pub use crate::error::PhysicsError;
    pub use crate::event::{
        ContactEvent, ContactEventType, ContactImpulse, ContactListener, DestructionListener,
        EventCollector, ParticleDestructionListener,
    };
    pub use crate::filter::{ContactFilter, DefaultContactFilter, Filter};
    pub use crate::fixture::{Fixture, FixtureDef};
    pub use crate::joint::{
        DistanceJoint, DistanceJointDef, Joint, JointDef, JointKind, JointType, MouseJoint,
        MouseJointDef, RevoluteJoint, RevoluteJointDef,
    };
    pub use crate::joint_extra::{
        FrictionJoint, FrictionJointDef, GearJoint, GearJointDef, MotorJoint, MotorJointDef,
        PrismaticJoint, PrismaticJointDef, PulleyJoint, PulleyJointDef, RopeJoint, RopeJointDef,
        WeldJoint, WeldJointDef, WheelJoint, WheelJointDef,
    };
    pub use crate::math::{Mat22, Mat33, Rot, Sweep, Transform, Vec2, Vec3};
    pub use crate::particle::{
        ParticleBodyContact, ParticleColor, ParticleContact, ParticleDef, ParticleFlags,
        ParticleGroup, ParticleGroupDef, ParticleGroupFlags, ParticleGroupStatistics,
        ParticlePair, ParticleSystem, ParticleSystemConfig, ParticleTriad,
    };
    pub use crate::profiling::{Profile, ProfileEntry};
    pub use crate::query::RayCastHit;
    pub use crate::settings::{TimeStep, WorldConfig};
    pub use crate::shape::{
        ChainShape, CircleShape, EdgeShape, MassData, PolygonShape, Shape, ShapeType,
    };
    pub use crate::world::{World, WorldFlags};
}

// Re-export main types at crate root
pub use prelude::*;
