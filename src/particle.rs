//! Particle System
//!
//! Grid-based liquid and granular particles coupled to the rigid bodies.
//!
//! Particles live in parallel buffers addressed by index (position,
//! velocity, flags, color, user data, group). Neighbors are found by sorting
//! particles on a 2D grid tag and sweeping the sorted list, so each step
//! costs `O(n log n)` regardless of how the particles are spread out.
//!
//! # Behaviors
//!
//! - Water (no flag): pressure and damping only
//! - `SPRING` pairs and `ELASTIC` triads keep their rest configuration
//! - `VISCOUS`, `POWDER`, `TENSILE` and `COLOR_MIXING` contact behaviors
//! - `WALL` particles never move
//! - `SOLID` groups push foreign particles out, `RIGID` groups move as one
//!
//! Destruction is deferred: `destroy_particle` only flags the particle and
//! the buffers are compacted at the start of the next step, so indices stay
//! stable inside query and raycast callbacks.

use core::mem;
use core::ops::Range;

use bitflags::bitflags;
use log::{debug, warn};

use crate::arena::{Arena, BodyId, FixtureId, ParticleGroupId};
use crate::collision::{Aabb, RayCastInput};
use crate::error::PhysicsError;
use crate::event::ParticleDestructionListener;
use crate::fixture::FixtureProxyKey;
use crate::math::{floor, sqrt, Rot, Transform, Vec2, EPSILON};
use crate::settings::{
    TimeStep, INVALID_PARTICLE_INDEX, LINEAR_SLOP, MAX_PARTICLE_WEIGHT, MAX_TRIAD_DISTANCE_SQUARED,
    MIN_PARTICLE_BUFFER_CAPACITY, MIN_PARTICLE_WEIGHT, PARTICLE_STRIDE,
};
use crate::shape::Shape;
use crate::voronoi::VoronoiDiagram;
use crate::world::World;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

// ============================================================================
// Flags
// ============================================================================

bitflags! {
    /// Behavior of a single particle
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ParticleFlags: u32 {
        /// Removed at the start of the next step
        const ZOMBIE = 1 << 1;
        /// Never moves
        const WALL = 1 << 2;
        /// Keeps its distance to pair partners
        const SPRING = 1 << 3;
        /// Keeps the shape of its triads
        const ELASTIC = 1 << 4;
        /// Damps relative velocity with its neighbors
        const VISCOUS = 1 << 5;
        /// Granular: repulsion without pressure
        const POWDER = 1 << 6;
        /// Surface tension
        const TENSILE = 1 << 7;
        /// Blends its color with its neighbors
        const COLOR_MIXING = 1 << 8;
        /// Notify the destruction listener on removal
        const DESTRUCTION_LISTENER = 1 << 9;
    }
}

impl ParticleFlags {
    /// Plain liquid particle
    pub const WATER: Self = Self::empty();
}

bitflags! {
    /// Behavior of a particle group
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ParticleGroupFlags: u32 {
        /// Ejects particles of other groups
        const SOLID = 1 << 0;
        /// Moves as a rigid body
        const RIGID = 1 << 1;
    }
}

const PAIR_FLAGS: ParticleFlags = ParticleFlags::SPRING;
const TRIAD_FLAGS: ParticleFlags = ParticleFlags::ELASTIC;
const NO_PRESSURE_FLAGS: ParticleFlags = ParticleFlags::POWDER;

// ============================================================================
// Grid tags
// ============================================================================

const X_TRUNC_BITS: u32 = 12;
const Y_TRUNC_BITS: u32 = 12;
const TAG_BITS: u32 = 31;
const Y_OFFSET: i64 = 1 << (Y_TRUNC_BITS - 1);
const Y_SHIFT: u32 = TAG_BITS - Y_TRUNC_BITS;
const X_SHIFT: u32 = TAG_BITS - Y_TRUNC_BITS - X_TRUNC_BITS;
const X_SCALE: i64 = 1 << X_SHIFT;
const X_OFFSET: i64 = X_SCALE * (1 << (X_TRUNC_BITS - 1));

/// Grid tag of a point given in diameters. Sorting by tag sorts by row,
/// then by column.
#[inline]
fn compute_tag(x: f32, y: f32) -> i64 {
    (((y + Y_OFFSET as f32) as i64) << Y_SHIFT) + ((X_SCALE as f32 * x) as i64 + X_OFFSET)
}

/// Tag of the cell `(x, y)` cells away from `tag`
#[inline]
fn compute_relative_tag(tag: i64, x: i64, y: i64) -> i64 {
    tag + (y << Y_SHIFT) + (x << X_SHIFT)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Proxy {
    index: usize,
    tag: i64,
}

// ============================================================================
// Public types
// ============================================================================

/// RGBA color of a particle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ParticleColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ParticleColor {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// True when all channels are zero
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.r == 0 && self.g == 0 && self.b == 0 && self.a == 0
    }

    /// Move both colors toward each other by `strength / 256` of their difference
    fn mix(&mut self, other: &mut Self, strength: i32) {
        fn channel(a: &mut u8, b: &mut u8, strength: i32) {
            let delta = (strength * (*b as i32 - *a as i32)) >> 8;
            *a = (*a as i32 + delta) as u8;
            *b = (*b as i32 - delta) as u8;
        }
        channel(&mut self.r, &mut other.r, strength);
        channel(&mut self.g, &mut other.g, strength);
        channel(&mut self.b, &mut other.b, strength);
        channel(&mut self.a, &mut other.a, strength);
    }
}

/// Construction parameters of a single particle
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParticleDef {
    pub flags: ParticleFlags,
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: ParticleColor,
    pub user_data: u64,
}

impl ParticleDef {
    /// Water particle at `position`
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }
}

/// Construction parameters of a particle group.
///
/// The shape is filled with particles on a square lattice, then moved to
/// `position` and rotated by `angle`.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleGroupDef {
    /// Flags given to every particle
    pub flags: ParticleFlags,
    pub group_flags: ParticleGroupFlags,
    /// Region to fill. `None` creates an empty group.
    pub shape: Option<Shape>,
    pub position: Vec2,
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    pub color: ParticleColor,
    /// Stiffness of the group's springs and triads
    pub strength: f32,
    pub user_data: u64,
    /// Destroy the group once its last particle is gone
    pub destroy_automatically: bool,
}

impl Default for ParticleGroupDef {
    fn default() -> Self {
        Self {
            flags: ParticleFlags::WATER,
            group_flags: ParticleGroupFlags::empty(),
            shape: None,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            color: ParticleColor::default(),
            strength: 1.0,
            user_data: 0,
            destroy_automatically: true,
        }
    }
}

impl ParticleGroupDef {
    /// Group filling `shape` at `position`
    pub fn new(shape: impl Into<Shape>, position: Vec2) -> Self {
        Self {
            shape: Some(shape.into()),
            position,
            ..Self::default()
        }
    }

    pub fn with_flags(mut self, flags: ParticleFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_group_flags(mut self, flags: ParticleGroupFlags) -> Self {
        self.group_flags = flags;
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_velocity(mut self, linear: Vec2, angular: f32) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    pub fn with_color(mut self, color: ParticleColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }
}

/// Tuning of the particle solver
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleSystemConfig {
    /// Particle radius in meters
    pub radius: f32,
    /// Particle density in kg/m^2
    pub density: f32,
    pub gravity_scale: f32,
    /// Damping of approaching particles, 1 removes all normal velocity
    pub damping_strength: f32,
    /// Maximum number of particles, 0 for no limit
    pub max_count: usize,
    pub pressure_strength: f32,
    pub elastic_strength: f32,
    pub spring_strength: f32,
    pub viscous_strength: f32,
    pub surface_tension_strength_a: f32,
    pub surface_tension_strength_b: f32,
    pub powder_strength: f32,
    pub ejection_strength: f32,
    pub color_mixing_strength: f32,
}

impl Default for ParticleSystemConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            density: 1.0,
            gravity_scale: 1.0,
            damping_strength: 1.0,
            max_count: 0,
            pressure_strength: 0.05,
            elastic_strength: 0.25,
            spring_strength: 0.25,
            viscous_strength: 0.25,
            surface_tension_strength_a: 0.1,
            surface_tension_strength_b: 0.2,
            powder_strength: 0.5,
            ejection_strength: 0.5,
            color_mixing_strength: 0.5,
        }
    }
}

/// Two touching particles
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleContact {
    pub index_a: usize,
    pub index_b: usize,
    /// `1 - distance / diameter`
    pub weight: f32,
    /// Unit vector from a to b
    pub normal: Vec2,
    /// Union of both particles' flags
    pub flags: ParticleFlags,
}

/// A particle touching a fixture
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleBodyContact {
    pub index: usize,
    pub body: BodyId,
    pub fixture: FixtureId,
    pub weight: f32,
    /// Points from the fixture toward the particle's interior side
    pub normal: Vec2,
    /// Effective mass of the particle/body pair
    pub mass: f32,
}

/// Spring between two particles
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticlePair {
    pub index_a: usize,
    pub index_b: usize,
    pub flags: ParticleFlags,
    pub strength: f32,
    /// Rest length
    pub distance: f32,
}

/// Elastic triangle of three particles
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParticleTriad {
    pub index_a: usize,
    pub index_b: usize,
    pub index_c: usize,
    pub flags: ParticleFlags,
    pub strength: f32,
    /// Rest offsets from the triangle's centroid
    pub pa: Vec2,
    pub pb: Vec2,
    pub pc: Vec2,
}

/// Mass properties of a particle group
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParticleGroupStatistics {
    pub mass: f32,
    /// Rotational inertia about the center
    pub inertia: f32,
    pub center: Vec2,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
}

/// A contiguous range of particles created together
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleGroup {
    pub(crate) first_index: usize,
    pub(crate) last_index: usize,
    pub(crate) group_flags: ParticleGroupFlags,
    pub(crate) strength: f32,
    pub(crate) user_data: u64,
    pub(crate) transform: Transform,
    pub(crate) destroy_automatically: bool,
    pub(crate) to_be_destroyed: bool,
}

impl ParticleGroup {
    /// Index of the first particle
    #[inline]
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    #[inline]
    pub fn particle_count(&self) -> usize {
        self.last_index - self.first_index
    }

    /// Index range of the group's particles
    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.first_index..self.last_index
    }

    #[inline]
    pub fn contains_particle(&self, index: usize) -> bool {
        self.first_index <= index && index < self.last_index
    }

    #[inline]
    pub fn group_flags(&self) -> ParticleGroupFlags {
        self.group_flags
    }

    #[inline]
    pub fn strength(&self) -> f32 {
        self.strength
    }

    #[inline]
    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    /// Pose of the group. Only rigid groups move it.
    #[inline]
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        self.transform.p
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.transform.q.angle()
    }
}

// ============================================================================
// Particle System
// ============================================================================

/// Buffers and solver state of all particles in a world
#[derive(Debug)]
pub struct ParticleSystem {
    config: ParticleSystemConfig,
    diameter: f32,
    inverse_diameter: f32,
    squared_diameter: f32,
    inverse_density: f32,

    /// Allocated buffer length, grows by doubling
    capacity: usize,
    all_particle_flags: ParticleFlags,
    all_group_flags: ParticleGroupFlags,

    flags: Vec<ParticleFlags>,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    colors: Vec<ParticleColor>,
    user_data: Vec<u64>,
    group_of: Vec<Option<ParticleGroupId>>,
    /// Distance to the group surface, solid groups only
    depth: Vec<f32>,
    /// Per-particle scalar scratch (contact weights, then pressures)
    accumulation: Vec<f32>,
    /// Per-particle vector scratch (surface tension)
    accumulation2: Vec<Vec2>,

    /// Sorted by tag
    proxies: Vec<Proxy>,
    contacts: Vec<ParticleContact>,
    body_contacts: Vec<ParticleBodyContact>,
    pairs: Vec<ParticlePair>,
    triads: Vec<ParticleTriad>,
    groups: Arena<ParticleGroupId, ParticleGroup>,

    fixture_scratch: Vec<FixtureProxyKey>,
}

impl Default for ParticleSystem {
    fn default() -> Self {
        Self::new(ParticleSystemConfig::default())
    }
}

impl ParticleSystem {
    /// Empty system. Non-positive radius or density fall back to the defaults.
    pub fn new(config: ParticleSystemConfig) -> Self {
        let defaults = ParticleSystemConfig::default();
        let mut config = config;
        if !(config.radius > 0.0) {
            config.radius = defaults.radius;
        }
        if !(config.density > 0.0) {
            config.density = defaults.density;
        }
        let mut system = Self {
            config,
            diameter: 0.0,
            inverse_diameter: 0.0,
            squared_diameter: 0.0,
            inverse_density: 1.0 / config.density,
            capacity: 0,
            all_particle_flags: ParticleFlags::empty(),
            all_group_flags: ParticleGroupFlags::empty(),
            flags: Vec::new(),
            positions: Vec::new(),
            velocities: Vec::new(),
            colors: Vec::new(),
            user_data: Vec::new(),
            group_of: Vec::new(),
            depth: Vec::new(),
            accumulation: Vec::new(),
            accumulation2: Vec::new(),
            proxies: Vec::new(),
            contacts: Vec::new(),
            body_contacts: Vec::new(),
            pairs: Vec::new(),
            triads: Vec::new(),
            groups: Arena::new(),
            fixture_scratch: Vec::new(),
        };
        system.set_diameter(2.0 * config.radius);
        system
    }

    fn set_diameter(&mut self, diameter: f32) {
        self.diameter = diameter;
        self.squared_diameter = diameter * diameter;
        self.inverse_diameter = 1.0 / diameter;
    }

    // ---------- Accessors ----------

    #[inline]
    pub fn config(&self) -> &ParticleSystemConfig {
        &self.config
    }

    /// Number of live particles, zombies included until the next step
    #[inline]
    pub fn count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Allocated buffer capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        0.5 * self.diameter
    }

    #[inline]
    pub fn diameter(&self) -> f32 {
        self.diameter
    }

    /// Mass of one particle
    #[inline]
    pub fn particle_mass(&self) -> f32 {
        let stride = PARTICLE_STRIDE * self.diameter;
        self.config.density * stride * stride
    }

    #[inline]
    fn particle_inv_mass(&self) -> f32 {
        1.777_777 * self.inverse_density * self.inverse_diameter * self.inverse_diameter
    }

    #[inline]
    fn particle_stride(&self) -> f32 {
        PARTICLE_STRIDE * self.diameter
    }

    #[inline]
    fn critical_velocity(&self, step: &TimeStep) -> f32 {
        self.diameter * step.inv_dt
    }

    #[inline]
    pub fn flags(&self) -> &[ParticleFlags] {
        &self.flags
    }

    #[inline]
    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    #[inline]
    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    #[inline]
    pub fn colors(&self) -> &[ParticleColor] {
        &self.colors
    }

    #[inline]
    pub fn user_data(&self) -> &[u64] {
        &self.user_data
    }

    /// Group of every particle
    #[inline]
    pub fn groups_of(&self) -> &[Option<ParticleGroupId>] {
        &self.group_of
    }

    #[inline]
    pub fn contacts(&self) -> &[ParticleContact] {
        &self.contacts
    }

    #[inline]
    pub fn body_contacts(&self) -> &[ParticleBodyContact] {
        &self.body_contacts
    }

    #[inline]
    pub fn pairs(&self) -> &[ParticlePair] {
        &self.pairs
    }

    #[inline]
    pub fn triads(&self) -> &[ParticleTriad] {
        &self.triads
    }

    /// Solid-group depth per particle (zero outside solid groups)
    #[inline]
    pub fn depths(&self) -> &[f32] {
        &self.depth
    }

    #[inline]
    pub fn group(&self, id: ParticleGroupId) -> Option<&ParticleGroup> {
        self.groups.get(id)
    }

    #[inline]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> impl Iterator<Item = (ParticleGroupId, &ParticleGroup)> {
        self.groups.iter()
    }

    /// Mass, center and velocities of a group
    pub fn group_statistics(&self, id: ParticleGroupId) -> Option<ParticleGroupStatistics> {
        let group = self.groups.get(id)?;
        Some(compute_statistics(
            &self.positions,
            &self.velocities,
            group.range(),
            self.particle_mass(),
        ))
    }

    /// Kinetic energy lost in approaching particle contacts
    pub fn compute_collision_energy(&self) -> f32 {
        let mut sum_v2 = 0.0;
        for contact in &self.contacts {
            let v = self.velocities[contact.index_b] - self.velocities[contact.index_a];
            let vn = v.dot(contact.normal);
            if vn < 0.0 {
                sum_v2 += vn * vn;
            }
        }
        0.5 * self.particle_mass() * sum_v2
    }

    // ---------- Creation ----------

    fn reallocate(&mut self, capacity: usize) {
        let additional = capacity.saturating_sub(self.count());
        self.flags.reserve_exact(additional);
        self.positions.reserve_exact(additional);
        self.velocities.reserve_exact(additional);
        self.colors.reserve_exact(additional);
        self.user_data.reserve_exact(additional);
        self.group_of.reserve_exact(additional);
        self.depth.reserve_exact(additional);
        self.proxies.reserve_exact(additional);
        self.capacity = capacity;
    }

    pub(crate) fn create_particle(&mut self, def: &ParticleDef) -> Result<usize, PhysicsError> {
        let count = self.count();
        let max_count = self.config.max_count;
        if max_count != 0 && count >= max_count {
            return Err(PhysicsError::CapacityExceeded {
                resource: "particles",
                limit: max_count,
            });
        }
        if count >= self.capacity {
            let mut capacity = if count == 0 {
                MIN_PARTICLE_BUFFER_CAPACITY
            } else {
                2 * count
            };
            if max_count != 0 {
                capacity = capacity.min(max_count);
            }
            self.reallocate(capacity);
        }

        let index = count;
        self.flags.push(def.flags);
        self.positions.push(def.position);
        self.velocities.push(def.velocity);
        self.colors.push(def.color);
        self.user_data.push(def.user_data);
        self.group_of.push(None);
        self.depth.push(0.0);

        let tag = compute_tag(
            self.inverse_diameter * def.position.x,
            self.inverse_diameter * def.position.y,
        );
        let at = self.proxies.partition_point(|p| p.tag <= tag);
        self.proxies.insert(at, Proxy { index, tag });
        self.all_particle_flags |= def.flags;
        Ok(index)
    }

    /// Flag a particle for removal at the next step
    pub(crate) fn destroy_particle(&mut self, index: usize, call_listener: bool) -> Result<(), PhysicsError> {
        let flags = self
            .flags
            .get_mut(index)
            .ok_or(PhysicsError::InvalidHandle { kind: "particle" })?;
        *flags |= ParticleFlags::ZOMBIE;
        if call_listener {
            *flags |= ParticleFlags::DESTRUCTION_LISTENER;
        }
        self.all_particle_flags |= ParticleFlags::ZOMBIE;
        Ok(())
    }

    pub(crate) fn set_particle_flags(&mut self, index: usize, flags: ParticleFlags) -> Result<(), PhysicsError> {
        let slot = self
            .flags
            .get_mut(index)
            .ok_or(PhysicsError::InvalidHandle { kind: "particle" })?;
        *slot = flags;
        self.all_particle_flags |= flags;
        Ok(())
    }

    pub(crate) fn create_group(&mut self, def: &ParticleGroupDef) -> ParticleGroupId {
        let stride = self.particle_stride();
        let transform = Transform::new(def.position, def.angle);
        let first_index = self.count();
        if let Some(shape) = &def.shape {
            let identity = Transform::IDENTITY;
            let mut aabb = shape.compute_aabb(&identity, 0);
            for child in 1..shape.child_count() {
                aabb = aabb.combine(&shape.compute_aabb(&identity, child));
            }
            let x0 = floor(aabb.lower_bound.x / stride) * stride;
            let mut y = floor(aabb.lower_bound.y / stride) * stride;
            'fill: while y < aabb.upper_bound.y {
                let mut x = x0;
                while x < aabb.upper_bound.x {
                    let local = Vec2::new(x, y);
                    if shape.test_point(&identity, local) {
                        let p = transform.mul_vec(local);
                        let particle = ParticleDef {
                            flags: def.flags,
                            position: p,
                            velocity: def.linear_velocity
                                + Vec2::scalar_cross(def.angular_velocity, p - def.position),
                            color: def.color,
                            user_data: def.user_data,
                        };
                        if let Err(err) = self.create_particle(&particle) {
                            warn!("particle group truncated: {}", err);
                            break 'fill;
                        }
                    }
                    x += stride;
                }
                y += stride;
            }
        }
        let last_index = self.count();

        let id = self.groups.insert(ParticleGroup {
            first_index,
            last_index,
            group_flags: def.group_flags,
            strength: def.strength,
            user_data: def.user_data,
            transform,
            destroy_automatically: def.destroy_automatically,
            to_be_destroyed: false,
        });
        for group in &mut self.group_of[first_index..last_index] {
            *group = Some(id);
        }
        self.all_group_flags |= def.group_flags;

        self.update_contacts(true);
        let range = first_index..last_index;
        if def.flags.intersects(PAIR_FLAGS) {
            self.create_pairs(def.strength, |a, b| range.contains(&a) && range.contains(&b));
        }
        if def.flags.intersects(TRIAD_FLAGS) {
            self.create_triads(range.clone(), def.strength, |a, b, c| {
                range.contains(&a) && range.contains(&b) && range.contains(&c)
            });
        }
        if def.group_flags.contains(ParticleGroupFlags::SOLID) {
            self.compute_depth_for_group(range.clone());
        }
        debug!("created particle group {:?} with {} particles", id, range.len());
        id
    }

    fn create_pairs<F: Fn(usize, usize) -> bool>(&mut self, strength: f32, filter: F) {
        for contact in &self.contacts {
            let (a, b) = (contact.index_a, contact.index_b);
            if contact.flags.intersects(PAIR_FLAGS) && filter(a, b) {
                self.pairs.push(ParticlePair {
                    index_a: a,
                    index_b: b,
                    flags: contact.flags,
                    strength,
                    distance: self.positions[a].distance(self.positions[b]),
                });
            }
        }
    }

    fn create_triads<F: Fn(usize, usize, usize) -> bool>(&mut self, range: Range<usize>, strength: f32, filter: F) {
        let mut diagram = VoronoiDiagram::with_capacity(range.len());
        for i in range {
            if !self.flags[i].contains(ParticleFlags::ZOMBIE) {
                diagram.add_generator(self.positions[i], i);
            }
        }
        diagram.generate(0.5 * self.particle_stride());
        let max_distance_squared = MAX_TRIAD_DISTANCE_SQUARED * self.squared_diameter;
        let flags = &self.flags;
        let positions = &self.positions;
        let triads = &mut self.triads;
        diagram.for_each_triangle(|a, b, c| {
            let triad_flags = flags[a] | flags[b] | flags[c];
            if !triad_flags.intersects(TRIAD_FLAGS) || !filter(a, b, c) {
                return;
            }
            let (pa, pb, pc) = (positions[a], positions[b], positions[c]);
            if pa.distance_squared(pb) < max_distance_squared
                && pb.distance_squared(pc) < max_distance_squared
                && pc.distance_squared(pa) < max_distance_squared
            {
                let mid = (pa + pb + pc) * (1.0 / 3.0);
                triads.push(ParticleTriad {
                    index_a: a,
                    index_b: b,
                    index_c: c,
                    flags: triad_flags,
                    strength,
                    pa: pa - mid,
                    pb: pb - mid,
                    pc: pc - mid,
                });
            }
        });
    }

    /// Merge group `b` into group `a`
    pub(crate) fn join_groups(
        &mut self,
        a: ParticleGroupId,
        b: ParticleGroupId,
        listener: Option<&mut (dyn ParticleDestructionListener + 'static)>,
    ) -> Result<(), PhysicsError> {
        if a == b {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "cannot join a particle group with itself",
            });
        }
        let (b_first, b_last) = match self.groups.get(b) {
            Some(g) => (g.first_index, g.last_index),
            None => return Err(PhysicsError::InvalidHandle { kind: "particle group" }),
        };
        if !self.groups.contains(a) {
            return Err(PhysicsError::InvalidHandle { kind: "particle group" });
        }

        // Move b to the end of the buffers, then a right in front of it
        self.rotate_buffer(b_first, b_last, self.count());
        let (a_first, a_last) = (self.groups[a].first_index, self.groups[a].last_index);
        let b_first = self.groups[b].first_index;
        self.rotate_buffer(a_first, a_last, b_first);

        let range_a = self.groups[a].range();
        let range_b = self.groups[b].range();
        let joined = range_a.start..range_b.end;
        let mut particle_flags = ParticleFlags::empty();
        for &flags in &self.flags[joined.clone()] {
            particle_flags |= flags;
        }
        let strength = self.groups[a].strength.min(self.groups[b].strength);

        self.update_contacts(true);
        if particle_flags.intersects(PAIR_FLAGS) {
            self.create_pairs(strength, |i, j| {
                (range_a.contains(&i) && range_b.contains(&j)) || (range_b.contains(&i) && range_a.contains(&j))
            });
        }
        if particle_flags.intersects(TRIAD_FLAGS) {
            self.create_triads(joined.clone(), strength, |i, j, k| {
                let in_a = range_a.contains(&i) && range_a.contains(&j) && range_a.contains(&k);
                let in_b = range_b.contains(&i) && range_b.contains(&j) && range_b.contains(&k);
                !in_a && !in_b
            });
        }

        for group in &mut self.group_of[range_b.clone()] {
            *group = Some(a);
        }
        let group_flags = self.groups[b].group_flags;
        {
            let group_a = &mut self.groups[a];
            group_a.group_flags |= group_flags;
            group_a.last_index = range_b.end;
        }
        {
            let group_b = &mut self.groups[b];
            group_b.first_index = range_b.end;
        }
        self.destroy_group(b, listener);

        if self.groups[a].group_flags.contains(ParticleGroupFlags::SOLID) {
            self.compute_depth_for_group(joined);
        }
        debug!("joined particle group {:?} into {:?}", b, a);
        Ok(())
    }

    fn destroy_group(&mut self, id: ParticleGroupId, listener: Option<&mut (dyn ParticleDestructionListener + 'static)>) {
        if let Some(listener) = listener {
            listener.say_goodbye_particle_group(id);
        }
        if let Some(group) = self.groups.remove(id) {
            for i in group.range() {
                if self.group_of.get(i) == Some(&Some(id)) {
                    self.group_of[i] = None;
                }
            }
            debug!("destroyed particle group {:?}", id);
        }
        self.all_group_flags = self
            .groups
            .iter()
            .fold(ParticleGroupFlags::empty(), |acc, (_, g)| acc | g.group_flags);
    }

    /// Rotate `[start, end)` so that `mid` becomes `start`, remapping every index
    fn rotate_buffer(&mut self, start: usize, mid: usize, end: usize) {
        if start == mid || mid == end {
            return;
        }
        let new_index = |i: usize| {
            if i < start {
                i
            } else if i < mid {
                i + end - mid
            } else if i < end {
                i + start - mid
            } else {
                i
            }
        };
        let shift = mid - start;
        self.flags[start..end].rotate_left(shift);
        self.positions[start..end].rotate_left(shift);
        self.velocities[start..end].rotate_left(shift);
        self.colors[start..end].rotate_left(shift);
        self.user_data[start..end].rotate_left(shift);
        self.group_of[start..end].rotate_left(shift);
        self.depth[start..end].rotate_left(shift);

        for proxy in &mut self.proxies {
            proxy.index = new_index(proxy.index);
        }
        for contact in &mut self.contacts {
            contact.index_a = new_index(contact.index_a);
            contact.index_b = new_index(contact.index_b);
        }
        for contact in &mut self.body_contacts {
            contact.index = new_index(contact.index);
        }
        for pair in &mut self.pairs {
            pair.index_a = new_index(pair.index_a);
            pair.index_b = new_index(pair.index_b);
        }
        for triad in &mut self.triads {
            triad.index_a = new_index(triad.index_a);
            triad.index_b = new_index(triad.index_b);
            triad.index_c = new_index(triad.index_c);
        }
        for (_, group) in self.groups.iter_mut() {
            if group.first_index == group.last_index {
                let index = new_index(group.first_index);
                group.first_index = index;
                group.last_index = index;
            } else {
                group.first_index = new_index(group.first_index);
                group.last_index = new_index(group.last_index - 1) + 1;
            }
        }
    }

    // ---------- Configuration ----------

    pub(crate) fn set_max_count(&mut self, count: usize) -> Result<(), PhysicsError> {
        if count != 0 && count < self.count() {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "particle max count below live particle count",
            });
        }
        self.config.max_count = count;
        Ok(())
    }

    pub(crate) fn set_radius(&mut self, radius: f32) -> Result<(), PhysicsError> {
        if !(radius > 0.0) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "particle radius must be positive",
            });
        }
        self.config.radius = radius;
        self.set_diameter(2.0 * radius);
        self.update_tags();
        Ok(())
    }

    pub(crate) fn set_density(&mut self, density: f32) -> Result<(), PhysicsError> {
        if !(density > 0.0) {
            return Err(PhysicsError::InvalidConfiguration {
                reason: "particle density must be positive",
            });
        }
        self.config.density = density;
        self.inverse_density = 1.0 / density;
        Ok(())
    }

    pub(crate) fn set_gravity_scale(&mut self, scale: f32) {
        self.config.gravity_scale = scale;
    }

    pub(crate) fn set_damping(&mut self, damping: f32) {
        self.config.damping_strength = damping;
    }

    /// Translate every particle and group by `-new_origin`
    pub(crate) fn shift_origin(&mut self, new_origin: Vec2) {
        for p in &mut self.positions {
            *p -= new_origin;
        }
        for (_, group) in self.groups.iter_mut() {
            group.transform.p -= new_origin;
        }
        self.update_tags();
    }

    // ---------- Queries ----------

    /// Proxy slice whose tags cover the box `[lower, upper]`
    fn proxy_range(&self, lower: Vec2, upper: Vec2) -> Range<usize> {
        let lower_tag = compute_tag(self.inverse_diameter * lower.x, self.inverse_diameter * lower.y);
        let upper_tag = compute_tag(self.inverse_diameter * upper.x, self.inverse_diameter * upper.y);
        let first = self.proxies.partition_point(|p| p.tag < lower_tag);
        let last = self.proxies.partition_point(|p| p.tag <= upper_tag);
        first..last.max(first)
    }

    /// Report every particle inside `aabb` until the callback returns false
    pub(crate) fn query_aabb<F: FnMut(usize) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        for proxy in &self.proxies[self.proxy_range(aabb.lower_bound, aabb.upper_bound)] {
            let p = self.positions[proxy.index];
            if aabb.lower_bound.x < p.x && p.x < aabb.upper_bound.x && aabb.lower_bound.y < p.y && p.y < aabb.upper_bound.y {
                if !callback(proxy.index) {
                    break;
                }
            }
        }
    }

    /// Ray cast against particle disks of one diameter.
    ///
    /// The callback gets `(index, point, normal, fraction)` and returns the
    /// new maximum fraction: 0 stops, 1 continues, `fraction` clips.
    pub(crate) fn raycast<F: FnMut(usize, Vec2, Vec2, f32) -> f32>(&self, point1: Vec2, point2: Vec2, mut callback: F) {
        let v = point2 - point1;
        let v2 = v.dot(v);
        if self.proxies.is_empty() || v2 <= 0.0 {
            return;
        }
        let lower = point1.min(point2) - Vec2::new(self.diameter, self.diameter);
        let upper = point1.max(point2) + Vec2::new(self.diameter, self.diameter);
        let mut fraction = 1.0;
        for proxy in &self.proxies[self.proxy_range(lower, upper)] {
            let i = proxy.index;
            let p = point1 - self.positions[i];
            let pv = p.dot(v);
            let p2 = p.dot(p);
            let determinant = pv * pv - v2 * (p2 - self.squared_diameter);
            if determinant < 0.0 {
                continue;
            }
            let sqrt_determinant = sqrt(determinant);
            let mut t = (-pv - sqrt_determinant) / v2;
            if t > fraction {
                continue;
            }
            if t < 0.0 {
                t = (-pv + sqrt_determinant) / v2;
                if t < 0.0 || t > fraction {
                    continue;
                }
            }
            let n = (p + v * t).normalized();
            let f = callback(i, point1 + v * t, n, t);
            fraction = fraction.min(f);
            if fraction <= 0.0 {
                break;
            }
        }
    }

    // ---------- Neighbors ----------

    fn update_tags(&mut self) {
        let inv_d = self.inverse_diameter;
        for proxy in &mut self.proxies {
            let p = self.positions[proxy.index];
            proxy.tag = compute_tag(inv_d * p.x, inv_d * p.y);
        }
        self.proxies.sort_by_key(|p| p.tag);
    }

    fn update_contacts(&mut self, except_zombie: bool) {
        self.update_tags();
        self.contacts.clear();

        let positions = &self.positions;
        let flags = &self.flags;
        let contacts = &mut self.contacts;
        let squared_diameter = self.squared_diameter;
        let inverse_diameter = self.inverse_diameter;
        let mut add_contact = |a: usize, b: usize| {
            let d = positions[b] - positions[a];
            let d2 = d.length_squared();
            if d2 < squared_diameter {
                let distance = sqrt(d2);
                let inv_distance = if distance > EPSILON { 1.0 / distance } else { 0.0 };
                contacts.push(ParticleContact {
                    index_a: a,
                    index_b: b,
                    weight: 1.0 - distance * inverse_diameter,
                    normal: d * inv_distance,
                    flags: flags[a] | flags[b],
                });
            }
        };

        let proxies = &self.proxies;
        let n = proxies.len();
        let mut c = 0;
        for (i, a) in proxies.iter().enumerate() {
            let right_tag = compute_relative_tag(a.tag, 1, 0);
            for b in &proxies[i + 1..] {
                if right_tag < b.tag {
                    break;
                }
                add_contact(a.index, b.index);
            }
            let bottom_left_tag = compute_relative_tag(a.tag, -1, 1);
            while c < n && proxies[c].tag < bottom_left_tag {
                c += 1;
            }
            let bottom_right_tag = compute_relative_tag(a.tag, 1, 1);
            for b in &proxies[c..] {
                if bottom_right_tag < b.tag {
                    break;
                }
                add_contact(a.index, b.index);
            }
        }

        if except_zombie {
            self.contacts
                .retain(|contact| !contact.flags.contains(ParticleFlags::ZOMBIE));
        }
    }

    /// Tight box around all particles, grown by `margin`
    fn bounds(&self, margin: f32) -> Option<Aabb> {
        let first = *self.positions.first()?;
        let mut aabb = Aabb::new(first, first);
        for &p in &self.positions[1..] {
            aabb.lower_bound = aabb.lower_bound.min(p);
            aabb.upper_bound = aabb.upper_bound.max(p);
        }
        let r = Vec2::new(margin, margin);
        aabb.lower_bound -= r;
        aabb.upper_bound += r;
        Some(aabb)
    }

    fn update_body_contacts(&mut self, world: &mut World) {
        self.body_contacts.clear();
        let Some(aabb) = self.bounds(self.diameter) else {
            return;
        };
        let mut keys = mem::take(&mut self.fixture_scratch);
        query_fixtures(world, &aabb, &mut keys);

        let inv_am_base = self.particle_inv_mass();
        for key in &keys {
            let Some(fixture) = world.fixtures.get(key.fixture) else {
                continue;
            };
            if fixture.is_sensor {
                continue;
            }
            let body_id = fixture.body;
            let Some(body) = world.bodies.get(body_id) else {
                continue;
            };
            let child = key.child_index as usize;
            let Some(fixture_aabb) = fixture.aabb(child) else {
                continue;
            };
            let bp = body.world_center();
            let inv_bm = body.inv_mass;
            let inv_bi = body.inv_inertia;
            let xf = body.xf;

            let r = Vec2::new(self.diameter, self.diameter);
            let lower = fixture_aabb.lower_bound - r;
            let upper = fixture_aabb.upper_bound + r;
            for proxy in &self.proxies[self.proxy_range(lower, upper)] {
                let a = proxy.index;
                let ap = self.positions[a];
                if !(lower.x <= ap.x && ap.x <= upper.x && lower.y <= ap.y && ap.y <= upper.y) {
                    continue;
                }
                if let Some(filter) = world.contact_manager.contact_filter.as_mut() {
                    if !filter.should_collide_particle(fixture, a) {
                        continue;
                    }
                }
                let (d, n) = fixture.shape.compute_distance(&xf, ap, child);
                if d < self.diameter {
                    let inv_am = if self.flags[a].contains(ParticleFlags::WALL) {
                        0.0
                    } else {
                        inv_am_base
                    };
                    let rp = ap - bp;
                    let rpn = rp.cross(n);
                    let inv_m = inv_am + inv_bm + inv_bi * rpn * rpn;
                    self.body_contacts.push(ParticleBodyContact {
                        index: a,
                        body: body_id,
                        fixture: key.fixture,
                        weight: 1.0 - d * self.inverse_diameter,
                        normal: -n,
                        mass: if inv_m > 0.0 { 1.0 / inv_m } else { 0.0 },
                    });
                }
            }
        }
        self.fixture_scratch = keys;
    }

    /// Sum of contact weights per particle into `accumulation`
    fn compute_weights(&mut self) {
        self.accumulation.clear();
        self.accumulation.resize(self.count(), 0.0);
        for contact in &self.body_contacts {
            self.accumulation[contact.index] += contact.weight;
        }
        for contact in &self.contacts {
            self.accumulation[contact.index_a] += contact.weight;
            self.accumulation[contact.index_b] += contact.weight;
        }
    }

    fn compute_depth_for_group(&mut self, range: Range<usize>) {
        self.accumulation.resize(self.count(), 0.0);
        for i in range.clone() {
            self.accumulation[i] = 0.0;
        }
        for contact in &self.contacts {
            let (a, b) = (contact.index_a, contact.index_b);
            if range.contains(&a) && range.contains(&b) {
                self.accumulation[a] += contact.weight;
                self.accumulation[b] += contact.weight;
            }
        }
        // Surface particles miss a fifth of a fully surrounded particle's weight
        let full_weight = self.accumulation[range.clone()].iter().fold(0.0_f32, |m, &w| m.max(w));
        let surface_weight = 0.8 * full_weight;
        for i in range.clone() {
            self.depth[i] = if self.accumulation[i] < surface_weight { 0.0 } else { f32::MAX };
        }
        // Relax surface distances inward from the boundary particles
        for _ in 0..range.len() {
            let mut updated = false;
            for contact in &self.contacts {
                let (a, b) = (contact.index_a, contact.index_b);
                if range.contains(&a) && range.contains(&b) {
                    let r = 1.0 - contact.weight;
                    let (ap0, bp0) = (self.depth[a], self.depth[b]);
                    let ap1 = bp0 + r;
                    let bp1 = ap0 + r;
                    if ap0 > ap1 {
                        self.depth[a] = ap1;
                        updated = true;
                    }
                    if bp0 > bp1 {
                        self.depth[b] = bp1;
                        updated = true;
                    }
                }
            }
            if !updated {
                break;
            }
        }
        for i in range {
            let p = self.depth[i];
            self.depth[i] = if p < f32::MAX { p * self.diameter } else { 0.0 };
        }
    }

    // ---------- Step ----------

    pub(crate) fn solve(&mut self, world: &mut World, step: &TimeStep) {
        if self.all_particle_flags.contains(ParticleFlags::ZOMBIE) {
            self.solve_zombie(world.particle_destruction_listener.as_deref_mut());
        }
        if self.is_empty() {
            return;
        }
        self.accumulation2.clear();
        self.accumulation2.resize(self.count(), Vec2::ZERO);

        let gravity = world.config.gravity * (step.dt * self.config.gravity_scale);
        let critical_velocity = self.critical_velocity(step);
        let max_velocity_squared = critical_velocity * critical_velocity;
        let apply_gravity = |v: &mut Vec2| {
            *v += gravity;
            let v2 = v.length_squared();
            if v2 > max_velocity_squared {
                *v *= sqrt(max_velocity_squared / v2);
            }
        };
        #[cfg(feature = "parallel")]
        {
            self.velocities.par_iter_mut().for_each(apply_gravity);
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.velocities.iter_mut().for_each(apply_gravity);
        }

        self.solve_collision(world, step);
        if self.all_group_flags.contains(ParticleGroupFlags::RIGID) {
            self.solve_rigid(step);
        }
        if self.all_particle_flags.contains(ParticleFlags::WALL) {
            self.solve_wall();
        }

        let dt = step.dt;
        #[cfg(feature = "parallel")]
        {
            self.positions
                .par_iter_mut()
                .zip(self.velocities.par_iter())
                .for_each(|(p, v)| *p += *v * dt);
        }
        #[cfg(not(feature = "parallel"))]
        {
            for (p, v) in self.positions.iter_mut().zip(self.velocities.iter()) {
                *p += *v * dt;
            }
        }

        self.update_body_contacts(world);
        self.update_contacts(false);
        self.compute_weights();
        if self.all_particle_flags.contains(ParticleFlags::VISCOUS) {
            self.solve_viscous(world);
        }
        if self.all_particle_flags.contains(ParticleFlags::POWDER) {
            self.solve_powder(world, step);
        }
        if self.all_particle_flags.contains(ParticleFlags::TENSILE) {
            self.solve_tensile(step);
        }
        if self.all_particle_flags.contains(ParticleFlags::ELASTIC) {
            self.solve_elastic(step);
        }
        if self.all_particle_flags.contains(ParticleFlags::SPRING) {
            self.solve_spring(step);
        }
        if self.all_group_flags.contains(ParticleGroupFlags::SOLID) {
            self.solve_solid(step);
        }
        if self.all_particle_flags.contains(ParticleFlags::COLOR_MIXING) {
            self.solve_color_mixing();
        }
        self.solve_pressure(world, step);
        self.solve_damping(world);
    }

    /// Remove zombie particles and compact every buffer
    fn solve_zombie(&mut self, mut listener: Option<&mut (dyn ParticleDestructionListener + 'static)>) {
        let count = self.count();
        let mut new_indices = vec![INVALID_PARTICLE_INDEX; count];
        let mut new_count = 0;
        for i in 0..count {
            let flags = self.flags[i];
            if flags.contains(ParticleFlags::ZOMBIE) {
                if flags.contains(ParticleFlags::DESTRUCTION_LISTENER) {
                    if let Some(listener) = listener.as_deref_mut() {
                        listener.say_goodbye_particle(i);
                    }
                }
                continue;
            }
            new_indices[i] = new_count;
            if i != new_count {
                self.flags[new_count] = flags;
                self.positions[new_count] = self.positions[i];
                self.velocities[new_count] = self.velocities[i];
                self.colors[new_count] = self.colors[i];
                self.user_data[new_count] = self.user_data[i];
                self.group_of[new_count] = self.group_of[i];
                self.depth[new_count] = self.depth[i];
            }
            new_count += 1;
        }
        self.flags.truncate(new_count);
        self.positions.truncate(new_count);
        self.velocities.truncate(new_count);
        self.colors.truncate(new_count);
        self.user_data.truncate(new_count);
        self.group_of.truncate(new_count);
        self.depth.truncate(new_count);

        let remap = |i: usize| new_indices[i];
        self.proxies.retain_mut(|proxy| {
            proxy.index = remap(proxy.index);
            proxy.index != INVALID_PARTICLE_INDEX
        });
        self.contacts.retain_mut(|contact| {
            contact.index_a = remap(contact.index_a);
            contact.index_b = remap(contact.index_b);
            contact.index_a != INVALID_PARTICLE_INDEX && contact.index_b != INVALID_PARTICLE_INDEX
        });
        self.body_contacts.retain_mut(|contact| {
            contact.index = remap(contact.index);
            contact.index != INVALID_PARTICLE_INDEX
        });
        self.pairs.retain_mut(|pair| {
            pair.index_a = remap(pair.index_a);
            pair.index_b = remap(pair.index_b);
            pair.index_a != INVALID_PARTICLE_INDEX && pair.index_b != INVALID_PARTICLE_INDEX
        });
        self.triads.retain_mut(|triad| {
            triad.index_a = remap(triad.index_a);
            triad.index_b = remap(triad.index_b);
            triad.index_c = remap(triad.index_c);
            triad.index_a != INVALID_PARTICLE_INDEX
                && triad.index_b != INVALID_PARTICLE_INDEX
                && triad.index_c != INVALID_PARTICLE_INDEX
        });

        let mut modified_solid = Vec::new();
        for (id, group) in self.groups.iter_mut() {
            let mut first_index = new_count;
            let mut last_index = 0;
            let mut modified = false;
            for &j in &new_indices[group.range()] {
                if j == INVALID_PARTICLE_INDEX {
                    modified = true;
                } else {
                    first_index = first_index.min(j);
                    last_index = last_index.max(j + 1);
                }
            }
            if first_index < last_index {
                group.first_index = first_index;
                group.last_index = last_index;
                if modified && group.group_flags.contains(ParticleGroupFlags::SOLID) {
                    modified_solid.push(id);
                }
            } else {
                group.first_index = 0;
                group.last_index = 0;
                if group.destroy_automatically {
                    group.to_be_destroyed = true;
                }
            }
        }

        self.all_particle_flags = self
            .flags
            .iter()
            .fold(ParticleFlags::empty(), |acc, &f| acc | f);

        let doomed: Vec<ParticleGroupId> = self
            .groups
            .iter()
            .filter(|(_, g)| g.to_be_destroyed)
            .map(|(id, _)| id)
            .collect();
        for id in doomed {
            self.destroy_group(id, listener.as_deref_mut());
        }

        if !modified_solid.is_empty() {
            self.update_contacts(true);
            for id in modified_solid {
                if let Some(range) = self.groups.get(id).map(ParticleGroup::range) {
                    self.compute_depth_for_group(range);
                }
            }
        }
        debug!("removed {} particles", count - new_count);
    }

    /// Stop particles from passing through fixtures during this step
    fn solve_collision(&mut self, world: &mut World, step: &TimeStep) {
        let dt = step.dt;
        let mut aabb = Aabb::new(Vec2::new(f32::MAX, f32::MAX), Vec2::new(-f32::MAX, -f32::MAX));
        for (&p1, &v) in self.positions.iter().zip(self.velocities.iter()) {
            let p2 = p1 + v * dt;
            aabb.lower_bound = aabb.lower_bound.min(p1.min(p2));
            aabb.upper_bound = aabb.upper_bound.max(p1.max(p2));
        }
        let mut keys = mem::take(&mut self.fixture_scratch);
        query_fixtures(world, &aabb, &mut keys);

        let particle_mass = self.particle_mass();
        for key in &keys {
            let Some(fixture) = world.fixtures.get(key.fixture) else {
                continue;
            };
            if fixture.is_sensor {
                continue;
            }
            let body_id = fixture.body;
            let Some(body) = world.bodies.get(body_id) else {
                continue;
            };
            let child = key.child_index as usize;
            let Some(fixture_aabb) = fixture.aabb(child) else {
                continue;
            };
            let xf = body.xf;
            let xf0 = body.start_transform();

            let (lower, upper) = (fixture_aabb.lower_bound, fixture_aabb.upper_bound);
            for proxy in &self.proxies[self.proxy_range(lower, upper)] {
                let a = proxy.index;
                let ap = self.positions[a];
                if !(lower.x <= ap.x && ap.x <= upper.x && lower.y <= ap.y && ap.y <= upper.y) {
                    continue;
                }
                if let Some(filter) = world.contact_manager.contact_filter.as_mut() {
                    if !filter.should_collide_particle(fixture, a) {
                        continue;
                    }
                }
                let av = self.velocities[a];
                // Ray from where the particle sat relative to the body last step
                let input = RayCastInput {
                    p1: xf.mul_vec(xf0.mul_t_vec(ap)),
                    p2: ap + av * dt,
                    max_fraction: 1.0,
                };
                let Some(output) = fixture.shape.raycast(&input, &xf, child) else {
                    continue;
                };
                let n = output.normal;
                let p = input.p1 * (1.0 - output.fraction) + input.p2 * output.fraction + n * LINEAR_SLOP;
                let v = (p - ap) * step.inv_dt;
                self.velocities[a] = v;
                let f = (av - v) * particle_mass;
                let f = n * f.dot(n);
                if let Some(body) = world.bodies.get_mut(body_id) {
                    body.apply_linear_impulse(f, p, true);
                }
            }
        }
        self.fixture_scratch = keys;
    }

    fn solve_rigid(&mut self, step: &TimeStep) {
        let particle_mass = self.particle_mass();
        for (_, group) in self.groups.iter_mut() {
            if !group.group_flags.contains(ParticleGroupFlags::RIGID) {
                continue;
            }
            let stats = compute_statistics(&self.positions, &self.velocities, group.range(), particle_mass);
            let rotation = Rot::new(step.dt * stats.angular_velocity);
            let xf = Transform {
                p: stats.center + stats.linear_velocity * step.dt - rotation.mul_vec(stats.center),
                q: rotation,
            };
            group.transform = xf.mul(&group.transform);
            // Finite-difference velocity of the rigid motion
            let velocity_transform = Transform {
                p: xf.p * step.inv_dt,
                q: Rot {
                    s: step.inv_dt * xf.q.s,
                    c: step.inv_dt * (xf.q.c - 1.0),
                },
            };
            for i in group.range() {
                self.velocities[i] = velocity_transform.mul_vec(self.positions[i]);
            }
        }
    }

    fn solve_wall(&mut self) {
        let reset = |(flags, v): (&ParticleFlags, &mut Vec2)| {
            if flags.contains(ParticleFlags::WALL) {
                *v = Vec2::ZERO;
            }
        };
        #[cfg(feature = "parallel")]
        {
            self.flags.par_iter().zip(self.velocities.par_iter_mut()).for_each(reset);
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.flags.iter().zip(self.velocities.iter_mut()).for_each(reset);
        }
    }

    fn solve_viscous(&mut self, world: &mut World) {
        let viscous = self.config.viscous_strength;
        let inv_mass = self.particle_inv_mass();
        for contact in &self.body_contacts {
            let a = contact.index;
            if !self.flags[a].contains(ParticleFlags::VISCOUS) {
                continue;
            }
            let Some(body) = world.bodies.get_mut(contact.body) else {
                continue;
            };
            let p = self.positions[a];
            let v = body.linear_velocity_from_world_point(p) - self.velocities[a];
            let f = v * (viscous * contact.mass * contact.weight);
            self.velocities[a] += f * inv_mass;
            body.apply_linear_impulse(-f, p, true);
        }
        for contact in &self.contacts {
            if contact.flags.contains(ParticleFlags::VISCOUS) {
                let (a, b) = (contact.index_a, contact.index_b);
                let v = self.velocities[b] - self.velocities[a];
                let f = v * (viscous * contact.weight);
                self.velocities[a] += f;
                self.velocities[b] -= f;
            }
        }
    }

    fn solve_powder(&mut self, world: &mut World, step: &TimeStep) {
        let powder = self.config.powder_strength * self.critical_velocity(step);
        let min_weight = 1.0 - PARTICLE_STRIDE;
        let inv_mass = self.particle_inv_mass();
        for contact in &self.body_contacts {
            let a = contact.index;
            if !self.flags[a].contains(ParticleFlags::POWDER) || contact.weight <= min_weight {
                continue;
            }
            let f = contact.normal * (powder * contact.mass * (contact.weight - min_weight));
            self.velocities[a] -= f * inv_mass;
            if let Some(body) = world.bodies.get_mut(contact.body) {
                body.apply_linear_impulse(f, self.positions[a], true);
            }
        }
        for contact in &self.contacts {
            if contact.flags.contains(ParticleFlags::POWDER) && contact.weight > min_weight {
                let f = contact.normal * (powder * (contact.weight - min_weight));
                self.velocities[contact.index_a] -= f;
                self.velocities[contact.index_b] += f;
            }
        }
    }

    fn solve_tensile(&mut self, step: &TimeStep) {
        for v in &mut self.accumulation2 {
            *v = Vec2::ZERO;
        }
        for contact in &self.contacts {
            if contact.flags.contains(ParticleFlags::TENSILE) {
                let f = contact.normal * contact.weight;
                self.accumulation2[contact.index_a] -= f;
                self.accumulation2[contact.index_b] += f;
            }
        }
        let critical_velocity = self.critical_velocity(step);
        let strength_a = self.config.surface_tension_strength_a * critical_velocity;
        let strength_b = self.config.surface_tension_strength_b * critical_velocity;
        for contact in &self.contacts {
            if contact.flags.contains(ParticleFlags::TENSILE) {
                let (a, b) = (contact.index_a, contact.index_b);
                let n = contact.normal;
                let h = self.accumulation[a] + self.accumulation[b];
                let s = self.accumulation2[b] - self.accumulation2[a];
                let fn_ = (strength_a * (h - 2.0) + strength_b * s.dot(n)) * contact.weight;
                let f = n * fn_;
                self.velocities[a] -= f;
                self.velocities[b] += f;
            }
        }
    }

    fn solve_elastic(&mut self, step: &TimeStep) {
        let elastic = self.config.elastic_strength * self.critical_velocity(step);
        let dt = step.dt;
        for triad in &self.triads {
            if !triad.flags.contains(ParticleFlags::ELASTIC) {
                continue;
            }
            let (a, b, c) = (triad.index_a, triad.index_b, triad.index_c);
            let mut pa = self.positions[a] + self.velocities[a] * dt;
            let mut pb = self.positions[b] + self.velocities[b] * dt;
            let mut pc = self.positions[c] + self.velocities[c] * dt;
            let mid = (pa + pb + pc) * (1.0 / 3.0);
            pa -= mid;
            pb -= mid;
            pc -= mid;
            // Best-fit rotation from rest offsets to current offsets
            let s = triad.pa.cross(pa) + triad.pb.cross(pb) + triad.pc.cross(pc);
            let co = triad.pa.dot(pa) + triad.pb.dot(pb) + triad.pc.dot(pc);
            let r2 = s * s + co * co;
            if r2 <= 0.0 {
                continue;
            }
            let inv_r = 1.0 / sqrt(r2);
            let q = Rot {
                s: s * inv_r,
                c: co * inv_r,
            };
            let strength = elastic * triad.strength;
            self.velocities[a] += (q.mul_vec(triad.pa) - pa) * strength;
            self.velocities[b] += (q.mul_vec(triad.pb) - pb) * strength;
            self.velocities[c] += (q.mul_vec(triad.pc) - pc) * strength;
        }
    }

    fn solve_spring(&mut self, step: &TimeStep) {
        let spring = self.config.spring_strength * self.critical_velocity(step);
        let dt = step.dt;
        for pair in &self.pairs {
            if !pair.flags.contains(ParticleFlags::SPRING) {
                continue;
            }
            let (a, b) = (pair.index_a, pair.index_b);
            let pa = self.positions[a] + self.velocities[a] * dt;
            let pb = self.positions[b] + self.velocities[b] * dt;
            let d = pb - pa;
            let r1 = d.length();
            if r1 < EPSILON {
                continue;
            }
            let f = d * (spring * pair.strength * (pair.distance - r1) / r1);
            self.velocities[a] -= f;
            self.velocities[b] += f;
        }
    }

    fn solve_solid(&mut self, step: &TimeStep) {
        let ejection = self.config.ejection_strength * self.critical_velocity(step);
        for contact in &self.contacts {
            let (a, b) = (contact.index_a, contact.index_b);
            if self.group_of[a] != self.group_of[b] {
                let h = self.depth[a] + self.depth[b];
                let f = contact.normal * (ejection * h * contact.weight);
                self.velocities[a] -= f;
                self.velocities[b] += f;
            }
        }
    }

    fn solve_color_mixing(&mut self) {
        let strength = (256.0 * self.config.color_mixing_strength) as i32;
        for contact in &self.contacts {
            let (a, b) = (contact.index_a, contact.index_b);
            if (self.flags[a] & self.flags[b]).contains(ParticleFlags::COLOR_MIXING) {
                let (mut ca, mut cb) = (self.colors[a], self.colors[b]);
                ca.mix(&mut cb, strength);
                self.colors[a] = ca;
                self.colors[b] = cb;
            }
        }
    }

    fn solve_pressure(&mut self, world: &mut World, step: &TimeStep) {
        let critical_velocity = self.critical_velocity(step);
        let critical_pressure = self.config.density * critical_velocity * critical_velocity;
        let pressure_per_weight = self.config.pressure_strength * critical_pressure;

        if self.all_particle_flags.intersects(NO_PRESSURE_FLAGS) {
            for (w, flags) in self.accumulation.iter_mut().zip(self.flags.iter()) {
                if flags.intersects(NO_PRESSURE_FLAGS) {
                    *w = 0.0;
                }
            }
        }
        // Weights become pressures
        for w in &mut self.accumulation {
            *w = pressure_per_weight * (w.min(MAX_PARTICLE_WEIGHT) - MIN_PARTICLE_WEIGHT).max(0.0);
        }

        let velocity_per_pressure = step.dt / (self.config.density * self.diameter);
        let inv_mass = self.particle_inv_mass();
        for contact in &self.body_contacts {
            let a = contact.index;
            let p = self.positions[a];
            let h = self.accumulation[a] + pressure_per_weight * contact.weight;
            let f = contact.normal * (velocity_per_pressure * contact.weight * contact.mass * h);
            self.velocities[a] -= f * inv_mass;
            if let Some(body) = world.bodies.get_mut(contact.body) {
                body.apply_linear_impulse(f, p, true);
            }
        }
        for contact in &self.contacts {
            let (a, b) = (contact.index_a, contact.index_b);
            let h = self.accumulation[a] + self.accumulation[b];
            let f = contact.normal * (velocity_per_pressure * contact.weight * h);
            self.velocities[a] -= f;
            self.velocities[b] += f;
        }
    }

    fn solve_damping(&mut self, world: &mut World) {
        let damping = self.config.damping_strength;
        let inv_mass = self.particle_inv_mass();
        for contact in &self.body_contacts {
            let a = contact.index;
            let Some(body) = world.bodies.get_mut(contact.body) else {
                continue;
            };
            let p = self.positions[a];
            let v = body.linear_velocity_from_world_point(p) - self.velocities[a];
            let vn = v.dot(contact.normal);
            if vn < 0.0 {
                let f = contact.normal * (damping * contact.weight * contact.mass * vn);
                self.velocities[a] += f * inv_mass;
                body.apply_linear_impulse(-f, p, true);
            }
        }
        for contact in &self.contacts {
            let (a, b) = (contact.index_a, contact.index_b);
            let v = self.velocities[b] - self.velocities[a];
            let vn = v.dot(contact.normal);
            if vn < 0.0 {
                let f = contact.normal * (damping * contact.weight * vn);
                self.velocities[a] += f;
                self.velocities[b] -= f;
            }
        }
    }
}

fn compute_statistics(
    positions: &[Vec2],
    velocities: &[Vec2],
    range: Range<usize>,
    particle_mass: f32,
) -> ParticleGroupStatistics {
    let mut stats = ParticleGroupStatistics::default();
    for i in range.clone() {
        stats.mass += particle_mass;
        stats.center += positions[i] * particle_mass;
        stats.linear_velocity += velocities[i] * particle_mass;
    }
    if stats.mass > 0.0 {
        let inv_mass = 1.0 / stats.mass;
        stats.center *= inv_mass;
        stats.linear_velocity *= inv_mass;
    }
    let mut angular_momentum = 0.0;
    for i in range {
        let p = positions[i] - stats.center;
        let v = velocities[i] - stats.linear_velocity;
        stats.inertia += particle_mass * p.dot(p);
        angular_momentum += particle_mass * p.cross(v);
    }
    if stats.inertia > 0.0 {
        stats.angular_velocity = angular_momentum / stats.inertia;
    }
    stats
}

/// Broad-phase keys of every fixture child overlapping `aabb`
fn query_fixtures(world: &World, aabb: &Aabb, out: &mut Vec<FixtureProxyKey>) {
    out.clear();
    let broad_phase = &world.contact_manager.broad_phase;
    broad_phase.query(aabb, |proxy_id| {
        out.push(broad_phase.user_data(proxy_id));
        true
    });
}

// ============================================================================
// World API
// ============================================================================

impl World {
    pub(crate) fn solve_particles(&mut self, step: &TimeStep) {
        if self.particle_system.is_empty() && self.particle_system.group_count() == 0 {
            return;
        }
        let mut system = mem::take(&mut self.particle_system);
        system.solve(self, step);
        self.particle_system = system;
    }

    /// The particle buffers and solver state
    #[inline]
    pub fn particle_system(&self) -> &ParticleSystem {
        &self.particle_system
    }

    /// Create a particle and return its index.
    ///
    /// Indices shift when earlier particles are removed at a step.
    pub fn create_particle(&mut self, def: &ParticleDef) -> Result<usize, PhysicsError> {
        self.check_unlocked("create_particle")?;
        self.particle_system.create_particle(def)
    }

    /// Flag a particle for removal at the start of the next step
    pub fn destroy_particle(&mut self, index: usize, call_listener: bool) -> Result<(), PhysicsError> {
        self.particle_system.destroy_particle(index, call_listener)
    }

    /// Flag every particle inside `shape` for removal. Returns how many.
    pub fn destroy_particles_in_shape(
        &mut self,
        shape: &Shape,
        xf: &Transform,
        call_listener: bool,
    ) -> Result<usize, PhysicsError> {
        self.check_unlocked("destroy_particles_in_shape")?;
        let mut aabb = shape.compute_aabb(xf, 0);
        for child in 1..shape.child_count() {
            aabb = aabb.combine(&shape.compute_aabb(xf, child));
        }
        let system = &mut self.particle_system;
        let mut doomed = Vec::new();
        system.query_aabb(&aabb, |index| {
            if shape.test_point(xf, system.positions[index]) {
                doomed.push(index);
            }
            true
        });
        for &index in &doomed {
            system.destroy_particle(index, call_listener)?;
        }
        Ok(doomed.len())
    }

    /// Fill a shape with particles
    pub fn create_particle_group(&mut self, def: &ParticleGroupDef) -> Result<ParticleGroupId, PhysicsError> {
        self.check_unlocked("create_particle_group")?;
        Ok(self.particle_system.create_group(def))
    }

    /// Move the particles of `b` into `a` and destroy `b`
    pub fn join_particle_groups(&mut self, a: ParticleGroupId, b: ParticleGroupId) -> Result<(), PhysicsError> {
        self.check_unlocked("join_particle_groups")?;
        self.particle_system
            .join_groups(a, b, self.particle_destruction_listener.as_deref_mut())
    }

    /// Flag every particle of a group for removal
    pub fn destroy_particles_in_group(&mut self, id: ParticleGroupId, call_listener: bool) -> Result<(), PhysicsError> {
        self.check_unlocked("destroy_particles_in_group")?;
        let range = self
            .particle_system
            .group(id)
            .map(ParticleGroup::range)
            .ok_or(PhysicsError::InvalidHandle { kind: "particle group" })?;
        for index in range {
            self.particle_system.destroy_particle(index, call_listener)?;
        }
        Ok(())
    }

    #[inline]
    pub fn particle_count(&self) -> usize {
        self.particle_system.count()
    }

    #[inline]
    pub fn particle_group_count(&self) -> usize {
        self.particle_system.group_count()
    }

    #[inline]
    pub fn particle_group(&self, id: ParticleGroupId) -> Option<&ParticleGroup> {
        self.particle_system.group(id)
    }

    #[inline]
    pub fn particle_positions(&self) -> &[Vec2] {
        self.particle_system.positions()
    }

    #[inline]
    pub fn particle_velocities(&self) -> &[Vec2] {
        self.particle_system.velocities()
    }

    #[inline]
    pub fn particle_velocities_mut(&mut self) -> &mut [Vec2] {
        &mut self.particle_system.velocities
    }

    #[inline]
    pub fn particle_colors(&self) -> &[ParticleColor] {
        self.particle_system.colors()
    }

    #[inline]
    pub fn particle_colors_mut(&mut self) -> &mut [ParticleColor] {
        &mut self.particle_system.colors
    }

    #[inline]
    pub fn particle_flags(&self) -> &[ParticleFlags] {
        self.particle_system.flags()
    }

    /// Replace a particle's flags. Setting `ZOMBIE` destroys it at the next step.
    pub fn set_particle_flags(&mut self, index: usize, flags: ParticleFlags) -> Result<(), PhysicsError> {
        self.particle_system.set_particle_flags(index, flags)
    }

    #[inline]
    pub fn particle_user_data(&self) -> &[u64] {
        self.particle_system.user_data()
    }

    #[inline]
    pub fn particle_user_data_mut(&mut self) -> &mut [u64] {
        &mut self.particle_system.user_data
    }

    #[inline]
    pub fn particle_max_count(&self) -> usize {
        self.particle_system.config.max_count
    }

    /// Limit the particle count, 0 removes the limit
    pub fn set_particle_max_count(&mut self, count: usize) -> Result<(), PhysicsError> {
        self.particle_system.set_max_count(count)
    }

    #[inline]
    pub fn particle_radius(&self) -> f32 {
        self.particle_system.radius()
    }

    pub fn set_particle_radius(&mut self, radius: f32) -> Result<(), PhysicsError> {
        self.particle_system.set_radius(radius)
    }

    #[inline]
    pub fn particle_density(&self) -> f32 {
        self.particle_system.config.density
    }

    pub fn set_particle_density(&mut self, density: f32) -> Result<(), PhysicsError> {
        self.particle_system.set_density(density)
    }

    #[inline]
    pub fn particle_gravity_scale(&self) -> f32 {
        self.particle_system.config.gravity_scale
    }

    pub fn set_particle_gravity_scale(&mut self, scale: f32) {
        self.particle_system.set_gravity_scale(scale);
    }

    #[inline]
    pub fn particle_damping(&self) -> f32 {
        self.particle_system.config.damping_strength
    }

    pub fn set_particle_damping(&mut self, damping: f32) {
        self.particle_system.set_damping(damping);
    }

    #[inline]
    pub fn particle_contacts(&self) -> &[ParticleContact] {
        self.particle_system.contacts()
    }

    #[inline]
    pub fn particle_body_contacts(&self) -> &[ParticleBodyContact] {
        self.particle_system.body_contacts()
    }

    pub fn particle_group_statistics(&self, id: ParticleGroupId) -> Option<ParticleGroupStatistics> {
        self.particle_system.group_statistics(id)
    }

    pub fn compute_particle_collision_energy(&self) -> f32 {
        self.particle_system.compute_collision_energy()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyDef;
    use crate::shape::{CircleShape, PolygonShape};
    use std::cell::RefCell;
    use std::rc::Rc;

    const DT: f32 = 1.0 / 60.0;

    struct Recorder(Rc<RefCell<Vec<usize>>>, Rc<RefCell<u32>>);

    impl ParticleDestructionListener for Recorder {
        fn say_goodbye_particle(&mut self, index: usize) {
            self.0.borrow_mut().push(index);
        }

        fn say_goodbye_particle_group(&mut self, _group: ParticleGroupId) {
            *self.1.borrow_mut() += 1;
        }
    }

    fn particle(x: f32, y: f32, user_data: u64) -> ParticleDef {
        ParticleDef {
            position: Vec2::new(x, y),
            user_data,
            ..ParticleDef::default()
        }
    }

    #[test]
    fn test_tag_orders_rows_then_columns() {
        let a = compute_tag(0.0, 0.0);
        let b = compute_tag(3.0, 0.0);
        let c = compute_tag(-3.0, 1.0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(compute_relative_tag(a, 0, 1), compute_tag(0.0, 1.0));
    }

    #[test]
    fn test_create_particle() {
        let mut world = World::default();
        let i = world.create_particle(&particle(1.0, 2.0, 7)).unwrap();
        assert_eq!(i, 0);
        assert_eq!(world.particle_count(), 1);
        assert_eq!(world.particle_positions()[0], Vec2::new(1.0, 2.0));
        assert_eq!(world.particle_user_data()[0], 7);
        assert_eq!(world.particle_system().capacity(), MIN_PARTICLE_BUFFER_CAPACITY);
    }

    #[test]
    fn test_max_count_enforced() {
        let mut world = World::default();
        world.set_particle_max_count(2).unwrap();
        world.create_particle(&particle(0.0, 0.0, 0)).unwrap();
        world.create_particle(&particle(5.0, 0.0, 0)).unwrap();
        let err = world.create_particle(&particle(10.0, 0.0, 0)).unwrap_err();
        assert_eq!(
            err,
            PhysicsError::CapacityExceeded {
                resource: "particles",
                limit: 2
            }
        );
        assert_eq!(world.particle_count(), 2);
        assert!(matches!(
            world.set_particle_max_count(1),
            Err(PhysicsError::InvalidConfiguration { .. })
        ));
        assert!(world.set_particle_max_count(0).is_ok());
    }

    #[test]
    fn test_capacity_doubles() {
        let mut system = ParticleSystem::default();
        for i in 0..=MIN_PARTICLE_BUFFER_CAPACITY {
            system.create_particle(&particle(i as f32 * 2.0, 0.0, 0)).unwrap();
        }
        assert_eq!(system.capacity(), 2 * MIN_PARTICLE_BUFFER_CAPACITY);
    }

    #[test]
    fn test_destruction_is_deferred() {
        let mut world = World::new(Vec2::ZERO);
        let goodbyes = Rc::new(RefCell::new(Vec::new()));
        world.set_particle_destruction_listener(Recorder(goodbyes.clone(), Rc::new(RefCell::new(0))));
        for i in 0..3 {
            world.create_particle(&particle(i as f32 * 5.0, 0.0, i + 1)).unwrap();
        }
        world.destroy_particle(1, true).unwrap();
        assert_eq!(world.particle_count(), 3);
        assert!(goodbyes.borrow().is_empty());

        world.step(DT, 8, 3);
        assert_eq!(world.particle_count(), 2);
        assert_eq!(world.particle_user_data(), &[1, 3]);
        assert_eq!(*goodbyes.borrow(), vec![1]);
        assert!(world.destroy_particle(5, false).is_err());
    }

    #[test]
    fn test_particle_falls() {
        let mut world = World::default();
        world.create_particle(&particle(0.0, 10.0, 0)).unwrap();
        world.step(DT, 8, 3);
        assert!(world.particle_velocities()[0].y < 0.0);
        assert!(world.particle_positions()[0].y < 10.0);
    }

    #[test]
    fn test_critical_velocity_clamp() {
        let mut world = World::new(Vec2::ZERO);
        world
            .create_particle(&ParticleDef {
                velocity: Vec2::new(1000.0, 0.0),
                ..ParticleDef::default()
            })
            .unwrap();
        world.step(DT, 8, 3);
        let limit = world.particle_system().diameter() / DT;
        assert!(world.particle_velocities()[0].length() <= limit * 1.001);
    }

    #[test]
    fn test_group_fills_box() {
        let mut world = World::new(Vec2::ZERO);
        let def = ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0), Vec2::new(3.0, 4.0));
        let id = world.create_particle_group(&def).unwrap();
        let group = world.particle_group(id).unwrap();
        // Unit diameter gives a 0.75 stride: a 3x3 lattice inside the 2x2 box
        assert_eq!(group.particle_count(), 9);
        assert_eq!(group.range(), 0..9);
        assert_eq!(world.particle_count(), 9);
        for p in world.particle_positions() {
            assert!((p.x - 3.0).abs() <= 1.0 && (p.y - 4.0).abs() <= 1.0);
        }
        let lattice = [-0.75, 0.0, 0.75];
        for p in world.particle_positions() {
            assert!(lattice.iter().any(|&x| (p.x - 3.0 - x).abs() < 1e-5));
            assert!(lattice.iter().any(|&y| (p.y - 4.0 - y).abs() < 1e-5));
        }
        assert!(world.particle_system().groups_of().iter().all(|g| *g == Some(id)));
        assert!(!world.particle_contacts().is_empty());
    }

    #[test]
    fn test_spring_and_elastic_connections() {
        let mut world = World::new(Vec2::ZERO);
        let springy = ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0), Vec2::ZERO)
            .with_flags(ParticleFlags::SPRING);
        world.create_particle_group(&springy).unwrap();
        assert!(!world.particle_system().pairs().is_empty());
        assert!(world.particle_system().triads().is_empty());

        let elastic = ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0), Vec2::new(10.0, 0.0))
            .with_flags(ParticleFlags::ELASTIC);
        world.create_particle_group(&elastic).unwrap();
        let triads = world.particle_system().triads();
        assert!(!triads.is_empty());
        assert!(triads.iter().all(|t| t.index_a >= 9 && t.index_b >= 9 && t.index_c >= 9));
    }

    #[test]
    fn test_solid_group_depth() {
        let mut world = World::new(Vec2::ZERO);
        let def = ParticleGroupDef::new(PolygonShape::new_box(2.0, 2.0), Vec2::ZERO)
            .with_group_flags(ParticleGroupFlags::SOLID);
        world.create_particle_group(&def).unwrap();
        let depths = world.particle_system().depths();
        assert!(depths.iter().any(|&d| d > 0.0));
        assert!(depths.iter().any(|&d| d == 0.0));
    }

    #[test]
    fn test_join_groups() {
        let mut world = World::new(Vec2::ZERO);
        let groups_gone = Rc::new(RefCell::new(0));
        world.set_particle_destruction_listener(Recorder(Rc::new(RefCell::new(Vec::new())), groups_gone.clone()));
        let a = world
            .create_particle_group(&ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0), Vec2::ZERO))
            .unwrap();
        world.create_particle(&particle(50.0, 50.0, 99)).unwrap();
        let b = world
            .create_particle_group(&ParticleGroupDef::new(CircleShape::new(0.5), Vec2::new(1.5, 0.0)))
            .unwrap();
        let count_b = world.particle_group(b).unwrap().particle_count();

        world.join_particle_groups(a, b).unwrap();
        assert_eq!(world.particle_group_count(), 1);
        assert!(world.particle_group(b).is_none());
        assert_eq!(*groups_gone.borrow(), 1);
        let group = world.particle_group(a).unwrap();
        assert_eq!(group.particle_count(), 9 + count_b);
        for i in group.range() {
            assert_eq!(world.particle_system().groups_of()[i], Some(a));
        }
        // The loose particle was rotated in front of the joined range
        assert_eq!(world.particle_user_data()[0], 99);
        assert!(world.join_particle_groups(a, a).is_err());
    }

    #[test]
    fn test_destroy_group_particles_removes_group() {
        let mut world = World::new(Vec2::ZERO);
        let id = world
            .create_particle_group(&ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0), Vec2::ZERO))
            .unwrap();
        world.destroy_particles_in_group(id, false).unwrap();
        world.step(DT, 8, 3);
        assert_eq!(world.particle_count(), 0);
        assert_eq!(world.particle_group_count(), 0);
    }

    #[test]
    fn test_destroy_in_shape() {
        let mut world = World::new(Vec2::ZERO);
        world.create_particle(&particle(0.0, 0.0, 0)).unwrap();
        world.create_particle(&particle(0.5, 0.0, 0)).unwrap();
        world.create_particle(&particle(10.0, 0.0, 0)).unwrap();
        let shape = Shape::from(CircleShape::new(1.0));
        let n = world
            .destroy_particles_in_shape(&shape, &Transform::IDENTITY, false)
            .unwrap();
        assert_eq!(n, 2);
        world.step(DT, 8, 3);
        assert_eq!(world.particle_count(), 1);
        assert_eq!(world.particle_positions()[0].x, 10.0);
    }

    #[test]
    fn test_rotate_buffer_remaps() {
        let mut system = ParticleSystem::default();
        for i in 0..5 {
            system.create_particle(&particle(i as f32 * 5.0, 0.0, i)).unwrap();
        }
        system.rotate_buffer(1, 3, 5);
        assert_eq!(system.user_data(), &[0, 3, 4, 1, 2]);
        let mut indices: Vec<usize> = system.proxies.iter().map(|p| p.index).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        for proxy in &system.proxies {
            assert_eq!(system.user_data[proxy.index] as f32 * 5.0, system.positions[proxy.index].x);
        }
    }

    #[test]
    fn test_particles_rest_on_ground() {
        let mut world = World::default();
        let ground = world.create_body(&BodyDef::fixed(Vec2::new(0.0, -0.5))).unwrap();
        world
            .create_fixture_from_shape(ground, PolygonShape::new_box(10.0, 0.5), 0.0)
            .unwrap();
        world
            .create_particle_group(&ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0), Vec2::new(0.0, 2.0)))
            .unwrap();
        for _ in 0..120 {
            world.step(DT, 8, 3);
        }
        for p in world.particle_positions() {
            assert!(p.y > -0.5, "particle fell through the ground: {:?}", p);
        }
        assert!(!world.particle_body_contacts().is_empty());
    }

    #[test]
    fn test_particles_push_dynamic_body() {
        let mut world = World::default();
        let body = world.create_body(&BodyDef::dynamic(Vec2::new(0.0, 0.0))).unwrap();
        world
            .create_fixture_from_shape(body, PolygonShape::new_box(0.5, 0.5), 1.0)
            .unwrap();
        world.set_gravity(Vec2::ZERO);
        world
            .create_particle(&ParticleDef {
                position: Vec2::new(-0.9, 0.0),
                velocity: Vec2::new(5.0, 0.0),
                ..ParticleDef::default()
            })
            .unwrap();
        for _ in 0..10 {
            world.step(DT, 8, 3);
        }
        assert!(world.body(body).unwrap().linear_velocity().x > 0.0);
    }

    #[test]
    fn test_rigid_group_keeps_shape() {
        let mut world = World::default();
        let def = ParticleGroupDef::new(PolygonShape::new_box(1.0, 1.0), Vec2::ZERO)
            .with_group_flags(ParticleGroupFlags::RIGID)
            .with_velocity(Vec2::new(1.0, 0.0), 1.0);
        let id = world.create_particle_group(&def).unwrap();
        assert_eq!(world.particle_count(), 9);
        // Opposite corners of the 3x3 lattice
        let before = world.particle_positions()[0].distance(world.particle_positions()[8]);
        world.step(DT, 8, 3);
        let after = world.particle_positions()[0].distance(world.particle_positions()[8]);
        assert!((before - after).abs() < 1e-3);
        assert!(world.particle_group(id).unwrap().angle() > 0.0);
        let stats = world.particle_group_statistics(id).unwrap();
        assert!(stats.mass > 0.0);
        assert!(stats.angular_velocity > 0.0);
    }

    #[test]
    fn test_color_mixing() {
        let mut world = World::new(Vec2::ZERO);
        for (x, color) in [(0.0, ParticleColor::new(200, 0, 0, 255)), (0.5, ParticleColor::new(0, 0, 200, 255))] {
            world
                .create_particle(&ParticleDef {
                    flags: ParticleFlags::COLOR_MIXING,
                    position: Vec2::new(x, 0.0),
                    color,
                    ..ParticleDef::default()
                })
                .unwrap();
        }
        world.step(DT, 8, 3);
        let colors = world.particle_colors();
        assert!(colors[0].r < 200 && colors[0].b > 0);
        assert!(colors[1].r > 0 && colors[1].b < 200);
        assert_eq!(colors[0].a, 255);
    }

    #[test]
    fn test_collision_energy() {
        let mut world = World::new(Vec2::ZERO);
        assert_eq!(world.compute_particle_collision_energy(), 0.0);
        world
            .create_particle(&ParticleDef {
                position: Vec2::new(0.0, 0.0),
                velocity: Vec2::new(1.0, 0.0),
                ..ParticleDef::default()
            })
            .unwrap();
        world
            .create_particle(&ParticleDef {
                position: Vec2::new(0.6, 0.0),
                velocity: Vec2::new(-1.0, 0.0),
                ..ParticleDef::default()
            })
            .unwrap();
        world.particle_system.update_contacts(false);
        assert!(world.compute_particle_collision_energy() > 0.0);
    }

    #[test]
    fn test_config_setters() {
        let mut world = World::default();
        assert_eq!(world.particle_radius(), 0.5);
        world.set_particle_radius(0.25).unwrap();
        assert_eq!(world.particle_system().diameter(), 0.5);
        assert!(world.set_particle_radius(0.0).is_err());
        assert!(world.set_particle_density(-1.0).is_err());
        world.set_particle_density(2.0).unwrap();
        assert_eq!(world.particle_density(), 2.0);
        world.set_particle_gravity_scale(0.5);
        assert_eq!(world.particle_gravity_scale(), 0.5);
        world.set_particle_damping(0.3);
        assert_eq!(world.particle_damping(), 0.3);
    }

    #[test]
    fn test_wall_particles_stay() {
        let mut world = World::default();
        world
            .create_particle(&ParticleDef {
                flags: ParticleFlags::WALL,
                position: Vec2::new(1.0, 1.0),
                ..ParticleDef::default()
            })
            .unwrap();
        for _ in 0..10 {
            world.step(DT, 8, 3);
        }
        assert_eq!(world.particle_positions()[0], Vec2::new(1.0, 1.0));
    }
}
