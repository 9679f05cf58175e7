//! Engine Settings
//!
//! Global tuning constants shared by the collision and solver stages, the
//! per-step `TimeStep` record, and the user-facing `WorldConfig`.
//!
//! Lengths are in meters and angles in radians. The constants are tuned for
//! moving objects between 0.1 and 10 meters.

use crate::math::{Vec2, PI};

// ============================================================================
// Collision
// ============================================================================

/// Maximum number of contact points between two convex shapes
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Fat AABB margin added on every side of a proxy
pub const AABB_EXTENSION: f32 = 0.1;

/// Fat AABB displacement multiplier (predictive enlargement)
pub const AABB_MULTIPLIER: f32 = 2.0;

/// Collision and constraint tolerance
pub const LINEAR_SLOP: f32 = 0.005;

/// Angular collision and constraint tolerance
pub const ANGULAR_SLOP: f32 = 2.0 / 180.0 * PI;

/// Skin radius of polygons
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Maximum number of sub-steps per contact in the TOI pass
pub const MAX_SUB_STEPS: u32 = 8;

// ============================================================================
// Dynamics
// ============================================================================

/// Maximum number of contacts handled in one TOI island
pub const MAX_TOI_CONTACTS: usize = 32;

/// Relative normal velocity below which collisions are inelastic
pub const VELOCITY_THRESHOLD: f32 = 1.0;

/// Maximum linear position correction per position iteration
pub const MAX_LINEAR_CORRECTION: f32 = 0.2;

/// Maximum angular position correction per position iteration
pub const MAX_ANGULAR_CORRECTION: f32 = 8.0 / 180.0 * PI;

/// Maximum linear translation of a body per step
pub const MAX_TRANSLATION: f32 = 2.0;
/// Squared `MAX_TRANSLATION`
pub const MAX_TRANSLATION_SQUARED: f32 = MAX_TRANSLATION * MAX_TRANSLATION;

/// Maximum rotation of a body per step
pub const MAX_ROTATION: f32 = 0.5 * PI;
/// Squared `MAX_ROTATION`
pub const MAX_ROTATION_SQUARED: f32 = MAX_ROTATION * MAX_ROTATION;

/// Fraction of overlap resolved per position iteration
pub const BAUMGARTE: f32 = 0.2;

/// Baumgarte factor used by the TOI position solver
pub const TOI_BAUMGARTE: f32 = 0.75;

// ============================================================================
// Sleep
// ============================================================================

/// Seconds a body must be still before it falls asleep
pub const TIME_TO_SLEEP: f32 = 0.5;

/// Linear velocity below which a body may sleep
pub const LINEAR_SLEEP_TOLERANCE: f32 = 0.01;

/// Angular velocity below which a body may sleep
pub const ANGULAR_SLEEP_TOLERANCE: f32 = 2.0 / 180.0 * PI;

// ============================================================================
// Particles
// ============================================================================

/// Remap value of a removed particle
pub const INVALID_PARTICLE_INDEX: usize = usize::MAX;

/// Initial capacity of the particle buffers
pub const MIN_PARTICLE_BUFFER_CAPACITY: usize = 256;

/// Lattice spacing of group particles, relative to the particle diameter
pub const PARTICLE_STRIDE: f32 = 0.75;

/// Weight below which a particle feels no pressure
pub const MIN_PARTICLE_WEIGHT: f32 = 1.0;

/// Weight at which pressure saturates
pub const MAX_PARTICLE_WEIGHT: f32 = 5.0;

/// Maximum triad edge length, relative to the particle diameter
pub const MAX_TRIAD_DISTANCE: f32 = 2.0;
/// Squared `MAX_TRIAD_DISTANCE`
pub const MAX_TRIAD_DISTANCE_SQUARED: f32 = MAX_TRIAD_DISTANCE * MAX_TRIAD_DISTANCE;

// ============================================================================
// Time step
// ============================================================================

/// Parameters of one call to `World::step`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeStep {
    /// Time step in seconds
    pub dt: f32,
    /// Inverse time step (0 when `dt == 0`)
    pub inv_dt: f32,
    /// `dt * inv_dt0`, ratio to the previous step
    pub dt_ratio: f32,
    /// Velocity iterations
    pub velocity_iterations: u32,
    /// Position iterations
    pub position_iterations: u32,
    /// Whether impulses from the previous step seed the solver
    pub warm_starting: bool,
}

// ============================================================================
// World configuration
// ============================================================================

/// Construction-time world configuration
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldConfig {
    /// Global gravity vector
    pub gravity: Vec2,
    /// Bodies may fall asleep
    pub allow_sleep: bool,
    /// Seed the solver with last step's impulses
    pub warm_starting: bool,
    /// Run the time-of-impact pass
    pub continuous_physics: bool,
    /// Stop the TOI pass after a single event (debugging aid)
    pub sub_stepping: bool,
    /// Clear forces automatically at the end of every step
    pub auto_clear_forces: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -10.0),
            allow_sleep: true,
            warm_starting: true,
            continuous_physics: true,
            sub_stepping: false,
            auto_clear_forces: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_radius_tracks_slop() {
        assert!((POLYGON_RADIUS - 0.01).abs() < 1e-7);
        assert!(AABB_EXTENSION > LINEAR_SLOP);
    }

    #[test]
    fn test_default_config() {
        let cfg = WorldConfig::default();
        assert_eq!(cfg.gravity, Vec2::new(0.0, -10.0));
        assert!(cfg.allow_sleep && cfg.warm_starting && cfg.continuous_physics);
        assert!(!cfg.sub_stepping);
        assert!(cfg.auto_clear_forces);
    }
}
