//! Physics Error Types
//!
//! Unified error type for the engine. Structural operations on the world
//! (creating or destroying bodies, fixtures, joints and particles) return
//! `Result<T, PhysicsError>` instead of panicking. Solver numerics never
//! produce errors: degenerate constraints are skipped inside the step.

use core::fmt;

/// Unified error type for physics operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// The world is inside `step` (or a callback fired from it).
    WorldLocked,
    /// A handle does not refer to a live object.
    InvalidHandle {
        /// Kind of object the handle was meant to address
        kind: &'static str,
    },
    /// A capacity limit was exceeded (particle buffer, polygon vertices, ...).
    CapacityExceeded {
        /// What resource was exhausted
        resource: &'static str,
        /// The limit that was exceeded
        limit: usize,
    },
    /// Invalid configuration parameter.
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
    /// Input geometry cannot form a valid shape.
    DegenerateGeometry {
        /// Description of the degeneracy
        reason: &'static str,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorldLocked => write!(f, "world is locked during step"),
            Self::InvalidHandle { kind } => write!(f, "invalid {kind} handle"),
            Self::CapacityExceeded { resource, limit } => {
                write!(f, "{resource} capacity exceeded (limit={limit})")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            Self::DegenerateGeometry { reason } => {
                write!(f, "degenerate geometry: {reason}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PhysicsError {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = PhysicsError::InvalidHandle { kind: "body" };
        assert_eq!(format!("{}", e), "invalid body handle");
        assert!(format!("{}", PhysicsError::WorldLocked).contains("locked"));
    }

    #[test]
    fn test_capacity_exceeded() {
        let e = PhysicsError::CapacityExceeded {
            resource: "particles",
            limit: 256,
        };
        let s = format!("{}", e);
        assert!(s.contains("particles"));
        assert!(s.contains("256"));
    }

    #[test]
    fn test_error_variants() {
        let e1 = PhysicsError::DegenerateGeometry {
            reason: "polygon hull has fewer than 3 points",
        };
        let e2 = PhysicsError::InvalidConfiguration {
            reason: "density must be positive",
        };
        assert_ne!(e1, e2);
        assert!(format!("{}", e1).contains("hull"));
    }

    #[test]
    fn test_is_std_error() {
        fn takes(_: &dyn std::error::Error) {}
        takes(&PhysicsError::WorldLocked);
    }
}
