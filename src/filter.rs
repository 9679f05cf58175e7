//! Collision Filtering (Category/Mask/Group)
//!
//! Bitmask-based filtering for controlling which fixtures can interact.
//!
//! # Usage
//!
//! ```ignore
//! use alice_physics2d::filter::Filter;
//!
//! // Category 0 = player, category 1 = enemy, category 2 = projectile
//! let player = Filter::new(1 << 0, (1 << 1) | (1 << 2)); // collides with enemy + projectile
//! let enemy  = Filter::new(1 << 1, (1 << 0) | (1 << 2)); // collides with player + projectile
//! let ghost  = Filter::new(1 << 3, 0);                    // collides with nothing
//! ```

use crate::fixture::Fixture;

/// Contact filtering data of a fixture.
///
/// Two fixtures collide iff they share a positive group index, or (no
/// negative shared group and) each one's category is in the other's mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    /// Which categories this fixture belongs to (bitmask)
    pub category_bits: u16,
    /// Which categories this fixture collides with (bitmask)
    pub mask_bits: u16,
    /// Same positive group always collides, same negative group never does
    pub group_index: i16,
}

impl Filter {
    /// Default filter: category 1, collides with everything
    pub const DEFAULT: Self = Self {
        category_bits: 0x0001,
        mask_bits: 0xFFFF,
        group_index: 0,
    };

    /// Filter that collides with nothing
    pub const NONE: Self = Self {
        category_bits: 0,
        mask_bits: 0,
        group_index: 0,
    };

    /// Create a new filter
    #[inline]
    pub const fn new(category_bits: u16, mask_bits: u16) -> Self {
        Self {
            category_bits,
            mask_bits,
            group_index: 0,
        }
    }

    /// Filter with a group index
    #[inline]
    pub const fn with_group(mut self, group_index: i16) -> Self {
        self.group_index = group_index;
        self
    }

    /// Check if two filters allow collision
    #[inline]
    pub fn should_collide(a: &Self, b: &Self) -> bool {
        if a.group_index == b.group_index && a.group_index != 0 {
            return a.group_index > 0;
        }
        (a.mask_bits & b.category_bits) != 0 && (a.category_bits & b.mask_bits) != 0
    }
}

impl Default for Filter {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// User hook deciding whether two fixtures may create a contact.
///
/// Called from the broad phase when a new pair appears and again for
/// contacts flagged by [`World::refilter`](crate::World::refilter).
pub trait ContactFilter {
    /// Return false to prevent a contact between the fixtures
    fn should_collide(&mut self, fixture_a: &Fixture, fixture_b: &Fixture) -> bool {
        Filter::should_collide(&fixture_a.filter_data(), &fixture_b.filter_data())
    }

    /// Return false to let a particle pass through a fixture
    fn should_collide_particle(&mut self, _fixture: &Fixture, _particle_index: usize) -> bool {
        true
    }
}

/// Filter that applies [`Filter::should_collide`] only
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultContactFilter;

impl ContactFilter for DefaultContactFilter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        let a = Filter::DEFAULT;
        let b = Filter::default();
        assert!(Filter::should_collide(&a, &b));
    }

    #[test]
    fn test_mask_excludes() {
        let player = Filter::new(1 << 0, 1 << 1);
        let enemy = Filter::new(1 << 1, 1 << 0);
        let ghost = Filter::new(1 << 3, 0);
        assert!(Filter::should_collide(&player, &enemy));
        assert!(!Filter::should_collide(&player, &ghost));
        assert!(!Filter::should_collide(&ghost, &enemy));
        assert!(!Filter::should_collide(&Filter::NONE, &Filter::DEFAULT));
    }

    #[test]
    fn test_positive_group_overrides_mask() {
        let a = Filter::new(1, 0).with_group(3);
        let b = Filter::new(2, 0).with_group(3);
        assert!(Filter::should_collide(&a, &b));
    }

    #[test]
    fn test_negative_group_never_collides() {
        let a = Filter::DEFAULT.with_group(-2);
        let b = Filter::DEFAULT.with_group(-2);
        assert!(!Filter::should_collide(&a, &b));
        // Different groups fall back to the masks
        let c = Filter::DEFAULT.with_group(-3);
        assert!(Filter::should_collide(&a, &c));
    }
}
