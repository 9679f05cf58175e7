//! Physics Profiling API
//!
//! Per-stage timers and counters for `World::step`.
//!
//! # Profiled Stages
//!
//! - Step (the whole call)
//! - Collide (narrow phase over the contact list)
//! - Solve (islands), split into init / velocity / position
//! - Broadphase (proxy synchronization and new pairs)
//! - Solve TOI (continuous collision sub-steps)
//! - Solve particle system
//!
//! With the `std` feature, times are wall-clock milliseconds measured with
//! `std::time::Instant`. Without it every timer reads zero; the counters in
//! [`StepStats`] still work.

#[cfg(feature = "std")]
use std::time::Instant;

/// A single profiling timer entry (milliseconds)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProfileEntry {
    /// Total accumulated time
    pub total: f32,
    /// Number of recorded steps
    pub call_count: u64,
    /// Last step's time
    pub last: f32,
    /// Peak time of a single step
    pub peak: f32,
}

impl ProfileEntry {
    /// Average time per step
    #[inline]
    pub fn average(&self) -> f32 {
        if self.call_count == 0 {
            0.0
        } else {
            self.total / self.call_count as f32
        }
    }

    /// Record a measurement
    pub fn record(&mut self, ms: f32) {
        self.total += ms;
        self.call_count += 1;
        self.last = ms;
        if ms > self.peak {
            self.peak = ms;
        }
    }

    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Physics step statistics (per-step counters)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Live contacts after the collide pass
    pub contacts: u32,
    /// Touching, enabled, non-sensor contacts solved in islands
    pub solved_contacts: u32,
    /// Islands solved by the discrete solver
    pub islands: u32,
    /// Awake bodies at the end of the step
    pub awake_bodies: u32,
    /// Time-of-impact events resolved
    pub toi_events: u32,
}

/// Raw stage times of the step in progress
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct StepTimes {
    pub step: f32,
    pub collide: f32,
    pub solve: f32,
    pub solve_init: f32,
    pub solve_velocity: f32,
    pub solve_position: f32,
    pub broadphase: f32,
    pub solve_toi: f32,
    pub solve_particle_system: f32,
}

/// Stage timings of `World::step`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Profile {
    pub step: ProfileEntry,
    pub collide: ProfileEntry,
    pub solve: ProfileEntry,
    pub solve_init: ProfileEntry,
    pub solve_velocity: ProfileEntry,
    pub solve_position: ProfileEntry,
    pub broadphase: ProfileEntry,
    pub solve_toi: ProfileEntry,
    pub solve_particle_system: ProfileEntry,
    /// Counters of the last step
    pub stats: StepStats,
    /// Number of recorded steps
    pub frame_count: u64,
}

impl Profile {
    /// Fold one step's times into the entries
    pub(crate) fn record(&mut self, times: &StepTimes, stats: StepStats) {
        self.step.record(times.step);
        self.collide.record(times.collide);
        self.solve.record(times.solve);
        self.solve_init.record(times.solve_init);
        self.solve_velocity.record(times.solve_velocity);
        self.solve_position.record(times.solve_position);
        self.broadphase.record(times.broadphase);
        self.solve_toi.record(times.solve_toi);
        self.solve_particle_system.record(times.solve_particle_system);
        self.stats = stats;
        self.frame_count += 1;
    }

    /// `(name, last, average, peak)` for every stage
    pub fn summary(&self) -> [(&'static str, f32, f32, f32); 9] {
        let row = |name, e: &ProfileEntry| (name, e.last, e.average(), e.peak);
        [
            row("step", &self.step),
            row("collide", &self.collide),
            row("solve", &self.solve),
            row("solve_init", &self.solve_init),
            row("solve_velocity", &self.solve_velocity),
            row("solve_position", &self.solve_position),
            row("broadphase", &self.broadphase),
            row("solve_toi", &self.solve_toi),
            row("solve_particle_system", &self.solve_particle_system),
        ]
    }

    /// Reset all profiling data
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Stopwatch reading milliseconds
#[derive(Clone, Copy, Debug)]
pub(crate) struct Timer {
    #[cfg(feature = "std")]
    start: Instant,
}

impl Timer {
    #[inline]
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "std")]
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Milliseconds since creation or the last reset
    #[inline]
    pub fn milliseconds(&self) -> f32 {
        #[cfg(feature = "std")]
        {
            self.start.elapsed().as_secs_f32() * 1000.0
        }
        #[cfg(not(feature = "std"))]
        {
            0.0
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_entry_record() {
        let mut entry = ProfileEntry::default();
        entry.record(2.0);
        entry.record(4.0);
        entry.record(3.0);
        assert_eq!(entry.call_count, 3);
        assert_eq!(entry.last, 3.0);
        assert_eq!(entry.peak, 4.0);
        assert!((entry.average() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_profile_entry_reset() {
        let mut entry = ProfileEntry::default();
        entry.record(1.5);
        entry.reset();
        assert_eq!(entry, ProfileEntry::default());
        assert_eq!(entry.average(), 0.0);
    }

    #[test]
    fn test_profile_record_step() {
        let mut profile = Profile::default();
        let times = StepTimes {
            step: 1.0,
            collide: 0.25,
            ..StepTimes::default()
        };
        let stats = StepStats {
            islands: 2,
            ..StepStats::default()
        };
        profile.record(&times, stats);
        assert_eq!(profile.frame_count, 1);
        assert_eq!(profile.step.last, 1.0);
        assert_eq!(profile.stats.islands, 2);
        let summary = profile.summary();
        assert_eq!(summary[1].0, "collide");
        assert_eq!(summary[1].1, 0.25);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_timer_monotonic() {
        let timer = Timer::new();
        let a = timer.milliseconds();
        let b = timer.milliseconds();
        assert!(a >= 0.0);
        assert!(b >= a);
    }
}
