//! Continuous Collision Detection (CCD)
//!
//! Prevents fast-moving bodies from tunneling through thin geometry.
//!
//! # Algorithm
//!
//! Conservative advancement over two swept proxies: GJK finds the current
//! closest features, a separating axis is built from them, and a mixed
//! bisection/secant root finder locates the time at which the separation along
//! that axis reaches `target`. The axis is then rebuilt and the process repeats
//! until the proxies touch or are proven separated for the whole interval.

use crate::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::math::{abs, Sweep, Vec2};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES};

/// Outer conservative-advancement iteration limit
const MAX_ITERATIONS: usize = 1000;

/// Root finder iteration limit
const MAX_ROOT_ITERATIONS: usize = 50;

/// Time of impact query
#[derive(Clone, Copy, Debug)]
pub struct ToiInput {
    /// Shape A
    pub proxy_a: DistanceProxy,
    /// Shape B
    pub proxy_b: DistanceProxy,
    /// Motion of A
    pub sweep_a: Sweep,
    /// Motion of B
    pub sweep_b: Sweep,
    /// Upper bound of the sweep interval, usually 1
    pub t_max: f32,
}

/// Outcome of a time of impact query
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ToiState {
    /// Not computed
    #[default]
    Unknown,
    /// Root finder did not converge
    Failed,
    /// Shapes already overlap at the start of the interval
    Overlapped,
    /// Shapes reach the target separation at `t`
    Touching,
    /// Shapes never get closer than the target separation
    Separated,
}

/// Time of impact result
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ToiOutput {
    /// Outcome
    pub state: ToiState,
    /// Sweep fraction of the event
    pub t: f32,
}

// ============================================================================
// Separation function
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SeparationType {
    Points,
    FaceA,
    FaceB,
}

/// Separation along a fixed axis as a function of sweep time
struct SeparationFunction<'a> {
    proxy_a: &'a DistanceProxy,
    proxy_b: &'a DistanceProxy,
    sweep_a: Sweep,
    sweep_b: Sweep,
    kind: SeparationType,
    local_point: Vec2,
    axis: Vec2,
}

impl<'a> SeparationFunction<'a> {
    /// Build the axis from the GJK simplex at `t1`. Returns the function and its
    /// value at `t1`.
    fn new(
        cache: &SimplexCache,
        proxy_a: &'a DistanceProxy,
        sweep_a: Sweep,
        proxy_b: &'a DistanceProxy,
        sweep_b: Sweep,
        t1: f32,
    ) -> (Self, f32) {
        let xf_a = sweep_a.get_transform(t1);
        let xf_b = sweep_b.get_transform(t1);

        let mut f = Self {
            proxy_a,
            proxy_b,
            sweep_a,
            sweep_b,
            kind: SeparationType::Points,
            local_point: Vec2::ZERO,
            axis: Vec2::ZERO,
        };

        if cache.count == 1 {
            let local_point_a = proxy_a.vertex(usize::from(cache.index_a[0]));
            let local_point_b = proxy_b.vertex(usize::from(cache.index_b[0]));
            let point_a = xf_a.mul_vec(local_point_a);
            let point_b = xf_b.mul_vec(local_point_b);
            f.axis = point_b - point_a;
            let s = f.axis.normalize();
            return (f, s);
        }

        if cache.index_a[0] == cache.index_a[1] {
            // Two points on B and one on A
            f.kind = SeparationType::FaceB;
            let local_point_b1 = proxy_b.vertex(usize::from(cache.index_b[0]));
            let local_point_b2 = proxy_b.vertex(usize::from(cache.index_b[1]));

            f.axis = (local_point_b2 - local_point_b1).cross_scalar(1.0).normalized();
            let normal = xf_b.q.mul_vec(f.axis);

            f.local_point = (local_point_b1 + local_point_b2) * 0.5;
            let point_b = xf_b.mul_vec(f.local_point);

            let local_point_a = proxy_a.vertex(usize::from(cache.index_a[0]));
            let point_a = xf_a.mul_vec(local_point_a);

            let mut s = (point_a - point_b).dot(normal);
            if s < 0.0 {
                f.axis = -f.axis;
                s = -s;
            }
            (f, s)
        } else {
            // Two points on A and one or two points on B
            f.kind = SeparationType::FaceA;
            let local_point_a1 = proxy_a.vertex(usize::from(cache.index_a[0]));
            let local_point_a2 = proxy_a.vertex(usize::from(cache.index_a[1]));

            f.axis = (local_point_a2 - local_point_a1).cross_scalar(1.0).normalized();
            let normal = xf_a.q.mul_vec(f.axis);

            f.local_point = (local_point_a1 + local_point_a2) * 0.5;
            let point_a = xf_a.mul_vec(f.local_point);

            let local_point_b = proxy_b.vertex(usize::from(cache.index_b[0]));
            let point_b = xf_b.mul_vec(local_point_b);

            let mut s = (point_b - point_a).dot(normal);
            if s < 0.0 {
                f.axis = -f.axis;
                s = -s;
            }
            (f, s)
        }
    }

    /// Deepest points along the axis at `t`: separation and support indices
    fn find_min_separation(&self, t: f32) -> (f32, usize, usize) {
        let xf_a = self.sweep_a.get_transform(t);
        let xf_b = self.sweep_b.get_transform(t);

        match self.kind {
            SeparationType::Points => {
                let axis_a = xf_a.q.mul_t_vec(self.axis);
                let axis_b = xf_b.q.mul_t_vec(-self.axis);
                let index_a = self.proxy_a.support(axis_a);
                let index_b = self.proxy_b.support(axis_b);
                let point_a = xf_a.mul_vec(self.proxy_a.vertex(index_a));
                let point_b = xf_b.mul_vec(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(self.axis), index_a, index_b)
            }
            SeparationType::FaceA => {
                let normal = xf_a.q.mul_vec(self.axis);
                let point_a = xf_a.mul_vec(self.local_point);
                let axis_b = xf_b.q.mul_t_vec(-normal);
                let index_b = self.proxy_b.support(axis_b);
                let point_b = xf_b.mul_vec(self.proxy_b.vertex(index_b));
                ((point_b - point_a).dot(normal), 0, index_b)
            }
            SeparationType::FaceB => {
                let normal = xf_b.q.mul_vec(self.axis);
                let point_b = xf_b.mul_vec(self.local_point);
                let axis_a = xf_a.q.mul_t_vec(-normal);
                let index_a = self.proxy_a.support(axis_a);
                let point_a = xf_a.mul_vec(self.proxy_a.vertex(index_a));
                ((point_a - point_b).dot(normal), index_a, 0)
            }
        }
    }

    /// Separation of the given support points at `t`
    fn evaluate(&self, index_a: usize, index_b: usize, t: f32) -> f32 {
        let xf_a = self.sweep_a.get_transform(t);
        let xf_b = self.sweep_b.get_transform(t);

        match self.kind {
            SeparationType::Points => {
                let point_a = xf_a.mul_vec(self.proxy_a.vertex(index_a));
                let point_b = xf_b.mul_vec(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(self.axis)
            }
            SeparationType::FaceA => {
                let normal = xf_a.q.mul_vec(self.axis);
                let point_a = xf_a.mul_vec(self.local_point);
                let point_b = xf_b.mul_vec(self.proxy_b.vertex(index_b));
                (point_b - point_a).dot(normal)
            }
            SeparationType::FaceB => {
                let normal = xf_b.q.mul_vec(self.axis);
                let point_b = xf_b.mul_vec(self.local_point);
                let point_a = xf_a.mul_vec(self.proxy_a.vertex(index_a));
                (point_a - point_b).dot(normal)
            }
        }
    }
}

// ============================================================================
// Time of impact
// ============================================================================

/// First time in `[0, t_max]` at which the proxies come within
/// `max(LINEAR_SLOP, r_a + r_b - 3 * LINEAR_SLOP)` of each other.
///
/// Uses the skin radii as a target separation so that the solver has some
/// overlap margin to work with after the event.
#[must_use]
pub fn time_of_impact(input: &ToiInput) -> ToiOutput {
    let mut output = ToiOutput {
        state: ToiState::Unknown,
        t: input.t_max,
    };

    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;

    let mut sweep_a = input.sweep_a;
    let mut sweep_b = input.sweep_b;

    // Large rotations can make the root finder fail, so normalize the angles
    sweep_a.normalize();
    sweep_b.normalize();

    let t_max = input.t_max;

    let total_radius = proxy_a.radius + proxy_b.radius;
    let target = LINEAR_SLOP.max(total_radius - 3.0 * LINEAR_SLOP);
    let tolerance = 0.25 * LINEAR_SLOP;

    let mut t1 = 0.0;
    let mut iter = 0;

    // Prepare input for the distance query
    let mut cache = SimplexCache::default();
    let mut distance_input = DistanceInput {
        proxy_a: *proxy_a,
        proxy_b: *proxy_b,
        transform_a: sweep_a.get_transform(0.0),
        transform_b: sweep_b.get_transform(0.0),
        use_radii: false,
    };

    // The outer loop progressively attempts to compute new separating axes.
    // This loop terminates when an axis is repeated (no progress is made).
    loop {
        distance_input.transform_a = sweep_a.get_transform(t1);
        distance_input.transform_b = sweep_b.get_transform(t1);

        // Closest features at t1
        let distance_output = distance(&mut cache, &distance_input);

        // Overlapped: give up on continuous collision
        if distance_output.distance <= 0.0 {
            output.state = ToiState::Overlapped;
            output.t = 0.0;
            break;
        }

        if distance_output.distance < target + tolerance {
            output.state = ToiState::Touching;
            output.t = t1;
            break;
        }

        let (fcn, _) = SeparationFunction::new(&cache, proxy_a, sweep_a, proxy_b, sweep_b, t1);

        // Resolve the deepest point; this loop is bounded by the vertex count
        let mut done = false;
        let mut t2 = t_max;
        let mut push_back_iter = 0;
        loop {
            let (mut s2, index_a, index_b) = fcn.find_min_separation(t2);

            // Final configuration is separated
            if s2 > target + tolerance {
                output.state = ToiState::Separated;
                output.t = t_max;
                done = true;
                break;
            }

            // Separation reached tolerance: advance the sweep
            if s2 > target - tolerance {
                t1 = t2;
                break;
            }

            let mut s1 = fcn.evaluate(index_a, index_b, t1);

            // Initial separation is already below the target: the root finder
            // cannot make progress
            if s1 < target - tolerance {
                output.state = ToiState::Failed;
                output.t = t1;
                done = true;
                break;
            }

            // Touching at t1
            if s1 <= target + tolerance {
                output.state = ToiState::Touching;
                output.t = t1;
                done = true;
                break;
            }

            // 1D root of f(t) - target = 0
            let mut root_iter_count = 0;
            let mut a1 = t1;
            let mut a2 = t2;
            loop {
                // Mix secant and bisection for guaranteed progress
                let t = if root_iter_count & 1 == 1 {
                    a1 + (target - s1) * (a2 - a1) / (s2 - s1)
                } else {
                    0.5 * (a1 + a2)
                };
                root_iter_count += 1;

                let s = fcn.evaluate(index_a, index_b, t);

                if abs(s - target) < tolerance {
                    t2 = t;
                    break;
                }

                // Keep the bracket around the root
                if s > target {
                    a1 = t;
                    s1 = s;
                } else {
                    a2 = t;
                    s2 = s;
                }

                if root_iter_count == MAX_ROOT_ITERATIONS {
                    break;
                }
            }

            push_back_iter += 1;
            if push_back_iter == MAX_POLYGON_VERTICES {
                break;
            }
        }

        iter += 1;

        if done {
            break;
        }

        if iter == MAX_ITERATIONS {
            // Root finder got stuck. Semi-victory.
            output.state = ToiState::Failed;
            output.t = t1;
            break;
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{CircleShape, EdgeShape, PolygonShape, Shape};

    fn sweep(c0: Vec2, c: Vec2, a0: f32, a: f32) -> Sweep {
        Sweep {
            local_center: Vec2::ZERO,
            c0,
            c,
            a0,
            a,
            alpha0: 0.0,
        }
    }

    #[test]
    fn test_circles_touch() {
        let circle = Shape::Circle(CircleShape::new(0.5));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&circle, 0),
            proxy_b: DistanceProxy::new(&circle, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(5.0, 0.0), Vec2::new(-5.0, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);
        // Center distance at impact equals the target 1 - 3 * slop
        let expected = (5.0 - (1.0 - 3.0 * LINEAR_SLOP)) / 10.0;
        assert!((out.t - expected).abs() < 1e-3, "t = {}", out.t);
    }

    #[test]
    fn test_separating_motion() {
        let circle = Shape::Circle(CircleShape::new(0.5));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&circle, 0),
            proxy_b: DistanceProxy::new(&circle, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(2.0, 0.0), Vec2::new(4.0, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Separated);
        assert_eq!(out.t, 1.0);
    }

    #[test]
    fn test_overlapped_at_start() {
        let b = Shape::Polygon(PolygonShape::new_box(1.0, 1.0));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&b, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(0.5, 0.0), Vec2::new(0.5, 0.0), 0.0, 0.0),
            t_max: 1.0,
        };
        assert_eq!(time_of_impact(&input).state, ToiState::Overlapped);
    }

    #[test]
    fn test_bullet_against_thin_edge() {
        let edge = Shape::Edge(EdgeShape::new(Vec2::new(-5.0, 0.0), Vec2::new(5.0, 0.0)));
        let bullet = Shape::Circle(CircleShape::new(0.1));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&edge, 0),
            proxy_b: DistanceProxy::new(&bullet, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(0.0, 0.5), Vec2::new(0.0, -0.33), 0.0, 0.0),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);
        let y = 0.5 - 0.83 * out.t;
        assert!(y > 0.0 && y < 0.11, "y = {y}");
    }

    #[test]
    fn test_rotating_box_hits_wall() {
        let b = Shape::Polygon(PolygonShape::new_box(0.5, 0.1));
        let wall = Shape::Polygon(PolygonShape::new_box(0.1, 5.0));
        let input = ToiInput {
            proxy_a: DistanceProxy::new(&wall, 0),
            proxy_b: DistanceProxy::new(&b, 0),
            sweep_a: sweep(Vec2::ZERO, Vec2::ZERO, 0.0, 0.0),
            sweep_b: sweep(Vec2::new(-3.0, 0.0), Vec2::new(3.0, 0.0), 0.0, 3.0),
            t_max: 1.0,
        };
        let out = time_of_impact(&input);
        assert_eq!(out.state, ToiState::Touching);
        assert!(out.t > 0.0 && out.t < 0.5);
    }
}
