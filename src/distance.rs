//! GJK Distance
//!
//! Closest points between two convex proxies using the Gilbert-Johnson-Keerthi
//! algorithm with barycentric simplex reduction. The simplex can be cached
//! between calls so that temporally coherent queries converge in one or two
//! iterations.
//!
//! # Usage
//!
//! The TOI solver and `test_overlap` both drive this module. A proxy is a
//! vertex cloud plus a skin radius; radii are applied only when
//! `use_radii` is set.

use crate::math::{Transform, Vec2, EPSILON};
use crate::settings::MAX_POLYGON_VERTICES;
use crate::shape::Shape;

/// GJK iteration limit
const MAX_ITERS: usize = 20;

// ============================================================================
// Proxy
// ============================================================================

/// Convex vertex cloud used by GJK
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceProxy {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    /// Skin radius
    pub radius: f32,
}

impl DistanceProxy {
    /// Proxy for child `index` of `shape`
    #[must_use]
    pub fn new(shape: &Shape, index: usize) -> Self {
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let (count, radius) = match shape {
            Shape::Circle(c) => {
                vertices[0] = c.p;
                (1, c.radius)
            }
            Shape::Polygon(p) => {
                vertices[..p.count].copy_from_slice(p.vertices());
                (p.count, p.radius)
            }
            Shape::Edge(e) => {
                vertices[0] = e.vertex1;
                vertices[1] = e.vertex2;
                (2, e.radius)
            }
            Shape::Chain(c) => {
                vertices[0] = c.vertices[index];
                vertices[1] = c.vertices[index + 1];
                (2, c.radius)
            }
        };
        Self {
            vertices,
            count,
            radius,
        }
    }

    /// Proxy over an explicit point set (at most `MAX_POLYGON_VERTICES`)
    #[must_use]
    pub fn from_points(points: &[Vec2], radius: f32) -> Self {
        let count = points.len().min(MAX_POLYGON_VERTICES);
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[..count].copy_from_slice(&points[..count]);
        Self {
            vertices,
            count,
            radius,
        }
    }

    /// Number of vertices
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.count
    }

    /// Vertex by index
    #[inline]
    #[must_use]
    pub fn vertex(&self, index: usize) -> Vec2 {
        self.vertices[index]
    }

    /// Index of the vertex farthest along `d`
    #[must_use]
    pub fn support(&self, d: Vec2) -> usize {
        let mut best_index = 0;
        let mut best_value = self.vertices[0].dot(d);
        for i in 1..self.count {
            let value = self.vertices[i].dot(d);
            if value > best_value {
                best_index = i;
                best_value = value;
            }
        }
        best_index
    }

    /// Vertex farthest along `d`
    #[inline]
    #[must_use]
    pub fn support_vertex(&self, d: Vec2) -> Vec2 {
        self.vertices[self.support(d)]
    }
}

// ============================================================================
// Cache, input, output
// ============================================================================

/// Warm-start data for GJK, kept by the caller between queries
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SimplexCache {
    /// Length or area of the cached simplex
    pub metric: f32,
    /// Number of cached vertices
    pub count: usize,
    /// Vertex indices on shape A
    pub index_a: [u8; 3],
    /// Vertex indices on shape B
    pub index_b: [u8; 3],
}

/// GJK query
#[derive(Clone, Copy, Debug)]
pub struct DistanceInput {
    /// Shape A
    pub proxy_a: DistanceProxy,
    /// Shape B
    pub proxy_b: DistanceProxy,
    /// Pose of A
    pub transform_a: Transform,
    /// Pose of B
    pub transform_b: Transform,
    /// Account for the proxies' skin radii
    pub use_radii: bool,
}

/// GJK result
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DistanceOutput {
    /// Closest point on A
    pub point_a: Vec2,
    /// Closest point on B
    pub point_b: Vec2,
    /// Distance between the closest points
    pub distance: f32,
    /// Number of GJK iterations used
    pub iterations: usize,
}

// ============================================================================
// Simplex
// ============================================================================

#[derive(Clone, Copy, Debug, Default)]
struct SimplexVertex {
    /// Support point in A
    w_a: Vec2,
    /// Support point in B
    w_b: Vec2,
    /// `w_b - w_a`
    w: Vec2,
    /// Barycentric coordinate of the closest point
    a: f32,
    index_a: usize,
    index_b: usize,
}

#[derive(Clone, Copy, Debug, Default)]
struct Simplex {
    v: [SimplexVertex; 3],
    count: usize,
}

impl Simplex {
    fn vertex_from(
        index_a: usize,
        index_b: usize,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> SimplexVertex {
        let w_a = xf_a.mul_vec(proxy_a.vertex(index_a));
        let w_b = xf_b.mul_vec(proxy_b.vertex(index_b));
        SimplexVertex {
            w_a,
            w_b,
            w: w_b - w_a,
            a: 0.0,
            index_a,
            index_b,
        }
    }

    fn read_cache(
        cache: &SimplexCache,
        proxy_a: &DistanceProxy,
        xf_a: &Transform,
        proxy_b: &DistanceProxy,
        xf_b: &Transform,
    ) -> Self {
        let mut s = Self {
            count: cache.count.min(3),
            ..Self::default()
        };
        for i in 0..s.count {
            let ia = usize::from(cache.index_a[i]).min(proxy_a.count.saturating_sub(1));
            let ib = usize::from(cache.index_b[i]).min(proxy_b.count.saturating_sub(1));
            s.v[i] = Self::vertex_from(ia, ib, proxy_a, xf_a, proxy_b, xf_b);
        }

        // Flush the cache if the simplex shape changed a lot
        if s.count > 1 {
            let metric1 = cache.metric;
            let metric2 = s.metric();
            if metric2 < 0.5 * metric1 || 2.0 * metric1 < metric2 || metric2 < EPSILON {
                s.count = 0;
            }
        }

        if s.count == 0 {
            s.v[0] = Self::vertex_from(0, 0, proxy_a, xf_a, proxy_b, xf_b);
            s.v[0].a = 1.0;
            s.count = 1;
        }
        s
    }

    fn write_cache(&self, cache: &mut SimplexCache) {
        cache.metric = self.metric();
        cache.count = self.count;
        for i in 0..self.count {
            cache.index_a[i] = self.v[i].index_a as u8;
            cache.index_b[i] = self.v[i].index_b as u8;
        }
    }

    fn search_direction(&self) -> Vec2 {
        match self.count {
            1 => -self.v[0].w,
            2 => {
                let e12 = self.v[1].w - self.v[0].w;
                let sgn = e12.cross(-self.v[0].w);
                if sgn > 0.0 {
                    // Origin is left of e12
                    Vec2::scalar_cross(1.0, e12)
                } else {
                    // Origin is right of e12
                    e12.cross_scalar(1.0)
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn witness_points(&self) -> (Vec2, Vec2) {
        let [v1, v2, v3] = &self.v;
        match self.count {
            1 => (v1.w_a, v1.w_b),
            2 => (
                v1.w_a * v1.a + v2.w_a * v2.a,
                v1.w_b * v1.a + v2.w_b * v2.a,
            ),
            3 => {
                let p = v1.w_a * v1.a + v2.w_a * v2.a + v3.w_a * v3.a;
                (p, p)
            }
            _ => (Vec2::ZERO, Vec2::ZERO),
        }
    }

    fn metric(&self) -> f32 {
        match self.count {
            2 => self.v[0].w.distance(self.v[1].w),
            3 => (self.v[1].w - self.v[0].w).cross(self.v[2].w - self.v[0].w),
            _ => 0.0,
        }
    }

    /// Closest point on a segment to the origin, by barycentric regions
    fn solve2(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let e12 = w2 - w1;

        // w1 region
        let d12_2 = -w1.dot(e12);
        if d12_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // w2 region
        let d12_1 = w2.dot(e12);
        if d12_1 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // Must be in e12 region
        let inv_d12 = 1.0 / (d12_1 + d12_2);
        self.v[0].a = d12_1 * inv_d12;
        self.v[1].a = d12_2 * inv_d12;
        self.count = 2;
    }

    /// Closest point on a triangle to the origin
    fn solve3(&mut self) {
        let w1 = self.v[0].w;
        let w2 = self.v[1].w;
        let w3 = self.v[2].w;

        // Edge12
        let e12 = w2 - w1;
        let d12_1 = w2.dot(e12);
        let d12_2 = -w1.dot(e12);

        // Edge13
        let e13 = w3 - w1;
        let d13_1 = w3.dot(e13);
        let d13_2 = -w1.dot(e13);

        // Edge23
        let e23 = w3 - w2;
        let d23_1 = w3.dot(e23);
        let d23_2 = -w2.dot(e23);

        // Triangle123
        let n123 = e12.cross(e13);
        let d123_1 = n123 * w2.cross(w3);
        let d123_2 = n123 * w3.cross(w1);
        let d123_3 = n123 * w1.cross(w2);

        // w1 region
        if d12_2 <= 0.0 && d13_2 <= 0.0 {
            self.v[0].a = 1.0;
            self.count = 1;
            return;
        }

        // e12
        if d12_1 > 0.0 && d12_2 > 0.0 && d123_3 <= 0.0 {
            let inv = 1.0 / (d12_1 + d12_2);
            self.v[0].a = d12_1 * inv;
            self.v[1].a = d12_2 * inv;
            self.count = 2;
            return;
        }

        // e13
        if d13_1 > 0.0 && d13_2 > 0.0 && d123_2 <= 0.0 {
            let inv = 1.0 / (d13_1 + d13_2);
            self.v[0].a = d13_1 * inv;
            self.v[2].a = d13_2 * inv;
            self.count = 2;
            self.v[1] = self.v[2];
            return;
        }

        // w2 region
        if d12_1 <= 0.0 && d23_2 <= 0.0 {
            self.v[1].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[1];
            return;
        }

        // w3 region
        if d13_1 <= 0.0 && d23_1 <= 0.0 {
            self.v[2].a = 1.0;
            self.count = 1;
            self.v[0] = self.v[2];
            return;
        }

        // e23
        if d23_1 > 0.0 && d23_2 > 0.0 && d123_1 <= 0.0 {
            let inv = 1.0 / (d23_1 + d23_2);
            self.v[1].a = d23_1 * inv;
            self.v[2].a = d23_2 * inv;
            self.count = 2;
            self.v[0] = self.v[2];
            return;
        }

        // Must be in triangle123
        let inv = 1.0 / (d123_1 + d123_2 + d123_3);
        self.v[0].a = d123_1 * inv;
        self.v[1].a = d123_2 * inv;
        self.v[2].a = d123_3 * inv;
        self.count = 3;
    }
}

// ============================================================================
// Distance
// ============================================================================

/// Closest points between two proxies.
///
/// `cache` is read to warm start and rewritten with the final simplex.
pub fn distance(cache: &mut SimplexCache, input: &DistanceInput) -> DistanceOutput {
    let proxy_a = &input.proxy_a;
    let proxy_b = &input.proxy_b;
    let xf_a = &input.transform_a;
    let xf_b = &input.transform_b;

    let mut simplex = Simplex::read_cache(cache, proxy_a, xf_a, proxy_b, xf_b);

    // Vertices of the last simplex, for duplicate detection
    let mut save_a = [0usize; 3];
    let mut save_b = [0usize; 3];

    let mut iter = 0;
    while iter < MAX_ITERS {
        let save_count = simplex.count;
        for i in 0..save_count {
            save_a[i] = simplex.v[i].index_a;
            save_b[i] = simplex.v[i].index_b;
        }

        match simplex.count {
            2 => simplex.solve2(),
            3 => simplex.solve3(),
            _ => {}
        }

        // Origin is inside the triangle: overlap
        if simplex.count == 3 {
            break;
        }

        let d = simplex.search_direction();

        // Origin is probably on the simplex; avoid a degenerate support
        if d.length_squared() < EPSILON * EPSILON {
            break;
        }

        let index_a = proxy_a.support(xf_a.q.mul_t_vec(-d));
        let index_b = proxy_b.support(xf_b.q.mul_t_vec(d));
        simplex.v[simplex.count] =
            Simplex::vertex_from(index_a, index_b, proxy_a, xf_a, proxy_b, xf_b);

        iter += 1;

        // Repeated support point: no further progress possible
        let duplicate = (0..save_count).any(|i| index_a == save_a[i] && index_b == save_b[i]);
        if duplicate {
            break;
        }

        simplex.count += 1;
    }

    let (mut point_a, mut point_b) = simplex.witness_points();
    let mut dist = point_a.distance(point_b);
    simplex.write_cache(cache);

    if input.use_radii {
        let r_a = proxy_a.radius;
        let r_b = proxy_b.radius;
        if dist > r_a + r_b && dist > EPSILON {
            // Shapes are still not overlapped: move the witness points to the surfaces
            dist -= r_a + r_b;
            let normal = (point_b - point_a).normalized();
            point_a += normal * r_a;
            point_b -= normal * r_b;
        } else {
            // Shapes overlap: use the midpoint
            let p = (point_a + point_b) * 0.5;
            point_a = p;
            point_b = p;
            dist = 0.0;
        }
    }

    DistanceOutput {
        point_a,
        point_b,
        distance: dist,
        iterations: iter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{CircleShape, EdgeShape, PolygonShape};

    fn input(a: &Shape, xf_a: Transform, b: &Shape, xf_b: Transform, use_radii: bool) -> DistanceInput {
        DistanceInput {
            proxy_a: DistanceProxy::new(a, 0),
            proxy_b: DistanceProxy::new(b, 0),
            transform_a: xf_a,
            transform_b: xf_b,
            use_radii,
        }
    }

    #[test]
    fn test_circle_circle_distance() {
        let c = Shape::Circle(CircleShape::new(0.5));
        let inp = input(
            &c,
            Transform::IDENTITY,
            &c,
            Transform::new(Vec2::new(3.0, 0.0), 0.0),
            true,
        );
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &inp);
        assert!((out.distance - 2.0).abs() < 1e-5);
        assert!((out.point_a.x - 0.5).abs() < 1e-5);
        assert!((out.point_b.x - 2.5).abs() < 1e-5);
    }

    #[test]
    fn test_box_box_distance() {
        let b = Shape::Polygon(PolygonShape::new_box(1.0, 1.0));
        let inp = input(
            &b,
            Transform::IDENTITY,
            &b,
            Transform::new(Vec2::new(4.0, 0.5), 0.0),
            false,
        );
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &inp);
        assert!((out.distance - 2.0).abs() < 1e-5);
        assert!(cache.count >= 1);

        // Warm-started query converges immediately
        let again = distance(&mut cache, &inp);
        assert!((again.distance - 2.0).abs() < 1e-5);
        assert!(again.iterations <= out.iterations);
    }

    #[test]
    fn test_overlapping_shapes_have_zero_distance() {
        let b = Shape::Polygon(PolygonShape::new_box(1.0, 1.0));
        let inp = input(
            &b,
            Transform::IDENTITY,
            &b,
            Transform::new(Vec2::new(0.5, 0.5), 0.3),
            true,
        );
        let mut cache = SimplexCache::default();
        assert_eq!(distance(&mut cache, &inp).distance, 0.0);
    }

    #[test]
    fn test_edge_point_distance() {
        let e = Shape::Edge(EdgeShape::new(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)));
        let c = Shape::Circle(CircleShape::new(0.25));
        let inp = input(
            &e,
            Transform::IDENTITY,
            &c,
            Transform::new(Vec2::new(0.2, 1.0), 0.0),
            false,
        );
        let mut cache = SimplexCache::default();
        let out = distance(&mut cache, &inp);
        assert!((out.distance - 1.0).abs() < 1e-5);
        assert!((out.point_a.x - 0.2).abs() < 1e-5);
    }
}
