//! Collision Shapes
//!
//! Closed set of 2D shapes attached to fixtures. A fixture owns its own copy of
//! the shape; shapes are plain values and are cloned on attachment.
//!
//! # Features
//!
//! - **Circle**: solid disc with a local center
//! - **Polygon**: convex polygon (up to `MAX_POLYGON_VERTICES`), built from a
//!   point cloud via gift-wrapping hull
//! - **Edge**: line segment, optionally one-sided with ghost vertices for
//!   smooth collision along chains
//! - **Chain**: polyline or closed loop; each segment is an edge child
//!
//! Every shape supplies AABB, mass, ray cast, point containment and
//! point-distance queries, dispatched through [`Shape`].

use crate::collision::{Aabb, RayCastInput, RayCastOutput};
use crate::error::PhysicsError;
use crate::math::{sqrt, Transform, Vec2, EPSILON, PI};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES, POLYGON_RADIUS};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

// ============================================================================
// Shape type and mass data
// ============================================================================

/// Discriminant of [`Shape`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeType {
    /// Circle
    Circle,
    /// Edge segment
    Edge,
    /// Convex polygon
    Polygon,
    /// Chain of edges
    Chain,
}

impl ShapeType {
    /// Ordering used to canonicalize shape pairs for contact dispatch.
    ///
    /// The shape with the lower rank is always shape A of a contact.
    #[inline]
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Chain => 0,
            Self::Edge => 1,
            Self::Polygon => 2,
            Self::Circle => 3,
        }
    }
}

/// Mass properties of a shape
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MassData {
    /// Mass in kilograms
    pub mass: f32,
    /// Center of mass relative to the shape origin
    pub center: Vec2,
    /// Rotational inertia about the shape origin
    pub i: f32,
}

// ============================================================================
// Circle
// ============================================================================

/// Solid circle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircleShape {
    /// Local center
    pub p: Vec2,
    /// Radius
    pub radius: f32,
}

impl CircleShape {
    /// Circle centered at the origin
    #[inline]
    #[must_use]
    pub const fn new(radius: f32) -> Self {
        Self {
            p: Vec2::ZERO,
            radius,
        }
    }

    /// Circle with an offset center
    #[inline]
    #[must_use]
    pub const fn with_center(p: Vec2, radius: f32) -> Self {
        Self { p, radius }
    }

    fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let p = xf.mul_vec(self.p);
        let r = Vec2::new(self.radius, self.radius);
        Aabb::new(p - r, p + r)
    }

    fn compute_mass(&self, density: f32) -> MassData {
        let rr = self.radius * self.radius;
        let mass = density * PI * rr;
        MassData {
            mass,
            center: self.p,
            i: mass * (0.5 * rr + self.p.dot(self.p)),
        }
    }

    fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let center = xf.mul_vec(self.p);
        (p - center).length_squared() <= self.radius * self.radius
    }

    fn raycast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let position = xf.mul_vec(self.p);
        let s = input.p1 - position;
        let b = s.dot(s) - self.radius * self.radius;

        // Solve quadratic equation
        let r = input.p2 - input.p1;
        let c = s.dot(r);
        let rr = r.dot(r);
        let sigma = c * c - rr * b;

        // Negative discriminant or short segment
        if sigma < 0.0 || rr < EPSILON {
            return None;
        }

        // Find the point of intersection of the line with the circle
        let a = -(c + sqrt(sigma));
        if 0.0 <= a && a <= input.max_fraction * rr {
            let fraction = a / rr;
            Some(RayCastOutput {
                fraction,
                normal: (s + r * fraction).normalized(),
            })
        } else {
            None
        }
    }

    fn compute_distance(&self, xf: &Transform, p: Vec2) -> (f32, Vec2) {
        let center = xf.mul_vec(self.p);
        let mut d = p - center;
        let len = d.normalize();
        (len - self.radius, d)
    }
}

// ============================================================================
// Polygon
// ============================================================================

/// Convex polygon with counter-clockwise winding
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolygonShape {
    /// Centroid in local space
    pub centroid: Vec2,
    /// Vertices; only the first `count` are used
    pub vertices: [Vec2; MAX_POLYGON_VERTICES],
    /// Outward edge normals; `normals[i]` belongs to edge `i -> i+1`
    pub normals: [Vec2; MAX_POLYGON_VERTICES],
    /// Number of vertices
    pub count: usize,
    /// Skin radius
    pub radius: f32,
}

impl Default for PolygonShape {
    fn default() -> Self {
        Self {
            centroid: Vec2::ZERO,
            vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
            count: 0,
            radius: POLYGON_RADIUS,
        }
    }
}

impl PolygonShape {
    /// Axis-aligned box with half-widths `hx`, `hy` centered at the origin
    #[must_use]
    pub fn new_box(hx: f32, hy: f32) -> Self {
        let mut poly = Self::default();
        poly.set_as_box(hx, hy);
        poly
    }

    /// Convex hull of `points`
    pub fn from_points(points: &[Vec2]) -> Result<Self, PhysicsError> {
        let mut poly = Self::default();
        poly.set(points)?;
        Ok(poly)
    }

    /// Active vertices
    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    /// Active normals
    #[inline]
    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }

    /// Become an axis-aligned box
    pub fn set_as_box(&mut self, hx: f32, hy: f32) {
        self.count = 4;
        self.vertices[0] = Vec2::new(-hx, -hy);
        self.vertices[1] = Vec2::new(hx, -hy);
        self.vertices[2] = Vec2::new(hx, hy);
        self.vertices[3] = Vec2::new(-hx, hy);
        self.normals[0] = Vec2::new(0.0, -1.0);
        self.normals[1] = Vec2::new(1.0, 0.0);
        self.normals[2] = Vec2::new(0.0, 1.0);
        self.normals[3] = Vec2::new(-1.0, 0.0);
        self.centroid = Vec2::ZERO;
    }

    /// Become a box centered at `center` and rotated by `angle`
    pub fn set_as_oriented_box(&mut self, hx: f32, hy: f32, center: Vec2, angle: f32) {
        self.set_as_box(hx, hy);
        self.centroid = center;
        let xf = Transform::new(center, angle);
        for i in 0..self.count {
            self.vertices[i] = xf.mul_vec(self.vertices[i]);
            self.normals[i] = xf.q.mul_vec(self.normals[i]);
        }
    }

    /// Rebuild from the convex hull of `points`.
    ///
    /// Points closer than half the linear slop are welded. Input beyond
    /// `MAX_POLYGON_VERTICES` points is ignored. Fails when the hull has
    /// fewer than three vertices.
    pub fn set(&mut self, points: &[Vec2]) -> Result<(), PhysicsError> {
        let n = points.len().min(MAX_POLYGON_VERTICES);
        if n < 3 {
            return Err(PhysicsError::DegenerateGeometry {
                reason: "polygon needs at least 3 points",
            });
        }

        // Weld close points
        let weld = 0.5 * LINEAR_SLOP;
        let mut ps = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let mut count = 0;
        for &v in &points[..n] {
            if ps[..count]
                .iter()
                .all(|&p| v.distance_squared(p) >= weld * weld)
            {
                ps[count] = v;
                count += 1;
            }
        }
        if count < 3 {
            return Err(PhysicsError::DegenerateGeometry {
                reason: "polygon points are too close together",
            });
        }

        // Gift wrapping, starting from the rightmost point
        let mut i0 = 0;
        let mut x0 = ps[0].x;
        for (i, p) in ps.iter().enumerate().take(count).skip(1) {
            if p.x > x0 || (p.x == x0 && p.y < ps[i0].y) {
                i0 = i;
                x0 = p.x;
            }
        }

        let mut hull = [0usize; MAX_POLYGON_VERTICES];
        let mut m = 0;
        let mut ih = i0;
        loop {
            if m == MAX_POLYGON_VERTICES {
                return Err(PhysicsError::DegenerateGeometry {
                    reason: "polygon hull did not close",
                });
            }
            hull[m] = ih;

            let mut ie = 0;
            for j in 1..count {
                if ie == ih {
                    ie = j;
                    continue;
                }
                let r = ps[ie] - ps[hull[m]];
                let v = ps[j] - ps[hull[m]];
                let c = r.cross(v);
                if c < 0.0 {
                    ie = j;
                }
                // Collinear: keep the farthest point
                if c == 0.0 && v.length_squared() > r.length_squared() {
                    ie = j;
                }
            }

            m += 1;
            ih = ie;
            if ie == i0 {
                break;
            }
        }

        if m < 3 {
            return Err(PhysicsError::DegenerateGeometry {
                reason: "polygon hull is collinear",
            });
        }

        self.count = m;
        for i in 0..m {
            self.vertices[i] = ps[hull[i]];
        }
        for i in 0..m {
            let i2 = if i + 1 < m { i + 1 } else { 0 };
            let edge = self.vertices[i2] - self.vertices[i];
            if edge.length_squared() <= EPSILON * EPSILON {
                return Err(PhysicsError::DegenerateGeometry {
                    reason: "polygon has a zero-length edge",
                });
            }
            self.normals[i] = edge.cross_scalar(1.0).normalized();
        }
        self.centroid = compute_centroid(&self.vertices[..m]);
        Ok(())
    }

    fn compute_aabb(&self, xf: &Transform) -> Aabb {
        let mut lower = xf.mul_vec(self.vertices[0]);
        let mut upper = lower;
        for &v in &self.vertices[1..self.count] {
            let v = xf.mul_vec(v);
            lower = lower.min(v);
            upper = upper.max(v);
        }
        let r = Vec2::new(self.radius, self.radius);
        Aabb::new(lower - r, upper + r)
    }

    fn compute_mass(&self, density: f32) -> MassData {
        const INV3: f32 = 1.0 / 3.0;

        let mut center = Vec2::ZERO;
        let mut area = 0.0;
        let mut inertia = 0.0;

        // Reference point inside the polygon keeps the sums well conditioned
        let s = self.vertices[0];

        for i in 0..self.count {
            let e1 = self.vertices[i] - s;
            let e2 = if i + 1 < self.count {
                self.vertices[i + 1] - s
            } else {
                self.vertices[0] - s
            };
            let d = e1.cross(e2);

            let triangle_area = 0.5 * d;
            area += triangle_area;
            center += (e1 + e2) * (triangle_area * INV3);

            let intx2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let inty2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * INV3 * d) * (intx2 + inty2);
        }

        let mass = density * area;
        if area > EPSILON {
            center *= 1.0 / area;
        }
        let mass_center = center + s;
        // Shift to center of mass then to the shape origin
        let i = density * inertia + mass * (mass_center.dot(mass_center) - center.dot(center));
        MassData {
            mass,
            center: mass_center,
            i,
        }
    }

    fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        let local = xf.q.mul_t_vec(p - xf.p);
        self.vertices()
            .iter()
            .zip(self.normals())
            .all(|(&v, &n)| n.dot(local - v) <= 0.0)
    }

    fn raycast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        // Put the ray into the polygon's frame
        let p1 = xf.q.mul_t_vec(input.p1 - xf.p);
        let p2 = xf.q.mul_t_vec(input.p2 - xf.p);
        let d = p2 - p1;

        let mut lower = 0.0;
        let mut upper = input.max_fraction;
        let mut index = None;

        for i in 0..self.count {
            // p = p1 + a * d
            // dot(normal, p - v) = 0
            // dot(normal, p1 - v) + a * dot(normal, d) = 0
            let numerator = self.normals[i].dot(self.vertices[i] - p1);
            let denominator = self.normals[i].dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                // Increase lower; the segment enters this half-space
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                // Decrease upper; the segment exits this half-space
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| RayCastOutput {
            fraction: lower,
            normal: xf.q.mul_vec(self.normals[i]),
        })
    }

    fn compute_distance(&self, xf: &Transform, p: Vec2) -> (f32, Vec2) {
        let local = xf.mul_t_vec(p);
        let mut max_distance = -f32::MAX;
        let mut normal_for_max = local;

        for (&v, &n) in self.vertices().iter().zip(self.normals()) {
            let dot = n.dot(local - v);
            if dot > max_distance {
                max_distance = dot;
                normal_for_max = n;
            }
        }

        if max_distance > 0.0 {
            // Outside: the face distance unless a vertex is closer
            let mut min_distance = normal_for_max;
            let mut min_distance2 = max_distance * max_distance;
            for &v in self.vertices() {
                let distance = local - v;
                let distance2 = distance.length_squared();
                if min_distance2 > distance2 {
                    min_distance = distance;
                    min_distance2 = distance2;
                }
            }
            (
                sqrt(min_distance2),
                xf.q.mul_vec(min_distance).normalized(),
            )
        } else {
            (max_distance, xf.q.mul_vec(normal_for_max))
        }
    }
}

fn compute_centroid(vs: &[Vec2]) -> Vec2 {
    const INV3: f32 = 1.0 / 3.0;
    let s = vs[0];
    let mut c = Vec2::ZERO;
    let mut area = 0.0;
    for i in 0..vs.len() {
        let e1 = vs[i] - s;
        let e2 = if i + 1 < vs.len() { vs[i + 1] - s } else { vs[0] - s };
        let triangle_area = 0.5 * e1.cross(e2);
        area += triangle_area;
        c += (e1 + e2) * (triangle_area * INV3);
    }
    if area > EPSILON {
        c *= 1.0 / area;
    }
    c + s
}

// ============================================================================
// Edge
// ============================================================================

/// Line segment from `vertex1` to `vertex2`.
///
/// A one-sided edge collides only on the right of `vertex1 -> vertex2`
/// and uses the ghost vertices `vertex0`/`vertex3` to avoid internal
/// collisions where edges meet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeShape {
    /// Ghost vertex before `vertex1`
    pub vertex0: Vec2,
    /// Start point
    pub vertex1: Vec2,
    /// End point
    pub vertex2: Vec2,
    /// Ghost vertex after `vertex2`
    pub vertex3: Vec2,
    /// Collide only against the normal side
    pub one_sided: bool,
    /// Skin radius
    pub radius: f32,
}

impl EdgeShape {
    /// Two-sided segment
    #[must_use]
    pub fn new(v1: Vec2, v2: Vec2) -> Self {
        Self {
            vertex0: Vec2::ZERO,
            vertex1: v1,
            vertex2: v2,
            vertex3: Vec2::ZERO,
            one_sided: false,
            radius: POLYGON_RADIUS,
        }
    }

    /// One-sided segment `v1 -> v2` with ghost vertices
    #[must_use]
    pub fn new_one_sided(v0: Vec2, v1: Vec2, v2: Vec2, v3: Vec2) -> Self {
        Self {
            vertex0: v0,
            vertex1: v1,
            vertex2: v2,
            vertex3: v3,
            one_sided: true,
            radius: POLYGON_RADIUS,
        }
    }

    fn compute_aabb(&self, xf: &Transform) -> Aabb {
        segment_aabb(xf, self.vertex1, self.vertex2, self.radius)
    }

    fn compute_mass(&self) -> MassData {
        MassData {
            mass: 0.0,
            center: (self.vertex1 + self.vertex2) * 0.5,
            i: 0.0,
        }
    }

    fn raycast(&self, input: &RayCastInput, xf: &Transform) -> Option<RayCastOutput> {
        let p1 = xf.q.mul_t_vec(input.p1 - xf.p);
        let p2 = xf.q.mul_t_vec(input.p2 - xf.p);
        let d = p2 - p1;

        let v1 = self.vertex1;
        let v2 = self.vertex2;
        let e = v2 - v1;

        // Normal points to the right, looking from v1 at v2
        let normal = Vec2::new(e.y, -e.x).normalized();

        // q = p1 + t * d
        // dot(normal, q - v1) = 0
        let numerator = normal.dot(v1 - p1);
        if self.one_sided && numerator > 0.0 {
            return None;
        }

        let denominator = normal.dot(d);
        if denominator == 0.0 {
            return None;
        }

        let t = numerator / denominator;
        if t < 0.0 || input.max_fraction < t {
            return None;
        }

        let q = p1 + d * t;

        // q = v1 + s * r
        let r = v2 - v1;
        let rr = r.dot(r);
        if rr == 0.0 {
            return None;
        }
        let s = (q - v1).dot(r) / rr;
        if !(0.0..=1.0).contains(&s) {
            return None;
        }

        let normal = xf.q.mul_vec(normal);
        Some(RayCastOutput {
            fraction: t,
            normal: if numerator > 0.0 { -normal } else { normal },
        })
    }

    fn compute_distance(&self, xf: &Transform, p: Vec2) -> (f32, Vec2) {
        let v1 = xf.mul_vec(self.vertex1);
        let v2 = xf.mul_vec(self.vertex2);

        let mut d = p - v1;
        let s = v2 - v1;
        let ds = d.dot(s);
        if ds > 0.0 {
            let s2 = s.dot(s);
            if ds > s2 {
                d = p - v2;
            } else {
                d -= s * (ds / s2);
            }
        }
        let len = d.normalize();
        (len, d)
    }
}

fn segment_aabb(xf: &Transform, v1: Vec2, v2: Vec2, radius: f32) -> Aabb {
    let a = xf.mul_vec(v1);
    let b = xf.mul_vec(v2);
    let r = Vec2::new(radius, radius);
    Aabb::new(a.min(b) - r, a.max(b) + r)
}

// ============================================================================
// Chain
// ============================================================================

/// Polyline or closed loop of one-sided edges.
///
/// Chains have no mass and no interior; they are meant for static scenery.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainShape {
    /// Vertices; a loop repeats the first vertex at the end
    pub vertices: Vec<Vec2>,
    /// Ghost vertex before the first segment
    pub prev_vertex: Vec2,
    /// Ghost vertex after the last segment
    pub next_vertex: Vec2,
    /// Skin radius
    pub radius: f32,
}

impl ChainShape {
    /// Closed loop through `vertices`. The last vertex connects back to the first.
    pub fn create_loop(vertices: &[Vec2]) -> Result<Self, PhysicsError> {
        if vertices.len() < 3 {
            return Err(PhysicsError::DegenerateGeometry {
                reason: "chain loop needs at least 3 vertices",
            });
        }
        validate_chain(vertices)?;

        let n = vertices.len();
        let mut vs = Vec::with_capacity(n + 1);
        vs.extend_from_slice(vertices);
        vs.push(vertices[0]);
        Ok(Self {
            prev_vertex: vs[n - 1],
            next_vertex: vs[1],
            vertices: vs,
            radius: POLYGON_RADIUS,
        })
    }

    /// Open chain with explicit ghost vertices at both ends
    pub fn create_chain(
        vertices: &[Vec2],
        prev_vertex: Vec2,
        next_vertex: Vec2,
    ) -> Result<Self, PhysicsError> {
        if vertices.len() < 2 {
            return Err(PhysicsError::DegenerateGeometry {
                reason: "chain needs at least 2 vertices",
            });
        }
        validate_chain(vertices)?;
        Ok(Self {
            vertices: vertices.to_vec(),
            prev_vertex,
            next_vertex,
            radius: POLYGON_RADIUS,
        })
    }

    /// Replace the ghost vertex before the first segment
    pub fn set_prev_vertex(&mut self, v: Vec2) {
        self.prev_vertex = v;
    }

    /// Replace the ghost vertex after the last segment
    pub fn set_next_vertex(&mut self, v: Vec2) {
        self.next_vertex = v;
    }

    /// Number of edge children
    #[inline]
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.vertices.len().saturating_sub(1)
    }

    /// One-sided edge for segment `index`, with neighbouring ghost vertices
    #[must_use]
    pub fn child_edge(&self, index: usize) -> EdgeShape {
        let vs = &self.vertices;
        let v0 = if index > 0 {
            vs[index - 1]
        } else {
            self.prev_vertex
        };
        let v3 = if index + 2 < vs.len() {
            vs[index + 2]
        } else {
            self.next_vertex
        };
        let mut edge = EdgeShape::new_one_sided(v0, vs[index], vs[index + 1], v3);
        edge.radius = self.radius;
        edge
    }

    fn compute_aabb(&self, xf: &Transform, child: usize) -> Aabb {
        segment_aabb(
            xf,
            self.vertices[child],
            self.vertices[child + 1],
            self.radius,
        )
    }

    fn raycast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child: usize,
    ) -> Option<RayCastOutput> {
        let edge = EdgeShape::new(self.vertices[child], self.vertices[child + 1]);
        edge.raycast(input, xf)
    }
}

fn validate_chain(vertices: &[Vec2]) -> Result<(), PhysicsError> {
    let too_close = vertices
        .windows(2)
        .any(|w| w[0].distance_squared(w[1]) <= LINEAR_SLOP * LINEAR_SLOP);
    if too_close {
        Err(PhysicsError::DegenerateGeometry {
            reason: "chain vertices are too close together",
        })
    } else {
        Ok(())
    }
}

// ============================================================================
// Shape
// ============================================================================

/// Any collision shape
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Circle
    Circle(CircleShape),
    /// Edge segment
    Edge(EdgeShape),
    /// Convex polygon
    Polygon(PolygonShape),
    /// Chain of edges
    Chain(ChainShape),
}

impl Shape {
    /// Variant tag
    #[inline]
    #[must_use]
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Circle(_) => ShapeType::Circle,
            Self::Edge(_) => ShapeType::Edge,
            Self::Polygon(_) => ShapeType::Polygon,
            Self::Chain(_) => ShapeType::Chain,
        }
    }

    /// Skin radius (circle radius for circles)
    #[inline]
    #[must_use]
    pub fn radius(&self) -> f32 {
        match self {
            Self::Circle(c) => c.radius,
            Self::Edge(e) => e.radius,
            Self::Polygon(p) => p.radius,
            Self::Chain(c) => c.radius,
        }
    }

    /// Number of children (edge segments for chains, 1 otherwise)
    #[inline]
    #[must_use]
    pub fn child_count(&self) -> usize {
        match self {
            Self::Chain(c) => c.child_count(),
            _ => 1,
        }
    }

    /// World AABB of a child
    #[must_use]
    pub fn compute_aabb(&self, xf: &Transform, child: usize) -> Aabb {
        match self {
            Self::Circle(c) => c.compute_aabb(xf),
            Self::Edge(e) => e.compute_aabb(xf),
            Self::Polygon(p) => p.compute_aabb(xf),
            Self::Chain(c) => c.compute_aabb(xf, child),
        }
    }

    /// Mass properties for the given density. Edges and chains are massless.
    #[must_use]
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Self::Circle(c) => c.compute_mass(density),
            Self::Edge(e) => e.compute_mass(),
            Self::Polygon(p) => p.compute_mass(density),
            Self::Chain(_) => MassData::default(),
        }
    }

    /// Point containment. Always false for edges and chains.
    #[must_use]
    pub fn test_point(&self, xf: &Transform, p: Vec2) -> bool {
        match self {
            Self::Circle(c) => c.test_point(xf, p),
            Self::Polygon(poly) => poly.test_point(xf, p),
            Self::Edge(_) | Self::Chain(_) => false,
        }
    }

    /// Ray cast against a child
    #[must_use]
    pub fn raycast(
        &self,
        input: &RayCastInput,
        xf: &Transform,
        child: usize,
    ) -> Option<RayCastOutput> {
        match self {
            Self::Circle(c) => c.raycast(input, xf),
            Self::Edge(e) => e.raycast(input, xf),
            Self::Polygon(p) => p.raycast(input, xf),
            Self::Chain(c) => c.raycast(input, xf, child),
        }
    }

    /// Signed distance from `p` to a child and the direction away from it.
    ///
    /// Negative inside polygons and circles.
    #[must_use]
    pub fn compute_distance(&self, xf: &Transform, p: Vec2, child: usize) -> (f32, Vec2) {
        match self {
            Self::Circle(c) => c.compute_distance(xf, p),
            Self::Edge(e) => e.compute_distance(xf, p),
            Self::Polygon(poly) => poly.compute_distance(xf, p),
            Self::Chain(c) => c.child_edge(child).compute_distance(xf, p),
        }
    }
}

impl From<CircleShape> for Shape {
    fn from(s: CircleShape) -> Self {
        Self::Circle(s)
    }
}

impl From<PolygonShape> for Shape {
    fn from(s: PolygonShape) -> Self {
        Self::Polygon(s)
    }
}

impl From<EdgeShape> for Shape {
    fn from(s: EdgeShape) -> Self {
        Self::Edge(s)
    }
}

impl From<ChainShape> for Shape {
    fn from(s: ChainShape) -> Self {
        Self::Chain(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ray(p1: Vec2, p2: Vec2) -> RayCastInput {
        RayCastInput {
            p1,
            p2,
            max_fraction: 1.0,
        }
    }

    #[test]
    fn test_circle_mass() {
        let c = Shape::Circle(CircleShape::new(0.5));
        let md = c.compute_mass(1.0);
        assert!((md.mass - PI * 0.25).abs() < 1e-5);
        assert!((md.i - md.mass * 0.125).abs() < 1e-5);
    }

    #[test]
    fn test_box_mass_and_inertia() {
        let b = Shape::Polygon(PolygonShape::new_box(1.0, 1.0));
        let md = b.compute_mass(1.0);
        assert!((md.mass - 4.0).abs() < 1e-5);
        assert!(md.center.length() < 1e-5);
        assert!((md.i - 4.0 * 8.0 / 12.0).abs() < 1e-4);
    }

    #[test]
    fn test_hull_drops_interior_points() {
        let pts = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(1.0, 0.5),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        let poly = PolygonShape::from_points(&pts).expect("valid hull");
        assert_eq!(poly.count, 4);
        assert!((poly.centroid.x - 1.0).abs() < 1e-5);
        assert!((poly.centroid.y - 1.0).abs() < 1e-5);
        // Counter-clockwise: every vertex lies inside every other edge
        for (i, n) in poly.normals().iter().enumerate() {
            for v in poly.vertices() {
                assert!(n.dot(*v - poly.vertices[i]) <= 1e-5);
            }
        }
    }

    #[test]
    fn test_hull_rejects_degenerate() {
        let line = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
        ];
        assert!(PolygonShape::from_points(&line).is_err());
        let welded = [Vec2::ZERO, Vec2::new(0.001, 0.0), Vec2::new(0.0, 0.001)];
        assert!(PolygonShape::from_points(&welded).is_err());
    }

    #[test]
    fn test_oriented_box() {
        let mut poly = PolygonShape::default();
        poly.set_as_oriented_box(1.0, 0.5, Vec2::new(3.0, 0.0), PI * 0.5);
        assert_eq!(poly.centroid, Vec2::new(3.0, 0.0));
        let aabb = Shape::Polygon(poly).compute_aabb(&Transform::IDENTITY, 0);
        assert!((aabb.extents().x - (0.5 + POLYGON_RADIUS)).abs() < 1e-4);
        assert!((aabb.extents().y - (1.0 + POLYGON_RADIUS)).abs() < 1e-4);
    }

    #[test]
    fn test_point_containment() {
        let xf = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        let b = Shape::Polygon(PolygonShape::new_box(1.0, 1.0));
        assert!(b.test_point(&xf, Vec2::new(5.5, 0.5)));
        assert!(!b.test_point(&xf, Vec2::new(6.5, 0.5)));
        let c = Shape::Circle(CircleShape::new(1.0));
        assert!(c.test_point(&xf, Vec2::new(5.0, 0.9)));
        let e = Shape::Edge(EdgeShape::new(Vec2::ZERO, Vec2::UNIT_X));
        assert!(!e.test_point(&xf, Vec2::new(5.5, 0.0)));
    }

    #[test]
    fn test_raycasts() {
        let xf = Transform::IDENTITY;
        let input = ray(Vec2::new(-4.0, 0.0), Vec2::new(4.0, 0.0));

        let c = Shape::Circle(CircleShape::new(1.0));
        let hit = c.raycast(&input, &xf, 0).expect("circle hit");
        assert!((hit.fraction - 3.0 / 8.0).abs() < 1e-5);
        assert!((hit.normal.x + 1.0).abs() < 1e-5);

        let b = Shape::Polygon(PolygonShape::new_box(1.0, 1.0));
        let hit = b.raycast(&input, &xf, 0).expect("box hit");
        assert!((hit.fraction - 3.0 / 8.0).abs() < 1e-5);
        assert_eq!(hit.normal, Vec2::new(-1.0, 0.0));

        let e = Shape::Edge(EdgeShape::new(Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0)));
        let hit = e.raycast(&input, &xf, 0).expect("edge hit");
        assert!((hit.fraction - 0.5).abs() < 1e-5);
        assert!((hit.normal.x + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_one_sided_edge_raycast() {
        let xf = Transform::IDENTITY;
        // Normal of v1 -> v2 points down (right-hand side)
        let e = Shape::Edge(EdgeShape::new_one_sided(
            Vec2::new(-2.0, 0.0),
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
        ));
        let from_below = ray(Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0));
        let from_above = ray(Vec2::new(0.0, 1.0), Vec2::new(0.0, -1.0));
        assert!(e.raycast(&from_below, &xf, 0).is_some());
        assert!(e.raycast(&from_above, &xf, 0).is_none());
    }

    #[test]
    fn test_chain_children() {
        let vs = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(3.0, 1.0),
        ];
        let chain = ChainShape::create_chain(&vs, Vec2::new(-1.0, 0.0), Vec2::new(4.0, 2.0))
            .expect("valid chain");
        assert_eq!(chain.child_count(), 3);
        let e0 = chain.child_edge(0);
        assert_eq!(e0.vertex0, Vec2::new(-1.0, 0.0));
        assert_eq!(e0.vertex3, Vec2::new(2.0, 0.0));
        let e2 = chain.child_edge(2);
        assert_eq!(e2.vertex0, Vec2::new(1.0, 0.0));
        assert_eq!(e2.vertex3, Vec2::new(4.0, 2.0));
        assert!(e2.one_sided);

        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let lp = ChainShape::create_loop(&square).expect("valid loop");
        assert_eq!(Shape::Chain(lp.clone()).child_count(), 4);
        assert_eq!(lp.child_edge(3).vertex2, Vec2::ZERO);
        assert_eq!(lp.child_edge(3).vertex3, Vec2::new(1.0, 0.0));
        assert!(ChainShape::create_loop(&square[..2]).is_err());
    }

    #[test]
    fn test_compute_distance() {
        let xf = Transform::IDENTITY;
        let b = Shape::Polygon(PolygonShape::new_box(1.0, 1.0));
        let (d, n) = b.compute_distance(&xf, Vec2::new(3.0, 0.0), 0);
        assert!((d - 2.0).abs() < 1e-5);
        assert!((n.x - 1.0).abs() < 1e-5);
        let (d, _) = b.compute_distance(&xf, Vec2::new(0.5, 0.0), 0);
        assert!((d + 0.5).abs() < 1e-5);

        let c = Shape::Circle(CircleShape::new(1.0));
        let (d, n) = c.compute_distance(&xf, Vec2::new(0.0, 3.0), 0);
        assert!((d - 2.0).abs() < 1e-5);
        assert!((n.y - 1.0).abs() < 1e-5);

        let e = Shape::Edge(EdgeShape::new(Vec2::ZERO, Vec2::new(2.0, 0.0)));
        let (d, n) = e.compute_distance(&xf, Vec2::new(1.0, 0.5), 0);
        assert!((d - 0.5).abs() < 1e-5);
        assert!((n.y - 1.0).abs() < 1e-5);
    }
}
