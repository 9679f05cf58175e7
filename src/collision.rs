//! Collision Primitives
//!
//! Axis-aligned bounding boxes, ray-cast records, and the contact manifold
//! that the narrow phase produces and the contact solver consumes.
//!
//! # Manifold layout
//!
//! Manifold points are stored in local coordinates so that they can be
//! re-evaluated cheaply by the position solver:
//!
//! - `Circles`: `local_point` is the center of circle A, the point holds
//!   the center of circle B
//! - `FaceA`: `local_point`/`local_normal` describe the reference face on A,
//!   points are clip points on B
//! - `FaceB`: the same with the roles of A and B exchanged

use crate::distance::{distance, DistanceInput, DistanceProxy, SimplexCache};
use crate::math::{Transform, Vec2, EPSILON};
use crate::settings::MAX_MANIFOLD_POINTS;
use crate::shape::Shape;

// ============================================================================
// AABB
// ============================================================================

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    /// Lower vertex
    pub lower_bound: Vec2,
    /// Upper vertex
    pub upper_bound: Vec2,
}

impl Aabb {
    /// Create from two corners
    #[inline]
    #[must_use]
    pub const fn new(lower_bound: Vec2, upper_bound: Vec2) -> Self {
        Self {
            lower_bound,
            upper_bound,
        }
    }

    /// Bounds are ordered and finite
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let d = self.upper_bound - self.lower_bound;
        d.x >= 0.0 && d.y >= 0.0 && self.lower_bound.is_valid() && self.upper_bound.is_valid()
    }

    /// Center point
    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.lower_bound + self.upper_bound) * 0.5
    }

    /// Half-widths
    #[inline]
    #[must_use]
    pub fn extents(&self) -> Vec2 {
        (self.upper_bound - self.lower_bound) * 0.5
    }

    /// Perimeter, the 2D surface-area heuristic
    #[inline]
    #[must_use]
    pub fn perimeter(&self) -> f32 {
        let wx = self.upper_bound.x - self.lower_bound.x;
        let wy = self.upper_bound.y - self.lower_bound.y;
        2.0 * (wx + wy)
    }

    /// Union of two boxes
    #[inline]
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self::new(
            self.lower_bound.min(other.lower_bound),
            self.upper_bound.max(other.upper_bound),
        )
    }

    /// True if `other` lies entirely inside `self`
    #[inline]
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.lower_bound.x <= other.lower_bound.x
            && self.lower_bound.y <= other.lower_bound.y
            && other.upper_bound.x <= self.upper_bound.x
            && other.upper_bound.y <= self.upper_bound.y
    }

    /// True if the boxes overlap (touching counts)
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let d1 = other.lower_bound - self.upper_bound;
        let d2 = self.lower_bound - other.upper_bound;
        !(d1.x > 0.0 || d1.y > 0.0 || d2.x > 0.0 || d2.y > 0.0)
    }

    /// Slab ray cast. Returns the entry fraction and face normal.
    #[must_use]
    pub fn raycast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = -f32::MAX;
        let mut tmax = f32::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let abs_d = d.abs();
        let mut normal = Vec2::ZERO;

        for i in 0..2 {
            if abs_d[i] < EPSILON {
                // Parallel
                if p[i] < self.lower_bound[i] || self.upper_bound[i] < p[i] {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d[i];
                let mut t1 = (self.lower_bound[i] - p[i]) * inv_d;
                let mut t2 = (self.upper_bound[i] - p[i]) * inv_d;
                let mut s = -1.0;
                if t1 > t2 {
                    core::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }
                if t1 > tmin {
                    normal = Vec2::ZERO;
                    normal[i] = s;
                    tmin = t1;
                }
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }
        Some(RayCastOutput {
            normal,
            fraction: tmin,
        })
    }
}

// ============================================================================
// Ray cast records
// ============================================================================

/// Ray segment `p1 + t * (p2 - p1)` for `t` in `[0, max_fraction]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastInput {
    /// Start point
    pub p1: Vec2,
    /// End point
    pub p2: Vec2,
    /// Maximum fraction of the segment to consider
    pub max_fraction: f32,
}

/// Ray hit: surface normal and fraction along the input segment
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RayCastOutput {
    /// Surface normal at the hit point
    pub normal: Vec2,
    /// Fraction of `p2 - p1` at the hit point
    pub fraction: f32,
}

// ============================================================================
// Contact features
// ============================================================================

/// Kind of feature a contact point comes from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum FeatureType {
    /// A vertex
    #[default]
    Vertex = 0,
    /// A face (edge in 2D)
    Face = 1,
}

/// Identifies the features that intersect to form a contact point.
///
/// Used to match points across steps for warm starting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContactFeature {
    /// Feature index on shape A
    pub index_a: u8,
    /// Feature index on shape B
    pub index_b: u8,
    /// Feature type on shape A
    pub type_a: FeatureType,
    /// Feature type on shape B
    pub type_b: FeatureType,
}

impl ContactFeature {
    /// Packed key for fast comparison
    #[inline]
    #[must_use]
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | (u32::from(self.index_b) << 8)
            | ((self.type_a as u32) << 16)
            | ((self.type_b as u32) << 24)
    }

    /// Same feature pair seen from the other shape
    #[inline]
    #[must_use]
    pub fn swapped(&self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// One manifold point
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ManifoldPoint {
    /// Point in the frame given by the manifold type
    pub local_point: Vec2,
    /// Accumulated non-penetration impulse
    pub normal_impulse: f32,
    /// Accumulated friction impulse
    pub tangent_impulse: f32,
    /// Feature pair that produced the point
    pub id: ContactFeature,
}

/// Interpretation of the manifold's local point and normal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ManifoldType {
    /// Two circles (or a circle and a vertex)
    #[default]
    Circles,
    /// Reference face on shape A
    FaceA,
    /// Reference face on shape B
    FaceB,
}

/// Contact points between two touching convex shapes
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Manifold {
    /// Points; only the first `point_count` are meaningful
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    /// Reference face normal (unused for `Circles`)
    pub local_normal: Vec2,
    /// Reference point, meaning depends on `manifold_type`
    pub local_point: Vec2,
    /// Manifold kind
    pub manifold_type: ManifoldType,
    /// Number of valid points
    pub point_count: usize,
}

impl Manifold {
    /// Valid points
    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }
}

/// Manifold evaluated in world coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorldManifold {
    /// World normal pointing from A to B
    pub normal: Vec2,
    /// World contact points (midway between the surfaces)
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping
    pub separations: [f32; MAX_MANIFOLD_POINTS],
}

impl WorldManifold {
    /// Evaluate `manifold` for the given transforms and skin radii
    #[must_use]
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform,
        radius_a: f32,
        xf_b: &Transform,
        radius_b: f32,
    ) -> Self {
        let mut wm = Self::default();
        if manifold.point_count == 0 {
            return wm;
        }

        match manifold.manifold_type {
            ManifoldType::Circles => {
                wm.normal = Vec2::UNIT_X;
                let point_a = xf_a.mul_vec(manifold.local_point);
                let point_b = xf_b.mul_vec(manifold.points[0].local_point);
                if point_a.distance_squared(point_b) > EPSILON * EPSILON {
                    wm.normal = (point_b - point_a).normalized();
                }
                let c_a = point_a + wm.normal * radius_a;
                let c_b = point_b - wm.normal * radius_b;
                wm.points[0] = (c_a + c_b) * 0.5;
                wm.separations[0] = (c_b - c_a).dot(wm.normal);
            }
            ManifoldType::FaceA => {
                wm.normal = xf_a.q.mul_vec(manifold.local_normal);
                let plane_point = xf_a.mul_vec(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_b.mul_vec(manifold.points[i].local_point);
                    let c_a = clip_point
                        + wm.normal * (radius_a - (clip_point - plane_point).dot(wm.normal));
                    let c_b = clip_point - wm.normal * radius_b;
                    wm.points[i] = (c_a + c_b) * 0.5;
                    wm.separations[i] = (c_b - c_a).dot(wm.normal);
                }
            }
            ManifoldType::FaceB => {
                wm.normal = xf_b.q.mul_vec(manifold.local_normal);
                let plane_point = xf_b.mul_vec(manifold.local_point);
                for i in 0..manifold.point_count {
                    let clip_point = xf_a.mul_vec(manifold.points[i].local_point);
                    let c_b = clip_point
                        + wm.normal * (radius_b - (clip_point - plane_point).dot(wm.normal));
                    let c_a = clip_point - wm.normal * radius_a;
                    wm.points[i] = (c_a + c_b) * 0.5;
                    wm.separations[i] = (c_a - c_b).dot(wm.normal);
                }
                // Ensure normal points from A to B
                wm.normal = -wm.normal;
            }
        }
        wm
    }
}

// ============================================================================
// Point states
// ============================================================================

/// Life-cycle state of a manifold point between two evaluations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointState {
    /// Point does not exist
    #[default]
    Null,
    /// Point was added in the update
    Add,
    /// Point persisted across the update
    Persist,
    /// Point was removed in the update
    Remove,
}

/// Compare two manifolds by feature ids.
///
/// Returns the states of the points of `manifold1` (persist or remove) and of
/// `manifold2` (add or persist).
#[must_use]
pub fn get_point_states(
    manifold1: &Manifold,
    manifold2: &Manifold,
) -> (
    [PointState; MAX_MANIFOLD_POINTS],
    [PointState; MAX_MANIFOLD_POINTS],
) {
    let mut state1 = [PointState::Null; MAX_MANIFOLD_POINTS];
    let mut state2 = [PointState::Null; MAX_MANIFOLD_POINTS];

    for (i, p1) in manifold1.points().iter().enumerate() {
        state1[i] = if manifold2.points().iter().any(|p2| p2.id == p1.id) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }
    for (i, p2) in manifold2.points().iter().enumerate() {
        state2[i] = if manifold1.points().iter().any(|p1| p1.id == p2.id) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }
    (state1, state2)
}

// ============================================================================
// Clipping
// ============================================================================

/// Vertex used while clipping an incident edge
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClipVertex {
    /// Position
    pub v: Vec2,
    /// Feature pair
    pub id: ContactFeature,
}

/// Sutherland-Hodgman clip of a segment against the half-plane
/// `dot(normal, x) <= offset`.
///
/// Returns the clipped segment and the number of points kept (0, 1 or 2).
#[must_use]
pub fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // Points on opposite sides: add the intersection
    if distance0 * distance1 < 0.0 && count < 2 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count].v = v_in[0].v + (v_in[1].v - v_in[0].v) * interp;
        v_out[count].id = ContactFeature {
            index_a: vertex_index_a as u8,
            index_b: v_in[0].id.index_b,
            type_a: FeatureType::Vertex,
            type_b: FeatureType::Face,
        };
        count += 1;
    }

    (v_out, count)
}

/// Exact overlap test between two shape children using GJK.
#[must_use]
pub fn test_overlap(
    shape_a: &Shape,
    index_a: usize,
    shape_b: &Shape,
    index_b: usize,
    xf_a: &Transform,
    xf_b: &Transform,
) -> bool {
    let input = DistanceInput {
        proxy_a: DistanceProxy::new(shape_a, index_a),
        proxy_b: DistanceProxy::new(shape_b, index_b),
        transform_a: *xf_a,
        transform_b: *xf_b,
        use_radii: true,
    };
    let mut cache = SimplexCache::default();
    let output = distance(&mut cache, &input);
    output.distance < 10.0 * EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::CircleShape;

    fn aabb(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
        Aabb::new(Vec2::new(x0, y0), Vec2::new(x1, y1))
    }

    #[test]
    fn test_aabb_overlap_and_contains() {
        let a = aabb(0.0, 0.0, 2.0, 2.0);
        let b = aabb(1.0, 1.0, 3.0, 3.0);
        let c = aabb(5.0, 5.0, 6.0, 6.0);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.combine(&b).contains(&a));
        assert!((a.perimeter() - 8.0).abs() < 1e-6);
        assert!(a.is_valid());
        assert!(!aabb(1.0, 0.0, 0.0, 1.0).is_valid());
    }

    #[test]
    fn test_aabb_raycast() {
        let a = aabb(-1.0, -1.0, 1.0, 1.0);
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 0.0),
            p2: Vec2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        let out = a.raycast(&input).expect("ray crosses box");
        assert!((out.fraction - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(out.normal, Vec2::new(-1.0, 0.0));

        let miss = RayCastInput {
            p1: Vec2::new(-3.0, 2.0),
            p2: Vec2::new(3.0, 2.0),
            max_fraction: 1.0,
        };
        assert!(a.raycast(&miss).is_none());
    }

    #[test]
    fn test_clip_segment() {
        let v_in = [
            ClipVertex {
                v: Vec2::new(-1.0, 0.0),
                id: ContactFeature::default(),
            },
            ClipVertex {
                v: Vec2::new(1.0, 0.0),
                id: ContactFeature::default(),
            },
        ];
        let (out, count) = clip_segment_to_line(&v_in, Vec2::UNIT_X, 0.5, 3);
        assert_eq!(count, 2);
        assert!((out[1].v.x - 0.5).abs() < 1e-6);
        assert_eq!(out[1].id.index_a, 3);
        assert_eq!(out[1].id.type_a, FeatureType::Vertex);
    }

    #[test]
    fn test_point_states() {
        let mut m1 = Manifold::default();
        m1.point_count = 2;
        m1.points[0].id.index_a = 1;
        m1.points[1].id.index_a = 2;
        let mut m2 = Manifold::default();
        m2.point_count = 2;
        m2.points[0].id.index_a = 2;
        m2.points[1].id.index_a = 3;
        let (s1, s2) = get_point_states(&m1, &m2);
        assert_eq!(s1, [PointState::Remove, PointState::Persist]);
        assert_eq!(s2, [PointState::Persist, PointState::Add]);
    }

    #[test]
    fn test_world_manifold_circles() {
        let mut m = Manifold::default();
        m.point_count = 1;
        m.manifold_type = ManifoldType::Circles;
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);
        let wm = WorldManifold::new(&m, &xf_a, 1.0, &xf_b, 1.0);
        assert!((wm.normal.x - 1.0).abs() < 1e-6);
        assert!((wm.separations[0] + 0.5).abs() < 1e-6);
        assert!((wm.points[0].x - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_overlap_circles() {
        let a = Shape::Circle(CircleShape::new(1.0));
        let b = Shape::Circle(CircleShape::new(1.0));
        let xf_a = Transform::IDENTITY;
        let near = Transform::new(Vec2::new(1.9, 0.0), 0.0);
        let far = Transform::new(Vec2::new(2.1, 0.0), 0.0);
        assert!(test_overlap(&a, 0, &b, 0, &xf_a, &near));
        assert!(!test_overlap(&a, 0, &b, 0, &xf_a, &far));
    }
}
