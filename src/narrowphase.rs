//! Narrow Phase
//!
//! Manifold generators for every supported shape pair. Each generator takes
//! the two shapes with their transforms and returns a [`Manifold`] whose
//! `point_count` is zero when the shapes are separated by more than their
//! combined skin radii.
//!
//! # Pairs
//!
//! | A \ B   | Circle | Polygon |
//! |---------|--------|---------|
//! | Circle  | yes    |         |
//! | Polygon | yes    | yes     |
//! | Edge    | yes    | yes     |
//! | Chain   | yes    | yes     |
//!
//! Pairs are canonical: shape A always has the lower [`ShapeType::rank`].
//! Chain pairs run the edge generators on the chain's child edge.
//!
//! [`ShapeType::rank`]: crate::shape::ShapeType::rank

use crate::collision::{
    clip_segment_to_line, ClipVertex, ContactFeature, FeatureType, Manifold, ManifoldType,
};
use crate::math::{Transform, Vec2, EPSILON};
use crate::settings::{LINEAR_SLOP, MAX_POLYGON_VERTICES};
use crate::shape::{CircleShape, EdgeShape, PolygonShape, Shape};

// ============================================================================
// Dispatch
// ============================================================================

/// True if a contact between these shape kinds produces manifolds.
///
/// The arguments may be given in either order.
#[must_use]
pub fn is_supported_pair(a: &Shape, b: &Shape) -> bool {
    let (a, b) = if a.shape_type().rank() <= b.shape_type().rank() {
        (a, b)
    } else {
        (b, a)
    };
    matches!(
        (a, b),
        (Shape::Circle(_), Shape::Circle(_))
            | (Shape::Polygon(_), Shape::Circle(_) | Shape::Polygon(_))
            | (Shape::Edge(_), Shape::Circle(_) | Shape::Polygon(_))
            | (Shape::Chain(_), Shape::Circle(_) | Shape::Polygon(_))
    )
}

/// Manifold for a canonical shape pair (A has the lower rank).
///
/// Unsupported pairs yield an empty manifold.
#[must_use]
pub fn collide(
    shape_a: &Shape,
    index_a: usize,
    xf_a: &Transform,
    shape_b: &Shape,
    xf_b: &Transform,
) -> Manifold {
    match (shape_a, shape_b) {
        (Shape::Circle(a), Shape::Circle(b)) => collide_circles(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Circle(b)) => collide_polygon_and_circle(a, xf_a, b, xf_b),
        (Shape::Polygon(a), Shape::Polygon(b)) => collide_polygons(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Circle(b)) => collide_edge_and_circle(a, xf_a, b, xf_b),
        (Shape::Edge(a), Shape::Polygon(b)) => collide_edge_and_polygon(a, xf_a, b, xf_b),
        (Shape::Chain(a), Shape::Circle(b)) => {
            collide_edge_and_circle(&a.child_edge(index_a), xf_a, b, xf_b)
        }
        (Shape::Chain(a), Shape::Polygon(b)) => {
            collide_edge_and_polygon(&a.child_edge(index_a), xf_a, b, xf_b)
        }
        _ => Manifold::default(),
    }
}

// ============================================================================
// Circles
// ============================================================================

/// Circle against circle
#[must_use]
pub fn collide_circles(
    circle_a: &CircleShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.mul_vec(circle_a.p);
    let p_b = xf_b.mul_vec(circle_b.p);
    let dist_sqr = p_a.distance_squared(p_b);
    let radius = circle_a.radius + circle_b.radius;
    if dist_sqr > radius * radius {
        return manifold;
    }

    manifold.manifold_type = ManifoldType::Circles;
    manifold.local_point = circle_a.p;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = circle_b.p;
    manifold.points[0].id = ContactFeature::default();
    manifold
}

/// Polygon against circle
#[must_use]
pub fn collide_polygon_and_circle(
    poly_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the polygon frame
    let c = xf_b.mul_vec(circle_b.p);
    let c_local = xf_a.mul_t_vec(c);

    // Find the min separating edge
    let mut normal_index = 0;
    let mut separation = -f32::MAX;
    let radius = poly_a.radius + circle_b.radius;
    let vertices = poly_a.vertices();
    let normals = poly_a.normals();

    for i in 0..poly_a.count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            // Early out
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    // Vertices of the reference edge
    let vert_index1 = normal_index;
    let vert_index2 = if vert_index1 + 1 < poly_a.count {
        vert_index1 + 1
    } else {
        0
    };
    let v1 = vertices[vert_index1];
    let v2 = vertices[vert_index2];

    manifold.point_count = 1;
    manifold.manifold_type = ManifoldType::FaceA;
    manifold.points[0].local_point = circle_b.p;
    manifold.points[0].id = ContactFeature::default();

    // Center is inside the polygon
    if separation < EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = (v1 + v2) * 0.5;
        return manifold;
    }

    // Compute barycentric coordinates
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v1).normalized();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return Manifold::default();
        }
        manifold.local_normal = (c_local - v2).normalized();
        manifold.local_point = v2;
    } else {
        let face_center = (v1 + v2) * 0.5;
        let s = (c_local - face_center).dot(normals[vert_index1]);
        if s > radius {
            return Manifold::default();
        }
        manifold.local_normal = normals[vert_index1];
        manifold.local_point = face_center;
    }
    manifold
}

// ============================================================================
// Polygons
// ============================================================================

/// Edge of `poly1` with the largest separation from `poly2`
fn find_max_separation(
    poly1: &PolygonShape,
    xf1: &Transform,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> (usize, f32) {
    let xf = xf2.mul_t(xf1);

    let mut best_index = 0;
    let mut max_separation = -f32::MAX;
    for i in 0..poly1.count {
        // Normal and vertex of poly1 in the frame of poly2
        let n = xf.q.mul_vec(poly1.normals[i]);
        let v1 = xf.mul_vec(poly1.vertices[i]);

        // Deepest point of poly2 along n
        let si = poly2
            .vertices()
            .iter()
            .map(|&v2| n.dot(v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Edge of `poly2` most anti-parallel to `edge1` of `poly1`, in world space
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    // Reference normal in the frame of poly2
    let normal1 = xf2.q.mul_t_vec(xf1.q.mul_vec(poly1.normals[edge1]));

    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(*n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = if i1 + 1 < poly2.count { i1 + 1 } else { 0 };

    [
        ClipVertex {
            v: xf2.mul_vec(poly2.vertices[i1]),
            id: ContactFeature {
                index_a: edge1 as u8,
                index_b: i1 as u8,
                type_a: FeatureType::Face,
                type_b: FeatureType::Vertex,
            },
        },
        ClipVertex {
            v: xf2.mul_vec(poly2.vertices[i2]),
            id: ContactFeature {
                index_a: edge1 as u8,
                index_b: i2 as u8,
                type_a: FeatureType::Face,
                type_b: FeatureType::Vertex,
            },
        },
    ]
}

/// Polygon against polygon.
///
/// Finds the axis of minimum penetration (SAT), takes the reference face on
/// the shape that owns it and clips the most anti-parallel incident edge of
/// the other shape against the reference face's side planes.
#[must_use]
pub fn collide_polygons(
    poly_a: &PolygonShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    // Prefer A's face unless B's is clearly better
    let k_tol = 0.1 * LINEAR_SLOP;
    let (poly1, poly2, xf1, xf2, edge1, flip) = if separation_b > separation_a + k_tol {
        manifold.manifold_type = ManifoldType::FaceB;
        (poly_b, poly_a, xf_b, xf_a, edge_b, true)
    } else {
        manifold.manifold_type = ManifoldType::FaceA;
        (poly_a, poly_b, xf_a, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let iv1 = edge1;
    let iv2 = if edge1 + 1 < poly1.count { edge1 + 1 } else { 0 };

    let v11 = poly1.vertices[iv1];
    let v12 = poly1.vertices[iv2];

    let local_tangent = (v12 - v11).normalized();
    let local_normal = local_tangent.cross_scalar(1.0);
    let plane_point = (v11 + v12) * 0.5;

    let tangent = xf1.q.mul_vec(local_tangent);
    let normal = tangent.cross_scalar(1.0);

    let v11 = xf1.mul_vec(v11);
    let v12 = xf1.mul_vec(v12);

    // Face offset
    let front_offset = normal.dot(v11);

    // Side offsets, extended by the polygon skin thickness
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    // Clip incident edge against the extruded edge1 side edges
    let (clip_points1, np) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if np < 2 {
        return Manifold::default();
    }
    let (clip_points2, np) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2);
    if np < 2 {
        return Manifold::default();
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for cp in &clip_points2 {
        let separation = normal.dot(cp.v) - front_offset;
        if separation <= total_radius {
            let mp = &mut manifold.points[point_count];
            mp.local_point = xf2.mul_t_vec(cp.v);
            mp.id = if flip { cp.id.swapped() } else { cp.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}

// ============================================================================
// Edges
// ============================================================================

/// Edge (possibly one-sided) against circle, by Voronoi region of the edge
#[must_use]
pub fn collide_edge_and_circle(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle center in the edge frame
    let q = xf_a.mul_t_vec(xf_b.mul_vec(circle_b.p));

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Normal points to the right, looking from A at B
    let mut n = Vec2::new(e.y, -e.x);
    let offset = n.dot(q - a);

    let one_sided = edge_a.one_sided;
    if one_sided && offset < 0.0 {
        return manifold;
    }

    // Barycentric coordinates
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;

    let mut cf = ContactFeature {
        index_b: 0,
        type_b: FeatureType::Vertex,
        ..ContactFeature::default()
    };

    // Region A
    if v <= 0.0 {
        let p = a;
        if q.distance_squared(p) > radius * radius {
            return manifold;
        }

        // Circle lies in the AB region of the previous edge
        if one_sided {
            let a1 = edge_a.vertex0;
            let b1 = a;
            let e1 = b1 - a1;
            let u1 = e1.dot(b1 - q);
            if u1 > 0.0 {
                return manifold;
            }
        }

        cf.index_a = 0;
        cf.type_a = FeatureType::Vertex;
        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = p;
        manifold.points[0].id = cf;
        manifold.points[0].local_point = circle_b.p;
        return manifold;
    }

    // Region B
    if u <= 0.0 {
        let p = b;
        if q.distance_squared(p) > radius * radius {
            return manifold;
        }

        // Circle lies in the AB region of the next edge
        if one_sided {
            let b2 = edge_a.vertex3;
            let a2 = b;
            let e2 = b2 - a2;
            let v2 = e2.dot(q - a2);
            if v2 > 0.0 {
                return manifold;
            }
        }

        cf.index_a = 1;
        cf.type_a = FeatureType::Vertex;
        manifold.point_count = 1;
        manifold.manifold_type = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = p;
        manifold.points[0].id = cf;
        manifold.points[0].local_point = circle_b.p;
        return manifold;
    }

    // Region AB
    let den = e.dot(e);
    if den <= EPSILON {
        return manifold;
    }
    let p = (a * u + b * v) * (1.0 / den);
    if q.distance_squared(p) > radius * radius {
        return manifold;
    }

    if offset < 0.0 {
        n = -n;
    }
    n.normalize();

    cf.index_a = 0;
    cf.type_a = FeatureType::Face;
    manifold.point_count = 1;
    manifold.manifold_type = ManifoldType::FaceA;
    manifold.local_normal = n;
    manifold.local_point = a;
    manifold.points[0].id = cf;
    manifold.points[0].local_point = circle_b.p;
    manifold
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AxisType {
    Unknown,
    EdgeA,
    EdgeB,
}

/// Candidate separating axis in the edge frame
#[derive(Clone, Copy, Debug)]
struct EpAxis {
    normal: Vec2,
    kind: AxisType,
    index: usize,
    separation: f32,
}

/// Polygon B expressed in the edge frame
struct TempPolygon {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
}

/// Reference face used for clipping
struct ReferenceFace {
    i1: usize,
    i2: usize,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    side_normal1: Vec2,
    side_offset1: f32,
    side_normal2: Vec2,
    side_offset2: f32,
}

fn compute_edge_separation(poly_b: &TempPolygon, v1: Vec2, normal1: Vec2) -> EpAxis {
    let mut axis = EpAxis {
        normal: Vec2::ZERO,
        kind: AxisType::EdgeA,
        index: 0,
        separation: -f32::MAX,
    };

    let axes = [normal1, -normal1];

    // Find axis with least overlap (min-max problem)
    for (j, &ax) in axes.iter().enumerate() {
        let sj = poly_b.vertices[..poly_b.count]
            .iter()
            .map(|&v| ax.dot(v - v1))
            .fold(f32::MAX, f32::min);

        if sj > axis.separation {
            axis.index = j;
            axis.separation = sj;
            axis.normal = ax;
        }
    }
    axis
}

fn compute_polygon_separation(poly_b: &TempPolygon, v1: Vec2, v2: Vec2) -> EpAxis {
    let mut axis = EpAxis {
        normal: Vec2::ZERO,
        kind: AxisType::Unknown,
        index: 0,
        separation: -f32::MAX,
    };

    for i in 0..poly_b.count {
        let n = -poly_b.normals[i];
        let s1 = n.dot(poly_b.vertices[i] - v1);
        let s2 = n.dot(poly_b.vertices[i] - v2);
        let s = s1.min(s2);

        if s > axis.separation {
            axis.kind = AxisType::EdgeB;
            axis.index = i;
            axis.separation = s;
            axis.normal = n;
        }
    }
    axis
}

/// Edge (possibly one-sided) against polygon.
///
/// One-sided edges consult the ghost vertices so that a polygon sliding along
/// a chain does not catch on the internal vertices.
#[must_use]
pub fn collide_edge_and_polygon(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    poly_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let xf = xf_a.mul_t(xf_b);

    let centroid_b = xf.mul_vec(poly_b.centroid);

    let v1 = edge_a.vertex1;
    let v2 = edge_a.vertex2;

    let edge1 = (v2 - v1).normalized();

    // Normal points to the right for a CCW winding
    let normal1 = Vec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    let one_sided = edge_a.one_sided;
    if one_sided && offset1 < 0.0 {
        return manifold;
    }

    // Polygon B in the frame of A
    let mut temp = TempPolygon {
        vertices: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        normals: [Vec2::ZERO; MAX_POLYGON_VERTICES],
        count: poly_b.count,
    };
    for i in 0..poly_b.count {
        temp.vertices[i] = xf.mul_vec(poly_b.vertices[i]);
        temp.normals[i] = xf.q.mul_vec(poly_b.normals[i]);
    }

    let radius = poly_b.radius + edge_a.radius;

    let edge_axis = compute_edge_separation(&temp, v1, normal1);
    if edge_axis.separation > radius {
        return manifold;
    }

    let polygon_axis = compute_polygon_separation(&temp, v1, v2);
    if polygon_axis.separation > radius {
        return manifold;
    }

    // Hysteresis for jitter reduction
    const RELATIVE_TOL: f32 = 0.98;
    const ABSOLUTE_TOL: f32 = 0.001;

    let mut primary_axis =
        if polygon_axis.separation - radius > RELATIVE_TOL * (edge_axis.separation - radius) + ABSOLUTE_TOL {
            polygon_axis
        } else {
            edge_axis
        };

    if one_sided {
        // Smooth collision against the neighbouring edges
        let edge0 = (v1 - edge_a.vertex0).normalized();
        let normal0 = Vec2::new(edge0.y, -edge0.x);
        let convex1 = edge0.cross(edge1) >= 0.0;

        let edge2 = (edge_a.vertex3 - v2).normalized();
        let normal2 = Vec2::new(edge2.y, -edge2.x);
        let convex2 = edge1.cross(edge2) >= 0.0;

        const SIN_TOL: f32 = 0.1;
        let side1 = primary_axis.normal.dot(edge1) <= 0.0;

        // Check the Gauss map
        if side1 {
            if convex1 {
                if primary_axis.normal.cross(normal0) > SIN_TOL {
                    // Skip region
                    return manifold;
                }
                // Admit region
            } else {
                // Snap region
                primary_axis = edge_axis;
            }
        } else if convex2 {
            if normal2.cross(primary_axis.normal) > SIN_TOL {
                // Skip region
                return manifold;
            }
            // Admit region
        } else {
            // Snap region
            primary_axis = edge_axis;
        }
    }

    let clip_points: [ClipVertex; 2];
    let reference: ReferenceFace;
    if primary_axis.kind == AxisType::EdgeA {
        manifold.manifold_type = ManifoldType::FaceA;

        // Polygon normal most anti-parallel to the edge normal
        let mut best_index = 0;
        let mut best_value = primary_axis.normal.dot(temp.normals[0]);
        for i in 1..temp.count {
            let value = primary_axis.normal.dot(temp.normals[i]);
            if value < best_value {
                best_value = value;
                best_index = i;
            }
        }

        let i1 = best_index;
        let i2 = if i1 + 1 < temp.count { i1 + 1 } else { 0 };

        clip_points = [
            ClipVertex {
                v: temp.vertices[i1],
                id: ContactFeature {
                    index_a: 0,
                    index_b: i1 as u8,
                    type_a: FeatureType::Face,
                    type_b: FeatureType::Vertex,
                },
            },
            ClipVertex {
                v: temp.vertices[i2],
                id: ContactFeature {
                    index_a: 0,
                    index_b: i2 as u8,
                    type_a: FeatureType::Face,
                    type_b: FeatureType::Vertex,
                },
            },
        ];

        reference = ReferenceFace {
            i1: 0,
            i2: 1,
            v1,
            v2,
            normal: primary_axis.normal,
            side_normal1: -edge1,
            side_offset1: 0.0,
            side_normal2: edge1,
            side_offset2: 0.0,
        };
    } else {
        manifold.manifold_type = ManifoldType::FaceB;

        clip_points = [
            ClipVertex {
                v: v2,
                id: ContactFeature {
                    index_a: 1,
                    index_b: primary_axis.index as u8,
                    type_a: FeatureType::Vertex,
                    type_b: FeatureType::Face,
                },
            },
            ClipVertex {
                v: v1,
                id: ContactFeature {
                    index_a: 0,
                    index_b: primary_axis.index as u8,
                    type_a: FeatureType::Vertex,
                    type_b: FeatureType::Face,
                },
            },
        ];

        let i1 = primary_axis.index;
        let i2 = if i1 + 1 < temp.count { i1 + 1 } else { 0 };
        let normal = temp.normals[i1];
        // CCW winding
        let side_normal1 = Vec2::new(normal.y, -normal.x);
        reference = ReferenceFace {
            i1,
            i2,
            v1: temp.vertices[i1],
            v2: temp.vertices[i2],
            normal,
            side_normal1,
            side_offset1: 0.0,
            side_normal2: -side_normal1,
            side_offset2: 0.0,
        };
    }

    let side_offset1 = reference.side_normal1.dot(reference.v1);
    let side_offset2 = reference.side_normal2.dot(reference.v2);
    let reference = ReferenceFace {
        side_offset1,
        side_offset2,
        ..reference
    };

    // Clip incident edge against the reference face side planes
    let (clip_points1, np) = clip_segment_to_line(
        &clip_points,
        reference.side_normal1,
        reference.side_offset1,
        reference.i1,
    );
    if np < 2 {
        return Manifold::default();
    }
    let (clip_points2, np) = clip_segment_to_line(
        &clip_points1,
        reference.side_normal2,
        reference.side_offset2,
        reference.i2,
    );
    if np < 2 {
        return Manifold::default();
    }

    if primary_axis.kind == AxisType::EdgeA {
        manifold.local_normal = reference.normal;
        manifold.local_point = reference.v1;
    } else {
        manifold.local_normal = poly_b.normals[reference.i1];
        manifold.local_point = poly_b.vertices[reference.i1];
    }

    let mut point_count = 0;
    for cp in &clip_points2 {
        let separation = reference.normal.dot(cp.v - reference.v1);
        if separation <= radius {
            let mp = &mut manifold.points[point_count];
            if primary_axis.kind == AxisType::EdgeA {
                mp.local_point = xf.mul_t_vec(cp.v);
                mp.id = cp.id;
            } else {
                mp.local_point = cp.v;
                mp.id = cp.id.swapped();
            }
            point_count += 1;
        }
    }
    manifold.point_count = point_count;
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::WorldManifold;
    use crate::settings::POLYGON_RADIUS;
    use crate::shape::ChainShape;

    fn at(x: f32, y: f32) -> Transform {
        Transform::new(Vec2::new(x, y), 0.0)
    }

    /// Ground edge whose normal points up (+y)
    fn ground_edge(one_sided: bool) -> EdgeShape {
        let v1 = Vec2::new(5.0, 0.0);
        let v2 = Vec2::new(-5.0, 0.0);
        if one_sided {
            EdgeShape::new_one_sided(Vec2::new(6.0, 0.0), v1, v2, Vec2::new(-6.0, 0.0))
        } else {
            EdgeShape::new(v1, v2)
        }
    }

    #[test]
    fn test_circles() {
        let c = CircleShape::new(0.5);
        let m = collide_circles(&c, &at(0.0, 0.0), &c, &at(0.9, 0.0));
        assert_eq!(m.point_count, 1);
        assert_eq!(m.manifold_type, ManifoldType::Circles);
        let m = collide_circles(&c, &at(0.0, 0.0), &c, &at(1.1, 0.0));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_polygon_circle_face_and_vertex() {
        let b = PolygonShape::new_box(1.0, 1.0);
        let c = CircleShape::new(0.5);

        let face = collide_polygon_and_circle(&b, &at(0.0, 0.0), &c, &at(0.0, 1.4));
        assert_eq!(face.point_count, 1);
        assert_eq!(face.local_normal, Vec2::new(0.0, 1.0));

        let corner = collide_polygon_and_circle(&b, &at(0.0, 0.0), &c, &at(1.2, 1.2));
        assert_eq!(corner.point_count, 1);
        assert!((corner.local_normal.x - corner.local_normal.y).abs() < 1e-5);

        let miss = collide_polygon_and_circle(&b, &at(0.0, 0.0), &c, &at(1.5, 1.5));
        assert_eq!(miss.point_count, 0);
    }

    #[test]
    fn test_stacked_boxes_two_points() {
        let b = PolygonShape::new_box(0.5, 0.5);
        let xf_a = at(0.0, 0.0);
        let xf_b = at(0.1, 0.99);
        let m = collide_polygons(&b, &xf_a, &b, &xf_b);
        assert_eq!(m.point_count, 2);
        let wm = WorldManifold::new(&m, &xf_a, b.radius, &xf_b, b.radius);
        assert!((wm.normal.y - 1.0).abs() < 1e-5);
        // Surface overlap of 0.01 plus both skins
        for s in &wm.separations {
            assert!((s + 0.03).abs() < 1e-4, "separation {s}");
        }
        assert_ne!(m.points[0].id, m.points[1].id);
    }

    #[test]
    fn test_separated_boxes() {
        let b = PolygonShape::new_box(0.5, 0.5);
        let m = collide_polygons(&b, &at(0.0, 0.0), &b, &at(0.0, 1.1));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_edge_circle_regions() {
        let e = ground_edge(false);
        let c = CircleShape::new(0.5);

        let face = collide_edge_and_circle(&e, &at(0.0, 0.0), &c, &at(0.0, 0.45));
        assert_eq!(face.manifold_type, ManifoldType::FaceA);
        assert!((face.local_normal.y - 1.0).abs() < 1e-5);

        // Two-sided: from below the normal flips
        let below = collide_edge_and_circle(&e, &at(0.0, 0.0), &c, &at(0.0, -0.45));
        assert!((below.local_normal.y + 1.0).abs() < 1e-5);

        let vertex = collide_edge_and_circle(&e, &at(0.0, 0.0), &c, &at(5.3, 0.1));
        assert_eq!(vertex.manifold_type, ManifoldType::Circles);
        assert_eq!(vertex.points[0].id.index_a, 0);
    }

    #[test]
    fn test_one_sided_edge_rejects_back_side() {
        let e = ground_edge(true);
        let c = CircleShape::new(0.5);
        let m = collide_edge_and_circle(&e, &at(0.0, 0.0), &c, &at(0.0, -0.45));
        assert_eq!(m.point_count, 0);
        let b = PolygonShape::new_box(0.5, 0.5);
        let m = collide_edge_and_polygon(&e, &at(0.0, 0.0), &b, &at(0.0, -0.45));
        assert_eq!(m.point_count, 0);
    }

    #[test]
    fn test_box_resting_on_edge() {
        let e = ground_edge(true);
        let b = PolygonShape::new_box(0.5, 0.5);
        let xf_b = at(0.0, 0.5 + POLYGON_RADIUS);
        let m = collide_edge_and_polygon(&e, &at(0.0, 0.0), &b, &xf_b);
        assert_eq!(m.point_count, 2);
        let wm = WorldManifold::new(&m, &at(0.0, 0.0), e.radius, &xf_b, b.radius);
        assert!((wm.normal.y - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_chain_dispatch() {
        let vs = [
            Vec2::new(4.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(-4.0, 0.0),
        ];
        let chain = Shape::Chain(
            ChainShape::create_chain(&vs, Vec2::new(5.0, 0.0), Vec2::new(-5.0, 0.0))
                .expect("valid chain"),
        );
        let circle = Shape::Circle(CircleShape::new(0.5));
        let m = collide(&chain, 1, &at(0.0, 0.0), &circle, &at(-2.0, 0.49));
        assert_eq!(m.point_count, 1);
        assert!(is_supported_pair(&circle, &chain));
        let edge = Shape::Edge(ground_edge(false));
        assert!(!is_supported_pair(&edge, &chain));
        assert_eq!(collide(&chain, 0, &at(0.0, 0.0), &edge, &at(0.0, 0.0)).point_count, 0);
    }
}
