//! Capsule push-out against the static environment mesh.
//!
//! Resolution is a single accumulating pass over the BVH candidates: every
//! triangle closer than the capsule radius pushes the segment out until it
//! is one radius clear. Face contacts push along the face normal; edge and
//! vertex contacts push along the closest-point separation.
#![forbid(unsafe_code)]

use rapier3d::math::{Isometry, Point, Real, Rotation, Vector};
use rapier3d::parry::bounding_volume::Aabb;
use rapier3d::parry::query::{self, ClosestPoints};
use rapier3d::parry::shape::{Segment, Triangle};
use static_collider::StaticCollider;

/// Length trimmed off every correction so a resting avatar does not jitter.
pub const REST_EPSILON: Real = 1.0e-5;
/// Share of this tick's vertical travel an upward correction must exceed to count as ground.
pub const GROUND_THRESHOLD_SCALE: Real = 0.25;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capsule {
    radius: Real,
    start: Point<Real>,
    end: Point<Real>,
}

impl Capsule {
    /// Segment endpoints are in avatar-local space.
    pub fn new(radius: Real, start: Point<Real>, end: Point<Real>) -> Result<Self, String> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err("capsule radius must be finite and > 0".to_string());
        }
        let finite = |p: &Point<Real>| p.coords.iter().all(|c| c.is_finite());
        if !finite(&start) || !finite(&end) {
            return Err("capsule segment must be finite".to_string());
        }
        Ok(Self { radius, start, end })
    }

    pub fn radius(&self) -> Real {
        self.radius
    }

    pub fn start(&self) -> Point<Real> {
        self.start
    }

    pub fn end(&self) -> Point<Real> {
        self.end
    }

    pub fn segment_length(&self) -> Real {
        (self.end - self.start).norm()
    }
}

impl Default for Capsule {
    fn default() -> Self {
        Self {
            radius: 0.5,
            start: Point::origin(),
            end: Point::new(0.0, -10.0, 0.0),
        }
    }
}

/// World placement of the avatar carrying the capsule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvatarTransform {
    pub position: Vector<Real>,
    pub rotation: Rotation<Real>,
    pub scale: Real,
}

impl AvatarTransform {
    pub fn new(position: Vector<Real>, rotation: Rotation<Real>, scale: Real) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn transform_point(&self, local: &Point<Real>) -> Point<Real> {
        Point::from(self.position + self.rotation * (local.coords * self.scale))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionResolution {
    /// World displacement of the segment start produced by the push-out pass.
    /// Measured from the transformed segment start rather than the avatar
    /// origin, so an offset `Capsule::start` does not leak into the delta.
    pub delta: Vector<Real>,
    /// `delta` shortened by [`REST_EPSILON`]; this is what moves the avatar.
    pub correction: Vector<Real>,
    pub grounded: bool,
    pub velocity: Vector<Real>,
    /// Number of triangles that pushed the capsule.
    pub contacts: usize,
}

/// Owns the candidate buffer reused between ticks; one resolver per avatar.
#[derive(Debug, Default)]
pub struct CollisionResolver {
    candidates: Vec<u32>,
}

impl CollisionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(
        &mut self,
        collider: &StaticCollider,
        capsule: &Capsule,
        avatar: &AvatarTransform,
        velocity: Vector<Real>,
        dt: Real,
    ) -> CollisionResolution {
        let radius = capsule.radius();
        let world_start = avatar.transform_point(&capsule.start());
        let world_end = avatar.transform_point(&capsule.end());
        let to_local = collider.position().inverse();
        let mut start = to_local * world_start;
        let mut end = to_local * world_end;

        let bounds = Aabb::new(
            Point::from(start.coords.inf(&end.coords).add_scalar(-radius)),
            Point::from(start.coords.sup(&end.coords).add_scalar(radius)),
        );
        collider.triangles_in_aabb(&bounds, &mut self.candidates);

        let mut contacts = 0;
        for &index in &self.candidates {
            let Some(triangle) = collider.triangle(index) else {
                continue;
            };
            let Some(push) = triangle_push(&triangle, &start, &end, radius) else {
                continue;
            };
            start += push;
            end += push;
            contacts += 1;
        }

        let resolved_start = collider.position() * start;
        let delta = resolved_start - world_start;
        let grounded = delta.y > (dt * velocity.y).abs() * GROUND_THRESHOLD_SCALE;

        let length = delta.norm();
        let correction = if length > 0.0 {
            delta * ((length - REST_EPSILON).max(0.0) / length)
        } else {
            Vector::zeros()
        };

        let velocity = if grounded {
            Vector::zeros()
        } else if let Some(normal) = correction.try_normalize(Real::EPSILON) {
            velocity - normal * normal.dot(&velocity)
        } else {
            velocity
        };

        CollisionResolution {
            delta,
            correction,
            grounded,
            velocity,
            contacts,
        }
    }
}

/// Heights below this count as lying on the face plane.
const PLANE_TOLERANCE: Real = 1.0e-5;
/// How far outside an edge a projected point may land and still hit the face.
const FACE_TOLERANCE: Real = 1.0e-4;
/// Closest-point separations shorter than `radius * TOUCH_TOLERANCE` carry no usable direction.
const TOUCH_TOLERANCE: Real = 1.0e-3;

/// Face normal of `triangle` on the side of `start`, with the signed heights
/// of both endpoints above it. A start lying on the plane takes the side
/// opposite `end`.
fn oriented_plane(
    triangle: &Triangle,
    start: &Point<Real>,
    end: &Point<Real>,
) -> Option<(Vector<Real>, Real, Real)> {
    let normal = (triangle.b - triangle.a)
        .cross(&(triangle.c - triangle.a))
        .try_normalize(Real::EPSILON)?;
    let above_start = normal.dot(&(start - triangle.a));
    let above_end = normal.dot(&(end - triangle.a));
    let side = if above_start.abs() > PLANE_TOLERANCE {
        above_start
    } else {
        -above_end
    };
    if side < 0.0 {
        Some((-normal, -above_start, -above_end))
    } else {
        Some((normal, above_start, above_end))
    }
}

/// True when `point`, already on the plane of `triangle`, lies inside it.
fn face_contains(triangle: &Triangle, point: &Point<Real>) -> bool {
    let winding = (triangle.b - triangle.a).cross(&(triangle.c - triangle.a));
    let area = winding.norm();
    [
        (triangle.a, triangle.b),
        (triangle.b, triangle.c),
        (triangle.c, triangle.a),
    ]
    .iter()
    .all(|(from, to)| {
        let edge = to - from;
        edge.cross(&(point - from)).dot(&winding) >= -FACE_TOLERANCE * edge.norm() * area
    })
}

/// Correction that leaves the segment one radius clear of `triangle`, or
/// `None` when they are already that far apart.
///
/// Face contacts are measured against the plane directly: the push runs
/// along the normal facing `start` and lifts the deepest point of the
/// segment to one radius. Only edge and vertex contacts fall back to the
/// closest points between the two shapes.
fn triangle_push(
    triangle: &Triangle,
    start: &Point<Real>,
    end: &Point<Real>,
    radius: Real,
) -> Option<Vector<Real>> {
    let (normal, above_start, above_end) = oriented_plane(triangle, start, end)?;
    let depth = above_start.min(above_end);
    if depth >= radius {
        return None;
    }
    let on_face = if depth > -PLANE_TOLERANCE {
        let foot = |point: &Point<Real>, height: Real| point - normal * height;
        if (above_start - above_end).abs() <= PLANE_TOLERANCE {
            face_contains(triangle, &foot(start, above_start))
                || face_contains(triangle, &foot(end, above_end))
        } else if above_end < above_start {
            face_contains(triangle, &foot(end, above_end))
        } else {
            face_contains(triangle, &foot(start, above_start))
        }
    } else {
        // Segment crosses the plane.
        let t = above_start / (above_start - above_end);
        face_contains(triangle, &(start + (end - start) * t))
    };
    if on_face {
        return Some(normal * (radius - depth));
    }

    let identity = Isometry::identity();
    let segment = Segment::new(*start, *end);
    match query::closest_points(&identity, &segment, &identity, triangle, radius) {
        Ok(ClosestPoints::WithinMargin(on_segment, on_triangle)) => {
            let separation = on_segment - on_triangle;
            let distance = separation.norm();
            if distance >= radius {
                return None;
            }
            match separation.try_normalize(radius * TOUCH_TOLERANCE) {
                Some(direction) => Some(direction * (radius - distance)),
                None => Some(normal * (radius - depth.max(0.0))),
            }
        }
        Ok(ClosestPoints::Intersecting) => Some(normal * (radius - depth)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: Real = 1.0 / 60.0;

    fn quad(a: Point<Real>, b: Point<Real>, c: Point<Real>, d: Point<Real>) -> StaticCollider {
        StaticCollider::from_triangles(vec![a, b, c, d], vec![[0, 2, 1], [1, 2, 3]], Isometry::identity())
            .expect("quad")
    }

    fn floor_of_size(half: Real) -> StaticCollider {
        quad(
            Point::new(-half, 0.0, -half),
            Point::new(half, 0.0, -half),
            Point::new(-half, 0.0, half),
            Point::new(half, 0.0, half),
        )
    }

    fn floor_plane() -> StaticCollider {
        floor_of_size(20.0)
    }

    fn floor_and_wall() -> StaticCollider {
        let vertices = vec![
            Point::new(-20.0, 0.0, -20.0),
            Point::new(20.0, 0.0, -20.0),
            Point::new(-20.0, 0.0, 20.0),
            Point::new(20.0, 0.0, 20.0),
            Point::new(1.0, -1.0, -5.0),
            Point::new(1.0, 20.0, -5.0),
            Point::new(1.0, -1.0, 5.0),
            Point::new(1.0, 20.0, 5.0),
        ];
        let indices = vec![[0, 2, 1], [1, 2, 3], [4, 6, 5], [5, 6, 7]];
        StaticCollider::from_triangles(vertices, indices, Isometry::identity()).expect("scene")
    }

    fn at(x: Real, y: Real, z: Real) -> AvatarTransform {
        AvatarTransform::new(Vector::new(x, y, z), Rotation::identity(), 1.0)
    }

    #[test]
    fn capsule_requires_positive_radius() {
        assert!(Capsule::new(0.0, Point::origin(), Point::new(0.0, -1.0, 0.0)).is_err());
        assert!(Capsule::new(Real::NAN, Point::origin(), Point::origin()).is_err());
        assert_eq!(Capsule::default().segment_length(), 10.0);
    }

    #[test]
    fn lands_half_a_radius_above_floor() {
        let floor = floor_plane();
        let mut resolver = CollisionResolver::new();
        let avatar = at(1.0, 10.2, 2.0);
        let result = resolver.resolve(
            &floor,
            &Capsule::default(),
            &avatar,
            Vector::new(0.0, -3.0, 0.0),
            DT,
        );
        assert!(result.grounded);
        assert!(result.contacts >= 1);
        assert_eq!(result.velocity, Vector::zeros());
        let landed = avatar.position + result.correction;
        let bottom = landed.y - 10.0;
        assert!((bottom - 0.5).abs() < 1.0e-3, "bottom at {}", bottom);
    }

    #[test]
    fn no_candidates_is_a_no_op() {
        let floor = floor_plane();
        let mut resolver = CollisionResolver::new();
        let velocity = Vector::new(1.0, -2.0, 0.0);
        let result = resolver.resolve(&floor, &Capsule::default(), &at(0.0, 40.0, 0.0), velocity, DT);
        assert_eq!(result.contacts, 0);
        assert_eq!(result.delta, Vector::zeros());
        assert!(!result.grounded);
        assert_eq!(result.velocity, velocity);
    }

    #[test]
    fn grounded_threshold_uses_incoming_velocity() {
        let floor = floor_plane();
        let mut resolver = CollisionResolver::new();
        // 0.01 of push-up is below a quarter of a 3 m/s fall over one second.
        let result = resolver.resolve(
            &floor,
            &Capsule::default(),
            &at(1.0, 10.49, 2.0),
            Vector::new(0.0, -3.0, 0.0),
            1.0,
        );
        assert!(result.delta.y > 0.0);
        assert!(!result.grounded);
        assert!(result.velocity.y.abs() < 1.0e-4);
    }

    #[test]
    fn airborne_contact_slides_along_wall() {
        let wall = quad(
            Point::new(1.0, -1.0, -5.0),
            Point::new(1.0, 30.0, -5.0),
            Point::new(1.0, -1.0, 5.0),
            Point::new(1.0, 30.0, 5.0),
        );
        let mut resolver = CollisionResolver::new();
        let result = resolver.resolve(
            &wall,
            &Capsule::default(),
            &at(0.7, 15.0, 0.0),
            Vector::new(5.0, -1.0, 0.0),
            DT,
        );
        assert!(!result.grounded);
        assert!((result.delta.x + 0.2).abs() < 1.0e-3);
        assert!(result.velocity.x.abs() < 1.0e-3);
        assert!((result.velocity.y + 1.0).abs() < 1.0e-3);
    }

    #[test]
    fn no_residual_penetration_after_pass() {
        let scene = floor_and_wall();
        let capsule = Capsule::default();
        let mut resolver = CollisionResolver::new();
        let avatar = at(0.7, 10.2, 0.0);
        let result = resolver.resolve(&scene, &capsule, &avatar, Vector::new(0.0, -3.0, 0.0), DT);
        assert!(result.contacts >= 2);

        let moved = AvatarTransform::new(avatar.position + result.delta, avatar.rotation, 1.0);
        let segment = Segment::new(
            moved.transform_point(&capsule.start()),
            moved.transform_point(&capsule.end()),
        );
        let identity = Isometry::identity();
        for index in 0..scene.triangle_count() as u32 {
            let triangle: Triangle = scene.triangle(index).expect("triangle");
            let distance =
                query::distance(&identity, &segment, &identity, &triangle).expect("distance");
            assert!(distance >= capsule.radius() - 1.0e-3, "triangle {} at {}", index, distance);
        }
    }

    #[test]
    fn avatar_scale_shrinks_the_segment() {
        let floor = floor_plane();
        let mut resolver = CollisionResolver::new();
        let avatar = AvatarTransform::new(Vector::new(1.0, 2.3, 2.0), Rotation::identity(), 0.2);
        let result = resolver.resolve(
            &floor,
            &Capsule::default(),
            &avatar,
            Vector::new(0.0, -1.0, 0.0),
            DT,
        );
        assert!(result.grounded);
        assert!((avatar.position.y + result.delta.y - 2.5).abs() < 1.0e-3);
    }

    #[test]
    fn segment_crossing_the_floor_is_lifted_out() {
        let floor = floor_plane();
        let mut resolver = CollisionResolver::new();
        let avatar = at(1.0, 9.9, 2.0);
        let result = resolver.resolve(
            &floor,
            &Capsule::default(),
            &avatar,
            Vector::new(0.0, -0.5, 0.0),
            DT,
        );
        assert!(result.grounded);
        assert!((result.delta.y - 0.6).abs() < 1.0e-3, "delta {:?}", result.delta);
        assert!(result.delta.x.abs() < 1.0e-4 && result.delta.z.abs() < 1.0e-4);
    }

    #[test]
    fn resting_contact_pushes_straight_up() {
        let capsule = Capsule::default();
        let mut resolver = CollisionResolver::new();
        for half in [10.0, 100.0] {
            let floor = floor_of_size(half);
            for gap in [0.0, 1.0e-6] {
                let avatar = at(3.3, 10.0 + gap, -7.1);
                let result = resolver.resolve(
                    &floor,
                    &capsule,
                    &avatar,
                    Vector::new(0.0, -0.5, 0.0),
                    DT,
                );
                assert!(result.grounded, "half {} gap {}: {:?}", half, gap, result.delta);
                assert!(result.delta.x.abs() < 1.0e-5, "half {} gap {}: {:?}", half, gap, result.delta);
                assert!(result.delta.z.abs() < 1.0e-5, "half {} gap {}: {:?}", half, gap, result.delta);
                assert!(
                    (result.delta.y - (capsule.radius() - gap)).abs() < 1.0e-4,
                    "half {} gap {}: {:?}",
                    half,
                    gap,
                    result.delta
                );
            }
        }
    }

    #[test]
    fn near_contact_on_a_wide_floor_stays_vertical() {
        let floor = floor_of_size(1000.0);
        let mut resolver = CollisionResolver::new();
        for gap in [-1.0e-4, 1.0e-2] {
            let result = resolver.resolve(
                &floor,
                &Capsule::default(),
                &at(3.3, 10.0 + gap, -7.1),
                Vector::new(0.0, -0.5, 0.0),
                DT,
            );
            assert!(result.grounded);
            assert!(result.delta.x.abs() < 1.0e-5 && result.delta.z.abs() < 1.0e-5);
            assert!((result.delta.y - (0.5 - gap)).abs() < 1.0e-3, "delta {:?}", result.delta);
        }
    }

    #[test]
    fn edge_contact_pushes_away_from_the_edge() {
        // Floor ends at x = 1; the segment passes 0.3 beyond that edge.
        let ledge = quad(
            Point::new(-20.0, 0.0, -20.0),
            Point::new(1.0, 0.0, -20.0),
            Point::new(-20.0, 0.0, 20.0),
            Point::new(1.0, 0.0, 20.0),
        );
        let mut resolver = CollisionResolver::new();
        let result = resolver.resolve(
            &ledge,
            &Capsule::default(),
            &at(1.3, 9.9, 0.0),
            Vector::new(0.0, -0.5, 0.0),
            DT,
        );
        assert_eq!(result.contacts, 1);
        let expected = Vector::new(0.2, 0.0, 0.0);
        assert!(!result.grounded);
        assert!((result.delta - expected).norm() < 1.0e-3, "delta {:?}", result.delta);
    }

    #[test]
    fn delta_tracks_an_offset_segment_start() {
        let floor = floor_plane();
        let capsule =
            Capsule::new(0.5, Point::new(0.0, 1.0, 0.0), Point::new(0.0, -9.0, 0.0)).expect("capsule");
        let mut resolver = CollisionResolver::new();
        let avatar = at(1.0, 9.0, 2.0);
        let result = resolver.resolve(&floor, &capsule, &avatar, Vector::new(0.0, -0.5, 0.0), DT);
        // The segment start sits at y = 10 and moves by the push alone.
        assert!(result.grounded);
        assert!((result.delta - Vector::new(0.0, 0.5, 0.0)).norm() < 1.0e-4, "delta {:?}", result.delta);
    }
}
