//! Immutable environment collider: triangle mesh indexed by a BVH.
#![forbid(unsafe_code)]

mod scene;

use rapier3d::parry::bounding_volume::Aabb;
use rapier3d::parry::query::Ray;
use rapier3d::parry::shape::{TriMesh, Triangle};
use rapier3d::prelude::{Collider, ColliderBuilder, Isometry, Point, Real, Vector};

pub use scene::{MeshSpec, SceneDescription, SolidKind, SolidSpec, INTERACTIVE_TAG};

/// Triangles with a smaller area report no contact.
const MIN_TRIANGLE_AREA: Real = 1.0e-8;
/// Ray hits closer than this are treated as misses.
const MIN_RAY_TOI: Real = 1.0e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub toi: Real,
    pub point: Point<Real>,
}

/// Environment geometry in world space, supplied once after the scene loads.
#[derive(Clone, Debug)]
pub struct StaticCollider {
    collider: Collider,
    triangle_count: usize,
}

impl StaticCollider {
    pub fn from_triangles(
        vertices: Vec<Point<Real>>,
        indices: Vec<[u32; 3]>,
        position: Isometry<Real>,
    ) -> Result<Self, String> {
        if vertices.is_empty() || indices.is_empty() {
            return Err("static collider requires at least one triangle".to_string());
        }
        if let Some(index) = vertices
            .iter()
            .position(|vertex| !vertex.coords.iter().all(|c| c.is_finite()))
        {
            return Err(format!("vertex {} is not finite", index));
        }
        let vertex_count = vertices.len();
        for (tri_index, tri) in indices.iter().enumerate() {
            if tri.iter().any(|&index| index as usize >= vertex_count) {
                return Err(format!(
                    "triangle {} references a vertex outside 0..{}",
                    tri_index, vertex_count
                ));
            }
        }
        let triangle_count = indices.len();
        let collider = ColliderBuilder::trimesh(vertices, indices)
            .position(position)
            .build();
        Ok(Self {
            collider,
            triangle_count,
        })
    }

    pub fn from_scene(scene: &SceneDescription) -> Result<Self, String> {
        scene.validate()?;
        let (vertices, indices) = scene.triangles();
        Self::from_triangles(vertices, indices, scene.isometry())
    }

    /// Builds one collider per solid tagged `interactive`, keyed by solid id.
    pub fn interactive_from_scene(
        scene: &SceneDescription,
    ) -> Result<Vec<(SolidSpec, StaticCollider)>, String> {
        scene.validate()?;
        let scene_iso = scene.isometry();
        scene
            .solids
            .iter()
            .filter(|solid| solid.is_interactive())
            .map(|solid| {
                let (vertices, indices) = solid.mesh();
                let collider =
                    Self::from_triangles(vertices, indices, scene_iso * solid.isometry())?;
                Ok((solid.clone(), collider))
            })
            .collect()
    }

    pub fn collider(&self) -> &Collider {
        &self.collider
    }

    /// Transform from collider-local space to world space.
    pub fn position(&self) -> &Isometry<Real> {
        self.collider.position()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }

    fn mesh(&self) -> Option<&TriMesh> {
        self.collider.shape().as_trimesh()
    }

    /// Collects the indices of triangles whose bounds intersect `bounds`
    /// (collider-local space) into `out`, in BVH traversal order.
    pub fn triangles_in_aabb(&self, bounds: &Aabb, out: &mut Vec<u32>) {
        out.clear();
        if let Some(mesh) = self.mesh() {
            mesh.qbvh().intersect_aabb(bounds, out);
        }
    }

    /// Collider-local triangle; `None` for out-of-range or degenerate triangles.
    pub fn triangle(&self, index: u32) -> Option<Triangle> {
        let mesh = self.mesh()?;
        if index as usize >= mesh.num_triangles() {
            return None;
        }
        let triangle = mesh.triangle(index);
        if triangle.area() < MIN_TRIANGLE_AREA {
            return None;
        }
        Some(triangle)
    }

    /// World-space ray cast; the direction does not need to be normalized.
    pub fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_toi: Real,
    ) -> Option<RayHit> {
        if max_toi <= 0.0 || direction.norm_squared() <= 1.0e-12 {
            return None;
        }
        let ray = Ray::new(origin, direction.normalize());
        let toi = self
            .collider
            .shape()
            .cast_ray(self.collider.position(), &ray, max_toi, false)?;
        if toi <= MIN_RAY_TOI {
            return None;
        }
        Some(RayHit {
            toi,
            point: ray.point_at(toi),
        })
    }
}
