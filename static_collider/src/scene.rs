use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::{Isometry, Point, Real, Translation, Vector};
use serde::Deserialize;

const SCENE_VERSION: u32 = 1;
pub const INTERACTIVE_TAG: &str = "interactive";

/// Environment layout loaded from TOML and expanded into a triangle soup.
#[derive(Clone, Debug, Deserialize)]
pub struct SceneDescription {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub position: Option<[f32; 3]>,
    #[serde(default)]
    pub yaw_deg: Option<f32>,
    #[serde(default)]
    pub solids: Vec<SolidSpec>,
    #[serde(default)]
    pub meshes: Vec<MeshSpec>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SolidSpec {
    pub id: String,
    pub kind: SolidKind,
    pub pos: [f32; 3],
    pub size: [f32; 3],
    #[serde(default)]
    pub yaw_deg: Option<f32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolidKind {
    Box,
    Ramp,
    /// Upward-facing quad spanning `size[0]` x `size[2]`; `size[1]` is ignored.
    Plane,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MeshSpec {
    pub id: String,
    pub vertices: Vec<[f32; 3]>,
    pub indices: Vec<[u32; 3]>,
}

impl SceneDescription {
    pub fn parse_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.version != SCENE_VERSION {
            return Err(format!("unsupported scene version {}", self.version));
        }
        if let Some(position) = self.position {
            if !vector_is_finite(position) {
                return Err("scene position must be finite".to_string());
            }
        }
        if self.solids.is_empty() && self.meshes.is_empty() {
            return Err(format!("scene '{}' has no geometry", self.name));
        }
        for solid in &self.solids {
            solid.validate()?;
        }
        for mesh in &self.meshes {
            if mesh.id.trim().is_empty() {
                return Err("mesh id must not be empty".to_string());
            }
            if mesh.indices.is_empty() {
                return Err(format!("mesh '{}' has no triangles", mesh.id));
            }
            if !mesh.vertices.iter().all(|vertex| vector_is_finite(*vertex)) {
                return Err(format!("mesh '{}' has non-finite vertices", mesh.id));
            }
            let count = mesh.vertices.len();
            if mesh
                .indices
                .iter()
                .flatten()
                .any(|&index| index as usize >= count)
            {
                return Err(format!("mesh '{}' index out of range", mesh.id));
            }
        }
        Ok(())
    }

    pub fn isometry(&self) -> Isometry<Real> {
        let pos = self.position.unwrap_or([0.0, 0.0, 0.0]);
        Isometry::from_parts(
            Translation::from(Vector::new(pos[0], pos[1], pos[2])),
            yaw_rotation(self.yaw_deg),
        )
    }

    /// Scene-local triangle soup (solids first, then raw meshes).
    pub fn triangles(&self) -> (Vec<Point<Real>>, Vec<[u32; 3]>) {
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for solid in &self.solids {
            let iso = solid.isometry();
            let (local_vertices, local_indices) = solid.mesh();
            append(
                &mut vertices,
                &mut indices,
                local_vertices.iter().map(|vertex| iso * vertex),
                &local_indices,
            );
        }
        for mesh in &self.meshes {
            append(
                &mut vertices,
                &mut indices,
                mesh.vertices.iter().map(|v| Point::new(v[0], v[1], v[2])),
                &mesh.indices,
            );
        }
        (vertices, indices)
    }

    pub fn interactive_solids(&self) -> impl Iterator<Item = &SolidSpec> {
        self.solids.iter().filter(|solid| solid.is_interactive())
    }
}

impl SolidSpec {
    fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("solid id must not be empty".to_string());
        }
        if !vector_is_finite(self.pos) || !vector_is_finite(self.size) {
            return Err(format!("solid '{}' must have finite pos and size", self.id));
        }
        let positive = match self.kind {
            SolidKind::Plane => self.size[0] > 0.0 && self.size[2] > 0.0,
            SolidKind::Box | SolidKind::Ramp => self.size.iter().all(|&extent| extent > 0.0),
        };
        if !positive {
            return Err(format!("solid '{}' size must be > 0", self.id));
        }
        Ok(())
    }

    pub fn is_interactive(&self) -> bool {
        self.tags.iter().any(|tag| tag == INTERACTIVE_TAG)
    }

    pub fn isometry(&self) -> Isometry<Real> {
        Isometry::from_parts(
            Translation::from(Vector::new(self.pos[0], self.pos[1], self.pos[2])),
            yaw_rotation(self.yaw_deg),
        )
    }

    /// Solid-local vertices and outward-wound indices.
    pub fn mesh(&self) -> (Vec<Point<Real>>, Vec<[u32; 3]>) {
        let hx = self.size[0] * 0.5;
        let hy = self.size[1] * 0.5;
        let hz = self.size[2] * 0.5;
        match self.kind {
            SolidKind::Box => {
                let vertices = (0..8)
                    .map(|corner| {
                        Point::new(
                            if corner & 1 == 0 { -hx } else { hx },
                            if corner & 2 == 0 { -hy } else { hy },
                            if corner & 4 == 0 { -hz } else { hz },
                        )
                    })
                    .collect();
                let indices = vec![
                    [0, 2, 1],
                    [1, 2, 3],
                    [4, 5, 6],
                    [5, 7, 6],
                    [0, 4, 2],
                    [2, 4, 6],
                    [1, 3, 5],
                    [3, 7, 5],
                    [0, 1, 4],
                    [1, 5, 4],
                    [2, 6, 3],
                    [3, 6, 7],
                ];
                (vertices, indices)
            }
            SolidKind::Ramp => {
                // Rises along +X from the low edge to the high edge.
                let vertices = vec![
                    Point::new(-hx, -hy, -hz),
                    Point::new(hx, -hy, -hz),
                    Point::new(hx, hy, -hz),
                    Point::new(-hx, -hy, hz),
                    Point::new(hx, -hy, hz),
                    Point::new(hx, hy, hz),
                ];
                let indices = vec![
                    [0, 1, 2],
                    [3, 5, 4],
                    [0, 3, 4],
                    [0, 4, 1],
                    [0, 2, 5],
                    [0, 5, 3],
                    [1, 4, 5],
                    [1, 5, 2],
                ];
                (vertices, indices)
            }
            SolidKind::Plane => {
                let vertices = vec![
                    Point::new(-hx, 0.0, -hz),
                    Point::new(hx, 0.0, -hz),
                    Point::new(-hx, 0.0, hz),
                    Point::new(hx, 0.0, hz),
                ];
                (vertices, vec![[0, 2, 1], [1, 2, 3]])
            }
        }
    }
}

fn append(
    vertices: &mut Vec<Point<Real>>,
    indices: &mut Vec<[u32; 3]>,
    new_vertices: impl Iterator<Item = Point<Real>>,
    new_indices: &[[u32; 3]],
) {
    let base = vertices.len() as u32;
    vertices.extend(new_vertices);
    indices.extend(
        new_indices
            .iter()
            .map(|tri| [tri[0] + base, tri[1] + base, tri[2] + base]),
    );
}

fn yaw_rotation(yaw_deg: Option<f32>) -> UnitQuaternion<Real> {
    match yaw_deg {
        Some(yaw) => UnitQuaternion::from_euler_angles(0.0, yaw.to_radians(), 0.0),
        None => UnitQuaternion::identity(),
    }
}

fn vector_is_finite(value: [f32; 3]) -> bool {
    value.iter().all(|component| component.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticCollider;

    const GALLERY: &str = r#"
version = 1
name = "gallery"

[[solids]]
id = "floor"
kind = "box"
pos = [0.0, -0.5, 0.0]
size = [40.0, 1.0, 40.0]

[[solids]]
id = "frame1"
kind = "box"
pos = [0.0, 2.0, -6.0]
size = [2.0, 2.0, 0.2]
tags = ["interactive"]
title = "Sunflower"

[[meshes]]
id = "step"
vertices = [[2.0, 0.2, 2.0], [3.0, 0.2, 2.0], [2.0, 0.2, 3.0]]
indices = [[0, 2, 1]]
"#;

    #[test]
    fn parses_and_expands_scene() {
        let scene = SceneDescription::parse_toml(GALLERY).expect("parse");
        scene.validate().expect("valid");
        let (vertices, indices) = scene.triangles();
        assert_eq!(indices.len(), 12 + 12 + 1);
        assert_eq!(vertices.len(), 8 + 8 + 3);
        assert_eq!(scene.interactive_solids().count(), 1);
    }

    #[test]
    fn box_top_is_hit_from_above() {
        let scene = SceneDescription::parse_toml(GALLERY).expect("parse");
        let collider = StaticCollider::from_scene(&scene).expect("collider");
        let hit = collider
            .cast_ray(Point::new(5.0, 3.0, 5.0), Vector::new(0.0, -1.0, 0.0), 10.0)
            .expect("hit");
        assert!(hit.point.y.abs() < 1.0e-4);
    }

    #[test]
    fn interactive_solids_get_their_own_colliders() {
        let scene = SceneDescription::parse_toml(GALLERY).expect("parse");
        let targets = StaticCollider::interactive_from_scene(&scene).expect("targets");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].0.title.as_deref(), Some("Sunflower"));
        assert_eq!(targets[0].1.triangle_count(), 12);
    }

    #[test]
    fn rejects_bad_scenes() {
        let bad_version = GALLERY.replacen("version = 1", "version = 7", 1);
        let scene = SceneDescription::parse_toml(&bad_version).expect("parse");
        assert!(scene.validate().is_err());

        let flat_box = GALLERY.replacen("[40.0, 1.0, 40.0]", "[40.0, 0.0, 40.0]", 1);
        let scene = SceneDescription::parse_toml(&flat_box).expect("parse");
        assert!(scene.validate().is_err());
    }
}
