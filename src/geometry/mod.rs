// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - computed geometry values and the kernels producing them

mod bbox;
mod boolean;
mod kernel;
mod mesh;
mod outline;
mod primitives;

pub use bbox::BoundingBox;
pub use boolean::{apply_boolean, BooleanOp};
pub use kernel::{GeometryKernel, MeshKernel, MeshSolidKernel, SolidKernel};
pub use mesh::{Mesh, Triangle, Vertex};
pub use outline::Outline2d;
pub use primitives::{fragments, Primitive};

use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

/// Solid produced by the exact kernel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExactSolid {
    pub polyhedron: Mesh,
    /// Number of disjoint volumes the kernel tracked while combining
    pub volumes: usize,
}

impl ExactSolid {
    pub fn new(polyhedron: Mesh) -> Self {
        let volumes = usize::from(!polyhedron.is_empty());
        Self { polyhedron, volumes }
    }
}

/// A computed geometry value
///
/// Closed set of representations; callers ask for the one they can handle
/// through the `as_*` accessors instead of inspecting types at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// Preview polygon soup
    Mesh(Mesh),
    /// Planar contours
    Outline(Outline2d),
    /// Exact-kernel solid
    Solid(ExactSolid),
}

impl Geometry {
    pub fn dimension(&self) -> u8 {
        match self {
            Geometry::Outline(_) => 2,
            Geometry::Mesh(_) | Geometry::Solid(_) => 3,
        }
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match self {
            Geometry::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_outline(&self) -> Option<&Outline2d> {
        match self {
            Geometry::Outline(outline) => Some(outline),
            _ => None,
        }
    }

    pub fn as_solid(&self) -> Option<&ExactSolid> {
        match self {
            Geometry::Solid(solid) => Some(solid),
            _ => None,
        }
    }

    /// Triangles for drawing, whatever the representation (3D only)
    pub fn triangles(&self) -> Option<&Mesh> {
        match self {
            Geometry::Mesh(mesh) => Some(mesh),
            Geometry::Solid(solid) => Some(&solid.polyhedron),
            Geometry::Outline(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Mesh(mesh) => mesh.is_empty(),
            Geometry::Outline(outline) => outline.is_empty(),
            Geometry::Solid(solid) => solid.polyhedron.is_empty(),
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            Geometry::Mesh(mesh) => mesh.bounding_box(),
            Geometry::Outline(outline) => outline.bounding_box(),
            Geometry::Solid(solid) => solid.polyhedron.bounding_box(),
        }
    }

    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Geometry {
        match self {
            Geometry::Mesh(mesh) => Geometry::Mesh(mesh.transformed(matrix)),
            Geometry::Outline(outline) => {
                let mut outline = outline.clone();
                outline.transform(matrix);
                Geometry::Outline(outline)
            }
            Geometry::Solid(solid) => Geometry::Solid(ExactSolid {
                polyhedron: solid.polyhedron.transformed(matrix),
                volumes: solid.volumes,
            }),
        }
    }

    /// Approximate heap footprint in bytes
    pub fn memory_size(&self) -> usize {
        match self {
            Geometry::Mesh(mesh) => mesh.memory_size(),
            Geometry::Outline(outline) => outline.memory_size(),
            Geometry::Solid(solid) => solid.polyhedron.memory_size(),
        }
    }

    /// Human-readable summary lines, as printed when a render finishes
    pub fn summary(&self) -> Vec<String> {
        match self {
            Geometry::Mesh(mesh) => vec![
                "Top level object is a 3D object:".to_string(),
                format!("   Facets:     {:6}", mesh.triangle_count()),
            ],
            Geometry::Solid(solid) => vec![
                "Top level object is a 3D object:".to_string(),
                format!("   Vertices:   {:6}", solid.polyhedron.vertex_count()),
                format!("   Facets:     {:6}", solid.polyhedron.triangle_count()),
                format!("   Volumes:    {:6}", solid.volumes),
            ],
            Geometry::Outline(outline) => vec![
                "Top level object is a 2D object:".to_string(),
                format!("   Contours:   {:6}", outline.contour_count()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Vector2, Vector3};

    #[test]
    fn test_capability_accessors() {
        let mesh = Geometry::Mesh(Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_mesh());
        assert!(mesh.as_mesh().is_some());
        assert!(mesh.as_outline().is_none());
        assert_eq!(mesh.dimension(), 3);

        let outline = Geometry::Outline(Primitive::square(Vector2::new(1.0, 1.0), false).to_outline());
        assert!(outline.triangles().is_none());
        assert_eq!(outline.dimension(), 2);
        assert_eq!(outline.summary()[0], "Top level object is a 2D object:");
    }

    #[test]
    fn test_exact_solid_volume_count() {
        assert_eq!(ExactSolid::new(Mesh::default()).volumes, 0);
        let cube = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_mesh();
        assert_eq!(ExactSolid::new(cube).volumes, 1);
    }
}
