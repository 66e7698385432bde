// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Indexed triangle soup drawn by the preview renderer

use super::BoundingBox;
use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl Vertex {
    pub fn new(position: Point3<f64>, normal: Vector3<f64>) -> Self {
        Self { position, normal }
    }
}

/// Three indices into [`Mesh::vertices`], counter-clockwise seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triangle {
    pub indices: [usize; 3],
}

impl Triangle {
    pub fn new(indices: [usize; 3]) -> Self {
        Self { indices }
    }

    fn offset(self, by: usize) -> Self {
        Self::new(self.indices.map(|i| i + by))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertices: usize, triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            triangles: Vec::with_capacity(triangles),
        }
    }

    pub fn add_vertex(&mut self, vertex: Vertex) -> usize {
        self.vertices.push(vertex);
        self.vertices.len() - 1
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Apply `matrix` in place.
    ///
    /// Normals go through the inverse transpose (the matrix itself when it is
    /// singular); a negative determinant reverses the winding.
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        let normals = matrix.try_inverse().map_or(*matrix, |inverse| inverse.transpose());
        for vertex in &mut self.vertices {
            vertex.position = matrix.transform_point(&vertex.position);
            let normal = normals.transform_vector(&vertex.normal);
            vertex.normal = normal.try_normalize(1e-12).unwrap_or(normal);
        }
        if matrix.fixed_view::<3, 3>(0, 0).determinant() < 0.0 {
            self.triangles.iter_mut().for_each(|t| t.indices.swap(1, 2));
        }
    }

    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Mesh {
        let mut mesh = self.clone();
        mesh.transform(matrix);
        mesh
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.vertices.iter().map(|v| &v.position))
    }

    /// Append `other`'s triangles; overlapping volumes are not resolved
    pub fn append(&mut self, other: &Mesh) {
        let base = self.vertices.len();
        self.vertices.extend_from_slice(&other.vertices);
        self.triangles
            .extend(other.triangles.iter().map(|t| t.offset(base)));
    }

    /// Smooth normals: each vertex takes the normalized sum of the
    /// unnormalized face normals around it, so larger faces weigh more
    pub fn recompute_normals(&mut self) {
        let mut sums = vec![Vector3::zeros(); self.vertices.len()];
        for triangle in &self.triangles {
            let [a, b, c] = triangle.indices.map(|i| self.vertices[i].position);
            let face = (b - a).cross(&(c - a));
            triangle.indices.iter().for_each(|&i| sums[i] += face);
        }
        for (vertex, sum) in self.vertices.iter_mut().zip(sums) {
            if let Some(normal) = sum.try_normalize(1e-12) {
                vertex.normal = normal;
            }
        }
    }

    /// Heap footprint in bytes; the cache weight of preview geometry
    pub fn memory_size(&self) -> usize {
        use std::mem::size_of;
        size_of::<Mesh>() + size_of::<Vertex>() * self.vertices.len() + size_of::<Triangle>() * self.triangles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facet() -> Mesh {
        let up = Vector3::z();
        let mut mesh = Mesh::new();
        let corners = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        let indices = corners.map(|p| mesh.add_vertex(Vertex::new(p, up)));
        mesh.add_triangle(Triangle::new(indices));
        mesh
    }

    #[test]
    fn test_append_offsets_indices() {
        let mut mesh = facet();
        mesh.append(&facet());
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangles[1].indices, [3, 4, 5]);
    }

    #[test]
    fn test_mirror_reverses_winding() {
        let mut mesh = facet();
        mesh.transform(&Matrix4::new_nonuniform_scaling(&Vector3::new(-1.0, 1.0, 1.0)));
        assert_eq!(mesh.triangles[0].indices, [0, 2, 1]);
        assert_eq!(mesh.vertices[1].position, Point3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_normals_follow_winding() {
        let mut mesh = facet();
        mesh.vertices.iter_mut().for_each(|v| v.normal = Vector3::x());
        mesh.recompute_normals();
        assert!(mesh.vertices.iter().all(|v| v.normal == Vector3::z()));
    }

    #[test]
    fn test_weight_grows_with_triangles() {
        let single = facet();
        let mut double = facet();
        double.append(&single);
        assert!(double.memory_size() > single.memory_size());
    }
}
