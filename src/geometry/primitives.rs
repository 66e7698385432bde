// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometric primitives generator
//!
//! Primitives carry fully resolved parameters (including the fragment count
//! derived from `$fn`/`$fa`/`$fs`), so the generated geometry is a pure
//! function of the value and can be cached by its description.

use super::{Mesh, Outline2d, Triangle, Vertex};
use nalgebra::{Point2, Point3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Smallest angle allowed for `$fa`
const GRID_FINE: f64 = 0.000_000_95;

/// Geometric primitives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Cube {
        size: Vector3<f64>,
        center: bool,
    },
    Sphere {
        r: f64,
        segments: u32,
    },
    Cylinder {
        h: f64,
        r1: f64,
        r2: f64,
        center: bool,
        segments: u32,
    },
    Square {
        size: Vector2<f64>,
        center: bool,
    },
    Circle {
        r: f64,
        segments: u32,
    },
}

/// Number of fragments used to approximate a circle of radius `r`
///
/// Mirrors the `$fn`/`$fa`/`$fs` rules: an explicit `$fn` wins (at least 3),
/// otherwise the count is bounded by both the angle and the edge length,
/// with a floor of 5.
pub fn fragments(r: f64, fn_: f64, fs: f64, fa: f64) -> u32 {
    if r < GRID_FINE {
        return 3;
    }
    if fn_ > 0.0 {
        return (fn_ as u32).max(3);
    }
    let by_angle = 360.0 / fa.max(0.01);
    let by_size = r * 2.0 * PI / fs.max(0.01);
    by_angle.min(by_size).max(5.0).ceil() as u32
}

impl Primitive {
    pub fn cube(size: Vector3<f64>, center: bool) -> Self {
        Self::Cube { size, center }
    }

    pub fn sphere(r: f64, segments: u32) -> Self {
        Self::Sphere {
            r,
            segments: segments.max(3),
        }
    }

    pub fn cylinder(h: f64, r1: f64, r2: f64, center: bool, segments: u32) -> Self {
        Self::Cylinder {
            h,
            r1,
            r2,
            center,
            segments: segments.max(3),
        }
    }

    pub fn square(size: Vector2<f64>, center: bool) -> Self {
        Self::Square { size, center }
    }

    pub fn circle(r: f64, segments: u32) -> Self {
        Self::Circle {
            r,
            segments: segments.max(3),
        }
    }

    pub fn dimension(&self) -> u8 {
        match self {
            Self::Square { .. } | Self::Circle { .. } => 2,
            _ => 3,
        }
    }

    /// Canonical text form, as it appears in tree dumps
    pub fn describe(&self) -> String {
        match self {
            Self::Cube { size, center } => format!(
                "cube(size = [{}, {}, {}], center = {})",
                size.x, size.y, size.z, center
            ),
            Self::Sphere { r, segments } => format!("sphere($fn = {}, r = {})", segments, r),
            Self::Cylinder {
                h,
                r1,
                r2,
                center,
                segments,
            } => format!(
                "cylinder($fn = {}, h = {}, r1 = {}, r2 = {}, center = {})",
                segments, h, r1, r2, center
            ),
            Self::Square { size, center } => {
                format!("square(size = [{}, {}], center = {})", size.x, size.y, center)
            }
            Self::Circle { r, segments } => format!("circle($fn = {}, r = {})", segments, r),
        }
    }

    /// Tessellate a 3D primitive; 2D primitives yield an empty mesh
    pub fn to_mesh(&self) -> Mesh {
        match self {
            Self::Cube { size, center } => generate_cube_mesh(*size, *center),
            Self::Sphere { r, segments } => generate_sphere_mesh(*r, *segments),
            Self::Cylinder {
                h,
                r1,
                r2,
                center,
                segments,
            } => generate_cylinder_mesh(*h, *r1, *r2, *center, *segments),
            Self::Square { .. } | Self::Circle { .. } => Mesh::default(),
        }
    }

    /// Outline of a 2D primitive; 3D primitives yield an empty outline
    pub fn to_outline(&self) -> Outline2d {
        let mut outline = Outline2d::new();
        match self {
            Self::Square { size, center } => {
                if size.x > 0.0 && size.y > 0.0 {
                    let (x0, y0) = if *center {
                        (-size.x / 2.0, -size.y / 2.0)
                    } else {
                        (0.0, 0.0)
                    };
                    outline.add_contour(vec![
                        Point2::new(x0, y0),
                        Point2::new(x0 + size.x, y0),
                        Point2::new(x0 + size.x, y0 + size.y),
                        Point2::new(x0, y0 + size.y),
                    ]);
                }
            }
            Self::Circle { r, segments } => {
                if *r > 0.0 {
                    outline.add_contour(circle_points(*r, *segments));
                }
            }
            _ => {}
        }
        outline
    }
}

fn circle_points(r: f64, segments: u32) -> Vec<Point2<f64>> {
    (0..segments)
        .map(|i| {
            let phi = 2.0 * PI * i as f64 / segments as f64;
            Point2::new(r * phi.cos(), r * phi.sin())
        })
        .collect()
}

fn generate_cube_mesh(size: Vector3<f64>, center: bool) -> Mesh {
    let mut mesh = Mesh::with_capacity(24, 12);
    if size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0 {
        return mesh;
    }

    let min = if center {
        Point3::from(-size / 2.0)
    } else {
        Point3::origin()
    };
    let max = min + size;

    let corner = |x: bool, y: bool, z: bool| {
        Point3::new(
            if x { max.x } else { min.x },
            if y { max.y } else { min.y },
            if z { max.z } else { min.z },
        )
    };

    // Each face gets its own four vertices so normals stay flat
    let faces = [
        ([(false, false, true), (true, false, true), (true, true, true), (false, true, true)], Vector3::z()),
        ([(true, false, false), (false, false, false), (false, true, false), (true, true, false)], -Vector3::z()),
        ([(true, false, true), (true, false, false), (true, true, false), (true, true, true)], Vector3::x()),
        ([(false, false, false), (false, false, true), (false, true, true), (false, true, false)], -Vector3::x()),
        ([(false, true, true), (true, true, true), (true, true, false), (false, true, false)], Vector3::y()),
        ([(false, false, false), (true, false, false), (true, false, true), (false, false, true)], -Vector3::y()),
    ];

    for (quad, normal) in faces {
        let base = mesh.vertex_count();
        for (x, y, z) in quad {
            mesh.add_vertex(Vertex::new(corner(x, y, z), normal));
        }
        mesh.add_triangle(Triangle::new([base, base + 1, base + 2]));
        mesh.add_triangle(Triangle::new([base, base + 2, base + 3]));
    }

    mesh
}

fn generate_sphere_mesh(r: f64, segments: u32) -> Mesh {
    let mut mesh = Mesh::new();
    if r <= 0.0 {
        return mesh;
    }

    // Rings sit at half-step latitudes so no ring degenerates to a pole point
    let rings = ((segments + 1) / 2).max(1) as usize;
    let slices = segments as usize;

    for ring in 0..rings {
        let phi = PI * (ring as f64 + 0.5) / rings as f64;
        let ring_r = r * phi.sin();
        let z = r * phi.cos();
        for p in circle_points(ring_r, segments) {
            let position = Point3::new(p.x, p.y, z);
            mesh.add_vertex(Vertex::new(position, position.coords / r));
        }
    }

    let at = |ring: usize, slice: usize| ring * slices + slice % slices;

    for ring in 0..rings.saturating_sub(1) {
        for slice in 0..slices {
            let a = at(ring, slice);
            let b = at(ring, slice + 1);
            let c = at(ring + 1, slice + 1);
            let d = at(ring + 1, slice);
            mesh.add_triangle(Triangle::new([a, d, c]));
            mesh.add_triangle(Triangle::new([a, c, b]));
        }
    }

    // Polar caps as fans over the first and last rings
    let last = rings - 1;
    for slice in 1..slices.saturating_sub(1) {
        mesh.add_triangle(Triangle::new([at(0, 0), at(0, slice), at(0, slice + 1)]));
        mesh.add_triangle(Triangle::new([at(last, 0), at(last, slice + 1), at(last, slice)]));
    }

    mesh
}

fn generate_cylinder_mesh(h: f64, r1: f64, r2: f64, center: bool, segments: u32) -> Mesh {
    let mut mesh = Mesh::new();
    if h <= 0.0 || (r1 <= 0.0 && r2 <= 0.0) {
        return mesh;
    }

    let (z1, z2) = if center { (-h / 2.0, h / 2.0) } else { (0.0, h) };
    let bottom_center = mesh.add_vertex(Vertex::new(Point3::new(0.0, 0.0, z1), -Vector3::z()));
    let top_center = mesh.add_vertex(Vertex::new(Point3::new(0.0, 0.0, z2), Vector3::z()));

    let bottom: Vec<usize> = circle_points(r1, segments)
        .into_iter()
        .map(|p| mesh.add_vertex(Vertex::new(Point3::new(p.x, p.y, z1), -Vector3::z())))
        .collect();
    let top: Vec<usize> = circle_points(r2, segments)
        .into_iter()
        .map(|p| mesh.add_vertex(Vertex::new(Point3::new(p.x, p.y, z2), Vector3::z())))
        .collect();

    let n = segments as usize;
    for i in 0..n {
        let next = (i + 1) % n;
        if r1 > 0.0 {
            mesh.add_triangle(Triangle::new([bottom_center, bottom[next], bottom[i]]));
        }
        if r2 > 0.0 {
            mesh.add_triangle(Triangle::new([top_center, top[i], top[next]]));
        }
        // Cones collapse one rim to a point; skip the zero-area side triangle
        if r1 > 0.0 {
            mesh.add_triangle(Triangle::new([bottom[i], bottom[next], top[i]]));
        }
        if r2 > 0.0 {
            mesh.add_triangle(Triangle::new([top[i], bottom[next], top[next]]));
        }
    }

    mesh.recompute_normals();
    mesh
}
