// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Approximate boolean operations on computed geometry
//!
//! Full CSG needs mesh intersection and clipping, which belongs to an exact
//! kernel. These operations work at the bounding-box level: union
//! concatenates, difference keeps the minuend, intersection keeps the first
//! operand when every operand's box overlaps and is empty otherwise.

use super::{BoundingBox, ExactSolid, Geometry, Mesh, Outline2d};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BooleanOp {
    Union,
    Difference,
    Intersection,
}

impl BooleanOp {
    /// Operator symbol used in term and chain dumps
    pub fn symbol(&self) -> char {
        match self {
            BooleanOp::Union => '+',
            BooleanOp::Difference => '-',
            BooleanOp::Intersection => '*',
        }
    }
}

impl fmt::Display for BooleanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BooleanOp::Union => "union",
            BooleanOp::Difference => "difference",
            BooleanOp::Intersection => "intersection",
        };
        f.write_str(name)
    }
}

/// Combine operands left to right.
///
/// The dimension of the first non-empty operand decides the result; operands
/// of the other dimension are ignored with a warning. `None` means every
/// operand was empty.
pub fn apply_boolean(op: BooleanOp, operands: &[Arc<Geometry>]) -> Option<Geometry> {
    let first = operands.iter().find(|g| !g.is_empty())?;
    let dimension = first.dimension();

    let mut kept: Vec<&Geometry> = Vec::with_capacity(operands.len());
    let mut dropped = 0;
    for operand in operands {
        if operand.is_empty() {
            // An empty minuend or intersection operand empties the result
            if kept.is_empty() && op == BooleanOp::Difference {
                return None;
            }
            if op == BooleanOp::Intersection {
                return None;
            }
            continue;
        }
        if operand.dimension() != dimension {
            dropped += 1;
            continue;
        }
        kept.push(operand);
    }
    if dropped > 0 {
        warn!(
            "Mixing 2D and 3D objects is not supported; ignoring {} operand(s) of {}",
            dropped, op
        );
    }

    match op {
        BooleanOp::Union => Some(concatenate(&kept, dimension)),
        BooleanOp::Difference => kept.first().map(|g| (*g).clone()),
        BooleanOp::Intersection => {
            let overlap = kept
                .iter()
                .skip(1)
                .fold(kept[0].bounding_box(), |acc: BoundingBox, g| {
                    acc.intersection(&g.bounding_box())
                });
            if overlap.is_empty() {
                None
            } else {
                Some(kept[0].clone())
            }
        }
    }
}

fn concatenate(operands: &[&Geometry], dimension: u8) -> Geometry {
    if dimension == 2 {
        let mut outline = Outline2d::new();
        for operand in operands {
            if let Some(o) = operand.as_outline() {
                outline.merge(o);
            }
        }
        return Geometry::Outline(outline);
    }

    let mut mesh = Mesh::new();
    let mut volumes = 0;
    let mut exact = false;
    for operand in operands {
        match operand {
            Geometry::Solid(solid) => {
                exact = true;
                volumes += solid.volumes;
                mesh.append(&solid.polyhedron);
            }
            Geometry::Mesh(m) => {
                volumes += 1;
                mesh.append(m);
            }
            Geometry::Outline(_) => {}
        }
    }
    if exact {
        Geometry::Solid(ExactSolid {
            polyhedron: mesh,
            volumes,
        })
    } else {
        Geometry::Mesh(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use nalgebra::{Matrix4, Vector2, Vector3};

    fn cube_at(x: f64) -> Arc<Geometry> {
        let mesh = Primitive::cube(Vector3::new(10.0, 10.0, 10.0), false).to_mesh();
        Arc::new(Geometry::Mesh(
            mesh.transformed(&Matrix4::new_translation(&Vector3::new(x, 0.0, 0.0))),
        ))
    }

    #[test]
    fn test_union_concatenates() {
        let result = apply_boolean(BooleanOp::Union, &[cube_at(0.0), cube_at(5.0)]).unwrap();
        assert_eq!(result.as_mesh().unwrap().triangle_count(), 24);
    }

    #[test]
    fn test_difference_keeps_minuend() {
        let result = apply_boolean(BooleanOp::Difference, &[cube_at(0.0), cube_at(5.0)]).unwrap();
        assert_eq!(result, *cube_at(0.0));
    }

    #[test]
    fn test_intersection_of_disjoint_boxes_is_empty() {
        assert!(apply_boolean(BooleanOp::Intersection, &[cube_at(0.0), cube_at(50.0)]).is_none());
        assert!(apply_boolean(BooleanOp::Intersection, &[cube_at(0.0), cube_at(5.0)]).is_some());
    }

    #[test]
    fn test_mixed_dimensions_drop_minority() {
        let square = Arc::new(Geometry::Outline(
            Primitive::square(Vector2::new(1.0, 1.0), false).to_outline(),
        ));
        let result = apply_boolean(BooleanOp::Union, &[cube_at(0.0), square]).unwrap();
        assert_eq!(result.dimension(), 3);
        assert_eq!(result.as_mesh().unwrap().triangle_count(), 12);
    }
}
