// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry kernels
//!
//! The pipeline treats both kernels as opaque capabilities. The preview
//! kernel turns a single primitive into drawable geometry; the exact kernel
//! also transforms and combines results for the full render.

use super::{apply_boolean, BooleanOp, ExactSolid, Geometry, Primitive};
use crate::cache::TessellationCache;
use crate::error::PipelineResult;
use crate::progress::CancelToken;
use nalgebra::Matrix4;
use std::sync::Arc;

/// Produces preview geometry for primitive leaves
pub trait GeometryKernel: Send + Sync {
    fn name(&self) -> &str;

    fn primitive(&self, primitive: &Primitive, cancel: &CancelToken) -> PipelineResult<Geometry>;
}

/// Exact boolean-solid kernel used by the full render
pub trait SolidKernel: Send + Sync {
    fn name(&self) -> &str;

    fn primitive(&self, primitive: &Primitive, cancel: &CancelToken) -> PipelineResult<Geometry>;

    fn transform(&self, geometry: &Geometry, matrix: &Matrix4<f64>) -> PipelineResult<Geometry> {
        Ok(geometry.transformed(matrix))
    }

    /// Combine operands left to right; `None` when the result is empty
    fn combine(
        &self,
        op: BooleanOp,
        operands: &[Arc<Geometry>],
        cancel: &CancelToken,
    ) -> PipelineResult<Option<Geometry>>;
}

/// Preview kernel tessellating primitives into meshes and outlines
pub struct MeshKernel {
    tessellation: Arc<TessellationCache>,
}

impl MeshKernel {
    pub fn new(tessellation: Arc<TessellationCache>) -> Self {
        Self { tessellation }
    }

    pub fn tessellation(&self) -> &Arc<TessellationCache> {
        &self.tessellation
    }
}

impl Default for MeshKernel {
    fn default() -> Self {
        Self::new(Arc::new(TessellationCache::new()))
    }
}

impl GeometryKernel for MeshKernel {
    fn name(&self) -> &str {
        "mesh"
    }

    fn primitive(&self, primitive: &Primitive, cancel: &CancelToken) -> PipelineResult<Geometry> {
        cancel.check()?;
        Ok(match primitive.dimension() {
            2 => Geometry::Outline((*self.tessellation.outline(primitive)).clone()),
            _ => Geometry::Mesh((*self.tessellation.mesh(primitive)).clone()),
        })
    }
}

/// Reference exact kernel built on meshes.
///
/// Booleans are approximated at the bounding-box level (see
/// [`apply_boolean`]); a real solid kernel plugs in through [`SolidKernel`].
pub struct MeshSolidKernel {
    tessellation: Arc<TessellationCache>,
}

impl MeshSolidKernel {
    pub fn new(tessellation: Arc<TessellationCache>) -> Self {
        Self { tessellation }
    }
}

impl Default for MeshSolidKernel {
    fn default() -> Self {
        Self::new(Arc::new(TessellationCache::new()))
    }
}

impl SolidKernel for MeshSolidKernel {
    fn name(&self) -> &str {
        "mesh-solid"
    }

    fn primitive(&self, primitive: &Primitive, cancel: &CancelToken) -> PipelineResult<Geometry> {
        cancel.check()?;
        Ok(match primitive.dimension() {
            2 => Geometry::Outline((*self.tessellation.outline(primitive)).clone()),
            _ => Geometry::Solid(ExactSolid::new((*self.tessellation.mesh(primitive)).clone())),
        })
    }

    fn combine(
        &self,
        op: BooleanOp,
        operands: &[Arc<Geometry>],
        cancel: &CancelToken,
    ) -> PipelineResult<Option<Geometry>> {
        cancel.check()?;
        Ok(apply_boolean(op, operands))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use nalgebra::{Vector2, Vector3};

    #[test]
    fn test_mesh_kernel_routes_by_dimension() {
        let kernel = MeshKernel::default();
        let token = CancelToken::new();
        let cube = kernel
            .primitive(&Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false), &token)
            .unwrap();
        assert!(cube.as_mesh().is_some());
        let square = kernel
            .primitive(&Primitive::square(Vector2::new(1.0, 1.0), false), &token)
            .unwrap();
        assert!(square.as_outline().is_some());
    }

    #[test]
    fn test_kernels_honor_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let cube = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false);
        assert!(matches!(
            MeshKernel::default().primitive(&cube, &token),
            Err(PipelineError::Cancelled)
        ));
        assert!(matches!(
            MeshSolidKernel::default().combine(BooleanOp::Union, &[], &token),
            Err(PipelineError::Cancelled)
        ));
    }

    #[test]
    fn test_solid_kernel_wraps_exact_solids() {
        let kernel = MeshSolidKernel::default();
        let token = CancelToken::new();
        let cube = kernel
            .primitive(&Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false), &token)
            .unwrap();
        let moved = kernel
            .transform(&cube, &Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0)))
            .unwrap();
        let joined = kernel
            .combine(BooleanOp::Union, &[Arc::new(cube), Arc::new(moved)], &token)
            .unwrap()
            .unwrap();
        assert_eq!(joined.as_solid().unwrap().volumes, 2);
    }
}
