// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Per-primitive tessellation cache shared by the reference kernels

use super::AuxiliaryCache;
use crate::geometry::{Mesh, Outline2d, Primitive};
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe primitive tessellation cache
#[derive(Default)]
pub struct TessellationCache {
    meshes: DashMap<String, Arc<Mesh>>,
    outlines: DashMap<String, Arc<Outline2d>>,
}

impl TessellationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh(&self, primitive: &Primitive) -> Arc<Mesh> {
        self.meshes
            .entry(primitive.describe())
            .or_insert_with(|| Arc::new(primitive.to_mesh()))
            .clone()
    }

    pub fn outline(&self, primitive: &Primitive) -> Arc<Outline2d> {
        self.outlines
            .entry(primitive.describe())
            .or_insert_with(|| Arc::new(primitive.to_outline()))
            .clone()
    }
}

impl AuxiliaryCache for TessellationCache {
    fn name(&self) -> &str {
        "tessellation cache"
    }

    fn len(&self) -> usize {
        self.meshes.len() + self.outlines.len()
    }

    fn clear(&self) {
        self.meshes.clear();
        self.outlines.clear();
    }
}
