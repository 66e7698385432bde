// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry caches shared across compile generations and documents

mod lru;
mod tessellation;

pub use lru::{CacheStats, CacheWeight, GeometryCache};
pub use tessellation::TessellationCache;

use crate::config::PipelineConfig;
use crate::geometry::Geometry;
use log::{debug, info};
use std::sync::{Arc, PoisonError, RwLock};

/// Secondary caches that the flush command must also clear
pub trait AuxiliaryCache: Send + Sync {
    fn name(&self) -> &str;
    fn len(&self) -> usize;
    fn clear(&self);
}

/// Process-wide cache context.
///
/// Created once and handed to every coordinator as `Arc<SharedCaches>`; all
/// mutation goes through the caches' internal locks.
pub struct SharedCaches {
    preview: GeometryCache<Geometry>,
    exact: GeometryCache<Geometry>,
    auxiliary: RwLock<Vec<Arc<dyn AuxiliaryCache>>>,
}

impl SharedCaches {
    pub fn new(preview_bytes: usize, exact_bytes: usize) -> Self {
        Self {
            preview: GeometryCache::new("Geometry cache", preview_bytes),
            exact: GeometryCache::new("Exact cache", exact_bytes),
            auxiliary: RwLock::new(Vec::new()),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.preview_cache_bytes, config.exact_cache_bytes)
    }

    /// Cache for preview-kernel leaf geometry
    pub fn preview(&self) -> &GeometryCache<Geometry> {
        &self.preview
    }

    /// Cache for exact-kernel geometry, budgeted independently
    pub fn exact(&self) -> &GeometryCache<Geometry> {
        &self.exact
    }

    pub fn register_auxiliary(&self, cache: Arc<dyn AuxiliaryCache>) {
        let mut auxiliary = self.auxiliary.write().unwrap_or_else(PoisonError::into_inner);
        if !auxiliary.iter().any(|c| Arc::ptr_eq(c, &cache)) {
            auxiliary.push(cache);
        }
    }

    pub fn apply_config(&self, config: &PipelineConfig) {
        self.preview.set_max_size(config.preview_cache_bytes);
        self.exact.set_max_size(config.exact_cache_bytes);
    }

    /// Clear every cache unconditionally
    pub fn flush(&self) {
        self.preview.clear();
        self.exact.clear();
        let auxiliary = self.auxiliary.read().unwrap_or_else(PoisonError::into_inner);
        for cache in auxiliary.iter() {
            debug!("Flushing {} ({} entries)", cache.name(), cache.len());
            cache.clear();
        }
        info!("Caches flushed");
    }

    pub fn stats(&self) -> Vec<CacheStats> {
        vec![self.preview.stats(), self.exact.stats()]
    }

    pub fn log_stats(&self) {
        for stats in self.stats() {
            debug!("{}", stats);
        }
    }
}

impl Default for SharedCaches {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
