// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Weight-bounded least-recently-used geometry cache

use ahash::AHashMap;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cost of keeping a value in a cache
pub trait CacheWeight {
    fn cache_weight(&self) -> usize;
}

impl CacheWeight for crate::geometry::Geometry {
    fn cache_weight(&self) -> usize {
        self.memory_size()
    }
}

struct Entry<V> {
    value: Arc<V>,
    weight: usize,
    stamp: u64,
}

struct LruState<V> {
    entries: AHashMap<String, Entry<V>>,
    /// Access stamp -> key, oldest first
    order: BTreeMap<u64, String>,
    total: usize,
    max: usize,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> LruState<V> {
    fn touch(&mut self, key: &str) -> Option<Arc<V>> {
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(key)?;
        let old = std::mem::replace(&mut entry.stamp, clock);
        let value = entry.value.clone();
        if let Some(k) = self.order.remove(&old) {
            self.order.insert(clock, k);
        }
        Some(value)
    }

    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.stamp);
        self.total -= entry.weight;
        Some(entry)
    }

    fn evict_to_budget(&mut self, name: &str) {
        while self.total > self.max {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.total -= entry.weight;
                self.evictions += 1;
                debug!("{}: evicted entry of weight {}", name, entry.weight);
            }
        }
    }
}

/// Bounded memoization store keyed by node identity.
///
/// Values are shared (`Arc`) so hits never copy geometry. Computation runs
/// outside the lock, which lets a compute function consult the cache again
/// for sub-results.
pub struct GeometryCache<V> {
    name: &'static str,
    state: Mutex<LruState<V>>,
}

impl<V: CacheWeight> GeometryCache<V> {
    pub fn new(name: &'static str, max_weight: usize) -> Self {
        Self {
            name,
            state: Mutex::new(LruState {
                entries: AHashMap::new(),
                order: BTreeMap::new(),
                total: 0,
                max: max_weight,
                clock: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up and mark as most recently used
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        self.lock().touch(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Store a value, evicting least-recently-used entries past the budget.
    ///
    /// A value heavier than the whole budget is returned but not kept.
    pub fn insert(&self, key: impl Into<String>, value: V) -> Arc<V> {
        let key = key.into();
        let weight = value.cache_weight();
        let value = Arc::new(value);

        let mut state = self.lock();
        state.remove(&key);
        if weight > state.max {
            debug!(
                "{}: not caching entry of weight {} (budget {})",
                self.name, weight, state.max
            );
            return value;
        }
        state.clock += 1;
        let stamp = state.clock;
        state.order.insert(stamp, key.clone());
        state.entries.insert(
            key,
            Entry {
                value: value.clone(),
                weight,
                stamp,
            },
        );
        state.total += weight;
        state.evict_to_budget(self.name);
        value
    }

    /// Return the cached value, or compute, store and return it.
    ///
    /// `compute` is not invoked on a hit.
    pub fn get_or_compute<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        {
            let mut state = self.lock();
            if let Some(value) = state.touch(key) {
                state.hits += 1;
                return Ok(value);
            }
            state.misses += 1;
        }
        let value = compute()?;
        Ok(self.insert(key, value))
    }

    pub fn set_max_size(&self, max_weight: usize) {
        let mut state = self.lock();
        state.max = max_weight;
        state.evict_to_budget(self.name);
    }

    pub fn max_size(&self) -> usize {
        self.lock().max
    }

    pub fn total_weight(&self) -> usize {
        self.lock().total
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        state.total = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            name: self.name,
            entries: state.entries.len(),
            weight: state.total,
            max_weight: state.max,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub name: &'static str,
    pub entries: usize,
    pub weight: usize,
    pub max_weight: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f32 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            (self.hits as f32 / lookups as f32) * 100.0
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} entries, {} / {} bytes, hit rate {:.1}%",
            self.name,
            self.entries,
            self.weight,
            self.max_weight,
            self.hit_rate()
        )
    }
}
