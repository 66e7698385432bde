// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Reentrant compile lock

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts outstanding holders of the pipeline.
///
/// Each [`acquire`](CompileLock::acquire) hands out a guard; the lock is held
/// while any guard is alive. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct CompileLock {
    holders: Arc<AtomicUsize>,
}

impl CompileLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> CompileGuard {
        self.holders.fetch_add(1, Ordering::SeqCst);
        CompileGuard {
            holders: self.holders.clone(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.depth() > 0
    }

    pub fn depth(&self) -> usize {
        self.holders.load(Ordering::SeqCst)
    }
}

/// Releases its hold on drop
#[derive(Debug)]
pub struct CompileGuard {
    holders: Arc<AtomicUsize>,
}

impl Drop for CompileGuard {
    fn drop(&mut self) {
        self.holders.fetch_sub(1, Ordering::SeqCst);
    }
}
