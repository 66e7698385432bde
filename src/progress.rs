// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Cooperative cancellation and progress accounting

use crate::error::{PipelineError, PipelineResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag checked at every leaf and stage boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arm the token for the next compile
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Checkpoint: `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> PipelineResult<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Receives progress in permille (0..=1000)
pub trait ProgressSink {
    fn report(&mut self, permille: u32);
}

impl<F: FnMut(u32)> ProgressSink for F {
    fn report(&mut self, permille: u32) {
        self(permille)
    }
}

/// Sink that discards all reports
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _permille: u32) {}
}

/// Converts node marks into monotonically non-decreasing permille reports.
///
/// Values stay below 1000 while work is running; `finish` reports 1000.
pub struct ProgressTracker<'a> {
    total: usize,
    last: Option<u32>,
    sink: &'a mut dyn ProgressSink,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(total: usize, sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            total: total.max(1),
            last: None,
            sink,
        }
    }

    /// Report that `mark` of `total` units are done
    pub fn mark(&mut self, mark: usize) {
        let permille = ((mark as f64 * 1000.0) / self.total as f64) as u32;
        let permille = permille.min(999);
        if self.last.map_or(true, |last| permille > last) {
            self.last = Some(permille);
            self.sink.report(permille);
        }
    }

    pub fn finish(&mut self) {
        if self.last != Some(1000) {
            self.last = Some(1000);
            self.sink.report(1000);
        }
    }

    pub fn last_reported(&self) -> Option<u32> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(matches!(token.check(), Err(PipelineError::Cancelled)));
        token.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let mut seen = Vec::new();
        let mut sink = |p: u32| seen.push(p);
        {
            let mut tracker = ProgressTracker::new(4, &mut sink);
            tracker.mark(2);
            tracker.mark(1);
            tracker.mark(4);
            tracker.finish();
        }
        assert_eq!(seen, vec![500, 999, 1000]);
    }
}
