// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! File fingerprints and external change detection

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Modification time plus size; equality means "unchanged"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub modified_nanos: u128,
    pub len: u64,
}

impl Fingerprint {
    /// Fingerprint of a file, `None` if it cannot be stat'ed
    pub fn of(path: &Path) -> Option<Fingerprint> {
        let metadata = std::fs::metadata(path).ok()?;
        let modified_nanos = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Some(Fingerprint {
            modified_nanos,
            len: metadata.len(),
        })
    }

    pub fn modified(&self) -> SystemTime {
        let secs = (self.modified_nanos / 1_000_000_000) as u64;
        let nanos = (self.modified_nanos % 1_000_000_000) as u32;
        UNIX_EPOCH + std::time::Duration::new(secs, nanos)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}.{:x}", self.modified_nanos, self.len)
    }
}

/// Snapshot of fingerprints for a set of paths; missing files map to `None`
pub type FingerprintSet = AHashMap<PathBuf, Option<Fingerprint>>;

pub fn snapshot<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> FingerprintSet {
    paths
        .into_iter()
        .map(|path| (path.clone(), Fingerprint::of(path)))
        .collect()
}

/// Records the last seen fingerprints of the top-level file and its
/// dependencies, and reports which of them changed since.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    top_level: Option<PathBuf>,
    top_level_id: Option<Fingerprint>,
    dependencies: FingerprintSet,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new top-level file; the next check reports it as changed
    pub fn set_top_level(&mut self, path: Option<PathBuf>) {
        self.top_level = path;
        self.top_level_id = None;
    }

    pub fn top_level(&self) -> Option<&Path> {
        self.top_level.as_deref()
    }

    pub fn top_level_fingerprint(&self) -> Option<Fingerprint> {
        self.top_level_id
    }

    /// True when the top-level file exists and its fingerprint differs from
    /// the recorded one; the new fingerprint is recorded.
    ///
    /// A missing file is not a change: the editor text stays authoritative.
    pub fn top_level_changed(&mut self) -> bool {
        let Some(path) = &self.top_level else {
            return false;
        };
        let Some(current) = Fingerprint::of(path) else {
            return false;
        };
        if self.top_level_id != Some(current) {
            self.top_level_id = Some(current);
            return true;
        }
        false
    }

    /// Replace the tracked dependency set, recording current fingerprints
    pub fn track(&mut self, paths: &[PathBuf]) {
        self.dependencies = snapshot(paths);
    }

    /// Re-resolve every tracked dependency; returns the paths whose
    /// fingerprint changed (appeared, vanished or was modified)
    pub fn refresh(&mut self) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        for (path, recorded) in self.dependencies.iter_mut() {
            let current = Fingerprint::of(path);
            if current != *recorded {
                *recorded = current;
                changed.push(path.clone());
            }
        }
        changed.sort();
        changed
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &PathBuf> {
        self.dependencies.keys()
    }

    pub fn recorded(&self, path: &Path) -> Option<Fingerprint> {
        self.dependencies.get(path).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_top_level_change_detection() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("main.scad");
        fs::write(&path, "cube(1);")?;

        let mut tracker = DependencyTracker::new();
        tracker.set_top_level(Some(path.clone()));
        assert!(tracker.top_level_changed());
        assert!(!tracker.top_level_changed());

        // size change is visible even within the same mtime tick
        fs::write(&path, "cube(10);")?;
        assert!(tracker.top_level_changed());
        assert!(!tracker.top_level_changed());
        Ok(())
    }

    #[test]
    fn test_missing_top_level_is_not_a_change() {
        let mut tracker = DependencyTracker::new();
        tracker.set_top_level(Some(PathBuf::from("/nonexistent/polyframe/main.scad")));
        assert!(!tracker.top_level_changed());
    }

    #[test]
    fn test_dependency_refresh_reports_changes_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let lib = dir.path().join("lib.scad");
        let missing = dir.path().join("later.scad");
        fs::write(&lib, "module a() {}")?;

        let mut tracker = DependencyTracker::new();
        tracker.track(&[lib.clone(), missing.clone()]);
        assert!(tracker.refresh().is_empty());

        fs::write(&lib, "module a() { cube(1); }")?;
        fs::write(&missing, "x = 1;")?;
        assert_eq!(tracker.refresh(), {
            let mut expected = vec![lib.clone(), missing.clone()];
            expected.sort();
            expected
        });
        assert!(tracker.refresh().is_empty());
        assert!(tracker.recorded(&lib).is_some());
        Ok(())
    }
}
