// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Parsed document

use super::node::{Assignment, Body};
use crate::dependencies::{snapshot, Fingerprint, FingerprintSet};
use std::path::{Path, PathBuf};

/// Immutable result of parsing one document plus its includes
#[derive(Debug, Clone)]
pub struct Module {
    body: Body,
    base_path: PathBuf,
    dependencies: Vec<PathBuf>,
    fingerprints: FingerprintSet,
}

impl Module {
    /// Build a module, snapshotting the fingerprints of `dependencies`
    pub fn new(body: Body, base_path: impl Into<PathBuf>, mut dependencies: Vec<PathBuf>) -> Self {
        dependencies.sort();
        dependencies.dedup();
        let fingerprints = snapshot(&dependencies);
        Self {
            body,
            base_path: base_path.into(),
            dependencies,
            fingerprints,
        }
    }

    /// Append top-level assignments after the document's own, so they win
    pub fn with_overrides(mut self, overrides: &[Assignment]) -> Self {
        self.body.assignments.extend_from_slice(overrides);
        self
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Every file referenced through `include` or `use`, found or not
    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// True when any referenced file changed since the module was parsed
    pub fn includes_changed(&self) -> bool {
        self.fingerprints
            .iter()
            .any(|(path, recorded)| Fingerprint::of(path) != *recorded)
    }

    /// Source-like dump of the parsed statements
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.body.write_to(&mut out, 0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;
    use std::fs;

    #[test]
    fn test_includes_changed_tracks_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let lib = dir.path().join("lib.scad");
        fs::write(&lib, "module a() {}")?;

        let module = Module::new(Body::default(), dir.path(), vec![lib.clone(), lib.clone()]);
        assert!(module.has_dependencies());
        assert_eq!(module.dependencies().len(), 1);
        assert!(!module.includes_changed());

        fs::write(&lib, "module a() { cube(1); }")?;
        assert!(module.includes_changed());
        Ok(())
    }

    #[test]
    fn test_overrides_follow_document_assignments() {
        let mut body = Body::default();
        body.assignments.push(Assignment {
            name: "size".into(),
            value: Expr::Number(1.0),
        });
        let overrides = [Assignment {
            name: "size".into(),
            value: Expr::Number(5.0),
        }];
        let module = Module::new(body, ".", Vec::new()).with_overrides(&overrides);
        assert_eq!(module.dump(), "size = 1;\nsize = 5;\n");
    }

    #[test]
    fn test_module_without_dependencies() {
        let module = Module::new(Body::default(), ".", Vec::new());
        assert!(!module.has_dependencies());
        assert!(!module.includes_changed());
        assert_eq!(module.dump(), "");
    }
}
