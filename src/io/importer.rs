// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! SCAD file importer

use super::SourceParser;
use crate::ast::Module;
use crate::error::{PipelineError, PipelineResult};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read a document's text
pub fn read_document(path: &Path) -> PipelineResult<String> {
    fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Directory that relative `include`/`use` paths of `path` resolve against
pub fn document_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Import a .scad file and parse it into a module
pub fn import_scad_file(path: &Path, parser: &dyn SourceParser) -> Result<Module> {
    let source = read_document(path)
        .with_context(|| format!("Failed to read SCAD file: {}", path.display()))?;

    parser
        .parse(&source, document_dir(path))
        .with_context(|| format!("Failed to parse SCAD file: {}", path.display()))
}
