// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! I/O module - parsing and importing documents

mod importer;
mod parser;

pub use importer::{document_dir, import_scad_file, read_document};
pub use parser::{parse_definition, parse_expression, ScadParser, SourceParser};
