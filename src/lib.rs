// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Preview Pipeline
//!
//! Compiles OpenSCAD documents into render chains: parse, instantiate a
//! scene tree, evaluate it into CSG terms, normalize them within an element
//! budget and flatten them into the primary, highlight and background
//! chains a renderer draws. The [`pipeline::Coordinator`] supervises the
//! sequence, including auto-reload of changed files and the exact render
//! worker.

pub mod ast;
pub mod cache;
pub mod cli;
pub mod config;
pub mod csg;
pub mod dependencies;
pub mod error;
pub mod geometry;
pub mod io;
pub mod pipeline;
pub mod progress;
pub mod tree;

pub use cache::SharedCaches;
pub use config::PipelineConfig;
pub use csg::{ChainEntry, RenderChain};
pub use error::{ParseFailure, PipelineError, PipelineResult};
pub use geometry::{Geometry, Mesh, Primitive};
pub use io::{ScadParser, SourceParser};
pub use pipeline::{CompiledChains, Coordinator, Document};
pub use progress::CancelToken;
pub use tree::SceneTree;

use std::sync::Arc;

/// Compile source text with default settings and return its chains
pub fn preview(source: &str) -> PipelineResult<Arc<CompiledChains>> {
    let mut coordinator = Coordinator::new(PipelineConfig::default(), Arc::new(SharedCaches::default()));
    let mut document = Document::new(source);
    coordinator.preview(&mut document, &mut pipeline::NoEvents)
}
