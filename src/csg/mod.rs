// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CSG terms: evaluation, normalization and flattening into render chains

mod chain;
mod evaluator;
mod normalizer;
mod term;

pub use chain::{ChainEntry, ColorMode, RenderChain};
pub use evaluator::{EvaluatedTerms, TermEvaluator};
pub use normalizer::{Normalized, TermNormalizer};
pub use term::{rebuild, CsgLeaf, CsgTerm, TermFlags, TermKind, TermRef};
