// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene tree to boolean terms

use super::term::{CsgLeaf, CsgTerm, TermFlags, TermRef};
use crate::cache::GeometryCache;
use crate::error::PipelineResult;
use crate::geometry::{BooleanOp, Geometry, GeometryKernel};
use crate::progress::{CancelToken, ProgressSink, ProgressTracker};
use crate::tree::{NodeIndex, NodeKind, Rgba, SceneTree};
use nalgebra::Matrix4;

/// Primary term plus the routed-out overlay terms of one evaluation
#[derive(Debug, Clone, Default)]
pub struct EvaluatedTerms {
    pub primary: Option<TermRef>,
    pub highlights: Vec<TermRef>,
    pub backgrounds: Vec<TermRef>,
}

/// Walks the effective root of a tree, resolving leaf geometry through the
/// preview cache.
pub struct TermEvaluator<'a> {
    tree: &'a SceneTree,
    kernel: &'a dyn GeometryKernel,
    cache: &'a GeometryCache<Geometry>,
    cancel: &'a CancelToken,
}

impl<'a> TermEvaluator<'a> {
    pub fn new(
        tree: &'a SceneTree,
        kernel: &'a dyn GeometryKernel,
        cache: &'a GeometryCache<Geometry>,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            tree,
            kernel,
            cache,
            cancel,
        }
    }

    /// Evaluate the tree, reporting leaf progress to `sink`.
    ///
    /// Returns `Err(Cancelled)` as soon as the token is seen at a leaf;
    /// geometry cached up to that point stays cached.
    pub fn evaluate(&self, sink: &mut dyn ProgressSink) -> PipelineResult<EvaluatedTerms> {
        let root = self.tree.root();
        let mut walk = Walk {
            evaluator: self,
            progress: ProgressTracker::new(self.tree.total_index_count(), sink),
            origin: root,
            terms: EvaluatedTerms::default(),
        };
        let primary = walk.node(root, &Matrix4::identity(), None)?;
        walk.progress.finish();
        let mut terms = walk.terms;
        terms.primary = primary;
        Ok(terms)
    }
}

struct Walk<'e, 'a, 's> {
    evaluator: &'e TermEvaluator<'a>,
    progress: ProgressTracker<'s>,
    origin: NodeIndex,
    terms: EvaluatedTerms,
}

impl Walk<'_, '_, '_> {
    fn node(
        &mut self,
        index: NodeIndex,
        matrix: &Matrix4<f64>,
        color: Option<Rgba>,
    ) -> PipelineResult<Option<TermRef>> {
        let tree = self.evaluator.tree;
        let node = tree.node(index);
        if node.modifiers.disabled {
            self.progress.mark(node.subtree_end - self.origin);
            return Ok(None);
        }

        let term = match &node.kind {
            NodeKind::Primitive(primitive) => {
                self.evaluator.cancel.check()?;
                let key = tree.key(index);
                let geometry = self.evaluator.cache.get_or_compute(key, || {
                    self.evaluator.kernel.primitive(primitive, self.evaluator.cancel)
                })?;
                self.progress.mark(index + 1 - self.origin);
                CsgTerm::leaf(CsgLeaf {
                    geometry,
                    matrix: *matrix,
                    color,
                    label: key.trim_end_matches(';').to_string(),
                    index,
                })
            }
            NodeKind::Transform(m) => self.children(index, BooleanOp::Union, &(matrix * m), color)?,
            NodeKind::Color(c) => self.children(index, BooleanOp::Union, matrix, Some(*c))?,
            kind => self.children(index, kind.combine_op(), matrix, color)?,
        };

        if node.modifiers.background || node.modifiers.highlight {
            if let Some(term) = term {
                if node.modifiers.background {
                    self.terms
                        .backgrounds
                        .push(CsgTerm::with_flags(&term, TermFlags::BACKGROUND));
                } else {
                    self.terms
                        .highlights
                        .push(CsgTerm::with_flags(&term, TermFlags::HIGHLIGHT));
                }
            }
            return Ok(None);
        }
        Ok(term)
    }

    /// Combine child terms left to right; the first non-empty child is the
    /// left operand
    fn children(
        &mut self,
        index: NodeIndex,
        op: BooleanOp,
        matrix: &Matrix4<f64>,
        color: Option<Rgba>,
    ) -> PipelineResult<Option<TermRef>> {
        let tree = self.evaluator.tree;
        let children = &tree.node(index).children;
        let mut result: Option<TermRef> = None;
        for (position, &child) in children.iter().enumerate() {
            let Some(term) = self.node(child, matrix, color)? else {
                continue;
            };
            result = match result {
                None => Some(term),
                Some(acc) => CsgTerm::combine(op, Some(acc), Some(term)),
            };
            // an empty intersection or minuend stays empty; the remaining
            // siblings are only searched for overlays
            if result.is_none() && op != BooleanOp::Union {
                for &rest in &children[position + 1..] {
                    self.overlays(rest, matrix, color)?;
                }
                return Ok(None);
            }
        }
        Ok(result)
    }

    /// Route the background and highlight subtrees below `index` without
    /// evaluating anything else
    fn overlays(
        &mut self,
        index: NodeIndex,
        matrix: &Matrix4<f64>,
        color: Option<Rgba>,
    ) -> PipelineResult<()> {
        let tree = self.evaluator.tree;
        let node = tree.node(index);
        if node.modifiers.background || node.modifiers.highlight {
            self.node(index, matrix, color)?;
            return Ok(());
        }
        let (matrix, color) = match &node.kind {
            _ if node.modifiers.disabled => {
                self.progress.mark(node.subtree_end - self.origin);
                return Ok(());
            }
            NodeKind::Primitive(_) => {
                self.progress.mark(index + 1 - self.origin);
                return Ok(());
            }
            NodeKind::Transform(m) => (matrix * m, color),
            NodeKind::Color(c) => (*matrix, Some(*c)),
            _ => (*matrix, color),
        };
        for &child in &node.children {
            self.overlays(child, &matrix, color)?;
        }
        Ok(())
    }
}
