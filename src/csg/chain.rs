// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Render chains
//!
//! A chain is the flattened, draw-ordered form of a normalized term. Entry
//! order is significant: later entries composite over earlier ones, so
//! chains are only ever appended to in depth-first order.

use super::term::{TermFlags, TermKind, TermRef};
use crate::geometry::{BooleanOp, BoundingBox, Geometry};
use crate::tree::{NodeIndex, Rgba};
use nalgebra::Matrix4;
use serde::Serialize;
use std::sync::Arc;

/// How a renderer colors an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColorMode {
    Material,
    Highlight,
    Background,
}

impl From<TermFlags> for ColorMode {
    fn from(flags: TermFlags) -> Self {
        if flags.highlight {
            ColorMode::Highlight
        } else if flags.background {
            ColorMode::Background
        } else {
            ColorMode::Material
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub geometry: Arc<Geometry>,
    pub matrix: Matrix4<f64>,
    pub color: Option<Rgba>,
    pub mode: ColorMode,
    /// How this entry combines with the product it belongs to
    pub op: BooleanOp,
    pub label: String,
    pub bbox: BoundingBox,
    pub index: NodeIndex,
}

#[derive(Debug, Clone, Default)]
pub struct RenderChain {
    entries: Vec<ChainEntry>,
}

impl RenderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain for one normalized term; empty for the empty set
    pub fn from_term(term: Option<&TermRef>) -> Self {
        let mut chain = Self::new();
        if let Some(term) = term {
            chain.import(term, BooleanOp::Union, TermFlags::default());
        }
        chain
    }

    /// Append a term's leaves depth-first.
    ///
    /// A left operand inherits the incoming opcode, a right operand takes
    /// the operation's own opcode.
    pub fn import(&mut self, term: &TermRef, op: BooleanOp, flags: TermFlags) {
        let flags = flags.union(term.flags());
        match term.kind() {
            TermKind::Leaf(leaf) => self.entries.push(ChainEntry {
                geometry: leaf.geometry.clone(),
                matrix: leaf.matrix,
                color: leaf.color,
                mode: ColorMode::from(flags),
                op,
                label: leaf.label.clone(),
                bbox: *term.bounding_box(),
                index: leaf.index,
            }),
            TermKind::Op {
                op: own,
                left,
                right,
            } => {
                self.import(left, op, flags);
                self.import(right, *own, flags);
            }
        }
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs of entries each starting at a union entry
    pub fn products(&self) -> Vec<&[ChainEntry]> {
        let mut products = Vec::new();
        let mut start = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.op == BooleanOp::Union && i > start {
                products.push(&self.entries[start..i]);
                start = i;
            }
        }
        if start < self.entries.len() {
            products.push(&self.entries[start..]);
        }
        products
    }

    /// Box of everything a product can cover: its positive entry clipped by
    /// its intersections
    pub fn bounding_box(&self) -> BoundingBox {
        self.products()
            .into_iter()
            .map(|product| {
                product
                    .iter()
                    .skip(1)
                    .filter(|e| e.op == BooleanOp::Intersection)
                    .fold(product[0].bbox, |bbox, e| bbox.intersection(&e.bbox))
            })
            .fold(BoundingBox::empty(), |acc, bbox| acc.merge(&bbox))
    }

    /// One product per line: `+first -subtracted *intersected`
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate() {
            match entry.op {
                BooleanOp::Union => {
                    if i != 0 {
                        out.push('\n');
                    }
                    out.push('+');
                }
                BooleanOp::Difference => out.push_str(" -"),
                BooleanOp::Intersection => out.push_str(" *"),
            }
            out.push_str(&entry.label);
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csg::term::test_support::*;
    use crate::csg::term::CsgTerm;

    fn labels(chain: &RenderChain) -> Vec<(&str, BooleanOp)> {
        chain.entries().iter().map(|e| (e.label.as_str(), e.op)).collect()
    }

    #[test]
    fn test_import_follows_left_inherits_right_takes_own() {
        let (a, b, c) = (cube_at("a", 0.0), cube_at("b", 0.2), cube_at("c", 0.4));
        // ((a - b) * c)
        let term = intersection(&difference(&a, &b), &c);
        let chain = RenderChain::from_term(Some(&term));
        assert_eq!(
            labels(&chain),
            vec![
                ("a", BooleanOp::Union),
                ("b", BooleanOp::Difference),
                ("c", BooleanOp::Intersection)
            ]
        );
        assert_eq!(chain.dump(), "+a -b *c\n");
    }

    #[test]
    fn test_products_split_at_unions() {
        let (a, b, c, d) = (cube_at("a", 0.0), cube_at("b", 0.2), cube_at("c", 3.0), cube_at("d", 3.2));
        let term = union(&difference(&a, &b), &intersection(&c, &d));
        let chain = RenderChain::from_term(Some(&term));
        let products = chain.products();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].len(), 2);
        assert_eq!(chain.dump(), "+a -b\n+c *d\n");

        let bbox = chain.bounding_box();
        assert_eq!(bbox.min.x, 0.0);
        assert_eq!(bbox.max.x, 4.0);
    }

    #[test]
    fn test_flags_become_color_modes() {
        let term = CsgTerm::with_flags(&union(&cube_at("a", 0.0), &cube_at("b", 2.0)), TermFlags::BACKGROUND);
        let chain = RenderChain::from_term(Some(&term));
        assert!(chain.entries().iter().all(|e| e.mode == ColorMode::Background));
    }

    #[test]
    fn test_empty_term_gives_empty_chain() {
        let chain = RenderChain::from_term(None);
        assert!(chain.is_empty());
        assert!(chain.products().is_empty());
        assert!(chain.bounding_box().is_empty());
    }
}
