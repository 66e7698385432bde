// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boolean terms
//!
//! Terms are immutable and shared: rewriting builds new nodes and reuses
//! untouched subtrees. A missing term (`None`) stands for the empty set; the
//! constructors below never produce an operation with an empty operand.

use crate::geometry::{BooleanOp, BoundingBox, Geometry};
use crate::tree::{NodeIndex, Rgba};
use nalgebra::Matrix4;
use std::fmt::Write as _;
use std::sync::Arc;

pub type TermRef = Arc<CsgTerm>;

/// Overlay routing of a term's entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermFlags {
    pub highlight: bool,
    pub background: bool,
}

impl TermFlags {
    pub const HIGHLIGHT: TermFlags = TermFlags {
        highlight: true,
        background: false,
    };
    pub const BACKGROUND: TermFlags = TermFlags {
        highlight: false,
        background: true,
    };

    pub fn union(self, other: TermFlags) -> TermFlags {
        TermFlags {
            highlight: self.highlight || other.highlight,
            background: self.background || other.background,
        }
    }
}

/// Computed geometry placed in the scene
#[derive(Debug, Clone)]
pub struct CsgLeaf {
    pub geometry: Arc<Geometry>,
    pub matrix: Matrix4<f64>,
    pub color: Option<Rgba>,
    pub label: String,
    pub index: NodeIndex,
}

#[derive(Debug, Clone)]
pub enum TermKind {
    Leaf(CsgLeaf),
    Op {
        op: BooleanOp,
        left: TermRef,
        right: TermRef,
    },
}

#[derive(Debug, Clone)]
pub struct CsgTerm {
    kind: TermKind,
    bbox: BoundingBox,
    leaves: usize,
    flags: TermFlags,
}

impl CsgTerm {
    /// Leaf term; `None` for empty geometry
    pub fn leaf(leaf: CsgLeaf) -> Option<TermRef> {
        if leaf.geometry.is_empty() {
            return None;
        }
        let bbox = leaf.geometry.bounding_box().transformed(&leaf.matrix);
        Some(Arc::new(CsgTerm {
            kind: TermKind::Leaf(leaf),
            bbox,
            leaves: 1,
            flags: TermFlags::default(),
        }))
    }

    /// Pruning constructor.
    ///
    /// Union drops an empty side; intersection of an empty side or disjoint
    /// boxes is empty; difference with an empty left is empty, and with an
    /// empty right or disjoint boxes is the left.
    pub fn combine(op: BooleanOp, left: Option<TermRef>, right: Option<TermRef>) -> Option<TermRef> {
        Self::combine_flagged(op, left, right, TermFlags::default())
    }

    pub fn combine_flagged(
        op: BooleanOp,
        left: Option<TermRef>,
        right: Option<TermRef>,
        flags: TermFlags,
    ) -> Option<TermRef> {
        let (left, right) = match (op, left, right) {
            (BooleanOp::Union, None, side) | (BooleanOp::Union, side, None) => return side,
            (BooleanOp::Intersection, None, _) | (BooleanOp::Intersection, _, None) => return None,
            (BooleanOp::Difference, None, _) => return None,
            (BooleanOp::Difference, left, None) => return left,
            (_, Some(left), Some(right)) => (left, right),
        };
        if !left.bbox.intersects(&right.bbox) {
            match op {
                BooleanOp::Intersection => return None,
                BooleanOp::Difference => return Some(left),
                BooleanOp::Union => {}
            }
        }
        Some(Self::op_node(op, left, right, flags))
    }

    fn op_node(op: BooleanOp, left: TermRef, right: TermRef, flags: TermFlags) -> TermRef {
        let bbox = match op {
            BooleanOp::Union => left.bbox.merge(&right.bbox),
            BooleanOp::Intersection => left.bbox.intersection(&right.bbox),
            BooleanOp::Difference => left.bbox,
        };
        let leaves = left.leaves + right.leaves;
        Arc::new(CsgTerm {
            kind: TermKind::Op { op, left, right },
            bbox,
            leaves,
            flags,
        })
    }

    /// Same term with overlay flags added
    pub fn with_flags(term: &TermRef, flags: TermFlags) -> TermRef {
        let mut copy = (**term).clone();
        copy.flags = copy.flags.union(flags);
        Arc::new(copy)
    }

    pub fn kind(&self) -> &TermKind {
        &self.kind
    }

    pub fn as_leaf(&self) -> Option<&CsgLeaf> {
        match &self.kind {
            TermKind::Leaf(leaf) => Some(leaf),
            TermKind::Op { .. } => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, TermKind::Leaf(_))
    }

    /// Operation, left and right operands of an operation term
    pub fn as_op(&self) -> Option<(BooleanOp, &TermRef, &TermRef)> {
        match &self.kind {
            TermKind::Op { op, left, right } => Some((*op, left, right)),
            TermKind::Leaf(_) => None,
        }
    }

    pub fn op(&self) -> Option<BooleanOp> {
        self.as_op().map(|(op, _, _)| op)
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Number of leaves, the element count the normalizer budgets
    pub fn leaf_count(&self) -> usize {
        self.leaves
    }

    pub fn flags(&self) -> TermFlags {
        self.flags
    }

    /// Infix dump, e.g. `(cube(...) - sphere(...))`
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.write_dump(&mut out);
        out
    }

    fn write_dump(&self, out: &mut String) {
        match &self.kind {
            TermKind::Leaf(leaf) => out.push_str(&leaf.label),
            TermKind::Op { op, left, right } => {
                out.push('(');
                left.write_dump(out);
                let _ = write!(out, " {} ", op.symbol());
                right.write_dump(out);
                out.push(')');
            }
        }
    }
}

/// Rebuild `node` over new operands, returning `node` itself when both
/// operands are unchanged
pub fn rebuild(node: &TermRef, left: Option<TermRef>, right: Option<TermRef>) -> Option<TermRef> {
    let Some((op, old_left, old_right)) = node.as_op() else {
        return Some(node.clone());
    };
    if let (Some(l), Some(r)) = (&left, &right) {
        if Arc::ptr_eq(l, old_left) && Arc::ptr_eq(r, old_right) {
            return Some(node.clone());
        }
    }
    CsgTerm::combine_flagged(op, left, right, node.flags())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::geometry::Primitive;
    use nalgebra::Vector3;

    /// Unit cube leaf translated to `(x, 0, 0)`
    pub fn cube_at(label: &str, x: f64) -> TermRef {
        let mesh = Primitive::cube(Vector3::new(1.0, 1.0, 1.0), false).to_mesh();
        CsgTerm::leaf(CsgLeaf {
            geometry: Arc::new(Geometry::Mesh(mesh)),
            matrix: Matrix4::new_translation(&Vector3::new(x, 0.0, 0.0)),
            color: None,
            label: label.to_string(),
            index: 0,
        })
        .expect("cube is not empty")
    }

    pub fn union(a: &TermRef, b: &TermRef) -> TermRef {
        CsgTerm::combine(BooleanOp::Union, Some(a.clone()), Some(b.clone())).expect("union")
    }

    pub fn difference(a: &TermRef, b: &TermRef) -> TermRef {
        CsgTerm::combine(BooleanOp::Difference, Some(a.clone()), Some(b.clone())).expect("difference")
    }

    pub fn intersection(a: &TermRef, b: &TermRef) -> TermRef {
        CsgTerm::combine(BooleanOp::Intersection, Some(a.clone()), Some(b.clone()))
            .expect("intersection")
    }
}
