// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Budgeted term normalization
//!
//! Rewrites a term toward a union of products (intersections and
//! differences of leaves) with the nine Goldfeather rules:
//!
//! ```text
//! x - (y + z) -> (x - y) - z          (x + y) - z -> (x - z) + (y - z)
//! x * (y + z) -> (x * y) + (x * z)    (x + y) * z -> (x * z) + (y * z)
//! x - (y * z) -> (x - y) + (x - z)    (x - y) * z -> (x * z) - y
//! x * (y * z) -> (x * y) * z
//! x - (y - z) -> (x - y) + (x * z)
//! x * (y - z) -> (x * y) - z
//! ```
//!
//! Passes repeat until one leaves the term unchanged.

use super::term::{rebuild, CsgTerm, TermRef};
use crate::error::PipelineResult;
use crate::geometry::BooleanOp;
use crate::progress::CancelToken;
use log::{debug, warn};
use std::sync::Arc;

/// Normalizer output
#[derive(Debug, Clone)]
pub struct Normalized {
    /// `None` when the term normalized to the empty set
    pub term: Option<TermRef>,
    /// Set when the budget stopped normalization; `term` is then the last
    /// complete pass
    pub aborted: bool,
    pub passes: usize,
}

impl Normalized {
    pub fn leaf_count(&self) -> usize {
        self.term.as_ref().map_or(0, |t| t.leaf_count())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TermNormalizer {
    budget: usize,
}

impl TermNormalizer {
    /// `budget` is the maximum leaf count a rewrite may grow the term to
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn normalize(&self, term: &TermRef, cancel: &CancelToken) -> PipelineResult<Normalized> {
        let mut current = term.clone();
        let mut passes = 0;
        loop {
            cancel.check()?;
            let mut pass = Pass {
                budget: self.budget,
                elements: current.leaf_count(),
                aborted: false,
            };
            let output = pass.run(current.clone());
            passes += 1;

            if pass.aborted {
                warn!(
                    "Normalized tree is growing past {} elements. Aborting normalization.",
                    self.budget
                );
                return Ok(Normalized {
                    term: Some(current),
                    aborted: true,
                    passes,
                });
            }
            match output {
                None => {
                    return Ok(Normalized {
                        term: None,
                        aborted: false,
                        passes,
                    })
                }
                Some(next) if Arc::ptr_eq(&next, &current) => break,
                Some(next) => current = next,
            }
        }
        debug!(
            "Normalized term to {} elements in {} passes",
            current.leaf_count(),
            passes
        );
        Ok(Normalized {
            term: Some(current),
            aborted: false,
            passes,
        })
    }
}

/// One top-down rewrite pass
struct Pass {
    budget: usize,
    elements: usize,
    aborted: bool,
}

impl Pass {
    fn run(&mut self, node: TermRef) -> Option<TermRef> {
        if self.aborted || node.is_leaf() {
            return Some(node);
        }
        let mut node = node;
        // walk the left spine while the node is not yet a product of leaves
        loop {
            node = self.rewrite_at(node)?;
            if self.aborted {
                return Some(node);
            }
            let Some((_, left, right)) = node.as_op() else {
                return Some(node);
            };
            let (left, right) = (left.clone(), right.clone());
            let new_left = self.run(left);
            if self.aborted {
                return Some(node);
            }
            node = rebuild(&node, new_left, Some(right))?;
            let Some((op, left, right)) = node.as_op() else {
                return Some(node);
            };
            let again = op != BooleanOp::Union
                && (!right.is_leaf() || left.op() == Some(BooleanOp::Union));
            if !again {
                break;
            }
        }
        let Some((_, left, right)) = node.as_op() else {
            return Some(node);
        };
        let (left, right) = (left.clone(), right.clone());
        let new_right = self.run(right);
        if self.aborted {
            return Some(node);
        }
        rebuild(&node, Some(left), new_right)
    }

    /// Apply rules at `node` until none matches
    fn rewrite_at(&mut self, mut node: TermRef) -> Option<TermRef> {
        while let Some(replacement) = rewrite(&node) {
            let grown = self.elements + replacement.as_ref().map_or(0, |t| t.leaf_count());
            let next = grown.saturating_sub(node.leaf_count());
            if next > self.budget {
                self.aborted = true;
                return Some(node);
            }
            self.elements = next;
            node = replacement?;
        }
        Some(node)
    }
}

/// Result of the first matching rule, `None` when no rule applies
fn rewrite(node: &TermRef) -> Option<Option<TermRef>> {
    use BooleanOp::{Difference, Intersection, Union};

    let (op, left, right) = node.as_op()?;
    let flags = node.flags();
    let c = |op, l: Option<TermRef>, r: Option<TermRef>| CsgTerm::combine_flagged(op, l, r, flags);

    if let Some((right_op, y, z)) = right.as_op() {
        let (x, y, z) = (Some(left.clone()), Some(y.clone()), Some(z.clone()));
        match (op, right_op) {
            (Difference, Union) => return Some(c(Difference, c(Difference, x, y), z)),
            (Intersection, Union) => {
                return Some(c(Union, c(Intersection, x.clone(), y), c(Intersection, x, z)))
            }
            (Difference, Intersection) => {
                return Some(c(Union, c(Difference, x.clone(), y), c(Difference, x, z)))
            }
            (Intersection, Intersection) => return Some(c(Intersection, c(Intersection, x, y), z)),
            (Difference, Difference) => {
                return Some(c(Union, c(Difference, x.clone(), y), c(Intersection, x, z)))
            }
            (Intersection, Difference) => return Some(c(Difference, c(Intersection, x, y), z)),
            (Union, _) => {}
        }
    }

    if let Some((left_op, x, y)) = left.as_op() {
        let (x, y, z) = (Some(x.clone()), Some(y.clone()), Some(right.clone()));
        match (op, left_op) {
            (Intersection, Difference) => return Some(c(Difference, c(Intersection, x, z), y)),
            (Difference, Union) => {
                return Some(c(Union, c(Difference, x, z.clone()), c(Difference, y, z)))
            }
            (Intersection, Union) => {
                return Some(c(Union, c(Intersection, x, z.clone()), c(Intersection, y, z)))
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csg::term::test_support::*;
    use crate::error::PipelineError;

    fn normalize(term: &TermRef, budget: usize) -> Normalized {
        TermNormalizer::new(budget)
            .normalize(term, &CancelToken::new())
            .unwrap()
    }

    #[test]
    fn test_difference_of_union() {
        let (a, b, c) = (cube_at("a", 0.0), cube_at("b", 0.2), cube_at("c", 0.4));
        let n = normalize(&difference(&a, &union(&b, &c)), 100);
        assert_eq!(n.term.unwrap().dump(), "((a - b) - c)");
        assert!(!n.aborted);
    }

    #[test]
    fn test_intersection_distributes_over_union() {
        let (a, b, c) = (cube_at("a", 0.0), cube_at("b", 0.2), cube_at("c", 0.4));
        let n = normalize(&intersection(&union(&a, &b), &c), 100);
        assert_eq!(n.term.unwrap().dump(), "((a * c) + (b * c))");
    }

    #[test]
    fn test_nested_difference() {
        let (a, b, c) = (cube_at("a", 0.0), cube_at("b", 0.2), cube_at("c", 0.4));
        let n = normalize(&difference(&a, &difference(&b, &c)), 100);
        assert_eq!(n.term.unwrap().dump(), "((a - b) + (a * c))");
    }

    #[test]
    fn test_union_only_term_is_already_normal() {
        let t = union(&union(&cube_at("a", 0.0), &cube_at("b", 5.0)), &cube_at("c", 9.0));
        let n = normalize(&t, 100);
        assert!(Arc::ptr_eq(n.term.as_ref().unwrap(), &t));
        assert_eq!(n.passes, 1);
    }

    #[test]
    fn test_normalizing_twice_is_stable() {
        let (a, b, c, d) = (cube_at("a", 0.0), cube_at("b", 0.2), cube_at("c", 0.4), cube_at("d", 0.6));
        let t = intersection(&union(&a, &b), &difference(&c, &union(&a, &d)));
        let once = normalize(&t, 1000).term.unwrap();
        let twice = normalize(&once, 1000).term.unwrap();
        assert!(Arc::ptr_eq(&once, &twice));
    }

    #[test]
    fn test_pruned_to_empty() {
        // c overlaps the union's box but neither operand
        let (a, b, c) = (cube_at("a", 0.0), cube_at("b", 4.0), cube_at("c", 2.2));
        let n = normalize(&intersection(&union(&a, &b), &c), 100);
        assert!(n.term.is_none());
        assert!(!n.aborted);
    }

    #[test]
    fn test_budget_aborts_with_last_complete_pass() {
        // (a + b) * (c + d) * (e + f) expands to eight products
        let leaves: Vec<_> = (0..6).map(|i| cube_at(&format!("l{}", i), i as f64 * 0.1)).collect();
        let t = intersection(
            &intersection(&union(&leaves[0], &leaves[1]), &union(&leaves[2], &leaves[3])),
            &union(&leaves[4], &leaves[5]),
        );
        let full = normalize(&t, 1000);
        assert!(!full.aborted);
        assert_eq!(full.leaf_count(), 24);

        let limited = normalize(&t, 8);
        assert!(limited.aborted);
        assert!(limited.leaf_count() <= 8);
    }

    #[test]
    fn test_cancelled_before_first_pass() {
        let token = CancelToken::new();
        token.cancel();
        let t = union(&cube_at("a", 0.0), &cube_at("b", 1.0));
        assert!(matches!(
            TermNormalizer::new(10).normalize(&t, &token),
            Err(PipelineError::Cancelled)
        ));
    }
}
