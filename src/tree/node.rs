// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene node definitions

use crate::ast::Modifiers;
use crate::geometry::{BooleanOp, Primitive};
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arena position of a node; doubles as its progress index
pub type NodeIndex = usize;

/// RGBA color with components in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        let nibble = |i: usize| u8::from_str_radix(digits.get(i..i + 1)?, 16).ok();
        let byte = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        let (r, g, b, a) = match digits.len() {
            3 | 4 => (
                nibble(0)? * 17,
                nibble(1)? * 17,
                nibble(2)? * 17,
                if digits.len() == 4 { nibble(3)? * 17 } else { 255 },
            ),
            6 | 8 => (
                byte(0)?,
                byte(2)?,
                byte(4)?,
                if digits.len() == 8 { byte(6)? } else { 255 },
            ),
            _ => return None,
        };
        Some(Self::new(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        ))
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.r, self.g, self.b, self.a)
    }
}

/// Operation tag of a scene node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Group,
    Union,
    Difference,
    Intersection,
    Transform(Matrix4<f64>),
    Color(Rgba),
    Primitive(Primitive),
}

impl NodeKind {
    /// Boolean operation used to combine this node's children
    pub fn combine_op(&self) -> BooleanOp {
        match self {
            NodeKind::Difference => BooleanOp::Difference,
            NodeKind::Intersection => BooleanOp::Intersection,
            _ => BooleanOp::Union,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Primitive(_))
    }

    /// Dump line without modifiers or terminator
    pub fn describe(&self) -> String {
        match self {
            NodeKind::Group => "group()".to_string(),
            NodeKind::Union => "union()".to_string(),
            NodeKind::Difference => "difference()".to_string(),
            NodeKind::Intersection => "intersection()".to_string(),
            NodeKind::Transform(m) => {
                let rows: Vec<String> = (0..4)
                    .map(|r| format!("[{}, {}, {}, {}]", m[(r, 0)], m[(r, 1)], m[(r, 2)], m[(r, 3)]))
                    .collect();
                format!("multmatrix([{}])", rows.join(", "))
            }
            NodeKind::Color(c) => format!("color({})", c),
            NodeKind::Primitive(p) => p.describe(),
        }
    }
}

/// One node of the instantiated tree
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub index: NodeIndex,
    pub kind: NodeKind,
    pub modifiers: Modifiers,
    pub children: Vec<NodeIndex>,
    /// One past the last node of this node's contiguous subtree
    pub subtree_end: NodeIndex,
    /// Byte offset of the originating call in its source file
    pub position: usize,
}

impl SceneNode {
    pub fn subtree_len(&self) -> usize {
        self.subtree_end - self.index
    }
}
