// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Instantiated scene tree
//!
//! Nodes live in a single arena in pre-order, so a node's subtree is the
//! contiguous range `index..subtree_end`. A tree is built once per compile
//! generation and replaced wholesale by the next one.

mod builtins;
mod instantiate;
mod node;

pub use builtins::named_color;
pub use instantiate::{instantiate, MAX_MODULE_DEPTH};
pub use node::{NodeIndex, NodeKind, Rgba, SceneNode};

use log::warn;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::ops::Range;

pub struct SceneTree {
    nodes: Vec<SceneNode>,
    root: NodeIndex,
    keys: Vec<String>,
}

impl SceneTree {
    /// Wrap built nodes, resolving the effective root and the cache keys
    pub fn new(nodes: Vec<SceneNode>) -> Self {
        let root = find_root(&nodes);
        let keys = compute_keys(&nodes);
        Self { nodes, root, keys }
    }

    /// Effective root: the first `!` node, else the top-level group
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn root_node(&self) -> &SceneNode {
        &self.nodes[self.root]
    }

    pub fn node(&self, index: NodeIndex) -> &SceneNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, index: NodeIndex) -> impl Iterator<Item = &SceneNode> {
        self.nodes[index].children.iter().map(move |&c| &self.nodes[c])
    }

    pub fn subtree(&self, index: NodeIndex) -> Range<NodeIndex> {
        index..self.nodes[index].subtree_end
    }

    /// Progress units under the effective root
    pub fn total_index_count(&self) -> usize {
        self.root_node().subtree_len()
    }

    /// Canonical identity of a subtree.
    ///
    /// Leaves use their dump line; inner nodes hash their dump line together
    /// with the keys of the children that contribute geometry.
    pub fn key(&self, index: NodeIndex) -> &str {
        &self.keys[index]
    }

    /// Dump of the effective root's subtree
    pub fn dump(&self) -> String {
        self.dump_node(self.root)
    }

    pub fn dump_node(&self, index: NodeIndex) -> String {
        let mut out = String::new();
        self.write_node(&mut out, index, 0);
        out
    }

    fn write_node(&self, out: &mut String, index: NodeIndex, indent: usize) {
        let node = &self.nodes[index];
        let pad = "\t".repeat(indent);
        let _ = write!(out, "{}{}{}", pad, node.modifiers, node.kind.describe());
        if node.children.is_empty() {
            out.push_str(";\n");
            return;
        }
        out.push_str(" {\n");
        for &child in &node.children {
            self.write_node(out, child, indent + 1);
        }
        let _ = writeln!(out, "{}}}", pad);
    }
}

/// First `root`-flagged node in pre-order outside disabled subtrees
fn find_root(nodes: &[SceneNode]) -> NodeIndex {
    let mut roots = Vec::new();
    let mut i = 0;
    while i < nodes.len() {
        let node = &nodes[i];
        if node.modifiers.disabled {
            i = node.subtree_end;
            continue;
        }
        if node.modifiers.root {
            roots.push(i);
        }
        i += 1;
    }
    if roots.len() > 1 {
        warn!(
            "Root modifier (!) used in multiple places ({} nodes), using the first",
            roots.len()
        );
    }
    roots.first().copied().unwrap_or(0)
}

fn compute_keys(nodes: &[SceneNode]) -> Vec<String> {
    let mut keys = vec![String::new(); nodes.len()];
    // children always follow their parent in the arena
    for index in (0..nodes.len()).rev() {
        let node = &nodes[index];
        let line = node.kind.describe();
        if node.kind.is_leaf() {
            keys[index] = format!("{};", line);
            continue;
        }
        let mut hasher = Sha256::new();
        hasher.update(line.as_bytes());
        for &child in &node.children {
            let modifiers = nodes[child].modifiers;
            if modifiers.disabled || modifiers.background {
                continue;
            }
            hasher.update(b"\n");
            hasher.update(keys[child].as_bytes());
        }
        let digest = hasher.finalize();
        let mut key = line;
        key.push('#');
        for byte in &digest[..16] {
            let _ = write!(key, "{:02x}", byte);
        }
        keys[index] = key;
    }
    keys
}
