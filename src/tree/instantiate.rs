// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Module + Context to scene tree

use super::builtins;
use super::node::{NodeIndex, NodeKind, SceneNode};
use super::SceneTree;
use crate::ast::{Children, Context, Instantiation, Modifiers, Module, Value};
use crate::error::{PipelineError, PipelineResult};
use log::warn;

/// User module calls allowed on one instantiation path
pub const MAX_MODULE_DEPTH: usize = 200;

/// Instantiate a module's top-level statements against `context`.
///
/// Node indices start at zero for every call. Fails with
/// [`PipelineError::NoTopLevelObject`] when no statement produced a node.
pub fn instantiate(module: &Module, context: &Context) -> PipelineResult<SceneTree> {
    let scope = context.enter(module.body());
    let mut builder = TreeBuilder::default();
    let top = builder.open(NodeKind::Group, Modifiers::default(), 0, None);
    for inst in &module.body().instantiations {
        builder.instantiation(inst, &scope, top)?;
    }
    builder.close(top);

    if builder.nodes[top].children.is_empty() {
        return Err(PipelineError::NoTopLevelObject);
    }
    Ok(SceneTree::new(builder.nodes))
}

#[derive(Default)]
struct TreeBuilder {
    nodes: Vec<SceneNode>,
    depth: usize,
}

impl TreeBuilder {
    fn open(
        &mut self,
        kind: NodeKind,
        modifiers: Modifiers,
        position: usize,
        parent: Option<NodeIndex>,
    ) -> NodeIndex {
        let index = self.nodes.len();
        self.nodes.push(SceneNode {
            index,
            kind,
            modifiers,
            children: Vec::new(),
            subtree_end: index + 1,
            position,
        });
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        index
    }

    fn close(&mut self, index: NodeIndex) {
        self.nodes[index].subtree_end = self.nodes.len();
    }

    fn instantiation<'a>(
        &mut self,
        inst: &'a Instantiation,
        ctx: &'a Context<'a>,
        parent: NodeIndex,
    ) -> PipelineResult<()> {
        if inst.name == "children" {
            return self.children(inst, ctx, parent);
        }

        if let Some(def) = ctx.find_module(&inst.name) {
            if self.depth >= MAX_MODULE_DEPTH {
                return Err(PipelineError::Eval(format!(
                    "recursion detected calling module '{}'",
                    inst.name
                )));
            }
            let mut scope = ctx.call_scope(&def, &inst.arguments);
            scope.set_children(Children {
                body: &inst.children,
                context: ctx,
            });
            scope.bind_body(&def.body);

            let node = self.open(NodeKind::Group, inst.modifiers, inst.position, Some(parent));
            self.depth += 1;
            let result = def
                .body
                .instantiations
                .iter()
                .try_for_each(|child| self.instantiation(child, &scope, node));
            self.depth -= 1;
            result?;
            self.close(node);
            return Ok(());
        }

        let args = ctx.evaluate_arguments(&inst.arguments);
        let Some(kind) = builtins::node_kind(&inst.name, &args, ctx) else {
            warn!("Ignoring unknown module '{}'", inst.name);
            return Ok(());
        };
        let is_leaf = kind.is_leaf();
        let node = self.open(kind, inst.modifiers, inst.position, Some(parent));
        if is_leaf {
            if !inst.children.instantiations.is_empty() {
                warn!("module {}() does not support child modules", inst.name);
            }
        } else {
            let mut scope = ctx.enter(&inst.children);
            for (name, value) in &args.named {
                if name.starts_with('$') {
                    scope.set_variable(name, value.clone());
                }
            }
            for child in &inst.children.instantiations {
                self.instantiation(child, &scope, node)?;
            }
        }
        self.close(node);
        Ok(())
    }

    /// `children()` / `children(i)` / `children([i, j])` inside a module body
    fn children<'a>(
        &mut self,
        inst: &'a Instantiation,
        ctx: &'a Context<'a>,
        parent: NodeIndex,
    ) -> PipelineResult<()> {
        let Some(children) = ctx.children() else {
            return Ok(());
        };
        let args = ctx.evaluate_arguments(&inst.arguments);
        let selected: Option<Vec<usize>> = match args.get("index", Some(0)) {
            Some(Value::Number(i)) if *i >= 0.0 => Some(vec![*i as usize]),
            Some(v @ Value::Vector(_)) => v
                .as_numbers()
                .map(|ns| ns.into_iter().filter(|n| *n >= 0.0).map(|n| n as usize).collect()),
            _ => None,
        };

        let scope = children.context.enter(children.body);
        let node = self.open(NodeKind::Group, inst.modifiers, inst.position, Some(parent));
        let available = &children.body.instantiations;
        match selected {
            Some(indices) => {
                for i in indices {
                    match available.get(i) {
                        Some(child) => self.instantiation(child, &scope, node)?,
                        None => warn!("Children index ({}) out of bounds ({} children)", i, available.len()),
                    }
                }
            }
            None => {
                for child in available {
                    self.instantiation(child, &scope, node)?;
                }
            }
        }
        self.close(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{ScadParser, SourceParser};
    use std::path::Path;

    fn tree(text: &str) -> PipelineResult<SceneTree> {
        let module = ScadParser::new().parse(text, Path::new("."))?;
        instantiate(&module, &Context::global())
    }

    #[test]
    fn test_indices_are_preorder_from_zero() {
        let t = tree("union() { cube(1); sphere(1); }\ncube(2);").unwrap();
        let indices: Vec<_> = t.nodes().iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(t.node(1).subtree_end, 4);
        assert_eq!(t.node(0).children, vec![1, 4]);
    }

    #[test]
    fn test_empty_document_has_no_top_level_object() {
        assert!(matches!(tree("x = 1;"), Err(PipelineError::NoTopLevelObject)));
        assert!(matches!(tree("nothing_here();"), Err(PipelineError::NoTopLevelObject)));
    }

    #[test]
    fn test_user_modules_and_children() {
        let t = tree(
            "module wrap(s = 2) { scale(s) children(); }\nwrap(3) { cube(1); sphere(1); }",
        )
        .unwrap();
        let dump = t.dump();
        assert!(dump.contains("multmatrix([[3, 0, 0, 0], [0, 3, 0, 0], [0, 0, 3, 0], [0, 0, 0, 1]])"));
        assert!(dump.contains("cube(size = [1, 1, 1], center = false);"));
        assert!(dump.contains("sphere($fn = 5, r = 1);"));
    }

    #[test]
    fn test_children_index_selection() {
        let t = tree("module second() { children(1); }\nsecond() { cube(1); cube(2); }").unwrap();
        assert!(t.dump().contains("cube(size = [2, 2, 2]"));
        assert!(!t.dump().contains("cube(size = [1, 1, 1]"));
    }

    #[test]
    fn test_special_variables_flow_to_children() {
        let t = tree("translate([0, 0, 1], $fn = 7) sphere(1);").unwrap();
        assert!(t.dump().contains("sphere($fn = 7, r = 1);"));
    }

    #[test]
    fn test_infinite_recursion_is_an_error() {
        assert!(matches!(tree("module r() { r(); }\nr();"), Err(PipelineError::Eval(_))));
    }
}
