// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! AST node definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Debug modifier characters attached to an instantiation.
///
/// `!` root, `%` background, `#` highlight, `*` disable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub root: bool,
    pub background: bool,
    pub highlight: bool,
    pub disabled: bool,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !(self.root || self.background || self.highlight || self.disabled)
    }

    /// Apply one modifier character; unknown characters are ignored
    pub fn set(&mut self, modifier: char) {
        match modifier {
            '!' => self.root = true,
            '%' => self.background = true,
            '#' => self.highlight = true,
            '*' => self.disabled = true,
            _ => {}
        }
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (set, symbol) in [
            (self.root, '!'),
            (self.background, '%'),
            (self.highlight, '#'),
            (self.disabled, '*'),
        ] {
            if set {
                write!(f, "{}", symbol)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Undef,
    Bool(bool),
    Number(f64),
    Str(String),
    Vector(Vec<Expr>),
    /// `[start : end]` or `[start : step : end]`
    Range {
        start: Box<Expr>,
        step: Option<Box<Expr>>,
        end: Box<Expr>,
    },
    Var(String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Argument>),
}

/// Call argument, positional when `name` is `None`
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Expr,
}

impl Argument {
    pub fn positional(value: Expr) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Expr) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: Expr,
}

/// One module call in a body, with its own child body
#[derive(Debug, Clone, PartialEq)]
pub struct Instantiation {
    pub name: String,
    pub arguments: Vec<Argument>,
    pub modifiers: Modifiers,
    pub children: Body,
    /// Byte offset of the call in its source file
    pub position: usize,
}

impl Instantiation {
    pub fn new(name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        Self {
            name: name.into(),
            arguments,
            modifiers: Modifiers::default(),
            children: Body::default(),
            position: 0,
        }
    }
}

/// User `module name(params) { ... }` definition
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDef {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub body: Body,
}

/// Statements of one scope, grouped by kind.
///
/// Definitions are visible to the whole scope, assignments are evaluated in
/// order before any instantiation, instantiations keep source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    pub assignments: Vec<Assignment>,
    pub definitions: Vec<Arc<ModuleDef>>,
    pub instantiations: Vec<Instantiation>,
}

impl Body {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.definitions.is_empty() && self.instantiations.is_empty()
    }

    /// Splice another scope's statements after ours (`include`)
    pub fn extend(&mut self, other: Body) {
        self.assignments.extend(other.assignments);
        self.definitions.extend(other.definitions);
        self.instantiations.extend(other.instantiations);
    }

    /// Import only the definitions of another scope (`use`)
    pub fn extend_definitions(&mut self, other: Body) {
        self.definitions.extend(other.definitions);
    }

    pub fn write_to(&self, out: &mut String, indent: usize) {
        let pad = "\t".repeat(indent);
        for assignment in &self.assignments {
            out.push_str(&format!("{}{} = {};\n", pad, assignment.name, assignment.value));
        }
        for def in &self.definitions {
            let params: Vec<String> = def
                .parameters
                .iter()
                .map(|p| match &p.default {
                    Some(value) => format!("{} = {}", p.name, value),
                    None => p.name.clone(),
                })
                .collect();
            out.push_str(&format!("{}module {}({}) {{\n", pad, def.name, params.join(", ")));
            def.body.write_to(out, indent + 1);
            out.push_str(&format!("{}}}\n", pad));
        }
        for inst in &self.instantiations {
            out.push_str(&format!(
                "{}{}{}({})",
                pad,
                inst.modifiers,
                inst.name,
                join_arguments(&inst.arguments)
            ));
            if inst.children.is_empty() {
                out.push_str(";\n");
            } else {
                out.push_str(" {\n");
                inst.children.write_to(out, indent + 1);
                out.push_str(&format!("{}}}\n", pad));
            }
        }
    }
}

fn join_arguments(arguments: &[Argument]) -> String {
    arguments
        .iter()
        .map(|a| match &a.name {
            Some(name) => format!("{} = {}", name, a.value),
            None => a.value.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Undef => f.write_str("undef"),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Str(s) => write!(f, "{:?}", s),
            Expr::Vector(items) => {
                let items: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Expr::Range { start, step, end } => match step {
                Some(step) => write!(f, "[{} : {} : {}]", start, step, end),
                None => write!(f, "[{} : {}]", start, end),
            },
            Expr::Var(name) => f.write_str(name),
            Expr::Index(base, index) => write!(f, "{}[{}]", base, index),
            Expr::Unary(UnaryOp::Neg, e) => write!(f, "-{}", e),
            Expr::Unary(UnaryOp::Not, e) => write!(f, "!{}", e),
            Expr::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
            Expr::Ternary(c, t, e) => write!(f, "({} ? {} : {})", c, t, e),
            Expr::Call(name, args) => write!(f, "{}({})", name, join_arguments(args)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifiers_display_in_fixed_order() {
        let mut modifiers = Modifiers::default();
        assert!(modifiers.is_empty());
        modifiers.set('#');
        modifiers.set('!');
        assert_eq!(modifiers.to_string(), "!#");
    }

    #[test]
    fn test_body_dump() {
        let mut body = Body::default();
        body.assignments.push(Assignment {
            name: "size".into(),
            value: Expr::Number(10.0),
        });
        let mut inst = Instantiation::new("translate", vec![Argument::positional(Expr::Vector(vec![
            Expr::Number(1.0),
            Expr::Number(0.0),
            Expr::Number(0.0),
        ]))]);
        inst.children
            .instantiations
            .push(Instantiation::new("cube", vec![Argument::positional(Expr::Var("size".into()))]));
        body.instantiations.push(inst);

        let mut out = String::new();
        body.write_to(&mut out, 0);
        assert_eq!(out, "size = 10;\ntranslate([1, 0, 0]) {\n\tcube(size);\n}\n");
    }

    #[test]
    fn test_cloned_body_shares_definitions() {
        let mut body = Body::default();
        body.definitions.push(Arc::new(ModuleDef {
            name: "peg".into(),
            parameters: Vec::new(),
            body: Body::default(),
        }));
        let copy = body.clone();
        assert!(Arc::ptr_eq(&body.definitions[0], &copy.definitions[0]));
        assert_eq!(Arc::strong_count(&body.definitions[0]), 2);
    }
}
