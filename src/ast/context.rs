// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Variable-binding scopes and expression evaluation

use super::node::{Argument, BinaryOp, Body, Expr, ModuleDef, UnaryOp};
use super::value::Value;
use ahash::AHashMap;
use log::warn;
use std::cmp::Ordering;
use std::sync::Arc;

/// Child statements passed to a user module call, evaluated in the caller's scope
#[derive(Clone, Copy)]
pub struct Children<'a> {
    pub body: &'a Body,
    pub context: &'a Context<'a>,
}

/// One scope of the chain: global, module call or nested block
pub struct Context<'a> {
    parent: Option<&'a Context<'a>>,
    variables: AHashMap<String, Value>,
    modules: AHashMap<String, Arc<ModuleDef>>,
    children: Option<Children<'a>>,
}

impl Context<'static> {
    /// Global scope with the special variables bound
    pub fn global() -> Self {
        let mut context = Context {
            parent: None,
            variables: AHashMap::new(),
            modules: AHashMap::new(),
            children: None,
        };
        context.set_variable("$fn", Value::Number(0.0));
        context.set_variable("$fa", Value::Number(12.0));
        context.set_variable("$fs", Value::Number(2.0));
        context.set_variable("$t", Value::Number(0.0));
        context.set_variable("$vpt", Value::Vector(vec![Value::Number(0.0); 3]));
        context.set_variable(
            "$vpr",
            Value::Vector(vec![Value::Number(55.0), Value::Number(0.0), Value::Number(25.0)]),
        );
        context.set_variable("$vpd", Value::Number(500.0));
        context.set_variable("PI", Value::Number(std::f64::consts::PI));
        context
    }
}

impl<'a> Context<'a> {
    pub fn child(&'a self) -> Context<'a> {
        Context {
            parent: Some(self),
            variables: AHashMap::new(),
            modules: AHashMap::new(),
            children: self.children,
        }
    }

    /// Child scope holding a body's definitions and evaluated assignments
    pub fn enter(&'a self, body: &Body) -> Context<'a> {
        let mut scope = self.child();
        scope.bind_body(body);
        scope
    }

    pub fn bind_body(&mut self, body: &Body) {
        for def in &body.definitions {
            self.define_module(def.clone());
        }
        for assignment in &body.assignments {
            let value = self.evaluate(&assignment.value);
            self.set_variable(&assignment.name, value);
        }
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        match self.variables.get(name) {
            Some(value) => Some(value),
            None => self.parent.and_then(|p| p.lookup(name)),
        }
    }

    /// Variable value, `undef` when unbound
    pub fn variable(&self, name: &str) -> Value {
        self.lookup(name).cloned().unwrap_or_default()
    }

    pub fn define_module(&mut self, def: Arc<ModuleDef>) {
        self.modules.insert(def.name.clone(), def);
    }

    pub fn find_module(&self, name: &str) -> Option<Arc<ModuleDef>> {
        match self.modules.get(name) {
            Some(def) => Some(def.clone()),
            None => self.parent.and_then(|p| p.find_module(name)),
        }
    }

    pub fn set_children(&mut self, children: Children<'a>) {
        self.children = Some(children);
    }

    pub fn children(&self) -> Option<Children<'a>> {
        self.children
    }

    /// Scope for a user module call: parameters bound from `arguments`
    /// (evaluated in `self`), defaults evaluated in the new scope, and
    /// `$`-prefixed named arguments passed through as variables.
    pub fn call_scope(&'a self, def: &ModuleDef, arguments: &[Argument]) -> Context<'a> {
        let args = self.evaluate_arguments(arguments);
        let mut scope = self.child();
        let mut positional = args.positional.into_iter();
        for param in &def.parameters {
            let value = match args.named.iter().find(|(name, _)| name == &param.name) {
                Some((_, value)) => value.clone(),
                None => match positional.next() {
                    Some(value) => value,
                    None => param
                        .default
                        .as_ref()
                        .map(|expr| scope.evaluate(expr))
                        .unwrap_or_default(),
                },
            };
            scope.set_variable(&param.name, value);
        }
        for (name, value) in args.named {
            if name.starts_with('$') {
                scope.set_variable(&name, value);
            }
        }
        scope
    }

    pub fn evaluate_arguments(&self, arguments: &[Argument]) -> Arguments {
        let mut evaluated = Arguments::default();
        for argument in arguments {
            let value = self.evaluate(&argument.value);
            match &argument.name {
                Some(name) => evaluated.named.push((name.clone(), value)),
                None => evaluated.positional.push(value),
            }
        }
        evaluated
    }

    pub fn evaluate(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Undef => Value::Undef,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Number(n) => Value::Number(*n),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::Vector(items) => Value::Vector(items.iter().map(|e| self.evaluate(e)).collect()),
            Expr::Range { start, step, end } => self.evaluate_range(start, step.as_deref(), end),
            Expr::Var(name) => match self.lookup(name) {
                Some(value) => value.clone(),
                None => {
                    warn!("Ignoring unknown variable '{}'", name);
                    Value::Undef
                }
            },
            Expr::Index(base, index) => self.evaluate(base).index(&self.evaluate(index)),
            Expr::Unary(UnaryOp::Neg, e) => self.evaluate(e).neg(),
            Expr::Unary(UnaryOp::Not, e) => Value::Bool(!self.evaluate(e).truthy()),
            Expr::Binary(op, l, r) => self.evaluate_binary(*op, l, r),
            Expr::Ternary(c, t, e) => {
                if self.evaluate(c).truthy() {
                    self.evaluate(t)
                } else {
                    self.evaluate(e)
                }
            }
            Expr::Call(name, arguments) => {
                let args = self.evaluate_arguments(arguments);
                call_function(name, &args.positional)
            }
        }
    }

    fn evaluate_binary(&self, op: BinaryOp, l: &Expr, r: &Expr) -> Value {
        // short-circuit
        match op {
            BinaryOp::And => {
                return Value::Bool(self.evaluate(l).truthy() && self.evaluate(r).truthy())
            }
            BinaryOp::Or => {
                return Value::Bool(self.evaluate(l).truthy() || self.evaluate(r).truthy())
            }
            _ => {}
        }
        let (l, r) = (self.evaluate(l), self.evaluate(r));
        let ordering = |accept: fn(Ordering) -> bool| match l.compare(&r) {
            Some(ord) => Value::Bool(accept(ord)),
            None => Value::Undef,
        };
        match op {
            BinaryOp::Add => l.add(&r),
            BinaryOp::Sub => l.sub(&r),
            BinaryOp::Mul => l.mul(&r),
            BinaryOp::Div => l.div(&r),
            BinaryOp::Rem => l.rem(&r),
            BinaryOp::Lt => ordering(|o| o == Ordering::Less),
            BinaryOp::Le => ordering(|o| o != Ordering::Greater),
            BinaryOp::Gt => ordering(|o| o == Ordering::Greater),
            BinaryOp::Ge => ordering(|o| o != Ordering::Less),
            BinaryOp::Eq => Value::Bool(l == r),
            BinaryOp::Ne => Value::Bool(l != r),
            BinaryOp::And | BinaryOp::Or => Value::Undef,
        }
    }

    fn evaluate_range(&self, start: &Expr, step: Option<&Expr>, end: &Expr) -> Value {
        let start = self.evaluate(start).as_number();
        let end = self.evaluate(end).as_number();
        let step = match step {
            Some(e) => self.evaluate(e).as_number(),
            None => Some(1.0),
        };
        let (Some(start), Some(end), Some(step)) = (start, end, step) else {
            return Value::Undef;
        };
        if step == 0.0 || (end - start) / step < 0.0 {
            return Value::Vector(Vec::new());
        }
        let count = ((end - start) / step).floor() as usize + 1;
        if count > MAX_RANGE_ELEMENTS {
            warn!("Range [{} : {} : {}] has too many elements", start, step, end);
            return Value::Undef;
        }
        Value::Vector(
            (0..count)
                .map(|i| Value::Number(start + step * i as f64))
                .collect(),
        )
    }
}

const MAX_RANGE_ELEMENTS: usize = 1_000_000;

/// Evaluated call arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl Arguments {
    /// Named argument `name`, else the positional argument at `position`
    pub fn get(&self, name: &str, position: Option<usize>) -> Option<&Value> {
        self.named
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| position.and_then(|i| self.positional.get(i)))
            .filter(|v| !v.is_undef())
    }

    pub fn number(&self, name: &str, position: Option<usize>) -> Option<f64> {
        self.get(name, position).and_then(Value::as_number)
    }

    pub fn flag(&self, name: &str, position: Option<usize>) -> bool {
        self.get(name, position).map(Value::truthy).unwrap_or(false)
    }
}

fn call_function(name: &str, args: &[Value]) -> Value {
    let number = |i: usize| args.get(i).and_then(Value::as_number);
    let unary = |f: fn(f64) -> f64| number(0).map(|x| Value::Number(f(x))).unwrap_or_default();
    match name {
        "sin" => unary(|x| x.to_radians().sin()),
        "cos" => unary(|x| x.to_radians().cos()),
        "tan" => unary(|x| x.to_radians().tan()),
        "asin" => unary(|x| x.asin().to_degrees()),
        "acos" => unary(|x| x.acos().to_degrees()),
        "atan" => unary(|x| x.atan().to_degrees()),
        "atan2" => match (number(0), number(1)) {
            (Some(y), Some(x)) => Value::Number(y.atan2(x).to_degrees()),
            _ => Value::Undef,
        },
        "sqrt" => unary(f64::sqrt),
        "abs" => unary(f64::abs),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "round" => unary(f64::round),
        "exp" => unary(f64::exp),
        "ln" => unary(f64::ln),
        "sign" => unary(|x| if x > 0.0 { 1.0 } else if x < 0.0 { -1.0 } else { 0.0 }),
        "pow" => match (number(0), number(1)) {
            (Some(b), Some(e)) => Value::Number(b.powf(e)),
            _ => Value::Undef,
        },
        "min" | "max" => {
            let numbers = match args {
                [single] => single.as_numbers(),
                _ => args.iter().map(Value::as_number).collect(),
            };
            let fold = if name == "min" { f64::min } else { f64::max };
            match numbers {
                Some(numbers) if !numbers.is_empty() => {
                    Value::Number(numbers.into_iter().fold(
                        if name == "min" { f64::INFINITY } else { f64::NEG_INFINITY },
                        fold,
                    ))
                }
                _ => Value::Undef,
            }
        }
        "len" => args
            .first()
            .and_then(Value::len)
            .map(|n| Value::Number(n as f64))
            .unwrap_or_default(),
        "str" => Value::Str(
            args.iter()
                .map(|v| match v {
                    Value::Str(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        "concat" => Value::Vector(
            args.iter()
                .flat_map(|v| match v {
                    Value::Vector(items) => items.clone(),
                    other => vec![other.clone()],
                })
                .collect(),
        ),
        _ => {
            warn!("Ignoring unknown function '{}'", name);
            Value::Undef
        }
    }
}
