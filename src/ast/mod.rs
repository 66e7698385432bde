// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Abstract Syntax Tree module
//!
//! Parsed statements, runtime values and the scope chain used to evaluate
//! them during instantiation.

mod context;
mod module;
mod node;
mod value;

pub use context::{Arguments, Children, Context};
pub use module::Module;
pub use node::{
    Argument, Assignment, BinaryOp, Body, Expr, Instantiation, Modifiers, ModuleDef, Parameter,
    UnaryOp,
};
pub use value::Value;
