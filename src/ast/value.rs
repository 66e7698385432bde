// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Runtime values produced by expression evaluation

use nalgebra::{Matrix4, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Undef,
    Bool(bool),
    Number(f64),
    Str(String),
    Vector(Vec<Value>),
}

impl Value {
    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    /// Truthiness: zero, empty strings and vectors, `false` and `undef` are false
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undef => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Vector(v) => !v.is_empty(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric vector of any length
    pub fn as_numbers(&self) -> Option<Vec<f64>> {
        self.as_vector()?.iter().map(Value::as_number).collect()
    }

    /// Three-component vector; shorter vectors are padded with `pad`
    pub fn as_vec3(&self, pad: f64) -> Option<Vector3<f64>> {
        let numbers = self.as_numbers()?;
        if numbers.is_empty() || numbers.len() > 3 {
            return None;
        }
        let at = |i: usize| numbers.get(i).copied().unwrap_or(pad);
        Some(Vector3::new(at(0), at(1), at(2)))
    }

    pub fn as_vec2(&self) -> Option<Vector2<f64>> {
        let numbers = self.as_numbers()?;
        match numbers.as_slice() {
            [x, y] | [x, y, _] => Some(Vector2::new(*x, *y)),
            _ => None,
        }
    }

    /// 4x4 (or 3x4, padded with the identity row) matrix
    pub fn as_matrix(&self) -> Option<Matrix4<f64>> {
        let rows = self.as_vector()?;
        if rows.len() < 3 || rows.len() > 4 {
            return None;
        }
        let mut matrix = Matrix4::identity();
        for (r, row) in rows.iter().enumerate() {
            let numbers = row.as_numbers()?;
            if numbers.len() < 3 || numbers.len() > 4 {
                return None;
            }
            for (c, n) in numbers.iter().enumerate() {
                matrix[(r, c)] = *n;
            }
        }
        Some(matrix)
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::Vector(v) => Some(v.len()),
            _ => None,
        }
    }

    pub fn index(&self, index: &Value) -> Value {
        let Some(i) = index.as_number() else {
            return Value::Undef;
        };
        if i < 0.0 {
            return Value::Undef;
        }
        let i = i as usize;
        match self {
            Value::Vector(v) => v.get(i).cloned().unwrap_or_default(),
            Value::Str(s) => s
                .chars()
                .nth(i)
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or_default(),
            _ => Value::Undef,
        }
    }

    pub fn add(&self, other: &Value) -> Value {
        self.elementwise(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Value) -> Value {
        self.elementwise(other, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a * b),
            (Value::Number(_), Value::Vector(v)) => {
                Value::Vector(v.iter().map(|x| self.mul(x)).collect())
            }
            (Value::Vector(v), Value::Number(_)) => {
                Value::Vector(v.iter().map(|x| x.mul(other)).collect())
            }
            (Value::Vector(_), Value::Vector(_)) => {
                // dot product
                match (self.as_numbers(), other.as_numbers()) {
                    (Some(a), Some(b)) if a.len() == b.len() => {
                        Value::Number(a.iter().zip(&b).map(|(x, y)| x * y).sum())
                    }
                    _ => Value::Undef,
                }
            }
            _ => Value::Undef,
        }
    }

    pub fn div(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a / b),
            (Value::Vector(v), Value::Number(_)) => {
                Value::Vector(v.iter().map(|x| x.div(other)).collect())
            }
            _ => Value::Undef,
        }
    }

    pub fn rem(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a % b),
            _ => Value::Undef,
        }
    }

    pub fn neg(&self) -> Value {
        match self {
            Value::Number(n) => Value::Number(-n),
            Value::Vector(v) => Value::Vector(v.iter().map(Value::neg).collect()),
            _ => Value::Undef,
        }
    }

    /// Ordering comparison; `None` for incomparable operands
    pub fn compare(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn elementwise(&self, other: &Value, f: impl Fn(f64, f64) -> f64 + Copy) -> Value {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => Value::Number(f(*a, *b)),
            (Value::Vector(a), Value::Vector(b)) => Value::Vector(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| x.elementwise(y, f))
                    .collect(),
            ),
            _ => Value::Undef,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undef => f.write_str("undef"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Vector(v) => {
                f.write_str("[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}
