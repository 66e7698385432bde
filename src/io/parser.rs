// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! OpenSCAD parser using pest

use crate::ast::{
    Argument, Assignment, BinaryOp, Body, Expr, Instantiation, Modifiers, Module, ModuleDef,
    Parameter, UnaryOp,
};
use crate::error::{ParseFailure, PipelineError, PipelineResult};
use log::{debug, warn};
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[grammar = "io/scad.pest"]
struct ScadGrammar;

/// Turns document text into a [`Module`]
pub trait SourceParser: Send + Sync {
    /// Parse `text`; relative `include`/`use` paths resolve against `base_path`
    fn parse(&self, text: &str, base_path: &Path) -> PipelineResult<Module>;
}

/// Reference parser for the OpenSCAD language subset
#[derive(Debug, Clone, Default)]
pub struct ScadParser {
    library_paths: Vec<PathBuf>,
}

impl ScadParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_paths(library_paths: Vec<PathBuf>) -> Self {
        Self { library_paths }
    }

    pub fn library_paths(&self) -> &[PathBuf] {
        &self.library_paths
    }

    /// First existing candidate, else the path relative to `dir`
    fn resolve(&self, name: &str, dir: &Path) -> (PathBuf, bool) {
        let local = dir.join(name);
        if local.is_file() {
            return (local, true);
        }
        for library in &self.library_paths {
            let candidate = library.join(name);
            if candidate.is_file() {
                return (candidate, true);
            }
        }
        (local, false)
    }
}

impl SourceParser for ScadParser {
    fn parse(&self, text: &str, base_path: &Path) -> PipelineResult<Module> {
        let mut session = Session {
            parser: self,
            dependencies: Vec::new(),
            stack: Vec::new(),
        };
        let body = session.parse_source(text, base_path)?;
        debug!(
            "Parsed {} statements, {} dependencies",
            body.instantiations.len() + body.assignments.len() + body.definitions.len(),
            session.dependencies.len()
        );
        Ok(Module::new(body, base_path, session.dependencies))
    }
}

/// Parse a standalone expression, e.g. a `-D name=value` override
pub fn parse_expression(text: &str) -> PipelineResult<Expr> {
    let mut pairs = ScadGrammar::parse(Rule::expr, text).map_err(failure_from_pest)?;
    let pair = pairs
        .next()
        .ok_or_else(|| PipelineError::Parse(ParseFailure::new(0, 1, 1, "expected expression")))?;
    if pair.as_span().end() != text.trim_end().len() {
        let (line, column) = pair.as_span().end_pos().line_col();
        return Err(PipelineError::Parse(ParseFailure::new(
            pair.as_span().end(),
            line,
            column,
            "unexpected trailing input",
        )));
    }
    expr(pair)
}

/// Parse a `name=value` definition given on the command line
pub fn parse_definition(text: &str) -> PipelineResult<Assignment> {
    let Some((name, value)) = text.split_once('=') else {
        return Err(PipelineError::Parse(ParseFailure::new(
            text.len(),
            1,
            text.chars().count() + 1,
            "expected name=value",
        )));
    };
    let name = name.trim();
    let valid = name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && name.chars().skip(1).all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(PipelineError::Parse(ParseFailure::new(
            0,
            1,
            1,
            format!("invalid variable name '{}'", name),
        )));
    }
    Ok(Assignment {
        name: name.to_string(),
        value: parse_expression(value.trim())?,
    })
}

fn failure_from_pest(error: pest::error::Error<Rule>) -> PipelineError {
    let position = match error.location {
        pest::error::InputLocation::Pos(pos) => pos,
        pest::error::InputLocation::Span((start, _)) => start,
    };
    let (line, column) = match error.line_col {
        pest::error::LineColLocation::Pos(lc) => lc,
        pest::error::LineColLocation::Span(lc, _) => lc,
    };
    PipelineError::Parse(ParseFailure::new(
        position,
        line,
        column,
        error.variant.message().to_string(),
    ))
}

fn failure_at(pair: &Pair<Rule>, message: impl Into<String>) -> PipelineError {
    let (line, column) = pair.as_span().start_pos().line_col();
    PipelineError::Parse(ParseFailure::new(pair.as_span().start(), line, column, message))
}

fn malformed(pair: &Pair<Rule>) -> PipelineError {
    failure_at(pair, format!("malformed {:?}", pair.as_rule()))
}

fn first_inner<'i>(pair: &Pair<'i, Rule>) -> PipelineResult<Pair<'i, Rule>> {
    pair.clone().into_inner().next().ok_or_else(|| malformed(pair))
}

/// State of one top-level parse: collected dependencies and the include stack
struct Session<'p> {
    parser: &'p ScadParser,
    dependencies: Vec<PathBuf>,
    stack: Vec<PathBuf>,
}

impl Session<'_> {
    fn parse_source(&mut self, text: &str, dir: &Path) -> PipelineResult<Body> {
        let mut pairs = ScadGrammar::parse(Rule::program, text).map_err(failure_from_pest)?;
        let mut body = Body::default();
        if let Some(program) = pairs.next() {
            self.statements(program.into_inner(), dir, &mut body)?;
        }
        Ok(body)
    }

    fn statements(&mut self, pairs: Pairs<Rule>, dir: &Path, body: &mut Body) -> PipelineResult<()> {
        for pair in pairs {
            self.statement(pair, dir, body)?;
        }
        Ok(())
    }

    fn statement(&mut self, pair: Pair<Rule>, dir: &Path, body: &mut Body) -> PipelineResult<()> {
        match pair.as_rule() {
            Rule::include_stmt => {
                if let Some(included) = self.file(&pair, dir)? {
                    body.extend(included);
                }
            }
            Rule::use_stmt => {
                if let Some(used) = self.file(&pair, dir)? {
                    body.extend_definitions(used);
                }
            }
            Rule::module_def => {
                let def = self.module_def(pair, dir)?;
                body.definitions.push(Arc::new(def));
            }
            Rule::assignment => {
                let mut inner = pair.clone().into_inner();
                let (Some(name), Some(value)) = (inner.next(), inner.next()) else {
                    return Err(malformed(&pair));
                };
                body.assignments.push(Assignment {
                    name: name.as_str().to_string(),
                    value: expr(value)?,
                });
            }
            Rule::instantiation => {
                let inst = self.instantiation(pair, dir)?;
                body.instantiations.push(inst);
            }
            // bare blocks are transparent
            Rule::block => self.statements(pair.into_inner(), dir, body)?,
            Rule::empty | Rule::EOI => {}
            _ => return Err(malformed(&pair)),
        }
        Ok(())
    }

    /// Parse the file referenced by an include/use statement.
    ///
    /// The path is recorded as a dependency whether or not it exists.
    fn file(&mut self, pair: &Pair<Rule>, dir: &Path) -> PipelineResult<Option<Body>> {
        let file_ref = first_inner(pair)?;
        let name = first_inner(&file_ref)?.as_str().trim().to_string();
        let (path, found) = self.parser.resolve(&name, dir);
        self.dependencies.push(path.clone());
        if !found {
            warn!("Can't open include file '{}'", name);
            return Ok(None);
        }

        let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if self.stack.contains(&canonical) {
            warn!("Include cycle at '{}', ignoring", path.display());
            return Ok(None);
        }

        let text = std::fs::read_to_string(&path).map_err(|source| PipelineError::Io {
            path: path.clone(),
            source,
        })?;
        let file_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        self.stack.push(canonical);
        let parsed = self.parse_source(&text, &file_dir);
        self.stack.pop();

        match parsed {
            Ok(body) => Ok(Some(body)),
            Err(PipelineError::Parse(inner)) => Err(failure_at(
                pair,
                format!("in {}: {}", path.display(), inner),
            )),
            Err(other) => Err(other),
        }
    }

    fn module_def(&mut self, pair: Pair<Rule>, dir: &Path) -> PipelineResult<ModuleDef> {
        let mut name = None;
        let mut parameters = Vec::new();
        let mut body = Body::default();
        for inner in pair.clone().into_inner() {
            match inner.as_rule() {
                Rule::kw_module => {}
                Rule::ident => name = Some(inner.as_str().to_string()),
                Rule::parameters => {
                    for param in inner.into_inner() {
                        let mut parts = param.clone().into_inner();
                        let param_name = parts.next().ok_or_else(|| malformed(&param))?;
                        parameters.push(Parameter {
                            name: param_name.as_str().to_string(),
                            default: parts.next().map(expr).transpose()?,
                        });
                    }
                }
                Rule::child_statement => self.child_statement(inner, dir, &mut body)?,
                _ => return Err(malformed(&inner)),
            }
        }
        Ok(ModuleDef {
            name: name.ok_or_else(|| malformed(&pair))?,
            parameters,
            body,
        })
    }

    fn instantiation(&mut self, pair: Pair<Rule>, dir: &Path) -> PipelineResult<Instantiation> {
        let position = pair.as_span().start();
        let mut modifiers = Modifiers::default();
        let mut name = None;
        let mut arguments = Vec::new();
        let mut children = Body::default();
        for inner in pair.clone().into_inner() {
            match inner.as_rule() {
                Rule::modifier => {
                    for c in inner.as_str().chars() {
                        modifiers.set(c);
                    }
                }
                Rule::ident => name = Some(inner.as_str().to_string()),
                Rule::arguments => arguments = argument_list(inner)?,
                Rule::child_statement => self.child_statement(inner, dir, &mut children)?,
                _ => return Err(malformed(&inner)),
            }
        }
        Ok(Instantiation {
            name: name.ok_or_else(|| malformed(&pair))?,
            arguments,
            modifiers,
            children,
            position,
        })
    }

    fn child_statement(&mut self, pair: Pair<Rule>, dir: &Path, body: &mut Body) -> PipelineResult<()> {
        let inner = first_inner(&pair)?;
        self.statement(inner, dir, body)
    }
}

fn argument_list(pair: Pair<Rule>) -> PipelineResult<Vec<Argument>> {
    pair.into_inner()
        .map(|arg| match arg.as_rule() {
            Rule::named_argument => {
                let mut parts = arg.clone().into_inner();
                let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
                    return Err(malformed(&arg));
                };
                Ok(Argument::named(name.as_str(), expr(value)?))
            }
            _ => Ok(Argument::positional(expr(arg)?)),
        })
        .collect()
}

fn expr(pair: Pair<Rule>) -> PipelineResult<Expr> {
    match pair.as_rule() {
        Rule::expr => expr(first_inner(&pair)?),
        Rule::ternary => {
            let mut parts = pair.clone().into_inner();
            let condition = expr(parts.next().ok_or_else(|| malformed(&pair))?)?;
            match (parts.next(), parts.next()) {
                (Some(then), Some(otherwise)) => Ok(Expr::Ternary(
                    Box::new(condition),
                    Box::new(expr(then)?),
                    Box::new(expr(otherwise)?),
                )),
                _ => Ok(condition),
            }
        }
        Rule::logic_or
        | Rule::logic_and
        | Rule::equality
        | Rule::comparison
        | Rule::additive
        | Rule::multiplicative => binary_chain(pair),
        Rule::unary => {
            let mut ops = Vec::new();
            let mut operand = None;
            for inner in pair.clone().into_inner() {
                match inner.as_rule() {
                    Rule::unary_op => ops.push(inner.as_str().to_string()),
                    _ => operand = Some(expr(inner)?),
                }
            }
            let mut result = operand.ok_or_else(|| malformed(&pair))?;
            for op in ops.iter().rev() {
                result = match op.as_str() {
                    "-" => Expr::Unary(UnaryOp::Neg, Box::new(result)),
                    "!" => Expr::Unary(UnaryOp::Not, Box::new(result)),
                    _ => result,
                };
            }
            Ok(result)
        }
        Rule::postfix => {
            let mut parts = pair.clone().into_inner();
            let mut result = expr(parts.next().ok_or_else(|| malformed(&pair))?)?;
            for index in parts {
                result = Expr::Index(Box::new(result), Box::new(expr(first_inner(&index)?)?));
            }
            Ok(result)
        }
        Rule::number => pair
            .as_str()
            .parse::<f64>()
            .map(Expr::Number)
            .map_err(|_| failure_at(&pair, "invalid number")),
        Rule::boolean => Ok(Expr::Bool(pair.as_str() == "true")),
        Rule::undef => Ok(Expr::Undef),
        Rule::string => Ok(Expr::Str(unescape(first_inner(&pair)?.as_str()))),
        Rule::call => {
            let mut parts = pair.clone().into_inner();
            let name = parts.next().ok_or_else(|| malformed(&pair))?;
            let arguments = match parts.next() {
                Some(args) => argument_list(args)?,
                None => Vec::new(),
            };
            Ok(Expr::Call(name.as_str().to_string(), arguments))
        }
        Rule::range => {
            let parts = pair
                .clone()
                .into_inner()
                .map(expr)
                .collect::<PipelineResult<Vec<_>>>()?;
            let mut parts = parts.into_iter();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(start), Some(end), None) => Ok(Expr::Range {
                    start: Box::new(start),
                    step: None,
                    end: Box::new(end),
                }),
                (Some(start), Some(step), Some(end)) => Ok(Expr::Range {
                    start: Box::new(start),
                    step: Some(Box::new(step)),
                    end: Box::new(end),
                }),
                _ => Err(malformed(&pair)),
            }
        }
        Rule::vector => Ok(Expr::Vector(
            pair.into_inner().map(expr).collect::<PipelineResult<Vec<_>>>()?,
        )),
        Rule::variable => Ok(Expr::Var(pair.as_str().to_string())),
        _ => Err(malformed(&pair)),
    }
}

/// Left-associative `operand (op operand)*`
fn binary_chain(pair: Pair<Rule>) -> PipelineResult<Expr> {
    let mut parts = pair.clone().into_inner();
    let mut result = expr(parts.next().ok_or_else(|| malformed(&pair))?)?;
    while let Some(op) = parts.next() {
        let rhs = parts.next().ok_or_else(|| malformed(&op))?;
        let op = match op.as_str() {
            "||" => BinaryOp::Or,
            "&&" => BinaryOp::And,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            _ => return Err(malformed(&op)),
        };
        result = Expr::Binary(op, Box::new(result), Box::new(expr(rhs)?));
    }
    Ok(result)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(text: &str) -> PipelineResult<Module> {
        ScadParser::new().parse(text, Path::new("."))
    }

    #[test]
    fn test_parse_simple_cube() {
        let module = parse("cube([10, 10, 10]);").unwrap();
        let body = module.body();
        assert_eq!(body.instantiations.len(), 1);
        assert_eq!(body.instantiations[0].name, "cube");
        assert_eq!(body.instantiations[0].arguments.len(), 1);
    }

    #[test]
    fn test_parse_nested_with_modifiers() {
        let module = parse(
            "difference() {\n  cube(10);\n  #translate([1, 2, 3]) sphere(r = 2, $fn = 16);\n}\n%cube(1);",
        )
        .unwrap();
        let body = module.body();
        assert_eq!(body.instantiations.len(), 2);
        assert!(body.instantiations[1].modifiers.background);

        let difference = &body.instantiations[0];
        assert_eq!(difference.children.instantiations.len(), 2);
        let translate = &difference.children.instantiations[1];
        assert!(translate.modifiers.highlight);
        let sphere = &translate.children.instantiations[0];
        assert_eq!(sphere.arguments[1].name.as_deref(), Some("$fn"));
    }

    #[test]
    fn test_parse_module_definition_and_assignments() {
        let module = parse(
            "// comment\nsize = 2 * 5;\nmodule pillar(h = 10) { cylinder(h = h, r = 1); children(); }\npillar(h = size) cube(1);",
        )
        .unwrap();
        let body = module.body();
        assert_eq!(body.assignments.len(), 1);
        assert_eq!(body.definitions.len(), 1);
        assert_eq!(body.definitions[0].parameters[0].name, "h");
        assert_eq!(body.instantiations[0].children.instantiations[0].name, "cube");
    }

    #[test]
    fn test_operator_precedence() {
        let e = parse_expression("1 + 2 * 3 == 7 ? -x[0] : !y").unwrap();
        assert_eq!(e.to_string(), "(((1 + (2 * 3)) == 7) ? -x[0] : !y)");
    }

    #[test]
    fn test_parse_error_reports_position() {
        let err = parse("cube(1);\ncube(2;\n").unwrap_err();
        let PipelineError::Parse(failure) = err else {
            panic!("expected parse failure");
        };
        assert_eq!(failure.line, 2);
        assert_eq!(failure.column, 7);
        assert_eq!(failure.position, 15);
    }

    #[test]
    fn test_include_and_use() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("shapes.scad"), "module peg() { cylinder(h = 2, r = 1); }\npeg();")?;
        fs::write(dir.path().join("params.scad"), "width = 4;\ncube(width);")?;

        let text = "use <shapes.scad>\ninclude <params.scad>\ninclude <missing.scad>\npeg();";
        let module = ScadParser::new().parse(text, dir.path())?;
        let body = module.body();
        // use imports definitions only, include splices everything
        assert_eq!(body.definitions.len(), 1);
        assert_eq!(body.assignments.len(), 1);
        assert_eq!(body.instantiations.len(), 2);
        assert_eq!(module.dependencies().len(), 3);
        Ok(())
    }

    #[test]
    fn test_library_path_and_include_cycle() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let lib = tempfile::tempdir()?;
        fs::write(lib.path().join("a.scad"), "include <b.scad>\ncube(1);")?;
        fs::write(lib.path().join("b.scad"), "include <a.scad>\ncube(2);")?;

        let parser = ScadParser::with_library_paths(vec![lib.path().to_path_buf()]);
        let module = parser.parse("include <a.scad>", dir.path())?;
        // a -> b -> a is cut at the repeated file
        assert_eq!(module.body().instantiations.len(), 2);
        assert_eq!(module.dependencies().len(), 2);
        Ok(())
    }

    #[test]
    fn test_command_line_definition() {
        let assignment = parse_definition("size = 2 * 3").unwrap();
        assert_eq!(assignment.name, "size");
        assert_eq!(assignment.value.to_string(), "(2 * 3)");
        assert_eq!(parse_definition("$fn=32").unwrap().name, "$fn");

        assert!(matches!(parse_definition("size"), Err(PipelineError::Parse(_))));
        assert!(matches!(parse_definition("2x=1"), Err(PipelineError::Parse(_))));
        assert!(matches!(parse_definition("size=1 +"), Err(PipelineError::Parse(_))));
    }

    #[test]
    fn test_string_escapes() {
        let e = parse_expression("\"a\\\"b\\n\"").unwrap();
        assert_eq!(e, Expr::Str("a\"b\n".into()));
    }
}
