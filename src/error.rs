// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Pipeline error taxonomy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Position-tagged parse failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    /// Byte offset into the compiled text
    pub position: usize,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseFailure {
    pub fn new(position: usize, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}: {}", self.line, self.column, self.message)
    }
}

/// Errors surfaced by the compile pipeline.
///
/// None of these are fatal to the process: the coordinator reports them and
/// stays ready for the next compile request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Parser error in {0}")]
    Parse(ParseFailure),

    #[error("Compilation failed! (no top level object found)")]
    NoTopLevelObject,

    #[error("CSG generation cancelled.")]
    Cancelled,

    #[error("dependencies still changing after {checks} checks")]
    DependenciesStillChanging { checks: u32 },

    #[error("a render is already in progress")]
    WorkerBusy,

    #[error("geometry kernel failure: {0}")]
    Kernel(String),

    #[error("evaluation error: {0}")]
    Eval(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }

    /// Byte offset to highlight in the editor, if any
    pub fn error_position(&self) -> Option<usize> {
        match self {
            PipelineError::Parse(failure) => Some(failure.position),
            _ => None,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failure_carries_position() {
        let err = PipelineError::Parse(ParseFailure {
            position: 12,
            line: 2,
            column: 3,
            message: "expected `;`".into(),
        });
        assert_eq!(err.error_position(), Some(12));
        assert_eq!(err.to_string(), "Parser error in line 2, column 3: expected `;`");
        assert!(!err.is_cancelled());
    }
}
