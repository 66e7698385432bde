// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI subsystem for the preview pipeline

pub mod logger;
pub mod reporter;
pub mod runner;

pub use reporter::{CompileReport, ConsoleEvents, Reporter};
pub use runner::{CompileOptions, Runner};
