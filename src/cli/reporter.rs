// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI output with colored formatting

use crate::cache::CacheStats;
use crate::csg::RenderChain;
use crate::pipeline::{CompiledChains, PipelineEvents};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;

/// Machine-readable summary of one compile
#[derive(Debug, Serialize)]
pub struct CompileReport {
    pub file: String,
    pub compiled_at: String,
    pub generation: u64,
    pub primary: usize,
    pub highlights: usize,
    pub background: usize,
    pub products: usize,
    pub preview_available: bool,
    pub normalization_aborted: bool,
    pub dependencies: Vec<PathBuf>,
    pub caches: Vec<CacheStats>,
}

impl CompileReport {
    pub fn new(file: &str, chains: &CompiledChains, dependencies: Vec<PathBuf>, caches: Vec<CacheStats>) -> Self {
        Self {
            file: file.to_string(),
            compiled_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            generation: chains.generation,
            primary: chains.primary.len(),
            highlights: chains.highlights.len(),
            background: chains.background.len(),
            products: chains.primary.products().len(),
            preview_available: chains.preview_available,
            normalization_aborted: chains.normalization_aborted,
            dependencies,
            caches,
        }
    }
}

/// CLI reporter for formatted output
pub struct Reporter;

impl Reporter {
    pub fn report_chains(file: &str, chains: &CompiledChains) {
        println!("\n{}", "━".repeat(60).bright_black());
        println!("{} {}", "File:".bold(), file.cyan());
        println!("{}", "━".repeat(60).bright_black());

        Self::print_chain("Primary", &chains.primary);
        Self::print_chain("Highlights", &chains.highlights);
        Self::print_chain("Background", &chains.background);

        if chains.preview_available {
            println!("{} {}", "✅".green(), "Preview available".green().bold());
        } else {
            println!(
                "{} {}",
                "⚠".yellow(),
                "Preview disabled, fallback draw path only".yellow().bold()
            );
        }
        if chains.normalization_aborted {
            println!("  {}", "Normalization stopped at the element budget".yellow());
        }
    }

    fn print_chain(name: &str, chain: &RenderChain) {
        println!(
            "  {:12} {:>6} entries in {:>4} products",
            format!("{}:", name),
            chain.len(),
            chain.products().len()
        );
    }

    pub fn report_cache_stats(stats: &[CacheStats]) {
        println!("\n{}", "Caches:".bold());
        for s in stats {
            println!("  {}", s.to_string().bright_black());
        }
    }

    pub fn report_error(message: &str) {
        eprintln!("{} {}", "❌".red(), message.red());
    }

    pub fn report_json(report: &CompileReport) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(report)?);
        Ok(())
    }
}

/// Pipeline events for the terminal: console lines already go through the
/// logger, so only progress is drawn here
#[derive(Default)]
pub struct ConsoleEvents {
    bar: Option<ProgressBar>,
}

impl ConsoleEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress_bar() -> Self {
        Self {
            bar: Some(progress_bar("CSG products")),
        }
    }
}

impl PipelineEvents for ConsoleEvents {
    fn highlight_error(&mut self, position: usize) {
        eprintln!("{} {}", "at byte".bright_black(), position.to_string().red());
    }

    fn progress(&mut self, permille: u32) {
        if let Some(bar) = &self.bar {
            bar.set_position(u64::from(permille));
            if permille >= 1000 {
                bar.finish_and_clear();
            }
        }
    }
}

/// Permille progress bar
pub fn progress_bar(label: &str) -> ProgressBar {
    let bar = ProgressBar::new(1000);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {percent}%")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    bar.set_message(label.to_string());
    bar
}
