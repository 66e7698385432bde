// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Command runner driving a coordinator for one document

use super::reporter::{progress_bar, CompileReport, ConsoleEvents, Reporter};
use crate::cache::SharedCaches;
use crate::config::PipelineConfig;
use crate::io::{parse_definition, read_document};
use crate::pipeline::{AutoReloadScheduler, CompiledChains, Coordinator, Document, TickResult};
use anyhow::{bail, Context, Result};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Options of the `compile` command
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub dump_tree: bool,
    pub dump_products: bool,
    pub json: bool,
}

pub struct Runner {
    coordinator: Coordinator,
    document: Document,
    path: PathBuf,
}

impl Runner {
    pub fn open(path: &Path, config: PipelineConfig) -> Result<Self> {
        let text = read_document(path)?;
        let caches = Arc::new(SharedCaches::from_config(&config));
        let mut coordinator = Coordinator::new(config, caches);
        coordinator.set_document_path(Some(path.to_path_buf()));
        Ok(Self {
            coordinator,
            document: Document::new(text),
            path: path.to_path_buf(),
        })
    }

    /// Apply `name=value` definitions from the command line
    pub fn with_definitions(mut self, definitions: &[String]) -> Result<Self> {
        for definition in definitions {
            let assignment =
                parse_definition(definition).with_context(|| format!("Invalid definition '{}'", definition))?;
            self.coordinator.define(assignment);
        }
        Ok(self)
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    fn display_name(&self) -> String {
        self.path.display().to_string()
    }

    /// Compile the file and build its chains
    pub fn compile(&mut self, options: &CompileOptions) -> Result<Arc<CompiledChains>> {
        let mut events = ConsoleEvents::with_progress_bar();
        let outcome = self.coordinator.compile_blocking(true, &mut self.document, &mut events);
        if let Some(error) = outcome.error {
            bail!("{}", error);
        }
        let chains = self
            .coordinator
            .build_products(&mut events)
            .with_context(|| format!("Failed to build products for {}", self.display_name()))?;

        if options.dump_tree {
            if let Some(tree) = self.coordinator.tree() {
                println!("{}", tree.dump());
            }
        }
        if options.dump_products {
            print!("{}", chains.dump());
        }
        if options.json {
            let report = CompileReport::new(
                &self.display_name(),
                &chains,
                self.dependencies(),
                self.coordinator.caches().stats(),
            );
            Reporter::report_json(&report)?;
        } else {
            Reporter::report_chains(&self.display_name(), &chains);
        }
        Ok(chains)
    }

    fn dependencies(&self) -> Vec<PathBuf> {
        self.coordinator
            .module()
            .map(|m| m.dependencies().to_vec())
            .unwrap_or_default()
    }

    /// Exact render on the worker thread, with a progress bar
    pub fn render(&mut self) -> Result<()> {
        let mut events = ConsoleEvents::new();
        let outcome = self.coordinator.compile_blocking(true, &mut self.document, &mut events);
        if let Some(error) = outcome.error {
            bail!("{}", error);
        }
        self.coordinator.render(&mut events)?;

        let bar = progress_bar("Rendering");
        let result = loop {
            bar.set_position(u64::from(self.coordinator.render_progress()));
            if let Some(result) = self.coordinator.poll_render(&mut events) {
                break result;
            }
            thread::sleep(Duration::from_millis(50));
        };
        bar.finish_and_clear();

        let outcome = result?;
        if outcome.geometry.is_none() {
            bail!("{} rendered to nothing", self.display_name());
        }
        Reporter::report_cache_stats(&self.coordinator.caches().stats());
        Ok(())
    }

    /// Auto-reload loop; returns after `max_polls` scheduler ticks that did
    /// work, or never when `None`
    pub fn watch(&mut self, max_polls: Option<usize>) -> Result<()> {
        let mut events = ConsoleEvents::new();
        let mut scheduler = AutoReloadScheduler::from_config(self.coordinator.config());
        println!(
            "{} {} {}",
            "Watching".bold(),
            self.display_name().cyan(),
            "(Ctrl-C to stop)".bright_black()
        );

        // first compile right away, then poll
        let now = Instant::now();
        scheduler.enable(now);
        scheduler.poll_at(now);

        let mut polls = 0;
        while max_polls.map_or(true, |max| polls < max) {
            let Some(deadline) = scheduler.next_deadline() else {
                println!("{}", "Auto-reload stopped".yellow());
                break;
            };
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
            let result = scheduler.tick(Instant::now(), &mut self.coordinator, &mut self.document, &mut events);
            if !matches!(result, TickResult::Idle) {
                polls += 1;
            }
            self.report_tick(result);
        }
        Ok(())
    }

    fn report_tick(&self, result: TickResult) {
        if let TickResult::Compiled {
            products: Some(products),
            ..
        } = result
        {
            match products {
                Ok(chains) => Reporter::report_chains(&self.display_name(), &chains),
                Err(e) => Reporter::report_error(&e.to_string()),
            }
        }
    }
}
