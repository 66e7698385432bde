// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Compile coordinator
//!
//! Drives one document through the compile state machine:
//!
//! ```text
//! Idle -> Checking -> Recompiling -> WaitingOnDependencies -> Done(changed)
//!            |             |                  ^     |
//!            |             +-> Done(changed)  +-----+ (dependency changed)
//!            +-> Done(unchanged) -> Idle
//! ```
//!
//! A failed parse or instantiation passes through `Failed`, which still
//! reports `Done` so the front-end unblocks, and returns to `Idle`.
//! Downstream work (evaluation, normalization and chain building) runs in
//! [`Coordinator::build_products`], replaces the three chains in one swap
//! and moves `Done(changed)` back to `Idle`.

use super::events::{Editor, PipelineEvents};
use super::lock::{CompileGuard, CompileLock};
use super::worker::{RenderJob, RenderOutcome, RenderWorker};
use crate::ast::{Assignment, Context, Module, Value};
use crate::cache::{SharedCaches, TessellationCache};
use crate::config::PipelineConfig;
use crate::csg::{RenderChain, TermEvaluator, TermFlags, TermNormalizer, TermRef};
use crate::dependencies::DependencyTracker;
use crate::error::{PipelineError, PipelineResult};
use crate::geometry::{BooleanOp, GeometryKernel, MeshKernel, MeshSolidKernel, SolidKernel};
use crate::io::{document_dir, read_document, ScadParser, SourceParser};
use crate::progress::CancelToken;
use crate::tree::{instantiate, SceneTree};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompileState {
    Idle,
    Checking,
    Recompiling,
    WaitingOnDependencies,
    Done { changed: bool },
    Failed,
}

/// Result of one pass through the state machine
#[derive(Debug)]
pub struct CompileOutcome {
    /// A new tree was instantiated
    pub changed: bool,
    /// Parse or instantiation failure; downstream work must be skipped
    pub error: Option<PipelineError>,
    /// False when the dependency cascade hit its cap while files were still
    /// changing
    pub dependencies_settled: bool,
    pub dependency_checks: u32,
    /// The top-level file changed on disk but the editor kept its unsaved
    /// edits; auto-reload should be switched off
    pub reload_declined: bool,
}

impl CompileOutcome {
    fn unchanged() -> Self {
        Self {
            changed: false,
            error: None,
            dependencies_settled: true,
            dependency_checks: 0,
            reload_declined: false,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Whether evaluation and chain building should follow
    pub fn should_build(&self) -> bool {
        self.changed && self.error.is_none()
    }
}

#[derive(Debug)]
pub enum CompileStep {
    Done(CompileOutcome),
    /// Call [`Coordinator::resume_dependencies`] after `retry_after`
    WaitingOnDependencies { retry_after: Duration },
}

/// The three chains of one compile generation
#[derive(Debug, Clone, Default)]
pub struct CompiledChains {
    pub primary: RenderChain,
    pub highlights: RenderChain,
    pub background: RenderChain,
    /// False when the primary chain exceeds the preview element limit; the
    /// chain is still populated for the fallback draw path
    pub preview_available: bool,
    /// Normalization stopped at the element budget
    pub normalization_aborted: bool,
    pub generation: u64,
}

impl CompiledChains {
    /// The "CSG products dump"
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (name, chain) in [
            ("primary", &self.primary),
            ("highlights", &self.highlights),
            ("background", &self.background),
        ] {
            if chain.is_empty() {
                continue;
            }
            out.push_str(&format!("{} ({} entries):\n", name, chain.len()));
            out.push_str(&chain.dump());
        }
        out
    }
}

pub struct Coordinator {
    config: PipelineConfig,
    caches: Arc<SharedCaches>,
    parser: Box<dyn SourceParser>,
    kernel: Arc<dyn GeometryKernel>,
    solid_kernel: Arc<dyn SolidKernel>,
    tracker: DependencyTracker,
    base_path: PathBuf,
    module: Option<Arc<Module>>,
    tree: Option<Arc<SceneTree>>,
    chains: Option<Arc<CompiledChains>>,
    last_compiled_text: String,
    reload_declined: bool,
    /// Top-level bindings below the document, e.g. `$t` or the viewport
    variables: Vec<(String, Value)>,
    /// Command-line definitions, evaluated after the document's assignments
    overrides: Vec<Assignment>,
    last_error_position: Option<usize>,
    state: CompileState,
    lock: CompileLock,
    compile_guard: Option<CompileGuard>,
    cancel: CancelToken,
    generation: u64,
    dependency_checks: u32,
    worker: RenderWorker,
}

impl Coordinator {
    /// Coordinator with the reference parser and kernels, sharing `caches`
    /// with every other open document
    pub fn new(config: PipelineConfig, caches: Arc<SharedCaches>) -> Self {
        let tessellation = Arc::new(TessellationCache::new());
        caches.register_auxiliary(tessellation.clone());
        Self {
            parser: Box::new(ScadParser::with_library_paths(config.library_paths.clone())),
            kernel: Arc::new(MeshKernel::new(tessellation.clone())),
            solid_kernel: Arc::new(MeshSolidKernel::new(tessellation)),
            config,
            caches,
            tracker: DependencyTracker::new(),
            base_path: PathBuf::from("."),
            module: None,
            tree: None,
            chains: None,
            last_compiled_text: String::new(),
            reload_declined: false,
            variables: Vec::new(),
            overrides: Vec::new(),
            last_error_position: None,
            state: CompileState::Idle,
            lock: CompileLock::new(),
            compile_guard: None,
            cancel: CancelToken::new(),
            generation: 0,
            dependency_checks: 0,
            worker: RenderWorker::new(),
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn SourceParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_kernels(mut self, kernel: Arc<dyn GeometryKernel>, solid_kernel: Arc<dyn SolidKernel>) -> Self {
        self.kernel = kernel;
        self.solid_kernel = solid_kernel;
        self
    }

    /// Associate the document with a file; `None` for an unsaved buffer
    pub fn set_document_path(&mut self, path: Option<PathBuf>) {
        self.base_path = path
            .as_deref()
            .map_or_else(|| PathBuf::from("."), |p| document_dir(p).to_path_buf());
        self.tracker.set_top_level(path);
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.tracker.top_level()
    }

    /// Bind a top-level variable for the next instantiation; the document's
    /// own assignments shadow it
    pub fn set_variable(&mut self, name: &str, value: Value) {
        match self.variables.iter_mut().find(|(n, _)| n.as_str() == name) {
            Some((_, slot)) => *slot = value,
            None => self.variables.push((name.to_string(), value)),
        }
    }

    /// Add a definition applied after the document's assignments at the next
    /// parse, overriding any of the same name
    pub fn define(&mut self, assignment: Assignment) {
        self.overrides.push(assignment);
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Adopt new settings; cache budgets apply immediately
    pub fn apply_config(&mut self, config: PipelineConfig) {
        self.caches.apply_config(&config);
        self.config = config;
    }

    pub fn caches(&self) -> &Arc<SharedCaches> {
        &self.caches
    }

    pub fn state(&self) -> CompileState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn module(&self) -> Option<&Arc<Module>> {
        self.module.as_ref()
    }

    pub fn tree(&self) -> Option<&Arc<SceneTree>> {
        self.tree.as_ref()
    }

    /// Chains of the last completed build
    pub fn chains(&self) -> Option<&Arc<CompiledChains>> {
        self.chains.as_ref()
    }

    pub fn dependency_tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    pub fn lock(&self) -> &CompileLock {
        &self.lock
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// Token that aborts the running evaluation at its next checkpoint
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run Checking and, when needed, Recompiling.
    ///
    /// With `reload` the top-level file is compared against disk and only
    /// recompiled when it (or an include) changed; without it the editor
    /// text is always recompiled.
    pub fn compile(
        &mut self,
        reload: bool,
        editor: &mut dyn Editor,
        events: &mut dyn PipelineEvents,
    ) -> CompileStep {
        self.compile_with(reload, false, editor, events)
    }

    /// Compile, sleeping through any dependency cascade
    pub fn compile_blocking(
        &mut self,
        reload: bool,
        editor: &mut dyn Editor,
        events: &mut dyn PipelineEvents,
    ) -> CompileOutcome {
        let mut step = self.compile(reload, editor, events);
        loop {
            match step {
                CompileStep::Done(outcome) => return outcome,
                CompileStep::WaitingOnDependencies { retry_after } => {
                    std::thread::sleep(retry_after);
                    step = self.resume_dependencies(editor, events);
                }
            }
        }
    }

    /// One cascade check: re-resolve dependency fingerprints and either keep
    /// waiting or re-run Checking and finish.
    pub fn resume_dependencies(
        &mut self,
        editor: &mut dyn Editor,
        events: &mut dyn PipelineEvents,
    ) -> CompileStep {
        if self.state != CompileState::WaitingOnDependencies {
            return CompileStep::Done(CompileOutcome::unchanged());
        }
        self.dependency_checks += 1;
        let changed = self.tracker.refresh();
        if changed.is_empty() {
            // the top-level file or its includes may have moved meanwhile
            return self.compile_with(true, true, editor, events);
        }

        debug!(
            "{} dependencies changed during reload (check {})",
            changed.len(),
            self.dependency_checks
        );
        if self.dependency_checks >= self.config.max_dependency_checks {
            let diagnostic = PipelineError::DependenciesStillChanging {
                checks: self.dependency_checks,
            };
            report_warning(events, &diagnostic.to_string());
            let mut outcome = self.finish(true, false, events);
            outcome.dependencies_settled = false;
            return CompileStep::Done(outcome);
        }
        CompileStep::WaitingOnDependencies {
            retry_after: self.config.settle_delay,
        }
    }

    fn compile_with(
        &mut self,
        reload: bool,
        force_done: bool,
        editor: &mut dyn Editor,
        events: &mut dyn PipelineEvents,
    ) -> CompileStep {
        if self.state != CompileState::WaitingOnDependencies {
            self.dependency_checks = 0;
            self.reload_declined = false;
        }
        if self.compile_guard.is_none() {
            self.compile_guard = Some(self.lock.acquire());
        }
        self.state = CompileState::Checking;

        let mut should_compile = !reload;
        if reload {
            let changed_on_disk = self.tracker.top_level_changed();
            if changed_on_disk && allows_reload(editor) {
                should_compile = self.reload_document(editor, events);
            } else {
                if changed_on_disk {
                    self.reload_declined = true;
                    report_warning(events, "Document changed on disk; keeping unsaved edits");
                }
                // text that was never compiled still needs a first compile
                should_compile =
                    self.last_compiled_text.is_empty() && editor.text() != self.last_compiled_text;
            }
        }
        if self.module.as_ref().is_some_and(|m| m.includes_changed()) {
            should_compile = true;
        }

        let mut did_compile = false;
        if should_compile {
            self.state = CompileState::Recompiling;
            events.renderer_invalidated();
            if editor.is_content_modified() {
                editor.save_backup();
            }
            if let Err(error) = self.parse_document(editor, events) {
                return CompileStep::Done(self.fail_parse(error, events));
            }
            did_compile = true;
        }

        if reload && did_compile && self.module.as_ref().is_some_and(|m| m.has_dependencies()) {
            self.state = CompileState::WaitingOnDependencies;
            return CompileStep::WaitingOnDependencies {
                retry_after: self.config.settle_delay,
            };
        }
        CompileStep::Done(self.finish(did_compile || force_done, did_compile, events))
    }

    fn reload_document(&mut self, editor: &mut dyn Editor, events: &mut dyn PipelineEvents) -> bool {
        let Some(path) = self.tracker.top_level().map(Path::to_path_buf) else {
            return false;
        };
        match read_document(&path) {
            Ok(text) => {
                editor.set_text(text);
                say(events, &format!("Reloaded {}", path.display()));
                true
            }
            Err(e) => {
                report_warning(events, &e.to_string());
                false
            }
        }
    }

    fn parse_document(&mut self, editor: &mut dyn Editor, events: &mut dyn PipelineEvents) -> PipelineResult<()> {
        let text = editor.text();
        say(events, "Parsing design (AST generation)...");
        let result = self
            .parser
            .parse(&text, &self.base_path)
            .map(|module| module.with_overrides(&self.overrides));
        self.last_compiled_text = text;

        let position = result.as_ref().err().and_then(PipelineError::error_position);
        if position != self.last_error_position {
            if self.last_error_position.is_some() {
                events.clear_error_highlight();
            }
            if let Some(position) = position {
                events.highlight_error(position);
            }
            self.last_error_position = position;
        }

        let module = result?;
        self.tracker.track(module.dependencies());
        self.module = Some(Arc::new(module));
        Ok(())
    }

    /// The previous module, tree and chains stay in place
    fn fail_parse(&mut self, error: PipelineError, events: &mut dyn PipelineEvents) -> CompileOutcome {
        report_error(events, &error.to_string());
        say(events, "Compilation failed!");
        self.state = CompileState::Failed;
        let outcome = CompileOutcome {
            changed: false,
            error: Some(error),
            dependencies_settled: true,
            dependency_checks: self.dependency_checks,
            reload_declined: self.reload_declined,
        };
        self.release();
        outcome
    }

    fn finish(&mut self, changed: bool, invalidated: bool, events: &mut dyn PipelineEvents) -> CompileOutcome {
        let mut outcome = CompileOutcome {
            changed,
            error: None,
            dependencies_settled: true,
            dependency_checks: self.dependency_checks,
            reload_declined: self.reload_declined,
        };
        self.state = CompileState::Done { changed };
        if changed {
            if !invalidated {
                events.renderer_invalidated();
            }
            if let Err(error) = self.instantiate_root(events) {
                self.state = CompileState::Failed;
                outcome.error = Some(error);
            }
        }
        self.release();
        outcome
    }

    /// Drop the compile guard; only `Done(changed)` waits for downstream
    /// work before returning to `Idle`
    fn release(&mut self) {
        self.compile_guard = None;
        self.dependency_checks = 0;
        self.reload_declined = false;
        if self.state != (CompileState::Done { changed: true }) {
            self.state = CompileState::Idle;
        }
    }

    fn return_to_idle(&mut self) {
        if self.state == (CompileState::Done { changed: true }) {
            self.state = CompileState::Idle;
        }
    }

    fn instantiate_root(&mut self, events: &mut dyn PipelineEvents) -> PipelineResult<()> {
        say(events, "Compiling design (CSG Tree generation)...");
        let result = match &self.module {
            Some(module) => {
                let mut top = Context::global();
                for (name, value) in &self.variables {
                    top.set_variable(name, value.clone());
                }
                instantiate(module, &top)
            }
            None => Err(PipelineError::NoTopLevelObject),
        };
        match result {
            Ok(tree) => {
                self.generation += 1;
                self.tree = Some(Arc::new(tree));
                Ok(())
            }
            Err(error) => {
                self.tree = None;
                self.chains = None;
                if !matches!(error, PipelineError::NoTopLevelObject) {
                    report_error(events, &error.to_string());
                }
                report_error(events, &PipelineError::NoTopLevelObject.to_string());
                Err(error)
            }
        }
    }

    /// Evaluate, normalize and flatten the current tree.
    ///
    /// On success the three chains are swapped in together. A cancelled or
    /// failed build leaves the previous chains in place.
    pub fn build_products(&mut self, events: &mut dyn PipelineEvents) -> PipelineResult<Arc<CompiledChains>> {
        let result = self.build_products_inner(events);
        self.cancel.reset();
        self.return_to_idle();
        if let Err(PipelineError::Cancelled) = &result {
            say(events, "CSG generation cancelled.");
        }
        result
    }

    fn build_products_inner(&mut self, events: &mut dyn PipelineEvents) -> PipelineResult<Arc<CompiledChains>> {
        let tree = self.tree.clone().ok_or(PipelineError::NoTopLevelObject)?;
        let _guard = self.lock.acquire();
        let started = Instant::now();

        say(events, "Compiling design (CSG Products generation)...");
        let terms = {
            let evaluator = TermEvaluator::new(&tree, self.kernel.as_ref(), self.caches.preview(), &self.cancel);
            let mut sink = |permille: u32| events.progress(permille);
            evaluator.evaluate(&mut sink)?
        };
        self.caches.log_stats();

        say(events, "Compiling design (CSG Products normalization)...");
        let normalizer = TermNormalizer::new(self.config.normalizer_budget());
        let mut aborted = false;

        let mut primary = RenderChain::new();
        if let Some(term) = &terms.primary {
            match self.normalize(&normalizer, term, &mut aborted)? {
                Some(normalized) => primary.import(&normalized, BooleanOp::Union, TermFlags::default()),
                None => report_warning(events, "CSG normalization resulted in an empty tree"),
            }
        }

        let mut highlights = RenderChain::new();
        if !terms.highlights.is_empty() {
            say(
                events,
                &format!("Compiling highlights ({} CSG Trees)...", terms.highlights.len()),
            );
            for term in &terms.highlights {
                if let Some(normalized) = self.normalize(&normalizer, term, &mut aborted)? {
                    highlights.import(&normalized, BooleanOp::Union, TermFlags::HIGHLIGHT);
                }
            }
        }

        let mut background = RenderChain::new();
        if !terms.backgrounds.is_empty() {
            say(
                events,
                &format!("Compiling background ({} CSG Trees)...", terms.backgrounds.len()),
            );
            for term in &terms.backgrounds {
                if let Some(normalized) = self.normalize(&normalizer, term, &mut aborted)? {
                    background.import(&normalized, BooleanOp::Union, TermFlags::BACKGROUND);
                }
            }
        }

        let preview_available = primary.len() <= self.config.preview_element_limit;
        if preview_available {
            say(events, &format!("Normalized CSG tree has {} elements", primary.len()));
        } else {
            report_warning(events, &format!("Normalized tree has {} elements!", primary.len()));
            report_warning(events, "Preview rendering has been disabled.");
        }

        let chains = Arc::new(CompiledChains {
            primary,
            highlights,
            background,
            preview_available,
            normalization_aborted: aborted,
            generation: self.generation,
        });
        self.chains = Some(chains.clone());
        say(
            events,
            &format!(
                "Compile and preview finished. Total rendering time: {:.3}s",
                started.elapsed().as_secs_f64()
            ),
        );
        Ok(chains)
    }

    fn normalize(
        &self,
        normalizer: &TermNormalizer,
        term: &TermRef,
        aborted: &mut bool,
    ) -> PipelineResult<Option<TermRef>> {
        let normalized = normalizer.normalize(term, &self.cancel)?;
        *aborted |= normalized.aborted;
        Ok(normalized.term)
    }

    /// Compile the editor text and build its chains
    pub fn preview(
        &mut self,
        editor: &mut dyn Editor,
        events: &mut dyn PipelineEvents,
    ) -> PipelineResult<Arc<CompiledChains>> {
        let outcome = self.compile_blocking(false, editor, events);
        if let Some(error) = outcome.error {
            return Err(error);
        }
        self.build_products(events)
    }

    /// Start the exact render of the current tree on the worker thread
    pub fn render(&mut self, events: &mut dyn PipelineEvents) -> PipelineResult<()> {
        let tree = self.tree.clone().ok_or(PipelineError::NoTopLevelObject)?;
        if self.worker.is_busy() {
            return Err(PipelineError::WorkerBusy);
        }
        self.return_to_idle();
        say(events, "Rendering Polygon Mesh using the exact kernel...");
        let job = RenderJob {
            tree,
            kernel: self.solid_kernel.clone(),
            caches: self.caches.clone(),
            cancel: self.cancel.clone(),
            generation: self.generation,
        };
        self.worker.start(job, self.lock.acquire())
    }

    pub fn is_rendering(&self) -> bool {
        self.worker.is_busy()
    }

    /// Permille of the running exact render
    pub fn render_progress(&self) -> u32 {
        self.worker.progress()
    }

    /// Collect a finished render without blocking
    pub fn poll_render(&mut self, events: &mut dyn PipelineEvents) -> Option<PipelineResult<RenderOutcome>> {
        let result = self.worker.try_finish()?;
        Some(self.render_finished(result, events))
    }

    /// Block until the running render finishes
    pub fn wait_render(&mut self, events: &mut dyn PipelineEvents) -> Option<PipelineResult<RenderOutcome>> {
        let result = self.worker.wait()?;
        Some(self.render_finished(result, events))
    }

    fn render_finished(
        &mut self,
        result: PipelineResult<RenderOutcome>,
        events: &mut dyn PipelineEvents,
    ) -> PipelineResult<RenderOutcome> {
        self.cancel.reset();
        match &result {
            Ok(outcome) => match &outcome.geometry {
                Some(geometry) => {
                    say(events, "Rendering finished.");
                    for line in geometry.summary() {
                        say(events, &line);
                    }
                    say(
                        events,
                        &format!("Total rendering time: {:.3}s", outcome.elapsed.as_secs_f64()),
                    );
                }
                None => report_warning(events, "No top level geometry to render"),
            },
            Err(PipelineError::Cancelled) => say(events, "Rendering cancelled."),
            Err(e) => report_error(events, &e.to_string()),
        }
        self.caches.log_stats();
        result
    }

    /// Clear both geometry caches and every auxiliary cache
    pub fn flush_caches(&self) {
        self.caches.flush();
    }
}

fn allows_reload(editor: &mut dyn Editor) -> bool {
    !editor.is_content_modified() || editor.confirm_reload()
}

fn say(events: &mut dyn PipelineEvents, message: &str) {
    info!("{}", message);
    events.output(message);
}

fn report_warning(events: &mut dyn PipelineEvents, message: &str) {
    warn!("{}", message);
    events.output(&format!("WARNING: {}", message));
}

fn report_error(events: &mut dyn PipelineEvents, message: &str) {
    error!("{}", message);
    events.output(&format!("ERROR: {}", message));
}
