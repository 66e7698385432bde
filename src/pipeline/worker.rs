// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Background exact render
//!
//! One render may be outstanding at a time. The worker thread evaluates the
//! effective root through the exact kernel and the exact cache, fanning
//! sibling subtrees out over rayon, and sends back a single result.

use super::lock::CompileGuard;
use crate::cache::{GeometryCache, SharedCaches};
use crate::error::{PipelineError, PipelineResult};
use crate::geometry::{BooleanOp, Geometry, SolidKernel};
use crate::progress::CancelToken;
use crate::tree::{NodeIndex, NodeKind, SceneTree};
use log::debug;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Everything a render needs, owned so it can cross to the worker thread
pub struct RenderJob {
    pub tree: Arc<SceneTree>,
    pub kernel: Arc<dyn SolidKernel>,
    pub caches: Arc<SharedCaches>,
    pub cancel: CancelToken,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// `None` when the design renders to nothing
    pub geometry: Option<Arc<Geometry>>,
    pub generation: u64,
    pub elapsed: Duration,
}

struct Pending {
    receiver: Receiver<PipelineResult<RenderOutcome>>,
    handle: JoinHandle<()>,
    _guard: CompileGuard,
}

#[derive(Default)]
pub struct RenderWorker {
    pending: Option<Pending>,
    progress: Arc<AtomicU32>,
}

impl RenderWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Permille of the running render
    pub fn progress(&self) -> u32 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Start a render; `guard` keeps the pipeline locked until the result
    /// is collected
    pub fn start(&mut self, job: RenderJob, guard: CompileGuard) -> PipelineResult<()> {
        if self.is_busy() {
            return Err(PipelineError::WorkerBusy);
        }
        let (sender, receiver) = mpsc::channel();
        let progress = self.progress.clone();
        progress.store(0, Ordering::Relaxed);

        let handle = thread::Builder::new()
            .name("polyframe-render".to_string())
            .spawn(move || {
                let started = Instant::now();
                let result = render(&job, &progress).map(|geometry| RenderOutcome {
                    geometry,
                    generation: job.generation,
                    elapsed: started.elapsed(),
                });
                // the receiver may already be gone
                let _ = sender.send(result);
            })
            .map_err(|e| PipelineError::Kernel(format!("failed to start render worker: {}", e)))?;

        self.pending = Some(Pending {
            receiver,
            handle,
            _guard: guard,
        });
        Ok(())
    }

    /// Collect the result if the render has finished
    pub fn try_finish(&mut self) -> Option<PipelineResult<RenderOutcome>> {
        let pending = self.pending.as_ref()?;
        let result = match pending.receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(worker_died()),
        };
        self.collect(result)
    }

    /// Block until the running render finishes
    pub fn wait(&mut self) -> Option<PipelineResult<RenderOutcome>> {
        let pending = self.pending.as_ref()?;
        let result = pending.receiver.recv().unwrap_or_else(|_| Err(worker_died()));
        self.collect(result)
    }

    fn collect(
        &mut self,
        result: PipelineResult<RenderOutcome>,
    ) -> Option<PipelineResult<RenderOutcome>> {
        let pending = self.pending.take()?;
        if pending.handle.join().is_err() {
            return Some(Err(worker_died()));
        }
        Some(result)
    }
}

fn worker_died() -> PipelineError {
    PipelineError::Kernel("render worker exited without a result".to_string())
}

fn render(job: &RenderJob, progress: &AtomicU32) -> PipelineResult<Option<Arc<Geometry>>> {
    let evaluator = ExactEvaluator {
        tree: &job.tree,
        kernel: job.kernel.as_ref(),
        cache: job.caches.exact(),
        cancel: &job.cancel,
        done: AtomicUsize::new(0),
        total: job.tree.total_index_count().max(1),
        progress,
    };
    let geometry = evaluator.node(job.tree.root())?;
    progress.store(1000, Ordering::Relaxed);
    debug!("{}", job.caches.exact().stats());
    Ok(geometry)
}

struct ExactEvaluator<'a> {
    tree: &'a SceneTree,
    kernel: &'a dyn SolidKernel,
    cache: &'a GeometryCache<Geometry>,
    cancel: &'a CancelToken,
    done: AtomicUsize,
    total: usize,
    progress: &'a AtomicU32,
}

impl ExactEvaluator<'_> {
    fn node(&self, index: NodeIndex) -> PipelineResult<Option<Arc<Geometry>>> {
        let node = self.tree.node(index);
        // background objects are preview-only
        if node.modifiers.disabled || node.modifiers.background {
            self.advance(node.subtree_len());
            return Ok(None);
        }
        self.cancel.check()?;

        let key = self.tree.key(index);
        if let Some(hit) = self.cache.get(key) {
            self.advance(node.subtree_len());
            return Ok(Some(hit));
        }

        let geometry = match &node.kind {
            NodeKind::Primitive(primitive) => Some(self.kernel.primitive(primitive, self.cancel)?),
            kind => {
                let children = node
                    .children
                    .par_iter()
                    .map(|&child| self.node(child))
                    .collect::<PipelineResult<Vec<_>>>()?;
                let operands: Vec<Arc<Geometry>> = children.into_iter().flatten().collect();
                match kind {
                    NodeKind::Transform(matrix) => self
                        .kernel
                        .combine(BooleanOp::Union, &operands, self.cancel)?
                        .map(|g| self.kernel.transform(&g, matrix))
                        .transpose()?,
                    kind => self.kernel.combine(kind.combine_op(), &operands, self.cancel)?,
                }
            }
        };
        self.advance(1);

        Ok(geometry
            .filter(|g| !g.is_empty())
            .map(|g| self.cache.insert(key, g)))
    }

    fn advance(&self, nodes: usize) {
        let done = self.done.fetch_add(nodes, Ordering::Relaxed) + nodes;
        let permille = ((done * 1000) / self.total).min(999) as u32;
        self.progress.fetch_max(permille, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Context;
    use crate::geometry::MeshSolidKernel;
    use crate::io::{ScadParser, SourceParser};
    use crate::pipeline::CompileLock;
    use crate::tree::instantiate;
    use std::path::Path;

    fn job(text: &str, caches: &Arc<SharedCaches>) -> RenderJob {
        let module = ScadParser::new().parse(text, Path::new(".")).unwrap();
        RenderJob {
            tree: Arc::new(instantiate(&module, &Context::global()).unwrap()),
            kernel: Arc::new(MeshSolidKernel::default()),
            caches: caches.clone(),
            cancel: CancelToken::new(),
            generation: 1,
        }
    }

    #[test]
    fn test_render_produces_solid_and_fills_exact_cache() {
        let caches = Arc::new(SharedCaches::default());
        let lock = CompileLock::new();
        let mut worker = RenderWorker::new();
        worker
            .start(job("cube(2);\ntranslate([5, 0, 0]) cube(1);\n%sphere(4);", &caches), lock.acquire())
            .unwrap();
        assert!(lock.is_locked());

        let outcome = worker.wait().unwrap().unwrap();
        let solid = outcome.geometry.unwrap();
        assert_eq!(solid.as_solid().unwrap().volumes, 2);
        assert_eq!(outcome.generation, 1);
        assert_eq!(worker.progress(), 1000);
        assert!(!worker.is_busy());
        assert!(!lock.is_locked());
        assert!(caches.exact().len() >= 3);
        assert!(caches.preview().is_empty());
    }

    #[test]
    fn test_second_start_while_busy_is_rejected() {
        let caches = Arc::new(SharedCaches::default());
        let lock = CompileLock::new();
        let mut worker = RenderWorker::new();
        worker.start(job("cube(1);", &caches), lock.acquire()).unwrap();
        let second = worker.start(job("cube(1);", &caches), lock.acquire());
        assert!(matches!(second, Err(PipelineError::WorkerBusy)));
        assert!(worker.wait().unwrap().is_ok());
        assert!(worker.wait().is_none());
    }

    #[test]
    fn test_cancelled_render_reports_cancellation() {
        let caches = Arc::new(SharedCaches::default());
        let job = job("cube(1); sphere(1);", &caches);
        job.cancel.cancel();
        let mut worker = RenderWorker::new();
        worker.start(job, CompileLock::new().acquire()).unwrap();
        assert!(matches!(worker.wait(), Some(Err(PipelineError::Cancelled))));
    }
}
