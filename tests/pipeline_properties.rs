// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! End-to-end properties of the compile pipeline

use polyframe_preview::cache::GeometryCache;
use polyframe_preview::csg::ColorMode;
use polyframe_preview::geometry::{GeometryKernel, MeshKernel, MeshSolidKernel, Primitive};
use polyframe_preview::pipeline::{Coordinator, Document, NoEvents, RecordedEvents};
use polyframe_preview::{CancelToken, Geometry, PipelineConfig, PipelineError, PipelineResult, SharedCaches};
use nalgebra::Vector3;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Preview kernel counting primitive computations; optionally cancels a
/// token right after its n-th computation
struct CountingKernel {
    inner: MeshKernel,
    calls: AtomicUsize,
    cancel_at: Option<(usize, CancelToken)>,
}

impl CountingKernel {
    fn new(cancel_at: Option<(usize, CancelToken)>) -> Self {
        Self {
            inner: MeshKernel::default(),
            calls: AtomicUsize::new(0),
            cancel_at,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GeometryKernel for CountingKernel {
    fn name(&self) -> &str {
        "counting"
    }

    fn primitive(&self, primitive: &Primitive, cancel: &CancelToken) -> PipelineResult<Geometry> {
        let geometry = self.inner.primitive(primitive, cancel)?;
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, token)) = &self.cancel_at {
            if calls == *at {
                token.cancel();
            }
        }
        Ok(geometry)
    }
}

fn coordinator_with(config: PipelineConfig) -> Coordinator {
    Coordinator::new(config, Arc::new(SharedCaches::default()))
}

fn coordinator() -> Coordinator {
    coordinator_with(PipelineConfig::default())
}

const SCENE: &str = "
difference() {
    cube(10, center = true);
    sphere(6);
    #cylinder(h = 20, r = 2, center = true);
}
intersection() {
    translate([20, 0, 0]) cube(8);
    translate([24, 0, 0]) sphere(5);
}
%translate([0, 20, 0]) cube(3);
";

#[test]
fn test_compiling_twice_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let lib = dir.path().join("parts.scad");
    let main = dir.path().join("main.scad");
    fs::write(&lib, "module peg() { cylinder(h = 4, r = 1); }")?;
    fs::write(&main, format!("use <parts.scad>\npeg();\n{}", SCENE))?;

    let mut c = coordinator();
    c.set_document_path(Some(main.clone()));
    let mut doc = Document::new(fs::read_to_string(&main)?);

    let first = c.preview(&mut doc, &mut NoEvents)?;
    let recorded = c.dependency_tracker().recorded(&lib);
    assert!(recorded.is_some());

    let second = c.preview(&mut doc, &mut NoEvents)?;
    assert_eq!(first.primary.dump(), second.primary.dump());
    assert_eq!(first.highlights.dump(), second.highlights.dump());
    assert_eq!(first.background.dump(), second.background.dump());
    assert_eq!(c.dependency_tracker().recorded(&lib), recorded);
    Ok(())
}

#[test]
fn test_root_modifier_selects_subtree() {
    let mut c = coordinator();
    let mut doc = Document::new("!cube(5);\nsphere(5);");
    let chains = c.preview(&mut doc, &mut NoEvents).unwrap();
    assert_eq!(chains.primary.len(), 1);
    assert!(chains.primary.entries()[0].label.starts_with("cube("));
    assert!(chains.background.is_empty());
}

#[test]
fn test_background_is_separated_from_primary() {
    let mut c = coordinator();
    let mut doc = Document::new("cube(10);\n%sphere(3);");
    let chains = c.preview(&mut doc, &mut NoEvents).unwrap();
    assert_eq!(chains.primary.len(), 1);
    assert_eq!(chains.background.len(), 1);
    assert!(chains.primary.entries()[0].label.starts_with("cube("));
    assert!(chains.background.entries()[0].label.starts_with("sphere("));
    assert_eq!(chains.background.entries()[0].mode, ColorMode::Background);
}

#[test]
fn test_element_limit_disables_preview_only() {
    let config = PipelineConfig {
        preview_element_limit: 100,
        ..PipelineConfig::default()
    };
    let mut c = coordinator_with(config);
    let source: String = (0..150)
        .map(|i| format!("translate([{}, 0, 0]) cube(1);\n", i * 2))
        .collect();
    let mut doc = Document::new(source);
    let mut events = RecordedEvents::new();

    let chains = c.preview(&mut doc, &mut events).unwrap();
    assert!(!chains.preview_available);
    assert_eq!(chains.primary.len(), 150);
    assert_eq!(chains.primary.products().len(), 150);
    assert!(events.contains("Normalized tree has 150 elements!"));
}

#[test]
fn test_cache_hits_skip_computation() {
    let cache: GeometryCache<Geometry> = GeometryCache::new("test", 1 << 24);
    let calls = AtomicUsize::new(0);
    let compute = || -> PipelineResult<Geometry> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Geometry::Mesh(Primitive::cube(Vector3::new(2.0, 2.0, 2.0), false).to_mesh()))
    };
    let a = cache.get_or_compute("cube(size = [2, 2, 2], center = false);", compute).unwrap();
    let b = cache.get_or_compute("cube(size = [2, 2, 2], center = false);", compute).unwrap();
    assert_eq!(*a, *b);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // through the pipeline: equal leaves are computed once across compiles
    let kernel = Arc::new(CountingKernel::new(None));
    let mut c = coordinator().with_kernels(kernel.clone(), Arc::new(MeshSolidKernel::default()));
    let mut doc = Document::new("cube(1);\ntranslate([5, 0, 0]) cube(1);\nsphere(2);");
    c.preview(&mut doc, &mut NoEvents).unwrap();
    assert_eq!(kernel.calls(), 2);
    c.preview(&mut doc, &mut NoEvents).unwrap();
    assert_eq!(kernel.calls(), 2);
    assert_eq!(c.caches().preview().stats().hits, 4);
}

#[test]
fn test_cancellation_is_safe_and_recoverable() {
    let source = "cube(1);\nsphere(2);\ncylinder(h = 3, r = 1);\ntranslate([1, 0, 0]) cube(2);";

    let mut reference = coordinator();
    let expected = reference
        .preview(&mut Document::new(source), &mut NoEvents)
        .unwrap();

    let mut c = coordinator();
    let kernel = Arc::new(CountingKernel::new(Some((2, c.cancel_token()))));
    let mut c = c.with_kernels(kernel.clone(), Arc::new(MeshSolidKernel::default()));
    let mut doc = Document::new(source);
    let mut events = RecordedEvents::new();

    let cancelled = c.preview(&mut doc, &mut events);
    assert!(matches!(cancelled, Err(PipelineError::Cancelled)));
    assert!(c.chains().is_none());
    assert_eq!(c.caches().preview().len(), 2);
    assert!(events.contains("CSG generation cancelled."));

    let chains = c.preview(&mut doc, &mut events).unwrap();
    assert_eq!(chains.primary.dump(), expected.primary.dump());
    // the two leaves cached before cancelling were reused
    assert_eq!(kernel.calls(), 4);
}
