// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Auto-reload scheduling and dependency settling against real files

use polyframe_preview::pipeline::{
    AutoReloadScheduler, CompileState, Coordinator, Document, Editor, RecordedEvents, TickResult,
};
use polyframe_preview::{PipelineConfig, SharedCaches};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const INTERVAL: Duration = Duration::from_millis(200);
const SETTLE: Duration = Duration::from_millis(50);

fn config(max_dependency_checks: u32) -> PipelineConfig {
    PipelineConfig {
        auto_reload_interval: INTERVAL,
        settle_delay: SETTLE,
        max_dependency_checks,
        ..PipelineConfig::default()
    }
}

fn watched(path: &Path, config: PipelineConfig) -> (Coordinator, AutoReloadScheduler) {
    let scheduler = AutoReloadScheduler::from_config(&config);
    let mut coordinator = Coordinator::new(config, Arc::new(SharedCaches::default()));
    coordinator.set_document_path(Some(path.to_path_buf()));
    (coordinator, scheduler)
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn primary_len(result: &TickResult) -> Option<usize> {
    match result {
        TickResult::Compiled {
            products: Some(Ok(chains)),
            ..
        } => Some(chains.primary.len()),
        _ => None,
    }
}

#[test]
fn test_polls_reload_changed_document() {
    let dir = tempfile::tempdir().unwrap();
    let main = write(dir.path(), "main.scad", "cube(1);");
    let (mut c, mut scheduler) = watched(&main, config(10));
    let mut doc = Document::default();
    let mut events = RecordedEvents::new();

    let t0 = Instant::now();
    scheduler.enable(t0);
    assert_eq!(scheduler.next_deadline(), Some(t0 + INTERVAL));
    assert!(matches!(scheduler.tick(t0, &mut c, &mut doc, &mut events), TickResult::Idle));

    let t1 = t0 + INTERVAL;
    let result = scheduler.tick(t1, &mut c, &mut doc, &mut events);
    assert_eq!(primary_len(&result), Some(1));
    assert_eq!(doc.text(), "cube(1);");
    assert!(events.contains("Reloaded"));

    // unchanged on disk: the compile reports no change and builds nothing
    let t2 = t1 + INTERVAL;
    match scheduler.tick(t2, &mut c, &mut doc, &mut events) {
        TickResult::Compiled { outcome, products } => {
            assert!(!outcome.changed);
            assert!(products.is_none());
        }
        other => panic!("unexpected tick result: {:?}", other),
    }

    write(dir.path(), "main.scad", "cube(1);\nsphere(2);");
    let t3 = t2 + INTERVAL;
    let result = scheduler.tick(t3, &mut c, &mut doc, &mut events);
    assert_eq!(primary_len(&result), Some(2));
    assert_eq!(c.state(), CompileState::Idle);
}

#[test]
fn test_locked_pipeline_skips_poll() {
    let dir = tempfile::tempdir().unwrap();
    let main = write(dir.path(), "main.scad", "cube(1);");
    let (mut c, mut scheduler) = watched(&main, config(10));
    let mut doc = Document::default();
    let mut events = RecordedEvents::new();

    let t0 = Instant::now();
    scheduler.enable(t0);
    {
        let _guard = c.lock().acquire();
        let result = scheduler.tick(t0 + INTERVAL, &mut c, &mut doc, &mut events);
        assert!(matches!(result, TickResult::Locked));
    }
    assert!(doc.text().is_empty());
    assert_eq!(scheduler.next_deadline(), Some(t0 + INTERVAL * 2));

    let result = scheduler.tick(t0 + INTERVAL * 2, &mut c, &mut doc, &mut events);
    assert_eq!(primary_len(&result), Some(1));
}

#[test]
fn test_dependencies_settle_before_instantiation() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib.scad", "sphere(1);");
    let main = write(dir.path(), "main.scad", "include <lib.scad>\ncube(1);");
    let (mut c, mut scheduler) = watched(&main, config(10));
    let mut doc = Document::default();
    let mut events = RecordedEvents::new();

    let t0 = Instant::now();
    scheduler.enable(t0);
    let t1 = t0 + INTERVAL;
    assert!(matches!(scheduler.tick(t1, &mut c, &mut doc, &mut events), TickResult::Waiting));
    assert!(scheduler.is_waiting());
    assert_eq!(scheduler.next_deadline(), Some(t1 + SETTLE));
    assert_eq!(c.state(), CompileState::WaitingOnDependencies);
    assert!(c.is_locked());
    assert!(c.tree().is_none());

    // nothing happens before the settle delay elapses
    let early = t1 + SETTLE / 2;
    assert!(matches!(scheduler.tick(early, &mut c, &mut doc, &mut events), TickResult::Idle));

    match scheduler.tick(t1 + SETTLE, &mut c, &mut doc, &mut events) {
        TickResult::Compiled { outcome, products } => {
            assert!(outcome.changed);
            assert!(outcome.dependencies_settled);
            let chains = products.unwrap().unwrap();
            assert_eq!(chains.primary.len(), 2);
        }
        other => panic!("unexpected tick result: {:?}", other),
    }
    assert!(!c.is_locked());
    assert!(!scheduler.is_waiting());
}

#[test]
fn test_cascade_gives_up_after_max_checks() {
    let dir = tempfile::tempdir().unwrap();
    let lib = write(dir.path(), "lib.scad", "sphere(1);");
    let main = write(dir.path(), "main.scad", "include <lib.scad>\ncube(1);");
    let (mut c, mut scheduler) = watched(&main, config(2));
    let mut doc = Document::default();
    let mut events = RecordedEvents::new();

    let t0 = Instant::now();
    scheduler.enable(t0);
    let mut now = t0 + INTERVAL;
    assert!(matches!(scheduler.tick(now, &mut c, &mut doc, &mut events), TickResult::Waiting));

    // the library keeps changing while the cascade waits
    fs::write(&lib, "sphere(10);").unwrap();
    now += SETTLE;
    assert!(matches!(scheduler.tick(now, &mut c, &mut doc, &mut events), TickResult::Waiting));

    fs::write(&lib, "sphere(100);").unwrap();
    now += SETTLE;
    match scheduler.tick(now, &mut c, &mut doc, &mut events) {
        TickResult::Compiled { outcome, products } => {
            assert!(outcome.changed);
            assert!(!outcome.dependencies_settled);
            assert_eq!(outcome.dependency_checks, 2);
            assert!(products.unwrap().is_ok());
        }
        other => panic!("unexpected tick result: {:?}", other),
    }
    assert!(events.contains("dependencies still changing after 2 checks"));
    assert!(!c.is_locked());
}

#[test]
fn test_declined_reload_switches_auto_reload_off() {
    let dir = tempfile::tempdir().unwrap();
    let main = write(dir.path(), "main.scad", "cube(1);");
    let (mut c, mut scheduler) = watched(&main, config(10));
    let mut doc = Document::default();
    let mut events = RecordedEvents::new();

    let t0 = Instant::now();
    scheduler.enable(t0);
    let mut now = t0 + INTERVAL;
    assert_eq!(primary_len(&scheduler.tick(now, &mut c, &mut doc, &mut events)), Some(1));

    doc.edit("sphere(9);");
    write(dir.path(), "main.scad", "cube(20);");
    now += INTERVAL;
    match scheduler.tick(now, &mut c, &mut doc, &mut events) {
        TickResult::Compiled { outcome, products } => {
            assert!(!outcome.changed);
            assert!(outcome.reload_declined);
            assert!(products.is_none());
        }
        other => panic!("unexpected tick result: {:?}", other),
    }
    assert_eq!(doc.text(), "sphere(9);");
    assert!(events.contains("keeping unsaved edits"));
    assert!(!scheduler.is_enabled());
    assert_eq!(scheduler.next_deadline(), None);
    assert!(matches!(
        scheduler.tick(now + INTERVAL, &mut c, &mut doc, &mut events),
        TickResult::Idle
    ));

    // switched back on with edits that may be discarded, the next on-disk
    // change is reloaded
    scheduler.enable(now);
    let mut doc = doc.discard_edits_on_reload(true);
    write(dir.path(), "main.scad", "cube(3);\ncube(4);");
    now += INTERVAL;
    assert_eq!(primary_len(&scheduler.tick(now, &mut c, &mut doc, &mut events)), Some(2));
    assert_eq!(doc.text(), "cube(3);\ncube(4);");
    assert!(!doc.is_content_modified());
}

#[test]
fn test_disabled_scheduler_still_finishes_cascade() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "lib.scad", "sphere(1);");
    let main = write(dir.path(), "main.scad", "use <lib.scad>\ncube(1);");
    let (mut c, mut scheduler) = watched(&main, config(10));
    let mut doc = Document::default();
    let mut events = RecordedEvents::new();

    let t0 = Instant::now();
    scheduler.enable(t0);
    let t1 = t0 + INTERVAL;
    assert!(matches!(scheduler.tick(t1, &mut c, &mut doc, &mut events), TickResult::Waiting));

    scheduler.disable();
    assert!(!scheduler.is_enabled());
    assert_eq!(scheduler.next_deadline(), Some(t1 + SETTLE));
    let result = scheduler.tick(t1 + SETTLE, &mut c, &mut doc, &mut events);
    assert_eq!(primary_len(&result), Some(1));
    assert_eq!(scheduler.next_deadline(), None);
}
