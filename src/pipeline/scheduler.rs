// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Auto-reload driver
//!
//! The scheduler owns no timer. Callers pass the current instant to
//! [`AutoReloadScheduler::tick`] and sleep until
//! [`AutoReloadScheduler::next_deadline`], which keeps it deterministic
//! under test.

use super::coordinator::{CompileOutcome, CompileStep, CompiledChains, Coordinator};
use super::events::{Editor, PipelineEvents};
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use log::debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub enum TickResult {
    /// Nothing was due
    Idle,
    /// A poll came due while the pipeline was locked and was skipped
    Locked,
    /// Dependencies are settling; resumed at the next deadline
    Waiting,
    /// A compile finished; `products` is set when downstream work ran
    Compiled {
        outcome: CompileOutcome,
        products: Option<PipelineResult<Arc<CompiledChains>>>,
    },
}

#[derive(Debug, Clone)]
pub struct AutoReloadScheduler {
    interval: Duration,
    next_poll: Option<Instant>,
    retry_at: Option<Instant>,
}

impl AutoReloadScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_poll: None,
            retry_at: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.auto_reload_interval)
    }

    /// Start polling; the first poll is due one interval after `now`
    pub fn enable(&mut self, now: Instant) {
        if self.next_poll.is_none() {
            self.next_poll = Some(now + self.interval);
        }
    }

    /// Move the next poll to `now` when polling is enabled
    pub fn poll_at(&mut self, now: Instant) {
        if self.next_poll.is_some() {
            self.next_poll = Some(now);
        }
    }

    /// Stop polling; a dependency cascade already in progress still resumes
    pub fn disable(&mut self) {
        self.next_poll = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.next_poll.is_some()
    }

    pub fn is_waiting(&self) -> bool {
        self.retry_at.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.retry_at, self.next_poll) {
            (Some(retry), _) => Some(retry),
            (None, poll) => poll,
        }
    }

    pub fn tick(
        &mut self,
        now: Instant,
        coordinator: &mut Coordinator,
        editor: &mut dyn Editor,
        events: &mut dyn PipelineEvents,
    ) -> TickResult {
        // polls are suspended while a cascade is settling
        if let Some(retry) = self.retry_at {
            if now < retry {
                return TickResult::Idle;
            }
            self.retry_at = None;
            let step = coordinator.resume_dependencies(editor, events);
            return self.handle(now, step, coordinator, events);
        }

        let Some(due) = self.next_poll else {
            return TickResult::Idle;
        };
        if now < due {
            return TickResult::Idle;
        }
        self.next_poll = Some(now + self.interval);
        if coordinator.is_locked() {
            debug!("Auto-reload poll skipped, pipeline is locked");
            return TickResult::Locked;
        }
        let step = coordinator.compile(true, editor, events);
        self.handle(now, step, coordinator, events)
    }

    fn handle(
        &mut self,
        now: Instant,
        step: CompileStep,
        coordinator: &mut Coordinator,
        events: &mut dyn PipelineEvents,
    ) -> TickResult {
        match step {
            CompileStep::WaitingOnDependencies { retry_after } => {
                self.retry_at = Some(now + retry_after);
                TickResult::Waiting
            }
            CompileStep::Done(outcome) => {
                if outcome.reload_declined {
                    debug!("Auto-reload switched off, unsaved edits were kept");
                    self.disable();
                }
                let products = outcome
                    .should_build()
                    .then(|| coordinator.build_products(events));
                if self.next_poll.is_some() {
                    self.next_poll = Some(now + self.interval);
                }
                TickResult::Compiled { outcome, products }
            }
        }
    }
}
