// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Compile supervision: coordinator state machine, auto-reload, exact render
//! worker and the front-end collaborators they report to

mod coordinator;
mod events;
mod lock;
mod scheduler;
mod worker;

pub use coordinator::{CompileOutcome, CompileState, CompileStep, CompiledChains, Coordinator};
pub use events::{Document, Editor, NoEvents, PipelineEvents, RecordedEvents};
pub use lock::{CompileGuard, CompileLock};
pub use scheduler::{AutoReloadScheduler, TickResult};
pub use worker::{RenderJob, RenderOutcome, RenderWorker};
