// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Collaborators the coordinator talks to

/// The document being edited
pub trait Editor {
    fn text(&self) -> String;

    /// True when the buffer has edits not yet saved to disk
    fn is_content_modified(&self) -> bool;

    /// Replace the buffer after an on-disk reload; clears the modified flag
    fn set_text(&mut self, text: String);

    /// Asked before unsaved edits are discarded for an on-disk change
    fn confirm_reload(&mut self) -> bool;

    /// Called before modified text is compiled, so a crash during the
    /// compile cannot lose it
    fn save_backup(&mut self) {}
}

/// Plain in-memory editor buffer
#[derive(Debug, Clone, Default)]
pub struct Document {
    text: String,
    modified: bool,
    discard_edits: bool,
    backup: Option<String>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            modified: false,
            discard_edits: false,
            backup: None,
        }
    }

    /// Type into the buffer, marking it modified
    pub fn edit(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.modified = true;
    }

    /// Text saved by the last [`Editor::save_backup`]
    pub fn last_backup(&self) -> Option<&str> {
        self.backup.as_deref()
    }

    /// Answer given to [`Editor::confirm_reload`]
    pub fn discard_edits_on_reload(mut self, discard: bool) -> Self {
        self.discard_edits = discard;
        self
    }
}

impl Editor for Document {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn is_content_modified(&self) -> bool {
        self.modified
    }

    fn set_text(&mut self, text: String) {
        self.text = text;
        self.modified = false;
    }

    fn confirm_reload(&mut self) -> bool {
        self.discard_edits
    }

    fn save_backup(&mut self) {
        self.backup = Some(self.text.clone());
    }
}

/// Front-end notifications; every method defaults to doing nothing
pub trait PipelineEvents {
    /// A user-visible console line
    fn output(&mut self, _message: &str) {}

    /// Byte offset of a parse error in the compiled text
    fn highlight_error(&mut self, _position: usize) {}

    fn clear_error_highlight(&mut self) {}

    /// Fired before a recompile drops the current tree; renderers must let
    /// go of chain references
    fn renderer_invalidated(&mut self) {}

    /// Progress of the running evaluation in permille
    fn progress(&mut self, _permille: u32) {}
}

/// Ignores every notification
pub struct NoEvents;

impl PipelineEvents for NoEvents {}

/// Records every notification, for tests and headless front-ends
#[derive(Debug, Clone, Default)]
pub struct RecordedEvents {
    pub output: Vec<String>,
    pub highlighted: Vec<usize>,
    pub highlight_clears: usize,
    pub invalidations: usize,
    pub progress: Vec<u32>,
}

impl RecordedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.output.iter().any(|line| line.contains(needle))
    }
}

impl PipelineEvents for RecordedEvents {
    fn output(&mut self, message: &str) {
        self.output.push(message.to_string());
    }

    fn highlight_error(&mut self, position: usize) {
        self.highlighted.push(position);
    }

    fn clear_error_highlight(&mut self) {
        self.highlight_clears += 1;
    }

    fn renderer_invalidated(&mut self) {
        self.invalidations += 1;
    }

    fn progress(&mut self, permille: u32) {
        self.progress.push(permille);
    }
}
