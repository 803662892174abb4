//! Snapshot-based undo/redo.
//!
//! Every checkpoint is a full [`SavedDocument`]. Restoring one goes through
//! the normal all-or-nothing load path, so a snapshot that fails to load
//! leaves the live state untouched.

use crate::graph::document::SavedDocument;
use std::collections::VecDeque;

/// Default number of checkpoints kept.
pub const DEFAULT_UNDO_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct UndoStack {
    undo: VecDeque<SavedDocument>,
    redo: Vec<SavedDocument>,
    depth: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_DEPTH)
    }
}

impl UndoStack {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Record the state before a mutation. Clears the redo history.
    pub fn push(&mut self, snapshot: SavedDocument) {
        self.redo.clear();
        self.undo.push_back(snapshot);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    pub(crate) fn pop_undo(&mut self) -> Option<SavedDocument> {
        self.undo.pop_back()
    }

    /// Put a snapshot back after failing to restore it.
    pub(crate) fn push_back_undo(&mut self, snapshot: SavedDocument) {
        self.undo.push_back(snapshot);
    }

    pub(crate) fn push_redo(&mut self, snapshot: SavedDocument) {
        self.redo.push(snapshot);
    }

    pub(crate) fn pop_redo(&mut self) -> Option<SavedDocument> {
        self.redo.pop()
    }

    /// Record the current state on the undo side without touching redo.
    pub(crate) fn push_undo_keep_redo(&mut self, snapshot: SavedDocument) {
        self.undo.push_back(snapshot);
        while self.undo.len() > self.depth {
            self.undo.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
