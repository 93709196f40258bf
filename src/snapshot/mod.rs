//! Editing-level undo/redo over definition snapshots.
//!
//! Snapshots deep-copy the definition only — never runtime state — so undo
//! reverts structural edits, not simulation progress. The engine rebuilds
//! all runtime state from scratch against whatever definition comes back.

use crate::graph::GraphDefinition;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSnapshot {
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub definition: GraphDefinition,
}

/// Bounded undo/redo stacks. The top of the undo stack always mirrors the
/// most recently saved checkpoint of the current definition.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotManager {
    undo: Vec<ScenarioSnapshot>,
    redo: Vec<ScenarioSnapshot>,
    cap: usize,
}

impl SnapshotManager {
    pub fn new(cap: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            cap,
        }
    }

    /// Deep-copies the definition onto the undo stack and clears the redo
    /// stack. A full stack evicts its oldest snapshot.
    pub fn save(&mut self, definition: &GraphDefinition, description: impl Into<String>) {
        if self.undo.len() == self.cap {
            self.undo.remove(0);
        }
        self.undo.push(ScenarioSnapshot {
            description: description.into(),
            created_at: Utc::now(),
            definition: definition.clone(),
        });
        self.redo.clear();
    }

    /// Moves the newest checkpoint onto the redo stack and returns a copy
    /// of the one before it. None when there is no earlier checkpoint to
    /// return to.
    pub fn undo(&mut self) -> Option<GraphDefinition> {
        if self.undo.len() < 2 {
            return None;
        }
        let newest = self.undo.pop().expect("len checked above");
        self.redo.push(newest);
        Some(
            self.undo
                .last()
                .expect("len checked above")
                .definition
                .clone(),
        )
    }

    /// Moves the newest undone checkpoint back and returns a copy of its
    /// definition.
    pub fn redo(&mut self) -> Option<GraphDefinition> {
        let snapshot = self.redo.pop()?;
        let definition = snapshot.definition.clone();
        self.undo.push(snapshot);
        Some(definition)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    /// Descriptions of the stacked checkpoints, oldest first.
    pub fn history(&self) -> Vec<&str> {
        self.undo.iter().map(|s| s.description.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
