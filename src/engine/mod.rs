//! The simulation engine: step driver, per-kind behaviors, and the control
//! surface exposed to the (out-of-scope) UI layer.
//!
//! Everything is synchronous and single-threaded. One `Engine` owns every
//! table for a run, so tests and embedders can hold isolated instances.

mod driver;
mod enhanced;
mod fsm;
mod process;
mod queue;
mod routing;
mod sink;
mod source;

#[cfg(test)]
mod tests;

use crate::eval::{ExpressionEvaluator, RhaiEvaluator};
use crate::graph::{GraphDefinition, NodeId};
use crate::ledger::{ActivityAction, ActivityEntry, ActivityLedger};
use crate::lineage::{LineageTracker, TokenId, TokenRecord};
use crate::snapshot::SnapshotManager;
use crate::state::{NodeState, StateStore};
use crate::validation::{self, ValidationError};
use crate::value::Value;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Every tunable in one place. `Default` matches the documented caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-node activity ledger capacity.
    pub node_ledger_cap: usize,
    /// Global activity ledger capacity.
    pub global_ledger_cap: usize,
    /// Undo/redo stack depth.
    pub snapshot_cap: usize,
    /// Machine transition-history depth.
    pub transition_history_cap: usize,
    /// Default Sink retained-token cap (overridable per node).
    pub sink_retention: usize,
    /// Work-queue iterations allowed within one tick before a cascade is
    /// declared runaway and abandoned.
    pub cascade_cap: usize,
    /// Seed for Source emission draws; fixed seed, reproducible run.
    pub rng_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            node_ledger_cap: 500,
            global_ledger_cap: 1000,
            snapshot_cap: 20,
            transition_history_cap: 10,
            sink_retention: 100,
            cascade_cap: 10_000,
            rng_seed: 0x5EED,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no definition loaded")]
    NoDefinition,
    #[error("cascade overflow: exceeded {0} iterations within one tick")]
    CascadeOverflow(usize),
}

/// Cheap per-run counters for the UI header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub tick: u64,
    pub tokens_created: u64,
    pub tokens_dropped: u64,
    pub process_fires: u64,
    pub cascade_overflows: u64,
}

/// The engine. All maps live here; callers get references, never globals.
pub struct Engine {
    config: EngineConfig,
    evaluator: Box<dyn ExpressionEvaluator>,
    definition: Option<Arc<GraphDefinition>>,
    states: StateStore,
    tick: u64,
    running: bool,
    tokens: LineageTracker,
    ledger: ActivityLedger,
    snapshots: SnapshotManager,
    /// User-visible defects and warnings, in occurrence order.
    messages: Vec<String>,
    rng: StdRng,
    dropped: u64,
    overflows: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_evaluator(config, Box::new(RhaiEvaluator::new()))
    }

    /// Swaps in a non-default evaluator implementation.
    pub fn with_evaluator(config: EngineConfig, evaluator: Box<dyn ExpressionEvaluator>) -> Self {
        let ledger = ActivityLedger::new(config.node_ledger_cap, config.global_ledger_cap);
        let snapshots = SnapshotManager::new(config.snapshot_cap);
        let rng = StdRng::seed_from_u64(config.rng_seed);
        Self {
            config,
            evaluator,
            definition: None,
            states: StateStore::default(),
            tick: 0,
            running: false,
            tokens: LineageTracker::new(),
            ledger,
            snapshots,
            messages: Vec::new(),
            rng,
            dropped: 0,
            overflows: 0,
        }
    }

    // --- Control surface ---

    /// Validates and installs a raw definition payload.
    ///
    /// Fail-closed: on any validation error all engine state is cleared and
    /// the full error list is returned. Invoked mid-run it is a silent
    /// no-op guard — nothing changes and no error is raised.
    pub fn load(&mut self, raw: &serde_json::Value) -> Result<(), Vec<ValidationError>> {
        if self.running {
            debug!("load ignored: run in progress");
            return Ok(());
        }
        match validation::validate(raw) {
            Ok(def) => {
                self.install(def);
                Ok(())
            }
            Err(errors) => {
                self.clear_installed();
                Err(errors)
            }
        }
    }

    /// Installs an already-validated definition (the editing path: the UI
    /// re-submits the whole definition after each structural edit). Subject
    /// to the same mid-run guard as `load`.
    pub fn load_definition(&mut self, def: GraphDefinition) {
        if self.running {
            debug!("load ignored: run in progress");
            return;
        }
        self.install(def);
    }

    pub fn play(&mut self) {
        if self.definition.is_some() {
            self.running = true;
        }
    }

    /// Cooperative: a tick in progress always completes; the flag is only
    /// observed between ticks.
    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The timer callback while playing: advances one tick if running.
    /// Returns whether a tick was executed, so the embedder knows whether
    /// to reschedule.
    pub fn poll(&mut self) -> bool {
        if self.running && self.definition.is_some() {
            self.run_tick();
            true
        } else {
            false
        }
    }

    /// Advances exactly `n` ticks on demand.
    pub fn step(&mut self, n: u64) -> Result<(), EngineError> {
        if self.definition.is_none() {
            return Err(EngineError::NoDefinition);
        }
        for _ in 0..n {
            self.run_tick();
        }
        Ok(())
    }

    /// Deep-copies the current definition onto the undo stack.
    pub fn save_snapshot(&mut self, description: impl Into<String>) -> Result<(), EngineError> {
        let def = self.definition.as_ref().ok_or(EngineError::NoDefinition)?;
        self.snapshots.save(def, description);
        Ok(())
    }

    /// Restores the previous checkpoint, rebuilding all runtime state from
    /// scratch against it. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.snapshots.undo() {
            Some(def) => {
                self.reinstall(def);
                true
            }
            None => false,
        }
    }

    /// Restores the most recently undone checkpoint. Returns false when
    /// there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        match self.snapshots.redo() {
            Some(def) => {
                self.reinstall(def);
                true
            }
            None => false,
        }
    }

    // --- Accessors for the UI/ledger layers ---

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn definition(&self) -> Option<&GraphDefinition> {
        self.definition.as_deref()
    }

    pub fn state(&self, node: &str) -> Option<&NodeState> {
        self.states.get(node)
    }

    pub fn states(&self) -> &StateStore {
        &self.states
    }

    pub fn ledger(&self) -> &ActivityLedger {
        &self.ledger
    }

    pub fn token(&self, id: TokenId) -> Option<&TokenRecord> {
        self.tokens.get(id)
    }

    pub fn lineage(&self) -> &LineageTracker {
        &self.tokens
    }

    /// ASCII provenance tree for the audit view.
    pub fn trace_lineage(&self, id: TokenId) -> String {
        crate::lineage::trace::format_lineage(&self.tokens, id)
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn snapshot_manager(&self) -> &SnapshotManager {
        &self.snapshots
    }

    pub fn stats(&self) -> RunStats {
        let process_fires = self
            .states
            .iter()
            .map(|(_, s)| match s {
                NodeState::Process(p) => p.fires,
                _ => 0,
            })
            .sum();
        RunStats {
            tick: self.tick,
            tokens_created: self.tokens.len() as u64,
            tokens_dropped: self.dropped,
            process_fires,
            cascade_overflows: self.overflows,
        }
    }

    // --- Installation internals ---

    /// Replaces the definition wholesale and rebuilds every runtime table.
    /// Snapshot stacks are deliberately untouched: they are the editing
    /// history this definition belongs to.
    fn install(&mut self, def: GraphDefinition) {
        self.messages = validation::warnings(&def);
        self.states = StateStore::init_from(def.nodes());
        self.definition = Some(Arc::new(def));
        self.ledger.clear();
        self.tokens.clear();
        self.tick = 0;
        self.running = false;
        self.rng = StdRng::seed_from_u64(self.config.rng_seed);
        self.dropped = 0;
        self.overflows = 0;
    }

    /// Re-validates and installs a definition coming back off a snapshot
    /// stack. A stacked definition re-failing validation cannot normally
    /// happen; fail closed if it does.
    fn reinstall(&mut self, def: GraphDefinition) {
        let errors = validation::recheck(&def);
        if errors.is_empty() {
            self.install(def);
        } else {
            self.clear_installed();
            self.messages
                .extend(errors.into_iter().map(|e| e.to_string()));
        }
    }

    fn clear_installed(&mut self) {
        self.definition = None;
        self.states = StateStore::default();
        self.ledger.clear();
        self.tokens.clear();
        self.tick = 0;
        self.running = false;
        self.messages.clear();
    }

    // --- Shared internals used by the behavior modules ---

    /// The installed definition. Behavior modules clone the `Arc` so they
    /// can read configs while mutating state.
    fn def(&self) -> Arc<GraphDefinition> {
        Arc::clone(
            self.definition
                .as_ref()
                .expect("behavior invoked without a definition"),
        )
    }

    /// Records a ledger entry, stamping the node's authoritative state and
    /// buffer sizes. A missing node id is captured as a message instead of
    /// panicking, and the entry is suppressed.
    fn log(
        &mut self,
        node: &NodeId,
        action: ActivityAction,
        value: Option<Value>,
        details: impl Into<String>,
    ) {
        let (node_state, buffers) = match self.states.get(node) {
            Some(state) => (state.label(), state.buffer_sizes()),
            None => {
                self.messages
                    .push(format!("ledger entry for unknown node '{}'", node));
                return;
            }
        };
        self.ledger.push(ActivityEntry {
            tick: self.tick,
            seq: 0,
            node: node.clone(),
            action,
            value,
            details: details.into(),
            node_state,
            buffers,
        });
    }

    fn capture(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}
