//! The Activity Ledger: the run's authoritative, user-visible record of
//! state transitions and token movements.
//!
//! Both views are FIFO-bounded: pushing beyond capacity evicts the oldest
//! entry. Provenance does not live here (the lineage tracker survives
//! truncation); the ledger is for the activity feed.

use crate::graph::NodeId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// What happened. Kept coarse on purpose: the `details` string carries the
/// specifics, this enum is for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Emitted,
    Received,
    TokenDropped,
    AggregationTriggered,
    AggregationSkipped,
    Fired,
    Forwarded,
    Transition,
    ActionLog,
    Drained,
    Consumed,
    Error,
}

impl ActivityAction {
    pub fn name(&self) -> &'static str {
        match self {
            ActivityAction::Emitted => "emitted",
            ActivityAction::Received => "received",
            ActivityAction::TokenDropped => "token_dropped",
            ActivityAction::AggregationTriggered => "aggregation_triggered",
            ActivityAction::AggregationSkipped => "aggregation_skipped",
            ActivityAction::Fired => "fired",
            ActivityAction::Forwarded => "forwarded",
            ActivityAction::Transition => "transition",
            ActivityAction::ActionLog => "action_log",
            ActivityAction::Drained => "drained",
            ActivityAction::Consumed => "consumed",
            ActivityAction::Error => "error",
        }
    }
}

/// One ledger line. `seq` is assigned by the ledger on push and is
/// monotonic across the whole run, so the global and per-node views can be
/// interleaved deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub tick: u64,
    pub seq: u64,
    pub node: NodeId,
    pub action: ActivityAction,
    pub value: Option<Value>,
    pub details: String,
    /// The node's authoritative state label at log time.
    pub node_state: String,
    /// Named buffer occupancies at log time.
    pub buffers: Vec<(String, usize)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityLedger {
    global: VecDeque<ActivityEntry>,
    per_node: HashMap<NodeId, VecDeque<ActivityEntry>>,
    next_seq: u64,
    node_cap: usize,
    global_cap: usize,
}

impl ActivityLedger {
    pub fn new(node_cap: usize, global_cap: usize) -> Self {
        Self {
            global: VecDeque::new(),
            per_node: HashMap::new(),
            next_seq: 0,
            node_cap,
            global_cap,
        }
    }

    /// Assigns the sequence number and appends to both views, evicting the
    /// oldest entry of a full view.
    pub fn push(&mut self, mut entry: ActivityEntry) {
        entry.seq = self.next_seq;
        self.next_seq += 1;

        let node_log = self.per_node.entry(entry.node.clone()).or_default();
        if node_log.len() == self.node_cap {
            node_log.pop_front();
        }
        node_log.push_back(entry.clone());

        if self.global.len() == self.global_cap {
            self.global.pop_front();
        }
        self.global.push_back(entry);
    }

    /// The global feed, oldest first.
    pub fn global(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.global.iter()
    }

    /// One node's feed, oldest first. Empty for a node that never logged.
    pub fn for_node(&self, node: &str) -> impl Iterator<Item = &ActivityEntry> {
        self.per_node
            .get(node)
            .into_iter()
            .flat_map(|log| log.iter())
    }

    pub fn global_len(&self) -> usize {
        self.global.len()
    }

    pub fn node_len(&self, node: &str) -> usize {
        self.per_node.get(node).map(|l| l.len()).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.global.clear();
        self.per_node.clear();
        self.next_seq = 0;
    }
}
