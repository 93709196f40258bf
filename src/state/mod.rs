//! Mutable runtime state, keyed 1:1 with the definition's configs by node
//! id. Created on load, fully discarded and rebuilt on any reload.
//!
//! Buffers hold token ids only; the lineage tracker owns the records.

use crate::graph::{MachineDef, NodeConfig, NodeId};
use crate::lineage::TokenId;
use crate::value::Value;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePhase {
    Idle,
    Generating,
    Emitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePhase {
    Idle,
    Accumulating,
    Processing,
    Emitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessPhase {
    Idle,
    Firing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancedPhase {
    Idle,
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkPhase {
    Idle,
    Processing,
}

/// Declared by the Module surface; only Idle is ever entered (bootstrap
/// only, no sub-graph execution).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulePhase {
    Idle,
    Processing,
    Emitting,
    Waiting,
}

impl SourcePhase {
    pub fn name(&self) -> &'static str {
        match self {
            SourcePhase::Idle => "idle",
            SourcePhase::Generating => "generating",
            SourcePhase::Emitting => "emitting",
        }
    }
}

impl QueuePhase {
    pub fn name(&self) -> &'static str {
        match self {
            QueuePhase::Idle => "idle",
            QueuePhase::Accumulating => "accumulating",
            QueuePhase::Processing => "processing",
            QueuePhase::Emitting => "emitting",
        }
    }
}

/// One executed transition, kept in a bounded history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub tick: u64,
    pub from: String,
    pub to: String,
    pub trigger: String,
}

/// Live machine status for FSM kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateMachineInfo {
    pub current: String,
    pub previous: Option<String>,
    pub changed_at: u64,
    /// Most recent transitions, oldest first, capped by the engine config.
    pub history: VecDeque<TransitionRecord>,
}

impl StateMachineInfo {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            current: initial.into(),
            previous: None,
            changed_at: 0,
            history: VecDeque::new(),
        }
    }

    pub fn record(&mut self, record: TransitionRecord, cap: usize) {
        self.previous = Some(self.current.clone());
        self.current = record.to.clone();
        self.changed_at = record.tick;
        if self.history.len() == cap {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }
}

/// A named FIFO of buffered token ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputBuffer {
    pub name: String,
    pub tokens: VecDeque<TokenId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceState {
    pub phase: SourcePhase,
    pub last_emission: u64,
    pub emitted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub phase: QueuePhase,
    pub input: VecDeque<TokenId>,
    pub output: VecDeque<TokenId>,
    pub last_aggregation: u64,
    pub aggregations: u64,
    pub dropped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessState {
    pub phase: ProcessPhase,
    pub buffers: Vec<InputBuffer>,
    pub fires: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FsmState {
    pub machine: StateMachineInfo,
    pub variables: HashMap<String, Value>,
    pub buffers: Vec<InputBuffer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnhancedFsmState {
    pub phase: EnhancedPhase,
    pub buffer: VecDeque<TokenId>,
    pub drained: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SinkState {
    pub phase: SinkPhase,
    pub retained: VecDeque<TokenId>,
    pub consumed: u64,
    pub last_consumed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleState {
    pub phase: ModulePhase,
}

/// Runtime state, one variant per config kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeState {
    Source(SourceState),
    Queue(QueueState),
    Process(ProcessState),
    Fsm(FsmState),
    EnhancedFsm(EnhancedFsmState),
    Sink(SinkState),
    Module(ModuleState),
}

fn buffers_for(names: &[&str]) -> Vec<InputBuffer> {
    names
        .iter()
        .map(|name| InputBuffer {
            name: name.to_string(),
            tokens: VecDeque::new(),
        })
        .collect()
}

fn machine_info(machine: &MachineDef) -> StateMachineInfo {
    StateMachineInfo::new(machine.initial.clone())
}

impl NodeState {
    /// Bootstraps the initial state for a config.
    pub fn initial(config: &NodeConfig) -> Self {
        match config {
            NodeConfig::Source(_) => NodeState::Source(SourceState {
                phase: SourcePhase::Idle,
                last_emission: 0,
                emitted: 0,
            }),
            NodeConfig::Queue(_) => NodeState::Queue(QueueState {
                phase: QueuePhase::Idle,
                input: VecDeque::new(),
                output: VecDeque::new(),
                last_aggregation: 0,
                aggregations: 0,
                dropped: 0,
            }),
            NodeConfig::Process(c) => NodeState::Process(ProcessState {
                phase: ProcessPhase::Idle,
                buffers: buffers_for(
                    &c.inputs.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
                ),
                fires: 0,
            }),
            NodeConfig::Fsm(c) => NodeState::Fsm(FsmState {
                machine: machine_info(&c.machine),
                variables: c.machine.variables.clone(),
                buffers: buffers_for(
                    &c.inputs.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
                ),
            }),
            NodeConfig::EnhancedFsm(_) => NodeState::EnhancedFsm(EnhancedFsmState {
                phase: EnhancedPhase::Idle,
                buffer: VecDeque::new(),
                drained: 0,
            }),
            NodeConfig::Sink(_) => NodeState::Sink(SinkState {
                phase: SinkPhase::Idle,
                retained: VecDeque::new(),
                consumed: 0,
                last_consumed: None,
            }),
            NodeConfig::Module(_) => NodeState::Module(ModuleState {
                phase: ModulePhase::Idle,
            }),
        }
    }

    /// The authoritative state label recorded with every ledger entry.
    pub fn label(&self) -> String {
        match self {
            NodeState::Source(s) => s.phase.name().to_string(),
            NodeState::Queue(s) => s.phase.name().to_string(),
            NodeState::Process(s) => match s.phase {
                ProcessPhase::Idle => "idle".to_string(),
                ProcessPhase::Firing => "firing".to_string(),
            },
            NodeState::Fsm(s) => s.machine.current.clone(),
            NodeState::EnhancedFsm(s) => match s.phase {
                EnhancedPhase::Idle => "idle".to_string(),
                EnhancedPhase::Draining => "draining".to_string(),
            },
            NodeState::Sink(s) => match s.phase {
                SinkPhase::Idle => "idle".to_string(),
                SinkPhase::Processing => "processing".to_string(),
            },
            NodeState::Module(s) => match s.phase {
                ModulePhase::Idle => "idle",
                ModulePhase::Processing => "processing",
                ModulePhase::Emitting => "emitting",
                ModulePhase::Waiting => "waiting",
            }
            .to_string(),
        }
    }

    /// Named buffer occupancies recorded with every ledger entry.
    pub fn buffer_sizes(&self) -> Vec<(String, usize)> {
        match self {
            NodeState::Queue(s) => vec![
                ("input".to_string(), s.input.len()),
                ("output".to_string(), s.output.len()),
            ],
            NodeState::Process(s) => s
                .buffers
                .iter()
                .map(|b| (b.name.clone(), b.tokens.len()))
                .collect(),
            NodeState::Fsm(s) => s
                .buffers
                .iter()
                .map(|b| (b.name.clone(), b.tokens.len()))
                .collect(),
            NodeState::EnhancedFsm(s) => vec![("buffer".to_string(), s.buffer.len())],
            NodeState::Sink(s) => vec![("retained".to_string(), s.retained.len())],
            NodeState::Source(_) | NodeState::Module(_) => vec![],
        }
    }
}

/// The per-run state table. Rebuilt wholesale whenever a definition is
/// (re)installed; never patched incrementally across loads.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateStore {
    map: HashMap<NodeId, NodeState>,
}

impl StateStore {
    pub fn init_from(nodes: &[NodeConfig]) -> Self {
        let map = nodes
            .iter()
            .map(|config| (config.id().clone(), NodeState::initial(config)))
            .collect();
        Self { map }
    }

    pub fn get(&self, id: &str) -> Option<&NodeState> {
        self.map.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut NodeState> {
        self.map.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeState)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Finds a named buffer. Linear scan: nodes declare a handful of inputs.
pub fn buffer_mut<'a>(buffers: &'a mut [InputBuffer], name: &str) -> Option<&'a mut VecDeque<TokenId>> {
    buffers
        .iter_mut()
        .find(|b| b.name == name)
        .map(|b| &mut b.tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::config::{InputPort, ProcessConfig, ProcessOutput};

    #[test]
    fn test_machine_history_is_bounded() {
        let mut info = StateMachineInfo::new("a");
        for i in 0..12 {
            info.record(
                TransitionRecord {
                    tick: i,
                    from: "a".into(),
                    to: "a".into(),
                    trigger: "timer".into(),
                },
                10,
            );
        }
        assert_eq!(info.history.len(), 10);
        assert_eq!(info.history.front().unwrap().tick, 2);
        assert_eq!(info.history.back().unwrap().tick, 11);
    }

    #[test]
    fn test_process_state_mirrors_declared_inputs() {
        let config = NodeConfig::Process(ProcessConfig {
            id: "p".into(),
            label: String::new(),
            inputs: vec![InputPort { name: "lhs".into() }, InputPort { name: "rhs".into() }],
            outputs: vec![ProcessOutput {
                name: "out".into(),
                formula: "lhs + rhs".into(),
                targets: Default::default(),
            }],
        });
        let state = NodeState::initial(&config);
        assert_eq!(
            state.buffer_sizes(),
            vec![("lhs".to_string(), 0), ("rhs".to_string(), 0)]
        );
    }
}
