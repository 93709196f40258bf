//! Defines `NodeConfig` and its associated types: one exhaustive variant per
//! node kind, each carrying its ports and kind-specific parameters.

use crate::graph::machine::MachineDef;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A unique, stable identifier for a node within the definition.
///
/// Ids originate in the (out-of-scope) editor payload, so they are opaque
/// strings rather than dense indices.
pub type NodeId = String;

/// A reference to a named input port on another node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    pub node: NodeId,
    /// The input-port name on the destination. Kinds with a single implicit
    /// input (Queue, Sink, EnhancedFsm) ignore it.
    #[serde(default)]
    pub port: String,
}

/// A named output with its destination references. Almost every node has one
/// or two targets, hence the inline capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPort {
    pub name: String,
    #[serde(default)]
    pub targets: SmallVec<[TargetRef; 2]>,
}

/// A declared input. For Process nodes the name doubles as the alias under
/// which the consumed token's value is bound in the formula context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputPort {
    pub name: String,
}

/// Inclusive range a Source draws emission values from.
/// `min == max` models a fixed emission value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

/// Reduction applied by a Queue over its buffered tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    Sum,
    Average,
    Count,
    First,
    Last,
}

impl AggregationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationMethod::Sum => "sum",
            AggregationMethod::Average => "average",
            AggregationMethod::Count => "count",
            AggregationMethod::First => "first",
            AggregationMethod::Last => "last",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    /// Emission period in ticks. Fires when `tick >= last_emission + interval`.
    pub interval: u64,
    pub range: ValueRange,
    #[serde(default)]
    pub outputs: Vec<OutputPort>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    /// Input-buffer capacity. Arrivals beyond it are dropped and logged.
    pub capacity: usize,
    pub method: AggregationMethod,
    /// Aggregation period in ticks.
    pub window: u64,
    #[serde(default)]
    pub outputs: Vec<OutputPort>,
}

/// One Process output: a transformation formula and where its result goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub name: String,
    pub formula: String,
    #[serde(default)]
    pub targets: SmallVec<[TargetRef; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    pub inputs: Vec<InputPort>,
    pub outputs: Vec<ProcessOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsmConfig {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub inputs: Vec<InputPort>,
    #[serde(default)]
    pub outputs: Vec<OutputPort>,
    pub machine: MachineDef,
}

/// Reserved richer surface of the EnhancedFsm kind. Parsed and retained for
/// the editor, never executed by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSurface {
    #[serde(default)]
    pub event_streams: Vec<String>,
    #[serde(default)]
    pub interpretation_rules: Vec<InterpretationRule>,
    #[serde(default)]
    pub feedback: Option<FeedbackConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpretationRule {
    pub pattern: String,
    pub interpretation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    pub failure_threshold: u32,
    pub cooldown_ticks: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedFsmConfig {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub inputs: Vec<InputPort>,
    #[serde(default)]
    pub outputs: Vec<OutputPort>,
    #[serde(default)]
    pub surface: EnhancedSurface,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    /// Overrides `EngineConfig::sink_retention` for this node.
    #[serde(default)]
    pub retain_limit: Option<usize>,
}

/// Declared container surface of the Module kind. The driver bootstraps the
/// module's initial state only; the embedded sub-definition is retained for
/// the editor, never executed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleSurface {
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub id: NodeId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub inputs: Vec<InputPort>,
    #[serde(default)]
    pub outputs: Vec<OutputPort>,
    #[serde(default)]
    pub surface: ModuleSurface,
}

/// Discriminant-only view of a node's kind, used for phase ordering and
/// reception dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Source,
    Queue,
    Process,
    Fsm,
    EnhancedFsm,
    Sink,
    Module,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Source => "source",
            NodeKind::Queue => "queue",
            NodeKind::Process => "process",
            NodeKind::Fsm => "fsm",
            NodeKind::EnhancedFsm => "enhanced_fsm",
            NodeKind::Sink => "sink",
            NodeKind::Module => "module",
        }
    }
}

/// The primary enum representing a node in the definition.
///
/// A config is the "skeleton" of the scenario. It defines the wiring and
/// parameters but holds no runtime data (buffers and counters live in the
/// `state` module, token records in the lineage tracker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeConfig {
    Source(SourceConfig),
    Queue(QueueConfig),
    Process(ProcessConfig),
    Fsm(FsmConfig),
    EnhancedFsm(EnhancedFsmConfig),
    Sink(SinkConfig),
    Module(ModuleConfig),
}

impl NodeConfig {
    pub fn id(&self) -> &NodeId {
        match self {
            NodeConfig::Source(c) => &c.id,
            NodeConfig::Queue(c) => &c.id,
            NodeConfig::Process(c) => &c.id,
            NodeConfig::Fsm(c) => &c.id,
            NodeConfig::EnhancedFsm(c) => &c.id,
            NodeConfig::Sink(c) => &c.id,
            NodeConfig::Module(c) => &c.id,
        }
    }

    pub fn label(&self) -> &str {
        let label = match self {
            NodeConfig::Source(c) => &c.label,
            NodeConfig::Queue(c) => &c.label,
            NodeConfig::Process(c) => &c.label,
            NodeConfig::Fsm(c) => &c.label,
            NodeConfig::EnhancedFsm(c) => &c.label,
            NodeConfig::Sink(c) => &c.label,
            NodeConfig::Module(c) => &c.label,
        };
        if label.is_empty() {
            self.id()
        } else {
            label
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeConfig::Source(_) => NodeKind::Source,
            NodeConfig::Queue(_) => NodeKind::Queue,
            NodeConfig::Process(_) => NodeKind::Process,
            NodeConfig::Fsm(_) => NodeKind::Fsm,
            NodeConfig::EnhancedFsm(_) => NodeKind::EnhancedFsm,
            NodeConfig::Sink(_) => NodeKind::Sink,
            NodeConfig::Module(_) => NodeKind::Module,
        }
    }

    /// Declared input-port names. Kinds with a single implicit input report
    /// none; reception for those ignores the port name entirely.
    pub fn input_names(&self) -> Vec<&str> {
        match self {
            NodeConfig::Process(c) => c.inputs.iter().map(|p| p.name.as_str()).collect(),
            NodeConfig::Fsm(c) => c.inputs.iter().map(|p| p.name.as_str()).collect(),
            NodeConfig::EnhancedFsm(c) => c.inputs.iter().map(|p| p.name.as_str()).collect(),
            NodeConfig::Module(c) => c.inputs.iter().map(|p| p.name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Every outgoing target reference, across all outputs.
    pub fn all_targets(&self) -> Vec<&TargetRef> {
        match self {
            NodeConfig::Source(c) => c.outputs.iter().flat_map(|o| o.targets.iter()).collect(),
            NodeConfig::Queue(c) => c.outputs.iter().flat_map(|o| o.targets.iter()).collect(),
            NodeConfig::Process(c) => c.outputs.iter().flat_map(|o| o.targets.iter()).collect(),
            NodeConfig::Fsm(c) => c.outputs.iter().flat_map(|o| o.targets.iter()).collect(),
            NodeConfig::EnhancedFsm(c) => c.outputs.iter().flat_map(|o| o.targets.iter()).collect(),
            NodeConfig::Module(c) => c.outputs.iter().flat_map(|o| o.targets.iter()).collect(),
            NodeConfig::Sink(_) => Vec::new(),
        }
    }
}
