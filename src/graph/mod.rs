//! The scenario data model: node configs, machine definitions, and the
//! validated definition container.

pub mod config;
pub mod definition;
pub mod machine;

pub use config::{
    AggregationMethod, EnhancedFsmConfig, EnhancedSurface, FsmConfig, InputPort, ModuleConfig,
    NodeConfig, NodeId, NodeKind, OutputPort, ProcessConfig, ProcessOutput, QueueConfig,
    SinkConfig, SourceConfig, TargetRef, ValueRange,
};
pub use definition::{GraphDefinition, NodeGroup};
pub use machine::{ActionDef, MachineDef, StateDef, TransitionDef, Trigger};
