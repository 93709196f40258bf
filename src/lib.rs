//! flowsim_core: a discrete-time simulation engine for directed graphs of
//! typed processing nodes exchanging tokens, with full provenance tracking
//! and editing-level undo.
//!
//! The crate is the execution core only. The graph canvas, property
//! editors, persistence, and rendering are external collaborators that
//! talk to [`Engine`] through its control surface and accessors.

pub mod analysis;
pub mod engine;
pub mod eval;
pub mod graph;
pub mod ledger;
pub mod lineage;
pub mod snapshot;
pub mod state;
pub mod validation;
pub mod value;

pub use engine::{Engine, EngineConfig, EngineError, RunStats};
pub use eval::{EvalContext, EvalError, ExpressionEvaluator, RhaiEvaluator};
pub use graph::{GraphDefinition, NodeConfig, NodeId, NodeKind};
pub use ledger::{ActivityAction, ActivityEntry};
pub use lineage::{LineageTracker, TokenId, TokenRecord};
pub use state::NodeState;
pub use validation::{validate, ValidationError, ValidationErrorKind};
pub use value::Value;
