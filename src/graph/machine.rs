//! User-supplied state-machine definitions for Fsm nodes: named states with
//! optional entry/exit action lists, and transitions keyed by trigger kind.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What causes a transition to be considered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Considered when a token arrives. `input = None` matches any input.
    TokenReceived {
        #[serde(default)]
        input: Option<String>,
    },
    /// Considered after arrivals and once per tick; fires when the
    /// expression evaluates truthy against the machine's variables plus the
    /// most recent token value per input.
    Condition { expr: String },
    /// Considered once per tick; fires when
    /// `tick >= state_changed_at + interval`.
    Timer { interval: u64 },
}

/// An action run from a state's entry/exit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDef {
    /// Create a token and route it through the named output. Exactly one of
    /// `formula` (evaluated) or `value` (literal) supplies the payload.
    Emit {
        output: String,
        #[serde(default)]
        formula: Option<String>,
        #[serde(default)]
        value: Option<Value>,
    },
    Log { message: String },
    SetVariable { name: String, value: Value },
    Increment { name: String },
    Decrement { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    pub name: String,
    #[serde(default)]
    pub on_entry: Vec<ActionDef>,
    #[serde(default)]
    pub on_exit: Vec<ActionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionDef {
    pub from: String,
    pub to: String,
    pub trigger: Trigger,
}

/// A complete machine definition as authored in the editor.
///
/// Transition order is significant: matching transitions execute in
/// declaration order, with no mutual-exclusion guard between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineDef {
    pub initial: String,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub states: Vec<StateDef>,
    #[serde(default)]
    pub transitions: Vec<TransitionDef>,
}

impl MachineDef {
    pub fn state(&self, name: &str) -> Option<&StateDef> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.states.iter().any(|s| s.name == name)
    }
}
