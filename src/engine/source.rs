//! Source behavior: interval-gated emission of root tokens.

use super::routing::Cascade;
use super::Engine;
use crate::graph::{NodeConfig, NodeId};
use crate::ledger::ActivityAction;
use crate::state::{NodeState, SourcePhase};
use crate::value::Value;
use rand::Rng;

impl Engine {
    /// Emits once when the interval has elapsed: idle -> generating ->
    /// emitting -> idle, all within this tick.
    pub(super) fn check_source_emission(&mut self, node: &NodeId) {
        let def = self.def();
        let Some(NodeConfig::Source(cfg)) = def.get(node) else {
            return;
        };

        let due = match self.states.get(node) {
            Some(NodeState::Source(state)) => self.tick >= state.last_emission + cfg.interval,
            _ => {
                self.capture(format!("no runtime state for '{}'", node));
                return;
            }
        };
        if !due {
            return;
        }

        self.set_source_phase(node, SourcePhase::Generating);
        let drawn = self.rng.gen_range(cfg.range.min..=cfg.range.max);
        let value = Value::Number(drawn);
        let token = self.tokens.create(node, value.clone(), self.tick, &[]);

        self.set_source_phase(node, SourcePhase::Emitting);
        if let Some(NodeState::Source(state)) = self.states.get_mut(node) {
            state.last_emission = self.tick;
            state.emitted += 1;
        }
        self.log(
            node,
            ActivityAction::Emitted,
            Some(value),
            format!("token {} emitted", token),
        );
        self.hop(token, node, "created");

        let mut cascade = Cascade::default();
        for port in &cfg.outputs {
            for target in &port.targets {
                self.deliver(token, node, target, &mut cascade);
            }
        }
        self.run_cascade(cascade);

        self.set_source_phase(node, SourcePhase::Idle);
    }

    fn set_source_phase(&mut self, node: &NodeId, phase: SourcePhase) {
        if let Some(NodeState::Source(state)) = self.states.get_mut(node) {
            state.phase = phase;
        }
    }
}
