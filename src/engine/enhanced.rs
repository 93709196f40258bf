//! EnhancedFsm behavior.
//!
//! The declared surface is far richer than what runs: the engine only
//! buffers arrivals and drains them once per tick, forwarding each token to
//! any directly-connected Sink. The rest of the configuration is reserved
//! and deliberately inert.

use super::routing::Cascade;
use super::Engine;
use crate::graph::{NodeConfig, NodeId, NodeKind};
use crate::ledger::ActivityAction;
use crate::lineage::TokenId;
use crate::state::{EnhancedPhase, NodeState};
use tracing::trace;

impl Engine {
    pub(super) fn drain_enhanced(&mut self, node: &NodeId) {
        let def = self.def();
        let Some(NodeConfig::EnhancedFsm(cfg)) = def.get(node) else {
            return;
        };

        let drained: Vec<TokenId> = match self.states.get_mut(node) {
            Some(NodeState::EnhancedFsm(state)) => {
                if state.buffer.is_empty() {
                    return;
                }
                state.phase = EnhancedPhase::Draining;
                state.drained += state.buffer.len() as u64;
                state.buffer.drain(..).collect()
            }
            _ => {
                self.capture(format!("no runtime state for '{}'", node));
                return;
            }
        };

        self.log(
            node,
            ActivityAction::Drained,
            None,
            format!("{} buffered tokens drained", drained.len()),
        );

        let mut cascade = Cascade::default();
        for token in drained {
            for port in &cfg.outputs {
                for target in &port.targets {
                    if def.kind_of(&target.node) == Some(NodeKind::Sink) {
                        self.deliver(token, node, target, &mut cascade);
                    } else {
                        trace!(
                            node = %node,
                            dest = %target.node,
                            "non-sink destination ignored by enhanced drain"
                        );
                    }
                }
            }
        }
        self.run_cascade(cascade);

        if let Some(NodeState::EnhancedFsm(state)) = self.states.get_mut(node) {
            state.phase = EnhancedPhase::Idle;
        }
    }
}
