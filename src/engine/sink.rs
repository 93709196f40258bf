//! Sink behavior: terminal consumption with bounded retention.

use super::Engine;
use crate::graph::NodeId;
use crate::ledger::ActivityAction;
use crate::lineage::TokenId;
use crate::state::{NodeState, SinkPhase};

impl Engine {
    /// idle -> processing -> idle. Retention evicts FIFO; the lineage
    /// tracker keeps the evicted token's record.
    pub(super) fn consume_at_sink(
        &mut self,
        token: TokenId,
        node: &NodeId,
        retain_override: Option<usize>,
        from: &NodeId,
    ) {
        let value = self.token_value(token);
        let cap = retain_override.unwrap_or(self.config.sink_retention);
        let tick = self.tick;

        match self.states.get_mut(node) {
            Some(NodeState::Sink(state)) => {
                state.phase = SinkPhase::Processing;
                if state.retained.len() == cap {
                    state.retained.pop_front();
                }
                state.retained.push_back(token);
                state.consumed += 1;
                state.last_consumed = Some(tick);
            }
            _ => {
                self.capture(format!("no runtime state for '{}'", node));
                return;
            }
        }

        self.log(
            node,
            ActivityAction::Consumed,
            value,
            format!("token {} consumed from '{}'", token, from),
        );
        self.hop(token, node, "consumed");

        if let Some(NodeState::Sink(state)) = self.states.get_mut(node) {
            state.phase = SinkPhase::Idle;
        }
    }
}
