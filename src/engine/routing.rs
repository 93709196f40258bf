//! Token routing: kind-specific reception rules and the bounded cascade
//! queue.
//!
//! Process fires and Fsm arrival processing are deferred onto an explicit
//! work queue instead of recursing, so a cycle of reactive nodes is bounded
//! by the cascade cap rather than the call stack.

use super::{Engine, EngineError};
use crate::graph::{InputPort, NodeConfig, NodeId, TargetRef};
use crate::ledger::ActivityAction;
use crate::lineage::TokenId;
use crate::state::{self, NodeState};
use crate::value::Value;
use std::collections::VecDeque;
use tracing::warn;

/// Deferred same-tick work triggered by a delivery.
pub(super) enum CascadeItem {
    /// A Process node received a token and should attempt to fire.
    ProcessFire(NodeId),
    /// An Fsm node received a token on an input and should run its
    /// token_received and condition transitions.
    FsmArrival { node: NodeId, input: String },
}

impl CascadeItem {
    fn node(&self) -> &NodeId {
        match self {
            CascadeItem::ProcessFire(node) => node,
            CascadeItem::FsmArrival { node, .. } => node,
        }
    }
}

/// The work queue for one top-level trigger (a source emission, a queue
/// forward, a timer transition, an enhanced drain). Draining it to a
/// fixpoint executes every synchronous consequence within the current tick.
#[derive(Default)]
pub(super) struct Cascade {
    queue: VecDeque<CascadeItem>,
}

impl Cascade {
    pub(super) fn push(&mut self, item: CascadeItem) {
        self.queue.push_back(item);
    }
}

impl Engine {
    /// Drains a cascade, bounding total iterations. Exceeding the cap
    /// records a distinct cascade-overflow error and abandons the
    /// remainder; the alternative is a tick that never ends.
    pub(super) fn run_cascade(&mut self, mut cascade: Cascade) {
        let cap = self.config.cascade_cap;
        let mut iterations = 0usize;

        while let Some(item) = cascade.queue.pop_front() {
            if iterations >= cap {
                let node = item.node().clone();
                let error = EngineError::CascadeOverflow(cap);
                warn!(node = %node, "cascade abandoned");
                self.overflows += 1;
                self.log(&node, ActivityAction::Error, None, error.to_string());
                self.capture(format!("{} (at node '{}')", error, node));
                return;
            }
            iterations += 1;

            match item {
                CascadeItem::ProcessFire(node) => self.attempt_process_fire(&node, &mut cascade),
                CascadeItem::FsmArrival { node, input } => {
                    self.handle_fsm_arrival(&node, &input, &mut cascade)
                }
            }
        }
    }

    /// Delivers a token reference to one destination, applying the
    /// destination kind's reception rule.
    pub(super) fn deliver(
        &mut self,
        token: TokenId,
        from: &NodeId,
        target: &TargetRef,
        cascade: &mut Cascade,
    ) {
        let def = self.def();
        let config = match def.get(&target.node) {
            Some(config) => config,
            None => {
                self.capture(format!(
                    "delivery from '{}' to unknown node '{}'",
                    from, target.node
                ));
                return;
            }
        };

        match config {
            NodeConfig::Queue(cfg) => {
                self.receive_at_queue(token, &cfg.id, cfg.capacity, from);
            }

            NodeConfig::Process(cfg) => {
                let Some(input) = resolve_input(&target.port, &cfg.inputs) else {
                    self.capture(format!(
                        "delivery from '{}' to '{}' names no resolvable input",
                        from, cfg.id
                    ));
                    return;
                };
                if self.buffer_on_named_input(token, &cfg.id, &input, from) {
                    cascade.push(CascadeItem::ProcessFire(cfg.id.clone()));
                }
            }

            NodeConfig::Fsm(cfg) => {
                let Some(input) = resolve_input(&target.port, &cfg.inputs) else {
                    self.capture(format!(
                        "delivery from '{}' to '{}' names no resolvable input",
                        from, cfg.id
                    ));
                    return;
                };
                if self.buffer_on_named_input(token, &cfg.id, &input, from) {
                    cascade.push(CascadeItem::FsmArrival {
                        node: cfg.id.clone(),
                        input,
                    });
                }
            }

            NodeConfig::EnhancedFsm(cfg) => {
                let value = self.token_value(token);
                match self.states.get_mut(&cfg.id) {
                    Some(NodeState::EnhancedFsm(state)) => state.buffer.push_back(token),
                    _ => {
                        self.capture(format!("no runtime state for '{}'", cfg.id));
                        return;
                    }
                }
                self.log(
                    &cfg.id,
                    ActivityAction::Received,
                    value,
                    format!("token {} buffered from '{}'", token, from),
                );
                self.hop(token, &cfg.id, "buffered");
            }

            NodeConfig::Sink(cfg) => {
                self.consume_at_sink(token, &cfg.id, cfg.retain_limit, from);
            }

            // Sources only produce; Modules declare container semantics the
            // driver does not execute. Both are captured defects.
            NodeConfig::Source(_) | NodeConfig::Module(_) => {
                self.log(
                    &target.node,
                    ActivityAction::Error,
                    None,
                    format!(
                        "token {} from '{}' delivered to non-receiving kind",
                        token, from
                    ),
                );
                self.capture(format!(
                    "token delivered to '{}' ({}), which cannot receive",
                    target.node,
                    config.kind().name()
                ));
            }
        }
    }

    /// Appends a token to a named input buffer of a Process or Fsm node,
    /// logging the arrival. Returns false when the buffer could not be
    /// found (captured, not raised).
    fn buffer_on_named_input(
        &mut self,
        token: TokenId,
        node: &NodeId,
        input: &str,
        from: &NodeId,
    ) -> bool {
        let value = self.token_value(token);

        let pushed = match self.states.get_mut(node) {
            Some(NodeState::Process(state)) => {
                state::buffer_mut(&mut state.buffers, input).map(|buf| buf.push_back(token))
            }
            Some(NodeState::Fsm(state)) => {
                state::buffer_mut(&mut state.buffers, input).map(|buf| buf.push_back(token))
            }
            _ => None,
        };
        if pushed.is_none() {
            self.capture(format!("no input buffer '{}' on node '{}'", input, node));
            return false;
        }

        self.log(
            node,
            ActivityAction::Received,
            value,
            format!("token {} on input '{}' from '{}'", token, input, from),
        );
        self.hop(token, node, format!("received on '{}'", input));
        true
    }

    /// Appends to a token's movement history, capturing unknown ids.
    pub(super) fn hop(&mut self, token: TokenId, node: &NodeId, detail: impl Into<String>) {
        if !self.tokens.record_hop(token, self.tick, node, detail) {
            self.capture(format!("history append for unknown token {}", token));
        }
    }

    pub(super) fn token_value(&self, token: TokenId) -> Option<Value> {
        self.tokens.get(token).map(|rec| rec.value.clone())
    }
}

/// Maps a target's port name onto a declared input. An empty port name
/// resolves only when the destination declares exactly one input.
fn resolve_input(port: &str, inputs: &[InputPort]) -> Option<String> {
    if port.is_empty() {
        if inputs.len() == 1 {
            Some(inputs[0].name.clone())
        } else {
            None
        }
    } else {
        inputs
            .iter()
            .find(|p| p.name == port)
            .map(|p| p.name.clone())
    }
}
