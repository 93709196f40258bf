//! Process behavior: reactive join-and-fire with formula transformation.

use super::routing::Cascade;
use super::Engine;
use crate::eval::EvalContext;
use crate::graph::{NodeConfig, NodeId};
use crate::ledger::ActivityAction;
use crate::lineage::TokenId;
use crate::state::{self, NodeState, ProcessPhase};
use crate::value::Value;
use tracing::trace;

impl Engine {
    /// One fire attempt, queued by a token arrival. Fires only when every
    /// declared input holds at least one token; consumes exactly one per
    /// input (FIFO), leaving any surplus queued for the next arrival.
    pub(super) fn attempt_process_fire(&mut self, node: &NodeId, cascade: &mut Cascade) {
        let def = self.def();
        let Some(NodeConfig::Process(cfg)) = def.get(node) else {
            self.capture(format!("fire attempt on non-process node '{}'", node));
            return;
        };

        // Join gate: all inputs must be non-empty.
        match self.states.get(node) {
            Some(NodeState::Process(state)) => {
                if state.buffers.iter().any(|b| b.tokens.is_empty()) {
                    trace!(node = %node, "join incomplete, no fire");
                    return;
                }
            }
            _ => {
                self.capture(format!("no runtime state for '{}'", node));
                return;
            }
        }

        // Pop one token per input, in declared order.
        let mut consumed: Vec<(String, TokenId)> = Vec::with_capacity(cfg.inputs.len());
        let mut missing: Option<String> = None;
        if let Some(NodeState::Process(state)) = self.states.get_mut(node) {
            state.phase = ProcessPhase::Firing;
            state.fires += 1;
            for input in &cfg.inputs {
                let popped = state::buffer_mut(&mut state.buffers, &input.name)
                    .and_then(|buf| buf.pop_front());
                match popped {
                    Some(token) => consumed.push((input.name.clone(), token)),
                    // Gate checked above; an empty pop means the state and
                    // config disagree about declared inputs.
                    None => {
                        missing = Some(input.name.clone());
                        break;
                    }
                }
            }
        }
        if let Some(name) = missing {
            self.capture(format!(
                "input '{}' on '{}' vanished between gate and pop",
                name, node
            ));
            if let Some(NodeState::Process(state)) = self.states.get_mut(node) {
                state.phase = ProcessPhase::Idle;
            }
            return;
        }

        let mut ctx = EvalContext::new();
        for (alias, token) in &consumed {
            let value = self.token_value(*token).unwrap_or(Value::Number(0.0));
            ctx.bind(alias.clone(), value);
            self.hop(*token, node, format!("consumed as '{}'", alias));
        }
        let sources: Vec<TokenId> = consumed.iter().map(|(_, t)| *t).collect();

        let joined = consumed
            .iter()
            .map(|(alias, token)| format!("{}={}", alias, token))
            .collect::<Vec<_>>()
            .join(", ");
        self.log(
            node,
            ActivityAction::Fired,
            None,
            format!("fired on [{}]", joined),
        );

        // Each output evaluates and routes independently: a formula error
        // is logged and surfaced, the remaining outputs still fire.
        for output in &cfg.outputs {
            match self.evaluator.evaluate(&output.formula, &ctx) {
                Ok(value) => {
                    let result = self.tokens.create(node, value.clone(), self.tick, &sources);
                    self.hop(result, node, format!("produced by output '{}'", output.name));
                    self.log(
                        node,
                        ActivityAction::Emitted,
                        Some(value),
                        format!("token {} via output '{}'", result, output.name),
                    );
                    for target in &output.targets {
                        self.deliver(result, node, target, cascade);
                    }
                }
                Err(error) => {
                    self.log(node, ActivityAction::Error, None, error.to_string());
                    self.capture(format!(
                        "process '{}' output '{}': {}",
                        node, output.name, error
                    ));
                }
            }
        }

        if let Some(NodeState::Process(state)) = self.states.get_mut(node) {
            state.phase = ProcessPhase::Idle;
        }
    }
}
