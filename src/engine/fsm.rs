//! Fsm behavior: user-defined machines driven by token arrivals, condition
//! re-evaluation, and the tick clock.

use super::routing::Cascade;
use super::Engine;
use crate::eval::EvalContext;
use crate::graph::{ActionDef, FsmConfig, NodeConfig, NodeId, TransitionDef, Trigger};
use crate::ledger::ActivityAction;
use crate::state::{NodeState, TransitionRecord};
use crate::value::Value;
use tracing::trace;

impl Engine {
    /// Per-tick pass: timer transitions first, then a condition sweep.
    pub(super) fn tick_fsm(&mut self, node: &NodeId) {
        let mut cascade = Cascade::default();
        self.run_timer_transitions(node, &mut cascade);
        self.run_condition_transitions(node, &mut cascade);
        self.run_cascade(cascade);
    }

    /// Arrival pass, run from the cascade queue. All token_received
    /// transitions whose `from` matches the state current at arrival
    /// execute in declaration order — there is deliberately no
    /// mutual-exclusion guard between them — followed by a condition sweep
    /// against the live state.
    pub(super) fn handle_fsm_arrival(&mut self, node: &NodeId, input: &str, cascade: &mut Cascade) {
        let def = self.def();
        let Some(NodeConfig::Fsm(cfg)) = def.get(node) else {
            self.capture(format!("fsm arrival on non-fsm node '{}'", node));
            return;
        };
        let Some(at_arrival) = self.fsm_current(node) else {
            self.capture(format!("no runtime state for '{}'", node));
            return;
        };

        for transition in &cfg.machine.transitions {
            if let Trigger::TokenReceived { input: filter } = &transition.trigger {
                let input_matches = filter.as_deref().map_or(true, |f| f == input);
                if input_matches && transition.from == at_arrival {
                    self.execute_transition(node, cfg, transition, "token_received", cascade);
                }
            }
        }

        self.run_condition_transitions_with(node, cfg, cascade);
    }

    /// Timer transitions are checked once per tick against the logical
    /// clock, matching on the live current state as earlier executions
    /// change it.
    fn run_timer_transitions(&mut self, node: &NodeId, cascade: &mut Cascade) {
        let def = self.def();
        let Some(NodeConfig::Fsm(cfg)) = def.get(node) else {
            return;
        };

        for transition in &cfg.machine.transitions {
            if let Trigger::Timer { interval } = &transition.trigger {
                let Some((current, changed_at)) = self.fsm_clock(node) else {
                    return;
                };
                if transition.from == current && self.tick >= changed_at + interval {
                    self.execute_transition(node, cfg, transition, "timer", cascade);
                }
            }
        }
    }

    fn run_condition_transitions(&mut self, node: &NodeId, cascade: &mut Cascade) {
        let def = self.def();
        if let Some(NodeConfig::Fsm(cfg)) = def.get(node) {
            self.run_condition_transitions_with(node, cfg, cascade);
        }
    }

    /// One declaration-order sweep, not a fixpoint: each condition is
    /// evaluated at most once per pass, against whatever state earlier
    /// matches left behind.
    fn run_condition_transitions_with(
        &mut self,
        node: &NodeId,
        cfg: &FsmConfig,
        cascade: &mut Cascade,
    ) {
        for transition in &cfg.machine.transitions {
            let Trigger::Condition { expr } = &transition.trigger else {
                continue;
            };
            let Some(current) = self.fsm_current(node) else {
                return;
            };
            if transition.from != current {
                continue;
            }

            let ctx = self.fsm_eval_context(node);
            match self.evaluator.evaluate(expr, &ctx) {
                Ok(value) if value.is_truthy() => {
                    self.execute_transition(node, cfg, transition, "condition", cascade);
                }
                Ok(_) => {}
                Err(error) => {
                    self.log(node, ActivityAction::Error, None, error.to_string());
                    self.capture(format!("fsm '{}' condition: {}", node, error));
                }
            }
        }
    }

    /// Log, exit actions, state change + history, entry actions — in that
    /// order.
    fn execute_transition(
        &mut self,
        node: &NodeId,
        cfg: &FsmConfig,
        transition: &TransitionDef,
        trigger: &str,
        cascade: &mut Cascade,
    ) {
        trace!(node = %node, from = %transition.from, to = %transition.to, trigger, "transition");
        self.log(
            node,
            ActivityAction::Transition,
            None,
            format!("{} -> {} ({})", transition.from, transition.to, trigger),
        );

        if let Some(old_state) = cfg.machine.state(&transition.from) {
            self.run_actions(node, cfg, &old_state.on_exit, cascade);
        }

        let record = TransitionRecord {
            tick: self.tick,
            from: transition.from.clone(),
            to: transition.to.clone(),
            trigger: trigger.to_string(),
        };
        let cap = self.config.transition_history_cap;
        if let Some(NodeState::Fsm(state)) = self.states.get_mut(node) {
            state.machine.record(record, cap);
        }

        if let Some(new_state) = cfg.machine.state(&transition.to) {
            self.run_actions(node, cfg, &new_state.on_entry, cascade);
        }
    }

    fn run_actions(
        &mut self,
        node: &NodeId,
        cfg: &FsmConfig,
        actions: &[ActionDef],
        cascade: &mut Cascade,
    ) {
        for action in actions {
            match action {
                ActionDef::Emit {
                    output,
                    formula,
                    value,
                } => self.run_emit(node, cfg, output, formula.as_deref(), value.as_ref(), cascade),
                ActionDef::Log { message } => {
                    self.log(node, ActivityAction::ActionLog, None, message.clone());
                }
                ActionDef::SetVariable { name, value } => {
                    if let Some(NodeState::Fsm(state)) = self.states.get_mut(node) {
                        state.variables.insert(name.clone(), value.clone());
                    }
                }
                ActionDef::Increment { name } => self.adjust_variable(node, name, 1.0),
                ActionDef::Decrement { name } => self.adjust_variable(node, name, -1.0),
            }
        }
    }

    /// Numeric adjustment; a missing variable starts from zero, a
    /// non-numeric one is a captured defect.
    fn adjust_variable(&mut self, node: &NodeId, name: &str, delta: f64) {
        let mut non_numeric = false;
        if let Some(NodeState::Fsm(state)) = self.states.get_mut(node) {
            match state.variables.get_mut(name) {
                Some(Value::Number(n)) => *n += delta,
                Some(_) => non_numeric = true,
                None => {
                    state.variables.insert(name.to_string(), Value::Number(delta));
                }
            }
        }
        if non_numeric {
            self.capture(format!("fsm '{}': variable '{}' is not numeric", node, name));
        }
    }

    /// Evaluates or takes the literal payload, creates a root token, and
    /// routes it through the named output. Destination-kind handling comes
    /// from `deliver`: another Fsm gets its token_received pass via the
    /// cascade, a Sink consumes directly.
    fn run_emit(
        &mut self,
        node: &NodeId,
        cfg: &FsmConfig,
        output: &str,
        formula: Option<&str>,
        literal: Option<&Value>,
        cascade: &mut Cascade,
    ) {
        let payload = if let Some(expr) = formula {
            let ctx = self.fsm_eval_context(node);
            match self.evaluator.evaluate(expr, &ctx) {
                Ok(value) => value,
                Err(error) => {
                    self.log(node, ActivityAction::Error, None, error.to_string());
                    self.capture(format!("fsm '{}' emit: {}", node, error));
                    return;
                }
            }
        } else if let Some(value) = literal {
            value.clone()
        } else {
            self.capture(format!(
                "fsm '{}' emit via '{}' carries no payload",
                node, output
            ));
            return;
        };

        let token = self.tokens.create(node, payload.clone(), self.tick, &[]);
        self.hop(token, node, format!("emitted via '{}'", output));
        self.log(
            node,
            ActivityAction::Emitted,
            Some(payload),
            format!("token {} via output '{}'", token, output),
        );

        let Some(port) = cfg.outputs.iter().find(|o| o.name == output) else {
            self.capture(format!(
                "fsm '{}' emit names undeclared output '{}'",
                node, output
            ));
            return;
        };
        for target in &port.targets {
            self.deliver(token, node, target, cascade);
        }
    }

    fn fsm_current(&self, node: &NodeId) -> Option<String> {
        match self.states.get(node) {
            Some(NodeState::Fsm(state)) => Some(state.machine.current.clone()),
            _ => None,
        }
    }

    fn fsm_clock(&self, node: &NodeId) -> Option<(String, u64)> {
        match self.states.get(node) {
            Some(NodeState::Fsm(state)) => {
                Some((state.machine.current.clone(), state.machine.changed_at))
            }
            _ => None,
        }
    }

    /// Machine variables plus the most recent token value per input.
    fn fsm_eval_context(&self, node: &NodeId) -> EvalContext {
        let mut ctx = EvalContext::new();
        if let Some(NodeState::Fsm(state)) = self.states.get(node) {
            for (name, value) in &state.variables {
                ctx.bind(name.clone(), value.clone());
            }
            for buffer in &state.buffers {
                if let Some(&last) = buffer.tokens.back() {
                    if let Some(value) = self.token_value(last) {
                        ctx.bind(buffer.name.clone(), value);
                    }
                }
            }
        }
        ctx
    }
}
