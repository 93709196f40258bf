//! Queue behavior: bounded accumulation, windowed aggregation, and
//! one-per-tick output forwarding.

use super::routing::Cascade;
use super::Engine;
use crate::graph::{AggregationMethod, NodeConfig, NodeId};
use crate::ledger::ActivityAction;
use crate::lineage::TokenId;
use crate::state::{NodeState, QueuePhase};
use crate::value::Value;
use tracing::warn;

impl Engine {
    /// Reception rule: capacity-checked append. Overflow is silent data
    /// loss by design — dropped, logged, never retried. The dropped
    /// token's record stays in the lineage tracker, decoupled from any
    /// buffer.
    pub(super) fn receive_at_queue(
        &mut self,
        token: TokenId,
        node: &NodeId,
        capacity: usize,
        from: &NodeId,
    ) {
        let value = self.token_value(token);

        let dropped = match self.states.get_mut(node) {
            Some(NodeState::Queue(state)) => {
                if state.input.len() >= capacity {
                    state.dropped += 1;
                    true
                } else {
                    state.input.push_back(token);
                    if matches!(state.phase, QueuePhase::Idle | QueuePhase::Accumulating) {
                        state.phase = QueuePhase::Accumulating;
                    }
                    false
                }
            }
            _ => {
                self.capture(format!("no runtime state for '{}'", node));
                return;
            }
        };

        if dropped {
            self.dropped += 1;
            warn!(node = %node, %token, "queue overflow, token dropped");
            self.log(
                node,
                ActivityAction::TokenDropped,
                value,
                format!("token {} dropped: capacity {} exceeded", token, capacity),
            );
            self.hop(token, node, "dropped: capacity exceeded");
        } else {
            self.log(
                node,
                ActivityAction::Received,
                value,
                format!("token {} buffered from '{}'", token, from),
            );
            self.hop(token, node, "buffered");
        }
    }

    /// Window pass: when the window has elapsed, reduce the whole input
    /// buffer into one result token (or log a no-op trigger on an empty
    /// buffer). The window restarts in both branches.
    pub(super) fn tick_queue_aggregation(&mut self, node: &NodeId) {
        let def = self.def();
        let Some(NodeConfig::Queue(cfg)) = def.get(node) else {
            return;
        };

        let due = match self.states.get(node) {
            Some(NodeState::Queue(state)) => self.tick >= state.last_aggregation + cfg.window,
            _ => {
                self.capture(format!("no runtime state for '{}'", node));
                return;
            }
        };
        if !due {
            return;
        }

        let tick = self.tick;
        let consumed: Vec<TokenId> = match self.states.get_mut(node) {
            Some(NodeState::Queue(state)) => {
                state.last_aggregation = tick;
                if state.input.is_empty() {
                    state.phase = QueuePhase::Idle;
                    Vec::new()
                } else {
                    state.phase = QueuePhase::Processing;
                    state.input.drain(..).collect()
                }
            }
            _ => return,
        };

        if consumed.is_empty() {
            self.log(
                node,
                ActivityAction::AggregationSkipped,
                None,
                "window elapsed with empty buffer",
            );
            return;
        }

        let values: Vec<Value> = consumed
            .iter()
            .map(|&id| self.token_value(id).unwrap_or(Value::Number(0.0)))
            .collect();
        let result_value = aggregate(cfg.method, &values);

        let result = self
            .tokens
            .create(node, result_value.clone(), tick, &consumed);
        for &id in &consumed {
            self.hop(id, node, format!("aggregated into token {}", result));
        }
        self.hop(result, node, format!("created by {}", cfg.method.name()));

        if let Some(NodeState::Queue(state)) = self.states.get_mut(node) {
            state.output.push_back(result);
            state.aggregations += 1;
            state.phase = QueuePhase::Emitting;
        }
        self.log(
            node,
            ActivityAction::AggregationTriggered,
            Some(result_value),
            format!(
                "{} over {} tokens -> token {}",
                cfg.method.name(),
                consumed.len(),
                result
            ),
        );
    }

    /// Forwarding pass: drains exactly one token per tick from the output
    /// buffer and hands a reference to it to every destination.
    pub(super) fn tick_queue_forwarding(&mut self, node: &NodeId) {
        let def = self.def();
        let Some(NodeConfig::Queue(cfg)) = def.get(node) else {
            return;
        };

        let front = match self.states.get_mut(node) {
            Some(NodeState::Queue(state)) => state.output.pop_front(),
            _ => return,
        };
        let Some(token) = front else {
            return;
        };

        let destinations: usize = cfg.outputs.iter().map(|o| o.targets.len()).sum();
        self.log(
            node,
            ActivityAction::Forwarded,
            self.token_value(token),
            format!("token {} forwarded to {} destinations", token, destinations),
        );
        self.hop(token, node, "forwarded");

        let mut cascade = Cascade::default();
        for port in &cfg.outputs {
            for target in &port.targets {
                self.deliver(token, node, target, &mut cascade);
            }
        }
        self.run_cascade(cascade);

        if let Some(NodeState::Queue(state)) = self.states.get_mut(node) {
            if state.output.is_empty() {
                state.phase = QueuePhase::Idle;
            }
        }
    }
}

/// Reduces buffered token values by the configured method. Non-numeric
/// values contribute 0 to sum/average; first/last return the stored value
/// unchanged. Callers guarantee a non-empty slice.
fn aggregate(method: AggregationMethod, values: &[Value]) -> Value {
    let numeric = || values.iter().filter_map(Value::as_number);
    match method {
        AggregationMethod::Sum => Value::Number(numeric().sum()),
        AggregationMethod::Average => {
            Value::Number(numeric().sum::<f64>() / values.len() as f64)
        }
        AggregationMethod::Count => Value::Number(values.len() as f64),
        AggregationMethod::First => values.first().cloned().unwrap_or(Value::Number(0.0)),
        AggregationMethod::Last => values.last().cloned().unwrap_or(Value::Number(0.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AggregationMethod::Sum, 12.0)]
    #[case(AggregationMethod::Average, 4.0)]
    #[case(AggregationMethod::Count, 3.0)]
    #[case(AggregationMethod::First, 2.0)]
    #[case(AggregationMethod::Last, 6.0)]
    fn test_aggregation_methods(#[case] method: AggregationMethod, #[case] expected: f64) {
        let values = vec![
            Value::Number(2.0),
            Value::Number(4.0),
            Value::Number(6.0),
        ];
        assert_eq!(aggregate(method, &values), Value::Number(expected));
    }

    #[test]
    fn test_non_numeric_values_count_but_do_not_sum() {
        let values = vec![Value::Number(3.0), Value::Text("x".into())];
        assert_eq!(aggregate(AggregationMethod::Sum, &values), Value::Number(3.0));
        assert_eq!(
            aggregate(AggregationMethod::Count, &values),
            Value::Number(2.0)
        );
        assert_eq!(
            aggregate(AggregationMethod::Last, &values),
            Value::Text("x".into())
        );
    }
}
