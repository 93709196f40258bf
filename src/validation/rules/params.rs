//! Validation rules for kind-specific parameters: intervals and windows must
//! be at least one tick, capacities non-zero, ranges ordered, machine
//! definitions internally consistent.

use crate::graph::{ActionDef, FsmConfig, NodeConfig, Trigger};
use crate::validation::error::{ValidationError, ValidationErrorKind};
use std::collections::HashSet;

pub(crate) fn validate_params(node: &NodeConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let id = node.id().clone();

    let param_err = |message: String| {
        ValidationError::new(id.clone(), ValidationErrorKind::InvalidParameter, message)
    };

    match node {
        NodeConfig::Source(c) => {
            if c.interval == 0 {
                errors.push(param_err(format!(
                    "Source '{}' has a zero emission interval",
                    c.id
                )));
            }
            if c.range.min > c.range.max {
                errors.push(param_err(format!(
                    "Source '{}' range is inverted ({} > {})",
                    c.id, c.range.min, c.range.max
                )));
            }
        }

        NodeConfig::Queue(c) => {
            if c.capacity == 0 {
                errors.push(param_err(format!("Queue '{}' has zero capacity", c.id)));
            }
            if c.window == 0 {
                errors.push(param_err(format!(
                    "Queue '{}' has a zero aggregation window",
                    c.id
                )));
            }
        }

        NodeConfig::Process(c) => {
            if c.inputs.is_empty() {
                errors.push(param_err(format!("Process '{}' declares no inputs", c.id)));
            }
            if c.outputs.is_empty() {
                errors.push(param_err(format!("Process '{}' declares no outputs", c.id)));
            }
            let mut seen = HashSet::new();
            for input in &c.inputs {
                if !seen.insert(input.name.as_str()) {
                    errors.push(param_err(format!(
                        "Process '{}' declares duplicate input alias '{}'",
                        c.id, input.name
                    )));
                }
            }
            for output in &c.outputs {
                if output.formula.trim().is_empty() {
                    errors.push(param_err(format!(
                        "Process '{}' output '{}' has an empty formula",
                        c.id, output.name
                    )));
                }
            }
        }

        NodeConfig::Fsm(c) => errors.extend(validate_machine(c)),

        NodeConfig::Sink(c) => {
            if c.retain_limit == Some(0) {
                errors.push(param_err(format!(
                    "Sink '{}' has a zero retention limit",
                    c.id
                )));
            }
        }

        // The richer surfaces are retained but inert; only shape is checked,
        // and shape is enforced by deserialization.
        NodeConfig::EnhancedFsm(_) | NodeConfig::Module(_) => {}
    }

    errors
}

fn validate_machine(c: &FsmConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let state_err = |message: String| {
        ValidationError::new(c.id.clone(), ValidationErrorKind::UnknownState, message)
    };

    if !c.machine.has_state(&c.machine.initial) {
        errors.push(state_err(format!(
            "Machine on '{}' starts in undeclared state '{}'",
            c.id, c.machine.initial
        )));
    }

    let mut seen = HashSet::new();
    for state in &c.machine.states {
        if !seen.insert(state.name.as_str()) {
            errors.push(ValidationError::new(
                c.id.clone(),
                ValidationErrorKind::InvalidParameter,
                format!("Machine on '{}' declares state '{}' twice", c.id, state.name),
            ));
        }
    }

    for (i, t) in c.machine.transitions.iter().enumerate() {
        for end in [&t.from, &t.to] {
            if !c.machine.has_state(end) {
                errors.push(state_err(format!(
                    "Machine on '{}' transition #{} references undeclared state '{}'",
                    c.id, i, end
                )));
            }
        }
        match &t.trigger {
            Trigger::Condition { expr } if expr.trim().is_empty() => {
                errors.push(ValidationError::new(
                    c.id.clone(),
                    ValidationErrorKind::InvalidParameter,
                    format!("Machine on '{}' transition #{} has an empty condition", c.id, i),
                ));
            }
            Trigger::Timer { interval } if *interval == 0 => {
                errors.push(ValidationError::new(
                    c.id.clone(),
                    ValidationErrorKind::InvalidParameter,
                    format!("Machine on '{}' transition #{} has a zero timer", c.id, i),
                ));
            }
            _ => {}
        }
    }

    // Emit actions must name a declared output and carry exactly one payload.
    let outputs: HashSet<&str> = c.outputs.iter().map(|o| o.name.as_str()).collect();
    let actions = c.machine.states.iter().flat_map(|s| {
        s.on_entry.iter().chain(s.on_exit.iter()).map(move |a| (s.name.as_str(), a))
    });
    for (state_name, action) in actions {
        if let ActionDef::Emit { output, formula, value } = action {
            if !outputs.contains(output.as_str()) {
                errors.push(ValidationError::new(
                    c.id.clone(),
                    ValidationErrorKind::UnknownPort,
                    format!(
                        "Machine on '{}' state '{}' emits through undeclared output '{}'",
                        c.id, state_name, output
                    ),
                ));
            }
            if formula.is_some() == value.is_some() {
                errors.push(ValidationError::new(
                    c.id.clone(),
                    ValidationErrorKind::InvalidParameter,
                    format!(
                        "Machine on '{}' state '{}' emit must carry exactly one of formula/value",
                        c.id, state_name
                    ),
                ));
            }
        }
    }

    errors
}
