//! Validation rule for port wiring: every target reference must point at an
//! existing node, name an input the destination actually declares, and never
//! point at a kind that cannot receive tokens.

use crate::graph::{GraphDefinition, NodeConfig, NodeId, NodeKind, TargetRef};
use crate::validation::error::{ValidationError, ValidationErrorKind};

pub(crate) fn validate_ports(def: &GraphDefinition, node: &NodeConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for target in node.all_targets() {
        if let Some(err) = check_target(def, node.id(), target) {
            errors.push(err);
        }
    }

    errors
}

fn check_target(def: &GraphDefinition, from: &NodeId, target: &TargetRef) -> Option<ValidationError> {
    let dest = match def.get(&target.node) {
        Some(dest) => dest,
        None => {
            return Some(ValidationError::new(
                from.clone(),
                ValidationErrorKind::DanglingTarget,
                format!("Node '{}' targets unknown node '{}'", from, target.node),
            ));
        }
    };

    match dest.kind() {
        // These kinds receive on a single implicit input; the port name in
        // the reference is ignored at runtime.
        NodeKind::Queue | NodeKind::Sink | NodeKind::EnhancedFsm | NodeKind::Module => None,

        // Sources only produce.
        NodeKind::Source => Some(ValidationError::new(
            from.clone(),
            ValidationErrorKind::UnknownPort,
            format!(
                "Node '{}' targets source '{}', which cannot receive tokens",
                from, target.node
            ),
        )),

        // Process and Fsm reception is keyed by input name: the reference
        // must name a declared input, unless the destination has exactly one
        // (the editor omits the port in that case).
        NodeKind::Process | NodeKind::Fsm => {
            let inputs = dest.input_names();
            let resolved = if target.port.is_empty() {
                inputs.len() == 1
            } else {
                inputs.iter().any(|name| *name == target.port)
            };
            if resolved {
                None
            } else {
                Some(ValidationError::new(
                    from.clone(),
                    ValidationErrorKind::UnknownPort,
                    format!(
                        "Node '{}' targets input '{}' on '{}', which declares {:?}",
                        from, target.port, target.node, inputs
                    ),
                ))
            }
        }
    }
}
