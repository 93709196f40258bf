//! The central validator that turns a raw definition payload into a
//! `GraphDefinition`, or a list of everything wrong with it.

use super::error::{ValidationError, ValidationErrorKind};
use super::rules::{params, ports};
use crate::analysis::Topology;
use crate::graph::{GraphDefinition, NodeConfig, NodeGroup, NodeId};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// The shape the editor sends. Deserialization is the first validation rule:
/// unknown kinds, missing parameters, and malformed machine definitions are
/// rejected here before any semantic check runs.
#[derive(Debug, Deserialize)]
struct RawDefinition {
    #[serde(default)]
    nodes: Vec<NodeConfig>,
    #[serde(default)]
    groups: Vec<NodeGroup>,
    #[serde(default)]
    tags: HashMap<NodeId, Vec<String>>,
}

/// Validates a raw payload into an immutable definition.
///
/// Fail-closed: any error means no definition at all. All discoverable
/// errors are collected in one pass so the editor can show them together,
/// like a linter run before "compilation" (i.e. simulation).
pub fn validate(raw: &serde_json::Value) -> Result<GraphDefinition, Vec<ValidationError>> {
    let payload: RawDefinition = match serde_json::from_value(raw.clone()) {
        Ok(p) => p,
        Err(e) => {
            return Err(vec![ValidationError::new(
                None,
                ValidationErrorKind::MalformedPayload,
                format!("Definition payload rejected: {}", e),
            )]);
        }
    };

    let mut errors = Vec::new();

    // Id uniqueness has to hold before an id-keyed definition can exist.
    let mut seen: HashSet<&NodeId> = HashSet::new();
    for node in &payload.nodes {
        if !seen.insert(node.id()) {
            errors.push(ValidationError::new(
                node.id().clone(),
                ValidationErrorKind::DuplicateNodeId,
                format!("Node id '{}' is declared more than once", node.id()),
            ));
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let def = GraphDefinition::from_parts(payload.nodes, payload.groups, payload.tags);

    let errors = recheck(&def);
    if errors.is_empty() {
        Ok(def)
    } else {
        Err(errors)
    }
}

/// Re-runs the semantic rules against an existing definition. Used on the
/// snapshot-restore path, where the payload shape is already guaranteed.
pub fn recheck(def: &GraphDefinition) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for node in def.nodes() {
        errors.extend(ports::validate_ports(def, node));
        errors.extend(params::validate_params(node));
    }
    errors
}

/// Non-fatal findings about a definition that loaded successfully.
///
/// Currently: Process-only cycles, which can only terminate through the
/// engine's cascade iteration cap.
pub fn warnings(def: &GraphDefinition) -> Vec<String> {
    let topo = Topology::build(def);
    topo.ungated_process_cycles(def)
        .into_iter()
        .map(|cycle| {
            format!(
                "Process cycle with no time-gating: [{}]; firing is bounded only by the cascade cap",
                cycle.join(" -> ")
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn errors_of(payload: serde_json::Value) -> Vec<ValidationError> {
        validate(&payload).expect_err("expected validation failure")
    }

    #[test]
    fn test_minimal_valid_definition() {
        let def = validate(&json!({
            "nodes": [
                {"kind": "source", "id": "s", "interval": 1,
                 "range": {"min": 5.0, "max": 5.0},
                 "outputs": [{"name": "out", "targets": [{"node": "k"}]}]},
                {"kind": "sink", "id": "k"}
            ]
        }))
        .expect("valid definition rejected");
        assert_eq!(def.node_count(), 2);
    }

    #[test]
    fn test_malformed_payload_is_one_error() {
        let errs = errors_of(json!({"nodes": [{"kind": "wormhole", "id": "x"}]}));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ValidationErrorKind::MalformedPayload);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let errs = errors_of(json!({
            "nodes": [
                {"kind": "sink", "id": "a"},
                {"kind": "sink", "id": "a"}
            ]
        }));
        assert_eq!(errs[0].kind, ValidationErrorKind::DuplicateNodeId);
    }

    #[test]
    fn test_dangling_target_rejected() {
        let errs = errors_of(json!({
            "nodes": [
                {"kind": "source", "id": "s", "interval": 1,
                 "range": {"min": 0.0, "max": 1.0},
                 "outputs": [{"name": "out", "targets": [{"node": "ghost"}]}]}
            ]
        }));
        assert!(errs
            .iter()
            .any(|e| e.kind == ValidationErrorKind::DanglingTarget));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let errs = errors_of(json!({
            "nodes": [
                {"kind": "source", "id": "s", "interval": 0,
                 "range": {"min": 0.0, "max": 1.0}}
            ]
        }));
        assert!(errs
            .iter()
            .any(|e| e.kind == ValidationErrorKind::InvalidParameter));
    }

    #[test]
    fn test_unknown_initial_state_rejected() {
        let errs = errors_of(json!({
            "nodes": [
                {"kind": "fsm", "id": "m",
                 "machine": {"initial": "nowhere", "states": [{"name": "idle"}]}}
            ]
        }));
        assert!(errs
            .iter()
            .any(|e| e.kind == ValidationErrorKind::UnknownState));
    }

    #[test]
    fn test_errors_are_collected_not_short_circuited() {
        // One payload, two independent problems: both must be reported.
        let errs = errors_of(json!({
            "nodes": [
                {"kind": "queue", "id": "q", "capacity": 0, "method": "sum", "window": 0}
            ]
        }));
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn test_process_cycle_is_a_warning_not_an_error() {
        let def = validate(&json!({
            "nodes": [
                {"kind": "process", "id": "a",
                 "inputs": [{"name": "in"}],
                 "outputs": [{"name": "out", "formula": "in",
                              "targets": [{"node": "b", "port": "in"}]}]},
                {"kind": "process", "id": "b",
                 "inputs": [{"name": "in"}],
                 "outputs": [{"name": "out", "formula": "in",
                              "targets": [{"node": "a", "port": "in"}]}]}
            ]
        }))
        .expect("cycle must still load");
        let warns = warnings(&def);
        assert_eq!(warns.len(), 1);
        assert!(warns[0].contains("cascade cap"));
    }
}
