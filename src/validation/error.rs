//! Defines the error types for the validation module.
use crate::graph::NodeId;
use serde::Serialize;
use thiserror::Error;

/// The specific category of a validation error.
///
/// This enum allows for programmatic inspection of errors, which is more
/// robust than string matching on the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// The raw payload could not be deserialized into node configs at all.
    MalformedPayload,
    /// Two nodes share an id.
    DuplicateNodeId,
    /// A target reference points at a node that does not exist.
    DanglingTarget,
    /// A target reference names an input port the destination lacks.
    UnknownPort,
    /// A kind-specific parameter is out of range or inconsistent.
    InvalidParameter,
    /// A machine definition references a state it never declares.
    UnknownState,
}

/// A structured error report from the definition validator.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message}")]
pub struct ValidationError {
    /// The node the error was detected on, when attributable.
    pub node_id: Option<NodeId>,
    pub kind: ValidationErrorKind,
    /// A human-readable message explaining the error.
    pub message: String,
}

impl ValidationError {
    pub fn new(node_id: impl Into<Option<NodeId>>, kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            message: message.into(),
        }
    }
}
