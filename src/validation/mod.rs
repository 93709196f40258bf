//! Fail-closed definition validation: a raw payload becomes a
//! `GraphDefinition` or a list of structured errors, never something in
//! between.

pub mod error;
mod rules;
pub mod validator;

pub use error::{ValidationError, ValidationErrorKind};
pub use validator::{recheck, validate, warnings};
