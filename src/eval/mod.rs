//! The expression-evaluator contract and its default implementation.
//!
//! The engine treats evaluation as an external collaborator: pure,
//! side-effect-free, and incapable of panicking — every failure comes back
//! as data. The default implementation wraps `rhai` in expression-only
//! mode with an operation cap.

use crate::value::Value;
use std::collections::HashMap;
use thiserror::Error;

/// A failed evaluation, returned as data and isolated by the caller.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("expression '{expression}' failed: {message}")]
pub struct EvalError {
    pub expression: String,
    pub message: String,
}

/// Variable bindings visible to one evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    vars: HashMap<String, Value>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }
}

/// The contract consumed by the engine. Implementations must be pure and
/// must never panic; errors are returned, not thrown.
pub trait ExpressionEvaluator {
    fn evaluate(&self, expression: &str, ctx: &EvalContext) -> Result<Value, EvalError>;
}

/// Default evaluator backed by `rhai`.
///
/// Expression-only (`eval_expression` rejects statements) and capped at a
/// fixed operation count, so a user formula can neither mutate anything
/// nor spin.
pub struct RhaiEvaluator {
    engine: rhai::Engine,
}

impl RhaiEvaluator {
    const MAX_OPERATIONS: u64 = 10_000;

    pub fn new() -> Self {
        let mut engine = rhai::Engine::new();
        engine.set_max_operations(Self::MAX_OPERATIONS);
        Self { engine }
    }
}

impl Default for RhaiEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpressionEvaluator for RhaiEvaluator {
    fn evaluate(&self, expression: &str, ctx: &EvalContext) -> Result<Value, EvalError> {
        let err = |message: String| EvalError {
            expression: expression.to_string(),
            message,
        };

        let mut scope = rhai::Scope::new();
        for (name, value) in ctx.iter() {
            match value {
                Value::Number(n) => scope.push(name.clone(), *n),
                Value::Bool(b) => scope.push(name.clone(), *b),
                Value::Text(s) => scope.push(name.clone(), s.clone()),
            };
        }

        let result = self
            .engine
            .eval_expression_with_scope::<rhai::Dynamic>(&mut scope, expression)
            .map_err(|e| err(e.to_string()))?;

        if result.is::<bool>() {
            result.as_bool().map(Value::Bool).map_err(|t| err(t.into()))
        } else if result.is::<rhai::INT>() {
            result
                .as_int()
                .map(|n| Value::Number(n as f64))
                .map_err(|t| err(t.into()))
        } else if result.is::<rhai::FLOAT>() {
            result
                .as_float()
                .map(Value::Number)
                .map_err(|t| err(t.into()))
        } else if result.is::<rhai::ImmutableString>() {
            result
                .into_string()
                .map(Value::Text)
                .map_err(|t| err(t.into()))
        } else {
            Err(err(format!(
                "unsupported result type '{}'",
                result.type_name()
            )))
        }
    }
}
