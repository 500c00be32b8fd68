//! Batch expression evaluation with shared parameters.
//!
//! A [`BatchEvaluator`] compiles several expressions once and evaluates them together
//! against one scope after the caller updates a set of named parameters. This is the
//! shape of a sweep or a simulation loop: the same formulas, many parameter sets.

use crate::context::Scope;
use crate::engine::Engine;
use crate::error::{ExprError, Result};
use crate::expression::Expression;
use crate::value::Value;

/// A parameter with its name and current value
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub value: Value,
}

/// Expressions evaluated together over shared parameters.
///
/// Parameters are written into the evaluator's scope before every [`eval`], so
/// expressions see the latest values; assignments made by one expression are visible to
/// the expressions after it.
///
/// [`eval`]: BatchEvaluator::eval
#[derive(Debug)]
pub struct BatchEvaluator {
    engine: Engine,
    scope: Scope,
    expressions: Vec<Expression>,
    params: Vec<Param>,
    results: Vec<Option<Value>>,
}

impl Default for BatchEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchEvaluator {
    pub fn new() -> Self {
        Self::with_engine(Engine::new())
    }

    pub fn with_engine(engine: Engine) -> Self {
        let scope = engine.scope();
        Self {
            engine,
            scope,
            expressions: Vec::new(),
            params: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Add an expression to be evaluated
    ///
    /// The expression is parsed and compiled immediately. Returns its index.
    pub fn add_expression(&mut self, source: &str) -> Result<usize> {
        let expression = Expression::with_engine(source, &self.engine)?;
        let idx = self.expressions.len();
        self.expressions.push(expression);
        self.results.push(None);
        Ok(idx)
    }

    /// Add a parameter with an initial value. Returns its index.
    pub fn add_parameter(&mut self, name: &str, initial_value: impl Into<Value>) -> Result<usize> {
        if self.params.iter().any(|p| p.name == name) {
            return Err(ExprError::DuplicateParameter(name.to_string()));
        }
        let idx = self.params.len();
        self.params.push(Param {
            name: name.to_string(),
            value: initial_value.into(),
        });
        Ok(idx)
    }

    pub fn set_param(&mut self, idx: usize, value: impl Into<Value>) -> Result<()> {
        self.params
            .get_mut(idx)
            .ok_or(ExprError::InvalidParameterIndex(idx))?
            .value = value.into();
        Ok(())
    }

    pub fn set_param_by_name(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ExprError::UndefinedSymbol {
                name: name.to_string(),
            })?
            .value = value.into();
        Ok(())
    }

    /// Evaluates every expression in insertion order with the current parameter values.
    ///
    /// Stops at the first failing expression; results of the expressions before it are
    /// updated, the others keep their previous value.
    pub fn eval(&mut self) -> Result<()> {
        for param in &self.params {
            self.scope.set(param.name.clone(), param.value.clone());
        }
        for (expression, slot) in self.expressions.iter().zip(self.results.iter_mut()) {
            *slot = Some(expression.evaluate(&self.scope)?);
        }
        Ok(())
    }

    /// Result of the expression at `idx` from the last successful evaluation.
    pub fn get_result(&self, idx: usize) -> Option<&Value> {
        self.results.get(idx).and_then(Option::as_ref)
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn expression_count(&self) -> usize {
        self.expressions.len()
    }

    pub fn get_param(&self, idx: usize) -> Option<&Param> {
        self.params.get(idx)
    }

    pub fn get_param_by_name(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The scope the expressions run in.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}
