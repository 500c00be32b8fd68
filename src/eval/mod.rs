//! Compilation of expression trees into closures.
//!
//! `compile` walks a tree once, resolves every operator and function name it needs from
//! the namespace, and returns a [`CompiledExpression`]: a tree of boxed closures that can
//! be evaluated any number of times against different scopes without touching the source
//! tree again.
//!
//! Evaluation threads a [`Frame`] through the closures. It carries the value of `end`
//! inside index brackets and the call depth used to stop runaway recursion, so no
//! evaluation state lives in globals.

pub(crate) mod call;
pub(crate) mod index;

use core::fmt;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;

use crate::Real;
use crate::config::DEFAULT_MAX_CALL_DEPTH;
use crate::context::{DefinitionScope, Scope};
use crate::error::{ExprError, Result};
use crate::namespace::Namespace;
use crate::node::Node;
use crate::sandbox;
use crate::types::BinaryOperator;
use crate::value::{Function, Matrix, UserFunction, Value};

/// Most cells a range expression or an indexed write may produce.
pub(crate) const MAX_RANGE_LENGTH: usize = 1 << 24;

type EvalFn = dyn Fn(&Scope, &Frame) -> Result<Value>;

/// The executable form of a tree.
#[derive(Clone)]
pub struct CompiledExpression {
    eval: Rc<EvalFn>,
}

impl CompiledExpression {
    fn new<F>(eval: F) -> Self
    where
        F: Fn(&Scope, &Frame) -> Result<Value> + 'static,
    {
        Self {
            eval: Rc::new(eval),
        }
    }

    /// Evaluates in `scope` with a fresh top-level frame.
    pub fn evaluate(&self, scope: &Scope) -> Result<Value> {
        self.evaluate_with(scope, &Frame::default())
    }

    pub fn evaluate_with(&self, scope: &Scope, frame: &Frame) -> Result<Value> {
        (self.eval)(scope, frame)
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompiledExpression")
    }
}

/// Per-evaluation state passed down the closures.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Size of the innermost object being indexed, along the dimension of the index
    /// currently evaluated. `None` outside index brackets.
    pub end: Option<Real>,
    /// Number of user-function calls on the stack.
    pub depth: usize,
    pub max_depth: usize,
}

impl Default for Frame {
    fn default() -> Self {
        Self::with_max_depth(DEFAULT_MAX_CALL_DEPTH)
    }
}

impl Frame {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            end: None,
            depth: 0,
            max_depth,
        }
    }

    pub(crate) fn with_end(&self, end: Option<Real>) -> Frame {
        Frame {
            end,
            ..self.clone()
        }
    }

    /// Frame for the body of a called function.
    pub(crate) fn nested(&self) -> Result<Frame> {
        if self.depth >= self.max_depth {
            return Err(ExprError::RecursionLimit(format!(
                "maximum call depth of {} exceeded",
                self.max_depth
            )));
        }
        Ok(Frame {
            end: None,
            depth: self.depth + 1,
            max_depth: self.max_depth,
        })
    }
}

/// Compiles `node` against `namespace`.
pub fn compile(node: &Node, namespace: &Namespace) -> Result<CompiledExpression> {
    let compiled = compile_node(node, namespace)?;
    debug!(node = node.type_name(), "expression compiled");
    Ok(compiled)
}

fn compile_all(nodes: &[Rc<Node>], ns: &Namespace) -> Result<Vec<CompiledExpression>> {
    nodes.iter().map(|n| compile_node(n, ns)).collect()
}

fn evaluate_all(items: &[CompiledExpression], scope: &Scope, frame: &Frame) -> Result<Vec<Value>> {
    items.iter().map(|c| c.evaluate_with(scope, frame)).collect()
}

fn compile_node(node: &Node, ns: &Namespace) -> Result<CompiledExpression> {
    let compiled = match node {
        Node::Constant(value) => {
            let value = value.clone();
            CompiledExpression::new(move |_, _| Ok(value.clone()))
        }

        Node::Symbol(name) => {
            let name = name.clone();
            if name == "end" {
                CompiledExpression::new(move |scope, frame| match frame.end {
                    Some(end) => Ok(Value::Number(end)),
                    None => scope.resolve(&name),
                })
            } else {
                CompiledExpression::new(move |scope, _| scope.resolve(&name))
            }
        }

        Node::Unary { op, operand } => {
            let function = ns.function(op.function_name())?;
            let operand = compile_node(operand, ns)?;
            CompiledExpression::new(move |scope, frame| {
                let value = operand.evaluate_with(scope, frame)?;
                call::invoke(&function, vec![value], scope, frame)
            })
        }

        Node::Binary {
            op, left, right, ..
        } => {
            let left = compile_node(left, ns)?;
            let right = compile_node(right, ns)?;
            match op.function_name() {
                Some(name) => {
                    let function = ns.function(name)?;
                    CompiledExpression::new(move |scope, frame| {
                        let l = left.evaluate_with(scope, frame)?;
                        let r = right.evaluate_with(scope, frame)?;
                        call::invoke(&function, vec![l, r], scope, frame)
                    })
                }
                None => {
                    let is_and = *op == BinaryOperator::And;
                    CompiledExpression::new(move |scope, frame| {
                        let l = left.evaluate_with(scope, frame)?.is_truthy();
                        if l != is_and {
                            return Ok(Value::Boolean(l));
                        }
                        Ok(Value::Boolean(right.evaluate_with(scope, frame)?.is_truthy()))
                    })
                }
            }
        }

        Node::Conditional {
            condition,
            then,
            otherwise,
        } => {
            let condition = compile_node(condition, ns)?;
            let then = compile_node(then, ns)?;
            let otherwise = compile_node(otherwise, ns)?;
            CompiledExpression::new(move |scope, frame| {
                if condition.evaluate_with(scope, frame)?.is_truthy() {
                    then.evaluate_with(scope, frame)
                } else {
                    otherwise.evaluate_with(scope, frame)
                }
            })
        }

        Node::Range { start, step, end } => {
            let start = compile_node(start, ns)?;
            let step = step.as_ref().map(|s| compile_node(s, ns)).transpose()?;
            let end = compile_node(end, ns)?;
            CompiledExpression::new(move |scope, frame| {
                let from = start.evaluate_with(scope, frame)?.to_number("range")?;
                let by = match &step {
                    Some(step) => step.evaluate_with(scope, frame)?.to_number("range")?,
                    None => 1.0,
                };
                let to = end.evaluate_with(scope, frame)?.to_number("range")?;
                Ok(Value::matrix(build_range(from, by, to)?))
            })
        }

        Node::Index {
            target, indices, ..
        } => {
            let target = compile_node(target, ns)?;
            let indices = compile_all(indices, ns)?;
            CompiledExpression::new(move |scope, frame| {
                let object = target.evaluate_with(scope, frame)?;
                let selection = index::resolve(&object, &indices, scope, frame)?;
                index::subset(&object, &selection)
            })
        }

        Node::ArrayLiteral { rows } => {
            let rows = rows
                .iter()
                .map(|row| compile_all(row, ns))
                .collect::<Result<Vec<_>>>()?;
            CompiledExpression::new(move |scope, frame| {
                let Some(first) = rows.first() else {
                    return Ok(Value::matrix(Matrix::empty()));
                };
                let cols = first.len();
                let mut data = Vec::with_capacity(rows.len() * cols);
                for row in &rows {
                    data.extend(evaluate_all(row, scope, frame)?);
                }
                if rows.len() == 1 {
                    if let Some(stacked) = stack_rows(&data)? {
                        return Ok(Value::matrix(stacked));
                    }
                }
                Ok(Value::matrix(Matrix::new(rows.len(), cols, data)?))
            })
        }

        Node::ObjectLiteral { entries } => {
            let entries = entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), compile_node(value, ns)?)))
                .collect::<Result<Vec<_>>>()?;
            CompiledExpression::new(move |scope, frame| {
                let mut object = BTreeMap::new();
                for (key, value) in &entries {
                    object.insert(key.clone(), value.evaluate_with(scope, frame)?);
                }
                Ok(Value::object(object))
            })
        }

        Node::Call { callee, args } => {
            let label = callee.to_string();
            let callee = compile_node(callee, ns)?;
            let args = compile_all(args, ns)?;
            CompiledExpression::new(move |scope, frame| {
                let Value::Function(function) = callee.evaluate_with(scope, frame)? else {
                    return Err(ExprError::NotAFunction {
                        name: label.clone(),
                    });
                };
                sandbox::check_call(&function)?;
                let values = evaluate_all(&args, scope, frame)?;
                call::invoke(&function, values, scope, frame)
            })
        }

        Node::FunctionDefinition { name, params, body } => {
            let name = name.clone();
            let params = params.clone();
            let body = compile_node(body, ns)?;
            CompiledExpression::new(move |scope, _| {
                let function = Function::User(Rc::new(UserFunction {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    scope: DefinitionScope::capture(scope),
                }));
                debug!(name = %name, params = params.len(), "function defined");
                scope.set(name.clone(), Value::Function(function.clone()));
                Ok(Value::Function(function))
            })
        }

        Node::Assignment { name, value } => {
            let name = name.clone();
            let value = compile_node(value, ns)?;
            CompiledExpression::new(move |scope, frame| {
                let v = value.evaluate_with(scope, frame)?;
                scope.set(name.clone(), v.clone());
                Ok(v)
            })
        }

        Node::IndexedAssignment {
            name,
            indices,
            value,
            dot_notation,
        } => {
            let name = name.clone();
            let creates_object = *dot_notation;
            let indices = compile_all(indices, ns)?;
            let value = compile_node(value, ns)?;
            CompiledExpression::new(move |scope, frame| {
                let current = match scope.get(&name) {
                    Some(current) => current,
                    None if creates_object => Value::object(BTreeMap::new()),
                    None => {
                        return Err(ExprError::UndefinedSymbol { name: name.clone() });
                    }
                };
                let selection = index::resolve(&current, &indices, scope, frame)?;
                let v = value.evaluate_with(scope, frame)?;
                let updated = index::assign(current, &selection, v.clone(), &name)?;
                scope.set(name.clone(), updated);
                Ok(v)
            })
        }

        Node::Block { statements } => {
            let statements = statements
                .iter()
                .map(|s| Ok((compile_node(&s.node, ns)?, s.visible)))
                .collect::<Result<Vec<_>>>()?;
            CompiledExpression::new(move |scope, frame| {
                let mut results = Vec::new();
                for (statement, visible) in &statements {
                    let value = statement.evaluate_with(scope, frame)?;
                    if *visible {
                        results.push(value);
                    }
                }
                Ok(Value::ResultSet(Rc::new(results)))
            })
        }

        Node::Parenthesized(inner) => compile_node(inner, ns)?,

        Node::Custom(custom) => {
            let handler = Rc::clone(&custom.handler);
            let args = compile_all(&custom.args, ns)?;
            CompiledExpression::new(move |scope, frame| {
                let values = evaluate_all(&args, scope, frame)?;
                handler(&values)
            })
        }
    };
    Ok(compiled)
}

/// Inclusive range `from:by:to` as a row vector. A zero step gives the empty matrix.
fn build_range(from: Real, by: Real, to: Real) -> Result<Matrix> {
    if by == 0.0 || from.is_nan() || by.is_nan() || to.is_nan() {
        return Ok(Matrix::empty());
    }
    let span = (to - from) / by;
    if span < 0.0 {
        return Ok(Matrix::empty());
    }
    // Tolerate rounding in fractional steps such as 0:0.1:1.
    let steps = span + span.abs() * Real::EPSILON * 8.0;
    if !steps.is_finite() || steps >= MAX_RANGE_LENGTH as Real {
        return Err(ExprError::CapacityExceeded("range"));
    }
    let count = steps as usize + 1;
    let data = (0..count)
        .map(|i| Value::Number(from + by * i as Real))
        .collect();
    Ok(Matrix::row(data))
}

/// `[[1, 2], [3, 4]]`: a single row whose items are equally long row vectors stacks
/// into a matrix.
fn stack_rows(items: &[Value]) -> Result<Option<Matrix>> {
    let mut cols = None;
    for item in items {
        match item {
            Value::Matrix(m) if m.rows() == 1 && cols.is_none_or(|c| c == m.cols()) => {
                cols = Some(m.cols());
            }
            _ => return Ok(None),
        }
    }
    let Some(cols) = cols else {
        return Ok(None);
    };
    let data = items
        .iter()
        .filter_map(Value::as_matrix)
        .flat_map(|m| m.data().iter().cloned())
        .collect();
    Matrix::new(items.len(), cols, data).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parse;

    fn eval(source: &str) -> Result<Value> {
        let scope = Scope::new();
        parse(source)?.evaluate(&scope)
    }

    fn row(values: &[Real]) -> Value {
        Value::matrix(Matrix::row(values.iter().map(|v| Value::Number(*v)).collect()))
    }

    #[test]
    fn test_ranges() {
        assert_eq!(eval("1:4").unwrap(), row(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(eval("10:-5:0").unwrap(), row(&[10.0, 5.0, 0.0]));
        assert_eq!(eval("0:0.5:1").unwrap(), row(&[0.0, 0.5, 1.0]));
        assert_eq!(eval("3:1").unwrap(), Value::matrix(Matrix::empty()));
        match eval("0:0.1:1").unwrap() {
            Value::Matrix(m) => assert_eq!(m.len(), 11),
            other => panic!("expected matrix, got {:?}", other),
        }
    }

    #[test]
    fn test_short_circuit() {
        let scope = Scope::new();
        let value = parse("false and undefinedThing").unwrap().evaluate(&scope).unwrap();
        assert_eq!(value, Value::Boolean(false));
        let value = parse("1 or undefinedThing").unwrap().evaluate(&scope).unwrap();
        assert_eq!(value, Value::Boolean(true));
        assert!(parse("true and undefinedThing").unwrap().evaluate(&scope).is_err());
    }

    #[test]
    fn test_nested_matrix_literal_stacks_rows() {
        let value = eval("[[1, 2], [3, 4]]").unwrap();
        assert_eq!(
            value,
            Value::matrix(Matrix::from_numbers(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap())
        );
    }

    #[test]
    fn test_missing_operator_fails_at_compile_time() {
        let node = parse("1 + 2").unwrap();
        let err = node.compile(&Namespace::new()).unwrap_err();
        assert_eq!(
            err,
            ExprError::MissingFunction {
                name: "add".to_string()
            }
        );
    }

    #[test]
    fn test_frame_depth_limit() {
        let frame = Frame::with_max_depth(1);
        let inner = frame.nested().unwrap();
        assert_eq!(inner.depth, 1);
        assert!(matches!(inner.nested(), Err(ExprError::RecursionLimit(_))));
    }

    #[test]
    fn test_object_literal() {
        let value = eval("{a: 1, b: 1 + 1}.b").unwrap();
        assert_eq!(value, Value::Number(2.0));
    }

    #[test]
    fn test_calling_a_number_fails() {
        let scope = Scope::new();
        scope.set("x", Value::Number(1.0));
        let err = parse("x(2)").unwrap().evaluate(&scope).unwrap_err();
        assert_eq!(
            err,
            ExprError::NotAFunction {
                name: "x".to_string()
            }
        );
    }
}
