//! Parse-once, compile-once expression handles.
//!
//! An [`Expression`] keeps the source text, the parsed tree and its compiled form
//! together. It is built once and then evaluated against as many scopes as needed; no
//! evaluation touches the tree again.

use core::fmt;
use std::rc::Rc;

use crate::context::Scope;
use crate::engine::{Engine, parse};
use crate::error::Result;
use crate::eval::{CompiledExpression, Frame};
use crate::namespace::Namespace;
use crate::node::Node;
use crate::value::Value;

/// A compiled expression together with its source and tree.
///
/// # Example
/// ```
/// use exp_sandbox::expression::Expression;
/// use exp_sandbox::{Scope, Value};
///
/// let expr = Expression::parse("x^2 + y").unwrap();
/// let scope = Scope::new();
/// scope.set("x", Value::Number(2.0));
/// scope.set("y", Value::Number(3.0));
/// assert_eq!(expr.evaluate(&scope).unwrap(), Value::Number(7.0));
/// ```
#[derive(Clone, Debug)]
pub struct Expression {
    source: String,
    node: Rc<Node>,
    compiled: CompiledExpression,
    frame: Frame,
}

impl Expression {
    /// Parses `source` and compiles it against the built-in namespace.
    pub fn parse(source: &str) -> Result<Self> {
        let node = parse(source)?;
        let compiled = node.compile_default()?;
        Ok(Self {
            source: source.to_string(),
            node: Rc::new(node),
            compiled,
            frame: Frame::default(),
        })
    }

    /// Parses and compiles `source` with the namespace and limits of `engine`.
    pub fn with_engine(source: &str, engine: &Engine) -> Result<Self> {
        let node = engine.parse(source)?;
        let compiled = node.compile(engine.namespace())?;
        Ok(Self {
            source: source.to_string(),
            node: Rc::new(node),
            compiled,
            frame: engine.config().frame(),
        })
    }

    /// Compiles an existing tree, for instance the result of a transform. The source
    /// text is the tree printed back.
    pub fn from_node(node: Rc<Node>, namespace: &Namespace) -> Result<Self> {
        let compiled = node.compile(namespace)?;
        Ok(Self {
            source: node.to_string(),
            node,
            compiled,
            frame: Frame::default(),
        })
    }

    /// Parses, compiles and evaluates `source` in a throwaway scope.
    ///
    /// This is the simplest way to evaluate an expression that doesn't need variables.
    ///
    /// ```
    /// use exp_sandbox::expression::Expression;
    /// use exp_sandbox::Value;
    ///
    /// assert_eq!(Expression::eval_simple("2 + 3 * 4").unwrap(), Value::Number(14.0));
    /// ```
    pub fn eval_simple(source: &str) -> Result<Value> {
        Self::parse(source)?.evaluate(&Scope::new())
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value> {
        self.compiled.evaluate_with(scope, &self.frame)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn node(&self) -> &Rc<Node> {
        &self.node
    }

    pub fn compiled(&self) -> &CompiledExpression {
        &self.compiled
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.node, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::ExprError;
    use proptest::prelude::*;

    #[test]
    fn test_eval_simple() {
        assert_eq!(Expression::eval_simple("2 + 3 * 4").unwrap(), Value::Number(14.0));
        assert_eq!(Expression::eval_simple("(2 + 3) * 4").unwrap(), Value::Number(20.0));
        assert_eq!(Expression::eval_simple("10 / 2 - 3").unwrap(), Value::Number(2.0));
        match Expression::eval_simple("pi").unwrap() {
            Value::Number(n) => crate::assert_approx_eq!(n, crate::constants::PI),
            other => panic!("Expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_reuse_across_scopes() {
        let expr = Expression::parse("a * x").unwrap();
        let first = Scope::new();
        first.set("a", Value::Number(2.0));
        first.set("x", Value::Number(5.0));
        let second = Scope::new();
        second.set("a", Value::Number(-1.0));
        second.set("x", Value::Number(3.0));
        assert_eq!(expr.evaluate(&first).unwrap(), Value::Number(10.0));
        assert_eq!(expr.evaluate(&second).unwrap(), Value::Number(-3.0));
        assert_eq!(expr.evaluate(&first).unwrap(), Value::Number(10.0));
    }

    #[test]
    fn test_source_and_node() {
        let expr = Expression::parse("1+x").unwrap();
        assert_eq!(expr.source(), "1+x");
        assert_eq!(expr.to_string(), "1 + x");
        assert_eq!(expr.node().type_name(), "OperatorNode");
    }

    #[test]
    fn test_from_transformed_node() {
        let expr = Expression::parse("x + 1").unwrap();
        let replaced = expr.node().transform(|node| match node.as_ref() {
            Node::Symbol(name) if name == "x" => Rc::new(Node::number(41.0)),
            _ => Rc::clone(node),
        });
        let rebuilt = Expression::from_node(replaced, &Namespace::builtin()).unwrap();
        assert_eq!(rebuilt.source(), "41 + 1");
        assert_eq!(rebuilt.evaluate(&Scope::new()).unwrap(), Value::Number(42.0));
    }

    #[test]
    fn test_engine_limits_apply() {
        let engine = Engine::new().with_config(EngineConfig {
            max_call_depth: 4,
            ..EngineConfig::default()
        });
        let scope = engine.scope();
        Expression::with_engine("function f(n) = n > 0 ? f(n - 1) : 0", &engine)
            .unwrap()
            .evaluate(&scope)
            .unwrap();
        let shallow = Expression::with_engine("f(3)", &engine).unwrap();
        assert_eq!(shallow.evaluate(&scope).unwrap(), Value::Number(0.0));
        let deep = Expression::with_engine("f(10)", &engine).unwrap();
        assert!(matches!(deep.evaluate(&scope), Err(ExprError::RecursionLimit(_))));
    }

    proptest! {
        #[test]
        fn prop_eval_simple_arithmetic_properties(a in -1000i32..1000, b in -1000i32..1000) {
            let add1 = Expression::eval_simple(&format!("{} + {}", a, b)).unwrap();
            let add2 = Expression::eval_simple(&format!("{} + {}", b, a)).unwrap();
            prop_assert_eq!(add1, add2);

            let mul1 = Expression::eval_simple(&format!("{} * {}", a, b)).unwrap();
            let mul2 = Expression::eval_simple(&format!("{} * {}", b, a)).unwrap();
            prop_assert_eq!(mul1, mul2);

            let id_add = Expression::eval_simple(&format!("{} + 0", a)).unwrap();
            prop_assert_eq!(id_add, Value::Number(a as crate::Real));
        }
    }
}
