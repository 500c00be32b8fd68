//! Reflective-execution primitives of the host runtime.
//!
//! These are the operations that would let an expression escape its namespace: run source
//! text (`eval`), build a callable from source text (`Function`), or invoke a callable with
//! a substituted argument list (`call`, `apply`, `bind`). The host may use them freely from
//! Rust through [`HostPrimitive::invoke`]. Values wrapping them may flow through scopes and
//! expressions, but the sandbox refuses every attempt to invoke one from an expression.

use std::rc::Rc;

use tracing::debug;

use crate::context::{DefinitionScope, Scope};
use crate::engine;
use crate::error::{ExprError, Result};
use crate::eval::{Frame, call};
use crate::sandbox::Capability;
use crate::value::{Arity, Function, UserFunction, Value};

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum HostPrimitive {
    /// Evaluates source text in a scope.
    Eval,
    /// Builds a function from parameter names and body text.
    FunctionConstructor,
    /// Invokes a function with explicit arguments.
    Call,
    /// Invokes a function with arguments taken from a matrix.
    Apply,
    /// Fixes leading arguments of a function.
    Bind,
}

impl HostPrimitive {
    pub const ALL: [HostPrimitive; 5] = [
        HostPrimitive::Eval,
        HostPrimitive::FunctionConstructor,
        HostPrimitive::Call,
        HostPrimitive::Apply,
        HostPrimitive::Bind,
    ];

    /// Name the primitive is known by in error messages and logs.
    pub fn name(self) -> &'static str {
        match self {
            HostPrimitive::Eval => "eval",
            HostPrimitive::FunctionConstructor => "Function",
            HostPrimitive::Call => "call",
            HostPrimitive::Apply => "apply",
            HostPrimitive::Bind => "bind",
        }
    }

    pub fn capabilities(self) -> Capability {
        match self {
            HostPrimitive::Eval => Capability::EVALUATE,
            HostPrimitive::FunctionConstructor => Capability::CONSTRUCT,
            HostPrimitive::Call | HostPrimitive::Apply | HostPrimitive::Bind => Capability::INVOKE,
        }
    }

    /// The primitive as a value that can be stored in a scope or passed to a function.
    pub fn value(self) -> Value {
        Value::Function(Function::Host(self))
    }

    /// Runs the primitive on behalf of the host.
    ///
    /// This is the trusted path: nothing here consults the sandbox, and functions invoked
    /// through `call` or `apply` may themselves be host primitives.
    pub fn invoke(self, args: &[Value], scope: &Scope) -> Result<Value> {
        debug!(primitive = self.name(), args = args.len(), "host primitive invoked");
        let frame = Frame::default();
        match self {
            HostPrimitive::Eval => {
                Arity::exact(1).check(self.name(), args.len())?;
                let source = expect_str(self, &args[0])?;
                let node = engine::parse(source)?;
                node.compile(&scope.namespace())?.evaluate(scope)
            }
            HostPrimitive::FunctionConstructor => {
                Arity::at_least(1).check(self.name(), args.len())?;
                let (body, params) = args.split_last().ok_or_else(|| {
                    ExprError::type_mismatch(self.name(), "missing function body")
                })?;
                let params = params
                    .iter()
                    .map(|p| expect_str(self, p).map(str::to_string))
                    .collect::<Result<Vec<_>>>()?;
                let body = engine::parse(expect_str(self, body)?)?;
                let compiled = body.compile(&scope.namespace())?;
                Ok(Value::Function(Function::User(Rc::new(UserFunction {
                    name: "anonymous".to_string(),
                    params,
                    body: compiled,
                    scope: DefinitionScope::capture(scope),
                }))))
            }
            HostPrimitive::Call => {
                Arity::at_least(1).check(self.name(), args.len())?;
                let target = expect_function(self, &args[0])?;
                call::invoke_trusted(target, args[1..].to_vec(), scope, &frame)
            }
            HostPrimitive::Apply => {
                Arity::exact(2).check(self.name(), args.len())?;
                let target = expect_function(self, &args[0])?;
                let list = match &args[1] {
                    Value::Matrix(m) => m.data().to_vec(),
                    Value::ResultSet(items) => items.as_ref().clone(),
                    other => {
                        return Err(ExprError::type_mismatch(
                            self.name(),
                            format!("expected a matrix of arguments, got {}", other.type_name()),
                        ));
                    }
                };
                call::invoke_trusted(target, list, scope, &frame)
            }
            HostPrimitive::Bind => {
                Arity::at_least(1).check(self.name(), args.len())?;
                let target = expect_function(self, &args[0])?;
                Ok(Value::Function(Function::bound(target.clone(), args[1..].to_vec())))
            }
        }
    }
}

fn expect_str(primitive: HostPrimitive, value: &Value) -> Result<&str> {
    value.as_str().ok_or_else(|| {
        ExprError::type_mismatch(
            primitive.name(),
            format!("expected a string, got {}", value.type_name()),
        )
    })
}

fn expect_function(primitive: HostPrimitive, value: &Value) -> Result<&Function> {
    value.as_function().ok_or_else(|| {
        ExprError::type_mismatch(
            primitive.name(),
            format!("expected a function, got {}", value.type_name()),
        )
    })
}
