//! Function invocation.

use tracing::trace;

use super::Frame;
use crate::context::Scope;
use crate::error::{ExprError, Result};
use crate::sandbox;
use crate::value::{Function, UserFunction, Value};

/// Invokes `function` on behalf of an expression. Blocked primitives are refused before
/// anything else happens, including through bound wrappers.
pub(crate) fn invoke(function: &Function, args: Vec<Value>, scope: &Scope, frame: &Frame) -> Result<Value> {
    sandbox::check_call(function)?;
    dispatch(function, args, scope, frame, true)
}

/// Invokes `function` on behalf of the host, without consulting the sandbox.
pub(crate) fn invoke_trusted(
    function: &Function,
    args: Vec<Value>,
    scope: &Scope,
    frame: &Frame,
) -> Result<Value> {
    dispatch(function, args, scope, frame, false)
}

fn dispatch(function: &Function, args: Vec<Value>, scope: &Scope, frame: &Frame, sandboxed: bool) -> Result<Value> {
    match function {
        Function::Native(native) => {
            native.arity.check(&native.name, args.len())?;
            (native.implementation)(&args)
        }
        Function::User(user) => call_user(user, args, frame),
        Function::Bound(bound) => {
            let mut all = bound.args.clone();
            all.extend(args);
            if sandboxed {
                invoke(&bound.target, all, scope, frame)
            } else {
                invoke_trusted(&bound.target, all, scope, frame)
            }
        }
        Function::Host(primitive) if sandboxed => Err(ExprError::SandboxViolation {
            name: primitive.name().to_string(),
        }),
        Function::Host(primitive) => primitive.invoke(&args, scope),
    }
}

/// Calls a user-defined function in a fresh child of its defining scope.
fn call_user(user: &UserFunction, args: Vec<Value>, frame: &Frame) -> Result<Value> {
    if args.len() != user.params.len() {
        return Err(ExprError::InvalidArity {
            name: user.name.clone(),
            expected: user.params.len().to_string(),
            found: args.len(),
        });
    }
    let inner = frame.nested()?;
    let definition = user.scope.upgrade().ok_or_else(|| ExprError::ScopeReleased {
        name: user.name.clone(),
    })?;
    trace!(name = %user.name, depth = inner.depth, "calling user function");
    let local = definition.create_sub_scope();
    for (param, arg) in user.params.iter().zip(args) {
        local.set(param.clone(), arg);
    }
    user.body.evaluate_with(&local, &inner)
}
