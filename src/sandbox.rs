//! Refusal of reflective-execution primitives.
//!
//! Two layers enforce the blocklist. The namespace refuses to register a blocked value
//! ([`check_value`]), and every invocation made by compiled code passes [`check_call`]
//! before dispatch. The second layer is what stops primitives that reach an expression
//! indirectly: through a scope variable, as the result of another call, or wrapped in a
//! bound function. Values themselves are never rejected; a blocked primitive may be
//! stored, passed and returned, it just cannot be called.

use bitflags::bitflags;
use tracing::warn;

use crate::error::{ExprError, Result};
use crate::host::HostPrimitive;
use crate::value::{Function, Value};

bitflags! {
    /// Reflective capabilities a callable grants to whoever invokes it.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct Capability: u8 {
        /// Runs source text.
        const EVALUATE = 1 << 0;
        /// Builds a callable from source text.
        const CONSTRUCT = 1 << 1;
        /// Invokes a callable with a substituted argument list.
        const INVOKE = 1 << 2;
    }
}

/// Capabilities expressions may never exercise.
pub const BLOCKED: Capability = Capability::all();

/// Capabilities granted by calling `func`. Bound functions grant those of their target.
pub fn capabilities(func: &Function) -> Capability {
    match func {
        Function::Host(primitive) => primitive.capabilities(),
        Function::Bound(bound) => capabilities(bound.target()),
        Function::Native(_) | Function::User(_) => Capability::empty(),
    }
}

/// The blocked primitive `func` would reach when called, looking through bound wrappers.
pub fn blocked_primitive(func: &Function) -> Option<HostPrimitive> {
    match func {
        Function::Host(primitive) if primitive.capabilities().intersects(BLOCKED) => {
            Some(*primitive)
        }
        Function::Bound(bound) => blocked_primitive(bound.target()),
        _ => None,
    }
}

pub fn is_blocked(func: &Function) -> bool {
    capabilities(func).intersects(BLOCKED)
}

/// Refuses the invocation of a blocked primitive.
pub fn check_call(func: &Function) -> Result<()> {
    match blocked_primitive(func) {
        Some(primitive) => {
            warn!(primitive = primitive.name(), "sandbox refused call");
            Err(ExprError::SandboxViolation {
                name: primitive.name().to_string(),
            })
        }
        None => Ok(()),
    }
}

/// Refuses values that must never be registered in a namespace, including blocked
/// functions nested in matrices or objects.
pub fn check_value(value: &Value) -> Result<()> {
    match value {
        Value::Function(func) => check_call(func),
        Value::Matrix(m) => m.iter().try_for_each(check_value),
        Value::Object(entries) => entries.values().try_for_each(check_value),
        Value::ResultSet(items) => items.iter().try_for_each(check_value),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Arity;

    #[test]
    fn test_every_host_primitive_is_blocked() {
        for primitive in HostPrimitive::ALL {
            let func = Function::Host(primitive);
            assert!(is_blocked(&func), "{} should be blocked", primitive.name());
            assert_eq!(
                check_call(&func),
                Err(ExprError::SandboxViolation {
                    name: primitive.name().to_string()
                })
            );
        }
    }

    #[test]
    fn test_bound_wrapper_reports_target() {
        let inner = Function::bound(Function::Host(HostPrimitive::Eval), vec![]);
        let outer = Function::bound(inner, vec![Value::Number(1.0)]);
        assert_eq!(blocked_primitive(&outer), Some(HostPrimitive::Eval));
        assert_eq!(capabilities(&outer), Capability::EVALUATE);
    }

    #[test]
    fn test_native_functions_pass() {
        let f = Function::native("id", Arity::exact(1), |args| Ok(args[0].clone()));
        assert!(check_call(&f).is_ok());
        assert!(check_call(&Function::bound(f, vec![])).is_ok());
    }

    #[test]
    fn test_nested_values_are_scanned() {
        let m = crate::value::Matrix::row(vec![Value::Number(1.0), HostPrimitive::Apply.value()]);
        let err = check_value(&Value::matrix(m)).unwrap_err();
        assert_eq!(
            err,
            ExprError::SandboxViolation {
                name: "apply".to_string()
            }
        );
    }
}
