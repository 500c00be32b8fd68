//! The function and constant table expressions compile against.
//!
//! Operators compile to lookups of their function names (`add`, `multiply`, ...) in the
//! namespace, so the namespace decides what every operator means. The table also holds
//! constants and the unit definitions consulted when a symbol is bound nowhere else.

use core::fmt;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::Real;
use crate::error::{ExprError, Result};
use crate::functions;
use crate::sandbox;
use crate::value::{Arity, Function, Unit, Value};

/// Scale and dimension of a named unit.
#[derive(Clone, Debug, PartialEq)]
pub struct UnitDefinition {
    /// Size of one unit in the base unit of its dimension.
    pub scale: Real,
    pub dimension: String,
}

/// Name-to-value table of functions and constants, plus unit definitions.
///
/// A namespace never contains a reflective-execution primitive: [`Namespace::insert`]
/// refuses them.
#[derive(Clone, Default)]
pub struct Namespace {
    entries: HashMap<String, Value>,
    units: HashMap<String, UnitDefinition>,
}

thread_local! {
    static BUILTIN: Rc<Namespace> = Rc::new(Namespace::with_builtins());
}

impl Namespace {
    /// Creates an empty namespace. Nothing compiles against it except constants,
    /// symbols and calls to functions added later.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a namespace holding every built-in operator, function, constant and unit.
    pub fn with_builtins() -> Self {
        let mut ns = Self::new();
        functions::register_builtins(&mut ns);
        debug!(
            entries = ns.entries.len(),
            units = ns.units.len(),
            "built-in namespace created"
        );
        ns
    }

    /// The shared built-in namespace of the current thread.
    pub fn builtin() -> Rc<Namespace> {
        BUILTIN.with(Rc::clone)
    }

    /// Adds or replaces an entry. Blocked primitives are refused.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Result<Option<Value>> {
        let name = name.into();
        sandbox::check_value(&value)?;
        Ok(self.entries.insert(name, value))
    }

    /// Registers a native function.
    pub fn register_native<F>(&mut self, name: &str, arity: Arity, implementation: F)
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        self.entries
            .insert(name.to_string(), Value::Function(Function::native(name, arity, implementation)));
    }

    pub fn insert_constant(&mut self, name: &str, value: Real) {
        self.entries.insert(name.to_string(), Value::Number(value));
    }

    pub fn insert_unit(&mut self, name: &str, scale: Real, dimension: &str) {
        self.units.insert(
            name.to_string(),
            UnitDefinition {
                scale,
                dimension: dimension.to_string(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.remove(name)
    }

    /// Looks up a function for compilation.
    pub fn function(&self, name: &str) -> Result<Function> {
        match self.entries.get(name) {
            Some(Value::Function(f)) => Ok(f.clone()),
            _ => Err(ExprError::MissingFunction {
                name: name.to_string(),
            }),
        }
    }

    pub fn unit_definition(&self, name: &str) -> Option<&UnitDefinition> {
        self.units.get(name)
    }

    /// One `name` as a unit value, if `name` is a known unit.
    pub fn unit(&self, name: &str) -> Option<Value> {
        self.units
            .get(name)
            .map(|def| Value::Unit(Unit::new(1.0, name, def.scale, def.dimension.clone())))
    }

    /// Entry names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("entries", &self.entries.len())
            .field("units", &self.units.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostPrimitive;

    #[test]
    fn test_builtins_cover_operator_names() {
        let ns = Namespace::with_builtins();
        for name in [
            "add", "subtract", "multiply", "dotMultiply", "divide", "dotDivide", "mod", "pow",
            "dotPow", "equal", "unequal", "smaller", "larger", "smallerEq", "largerEq",
            "includes", "unaryMinus", "unaryPlus", "not", "factorial", "transpose",
        ] {
            assert!(ns.function(name).is_ok(), "missing operator function {}", name);
        }
    }

    #[test]
    fn test_insert_refuses_blocked_primitives() {
        let mut ns = Namespace::new();
        for primitive in HostPrimitive::ALL {
            let err = ns.insert(primitive.name(), primitive.value()).unwrap_err();
            assert!(matches!(err, ExprError::SandboxViolation { .. }));
        }
        let bound = Value::Function(Function::bound(Function::Host(HostPrimitive::Call), vec![]));
        assert!(ns.insert("wrapped", bound).is_err());
        assert!(ns.names().is_empty());
    }

    #[test]
    fn test_missing_function() {
        let ns = Namespace::new();
        assert_eq!(
            ns.function("add").unwrap_err(),
            ExprError::MissingFunction {
                name: "add".to_string()
            }
        );
    }

    #[test]
    fn test_constant_is_not_a_function() {
        let ns = Namespace::with_builtins();
        assert!(ns.get("pi").is_some());
        assert!(ns.function("pi").is_err());
    }

    #[test]
    fn test_unit_lookup() {
        let ns = Namespace::with_builtins();
        match ns.unit("cm") {
            Some(Value::Unit(u)) => {
                assert_eq!(u.value, 1.0);
                assert_eq!(u.dimension, "length");
            }
            other => panic!("expected unit, got {:?}", other),
        }
        assert!(ns.unit("parsec").is_none());
    }
}
