#![doc = r#"
# exp-sandbox

A math expression parser, compiler and evaluator with lexical scopes and a sandbox that
keeps expressions away from the host's reflective-execution primitives.

## Overview

Source text is tokenized and parsed into an immutable expression tree ([`Node`]). A tree
is compiled once against a [`Namespace`] of operator and function implementations into a
[`CompiledExpression`], which can then be evaluated any number of times against
different [`Scope`]s.

Key features:
- Configurable floating-point precision (f32/f64)
- Numbers, booleans, strings, matrices, objects and physical units as values
- Matrix literals `[1, 2; 3, 4]`, 1-based indexing with ranges and `end`, member access
- Variables, indexed assignment and user-defined functions: `function f(x) = x^2`
- Nested scopes with a resolution cache
- Tree rewriting: `map`, `transform`, `filter`, `traverse`, deep clone
- Printing back to source (with three parenthesis modes) and to LaTeX
- A sandbox that refuses `eval`, `Function`, `call`, `apply` and `bind` however they are
  reached

## Quick Start

```rust
use exp_sandbox::{evaluate, Value};

assert_eq!(evaluate("2 + 3 * 4", None).unwrap(), Value::Number(14.0));
assert_eq!(evaluate("2^3^2", None).unwrap(), Value::Number(512.0));
assert_eq!(evaluate("sqrt(3^2 + 4^2)", None).unwrap(), Value::Number(5.0));
```

## Scopes and Functions

A function looks up its free variables when it is called, in the scope it was defined
in. Writes into a sub-scope never reach the parent.

```rust
use exp_sandbox::{evaluate, Scope, Value};

let scope = Scope::new();
evaluate("function f(x) = a * x", Some(&scope)).unwrap();
evaluate("a = 2", Some(&scope)).unwrap();
assert_eq!(evaluate("f(4)", Some(&scope)).unwrap(), Value::Number(8.0));
evaluate("a = 5", Some(&scope)).unwrap();
assert_eq!(evaluate("f(4)", Some(&scope)).unwrap(), Value::Number(20.0));

let child = scope.create_sub_scope();
evaluate("a = 100", Some(&child)).unwrap();
assert_eq!(scope.get("a"), Some(Value::Number(5.0)));
```

## Compile Once, Evaluate Many Times

```rust
use exp_sandbox::{parse, Namespace, Scope, Value};

let node = parse("x^2 + 1").unwrap();
let compiled = node.compile(&Namespace::builtin()).unwrap();
let scope = Scope::new();
for (x, expected) in [(1.0, 2.0), (3.0, 10.0)] {
    scope.set("x", Value::Number(x));
    assert_eq!(compiled.evaluate(&scope).unwrap(), Value::Number(expected));
}
```

## The Sandbox

Host primitives handed to an expression are refused at the moment of the call, whether
they come from a variable, a member of an object or the result of another call.

```rust
use exp_sandbox::{evaluate, ExprError, HostPrimitive, Scope};

let scope = Scope::new();
scope.set("run", HostPrimitive::Eval.value());
let err = evaluate("run(\"1 + 1\")", Some(&scope)).unwrap_err();
assert_eq!(err, ExprError::SandboxViolation { name: "eval".to_string() });
assert_eq!(err.to_string(), "Calling eval is not allowed");
```

## Rewriting Trees

```rust
use std::rc::Rc;
use exp_sandbox::{parse, Node};

let tree = Rc::new(parse("x + y * 2").unwrap());
let replaced = tree.transform(|node| match node.as_ref() {
    Node::Symbol(name) if name == "x" => Rc::new(Node::number(3.0)),
    _ => Rc::clone(node),
});
assert_eq!(replaced.to_string(), "3 + y * 2");
assert_eq!(tree.to_string(), "x + y * 2");
```

## Logging

The crate emits [`tracing`](https://docs.rs/tracing) events (parse and compile at
`debug`, cache hits at `trace`, sandbox refusals at `warn`) and never installs a
subscriber.
"#]

pub mod batch_builder;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod eval;
pub mod expression;
pub mod functions;
pub mod host;
pub mod lexer;
pub mod namespace;
pub mod node;
pub mod sandbox;
pub mod types;
pub mod value;

pub use batch_builder::{BatchEvaluator, Param};
pub use config::EngineConfig;
pub use context::{DefinitionScope, Scope, WeakScope};
pub use engine::{Engine, evaluate, parse, parse_with_config};
pub use error::ExprError;
pub use eval::{CompiledExpression, Frame};
pub use expression::Expression;
pub use host::HostPrimitive;
pub use namespace::Namespace;
pub use node::{FormatOptions, ImplicitMode, Node, ParenthesisMode};
pub use sandbox::Capability;
pub use value::{Function, Matrix, Unit, Value};

/// Define the floating-point type based on feature flags
#[cfg(feature = "f32")]
pub type Real = f32;

#[cfg(not(feature = "f32"))]
pub type Real = f64;

pub mod constants {
    use super::Real;

    #[cfg(feature = "f32")]
    pub const PI: Real = core::f32::consts::PI;
    #[cfg(feature = "f32")]
    pub const E: Real = core::f32::consts::E;
    #[cfg(feature = "f32")]
    pub const TEST_PRECISION: Real = 1e-5;

    #[cfg(not(feature = "f32"))]
    pub const PI: Real = core::f64::consts::PI;
    #[cfg(not(feature = "f32"))]
    pub const E: Real = core::f64::consts::E;
    #[cfg(not(feature = "f32"))]
    pub const TEST_PRECISION: Real = 1e-10;
}

/// Utility macro to check if two floating point values are approximately equal
/// within a specified epsilon. Supports optional format arguments like assert_eq!.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr $(,)?) => {{
        let left_val: $crate::Real = $left;
        let right_val: $crate::Real = $right;
        $crate::assert_approx_eq!(left_val, right_val, $crate::constants::TEST_PRECISION)
    }};
    ($left:expr, $right:expr, $epsilon:expr $(,)?) => {{
        let left_val = $left;
        let right_val = $right;
        let eps = $epsilon;
        $crate::assert_approx_eq!(
            left_val,
            right_val,
            eps,
            "assertion failed: `(left ≈ right)` (left: `{}`, right: `{}`, epsilon: `{}`)",
            left_val,
            right_val,
            eps
        )
    }};
    ($left:expr, $right:expr, $epsilon:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {{
        let left_val = $left;
        let right_val = $right;
        let eps = $epsilon;

        if left_val.is_nan() && right_val.is_nan() {
            // NaN == NaN for our purposes
        } else if left_val.is_infinite()
            && right_val.is_infinite()
            && left_val.signum() == right_val.signum()
        {
            // Same-signed infinities are equal
        } else {
            assert!((left_val - right_val).abs() < eps, $fmt $(, $arg)*);
        }
    }};
}
