//! Every route by which an expression could reach a reflective primitive must be refused.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use exp_sandbox::error::ExprError;
use exp_sandbox::value::Arity;
use exp_sandbox::{Function, HostPrimitive, Namespace, Scope, Value, evaluate};

use test_helpers::eval_in;

fn violation(name: &str) -> ExprError {
    ExprError::SandboxViolation {
        name: name.to_string(),
    }
}

/// A namespace with `tick()` counting its calls and `leak()` returning the eval primitive.
fn instrumented_namespace(counter: Rc<Cell<u32>>) -> Namespace {
    let mut ns = Namespace::with_builtins();
    ns.register_native("tick", Arity::exact(0), move |_| {
        counter.set(counter.get() + 1);
        Ok(Value::Number(1.0))
    });
    ns.register_native("leak", Arity::exact(0), |_| Ok(HostPrimitive::Eval.value()));
    ns
}

#[test]
fn test_primitive_bound_to_a_variable() {
    let scope = Scope::new();
    for primitive in HostPrimitive::ALL {
        scope.set("f", primitive.value());
        assert_eq!(
            evaluate("f(\"1 + 1\")", Some(&scope)).unwrap_err(),
            violation(primitive.name())
        );
    }
}

#[test]
fn test_primitive_as_object_member() {
    let scope = Scope::new();
    let mut members = BTreeMap::new();
    members.insert("run".to_string(), HostPrimitive::Eval.value());
    scope.set("o", Value::object(members));
    assert_eq!(
        evaluate("o.run(\"2\")", Some(&scope)).unwrap_err(),
        violation("eval")
    );
    assert_eq!(
        evaluate("o[\"run\"](\"2\")", Some(&scope)).unwrap_err(),
        violation("eval")
    );
}

#[test]
fn test_primitive_returned_by_a_call() {
    let scope = Scope::with_namespace(Rc::new(instrumented_namespace(Rc::new(Cell::new(0)))));
    // Holding the primitive is fine, calling it is not.
    assert!(matches!(eval_in(&scope, "g = leak()"), Value::Function(_)));
    assert_eq!(
        evaluate("leak()(\"1\")", Some(&scope)).unwrap_err(),
        violation("eval")
    );
    assert_eq!(evaluate("g(\"1\")", Some(&scope)).unwrap_err(), violation("eval"));
}

#[test]
fn test_primitive_inside_a_matrix() {
    let scope = Scope::new();
    scope.set(
        "fs",
        Value::matrix(exp_sandbox::Matrix::row(vec![
            Value::Number(1.0),
            HostPrimitive::Apply.value(),
        ])),
    );
    assert_eq!(
        evaluate("fs[2](1, 2)", Some(&scope)).unwrap_err(),
        violation("apply")
    );
}

#[test]
fn test_bound_wrapper_is_refused() {
    let scope = Scope::new();
    scope.set(
        "wrapped",
        Value::Function(Function::bound(
            Function::Host(HostPrimitive::Eval),
            vec![Value::from("1 + 1")],
        )),
    );
    assert_eq!(evaluate("wrapped()", Some(&scope)).unwrap_err(), violation("eval"));
}

#[test]
fn test_refusal_has_no_side_effects() {
    let counter = Rc::new(Cell::new(0));
    let scope = Scope::with_namespace(Rc::new(instrumented_namespace(Rc::clone(&counter))));
    scope.set("f", HostPrimitive::Call.value());

    assert_eq!(
        evaluate("f(tick(), tick())", Some(&scope)).unwrap_err(),
        violation("call")
    );
    assert_eq!(counter.get(), 0);

    eval_in(&scope, "tick()");
    assert_eq!(counter.get(), 1);
}

#[test]
fn test_user_function_forwarding_a_primitive() {
    let scope = Scope::new();
    eval_in(&scope, "function run(f, s) = f(s)");
    assert_eq!(eval_in(&scope, "run(sqrt, 16)"), Value::Number(4.0));
    scope.set("e", HostPrimitive::Eval.value());
    assert_eq!(
        evaluate("run(e, \"1\")", Some(&scope)).unwrap_err(),
        violation("eval")
    );
}

#[test]
fn test_namespace_refuses_blocked_values() {
    let mut ns = Namespace::new();
    assert_eq!(
        ns.insert("eval", HostPrimitive::Eval.value()).unwrap_err(),
        violation("eval")
    );
    let mut nested = BTreeMap::new();
    nested.insert("bind".to_string(), HostPrimitive::Bind.value());
    assert_eq!(
        ns.insert("tools", Value::object(nested)).unwrap_err(),
        violation("bind")
    );
    assert!(!ns.contains("eval"));
    assert!(!ns.contains("tools"));
    assert!(ns.insert("answer", Value::Number(42.0)).unwrap().is_none());
}

#[test]
fn test_builtin_namespace_has_no_primitives() {
    let ns = Namespace::builtin();
    for primitive in HostPrimitive::ALL {
        assert!(ns.get(primitive.name()).is_none());
    }
    assert!(matches!(
        evaluate("eval(\"1\")", None),
        Err(ExprError::UndefinedSymbol { .. })
    ));
}

#[test]
fn test_host_keeps_trusted_access() {
    let scope = Scope::new();
    scope.set("x", Value::Number(6.0));
    assert_eq!(
        HostPrimitive::Eval
            .invoke(&[Value::from("x * 7")], &scope)
            .unwrap(),
        Value::Number(42.0)
    );

    let sqrt = Namespace::builtin().get("sqrt").unwrap();
    assert_eq!(
        HostPrimitive::Call
            .invoke(&[sqrt.clone(), Value::Number(81.0)], &scope)
            .unwrap(),
        Value::Number(9.0)
    );

    let made = HostPrimitive::FunctionConstructor
        .invoke(&[Value::from("a"), Value::from("b"), Value::from("a * b")], &scope)
        .unwrap();
    scope.set("mul", made);
    assert_eq!(eval_in(&scope, "mul(6, 7)"), Value::Number(42.0));
}

#[test]
fn test_error_message() {
    let scope = Scope::new();
    scope.set("f", HostPrimitive::FunctionConstructor.value());
    let err = evaluate("f(\"x\", \"x + 1\")", Some(&scope)).unwrap_err();
    assert_eq!(err.to_string(), "Calling Function is not allowed");
}
