use std::rc::Rc;

use exp_sandbox::node::CustomNode;
use exp_sandbox::types::BinaryOperator;
use exp_sandbox::{Node, Scope, Value, evaluate, parse};

fn tree(source: &str) -> Rc<Node> {
    Rc::new(parse(source).unwrap())
}

#[test]
fn test_identity_map_builds_an_equal_tree() {
    let original = tree("f(x, 2) + [1, y]");
    let mapped = Rc::new(original.map(|child| Ok(Rc::clone(child))).unwrap());
    assert_eq!(mapped, original);
    assert!(!Rc::ptr_eq(&mapped, &original));
    for (before, after) in original.children().iter().zip(mapped.children()) {
        assert!(Rc::ptr_eq(before, after));
    }
}

#[test]
fn test_map_stops_at_first_error() {
    let original = tree("a + b");
    let mut seen = 0;
    let result = original.map(|child| {
        seen += 1;
        Err(exp_sandbox::ExprError::Other(format!("refused {}", child)))
    });
    assert_eq!(
        result.unwrap_err(),
        exp_sandbox::ExprError::Other("refused a".to_string())
    );
    assert_eq!(seen, 1);
}

#[test]
fn test_substitution_then_evaluation() {
    let formula = tree("a * x^2 + b");
    let substituted = formula.transform(|node| match node.as_ref() {
        Node::Symbol(name) if name == "x" => tree("(t + 1)"),
        _ => Rc::clone(node),
    });
    assert_eq!(substituted.to_string(), "a * (t + 1) ^ 2 + b");
    assert_eq!(formula.to_string(), "a * x ^ 2 + b");

    let scope = Scope::new();
    scope.set("a", Value::Number(2.0));
    scope.set("b", Value::Number(1.0));
    scope.set("t", Value::Number(2.0));
    assert_eq!(substituted.evaluate(&scope).unwrap(), Value::Number(19.0));
}

#[test]
fn test_rewritten_operands_are_printed_with_parentheses() {
    // The replacement is a bare sum; printing must still group it under the product.
    let formula = tree("2 * x");
    let substituted = formula.transform(|node| match node.as_ref() {
        Node::Symbol(name) if name == "x" => Rc::new(Node::binary(
            BinaryOperator::Add,
            Node::symbol("y"),
            Node::number(1.0),
        )),
        _ => Rc::clone(node),
    });
    assert_eq!(substituted.to_string(), "2 * (y + 1)");
    assert_eq!(
        evaluate(&format!("y = 4; {}", substituted), None).unwrap(),
        Value::ResultSet(Rc::new(vec![Value::Number(10.0)]))
    );
}

#[test]
fn test_constant_folding() {
    let folded = tree("x * (2 + 3) - 4 / 2").transform(|node| {
        if node.children().is_empty() || !node.filter(|n| matches!(n, Node::Symbol(_))).is_empty()
        {
            return Rc::clone(node);
        }
        match node.evaluate(&Scope::new()) {
            Ok(Value::Number(n)) => Rc::new(Node::number(n)),
            _ => Rc::clone(node),
        }
    });
    assert_eq!(folded.to_string(), "x * 5 - 2");
}

#[test]
fn test_filter_and_traverse() {
    let program = tree("function f(x) = x + a\ny = f(2) * a");
    let assignments = program.filter(|node| {
        matches!(node, Node::Assignment { .. } | Node::FunctionDefinition { .. })
    });
    assert_eq!(assignments.len(), 2);

    let uses_of_a = program.filter(|node| matches!(node, Node::Symbol(name) if name == "a"));
    assert_eq!(uses_of_a.len(), 2);

    let mut depth_of_x = Vec::new();
    program.traverse(|node, parent| {
        if matches!(node.as_ref(), Node::Symbol(name) if name == "x") {
            depth_of_x.push(parent.map(|p| p.type_name()));
        }
    });
    assert_eq!(depth_of_x, vec![Some("OperatorNode")]);
}

#[test]
fn test_deep_clone_is_independent() {
    let original = tree("[1, 2; a, b][1, end]");
    let copy = Rc::new(original.deep_clone());
    assert_eq!(copy, original);
    let shared = original
        .filter(|_| true)
        .iter()
        .zip(copy.filter(|_| true).iter())
        .filter(|(a, b)| Rc::ptr_eq(a, b))
        .count();
    assert_eq!(shared, 0);
}

#[test]
fn test_custom_node() {
    let clamp = Node::Custom(CustomNode {
        name: "clamp01".to_string(),
        args: vec![tree("x * 2")],
        handler: Rc::new(|values: &[Value]| -> exp_sandbox::error::Result<Value> {
            let v = values[0].to_number("clamp01")?;
            Ok(Value::Number(v.clamp(0.0, 1.0)))
        }),
    });
    assert_eq!(clamp.type_name(), "CustomNode");
    assert_eq!(clamp.to_string(), "clamp01(x * 2)");

    let scope = Scope::new();
    scope.set("x", Value::Number(0.25));
    assert_eq!(clamp.evaluate(&scope).unwrap(), Value::Number(0.5));
    scope.set("x", Value::Number(3.0));
    assert_eq!(clamp.evaluate(&scope).unwrap(), Value::Number(1.0));

    let wrapped = Rc::new(Node::binary(BinaryOperator::Add, clamp, Node::number(1.0)));
    let symbols = wrapped.filter(|n| matches!(n, Node::Symbol(_)));
    assert_eq!(symbols.len(), 1);
}
