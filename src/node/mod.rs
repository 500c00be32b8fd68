//! The expression tree.
//!
//! A [`Node`] is immutable once built and shares its children through `Rc`, so cloning a
//! subtree is cheap and rewriting one ([`Node::transform`], [`Node::map`]) only rebuilds
//! the path from the root to the changed nodes. Every node can be compiled
//! ([`Node::compile`]), printed back to source ([`Node::to_string_with`]) or to LaTeX
//! ([`Node::to_tex`]), and compared structurally with `==`.

mod display;
mod tex;

use core::fmt;
use std::rc::Rc;

use crate::context::Scope;
use crate::error::Result;
use crate::eval::{self, CompiledExpression};
use crate::namespace::Namespace;
use crate::types::{BinaryOperator, Precedence, UnaryOperator};
use crate::value::Value;

pub use display::{FormatHandler, FormatOptions, ImplicitMode, OutputFormat, ParenthesisMode};

/// Evaluates a custom node from its evaluated arguments.
pub type CustomHandler = Rc<dyn Fn(&[Value]) -> Result<Value>>;

/// A statement of a block: the node and whether its value is part of the block's result.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    pub node: Rc<Node>,
    /// False when the statement was terminated by `;`.
    pub visible: bool,
}

/// A host-supplied node kind. Its arguments are ordinary children; the handler receives
/// their values.
#[derive(Clone)]
pub struct CustomNode {
    pub name: String,
    pub args: Vec<Rc<Node>>,
    pub handler: CustomHandler,
}

impl fmt::Debug for CustomNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomNode")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

impl PartialEq for CustomNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.args == other.args
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// A literal value.
    Constant(Value),
    /// A name resolved through the scope chain when evaluated.
    Symbol(String),
    Unary {
        op: UnaryOperator,
        operand: Rc<Node>,
    },
    Binary {
        op: BinaryOperator,
        left: Rc<Node>,
        right: Rc<Node>,
        /// True for multiplication written by juxtaposition, e.g. `2x`.
        implicit: bool,
    },
    Conditional {
        condition: Rc<Node>,
        then: Rc<Node>,
        otherwise: Rc<Node>,
    },
    Range {
        start: Rc<Node>,
        step: Option<Rc<Node>>,
        end: Rc<Node>,
    },
    /// `target[i, j]`, or `target.name` when `dot_notation` is set, in which case the
    /// single index is a string constant.
    Index {
        target: Rc<Node>,
        indices: Vec<Rc<Node>>,
        dot_notation: bool,
    },
    /// A matrix literal; an empty `rows` is the empty matrix `[]`.
    ArrayLiteral {
        rows: Vec<Vec<Rc<Node>>>,
    },
    ObjectLiteral {
        entries: Vec<(String, Rc<Node>)>,
    },
    Call {
        callee: Rc<Node>,
        args: Vec<Rc<Node>>,
    },
    FunctionDefinition {
        name: String,
        params: Vec<String>,
        body: Rc<Node>,
    },
    Assignment {
        name: String,
        value: Rc<Node>,
    },
    IndexedAssignment {
        name: String,
        indices: Vec<Rc<Node>>,
        value: Rc<Node>,
        dot_notation: bool,
    },
    Block {
        statements: Vec<Statement>,
    },
    Parenthesized(Rc<Node>),
    Custom(CustomNode),
}

impl Node {
    pub fn number(value: crate::Real) -> Node {
        Node::Constant(Value::Number(value))
    }

    pub fn symbol(name: impl Into<String>) -> Node {
        Node::Symbol(name.into())
    }

    pub fn binary(op: BinaryOperator, left: Node, right: Node) -> Node {
        Node::Binary {
            op,
            left: Rc::new(left),
            right: Rc::new(right),
            implicit: false,
        }
    }

    pub fn unary(op: UnaryOperator, operand: Node) -> Node {
        Node::Unary {
            op,
            operand: Rc::new(operand),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Node>) -> Node {
        Node::Call {
            callee: Rc::new(Node::Symbol(name.into())),
            args: args.into_iter().map(Rc::new).collect(),
        }
    }

    /// Name of the node kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Constant(_) => "ConstantNode",
            Node::Symbol(_) => "SymbolNode",
            Node::Unary { .. } | Node::Binary { .. } => "OperatorNode",
            Node::Conditional { .. } => "ConditionalNode",
            Node::Range { .. } => "RangeNode",
            Node::Index { .. } => "IndexNode",
            Node::ArrayLiteral { .. } => "ArrayNode",
            Node::ObjectLiteral { .. } => "ObjectNode",
            Node::Call { .. } => "FunctionNode",
            Node::FunctionDefinition { .. } => "FunctionAssignmentNode",
            Node::Assignment { .. } | Node::IndexedAssignment { .. } => "AssignmentNode",
            Node::Block { .. } => "BlockNode",
            Node::Parenthesized(_) => "ParenthesisNode",
            Node::Custom(_) => "CustomNode",
        }
    }

    /// Binding strength of the node when printed as an operand.
    pub fn precedence(&self) -> Precedence {
        match self {
            Node::Constant(Value::Number(n)) if n.is_sign_negative() => Precedence::Unary,
            Node::Constant(Value::Unit(_)) => Precedence::Multiplicative,
            Node::Unary { op, .. } => op.precedence(),
            Node::Binary { op, .. } => op.precedence(),
            Node::Conditional { .. } => Precedence::Conditional,
            Node::Range { .. } => Precedence::Range,
            Node::FunctionDefinition { .. }
            | Node::Assignment { .. }
            | Node::IndexedAssignment { .. } => Precedence::Assignment,
            Node::Block { .. } => Precedence::Block,
            _ => Precedence::Primary,
        }
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<&Rc<Node>> {
        match self {
            Node::Constant(_) | Node::Symbol(_) => Vec::new(),
            Node::Unary { operand, .. } => vec![operand],
            Node::Binary { left, right, .. } => vec![left, right],
            Node::Conditional {
                condition,
                then,
                otherwise,
            } => vec![condition, then, otherwise],
            Node::Range { start, step, end } => {
                let mut children = vec![start];
                children.extend(step.iter());
                children.push(end);
                children
            }
            Node::Index {
                target, indices, ..
            } => {
                let mut children = vec![target];
                children.extend(indices.iter());
                children
            }
            Node::ArrayLiteral { rows } => rows.iter().flatten().collect(),
            Node::ObjectLiteral { entries } => entries.iter().map(|(_, v)| v).collect(),
            Node::Call { callee, args } => {
                let mut children = vec![callee];
                children.extend(args.iter());
                children
            }
            Node::FunctionDefinition { body, .. } => vec![body],
            Node::Assignment { value, .. } => vec![value],
            Node::IndexedAssignment { indices, value, .. } => {
                let mut children: Vec<&Rc<Node>> = indices.iter().collect();
                children.push(value);
                children
            }
            Node::Block { statements } => statements.iter().map(|s| &s.node).collect(),
            Node::Parenthesized(inner) => vec![inner],
            Node::Custom(custom) => custom.args.iter().collect(),
        }
    }

    /// Builds a new node of the same kind with every child replaced by `f(child)`.
    ///
    /// Children are visited in the order [`Node::children`] returns them. The first error
    /// returned by `f` aborts the rebuild.
    pub fn map<F>(&self, mut f: F) -> Result<Node>
    where
        F: FnMut(&Rc<Node>) -> Result<Rc<Node>>,
    {
        self.rebuild(&mut f)
    }

    fn rebuild(&self, f: &mut dyn FnMut(&Rc<Node>) -> Result<Rc<Node>>) -> Result<Node> {
        fn all(
            nodes: &[Rc<Node>],
            f: &mut dyn FnMut(&Rc<Node>) -> Result<Rc<Node>>,
        ) -> Result<Vec<Rc<Node>>> {
            nodes.iter().map(|n| f(n)).collect()
        }

        let node = match self {
            Node::Constant(_) | Node::Symbol(_) => self.clone(),
            Node::Unary { op, operand } => Node::Unary {
                op: *op,
                operand: f(operand)?,
            },
            Node::Binary {
                op,
                left,
                right,
                implicit,
            } => Node::Binary {
                op: *op,
                left: f(left)?,
                right: f(right)?,
                implicit: *implicit,
            },
            Node::Conditional {
                condition,
                then,
                otherwise,
            } => Node::Conditional {
                condition: f(condition)?,
                then: f(then)?,
                otherwise: f(otherwise)?,
            },
            Node::Range { start, step, end } => {
                let start = f(start)?;
                let step = match step {
                    Some(step) => Some(f(step)?),
                    None => None,
                };
                Node::Range {
                    start,
                    step,
                    end: f(end)?,
                }
            }
            Node::Index {
                target,
                indices,
                dot_notation,
            } => Node::Index {
                target: f(target)?,
                indices: all(indices, f)?,
                dot_notation: *dot_notation,
            },
            Node::ArrayLiteral { rows } => Node::ArrayLiteral {
                rows: rows
                    .iter()
                    .map(|row| all(row, f))
                    .collect::<Result<Vec<_>>>()?,
            },
            Node::ObjectLiteral { entries } => Node::ObjectLiteral {
                entries: entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), f(value)?)))
                    .collect::<Result<Vec<_>>>()?,
            },
            Node::Call { callee, args } => Node::Call {
                callee: f(callee)?,
                args: all(args, f)?,
            },
            Node::FunctionDefinition { name, params, body } => Node::FunctionDefinition {
                name: name.clone(),
                params: params.clone(),
                body: f(body)?,
            },
            Node::Assignment { name, value } => Node::Assignment {
                name: name.clone(),
                value: f(value)?,
            },
            Node::IndexedAssignment {
                name,
                indices,
                value,
                dot_notation,
            } => Node::IndexedAssignment {
                name: name.clone(),
                indices: all(indices, f)?,
                value: f(value)?,
                dot_notation: *dot_notation,
            },
            Node::Block { statements } => Node::Block {
                statements: statements
                    .iter()
                    .map(|s| {
                        Ok(Statement {
                            node: f(&s.node)?,
                            visible: s.visible,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            },
            Node::Parenthesized(inner) => Node::Parenthesized(f(inner)?),
            Node::Custom(custom) => Node::Custom(CustomNode {
                name: custom.name.clone(),
                args: all(&custom.args, f)?,
                handler: Rc::clone(&custom.handler),
            }),
        };
        Ok(node)
    }

    /// Rewrites the tree bottom-up: children are transformed first, then `f` is applied to
    /// the node rebuilt from the transformed children.
    ///
    /// Subtrees that `f` leaves untouched are shared with the original tree.
    pub fn transform<F>(self: &Rc<Self>, mut f: F) -> Rc<Node>
    where
        F: FnMut(&Rc<Node>) -> Rc<Node>,
    {
        transform_node(self, &mut f)
    }

    /// Every node of the tree, this one included, for which `predicate` holds, in pre-order.
    pub fn filter<P>(self: &Rc<Self>, mut predicate: P) -> Vec<Rc<Node>>
    where
        P: FnMut(&Node) -> bool,
    {
        let mut found = Vec::new();
        self.traverse(|node, _| {
            if predicate(node) {
                found.push(Rc::clone(node));
            }
        });
        found
    }

    /// Visits every node in pre-order together with its parent.
    pub fn traverse<F>(self: &Rc<Self>, mut f: F)
    where
        F: FnMut(&Rc<Node>, Option<&Rc<Node>>),
    {
        fn walk(node: &Rc<Node>, parent: Option<&Rc<Node>>, f: &mut dyn FnMut(&Rc<Node>, Option<&Rc<Node>>)) {
            f(node, parent);
            for child in node.children() {
                walk(child, Some(node), f);
            }
        }
        walk(self, None, &mut f);
    }

    /// A copy of the tree sharing no node with the original.
    pub fn deep_clone(&self) -> Node {
        let mut copy = |child: &Rc<Node>| -> Result<Rc<Node>> { Ok(Rc::new(child.deep_clone())) };
        match self.rebuild(&mut copy) {
            Ok(node) => node,
            Err(_) => self.clone(),
        }
    }

    /// True if the tree mentions `name` as a symbol anywhere.
    pub fn contains_symbol(self: &Rc<Self>, name: &str) -> bool {
        !self
            .filter(|node| matches!(node, Node::Symbol(s) if s == name))
            .is_empty()
    }

    /// Compiles the tree against `namespace`.
    ///
    /// Every operator and function name the tree needs from the namespace is resolved
    /// here; a missing one fails compilation instead of the first evaluation.
    pub fn compile(&self, namespace: &Namespace) -> Result<CompiledExpression> {
        eval::compile(self, namespace)
    }

    /// Compiles against the built-in namespace.
    pub fn compile_default(&self) -> Result<CompiledExpression> {
        self.compile(&Namespace::builtin())
    }

    /// Compiles against the scope's namespace and evaluates once.
    pub fn evaluate(&self, scope: &Scope) -> Result<Value> {
        self.compile(&scope.namespace())?.evaluate(scope)
    }

    /// Source text using `options`.
    pub fn to_string_with(&self, options: &FormatOptions) -> String {
        display::render(self, options)
    }

    /// LaTeX rendering with default options.
    pub fn to_tex(&self) -> String {
        tex::render(self, &FormatOptions::default())
    }

    pub fn to_tex_with(&self, options: &FormatOptions) -> String {
        tex::render(self, options)
    }
}

fn transform_node(node: &Rc<Node>, f: &mut dyn FnMut(&Rc<Node>) -> Rc<Node>) -> Rc<Node> {
    let mut changed = false;
    let mut visit = |child: &Rc<Node>| -> Result<Rc<Node>> {
        let replaced = transform_node(child, f);
        if !Rc::ptr_eq(&replaced, child) {
            changed = true;
        }
        Ok(replaced)
    };
    let rebuilt = match node.rebuild(&mut visit) {
        Ok(rebuilt) if changed => Rc::new(rebuilt),
        _ => Rc::clone(node),
    };
    f(&rebuilt)
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_with(&FormatOptions::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parse;

    fn parsed(source: &str) -> Rc<Node> {
        Rc::new(parse(source).unwrap())
    }

    #[test]
    fn test_children_in_source_order() {
        let node = parse("f(a, b + 1)").unwrap();
        let names: Vec<String> = node.children().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["f", "a", "b + 1"]);
    }

    #[test]
    fn test_map_replaces_direct_children() {
        let node = parse("a + b").unwrap();
        let mapped = node
            .map(|child| match child.as_ref() {
                Node::Symbol(name) => Ok(Rc::new(Node::symbol(name.to_uppercase()))),
                _ => Ok(Rc::clone(child)),
            })
            .unwrap();
        assert_eq!(mapped.to_string(), "A + B");
        assert_eq!(node.to_string(), "a + b");
    }

    #[test]
    fn test_transform_is_post_order_and_shares_untouched() {
        let tree = parsed("x + y * 2");
        let mut visited = Vec::new();
        let result = tree.transform(|node| {
            visited.push(node.to_string());
            match node.as_ref() {
                Node::Symbol(name) if name == "x" => Rc::new(Node::number(3.0)),
                _ => Rc::clone(node),
            }
        });
        assert_eq!(visited, vec!["x", "y", "2", "y * 2", "3 + y * 2"]);
        assert_eq!(result.to_string(), "3 + y * 2");
        match (tree.as_ref(), result.as_ref()) {
            (Node::Binary { right: before, .. }, Node::Binary { right: after, .. }) => {
                assert!(Rc::ptr_eq(before, after));
            }
            _ => panic!("expected binary nodes"),
        }
    }

    #[test]
    fn test_filter_is_pre_order() {
        let tree = parsed("a * (b + c)");
        let symbols: Vec<String> = tree
            .filter(|node| matches!(node, Node::Symbol(_)))
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(symbols, vec!["a", "b", "c"]);
        assert!(tree.contains_symbol("c"));
        assert!(!tree.contains_symbol("d"));
    }

    #[test]
    fn test_traverse_reports_parents() {
        let tree = parsed("-x");
        let mut pairs = Vec::new();
        tree.traverse(|node, parent| {
            pairs.push((node.to_string(), parent.map(|p| p.to_string())));
        });
        assert_eq!(
            pairs,
            vec![("-x".to_string(), None), ("x".to_string(), Some("-x".to_string()))]
        );
    }

    #[test]
    fn test_deep_clone_shares_nothing() {
        let tree = parsed("a + b");
        let copy = Rc::new(tree.deep_clone());
        assert_eq!(tree, copy);
        let originals = tree.filter(|_| true);
        let copies = copy.filter(|_| true);
        for (a, b) in originals.iter().zip(copies.iter()) {
            assert!(!Rc::ptr_eq(a, b));
        }
    }

    #[test]
    fn test_equality_is_structural() {
        assert_eq!(parse("1 + x").unwrap(), parse("1+x").unwrap());
        assert_ne!(parse("1 + x").unwrap(), parse("x + 1").unwrap());
        assert_ne!(parse("2x").unwrap(), parse("2 * x").unwrap());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(parse("a = 1").unwrap().type_name(), "AssignmentNode");
        assert_eq!(parse("(1)").unwrap().type_name(), "ParenthesisNode");
        assert_eq!(parse("1:3").unwrap().type_name(), "RangeNode");
    }
}
