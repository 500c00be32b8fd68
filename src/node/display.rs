//! Printing a tree back to expression source.
//!
//! With the default options the output parses back to an equal tree: parentheses written
//! in the source are kept as nodes and printed as written, and implicit multiplication is
//! printed by juxtaposition wherever that reads back unambiguously.

use core::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::Node;
use crate::types::{Associativity, BinaryOperator, Precedence, is_keyword};
use crate::value::{Value, quote_string};

/// How parentheses are printed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParenthesisMode {
    /// Print parentheses exactly where the source had them, plus any the tree structure
    /// requires.
    #[default]
    Keep,
    /// Drop source parentheses and print only those the precedence rules require.
    Auto,
    /// Wrap every operator sub-expression.
    All,
}

/// How implicit multiplication is printed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImplicitMode {
    /// `2 x`
    #[default]
    Hide,
    /// `2 * x`
    Show,
}

/// Target notation passed to a [`FormatHandler`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Tex,
}

/// Per-node override: return `Some` to replace the default rendering of a node.
pub type FormatHandler = Rc<dyn Fn(&Node, OutputFormat, &FormatOptions) -> Option<String>>;

#[derive(Clone, Default)]
pub struct FormatOptions {
    pub parenthesis: ParenthesisMode,
    pub implicit: ImplicitMode,
    pub handler: Option<FormatHandler>,
}

impl FormatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parenthesis(mut self, mode: ParenthesisMode) -> Self {
        self.parenthesis = mode;
        self
    }

    pub fn with_implicit(mut self, mode: ImplicitMode) -> Self {
        self.implicit = mode;
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Node, OutputFormat, &FormatOptions) -> Option<String> + 'static,
    {
        self.handler = Some(Rc::new(handler));
        self
    }

    pub(super) fn custom(&self, node: &Node, format: OutputFormat) -> Option<String> {
        self.handler.as_ref().and_then(|h| h(node, format, self))
    }
}

impl fmt::Debug for FormatOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatOptions")
            .field("parenthesis", &self.parenthesis)
            .field("implicit", &self.implicit)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Position of a child relative to its parent operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Side {
    Left,
    Right,
}

/// Looks through source parentheses unless they are kept.
pub(super) fn strip<'a>(node: &'a Node, options: &FormatOptions) -> &'a Node {
    let mut current = node;
    if options.parenthesis != ParenthesisMode::Keep {
        while let Node::Parenthesized(inner) = current {
            current = inner;
        }
    }
    current
}

fn is_number(node: &Node) -> bool {
    matches!(node, Node::Constant(Value::Number(_)))
}

fn is_assignment(node: &Node) -> bool {
    matches!(
        node,
        Node::Assignment { .. } | Node::IndexedAssignment { .. } | Node::FunctionDefinition { .. }
    )
}

/// Decides whether `child`, printed as an operand of `parent`, needs parentheses.
pub(super) fn needs_parens(parent: &Node, child: &Node, side: Side, options: &FormatOptions) -> bool {
    if let Node::Parenthesized(_) = child {
        return false;
    }
    let cp = child.precedence();
    if options.parenthesis == ParenthesisMode::All
        && cp < Precedence::Primary
        && !matches!(parent, Node::Assignment { .. } | Node::FunctionDefinition { .. })
    {
        return true;
    }
    match parent {
        Node::Binary { op, .. } => {
            let p = op.precedence();
            if matches!(op, BinaryOperator::Pow | BinaryOperator::DotPow) && side == Side::Right {
                return cp < Precedence::Unary;
            }
            match (side, op.associativity()) {
                (Side::Left, Associativity::Right) | (Side::Right, Associativity::Left) => cp <= p,
                _ => cp < p,
            }
        }
        Node::Unary { op, .. } => {
            if op.is_postfix() {
                cp < op.precedence()
            } else {
                cp < Precedence::Unary
            }
        }
        Node::Conditional { .. } => match side {
            Side::Left => cp < Precedence::Or,
            // Branches are parsed at the assignment level.
            Side::Right if is_assignment(child) => false,
            Side::Right => cp < Precedence::Conditional || cp == Precedence::Range,
        },
        Node::Range { .. } => cp < Precedence::Membership,
        Node::Index { .. } | Node::Call { .. } => cp < Precedence::Primary || is_number(child),
        Node::Assignment { .. }
        | Node::IndexedAssignment { .. }
        | Node::FunctionDefinition { .. } => cp < Precedence::Assignment,
        _ => false,
    }
}

fn operand(parent: &Node, child: &Node, side: Side, options: &FormatOptions) -> String {
    let child = strip(child, options);
    let text = render(child, options);
    if needs_parens(parent, child, side, options) {
        format!("({})", text)
    } else {
        text
    }
}

/// The operand a juxtaposition continues: the rightmost operand of a product chain.
fn trailing_operand(node: &Node) -> &Node {
    match node {
        Node::Binary { op, right, .. } if op.precedence() == Precedence::Multiplicative => {
            trailing_operand(right)
        }
        other => other,
    }
}

fn leads_with_name(node: &Node) -> bool {
    match node {
        Node::Symbol(name) => !is_keyword(name),
        Node::Binary { left, .. } => leads_with_name(left),
        Node::Unary { op, operand } if op.is_postfix() => leads_with_name(operand),
        Node::Index { target, .. } => leads_with_name(target),
        Node::Call { callee, .. } => leads_with_name(callee),
        _ => false,
    }
}

/// Juxtaposition reads back as multiplication only when the right operand starts with a
/// name, with `(` after a number or a parenthesized group, or is a plain number after a
/// parenthesized group.
fn juxtaposition_reads_back(left: &Node, right: &Node) -> bool {
    let last = trailing_operand(left);
    match right {
        Node::Parenthesized(_) => is_number(last) || matches!(last, Node::Parenthesized(_)),
        Node::Constant(Value::Number(n)) => {
            matches!(last, Node::Parenthesized(_)) && n.is_finite() && !n.is_sign_negative()
        }
        other => leads_with_name(other),
    }
}

fn list(nodes: &[Rc<Node>], options: &FormatOptions) -> String {
    nodes
        .iter()
        .map(|n| render(strip(n, options), options))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(super) fn render(node: &Node, options: &FormatOptions) -> String {
    if let Some(text) = options.custom(node, OutputFormat::Text) {
        return text;
    }
    match node {
        Node::Constant(value) => value.to_string(),
        Node::Symbol(name) => name.clone(),
        Node::Unary { op, operand: child } => {
            let inner = operand(node, child, Side::Right, options);
            if op.is_postfix() {
                format!("{}{}", inner, op.symbol())
            } else if op.symbol().chars().all(char::is_alphabetic) {
                format!("{} {}", op.symbol(), inner)
            } else {
                format!("{}{}", op.symbol(), inner)
            }
        }
        Node::Binary {
            op,
            left,
            right,
            implicit,
        } => {
            let l = operand(node, left, Side::Left, options);
            let r = operand(node, right, Side::Right, options);
            let juxtapose = *implicit
                && *op == BinaryOperator::Multiply
                && options.implicit == ImplicitMode::Hide
                && juxtaposition_reads_back(strip(left, options), strip(right, options))
                && !needs_parens(node, strip(right, options), Side::Right, options);
            if juxtapose {
                format!("{} {}", l, r)
            } else {
                format!("{} {} {}", l, op.symbol(), r)
            }
        }
        Node::Conditional {
            condition,
            then,
            otherwise,
        } => format!(
            "{} ? {} : {}",
            operand(node, condition, Side::Left, options),
            operand(node, then, Side::Right, options),
            operand(node, otherwise, Side::Right, options)
        ),
        Node::Range { start, step, end } => {
            let mut parts = vec![operand(node, start, Side::Left, options)];
            if let Some(step) = step {
                parts.push(operand(node, step, Side::Left, options));
            }
            parts.push(operand(node, end, Side::Left, options));
            parts.join(":")
        }
        Node::Index {
            target,
            indices,
            dot_notation,
        } => {
            let target_text = operand(node, target, Side::Left, options);
            match (dot_notation, indices.as_slice()) {
                (true, [key]) => match key.as_ref() {
                    Node::Constant(Value::String(name)) => format!("{}.{}", target_text, name),
                    other => format!("{}[{}]", target_text, render(other, options)),
                },
                _ => format!("{}[{}]", target_text, list(indices, options)),
            }
        }
        Node::ArrayLiteral { rows } => {
            let rows: Vec<String> = rows.iter().map(|row| list(row, options)).collect();
            format!("[{}]", rows.join("; "))
        }
        Node::ObjectLiteral { entries } => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(key, value)| {
                    format!("{}: {}", quote_string(key), render(strip(value, options), options))
                })
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Node::Call { callee, args } => format!(
            "{}({})",
            operand(node, callee, Side::Left, options),
            list(args, options)
        ),
        Node::FunctionDefinition { name, params, body } => format!(
            "function {}({}) = {}",
            name,
            params.join(", "),
            operand(node, body, Side::Right, options)
        ),
        Node::Assignment { name, value } => {
            format!("{} = {}", name, operand(node, value, Side::Right, options))
        }
        Node::IndexedAssignment {
            name,
            indices,
            value,
            dot_notation,
        } => {
            let target = match (dot_notation, indices.as_slice()) {
                (true, [key]) => match key.as_ref() {
                    Node::Constant(Value::String(key)) => format!("{}.{}", name, key),
                    other => format!("{}[{}]", name, render(other, options)),
                },
                _ => format!("{}[{}]", name, list(indices, options)),
            };
            format!("{} = {}", target, operand(node, value, Side::Right, options))
        }
        Node::Block { statements } => statements
            .iter()
            .map(|s| {
                let text = render(strip(&s.node, options), options);
                if s.visible { text } else { format!("{};", text) }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Node::Parenthesized(inner) => {
            if options.parenthesis == ParenthesisMode::Keep {
                format!("({})", render(inner, options))
            } else {
                render(strip(inner, options), options)
            }
        }
        Node::Custom(custom) => format!("{}({})", custom.name, list(&custom.args, options)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parse;

    fn auto() -> FormatOptions {
        FormatOptions::new().with_parenthesis(ParenthesisMode::Auto)
    }

    #[test]
    fn test_keep_mode_preserves_source_parentheses() {
        assert_eq!(parse("(1+2)*3").unwrap().to_string(), "(1 + 2) * 3");
        assert_eq!(parse("((a))").unwrap().to_string(), "((a))");
        assert_eq!(parse("a + (b)").unwrap().to_string(), "a + (b)");
    }

    #[test]
    fn test_auto_mode_prints_required_parentheses_only() {
        let node = parse("((a + b)) * (c)").unwrap();
        assert_eq!(node.to_string_with(&auto()), "(a + b) * c");
        let node = parse("a - (b - c)").unwrap();
        assert_eq!(node.to_string_with(&auto()), "a - (b - c)");
        let node = parse("(a - b) - c").unwrap();
        assert_eq!(node.to_string_with(&auto()), "a - b - c");
        let node = parse("2 ^ (3 ^ 4)").unwrap();
        assert_eq!(node.to_string_with(&auto()), "2 ^ 3 ^ 4");
        let node = parse("(2 ^ 3) ^ 4").unwrap();
        assert_eq!(node.to_string_with(&auto()), "(2 ^ 3) ^ 4");
    }

    #[test]
    fn test_all_mode_wraps_operator_operands() {
        let node = parse("a + b * c").unwrap();
        let options = FormatOptions::new().with_parenthesis(ParenthesisMode::All);
        assert_eq!(node.to_string_with(&options), "a + (b * c)");
    }

    #[test]
    fn test_implicit_multiplication_modes() {
        let node = parse("2x").unwrap();
        assert_eq!(node.to_string(), "2 x");
        let show = FormatOptions::new().with_implicit(ImplicitMode::Show);
        assert_eq!(node.to_string_with(&show), "2 * x");
        assert_eq!(parse("2 (a + b)").unwrap().to_string(), "2 (a + b)");
        assert_eq!(parse("2x^2").unwrap().to_string(), "2 x ^ 2");
        assert_eq!(parse("(a)(b)(c)").unwrap().to_string(), "(a) (b) (c)");
        assert_eq!(parse("(a)2").unwrap().to_string(), "(a) 2");
        assert_eq!(parse("(a)2 x").unwrap().to_string(), "(a) 2 x");
    }

    #[test]
    fn test_unary_and_postfix() {
        assert_eq!(parse("-(a + b)").unwrap().to_string_with(&auto()), "-(a + b)");
        assert_eq!(parse("-x^2").unwrap().to_string(), "-x ^ 2");
        assert_eq!(parse("not a").unwrap().to_string(), "not a");
        assert_eq!(parse("(a')!").unwrap().to_string_with(&auto()), "a'!");
        assert_eq!(parse("(a!)'").unwrap().to_string_with(&auto()), "(a!)'");
    }

    #[test]
    fn test_statement_forms() {
        assert_eq!(parse("a = 1; b = 2\nc").unwrap().to_string(), "a = 1;\nb = 2\nc");
        assert_eq!(
            parse("function f(x, y) = x + y").unwrap().to_string(),
            "function f(x, y) = x + y"
        );
        assert_eq!(parse("a.b = 2").unwrap().to_string(), "a.b = 2");
        assert_eq!(parse("m[1, end] = 3").unwrap().to_string(), "m[1, end] = 3");
        assert_eq!(parse("c ? x = 1 : 2").unwrap().to_string(), "c ? x = 1 : 2");
        assert_eq!(parse("c ? (1:2) : 3").unwrap().to_string(), "c ? (1:2) : 3");
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("[1, 2; 3, 4]").unwrap().to_string(), "[1, 2; 3, 4]");
        assert_eq!(parse("[]").unwrap().to_string(), "[]");
        assert_eq!(
            parse("{a: 1, \"b c\": \"x\"}").unwrap().to_string(),
            "{\"a\": 1, \"b c\": \"x\"}"
        );
        assert_eq!(parse("a ? b : c").unwrap().to_string(), "a ? b : c");
        assert_eq!(parse("1:2:10").unwrap().to_string(), "1:2:10");
    }

    #[test]
    fn test_handler_overrides_nodes() {
        let options = FormatOptions::new().with_handler(|node, format, _| match node {
            Node::Symbol(name) if format == OutputFormat::Text && name == "x" => {
                Some("X".to_string())
            }
            _ => None,
        });
        assert_eq!(parse("x + y").unwrap().to_string_with(&options), "X + y");
    }

    #[test]
    fn test_rewritten_trees_get_needed_parentheses() {
        let sum = Node::binary(BinaryOperator::Add, Node::symbol("a"), Node::symbol("b"));
        let product = Node::binary(BinaryOperator::Multiply, sum, Node::symbol("c"));
        assert_eq!(product.to_string(), "(a + b) * c");
        let power = Node::binary(BinaryOperator::Pow, Node::number(-2.0), Node::number(2.0));
        assert_eq!(power.to_string(), "(-2) ^ 2");
    }
}
