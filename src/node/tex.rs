//! LaTeX rendering.

use std::rc::Rc;

use super::Node;
use super::display::{FormatOptions, OutputFormat, ParenthesisMode, Side, needs_parens, strip};
use crate::types::{BinaryOperator, UnaryOperator};
use crate::value::{Value, format_number};

const GREEK: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "pi", "rho", "sigma", "tau", "upsilon", "phi", "chi", "psi",
    "omega", "Gamma", "Delta", "Theta", "Lambda", "Xi", "Pi", "Sigma", "Phi", "Psi", "Omega",
];

fn symbol(name: &str) -> String {
    if GREEK.contains(&name) {
        format!("\\{}", name)
    } else if name == "Infinity" {
        "\\infty".to_string()
    } else if name.chars().count() == 1 {
        name.to_string()
    } else {
        format!("\\mathrm{{{}}}", name)
    }
}

fn constant(value: &Value) -> String {
    match value {
        Value::Number(n) if n.is_infinite() => {
            if *n > 0.0 { "\\infty".to_string() } else { "-\\infty".to_string() }
        }
        Value::Number(n) => format_number(*n),
        Value::Boolean(b) => format!("\\mathrm{{{}}}", b),
        Value::String(s) => format!("\\mathtt{{\"{}\"}}", s),
        other => format!("\\mathrm{{{}}}", other),
    }
}

fn wrap(text: String) -> String {
    format!("\\left({}\\right)", text)
}

fn operand(parent: &Node, child: &Node, side: Side, options: &FormatOptions) -> String {
    let child = strip(child, options);
    let text = render(child, options);
    if needs_parens(parent, child, side, options) {
        wrap(text)
    } else {
        text
    }
}

fn list(nodes: &[Rc<Node>], separator: &str, options: &FormatOptions) -> String {
    nodes
        .iter()
        .map(|n| render(strip(n, options), options))
        .collect::<Vec<_>>()
        .join(separator)
}

fn call(callee: &Node, args: &[Rc<Node>], options: &FormatOptions) -> String {
    let args_tex = list(args, ",", options);
    match callee {
        Node::Symbol(name) => match name.as_str() {
            "sqrt" => format!("\\sqrt{{{}}}", args_tex),
            "abs" => format!("\\left|{}\\right|", args_tex),
            "sin" | "cos" | "tan" | "exp" | "log" | "min" | "max" => {
                format!("\\{}\\left({}\\right)", name, args_tex)
            }
            _ => format!("{}\\left({}\\right)", symbol(name), args_tex),
        },
        other => format!("{}\\left({}\\right)", wrap(render(other, options)), args_tex),
    }
}

pub(super) fn render(node: &Node, options: &FormatOptions) -> String {
    if let Some(text) = options.custom(node, OutputFormat::Tex) {
        return text;
    }
    match node {
        Node::Constant(value) => constant(value),
        Node::Symbol(name) => symbol(name),
        Node::Unary { op, operand: child } => {
            let inner = operand(node, child, Side::Right, options);
            match op {
                UnaryOperator::Minus => format!("-{}", inner),
                UnaryOperator::Plus => format!("+{}", inner),
                UnaryOperator::Not => format!("\\neg {}", inner),
                UnaryOperator::Factorial => format!("{}!", inner),
                UnaryOperator::Transpose => format!("{}^\\top", inner),
            }
        }
        Node::Binary {
            op,
            left,
            right,
            implicit,
        } => match op {
            BinaryOperator::Divide => format!(
                "\\frac{{{}}}{{{}}}",
                render(strip(left, options), options),
                render(strip(right, options), options)
            ),
            BinaryOperator::Pow | BinaryOperator::DotPow => format!(
                "{}^{{{}}}",
                operand(node, left, Side::Left, options),
                render(strip(right, options), options)
            ),
            _ => {
                let l = operand(node, left, Side::Left, options);
                let r = operand(node, right, Side::Right, options);
                if *implicit && options.implicit == super::ImplicitMode::Hide {
                    format!("{}~{}", l, r)
                } else {
                    format!("{} {} {}", l, op.tex(), r)
                }
            }
        },
        Node::Conditional {
            condition,
            then,
            otherwise,
        } => format!(
            "\\begin{{cases}} {}, & \\text{{if }}\\;{}\\\\ {}, & \\text{{otherwise}}\\end{{cases}}",
            render(strip(then, options), options),
            render(strip(condition, options), options),
            render(strip(otherwise, options), options)
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
            let target_tex = operand(node, target, Side::Left, options);
            match (dot_notation, indices.as_slice()) {
                (true, [key]) => match key.as_ref() {
                    Node::Constant(Value::String(name)) => {
                        format!("{}.\\mathrm{{{}}}", target_tex, name)
                    }
                    other => format!("{}_{{{}}}", target_tex, render(other, options)),
                },
                _ => format!("{}_{{{}}}", target_tex, list(indices, ",", options)),
            }
        }
        Node::ArrayLiteral { rows } => {
            let rows: Vec<String> = rows.iter().map(|row| list(row, "&", options)).collect();
            format!("\\begin{{bmatrix}}{}\\end{{bmatrix}}", rows.join("\\\\"))
        }
        Node::ObjectLiteral { entries } => {
            let entries: String = entries
                .iter()
                .map(|(key, value)| {
                    format!(
                        "\\mathbf{{{}:}} & {}\\\\",
                        key,
                        render(strip(value, options), options)
                    )
                })
                .collect();
            format!("\\left\\{{\\begin{{array}}{{ll}}{}\\end{{array}}\\right\\}}", entries)
        }
        Node::Call { callee, args } => call(strip(callee, options), args, options),
        Node::FunctionDefinition { name, params, body } => {
            let params: Vec<String> = params.iter().map(|p| symbol(p)).collect();
            format!(
                "{}\\left({}\\right):={}",
                symbol(name),
                params.join(","),
                render(strip(body, options), options)
            )
        }
        Node::Assignment { name, value } => {
            format!("{}:={}", symbol(name), render(strip(value, options), options))
        }
        Node::IndexedAssignment {
            name,
            indices,
            value,
            dot_notation,
        } => {
            let target = match (dot_notation, indices.as_slice()) {
                (true, [key]) => match key.as_ref() {
                    Node::Constant(Value::String(key)) => {
                        format!("{}.\\mathrm{{{}}}", symbol(name), key)
                    }
                    other => format!("{}_{{{}}}", symbol(name), render(other, options)),
                },
                _ => format!("{}_{{{}}}", symbol(name), list(indices, ",", options)),
            };
            format!("{}:={}", target, render(strip(value, options), options))
        }
        Node::Block { statements } => statements
            .iter()
            .map(|s| render(strip(&s.node, options), options))
            .collect::<Vec<_>>()
            .join("\\;\\;\n"),
        Node::Parenthesized(inner) => {
            if options.parenthesis == ParenthesisMode::Keep {
                wrap(render(inner, options))
            } else {
                render(strip(inner, options), options)
            }
        }
        Node::Custom(custom) => format!(
            "{}\\left({}\\right)",
            symbol(&custom.name),
            list(&custom.args, ",", options)
        ),
    }
}
