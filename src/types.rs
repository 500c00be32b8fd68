//! Type definitions shared by the tokenizer, parser, node model and compiler.
//!
//! This module contains the token classification, the operator enums with their
//! namespace function names, and the precedence table used both to parse and to decide
//! where parentheses are needed when a tree is printed.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Classifies the kind of token produced during lexical analysis.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TokenKind {
    /// An operator or punctuation string from the delimiter table, including newline.
    Delimiter,

    /// A numerical literal.
    Number,

    /// An identifier: variable, function name or keyword.
    Symbol,

    /// A double-quoted string literal; the token text holds the unescaped content.
    String,

    /// End of the expression.
    EndOfInput,
}

/// Binding tiers from loosest to tightest.
///
/// The parser has one grammar level per tier and the printer compares tiers to decide
/// whether a child must be wrapped in parentheses.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Precedence {
    Block,
    Assignment,
    Conditional,
    Or,
    And,
    Range,
    Membership,
    Comparison,
    Additive,
    Multiplicative,
    Unary,
    Power,
    Factorial,
    Transpose,
    Primary,
}

/// Associativity of a binary operator.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Associativity {
    Left,
    Right,
}

/// Prefix and postfix operators.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum UnaryOperator {
    /// Prefix `-`
    Minus,
    /// Prefix `+`
    Plus,
    /// Prefix `not`
    Not,
    /// Postfix `!`
    Factorial,
    /// Postfix `'`
    Transpose,
}

impl UnaryOperator {
    /// The operator as written in source.
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::Not => "not",
            UnaryOperator::Factorial => "!",
            UnaryOperator::Transpose => "'",
        }
    }

    /// Name of the namespace function implementing the operator.
    pub fn function_name(self) -> &'static str {
        match self {
            UnaryOperator::Minus => "unaryMinus",
            UnaryOperator::Plus => "unaryPlus",
            UnaryOperator::Not => "not",
            UnaryOperator::Factorial => "factorial",
            UnaryOperator::Transpose => "transpose",
        }
    }

    pub fn is_postfix(self) -> bool {
        matches!(self, UnaryOperator::Factorial | UnaryOperator::Transpose)
    }

    pub fn precedence(self) -> Precedence {
        match self {
            UnaryOperator::Minus | UnaryOperator::Plus | UnaryOperator::Not => Precedence::Unary,
            UnaryOperator::Factorial => Precedence::Factorial,
            UnaryOperator::Transpose => Precedence::Transpose,
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Infix operators.
///
/// `And` and `Or` short-circuit on truthiness and are evaluated by the engine itself;
/// every other operator is looked up by [`BinaryOperator::function_name`] in the
/// namespace when the node is compiled.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    DotMultiply,
    Divide,
    DotDivide,
    Mod,
    Pow,
    DotPow,
    Equal,
    Unequal,
    Smaller,
    Larger,
    SmallerEq,
    LargerEq,
    In,
    And,
    Or,
}

impl BinaryOperator {
    /// Maps source text to an operator.
    pub fn from_symbol(text: &str) -> Option<Self> {
        let op = match text {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Subtract,
            "*" => BinaryOperator::Multiply,
            ".*" => BinaryOperator::DotMultiply,
            "/" => BinaryOperator::Divide,
            "./" => BinaryOperator::DotDivide,
            "%" => BinaryOperator::Mod,
            "^" => BinaryOperator::Pow,
            ".^" => BinaryOperator::DotPow,
            "==" => BinaryOperator::Equal,
            "!=" => BinaryOperator::Unequal,
            "<" => BinaryOperator::Smaller,
            ">" => BinaryOperator::Larger,
            "<=" => BinaryOperator::SmallerEq,
            ">=" => BinaryOperator::LargerEq,
            "in" => BinaryOperator::In,
            "and" => BinaryOperator::And,
            "or" => BinaryOperator::Or,
            _ => return None,
        };
        Some(op)
    }

    /// The operator as written in source.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::DotMultiply => ".*",
            BinaryOperator::Divide => "/",
            BinaryOperator::DotDivide => "./",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "^",
            BinaryOperator::DotPow => ".^",
            BinaryOperator::Equal => "==",
            BinaryOperator::Unequal => "!=",
            BinaryOperator::Smaller => "<",
            BinaryOperator::Larger => ">",
            BinaryOperator::SmallerEq => "<=",
            BinaryOperator::LargerEq => ">=",
            BinaryOperator::In => "in",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
        }
    }

    /// Name of the namespace function implementing the operator, `None` for the
    /// short-circuit logical operators.
    pub fn function_name(self) -> Option<&'static str> {
        let name = match self {
            BinaryOperator::Add => "add",
            BinaryOperator::Subtract => "subtract",
            BinaryOperator::Multiply => "multiply",
            BinaryOperator::DotMultiply => "dotMultiply",
            BinaryOperator::Divide => "divide",
            BinaryOperator::DotDivide => "dotDivide",
            BinaryOperator::Mod => "mod",
            BinaryOperator::Pow => "pow",
            BinaryOperator::DotPow => "dotPow",
            BinaryOperator::Equal => "equal",
            BinaryOperator::Unequal => "unequal",
            BinaryOperator::Smaller => "smaller",
            BinaryOperator::Larger => "larger",
            BinaryOperator::SmallerEq => "smallerEq",
            BinaryOperator::LargerEq => "largerEq",
            BinaryOperator::In => "includes",
            BinaryOperator::And | BinaryOperator::Or => return None,
        };
        Some(name)
    }

    pub fn precedence(self) -> Precedence {
        match self {
            BinaryOperator::Or => Precedence::Or,
            BinaryOperator::And => Precedence::And,
            BinaryOperator::In => Precedence::Membership,
            BinaryOperator::Equal
            | BinaryOperator::Unequal
            | BinaryOperator::Smaller
            | BinaryOperator::Larger
            | BinaryOperator::SmallerEq
            | BinaryOperator::LargerEq => Precedence::Comparison,
            BinaryOperator::Add | BinaryOperator::Subtract => Precedence::Additive,
            BinaryOperator::Multiply
            | BinaryOperator::DotMultiply
            | BinaryOperator::Divide
            | BinaryOperator::DotDivide
            | BinaryOperator::Mod => Precedence::Multiplicative,
            BinaryOperator::Pow | BinaryOperator::DotPow => Precedence::Power,
        }
    }

    pub fn associativity(self) -> Associativity {
        match self {
            BinaryOperator::Pow | BinaryOperator::DotPow => Associativity::Right,
            _ => Associativity::Left,
        }
    }

    /// LaTeX rendering of the operator, used by the formula printer.
    pub(crate) fn tex(self) -> &'static str {
        match self {
            BinaryOperator::Multiply | BinaryOperator::DotMultiply => "\\cdot",
            BinaryOperator::Divide | BinaryOperator::DotDivide => "/",
            BinaryOperator::Mod => "\\mod",
            BinaryOperator::Unequal => "\\neq",
            BinaryOperator::SmallerEq => "\\leq",
            BinaryOperator::LargerEq => "\\geq",
            BinaryOperator::Equal => "=",
            BinaryOperator::In => "\\in",
            BinaryOperator::And => "\\wedge",
            BinaryOperator::Or => "\\vee",
            other => other.symbol(),
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Words the tokenizer reports as symbols but the parser treats as grammar.
pub const KEYWORDS: &[&str] = &["function", "end", "in", "and", "or", "not", "true", "false"];

/// Returns true if `name` is reserved by the grammar.
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}
