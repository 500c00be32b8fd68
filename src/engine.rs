//! Parser and top-level entry points.
//!
//! The parser is a recursive-descent parser with one method per precedence tier, from
//! blocks of statements at the top down to primaries and their accessors. It pulls
//! tokens from the [`Lexer`] one at a time; newlines are statement separators at the top
//! level and ordinary whitespace inside brackets, so the parser tells the lexer which
//! applies through its bracket nesting level.
//!
//! The first structural error aborts the parse with an [`ExprError::Syntax`] carrying
//! the offending token and its 1-based character offset.

use std::rc::Rc;

use tracing::debug;

use crate::Real;
use crate::config::EngineConfig;
use crate::context::Scope;
use crate::error::{ExprError, Result};
use crate::eval::CompiledExpression;
use crate::lexer::{Lexer, Token};
use crate::namespace::Namespace;
use crate::node::{Node, Statement};
use crate::types::{BinaryOperator, TokenKind, UnaryOperator, is_keyword};
use crate::value::Value;

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    /// Number of open `(`, `[` and `{`.
    nesting_level: usize,
    /// Nesting level of the conditional whose true branch is being parsed. A `:` at that
    /// level separates the branches instead of building a range.
    conditional_level: Option<usize>,
    recursion_depth: usize,
    max_recursion_depth: usize,
    implicit_multiplication: bool,
}

fn binary(op: BinaryOperator, left: Node, right: Node, implicit: bool) -> Node {
    Node::Binary {
        op,
        left: Rc::new(left),
        right: Rc::new(right),
        implicit,
    }
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, config: &EngineConfig) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token(false)?;
        Ok(Self {
            lexer,
            current,
            nesting_level: 0,
            conditional_level: None,
            recursion_depth: 0,
            max_recursion_depth: config.max_nesting_depth,
            implicit_multiplication: config.implicit_multiplication,
        })
    }

    /// Advances to the next token and returns the one that was current.
    fn next(&mut self) -> Result<Token> {
        let next = self.lexer.next_token(self.nesting_level > 0)?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn is(&self, delimiter: &str) -> bool {
        self.current.is_delimiter(delimiter)
    }

    fn at_end(&self) -> bool {
        self.current.kind == TokenKind::EndOfInput
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::syntax(message, self.current.describe(), self.current.position)
    }

    /// Consumes an opening bracket.
    fn open(&mut self) -> Result<()> {
        self.nesting_level += 1;
        self.next()?;
        Ok(())
    }

    /// Consumes the closing bracket `closer`, failing with `message` if it is not current.
    fn close(&mut self, closer: &str, message: &str) -> Result<()> {
        if !self.is(closer) {
            return Err(self.error(message));
        }
        self.nesting_level -= 1;
        self.next()?;
        Ok(())
    }

    fn enter(&mut self) -> Result<()> {
        self.recursion_depth += 1;
        if self.recursion_depth > self.max_recursion_depth {
            return Err(ExprError::RecursionLimit(format!(
                "maximum nesting depth of {} exceeded at char {}",
                self.max_recursion_depth,
                self.current.position + 1
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.recursion_depth -= 1;
    }

    fn binary_operator(&self, candidates: &[&str]) -> Option<BinaryOperator> {
        if self.current.kind != TokenKind::Delimiter {
            return None;
        }
        candidates
            .iter()
            .find(|c| **c == self.current.text)
            .and_then(|c| BinaryOperator::from_symbol(c))
    }

    fn parse_program(&mut self) -> Result<Node> {
        let node = self.parse_block()?;
        if !self.at_end() {
            let message = if self.current.kind == TokenKind::Delimiter {
                format!("Unexpected operator {}", self.current.describe())
            } else {
                format!("Unexpected \"{}\"", self.current.text)
            };
            return Err(self.error(message));
        }
        Ok(node)
    }

    fn at_statement_end(&self) -> bool {
        self.at_end() || self.is("\n") || self.is(";")
    }

    /// Statements separated by newlines or `;`. A lone statement without separator is
    /// returned as is; anything else becomes a block, `;` hiding the statement's value.
    fn parse_block(&mut self) -> Result<Node> {
        let mut first = None;
        if !self.at_statement_end() {
            first = Some(self.parse_assignment()?);
        }
        let mut statements = Vec::new();
        while self.is("\n") || self.is(";") {
            if let Some(node) = first.take() {
                statements.push(Statement {
                    node: Rc::new(node),
                    visible: !self.is(";"),
                });
            }
            self.next()?;
            if !self.at_statement_end() {
                let node = self.parse_assignment()?;
                statements.push(Statement {
                    node: Rc::new(node),
                    visible: !self.is(";"),
                });
            }
        }
        match first {
            Some(node) => Ok(node),
            None => Ok(Node::Block { statements }),
        }
    }

    fn parse_assignment(&mut self) -> Result<Node> {
        self.enter()?;
        let node = if self.current.is_symbol("function") {
            self.parse_function_definition()?
        } else {
            let target = self.parse_conditional()?;
            if self.is("=") {
                self.parse_assignment_to(target)?
            } else {
                target
            }
        };
        self.leave();
        Ok(node)
    }

    fn parse_assignment_to(&mut self, target: Node) -> Result<Node> {
        let invalid = self.error("Invalid left hand side of assignment operator =");
        match target {
            Node::Symbol(name) if !is_keyword(&name) => {
                self.next()?;
                let value = self.parse_assignment()?;
                Ok(Node::Assignment {
                    name,
                    value: Rc::new(value),
                })
            }
            Node::Index {
                target,
                indices,
                dot_notation,
            } => {
                let Node::Symbol(name) = target.as_ref() else {
                    return Err(invalid);
                };
                if is_keyword(name) {
                    return Err(invalid);
                }
                let name = name.clone();
                self.next()?;
                let value = self.parse_assignment()?;
                Ok(Node::IndexedAssignment {
                    name,
                    indices,
                    value: Rc::new(value),
                    dot_notation,
                })
            }
            _ => Err(invalid),
        }
    }

    /// `function name(a, b) = body`
    fn parse_function_definition(&mut self) -> Result<Node> {
        self.next()?;
        if self.current.kind != TokenKind::Symbol || is_keyword(&self.current.text) {
            return Err(self.error("Function name expected"));
        }
        let name = self.next()?.text;
        if !self.is("(") {
            return Err(self.error("Parenthesis ( expected"));
        }
        self.open()?;
        let mut params: Vec<String> = Vec::new();
        if !self.is(")") {
            loop {
                if self.current.kind != TokenKind::Symbol || is_keyword(&self.current.text) {
                    return Err(self.error("Parameter name expected"));
                }
                if params.contains(&self.current.text) {
                    return Err(self.error(format!("Duplicate parameter {}", self.current.text)));
                }
                params.push(self.next()?.text);
                if !self.is(",") {
                    break;
                }
                self.next()?;
            }
        }
        self.close(")", "Parenthesis ) expected")?;
        if !self.is("=") {
            return Err(self.error("Assignment operator = expected"));
        }
        self.next()?;
        let body = self.parse_assignment()?;
        Ok(Node::FunctionDefinition {
            name,
            params,
            body: Rc::new(body),
        })
    }

    fn parse_conditional(&mut self) -> Result<Node> {
        let mut node = self.parse_or()?;
        while self.is("?") {
            let previous = self.conditional_level;
            self.conditional_level = Some(self.nesting_level);
            self.next()?;
            let then = self.parse_assignment()?;
            if !self.is(":") {
                return Err(self.error("False part of conditional expression expected"));
            }
            self.conditional_level = None;
            self.next()?;
            let otherwise = self.parse_assignment()?;
            node = Node::Conditional {
                condition: Rc::new(node),
                then: Rc::new(then),
                otherwise: Rc::new(otherwise),
            };
            self.conditional_level = previous;
        }
        Ok(node)
    }

    fn parse_or(&mut self) -> Result<Node> {
        let mut node = self.parse_and()?;
        while self.current.is_symbol("or") {
            self.next()?;
            let right = self.parse_and()?;
            node = binary(BinaryOperator::Or, node, right, false);
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node> {
        let mut node = self.parse_range()?;
        while self.current.is_symbol("and") {
            self.next()?;
            let right = self.parse_range()?;
            node = binary(BinaryOperator::And, node, right, false);
        }
        Ok(node)
    }

    /// `start:end` or `start:step:end`. A missing start is 1 and a missing end before a
    /// closing bracket or comma is `end`, so `:` alone selects a whole dimension.
    fn parse_range(&mut self) -> Result<Node> {
        let first = if self.is(":") {
            Node::number(1.0)
        } else {
            self.parse_membership()?
        };
        if !self.is(":") || self.conditional_level == Some(self.nesting_level) {
            return Ok(first);
        }
        let mut params = vec![first];
        while self.is(":") && params.len() < 3 {
            self.next()?;
            if self.is(")") || self.is("]") || self.is(",") || self.at_end() {
                params.push(Node::symbol("end"));
            } else {
                params.push(self.parse_membership()?);
            }
        }
        let mut params = params.into_iter().map(Rc::new);
        let (Some(start), Some(second)) = (params.next(), params.next()) else {
            return Err(self.error("Value expected"));
        };
        let node = match params.next() {
            Some(end) => Node::Range {
                start,
                step: Some(second),
                end,
            },
            None => Node::Range {
                start,
                step: None,
                end: second,
            },
        };
        Ok(node)
    }

    fn parse_membership(&mut self) -> Result<Node> {
        let mut node = self.parse_comparison()?;
        while self.current.is_symbol("in") {
            self.next()?;
            let right = self.parse_comparison()?;
            node = binary(BinaryOperator::In, node, right, false);
        }
        Ok(node)
    }

    fn parse_comparison(&mut self) -> Result<Node> {
        let mut node = self.parse_additive()?;
        while let Some(op) = self.binary_operator(&["==", "!=", "<", ">", "<=", ">="]) {
            self.next()?;
            let right = self.parse_additive()?;
            node = binary(op, node, right, false);
        }
        Ok(node)
    }

    fn parse_additive(&mut self) -> Result<Node> {
        let mut node = self.parse_multiplicative()?;
        while let Some(op) = self.binary_operator(&["+", "-"]) {
            self.next()?;
            let right = self.parse_multiplicative()?;
            node = binary(op, node, right, false);
        }
        Ok(node)
    }

    fn parse_multiplicative(&mut self) -> Result<Node> {
        let mut node = self.parse_unary()?;
        let mut last = node.clone();
        loop {
            if let Some(op) = self.binary_operator(&["*", ".*", "/", "./", "%"]) {
                self.next()?;
                let right = self.parse_unary()?;
                last = right.clone();
                node = binary(op, node, right, false);
            } else if self.implicit_multiplication && self.juxtaposed(&last) {
                let right = self.parse_unary()?;
                last = right.clone();
                node = binary(BinaryOperator::Multiply, node, right, true);
            } else {
                break;
            }
        }
        Ok(node)
    }

    /// True if the current token continues `last` as an implicit multiplication:
    /// `2x`, `(a)2`, `2(a)`, `(a)(b)`.
    fn juxtaposed(&self, last: &Node) -> bool {
        match self.current.kind {
            TokenKind::Symbol => !is_keyword(&self.current.text),
            TokenKind::Number => matches!(last, Node::Parenthesized(_)),
            TokenKind::Delimiter if self.current.text == "(" => matches!(
                last,
                Node::Constant(Value::Number(_)) | Node::Parenthesized(_)
            ),
            _ => false,
        }
    }

    fn parse_unary(&mut self) -> Result<Node> {
        let op = if self.is("-") {
            UnaryOperator::Minus
        } else if self.is("+") {
            UnaryOperator::Plus
        } else if self.current.is_symbol("not") {
            UnaryOperator::Not
        } else {
            return self.parse_power();
        };
        self.enter()?;
        self.next()?;
        let operand = self.parse_unary()?;
        self.leave();
        Ok(Node::Unary {
            op,
            operand: Rc::new(operand),
        })
    }

    /// The exponent is parsed at the unary tier: `2^-1`, and `2^3^2` is `2^(3^2)`.
    fn parse_power(&mut self) -> Result<Node> {
        let node = self.parse_factorial()?;
        if let Some(op) = self.binary_operator(&["^", ".^"]) {
            self.enter()?;
            self.next()?;
            let exponent = self.parse_unary()?;
            self.leave();
            return Ok(binary(op, node, exponent, false));
        }
        Ok(node)
    }

    fn parse_factorial(&mut self) -> Result<Node> {
        let mut node = self.parse_transpose()?;
        while self.is("!") {
            self.next()?;
            node = Node::Unary {
                op: UnaryOperator::Factorial,
                operand: Rc::new(node),
            };
        }
        Ok(node)
    }

    fn parse_transpose(&mut self) -> Result<Node> {
        let mut node = self.parse_primary()?;
        while self.is("'") {
            self.next()?;
            node = Node::Unary {
                op: UnaryOperator::Transpose,
                operand: Rc::new(node),
            };
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Node> {
        let node = match self.current.kind {
            TokenKind::Number => {
                let token = self.next()?;
                let value: Real = token.text.parse()?;
                return Ok(Node::number(value));
            }
            TokenKind::String => Node::Constant(Value::String(self.next()?.text)),
            TokenKind::Symbol => {
                let name = self.current.text.clone();
                match name.as_str() {
                    "true" | "false" => {
                        self.next()?;
                        Node::Constant(Value::Boolean(name == "true"))
                    }
                    "end" => {
                        self.next()?;
                        Node::Symbol(name)
                    }
                    _ if is_keyword(&name) => return Err(self.error("Value expected")),
                    _ => {
                        self.next()?;
                        Node::Symbol(name)
                    }
                }
            }
            TokenKind::Delimiter if self.is("(") => {
                self.open()?;
                let inner = self.parse_assignment()?;
                self.close(")", "Parenthesis ) expected")?;
                Node::Parenthesized(Rc::new(inner))
            }
            TokenKind::Delimiter if self.is("[") => self.parse_matrix()?,
            TokenKind::Delimiter if self.is("{") => self.parse_object()?,
            TokenKind::Delimiter => return Err(self.error("Value expected")),
            TokenKind::EndOfInput => return Err(self.error("Unexpected end of expression")),
        };
        self.parse_accessors(node)
    }

    /// Calls `f(a)`, indices `x[i, j]` and member accesses `o.name`, in any order.
    fn parse_accessors(&mut self, mut node: Node) -> Result<Node> {
        loop {
            if self.is("(")
                && matches!(node, Node::Symbol(_) | Node::Index { .. } | Node::Call { .. })
            {
                self.open()?;
                let args = if self.is(")") {
                    Vec::new()
                } else {
                    self.parse_list()?
                };
                self.close(")", "Parenthesis ) expected")?;
                node = Node::Call {
                    callee: Rc::new(node),
                    args,
                };
            } else if self.is("[") {
                self.open()?;
                let indices = self.parse_list()?;
                self.close("]", "Parenthesis ] expected")?;
                node = Node::Index {
                    target: Rc::new(node),
                    indices,
                    dot_notation: false,
                };
            } else if self.is(".") {
                self.next()?;
                if self.current.kind != TokenKind::Symbol {
                    return Err(self.error("Property name expected after dot"));
                }
                let name = self.next()?.text;
                node = Node::Index {
                    target: Rc::new(node),
                    indices: vec![Rc::new(Node::Constant(Value::String(name)))],
                    dot_notation: true,
                };
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Rc<Node>>> {
        let mut items = vec![Rc::new(self.parse_assignment()?)];
        while self.is(",") {
            self.next()?;
            items.push(Rc::new(self.parse_assignment()?));
        }
        Ok(items)
    }

    /// `[a, b; c, d]`: `,` separates columns and `;` rows.
    fn parse_matrix(&mut self) -> Result<Node> {
        let start = self.current.position;
        self.open()?;
        if self.is("]") {
            self.close("]", "End of matrix ] expected")?;
            return Ok(Node::ArrayLiteral { rows: Vec::new() });
        }
        let mut rows = vec![self.parse_row()?];
        while self.is(";") {
            self.next()?;
            if !self.is("]") {
                rows.push(self.parse_row()?);
            }
        }
        self.close("]", "End of matrix ] expected")?;
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(row) = rows.iter().find(|row| row.len() != cols) {
            return Err(ExprError::syntax(
                format!("Column dimensions mismatch ({} != {})", row.len(), cols),
                "[",
                start,
            ));
        }
        Ok(Node::ArrayLiteral { rows })
    }

    fn parse_row(&mut self) -> Result<Vec<Rc<Node>>> {
        let mut items = vec![Rc::new(self.parse_assignment()?)];
        while self.is(",") {
            self.next()?;
            if !self.is("]") && !self.is(";") {
                items.push(Rc::new(self.parse_assignment()?));
            }
        }
        Ok(items)
    }

    /// `{key: value, "other key": value}`
    fn parse_object(&mut self) -> Result<Node> {
        self.open()?;
        let mut entries = Vec::new();
        if !self.is("}") {
            loop {
                let key = match self.current.kind {
                    TokenKind::String | TokenKind::Symbol => self.next()?.text,
                    _ => return Err(self.error("Symbol or string expected as object key")),
                };
                if !self.is(":") {
                    return Err(self.error("Colon : expected after object key"));
                }
                self.next()?;
                entries.push((key, Rc::new(self.parse_assignment()?)));
                if !self.is(",") {
                    break;
                }
                self.next()?;
            }
        }
        self.close("}", "Comma , or bracket } expected after object value")?;
        Ok(Node::ObjectLiteral { entries })
    }
}

/// Parses `source` with the default configuration.
///
/// A single statement parses to its node; several statements separated by newlines or
/// `;` parse to a [`Node::Block`]. The empty string is an empty block.
///
/// ```
/// use exp_sandbox::engine::parse;
///
/// let node = parse("(1+2)*3").unwrap();
/// assert_eq!(node.to_string(), "(1 + 2) * 3");
/// ```
pub fn parse(source: &str) -> Result<Node> {
    parse_with_config(source, &EngineConfig::default())
}

/// Parses `source` honoring the limits and grammar switches of `config`.
pub fn parse_with_config(source: &str, config: &EngineConfig) -> Result<Node> {
    if source.len() > config.max_expression_length {
        return Err(ExprError::CapacityExceeded("expression length"));
    }
    let mut parser = Parser::new(source, config)?;
    let node = parser.parse_program()?;
    debug!(node = node.type_name(), length = source.len(), "expression parsed");
    Ok(node)
}

/// Parses, compiles and evaluates `source` in one go.
///
/// Without a scope a fresh one over the built-in namespace is used and dropped
/// afterwards. A block evaluates to the result set of its visible statements.
///
/// ```
/// use exp_sandbox::{Scope, Value, evaluate};
///
/// let scope = Scope::new();
/// let results = evaluate("b = 43; b * 4", Some(&scope)).unwrap();
/// assert_eq!(results.into_results(), vec![Value::Number(172.0)]);
/// assert_eq!(evaluate("2 + 3 * 4", None).unwrap(), Value::Number(14.0));
/// ```
pub fn evaluate(source: &str, scope: Option<&Scope>) -> Result<Value> {
    let node = parse(source)?;
    match scope {
        Some(scope) => node.evaluate(scope),
        None => node.evaluate(&Scope::new()),
    }
}

/// A namespace and a configuration used together.
#[derive(Clone, Debug)]
pub struct Engine {
    namespace: Rc<Namespace>,
    config: EngineConfig,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine over the built-in namespace.
    pub fn new() -> Self {
        Self::with_namespace(Namespace::builtin())
    }

    pub fn with_namespace(namespace: Rc<Namespace>) -> Self {
        Self {
            namespace,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn parse(&self, source: &str) -> Result<Node> {
        parse_with_config(source, &self.config)
    }

    /// Parses and compiles `source` against this engine's namespace.
    pub fn compile(&self, source: &str) -> Result<CompiledExpression> {
        self.parse(source)?.compile(&self.namespace)
    }

    /// Evaluates `source` in `scope` under this engine's call-depth limit.
    ///
    /// Operators are bound from the engine's namespace; symbols still resolve through
    /// `scope`, which falls back to its own namespace.
    pub fn evaluate(&self, source: &str, scope: &Scope) -> Result<Value> {
        self.compile(source)?.evaluate_with(scope, &self.config.frame())
    }

    /// A new root scope over this engine's namespace.
    pub fn scope(&self) -> Scope {
        Scope::with_namespace(Rc::clone(&self.namespace))
    }

    pub fn namespace(&self) -> &Rc<Namespace> {
        &self.namespace
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
