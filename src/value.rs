//! The value domain flowing through compiled expressions.
//!
//! The engine itself only needs values it can look up, pass as arguments and return; the
//! arithmetic over them lives in the namespace functions (see `functions`). The set of
//! variants here is what the built-in namespace knows how to operate on.

use core::fmt;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::Real;
use crate::context::DefinitionScope;
use crate::error::{ExprError, Result};
use crate::eval::CompiledExpression;
use crate::host::HostPrimitive;

/// Implementation of a native function: receives evaluated arguments.
pub type NativeImpl = Rc<dyn Fn(&[Value]) -> Result<Value>>;

/// A runtime value.
#[derive(Clone, Debug)]
pub enum Value {
    Number(Real),
    Boolean(bool),
    String(String),
    Matrix(Rc<Matrix>),
    Object(Rc<BTreeMap<String, Value>>),
    Unit(Unit),
    Function(Function),
    /// Values of the visible statements of a block, in order.
    ResultSet(Rc<Vec<Value>>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Matrix(_) => "matrix",
            Value::Object(_) => "object",
            Value::Unit(_) => "unit",
            Value::Function(_) => "function",
            Value::ResultSet(_) => "result set",
        }
    }

    /// Truthiness used by `and`, `or`, `not` and the conditional operator.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Matrix(m) => !m.is_empty(),
            Value::Object(_) | Value::Function(_) => true,
            Value::Unit(u) => u.value != 0.0,
            Value::ResultSet(r) => !r.is_empty(),
        }
    }

    /// Numeric view of the value; booleans count as 0 and 1.
    pub fn as_number(&self) -> Option<Real> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Like [`Value::as_number`] but reports a type error naming `operation`.
    pub fn to_number(&self, operation: &str) -> Result<Real> {
        self.as_number().ok_or_else(|| {
            ExprError::type_mismatch(operation, format!("expected a number, got {}", self.type_name()))
        })
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Value::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// Items of a result set, or the value itself as a single item.
    pub fn into_results(self) -> Vec<Value> {
        match self {
            Value::ResultSet(items) => Rc::unwrap_or_clone(items),
            other => vec![other],
        }
    }

    pub fn matrix(m: Matrix) -> Value {
        Value::Matrix(Rc::new(m))
    }

    pub fn object(entries: BTreeMap<String, Value>) -> Value {
        Value::Object(Rc::new(entries))
    }
}

impl From<Real> for Value {
    fn from(v: Real) -> Self {
        Value::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Matrix> for Value {
    fn from(m: Matrix) -> Self {
        Value::matrix(m)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Matrix(a), Value::Matrix(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Unit(a), Value::Unit(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::ResultSet(a), Value::ResultSet(b)) => a == b,
            _ => false,
        }
    }
}

/// Formats a number so the text parses back to the same value.
pub fn format_number(n: Real) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else if n != 0.0 && (n.abs() >= 1e21 || n.abs() < 1e-7) {
        format!("{:e}", n)
    } else {
        format!("{}", n)
    }
}

/// Quotes and escapes a string the way the tokenizer reads it back.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => f.write_str(&quote_string(s)),
            Value::Matrix(m) => write!(f, "{}", m),
            Value::Object(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", quote_string(key), value)?;
                }
                f.write_str("}")
            }
            Value::Unit(u) => write!(f, "{}", u),
            Value::Function(func) => write!(f, "{}", func),
            Value::ResultSet(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A dense matrix of at most two dimensions, stored row-major.
///
/// Vectors are `1 x n` (row) or `n x 1` (column); the empty matrix is `0 x 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<Value>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<Value>) -> Result<Self> {
        if rows * cols != data.len() {
            return Err(ExprError::DimensionMismatch {
                expected: rows * cols,
                found: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn empty() -> Self {
        Self {
            rows: 0,
            cols: 0,
            data: Vec::new(),
        }
    }

    /// A `1 x n` matrix, or the empty matrix for no elements.
    pub fn row(data: Vec<Value>) -> Self {
        if data.is_empty() {
            return Self::empty();
        }
        Self {
            rows: 1,
            cols: data.len(),
            data,
        }
    }

    /// An `n x 1` matrix, or the empty matrix for no elements.
    pub fn column(data: Vec<Value>) -> Self {
        if data.is_empty() {
            return Self::empty();
        }
        Self {
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    pub fn from_numbers(rows: usize, cols: usize, numbers: &[Real]) -> Result<Self> {
        Self::new(rows, cols, numbers.iter().map(|n| Value::Number(*n)).collect())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_vector(&self) -> bool {
        self.rows <= 1 || self.cols == 1
    }

    pub fn data(&self) -> &[Value] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Linear (row-major) access.
    pub fn get_linear(&self, index: usize) -> Option<&Value> {
        self.data.get(index)
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: Value) {
        let cols = self.cols;
        self.data[row * cols + col] = value;
    }

    pub(crate) fn set_linear(&mut self, index: usize, value: Value) {
        self.data[index] = value;
    }

    /// Grows the matrix to at least `rows x cols`, filling new cells with zero.
    pub(crate) fn resize(&mut self, rows: usize, cols: usize) {
        let rows = rows.max(self.rows);
        let cols = cols.max(self.cols);
        if rows == self.rows && cols == self.cols {
            return;
        }
        let mut data = vec![Value::Number(0.0); rows * cols];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[r * cols + c] = self.data[r * self.cols + c].clone();
            }
        }
        self.rows = rows;
        self.cols = cols;
        self.data = data;
    }

    pub fn transpose(&self) -> Self {
        let mut data = Vec::with_capacity(self.data.len());
        for c in 0..self.cols {
            for r in 0..self.rows {
                data.push(self.data[r * self.cols + c].clone());
            }
        }
        Self {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    pub fn map<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&Value) -> Result<Value>,
    {
        let data = self.data.iter().map(&mut f).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.data.iter()
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for r in 0..self.rows {
            if r > 0 {
                f.write_str("; ")?;
            }
            for c in 0..self.cols {
                if c > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", self.data[r * self.cols + c])?;
            }
        }
        f.write_str("]")
    }
}

/// A physical quantity: magnitude in `name` units.
///
/// `scale` converts one `name` into the base unit of `dimension`, which is what lets
/// quantities of the same dimension be added or compared.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub value: Real,
    pub name: String,
    pub scale: Real,
    pub dimension: String,
}

impl Unit {
    pub fn new(value: Real, name: impl Into<String>, scale: Real, dimension: impl Into<String>) -> Self {
        Self {
            value,
            name: name.into(),
            scale,
            dimension: dimension.into(),
        }
    }

    /// Magnitude expressed in the base unit of the dimension.
    pub fn base_value(&self) -> Real {
        self.value * self.scale
    }

    /// The same quantity expressed in this unit's scale.
    pub fn with_base_value(&self, base: Real) -> Self {
        Self {
            value: base / self.scale,
            ..self.clone()
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_number(self.value), self.name)
    }
}

/// Number of arguments a native function accepts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exact(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }

    pub fn check(&self, name: &str, count: usize) -> Result<()> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(ExprError::InvalidArity {
                name: name.to_string(),
                expected: self.to_string(),
                found: count,
            })
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", max),
            Some(max) => write!(f, "{}..{}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

/// A Rust closure callable from expressions.
pub struct NativeFunction {
    pub(crate) name: String,
    pub(crate) arity: Arity,
    pub(crate) implementation: NativeImpl,
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }
}

/// A function defined by a `function name(params) = body` statement.
///
/// Free variables of the body are looked up through the scope it was defined in when the
/// function is called, not when it is defined.
pub struct UserFunction {
    pub(crate) name: String,
    pub(crate) params: Vec<String>,
    pub(crate) body: CompiledExpression,
    pub(crate) scope: DefinitionScope,
}

impl UserFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

/// A function with some leading arguments fixed.
pub struct BoundFunction {
    pub(crate) target: Function,
    pub(crate) args: Vec<Value>,
}

impl BoundFunction {
    pub fn target(&self) -> &Function {
        &self.target
    }
}

/// Anything callable.
#[derive(Clone)]
pub enum Function {
    Native(Rc<NativeFunction>),
    User(Rc<UserFunction>),
    Bound(Rc<BoundFunction>),
    /// A reflective-execution primitive of the host runtime. Expressions can hold and pass
    /// these around but can never invoke them.
    Host(HostPrimitive),
}

impl Function {
    /// Wraps a closure as a native function.
    pub fn native<F>(name: &str, arity: Arity, implementation: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        Function::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            arity,
            implementation: Rc::new(implementation),
        }))
    }

    /// Fixes the leading arguments of `target`.
    pub fn bound(target: Function, args: Vec<Value>) -> Self {
        Function::Bound(Rc::new(BoundFunction { target, args }))
    }

    pub fn name(&self) -> String {
        match self {
            Function::Native(n) => n.name.clone(),
            Function::User(u) => u.name.clone(),
            Function::Bound(b) => format!("bound {}", b.target.name()),
            Function::Host(p) => p.name().to_string(),
        }
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Native(a), Function::Native(b)) => Rc::ptr_eq(a, b),
            (Function::User(a), Function::User(b)) => Rc::ptr_eq(a, b),
            (Function::Bound(a), Function::Bound(b)) => Rc::ptr_eq(a, b),
            (Function::Host(a), Function::Host(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::User(u) => write!(f, "{}({})", u.name, u.params.join(", ")),
            other => f.write_str(&other.name()),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native(n) => write!(f, "Native({}, arity {})", n.name, n.arity),
            Function::User(u) => write!(f, "User({}({}))", u.name, u.params.join(", ")),
            Function::Bound(b) => write!(f, "Bound({:?}, {} args)", b.target, b.args.len()),
            Function::Host(p) => write!(f, "Host({})", p.name()),
        }
    }
}
