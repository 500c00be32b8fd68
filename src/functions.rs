//! Built-in operators, functions, constants and units.
//!
//! Every operator of the expression language compiles to a call of one of the functions
//! registered here (`add`, `multiply`, `unaryMinus`, ...), so this module defines the
//! arithmetic of the built-in namespace. Numeric operators broadcast over matrices
//! element by element; `multiply` and `pow` on matrices are the algebraic products.
//!
//! The scalar math uses the `libm` crate when the `libm` feature is enabled (the default)
//! and the standard library float methods otherwise. Depending on the selected precision
//! (the `f32` feature) the matching single or double precision routines are used.

use std::collections::BTreeMap;

use crate::Real;
use crate::error::{ExprError, Result};
use crate::namespace::Namespace;
use crate::value::{Arity, Matrix, Value};

mod math {
    #[cfg(all(feature = "libm", feature = "f32"))]
    pub use libm::{
        acosf as acos, asinf as asin, atan2f as atan2, atanf as atan, ceilf as ceil, cosf as cos,
        expf as exp, fabsf as abs, floorf as floor, log10f as log10, logf as ln, powf as pow,
        roundf as round, sinf as sin, sqrtf as sqrt, tanf as tan,
    };

    #[cfg(all(feature = "libm", not(feature = "f32")))]
    pub use libm::{
        acos, asin, atan, atan2, ceil, cos, exp, fabs as abs, floor, log as ln, log10, pow, round,
        sin, sqrt, tan,
    };

    #[cfg(not(feature = "libm"))]
    mod fallback {
        use crate::Real;

        pub fn acos(x: Real) -> Real {
            x.acos()
        }
        pub fn asin(x: Real) -> Real {
            x.asin()
        }
        pub fn atan(x: Real) -> Real {
            x.atan()
        }
        pub fn atan2(y: Real, x: Real) -> Real {
            y.atan2(x)
        }
        pub fn ceil(x: Real) -> Real {
            x.ceil()
        }
        pub fn cos(x: Real) -> Real {
            x.cos()
        }
        pub fn exp(x: Real) -> Real {
            x.exp()
        }
        pub fn abs(x: Real) -> Real {
            x.abs()
        }
        pub fn floor(x: Real) -> Real {
            x.floor()
        }
        pub fn log10(x: Real) -> Real {
            x.log10()
        }
        pub fn ln(x: Real) -> Real {
            x.ln()
        }
        pub fn pow(x: Real, y: Real) -> Real {
            x.powf(y)
        }
        pub fn round(x: Real) -> Real {
            x.round()
        }
        pub fn sin(x: Real) -> Real {
            x.sin()
        }
        pub fn sqrt(x: Real) -> Real {
            x.sqrt()
        }
        pub fn tan(x: Real) -> Real {
            x.tan()
        }
    }

    #[cfg(not(feature = "libm"))]
    pub use fallback::*;
}

/// Relative tolerance of `equal` and the other comparisons.
const EQUALITY_EPSILON: Real = 16.0 * Real::EPSILON;

/// Largest `n` whose factorial is finite.
const MAX_FACTORIAL: Real = 170.0;

/// Returns true if `a` and `b` are equal up to a relative tolerance.
pub fn nearly_equal(a: Real, b: Real) -> bool {
    if a == b {
        return true;
    }
    if a.is_nan() || b.is_nan() || a.is_infinite() || b.is_infinite() {
        return false;
    }
    let diff = math::abs(a - b);
    diff <= EQUALITY_EPSILON * math::abs(a).max(math::abs(b))
}

/// Floored modulo: the result has the sign of the divisor. `x % 0` is `x`.
pub fn modulo(x: Real, y: Real) -> Real {
    if y == 0.0 {
        x
    } else {
        x - y * math::floor(x / y)
    }
}

/// Factorial of a non-negative integer, infinite past the largest representable value.
pub fn factorial(n: Real) -> Option<Real> {
    if n < 0.0 || math::floor(n) != n {
        return None;
    }
    if n > MAX_FACTORIAL {
        return Some(Real::INFINITY);
    }
    let mut result: Real = 1.0;
    let mut i: Real = 2.0;
    while i <= n {
        result *= i;
        i += 1.0;
    }
    Some(result)
}

/// Rounds to `decimals` digits after the point.
pub fn round_to(x: Real, decimals: Real) -> Real {
    if decimals == 0.0 {
        return math::round(x);
    }
    let factor = math::pow(10.0, decimals);
    math::round(x * factor) / factor
}

pub fn sign(x: Real) -> Real {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        x
    }
}

fn mismatch(operation: &str, a: &Value, b: &Value) -> ExprError {
    ExprError::type_mismatch(
        operation,
        format!("cannot combine {} and {}", a.type_name(), b.type_name()),
    )
}

/// Applies a scalar operation element by element, broadcasting scalars over matrices.
fn broadcast<F>(a: &Value, b: &Value, scalar: &F) -> Result<Value>
where
    F: Fn(&Value, &Value) -> Result<Value>,
{
    match (a, b) {
        (Value::Matrix(x), Value::Matrix(y)) => {
            if x.rows() != y.rows() || x.cols() != y.cols() {
                return Err(ExprError::DimensionMismatch {
                    expected: x.len(),
                    found: y.len(),
                });
            }
            let data = x
                .iter()
                .zip(y.iter())
                .map(|(l, r)| broadcast(l, r, scalar))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::matrix(Matrix::new(x.rows(), x.cols(), data)?))
        }
        (Value::Matrix(x), s) => Ok(Value::matrix(x.map(|e| broadcast(e, s, scalar))?)),
        (s, Value::Matrix(y)) => Ok(Value::matrix(y.map(|e| broadcast(s, e, scalar))?)),
        _ => scalar(a, b),
    }
}

fn map_elements<F>(value: &Value, scalar: &F) -> Result<Value>
where
    F: Fn(&Value) -> Result<Value>,
{
    match value {
        Value::Matrix(m) => Ok(Value::matrix(m.map(|e| map_elements(e, scalar))?)),
        other => scalar(other),
    }
}

fn numeric(operation: &'static str, f: fn(Real) -> Real) -> impl Fn(&Value) -> Result<Value> {
    move |v| Ok(Value::Number(f(v.to_number(operation)?)))
}

fn same_dimension(operation: &str, a: &Value, b: &Value) -> Result<()> {
    if let (Value::Unit(x), Value::Unit(y)) = (a, b) {
        if x.dimension != y.dimension {
            return Err(ExprError::type_mismatch(
                operation,
                format!("units {} and {} do not share a dimension", x.name, y.name),
            ));
        }
    }
    Ok(())
}

fn add_scalar(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Unit(x), Value::Unit(y)) => {
            same_dimension("add", a, b)?;
            Ok(Value::Unit(x.with_base_value(x.base_value() + y.base_value())))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Number(x + y)),
            _ => Err(mismatch("add", a, b)),
        },
    }
}

fn subtract_scalar(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Unit(x), Value::Unit(y)) => {
            same_dimension("subtract", a, b)?;
            Ok(Value::Unit(x.with_base_value(x.base_value() - y.base_value())))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Number(x - y)),
            _ => Err(mismatch("subtract", a, b)),
        },
    }
}

fn multiply_scalar(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Unit(u), other) | (other, Value::Unit(u)) if other.as_number().is_some() => {
            let factor = other.to_number("multiply")?;
            let mut scaled = u.clone();
            scaled.value *= factor;
            Ok(Value::Unit(scaled))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Number(x * y)),
            _ => Err(mismatch("multiply", a, b)),
        },
    }
}

fn divide_scalar(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Unit(x), Value::Unit(y)) => {
            same_dimension("divide", a, b)?;
            Ok(Value::Number(x.base_value() / y.base_value()))
        }
        (Value::Unit(u), other) if other.as_number().is_some() => {
            let mut scaled = u.clone();
            scaled.value /= other.to_number("divide")?;
            Ok(Value::Unit(scaled))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Value::Number(x / y)),
            _ => Err(mismatch("divide", a, b)),
        },
    }
}

fn numbers(operation: &'static str, f: fn(Real, Real) -> Real) -> impl Fn(&Value, &Value) -> Result<Value> {
    move |a, b| match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => Ok(Value::Number(f(x, y))),
        _ => Err(mismatch(operation, a, b)),
    }
}

/// Ordering of two scalars, with units compared in their base unit.
fn compare(operation: &str, a: &Value, b: &Value) -> Result<Option<core::cmp::Ordering>> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(Some(x.cmp(y))),
        (Value::Unit(x), Value::Unit(y)) => {
            same_dimension(operation, a, b)?;
            Ok(compare_numbers(x.base_value(), y.base_value()))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(compare_numbers(x, y)),
            _ => Err(mismatch(operation, a, b)),
        },
    }
}

fn compare_numbers(x: Real, y: Real) -> Option<core::cmp::Ordering> {
    if nearly_equal(x, y) {
        Some(core::cmp::Ordering::Equal)
    } else {
        x.partial_cmp(&y)
    }
}

/// Scalar equality used by `equal`, `unequal` and `includes`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(_), Value::String(_)) | (Value::Unit(_), Value::Unit(_)) => {
            matches!(compare("equal", a, b), Ok(Some(core::cmp::Ordering::Equal)))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => nearly_equal(x, y),
            _ => a == b,
        },
    }
}

fn relation(
    operation: &'static str,
    accept: fn(core::cmp::Ordering) -> bool,
) -> impl Fn(&Value, &Value) -> Result<Value> {
    move |a, b| Ok(Value::Boolean(compare(operation, a, b)?.is_some_and(accept)))
}

/// Matrix product, or scalar multiplication when either side is a scalar.
pub fn multiply(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Matrix(x), Value::Matrix(y)) => Ok(Value::matrix(matmul(x, y)?)),
        _ => broadcast(a, b, &multiply_scalar),
    }
}

fn matmul(x: &Matrix, y: &Matrix) -> Result<Matrix> {
    if x.cols() != y.rows() {
        return Err(ExprError::DimensionMismatch {
            expected: x.cols(),
            found: y.rows(),
        });
    }
    let mut data = Vec::with_capacity(x.rows() * y.cols());
    for r in 0..x.rows() {
        for c in 0..y.cols() {
            let mut sum = Value::Number(0.0);
            for k in 0..x.cols() {
                if let (Some(l), Some(rv)) = (x.get(r, k), y.get(k, c)) {
                    sum = add_scalar(&sum, &multiply_scalar(l, rv)?)?;
                }
            }
            data.push(sum);
        }
    }
    Matrix::new(x.rows(), y.cols(), data)
}

fn identity(n: usize) -> Matrix {
    let data = (0..n * n)
        .map(|i| Value::Number(if i / n == i % n { 1.0 } else { 0.0 }))
        .collect();
    Matrix::new(n, n, data).unwrap_or_else(|_| Matrix::empty())
}

/// Power; a square matrix may be raised to a non-negative integer.
pub fn pow(a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Matrix(m), exponent) => {
            if m.rows() != m.cols() {
                return Err(ExprError::DimensionMismatch {
                    expected: m.rows(),
                    found: m.cols(),
                });
            }
            let n = exponent.to_number("pow")?;
            if n < 0.0 || math::floor(n) != n {
                return Err(ExprError::type_mismatch(
                    "pow",
                    "matrix exponent must be a non-negative integer",
                ));
            }
            let mut result = identity(m.rows());
            let mut i: Real = 0.0;
            while i < n {
                result = matmul(&result, m)?;
                i += 1.0;
            }
            Ok(Value::matrix(result))
        }
        _ => numbers("pow", math::pow)(a, b),
    }
}

/// Membership: element of a matrix, substring of a string, or key of an object.
pub fn includes(needle: &Value, haystack: &Value) -> Result<Value> {
    let found = match (needle, haystack) {
        (_, Value::Matrix(m)) => m.iter().any(|e| values_equal(needle, e)),
        (Value::String(n), Value::String(h)) => h.contains(n.as_str()),
        (Value::String(key), Value::Object(entries)) => entries.contains_key(key),
        _ => return Err(mismatch("includes", needle, haystack)),
    };
    Ok(Value::Boolean(found))
}

fn unary_minus(v: &Value) -> Result<Value> {
    match v {
        Value::Unit(u) => {
            let mut negated = u.clone();
            negated.value = -negated.value;
            Ok(Value::Unit(negated))
        }
        other => Ok(Value::Number(-other.to_number("unaryMinus")?)),
    }
}

fn unary_plus(v: &Value) -> Result<Value> {
    match v {
        Value::Unit(_) => Ok(v.clone()),
        other => Ok(Value::Number(other.to_number("unaryPlus")?)),
    }
}

fn factorial_value(v: &Value) -> Result<Value> {
    let n = v.to_number("factorial")?;
    factorial(n).map(Value::Number).ok_or_else(|| {
        ExprError::type_mismatch("factorial", format!("{} is not a non-negative integer", n))
    })
}

fn abs_value(v: &Value) -> Result<Value> {
    match v {
        Value::Unit(u) => {
            let mut magnitude = u.clone();
            magnitude.value = math::abs(magnitude.value);
            Ok(Value::Unit(magnitude))
        }
        other => Ok(Value::Number(math::abs(other.to_number("abs")?))),
    }
}

/// Numbers of a `min`/`max` call: either the arguments or the elements of a single matrix.
fn extremum_operands(operation: &str, args: &[Value]) -> Result<Vec<Real>> {
    let items: Vec<&Value> = match args {
        [Value::Matrix(m)] => m.iter().collect(),
        _ => args.iter().collect(),
    };
    if items.is_empty() {
        return Err(ExprError::type_mismatch(operation, "cannot take extremum of empty matrix"));
    }
    items.into_iter().map(|v| v.to_number(operation)).collect()
}

fn size(v: &Value) -> Value {
    let dims: Vec<Real> = match v {
        Value::Matrix(m) => vec![m.rows() as Real, m.cols() as Real],
        Value::String(s) => vec![s.chars().count() as Real],
        _ => Vec::new(),
    };
    Value::matrix(Matrix::row(dims.into_iter().map(Value::Number).collect()))
}

fn concat(args: &[Value]) -> Result<Value> {
    if args.iter().all(|a| matches!(a, Value::String(_))) {
        let joined: String = args.iter().filter_map(Value::as_str).collect();
        return Ok(Value::String(joined));
    }
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::Matrix(m) if m.is_empty() => {}
            Value::Matrix(m) => parts.push(m.as_ref()),
            other => {
                return Err(ExprError::type_mismatch(
                    "concat",
                    format!("expected strings or matrices, got {}", other.type_name()),
                ));
            }
        }
    }
    let Some(first) = parts.first() else {
        return Ok(Value::matrix(Matrix::empty()));
    };
    let rows = first.rows();
    if let Some(bad) = parts.iter().find(|m| m.rows() != rows) {
        return Err(ExprError::DimensionMismatch {
            expected: rows,
            found: bad.rows(),
        });
    }
    let cols: usize = parts.iter().map(|m| m.cols()).sum();
    let mut data = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for part in &parts {
            for c in 0..part.cols() {
                if let Some(v) = part.get(r, c) {
                    data.push(v.clone());
                }
            }
        }
    }
    Ok(Value::matrix(Matrix::new(rows, cols, data)?))
}

fn sum(args: &[Value]) -> Result<Value> {
    let items: Vec<&Value> = match args {
        [Value::Matrix(m)] => m.iter().collect(),
        _ => args.iter().collect(),
    };
    items
        .into_iter()
        .try_fold(Value::Number(0.0), |acc, v| add_scalar(&acc, v))
}

fn to_number(v: &Value) -> Result<Value> {
    match v {
        Value::String(s) => s
            .trim()
            .parse::<Real>()
            .map(Value::Number)
            .map_err(|_| ExprError::type_mismatch("number", format!("cannot convert \"{}\" to a number", s))),
        Value::Unit(u) => Ok(Value::Number(u.value)),
        other => Ok(Value::Number(other.to_number("number")?)),
    }
}

fn to_string(v: &Value) -> Value {
    match v {
        Value::String(_) => v.clone(),
        other => Value::String(other.to_string()),
    }
}

fn keys(v: &Value) -> Result<Value> {
    match v {
        Value::Object(entries) => Ok(Value::matrix(Matrix::row(
            entries.keys().map(|k| Value::String(k.clone())).collect(),
        ))),
        other => Err(ExprError::type_mismatch(
            "keys",
            format!("expected an object, got {}", other.type_name()),
        )),
    }
}

/// Registers every built-in entry into `ns`.
pub(crate) fn register_builtins(ns: &mut Namespace) {
    register_operators(ns);
    register_math(ns);
    register_utilities(ns);
    register_constants(ns);
    register_units(ns);
}

fn register_operators(ns: &mut Namespace) {
    ns.register_native("add", Arity::exact(2), |a| broadcast(&a[0], &a[1], &add_scalar));
    ns.register_native("subtract", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &subtract_scalar)
    });
    ns.register_native("multiply", Arity::exact(2), |a| multiply(&a[0], &a[1]));
    ns.register_native("dotMultiply", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &multiply_scalar)
    });
    ns.register_native("divide", Arity::exact(2), |a| match (&a[0], &a[1]) {
        (_, Value::Matrix(_)) => Err(ExprError::type_mismatch(
            "divide",
            "division by a matrix is not supported",
        )),
        (l, r) => broadcast(l, r, &divide_scalar),
    });
    ns.register_native("dotDivide", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &divide_scalar)
    });
    ns.register_native("mod", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &numbers("mod", modulo))
    });
    ns.register_native("pow", Arity::exact(2), |a| pow(&a[0], &a[1]));
    ns.register_native("dotPow", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &numbers("dotPow", math::pow))
    });

    ns.register_native("equal", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &|l: &Value, r: &Value| Ok(Value::Boolean(values_equal(l, r))))
    });
    ns.register_native("unequal", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &|l: &Value, r: &Value| Ok(Value::Boolean(!values_equal(l, r))))
    });
    ns.register_native("smaller", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &relation("smaller", |o| o.is_lt()))
    });
    ns.register_native("larger", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &relation("larger", |o| o.is_gt()))
    });
    ns.register_native("smallerEq", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &relation("smallerEq", |o| o.is_le()))
    });
    ns.register_native("largerEq", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &relation("largerEq", |o| o.is_ge()))
    });
    ns.register_native("includes", Arity::exact(2), |a| includes(&a[0], &a[1]));

    ns.register_native("unaryMinus", Arity::exact(1), |a| map_elements(&a[0], &unary_minus));
    ns.register_native("unaryPlus", Arity::exact(1), |a| map_elements(&a[0], &unary_plus));
    ns.register_native("not", Arity::exact(1), |a| {
        map_elements(&a[0], &|v: &Value| Ok(Value::Boolean(!v.is_truthy())))
    });
    ns.register_native("factorial", Arity::exact(1), |a| {
        map_elements(&a[0], &factorial_value)
    });
    ns.register_native("transpose", Arity::exact(1), |a| match &a[0] {
        Value::Matrix(m) => Ok(Value::matrix(m.transpose())),
        other => Ok(other.clone()),
    });
}

fn register_math(ns: &mut Namespace) {
    let unary: [(&'static str, fn(Real) -> Real); 12] = [
        ("sqrt", math::sqrt),
        ("sin", math::sin),
        ("cos", math::cos),
        ("tan", math::tan),
        ("asin", math::asin),
        ("acos", math::acos),
        ("atan", math::atan),
        ("exp", math::exp),
        ("log10", math::log10),
        ("ceil", math::ceil),
        ("floor", math::floor),
        ("sign", sign),
    ];
    for (name, f) in unary {
        ns.register_native(name, Arity::exact(1), move |a| {
            map_elements(&a[0], &numeric(name, f))
        });
    }

    ns.register_native("abs", Arity::exact(1), |a| map_elements(&a[0], &abs_value));
    ns.register_native("log", Arity::range(1, 2), |a| {
        let x = a[0].to_number("log")?;
        match a.get(1) {
            Some(base) => Ok(Value::Number(math::ln(x) / math::ln(base.to_number("log")?))),
            None => Ok(Value::Number(math::ln(x))),
        }
    });
    ns.register_native("round", Arity::range(1, 2), |a| {
        let decimals = match a.get(1) {
            Some(d) => d.to_number("round")?,
            None => 0.0,
        };
        map_elements(&a[0], &|v: &Value| Ok(Value::Number(round_to(v.to_number("round")?, decimals))))
    });
    ns.register_native("atan2", Arity::exact(2), |a| {
        broadcast(&a[0], &a[1], &numbers("atan2", math::atan2))
    });
    ns.register_native("min", Arity::at_least(1), |a| {
        let items = extremum_operands("min", a)?;
        Ok(Value::Number(items.into_iter().fold(Real::INFINITY, Real::min)))
    });
    ns.register_native("max", Arity::at_least(1), |a| {
        let items = extremum_operands("max", a)?;
        Ok(Value::Number(items.into_iter().fold(Real::NEG_INFINITY, Real::max)))
    });
    ns.register_native("sum", Arity::at_least(1), sum);
}

fn register_utilities(ns: &mut Namespace) {
    ns.register_native("size", Arity::exact(1), |a| Ok(size(&a[0])));
    ns.register_native("concat", Arity::at_least(1), concat);
    ns.register_native("string", Arity::exact(1), |a| Ok(to_string(&a[0])));
    ns.register_native("number", Arity::exact(1), |a| to_number(&a[0]));
    ns.register_native("keys", Arity::exact(1), |a| keys(&a[0]));
    ns.register_native("object", Arity::exact(0), |_| Ok(Value::object(BTreeMap::new())));
}

fn register_constants(ns: &mut Namespace) {
    ns.insert_constant("pi", crate::constants::PI);
    ns.insert_constant("e", crate::constants::E);
    ns.insert_constant("tau", 2.0 * crate::constants::PI);
    ns.insert_constant("phi", 1.618_033_988_749_895);
    ns.insert_constant("Infinity", Real::INFINITY);
    ns.insert_constant("NaN", Real::NAN);
}

fn register_units(ns: &mut Namespace) {
    let units: [(&str, Real, &str); 16] = [
        ("m", 1.0, "length"),
        ("cm", 0.01, "length"),
        ("mm", 0.001, "length"),
        ("km", 1000.0, "length"),
        ("inch", 0.0254, "length"),
        ("ft", 0.3048, "length"),
        ("g", 0.001, "mass"),
        ("kg", 1.0, "mass"),
        ("s", 1.0, "time"),
        ("ms", 0.001, "time"),
        ("minute", 60.0, "time"),
        ("h", 3600.0, "time"),
        ("N", 1.0, "force"),
        ("J", 1.0, "energy"),
        ("W", 1.0, "power"),
        ("Hz", 1.0, "frequency"),
    ];
    for (name, scale, dimension) in units {
        ns.insert_unit(name, scale, dimension);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_approx_eq;

    fn call(name: &str, args: &[Value]) -> Result<Value> {
        let ns = Namespace::with_builtins();
        match ns.function(name)? {
            crate::value::Function::Native(f) => {
                f.arity().check(name, args.len())?;
                (f.implementation)(args)
            }
            other => panic!("{} is not native: {:?}", name, other),
        }
    }

    fn n(v: Real) -> Value {
        Value::Number(v)
    }

    fn row(values: &[Real]) -> Value {
        Value::matrix(Matrix::row(values.iter().map(|v| Value::Number(*v)).collect()))
    }

    #[test]
    fn test_modulo_is_floored() {
        assert_eq!(modulo(7.0, 3.0), 1.0);
        assert_eq!(modulo(-7.0, 3.0), 2.0);
        assert_eq!(modulo(7.0, -3.0), -2.0);
        assert_eq!(modulo(5.0, 0.0), 5.0);
    }

    #[test]
    fn test_factorial() {
        assert_eq!(factorial(0.0), Some(1.0));
        assert_eq!(factorial(5.0), Some(120.0));
        assert_eq!(factorial(171.0), Some(Real::INFINITY));
        assert_eq!(factorial(2.5), None);
        assert_eq!(factorial(-1.0), None);
    }

    #[test]
    fn test_broadcast_scalar_over_matrix() {
        let result = call("add", &[row(&[1.0, 2.0]), n(10.0)]).unwrap();
        assert_eq!(result, row(&[11.0, 12.0]));
    }

    #[test]
    fn test_matrix_product() {
        let a = Value::matrix(Matrix::from_numbers(2, 2, &[1.0, 2.0, 3.0, 4.0]).unwrap());
        let b = Value::matrix(Matrix::from_numbers(2, 1, &[5.0, 6.0]).unwrap());
        let result = call("multiply", &[a.clone(), b]).unwrap();
        assert_eq!(
            result,
            Value::matrix(Matrix::from_numbers(2, 1, &[17.0, 39.0]).unwrap())
        );
        let squared = call("pow", &[a, n(2.0)]).unwrap();
        assert_eq!(
            squared,
            Value::matrix(Matrix::from_numbers(2, 2, &[7.0, 10.0, 15.0, 22.0]).unwrap())
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = call("add", &[row(&[1.0, 2.0]), row(&[1.0, 2.0, 3.0])]).unwrap_err();
        assert_eq!(
            err,
            ExprError::DimensionMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_equal_tolerates_rounding() {
        let sum = call("add", &[n(0.1), n(0.2)]).unwrap();
        assert_eq!(call("equal", &[sum, n(0.3)]).unwrap(), Value::Boolean(true));
        assert_eq!(call("smaller", &[n(1.0), n(2.0)]).unwrap(), Value::Boolean(true));
        assert_eq!(
            call("largerEq", &[Value::from("b"), Value::from("a")]).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_units_convert_within_dimension() {
        let ns = Namespace::with_builtins();
        let m = ns.unit("m").unwrap();
        let cm = ns.unit("cm").unwrap();
        let twenty_cm = call("multiply", &[n(20.0), cm]).unwrap();
        match call("add", &[m.clone(), twenty_cm]).unwrap() {
            Value::Unit(u) => {
                assert_eq!(u.name, "m");
                assert_approx_eq!(u.value, 1.2);
            }
            other => panic!("expected unit, got {:?}", other),
        }
        let kg = ns.unit("kg").unwrap();
        assert!(call("add", &[m, kg]).is_err());
    }

    #[test]
    fn test_includes() {
        assert_eq!(
            call("includes", &[n(2.0), row(&[1.0, 2.0])]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            call("includes", &[Value::from("ell"), Value::from("hello")]).unwrap(),
            Value::Boolean(true)
        );
        assert!(call("includes", &[n(1.0), n(1.0)]).is_err());
    }

    #[test]
    fn test_min_max_accept_matrix_or_arguments() {
        assert_eq!(call("max", &[n(1.0), n(5.0), n(3.0)]).unwrap(), n(5.0));
        assert_eq!(call("min", &[row(&[4.0, -2.0])]).unwrap(), n(-2.0));
        assert!(call("max", &[Value::matrix(Matrix::empty())]).is_err());
    }

    #[test]
    fn test_log_with_base_and_round() {
        let log = call("log", &[n(8.0), n(2.0)]).unwrap();
        assert_approx_eq!(log.as_number().unwrap(), 3.0);
        assert_eq!(call("round", &[n(3.14159), n(2.0)]).unwrap(), n(3.14));
        assert_eq!(call("round", &[n(2.5)]).unwrap(), n(3.0));
    }

    #[test]
    fn test_concat_and_size() {
        assert_eq!(
            call("concat", &[Value::from("ab"), Value::from("cd")]).unwrap(),
            Value::from("abcd")
        );
        assert_eq!(
            call("concat", &[row(&[1.0]), row(&[2.0, 3.0])]).unwrap(),
            row(&[1.0, 2.0, 3.0])
        );
        let m = Value::matrix(Matrix::from_numbers(2, 3, &[0.0; 6]).unwrap());
        assert_eq!(call("size", &[m]).unwrap(), row(&[2.0, 3.0]));
    }

    #[test]
    fn test_arity_is_enforced() {
        let err = call("atan2", &[n(1.0)]).unwrap_err();
        assert!(matches!(err, ExprError::InvalidArity { found: 1, .. }));
    }
}
