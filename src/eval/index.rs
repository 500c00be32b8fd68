//! Index resolution, subset reads and subset writes.
//!
//! Indices are 1-based in expressions and converted to 0-based positions here. Matrices
//! take one index (linear, row-major) or two (row, column); strings take one; objects
//! take one string key.

use std::rc::Rc;

use heapless::Vec as BoundedVec;

use super::{CompiledExpression, Frame, MAX_RANGE_LENGTH};
use crate::Real;
use crate::context::Scope;
use crate::error::{ExprError, Result};
use crate::value::{Matrix, Value};

/// Most dimensions an index expression can address.
pub(crate) const MAX_DIMENSIONS: usize = 2;

/// One resolved index.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Selector {
    /// A single 0-based position.
    Position(usize),
    /// Several 0-based positions, from a range or a matrix of indices.
    Positions(Vec<usize>),
    Key(String),
}

pub(crate) type Selection = BoundedVec<Selector, MAX_DIMENSIONS>;

/// Value of `end` while evaluating index `dimension` of `count` indices into `target`.
fn end_for(target: &Value, dimension: usize, count: usize) -> Option<Real> {
    match target {
        Value::Matrix(m) if count == 1 => Some(m.len() as Real),
        Value::Matrix(m) if dimension == 0 => Some(m.rows() as Real),
        Value::Matrix(m) => Some(m.cols() as Real),
        Value::String(s) => Some(s.chars().count() as Real),
        _ => None,
    }
}

/// Evaluates the index expressions of `target[...]`, binding `end` for each dimension.
pub(crate) fn resolve(
    target: &Value,
    indices: &[CompiledExpression],
    scope: &Scope,
    frame: &Frame,
) -> Result<Selection> {
    if indices.len() > MAX_DIMENSIONS {
        return Err(ExprError::DimensionMismatch {
            expected: MAX_DIMENSIONS,
            found: indices.len(),
        });
    }
    let mut selection = Selection::new();
    for (dimension, index) in indices.iter().enumerate() {
        let inner = frame.with_end(end_for(target, dimension, indices.len()));
        let value = index.evaluate_with(scope, &inner)?;
        selection
            .push(selector(&value)?)
            .map_err(|_| ExprError::CapacityExceeded("index dimensions"))?;
    }
    Ok(selection)
}

fn position(n: Real) -> Result<usize> {
    if n < 1.0 || n.fract() != 0.0 || !n.is_finite() {
        return Err(ExprError::type_mismatch(
            "index",
            format!("index must be a positive integer, got {}", n),
        ));
    }
    Ok(n as usize - 1)
}

fn selector(value: &Value) -> Result<Selector> {
    match value {
        Value::Number(n) => Ok(Selector::Position(position(*n)?)),
        Value::Matrix(m) => m
            .iter()
            .map(|v| position(v.to_number("index")?))
            .collect::<Result<Vec<_>>>()
            .map(Selector::Positions),
        Value::String(key) => Ok(Selector::Key(key.clone())),
        other => Err(ExprError::type_mismatch(
            "index",
            format!("cannot index with a {}", other.type_name()),
        )),
    }
}

fn positions(selector: &Selector) -> Result<Vec<usize>> {
    match selector {
        Selector::Position(p) => Ok(vec![*p]),
        Selector::Positions(ps) => Ok(ps.clone()),
        Selector::Key(key) => Err(ExprError::type_mismatch(
            "index",
            format!("cannot index a matrix with key \"{}\"", key),
        )),
    }
}

fn check_bound(position: usize, max: usize) -> Result<()> {
    if position < max {
        Ok(())
    } else {
        Err(ExprError::IndexOutOfRange {
            index: position + 1,
            max,
        })
    }
}

/// Reads `target[selection]`.
pub(crate) fn subset(target: &Value, selection: &Selection) -> Result<Value> {
    match (target, selection.as_slice()) {
        (Value::Matrix(m), [Selector::Position(p)]) => {
            check_bound(*p, m.len())?;
            Ok(m.data()[*p].clone())
        }
        (Value::Matrix(m), [selector]) => {
            let picked = positions(selector)?
                .into_iter()
                .map(|p| check_bound(p, m.len()).map(|_| m.data()[p].clone()))
                .collect::<Result<Vec<_>>>()?;
            if m.cols() == 1 && m.rows() > 1 {
                Ok(Value::matrix(Matrix::column(picked)))
            } else {
                Ok(Value::matrix(Matrix::row(picked)))
            }
        }
        (Value::Matrix(m), [Selector::Position(r), Selector::Position(c)]) => {
            check_bound(*r, m.rows())?;
            check_bound(*c, m.cols())?;
            Ok(m.data()[r * m.cols() + c].clone())
        }
        (Value::Matrix(m), [rows, cols]) => {
            let rows = positions(rows)?;
            let cols = positions(cols)?;
            let mut data = Vec::with_capacity(rows.len() * cols.len());
            for r in &rows {
                check_bound(*r, m.rows())?;
                for c in &cols {
                    check_bound(*c, m.cols())?;
                    data.push(m.data()[r * m.cols() + c].clone());
                }
            }
            Ok(Value::matrix(Matrix::new(rows.len(), cols.len(), data)?))
        }
        (Value::String(s), [selector]) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = positions(selector)?
                .into_iter()
                .map(|p| check_bound(p, chars.len()).map(|_| chars[p]))
                .collect::<Result<String>>()?;
            Ok(Value::String(picked))
        }
        (Value::Object(entries), [Selector::Key(key)]) => entries
            .get(key)
            .cloned()
            .ok_or_else(|| ExprError::Other(format!("Object has no property \"{}\"", key))),
        (other, selection) => Err(ExprError::type_mismatch(
            "subset",
            format!(
                "cannot index {} with {} index value(s)",
                other.type_name(),
                selection.len()
            ),
        )),
    }
}

/// Values written by an assignment to `count` positions: one scalar is repeated, a
/// matrix must provide exactly `count` elements.
fn spread(value: Value, count: usize) -> Result<Vec<Value>> {
    match value {
        Value::Matrix(m) if count > 1 => {
            if m.len() != count {
                return Err(ExprError::DimensionMismatch {
                    expected: count,
                    found: m.len(),
                });
            }
            Ok(m.data().to_vec())
        }
        other => Ok(vec![other; count]),
    }
}

fn check_growth(rows: usize, cols: usize) -> Result<()> {
    match rows.checked_mul(cols) {
        Some(cells) if cells <= MAX_RANGE_LENGTH => Ok(()),
        _ => Err(ExprError::CapacityExceeded("matrix")),
    }
}

/// Writes `value` into `target[selection]`, returning the updated target.
///
/// Vectors grow to fit a position past their end and matrices grow to fit a row or
/// column past theirs; new cells are zero.
pub(crate) fn assign(target: Value, selection: &Selection, value: Value, name: &str) -> Result<Value> {
    match (target, selection.as_slice()) {
        (Value::Matrix(m), [selector]) => {
            let mut m = Rc::unwrap_or_clone(m);
            let targets = positions(selector)?;
            let values = spread(value, targets.len())?;
            for (p, v) in targets.into_iter().zip(values) {
                if p >= m.len() {
                    if !m.is_vector() {
                        return Err(ExprError::IndexOutOfRange {
                            index: p + 1,
                            max: m.len(),
                        });
                    }
                    let (rows, cols) = if m.cols() == 1 && m.rows() > 1 {
                        (p + 1, 1)
                    } else {
                        (1, p + 1)
                    };
                    check_growth(rows, cols)?;
                    m.resize(rows, cols);
                }
                m.set_linear(p, v);
            }
            Ok(Value::matrix(m))
        }
        (Value::Matrix(m), [rows, cols]) => {
            let mut m = Rc::unwrap_or_clone(m);
            let rows = positions(rows)?;
            let cols = positions(cols)?;
            let cells = rows
                .len()
                .checked_mul(cols.len())
                .ok_or(ExprError::CapacityExceeded("matrix"))?;
            let values = spread(value, cells)?;
            let max_row = rows.iter().max().map_or(0, |r| r + 1).max(m.rows());
            let max_col = cols.iter().max().map_or(0, |c| c + 1).max(m.cols());
            check_growth(max_row, max_col)?;
            m.resize(max_row, max_col);
            let mut values = values.into_iter();
            for r in &rows {
                for c in &cols {
                    if let Some(v) = values.next() {
                        m.set(*r, *c, v);
                    }
                }
            }
            Ok(Value::matrix(m))
        }
        (Value::Object(entries), [Selector::Key(key)]) => {
            let mut entries = Rc::unwrap_or_clone(entries);
            entries.insert(key.clone(), value);
            Ok(Value::object(entries))
        }
        (Value::String(s), [Selector::Position(p)]) => {
            let mut chars: Vec<char> = s.chars().collect();
            check_bound(*p, chars.len())?;
            let replacement = match value.as_str().map(|v| v.chars().collect::<Vec<_>>()) {
                Some(c) if c.len() == 1 => c[0],
                _ => {
                    return Err(ExprError::type_mismatch(
                        "subset",
                        "a single character string is required",
                    ));
                }
            };
            chars[*p] = replacement;
            Ok(Value::String(chars.into_iter().collect()))
        }
        _ => Err(ExprError::NotAddressable {
            name: name.to_string(),
        }),
    }
}
