//! Error types and handling for the exp-sandbox crate.
//!
//! This module defines the single error type used throughout the crate for tokenizing,
//! parsing, compiling and evaluating expressions. Every failure surfaces to the direct
//! caller of the operation that failed; the engine never swallows an error to produce a
//! best-effort value.

use std::num::ParseFloatError;

use thiserror::Error;

/// Result type used throughout the crate.
///
/// This is a convenience type alias that uses the `ExprError` type for the error variant.
pub type Result<T> = std::result::Result<T, ExprError>;

/// Error type for expression parsing, compilation and evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    /// Error when parsing a floating point literal.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseFloatError),

    /// Structural error found by the tokenizer or the parser.
    ///
    /// `position` is the 1-based character offset of the offending token and `token` its
    /// text (`"end of input"` when the source ran out). A syntax error always aborts the
    /// whole parse.
    #[error("Syntax error: {message} (char {position})")]
    Syntax {
        /// What went wrong.
        message: String,
        /// Text of the offending token.
        token: String,
        /// 1-based character offset of the offending token.
        position: usize,
    },

    /// An operator or function name required at compile time is absent from the namespace.
    ///
    /// This is raised eagerly by `compile`, never deferred to evaluation.
    #[error("Function {name} missing in provided namespace")]
    MissingFunction { name: String },

    /// A symbol could not be resolved through the scope chain, the namespace or the unit
    /// table.
    #[error("Undefined symbol {name}")]
    UndefinedSymbol { name: String },

    /// A value that is not callable was invoked.
    #[error("{name} is not a function")]
    NotAFunction { name: String },

    /// Error when a function is called with the wrong number of arguments.
    #[error("Invalid function call to '{name}': expected {expected} arguments, found {found}")]
    InvalidArity {
        /// Name of the function that was called
        name: String,
        /// Human readable expectation, e.g. `2` or `1..3`
        expected: String,
        /// Actual number of arguments provided
        found: usize,
    },

    /// An operation received a value of the wrong type.
    #[error("Unexpected type of argument in function {operation}: {details}")]
    TypeMismatch { operation: String, details: String },

    /// Error when an index is outside of the indexed object.
    #[error("Index out of range ({index} > {max})")]
    IndexOutOfRange { index: usize, max: usize },

    /// Error when sizes or dimension counts do not line up.
    #[error("Dimension mismatch ({expected} != {found})")]
    DimensionMismatch { expected: usize, found: usize },

    /// The target of an assignment cannot be written to.
    #[error("Cannot assign to {name}")]
    NotAddressable { name: String },

    /// A user-defined function outlived the scope it was defined in.
    #[error("Scope of function {name} is no longer alive")]
    ScopeReleased { name: String },

    /// An expression attempted to invoke a blocked reflective-execution primitive.
    #[error("Calling {name} is not allowed")]
    SandboxViolation { name: String },

    /// Error when the configured call depth or nesting depth is exceeded.
    #[error("Recursion limit exceeded: {0}")]
    RecursionLimit(String),

    /// Error when a fixed-capacity container is full.
    #[error("Capacity exceeded for {0}")]
    CapacityExceeded(&'static str),

    /// Error when a batch parameter name is registered twice.
    #[error("Duplicate parameter: {0}")]
    DuplicateParameter(String),

    /// Error when a batch parameter index does not exist.
    #[error("Invalid parameter index: {0}")]
    InvalidParameterIndex(usize),

    /// General-purpose error for any other error conditions.
    #[error("{0}")]
    Other(String),
}

impl ExprError {
    /// Builds a syntax error from a 0-based character offset.
    pub(crate) fn syntax(message: impl Into<String>, token: impl Into<String>, offset: usize) -> Self {
        ExprError::Syntax {
            message: message.into(),
            token: token.into(),
            position: offset + 1,
        }
    }

    pub(crate) fn type_mismatch(operation: &str, details: impl Into<String>) -> Self {
        ExprError::TypeMismatch {
            operation: operation.to_string(),
            details: details.into(),
        }
    }

    /// Returns true for errors raised by the tokenizer or parser.
    pub fn is_syntax(&self) -> bool {
        matches!(self, ExprError::Syntax { .. })
    }
}

impl From<String> for ExprError {
    fn from(err: String) -> ExprError {
        ExprError::Other(err)
    }
}
