//! Engine limits and printing defaults.

use serde::{Deserialize, Serialize};

use crate::eval::Frame;
use crate::node::{FormatOptions, ImplicitMode, ParenthesisMode};

/// Default bound on nested user-function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 128;

/// Default bound on grammar recursion while parsing (brackets, prefix operators, nested
/// statements).
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 100;

/// Default bound on source length, in bytes.
pub const DEFAULT_MAX_EXPRESSION_LENGTH: usize = 64 * 1024;

/// Settings of an [`Engine`](crate::engine::Engine).
///
/// Every field has a default, so a partial document deserializes:
///
/// ```
/// use exp_sandbox::config::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{ "max_call_depth": 16 }"#).unwrap();
/// assert_eq!(config.max_call_depth, 16);
/// assert!(config.implicit_multiplication);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nested user-function calls allowed before evaluation fails with `RecursionLimit`.
    pub max_call_depth: usize,
    /// Grammar recursion allowed before parsing fails with `RecursionLimit`.
    pub max_nesting_depth: usize,
    /// Longest accepted source, in bytes.
    pub max_expression_length: usize,
    /// Whether juxtaposition (`2x`, `(a)(b)`) parses as multiplication.
    pub implicit_multiplication: bool,
    pub parenthesis: ParenthesisMode,
    pub implicit: ImplicitMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            max_expression_length: DEFAULT_MAX_EXPRESSION_LENGTH,
            implicit_multiplication: true,
            parenthesis: ParenthesisMode::default(),
            implicit: ImplicitMode::default(),
        }
    }
}

impl EngineConfig {
    /// Printing options matching this configuration.
    pub fn format_options(&self) -> FormatOptions {
        FormatOptions::new()
            .with_parenthesis(self.parenthesis)
            .with_implicit(self.implicit)
    }

    /// A top-level evaluation frame honoring `max_call_depth`.
    pub fn frame(&self) -> Frame {
        Frame::with_max_depth(self.max_call_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        assert_eq!(config.parenthesis, ParenthesisMode::Keep);
        assert_eq!(config.frame().max_depth, DEFAULT_MAX_CALL_DEPTH);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = EngineConfig {
            parenthesis: ParenthesisMode::Auto,
            implicit: ImplicitMode::Show,
            ..EngineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"parenthesis\":\"auto\""));
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
