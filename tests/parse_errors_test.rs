use exp_sandbox::error::ExprError;
use exp_sandbox::{EngineConfig, parse, parse_with_config};
use proptest::prelude::*;

use test_helpers::{expression_source, syntax_error};

#[test]
fn test_messages_and_positions() {
    let cases: &[(&str, &str, usize)] = &[
        ("(x*/2)", "Value expected", 4),
        ("(1 + 2", "Parenthesis ) expected", 7),
        ("2 +", "Unexpected end of expression", 4),
        ("1 + 2)", "Unexpected operator )", 6),
        ("[1, 2", "End of matrix ] expected", 6),
        ("a[1", "Parenthesis ] expected", 4),
        ("\"abc", "End of string \" missing", 1),
        ("a.", "Property name expected after dot", 3),
        ("{a: 1", "Comma , or bracket } expected after object value", 6),
        ("{1: 2}", "Symbol or string expected as object key", 2),
        ("{a 1}", "Colon : expected after object key", 4),
        ("1 = 2", "Invalid left hand side of assignment operator =", 3),
        ("x ? 1", "False part of conditional expression expected", 6),
        ("function (x) = x", "Function name expected", 10),
        ("function f x = x", "Parenthesis ( expected", 12),
        ("function f(1) = x", "Parameter name expected", 12),
        ("function f(x) x", "Assignment operator = expected", 15),
    ];
    for (source, message, position) in cases {
        assert_eq!(
            syntax_error(source),
            (message.to_string(), *position),
            "source {:?}",
            source
        );
    }
}

#[test]
fn test_duplicate_parameter_names_are_rejected() {
    let (message, _) = syntax_error("function f(x, x) = x");
    assert_eq!(message, "Duplicate parameter x");
}

#[test]
fn test_unknown_character() {
    let (message, position) = syntax_error("1 + $");
    assert_eq!(message, "Syntax error in part \"$\"");
    assert_eq!(position, 5);
}

#[test]
fn test_error_display_includes_position() {
    let err = parse("(x*/2)").unwrap_err();
    assert!(err.is_syntax());
    assert_eq!(err.to_string(), "Syntax error: Value expected (char 4)");
}

#[test]
fn test_limits_are_not_syntax_errors() {
    let config = EngineConfig {
        max_expression_length: 16,
        max_nesting_depth: 8,
        ..EngineConfig::default()
    };
    assert!(matches!(
        parse_with_config("1 + 2 + 3 + 4 + 5 + 6", &config),
        Err(ExprError::CapacityExceeded(_))
    ));
    assert!(matches!(
        parse_with_config("((((((((((1))))))))))", &config),
        Err(ExprError::CapacityExceeded(_))
    ));
    assert!(matches!(
        parse_with_config("(((((((((1)))))))))", &EngineConfig {
            max_nesting_depth: 8,
            ..EngineConfig::default()
        }),
        Err(ExprError::RecursionLimit(_))
    ));
    assert!(matches!(
        parse_with_config("2^2^2^2^2^2^2^2^2^2", &EngineConfig {
            max_nesting_depth: 8,
            ..EngineConfig::default()
        }),
        Err(ExprError::RecursionLimit(_))
    ));
}

#[test]
fn test_empty_input_is_an_empty_block() {
    assert_eq!(parse("").unwrap().to_string(), "");
    assert_eq!(parse("  \n ").unwrap().type_name(), "BlockNode");
}

proptest! {
    #[test]
    fn prop_unclosed_brackets_always_fail(source in expression_source()) {
        for opened in [format!("({}", source), format!("[{}", source), format!("f({}", source)] {
            prop_assert!(
                matches!(parse(&opened), Err(ExprError::Syntax { .. })),
                "{:?} should not parse",
                opened
            );
        }
        let unquoted = format!("{} + \"{}", source, "tail");
        prop_assert!(parse(&unquoted).unwrap_err().is_syntax());
    }

    #[test]
    fn prop_stray_closer_fails_at_its_position(source in expression_source()) {
        let closed = format!("{} )", source);
        let (message, position) = syntax_error(&closed);
        prop_assert_eq!(message, "Unexpected operator )");
        prop_assert_eq!(position, closed.chars().count());
    }
}
