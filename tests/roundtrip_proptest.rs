use std::rc::Rc;

use exp_sandbox::{FormatOptions, ImplicitMode, ParenthesisMode, parse};
use proptest::prelude::*;

use test_helpers::expression_source;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_printed_tree_parses_back_equal(source in expression_source()) {
        let node = parse(&source).unwrap();
        let printed = node.to_string();
        let reparsed = parse(&printed)
            .unwrap_or_else(|e| panic!("{:?} printed as {:?}: {}", source, printed, e));
        prop_assert_eq!(&reparsed, &node, "printed as {:?}", printed);
        prop_assert_eq!(reparsed.to_string(), printed);
    }

    #[test]
    fn prop_auto_parentheses_keep_the_value_shape(source in expression_source()) {
        // Dropping source parentheses must not change how the remaining tree groups.
        let options = FormatOptions::new().with_parenthesis(ParenthesisMode::Auto);
        let node = parse(&source).unwrap();
        let printed = node.to_string_with(&options);
        let reparsed = parse(&printed).unwrap();
        prop_assert_eq!(reparsed.to_string_with(&options), printed);
    }

    #[test]
    fn prop_deep_clone_is_equal(source in expression_source()) {
        let node = parse(&source).unwrap();
        prop_assert_eq!(node.deep_clone(), node);
    }

    #[test]
    fn prop_identity_transform_is_equal(source in expression_source()) {
        let node = Rc::new(parse(&source).unwrap());
        let same = node.transform(Rc::clone);
        prop_assert_eq!(same.as_ref(), node.as_ref());
    }
}

#[test]
fn test_implicit_multiplication_round_trips() {
    for source in [
        "2x",
        "2 x y",
        "3 (x + 1)",
        "(a)(b)(c)",
        "2x^2",
        "x y z",
        "2 pi r",
        "(a)2",
        "(a + 1)2 x",
    ] {
        let node = parse(source).unwrap();
        let printed = node.to_string();
        assert_eq!(parse(&printed).unwrap(), node, "{} printed as {}", source, printed);

        let shown = node.to_string_with(&FormatOptions::new().with_implicit(ImplicitMode::Show));
        assert!(shown.contains('*'), "{} shown as {}", source, shown);
    }
}

#[test]
fn test_statements_round_trip() {
    for source in [
        "a = 1; b = a + 1\nb",
        "function f(x, y) = x ^ y",
        "v[2, end] = 3",
        "o.key = \"value\"",
        "m = [1, 2; 3, 4]",
        "r = 1:2:9",
        "q = {a: 1, \"b c\": [1, 2]}",
        "x > 0 ? x : -x",
        "c ? x = 1 : 2",
        "c ? 1 : v[2] = 3",
    ] {
        let node = parse(source).unwrap();
        let printed = node.to_string();
        assert_eq!(parse(&printed).unwrap(), node, "{} printed as {}", source, printed);
    }
}
