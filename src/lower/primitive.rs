//! Leaf grammars for scalar shapes.
//!
//! Number patterns follow JSON's numeric literal grammar: an optional minus,
//! no leading zeros, and at least one digit before any decimal point. String
//! constraints judge the decoded value, never its JSON escapes.

use regex::Regex;

use crate::error::{CompileError, Result, SchemaPath};
use crate::grammar::{GrammarNode, Terminal};
use crate::schema::{SchemaNode, StrConstraints};

pub const INT_PATTERN: &str = r"-?(?:0|[1-9][0-9]*)";
pub const FLOAT_PATTERN: &str = r"-?(?:0|[1-9][0-9]*)(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?";

pub fn compile_primitive(node: &SchemaNode, path: &SchemaPath) -> Result<GrammarNode> {
    match node {
        SchemaNode::Null => Ok(GrammarNode::literal("null")),
        SchemaNode::Bool => Ok(GrammarNode::alt([GrammarNode::literal("true"), GrammarNode::literal("false")])),
        SchemaNode::Int => Ok(GrammarNode::Constrained(Terminal::pattern(INT_PATTERN).min_len(1))),
        SchemaNode::Float => Ok(GrammarNode::Constrained(Terminal::pattern(FLOAT_PATTERN).min_len(1))),
        SchemaNode::Str(constraints) => string(constraints, path),
        other => Err(CompileError::unsupported(path, format!("`{}` is not a primitive", other.kind()))),
    }
}

fn string(constraints: &StrConstraints, path: &SchemaPath) -> Result<GrammarNode> {
    if let Some((kind, _)) = constraints.extra.first() {
        return Err(CompileError::conflict(
            path,
            format!("string constraint `{kind}` is not supported (only `pattern` and `max_length`)"),
        ));
    }

    let pattern = match &constraints.pattern {
        None => None,
        Some(raw) => {
            let pattern = strip_anchors(raw);
            Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| CompileError::conflict(path, format!("invalid pattern `{raw}`: {e}")))?;
            Some(pattern.to_string())
        }
    };
    let body = Terminal::json_string(pattern).max_len(constraints.max_length);

    Ok(GrammarNode::concat([
        GrammarNode::literal("\""),
        GrammarNode::Constrained(body),
        GrammarNode::literal("\""),
    ]))
}

/// The terminal always matches its whole run, so edge anchors are redundant.
pub fn strip_anchors(pattern: &str) -> &str {
    let pattern = pattern.strip_prefix('^').unwrap_or(pattern);
    match pattern.strip_suffix('$') {
        Some(rest) if !ends_with_escape(rest) => rest,
        _ => pattern,
    }
}

fn ends_with_escape(s: &str) -> bool {
    s.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn full(pattern: &str) -> Regex {
        Regex::new(&format!("^(?:{pattern})$")).unwrap()
    }

    #[test]
    fn int_pattern_is_json_integer() {
        let rx = full(INT_PATTERN);
        for ok in ["0", "7", "-10", "9876543210"] {
            assert!(rx.is_match(ok), "{ok}");
        }
        for bad in ["", "-", "+1", "01", "1.0", "1e3"] {
            assert!(!rx.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn float_pattern_requires_leading_digit() {
        let rx = full(FLOAT_PATTERN);
        for ok in ["1", "1.0", "-0.25", "3e8", "6.02E+23"] {
            assert!(rx.is_match(ok), "{ok}");
        }
        for bad in [".5", "1.", "-", "00.1", "1e"] {
            assert!(!rx.is_match(bad), "{bad}");
        }
    }

    #[test]
    fn bool_and_null() {
        let path = SchemaPath::root();
        assert_eq!(compile_primitive(&SchemaNode::Null, &path).unwrap(), GrammarNode::literal("null"));
        assert_eq!(
            compile_primitive(&SchemaNode::Bool, &path).unwrap(),
            GrammarNode::Alt(vec![GrammarNode::literal("true"), GrammarNode::literal("false")])
        );
    }

    #[test]
    fn pattern_string_is_quoted_terminal() {
        let node = compile_primitive(&SchemaNode::pattern("^[A-Z]\\d$"), &SchemaPath::root()).unwrap();
        assert_eq!(node, GrammarNode::Concat(vec![
            GrammarNode::literal("\""),
            GrammarNode::Constrained(Terminal::json_string(Some("[A-Z]\\d".into()))),
            GrammarNode::literal("\""),
        ]));
    }

    #[test]
    fn max_length_is_carried_on_the_decoded_value() {
        let node = SchemaNode::Str(StrConstraints { max_length: Some(3), ..Default::default() });
        let GrammarNode::Concat(parts) = compile_primitive(&node, &SchemaPath::root()).unwrap() else {
            panic!("expected quoted terminal")
        };
        assert_eq!(parts[1], GrammarNode::Constrained(Terminal::json_string(None).max_len(Some(3))));
    }

    #[test]
    fn unsupported_string_constraint_is_a_conflict() {
        let mut extra = IndexMap::new();
        extra.insert("minLength".to_string(), serde_json::json!(2));
        let node = SchemaNode::Str(StrConstraints { pattern: Some("a+".into()), max_length: None, extra });
        let err = compile_primitive(&node, &SchemaPath::root().field("code")).unwrap_err();
        assert!(matches!(err, CompileError::ConstraintConflict { .. }));
        assert!(err.to_string().contains("minLength"));
    }

    #[test]
    fn invalid_regex_is_a_conflict() {
        let err = compile_primitive(&SchemaNode::pattern("[unclosed"), &SchemaPath::root()).unwrap_err();
        assert!(matches!(err, CompileError::ConstraintConflict { .. }));
    }

    #[test]
    fn anchors_are_stripped_but_escaped_dollar_kept() {
        assert_eq!(strip_anchors("^abc$"), "abc");
        assert_eq!(strip_anchors(r"price\$"), r"price\$");
        assert_eq!(strip_anchors(r"a\\$"), r"a\\");
    }
}
