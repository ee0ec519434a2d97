//! Acceptance behavior of compiled grammars, checked through the reference
//! matcher.

use schema_grammar::{
    compile, CompileError, Field, GrammarMatcher, MatchStatus, ReferenceMatcher, Schema, SchemaNode,
    StrConstraints,
};
use serde_json::json;

fn status(schema: &Schema, text: &str) -> MatchStatus {
    let grammar = compile(schema).unwrap();
    let matcher = ReferenceMatcher::new(&grammar).unwrap();
    matcher.match_prefix(text)
}

#[track_caller]
fn assert_accepts(schema: &Schema, texts: &[&str]) {
    for text in texts {
        assert_eq!(status(schema, text), MatchStatus::Complete, "should accept {text}");
    }
}

#[track_caller]
fn assert_rejects(schema: &Schema, texts: &[&str]) {
    for text in texts {
        assert_ne!(status(schema, text), MatchStatus::Complete, "should reject {text}");
    }
}

#[test]
fn list_boundaries() {
    let schema = SchemaNode::list(SchemaNode::Int).into();
    assert_accepts(&schema, &["[]", "[1,2,3]", "[-4]"]);
    assert_rejects(&schema, &["[1,2,]", "[1 2]", "[,]", "[", "[01]"]);
    assert_eq!(status(&schema, "[1,2,"), MatchStatus::Partial);
    assert_eq!(status(&schema, "[1 "), MatchStatus::Reject);
}

#[test]
fn min_and_max_items() {
    let schema = SchemaNode::bounded_list(SchemaNode::Bool, 1, Some(3)).into();
    assert_accepts(&schema, &["[true]", "[true,false]", "[false,false,true]"]);
    assert_rejects(&schema, &["[]", "[true,true,true,true]"]);

    let at_least_two = SchemaNode::bounded_list(SchemaNode::Null, 2, None).into();
    assert_accepts(&at_least_two, &["[null,null]", "[null,null,null,null]"]);
    assert_rejects(&at_least_two, &["[]", "[null]"]);
}

#[test]
fn union_accepts_exactly_its_variants() {
    let schema = SchemaNode::union(vec![SchemaNode::Int, SchemaNode::Bool]).into();
    assert_accepts(&schema, &["3", "true", "false"]);
    assert_rejects(&schema, &["3.5", "\"x\"", "null"]);
}

#[test]
fn overlapping_union_variants() {
    let schema = SchemaNode::union(vec![SchemaNode::Int, SchemaNode::Float]).into();
    assert_accepts(&schema, &["3", "3.25", "-1e9"]);
    assert_rejects(&schema, &[".5", "1."]);
}

#[test]
fn record_fields_in_declared_order() {
    let schema = SchemaNode::record(vec![
        Field::required("name", SchemaNode::str()),
        Field::required("age", SchemaNode::Int),
    ])
    .into();
    assert_accepts(&schema, &[r#"{"name":"Rex","age":3}"#]);
    assert_rejects(&schema, &[r#"{"age":3,"name":"Rex"}"#, r#"{"name":"Rex"}"#, r#"{"name": "Rex","age":3}"#]);
}

#[test]
fn optional_fields_may_be_omitted_anywhere() {
    let schema = SchemaNode::record(vec![
        Field::optional("a", SchemaNode::Int),
        Field::required("b", SchemaNode::Int),
        Field::optional("c", SchemaNode::Int),
    ])
    .into();
    assert_accepts(&schema, &[r#"{"b":1}"#, r#"{"a":1,"b":2}"#, r#"{"b":1,"c":2}"#, r#"{"a":1,"b":2,"c":3}"#]);
    assert_rejects(&schema, &["{}", r#"{"a":1}"#, r#"{,"b":1}"#, r#"{"b":1,}"#, r#"{"c":1,"b":2}"#]);
}

#[test]
fn all_optional_record() {
    let schema = SchemaNode::record(vec![
        Field::optional("x", SchemaNode::Int),
        Field::optional("y", SchemaNode::Int),
        Field::optional("z", SchemaNode::Int),
    ])
    .into();
    assert_accepts(&schema, &["{}", r#"{"y":2}"#, r#"{"x":1,"z":3}"#, r#"{"x":1,"y":2,"z":3}"#]);
    assert_rejects(&schema, &["{,}", r#"{,"y":2}"#, r#"{"x":1,}"#]);
}

#[test]
fn nullable_fields() {
    let schema = SchemaNode::record(vec![Field::required("n", SchemaNode::nullable(SchemaNode::Int))]).into();
    assert_accepts(&schema, &[r#"{"n":null}"#, r#"{"n":5}"#]);
    assert_rejects(&schema, &[r#"{}"#, r#"{"n":"5"}"#]);
}

#[test]
fn regex_constrained_string() {
    let schema = SchemaNode::pattern("[A-Z]\\d").into();
    assert_accepts(&schema, &["\"A1\""]);
    assert_rejects(&schema, &["\"a1\"", "\"AB\"", "\"A12\"", "A1"]);
}

#[test]
fn free_strings_follow_json_escaping() {
    let schema = SchemaNode::str().into();
    assert_accepts(&schema, &[r#""""#, r#""plain""#, r#""say \"hi\"""#, r#""a\\b""#, r#""é""#, "\"näïve\""]);
    assert_rejects(&schema, &[r#""bad \q""#, "\"line\nbreak\"", r#""unterminated"#]);
}

#[test]
fn string_constraints_judge_the_decoded_value() {
    let short: Schema = SchemaNode::Str(StrConstraints { max_length: Some(3), ..Default::default() }).into();
    assert_accepts(&short, &[r#""a\"b""#, r#""ab\n""#, r#""\u00e9t\u00e9""#]);
    assert_rejects(&short, &[r#""abcd""#, r#""ab\n\n""#]);

    let one_char = SchemaNode::pattern(".").into();
    assert_accepts(&one_char, &[r#""\"""#, r#""\\""#, r#""\u0041""#]);
    assert_rejects(&one_char, &[r#""\\n""#, r#""""#]);

    let anything = SchemaNode::pattern(".*").into();
    assert_accepts(&anything, &[r#""a\/b""#]);
    assert_rejects(&anything, &[r#""a\qb""#, "\"a\u{1}b\"", "\"x\"y\""]);
}

#[test]
fn recursive_schema_matches_nested_values() {
    let schema = Schema::new(SchemaNode::reference("Node")).with_def(
        "Node",
        SchemaNode::record(vec![Field::required("children", SchemaNode::list(SchemaNode::reference("Node")))]),
    );
    let grammar = compile(&schema).unwrap();
    assert_eq!(grammar.rules().len(), 2);

    let matcher = ReferenceMatcher::new(&grammar).unwrap();
    assert_eq!(matcher.match_prefix(r#"{"children":[{"children":[]}]}"#), MatchStatus::Complete);
    assert_eq!(matcher.match_prefix(r#"{"children":[{"children":[]},{"children":[]}]}"#), MatchStatus::Complete);
    assert_eq!(matcher.match_prefix(r#"{"children":[{}]}"#), MatchStatus::Reject);

    let mut deep = String::new();
    for _ in 0..40 {
        deep.push_str(r#"{"children":["#);
    }
    deep.push_str(&"]}".repeat(40));
    assert_eq!(matcher.match_prefix(&deep), MatchStatus::Complete);
}

#[test]
fn mutually_recursive_definitions() {
    let schema = Schema::new(SchemaNode::reference("Expr"))
        .with_def("Expr", SchemaNode::union(vec![SchemaNode::Int, SchemaNode::reference("Sum")]))
        .with_def(
            "Sum",
            SchemaNode::record(vec![
                Field::required("lhs", SchemaNode::reference("Expr")),
                Field::required("rhs", SchemaNode::reference("Expr")),
            ]),
        );
    assert_accepts(&schema, &["1", r#"{"lhs":1,"rhs":{"lhs":2,"rhs":3}}"#]);
    assert_rejects(&schema, &[r#"{"lhs":1}"#]);
}

#[test]
fn json_schema_front_end() {
    let doc = json!({
        "type": "object",
        "properties": {
            "id": {"type": "integer"},
            "tags": {"type": "array", "items": {"$ref": "#/$defs/Tag"}, "maxItems": 2},
            "note": {"type": ["string", "null"]}
        },
        "required": ["id"],
        "$defs": {"Tag": {"type": "string", "pattern": "^[a-z]+$"}}
    });
    let schema = Schema::from_json_schema(&doc).unwrap();
    assert_accepts(&schema, &[r#"{"id":1}"#, r#"{"id":1,"tags":["a","bc"],"note":null}"#, r#"{"id":1,"note":"x"}"#]);
    assert_rejects(&schema, &[r#"{"id":1,"tags":["a","b","c"]}"#, r#"{"id":1,"tags":["A"]}"#]);
}

#[test]
fn front_end_rejects_constraints_it_would_drop() {
    let docs = [
        json!({"anyOf": [{"type": "string"}, {"type": "null"}], "maxLength": 2}),
        json!({"anyOf": [{"type": "integer"}], "minimum": 10}),
        json!({
            "type": "object",
            "properties": {"s": {"$ref": "#/$defs/S", "maxLength": 2}},
            "$defs": {"S": {"type": "string"}}
        }),
    ];
    for doc in docs {
        let err = Schema::from_json_schema(&doc).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedType { .. }), "{doc}: {err}");
    }
}

#[test]
fn shared_refs_keep_grammar_linear() {
    let mut schema = Schema::new(SchemaNode::reference("D0")).with_def("D18", SchemaNode::str());
    for i in 0..18 {
        let next = format!("D{}", i + 1);
        schema = schema.with_def(
            format!("D{i}"),
            SchemaNode::record(vec![
                Field::required("a", SchemaNode::reference(next.as_str())),
                Field::required("b", SchemaNode::reference(next.as_str())),
            ]),
        );
    }
    let grammar = compile(&schema).unwrap();
    assert!(grammar.size() < 1000, "size {}", grammar.size());

    let mut text = String::from("\"x\"");
    for _ in 0..18 {
        text = format!(r#"{{"a":{text},"b":{text}}}"#);
    }
    let matcher = ReferenceMatcher::new(&grammar).unwrap();
    assert_eq!(matcher.match_prefix(&text[..200]), MatchStatus::Partial);
}

#[test]
fn errors_fail_closed_with_paths() {
    let missing = Schema::new(SchemaNode::list(SchemaNode::reference("Gone")));
    let err = compile(&missing).unwrap_err();
    assert!(matches!(err, CompileError::RefResolution { .. }));
    assert_eq!(err.path().to_string(), "$[*]");

    let looping = Schema::new(SchemaNode::reference("A")).with_def("A", SchemaNode::reference("A"));
    assert!(matches!(compile(&looping).unwrap_err(), CompileError::CyclicSchema { .. }));
}
