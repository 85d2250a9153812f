use regex::Regex;
use serde_json::json;
use stream_extract::config::PatternConfig;
use stream_extract::error::{ExtractError, PatternError};
use stream_extract::pattern::{
    build_regex_from_schema, build_regex_from_schema_str, build_regex_with_config,
    extract_by_schema, extract_typed, schema_regex_for,
};

fn distortions(payload: &str, primitive: bool) -> Vec<String> {
    let mut texts = vec![
        format!("Sure, here's the JSON: {payload}"),
        format!("The JSON object is: \n```json\n{payload}\n```"),
        format!("Here's what you asked for:\n{payload}\nIs there anything else?"),
    ];
    if !primitive {
        texts.push(format!("{{\"result\": {payload}}}"));
    }
    texts.push(format!("[{payload}]"));
    texts
}

fn invalid_distortions(payload: &str, primitive: bool) -> Vec<String> {
    let mut texts = vec![
        format!("This is invalid: {payload}"),
        format!("```json\n{payload}\n```"),
    ];
    if !primitive {
        texts.push(format!("{{\"invalid\": {payload}}}"));
    }
    texts
}

fn compiled(schema: serde_json::Value) -> Regex {
    let pattern = build_regex_from_schema(&schema, None).expect("schema compiles");
    Regex::new(&pattern).expect("pattern is a valid regex")
}

fn assert_matches(regex: &Regex, payload: &str, primitive: bool) {
    for distorted in distortions(payload, primitive) {
        let found = regex.find(&distorted);
        let found = found.unwrap_or_else(|| panic!("expected a match in {distorted:?}"));
        assert!(
            found.as_str().contains(payload),
            "match {:?} should contain {payload:?}",
            found.as_str()
        );
    }
}

fn assert_rejects(regex: &Regex, payload: &str, primitive: bool) {
    for distorted in invalid_distortions(payload, primitive) {
        assert!(
            regex.find(&distorted).is_none(),
            "expected no match in {distorted:?}"
        );
    }
}

#[test]
fn basic_object_schema() {
    let regex = compiled(json!({
        "type": "object",
        "properties": { "name": { "type": "string" }, "age": { "type": "number" } },
    }));
    assert_matches(&regex, r#"{"name":"John","age":30}"#, false);
    assert_rejects(&regex, r#"{"name":123,"age":30}"#, false);
}

#[test]
fn arrays_with_typed_items() {
    let regex = compiled(json!({ "type": "array", "items": { "type": "number" } }));
    assert_matches(&regex, "[1,2,3]", false);
    assert_rejects(&regex, r#"["abcd","abcd","abcd"]"#, false);
}

#[test]
fn string_formats() {
    let regex = compiled(json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "format": "uuid" },
            "date": { "type": "string", "format": "date-time" },
        },
        "required": ["id", "date"],
    }));
    assert_matches(
        &regex,
        r#"{"id":"123e4567-e89b-12d3-a456-426614174000","date":"2023-06-13T15:30:00Z"}"#,
        false,
    );
    assert_rejects(&regex, r#"{"id":"not-a-uuid","date":"2023-06-13"}"#, false);
}

#[test]
fn required_properties_are_honored() {
    let regex = compiled(json!({
        "type": "object",
        "properties": { "id": { "type": "number" }, "name": { "type": "string" } },
        "required": ["id"],
    }));
    assert_matches(&regex, r#"{"id":1,"name":"John"}"#, false);
    assert_rejects(&regex, r#"{"name":"John"}"#, false);
}

#[test]
fn enums_restrict_values() {
    let regex = compiled(json!({
        "type": "object",
        "properties": { "color": { "type": "string", "enum": ["red", "green", "blue"] } },
        "required": ["color"],
    }));
    assert_matches(&regex, r#"{"color":"red"}"#, false);
    assert_rejects(&regex, r#"{"color":"yellow"}"#, false);
}

#[test]
fn const_restricts_to_a_literal() {
    let regex = compiled(json!({
        "type": "object",
        "properties": { "version": { "const": 2 } },
        "required": ["version"],
    }));
    assert_matches(&regex, r#"{"version":2}"#, false);
    assert_rejects(&regex, r#"{"version":3}"#, false);
}

#[test]
fn nested_objects() {
    let regex = compiled(json!({
        "type": "object",
        "properties": {
            "person": {
                "type": "object",
                "properties": { "name": { "type": "string" }, "age": { "type": "number" } },
            },
        },
    }));
    assert_matches(&regex, r#"{"person":{"name":"John","age":30}}"#, false);
    assert_rejects(&regex, r#"{"person":{name:"John","age":30}}"#, false);
}

#[test]
fn one_of_alternates() {
    let regex = compiled(json!({
        "oneOf": [
            { "type": "object", "properties": { "value": { "type": "string" } }, "required": ["value"] },
            { "type": "object", "properties": { "value": { "type": "number" } }, "required": ["value"] },
        ],
    }));
    assert_matches(&regex, r#"{"value":"text"}"#, true);
    assert_matches(&regex, r#"{"value":1}"#, true);
    assert_rejects(&regex, "true", false);
}

#[test]
fn all_of_merges_branches() {
    let regex = compiled(json!({
        "allOf": [
            { "type": "object", "properties": { "a": { "type": "number" } }, "required": ["a"] },
            { "type": "object", "properties": { "b": { "type": "string" } }, "required": ["b"] },
        ],
    }));
    assert_matches(&regex, r#"{"a":1,"b":"text"}"#, false);
    for invalid in [r#"{"a":1}"#, r#"{"b":"text"}"#, r#"{"a":"1","b":"text"}"#] {
        assert_rejects(&regex, invalid, false);
    }
}

#[test]
fn any_of_covers_branch_combinations() {
    let regex = compiled(json!({
        "anyOf": [
            { "type": "object", "properties": { "a": { "type": "number" } }, "required": ["a"] },
            { "type": "object", "properties": { "b": { "type": "string" } }, "required": ["b"] },
        ],
    }));
    for valid in [r#"{"a":1}"#, r#"{"b":"text"}"#, r#"{"a":1,"b":"text"}"#] {
        assert_matches(&regex, valid, false);
    }
    for invalid in [r#"{"a":"1"}"#, r#"{"b":2}"#, "{}"] {
        assert_rejects(&regex, invalid, false);
    }
}

#[test]
fn prefix_items_form_tuples() {
    let regex = compiled(json!({
        "prefixItems": [{ "type": "string" }, { "type": "number" }],
    }));
    assert!(regex.find(r#"ok ["a",1] done"#).is_some());
    assert!(regex.find(r#"ok ["a","b"] done"#).is_none());

    let with_rest = compiled(json!({
        "prefixItems": [{ "type": "string" }],
        "items": { "type": "number" },
    }));
    assert!(with_rest.find(r#"["a",1,2,3]"#).is_some());
    assert!(with_rest.find(r#"["a"]"#).is_some());
}

#[test]
fn refs_resolve_against_the_root() {
    let regex = compiled(json!({
        "definitions": {
            "point": {
                "type": "object",
                "properties": { "x": { "type": "number" }, "y": { "type": "number" } },
                "required": ["x", "y"],
            },
        },
        "type": "object",
        "properties": { "origin": { "$ref": "#/definitions/point" } },
        "required": ["origin"],
    }));
    assert_matches(&regex, r#"{"origin":{"x":1,"y":2}}"#, false);
    assert_rejects(&regex, r#"{"origin":{"x":1}}"#, false);
}

#[test]
fn integer_digit_bounds() {
    let schema = json!({ "type": "integer", "minDigits": "2", "maxDigits": "3" });
    let pattern = build_regex_from_schema(&schema, None).unwrap();
    let anchored = Regex::new(&format!("^(?:{pattern})$")).unwrap();
    assert!(anchored.is_match("42"));
    assert!(anchored.is_match("999"));
    assert!(!anchored.is_match("5"));
    assert!(!anchored.is_match("1234"));
}

#[test]
fn string_length_bounds() {
    let schema = json!({ "type": "string", "minLength": 2, "maxLength": 4 });
    let pattern = build_regex_from_schema(&schema, None).unwrap();
    let anchored = Regex::new(&format!("^(?:{pattern})$")).unwrap();
    assert!(anchored.is_match(r#""ab""#));
    assert!(anchored.is_match(r#""abcd""#));
    assert!(!anchored.is_match(r#""a""#));
    assert!(!anchored.is_match(r#""abcde""#));
}

#[test]
fn explicit_string_patterns_are_embedded() {
    let schema = json!({ "type": "string", "pattern": "^[a-z]{3}$" });
    let pattern = build_regex_from_schema(&schema, None).unwrap();
    let anchored = Regex::new(&format!("^(?:{pattern})$")).unwrap();
    assert!(anchored.is_match(r#""abc""#));
    assert!(!anchored.is_match(r#""ABC""#));
}

#[test]
fn type_lists_exclude_objects() {
    let regex = compiled(json!({ "type": ["string", "null"] }));
    assert!(regex.find(r#"value: "hi""#).is_some());
    assert!(regex.find("value: null").is_some());
}

#[test]
fn empty_schema_matches_any_value_shape() {
    let regex = compiled(json!({}));
    for text in ["it is true", "answer: 42", r#"say "hi""#, "data: [1,2]", r#"obj {"a":1}"#] {
        assert!(regex.find(text).is_some(), "expected a match in {text:?}");
    }
}

#[test]
fn extraction_returns_the_trimmed_first_match() {
    let schema = json!({
        "type": "object",
        "properties": { "name": { "type": "string" }, "age": { "type": "number" } },
    });
    let extracted = extract_by_schema(
        &schema,
        r#"Sure, here is the JSON: {"name":"John","age":30}"#,
    )
    .unwrap();
    assert_eq!(extracted, r#"{"name":"John","age":30}"#);
}

#[test]
fn extraction_fails_loudly_without_a_match() {
    let schema = json!({
        "type": "object",
        "properties": { "name": { "type": "string" }, "age": { "type": "number" } },
    });
    let result = extract_by_schema(&schema, r#"This is invalid: {"name":123,"age":30}"#);
    assert!(matches!(result, Err(ExtractError::NoMatch)));
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema, PartialEq)]
struct Person {
    name: String,
    age: u32,
}

#[test]
fn typed_extraction_parses_the_match() {
    let schema = json!({
        "type": "object",
        "properties": { "name": { "type": "string" }, "age": { "type": "number" } },
        "required": ["name", "age"],
    });
    let person: Person = extract_typed(
        &schema,
        r#"Here's what you asked for:
{"name":"John","age":30}
Is there anything else?"#,
    )
    .unwrap();
    assert_eq!(person, Person { name: "John".to_string(), age: 30 });
}

#[test]
fn derived_schemas_compile_to_patterns() {
    let pattern = schema_regex_for::<Person>().unwrap();
    let regex = Regex::new(&pattern).unwrap();
    let found = regex
        .find(r#"The JSON object is: {"name":"John","age":30}"#)
        .expect("derived pattern matches");
    assert!(found.as_str().contains(r#"{"name":"John","age":30}"#));
}

#[test]
fn schema_strings_are_accepted() {
    let pattern =
        build_regex_from_schema_str(r#"{"type":"object","properties":{"a":{"type":"number"}}}"#, None)
            .unwrap();
    assert!(Regex::new(&pattern).unwrap().find(r#"{"a":1}"#).is_some());
}

#[test]
fn whitespace_pattern_is_overridable() {
    let schema = json!({
        "type": "object",
        "properties": { "a": { "type": "number" } },
        "required": ["a"],
    });
    let pattern = build_regex_from_schema(&schema, Some(" ?")).unwrap();
    assert!(pattern.contains(" ?"));
    let regex = Regex::new(&pattern).unwrap();
    assert!(regex.find(r#"{"a": 1}"#).is_some());
}

#[test]
fn unsupported_type_is_a_compile_error() {
    let result = build_regex_from_schema(&json!({ "type": "money" }), None);
    assert!(matches!(result, Err(PatternError::UnsupportedType(t)) if t == "money"));
}

#[test]
fn unsupported_format_is_a_compile_error() {
    let result = build_regex_from_schema(&json!({ "type": "string", "format": "email" }), None);
    assert!(matches!(result, Err(PatternError::UnsupportedFormat(f)) if f == "email"));
}

#[test]
fn non_primitive_enum_entries_are_rejected() {
    let result = build_regex_from_schema(&json!({ "enum": [[1, 2]] }), None);
    assert!(matches!(result, Err(PatternError::NonPrimitiveEnum(_))));
}

#[test]
fn external_refs_are_rejected() {
    let result =
        build_regex_from_schema(&json!({ "$ref": "https://example.com/schema.json" }), None);
    assert!(matches!(result, Err(PatternError::ExternalRef(_))));
}

#[test]
fn recursive_refs_are_a_clean_error() {
    let schema = json!({
        "definitions": {
            "node": {
                "type": "object",
                "properties": { "next": { "$ref": "#/definitions/node" } },
            },
        },
        "$ref": "#/definitions/node",
    });
    let result = build_regex_from_schema(&schema, None);
    assert!(matches!(result, Err(PatternError::RecursiveRef(_))));
}

#[test]
fn zero_item_arrays_are_unsatisfiable() {
    let result = build_regex_from_schema(
        &json!({ "type": "array", "items": { "type": "number" }, "maxItems": 0 }),
        None,
    );
    assert!(matches!(result, Err(PatternError::UnsatisfiableItems)));
}

#[test]
fn inverted_bounds_are_rejected() {
    let result = build_regex_from_schema(
        &json!({ "type": "string", "minLength": 5, "maxLength": 2 }),
        None,
    );
    assert!(matches!(result, Err(PatternError::InvertedBounds)));
}

#[test]
fn optional_property_width_can_be_capped() {
    let schema = json!({
        "type": "object",
        "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
    });
    let config = PatternConfig { max_optional_properties: Some(1), ..PatternConfig::default() };
    let result = build_regex_with_config(&schema, &config);
    assert!(matches!(
        result,
        Err(PatternError::TooManyOptionalProperties { count: 2, cap: 1 })
    ));

    // Unset, the permutation alternation is preserved.
    assert!(build_regex_from_schema(&schema, None).is_ok());
}
