use stream_extract::scanner::{stringify_tokens, JsonScanner, Token, TokenKind};

fn scan_char_by_char(input: &str) -> Vec<Token> {
    let mut scanner = JsonScanner::new();
    let mut tokens = Vec::new();
    for ch in input.chars() {
        tokens.extend(scanner.feed(&ch.to_string()));
    }
    tokens.extend(scanner.end());
    tokens
}

#[test]
fn parses_embedded_object() {
    let input = "Some of the test string\n```json\n{\"name\": \"abcd\",\n\"age\": 30\n}```";
    let tokens = scan_char_by_char(input);
    assert_eq!(stringify_tokens(&tokens), r#"{"name":"abcd","age":30}"#);
}

#[test]
fn parses_nested_objects() {
    let input = "Some of the test string\n```json\n{\"name\": \"abcd\",\n\"age\": 30\n,\"address\": {\"city\": \"New York\", \"zip\": 10001}}";
    let tokens = scan_char_by_char(input);
    assert_eq!(
        stringify_tokens(&tokens),
        r#"{"name":"abcd","age":30,"address":{"city":"New York","zip":10001}}"#
    );
}

#[test]
fn forces_close_on_missing_brace() {
    let input = "Some of the test string\n```json\n{\"name\": \"abcd\",\n\"age\": 30\n```";
    let tokens = scan_char_by_char(input);
    assert_eq!(stringify_tokens(&tokens), r#"{"name":"abcd","age":30}"#);
}

#[test]
fn normalizes_mixed_quotes() {
    let input = "Some of the test string\n```json\n{\"name\": \"abcd\",\n'age': 30}";
    let tokens = scan_char_by_char(input);
    assert_eq!(stringify_tokens(&tokens), r#"{"name":"abcd","age":30}"#);
}

#[test]
fn single_quoted_string_values_become_double_quoted() {
    let tokens = scan_char_by_char("{'name': 'abcd'}");
    assert_eq!(stringify_tokens(&tokens), r#"{"name":"abcd"}"#);
}

#[test]
fn parses_array_of_primitives() {
    let input = "Some of the test string\n```json\n[1, \"abcd\", true, null]";
    let tokens = scan_char_by_char(input);
    assert_eq!(stringify_tokens(&tokens), r#"[1,"abcd",true,null]"#);
}

#[test]
fn parses_array_of_objects() {
    let input = "Some of the test string\n```json\n[{\"name\": \"abcd\",\n\"age\": 30\n}, {\"name\": \"efgh\",\n\"age\": 40\n}]";
    let tokens = scan_char_by_char(input);
    assert_eq!(
        stringify_tokens(&tokens),
        r#"[{"name":"abcd","age":30},{"name":"efgh","age":40}]"#
    );
}

#[test]
fn parses_deeply_nested_arrays() {
    let input = "Some of the test string\n```json\n[{\n\"elements\": [\n{ \"elements\": [\n{\"name\": \"abcd\"}]\n}\n]\n}]";
    let tokens = scan_char_by_char(input);
    assert_eq!(
        stringify_tokens(&tokens),
        r#"[{"elements":[{"elements":[{"name":"abcd"}]}]}]"#
    );
}

#[test]
fn forces_close_on_unterminated_array() {
    let input = "Some of the test string\n```json\n[1000,{\"name\": \"abcd\",\n\"age\": 30";
    let tokens = scan_char_by_char(input);
    assert_eq!(stringify_tokens(&tokens), r#"[1000,{"name":"abcd","age":30}]"#);
}

#[test]
fn forces_close_on_unterminated_string() {
    let tokens = scan_char_by_char("{\"msg\": \"hel");
    assert_eq!(stringify_tokens(&tokens), r#"{"msg":"hel"}"#);
}

#[test]
fn forced_closure_preserves_scanned_values() {
    let tokens = scan_char_by_char("prefix {\"a\": {\"b\": [1, 2");
    assert_eq!(stringify_tokens(&tokens), r#"{"a":{"b":[1,2]}}"#);
}

#[test]
fn stringify_is_idempotent_over_its_own_output() {
    let first = stringify_tokens(&scan_char_by_char(
        "noise {\"name\": \"abcd\", \"tags\": [1, true, null]} tail",
    ));
    let second = stringify_tokens(&scan_char_by_char(&first));
    assert_eq!(first, second);
}

#[test]
fn preserves_surrounding_text_as_tokens() {
    let tokens = scan_char_by_char("x {\"a\":1} y {\"b\":2} z");
    let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Text,
            TokenKind::Object,
            TokenKind::Text,
            TokenKind::Object,
            TokenKind::Text,
        ]
    );
    assert_eq!(tokens[0].content, "x ");
    assert_eq!(tokens[2].content, " y ");
    assert_eq!(tokens[4].content, " z");
    assert_eq!(stringify_tokens(&tokens), r#"{"a":1}{"b":2}"#);
}

#[test]
fn completed_roots_are_drained_during_feed() {
    let mut scanner = JsonScanner::new();
    let tokens = scanner.feed("pre {\"a\":1}");
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].kind, TokenKind::Text);
    assert_eq!(tokens[1].kind, TokenKind::Object);

    assert!(scanner.feed(" post").is_empty());
    let rest = scanner.end();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].content, " post");
}

#[test]
fn tokens_are_withheld_until_structure_balances() {
    let mut scanner = JsonScanner::new();
    assert!(scanner.feed("prefix {\"a\"").len() == 1); // only the leading text
    let tokens = scanner.feed(":1}");
    assert_eq!(tokens.len(), 1);
    assert_eq!(stringify_tokens(&tokens), r#"{"a":1}"#);
}

#[test]
fn unquoted_field_names_are_accepted() {
    let tokens = scan_char_by_char("{foo: 1, title: \"x\"}");
    assert_eq!(stringify_tokens(&tokens), r#"{"foo":1,"title":"x"}"#);
}

#[test]
fn tracks_positions_across_lines() {
    let tokens = scan_char_by_char("ab\n{\"x\":1}");
    assert_eq!(tokens[0].kind, TokenKind::Text);
    assert_eq!(tokens[0].pos.offset, 0);
    assert_eq!(tokens[0].pos.line, 1);
    assert_eq!(tokens[0].pos.column, 1);

    assert_eq!(tokens[1].kind, TokenKind::Object);
    assert_eq!(tokens[1].pos.offset, 3);
    assert_eq!(tokens[1].pos.line, 2);
    assert_eq!(tokens[1].pos.column, 1);
}

#[test]
fn field_tokens_hold_exactly_one_value() {
    let tokens = scan_char_by_char("{\"a\": {\"b\": 1}, \"c\": [2]}");
    let object = &tokens[0];
    for field in &object.children {
        assert_eq!(field.kind, TokenKind::Field);
        assert_eq!(field.children.len(), 1);
    }
}

#[test]
fn garbage_input_never_panics_and_is_preserved_as_text() {
    let tokens = scan_char_by_char("}}]]::,,\"'\\ nothing structured here");
    assert!(tokens.iter().all(|t| t.kind == TokenKind::Text));
    assert_eq!(stringify_tokens(&tokens), "");
}

#[test]
fn escaped_quotes_stay_inside_strings() {
    let tokens = scan_char_by_char(r#"{"a": "say \"hi\" now"}"#);
    assert_eq!(stringify_tokens(&tokens), r#"{"a":"say \"hi\" now"}"#);
}

#[test]
fn truncated_number_stringifies_to_valid_json() {
    let tokens = scan_char_by_char("{\"n\": 3.");
    let rendered = stringify_tokens(&tokens);
    assert_eq!(rendered, r#"{"n":3}"#);
    serde_json::from_str::<serde_json::Value>(&rendered).expect("forced-closed output parses");
}
