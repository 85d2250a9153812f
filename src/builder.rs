//! Streaming value builder.
//!
//! Sits on top of [`JsonScanner`](crate::scanner::JsonScanner) and maintains a
//! live `serde_json::Value` mirroring the token tree, emitting one
//! path-addressed [`Delta`] per change in document order. String values are
//! emitted one character at a time so a long text field can be rendered as it
//! "types"; other scalars emit a single delta on completion. At `end()` the
//! final value is checked against the caller's schema — a failure is reported
//! as `None`, never panicked, and deltas already emitted stand.

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::error::PatternError;
use crate::pattern::build_regex_from_schema;
use crate::scanner::{JsonScanner, Token, TokenKind};

/// An incremental, path-addressed change notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delta {
    pub path: Vec<String>,
    pub value: Value,
    pub previous_value: Option<Value>,
}

/// Collaborator seam for final validation. Implementations return the list of
/// violations on failure.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<(), Vec<String>>;
}

/// Default validator: the compiled matching pattern, anchored over the value's
/// canonical serialization.
pub struct PatternValidator {
    regex: Regex,
}

impl PatternValidator {
    pub fn new(schema: &Value) -> Result<Self, PatternError> {
        let pattern = build_regex_from_schema(schema, None)?;
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self { regex })
    }
}

impl SchemaValidator for PatternValidator {
    fn validate(&self, value: &Value) -> Result<(), Vec<String>> {
        let canonical = value.to_string();
        if self.regex.is_match(&canonical) {
            Ok(())
        } else {
            Err(vec![format!("value does not match the schema pattern: {canonical}")])
        }
    }
}

/// Builds a live value from a stream of text chunks, emitting deltas through
/// the callback as the value grows. One instance per logical stream.
pub struct StreamingValueBuilder<F: FnMut(Delta)> {
    scanner: JsonScanner,
    snapshot: Value,
    validator: Box<dyn SchemaValidator>,
    callback: F,
}

impl<F: FnMut(Delta)> StreamingValueBuilder<F> {
    /// Compile `schema` into the default pattern-backed validator.
    pub fn new(schema: &Value, callback: F) -> Result<Self, PatternError> {
        Ok(Self::with_validator(Box::new(PatternValidator::new(schema)?), callback))
    }

    pub fn with_validator(validator: Box<dyn SchemaValidator>, callback: F) -> Self {
        Self {
            scanner: JsonScanner::new(),
            snapshot: Value::Object(Map::new()),
            validator,
            callback,
        }
    }

    /// Advance the scanner; every token that completes is walked into the
    /// snapshot, firing deltas in document order.
    #[instrument(target = "stream_extract::builder", skip(self, chunk), fields(chunk_len = chunk.len()))]
    pub fn feed(&mut self, chunk: &str) {
        let tokens = self.scanner.feed(chunk);
        let mut path = Vec::new();
        for token in &tokens {
            self.process_token(token, &mut path);
        }
    }

    /// Force closure, run final validation, and return the value — or `None`
    /// when it does not conform. The partial value stays inspectable via
    /// [`value`](Self::value).
    pub fn end(&mut self) -> Option<Value> {
        let tokens = self.scanner.end();
        let mut path = Vec::new();
        for token in &tokens {
            self.process_token(token, &mut path);
        }

        match self.validator.validate(&self.snapshot) {
            Ok(()) => Some(self.snapshot.clone()),
            Err(errors) => {
                debug!(
                    target = "stream_extract::builder",
                    ?errors,
                    "validation failed at end of stream"
                );
                None
            }
        }
    }

    /// The value built so far.
    pub fn value(&self) -> &Value {
        &self.snapshot
    }

    fn process_token(&mut self, token: &Token, path: &mut Vec<String>) {
        match token.kind {
            TokenKind::Text => {}
            TokenKind::Object | TokenKind::Array => {
                if path.is_empty() {
                    // The first root decides the top-level shape.
                    if token.kind == TokenKind::Array && is_empty_object(&self.snapshot) {
                        self.snapshot = Value::Array(Vec::new());
                    }
                } else {
                    let empty = match token.kind {
                        TokenKind::Object => Value::Object(Map::new()),
                        _ => Value::Array(Vec::new()),
                    };
                    self.update_value(path, empty);
                }
                match token.kind {
                    TokenKind::Object => {
                        for child in &token.children {
                            if child.kind == TokenKind::Field {
                                self.process_token(child, path);
                            }
                        }
                    }
                    _ => {
                        for (index, child) in token.children.iter().enumerate() {
                            path.push(index.to_string());
                            self.process_token(child, path);
                            path.pop();
                        }
                    }
                }
            }
            TokenKind::Field => {
                path.push(token.content.clone());
                if let Some(value) = token.children.first() {
                    self.process_token(value, path);
                }
                path.pop();
            }
            TokenKind::String => {
                if path.is_empty() {
                    return;
                }
                let content = unquote(&token.content);
                let mut partial = String::with_capacity(content.len());
                for ch in content.chars() {
                    partial.push(ch);
                    self.update_value(path, Value::String(partial.clone()));
                }
            }
            TokenKind::Number | TokenKind::Boolean | TokenKind::Null => {
                if path.is_empty() {
                    return;
                }
                let value = match token.kind {
                    TokenKind::Number => parse_number(&token.content),
                    TokenKind::Boolean => Value::Bool(token.content == "true"),
                    _ => Value::Null,
                };
                self.update_value(path, value);
            }
        }
    }

    fn update_value(&mut self, path: &[String], value: Value) {
        let previous_value = set_at_path(&mut self.snapshot, path, value.clone());
        (self.callback)(Delta { path: path.to_vec(), value, previous_value });
    }
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

fn unquote(content: &str) -> &str {
    let content = content.strip_prefix('"').unwrap_or(content);
    content.strip_suffix('"').unwrap_or(content)
}

fn parse_number(content: &str) -> Value {
    if let Ok(int) = content.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Ok(int) = content.parse::<u64>() {
        return Value::Number(int.into());
    }
    content
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Write `value` at `path`, creating intermediate containers as needed, and
/// return the value previously at that slot.
fn set_at_path(root: &mut Value, path: &[String], value: Value) -> Option<Value> {
    let (last, parents) = match path.split_last() {
        Some(split) => split,
        None => return None,
    };

    let mut current = root;
    for key in parents {
        current = descend(current, key);
    }
    if !current.is_object() && !current.is_array() {
        *current = Value::Object(Map::new());
    }

    match current {
        Value::Object(map) => map.insert(last.clone(), value),
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) => {
                while items.len() < index {
                    items.push(Value::Null);
                }
                if index < items.len() {
                    Some(std::mem::replace(&mut items[index], value))
                } else {
                    items.push(value);
                    None
                }
            }
            // Non-numeric key into an array slot: nowhere to put it.
            Err(_) => None,
        },
        _ => None,
    }
}

fn descend<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    if !value.is_object() && !value.is_array() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map.entry(key.to_string()).or_insert(Value::Null),
        Value::Array(items) => {
            let index = key.parse::<usize>().unwrap_or(items.len());
            while items.len() <= index {
                items.push(Value::Null);
            }
            &mut items[index]
        }
        _ => unreachable!("containers only after normalization"),
    }
}
