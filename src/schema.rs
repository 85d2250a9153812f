//! Schema descriptor normalization.
//!
//! A descriptor arrives as loose JSON. Before compilation each node is
//! classified exactly once into a [`Shape`], following a fixed precedence over
//! the keys that may be present. The compiler then matches on the shape
//! exhaustively, so rule precedence lives in one place.

use serde_json::{Map, Value};

use crate::error::PatternError;

/// Primitive type names accepted in a descriptor's `type` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    String,
    Number,
    Integer,
    Boolean,
    Null,
    Array,
    Object,
}

impl TypeName {
    pub fn parse(name: &str) -> Result<Self, PatternError> {
        match name {
            "string" => Ok(TypeName::String),
            "number" => Ok(TypeName::Number),
            "integer" => Ok(TypeName::Integer),
            "boolean" => Ok(TypeName::Boolean),
            "null" => Ok(TypeName::Null),
            "array" => Ok(TypeName::Array),
            "object" => Ok(TypeName::Object),
            other => Err(PatternError::UnsupportedType(other.to_string())),
        }
    }
}

/// A schema node after one-shot classification. Precedence (first match wins):
/// empty, `properties`, `allOf`, `anyOf`, `oneOf`, `prefixItems`, `enum`,
/// `const`, `$ref`, `type`. Boolean schemas short-circuit to match-everything
/// or match-nothing.
#[derive(Debug)]
pub enum Shape<'a> {
    Everything,
    Nothing,
    Empty,
    Properties {
        properties: &'a Map<String, Value>,
        required: Vec<&'a str>,
    },
    AllOf(&'a [Value]),
    AnyOf(&'a [Value]),
    OneOf(&'a [Value]),
    PrefixItems {
        prefix: &'a [Value],
        items: Option<&'a Value>,
    },
    Enum(&'a [Value]),
    Const(&'a Value),
    Ref(&'a str),
    Type {
        names: Vec<TypeName>,
        node: &'a Map<String, Value>,
    },
}

pub fn classify(schema: &Value) -> Result<Shape<'_>, PatternError> {
    match schema {
        Value::Bool(true) => Ok(Shape::Everything),
        Value::Bool(false) => Ok(Shape::Nothing),
        Value::Object(map) => classify_map(map),
        _ => Err(PatternError::Unrecognized),
    }
}

fn classify_map(map: &Map<String, Value>) -> Result<Shape<'_>, PatternError> {
    if map.is_empty() {
        return Ok(Shape::Empty);
    }
    if let Some(properties) = map.get("properties").and_then(Value::as_object) {
        let required = map
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        return Ok(Shape::Properties { properties, required });
    }
    if let Some(branches) = map.get("allOf").and_then(Value::as_array) {
        return Ok(Shape::AllOf(branches));
    }
    if let Some(branches) = map.get("anyOf").and_then(Value::as_array) {
        return Ok(Shape::AnyOf(branches));
    }
    if let Some(branches) = map.get("oneOf").and_then(Value::as_array) {
        return Ok(Shape::OneOf(branches));
    }
    if let Some(prefix) = map.get("prefixItems").and_then(Value::as_array) {
        let items = map.get("items").filter(|items| is_live_schema(items));
        return Ok(Shape::PrefixItems { prefix, items });
    }
    if let Some(values) = map.get("enum").and_then(Value::as_array) {
        return Ok(Shape::Enum(values));
    }
    if let Some(value) = map.get("const") {
        return Ok(Shape::Const(value));
    }
    if let Some(path) = map.get("$ref").and_then(Value::as_str) {
        return Ok(Shape::Ref(path));
    }
    if let Some(names) = map.get("type") {
        let names = match names {
            Value::String(name) => vec![TypeName::parse(name)?],
            Value::Array(list) => list
                .iter()
                .map(|name| {
                    name.as_str()
                        .ok_or(PatternError::Unrecognized)
                        .and_then(TypeName::parse)
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => return Err(PatternError::UnsupportedType(other.to_string())),
        };
        return Ok(Shape::Type { names, node: map });
    }
    Err(PatternError::Unrecognized)
}

/// `items: false` / `items: null` disable additional items rather than
/// describing them.
fn is_live_schema(value: &Value) -> bool {
    !matches!(value, Value::Bool(false) | Value::Null)
}

/// Resolve a local `$ref` against the root descriptor it appeared in.
/// References never resolve against intermediate nodes.
pub fn resolve_ref<'a>(root: &'a Value, path: &str) -> Result<&'a Value, PatternError> {
    let local = path
        .strip_prefix("#/")
        .ok_or_else(|| PatternError::ExternalRef(path.to_string()))?;

    let mut current = root;
    for part in local.split('/') {
        current = match current {
            Value::Object(map) => map
                .get(part)
                .ok_or_else(|| PatternError::InvalidRef(path.to_string()))?,
            Value::Array(items) => part
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .ok_or_else(|| PatternError::InvalidRef(path.to_string()))?,
            _ => return Err(PatternError::InvalidRef(path.to_string())),
        };
    }
    Ok(current)
}
