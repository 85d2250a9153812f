//! Schema-to-pattern compiler.
//!
//! Translates a JSON-Schema-like descriptor into a regular expression that
//! matches the canonical serialization of any conforming value — as a
//! substring, so the payload can be fished out of surrounding prose. The
//! pattern both validates (type mismatches, missing required properties,
//! enum/const mismatches, wrong array lengths fail to match) and locates.
//!
//! Quick start:
//! - `extract_typed::<T>(&schema, text)` — find and parse the first conforming payload
//! - `extract_by_schema(&schema, text)` — find it as raw text
//! - `build_regex_from_schema(&schema, None)` — just the pattern, reusable across calls
//! - `schema_regex_for::<T>()` — pattern for a Rust type's derived schema
//!
//! Recursive (`$ref`-cyclic) descriptors are rejected at compile time.

use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::config::PatternConfig;
use crate::error::{ExtractError, PatternError};
use crate::schema::{classify, resolve_ref, Shape, TypeName};

pub const STRING_INNER: &str = r#"([^"\\\x00-\x1F\x7F-\x9F]|\\["\\])"#;
pub const STRING: &str = r#""([^"\\\x00-\x1F\x7F-\x9F]|\\["\\])*""#;
pub const INTEGER: &str = r"(-)?(0|[1-9][0-9]*)";
pub const NUMBER: &str = r"(-)?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?";
pub const BOOLEAN: &str = "(true|false)";
pub const NULL: &str = "null";
pub const WHITESPACE: &str = r"\s*";

const DATE_TIME: &str = r#""(-?(?:[1-9][0-9]*)?[0-9]{4})-(1[0-2]|0[1-9])-(3[01]|0[1-9]|[12][0-9])T(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])(\.[0-9]{3})?(Z)?""#;
const DATE: &str = r#""(?:\d{4})-(?:0[1-9]|1[0-2])-(?:0[1-9]|[1-2][0-9]|3[0-1])""#;
const TIME: &str = r#""(2[0-3]|[01][0-9]):([0-5][0-9]):([0-5][0-9])(\.[0-9]+)?(Z)?""#;
const UUID: &str = r#""[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}""#;

/// Compile a schema descriptor into a matching pattern. The pattern is
/// wrapped in leading/trailing whitespace tolerance; `whitespace` overrides
/// the separator pattern used *inside* the structure (default `\s*`).
pub fn build_regex_from_schema(
    schema: &Value,
    whitespace: Option<&str>,
) -> Result<String, PatternError> {
    let mut config = PatternConfig::default();
    if let Some(ws) = whitespace {
        config.whitespace = ws.to_string();
    }
    build_regex_with_config(schema, &config)
}

/// As [`build_regex_from_schema`], but takes the schema as JSON text.
pub fn build_regex_from_schema_str(
    schema: &str,
    whitespace: Option<&str>,
) -> Result<String, PatternError> {
    let parsed: Value = serde_json::from_str(schema).map_err(PatternError::SchemaJson)?;
    build_regex_from_schema(&parsed, whitespace)
}

/// Compile with explicit [`PatternConfig`] tunables.
#[instrument(target = "stream_extract::pattern", skip(schema, config))]
pub fn build_regex_with_config(
    schema: &Value,
    config: &PatternConfig,
) -> Result<String, PatternError> {
    let mut compiler = Compiler { root: schema, ws: &config.whitespace, config, ref_stack: Vec::new() };
    let inner = compiler.to_regex(schema, config.default_depth)?;
    Ok(format!("{WHITESPACE}{inner}{WHITESPACE}"))
}

/// Compile the pattern for a Rust type's derived JSON schema.
pub fn schema_regex_for<T: JsonSchema>() -> Result<String, PatternError> {
    let schema = schemars::schema_for!(T);
    let value = serde_json::to_value(&schema).map_err(PatternError::SchemaJson)?;
    build_regex_from_schema(&value, None)
}

/// Extract the first substring of `text` conforming to `schema`, trimmed.
/// Fails with [`ExtractError::NoMatch`] when no conforming payload exists.
#[instrument(target = "stream_extract::pattern", skip(schema, text), fields(text_len = text.len()))]
pub fn extract_by_schema(schema: &Value, text: &str) -> Result<String, ExtractError> {
    let pattern = build_regex_from_schema(schema, None)?;
    let regex = Regex::new(&pattern).map_err(|e| ExtractError::Pattern(PatternError::Regex(e)))?;
    let found = regex.find(text).ok_or(ExtractError::NoMatch)?;
    Ok(found.as_str().trim().to_string())
}

/// As [`extract_by_schema`], additionally parsing the match as JSON into `T`.
pub fn extract_typed<T: DeserializeOwned>(schema: &Value, text: &str) -> Result<T, ExtractError> {
    let extracted = extract_by_schema(schema, text)?;
    serde_json::from_str(&extracted).map_err(|e| ExtractError::Deserialization(e, extracted.clone()))
}

struct Compiler<'a> {
    root: &'a Value,
    ws: &'a str,
    config: &'a PatternConfig,
    /// Reference paths currently being resolved; a repeat is a cycle.
    ref_stack: Vec<String>,
}

impl Compiler<'_> {
    fn to_regex(&mut self, schema: &Value, depth: u32) -> Result<String, PatternError> {
        match classify(schema)? {
            Shape::Everything => Ok(".*".to_string()),
            Shape::Nothing => Ok("a^".to_string()),
            Shape::Empty => self.empty_schema(depth),
            Shape::Properties { properties, required } => self.properties(properties, &required),
            Shape::AllOf(branches) => self.all_of(branches),
            Shape::AnyOf(branches) => self.any_of(branches, depth),
            Shape::OneOf(branches) => self.one_of(branches, depth),
            Shape::PrefixItems { prefix, items } => self.prefix_items(prefix, items, depth),
            Shape::Enum(values) => enum_pattern(values),
            Shape::Const(value) => literal_pattern(value)
                .ok_or_else(|| PatternError::NonPrimitiveConst(value_kind(value).to_string())),
            Shape::Ref(path) => self.reference(path, depth),
            Shape::Type { names, node } => self.type_schema(&names, node, depth),
        }
    }

    /// An empty schema admits any of the seven JSON value shapes.
    fn empty_schema(&mut self, depth: u32) -> Result<String, PatternError> {
        let alternatives = [
            TypeName::Boolean,
            TypeName::Null,
            TypeName::Number,
            TypeName::Integer,
            TypeName::String,
            TypeName::Array,
            TypeName::Object,
        ]
        .iter()
        .map(|&name| self.bare_type(name, depth))
        .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("({})", alternatives.join("|")))
    }

    /// Required properties are matched positionally; optional ones become
    /// independently-optional gaps around the last required position. With no
    /// required properties every insertion-point ordering is alternated, which
    /// grows combinatorially — see `PatternConfig::max_optional_properties`.
    fn properties(
        &mut self,
        properties: &Map<String, Value>,
        required: &[&str],
    ) -> Result<String, PatternError> {
        let ws = self.ws.to_string();
        let is_required: Vec<bool> = properties
            .keys()
            .map(|name| required.contains(&name.as_str()))
            .collect();

        let mut regex = String::from(r"\{");
        if let Some(last_required) = is_required.iter().rposition(|&r| r) {
            for (i, (name, sub_schema)) in properties.iter().enumerate() {
                let value = self.to_regex(sub_schema, self.config.default_depth)?;
                let mut sub = format!("{ws}\"{}\"{ws}:{ws}{value}", regex::escape(name));
                if i < last_required {
                    sub = format!("{sub}{ws},");
                } else if i > last_required {
                    sub = format!("{ws},{sub}");
                }
                if is_required[i] {
                    regex.push_str(&sub);
                } else {
                    regex.push_str(&format!("({sub})?"));
                }
            }
        } else {
            if let Some(cap) = self.config.max_optional_properties {
                if properties.len() > cap {
                    return Err(PatternError::TooManyOptionalProperties {
                        count: properties.len(),
                        cap,
                    });
                }
            }
            let subs = properties
                .iter()
                .map(|(name, sub_schema)| {
                    let value = self.to_regex(sub_schema, self.config.default_depth)?;
                    Ok(format!("{ws}\"{}\"{ws}:{ws}{value}", regex::escape(name)))
                })
                .collect::<Result<Vec<_>, PatternError>>()?;

            let orderings: Vec<String> = subs
                .iter()
                .enumerate()
                .map(|(i, sub)| {
                    let before: String =
                        subs[..i].iter().map(|s| format!("({s}{ws},)?")).collect();
                    let after: String =
                        subs[i + 1..].iter().map(|s| format!("({ws},{s})?")).collect();
                    format!("{before}{sub}{after}")
                })
                .collect();
            regex.push_str(&format!("({})?", orderings.join("|")));
        }
        regex.push_str(&format!("{ws}\\}}"));
        Ok(regex)
    }

    /// Shallow-merge of `properties`/`required` across all branches.
    fn all_of(&mut self, branches: &[Value]) -> Result<String, PatternError> {
        let ws = self.ws.to_string();
        let mut merged: Map<String, Value> = Map::new();
        let mut required: Vec<String> = Vec::new();

        for branch in branches {
            if let Value::Object(map) = branch {
                if let Some(properties) = map.get("properties").and_then(Value::as_object) {
                    for (name, sub_schema) in properties {
                        merged.insert(name.clone(), sub_schema.clone());
                    }
                }
                if let Some(names) = map.get("required").and_then(Value::as_array) {
                    required.extend(names.iter().filter_map(Value::as_str).map(str::to_string));
                }
            }
        }

        let parts = merged
            .iter()
            .map(|(name, sub_schema)| {
                let value = self.to_regex(sub_schema, self.config.default_depth)?;
                let sub = format!("{ws}\"{}\"{ws}:{ws}{value}", regex::escape(name));
                Ok(if required.iter().any(|r| r == name) {
                    sub
                } else {
                    format!("({sub})?")
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        Ok(format!(r"\{{{}{ws}\}}", parts.join(&format!("{ws},"))))
    }

    /// Several anyOf branches may hold at once, so every non-empty combination
    /// is alternated. Multi-branch combinations only make sense when every
    /// member is object-shaped (their bodies concatenate into one object);
    /// other combinations cannot simultaneously hold and are dropped.
    fn any_of(&mut self, branches: &[Value], depth: u32) -> Result<String, PatternError> {
        let subs = branches
            .iter()
            .map(|branch| self.to_regex(branch, depth))
            .collect::<Result<Vec<_>, _>>()?;

        let mut alternatives = Vec::new();
        for size in 1..=subs.len() {
            for combo in combinations(&subs, size) {
                if let Some(merged) = merge_combination(&combo) {
                    alternatives.push(merged);
                }
            }
        }
        Ok(format!("({})", alternatives.join("|")))
    }

    fn one_of(&mut self, branches: &[Value], depth: u32) -> Result<String, PatternError> {
        let subs = branches
            .iter()
            .map(|branch| self.to_regex(branch, depth).map(|s| format!("(?:{s})")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("({})", subs.join("|")))
    }

    /// Fixed-position tuple, optionally followed by repeated `items`.
    fn prefix_items(
        &mut self,
        prefix: &[Value],
        items: Option<&Value>,
        depth: u32,
    ) -> Result<String, PatternError> {
        let ws = self.ws.to_string();
        let elements = prefix
            .iter()
            .map(|element| self.to_regex(element, depth))
            .collect::<Result<Vec<_>, _>>()?;
        let comma = format!("{ws},{ws}");

        let mut regex = format!(r"\[{ws}{}", elements.join(&comma));
        if let Some(items) = items {
            let item = self.to_regex(items, depth)?;
            regex.push_str(&format!("({comma}{item})*"));
        }
        regex.push_str(&format!(r"{ws}\]"));
        Ok(regex)
    }

    fn reference(&mut self, path: &str, depth: u32) -> Result<String, PatternError> {
        if self.ref_stack.iter().any(|seen| seen == path) {
            return Err(PatternError::RecursiveRef(path.to_string()));
        }
        self.ref_stack.push(path.to_string());
        let target = resolve_ref(self.root, path)?;
        let result = self.to_regex(target, depth);
        self.ref_stack.pop();
        result
    }

    fn type_schema(
        &mut self,
        names: &[TypeName],
        node: &Map<String, Value>,
        depth: u32,
    ) -> Result<String, PatternError> {
        // A node may carry its own expansion depth (used by the synthetic
        // defaults); it wins over the inherited one.
        let depth = node
            .get("depth")
            .and_then(Value::as_u64)
            .map(|d| d as u32)
            .unwrap_or(depth);

        if let [single] = names {
            return match single {
                TypeName::String => self.string_type(node),
                TypeName::Number | TypeName::Integer => number_type(node, *single),
                TypeName::Boolean => Ok(BOOLEAN.to_string()),
                TypeName::Null => Ok(NULL.to_string()),
                TypeName::Array => self.array_type(node, depth),
                TypeName::Object => self.object_type(node, depth),
            };
        }

        // List of types: alternation, excluding `object` as a defensive
        // simplification.
        let alternatives = names
            .iter()
            .filter(|&&name| name != TypeName::Object)
            .map(|&name| self.bare_type(name, depth))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("({})", alternatives.join("|")))
    }

    /// Pattern for a type name with no further constraints.
    fn bare_type(&mut self, name: TypeName, depth: u32) -> Result<String, PatternError> {
        let empty = Map::new();
        match name {
            TypeName::String => Ok(STRING.to_string()),
            TypeName::Number => Ok(NUMBER.to_string()),
            TypeName::Integer => Ok(INTEGER.to_string()),
            TypeName::Boolean => Ok(BOOLEAN.to_string()),
            TypeName::Null => Ok(NULL.to_string()),
            TypeName::Array => self.array_type(&empty, depth),
            TypeName::Object => self.object_type(&empty, depth),
        }
    }

    fn string_type(&mut self, node: &Map<String, Value>) -> Result<String, PatternError> {
        if node.contains_key("maxLength") || node.contains_key("minLength") {
            let (min, max) =
                validate_quantifiers(get_bound(node, "minLength"), get_bound(node, "maxLength"), 0)?;
            return Ok(format!("\"{STRING_INNER}{}\"", quantifier(&min, &max)));
        }
        if let Some(pattern) = node.get("pattern").and_then(Value::as_str) {
            let unanchored = if pattern.starts_with('^') && pattern.ends_with('$') {
                &pattern[1..pattern.len() - 1]
            } else {
                pattern
            };
            return Ok(format!("(\"{unanchored}\")"));
        }
        if let Some(format) = node.get("format").and_then(Value::as_str) {
            return match format {
                "uuid" => Ok(UUID.to_string()),
                "date-time" => Ok(DATE_TIME.to_string()),
                "date" => Ok(DATE.to_string()),
                "time" => Ok(TIME.to_string()),
                other => Err(PatternError::UnsupportedFormat(other.to_string())),
            };
        }
        Ok(STRING.to_string())
    }

    fn array_type(&mut self, node: &Map<String, Value>, depth: u32) -> Result<String, PatternError> {
        let ws = self.ws.to_string();
        let repeats =
            item_count_quantifier(get_bound(node, "minItems"), get_bound(node, "maxItems"))?
                .ok_or(PatternError::UnsatisfiableItems)?;
        let allow_empty = if get_bound(node, "minItems").unwrap_or(0) == 0 { "?" } else { "" };

        if let Some(items) = node.get("items").filter(|items| is_live(items)) {
            let item = self.to_regex(items, self.config.default_depth)?;
            return Ok(format!(
                r"\[{ws}({item}({ws},{ws}{item}){repeats}){allow_empty}{ws}\]"
            ));
        }

        // Underspecified: any primitive element, plus nested containers while
        // the expansion depth lasts.
        let mut element_types = vec![
            TypeName::Boolean,
            TypeName::Null,
            TypeName::Number,
            TypeName::Integer,
            TypeName::String,
        ];
        if depth > 0 {
            element_types.push(TypeName::Object);
            element_types.push(TypeName::Array);
        }
        let alternatives = element_types
            .iter()
            .map(|&name| self.bare_type(name, depth.saturating_sub(1)))
            .collect::<Result<Vec<_>, _>>()?
            .join("|");
        Ok(format!(
            r"\[{ws}(({alternatives})({ws},{ws}({alternatives})){repeats}){allow_empty}{ws}\]"
        ))
    }

    fn object_type(&mut self, node: &Map<String, Value>, depth: u32) -> Result<String, PatternError> {
        let ws = self.ws.to_string();
        let repeats = match item_count_quantifier(
            get_bound(node, "minProperties"),
            get_bound(node, "maxProperties"),
        )? {
            Some(repeats) => repeats,
            // A zero-property limit leaves only the empty object.
            None => return Ok(format!(r"\{{{ws}\}}")),
        };
        let allow_empty = if get_bound(node, "minProperties").unwrap_or(0) == 0 { "?" } else { "" };

        let value_pattern = match node.get("additionalProperties") {
            None | Some(Value::Bool(true)) => self.default_property_values(depth)?,
            Some(Value::Bool(false)) => "a^".to_string(),
            Some(sub_schema) => self.to_regex(sub_schema, self.config.default_depth)?,
        };

        let key_value = format!("{STRING}{ws}:{ws}{value_pattern}");
        let successor = format!("{ws},{ws}{key_value}");
        Ok(format!(
            r"\{{{ws}({key_value}({successor}){repeats}){allow_empty}{ws}\}}"
        ))
    }

    /// Value pattern for objects with unconstrained properties.
    fn default_property_values(&mut self, depth: u32) -> Result<String, PatternError> {
        let mut value_types = vec![
            TypeName::String,
            TypeName::Number,
            TypeName::Boolean,
            TypeName::Null,
        ];
        if depth > 0 {
            value_types.push(TypeName::Object);
            value_types.push(TypeName::Array);
        }
        let alternatives = value_types
            .iter()
            .map(|&name| self.bare_type(name, depth.saturating_sub(1)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("({})", alternatives.join("|")))
    }
}

fn is_live(value: &Value) -> bool {
    !matches!(value, Value::Bool(false) | Value::Null)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A primitive literal, serialized and escaped for embedding in a pattern.
fn literal_pattern(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            Some(regex::escape(&value.to_string()))
        }
        _ => None,
    }
}

fn enum_pattern(values: &[Value]) -> Result<String, PatternError> {
    let choices = values
        .iter()
        .map(|choice| {
            literal_pattern(choice)
                .ok_or_else(|| PatternError::NonPrimitiveEnum(value_kind(choice).to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", choices.join("|")))
}

fn number_type(node: &Map<String, Value>, name: TypeName) -> Result<String, PatternError> {
    let digit_bounds = [
        "minDigitsInteger",
        "maxDigitsInteger",
        "minDigitsFraction",
        "maxDigitsFraction",
        "minDigitsExponent",
        "maxDigitsExponent",
    ];
    if digit_bounds.iter().any(|key| node.contains_key(*key)) {
        let (min_int, max_int) = validate_quantifiers(
            get_bound(node, "minDigitsInteger"),
            get_bound(node, "maxDigitsInteger"),
            1,
        )?;
        let (min_fraction, max_fraction) = validate_quantifiers(
            get_bound(node, "minDigitsFraction"),
            get_bound(node, "maxDigitsFraction"),
            0,
        )?;
        let (min_exponent, max_exponent) = validate_quantifiers(
            get_bound(node, "minDigitsExponent"),
            get_bound(node, "maxDigitsExponent"),
            0,
        )?;

        let integers = if min_int.is_empty() && max_int.is_empty() {
            "*".to_string()
        } else {
            quantifier(&min_int, &max_int)
        };
        let fraction = if min_fraction.is_empty() && max_fraction.is_empty() {
            "+".to_string()
        } else {
            quantifier(&min_fraction, &max_fraction)
        };
        let exponent = if min_exponent.is_empty() && max_exponent.is_empty() {
            "+".to_string()
        } else {
            quantifier(&min_exponent, &max_exponent)
        };

        return Ok(format!(
            r"((-)?(0|[1-9][0-9]{integers}))(\.[0-9]{fraction})?([eE][+-]?[0-9]{exponent})?"
        ));
    }

    if name == TypeName::Integer {
        if node.contains_key("minDigits") || node.contains_key("maxDigits") {
            let (min, max) =
                validate_quantifiers(get_bound(node, "minDigits"), get_bound(node, "maxDigits"), 1)?;
            return Ok(format!("(-)?(0|[1-9][0-9]{})", quantifier(&min, &max)));
        }
        return Ok(INTEGER.to_string());
    }
    Ok(NUMBER.to_string())
}

/// Bounds may arrive as JSON numbers or as strings.
fn get_bound(node: &Map<String, Value>, key: &str) -> Option<i64> {
    match node.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Adjust bounds by `offset` (elements already present in the pattern) and
/// render them as quantifier halves; empty means unbounded on that side.
fn validate_quantifiers(
    min: Option<i64>,
    max: Option<i64>,
    offset: i64,
) -> Result<(String, String), PatternError> {
    let min_adjusted = min.map(|m| (m - offset).max(0));
    let max_adjusted = max.map(|m| m - offset);
    if let (Some(min), Some(max)) = (min_adjusted, max_adjusted) {
        if max < min {
            return Err(PatternError::InvertedBounds);
        }
    }
    Ok((
        min_adjusted.map(|m| m.to_string()).unwrap_or_default(),
        max_adjusted.map(|m| m.to_string()).unwrap_or_default(),
    ))
}

fn quantifier(min: &str, max: &str) -> String {
    let min = if min.is_empty() { "0" } else { min };
    format!("{{{min},{max}}}")
}

/// Repeat-count quantifier for the successor elements of an array/object
/// pattern (the first element is matched outside the repetition). `None`
/// means even one element is too many.
fn item_count_quantifier(
    min: Option<i64>,
    max: Option<i64>,
) -> Result<Option<String>, PatternError> {
    let min = min.unwrap_or(0);
    match max {
        None => Ok(Some(format!("{{{},}}", (min - 1).max(0)))),
        Some(max) if max < 1 => Ok(None),
        Some(max) if max < min => Err(PatternError::InvertedBounds),
        Some(max) => Ok(Some(format!("{{{},{}}}", (min - 1).max(0), max - 1))),
    }
}

/// Order-preserving k-combinations.
fn combinations<'a>(items: &'a [String], k: usize) -> Vec<Vec<&'a str>> {
    if k == 1 {
        return items.iter().map(|item| vec![item.as_str()]).collect();
    }
    let mut out = Vec::new();
    for i in 0..items.len().saturating_sub(k - 1) {
        for mut tail in combinations(&items[i + 1..], k - 1) {
            let mut combo = Vec::with_capacity(k);
            combo.push(items[i].as_str());
            combo.append(&mut tail);
            out.push(combo);
        }
    }
    out
}

/// Merge one anyOf combination into a single pattern, if it can hold.
fn merge_combination(combo: &[&str]) -> Option<String> {
    if let [single] = combo {
        return Some((*single).to_string());
    }
    if combo
        .iter()
        .all(|pattern| pattern.starts_with(r"\{") && pattern.ends_with(r"\}"))
    {
        let bodies: Vec<&str> = combo
            .iter()
            .map(|pattern| &pattern[2..pattern.len() - 2])
            .collect();
        return Some(format!(r"\{{{}\}}", bodies.join(",")));
    }
    None
}
