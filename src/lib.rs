//! Extraction of structured data from free-form, incrementally-arriving text —
//! the kind a language model emits token by token, often malformed and wrapped
//! in prose.
//!
//! Quick start:
//! - **Embedded JSON, one-shot**: [`extract_typed`] finds and parses the first
//!   payload conforming to a schema descriptor.
//! - **Embedded JSON, streaming**: [`StreamingValueBuilder`] feeds chunks and
//!   emits path-addressed [`Delta`] updates as the value grows.
//! - **Tokens**: [`JsonScanner`] is the underlying incremental scanner;
//!   [`stringify_tokens`] renders its output back to compact JSON.
//! - **Fenced code**: [`extract_codes_from_markdown`] and
//!   [`StreamingMarkdownExtractor`].
//! - **Grammar-scoped code**: [`code::StreamingCodeExtractor`] over an
//!   installed [`code::GrammarEngine`].
//! - **Async**: the [`stream`] module wraps each of these over
//!   `AsyncRead`/bytes streams.

pub mod builder;
pub mod code;
pub mod config;
pub mod error;
pub mod markdown;
pub mod pattern;
pub mod scanner;
pub mod schema;
pub mod stream;

// Convenient re-exports
pub use builder::{Delta, PatternValidator, SchemaValidator, StreamingValueBuilder};
pub use config::PatternConfig;
pub use error::{CodeExtractError, ExtractError, PatternError};
pub use markdown::{extract_codes_from_markdown, CodeBlock, StreamingMarkdownExtractor};
pub use pattern::{
    build_regex_from_schema, build_regex_from_schema_str, extract_by_schema, extract_typed,
    schema_regex_for,
};
pub use scanner::{stringify_token, stringify_tokens, JsonScanner, Pos, Token, TokenKind};
