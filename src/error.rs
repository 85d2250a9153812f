use thiserror::Error;

/// Errors raised while compiling a schema descriptor into a matching pattern.
///
/// These are caller mistakes: they are raised eagerly from `compile`-time entry
/// points and never from the streaming paths.
#[derive(Error, Debug)]
pub enum PatternError {
    #[error("unsupported schema type: {0}")]
    UnsupportedType(String),
    #[error("string format {0} is not supported")]
    UnsupportedFormat(String),
    #[error("unsupported data type in enum: {0}")]
    NonPrimitiveEnum(String),
    #[error("unsupported data type in const: {0}")]
    NonPrimitiveConst(String),
    #[error("external references are not supported: {0}")]
    ExternalRef(String),
    #[error("invalid reference: {0}")]
    InvalidRef(String),
    #[error("recursive reference: {0}")]
    RecursiveRef(String),
    #[error("max bound must be greater than or equal to min bound")]
    InvertedBounds,
    #[error("array item limits produce an unsatisfiable pattern")]
    UnsatisfiableItems,
    #[error("schema has {count} optional properties, above the configured cap of {cap}")]
    TooManyOptionalProperties { count: usize, cap: usize },
    #[error("schema node could not be translated to a pattern")]
    Unrecognized,
    #[error("compiled pattern rejected by the regex engine: {0}")]
    Regex(#[from] regex::Error),
    #[error("schema is not valid JSON: {0}")]
    SchemaJson(#[source] serde_json::Error),
}

/// Errors raised by the one-shot extraction entry points.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),
    #[error("no match found")]
    NoMatch,
    #[error("JSON deserialization error: {0}. Extracted text: {1}")]
    Deserialization(#[source] serde_json::Error, String),
    #[error("byte stream error: {0}")]
    ByteStream(String),
}

/// Errors raised by the grammar-engine-backed code extraction adapter.
#[derive(Error, Debug)]
pub enum CodeExtractError {
    #[error("no grammar engine installed")]
    EngineUnavailable,
    #[error("a grammar engine is already installed")]
    EngineAlreadyInstalled,
}
