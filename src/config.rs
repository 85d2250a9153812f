use std::env;

use tracing::warn;

/// Whitespace tolerated around structural separators in compiled patterns.
pub const DEFAULT_WHITESPACE_PATTERN: &str = r"\s*";

/// Expansion depth for arrays/objects whose item/property schemas are left
/// unspecified. Each synthetic level of nesting decrements it by one.
pub const DEFAULT_RECURSION_DEPTH: u32 = 2;

/// Tunables for the schema-to-pattern compiler.
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Pattern interleaved around `:`/`,`/bracket boundaries.
    pub whitespace: String,
    /// Starting depth for underspecified array/object defaults.
    pub default_depth: u32,
    /// Upper bound on the optional-property permutation alternation. `None`
    /// preserves the unbounded behavior; exceeding a set cap is a compile error.
    pub max_optional_properties: Option<usize>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            whitespace: DEFAULT_WHITESPACE_PATTERN.to_string(),
            default_depth: DEFAULT_RECURSION_DEPTH,
            max_optional_properties: None,
        }
    }
}

impl PatternConfig {
    /// Build a config from environment variables, checking a `.env` file first.
    ///
    /// Recognized variables: `STREAM_EXTRACT_WHITESPACE`,
    /// `STREAM_EXTRACT_DEFAULT_DEPTH`, `STREAM_EXTRACT_MAX_OPTIONAL_PROPS`.
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        if let Ok(ws) = env::var("STREAM_EXTRACT_WHITESPACE") {
            config.whitespace = ws;
        }
        if let Ok(depth) = env::var("STREAM_EXTRACT_DEFAULT_DEPTH") {
            match depth.parse() {
                Ok(depth) => config.default_depth = depth,
                Err(_) => warn!(
                    target = "stream_extract::config",
                    value = %depth,
                    "ignoring unparseable STREAM_EXTRACT_DEFAULT_DEPTH"
                ),
            }
        }
        if let Ok(cap) = env::var("STREAM_EXTRACT_MAX_OPTIONAL_PROPS") {
            match cap.parse() {
                Ok(cap) => config.max_optional_properties = Some(cap),
                Err(_) => warn!(
                    target = "stream_extract::config",
                    value = %cap,
                    "ignoring unparseable STREAM_EXTRACT_MAX_OPTIONAL_PROPS"
                ),
            }
        }
        config
    }
}
