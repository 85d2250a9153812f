//! Code extraction driven by an external grammar engine.
//!
//! The engine itself is a collaborator: something that tokenizes text into
//! scope-annotated ranges (a TextMate-style tokenizer). This module defines
//! the seam, a process-wide registry for one shared engine instance, and the
//! scope-filtered extraction plus its streaming adapter.

use std::any::Any;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::CodeExtractError;

/// A scope-annotated range produced by the grammar engine. Indices are byte
/// offsets into the tokenized text.
#[derive(Debug, Clone)]
pub struct ScopeToken {
    pub start_index: usize,
    pub end_index: usize,
    pub scopes: Vec<String>,
}

/// Result of tokenizing one line (or, as used here, one whole buffer).
pub struct Tokenization {
    pub tokens: Vec<ScopeToken>,
    /// Opaque continuation state for line-by-line tokenization. The adapters
    /// in this module always re-tokenize from the initial state.
    pub rule_stack: Option<Box<dyn Any + Send + Sync>>,
    /// Whether tokenization stopped early (e.g. a time limit).
    pub stopped_early: bool,
}

/// The grammar-engine seam. Implementations wrap a real tokenizer; this crate
/// ships none.
pub trait GrammarEngine: Send + Sync {
    fn tokenize_line(
        &self,
        text: &str,
        prior_state: Option<&(dyn Any + Send + Sync)>,
        column: usize,
    ) -> Tokenization;
}

/// Process-wide engine. Initialized at most once, never torn down; shared
/// read-only by every extractor afterwards.
static GRAMMAR_ENGINE: OnceCell<Arc<dyn GrammarEngine>> = OnceCell::new();

/// Install the process-wide grammar engine. Fails if one is already installed.
pub fn install_grammar_engine(engine: Arc<dyn GrammarEngine>) -> Result<(), CodeExtractError> {
    GRAMMAR_ENGINE
        .set(engine)
        .map_err(|_| CodeExtractError::EngineAlreadyInstalled)
}

fn installed_engine() -> Result<Arc<dyn GrammarEngine>, CodeExtractError> {
    GRAMMAR_ENGINE
        .get()
        .cloned()
        .ok_or(CodeExtractError::EngineUnavailable)
}

/// Languages with known target scope sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeLanguage {
    Vue,
    Tsx,
    Go,
    JavaScript,
    TypeScript,
    Rust,
}

impl CodeLanguage {
    pub fn scopes(&self) -> &'static [&'static str] {
        match self {
            CodeLanguage::Vue => &["source.vue", "text.html.vue"],
            CodeLanguage::Tsx => &["source.tsx", "source.js"],
            CodeLanguage::Go => &["source.go"],
            CodeLanguage::JavaScript => &["source.js"],
            CodeLanguage::TypeScript => &["source.ts"],
            CodeLanguage::Rust => &["source.rust"],
        }
    }

    /// Extract this language's code from a tokenization of `text`.
    pub fn extract(&self, result: &Tokenization, text: &str) -> String {
        match self {
            CodeLanguage::Vue => extract_vue_code(result, text),
            _ => extract_scoped_code(result, text, self.scopes()),
        }
    }
}

fn scope_matches(scope: &str, target: &str) -> bool {
    scope == target || scope.starts_with(target) && scope[target.len()..].starts_with(' ')
}

/// Concatenate the ranges whose scopes hit any of `targets`, trimmed.
pub fn extract_scoped_code(result: &Tokenization, text: &str, targets: &[&str]) -> String {
    let mut code = String::new();
    let mut last_end = 0usize;

    for token in &result.tokens {
        let hit = token
            .scopes
            .iter()
            .any(|scope| targets.iter().any(|target| scope_matches(scope, target)));
        if hit {
            code.push_str(slice(text, last_end, token.end_index));
            last_end = token.end_index;
        }
    }
    code.trim().to_string()
}

/// Vue needs block tracking: a single-file component interleaves HTML, script
/// and style regions, so spans are collected while inside a Vue scope and the
/// gap is flushed when leaving it.
pub fn extract_vue_code(result: &Tokenization, text: &str) -> String {
    let mut code = String::new();
    let mut in_block = false;
    let mut last_end = 0usize;

    for token in &result.tokens {
        let is_vue = token.scopes.iter().any(|scope| {
            scope_matches(scope, "source.vue") || scope.starts_with("text.html.vue")
        });

        if is_vue && !in_block {
            in_block = true;
            last_end = token.start_index;
        } else if !is_vue && in_block {
            code.push_str(slice(text, last_end, token.start_index));
            in_block = false;
        }

        if in_block {
            code.push_str(slice(text, last_end, token.end_index));
            last_end = token.end_index;
        }
    }
    code.trim().to_string()
}

/// Clamped slice; third-party engines may report ranges past the buffer.
fn slice(text: &str, start: usize, end: usize) -> &str {
    let len = text.len();
    let start = start.min(len);
    let end = end.min(len);
    if start >= end {
        return "";
    }
    text.get(start..end).unwrap_or("")
}

/// A streaming update carrying the code extracted so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUpdate {
    pub text: String,
}

/// Streaming extractor for one language. Each `feed` re-tokenizes the full
/// buffer through the engine and emits the extracted code, suppressing empty
/// and consecutive-duplicate updates. One instance per logical stream; all
/// instances share the process-wide engine read-only.
pub struct StreamingCodeExtractor<F: FnMut(CodeUpdate)> {
    lang: CodeLanguage,
    engine: Option<Arc<dyn GrammarEngine>>,
    buffer: String,
    last_update: Option<String>,
    callback: F,
}

impl<F: FnMut(CodeUpdate)> StreamingCodeExtractor<F> {
    /// Use the process-wide engine (resolved lazily on first feed).
    pub fn new(lang: CodeLanguage, callback: F) -> Self {
        Self { lang, engine: None, buffer: String::new(), last_update: None, callback }
    }

    /// Use an explicit engine instance instead of the process-wide one.
    pub fn with_engine(lang: CodeLanguage, engine: Arc<dyn GrammarEngine>, callback: F) -> Self {
        Self { lang, engine: Some(engine), buffer: String::new(), last_update: None, callback }
    }

    fn engine(&self) -> Result<Arc<dyn GrammarEngine>, CodeExtractError> {
        match &self.engine {
            Some(engine) => Ok(Arc::clone(engine)),
            None => installed_engine(),
        }
    }

    pub fn feed(&mut self, chunk: &str) -> Result<(), CodeExtractError> {
        self.buffer.push_str(chunk);
        let engine = self.engine()?;
        let result = engine.tokenize_line(&self.buffer, None, 0);
        if result.stopped_early {
            debug!(target = "stream_extract::code", "grammar engine stopped early");
        }

        let code = self.lang.extract(&result, &self.buffer);
        if code.is_empty() || self.last_update.as_deref() == Some(code.as_str()) {
            return Ok(());
        }
        (self.callback)(CodeUpdate { text: code.clone() });
        self.last_update = Some(code);
        Ok(())
    }

    /// Final extraction over the full buffer; emits no further updates.
    pub fn end(&mut self) -> Result<String, CodeExtractError> {
        let engine = self.engine()?;
        let result = engine.tokenize_line(&self.buffer, None, 0);
        Ok(self.lang.extract(&result, &self.buffer))
    }
}
