//! Fenced-code-block extraction from markdown, with a streaming adapter.
//!
//! The extractor recognizes backtick/tilde fences of three or more marks. An
//! unterminated fence yields its content up to end-of-input, which is what
//! lets the streaming adapter re-extract a growing buffer and diff against the
//! previous pass.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A fenced code block; `lang` is the first word of the fence info string,
/// empty when none was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub content: String,
    pub lang: String,
}

/// Partial closing fence at the end of a still-streaming block.
static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n`+$").expect("trailing fence pattern"));

/// Extract every fenced code block from `text`, in order.
#[instrument(target = "stream_extract::markdown", skip(text), fields(text_len = text.len()))]
pub fn extract_codes_from_markdown(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<OpenFence<'_>> = None;

    for line in text.split('\n') {
        match &mut open {
            None => {
                if let Some(fence) = fence_open(line) {
                    open = Some(fence);
                }
            }
            Some(fence) => {
                if fence_close(line, fence.mark, fence.len) {
                    blocks.push(CodeBlock {
                        content: fence.lines.join("\n"),
                        lang: fence.lang.to_string(),
                    });
                    open = None;
                } else {
                    fence.lines.push(line);
                }
            }
        }
    }

    if let Some(fence) = open {
        blocks.push(CodeBlock { content: fence.lines.join("\n"), lang: fence.lang.to_string() });
    }
    blocks
}

struct OpenFence<'a> {
    mark: char,
    len: usize,
    lang: &'a str,
    lines: Vec<&'a str>,
}

fn fence_open(line: &str) -> Option<OpenFence<'_>> {
    let trimmed = line.trim_start();
    // Up to three leading spaces; more would be an indented code block.
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let mark = trimmed.chars().next()?;
    if mark != '`' && mark != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|&c| c == mark).count();
    if len < 3 {
        return None;
    }
    let info = trimmed[len..].trim();
    // An info string containing backticks does not open a backtick fence.
    if mark == '`' && info.contains('`') {
        return None;
    }
    let lang = info.split_whitespace().next().unwrap_or("");
    Some(OpenFence { mark, len, lang, lines: Vec::new() })
}

fn fence_close(line: &str, mark: char, open_len: usize) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.chars().all(|c| c == mark)
        && trimmed.chars().count() >= open_len
}

fn trim_fence_tail(content: &str) -> String {
    TRAILING_FENCE.replace(content, "").into_owned()
}

/// Streaming front for [`extract_codes_from_markdown`]: appends each chunk to
/// a buffer, re-extracts the whole buffer, diffs against the previous pass by
/// position, and invokes the callback once per changed block — suppressing
/// updates whose trimmed content is empty or identical to the one just
/// emitted. One instance per logical stream.
pub struct StreamingMarkdownExtractor<F: FnMut(CodeBlock)> {
    buffer: String,
    previous: Vec<CodeBlock>,
    last_update: Option<CodeBlock>,
    callback: F,
}

impl<F: FnMut(CodeBlock)> StreamingMarkdownExtractor<F> {
    pub fn new(callback: F) -> Self {
        Self { buffer: String::new(), previous: Vec::new(), last_update: None, callback }
    }

    pub fn feed(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);

        let current = extract_codes_from_markdown(&self.buffer);
        if current.is_empty() {
            return;
        }

        for (i, block) in current.iter().enumerate() {
            let changed = match self.previous.get(i) {
                None => true,
                Some(previous) => {
                    previous.content != block.content || previous.lang != block.lang
                }
            };
            if !changed {
                continue;
            }

            let trimmed = trim_fence_tail(&block.content);
            if trimmed.is_empty() {
                continue;
            }
            let update = CodeBlock { content: trimmed, lang: block.lang.clone() };
            if self
                .last_update
                .as_ref()
                .map(|last| last.content == update.content)
                .unwrap_or(false)
            {
                continue;
            }
            (self.callback)(update.clone());
            self.last_update = Some(update);
        }

        self.previous = current;
    }

    /// Final extraction over the full buffer; emits no further updates.
    pub fn end(&mut self) -> Vec<CodeBlock> {
        extract_codes_from_markdown(&self.buffer)
    }
}
