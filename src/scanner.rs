//! Incremental scanner that classifies a growing text buffer into plain text
//! and nested JSON-like structures, one character at a time.
//!
//! The scanner is built for model output: the payload is usually surrounded by
//! prose, quotes may be single or double, field names may be unquoted, and the
//! stream can stop mid-structure. `feed` returns top-level tokens as they
//! complete; `end` force-closes whatever is still open and returns the rest.
//! The scanner never fails — input it cannot interpret as JSON comes back as
//! `Text` tokens.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Classification of a scanned span.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    Object,
    Array,
    Field,
    String,
    Number,
    Boolean,
    Null,
}

/// Position of a token's first character within the full stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pos {
    /// Character offset from the start of the stream.
    pub offset: usize,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

impl Pos {
    fn start() -> Self {
        Pos { offset: 0, line: 1, column: 1 }
    }
}

/// A classified span of input. Containers (`Object`, `Array`, `Field`) carry
/// their children; leaves carry their raw text in `content`. Completed string
/// values are normalized to double-quoted form; field names are stored bare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub content: String,
    pub pos: Pos,
    pub children: Vec<Token>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    JsonStart,
    JsonString,
    JsonEscape,
    JsonFieldName,
    JsonFieldValue,
    JsonNumber,
}

/// Arena node. Parent links make closing a container an O(1) index lookup
/// instead of a tree search.
#[derive(Debug)]
struct Node {
    kind: TokenKind,
    content: String,
    pos: Pos,
    parent: Option<usize>,
    children: Vec<usize>,
}

static NUMERIC_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?([eE][+-]?\d+)?$").expect("numeric literal pattern"));
static TRAILING_NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.eE+-]+$").expect("trailing non-numeric pattern"));

/// Stateful incremental scanner. One instance represents exactly one logical
/// stream; it is not safe to share across concurrent call sites.
#[derive(Debug)]
pub struct JsonScanner {
    arena: Vec<Node>,
    roots: Vec<usize>,
    states: Vec<State>,
    buffer: String,
    in_single_quote: bool,
    inside_json: bool,
    depth: usize,
    token_start: Pos,
    pos: Pos,
    /// Token currently receiving values: an open field, or the open container.
    current_token: Option<usize>,
    current_container: Option<usize>,
}

impl Default for JsonScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonScanner {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            roots: Vec::new(),
            states: vec![State::Text],
            buffer: String::new(),
            in_single_quote: false,
            inside_json: false,
            depth: 0,
            token_start: Pos::start(),
            pos: Pos::start(),
            current_token: None,
            current_container: None,
        }
    }

    /// Feed a chunk. Returns top-level tokens that completed during this call;
    /// a token is withheld while any structure after it is still open.
    #[instrument(target = "stream_extract::json_scan", skip(self, chunk), fields(chunk_len = chunk.len()))]
    pub fn feed(&mut self, chunk: &str) -> Vec<Token> {
        for ch in chunk.chars() {
            self.process_char(ch);
            self.advance_pos(ch);
        }
        self.take_completed()
    }

    /// Force-close all open structures (innermost first) and return every
    /// remaining token. Data scanned before truncation is preserved.
    pub fn end(&mut self) -> Vec<Token> {
        if self.inside_json {
            self.auto_close();
        }
        self.flush_text();
        self.inside_json = false;

        let roots = std::mem::take(&mut self.roots);
        let out: Vec<Token> = roots.iter().map(|&r| self.materialize(r)).collect();
        self.arena.clear();
        self.states.clear();
        self.states.push(State::Text);
        self.current_token = None;
        self.current_container = None;
        self.depth = 0;
        debug!(target = "stream_extract::json_scan", tokens = out.len(), "end of stream");
        out
    }

    fn state(&self) -> State {
        *self.states.last().expect("state stack is never empty")
    }

    fn push_state(&mut self, state: State) {
        self.states.push(state);
    }

    fn pop_state(&mut self) {
        if self.states.len() > 1 {
            self.states.pop();
        }
    }

    fn advance_pos(&mut self, ch: char) {
        self.pos.offset += 1;
        if ch == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
    }

    fn process_char(&mut self, ch: char) {
        match self.state() {
            State::Text => self.handle_text(ch),
            State::JsonStart => self.handle_json_start(ch),
            State::JsonString => self.handle_json_string(ch),
            State::JsonEscape => self.handle_json_escape(ch),
            State::JsonFieldName => self.handle_field_name(ch),
            State::JsonFieldValue => self.handle_field_value(ch),
            State::JsonNumber => self.handle_number(ch),
        }
    }

    fn handle_text(&mut self, ch: char) {
        if ch == '{' || ch == '[' {
            self.flush_text();
            self.start_container(ch);
            self.inside_json = true;
        } else {
            if self.buffer.is_empty() {
                self.token_start = self.pos;
            }
            self.buffer.push(ch);
        }
    }

    fn handle_json_start(&mut self, ch: char) {
        match ch {
            '"' | '\'' => {
                self.push_state(State::JsonString);
                self.in_single_quote = ch == '\'';
                self.buffer.push(ch);
            }
            '}' | ']' => self.close_container(),
            '{' | '[' => {
                self.complete_current();
                self.start_container(ch);
            }
            ':' => {
                self.start_field();
                self.push_state(State::JsonFieldValue);
            }
            ',' => {
                self.complete_current();
                if self.container_is_array() {
                    self.current_token = self.current_container;
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                self.push_state(State::JsonNumber);
                self.buffer.push(c);
            }
            // Literal lookahead only makes sense in element position; in an
            // object a bare `t`/`f`/`n` starts an unquoted field name.
            't' | 'f' | 'n' if self.container_is_array() => {
                self.push_state(State::JsonFieldValue);
                self.buffer.push(ch);
            }
            c if !c.is_whitespace() => {
                if self.container_is_array() {
                    self.push_state(State::JsonFieldValue);
                } else {
                    self.push_state(State::JsonFieldName);
                }
                self.buffer.push(c);
            }
            _ => {}
        }
    }

    fn handle_json_string(&mut self, ch: char) {
        self.buffer.push(ch);
        if ch == '\\' {
            self.push_state(State::JsonEscape);
        } else if (ch == '"' && !self.in_single_quote) || (ch == '\'' && self.in_single_quote) {
            self.pop_state();
            self.in_single_quote = false;
        }
    }

    fn handle_json_escape(&mut self, ch: char) {
        self.buffer.push(ch);
        self.pop_state();
    }

    fn handle_field_name(&mut self, ch: char) {
        if ch == ':' {
            self.start_field();
            self.pop_state();
            self.push_state(State::JsonFieldValue);
        } else {
            self.buffer.push(ch);
        }
    }

    fn handle_field_value(&mut self, ch: char) {
        match ch {
            ',' | '}' | ']' => {
                self.complete_current();
                self.pop_state();
                if ch == '}' || ch == ']' {
                    self.process_char(ch);
                }
            }
            '{' | '[' => self.start_container(ch),
            '"' | '\'' => {
                self.push_state(State::JsonString);
                self.in_single_quote = ch == '\'';
                self.buffer.push(ch);
            }
            c if c.is_ascii_digit() || c == '-' => {
                self.pop_state();
                self.push_state(State::JsonNumber);
                self.buffer.push(c);
            }
            c if !c.is_whitespace() => self.buffer.push(c),
            _ => {}
        }
    }

    fn handle_number(&mut self, ch: char) {
        if ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-') {
            self.buffer.push(ch);
        } else {
            self.complete_current();
            self.pop_state();
            self.process_char(ch);
        }
    }

    fn container_is_array(&self) -> bool {
        self.current_container
            .map(|i| self.arena[i].kind == TokenKind::Array)
            .unwrap_or(false)
    }

    fn start_container(&mut self, ch: char) {
        let kind = if ch == '{' { TokenKind::Object } else { TokenKind::Array };
        let idx = self.alloc(kind, String::new(), self.pos);
        if self.current_container.is_some() {
            self.attach_value(idx);
        } else {
            self.roots.push(idx);
        }
        self.current_container = Some(idx);
        self.current_token = Some(idx);
        self.push_state(State::JsonStart);
        self.depth += 1;
    }

    fn close_container(&mut self) {
        self.complete_current();
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.inside_json = false;
            self.states.clear();
            self.states.push(State::Text);
            self.flush_text();
            self.current_container = None;
        } else {
            self.pop_state();
            self.current_container = self
                .current_container
                .and_then(|i| self.arena[i].parent);
        }
        self.current_token = self.current_container;
    }

    fn start_field(&mut self) {
        let name = strip_quotes(self.buffer.trim()).to_string();
        let idx = self.alloc(TokenKind::Field, name, self.token_start);
        if let Some(container) = self.current_container {
            self.arena[idx].parent = Some(container);
            self.arena[container].children.push(idx);
        }
        self.current_token = Some(idx);
        self.buffer.clear();
        self.token_start = self.pos;
    }

    /// Finish the pending leaf in `buffer`, classifying it by the state it was
    /// scanned in, and attach it to the open field or container.
    fn complete_current(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let raw = std::mem::take(&mut self.buffer);
        let (kind, content) = match self.state() {
            State::JsonString => (TokenKind::String, normalize_string(&raw)),
            State::JsonNumber => {
                let trimmed = trim_number(&raw);
                if trimmed.is_empty() {
                    self.token_start = self.pos;
                    return;
                }
                (TokenKind::Number, trimmed)
            }
            State::JsonFieldValue => classify_value(&raw),
            _ => (TokenKind::String, normalize_string(&raw)),
        };

        let idx = self.alloc(kind, content, self.token_start);
        self.attach_value(idx);
        self.token_start = self.pos;
    }

    /// A field takes at most one value; anything further lands in the
    /// enclosing container, where the stringifier will ignore it.
    fn attach_value(&mut self, idx: usize) {
        if let Some(token) = self.current_token {
            if self.arena[token].kind == TokenKind::Field && self.arena[token].children.is_empty() {
                self.arena[idx].parent = Some(token);
                self.arena[token].children.push(idx);
                return;
            }
        }
        if let Some(container) = self.current_container {
            self.arena[idx].parent = Some(container);
            self.arena[container].children.push(idx);
        }
    }

    fn auto_close(&mut self) {
        while self.depth > 0 {
            self.depth -= 1;
            self.complete_current();
        }
    }

    fn flush_text(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if !self.inside_json {
            let content = std::mem::take(&mut self.buffer);
            let idx = self.alloc(TokenKind::Text, content, self.token_start);
            self.roots.push(idx);
        } else {
            self.buffer.clear();
        }
        self.token_start = self.pos;
    }

    fn alloc(&mut self, kind: TokenKind, content: String, pos: Pos) -> usize {
        self.arena.push(Node { kind, content, pos, parent: None, children: Vec::new() });
        self.arena.len() - 1
    }

    /// Drain the completed prefix of the root forest. Containers stay put
    /// until the scanner is back in its baseline state, so output order is
    /// always document order.
    fn take_completed(&mut self) -> Vec<Token> {
        let baseline = self.state() == State::Text;
        let mut take = 0;
        for &root in &self.roots {
            let kind = self.arena[root].kind;
            let done = kind == TokenKind::Text
                || (matches!(kind, TokenKind::Object | TokenKind::Array) && baseline);
            if done {
                take += 1;
            } else {
                break;
            }
        }

        let drained: Vec<usize> = self.roots.drain(..take).collect();
        let out: Vec<Token> = drained.iter().map(|&r| self.materialize(r)).collect();

        // Nothing live left: reclaim the arena so long streams hold no history.
        if self.roots.is_empty() && self.current_container.is_none() {
            self.arena.clear();
        }
        out
    }

    fn materialize(&self, idx: usize) -> Token {
        let node = &self.arena[idx];
        Token {
            kind: node.kind,
            content: node.content.clone(),
            pos: node.pos,
            children: node.children.iter().map(|&c| self.materialize(c)).collect(),
        }
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.strip_prefix(['"', '\'']).unwrap_or(s);
    s.strip_suffix(['"', '\'']).unwrap_or(s)
}

/// Normalize a scanned string value to double-quoted form, whatever delimiter
/// (or none) it was captured with.
fn normalize_string(raw: &str) -> String {
    format!("\"{}\"", strip_quotes(raw))
}

/// Drop garbage captured after the numeric part, then any dangling numeric
/// suffix (`.`/`e`/sign) left behind by a truncated stream.
fn trim_number(raw: &str) -> String {
    let trimmed = TRAILING_NON_NUMERIC.replace(raw, "");
    trimmed
        .trim_end_matches(['.', 'e', 'E', '+', '-'])
        .to_string()
}

fn classify_value(raw: &str) -> (TokenKind, String) {
    if raw == "true" || raw == "false" {
        (TokenKind::Boolean, raw.to_string())
    } else if raw == "null" {
        (TokenKind::Null, raw.to_string())
    } else if NUMERIC_LITERAL.is_match(raw) {
        (TokenKind::Number, raw.to_string())
    } else {
        (TokenKind::String, normalize_string(raw))
    }
}

/// Render a token forest as canonical compact JSON. Only `Object`/`Array`
/// roots contribute; surrounding `Text` renders as nothing.
pub fn stringify_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|token| match token.kind {
            TokenKind::Object | TokenKind::Array => stringify_token(token),
            _ => String::new(),
        })
        .collect()
}

/// Render a single token as compact JSON text.
pub fn stringify_token(token: &Token) -> String {
    match token.kind {
        TokenKind::Text => token.content.clone(),
        TokenKind::Object => {
            let parts: Vec<String> = token
                .children
                .iter()
                .filter(|child| child.kind == TokenKind::Field)
                .map(stringify_token)
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        TokenKind::Array => {
            let parts: Vec<String> = token
                .children
                .iter()
                .map(|child| match child.kind {
                    // A field inside an array should not occur; unwrap its value.
                    TokenKind::Field => child
                        .children
                        .first()
                        .map(stringify_token)
                        .unwrap_or_else(|| "null".to_string()),
                    _ => stringify_token(child),
                })
                .collect();
            format!("[{}]", parts.join(","))
        }
        TokenKind::Field => match token.children.first() {
            Some(value) => format!("\"{}\":{}", token.content, stringify_token(value)),
            None => format!("\"{}\":null", token.content),
        },
        TokenKind::String | TokenKind::Number | TokenKind::Boolean | TokenKind::Null => {
            token.content.clone()
        }
    }
}
