//! Lenient JSON recovery for model output.
//!
//! Model responses are supposed to be a single JSON object but routinely
//! arrive wrapped in markdown fences, surrounded by prose, or with small
//! syntax slips. [`LenientParser`] tries, in order:
//!
//! 1. a strict decode of the whole text,
//! 2. a strict decode of the first fenced code block,
//! 3. a strict decode after a fixed repair pipeline,
//!
//! and finally falls back to a caller supplied value if there is one.
//!
//! The repair pipeline is textual, not a real parser. In particular quoting
//! bare keys can corrupt a string value that contains a `, word:` sequence,
//! which is why well-formed input always returns from stage 1 untouched.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Default number of characters of raw input kept in a [`ParseFailure`].
pub const EXCERPT_CHARS: usize = 200;

lazy_static! {
    static ref FENCE_MARKER: Regex = Regex::new(r"```[A-Za-z0-9_-]*").expect("valid regex");
    static ref TRAILING_SEPARATOR: Regex = Regex::new(r",\s*([}\]])").expect("valid regex");
    static ref BARE_KEY: Regex =
        Regex::new(r"([{,]\s*)([A-Za-z0-9_]+)(\s*:)").expect("valid regex");
}

/// No stage could recover a JSON value and no fallback was supplied.
#[derive(Debug, Error)]
#[error("failed to recover JSON from model output: {source} (input: {excerpt:?})")]
pub struct ParseFailure {
    /// The start of the raw input.
    pub excerpt: String,
    /// The error from the last decode attempt.
    #[source]
    pub source: serde_json::Error,
}

/// Which stage produced a parsed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseStage {
    Direct,
    Fenced,
    Repaired,
    Fallback,
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseStage::Direct => "direct",
            ParseStage::Fenced => "fenced",
            ParseStage::Repaired => "repaired",
            ParseStage::Fallback => "fallback",
        };
        f.write_str(name)
    }
}

/// Multi-stage JSON decoder for untrusted text.
#[derive(Debug, Clone, Copy)]
pub struct LenientParser {
    excerpt_chars: usize,
}

impl Default for LenientParser {
    fn default() -> Self {
        Self {
            excerpt_chars: EXCERPT_CHARS,
        }
    }
}

impl LenientParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how much of the raw input a [`ParseFailure`] keeps.
    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    /// Recover a JSON value from `raw`, or return `fallback` if nothing works.
    pub fn parse(&self, raw: &str, fallback: Option<Value>) -> Result<Value, ParseFailure> {
        self.parse_traced(raw, fallback).map(|(value, _)| value)
    }

    /// Like [`parse`](Self::parse), also reporting which stage succeeded.
    pub fn parse_traced(
        &self,
        raw: &str,
        fallback: Option<Value>,
    ) -> Result<(Value, ParseStage), ParseFailure> {
        match self.recover(raw) {
            Ok(found) => Ok(found),
            Err(source) => match fallback {
                Some(value) => {
                    debug!(error = %source, "Using fallback value");
                    Ok((value, ParseStage::Fallback))
                }
                None => {
                    let failure = self.failure(raw, source);
                    warn!(excerpt = %failure.excerpt, error = %failure.source, "Unparseable model output");
                    Err(failure)
                }
            },
        }
    }

    /// Recover a JSON value and decode it into `T`.
    pub fn parse_as<T: DeserializeOwned>(&self, raw: &str) -> Result<T, ParseFailure> {
        let value = self.parse(raw, None)?;
        serde_json::from_value(value).map_err(|source| self.failure(raw, source))
    }

    fn recover(&self, raw: &str) -> Result<(Value, ParseStage), serde_json::Error> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => return Ok((value, ParseStage::Direct)),
            Err(e) => debug!(stage = %ParseStage::Direct, error = %e, "Strict decode failed"),
        }

        if let Some(inner) = extract_fenced(raw) {
            match serde_json::from_str::<Value>(inner) {
                Ok(value) => return Ok((value, ParseStage::Fenced)),
                Err(e) => debug!(stage = %ParseStage::Fenced, error = %e, "Fenced block decode failed"),
            }
        }

        let repaired = repair(raw);
        serde_json::from_str::<Value>(&repaired)
            .map(|value| (value, ParseStage::Repaired))
            .inspect_err(|e| debug!(stage = %ParseStage::Repaired, error = %e, "Repaired decode failed"))
    }

    fn failure(&self, raw: &str, source: serde_json::Error) -> ParseFailure {
        ParseFailure {
            excerpt: raw.chars().take(self.excerpt_chars).collect(),
            source,
        }
    }
}

/// Recover a JSON value with the default parser.
pub fn parse(raw: &str, fallback: Option<Value>) -> Result<Value, ParseFailure> {
    LenientParser::default().parse(raw, fallback)
}

/// Recover a JSON value with the default parser, reporting the stage used.
pub fn parse_traced(
    raw: &str,
    fallback: Option<Value>,
) -> Result<(Value, ParseStage), ParseFailure> {
    LenientParser::default().parse_traced(raw, fallback)
}

/// Recover and decode a typed value with the default parser.
pub fn parse_as<T: DeserializeOwned>(raw: &str) -> Result<T, ParseFailure> {
    LenientParser::default().parse_as(raw)
}

/// Interior of the first ```` ``` ```` fenced block, skipping a format tag
/// such as `json` right after the opening fence.
fn extract_fenced(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let after_open = &text[start..];
    let tag_len = after_open
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(after_open.len());
    let body = &after_open[tag_len..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Run the textual repair pipeline.
fn repair(raw: &str) -> String {
    let text = strip_fences(raw);
    let text = isolate_object(&text);
    let text = TRAILING_SEPARATOR.replace_all(text, "${1}");
    let text = BARE_KEY.replace_all(&text, "${1}\"${2}\"${3}");
    normalize_single_quotes(&text)
}

fn strip_fences(text: &str) -> String {
    FENCE_MARKER.replace_all(text, "").replace('`', "")
}

/// Keep the span from the first `{` to the last `}`.
fn isolate_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Turn single-quoted strings into double-quoted ones.
///
/// Apostrophes inside double-quoted strings are left alone.
fn normalize_single_quotes(text: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum Mode {
        Bare,
        Double,
        Single,
    }

    let mut out = String::with_capacity(text.len());
    let mut mode = Mode::Bare;
    let mut escaped = false;

    for ch in text.chars() {
        match mode {
            Mode::Bare => match ch {
                '"' => {
                    mode = Mode::Double;
                    out.push('"');
                }
                '\'' => {
                    mode = Mode::Single;
                    out.push('"');
                }
                _ => out.push(ch),
            },
            Mode::Double => {
                out.push(ch);
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    mode = Mode::Bare;
                }
            }
            Mode::Single => {
                if escaped {
                    escaped = false;
                    if ch != '\'' {
                        out.push('\\');
                    }
                    out.push(ch);
                } else {
                    match ch {
                        '\\' => escaped = true,
                        '\'' => {
                            mode = Mode::Bare;
                            out.push('"');
                        }
                        '"' => out.push_str("\\\""),
                        _ => out.push(ch),
                    }
                }
            }
        }
    }

    out
}
