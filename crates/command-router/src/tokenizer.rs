//! Prefix matching and word extraction.

use crate::error::{ArgumentError, ResolveError};
use chat_client::Snowflake;
use std::collections::HashMap;

/// Strip the first matching prefix.
///
/// Candidates are tried in order and the first literal match wins.
pub fn strip_prefix<'a, 'p>(
    text: &'a str,
    prefixes: &'p [String],
) -> Result<(&'p str, &'a str), ResolveError> {
    prefixes
        .iter()
        .find(|p| !p.is_empty() && text.starts_with(p.as_str()))
        .map(|p| (p.as_str(), &text[p.len()..]))
        .ok_or(ResolveError::NoPrefixMatch)
}

/// Cursor over raw command text.
#[derive(Debug, Clone)]
pub struct StringView<'a> {
    buffer: &'a str,
    index: usize,
}

impl<'a> StringView<'a> {
    pub fn new(buffer: &'a str) -> Self {
        Self { buffer, index: 0 }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Rewind or advance to a previously observed index.
    pub fn seek(&mut self, index: usize) {
        self.index = index.min(self.buffer.len());
    }

    pub fn eof(&self) -> bool {
        self.remaining().trim_start().is_empty()
    }

    fn remaining(&self) -> &'a str {
        &self.buffer[self.index..]
    }

    /// Skip whitespace, returning whether anything was skipped.
    pub fn skip_ws(&mut self) -> bool {
        let remaining = self.remaining();
        let trimmed = remaining.trim_start();
        self.index += remaining.len() - trimmed.len();
        remaining.len() != trimmed.len()
    }

    /// Everything not yet consumed, without leading whitespace.
    pub fn rest(&self) -> &'a str {
        self.remaining().trim_start()
    }

    /// Next whitespace-delimited word, or a `"quoted phrase"` as one word.
    pub fn next_word(&mut self) -> Result<Option<String>, ArgumentError> {
        self.skip_ws();
        let remaining = self.remaining();
        let mut chars = remaining.char_indices();

        match chars.next() {
            None => Ok(None),
            Some((_, '"')) => {
                let mut word = String::new();
                let mut escaped = false;
                for (offset, c) in chars {
                    match c {
                        _ if escaped => {
                            word.push(c);
                            escaped = false;
                        }
                        '\\' => escaped = true,
                        '"' => {
                            self.index += offset + 1;
                            return Ok(Some(word));
                        }
                        _ => word.push(c),
                    }
                }
                Err(ArgumentError::UnclosedQuote)
            }
            Some(_) => {
                let end = remaining
                    .find(char::is_whitespace)
                    .unwrap_or(remaining.len());
                self.index += end;
                Ok(Some(remaining[..end].to_string()))
            }
        }
    }
}

/// Prefix sets: a default list plus per-scope overrides.
#[derive(Debug, Clone)]
pub struct Prefixes {
    default: Vec<String>,
    overrides: HashMap<Snowflake, Vec<String>>,
}

impl Prefixes {
    pub fn new(default: Vec<String>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Replace the prefixes for one guild (or direct-message channel).
    pub fn with_override(mut self, scope: Snowflake, prefixes: Vec<String>) -> Self {
        self.overrides.insert(scope, prefixes);
        self
    }

    pub fn for_scope(&self, scope: Snowflake) -> &[String] {
        self.overrides
            .get(&scope)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default)
    }
}

impl Default for Prefixes {
    fn default() -> Self {
        Self::new(vec!["!".into()])
    }
}
