use serde::{Deserialize, Serialize};
use unicode_categories::UnicodeCategories;

use crate::config::Tokenizer;

/// Coarse token class used when choosing match spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Word,
    Number,
    Punct,
}

/// A token with its UTF-8 byte offsets in the source text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// Token text exactly as it appears in the source.
    pub text: String,
    /// Byte offset (inclusive) in the source text.
    pub start: usize,
    /// Byte offset (exclusive) in the source text.
    pub end: usize,
    pub kind: TokenKind,
}

impl Token {
    fn new(source: &str, start: usize, end: usize) -> Self {
        let text = &source[start..end];
        Self {
            text: text.to_string(),
            start,
            end,
            kind: classify(text),
        }
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        self.text.as_str()
    }
}

/// Split `text` into tokens with byte offsets into `text` itself.
///
/// Offsets always refer to the raw input, so match spans can be reported
/// against the caller's text no matter how tokens are normalised later.
pub fn tokenize(text: &str, tokenizer: Tokenizer) -> Vec<Token> {
    match tokenizer {
        Tokenizer::Alphanumeric => alphanumeric_tokens(text),
        Tokenizer::Whitespace => whitespace_tokens(text),
    }
}

fn alphanumeric_tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if is_word_char(ch) {
            if start.is_none() {
                start = Some(idx);
            }
            continue;
        }
        if let Some(word_start) = start.take() {
            tokens.push(Token::new(text, word_start, idx));
        }
        if !ch.is_whitespace() {
            tokens.push(Token::new(text, idx, idx + ch.len_utf8()));
        }
    }

    if let Some(word_start) = start {
        tokens.push(Token::new(text, word_start, text.len()));
    }
    tokens
}

fn whitespace_tokens(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(token_start) = start.take() {
                tokens.push(Token::new(text, token_start, idx));
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }

    if let Some(token_start) = start {
        tokens.push(Token::new(text, token_start, text.len()));
    }
    tokens
}

// Marks stay attached so decomposed accents do not split a word.
fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch.is_mark()
}

fn classify(text: &str) -> TokenKind {
    if text.chars().all(|ch| ch.is_numeric() || ch == '.' || ch == ',')
        && text.chars().any(char::is_numeric)
    {
        TokenKind::Number
    } else if text.chars().any(is_word_char) {
        TokenKind::Word
    } else {
        TokenKind::Punct
    }
}
