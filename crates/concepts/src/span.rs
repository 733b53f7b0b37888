use canonical::{Token, TokenKind};
use serde::{Deserialize, Serialize};

/// How candidate spans are cut from a token sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStrategy {
    /// Every run of 1..=window tokens.
    #[default]
    TokenSequences,
    /// Runs that do not start on a number or stopword, do not end on a
    /// stopword or punctuation, and do not cross punctuation.
    Filtered,
}

/// A contiguous token run, with byte offsets into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    /// Number of tokens covered.
    pub tokens: usize,
}

pub const NEGATIONS: &[&str] = &["none", "non", "neither", "nor", "no", "not"];

pub const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "either",
    "few", "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "however", "i", "if", "in", "into", "is", "it",
    "its", "itself", "just", "me", "more", "most", "my", "myself", "neither", "no", "non", "none",
    "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours",
    "ourselves", "out", "over", "own", "same", "she", "should", "so", "some", "such", "than",
    "that", "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they",
    "this", "those", "through", "time", "to", "too", "under", "until", "up", "very", "was", "we",
    "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "would", "you", "your", "yours", "yourself", "yourselves",
];

pub fn is_stopword(word: &str) -> bool {
    let lowered = word.to_lowercase();
    STOPWORDS.binary_search(&lowered.as_str()).is_ok()
}

pub fn is_negation(word: &str) -> bool {
    let lowered = word.to_lowercase();
    NEGATIONS.contains(&lowered.as_str())
}

/// Candidate spans over `tokens`, in start order then length order.
///
/// Spans cover at most `window` tokens and at least `min_match_length`
/// characters of `text`.
pub fn generate_spans(
    text: &str,
    tokens: &[Token],
    window: usize,
    min_match_length: usize,
    strategy: SpanStrategy,
) -> Vec<Span> {
    let mut spans = Vec::new();
    for i in 0..tokens.len() {
        if strategy == SpanStrategy::Filtered && !valid_start(&tokens[i]) {
            continue;
        }
        let last = tokens.len().min(i + window);
        for j in i..last {
            if strategy == SpanStrategy::Filtered {
                if !valid_middle(&tokens[j]) {
                    break;
                }
                if !valid_end(&tokens[j]) {
                    continue;
                }
            }
            let span = Span {
                start: tokens[i].start,
                end: tokens[j].end,
                tokens: j - i + 1,
            };
            // Offsets that do not slice `text` yield no span.
            let long_enough = text
                .get(span.start..span.end)
                .is_some_and(|s| s.chars().count() >= min_match_length);
            if long_enough {
                spans.push(span);
            }
        }
    }
    spans
}

fn valid_start(token: &Token) -> bool {
    match token.kind {
        TokenKind::Number | TokenKind::Punct => false,
        TokenKind::Word => !is_stopword(&token.text) || is_negation(&token.text),
    }
}

fn valid_end(token: &Token) -> bool {
    token.kind != TokenKind::Punct && !is_stopword(&token.text)
}

// Brackets and slashes may sit inside a term ("t-cell (cd4)", "and/or").
fn valid_middle(token: &Token) -> bool {
    token.kind != TokenKind::Punct
        || token
            .text
            .chars()
            .all(|ch| matches!(ch, '(' | ')' | '[' | ']' | '{' | '}' | '/' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use canonical::{tokenize, Tokenizer};

    fn texts<'a>(text: &'a str, spans: &[Span]) -> Vec<&'a str> {
        spans.iter().map(|s| &text[s.start..s.end]).collect()
    }

    #[test]
    fn stopword_list_is_sorted_for_lookup() {
        assert!(STOPWORDS.windows(2).all(|w| w[0] < w[1]));
        assert!(is_stopword("The"));
        assert!(is_stopword("time"));
        assert!(!is_stopword("humerus"));
    }

    #[test]
    fn token_sequences_cover_every_window() {
        let text = "left humerus bone";
        let tokens = tokenize(text, Tokenizer::Alphanumeric);
        let spans = generate_spans(text, &tokens, 2, 3, SpanStrategy::TokenSequences);
        assert_eq!(
            texts(text, &spans),
            vec!["left", "left humerus", "humerus", "humerus bone", "bone"]
        );
        assert!(spans.iter().all(|s| s.tokens <= 2));
    }

    #[test]
    fn short_spans_are_dropped() {
        let text = "of the humerus";
        let tokens = tokenize(text, Tokenizer::Alphanumeric);
        let spans = generate_spans(text, &tokens, 1, 3, SpanStrategy::TokenSequences);
        assert_eq!(texts(text, &spans), vec!["the", "humerus"]);
    }

    #[test]
    fn filtered_spans_skip_stopwords_numbers_and_punctuation() {
        let text = "fracture of the humerus, 2 no pain";
        let tokens = tokenize(text, Tokenizer::Alphanumeric);
        let spans = generate_spans(text, &tokens, 5, 3, SpanStrategy::Filtered);
        assert_eq!(
            texts(text, &spans),
            vec![
                "fracture",
                "fracture of the humerus",
                "humerus",
                "no pain",
                "pain",
            ]
        );
    }

    #[test]
    fn brackets_do_not_break_filtered_spans() {
        let text = "lupus (sle) flare";
        let tokens = tokenize(text, Tokenizer::Alphanumeric);
        let spans = generate_spans(text, &tokens, 5, 3, SpanStrategy::Filtered);
        assert!(texts(text, &spans).contains(&"lupus (sle) flare"));
    }

    #[test]
    fn tokens_outside_the_text_yield_no_span() {
        let text = "héllo bone";
        let tokens = vec![
            Token {
                text: "h".into(),
                start: 1,
                end: 2,
                kind: TokenKind::Word,
            },
            Token {
                text: "bone".into(),
                start: 6,
                end: 40,
                kind: TokenKind::Word,
            },
        ];
        assert!(generate_spans(text, &tokens, 2, 1, SpanStrategy::TokenSequences).is_empty());
    }

    #[test]
    fn zero_window_yields_nothing() {
        let text = "humerus";
        let tokens = tokenize(text, Tokenizer::Alphanumeric);
        assert!(generate_spans(text, &tokens, 0, 1, SpanStrategy::TokenSequences).is_empty());
    }
}
