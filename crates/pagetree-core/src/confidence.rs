//! Token-level quality estimate for OCR / text-layer output.
//!
//! Each whitespace-separated token is put in at most one "valid" bucket
//! (real word, technical term, numeric), checked in that order. Junk is
//! tallied independently, so a token can be both valid and junk.

use crate::{ConfidenceLabel, ConfidenceResult};

/// Tokens longer than this (in chars) count as junk.
pub const MAX_TOKEN_CHARS: usize = 40;
const JUNK_PENALTY_WEIGHT: f64 = 25.0;
const TECHNICAL_BONUS: f64 = 5.0;

/// Punctuation that may appear in a clean token besides `[A-Za-z0-9_]`.
const SAFE_PUNCTUATION: &str = ".,!?;:()-'\"+/%@=";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    RealWord,
    Technical,
    Numeric,
    Other,
}

pub fn classify(token: &str) -> TokenClass {
    if is_real_word(token) {
        TokenClass::RealWord
    } else if is_technical_term(token) {
        TokenClass::Technical
    } else if is_numeric(token) {
        TokenClass::Numeric
    } else {
        TokenClass::Other
    }
}

/// `^[A-Za-z]+(-[A-Za-z]+)*$`, longer than one char.
pub fn is_real_word(token: &str) -> bool {
    token.len() > 1
        && token
            .split('-')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_alphabetic()))
}

/// `^[A-Za-z0-9]+[./][A-Za-z0-9]+$` (e.g. `TCP/IP`, `Node.js`), or contains `++`,
/// or ends with `%`.
pub fn is_technical_term(token: &str) -> bool {
    is_joined_alphanumeric(token) || token.contains("++") || token.ends_with('%')
}

fn is_joined_alphanumeric(token: &str) -> bool {
    let Some(sep) = token.find(|c: char| !c.is_ascii_alphanumeric()) else {
        return false;
    };
    let (head, rest) = token.split_at(sep);
    let Some(tail) = rest.strip_prefix(|c: char| c == '.' || c == '/') else {
        return false;
    };
    !head.is_empty() && !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// `^\d+\.?\d*$` over ASCII digits.
pub fn is_numeric(token: &str) -> bool {
    let rest = token.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == token.len() {
        return false;
    }
    let rest = rest.strip_prefix('.').unwrap_or(rest);
    rest.bytes().all(|b| b.is_ascii_digit())
}

/// Any char outside `[A-Za-z0-9_]`, whitespace and [`SAFE_PUNCTUATION`], or
/// longer than [`MAX_TOKEN_CHARS`].
pub fn is_junk(token: &str) -> bool {
    token.chars().any(|c| !is_safe_char(c)) || token.chars().count() > MAX_TOKEN_CHARS
}

fn is_safe_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c.is_whitespace() || SAFE_PUNCTUATION.contains(c)
}

/// Score a span of text. Total: blank input is a valid `Poor` result.
pub fn score(text: &str) -> ConfidenceResult {
    let mut total = 0usize;
    let mut real = 0usize;
    let mut technical = 0usize;
    let mut numeric = 0usize;
    let mut junk = 0usize;

    for token in text.split_whitespace() {
        total += 1;
        match classify(token) {
            TokenClass::RealWord => real += 1,
            TokenClass::Technical => technical += 1,
            TokenClass::Numeric => numeric += 1,
            TokenClass::Other => {}
        }
        if is_junk(token) {
            junk += 1;
        }
    }

    if total == 0 {
        return ConfidenceResult::empty();
    }

    let total_f = total as f64;
    let valid = (real + technical + numeric) as f64;
    let raw_score = 100.0 * valid / total_f;
    let penalty = JUNK_PENALTY_WEIGHT * junk as f64 / total_f;
    let bonus = if technical > 0 { TECHNICAL_BONUS } else { 0.0 };
    let score = (raw_score - penalty + bonus).clamp(0.0, 100.0).round() as u8;

    ConfidenceResult {
        score,
        label: ConfidenceLabel::from_score(score),
        total_words: total,
        real_words: real + technical,
        junk_words: junk,
        technical_terms: technical,
        numeric_words: numeric,
    }
}
