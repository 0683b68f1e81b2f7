//! Pulls code-identifier-shaped tokens out of a natural language question.
//!
//! Four extraction methods, in the order they're tried: quoted spans (the
//! user named something explicitly), dotted paths (`auth.service.Login`),
//! camelCase identifiers, then snake_case words. A token already captured by
//! an earlier method is not re-emitted by a later one.

use std::collections::HashSet;

use crate::context::models::{ExtractedEntity, ExtractionMethod};

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "does", "do", "how", "what", "why", "where",
    "this", "that", "for", "and", "or", "to", "of", "in", "on", "it", "its",
];

/// Extract entities from a question, in descending order of confidence.
#[must_use]
pub fn extract_entities(question: &str) -> Vec<ExtractedEntity> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut entities = Vec::new();

    for quoted in extract_quoted(question) {
        if seen.insert(quoted.clone()) {
            entities.push(ExtractedEntity {
                name: quoted,
                confidence: 1.0,
                extraction_method: ExtractionMethod::Quoted,
                is_known: false,
            });
        }
    }

    for word in tokenize(question) {
        if seen.contains(&word) {
            continue;
        }
        if let Some(method) = classify_word(&word) {
            seen.insert(word.clone());
            let confidence = match method {
                ExtractionMethod::DottedPath => 0.9,
                ExtractionMethod::CamelCase => 0.8,
                ExtractionMethod::SnakeCase => 0.6,
                ExtractionMethod::Quoted => unreachable!("quoted spans handled above"),
            };
            entities.push(ExtractedEntity {
                name: word,
                confidence,
                extraction_method: method,
                is_known: false,
            });
        }
    }

    entities
}

fn extract_quoted(question: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let bytes: Vec<char> = question.chars().collect();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == '\'' || c == '"' || c == '`' {
            if let Some(end) = bytes[i + 1..].iter().position(|&x| x == c) {
                let span: String = bytes[i + 1..i + 1 + end].iter().collect();
                if !span.is_empty() && !span.contains(' ') {
                    spans.push(span);
                }
                i += end + 2;
                continue;
            }
        }
        i += 1;
    }
    spans
}

fn tokenize(question: &str) -> Vec<String> {
    question
        .split(|c: char| c.is_whitespace() || matches!(c, '?' | '!' | ',' | ';' | ':' | '"' | '\'' | '`' | '(' | ')'))
        .map(str::to_string)
        .filter(|w| !w.is_empty())
        .collect()
}

fn classify_word(word: &str) -> Option<ExtractionMethod> {
    let trimmed = word.trim_matches('.');
    if trimmed.len() < 2 {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if STOPWORDS.contains(&lower.as_str()) {
        return None;
    }

    if trimmed.contains('.') && trimmed.chars().all(is_path_char) {
        let segments: Vec<&str> = trimmed.split('.').filter(|s| !s.is_empty()).collect();
        if segments.len() > 1 {
            return Some(ExtractionMethod::DottedPath);
        }
    }

    if is_camel_case(trimmed) {
        return Some(ExtractionMethod::CamelCase);
    }

    if is_snake_case(trimmed) {
        return Some(ExtractionMethod::SnakeCase);
    }

    None
}

fn is_path_char(c: char) -> bool {
    c.is_alphanumeric() || c == '.' || c == '_'
}

/// At least one internal uppercase letter following a lowercase one, or a
/// leading uppercase letter with mixed case after it (`PascalCase` counts).
fn is_camel_case(word: &str) -> bool {
    if !word.chars().all(|c| c.is_ascii_alphanumeric()) {
        return false;
    }
    let chars: Vec<char> = word.chars().collect();
    let has_upper = chars.iter().any(char::is_ascii_uppercase);
    let has_lower = chars.iter().any(char::is_ascii_lowercase);
    if !has_upper || !has_lower {
        return false;
    }
    chars.windows(2).any(|pair| pair[0].is_ascii_lowercase() && pair[1].is_ascii_uppercase())
        || chars[0].is_ascii_uppercase()
}

fn is_snake_case(word: &str) -> bool {
    if !word.contains('_') {
        return false;
    }
    word.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
