//! Parsers for the fixed model-response formats
//!
//! Both prompts require a `Reasoning:` section followed by an `Answer:`
//! section; the expansion prompt additionally requires the answer to be a
//! numbered list. Callers recover from [`ParseError`] with defined fallbacks
//! instead of failing the request.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Response is missing the required \"{0}:\" section")]
    MissingSection(&'static str),

    #[error("Response contains no numbered query lines")]
    NoQueries,
}

fn reasoning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Reasoning runs until the Answer: label; the label itself is excluded.
    RE.get_or_init(|| Regex::new(r"(?s)Reasoning:\s*(.*?)\s*Answer:").expect("static regex"))
}

fn answer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Answer is the rest of the text after the label.
    RE.get_or_init(|| Regex::new(r"(?s)Answer:\s*(.*)").expect("static regex"))
}

fn numbered_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+\.\s*(.+)$").expect("static regex"))
}

/// Split a two-section response into (reasoning, answer).
///
/// The reasoning section is end-anchored on the `Answer:` label; the answer
/// section is everything after it.
pub fn split_reasoning_answer(response: &str) -> Result<(String, String), ParseError> {
    let answer = answer_re()
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .ok_or(ParseError::MissingSection("Answer"))?;

    // The reasoning pattern is end-anchored on Answer:, so it can only fail
    // here when the Reasoning: label itself is absent.
    let reasoning = reasoning_re()
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .ok_or(ParseError::MissingSection("Reasoning"))?;

    Ok((reasoning, answer))
}

/// Extract the numbered expansion queries from a response, in input order,
/// with numbering discarded.
pub fn extract_numbered_queries(response: &str) -> Result<Vec<String>, ParseError> {
    let queries: Vec<String> = numbered_line_re()
        .captures_iter(response)
        .map(|c| c[1].trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    if queries.is_empty() {
        return Err(ParseError::NoQueries);
    }
    Ok(queries)
}
