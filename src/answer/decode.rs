//! Best-effort decoding of an untrusted model reply into a [`ServiceAnswer`].
//!
//! Decoders are tried in order: the whole reply as JSON, a fenced ```json
//! block, then the widest `{ ... }` span. The first one yielding an object
//! with a non-empty `answer` wins. When none does the reply is
//! [`AnswerError::Malformed`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{AnswerError, ServiceAnswer};

static FENCED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap());

/// Confidence assumed when the reply does not state one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

const RATIONALE_KEYS: &[&str] = &["rationale", "reasoning_process", "insights"];

type Decoder = fn(&str) -> Option<Value>;

const DECODERS: &[(&str, Decoder)] = &[
    ("strict", strict),
    ("fenced", fenced),
    ("brace_scan", brace_scan),
];

/// Decode `raw` with the first decoder that yields a usable answer.
pub fn decode(raw: &str) -> Result<ServiceAnswer, AnswerError> {
    for (name, decoder) in DECODERS {
        if let Some(answer) = decoder(raw).as_ref().and_then(from_value) {
            tracing::debug!(decoder = name, "service reply decoded");
            return Ok(answer);
        }
    }
    Err(AnswerError::Malformed {
        message: format!("no JSON object with an answer in {} bytes of reply", raw.len()),
    })
}

fn strict(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

fn fenced(raw: &str) -> Option<Value> {
    FENCED_RE
        .captures_iter(raw)
        .find_map(|caps| serde_json::from_str(caps.get(1)?.as_str()).ok())
}

fn brace_scan(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

/// Map a decoded object onto a [`ServiceAnswer`], tolerating field aliases
/// and loose types.
fn from_value(value: &Value) -> Option<ServiceAnswer> {
    let object = value.as_object()?;
    let answer = object.get("answer").and_then(text)?;
    if answer.is_empty() {
        return None;
    }

    let confidence = object
        .get("confidence")
        .and_then(|c| c.as_f64().or_else(|| c.as_str()?.trim().parse().ok()))
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    let rationale = RATIONALE_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .map(strings)
        .unwrap_or_default();
    let sources = object.get("sources").map(strings).unwrap_or_default();

    Some(ServiceAnswer {
        answer,
        confidence,
        rationale,
        sources,
    })
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A string list from an array, or a single string.
fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(text)
            .filter(|s| !s.is_empty())
            .collect(),
        other => text(other).filter(|s| !s.is_empty()).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_decodes() {
        let answer = decode(
            r#"{"answer": "Paris", "confidence": 0.9, "rationale": ["capital"], "sources": ["t1"]}"#,
        )
        .unwrap();
        assert_eq!(answer.answer, "Paris");
        assert_eq!(answer.confidence, 0.9);
        assert_eq!(answer.rationale, vec!["capital"]);
        assert_eq!(answer.sources, vec!["t1"]);
    }

    #[test]
    fn fenced_block_inside_prose() {
        let raw = "Sure! Here it is:\n```json\n{\"answer\": \"Lyon\", \"insights\": \"second city\"}\n```\nHope it helps {really}.";
        let answer = decode(raw).unwrap();
        assert_eq!(answer.answer, "Lyon");
        assert_eq!(answer.rationale, vec!["second city"]);
        assert_eq!(answer.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn brace_scan_recovers_embedded_object() {
        let raw = "The answer follows {\"answer\": \"Europe\", \"confidence\": \"1.7\", \"reasoning_process\": [\"a\", \"\"]} end";
        let answer = decode(raw).unwrap();
        assert_eq!(answer.answer, "Europe");
        assert_eq!(answer.confidence, 1.0);
        assert_eq!(answer.rationale, vec!["a"]);
    }

    #[test]
    fn prose_without_json_is_malformed() {
        assert!(matches!(
            decode("I think it is Paris."),
            Err(AnswerError::Malformed { .. })
        ));
        assert!(matches!(
            decode(r#"{"confidence": 0.9}"#),
            Err(AnswerError::Malformed { .. })
        ));
        assert!(matches!(decode("} {"), Err(AnswerError::Malformed { .. })));
    }
}
