//! Response parsers
//!
//! An agent's parsing contract is a plain function from raw text to a JSON
//! value. Extraction parsers are total: when nothing matches they return a
//! degraded but valid shape (an empty list) rather than guessing. Shape
//! parsers (`json_object`, `judge_ranking`, `verdict`) fail with
//! `ParseFailed` so the raw text is preserved for diagnosis.

use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use showrunner_core::{ShowrunnerError, ShowrunnerResult};

/// Parsing contract bound to an agent
pub type ParseFn = Arc<dyn Fn(&str) -> ShowrunnerResult<Value> + Send + Sync>;

fn tag_regex() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(r"\[([A-Z][A-Z0-9_]*)\]").expect("valid tag regex"))
}

/// Named, serializable parser registry for workflow manifests
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// The trimmed raw text as a JSON string
    #[default]
    RawText,
    /// Unique bracketed uppercase tags, e.g. `[CHAR_MEI]`
    TagList,
    /// First JSON object embedded in the text
    JsonObject,
    /// First JSON array embedded in the text
    JsonArray,
    /// Judge scores: `{"scores": {"p1": 8.5, ...}}`
    JudgeRanking,
    /// Validator verdict: `{"accepted": true, "feedback": "..."}`
    Verdict,
}

impl ParserKind {
    /// The parse function this kind names
    pub fn parser(&self) -> ParseFn {
        match self {
            Self::RawText => raw_text(),
            Self::TagList => tag_list(),
            Self::JsonObject => json_object(),
            Self::JsonArray => json_array(),
            Self::JudgeRanking => judge_ranking(),
            Self::Verdict => verdict(),
        }
    }
}

/// The trimmed raw text, unchanged
pub fn raw_text() -> ParseFn {
    Arc::new(|raw| Ok(Value::String(raw.trim().to_string())))
}

/// Unique bracketed tags in first-seen order. Total: no matches yields an
/// empty array.
pub fn tag_list() -> ParseFn {
    Arc::new(|raw| {
        let mut seen = std::collections::BTreeSet::new();
        let mut tags = Vec::new();
        for capture in tag_regex().captures_iter(raw) {
            let tag = capture[1].to_string();
            if seen.insert(tag.clone()) {
                tags.push(Value::String(tag));
            }
        }
        Ok(Value::Array(tags))
    })
}

/// First balanced JSON object embedded in the text
pub fn json_object() -> ParseFn {
    Arc::new(|raw| extract_json_object(raw))
}

/// First balanced JSON array embedded in the text
pub fn json_array() -> ParseFn {
    Arc::new(|raw| extract_balanced(raw, '[', ']'))
}

/// Judge scores as `{"scores": {id: number}}`; also accepts a bare id->number map
pub fn judge_ranking() -> ParseFn {
    Arc::new(|raw| {
        let value = extract_json_object(raw)?;
        let scores = scores_from(&value).ok_or_else(|| {
            ShowrunnerError::parse_failed("judge response carried no numeric scores")
        })?;
        Ok(json!({ "scores": scores }))
    })
}

/// Validator verdict as `{"accepted": bool, "feedback": string}`
pub fn verdict() -> ParseFn {
    Arc::new(|raw| {
        let value = extract_json_object(raw)?;
        let accepted = value
            .get("accepted")
            .or_else(|| value.get("approved"))
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                ShowrunnerError::parse_failed("verdict carried no accepted/approved flag")
            })?;
        let feedback = value
            .get("feedback")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(json!({ "accepted": accepted, "feedback": feedback }))
    })
}

/// Scan for the first balanced `{...}` and parse it
fn extract_json_object(raw: &str) -> ShowrunnerResult<Value> {
    extract_balanced(raw, '{', '}')
}

/// Scan for the first balanced `open...close` span and parse it as JSON,
/// skipping delimiters inside string literals.
fn extract_balanced(raw: &str, open: char, close: char) -> ShowrunnerResult<Value> {
    let bytes = raw.as_bytes();
    let start = raw
        .find(open)
        .ok_or_else(|| ShowrunnerError::parse_failed(format!("no '{}' in response", open)))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                let candidate = &raw[start..start + offset + 1];
                return serde_json::from_str(candidate).map_err(|e| {
                    ShowrunnerError::parse_failed(format!("invalid JSON in response: {}", e))
                });
            }
        }
    }

    Err(ShowrunnerError::parse_failed(
        "unbalanced JSON in response",
    ))
}

fn scores_from(value: &Value) -> Option<BTreeMap<String, f64>> {
    let object = value
        .get("scores")
        .and_then(Value::as_object)
        .or_else(|| value.as_object())?;

    let mut scores = BTreeMap::new();
    for (key, entry) in object {
        if let Some(number) = entry.as_f64() {
            scores.insert(key.clone(), number);
        }
    }
    if scores.is_empty() {
        None
    } else {
        Some(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_text_trims() {
        let parsed = raw_text()("  some prose \n").unwrap();
        assert_eq!(parsed, Value::String("some prose".to_string()));
    }

    #[test]
    fn test_tag_list_extracts_unique() {
        let parsed = tag_list()("[CHAR_MEI] meets [LOC_DOCKS], then [CHAR_MEI] again").unwrap();
        assert_eq!(parsed, json!(["CHAR_MEI", "LOC_DOCKS"]));
    }

    #[test]
    fn test_tag_list_total_on_no_match() {
        let parsed = tag_list()("no tags here at all").unwrap();
        assert_eq!(parsed, json!([]));
    }

    #[test]
    fn test_tag_list_ignores_lowercase() {
        let parsed = tag_list()("[not_a_tag] but [REAL_TAG]").unwrap();
        assert_eq!(parsed, json!(["REAL_TAG"]));
    }

    #[test]
    fn test_json_object_from_prose() {
        let raw = "Here is my analysis:\n{\"theme\": \"betrayal\", \"beats\": 3}\nDone.";
        let parsed = json_object()(raw).unwrap();
        assert_eq!(parsed["theme"], "betrayal");
        assert_eq!(parsed["beats"], 3);
    }

    #[test]
    fn test_json_object_handles_nested_and_strings() {
        let raw = r#"{"outer": {"inner": "has } brace"}, "n": 1}"#;
        let parsed = json_object()(raw).unwrap();
        assert_eq!(parsed["outer"]["inner"], "has } brace");
    }

    #[test]
    fn test_json_object_fails_without_object() {
        let err = json_object()("just prose").unwrap_err();
        assert!(matches!(err, ShowrunnerError::ParseFailed(_)));
    }

    #[test]
    fn test_json_array_from_prose() {
        let parsed = json_array()("Tags found: [\"CHAR_MEI\", \"LOC_DOCKS\"] end").unwrap();
        assert_eq!(parsed, json!(["CHAR_MEI", "LOC_DOCKS"]));
    }

    #[test]
    fn test_json_array_fails_without_array() {
        assert!(json_array()("nothing here").is_err());
    }

    #[test]
    fn test_judge_ranking_wrapped() {
        let parsed = judge_ranking()(r#"{"scores": {"p1": 8.5, "p2": 6}}"#).unwrap();
        assert_eq!(parsed["scores"]["p1"], 8.5);
        assert_eq!(parsed["scores"]["p2"], 6.0);
    }

    #[test]
    fn test_judge_ranking_bare_map() {
        let parsed = judge_ranking()(r#"Ranking: {"p1": 4, "p2": 9}"#).unwrap();
        assert_eq!(parsed["scores"]["p2"], 9.0);
    }

    #[test]
    fn test_judge_ranking_rejects_no_scores() {
        assert!(judge_ranking()(r#"{"notes": "all fine"}"#).is_err());
    }

    #[test]
    fn test_verdict_accepted() {
        let parsed = verdict()(r#"{"accepted": true, "feedback": ""}"#).unwrap();
        assert_eq!(parsed["accepted"], true);
    }

    #[test]
    fn test_verdict_approved_alias() {
        let parsed = verdict()(r#"{"approved": false, "feedback": "scene 3 contradicts scene 1"}"#)
            .unwrap();
        assert_eq!(parsed["accepted"], false);
        assert_eq!(parsed["feedback"], "scene 3 contradicts scene 1");
    }

    #[test]
    fn test_parser_kind_registry() {
        let kind: ParserKind = serde_json::from_str("\"tag_list\"").unwrap();
        assert_eq!(kind, ParserKind::TagList);
        let parsed = kind.parser()("[A_TAG]").unwrap();
        assert_eq!(parsed, json!(["A_TAG"]));
    }
}
