//! Consensus pattern execution
//!
//! Fans extraction agents out in parallel, lifts each successful response
//! into an item set, and hands the sets to the pure tally in
//! `showrunner_core::consensus`. Failed agents simply do not vote; the
//! agreement denominator is the number of extractions actually produced.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use tracing::info;

use showrunner_core::consensus::{tally, ConsensusResult, ConsensusSettings};
use showrunner_core::PoolResult;

use crate::pool::AgentPool;

fn bracket_tag_regex() -> &'static Regex {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    TAG_RE.get_or_init(|| Regex::new(r"\[([A-Z][A-Z0-9_]*)\]").expect("valid tag regex"))
}

/// Run the consensus pattern over the named agents.
///
/// Returns the raw per-agent pool result alongside the tallied consensus.
pub async fn execute_consensus(
    pool: &AgentPool,
    agent_names: &[String],
    input: &HashMap<String, Value>,
    settings: &ConsensusSettings,
    majority_default: f64,
) -> (PoolResult, ConsensusResult) {
    let threshold = settings.effective_threshold(majority_default);
    info!(
        agents = agent_names.len(),
        threshold, "starting consensus extraction"
    );

    let pool_result = pool.execute_parallel(agent_names, input).await;

    let extractions: Vec<BTreeSet<String>> = pool_result
        .executions
        .iter()
        .filter(|execution| execution.response.success)
        .filter_map(|execution| execution.response.content.as_ref())
        .map(items_from_content)
        .collect();

    let consensus = tally(&extractions, threshold);
    info!(
        accepted = consensus.accepted.len(),
        rejected = consensus.rejected.len(),
        voters = extractions.len(),
        "consensus complete"
    );

    (pool_result, consensus)
}

/// Lift a parsed agent response into an item set.
///
/// Accepts a string array, an object with a `tags` array, or free text that
/// is scanned for bracketed tags. Anything else contributes nothing.
pub fn items_from_content(content: &Value) -> BTreeSet<String> {
    match content {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Value::Object(map) => map
            .get("tags")
            .map(items_from_content)
            .unwrap_or_default(),
        Value::String(text) => bracket_tag_regex()
            .captures_iter(text)
            .map(|capture| capture[1].to_string())
            .collect(),
        _ => BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_items_from_array() {
        assert_eq!(
            items_from_content(&json!(["CHAR_MEI", "LOC_DOCKS"])),
            set(&["CHAR_MEI", "LOC_DOCKS"])
        );
    }

    #[test]
    fn test_items_from_tags_object() {
        assert_eq!(
            items_from_content(&json!({"tags": ["CHAR_MEI"], "perspective": "visual"})),
            set(&["CHAR_MEI"])
        );
    }

    #[test]
    fn test_items_from_free_text() {
        assert_eq!(
            items_from_content(&json!("I found [CHAR_MEI] near [LOC_DOCKS].")),
            set(&["CHAR_MEI", "LOC_DOCKS"])
        );
    }

    #[test]
    fn test_items_from_other_shapes_empty() {
        assert!(items_from_content(&json!(42)).is_empty());
        assert!(items_from_content(&json!(null)).is_empty());
        assert!(items_from_content(&json!({"no_tags": true})).is_empty());
    }
}
