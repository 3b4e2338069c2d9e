//! Consensus aggregation
//!
//! Pure voting math over item extractions produced by parallel agents. The
//! runtime feeds raw item sets in; everything here is a deterministic
//! function of its inputs so identical extractions always produce identical
//! accepted/rejected sets.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Placeholder items that agents sometimes echo back from prompt examples.
/// These are never counted.
pub const PLACEHOLDER_DENYLIST: &[&str] = &[
    "CHARACTER_NAME",
    "LOC_NAME",
    "PROP_NAME",
    "TAG_NAME",
    "CHAR_TAG_NAME",
    "LOC_TAG_NAME",
    "PROP_TAG_NAME",
    "CONCEPT_TAG_NAME",
    "EVENT_TAG_NAME",
    "CHAR_NAME",
    "CHAR_FIRSTNAME",
    "CHAR_FIRSTNAME_LASTNAME",
    "LOC_SPECIFIC_PLACE_NAME",
    "PROP_DESCRIPTIVE_ITEM_NAME",
    "CONCEPT_THEME_NAME",
    "EVENT_SPECIFIC_OCCURRENCE",
];

/// Named consensus policies
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusPolicy {
    /// Accept items a supermajority of agents produced
    #[default]
    Majority,
    /// Accept only items every agent produced (set intersection)
    Unanimous,
}

impl ConsensusPolicy {
    /// Default agreement threshold for the policy
    pub fn default_threshold(&self) -> f64 {
        match self {
            Self::Majority => 0.8,
            Self::Unanimous => 1.0,
        }
    }

    /// Default number of extraction agents for the policy
    pub fn default_agent_count(&self) -> usize {
        match self {
            Self::Majority => 5,
            Self::Unanimous => 10,
        }
    }
}

/// Per-step consensus parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusSettings {
    /// Which named policy applies
    #[serde(default)]
    pub policy: ConsensusPolicy,

    /// Explicit threshold overriding the policy default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl ConsensusSettings {
    /// Threshold to apply, falling back to the engine default for majority
    pub fn effective_threshold(&self, majority_default: f64) -> f64 {
        if let Some(threshold) = self.threshold {
            return threshold;
        }
        match self.policy {
            ConsensusPolicy::Majority => majority_default,
            ConsensusPolicy::Unanimous => 1.0,
        }
    }
}

/// Result of a consensus tally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Items whose agreement ratio reached the threshold
    pub accepted: BTreeSet<String>,

    /// Items seen by at least one agent but below the threshold
    pub rejected: BTreeSet<String>,

    /// Agreement ratio per distinct item
    pub agreement_ratios: BTreeMap<String, f64>,

    /// Normalized per-agent extractions, in input order
    pub extractions: Vec<BTreeSet<String>>,

    /// Threshold that was applied
    pub threshold: f64,
}

impl ConsensusResult {
    /// Whether no item fell below the threshold.
    /// An empty extraction counts as unanimous with an empty accepted set.
    pub fn is_unanimous(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Agreement ratio for a specific item, 0.0 when never produced
    pub fn agreement(&self, item: &str) -> f64 {
        self.agreement_ratios.get(item).copied().unwrap_or(0.0)
    }
}

/// Normalize an item for counting: uppercase, separators to underscores,
/// collapsed repeats, no leading or trailing underscores.
pub fn normalize_item(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut last_was_underscore = false;

    for ch in raw.trim().chars() {
        let mapped = match ch {
            ' ' | '\t' | '-' => '_',
            c => c.to_ascii_uppercase(),
        };
        if mapped == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        normalized.push(mapped);
    }

    normalized.trim_matches('_').to_string()
}

/// Tally raw extractions against a threshold.
///
/// Items are normalized, empties and deny-listed placeholders discarded,
/// then the agreement ratio of each distinct item is its producer count over
/// the number of extractions.
pub fn tally(raw_extractions: &[BTreeSet<String>], threshold: f64) -> ConsensusResult {
    let extractions: Vec<BTreeSet<String>> = raw_extractions
        .iter()
        .map(|set| {
            set.iter()
                .map(|item| normalize_item(item))
                .filter(|item| !item.is_empty())
                .filter(|item| !PLACEHOLDER_DENYLIST.contains(&item.as_str()))
                .collect()
        })
        .collect();

    if extractions.is_empty() {
        return ConsensusResult {
            accepted: BTreeSet::new(),
            rejected: BTreeSet::new(),
            agreement_ratios: BTreeMap::new(),
            extractions,
            threshold,
        };
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for extraction in &extractions {
        for item in extraction {
            *counts.entry(item.clone()).or_insert(0) += 1;
        }
    }

    let agent_count = extractions.len() as f64;
    let agreement_ratios: BTreeMap<String, f64> = counts
        .into_iter()
        .map(|(item, count)| (item, count as f64 / agent_count))
        .collect();

    let mut accepted = BTreeSet::new();
    let mut rejected = BTreeSet::new();
    for (item, ratio) in &agreement_ratios {
        if *ratio >= threshold {
            accepted.insert(item.clone());
        } else {
            rejected.insert(item.clone());
        }
    }

    tracing::debug!(
        accepted = accepted.len(),
        rejected = rejected.len(),
        threshold,
        "consensus tally complete"
    );

    ConsensusResult {
        accepted,
        rejected,
        agreement_ratios,
        extractions,
        threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_normalize_item() {
        assert_eq!(normalize_item("char_mei"), "CHAR_MEI");
        assert_eq!(normalize_item("CHAR MEI"), "CHAR_MEI");
        assert_eq!(normalize_item("CHAR-MEI"), "CHAR_MEI");
        assert_eq!(normalize_item("  char__mei  "), "CHAR_MEI");
        assert_eq!(normalize_item("_CHAR_MEI_"), "CHAR_MEI");
        assert_eq!(normalize_item("loc - old  town"), "LOC_OLD_TOWN");
        assert_eq!(normalize_item(""), "");
        assert_eq!(normalize_item("___"), "");
    }

    #[test]
    fn test_supermajority_acceptance() {
        let extractions = vec![
            set(&["A", "B", "C"]),
            set(&["A", "B", "C"]),
            set(&["A", "B"]),
            set(&["A", "D"]),
            set(&["A", "B", "E"]),
        ];
        let result = tally(&extractions, 0.6);

        assert_eq!(result.accepted, set(&["A", "B"]));
        assert_eq!(result.rejected, set(&["C", "D", "E"]));
        assert_eq!(result.agreement("A"), 1.0);
        assert_eq!(result.agreement("B"), 0.8);
        assert_eq!(result.agreement("C"), 0.4);
        assert_eq!(result.agreement("D"), 0.2);
        assert_eq!(result.agreement("E"), 0.2);
        assert!(!result.is_unanimous());
    }

    #[test]
    fn test_normalization_unifies_variants() {
        let extractions = vec![set(&["char_mei"]), set(&["CHAR MEI"]), set(&["CHAR-MEI"])];
        let result = tally(&extractions, 0.5);

        assert_eq!(result.accepted, set(&["CHAR_MEI"]));
        assert!(result.rejected.is_empty());
        assert_eq!(result.agreement("CHAR_MEI"), 1.0);
    }

    #[test]
    fn test_placeholders_and_empties_discarded() {
        let extractions = vec![
            set(&["CHARACTER_NAME", "CHAR_MEI", ""]),
            set(&["char name", "CHAR_MEI"]),
        ];
        let result = tally(&extractions, 0.5);

        assert!(result.accepted.contains("CHAR_MEI"));
        assert!(!result.agreement_ratios.contains_key("CHARACTER_NAME"));
        assert!(!result.agreement_ratios.contains_key("CHAR_NAME"));
        assert!(!result.agreement_ratios.contains_key(""));
    }

    #[test]
    fn test_empty_extraction_is_unanimous_success() {
        let extractions = vec![set(&[]), set(&[]), set(&[])];
        let result = tally(&extractions, 0.8);

        assert!(result.accepted.is_empty());
        assert!(result.rejected.is_empty());
        assert!(result.is_unanimous());
    }

    #[test]
    fn test_unanimous_threshold_is_intersection() {
        let extractions = vec![
            set(&["A", "B"]),
            set(&["A", "B", "C"]),
            set(&["A"]),
        ];
        let result = tally(&extractions, 1.0);

        assert_eq!(result.accepted, set(&["A"]));
        assert_eq!(result.rejected, set(&["B", "C"]));
    }

    #[test]
    fn test_determinism() {
        let extractions = vec![
            set(&["ZETA", "ALPHA", "MID"]),
            set(&["ALPHA", "MID"]),
            set(&["ALPHA"]),
        ];
        let first = tally(&extractions, 0.6);
        let second = tally(&extractions, 0.6);

        assert_eq!(first.accepted, second.accepted);
        assert_eq!(first.rejected, second.rejected);
        assert_eq!(first.agreement_ratios, second.agreement_ratios);
    }

    #[test]
    fn test_exact_threshold_boundary_accepts() {
        // 4 of 5 producers at threshold 0.8 must accept
        let extractions = vec![
            set(&["X"]),
            set(&["X"]),
            set(&["X"]),
            set(&["X"]),
            set(&[]),
        ];
        let result = tally(&extractions, 0.8);
        assert!(result.accepted.contains("X"));
    }

    #[test]
    fn test_policy_defaults() {
        assert_eq!(ConsensusPolicy::Majority.default_threshold(), 0.8);
        assert_eq!(ConsensusPolicy::Majority.default_agent_count(), 5);
        assert_eq!(ConsensusPolicy::Unanimous.default_threshold(), 1.0);
        assert_eq!(ConsensusPolicy::Unanimous.default_agent_count(), 10);
    }

    #[test]
    fn test_settings_effective_threshold() {
        let defaults = 0.8;

        let majority = ConsensusSettings::default();
        assert_eq!(majority.effective_threshold(defaults), 0.8);

        let unanimous = ConsensusSettings {
            policy: ConsensusPolicy::Unanimous,
            threshold: None,
        };
        assert_eq!(unanimous.effective_threshold(defaults), 1.0);

        let explicit = ConsensusSettings {
            policy: ConsensusPolicy::Majority,
            threshold: Some(0.6),
        };
        assert_eq!(explicit.effective_threshold(defaults), 0.6);
    }
}
