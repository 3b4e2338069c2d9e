//! Assembly pattern types and the score calculator
//!
//! The assembly pattern decides hard creative questions by fanning out
//! proposals, ranking them with a judge panel, keeping the strongest
//! finalists, and synthesizing a single artifact. The calculator is
//! deterministic: given the same rankings it always keeps the same
//! finalists, and a better judge score never hurts a proposal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters for an assembly step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblySettings {
    /// Judge agents; each receives the full proposal set
    pub judges: Vec<String>,

    /// Agent that merges the finalists into one artifact
    pub synthesizer: String,

    /// Optional continuity validator agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,

    /// Number of lowest-scoring proposals dropped before synthesis
    #[serde(default = "default_drop_bottom")]
    pub drop_bottom: usize,

    /// Maximum synthesizer invocations in the continuity loop
    #[serde(default = "default_max_validation_loops")]
    pub max_validation_loops: usize,
}

fn default_drop_bottom() -> usize {
    2
}

fn default_max_validation_loops() -> usize {
    3
}

/// A candidate artifact produced by a proposer agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Stable proposal id, unique within the run
    pub id: String,

    /// Proposer agent name
    pub agent_name: String,

    /// Proposal text
    pub content: String,
}

/// One judge's scores over the proposal set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeRanking {
    /// Judge agent name
    pub judge_name: String,

    /// Proposal id -> numeric score
    pub scores: BTreeMap<String, f64>,
}

/// Deterministic aggregation over judge scores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatorResult {
    /// Mean judge score per proposal id
    pub mean_scores: BTreeMap<String, f64>,

    /// Proposal ids kept for synthesis, best first
    pub finalists: Vec<String>,

    /// Proposal ids dropped as the bottom of the field
    pub dropped: Vec<String>,
}

/// Verdict from the continuity validator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuityCheck {
    /// Whether the synthesized artifact was accepted
    pub accepted: bool,

    /// Feedback fed back into the synthesizer on rejection
    #[serde(default)]
    pub feedback: String,
}

/// Complete record of one assembly invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyRun {
    /// All proposals, in proposer order
    pub proposals: Vec<Proposal>,

    /// All judge rankings, in judge order
    pub rankings: Vec<JudgeRanking>,

    /// Calculator output
    pub calculator: CalculatorResult,

    /// Final synthesized artifact
    pub synthesis: String,

    /// Number of synthesizer invocations performed
    pub synthesis_attempts: usize,

    /// True when the validator never accepted within the loop bound
    pub continuity_unverified: bool,

    /// Last validator verdict, absent when no validator was configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuity: Option<ContinuityCheck>,
}

/// Aggregate judge scores: mean per proposal, drop the bottom `drop_bottom`.
///
/// Proposals a judge did not score simply do not contribute to that mean; a
/// proposal no judge scored gets 0.0. Ties break on proposal id so the
/// result is a pure function of its inputs. At least one finalist is always
/// kept.
pub fn calculate_finalists(
    proposal_ids: &[String],
    rankings: &[JudgeRanking],
    drop_bottom: usize,
) -> CalculatorResult {
    let mut mean_scores = BTreeMap::new();

    for id in proposal_ids {
        let scores: Vec<f64> = rankings
            .iter()
            .filter_map(|ranking| ranking.scores.get(id).copied())
            .collect();
        let mean = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        mean_scores.insert(id.clone(), mean);
    }

    if proposal_ids.is_empty() {
        return CalculatorResult {
            mean_scores,
            finalists: Vec::new(),
            dropped: Vec::new(),
        };
    }

    let mut ordered: Vec<&String> = proposal_ids.iter().collect();
    ordered.sort_by(|a, b| {
        let score_a = mean_scores.get(*a).copied().unwrap_or(0.0);
        let score_b = mean_scores.get(*b).copied().unwrap_or(0.0);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });

    let keep = ordered.len().saturating_sub(drop_bottom).max(1);
    let finalists: Vec<String> = ordered[..keep].iter().map(|s| (*s).clone()).collect();
    let dropped: Vec<String> = ordered[keep..].iter().map(|s| (*s).clone()).collect();

    CalculatorResult {
        mean_scores,
        finalists,
        dropped,
    }
}
