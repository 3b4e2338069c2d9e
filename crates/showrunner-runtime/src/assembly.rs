//! Assembly pattern execution
//!
//! Proposers fan out first and all complete before any judge runs; every
//! judge sees the identical proposal set. The deterministic calculator keeps
//! the strongest finalists, the synthesizer merges them, and an optional
//! continuity validator can send the synthesis back with feedback a bounded
//! number of times.

use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};

use showrunner_core::assembly::{
    calculate_finalists, AssemblyRun, AssemblySettings, ContinuityCheck, JudgeRanking, Proposal,
};
use showrunner_core::{ShowrunnerError, ShowrunnerResult};

use crate::collaboration::content_to_string;
use crate::pool::AgentPool;

/// Execute the assembly pattern.
///
/// `proposers` come from the step's agent list; judges, synthesizer, and
/// the optional validator come from `settings`. All agents must already be
/// registered in the pool.
pub async fn execute_assembly(
    pool: &AgentPool,
    proposers: &[String],
    settings: &AssemblySettings,
    input: &HashMap<String, Value>,
) -> ShowrunnerResult<AssemblyRun> {
    // Phase 1: proposals. The await here is the barrier that keeps judges
    // from starting before every proposer has finished.
    info!(proposers = proposers.len(), "assembly: collecting proposals");
    let proposal_result = pool.execute_parallel(proposers, input).await;

    let proposals: Vec<Proposal> = proposal_result
        .executions
        .iter()
        .filter(|execution| execution.response.success)
        .enumerate()
        .map(|(index, execution)| Proposal {
            id: format!("p{}", index + 1),
            agent_name: execution.agent_name.clone(),
            content: content_to_string(&execution.response),
        })
        .collect();

    if proposals.is_empty() {
        return Err(ShowrunnerError::provider(
            "assembly",
            "no proposer produced a usable proposal",
        ));
    }

    // Phase 2: judges, each over the full proposal set.
    let mut judge_input = input.clone();
    judge_input.insert(
        "proposals".to_string(),
        Value::Array(
            proposals
                .iter()
                .map(|p| json!({"id": p.id, "agent": p.agent_name, "content": p.content}))
                .collect(),
        ),
    );
    judge_input.insert(
        "proposals_text".to_string(),
        Value::String(render_proposals(&proposals)),
    );

    info!(judges = settings.judges.len(), "assembly: ranking proposals");
    let judge_result = pool.execute_parallel(&settings.judges, &judge_input).await;

    let rankings: Vec<JudgeRanking> = judge_result
        .executions
        .iter()
        .filter(|execution| execution.response.success)
        .filter_map(|execution| {
            let scores = execution
                .response
                .content
                .as_ref()
                .and_then(scores_from_content);
            match scores {
                Some(scores) => Some(JudgeRanking {
                    judge_name: execution.agent_name.clone(),
                    scores,
                }),
                None => {
                    warn!(judge = %execution.agent_name, "judge produced no usable scores");
                    None
                }
            }
        })
        .collect();

    if rankings.is_empty() {
        return Err(ShowrunnerError::provider(
            "assembly",
            "no judge produced a usable ranking",
        ));
    }

    // Phase 3: deterministic calculator.
    let proposal_ids: Vec<String> = proposals.iter().map(|p| p.id.clone()).collect();
    let calculator = calculate_finalists(&proposal_ids, &rankings, settings.drop_bottom);
    info!(
        finalists = calculator.finalists.len(),
        dropped = calculator.dropped.len(),
        "assembly: calculator complete"
    );

    // Phase 4: synthesis, with the optional continuity loop. The base input
    // is fixed; only the validator feedback varies across retries.
    let finalists: Vec<&Proposal> = calculator
        .finalists
        .iter()
        .filter_map(|id| proposals.iter().find(|p| &p.id == id))
        .collect();

    let mut synth_input = input.clone();
    synth_input.insert(
        "finalists".to_string(),
        Value::Array(
            finalists
                .iter()
                .map(|p| json!({"id": p.id, "content": p.content}))
                .collect(),
        ),
    );
    synth_input.insert(
        "finalists_text".to_string(),
        Value::String(
            finalists
                .iter()
                .map(|p| format!("## {}\n{}", p.id, p.content))
                .collect::<Vec<_>>()
                .join("\n\n"),
        ),
    );
    // Present from the first attempt so synthesizer templates can always
    // reference it; rejections overwrite it with real feedback.
    synth_input.insert("validator_feedback".to_string(), Value::String(String::new()));

    let synthesizer = pool.get(&settings.synthesizer).ok_or_else(|| {
        ShowrunnerError::config(format!(
            "synthesizer agent '{}' not registered",
            settings.synthesizer
        ))
    })?;
    let validator = match settings.validator {
        Some(ref name) => Some(pool.get(name).ok_or_else(|| {
            ShowrunnerError::config(format!("validator agent '{}' not registered", name))
        })?),
        None => None,
    };

    let max_attempts = if validator.is_some() {
        settings.max_validation_loops.max(1)
    } else {
        1
    };

    let mut synthesis = String::new();
    let mut attempts = 0;
    let mut last_check: Option<ContinuityCheck> = None;
    let mut verified = validator.is_none();

    for attempt in 1..=max_attempts {
        attempts = attempt;
        let mut attempt_input = synth_input.clone();
        if let Some(ref check) = last_check {
            attempt_input.insert(
                "validator_feedback".to_string(),
                Value::String(check.feedback.clone()),
            );
        }

        let response = synthesizer.execute(&attempt_input).await;
        if !response.success {
            return Err(ShowrunnerError::provider(
                "assembly",
                format!(
                    "synthesizer failed on attempt {}: {}",
                    attempt,
                    response.error.as_deref().unwrap_or("unknown error")
                ),
            ));
        }
        synthesis = content_to_string(&response);

        let Some(ref validator) = validator else {
            break;
        };

        let mut validate_input = input.clone();
        validate_input.insert("synthesis".to_string(), Value::String(synthesis.clone()));
        let verdict = validator.execute(&validate_input).await;

        let Some(check) = verdict.content.as_ref().and_then(check_from_content) else {
            warn!(
                attempt,
                "continuity validator produced no usable verdict; synthesis left unverified"
            );
            last_check = None;
            break;
        };

        if check.accepted {
            info!(attempt, "assembly: continuity validated");
            last_check = Some(check);
            verified = true;
            break;
        }

        info!(attempt, feedback = %check.feedback, "assembly: continuity rejected");
        last_check = Some(check);
    }

    Ok(AssemblyRun {
        proposals,
        rankings,
        calculator,
        synthesis,
        synthesis_attempts: attempts,
        continuity_unverified: !verified,
        continuity: last_check,
    })
}

fn render_proposals(proposals: &[Proposal]) -> String {
    proposals
        .iter()
        .map(|p| format!("## Proposal {} (by {})\n{}", p.id, p.agent_name, p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn scores_from_content(content: &Value) -> Option<std::collections::BTreeMap<String, f64>> {
    let object = content
        .get("scores")
        .and_then(Value::as_object)
        .or_else(|| content.as_object())?;

    let scores: std::collections::BTreeMap<String, f64> = object
        .iter()
        .filter_map(|(key, value)| value.as_f64().map(|n| (key.clone(), n)))
        .collect();

    if scores.is_empty() {
        None
    } else {
        Some(scores)
    }
}

fn check_from_content(content: &Value) -> Option<ContinuityCheck> {
    let accepted = content
        .get("accepted")
        .or_else(|| content.get("approved"))
        .and_then(Value::as_bool)?;
    let feedback = content
        .get("feedback")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(ContinuityCheck { accepted, feedback })
}
