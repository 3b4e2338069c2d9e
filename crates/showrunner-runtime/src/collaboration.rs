//! Collaborative execution
//!
//! Drives two agents through a structured dialogue. Socratic mode iterates
//! idea and critique until the pragmatist's critiques stop changing;
//! roleplay mode runs a fixed-length in-character interview. Turn numbering
//! is contiguous across both speakers and the transcript preserves dialogue
//! order.

use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, warn};

use showrunner_core::collaboration::{
    build_transcript, jaccard_similarity, CollaborationConfig, CollaborationMode,
    CollaborationResult, CollaborationTurn,
};
use showrunner_core::AgentResponse;

use crate::agent::AgentRef;

/// Render parsed content back to prompt text
pub(crate) fn content_to_string(response: &AgentResponse) -> String {
    match response.content {
        Some(Value::String(ref text)) => text.clone(),
        Some(ref other) => other.to_string(),
        None => response.raw_response.clone(),
    }
}

fn prompt_input(prompt: &str) -> HashMap<String, Value> {
    let mut input = HashMap::new();
    input.insert("prompt".to_string(), Value::String(prompt.to_string()));
    input
}

struct Dialogue {
    turns: Vec<CollaborationTurn>,
    total_tokens: usize,
    errors: Vec<String>,
}

impl Dialogue {
    fn new() -> Self {
        Self {
            turns: Vec::new(),
            total_tokens: 0,
            errors: Vec::new(),
        }
    }

    /// Run one turn; returns the response text or None on agent failure
    async fn take_turn(
        &mut self,
        agent: &AgentRef,
        prompt: String,
        reasoning: &str,
    ) -> Option<String> {
        let response = agent.execute(&prompt_input(&prompt)).await;
        let text = content_to_string(&response);
        let succeeded = response.success;

        if !succeeded {
            let message = format!(
                "{} failed during {}: {}",
                agent.name(),
                reasoning,
                response.error.as_deref().unwrap_or("unknown error")
            );
            warn!("{}", message);
            self.errors.push(message);
        }

        self.total_tokens += response.tokens_used;
        self.turns.push(CollaborationTurn {
            turn_number: self.turns.len() + 1,
            agent_name: agent.name().to_string(),
            prompt,
            response: text.clone(),
            reasoning: reasoning.to_string(),
            tokens_used: response.tokens_used,
            execution_time_ms: response.execution_time_ms,
        });

        if succeeded {
            Some(text)
        } else {
            None
        }
    }
}

/// Socratic collaboration: A ideates, B critiques, repeat until B's
/// critiques converge or the iteration cap is hit. A's latest idea is the
/// final output either way.
pub async fn run_socratic(
    agent_a: AgentRef,
    agent_b: AgentRef,
    goal: &str,
    config: &CollaborationConfig,
) -> CollaborationResult {
    let start = Instant::now();
    let mut dialogue = Dialogue::new();
    let mut current_idea = String::new();
    let mut critiques: Vec<String> = Vec::new();

    info!(goal, "starting socratic collaboration");

    for iteration in 0..config.max_iterations {
        let prompt_a = if iteration == 0 {
            format!("Generate a creative solution to: {}", goal)
        } else {
            format!(
                "Refine your idea based on feedback:\n{}",
                critiques.last().map(String::as_str).unwrap_or_default()
            )
        };

        let reasoning = if iteration == 0 { "ideation" } else { "refinement" };
        match dialogue.take_turn(&agent_a, prompt_a, reasoning).await {
            Some(idea) => current_idea = idea,
            None => return finish_socratic(dialogue, current_idea, false, iteration, start),
        }

        let prompt_b = format!(
            "Analyze this idea:\n{}\n\nProvide pragmatic critique.",
            current_idea
        );
        match dialogue.take_turn(&agent_b, prompt_b, "critique").await {
            Some(critique) => critiques.push(critique),
            None => return finish_socratic(dialogue, current_idea, false, iteration + 1, start),
        }

        if critiques.len() >= 2 {
            let similarity = jaccard_similarity(
                &critiques[critiques.len() - 1],
                &critiques[critiques.len() - 2],
            );
            if similarity >= config.convergence_threshold {
                info!(
                    iterations = iteration + 1,
                    similarity, "socratic convergence achieved"
                );
                return finish_socratic(dialogue, current_idea, true, iteration + 1, start);
            }
        }
    }

    info!(
        iterations = config.max_iterations,
        "socratic collaboration hit the iteration cap without convergence"
    );
    finish_socratic(dialogue, current_idea, false, config.max_iterations, start)
}

fn finish_socratic(
    dialogue: Dialogue,
    final_output: String,
    converged: bool,
    iterations: usize,
    start: Instant,
) -> CollaborationResult {
    let transcript = build_transcript(&dialogue.turns);
    let mut insights = HashMap::new();
    insights.insert(
        "refinement_count".to_string(),
        Value::from(count_reasoning(&dialogue.turns, "refinement")),
    );
    insights.insert(
        "critique_count".to_string(),
        Value::from(count_reasoning(&dialogue.turns, "critique")),
    );
    insights.insert("total_turns".to_string(), Value::from(dialogue.turns.len()));

    CollaborationResult {
        success: dialogue.errors.is_empty(),
        mode: CollaborationMode::Socratic,
        final_output,
        convergence_achieved: converged,
        iterations_completed: iterations,
        total_time_ms: start.elapsed().as_millis() as u64,
        total_tokens: dialogue.total_tokens,
        dialogue_transcript: transcript,
        insights,
        turns: dialogue.turns,
        errors: dialogue.errors,
    }
}

/// Roleplay collaboration: B sets the scene, then `max_iterations` rounds of
/// A answering in character and B asking a deepening follow-up. Always
/// `2 * max_iterations + 1` turns; there is no convergence test.
pub async fn run_roleplay(
    agent_a: AgentRef,
    agent_b: AgentRef,
    context: &str,
    character: &str,
    config: &CollaborationConfig,
) -> CollaborationResult {
    let start = Instant::now();
    let mut dialogue = Dialogue::new();

    info!(character, "starting roleplay collaboration");

    let scene_prompt = format!(
        "Set the scene for a roleplay.\nContext: {}\nCharacter: {}",
        context, character
    );
    let Some(mut last_response) = dialogue.take_turn(&agent_b, scene_prompt, "scene_setting").await
    else {
        return finish_roleplay(dialogue, 0, start);
    };

    for iteration in 0..config.max_iterations {
        let prompt_a = format!("Respond in-character as {}:\n{}", character, last_response);
        match dialogue.take_turn(&agent_a, prompt_a, "in_character").await {
            Some(text) => last_response = text,
            None => return finish_roleplay(dialogue, iteration, start),
        }

        let prompt_b = format!(
            "Ask a follow-up to deepen the exploration:\nPrevious: {}",
            last_response
        );
        match dialogue.take_turn(&agent_b, prompt_b, "exploration").await {
            Some(text) => last_response = text,
            None => return finish_roleplay(dialogue, iteration, start),
        }
    }

    info!(
        iterations = config.max_iterations,
        turns = dialogue.turns.len(),
        "roleplay collaboration complete"
    );
    finish_roleplay(dialogue, config.max_iterations, start)
}

fn finish_roleplay(dialogue: Dialogue, iterations: usize, start: Instant) -> CollaborationResult {
    let transcript = build_transcript(&dialogue.turns);
    let mut insights = HashMap::new();
    insights.insert(
        "character_responses".to_string(),
        Value::from(count_reasoning(&dialogue.turns, "in_character")),
    );
    insights.insert(
        "exploration_depth".to_string(),
        Value::from(count_reasoning(&dialogue.turns, "exploration")),
    );
    insights.insert("total_turns".to_string(), Value::from(dialogue.turns.len()));

    let success = dialogue.errors.is_empty();
    CollaborationResult {
        success,
        mode: CollaborationMode::Roleplay,
        final_output: String::new(),
        convergence_achieved: success,
        iterations_completed: iterations,
        total_time_ms: start.elapsed().as_millis() as u64,
        total_tokens: dialogue.total_tokens,
        dialogue_transcript: transcript,
        insights,
        turns: dialogue.turns,
        errors: dialogue.errors,
    }
}

fn count_reasoning(turns: &[CollaborationTurn], reasoning: &str) -> usize {
    turns.iter().filter(|t| t.reasoning == reasoning).count()
}
