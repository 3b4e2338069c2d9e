use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use showrunner_core::{PipelineStatus, ShowrunnerConfig};
use showrunner_llm::FunctionRouter;
use showrunner_runtime::WorkflowManifest;

use super::{
    EXIT_BAD_CONFIGURATION, EXIT_CANCELLED, EXIT_NO_PROVIDER, EXIT_STEP_FAILURE, EXIT_SUCCESS,
};

pub async fn execute(
    config_path: &str,
    manifest_path: &str,
    workflow: Option<String>,
    inputs: &[String],
    output_format: &str,
    show_stats: bool,
) -> Result<i32> {
    let config = match ShowrunnerConfig::from_file(config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };

    let router = match FunctionRouter::from_config(&config) {
        Ok(router) => Arc::new(router),
        Err(err) => {
            error!("{}", err);
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };

    if !router.any_available() {
        error!("no provider has credentials available; set the configured API key env vars");
        return Ok(EXIT_NO_PROVIDER);
    }

    let manifest = match WorkflowManifest::from_file(manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => {
            error!("{}", err);
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };

    let workflow_name = match workflow.or_else(|| manifest.workflows.first().map(|w| w.name.clone()))
    {
        Some(name) => name,
        None => {
            error!("manifest defines no workflows");
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };

    let pipeline = match manifest.build_pipeline(Arc::clone(&router), &config.defaults) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!("{}", err);
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };

    let input = parse_inputs(inputs);

    // quiescent cancellation on Ctrl-C: the running step finishes, later
    // steps never start
    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling after the current step");
            cancel.cancel();
        }
    });

    let mut progress = pipeline.subscribe_progress();
    let progress_printer = tokio::spawn(async move {
        while let Some(event) = progress.recv().await {
            if event.step.is_empty() {
                info!(
                    pipeline = %event.pipeline,
                    "progress: {}/{} steps ({:.0}%)",
                    event.completed, event.total, event.percent
                );
            } else {
                info!(
                    pipeline = %event.pipeline,
                    "step '{}' starting ({}/{} done, {:.0}%)",
                    event.step, event.completed, event.total, event.percent
                );
            }
        }
    });

    info!(workflow = %workflow_name, manifest = manifest_path, "running workflow");
    let result = pipeline.run(&workflow_name, input).await;
    progress_printer.abort();

    match output_format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_result(&result),
    }

    if show_stats {
        print_stats(&router);
    }

    Ok(exit_code_for(&result))
}

fn parse_inputs(inputs: &[String]) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    for entry in inputs {
        match entry.split_once('=') {
            Some((key, raw)) => {
                let value = serde_json::from_str(raw)
                    .unwrap_or_else(|_| Value::String(raw.to_string()));
                map.insert(key.trim().to_string(), value);
            }
            None => warn!(entry = %entry, "ignoring input without '='"),
        }
    }
    map
}

fn print_text_result(result: &showrunner_core::PipelineResult<showrunner_core::WorkflowResult>) {
    match result.status {
        PipelineStatus::Completed => {
            let workflow = result.output.as_ref();
            println!("status: completed ({} ms)", result.duration_ms);
            if let Some(workflow) = workflow {
                println!(
                    "steps: {}/{} completed",
                    workflow.steps_completed, workflow.total_steps
                );
                let mut keys: Vec<&String> = workflow.outputs.keys().collect();
                keys.sort();
                for key in keys {
                    let rendered = serde_json::to_string(&workflow.outputs[key])
                        .unwrap_or_else(|_| "<unprintable>".to_string());
                    println!("  {} = {}", key, truncate(&rendered, 200));
                }
            }
        }
        PipelineStatus::Cancelled => {
            println!("status: cancelled ({} ms)", result.duration_ms);
        }
        _ => {
            println!("status: failed ({} ms)", result.duration_ms);
            if let Some(ref error) = result.error {
                println!("error: {}", error);
            }
        }
    }
}

fn print_stats(router: &FunctionRouter) {
    use comfy_table::{presets::UTF8_FULL, Cell, Table};

    let headers = ["Function", "Provider", "Calls", "Errors", "Fallbacks", "Avg (ms)"];

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(headers.iter().map(|h| Cell::new(h).fg(comfy_table::Color::Cyan)));

    for (function, stats) in router.all_stats() {
        table.add_row(vec![
            function,
            stats.provider.clone(),
            stats.call_count.to_string(),
            stats.error_count.to_string(),
            stats.fallback_count.to_string(),
            format!("{:.0}", stats.avg_time_ms()),
        ]);
    }

    println!("\n{}", table);
}

fn exit_code_for(
    result: &showrunner_core::PipelineResult<showrunner_core::WorkflowResult>,
) -> i32 {
    match result.status {
        PipelineStatus::Completed => EXIT_SUCCESS,
        PipelineStatus::Cancelled => EXIT_CANCELLED,
        _ => match result.error {
            Some(ref error) if error.contains("no available provider") => EXIT_NO_PROVIDER,
            Some(ref error) if error.contains("workflow not defined") => EXIT_BAD_CONFIGURATION,
            _ => EXIT_STEP_FAILURE,
        },
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inputs() {
        let inputs = vec![
            "pitch=a noir heist".to_string(),
            "count=3".to_string(),
            "flags={\"fast\": true}".to_string(),
            "broken-entry".to_string(),
        ];
        let map = parse_inputs(&inputs);

        assert_eq!(map["pitch"], Value::String("a noir heist".to_string()));
        assert_eq!(map["count"], Value::from(3));
        assert_eq!(map["flags"]["fast"], Value::Bool(true));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_exit_codes() {
        use showrunner_core::{PipelineResult, WorkflowResult};

        let completed: PipelineResult<WorkflowResult> =
            PipelineResult::completed(WorkflowResult::default(), 5);
        assert_eq!(exit_code_for(&completed), EXIT_SUCCESS);

        let cancelled: PipelineResult<WorkflowResult> = PipelineResult::cancelled(5);
        assert_eq!(exit_code_for(&cancelled), EXIT_CANCELLED);

        let failed: PipelineResult<WorkflowResult> =
            PipelineResult::failed("step 'x' agent 'y' failed: boom", 5);
        assert_eq!(exit_code_for(&failed), EXIT_STEP_FAILURE);

        let no_provider: PipelineResult<WorkflowResult> =
            PipelineResult::failed("no available provider for function 'director'", 5);
        assert_eq!(exit_code_for(&no_provider), EXIT_NO_PROVIDER);
    }
}
