use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};

use showrunner_core::ShowrunnerConfig;
use showrunner_llm::FunctionRouter;
use showrunner_runtime::WorkflowManifest;

use super::{EXIT_BAD_CONFIGURATION, EXIT_SUCCESS};

/// Validate the configuration and, when given, a manifest. Nothing is
/// executed; building the pipeline exercises every static check the runtime
/// performs at definition time.
pub async fn execute(config_path: &str, manifest_path: Option<&str>) -> Result<i32> {
    let config = match ShowrunnerConfig::from_file(config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("config invalid: {}", err);
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };
    info!(
        providers = config.providers.len(),
        functions = config.function_mappings.len(),
        "config valid"
    );

    let Some(manifest_path) = manifest_path else {
        println!("config ok");
        return Ok(EXIT_SUCCESS);
    };

    let manifest = match WorkflowManifest::from_file(manifest_path) {
        Ok(manifest) => manifest,
        Err(err) => {
            error!("manifest invalid: {}", err);
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };

    let router = match FunctionRouter::from_config(&config) {
        Ok(router) => Arc::new(router),
        Err(err) => {
            error!("config invalid: {}", err);
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };

    match manifest.build_pipeline(router, &config.defaults) {
        Ok(pipeline) => {
            info!(
                agents = manifest.agents.len(),
                workflows = pipeline.workflow_names().len(),
                "manifest valid"
            );
            println!("config ok");
            println!(
                "manifest ok: {} agents, workflows: {}",
                manifest.agents.len(),
                pipeline.workflow_names().join(", ")
            );
            Ok(EXIT_SUCCESS)
        }
        Err(err) => {
            error!("manifest invalid: {}", err);
            Ok(EXIT_BAD_CONFIGURATION)
        }
    }
}
