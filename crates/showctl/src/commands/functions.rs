use anyhow::Result;
use tracing::error;

use showrunner_core::ShowrunnerConfig;
use showrunner_llm::FunctionRouter;

use super::{EXIT_BAD_CONFIGURATION, EXIT_SUCCESS};

/// Print the function routing table and provider availability
pub async fn execute(config_path: &str) -> Result<i32> {
    use comfy_table::{presets::UTF8_FULL, Cell, Table};

    let config = match ShowrunnerConfig::from_file(config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };

    let router = match FunctionRouter::from_config(&config) {
        Ok(router) => router,
        Err(err) => {
            error!("{}", err);
            return Ok(EXIT_BAD_CONFIGURATION);
        }
    };

    let mut providers = Table::new();
    providers.load_preset(UTF8_FULL);
    providers.set_header(
        ["Provider", "Kind", "Model", "Status"]
            .iter()
            .map(|h| Cell::new(h).fg(comfy_table::Color::Cyan)),
    );
    for (name, available) in router.provider_availability() {
        let provider = config.provider(&name);
        providers.add_row(vec![
            name,
            provider.map(|p| p.provider_kind.to_string()).unwrap_or_default(),
            provider.map(|p| p.model.clone()).unwrap_or_default(),
            if available { "available" } else { "no credentials" }.to_string(),
        ]);
    }
    println!("{}", providers);

    let mut functions = Table::new();
    functions.load_preset(UTF8_FULL);
    functions.set_header(
        ["Function", "Primary", "Fallback"]
            .iter()
            .map(|h| Cell::new(h).fg(comfy_table::Color::Cyan)),
    );
    for (function, primary, fallback) in router.routes() {
        functions.add_row(vec![function, primary, fallback.unwrap_or_default()]);
    }
    println!("\n{}", functions);

    Ok(EXIT_SUCCESS)
}
