use handset_core::catalog::{retain_complete_bundles, InMemoryCatalog, ProductCatalog};
use handset_core::config::{AppConfig, LoadOptions};
use handset_core::domain::product::AttributeBundle;
use serde::Serialize;
use tracing::info;

use crate::commands::{current_thread_runtime, CommandResult};
use crate::logging::init_logging;

#[derive(Debug, Serialize)]
struct SearchOutput<'a> {
    command: &'static str,
    status: &'static str,
    query: &'a str,
    top_k: usize,
    results: Vec<AttributeBundle>,
}

pub fn run(query: &str, top_k: Option<usize>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "search",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    if query.trim().is_empty() {
        return CommandResult::failure("search", "invalid_input", "query must not be empty", 4);
    }

    let top_k = top_k.unwrap_or(config.catalog.top_k).max(1);
    let catalog = InMemoryCatalog::sample(top_k);
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "search",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let results = match runtime.block_on(catalog.search(query)) {
        Ok(bundles) => retain_complete_bundles(bundles),
        Err(error) => {
            return CommandResult::failure("search", "catalog", error.to_string(), 5);
        }
    };
    info!(
        event_name = "cli.search.completed",
        correlation_id = "cli",
        result_count = results.len(),
        "catalog search completed"
    );

    CommandResult::document(
        &SearchOutput { command: "search", status: "ok", query, top_k, results },
        false,
    )
}
