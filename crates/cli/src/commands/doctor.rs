use std::sync::Arc;

use handset_agent::openai::OpenAiCompatClient;
use handset_agent::tools::ToolKind;
use handset_core::catalog::{retain_complete_bundles, InMemoryCatalog};
use handset_core::config::{AppConfig, LoadOptions};
use handset_core::fixtures::sample_handsets;
use serde::Serialize;

use crate::bootstrap::build_registry;
use crate::commands::current_thread_runtime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = vec![check_catalog_fixtures()];

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            match OpenAiCompatClient::new(&config.llm) {
                Ok(client) => {
                    let client = Arc::new(client);
                    checks.push(check_tool_registry(&config, client.clone()));
                    checks.push(check_llm_endpoint(&client));
                }
                Err(error) => {
                    let details = format!("llm client could not be built: {error}");
                    checks.push(DoctorCheck::fail("tool_registry", details.clone()));
                    checks.push(DoctorCheck::fail("llm_endpoint", details));
                }
            }
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped("tool_registry"));
            checks.push(DoctorCheck::skipped("llm_endpoint"));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_catalog_fixtures() -> DoctorCheck {
    let fixtures = sample_handsets();
    let total = fixtures.len();
    let complete = retain_complete_bundles(fixtures).len();
    let catalog = InMemoryCatalog::sample(total.max(1));

    if complete == total && !catalog.is_empty() {
        DoctorCheck::pass("catalog_fixtures", format!("{complete} complete product bundles"))
    } else {
        DoctorCheck::fail(
            "catalog_fixtures",
            format!("{} of {total} bundles lack ID, Model Name or Max Price", total - complete),
        )
    }
}

fn check_tool_registry(config: &AppConfig, client: Arc<OpenAiCompatClient>) -> DoctorCheck {
    let registry = build_registry(config, client);
    let advertised = ToolKind::ALL.iter().map(ToolKind::spec).collect::<Vec<_>>();

    match registry.validate(&advertised) {
        Ok(()) => {
            let names = advertised.iter().map(|spec| spec.name.as_str()).collect::<Vec<_>>();
            DoctorCheck::pass("tool_registry", format!("tools resolvable: {}", names.join(", ")))
        }
        Err(error) => DoctorCheck::fail("tool_registry", error.to_string()),
    }
}

fn check_llm_endpoint(client: &OpenAiCompatClient) -> DoctorCheck {
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "llm_endpoint",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    match runtime.block_on(client.probe()) {
        Ok(()) => DoctorCheck::pass(
            "llm_endpoint",
            format!("reachable at `{}` (model `{}`)", client.base_url(), client.model()),
        ),
        Err(error) => DoctorCheck::fail(
            "llm_endpoint",
            format!("probe of `{}` failed: {error}", client.base_url()),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
