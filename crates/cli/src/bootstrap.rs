use std::sync::Arc;

use handset_agent::deals::LlmDealGenerator;
use handset_agent::llm::LlmError;
use handset_agent::openai::OpenAiCompatClient;
use handset_agent::runtime::{AgentError, AgentRuntime, RuntimeSettings};
use handset_agent::tools::ToolRegistry;
use handset_agent::GuardrailPolicy;
use handset_core::catalog::InMemoryCatalog;
use handset_core::config::AppConfig;
use thiserror::Error;
use tracing::info;

/// Process-wide handles, built once and shared read-only by every turn.
pub struct Application {
    pub config: AppConfig,
    pub llm: Arc<OpenAiCompatClient>,
    pub registry: Arc<ToolRegistry>,
    pub agent_runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("llm client initialization failed: {0}")]
    Llm(#[source] LlmError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

pub fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        provider = ?config.llm.provider,
        model = %config.llm.model,
        "starting application bootstrap"
    );

    let llm = Arc::new(OpenAiCompatClient::new(&config.llm).map_err(BootstrapError::Llm)?);
    let registry = build_registry(&config, llm.clone());

    let agent_runtime = AgentRuntime::new(
        llm.clone(),
        llm.clone(),
        registry.clone(),
        GuardrailPolicy::new(config.agent.max_tool_rounds),
        RuntimeSettings::from(&config.agent),
    )?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        base_url = %llm.base_url(),
        tools = registry.len(),
        "agent runtime ready"
    );

    Ok(Application { config, llm, registry, agent_runtime })
}

pub fn build_registry(config: &AppConfig, llm: Arc<OpenAiCompatClient>) -> Arc<ToolRegistry> {
    let catalog = Arc::new(InMemoryCatalog::sample(config.catalog.top_k));
    let deals = Arc::new(LlmDealGenerator::new(llm));
    Arc::new(ToolRegistry::new(catalog, deals))
}
