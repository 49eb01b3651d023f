use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use handset_agent::message::HistoryTurn;
use handset_agent::runtime::TurnOutcome;
use handset_agent::ChatTurnRequest;
use handset_core::config::{AppConfig, LoadOptions};
use handset_core::domain::answer::ResolvedAnswer;
use handset_core::domain::product::Product;
use handset_core::errors::ApplicationError;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::bootstrap::bootstrap;
use crate::commands::{current_thread_runtime, CommandResult};
use crate::logging::init_logging;

#[derive(Clone, Debug, Default)]
pub struct ChatArgs {
    pub message: String,
    pub history: Option<PathBuf>,
    pub context: Option<PathBuf>,
    pub conversation_id: Option<String>,
    pub pretty: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatOutput {
    pub command: &'static str,
    pub status: &'static str,
    pub correlation_id: String,
    pub degraded: bool,
    pub tool_rounds: u32,
    #[serde(flatten)]
    pub answer: ResolvedAnswer,
    /// Products in scope for the next turn; feed back with `--context`.
    pub context_products: Vec<Product>,
}

impl From<&TurnOutcome> for ChatOutput {
    fn from(outcome: &TurnOutcome) -> Self {
        Self {
            command: "chat",
            status: "ok",
            correlation_id: outcome.correlation_id.clone(),
            degraded: outcome.degraded,
            tool_rounds: outcome.tool_rounds,
            answer: outcome.resolve(),
            context_products: outcome.context_products(),
        }
    }
}

pub fn run(args: ChatArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    if args.message.trim().is_empty() {
        return CommandResult::failure("chat", "invalid_input", "message must not be empty", 4);
    }
    let history = match args.history.as_deref().map(load_history).transpose() {
        Ok(history) => history.unwrap_or_default(),
        Err(error) => {
            return CommandResult::failure("chat", "invalid_input", format!("{error:#}"), 4);
        }
    };

    let carried = match args.context.as_deref().map(load_context).transpose() {
        Ok(products) => products.unwrap_or_default(),
        Err(error) => {
            return CommandResult::failure("chat", "invalid_input", format!("{error:#}"), 4);
        }
    };

    let app = match bootstrap(config) {
        Ok(app) => app,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("bootstrap failed: {error}"),
                3,
            );
        }
    };
    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let mut request =
        ChatTurnRequest::new(args.message).with_history(history).carrying(carried);
    if let Some(conversation_id) = args.conversation_id {
        request = request.with_conversation_id(conversation_id);
    }
    let correlation_id = Uuid::new_v4().to_string();

    match runtime
        .block_on(app.agent_runtime.handle_turn_with_correlation(request, correlation_id.clone()))
    {
        Ok(outcome) => {
            info!(
                event_name = "cli.chat.completed",
                correlation_id = %outcome.correlation_id,
                degraded = outcome.degraded,
                tool_rounds = outcome.tool_rounds,
                "chat turn completed"
            );
            CommandResult::document(&ChatOutput::from(&outcome), args.pretty)
        }
        Err(agent_error) => {
            error!(
                event_name = "cli.chat.failed",
                correlation_id = %correlation_id,
                error = %agent_error,
                "chat turn failed"
            );
            let interface = ApplicationError::from(agent_error).into_interface(correlation_id);
            CommandResult::failure(
                "chat",
                interface.error_class(),
                format!(
                    "{} (correlation_id: {})",
                    interface.user_message(),
                    interface.correlation_id()
                ),
                5,
            )
        }
    }
}

/// Reads prior turns from a JSON array of `{"role", "content"}` objects.
pub fn load_history(path: &Path) -> anyhow::Result<Vec<HistoryTurn>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read history file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("history file {} is not a JSON turn list", path.display()))
}

/// Reads the `context_products` array printed by a previous `chat` run.
pub fn load_context(path: &Path) -> anyhow::Result<Vec<Product>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read context file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("context file {} is not a product list", path.display()))
}
