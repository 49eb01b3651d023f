use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use handset_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use handset_core::config::AgentConfig;
use handset_core::domain::answer::{FinalAnswer, ResolvedAnswer};
use handset_core::domain::product::{Product, ProductId};
use handset_core::errors::ApplicationError;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::conversation::{decision_messages, ChatTurnRequest};
use crate::formatter::{normalize, terminal_message};
use crate::guardrails::{resolve_answer, GuardrailDecision, GuardrailPolicy};
use crate::llm::{AnswerFormatter, DecisionOracle, LlmError};
use crate::message::{ChatMessage, ToolCall, ToolResult};
use crate::state::{ConversationState, StateUpdate};
use crate::tools::{RegistryError, ToolContext, ToolOutcome, ToolRegistry, ToolSpec};

const ACTOR: &str = "agent_runtime";
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("decision oracle failed after {attempts} attempt(s): {source}")]
    Oracle {
        attempts: u32,
        #[source]
        source: LlmError,
    },
    #[error("answer formatter failed after {attempts} attempt(s): {source}")]
    Formatter {
        attempts: u32,
        #[source]
        source: LlmError,
    },
    #[error("tool registry misconfigured: {0}")]
    Registry(#[from] RegistryError),
}

impl From<AgentError> for ApplicationError {
    fn from(error: AgentError) -> Self {
        match error {
            AgentError::Oracle { source: LlmError::Timeout(_), .. }
            | AgentError::Formatter { source: LlmError::Timeout(_), .. } => {
                ApplicationError::Timeout(error.to_string())
            }
            AgentError::Oracle { .. } | AgentError::Formatter { .. } => {
                ApplicationError::Integration(error.to_string())
            }
            AgentError::Registry(_) => ApplicationError::Configuration(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Bound on each oracle, formatter or tool call.
    pub step_timeout: Duration,
    /// Extra attempts after a retryable oracle or formatter failure.
    pub oracle_retries: u32,
    pub parallel_tools: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { step_timeout: Duration::from_secs(60), oracle_retries: 1, parallel_tools: true }
    }
}

impl From<&AgentConfig> for RuntimeSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            step_timeout: Duration::from_secs(config.step_timeout_secs),
            oracle_retries: config.oracle_retries,
            parallel_tools: config.parallel_tools,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentPhase {
    Deciding,
    Executing,
    Formatting,
    Done(FinalAnswer),
}

/// Next phase after a decision: tools when the message asks for any, otherwise formatting.
pub fn route(message: &ChatMessage) -> AgentPhase {
    if message.requests_tools() {
        AgentPhase::Executing
    } else {
        AgentPhase::Formatting
    }
}

/// Snapshot taken after each tool round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepRecord {
    pub round: u32,
    pub call_ids: Vec<String>,
    pub result_ids: Vec<String>,
    pub retrieved_ids: Vec<ProductId>,
    pub context_ids: Vec<ProductId>,
}

#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub correlation_id: String,
    pub answer: FinalAnswer,
    pub state: ConversationState,
    pub tool_rounds: u32,
    pub degraded: bool,
    pub steps: Vec<StepRecord>,
}

impl TurnOutcome {
    pub fn retrieved_products(&self) -> &BTreeMap<ProductId, Product> {
        &self.state.retrieved_products
    }

    /// Answer with identifiers resolved against this turn's retrieved products.
    pub fn resolve(&self) -> ResolvedAnswer {
        resolve_answer(&self.answer, &self.state.retrieved_products)
    }

    /// Products in context at the end of the turn, for the caller to carry forward.
    pub fn context_products(&self) -> Vec<Product> {
        self.state
            .product_context_ids
            .iter()
            .filter_map(|id| self.state.retrieved_products.get(id).cloned())
            .collect()
    }
}

struct Turn {
    state: ConversationState,
    audit: AuditContext,
    rounds: u32,
    degraded: bool,
    steps: Vec<StepRecord>,
}

impl Turn {
    fn conversation_id(&self) -> &str {
        self.audit.conversation_id.as_deref().unwrap_or("-")
    }

    fn correlation_id(&self) -> &str {
        &self.audit.correlation_id
    }
}

/// Drives one conversation turn through decide, execute and format.
///
/// Shared handles are built once per process; each turn owns its state.
pub struct AgentRuntime {
    oracle: Arc<dyn DecisionOracle>,
    formatter: Arc<dyn AnswerFormatter>,
    tools: Arc<ToolRegistry>,
    tool_specs: Vec<ToolSpec>,
    guardrails: GuardrailPolicy,
    settings: RuntimeSettings,
    audit_sink: Arc<dyn AuditSink>,
}

impl AgentRuntime {
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        formatter: Arc<dyn AnswerFormatter>,
        tools: Arc<ToolRegistry>,
        guardrails: GuardrailPolicy,
        settings: RuntimeSettings,
    ) -> Result<Self, AgentError> {
        let tool_specs = tools.specs();
        tools.validate(&tool_specs)?;

        Ok(Self {
            oracle,
            formatter,
            tools,
            tool_specs,
            guardrails,
            settings,
            audit_sink: Arc::new(NoopAuditSink),
        })
    }

    pub fn with_audit_sink(mut self, audit_sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    pub fn tool_specs(&self) -> &[ToolSpec] {
        &self.tool_specs
    }

    pub fn guardrails(&self) -> &GuardrailPolicy {
        &self.guardrails
    }

    pub async fn handle_turn(&self, request: ChatTurnRequest) -> Result<TurnOutcome, AgentError> {
        self.handle_turn_with_correlation(request, Uuid::new_v4().to_string()).await
    }

    pub async fn handle_turn_with_correlation(
        &self,
        request: ChatTurnRequest,
        correlation_id: String,
    ) -> Result<TurnOutcome, AgentError> {
        let audit = AuditContext::new(request.conversation_id.clone(), correlation_id, ACTOR);
        let mut turn = Turn {
            state: request.into_state(),
            audit,
            rounds: 0,
            degraded: false,
            steps: Vec::new(),
        };

        info!(
            event_name = "agent.turn_started",
            correlation_id = %turn.correlation_id(),
            conversation_id = %turn.conversation_id(),
            history_len = turn.state.messages.len(),
            "conversation turn started"
        );

        let mut phase = AgentPhase::Deciding;
        let answer = loop {
            phase = match phase {
                AgentPhase::Deciding => self.decide(&mut turn).await?,
                AgentPhase::Executing => {
                    self.execute(&mut turn).await;
                    AgentPhase::Deciding
                }
                AgentPhase::Formatting => AgentPhase::Done(self.format(&mut turn).await?),
                AgentPhase::Done(answer) => break answer,
            };
        };

        info!(
            event_name = "agent.turn_completed",
            correlation_id = %turn.correlation_id(),
            conversation_id = %turn.conversation_id(),
            tool_rounds = turn.rounds,
            degraded = turn.degraded,
            retrieved = turn.state.retrieved_products.len(),
            "conversation turn completed"
        );

        Ok(TurnOutcome {
            correlation_id: turn.audit.correlation_id,
            answer,
            state: turn.state,
            tool_rounds: turn.rounds,
            degraded: turn.degraded,
            steps: turn.steps,
        })
    }

    async fn decide(&self, turn: &mut Turn) -> Result<AgentPhase, AgentError> {
        let prompt = decision_messages(&turn.state);
        let decided = self
            .call_with_retry("decision", || self.oracle.decide(&prompt, &self.tool_specs))
            .await
            .map_err(|(attempts, source)| AgentError::Oracle { attempts, source });

        let decision = match decided {
            Ok(decision) => decision,
            Err(error) => {
                self.emit(
                    turn,
                    "agent.decision_completed",
                    AuditCategory::Decision,
                    AuditOutcome::Failed,
                    vec![("error", error.to_string())],
                );
                return Err(error);
            }
        };

        let message = decision.into_message();
        let next = route(&message);
        let requested = message.tool_calls().len();

        info!(
            event_name = "agent.decision_completed",
            correlation_id = %turn.correlation_id(),
            conversation_id = %turn.conversation_id(),
            tool_calls = requested,
            round = turn.rounds,
            "decision oracle responded"
        );
        self.emit(
            turn,
            "agent.decision_completed",
            AuditCategory::Decision,
            AuditOutcome::Success,
            vec![("tool_calls", requested.to_string()), ("round", turn.rounds.to_string())],
        );

        if next == AgentPhase::Executing {
            let verdict = self.guardrails.evaluate_round(turn.rounds);
            if let GuardrailDecision::Degrade { reason_code, fallback_path, .. } = &verdict {
                warn!(
                    event_name = "agent.step_limit_reached",
                    correlation_id = %turn.correlation_id(),
                    conversation_id = %turn.conversation_id(),
                    reason_code = *reason_code,
                    fallback_path = *fallback_path,
                    max_tool_rounds = self.guardrails.max_tool_rounds,
                    "tool round limit reached, ending turn with fallback answer"
                );
                self.emit(
                    turn,
                    "agent.step_limit_reached",
                    AuditCategory::Guardrail,
                    AuditOutcome::Degraded,
                    vec![
                        ("reason_code", (*reason_code).to_string()),
                        ("dropped_tool_calls", requested.to_string()),
                    ],
                );
            }
            if let Some(fallback) = verdict.fallback_answer() {
                turn.degraded = true;
                turn.state.apply(StateUpdate::message(terminal_message(&fallback)));
                return Ok(AgentPhase::Done(fallback));
            }
        }

        turn.state.apply(StateUpdate::message(message));
        Ok(next)
    }

    async fn execute(&self, turn: &mut Turn) {
        let calls: Vec<ToolCall> = turn
            .state
            .last_message()
            .map(|message| message.tool_calls().to_vec())
            .unwrap_or_default();
        let context = ToolContext {
            conversation_context: turn.state.latest_user_text().unwrap_or_default().to_string(),
            product_context_ids: turn.state.product_context_ids.clone(),
        };

        let outcomes = if self.settings.parallel_tools {
            join_all(calls.iter().map(|call| self.run_tool(call, &context))).await
        } else {
            let mut outcomes = Vec::with_capacity(calls.len());
            for call in &calls {
                outcomes.push(self.run_tool(call, &context).await);
            }
            outcomes
        };

        let mut update = StateUpdate::default();
        for outcome in outcomes {
            self.record_tool(turn, &outcome);
            if let Some(context_ids) = outcome.context_update() {
                update.product_context_ids = Some(context_ids);
            }
            let (result, products) = outcome.into_parts();
            update.retrieved_products.extend(products);
            update.messages.push(ChatMessage::Tool(result));
        }

        let result_ids = update
            .messages
            .iter()
            .filter_map(|message| match message {
                ChatMessage::Tool(result) => Some(result.call_id.clone()),
                _ => None,
            })
            .collect();
        turn.state.apply(update);
        turn.rounds += 1;

        if let Err(error) = turn.state.check_context() {
            warn!(
                event_name = "agent.context_inconsistent",
                correlation_id = %turn.correlation_id(),
                error = %error,
                "product context references unknown products"
            );
        }

        turn.steps.push(StepRecord {
            round: turn.rounds,
            call_ids: calls.into_iter().map(|call| call.id).collect(),
            result_ids,
            retrieved_ids: turn.state.retrieved_products.keys().cloned().collect(),
            context_ids: turn.state.product_context_ids.clone(),
        });
    }

    async fn run_tool(&self, call: &ToolCall, context: &ToolContext) -> ToolOutcome {
        match timeout(self.settings.step_timeout, self.tools.execute(call, context)).await {
            Ok(outcome) => outcome,
            Err(_) => ToolOutcome::Failed {
                result: ToolResult::error(
                    call,
                    format!(
                        "Tool `{}` timed out after {}s.",
                        call.name,
                        self.settings.step_timeout.as_secs()
                    ),
                ),
            },
        }
    }

    fn record_tool(&self, turn: &Turn, outcome: &ToolOutcome) {
        let result = outcome.result();
        let audit_outcome =
            if outcome.is_failure() { AuditOutcome::Degraded } else { AuditOutcome::Success };

        info!(
            event_name = "agent.tool_executed",
            correlation_id = %turn.correlation_id(),
            conversation_id = %turn.conversation_id(),
            tool = %result.tool_name,
            call_id = %result.call_id,
            failed = result.is_error,
            "tool call executed"
        );
        self.emit(
            turn,
            "agent.tool_executed",
            AuditCategory::ToolExecution,
            audit_outcome,
            vec![
                ("tool", result.tool_name.clone()),
                ("call_id", result.call_id.clone()),
                ("failed", result.is_error.to_string()),
            ],
        );
    }

    async fn format(&self, turn: &mut Turn) -> Result<FinalAnswer, AgentError> {
        let messages = turn.state.messages.clone();
        let formatted = self
            .call_with_retry("formatting", || self.formatter.format_final(&messages))
            .await
            .map_err(|(attempts, source)| AgentError::Formatter { attempts, source });

        let answer = match formatted {
            Ok(answer) => normalize(answer),
            Err(error) => {
                self.emit(
                    turn,
                    "agent.answer_formatted",
                    AuditCategory::Formatting,
                    AuditOutcome::Failed,
                    vec![("error", error.to_string())],
                );
                return Err(error);
            }
        };

        info!(
            event_name = "agent.answer_formatted",
            correlation_id = %turn.correlation_id(),
            conversation_id = %turn.conversation_id(),
            product_ids = answer.product_ids.len(),
            has_deal = answer.has_deal(),
            "final answer formatted"
        );
        self.emit(
            turn,
            "agent.answer_formatted",
            AuditCategory::Formatting,
            AuditOutcome::Success,
            vec![
                ("product_ids", answer.product_ids.len().to_string()),
                ("has_deal", answer.has_deal().to_string()),
            ],
        );

        turn.state.apply(StateUpdate::message(terminal_message(&answer)));
        Ok(answer)
    }

    /// Runs `call` under the step timeout, retrying retryable failures.
    /// The only retry loop between the runtime and the endpoint.
    async fn call_with_retry<T, F, Fut>(
        &self,
        stage: &'static str,
        mut call: F,
    ) -> Result<T, (u32, LlmError)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let max_attempts = self.settings.oracle_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match timeout(self.settings.step_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(format!(
                    "{stage} exceeded {}s",
                    self.settings.step_timeout.as_secs()
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) if attempt < max_attempts && error.is_retryable() => {
                    warn!(
                        event_name = "agent.llm_retry",
                        stage,
                        attempt,
                        error = %error,
                        "retrying model call"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(error) => return Err((attempt, error)),
            }
        }
    }

    fn emit(
        &self,
        turn: &Turn,
        event_type: &str,
        category: AuditCategory,
        outcome: AuditOutcome,
        metadata: Vec<(&str, String)>,
    ) {
        let event = metadata.into_iter().fold(
            AuditEvent::new(&turn.audit, event_type, category, outcome),
            |event, (key, value)| event.with_metadata(key, value),
        );
        self.audit_sink.emit(event);
    }
}
