use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use handset_agent::formatter::{answer_from_terminal, FINAL_ANSWER_TOOL};
use handset_agent::llm::{AnswerFormatter, DecisionOracle, LlmError};
use handset_agent::message::{AssistantTurn, ChatMessage, HistoryTurn, ToolCall, ToolResult};
use handset_agent::runtime::AgentError;
use handset_agent::tools::{DealGenerator, ToolRegistry, ToolSpec, NO_DEAL_MESSAGE};
use handset_agent::{AgentRuntime, ChatTurnRequest, GuardrailPolicy, RuntimeSettings};
use handset_core::audit::InMemoryAuditSink;
use handset_core::catalog::{CatalogError, InMemoryCatalog, ProductCatalog};
use handset_core::domain::answer::FinalAnswer;
use handset_core::domain::product::{bundle_id, AttributeBundle, Product, ProductId};
use handset_core::errors::ApplicationError;
use handset_core::fixtures::sample_handsets;
use rust_decimal::Decimal;
use serde_json::json;

#[derive(Default)]
struct ScriptedOracle {
    script: Mutex<VecDeque<Result<AssistantTurn, LlmError>>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    fn new(script: Vec<Result<AssistantTurn, LlmError>>) -> Self {
        Self { script: Mutex::new(script.into()), ..Self::default() }
    }

    fn replies(turns: Vec<AssistantTurn>) -> Self {
        Self::new(turns.into_iter().map(Ok).collect())
    }

    fn calls(&self) -> usize {
        self.prompts.lock().map(|prompts| prompts.len()).unwrap_or_default()
    }

    fn prompt(&self, index: usize) -> Vec<ChatMessage> {
        self.prompts.lock().ok().and_then(|prompts| prompts.get(index).cloned()).unwrap_or_default()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<AssistantTurn, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().ok().and_then(|mut script| script.pop_front());
        next.unwrap_or_else(|| Ok(AssistantTurn::reply("Anything else I can help with?")))
    }
}

/// Repeats the last search it was asked about forever.
struct InsistentOracle;

#[async_trait]
impl DecisionOracle for InsistentOracle {
    async fn decide(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<AssistantTurn, LlmError> {
        let id = format!("call-{}", messages.len());
        Ok(AssistantTurn::calling(vec![search(&id, "Samsung")]))
    }
}

#[derive(Default)]
struct ScriptedFormatter {
    answers: Mutex<VecDeque<FinalAnswer>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedFormatter {
    fn new(answers: Vec<FinalAnswer>) -> Self {
        Self { answers: Mutex::new(answers.into()), ..Self::default() }
    }

    fn calls(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }
}

#[async_trait]
impl AnswerFormatter for ScriptedFormatter {
    async fn format_final(&self, messages: &[ChatMessage]) -> Result<FinalAnswer, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        let next = self.answers.lock().ok().and_then(|mut answers| answers.pop_front());
        next.ok_or_else(|| LlmError::Parsing("no scripted answer".to_string()))
    }
}

struct ScriptedDeals {
    reply: String,
    requests: Mutex<Vec<Vec<ProductId>>>,
}

impl ScriptedDeals {
    fn new(reply: &str) -> Self {
        Self { reply: reply.to_string(), requests: Mutex::new(Vec::new()) }
    }

    fn requests(&self) -> Vec<Vec<ProductId>> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DealGenerator for ScriptedDeals {
    async fn propose_deal(
        &self,
        _context: &str,
        product_ids: &[ProductId],
    ) -> anyhow::Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(product_ids.to_vec());
        }
        Ok(self.reply.clone())
    }
}

const GOOD_DEAL: &str = "{\"heading\": \"Limited Time: 10% off the Galaxy S24 Ultra!\", \
                         \"deal_price\": 103410}";

struct OfflineCatalog;

#[async_trait]
impl ProductCatalog for OfflineCatalog {
    async fn search(&self, _query: &str) -> Result<Vec<AttributeBundle>, CatalogError> {
        Err(CatalogError::Unavailable("vector index offline".to_string()))
    }
}

struct StalledDeals(Duration);

#[async_trait]
impl DealGenerator for StalledDeals {
    async fn propose_deal(
        &self,
        _context: &str,
        _product_ids: &[ProductId],
    ) -> anyhow::Result<String> {
        tokio::time::sleep(self.0).await;
        Ok(GOOD_DEAL.to_string())
    }
}

struct Harness {
    oracle: Arc<ScriptedOracle>,
    formatter: Arc<ScriptedFormatter>,
    deals: Arc<ScriptedDeals>,
    audit: Arc<InMemoryAuditSink>,
    runtime: AgentRuntime,
}

fn harness(oracle: ScriptedOracle, formatter: ScriptedFormatter, deal_reply: &str) -> Harness {
    harness_with(oracle, formatter, deal_reply, GuardrailPolicy::default(), settings())
}

fn harness_with(
    oracle: ScriptedOracle,
    formatter: ScriptedFormatter,
    deal_reply: &str,
    guardrails: GuardrailPolicy,
    settings: RuntimeSettings,
) -> Harness {
    let oracle = Arc::new(oracle);
    let formatter = Arc::new(formatter);
    let deals = Arc::new(ScriptedDeals::new(deal_reply));
    let audit = Arc::new(InMemoryAuditSink::default());
    let registry = Arc::new(ToolRegistry::new(Arc::new(InMemoryCatalog::sample(7)), deals.clone()));
    let runtime =
        match AgentRuntime::new(oracle.clone(), formatter.clone(), registry, guardrails, settings) {
            Ok(runtime) => runtime.with_audit_sink(audit.clone()),
            Err(error) => panic!("runtime should build: {error}"),
        };

    Harness { oracle, formatter, deals, audit, runtime }
}

fn settings() -> RuntimeSettings {
    RuntimeSettings {
        step_timeout: Duration::from_secs(5),
        oracle_retries: 1,
        parallel_tools: true,
    }
}

fn runtime_over(
    oracle: ScriptedOracle,
    formatter: Arc<ScriptedFormatter>,
    catalog: Arc<dyn ProductCatalog>,
    deals: Arc<dyn DealGenerator>,
    settings: RuntimeSettings,
) -> AgentRuntime {
    let registry = Arc::new(ToolRegistry::new(catalog, deals));
    match AgentRuntime::new(
        Arc::new(oracle),
        formatter,
        registry,
        GuardrailPolicy::default(),
        settings,
    ) {
        Ok(runtime) => runtime,
        Err(error) => panic!("runtime should build: {error}"),
    }
}

fn sample_products(wanted: &[&str]) -> Vec<Product> {
    sample_handsets()
        .iter()
        .filter_map(|bundle| Product::from_bundle(bundle).ok())
        .filter(|product| wanted.contains(&product.id.as_str()))
        .collect()
}

fn tool_result(outcome: &handset_agent::TurnOutcome, call_id: &str) -> Option<ToolResult> {
    outcome.state.messages.iter().find_map(|message| match message {
        ChatMessage::Tool(result) if result.call_id == call_id => Some(result.clone()),
        _ => None,
    })
}

fn search(id: &str, query: &str) -> ToolCall {
    ToolCall::new(id, "find_product", json!({ "query": query }))
}

fn deal(id: &str, product_ids: &[&str]) -> ToolCall {
    ToolCall::new(
        id,
        "get_deal",
        json!({ "conversation_context": "customer wants a discount", "product_ids": product_ids }),
    )
}

fn ids(values: &[&str]) -> Vec<ProductId> {
    values.iter().map(|value| ProductId::from(*value)).collect()
}

fn ranked_ids(query: &str) -> Vec<ProductId> {
    let ranked = InMemoryCatalog::sample(7).rank(query);
    ranked.iter().filter_map(bundle_id).map(ProductId::from).collect()
}

fn answer_with(product_ids: &[&str]) -> FinalAnswer {
    FinalAnswer { product_ids: ids(product_ids), ..FinalAnswer::text_only("Here you go.") }
}

async fn run(harness: &Harness, request: ChatTurnRequest) -> handset_agent::TurnOutcome {
    match harness.runtime.handle_turn(request).await {
        Ok(outcome) => outcome,
        Err(error) => panic!("turn should succeed: {error}"),
    }
}

#[tokio::test]
async fn scenario_a_search_sets_context_and_answer_references_results() {
    let harness = harness(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![search("call-1", "Samsung phone")]),
            AssistantTurn::reply("Here are two Samsung phones."),
        ]),
        ScriptedFormatter::new(vec![answer_with(&["mobile_13", "mobile_12"])]),
        GOOD_DEAL,
    );

    let outcome = run(&harness, ChatTurnRequest::new("show me a Samsung phone")).await;

    assert_eq!(outcome.state.product_context_ids, ids(&["mobile_13", "mobile_12"]));
    assert_eq!(outcome.tool_rounds, 1);
    assert!(!outcome.degraded);
    assert!(outcome
        .answer
        .product_ids
        .iter()
        .all(|id| outcome.state.product_context_ids.contains(id)));

    let second_prompt = harness.oracle.prompt(1);
    assert!(second_prompt[0].text().contains("mobile_13, mobile_12"));
    let searched = harness.oracle.prompt(0).len();
    assert_eq!(searched, 2, "system instruction plus the user message");

    let resolved = outcome.resolve();
    let shown: Vec<&str> = resolved.products.iter().map(|product| product.id.as_str()).collect();
    assert_eq!(shown, vec!["mobile_13", "mobile_12"]);
    assert_eq!(resolved.special_deal, None);
}

#[tokio::test]
async fn scenario_b_deal_uses_context_and_keeps_it() {
    let first = harness(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![search("call-1", "Samsung phone")]),
            AssistantTurn::reply("Here are two Samsung phones."),
        ]),
        ScriptedFormatter::new(vec![answer_with(&["mobile_13", "mobile_12"])]),
        GOOD_DEAL,
    );
    let turn_a = run(&first, ChatTurnRequest::new("show me a Samsung phone")).await;

    let deal_answer = FinalAnswer {
        deal_heading: Some("Limited Time: 10% off the Galaxy S24 Ultra!".to_string()),
        deal_price: Some(Decimal::new(103_410, 0)),
        deal_product_ids: ids(&["mobile_13"]),
        ..answer_with(&["mobile_13"])
    };
    let second = harness(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![deal("call-2", &["mobile_13"])]),
            AssistantTurn::reply("Here is a deal on the Galaxy S24 Ultra."),
        ]),
        ScriptedFormatter::new(vec![deal_answer]),
        GOOD_DEAL,
    );
    let request = ChatTurnRequest::new("give me a discount on the first one")
        .with_history(vec![
            HistoryTurn::new("user", "show me a Samsung phone"),
            HistoryTurn::new("agent", turn_a.answer.text.clone()),
        ])
        .carrying(turn_a.context_products());

    let turn_b = run(&second, request).await;

    assert_eq!(second.deals.requests(), vec![ids(&["mobile_13"])]);
    assert_eq!(turn_b.state.product_context_ids, turn_a.state.product_context_ids);

    let resolved = turn_b.resolve();
    let special = match resolved.special_deal {
        Some(special) => special,
        None => panic!("deal should resolve"),
    };
    assert_eq!(special.deal_price, Decimal::new(103_410, 0));
    assert_eq!(special.products_involved[0].id, ProductId::from("mobile_13"));
    assert!(turn_a.state.product_context_ids.contains(&special.products_involved[0].id));
}

#[tokio::test]
async fn scenario_c_greeting_goes_straight_to_formatting() {
    let harness = harness(
        ScriptedOracle::replies(vec![
            AssistantTurn::reply("Hello! Looking for a new phone?"),
            AssistantTurn::calling(vec![search("call-never", "Samsung")]),
        ]),
        ScriptedFormatter::new(vec![FinalAnswer::text_only("Hello! Looking for a new phone?")]),
        GOOD_DEAL,
    );

    let outcome = run(&harness, ChatTurnRequest::new("hello")).await;

    assert_eq!(harness.oracle.calls(), 1, "no second decision after a plain reply");
    assert_eq!(harness.formatter.calls(), 1);
    assert_eq!(outcome.tool_rounds, 0);
    assert!(outcome.state.retrieved_products.is_empty());
    assert!(outcome.answer.product_ids.is_empty());

    let terminal = outcome.state.last_message().cloned().unwrap_or_else(|| ChatMessage::user(""));
    assert_eq!(terminal.tool_calls()[0].name, FINAL_ANSWER_TOOL);
    assert_eq!(terminal.tool_calls()[0].id, "final");
    assert_eq!(answer_from_terminal(&terminal), Some(outcome.answer.clone()));
    assert_eq!(
        harness.audit.event_types(),
        vec!["agent.decision_completed".to_string(), "agent.answer_formatted".to_string()]
    );
}

#[tokio::test]
async fn multi_round_merge_context_and_pairing_properties() {
    let harness = harness(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![search("call-1", "Samsung")]),
            AssistantTurn::calling(vec![search("call-2", "Pixel")]),
            AssistantTurn::calling(vec![deal("call-3", &[]), deal("call-4", &["mobile_09"])]),
            AssistantTurn::reply("Here are the Pixels with a deal."),
        ]),
        ScriptedFormatter::new(vec![answer_with(&["mobile_09"])]),
        GOOD_DEAL,
    );

    let outcome = run(&harness, ChatTurnRequest::new("compare Samsung and Pixel")).await;
    let steps = &outcome.steps;
    let pixel_ids = ranked_ids("Pixel");

    assert_eq!(steps.len(), 3);
    for pair in steps.windows(2) {
        assert!(
            pair[0].retrieved_ids.iter().all(|id| pair[1].retrieved_ids.contains(id)),
            "retrieved products never shrink"
        );
    }
    assert_eq!(steps[0].context_ids, ids(&["mobile_13", "mobile_12"]));
    assert_eq!(steps[1].context_ids, pixel_ids, "search replaces the context");
    assert_eq!(steps[2].context_ids, steps[1].context_ids, "deal keeps the context");
    for step in steps {
        assert_eq!(step.call_ids, step.result_ids);
        assert!(step.context_ids.iter().all(|id| step.retrieved_ids.contains(id)));
    }

    assert_eq!(harness.deals.requests(), vec![pixel_ids.clone(), ids(&["mobile_09"])]);
    assert_pairing(&outcome.state.messages);
}

#[tokio::test]
async fn last_search_in_a_step_sets_context_and_deals_see_prior_context() {
    let harness = harness(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![search("call-1", "Samsung")]),
            AssistantTurn::calling(vec![
                deal("call-2", &[]),
                search("call-3", "Pixel"),
                search("call-4", "iPhone"),
            ]),
            AssistantTurn::reply("done"),
        ]),
        ScriptedFormatter::new(vec![answer_with(&[])]),
        GOOD_DEAL,
    );

    let outcome = run(&harness, ChatTurnRequest::new("show me phones")).await;

    assert_eq!(outcome.state.product_context_ids, ranked_ids("iPhone"));
    assert_eq!(harness.deals.requests(), vec![ids(&["mobile_13", "mobile_12"])]);
    assert_eq!(outcome.steps[1].result_ids, vec!["call-2", "call-3", "call-4"]);
}

#[tokio::test]
async fn sequential_tool_mode_gives_identical_results() {
    let script = || {
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![search("call-1", "Samsung"), search("call-2", "Pixel")]),
            AssistantTurn::reply("done"),
        ])
    };
    let parallel = harness(script(), ScriptedFormatter::new(vec![answer_with(&[])]), GOOD_DEAL);
    let sequential = harness_with(
        script(),
        ScriptedFormatter::new(vec![answer_with(&[])]),
        GOOD_DEAL,
        GuardrailPolicy::default(),
        RuntimeSettings { parallel_tools: false, ..settings() },
    );

    let a = run(&parallel, ChatTurnRequest::new("phones")).await;
    let b = run(&sequential, ChatTurnRequest::new("phones")).await;

    assert_eq!(a.steps[0].result_ids, b.steps[0].result_ids);
    assert_eq!(a.state.product_context_ids, b.state.product_context_ids);
    assert_eq!(a.state.retrieved_products, b.state.retrieved_products);
}

#[tokio::test]
async fn hallucinated_ids_never_reach_resolved_products() {
    let harness = harness(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![search("call-1", "Samsung")]),
            AssistantTurn::reply("done"),
        ]),
        ScriptedFormatter::new(vec![FinalAnswer {
            deal_heading: Some("Phantom deal".to_string()),
            deal_price: Some(Decimal::new(1_000, 0)),
            deal_product_ids: ids(&["mobile_99"]),
            ..answer_with(&["mobile_13", "mobile_99", "mobile_11"])
        }]),
        GOOD_DEAL,
    );

    let outcome = run(&harness, ChatTurnRequest::new("Samsung please")).await;
    let resolved = outcome.resolve();

    assert!(resolved
        .products
        .iter()
        .all(|product| outcome.retrieved_products().contains_key(&product.id)));
    assert_eq!(resolved.products.len(), 1);
    assert_eq!(resolved.special_deal, None);
}

#[tokio::test]
async fn step_cap_degrades_without_formatting() {
    let formatter = Arc::new(ScriptedFormatter::default());
    let audit = Arc::new(InMemoryAuditSink::default());
    let registry = Arc::new(ToolRegistry::new(
        Arc::new(InMemoryCatalog::sample(7)),
        Arc::new(ScriptedDeals::new(GOOD_DEAL)),
    ));
    let runtime = match AgentRuntime::new(
        Arc::new(InsistentOracle),
        formatter.clone(),
        registry,
        GuardrailPolicy::new(2),
        settings(),
    ) {
        Ok(runtime) => runtime.with_audit_sink(audit.clone()),
        Err(error) => panic!("runtime should build: {error}"),
    };

    let outcome = match runtime.handle_turn(ChatTurnRequest::new("Samsung")).await {
        Ok(outcome) => outcome,
        Err(error) => panic!("step cap should degrade, not fail: {error}"),
    };

    assert!(outcome.degraded);
    assert_eq!(outcome.tool_rounds, 2);
    assert!(outcome.answer.text.starts_with("Sorry"));
    assert_eq!(formatter.calls(), 0);
    assert!(!outcome.retrieved_products().is_empty());
    assert!(audit.event_types().contains(&"agent.step_limit_reached".to_string()));
    assert_pairing(&outcome.state.messages);
}

#[tokio::test]
async fn unknown_tool_fails_soft_and_the_oracle_recovers() {
    let harness = harness(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![ToolCall::new("call-1", "find_store", json!({}))]),
            AssistantTurn::reply("I can only help with phones."),
        ]),
        ScriptedFormatter::new(vec![FinalAnswer::text_only("I can only help with phones.")]),
        GOOD_DEAL,
    );

    let outcome = run(&harness, ChatTurnRequest::new("where is your store?")).await;

    let failure = outcome.state.messages.iter().find_map(|message| match message {
        ChatMessage::Tool(result) => Some(result.clone()),
        _ => None,
    });
    assert!(matches!(failure, Some(ref result) if result.is_error && result.call_id == "call-1"));
    assert!(outcome.state.product_context_ids.is_empty());
    assert_eq!(harness.oracle.calls(), 2);
}

#[tokio::test]
async fn unparsable_deal_produces_no_deal_result() {
    let harness = harness(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![deal("call-1", &["mobile_13"])]),
            AssistantTurn::reply("No deal right now."),
        ]),
        ScriptedFormatter::new(vec![FinalAnswer::text_only("No deal right now.")]),
        "Great news, everything is cheap today!",
    );

    let outcome = run(&harness, ChatTurnRequest::new("any discount?")).await;

    let content = outcome.state.messages.iter().find_map(|message| match message {
        ChatMessage::Tool(result) => Some(result.content.clone()),
        _ => None,
    });
    assert_eq!(content.as_deref(), Some(NO_DEAL_MESSAGE));
    assert_eq!(outcome.resolve().special_deal, None);
}

#[tokio::test]
async fn catalog_failure_fails_soft_and_keeps_context() {
    let formatter =
        Arc::new(ScriptedFormatter::new(vec![FinalAnswer::text_only("Search is down.")]));
    let runtime = runtime_over(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![search("call-1", "Pixel")]),
            AssistantTurn::reply("Search is down, but the Galaxy is still on offer."),
        ]),
        formatter.clone(),
        Arc::new(OfflineCatalog),
        Arc::new(ScriptedDeals::new(GOOD_DEAL)),
        settings(),
    );
    let carried = sample_products(&["mobile_13", "mobile_12"]);
    let request = ChatTurnRequest::new("show me a Pixel").carrying(carried);

    let outcome = match runtime.handle_turn(request).await {
        Ok(outcome) => outcome,
        Err(error) => panic!("catalog failure must not fail the turn: {error}"),
    };

    let failure = tool_result(&outcome, "call-1");
    assert!(matches!(failure, Some(ref result) if result.is_error));
    assert!(failure.is_some_and(|result| result.content.contains("vector index offline")));
    assert_eq!(outcome.state.product_context_ids, ids(&["mobile_13", "mobile_12"]));
    assert_eq!(outcome.tool_rounds, 1);
    assert_eq!(formatter.calls(), 1);
}

#[tokio::test]
async fn stalled_deal_times_out_and_the_turn_still_formats() {
    let formatter =
        Arc::new(ScriptedFormatter::new(vec![FinalAnswer::text_only("No deal right now.")]));
    let runtime = runtime_over(
        ScriptedOracle::replies(vec![
            AssistantTurn::calling(vec![deal("call-1", &["mobile_13"])]),
            AssistantTurn::reply("No deal right now."),
        ]),
        formatter.clone(),
        Arc::new(InMemoryCatalog::sample(7)),
        Arc::new(StalledDeals(Duration::from_secs(30))),
        RuntimeSettings {
            step_timeout: Duration::from_secs(1),
            oracle_retries: 0,
            parallel_tools: true,
        },
    );

    let outcome = match runtime.handle_turn(ChatTurnRequest::new("any discount?")).await {
        Ok(outcome) => outcome,
        Err(error) => panic!("tool timeout must not fail the turn: {error}"),
    };

    let result = tool_result(&outcome, "call-1");
    assert!(matches!(result, Some(ref result) if result.is_error));
    assert_eq!(
        result.map(|result| result.content),
        Some("Tool `get_deal` timed out after 1s.".to_string())
    );
    assert_eq!(formatter.calls(), 1);
    assert_eq!(outcome.answer.text, "No deal right now.");
    assert_eq!(outcome.resolve().special_deal, None);
}

#[tokio::test]
async fn oracle_failure_is_retried_once() {
    let harness = harness(
        ScriptedOracle::new(vec![
            Err(LlmError::Network("connection reset".to_string())),
            Ok(AssistantTurn::reply("Hi!")),
        ]),
        ScriptedFormatter::new(vec![FinalAnswer::text_only("Hi!")]),
        GOOD_DEAL,
    );

    let outcome = run(&harness, ChatTurnRequest::new("hi")).await;

    assert_eq!(outcome.answer.text, "Hi!");
    assert_eq!(harness.oracle.calls(), 2);
}

#[tokio::test]
async fn repeated_oracle_failure_fails_the_turn() {
    let harness = harness(
        ScriptedOracle::new(vec![
            Err(LlmError::Network("connection reset".to_string())),
            Err(LlmError::Api { status: 503, message: "overloaded".to_string() }),
        ]),
        ScriptedFormatter::default(),
        GOOD_DEAL,
    );

    let error = harness.runtime.handle_turn(ChatTurnRequest::new("hi")).await.err();

    assert!(matches!(error, Some(AgentError::Oracle { attempts: 2, .. })));
    let mapped = error.map(ApplicationError::from);
    assert!(matches!(mapped, Some(ApplicationError::Integration(_))));
}

#[tokio::test]
async fn auth_failure_is_not_retried() {
    let harness = harness(
        ScriptedOracle::new(vec![Err(LlmError::Auth("bad key".to_string()))]),
        ScriptedFormatter::default(),
        GOOD_DEAL,
    );

    let error = harness.runtime.handle_turn(ChatTurnRequest::new("hi")).await.err();

    assert!(matches!(error, Some(AgentError::Oracle { attempts: 1, .. })));
    assert_eq!(harness.oracle.calls(), 1);
}

#[tokio::test]
async fn slow_oracle_times_out_as_recoverable_error() {
    let oracle =
        ScriptedOracle { delay: Some(Duration::from_secs(10)), ..ScriptedOracle::default() };
    let harness = harness_with(
        oracle,
        ScriptedFormatter::default(),
        GOOD_DEAL,
        GuardrailPolicy::default(),
        RuntimeSettings {
            step_timeout: Duration::from_millis(20),
            oracle_retries: 0,
            parallel_tools: true,
        },
    );

    let error = harness.runtime.handle_turn(ChatTurnRequest::new("hi")).await.err();

    assert!(matches!(error, Some(AgentError::Oracle { source: LlmError::Timeout(_), .. })));
    let mapped = error.map(ApplicationError::from);
    assert!(matches!(mapped, Some(ApplicationError::Timeout(_))));
}

#[tokio::test]
async fn formatter_failure_surfaces_after_retry() {
    let harness = harness(
        ScriptedOracle::replies(vec![AssistantTurn::reply("Hi!")]),
        ScriptedFormatter::default(),
        GOOD_DEAL,
    );

    let error = harness.runtime.handle_turn(ChatTurnRequest::new("hi")).await.err();

    assert!(matches!(error, Some(AgentError::Formatter { attempts: 2, .. })));
    assert_eq!(harness.formatter.calls(), 2);
}

fn assert_pairing(messages: &[ChatMessage]) {
    for (index, message) in messages.iter().enumerate() {
        let calls = message.tool_calls();
        if calls.is_empty() || calls[0].name == FINAL_ANSWER_TOOL {
            continue;
        }
        let results: Vec<&str> = messages[index + 1..]
            .iter()
            .take(calls.len())
            .filter_map(|message| match message {
                ChatMessage::Tool(result) => Some(result.call_id.as_str()),
                _ => None,
            })
            .collect();
        let expected: Vec<&str> = calls.iter().map(|call| call.id.as_str()).collect();
        assert_eq!(results, expected, "tool results follow their calls in order");
    }
}
