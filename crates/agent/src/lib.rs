//! Agent Runtime - tool-using sales assistant for mobile phones
//!
//! This crate provides the conversational core of the handset assistant:
//! - Threads a per-turn `ConversationState` through a decide/execute loop
//! - Routes oracle tool calls to the catalog search and deal generator
//! - Forces the final reply into a structured `FinalAnswer`
//! - Resolves answer identifiers against the products actually retrieved
//!
//! # Architecture
//!
//! Each turn runs a small state machine:
//! 1. **Deciding** (`runtime`) - the decision oracle sees the history and the
//!    active product context, then replies or requests tools
//! 2. **Executing** (`tools`) - requested tools run, results are appended in
//!    call order and the product context is updated
//! 3. **Formatting** (`formatter`) - a schema-constrained call produces the answer
//! 4. **Done** - the answer is wrapped as the terminal `FinalAnswer` message
//!
//! # Key Types
//!
//! - `AgentRuntime` - Main orchestrator (see `runtime` module)
//! - `DecisionOracle` / `AnswerFormatter` - Pluggable model capabilities
//! - `ToolRegistry` - Name-to-handler table validated at startup
//! - `GuardrailPolicy` - Tool round cap and answer resolution
//!
//! # Safety Principle
//!
//! The model never invents catalog data. Product identifiers it returns are
//! only exposed after they resolve against products a search returned.

pub mod conversation;
pub mod deals;
pub mod formatter;
pub mod guardrails;
pub mod llm;
pub mod message;
pub mod openai;
pub mod runtime;
pub mod state;
pub mod tools;

pub use conversation::ChatTurnRequest;
pub use guardrails::{resolve_answer, GuardrailPolicy};
pub use runtime::{AgentError, AgentRuntime, RuntimeSettings, TurnOutcome};
pub use state::ConversationState;
