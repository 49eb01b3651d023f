use async_trait::async_trait;
use handset_core::domain::answer::FinalAnswer;
use thiserror::Error;

use crate::message::{AssistantTurn, ChatMessage};
use crate::tools::ToolSpec;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimit(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("provider error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("could not parse model response: {0}")]
    Parsing(String),
    #[error("model call timed out: {0}")]
    Timeout(String),
}

impl LlmError {
    /// Whether a second attempt can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimit(_) | Self::Timeout(_) | Self::Parsing(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Auth(_) | Self::InvalidRequest(_) => false,
        }
    }
}

/// Chooses between invoking tools and replying directly.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, LlmError>;
}

/// Schema-constrained final answer; never requests tools.
#[async_trait]
pub trait AnswerFormatter: Send + Sync {
    async fn format_final(&self, messages: &[ChatMessage]) -> Result<FinalAnswer, LlmError>;
}

/// Plain prompt completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::LlmError;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(LlmError::Timeout("decide".to_string()).is_retryable());
        assert!(LlmError::Api { status: 503, message: "overloaded".to_string() }.is_retryable());
        assert!(!LlmError::Api { status: 400, message: "bad".to_string() }.is_retryable());
        assert!(!LlmError::Auth("invalid key".to_string()).is_retryable());
    }
}
