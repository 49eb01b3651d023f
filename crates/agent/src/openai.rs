//! Chat-completions adapter for OpenAI-compatible endpoints (OpenAI, the
//! Gemini compatibility layer, Ollama).

use std::time::Duration;

use async_trait::async_trait;
use handset_core::config::LlmConfig;
use handset_core::domain::answer::FinalAnswer;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::formatter::{final_answer_spec, formatter_messages, normalize, FINAL_ANSWER_TOOL};
use crate::llm::{AnswerFormatter, DecisionOracle, LlmClient, LlmError};
use crate::message::{AssistantTurn, ChatMessage, ToolCall};
use crate::tools::ToolSpec;

#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::InvalidRequest(format!("http client: {error}")))?;

        Ok(Self {
            http,
            base_url: config.effective_base_url(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lists models to confirm the endpoint answers and accepts the credentials.
    pub async fn probe(&self) -> Result<(), LlmError> {
        let mut request = self.http.get(format!("{}/models", self.base_url));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }

    /// One completion request. Retries belong to the caller.
    async fn chat(&self, body: &CompletionRequest<'_>) -> Result<WireMessage, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.http.post(&url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let completion: CompletionResponse =
            response.json().await.map_err(|error| LlmError::Parsing(error.to_string()))?;
        debug!(event_name = "llm.completion_received", model = %self.model, "completion received");

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| LlmError::Parsing("response carried no choices".to_string()))
    }

    fn request<'a>(
        &'a self,
        messages: Vec<WireMessage>,
        tools: Option<Vec<WireTool<'a>>>,
        tool_choice: Option<Value>,
    ) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            tools,
            tool_choice,
        }
    }
}

#[async_trait]
impl DecisionOracle for OpenAiCompatClient {
    async fn decide(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, LlmError> {
        let wire_tools = tools.iter().map(WireTool::from).collect::<Vec<_>>();
        let body = self.request(
            messages.iter().map(WireMessage::from).collect(),
            (!wire_tools.is_empty()).then_some(wire_tools),
            None,
        );

        let message = self.chat(&body).await?;
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_tool_call)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AssistantTurn { content: message.content.unwrap_or_default(), tool_calls })
    }
}

#[async_trait]
impl AnswerFormatter for OpenAiCompatClient {
    async fn format_final(&self, messages: &[ChatMessage]) -> Result<FinalAnswer, LlmError> {
        let spec = final_answer_spec();
        let body = self.request(
            formatter_messages(messages).iter().map(WireMessage::from).collect(),
            Some(vec![WireTool::from(&spec)]),
            Some(json!({ "type": "function", "function": { "name": FINAL_ANSWER_TOOL } })),
        );

        let message = self.chat(&body).await?;
        let arguments = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .find(|call| call.function.name == FINAL_ANSWER_TOOL)
            .map(|call| call.function.arguments)
            .or(message.content)
            .ok_or_else(|| LlmError::Parsing("formatter returned no FinalAnswer".to_string()))?;

        let answer: FinalAnswer = serde_json::from_str(&arguments)
            .map_err(|error| LlmError::Parsing(format!("FinalAnswer arguments: {error}")))?;
        Ok(normalize(answer))
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let body = self.request(vec![WireMessage::text("user", prompt)], None, None);
        let message = self.chat(&body).await?;
        Ok(message.content.unwrap_or_default())
    }
}

fn transport_error(error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout(error.to_string())
    } else {
        LlmError::Network(error.to_string())
    }
}

fn status_error(status: StatusCode, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::Auth(body),
        429 => LlmError::RateLimit(body),
        400 | 404 | 422 => LlmError::InvalidRequest(body),
        code => LlmError::Api { status: code, message: body },
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        match message {
            ChatMessage::System { content } => Self::text("system", content),
            ChatMessage::User { content } => Self::text("user", content),
            ChatMessage::Assistant { content, tool_calls } => Self {
                role: "assistant".to_string(),
                content: (!content.is_empty() || tool_calls.is_empty()).then(|| content.clone()),
                tool_calls: (!tool_calls.is_empty())
                    .then(|| tool_calls.iter().map(WireToolCall::from).collect()),
                tool_call_id: None,
            },
            ChatMessage::Tool(result) => Self {
                role: "tool".to_string(),
                content: Some(result.content.clone()),
                tool_calls: None,
                tool_call_id: Some(result.call_id.clone()),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            kind: function_type(),
            function: WireFunctionCall {
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            },
        }
    }
}

impl WireToolCall {
    fn into_tool_call(self) -> Result<ToolCall, LlmError> {
        let id = if self.id.trim().is_empty() {
            format!("call_{}", Uuid::new_v4().simple())
        } else {
            self.id
        };
        let raw = self.function.arguments.trim();
        let arguments = if raw.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(raw).map_err(|error| {
                LlmError::Parsing(format!("arguments of `{}`: {error}", self.function.name))
            })?
        };
        Ok(ToolCall::new(id, self.function.name, arguments))
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolSpec> for WireTool<'a> {
    fn from(spec: &'a ToolSpec) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.parameters,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: WireMessage,
}
