use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Failure modes of an LLM call. These surface as degraded behaviour, never
/// as a user-visible error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// Provider unreachable or returned a non-success status.
    Unavailable(String),
    /// Call exceeded its deadline.
    Timeout(String),
    /// Provider answered but the body was not usable.
    InvalidResponse(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Unavailable(msg) => write!(f, "model unavailable: {}", msg),
            ModelError::Timeout(msg) => write!(f, "model timeout: {}", msg),
            ModelError::InvalidResponse(msg) => write!(f, "invalid model response: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

/// Role of one message in a chat exchange.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Set on `Tool` messages: which tool call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on `Assistant` messages that requested tool calls; echoed back to
    /// the provider in wire format on the next loop iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
        }
    }

    /// Assistant message that carries the provider-format tool calls being
    /// answered by subsequent `Tool` messages.
    pub fn assistant_tool_calls(tool_calls: Value) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: String::new(),
            tool_call_id: None,
            tool_calls: Some(tool_calls),
        }
    }
}

/// A tool advertised to the model: name, description, JSON schema of its
/// arguments.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool call requested by the model.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// What a single model turn produced: either a natural-language reply that
/// terminates the loop, or a batch of tool calls to execute.
#[derive(Debug, Clone)]
pub enum ChatOutcome {
    Reply(String),
    ToolCalls(Vec<ToolInvocation>),
}

/// One request to a function-calling chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

/// Seam to a tool-calling chat model. Implemented over HTTP in production
/// and by scripted fakes in tests.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, ModelError>;
}

/// One request for a single structured (strict-JSON) completion, used by the
/// triage and safety-review prompts.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// Ask the provider for strict JSON output.
    pub strict_json: bool,
}

/// Seam to a plain completion used by agent engines. Kept separate from
/// `ChatModel` so agents never see the tool manifest.
#[async_trait]
pub trait StructuredModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError>;
}
