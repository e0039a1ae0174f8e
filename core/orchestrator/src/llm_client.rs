//! HTTP client for an OpenAI-compatible function-calling chat endpoint.
//!
//! One client serves both seams: `ChatModel` for the orchestrator's tool
//! loop and `StructuredModel` for the agents' strict-JSON prompts.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use shared_types::{
    ChatMessage, ChatModel, ChatOutcome, ChatRequest, ChatRole, CompletionRequest,
    LlmProviderConfig, ModelError, StructuredModel, ToolInvocation,
};
use std::time::Duration;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
});

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct HttpLlmClient {
    config: LlmProviderConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmProviderConfig) -> Self {
        Self { config }
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    async fn post(&self, body: Value) -> Result<Value, ModelError> {
        let mut request = HTTP_CLIENT
            .post(self.endpoint())
            .header("Content-Type", "application/json");

        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout(e.to_string())
            } else {
                ModelError::Unavailable(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::Unavailable(format!(
                "provider returned {status}: {text}"
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("body was not JSON: {e}")))
    }

    fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                    ChatRole::Tool => "tool",
                };
                let mut msg = json!({ "role": role, "content": m.content });
                if let Some(call_id) = &m.tool_call_id {
                    msg["tool_call_id"] = json!(call_id);
                }
                if let Some(tool_calls) = &m.tool_calls {
                    msg["tool_calls"] = tool_calls.clone();
                }
                msg
            })
            .collect()
    }
}

#[async_trait]
impl ChatModel for HttpLlmClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, ModelError> {
        let mut body = json!({
            "model": self.config.model_name,
            "messages": Self::wire_messages(&request.messages),
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(
                request
                    .tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
                        })
                    })
                    .collect(),
            );
            body["tool_choice"] = json!("auto");
        }

        let response = self.post(body).await?;
        parse_chat_response(&response)
    }
}

#[async_trait]
impl StructuredModel for HttpLlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ModelError> {
        let mut body = json!({
            "model": self.config.model_name,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });

        if request.strict_json && self.config.strict_json {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let response = self.post(body).await?;
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ModelError::InvalidResponse("no content in response".to_string()))
    }
}

/// Provider-format echo of a batch of tool calls, attached to the assistant
/// message that precedes their results in the conversation.
pub fn to_wire_tool_calls(invocations: &[ToolInvocation]) -> Value {
    Value::Array(
        invocations
            .iter()
            .map(|inv| {
                json!({
                    "id": inv.call_id,
                    "type": "function",
                    "function": {
                        "name": inv.name,
                        "arguments": inv.arguments.to_string(),
                    }
                })
            })
            .collect(),
    )
}

/// Interpret one chat completion: tool calls win over content when both are
/// present, mirroring the function-calling contract.
fn parse_chat_response(response: &Value) -> Result<ChatOutcome, ModelError> {
    let message = &response["choices"][0]["message"];
    if message.is_null() {
        return Err(ModelError::InvalidResponse(
            "response carried no choices".to_string(),
        ));
    }

    if let Some(calls) = message["tool_calls"].as_array() {
        if !calls.is_empty() {
            let mut invocations = Vec::with_capacity(calls.len());
            for call in calls {
                let name = call["function"]["name"]
                    .as_str()
                    .ok_or_else(|| {
                        ModelError::InvalidResponse("tool call without a name".to_string())
                    })?
                    .to_string();
                let call_id = call["id"].as_str().unwrap_or(&name).to_string();
                // Arguments arrive as a JSON-encoded string; a malformed
                // blob becomes an empty object rather than a failed turn.
                let arguments = call["function"]["arguments"]
                    .as_str()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_else(|| json!({}));

                invocations.push(ToolInvocation {
                    call_id,
                    name,
                    arguments,
                });
            }
            return Ok(ChatOutcome::ToolCalls(invocations));
        }
    }

    message["content"]
        .as_str()
        .map(|s| ChatOutcome::Reply(s.to_string()))
        .ok_or_else(|| ModelError::InvalidResponse("no content or tool calls".to_string()))
}
