//! OpenAI-compatible chat completions provider
//!
//! Covers openai, openrouter, and google (via its OpenAI-compatible
//! endpoint). Tool-use content blocks are translated to the function-call
//! wire shape on the way out and back to `ToolCall`s on the way in.

use crate::provider::{LlmError, LlmProvider, LlmResult};
use crate::types::{coerce_text, ChatRequest, ChatResponse, ContentBlock, MessageContent, ToolCall};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const GOOGLE_OPENAI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub struct OpenAiCompatProvider {
    client: Client,
    api_key: String,
    base_url: String,
    name: String,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            name: name.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn google(api_key: impl Into<String>) -> Self {
        Self::new("google", api_key).with_base_url(GOOGLE_OPENAI_URL)
    }

    fn wire_messages(&self, request: &ChatRequest) -> Vec<Value> {
        let mut out = Vec::new();
        if let Some(system) = &request.system {
            out.push(json!({"role": "system", "content": system}));
        }
        for message in &request.messages {
            match &message.content {
                MessageContent::Text(text) => {
                    out.push(json!({"role": message.role, "content": text}));
                }
                MessageContent::Blocks(blocks) => {
                    let mut text = String::new();
                    let mut tool_calls = Vec::new();
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text: t } => text.push_str(t),
                            ContentBlock::ToolUse { id, name, input } => {
                                tool_calls.push(json!({
                                    "id": id,
                                    "type": "function",
                                    "function": {
                                        "name": name,
                                        "arguments": input.to_string(),
                                    },
                                }));
                            }
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content,
                                ..
                            } => {
                                // Each result is its own tool-role message
                                out.push(json!({
                                    "role": "tool",
                                    "tool_call_id": tool_use_id,
                                    "content": content,
                                }));
                            }
                        }
                    }
                    if !tool_calls.is_empty() {
                        let mut msg = json!({"role": message.role, "tool_calls": tool_calls});
                        if !text.is_empty() {
                            msg["content"] = json!(text);
                        }
                        out.push(msg);
                    } else if !text.is_empty() {
                        out.push(json!({"role": message.role, "content": text}));
                    }
                }
            }
        }
        out
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let mut body = json!({
            "model": request.model,
            "messages": self.wire_messages(&request),
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = Value::Array(
                tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.input_schema,
                            },
                        })
                    })
                    .collect(),
            );
        }

        debug!("{} request: model={}", self.name, request.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("{} error {}: {}", self.name, status, error_text);
            return Err(match status.as_u16() {
                401 => LlmError::AuthFailed(error_text),
                429 => LlmError::RateLimited {
                    retry_after_ms: 60_000,
                },
                _ => LlmError::RequestFailed(format!("{status}: {error_text}")),
            });
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let message = parsed["choices"]
            .get(0)
            .map(|c| &c["message"])
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".into()))?;

        let content = coerce_text(&message["content"]);
        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let name = call["function"]["name"].as_str().unwrap_or_default();
                if name.is_empty() {
                    continue;
                }
                let id = call["id"]
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
                let args = call["function"]["arguments"]
                    .as_str()
                    .and_then(|raw| serde_json::from_str(raw).ok())
                    .unwrap_or_else(|| json!({}));
                tool_calls.push(ToolCall {
                    id,
                    name: name.to_string(),
                    args,
                });
            }
        }

        Ok(ChatResponse {
            content,
            tool_calls,
            stop_reason: parsed["choices"][0]["finish_reason"]
                .as_str()
                .map(String::from),
            usage: None,
        })
    }
}
