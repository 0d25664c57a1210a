//! OpenAI-compatible chat-completions adapter.
//!
//! Translates the internal [`Message`]/[`ToolDefinition`] model into the
//! `/chat/completions` wire format, including tool calling and image
//! content parts for the vision calls made by the analysis pipeline.

use std::time::Duration;

use serde_json::{json, Value};

use rv_domain::chat::{ContentPart, Message, MessageContent, Role, ToolCall};
use rv_domain::config::LlmConfig;
use rv_domain::{Error, Result};

use crate::retry::{classify_reqwest, classify_status, Backoff};
use crate::traits::{ChatRequest, ChatResponse, LlmProvider, Usage};

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
    temperature: f32,
    backoff: Backoff,
}

impl OpenAiProvider {
    /// Build the provider from config. Fails when the API key env var is
    /// unset — a gateway without a model cannot serve turns.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| Error::Config(format!("{} is not set", cfg.api_key_env)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .map_err(classify_reqwest)?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: cfg.model.clone(),
            temperature: cfg.temperature,
            backoff: Backoff::new(3, Duration::from_secs(1)),
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let model = req.model.as_deref().unwrap_or(&self.default_model);
        let mut body = json!({
            "model": model,
            "messages": wire_messages(&req.messages),
            "temperature": req.temperature.unwrap_or(self.temperature),
        });

        if !req.tools.is_empty() {
            body["tools"] = Value::Array(
                req.tools
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
        }
        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if req.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let body = self.build_body(&req);
        let url = format!("{}/chat/completions", self.base_url);

        let raw: Value = self
            .backoff
            .run("llm.chat", || async {
                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(classify_reqwest)?;

                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    return Err(classify_status("openai", status, &text));
                }
                resp.json::<Value>().await.map_err(classify_reqwest)
            })
            .await?;

        parse_response(raw)
    }

    fn provider_id(&self) -> &str {
        "openai"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire conversion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn wire_messages(messages: &[Message]) -> Vec<Value> {
    messages.iter().map(wire_message).collect()
}

fn wire_message(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => {
            // Tool results collapse to role=tool + tool_call_id.
            let (call_id, content) = match &msg.content {
                MessageContent::Parts(parts) => parts
                    .iter()
                    .find_map(|p| match p {
                        ContentPart::ToolResult {
                            tool_call_id,
                            content,
                            ..
                        } => Some((tool_call_id.clone(), content.clone())),
                        _ => None,
                    })
                    .unwrap_or_default(),
                MessageContent::Text(t) => (String::new(), t.clone()),
            };
            json!({ "role": "tool", "tool_call_id": call_id, "content": content })
        }
        Role::Assistant if msg.has_tool_calls() => {
            let tool_calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.call_id,
                        "type": "function",
                        "function": {
                            "name": tc.tool_name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = msg.content.text().unwrap_or_default();
            json!({
                "role": "assistant",
                "content": if content.is_empty() { Value::Null } else { json!(content) },
                "tool_calls": tool_calls,
            })
        }
        _ => {
            let content = match &msg.content {
                MessageContent::Text(t) => json!(t),
                MessageContent::Parts(parts) => Value::Array(
                    parts
                        .iter()
                        .filter_map(|p| match p {
                            ContentPart::Text { text } => {
                                Some(json!({ "type": "text", "text": text }))
                            }
                            ContentPart::Image { url, detail } => Some(json!({
                                "type": "image_url",
                                "image_url": {
                                    "url": url,
                                    "detail": detail.as_deref().unwrap_or("auto"),
                                }
                            })),
                            ContentPart::ToolResult { .. } => None,
                        })
                        .collect(),
                ),
            };
            json!({ "role": msg.role.as_str(), "content": content })
        }
    }
}

fn parse_response(raw: Value) -> Result<ChatResponse> {
    let choice = raw
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| Error::Provider {
            provider: "openai".into(),
            message: "response has no choices".into(),
        })?;

    let message = choice.get("message").cloned().unwrap_or_default();
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let call_id = call
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let function = call.get("function").cloned().unwrap_or_default();
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let raw_args = function
                .get("arguments")
                .and_then(Value::as_str)
                .unwrap_or("{}");
            // Some models emit empty-string or malformed argument payloads;
            // degrade to an empty object so validation produces a tool error
            // instead of a dropped call.
            let arguments = serde_json::from_str(raw_args)
                .unwrap_or_else(|_| Value::Object(Default::default()));
            tool_calls.push(ToolCall {
                call_id,
                tool_name: name,
                arguments,
            });
        }
    }

    let usage = raw.get("usage").map(|u| Usage {
        prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
        completion_tokens: u
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        total_tokens: u.get("total_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
    });

    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
        model: raw
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        finish_reason: choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_domain::chat::ToolDefinition;

    #[test]
    fn tool_result_message_wire_format() {
        let wire = wire_message(&Message::tool_result("call_7", "ok", false));
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_7");
        assert_eq!(wire["content"], "ok");
    }

    #[test]
    fn assistant_tool_calls_serialize_arguments_as_string() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall {
                call_id: "c1".into(),
                tool_name: "read_context".into(),
                arguments: json!({ "key": "user/fiscal" }),
            }],
        );
        let wire = wire_message(&msg);
        assert!(wire["content"].is_null());
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "read_context");
        let args: Value =
            serde_json::from_str(wire["tool_calls"][0]["function"]["arguments"].as_str().unwrap())
                .unwrap();
        assert_eq!(args["key"], "user/fiscal");
    }

    #[test]
    fn image_parts_become_image_url_blocks() {
        let msg = Message::user_parts(vec![
            ContentPart::Text {
                text: "classify".into(),
            },
            ContentPart::Image {
                url: "https://img.test/1.jpg".into(),
                detail: Some("low".into()),
            },
        ]);
        let wire = wire_message(&msg);
        assert_eq!(wire["content"][1]["type"], "image_url");
        assert_eq!(wire["content"][1]["image_url"]["detail"], "low");
    }

    #[test]
    fn parse_response_extracts_tool_calls() {
        let raw = json!({
            "model": "gpt-4o",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "manage_todos", "arguments": "{\"action\":\"list\"}" }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        });
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].tool_name, "manage_todos");
        assert_eq!(resp.tool_calls[0].arguments["action"], "list");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn malformed_tool_arguments_degrade_to_empty_object() {
        let raw = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "x", "arguments": "not json" }
                    }]
                }
            }]
        });
        let resp = parse_response(raw).unwrap();
        assert!(resp.tool_calls[0].arguments.as_object().unwrap().is_empty());
    }
}
