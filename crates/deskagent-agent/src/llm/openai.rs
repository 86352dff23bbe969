//! OpenAI-compatible `/chat/completions` wire format.

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::errors::ProviderError;
use crate::types::{ImageInput, ImageSource, Message, Role, ToolCall, ToolDefinition};

use super::{text_mode, CallMode, ChatOptions, ChatReply, LlmClient, Usage};

impl LlmClient {
    pub(super) async fn openai_chat(
        &self,
        messages: &[Message],
        images: &[ImageInput],
        opts: &ChatOptions<'_>,
    ) -> Result<ChatReply> {
        let url = format!("{}/chat/completions", self.api_base);
        let wire_messages = to_openai_messages(messages, images);

        let mut body = json!({
            "model": opts.model,
            "messages": wire_messages,
        });
        if let Some(temp) = opts.temperature {
            body["temperature"] = json!(temp);
        }
        if opts.mode == CallMode::Native && !opts.tools.is_empty() {
            body["tools"] = json!(opts.tools.iter().map(to_openai_tool).collect::<Vec<_>>());
        }

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("OpenAI-compatible API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError { status: status.as_u16(), body: text }.into());
        }

        let payload: Value = resp.json().await.context("failed to parse LLM API response")?;
        let choice = payload
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .context("LLM API response had no choices")?;
        let message = choice.get("message").cloned().unwrap_or(json!({}));
        let content = message.get("content").and_then(|c| c.as_str()).map(str::to_string);
        let usage: Option<Usage> = payload.get("usage").and_then(|u| serde_json::from_value(u.clone()).ok());

        match opts.mode {
            CallMode::Native => {
                let tool_calls = message
                    .get("tool_calls")
                    .and_then(|tc| tc.as_array())
                    .map(|arr| arr.iter().filter_map(parse_openai_tool_call).collect())
                    .unwrap_or_default();
                Ok(ChatReply { content, tool_calls, parse_error: None, usage })
            }
            CallMode::Text => {
                let raw = content.clone().unwrap_or_default();
                match text_mode::parse_text_mode_reply(&raw) {
                    Ok((thought, calls)) => Ok(ChatReply { content: thought, tool_calls: calls, parse_error: None, usage }),
                    Err(e) => Ok(ChatReply {
                        content,
                        tool_calls: Vec::new(),
                        parse_error: Some(super::ParseError { message: e, raw }),
                        usage,
                    }),
                }
            }
        }
    }
}

fn parse_openai_tool_call(v: &Value) -> Option<ToolCall> {
    let id = v.get("id")?.as_str()?.to_string();
    let func = v.get("function")?;
    let name = func.get("name")?.as_str()?.to_string();
    let args_str = func.get("arguments").and_then(|a| a.as_str()).unwrap_or("{}");
    let arguments = serde_json::from_str(args_str).unwrap_or(json!({}));
    Some(ToolCall { id, name, arguments })
}

fn to_openai_tool(def: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": def.name,
            "description": def.description,
            "parameters": def.parameters,
        }
    })
}

/// Convert our message list to OpenAI's wire shape. `images` are attached to
/// the last `computer`/`user` message, matching §4.2's "most recent
/// observation-bearing message only" rule.
fn to_openai_messages(messages: &[Message], images: &[ImageInput]) -> Vec<Value> {
    let last_observation_idx = messages
        .iter()
        .rposition(|m| matches!(m.role, Role::Computer | Role::User));

    messages
        .iter()
        .enumerate()
        .map(|(idx, msg)| {
            let attach_images = !images.is_empty() && Some(idx) == last_observation_idx;
            to_openai_message(msg, if attach_images { images } else { &[] })
        })
        .collect()
}

fn to_openai_message(msg: &Message, images: &[ImageInput]) -> Value {
    match msg.role {
        Role::System => json!({ "role": "system", "content": msg.content.clone().unwrap_or_default() }),
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
            "content": msg.content.clone().unwrap_or_default(),
        }),
        Role::Assistant => {
            let mut obj = json!({ "role": "assistant" });
            if let Some(ref c) = msg.content {
                obj["content"] = json!(c);
            }
            if !msg.tool_calls.is_empty() {
                obj["tool_calls"] = json!(msg
                    .tool_calls
                    .iter()
                    .map(|tc| json!({
                        "id": tc.id,
                        "type": "function",
                        "function": { "name": tc.name, "arguments": tc.arguments.to_string() },
                    }))
                    .collect::<Vec<_>>());
            }
            obj
        }
        Role::User | Role::Computer => {
            let label = if msg.role == Role::Computer { "[computer feedback]\n" } else { "" };
            let text = format!("{}{}", label, msg.content.clone().unwrap_or_default());
            if images.is_empty() {
                json!({ "role": "user", "content": text })
            } else {
                let mut parts = vec![json!({ "type": "text", "text": text })];
                for img in images {
                    if let Some(label) = &img.label {
                        parts.push(json!({ "type": "text", "text": format!("[{}]", label) }));
                    }
                    parts.push(json!({ "type": "image_url", "image_url": { "url": image_data_url(img) } }));
                }
                json!({ "role": "user", "content": parts })
            }
        }
    }
}

fn image_data_url(img: &ImageInput) -> String {
    match &img.source {
        ImageSource::Url(u) => u.clone(),
        ImageSource::Base64(b64) => format!("data:{};base64,{}", img.media_type.mime(), b64),
        ImageSource::Path(p) => {
            let bytes = std::fs::read(p).unwrap_or_default();
            use base64::Engine;
            let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
            format!("data:{};base64,{}", img.media_type.mime(), b64)
        }
    }
}
