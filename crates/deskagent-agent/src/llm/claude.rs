//! Anthropic `/v1/messages` wire format.

use anyhow::{Context, Result};
use serde_json::{json, Value};

use crate::errors::ProviderError;
use crate::types::{ImageInput, ImageSource, Message, Role, ToolCall, ToolDefinition};

use super::{text_mode, CallMode, ChatOptions, ChatReply, LlmClient, Usage};

impl LlmClient {
    pub(super) async fn claude_chat(
        &self,
        messages: &[Message],
        images: &[ImageInput],
        opts: &ChatOptions<'_>,
    ) -> Result<ChatReply> {
        let url = format!("{}/v1/messages", self.api_base.trim_end_matches("/v1"));
        let (system_prompt, claude_messages) = to_claude_messages(messages, images);

        let mut body = json!({
            "model": opts.model,
            "max_tokens": 4096,
            "messages": claude_messages,
        });
        if let Some(system) = system_prompt {
            body["system"] = json!(system);
        }
        if let Some(temp) = opts.temperature {
            body["temperature"] = json!(temp);
        }
        if opts.mode == CallMode::Native && !opts.tools.is_empty() {
            body["tools"] = json!(opts.tools.iter().map(to_claude_tool).collect::<Vec<_>>());
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Claude API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError { status: status.as_u16(), body: text }.into());
        }

        let payload: Value = resp.json().await.context("failed to parse Claude response")?;
        let blocks = payload.get("content").and_then(|c| c.as_array()).cloned().unwrap_or_default();

        let mut text_content = String::new();
        let mut tool_calls = Vec::new();
        for block in &blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                        text_content.push_str(t);
                    }
                }
                Some("tool_use") => {
                    if let (Some(id), Some(name)) =
                        (block.get("id").and_then(|i| i.as_str()), block.get("name").and_then(|n| n.as_str()))
                    {
                        let arguments = block.get("input").cloned().unwrap_or(json!({}));
                        tool_calls.push(ToolCall { id: id.to_string(), name: name.to_string(), arguments });
                    }
                }
                _ => {}
            }
        }

        let usage = payload.get("usage").and_then(|u| {
            let input = u.get("input_tokens")?.as_u64()?;
            let output = u.get("output_tokens")?.as_u64()?;
            Some(Usage { prompt_tokens: input, completion_tokens: output, total_tokens: input + output })
        });

        let content = if text_content.is_empty() { None } else { Some(text_content) };

        match opts.mode {
            CallMode::Native => Ok(ChatReply { content, tool_calls, parse_error: None, usage }),
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

fn to_claude_tool(def: &ToolDefinition) -> Value {
    json!({
        "name": def.name,
        "description": def.description,
        "input_schema": def.parameters,
    })
}

/// Convert our message list into Claude's `{system, messages}` split. Tool
/// results are batched into a single `user` message with `tool_result`
/// content blocks, matching the Claude Messages API's expectation that
/// consecutive tool results share one turn.
fn to_claude_messages(messages: &[Message], images: &[ImageInput]) -> (Option<String>, Vec<Value>) {
    let last_observation_idx = messages.iter().rposition(|m| matches!(m.role, Role::Computer | Role::User));

    let mut system_prompt: Option<String> = None;
    let mut out: Vec<Value> = Vec::new();
    let mut pending_tool_results: Vec<Value> = Vec::new();

    let flush = |out: &mut Vec<Value>, pending: &mut Vec<Value>| {
        if !pending.is_empty() {
            out.push(json!({ "role": "user", "content": std::mem::take(pending) }));
        }
    };

    for (idx, msg) in messages.iter().enumerate() {
        if msg.role != Role::Tool {
            flush(&mut out, &mut pending_tool_results);
        }
        match msg.role {
            Role::System => {
                if let Some(ref c) = msg.content {
                    system_prompt = Some(match system_prompt {
                        Some(existing) => format!("{}\n\n{}", existing, c),
                        None => c.clone(),
                    });
                }
            }
            Role::User | Role::Computer => {
                let label = if msg.role == Role::Computer { "[computer feedback]\n" } else { "" };
                let text = format!("{}{}", label, msg.content.clone().unwrap_or_default());
                let attach = !images.is_empty() && Some(idx) == last_observation_idx;
                if !attach {
                    out.push(json!({ "role": "user", "content": text }));
                } else {
                    let mut parts = vec![json!({ "type": "text", "text": text })];
                    for img in images {
                        if let Some(label) = &img.label {
                            parts.push(json!({ "type": "text", "text": format!("[{}]", label) }));
                        }
                        parts.push(claude_image_block(img));
                    }
                    out.push(json!({ "role": "user", "content": parts }));
                }
            }
            Role::Assistant => {
                let mut blocks = Vec::new();
                if let Some(ref text) = msg.content {
                    if !text.is_empty() {
                        blocks.push(json!({ "type": "text", "text": text }));
                    }
                }
                for tc in &msg.tool_calls {
                    blocks.push(json!({ "type": "tool_use", "id": tc.id, "name": tc.name, "input": tc.arguments }));
                }
                if !blocks.is_empty() {
                    out.push(json!({ "role": "assistant", "content": blocks }));
                }
            }
            Role::Tool => {
                pending_tool_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content.clone().unwrap_or_default(),
                }));
            }
        }
    }
    flush(&mut out, &mut pending_tool_results);
    (system_prompt, out)
}

fn claude_image_block(img: &ImageInput) -> Value {
    match &img.source {
        ImageSource::Url(u) => json!({ "type": "image", "source": { "type": "url", "url": u } }),
        ImageSource::Base64(b64) => {
            json!({ "type": "image", "source": { "type": "base64", "media_type": img.media_type.mime(), "data": b64 } })
        }
        ImageSource::Path(p) => {
            let bytes = std::fs::read(p).unwrap_or_default();
            use base64::Engine;
            let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
            json!({ "type": "image", "source": { "type": "base64", "media_type": img.media_type.mime(), "data": b64 } })
        }
    }
}
