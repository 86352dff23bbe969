//! LLM provider: chat-completion client over two wire formats.
//!
//! - **OpenAI-compatible**: `/chat/completions`, native tool-call channel.
//! - **Claude native**: `/v1/messages`, native tool-call channel.
//!
//! Both formats also support a **text mode**, where no `tools` field is sent
//! and the assistant is expected to emit `<Thought>/<Action>` tags or a bare
//! JSON array instead of using the provider's function-call mechanism. Mode
//! is chosen per model via `ToolFormat`/`CallMode` and can be forced through
//! config.

mod claude;
mod openai;
pub mod text_mode;

#[cfg(test)]
mod tests;

use anyhow::Result;
use serde::Deserialize;

use crate::types::{ImageInput, Message, ToolCall, ToolDefinition};

/// Which wire format to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFormat {
    OpenAi,
    Claude,
}

/// Whether tool calls travel in the provider's native channel or are parsed
/// out of plain assistant text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Native,
    Text,
}

/// Detect wire format from the model name or API base URL.
pub fn detect_tool_format(model: &str, api_base: &str) -> ToolFormat {
    let model_lower = model.to_lowercase();
    let base_lower = api_base.to_lowercase();
    if model_lower.starts_with("claude") || base_lower.contains("anthropic") || base_lower.contains("claude") {
        ToolFormat::Claude
    } else {
        ToolFormat::OpenAi
    }
}

/// Parse a forced mode string from config ("native" | "text"); anything else
/// is treated as "no override".
pub fn parse_call_mode(forced: Option<&str>) -> Option<CallMode> {
    match forced {
        Some(s) if s.eq_ignore_ascii_case("native") => Some(CallMode::Native),
        Some(s) if s.eq_ignore_ascii_case("text") => Some(CallMode::Text),
        _ => None,
    }
}

/// One provider reply.
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    /// Set when text-mode parsing failed; `tool_calls` is empty in that case.
    pub parse_error: Option<ParseError>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub raw: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Options for one `chat` call.
pub struct ChatOptions<'a> {
    pub model: &'a str,
    pub mode: CallMode,
    pub tools: &'a [ToolDefinition],
    pub temperature: Option<f64>,
}

/// LLM client supporting both OpenAI and Claude wire formats.
pub struct LlmClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(api_base: &str, api_key: &str) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("failed to build HTTP client");
        Self { http, api_base: api_base.trim_end_matches('/').to_string(), api_key: api_key.to_string() }
    }

    /// Chat completion call, auto-routed to the wire format the model/base imply.
    /// `images` are attached to the most recent message that should carry them
    /// (the agent loop is responsible for only populating this on one message).
    pub async fn chat(&self, messages: &[Message], images: &[ImageInput], opts: &ChatOptions<'_>) -> Result<ChatReply> {
        let format = detect_tool_format(opts.model, &self.api_base);
        match format {
            ToolFormat::Claude => self.claude_chat(messages, images, opts).await,
            ToolFormat::OpenAi => self.openai_chat(messages, images, opts).await,
        }
    }
}

/// Check if an error message indicates a context-window overflow.
pub fn is_context_overflow_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("context_length_exceeded")
        || lower.contains("maximum context length")
        || lower.contains("token limit")
        || lower.contains("too many tokens")
        || lower.contains("context window")
}

/// Truncate tool-result messages in place, to keep the transcript within budget.
pub fn truncate_tool_messages(messages: &mut [Message], max_chars: usize) {
    for msg in messages.iter_mut() {
        if msg.role != crate::types::Role::Tool {
            continue;
        }
        if let Some(ref mut content) = msg.content {
            if content.len() > max_chars {
                let truncated = format!(
                    "{}...\n[truncated: {} chars -> {}]",
                    crate::types::safe_truncate(content, max_chars),
                    content.len(),
                    max_chars
                );
                *content = truncated;
            }
        }
    }
}
