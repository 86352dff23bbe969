//! Tests for the LLM client.

use super::*;

#[test]
fn detects_claude_from_model_name() {
    assert_eq!(detect_tool_format("claude-3-5-sonnet", "https://api.openai.com/v1"), ToolFormat::Claude);
}

#[test]
fn detects_openai_by_default() {
    assert_eq!(detect_tool_format("gpt-4o", "https://api.openai.com/v1"), ToolFormat::OpenAi);
}

#[test]
fn detects_claude_from_api_base() {
    assert_eq!(detect_tool_format("custom-model", "https://api.anthropic.com"), ToolFormat::Claude);
}

#[test]
fn parse_call_mode_is_case_insensitive() {
    assert_eq!(parse_call_mode(Some("Native")), Some(CallMode::Native));
    assert_eq!(parse_call_mode(Some("TEXT")), Some(CallMode::Text));
    assert_eq!(parse_call_mode(Some("garbage")), None);
    assert_eq!(parse_call_mode(None), None);
}

#[test]
fn context_overflow_detection_is_case_insensitive() {
    assert!(is_context_overflow_error("Error: Maximum Context Length exceeded"));
    assert!(!is_context_overflow_error("connection reset"));
}

#[test]
fn truncate_tool_messages_only_touches_tool_role() {
    use crate::types::Message;
    let mut messages = vec![
        Message::user("a".repeat(1000)),
        Message::tool_result("id1", "b".repeat(1000)),
    ];
    truncate_tool_messages(&mut messages, 50);
    assert_eq!(messages[0].content.as_ref().unwrap().len(), 1000);
    assert!(messages[1].content.as_ref().unwrap().len() < 1000);
}
