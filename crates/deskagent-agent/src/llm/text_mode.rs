//! Text-mode tool-call parsing.
//!
//! When a provider is configured for text mode, no native `tools` field is
//! sent. The assistant is expected to answer with:
//!
//! ```text
//! <Thought>...</Thought>
//! <Action>[ {"name": "click", "arguments": {"coordinate": [10, 20]}} ]</Action>
//! ```
//!
//! or a bare top-level JSON array with the same element shape. Either form
//! may contain `//` or `#` comments, which are stripped before parsing as
//! long as they don't appear inside a quoted string.

use serde::Deserialize;
use serde_json::Value;

use crate::types::ToolCall;

#[derive(Deserialize)]
struct RawAction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Parse a text-mode reply. Returns `(thought, tool_calls)` on success, or an
/// error message describing what went wrong (the caller wraps it into a
/// `ParseError` carrying this message plus the raw payload).
pub fn parse_text_mode_reply(raw: &str) -> Result<(Option<String>, Vec<ToolCall>), String> {
    let thought = extract_tag(raw, "Thought");
    let action_body = extract_tag(raw, "Action").unwrap_or_else(|| raw.trim().to_string());

    if action_body.trim().is_empty() {
        return Ok((thought.or_else(|| Some(raw.trim().to_string())), Vec::new()));
    }

    let cleaned = strip_comments(&action_body);
    let actions: Vec<RawAction> = serde_json::from_str(cleaned.trim())
        .map_err(|e| format!("text-mode action block is not valid JSON: {e}"))?;

    let calls = actions
        .into_iter()
        .enumerate()
        .map(|(i, a)| ToolCall { id: format!("text-{i}"), name: a.name, arguments: a.arguments })
        .collect();

    Ok((thought, calls))
}

fn extract_tag(raw: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = raw.find(&open)? + open.len();
    let end = raw[start..].find(&close)? + start;
    Some(raw[start..end].trim().to_string())
}

/// Strip `//` and `#` line comments, leaving comment-like sequences inside
/// quoted strings untouched.
fn strip_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    let mut in_string = false;
    let mut escape = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '#' => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thought_and_action_tags() {
        let raw = r#"<Thought>clicking the button</Thought>
<Action>[{"name": "click", "arguments": {"coordinate": [10, 20]}}]</Action>"#;
        let (thought, calls) = parse_text_mode_reply(raw).unwrap();
        assert_eq!(thought.as_deref(), Some("clicking the button"));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "click");
    }

    #[test]
    fn parses_bare_json_array_without_tags() {
        let raw = r#"[{"name": "wait", "arguments": {"ms": 100}}]"#;
        let (_, calls) = parse_text_mode_reply(raw).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "wait");
    }

    #[test]
    fn strips_comments_outside_strings_only() {
        let input = r#"[{"name": "click", // comment
"arguments": {"note": "http://example.com # not a comment"}}]"#;
        let cleaned = strip_comments(input);
        assert!(cleaned.contains("http://example.com # not a comment"));
        assert!(!cleaned.contains("// comment"));
    }

    #[test]
    fn malformed_json_surfaces_readable_error() {
        let raw = "<Action>not json at all</Action>";
        let err = parse_text_mode_reply(raw).unwrap_err();
        assert!(err.contains("not valid JSON"));
    }
}
