//! Keyboard tools: literal typing and hotkey chords.

use serde::Deserialize;
use serde_json::json;

use crate::tools::{def, tool};
use crate::types::ToolResult;

#[derive(Deserialize)]
struct TypeArgs {
    text: String,
}

#[derive(Deserialize)]
struct HotkeyArgs {
    keys: Vec<String>,
}

/// True when the text needs clipboard-paste instead of keystroke simulation:
/// non-ASCII content, or embedded newlines/tabs (§4.1).
pub(crate) fn needs_clipboard_paste(text: &str) -> bool {
    !text.is_ascii() || text.contains('\n') || text.contains('\t')
}

pub fn tools() -> Vec<(crate::types::ToolDefinition, crate::tools::Executor)> {
    vec![
        tool(
            def(
                "type",
                "Type literal text into the focused control. Falls back to clipboard paste for non-ASCII or multi-line text",
                json!({ "type": "object", "properties": { "text": { "type": "string" } }, "required": ["text"] }),
            ),
            |args, ctx| async move {
                let a: TypeArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                match ctx.input.type_text(&a.text).await {
                    Ok(()) => {
                        let via = if needs_clipboard_paste(&a.text) { "clipboard paste" } else { "keystrokes" };
                        ToolResult::ok(format!("typed via {via}"))
                    }
                    Err(e) => ToolResult::fail(format!("type failed: {e}")),
                }
            },
        ),
        tool(
            def(
                "hotkey",
                "Press a chord of keys simultaneously, e.g. [\"cmd\", \"c\"]",
                json!({ "type": "object", "properties": { "keys": { "type": "array", "items": { "type": "string" } } }, "required": ["keys"] }),
            ),
            |args, ctx| async move {
                let a: HotkeyArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                match ctx.input.hotkey(&a.keys).await {
                    Ok(()) => ToolResult::ok(format!("pressed {}", a.keys.join("+"))),
                    Err(e) => ToolResult::fail(format!("hotkey failed: {e}")),
                }
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_single_line_does_not_need_paste() {
        assert!(!needs_clipboard_paste("hello world"));
    }

    #[test]
    fn non_ascii_needs_paste() {
        assert!(needs_clipboard_paste("héllo"));
    }

    #[test]
    fn multiline_needs_paste() {
        assert!(needs_clipboard_paste("line one\nline two"));
    }
}
