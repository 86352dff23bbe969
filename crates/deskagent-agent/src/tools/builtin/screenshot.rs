//! Screenshot capture and the screen-capture toggle.

use serde::Deserialize;
use serde_json::json;

use crate::tools::{def, tool};
use crate::types::ToolResult;

#[derive(Deserialize)]
struct ScreenArgs {
    enabled: bool,
}

async fn capture(ctx: &crate::tools::ToolContext) -> ToolResult {
    match ctx.screenshot.capture(&ctx.screenshot_dir).await {
        Ok(info) => ToolResult::ok_with_data(
            "captured screenshot",
            json!({
                "path": info.path,
                "screenWidth": info.screen_width,
                "screenHeight": info.screen_height,
                "mediaType": "png",
            }),
        ),
        Err(e) => ToolResult::fail(format!("screenshot failed: {e}")),
    }
}

pub fn tools() -> Vec<(crate::types::ToolDefinition, crate::tools::Executor)> {
    vec![
        tool(def("screenshot", "Capture the primary display, including the mouse cursor", json!({ "type": "object", "properties": {} })), |_args, ctx| async move {
            capture(&ctx).await
        }),
        tool(
            def(
                "take_screenshot",
                "Capture an extra screenshot on demand; queued into the next observation rather than shown immediately",
                json!({ "type": "object", "properties": {} }),
            ),
            |_args, ctx| async move {
                let mut result = capture(&ctx).await;
                if let Some(data) = result.data.as_mut() {
                    data["isToolScreenshot"] = json!(true);
                }
                result
            },
        ),
        tool(
            def(
                "screen",
                "Enable or disable automatic screenshot capture for future steps",
                json!({ "type": "object", "properties": { "enabled": { "type": "boolean" } }, "required": ["enabled"] }),
            ),
            |args, _ctx| async move {
                let a: ScreenArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                ToolResult::ok_with_data(
                    format!("screen capture {}", if a.enabled { "enabled" } else { "disabled" }),
                    json!({ "screenEnabled": a.enabled }),
                )
            },
        ),
    ]
}
