//! Click, drag, and scroll tools.

use serde::Deserialize;
use serde_json::json;

use crate::ports::MouseButton;
use crate::tools::{def, tool, ToolContext};
use crate::types::ToolResult;

use super::denormalize;

#[derive(Deserialize)]
struct CoordinateArgs {
    coordinate: (f64, f64),
}

#[derive(Deserialize)]
struct DragArgs {
    from: (f64, f64),
    to: (f64, f64),
}

#[derive(Deserialize)]
struct ScrollArgs {
    #[serde(default)]
    dx: i32,
    #[serde(default)]
    dy: i32,
}

fn coord_schema(extra: serde_json::Value) -> serde_json::Value {
    let mut props = json!({
        "coordinate": {
            "type": "array",
            "items": { "type": "number" },
            "minItems": 2,
            "maxItems": 2,
            "description": "Normalized [x, y] in [0, 1000] x [0, 1000], (0,0) top-left",
        }
    });
    if let Some(obj) = extra.as_object() {
        props.as_object_mut().unwrap().extend(obj.clone());
    }
    json!({ "type": "object", "properties": props, "required": ["coordinate"] })
}

async fn click_at(ctx: &ToolContext, norm: (f64, f64), button: MouseButton, double: bool) -> ToolResult {
    let x = denormalize(norm.0, ctx.screen_width);
    let y = denormalize(norm.1, ctx.screen_height);

    let pre_snap = if let Some(ax) = &ctx.accessibility {
        ax.capture_state(Some((x, y))).await.ok()
    } else {
        None
    };

    if let Err(e) = ctx.input.mouse_click(x, y, button, double).await {
        return ToolResult::fail(format!("click failed: {e}"));
    }

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let mut post_snap = if let Some(ax) = &ctx.accessibility {
        ax.capture_state(Some((x, y))).await.ok()
    } else {
        None
    };

    if let (Some(pre), Some(post)) = (&pre_snap, &post_snap) {
        let app_or_window_changed =
            pre.focused_application != post.focused_application || pre.windows.len() != post.windows.len();
        if app_or_window_changed {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            post_snap = if let Some(ax) = &ctx.accessibility { ax.capture_state(Some((x, y))).await.ok() } else { None };
        }
    }

    let mut message = match (pre_snap, post_snap) {
        (Some(pre), Some(post)) => {
            let diff = crate::accessibility::diff_state(&pre, &post);
            crate::accessibility::format_diff_for_agent(&diff)
        }
        _ => "clicked (accessibility unavailable)".to_string(),
    };

    if let Some(ax) = &ctx.accessibility {
        const NEARBY_COUNT: usize = 5;
        const NEARBY_DISTANCE: u32 = 50;
        if let Ok(nearby) = ax.nearby_elements(x, y, NEARBY_COUNT, NEARBY_DISTANCE).await {
            if !nearby.is_empty() {
                let list = nearby
                    .iter()
                    .map(|h| format!("{}[{}]", h.role, h.title.as_deref().unwrap_or("")))
                    .collect::<Vec<_>>()
                    .join(", ");
                message.push_str(&format!("\nNearby elements: {list}"));
            }
        }
    }

    ToolResult::ok_with_data(message, json!({ "x": x, "y": y }))
}

pub fn tools() -> Vec<(crate::types::ToolDefinition, crate::tools::Executor)> {
    vec![
        tool(def("click", "Left-click at a normalized screen coordinate", coord_schema(json!({}))), |args, ctx| async move {
            match serde_json::from_value::<CoordinateArgs>(args) {
                Ok(a) => click_at(&ctx, a.coordinate, MouseButton::Left, false).await,
                Err(e) => ToolResult::fail(format!("invalid arguments: {e}")),
            }
        }),
        tool(def("left_double", "Double-click with the left button", coord_schema(json!({}))), |args, ctx| async move {
            match serde_json::from_value::<CoordinateArgs>(args) {
                Ok(a) => click_at(&ctx, a.coordinate, MouseButton::Left, true).await,
                Err(e) => ToolResult::fail(format!("invalid arguments: {e}")),
            }
        }),
        tool(def("right_single", "Right-click at a normalized screen coordinate", coord_schema(json!({}))), |args, ctx| async move {
            match serde_json::from_value::<CoordinateArgs>(args) {
                Ok(a) => click_at(&ctx, a.coordinate, MouseButton::Right, false).await,
                Err(e) => ToolResult::fail(format!("invalid arguments: {e}")),
            }
        }),
        tool(def("middle_click", "Middle-click at a normalized screen coordinate", coord_schema(json!({}))), |args, ctx| async move {
            match serde_json::from_value::<CoordinateArgs>(args) {
                Ok(a) => click_at(&ctx, a.coordinate, MouseButton::Middle, false).await,
                Err(e) => ToolResult::fail(format!("invalid arguments: {e}")),
            }
        }),
        tool(
            def(
                "drag",
                "Drag the mouse from one normalized coordinate to another",
                json!({
                    "type": "object",
                    "properties": {
                        "from": { "type": "array", "items": { "type": "number" }, "minItems": 2, "maxItems": 2 },
                        "to": { "type": "array", "items": { "type": "number" }, "minItems": 2, "maxItems": 2 },
                    },
                    "required": ["from", "to"],
                }),
            ),
            |args, ctx| async move {
                let a: DragArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                let from = (denormalize(a.from.0, ctx.screen_width), denormalize(a.from.1, ctx.screen_height));
                let to = (denormalize(a.to.0, ctx.screen_width), denormalize(a.to.1, ctx.screen_height));
                match ctx.input.mouse_drag(from, to).await {
                    Ok(()) => ToolResult::ok("dragged"),
                    Err(e) => ToolResult::fail(format!("drag failed: {e}")),
                }
            },
        ),
        tool(
            def(
                "scroll",
                "Scroll the focused view by a pixel delta",
                json!({ "type": "object", "properties": { "dx": {"type": "integer"}, "dy": {"type": "integer"} } }),
            ),
            |args, ctx| async move {
                let a: ScrollArgs = serde_json::from_value(args).unwrap_or(ScrollArgs { dx: 0, dy: 0 });
                match ctx.input.scroll(a.dx, a.dy).await {
                    Ok(()) => ToolResult::ok("scrolled"),
                    Err(e) => ToolResult::fail(format!("scroll failed: {e}")),
                }
            },
        ),
    ]
}
