//! Tool-call batch execution (step 13) and round bookkeeping (step 14).

use std::sync::Arc;

use anyhow::Result;

use crate::accessibility::diff_state;
use crate::message::Deliverers;
use crate::ports::AccessibilityBackend;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{EventSink, ImageInput, MediaType, Step, StepOutcome, ToolCall, ToolResult};

use super::helpers::{is_watched_app, multiset_add};
use super::LoopState;

pub struct ToolBatchOutcome {
    /// `(call-description, rendered-result)` pairs in call order, used to
    /// compose the next computer message's "Tool Execution Results" section.
    pub rendered_results: Vec<(String, String)>,
    pub finished: bool,
    pub need_user_input: bool,
}

const CLICK_TOOLS: &[&str] = &["click", "left_double", "right_single", "middle_click"];

#[allow(clippy::too_many_arguments)]
pub async fn execute_tool_batch(
    state: &mut LoopState,
    registry: &ToolRegistry,
    tool_ctx_base: &ToolContext,
    tool_calls: &[ToolCall],
    accessibility: Option<&Arc<dyn AccessibilityBackend>>,
    whitelist: &[String],
    storage: &crate::storage::Storage,
    event_sink: &mut dyn EventSink,
    deliverers: &Deliverers,
    step_delay_ms: u64,
) -> Result<ToolBatchOutcome> {
    state.no_tool_call_count = 0;
    state.last_had_tool_call = true;

    let pre_tool_snap = match accessibility {
        Some(ax) => ax.capture_state(None).await.ok().filter(|s| is_watched_app(whitelist, s.focused_application.as_deref())),
        None => None,
    };

    let mut round_clicks = Vec::new();
    let mut rendered_results = Vec::new();
    let mut finished = false;
    let mut need_user_input = false;

    for call in tool_calls {
        event_sink.on_tool_call(&call.name, &call.arguments);
        let mut ctx = tool_ctx_base.clone();
        ctx.step_count = state.step_count;
        let result = registry.execute(call, ctx).await;
        event_sink.on_tool_result(&call.name, &result);
        if let Some(gui) = &deliverers.gui {
            let _ = gui.deliver("tool", &result.preferred_projection(), &[], std::slice::from_ref(&call.name)).await;
        }

        if CLICK_TOOLS.contains(&call.name.as_str()) {
            if let Some(coord) = extract_coordinate(call) {
                round_clicks.push(coord);
            }
        }

        apply_result_side_effects(state, call, &result);
        if matches!(&result.data, Some(d) if d.get("finished").and_then(|v| v.as_bool()).unwrap_or(false)) {
            finished = true;
        }
        if matches!(&result.data, Some(d) if d.get("needUserInput").and_then(|v| v.as_bool()).unwrap_or(false)) {
            need_user_input = true;
        }

        let outcome = if result.success { StepOutcome::Success } else { StepOutcome::Failed };
        let step = Step { timestamp: chrono::Utc::now().to_rfc3339(), screenshot_path: None, thought: None, tool_call: call.clone(), outcome };
        let _ = storage.append_step(&step);
        if state.recent_steps.len() >= 5 {
            state.recent_steps.pop_front();
        }
        state.recent_steps.push_back(step);

        let call_desc = format!("{}({})", call.name, call.arguments);
        let projection = stripped_success_projection(&result);
        rendered_results.push((call_desc, projection));
    }

    state.round_clicks.push_round(round_clicks);

    if let Some(pre) = pre_tool_snap {
        if let Some(ax) = accessibility {
            if let Ok(post) = ax.capture_state(None).await {
                if is_watched_app(whitelist, post.focused_application.as_deref()) {
                    let diff = diff_state(&pre, &post);
                    for line in &diff.summary {
                        if line != "No significant UI changes detected" {
                            multiset_add(&mut state.ax_tool_diff_added, line);
                        }
                    }
                }
            }
        }
    }

    tokio::time::sleep(std::time::Duration::from_millis(step_delay_ms)).await;

    Ok(ToolBatchOutcome { rendered_results, finished, need_user_input })
}

fn extract_coordinate(call: &ToolCall) -> Option<(f64, f64)> {
    let coord = call.arguments.get("coordinate")?.as_array()?;
    let x = coord.first()?.as_f64()?;
    let y = coord.get(1)?.as_f64()?;
    Some((x, y))
}

/// Side effects the loop reacts to in a tool result's `data` (§4.1/§4.5.2 step 13).
fn apply_result_side_effects(state: &mut LoopState, call: &ToolCall, result: &ToolResult) {
    let Some(data) = &result.data else { return };
    if data.get("isToolScreenshot").and_then(|v| v.as_bool()).unwrap_or(false) {
        if let Some(path) = data.get("path").and_then(|v| v.as_str()) {
            state.pending_tool_screenshots.push(ImageInput {
                source: crate::types::ImageSource::Path(path.to_string()),
                media_type: MediaType::Png,
                label: Some("tool_screenshot".to_string()),
            });
        }
    }
    if let Some(enabled) = data.get("screenEnabled").and_then(|v| v.as_bool()) {
        state.screen_enabled = enabled;
    }
    if data.get("taskSet").and_then(|v| v.as_bool()).unwrap_or(false) {
        if let Some(content) = data.get("taskContent").and_then(|v| v.as_str()) {
            state.current_task = content.to_string();
        }
    }
    if call.name == "todo_write" {
        if let Some(summary) = data.get("summary").and_then(|v| v.as_str()) {
            state.todo_summary = summary.to_string();
        }
    }
}

/// Strip `success` (the model must not trust it) and serialize the rest;
/// substitute `"done"` when there is no content at all (step 13).
fn stripped_success_projection(result: &ToolResult) -> String {
    if result.message.is_none() && result.error.is_none() && result.data.is_none() {
        return "done".to_string();
    }
    let mut obj = serde_json::Map::new();
    if let Some(m) = &result.message {
        obj.insert("message".to_string(), serde_json::Value::String(m.clone()));
    }
    if let Some(e) = &result.error {
        obj.insert("error".to_string(), serde_json::Value::String(e.clone()));
    }
    if let Some(d) = &result.data {
        obj.insert("data".to_string(), d.clone());
    }
    serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_else(|_| "done".to_string())
}
