//! Task bookkeeping, TODO list, element search, waiting, and loop-control
//! tools (`finished`/`call_user`).

use serde::Deserialize;
use serde_json::json;

use crate::storage::Storage;
use crate::tools::{def, tool};
use crate::types::ToolResult;

#[derive(Deserialize)]
struct TaskArgs {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TodoWriteArgs {
    markdown: String,
}

#[derive(Deserialize)]
struct LocateArgs {
    keyword: String,
    #[serde(default = "default_max_results")]
    max_results: usize,
}

fn default_max_results() -> usize {
    5
}

#[derive(Deserialize)]
struct WaitArgs {
    ms: u64,
}

pub fn tools() -> Vec<(crate::types::ToolDefinition, crate::tools::Executor)> {
    vec![
        tool(
            def(
                "task",
                "Set or clear the current task description shown in future prompts",
                json!({ "type": "object", "properties": { "content": { "type": ["string", "null"] } } }),
            ),
            |args, _ctx| async move {
                let a: TaskArgs = serde_json::from_value(args).unwrap_or(TaskArgs { content: None });
                match a.content {
                    Some(content) => ToolResult::ok_with_data("task set", json!({ "taskSet": true, "taskContent": content })),
                    None => ToolResult::ok_with_data("task cleared", json!({ "taskSet": true, "taskContent": "" })),
                }
            },
        ),
        tool(
            def(
                "todo_write",
                "Persist the current TODO list as markdown checkboxes",
                json!({ "type": "object", "properties": { "markdown": { "type": "string" } }, "required": ["markdown"] }),
            ),
            |args, ctx| async move {
                let a: TodoWriteArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                let storage = Storage::new(ctx.workspace.clone());
                match storage.write_todolist(&a.markdown) {
                    Ok(()) => {
                        let summary = a.markdown.lines().take(3).collect::<Vec<_>>().join(" / ");
                        ToolResult::ok_with_data("todo saved", json!({ "summary": summary }))
                    }
                    Err(e) => ToolResult::fail(format!("failed to write TODO list: {e}")),
                }
            },
        ),
        tool(def("todo_read", "Read the current TODO list", json!({ "type": "object", "properties": {} })), |_args, ctx| async move {
            let storage = Storage::new(ctx.workspace.clone());
            ToolResult::ok(storage.read_todolist())
        }),
        tool(
            def(
                "find_element",
                "Search the accessibility tree for elements matching a keyword",
                json!({
                    "type": "object",
                    "properties": { "keyword": { "type": "string" }, "max_results": { "type": "integer" } },
                    "required": ["keyword"],
                }),
            ),
            |args, ctx| async move {
                let a: LocateArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                let Some(ax) = &ctx.accessibility else {
                    return ToolResult::fail("Accessibility not available");
                };
                match ax.search(&a.keyword, a.max_results).await {
                    Ok(hits) => ToolResult::ok_with_data(format!("found {} element(s)", hits.len()), serde_json::to_value(hits).unwrap_or(json!([]))),
                    Err(e) => ToolResult::fail(format!("search failed: {e}")),
                }
            },
        ),
        tool(
            def(
                "locate",
                "Like find_element, but filters to high-similarity hits and emits normalized [0,1000] coordinates",
                json!({
                    "type": "object",
                    "properties": { "keyword": { "type": "string" }, "max_results": { "type": "integer" } },
                    "required": ["keyword"],
                }),
            ),
            |args, ctx| async move {
                let a: LocateArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                let Some(ax) = &ctx.accessibility else {
                    return ToolResult::fail("Accessibility not available");
                };
                const SIMILARITY_THRESHOLD: f64 = 0.6;
                match ax.search(&a.keyword, a.max_results).await {
                    Ok(hits) => {
                        let hits: Vec<_> = hits
                            .into_iter()
                            .filter(|h| h.similarity >= SIMILARITY_THRESHOLD)
                            .map(|h| {
                                let coord = h.bounds.as_ref().map(|b| {
                                    let cx = b.x + b.width / 2.0;
                                    let cy = b.y + b.height / 2.0;
                                    (
                                        super::normalize(cx as i32, ctx.screen_width),
                                        super::normalize(cy as i32, ctx.screen_height),
                                    )
                                });
                                json!({ "role": h.role, "title": h.title, "similarity": h.similarity, "coordinate": coord })
                            })
                            .collect();
                        ToolResult::ok_with_data(format!("located {} element(s)", hits.len()), json!(hits))
                    }
                    Err(e) => ToolResult::fail(format!("locate failed: {e}")),
                }
            },
        ),
        tool(
            def("wait", "Sleep for the given number of milliseconds", json!({ "type": "object", "properties": { "ms": { "type": "integer" } }, "required": ["ms"] })),
            |args, _ctx| async move {
                let a: WaitArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                tokio::time::sleep(std::time::Duration::from_millis(a.ms)).await;
                ToolResult::ok(format!("waited {}ms", a.ms))
            },
        ),
        tool(def("finished", "Signal that the task is complete and the loop should exit", json!({ "type": "object", "properties": {} })), |_args, _ctx| async move {
            ToolResult::ok_with_data("finished", json!({ "finished": true }))
        }),
        tool(
            def("call_user", "Signal that the agent needs human input before continuing", json!({ "type": "object", "properties": {} })),
            |_args, _ctx| async move { ToolResult::ok_with_data("waiting for user input", json!({ "needUserInput": true })) },
        ),
    ]
}
