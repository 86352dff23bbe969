//! Straightforward file I/O and shell tools: `read_file`, `write_file`,
//! `edit_file`, `grep`, `bash`.

use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;

use crate::tools::{def, tool};
use crate::types::{safe_truncate, ToolResult};

const MAX_READ_BYTES: usize = 64 * 1024;
const MAX_OUTPUT_CHARS: usize = 8_000;

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct EditFileArgs {
    path: String,
    find: String,
    replace: String,
}

#[derive(Deserialize)]
struct GrepArgs {
    pattern: String,
    path: String,
}

#[derive(Deserialize)]
struct BashArgs {
    command: String,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

pub fn tools() -> Vec<(crate::types::ToolDefinition, crate::tools::Executor)> {
    vec![
        tool(
            def(
                "read_file",
                "Read a UTF-8 text file from disk",
                json!({ "type": "object", "properties": { "path": { "type": "string" } }, "required": ["path"] }),
            ),
            |args, _ctx| async move {
                let a: ReadFileArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                match tokio::fs::read_to_string(&a.path).await {
                    Ok(contents) => ToolResult::ok(safe_truncate(&contents, MAX_READ_BYTES)),
                    Err(e) => ToolResult::fail(format!("failed to read {}: {e}", a.path)),
                }
            },
        ),
        tool(
            def(
                "write_file",
                "Write (overwrite) a UTF-8 text file, creating parent directories as needed",
                json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" }, "content": { "type": "string" } },
                    "required": ["path", "content"],
                }),
            ),
            |args, _ctx| async move {
                let a: WriteFileArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                let path = std::path::Path::new(&a.path);
                if let Some(parent) = path.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        return ToolResult::fail(format!("failed to create directories for {}: {e}", a.path));
                    }
                }
                match tokio::fs::write(path, &a.content).await {
                    Ok(()) => ToolResult::ok(format!("wrote {} bytes to {}", a.content.len(), a.path)),
                    Err(e) => ToolResult::fail(format!("failed to write {}: {e}", a.path)),
                }
            },
        ),
        tool(
            def(
                "edit_file",
                "Replace the first occurrence of `find` with `replace` in a file",
                json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" }, "find": { "type": "string" }, "replace": { "type": "string" } },
                    "required": ["path", "find", "replace"],
                }),
            ),
            |args, _ctx| async move {
                let a: EditFileArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                let contents = match tokio::fs::read_to_string(&a.path).await {
                    Ok(c) => c,
                    Err(e) => return ToolResult::fail(format!("failed to read {}: {e}", a.path)),
                };
                let Some(pos) = contents.find(&a.find) else {
                    return ToolResult::fail(format!("pattern not found in {}", a.path));
                };
                let mut updated = String::with_capacity(contents.len());
                updated.push_str(&contents[..pos]);
                updated.push_str(&a.replace);
                updated.push_str(&contents[pos + a.find.len()..]);
                match tokio::fs::write(&a.path, updated).await {
                    Ok(()) => ToolResult::ok(format!("edited {}", a.path)),
                    Err(e) => ToolResult::fail(format!("failed to write {}: {e}", a.path)),
                }
            },
        ),
        tool(
            def(
                "grep",
                "Search a file's lines for a literal substring, returning matching lines with numbers",
                json!({
                    "type": "object",
                    "properties": { "pattern": { "type": "string" }, "path": { "type": "string" } },
                    "required": ["pattern", "path"],
                }),
            ),
            |args, _ctx| async move {
                let a: GrepArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                let contents = match tokio::fs::read_to_string(&a.path).await {
                    Ok(c) => c,
                    Err(e) => return ToolResult::fail(format!("failed to read {}: {e}", a.path)),
                };
                let matches: Vec<String> = contents
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| line.contains(&a.pattern))
                    .map(|(i, line)| format!("{}: {}", i + 1, line))
                    .collect();
                if matches.is_empty() {
                    ToolResult::ok("no matches")
                } else {
                    ToolResult::ok(safe_truncate(&matches.join("\n"), MAX_OUTPUT_CHARS))
                }
            },
        ),
        tool(
            def(
                "bash",
                "Run a shell command and capture its combined stdout/stderr",
                json!({
                    "type": "object",
                    "properties": { "command": { "type": "string" }, "timeout_ms": { "type": "integer" } },
                    "required": ["command"],
                }),
            ),
            |args, _ctx| async move {
                let a: BashArgs = match serde_json::from_value(args) {
                    Ok(a) => a,
                    Err(e) => return ToolResult::fail(format!("invalid arguments: {e}")),
                };
                let run = Command::new("/bin/sh").arg("-c").arg(&a.command).output();
                match tokio::time::timeout(std::time::Duration::from_millis(a.timeout_ms), run).await {
                    Ok(Ok(output)) => {
                        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                        combined.push_str(&String::from_utf8_lossy(&output.stderr));
                        let truncated = safe_truncate(&combined, MAX_OUTPUT_CHARS);
                        if output.status.success() {
                            ToolResult::ok(truncated)
                        } else {
                            ToolResult::fail(format!("exit code {}: {truncated}", output.status.code().unwrap_or(-1)))
                        }
                    }
                    Ok(Err(e)) => ToolResult::fail(format!("failed to spawn command: {e}")),
                    Err(_) => ToolResult::fail(format!("command timed out after {}ms", a.timeout_ms)),
                }
            },
        ),
    ]
}
