//! Core data model: conversation messages, tool contracts, queued/outbound
//! messages, accessibility snapshots/diffs, and step audit records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// UTF-8 safe truncation: never splits a multi-byte character.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Break `s` into chunks of at most `max_bytes`, respecting char boundaries.
pub fn chunk_str(s: &str, max_bytes: usize) -> Vec<&str> {
    if max_bytes == 0 || s.is_empty() {
        return vec![s];
    }
    let mut chunks = Vec::new();
    let mut rest = s;
    while rest.len() > max_bytes {
        let mut end = max_bytes;
        while end > 0 && !rest.is_char_boundary(end) {
            end -= 1;
        }
        chunks.push(&rest[..end]);
        rest = &rest[end..];
    }
    chunks.push(rest);
    chunks
}

// ─── Conversation ───────────────────────────────────────────────────────────

/// Conversation role. `Computer` is distinct from `User` so the LLM can tell
/// machine-generated observation feedback apart from human input, even when
/// the wire format collapses both onto a single transport role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Computer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInput {
    pub source: ImageSource,
    pub media_type: MediaType,
    /// Short label rendered immediately before the image, e.g. "screen".
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ImageSource {
    Path(String),
    Base64(String),
    Url(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl MediaType {
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Webp => "image/webp",
            MediaType::Gif => "image/gif",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON-schema-shaped parameter tree (object with `properties` + `required`).
    pub parameters: Value,
}

/// The outcome of executing one `ToolCall`.
///
/// `success` is advisory only — the agent loop treats observable evidence
/// (accessibility diff, the next screenshot) as the authoritative signal of
/// whether a tool call actually achieved anything.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), ..Default::default() }
    }

    pub fn ok_with_data(message: impl Into<String>, data: Value) -> Self {
        Self { success: true, message: Some(message.into()), data: Some(data), ..Default::default() }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), ..Default::default() }
    }

    /// Project the result to the string the agent loop shows the LLM: prefer
    /// `message`, else `error`, else pretty-printed `data`, else `"done"`.
    pub fn preferred_projection(&self) -> String {
        if let Some(ref m) = self.message {
            return m.clone();
        }
        if let Some(ref e) = self.error {
            return e.clone();
        }
        if let Some(ref d) = self.data {
            return serde_json::to_string_pretty(d).unwrap_or_else(|_| d.to_string());
        }
        "done".to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `Role::Tool` messages: the `ToolCall.id` this result answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Images attached to this message. Only the most recent computer
    /// message in a conversation ever carries images (invariant, §3).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageInput>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None, images: Vec::new() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None, images: Vec::new() }
    }

    pub fn computer(content: impl Into<String>, images: Vec<ImageInput>) -> Self {
        Self { role: Role::Computer, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None, images }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { role: Role::Assistant, content, tool_calls, tool_call_id: None, images: Vec::new() }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            images: Vec::new(),
        }
    }
}

// ─── Message queue ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundSource {
    Tui,
    Gui,
    Mail,
    Notification,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Pending,
    Processing,
    Consumed,
}

/// An inbound message waiting to be folded into the conversation. Strictly
/// pending -> processing -> consumed; never reverts except via explicit reset
/// (used when a step aborts before the LLM call that would have consumed it).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub source: InboundSource,
    pub content: String,
    pub timestamp: String,
    pub state: QueueState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum OutboundTarget {
    Tui,
    Gui,
    Mail { to: String, subject: String },
}

/// A reply awaiting delivery. Durable across restarts (persisted as JSON
/// Lines); removed only after a successful delivery or once `attempts`
/// reaches the configured maximum, at which point it is dead-lettered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    pub target: OutboundTarget,
    pub content: String,
    pub attempts: u32,
    pub next_attempt_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

// ─── Accessibility snapshot / diff ──────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Element {
    pub role: String,
    #[serde(default)]
    pub subrole: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub selected: bool,
    #[serde(default)]
    pub expanded: bool,
    #[serde(default)]
    pub busy: bool,
    #[serde(default)]
    pub bounds: Option<Bounds>,
}

/// A single point-in-time accessibility observation. Short-lived: held only
/// across one tool call, long enough to compute a diff against the next one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub timestamp: String,
    #[serde(default)]
    pub focused_application: Option<String>,
    #[serde(default)]
    pub focused_window: Option<String>,
    #[serde(default)]
    pub focused_element: Option<Element>,
    #[serde(default)]
    pub element_at_point: Option<Element>,
    #[serde(default)]
    pub windows: Vec<String>,
    #[serde(default)]
    pub open_menus: Vec<String>,
    #[serde(default)]
    pub tabs: Vec<String>,
    #[serde(default)]
    pub sheets: Vec<String>,
    #[serde(default)]
    pub selections: Vec<String>,
}

/// Structured, facet-wise comparison between two snapshots. Produced by
/// `crate::accessibility::diff::diff_state`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDiff {
    pub app_changed: bool,
    pub window_focus_changed: bool,
    pub focus_changed: bool,
    pub element_at_point_changed: bool,
    pub value_changed: bool,
    pub enabled_changed: bool,
    pub expanded_changed: bool,
    pub busy_changed: bool,
    pub windows_opened: Vec<String>,
    pub windows_closed: Vec<String>,
    pub menus_opened: Vec<String>,
    pub menus_closed: Vec<String>,
    pub sheets_opened: Vec<String>,
    pub sheets_closed: Vec<String>,
    pub active_tab_changed: bool,
    pub summary: Vec<String>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
    }
}

// ─── Step audit trail ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Failed,
}

/// One audit record, appended per tool call and persisted to a per-day JSON
/// Lines file under the data root's `memory/steps` directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub timestamp: String,
    pub screenshot_path: Option<String>,
    pub thought: Option<String>,
    pub tool_call: ToolCall,
    pub outcome: StepOutcome,
}

/// Bounded ring buffer of the last N rounds' click coordinates, used by the
/// repetition detector to notice the agent clicking the same spot in a loop.
#[derive(Debug, Clone, Default)]
pub struct RoundClicks {
    rounds: VecDeque<Vec<(f64, f64)>>,
    capacity: usize,
}

impl RoundClicks {
    pub fn new(capacity: usize) -> Self {
        Self { rounds: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push_round(&mut self, clicks: Vec<(f64, f64)>) {
        if self.rounds.len() == self.capacity {
            self.rounds.pop_front();
        }
        self.rounds.push_back(clicks);
    }

    pub fn rounds(&self) -> impl Iterator<Item = &Vec<(f64, f64)>> {
        self.rounds.iter()
    }

    /// True when the same (rounded) point was clicked in every one of the
    /// last `window` rounds, a strong signal the agent is stuck.
    pub fn is_stuck_on_point(&self, window: usize, tolerance: f64) -> bool {
        if self.rounds.len() < window {
            return false;
        }
        let recent: Vec<_> = self.rounds.iter().rev().take(window).collect();
        let anchor = match recent[0].first() {
            Some(p) => *p,
            None => return false,
        };
        recent.iter().all(|round| {
            round.iter().any(|p| (p.0 - anchor.0).abs() <= tolerance && (p.1 - anchor.1).abs() <= tolerance)
        })
    }
}

// ─── Event sink ─────────────────────────────────────────────────────────────

/// Where the agent loop reports progress (CLI, overlay, RPC).
pub trait EventSink: Send {
    fn on_text(&mut self, text: &str);
    fn on_tool_call(&mut self, name: &str, arguments: &Value);
    fn on_tool_result(&mut self, name: &str, result: &ToolResult);
    fn on_status(&mut self, text: &str);
}

/// Prints to stdout/stderr, matching CLI chat UX conventions.
pub struct TerminalEventSink {
    pub verbose: bool,
}

impl EventSink for TerminalEventSink {
    fn on_text(&mut self, text: &str) {
        if !text.trim().is_empty() {
            println!("{}", text);
        }
    }

    fn on_tool_call(&mut self, name: &str, arguments: &Value) {
        if self.verbose {
            eprintln!("-> {}({})", name, arguments);
        } else {
            eprintln!("-> {}", name);
        }
    }

    fn on_tool_result(&mut self, name: &str, result: &ToolResult) {
        let tag = if result.success { "ok" } else { "err" };
        let brief = result.preferred_projection();
        let first = brief.lines().next().unwrap_or("(done)");
        let shown = if first.len() > 120 { safe_truncate(first, 120) } else { first };
        eprintln!("  [{}] {} {}", tag, name, shown);
    }

    fn on_status(&mut self, text: &str) {
        eprintln!("[status] {}", text);
    }
}

/// Wraps `TerminalEventSink`, additionally forwarding `on_status` text to the
/// overlay as a `role="status"` frame over an unbounded channel (§7: status
/// is one of the three places a user-visible error can surface). `EventSink`
/// is sync, so delivery itself happens on whatever task drains `status_tx`.
pub struct OverlayAwareEventSink {
    pub terminal: TerminalEventSink,
    pub status_tx: Option<tokio::sync::mpsc::UnboundedSender<String>>,
}

impl EventSink for OverlayAwareEventSink {
    fn on_text(&mut self, text: &str) {
        self.terminal.on_text(text);
    }

    fn on_tool_call(&mut self, name: &str, arguments: &Value) {
        self.terminal.on_tool_call(name, arguments);
    }

    fn on_tool_result(&mut self, name: &str, result: &ToolResult) {
        self.terminal.on_tool_result(name, result);
    }

    fn on_status(&mut self, text: &str) {
        self.terminal.on_status(text);
        if let Some(tx) = &self.status_tx {
            let _ = tx.send(text.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        for n in 0..s.len() + 2 {
            let t = safe_truncate(s, n);
            assert!(t.len() <= n);
            assert!(std::str::from_utf8(t.as_bytes()).is_ok());
        }
    }

    #[test]
    fn round_clicks_detects_stuck_point() {
        let mut rc = RoundClicks::new(10);
        for _ in 0..4 {
            rc.push_round(vec![(100.0, 100.0)]);
        }
        assert!(rc.is_stuck_on_point(3, 2.0));
        rc.push_round(vec![(400.0, 400.0)]);
        assert!(!rc.is_stuck_on_point(3, 2.0));
    }

    #[test]
    fn tool_result_projection_prefers_message_then_error_then_data() {
        let r = ToolResult::ok("done");
        assert_eq!(r.preferred_projection(), "done");
        let r = ToolResult::fail("boom");
        assert_eq!(r.preferred_projection(), "boom");
        let r = ToolResult { success: true, data: Some(serde_json::json!({"x": 1})), ..Default::default() };
        assert!(r.preferred_projection().contains('1'));
    }
}
