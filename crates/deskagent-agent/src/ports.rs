//! Platform ports: thin trait boundaries the agent core calls through and
//! the `deskagent` binary implements with real OS primitives (`xcap`,
//! `enigo`, `arboard`, an accessibility subprocess). Keeping these as traits
//! lets the core run fully platform-agnostic and be exercised with fakes in
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Element, StateSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotInfo {
    pub path: String,
    pub screen_width: u32,
    pub screen_height: u32,
}

/// Captures the primary display, including the mouse cursor when the
/// platform allows it.
#[async_trait]
pub trait ScreenshotProvider: Send + Sync {
    async fn capture(&self, dest_dir: &std::path::Path) -> anyhow::Result<ScreenshotInfo>;
}

/// Mouse and keyboard simulation, plus the handful of queries the loop needs
/// (current pointer position, focused window title).
#[async_trait]
pub trait InputController: Send + Sync {
    async fn mouse_move(&self, x: i32, y: i32) -> anyhow::Result<()>;
    async fn mouse_click(&self, x: i32, y: i32, button: MouseButton, double: bool) -> anyhow::Result<()>;
    async fn mouse_drag(&self, from: (i32, i32), to: (i32, i32)) -> anyhow::Result<()>;
    async fn scroll(&self, dx: i32, dy: i32) -> anyhow::Result<()>;
    /// Type literal text. Implementations fall back to clipboard-paste for
    /// non-ASCII or multi-line text (§4.1).
    async fn type_text(&self, text: &str) -> anyhow::Result<()>;
    async fn hotkey(&self, keys: &[String]) -> anyhow::Result<()>;
    async fn mouse_position(&self) -> anyhow::Result<(i32, i32)>;
    async fn screen_size(&self) -> anyhow::Result<(u32, u32)>;
    async fn focused_window_title(&self) -> anyhow::Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub role: String,
    pub title: Option<String>,
    pub bounds: Option<crate::types::Bounds>,
    pub similarity: f64,
}

/// The platform accessibility back-end. May be entirely unavailable (no
/// binary configured); callers degrade gracefully per §4.5.4.
#[async_trait]
pub trait AccessibilityBackend: Send + Sync {
    async fn capture_state(&self, point: Option<(i32, i32)>) -> anyhow::Result<StateSnapshot>;
    async fn element_at_point(&self, x: i32, y: i32) -> anyhow::Result<Option<Element>>;
    async fn search(&self, keyword: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>>;
    /// A short list of elements near `(x, y)` within `distance` px, closest
    /// first, capped at `count` (§4.1: click-family tools surface these so
    /// the model can recover from an imprecise click).
    async fn nearby_elements(&self, x: i32, y: i32, count: usize, distance: u32) -> anyhow::Result<Vec<SearchHit>>;
}

/// Outbound delivery targets the message router calls into.
#[async_trait]
pub trait TuiDeliverer: Send + Sync {
    fn deliver(&self, content: &str, attachments: &[String]);
}

/// `role` is one of `user`, `assistant`, `computer`, `tool`, `system`,
/// `status` (§6); `tool_calls` names any tool calls the content accompanies,
/// empty for everything else.
#[async_trait]
pub trait GuiDeliverer: Send + Sync {
    /// Returns false when the overlay isn't connected; the message stays queued.
    async fn deliver(&self, role: &str, content: &str, attachments: &[String], tool_calls: &[String]) -> bool;
}

#[async_trait]
pub trait MailDeliverer: Send + Sync {
    async fn deliver(&self, to: &str, subject: &str, body: &str, attachments: &[String]) -> bool;
}
