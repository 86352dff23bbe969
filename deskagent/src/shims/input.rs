//! Mouse/keyboard simulation via `enigo`, with clipboard-paste fallback for
//! non-ASCII or multi-line text (§4.1).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use deskagent_agent::ports::{InputController, MouseButton as PortMouseButton};
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use tokio::sync::Mutex;
use tokio::task;

pub struct EnigoInputController {
    enigo: Mutex<Enigo>,
}

impl EnigoInputController {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| anyhow!("initializing input controller: {e}"))?;
        Ok(Self { enigo: Mutex::new(enigo) })
    }
}

fn map_button(button: PortMouseButton) -> Button {
    match button {
        PortMouseButton::Left => Button::Left,
        PortMouseButton::Right => Button::Right,
        PortMouseButton::Middle => Button::Middle,
    }
}

/// Text is ASCII and single-line iff every char is printable ASCII and no
/// newline is present; only then is direct key-typing reliable cross-platform.
fn can_type_directly(text: &str) -> bool {
    !text.contains('\n') && text.chars().all(|c| c.is_ascii() && !c.is_control())
}

#[async_trait]
impl InputController for EnigoInputController {
    async fn mouse_move(&self, x: i32, y: i32) -> Result<()> {
        let mut guard = self.enigo.lock().await;
        guard.move_mouse(x, y, Coordinate::Abs).map_err(|e| anyhow!("mouse move failed: {e}"))
    }

    async fn mouse_click(&self, x: i32, y: i32, button: PortMouseButton, double: bool) -> Result<()> {
        let mut guard = self.enigo.lock().await;
        guard.move_mouse(x, y, Coordinate::Abs).map_err(|e| anyhow!("mouse move failed: {e}"))?;
        let btn = map_button(button);
        guard.button(btn, Direction::Click).map_err(|e| anyhow!("click failed: {e}"))?;
        if double {
            guard.button(btn, Direction::Click).map_err(|e| anyhow!("double click failed: {e}"))?;
        }
        Ok(())
    }

    async fn mouse_drag(&self, from: (i32, i32), to: (i32, i32)) -> Result<()> {
        let mut guard = self.enigo.lock().await;
        guard.move_mouse(from.0, from.1, Coordinate::Abs).map_err(|e| anyhow!("drag start failed: {e}"))?;
        guard.button(Button::Left, Direction::Press).map_err(|e| anyhow!("drag press failed: {e}"))?;
        guard.move_mouse(to.0, to.1, Coordinate::Abs).map_err(|e| anyhow!("drag move failed: {e}"))?;
        guard.button(Button::Left, Direction::Release).map_err(|e| anyhow!("drag release failed: {e}"))
    }

    async fn scroll(&self, dx: i32, dy: i32) -> Result<()> {
        let mut guard = self.enigo.lock().await;
        if dy != 0 {
            guard.scroll(dy, Axis::Vertical).map_err(|e| anyhow!("scroll failed: {e}"))?;
        }
        if dx != 0 {
            guard.scroll(dx, Axis::Horizontal).map_err(|e| anyhow!("scroll failed: {e}"))?;
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        if can_type_directly(text) {
            let mut guard = self.enigo.lock().await;
            return guard.text(text).map_err(|e| anyhow!("typing failed: {e}"));
        }

        let text = text.to_string();
        task::spawn_blocking(move || -> Result<()> {
            let mut clipboard = arboard::Clipboard::new().context("opening clipboard")?;
            let previous = clipboard.get_text().ok();
            clipboard.set_text(text).context("writing clipboard")?;
            let mut enigo = Enigo::new(&Settings::default()).map_err(|e| anyhow!("initializing input controller: {e}"))?;
            let modifier = if cfg!(target_os = "macos") { enigo::Key::Meta } else { enigo::Key::Control };
            enigo.key(modifier, Direction::Press).map_err(|e| anyhow!("paste press failed: {e}"))?;
            enigo.key(enigo::Key::Unicode('v'), Direction::Click).map_err(|e| anyhow!("paste failed: {e}"))?;
            enigo.key(modifier, Direction::Release).map_err(|e| anyhow!("paste release failed: {e}"))?;
            if let Some(prev) = previous {
                let _ = clipboard.set_text(prev);
            }
            Ok(())
        })
        .await
        .context("clipboard paste task panicked")?
    }

    async fn hotkey(&self, keys: &[String]) -> Result<()> {
        let mut guard = self.enigo.lock().await;
        let parsed: Vec<enigo::Key> = keys.iter().map(|k| parse_key(k)).collect();
        for key in &parsed {
            guard.key(*key, Direction::Press).map_err(|e| anyhow!("hotkey press failed: {e}"))?;
        }
        for key in parsed.iter().rev() {
            guard.key(*key, Direction::Release).map_err(|e| anyhow!("hotkey release failed: {e}"))?;
        }
        Ok(())
    }

    async fn mouse_position(&self) -> Result<(i32, i32)> {
        let guard = self.enigo.lock().await;
        guard.location().map_err(|e| anyhow!("mouse position failed: {e}"))
    }

    async fn screen_size(&self) -> Result<(u32, u32)> {
        let guard = self.enigo.lock().await;
        let (w, h) = guard.main_display().map_err(|e| anyhow!("screen size failed: {e}"))?;
        Ok((w as u32, h as u32))
    }

    async fn focused_window_title(&self) -> Result<Option<String>> {
        // `enigo` has no window-query surface; platform window title lookup
        // is left to the accessibility backend's `focusedWindow` field.
        Ok(None)
    }
}

fn parse_key(key: &str) -> enigo::Key {
    match key.to_lowercase().as_str() {
        "cmd" | "command" | "meta" | "win" | "windows" => enigo::Key::Meta,
        "ctrl" | "control" => enigo::Key::Control,
        "alt" | "option" => enigo::Key::Alt,
        "shift" => enigo::Key::Shift,
        "enter" | "return" => enigo::Key::Return,
        "tab" => enigo::Key::Tab,
        "escape" | "esc" => enigo::Key::Escape,
        "space" => enigo::Key::Space,
        "backspace" => enigo::Key::Backspace,
        "delete" => enigo::Key::Delete,
        other => other.chars().next().map(enigo::Key::Unicode).unwrap_or(enigo::Key::Unicode(' ')),
    }
}
