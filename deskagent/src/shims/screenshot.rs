//! Primary-display screenshot capture via `xcap`.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use deskagent_agent::ports::{ScreenshotInfo, ScreenshotProvider};
use xcap::Monitor;

pub struct XcapScreenshotProvider;

#[async_trait]
impl ScreenshotProvider for XcapScreenshotProvider {
    async fn capture(&self, dest_dir: &Path) -> Result<ScreenshotInfo> {
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || capture_blocking(&dest_dir)).await.context("screenshot task panicked")?
    }
}

fn capture_blocking(dest_dir: &Path) -> Result<ScreenshotInfo> {
    let monitors = Monitor::all().context("listing monitors")?;
    let monitor = monitors.into_iter().find(|m| m.is_primary().unwrap_or(false)).or_else(|| Monitor::all().ok().and_then(|mut m| m.pop())).context("no monitor available")?;

    let image = monitor.capture_image().context("capturing screen")?;
    std::fs::create_dir_all(dest_dir).context("creating screenshot directory")?;
    let path = dest_dir.join(format!("{}.png", Utc::now().timestamp_millis()));
    image.save(&path).context("saving screenshot")?;

    Ok(ScreenshotInfo { path: path.to_string_lossy().to_string(), screen_width: image.width(), screen_height: image.height() })
}
