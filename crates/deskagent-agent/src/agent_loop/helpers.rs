//! Low-level step helpers: external-change detection against a whitelist of
//! apps, idle polling, and observation capture (mouse position, focused
//! window, repeated-click check).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use crate::accessibility::diff_state;
use crate::message::InboundQueue;
use crate::ports::{AccessibilityBackend, InputController};
use crate::types::{InboundSource, StateSnapshot};

use super::LoopState;

/// Is this app one we track for changes the user made outside the agent
/// (another human moved the mouse, a notification popped a dialog, etc.)?
/// An empty whitelist means "watch every app".
pub fn is_watched_app(whitelist: &[String], app: Option<&str>) -> bool {
    if whitelist.is_empty() {
        return true;
    }
    match app {
        Some(app) => whitelist.iter().any(|w| w == app),
        None => false,
    }
}

/// Step 1: compare the current state against the baseline captured at the
/// end of the previous step; anything not attributable to our own last tool
/// call is surfaced as an inbound `notification`.
pub async fn external_change_check(
    state: &mut LoopState,
    accessibility: Option<&Arc<dyn AccessibilityBackend>>,
    whitelist: &[String],
    inbound: &InboundQueue,
) -> Result<()> {
    let Some(ax) = accessibility else { return Ok(()) };
    let Some(baseline) = state.ax_diff_baseline.clone() else { return Ok(()) };
    if !is_watched_app(whitelist, baseline.focused_application.as_deref()) {
        return Ok(());
    }
    let current = match ax.capture_state(None).await {
        Ok(s) => s,
        Err(_) => return Ok(()),
    };
    let diff = diff_state(&baseline, &current);
    let mut external = Vec::new();
    for line in &diff.summary {
        if line == "No significant UI changes detected" {
            continue;
        }
        let count = state.ax_tool_diff_added.entry(line.clone()).or_insert(0);
        if *count > 0 {
            *count -= 1;
        } else {
            external.push(line.clone());
        }
    }
    // Credits are single-use: whatever the previous step's tool calls added
    // is consumed (or not) by exactly this check, then the slate is wiped.
    state.ax_tool_diff_added.clear();

    if !external.is_empty() {
        let app = current.focused_application.clone().unwrap_or_else(|| "unknown".to_string());
        let body = format!(
            "[App: {app}] [AX Change: +{}]\n{}",
            external.len(),
            external.iter().map(|l| format!("+ {l}")).collect::<Vec<_>>().join("\n")
        );
        inbound.push(InboundSource::Notification, body).await?;
    }
    Ok(())
}

/// Step 3: block until either new inbound arrives or the watched apps'
/// accessibility state changes. Does not advance `stepCount`.
pub async fn idle_wait(
    accessibility: Option<&Arc<dyn AccessibilityBackend>>,
    whitelist: &[String],
    inbound: &InboundQueue,
    baseline: &mut Option<StateSnapshot>,
    poll_interval: std::time::Duration,
    cancel: &std::sync::atomic::AtomicBool,
) -> Result<()> {
    loop {
        if cancel.load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }
        if !inbound.get_pending().await.is_empty() {
            return Ok(());
        }
        if let Some(ax) = accessibility {
            if let Ok(current) = ax.capture_state(None).await {
                if is_watched_app(whitelist, current.focused_application.as_deref()) {
                    let changed = match baseline {
                        Some(b) => !diff_state(b, &current).is_empty(),
                        None => false,
                    };
                    *baseline = Some(current);
                    if changed {
                        return Ok(());
                    }
                }
            }
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Step 4: mouse position and focused window title, rendered into the prose
/// line the prompt template shows as `screenStatus`.
pub async fn capture_observation(input: &Arc<dyn InputController>, screen_width: u32, screen_height: u32, screen_enabled: bool) -> String {
    if !screen_enabled {
        return "Screenshot capture is currently disabled.".to_string();
    }
    let mouse_norm = input
        .mouse_position()
        .await
        .ok()
        .map(|(x, y)| (crate::tools::builtin::normalize(x, screen_width), crate::tools::builtin::normalize(y, screen_height)));
    let focused_window = input.focused_window_title().await.unwrap_or(None);
    match (&focused_window, mouse_norm) {
        (Some(w), Some((mx, my))) => format!("Focused window: {w}. Mouse at ({mx}, {my}) in [0,1000] coordinates."),
        (Some(w), None) => format!("Focused window: {w}."),
        (None, _) => "Focused window unknown.".to_string(),
    }
}

pub fn multiset_add(map: &mut HashMap<String, u32>, line: &str) {
    *map.entry(line.to_string()).or_insert(0) += 1;
}

/// Resolves once `cancel` flips true. Raced against the in-flight LLM call
/// so dropping that future aborts the underlying HTTP request (§4.2: the
/// provider's `abort()` is the request's own cancellation-on-drop, not a
/// separate handle).
pub async fn wait_for_cancel(cancel: &std::sync::atomic::AtomicBool) {
    loop {
        if cancel.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StateSnapshot;
    use async_trait::async_trait;

    #[test]
    fn watched_app_empty_whitelist_watches_everything() {
        assert!(is_watched_app(&[], Some("Finder")));
        assert!(is_watched_app(&[], None));
    }

    #[test]
    fn watched_app_respects_whitelist() {
        let whitelist = vec!["Finder".to_string()];
        assert!(is_watched_app(&whitelist, Some("Finder")));
        assert!(!is_watched_app(&whitelist, Some("Safari")));
        assert!(!is_watched_app(&whitelist, None));
    }

    struct FixedAx {
        snapshot: StateSnapshot,
    }

    #[async_trait]
    impl AccessibilityBackend for FixedAx {
        async fn capture_state(&self, _point: Option<(i32, i32)>) -> Result<StateSnapshot> {
            Ok(self.snapshot.clone())
        }
        async fn element_at_point(&self, _x: i32, _y: i32) -> Result<Option<crate::types::Element>> {
            Ok(None)
        }
        async fn search(&self, _keyword: &str, _max_results: usize) -> Result<Vec<crate::ports::SearchHit>> {
            Ok(Vec::new())
        }
        async fn nearby_elements(&self, _x: i32, _y: i32, _count: usize, _distance: u32) -> Result<Vec<crate::ports::SearchHit>> {
            Ok(Vec::new())
        }
    }

    /// §8 property 9: a line the tool caused once is subtracted out of the
    /// one check that sees it; the credit does not carry over, so the very
    /// next poll of the same persisting diff surfaces it as external.
    #[tokio::test]
    async fn ax_diff_subtraction_is_single_use_then_clears() {
        let baseline = StateSnapshot { focused_application: Some("Finder".into()), windows: vec![], ..Default::default() };
        let current = StateSnapshot { focused_application: Some("Finder".into()), windows: vec!["B".into()], ..Default::default() };
        let ax: Arc<dyn AccessibilityBackend> = Arc::new(FixedAx { snapshot: current });

        let dir = tempfile::tempdir().unwrap();
        let inbound = InboundQueue::load(dir.path().join("inbound.jsonl")).await.unwrap();

        let mut state = LoopState { ax_diff_baseline: Some(baseline), ..Default::default() };
        state.ax_tool_diff_added.insert("Windows opened: B".to_string(), 1);

        external_change_check(&mut state, Some(&ax), &[], &inbound).await.unwrap();
        assert!(inbound.get_pending().await.is_empty());
        assert!(state.ax_tool_diff_added.is_empty());

        external_change_check(&mut state, Some(&ax), &[], &inbound).await.unwrap();
        let pending = inbound.get_pending().await;
        assert_eq!(pending.len(), 1);
        assert!(pending[0].content.contains("Windows opened: B"));
    }
}
