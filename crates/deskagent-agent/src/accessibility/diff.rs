//! Pure `StateSnapshot` comparison.

use std::collections::HashSet;

use crate::types::{Element, StateDiff, StateSnapshot};

const TEXT_PREVIEW_LEN: usize = 30;
const VALUE_PREVIEW_LEN: usize = 20;

fn truncate_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{truncated}...")
    }
}

fn element_tuple_changed(before: &Option<Element>, after: &Option<Element>) -> bool {
    match (before, after) {
        (None, None) => false,
        (None, Some(_)) | (Some(_), None) => true,
        (Some(b), Some(a)) => {
            b.role != a.role
                || b.title != a.title
                || b.value != a.value
                || b.focused != a.focused
                || b.selected != a.selected
                || b.expanded != a.expanded
        }
    }
}

fn set_diff<'a>(before: &'a [String], after: &'a [String]) -> (Vec<String>, Vec<String>) {
    let before_set: HashSet<&str> = before.iter().map(String::as_str).collect();
    let after_set: HashSet<&str> = after.iter().map(String::as_str).collect();
    let opened = after.iter().filter(|k| !before_set.contains(k.as_str())).cloned().collect();
    let closed = before.iter().filter(|k| !after_set.contains(k.as_str())).cloned().collect();
    (opened, closed)
}

/// Compare two accessibility snapshots and produce a structured diff.
///
/// Pure and deterministic: same inputs always produce the same `StateDiff`,
/// including `summary` ordering. Facets are evaluated and appended to
/// `summary` in the exact order documented in the component design (app,
/// window focus, focus, element-at-point, busy, windows, sheets, menus,
/// tabs, focused-element fields, selections).
pub fn diff_state(before: &StateSnapshot, after: &StateSnapshot) -> StateDiff {
    let mut diff = StateDiff::default();
    let mut summary = Vec::new();

    diff.app_changed = before.focused_application != after.focused_application;
    if diff.app_changed {
        summary.push(format!(
            "Active application changed: {} -> {}",
            before.focused_application.as_deref().unwrap_or("(none)"),
            after.focused_application.as_deref().unwrap_or("(none)"),
        ));
    }

    // Tie-break: app change suppresses the window-focus line.
    diff.window_focus_changed = !diff.app_changed && before.focused_window != after.focused_window;
    if diff.window_focus_changed {
        summary.push(format!(
            "Focused window changed: {} -> {}",
            truncate_ellipsis(before.focused_window.as_deref().unwrap_or("(none)"), TEXT_PREVIEW_LEN),
            truncate_ellipsis(after.focused_window.as_deref().unwrap_or("(none)"), TEXT_PREVIEW_LEN),
        ));
    }

    diff.focus_changed = element_tuple_changed(&before.focused_element, &after.focused_element);
    if diff.focus_changed {
        summary.push(format!(
            "Focused element changed: {} -> {}",
            describe_element(before.focused_element.as_ref()),
            describe_element(after.focused_element.as_ref()),
        ));
    }

    diff.element_at_point_changed = element_tuple_changed(&before.element_at_point, &after.element_at_point);
    if diff.element_at_point_changed {
        summary.push(format!(
            "Element at click point changed: {} -> {}",
            describe_element(before.element_at_point.as_ref()),
            describe_element(after.element_at_point.as_ref()),
        ));
    }

    let busy_before = before.focused_element.as_ref().map(|e| e.busy).unwrap_or(false);
    let busy_after = after.focused_element.as_ref().map(|e| e.busy).unwrap_or(false);
    diff.busy_changed = busy_before != busy_after;
    if diff.busy_changed {
        summary.push(format!("Busy state changed: {busy_before} -> {busy_after}"));
    }

    let (windows_opened, windows_closed) = set_diff(&before.windows, &after.windows);
    if !windows_opened.is_empty() {
        summary.push(format!("Windows opened: {}", windows_opened.join(", ")));
    }
    if !windows_closed.is_empty() {
        summary.push(format!("Windows closed: {}", windows_closed.join(", ")));
    }
    diff.windows_opened = windows_opened;
    diff.windows_closed = windows_closed;

    let (sheets_opened, sheets_closed) = set_diff(&before.sheets, &after.sheets);
    if !sheets_opened.is_empty() {
        summary.push(format!("Sheets opened: {}", sheets_opened.join(", ")));
    }
    if !sheets_closed.is_empty() {
        summary.push(format!("Sheets closed: {}", sheets_closed.join(", ")));
    }
    diff.sheets_opened = sheets_opened;
    diff.sheets_closed = sheets_closed;

    let (menus_opened, menus_closed) = set_diff(&before.open_menus, &after.open_menus);
    let menus_opened = if before.open_menus.is_empty() && !after.open_menus.is_empty() {
        after.open_menus.clone()
    } else {
        menus_opened
    };
    if !menus_opened.is_empty() {
        summary.push(format!("Menus opened: {}", menus_opened.join(", ")));
    }
    if !menus_closed.is_empty() {
        summary.push(format!("Menus closed: {}", menus_closed.join(", ")));
    }
    diff.menus_opened = menus_opened;
    diff.menus_closed = menus_closed;

    let tabs_changed = before.tabs != after.tabs;
    diff.active_tab_changed = tabs_changed && before.tabs.first() != after.tabs.first();
    if tabs_changed {
        summary.push(format!("Tabs changed: [{}] -> [{}]", before.tabs.join(", "), after.tabs.join(", ")));
    }

    diff.expanded_changed = before.focused_element.as_ref().map(|e| e.expanded)
        != after.focused_element.as_ref().map(|e| e.expanded);
    diff.value_changed =
        before.focused_element.as_ref().map(|e| &e.value) != after.focused_element.as_ref().map(|e| &e.value);
    diff.enabled_changed = before.focused_element.as_ref().map(|e| e.enabled)
        != after.focused_element.as_ref().map(|e| e.enabled);
    if diff.value_changed {
        summary.push(format!(
            "Value changed: {} -> {}",
            truncate_ellipsis(before.focused_element.as_ref().and_then(|e| e.value.as_deref()).unwrap_or(""), VALUE_PREVIEW_LEN),
            truncate_ellipsis(after.focused_element.as_ref().and_then(|e| e.value.as_deref()).unwrap_or(""), VALUE_PREVIEW_LEN),
        ));
    }
    if diff.enabled_changed {
        summary.push("Enabled state changed".to_string());
    }
    if diff.expanded_changed {
        summary.push("Expanded state changed".to_string());
    }

    if before.selections != after.selections {
        summary.push(format!(
            "Selection changed: {} item(s) -> {} item(s)",
            before.selections.len(),
            after.selections.len()
        ));
    }

    if summary.is_empty() {
        summary.push("No significant UI changes detected".to_string());
    }
    diff.summary = summary;
    diff
}

fn describe_element(e: Option<&Element>) -> String {
    match e {
        None => "(none)".to_string(),
        Some(e) => {
            let title = e.title.as_deref().unwrap_or("");
            format!("{}[{}]", e.role, truncate_ellipsis(title, TEXT_PREVIEW_LEN))
        }
    }
}

/// Render a `StateDiff` into the block injected ahead of "Tool Execution
/// Results" in the computer-feedback message. When nothing changed, renders
/// a `<reminder>` nudging the model to try a different approach instead of
/// repeating the same action.
pub fn format_diff_for_agent(diff: &StateDiff) -> String {
    if diff.is_empty() || (diff.summary.len() == 1 && diff.summary[0] == "No significant UI changes detected") {
        return "<reminder>\nNo significant UI changes were detected after your last action. \
The screen and accessibility tree look the same as before. Consider:\n\
- Verifying you clicked the intended element (check the screenshot)\n\
- Trying a different coordinate or a keyboard shortcut instead\n\
- Waiting briefly in case the UI is still loading\n\
</reminder>"
            .to_string();
    }
    format!("UI changes since the last action:\n- {}", diff.summary.join("\n- "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Element;

    fn snap(app: &str) -> StateSnapshot {
        StateSnapshot { focused_application: Some(app.to_string()), ..Default::default() }
    }

    #[test]
    fn no_change_yields_sentinel_summary() {
        let s = snap("Finder");
        let d = diff_state(&s, &s);
        assert_eq!(d.summary, vec!["No significant UI changes detected"]);
    }

    #[test]
    fn app_change_suppresses_window_focus_line() {
        let mut before = snap("Finder");
        before.focused_window = Some("Desktop".to_string());
        let mut after = snap("Safari");
        after.focused_window = Some("New Tab".to_string());
        let d = diff_state(&before, &after);
        assert!(d.app_changed);
        assert!(!d.window_focus_changed);
        assert!(d.summary.iter().any(|l| l.contains("Active application changed")));
        assert!(!d.summary.iter().any(|l| l.contains("Focused window changed")));
    }

    #[test]
    fn window_opened_and_closed_are_keyed_by_title() {
        let mut before = snap("Finder");
        before.windows = vec!["A".into(), "B".into()];
        let mut after = snap("Finder");
        after.windows = vec!["B".into(), "C".into()];
        let d = diff_state(&before, &after);
        assert_eq!(d.windows_opened, vec!["C".to_string()]);
        assert_eq!(d.windows_closed, vec!["A".to_string()]);
    }

    #[test]
    fn empty_to_nonempty_menus_counts_as_opened() {
        let before = snap("Finder");
        let mut after = snap("Finder");
        after.open_menus = vec!["File".into()];
        let d = diff_state(&before, &after);
        assert_eq!(d.menus_opened, vec!["File".to_string()]);
    }

    #[test]
    fn focused_element_value_change_is_truncated() {
        let mut before = snap("Finder");
        before.focused_element = Some(Element { role: "textfield".into(), value: Some("short".into()), ..Default::default() });
        let mut after = snap("Finder");
        after.focused_element =
            Some(Element { role: "textfield".into(), value: Some("a very long value that exceeds twenty chars".into()), ..Default::default() });
        let d = diff_state(&before, &after);
        assert!(d.value_changed);
        assert!(d.summary.iter().any(|l| l.contains("...")));
    }

    #[test]
    fn format_diff_for_agent_renders_reminder_on_no_change() {
        let s = snap("Finder");
        let d = diff_state(&s, &s);
        let rendered = format_diff_for_agent(&d);
        assert!(rendered.starts_with("<reminder>"));
        assert!(rendered.ends_with("</reminder>"));
    }
}
