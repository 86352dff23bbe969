//! Prompt construction: two external templates (`system`, `computer`) with
//! simple `{{name}}` substitution (§6). No progressive disclosure, no skill
//! loading — this agent's only external knowledge is its tool list.

use crate::types::{safe_truncate, Step};

const DEFAULT_SYSTEM_TEMPLATE: &str = r#"You are a desktop automation agent. You see the screen, move the mouse, type, and read the accessibility tree; you do not have a body beyond these tools.

You run on {{PLATFORM}}. Available tools:

{{TOOLS}}

Reply to the user only through the `<chat>` block described in your tool instructions — text outside `<chat>` is your private reasoning and is never shown to anyone. Always call a tool when a tool would make progress; do not narrate an action you have not actually taken."#;

const DEFAULT_COMPUTER_TEMPLATE: &str = r#"Current task: {{task}}

TODO:
{{todoSummary}}

Recent steps:
{{recentSteps}}

{{screenStatus}}"#;

/// Maximum rendered length for a single tool-result projection inside the
/// "Tool Execution Results" section (distinct from the 120-char CLI preview).
const MAX_RESULT_CHARS: usize = 2_000;

pub struct PromptBuilder {
    system_template: String,
    computer_template: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self { system_template: DEFAULT_SYSTEM_TEMPLATE.to_string(), computer_template: DEFAULT_COMPUTER_TEMPLATE.to_string() }
    }
}

impl PromptBuilder {
    pub fn with_templates(system_template: String, computer_template: String) -> Self {
        Self { system_template, computer_template }
    }

    pub fn system_prompt(&self, tools_description: &str, platform: &str) -> String {
        substitute(&self.system_template, &[("TOOLS", tools_description), ("PLATFORM", platform)])
    }

    /// Build the computer-feedback message body (§4.5.2 step 5). Tool
    /// execution results and the repetition reminder are appended after
    /// substitution, not via template placeholders, since they're built from
    /// structured data rather than plain strings.
    pub fn computer_message(
        &self,
        task: &str,
        todo_summary: &str,
        recent_steps: &[Step],
        screen_status: &str,
        tool_results: &[(String, String)],
        repetition_reminder: Option<&str>,
        has_user_message_this_step: bool,
    ) -> String {
        let recent = render_recent_steps(recent_steps);
        let mut body = substitute(
            &self.computer_template,
            &[
                ("task", if task.is_empty() { "(none set)" } else { task }),
                ("todoSummary", if todo_summary.is_empty() { "(empty)" } else { todo_summary }),
                ("recentSteps", &recent),
                ("screenStatus", screen_status),
            ],
        );

        if has_user_message_this_step {
            body = format!("<quote>Attend to both the preceding user message and this computer feedback.</quote>\n{body}");
        }

        if !tool_results.is_empty() {
            body.push_str("\n\n## Tool Execution Results\n");
            for (call_desc, projection) in tool_results {
                let truncated = safe_truncate(projection, MAX_RESULT_CHARS);
                body.push_str(&format!("{call_desc}\n{truncated}\n"));
            }
        }

        if let Some(reminder) = repetition_reminder {
            body.push_str("\n\n");
            body.push_str(reminder);
        }

        body
    }
}

fn substitute(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in pairs {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}

fn render_recent_steps(steps: &[Step]) -> String {
    if steps.is_empty() {
        return "(none yet)".to_string();
    }
    steps
        .iter()
        .map(|s| {
            let thought = s.thought.as_deref().unwrap_or("");
            format!("- {}({}) [{:?}]{}", s.tool_call.name, s.tool_call.arguments, s.outcome, if thought.is_empty() { String::new() } else { format!(" — {thought}") })
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Repeated-click reminder, §4.5.2 step 4/5 and §8 property 7.
pub const REPEATED_CLICK_REMINDER: &str = "<reminder>\nYou have clicked the same location twice in a row with no apparent effect. Try a different element, scroll to reveal more of the UI, or re-read the screen before clicking again.\n</reminder>";

/// Completion checklist injected when the model stops calling tools but
/// hasn't finished (§4.5.2 step 12).
pub const COMPLETION_CHECKLIST_REMINDER: &str = "<reminder>\nBefore stopping, confirm: (a) has the outcome been recorded? (b) has the originator been told — via <chat> if they reached you through tui/gui/mail, or by driving the originating app's own UI if they reached you through a notification (chat cannot reach those surfaces)? (c) is the TODO list marked complete? (d) should the current task be cleared? If all done, call finished; otherwise keep going.\n</reminder>";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepOutcome, ToolCall};

    #[test]
    fn system_prompt_substitutes_both_placeholders() {
        let builder = PromptBuilder::default();
        let rendered = builder.system_prompt("- click\n- type", "macOS");
        assert!(rendered.contains("- click\n- type"));
        assert!(rendered.contains("macOS"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn computer_message_includes_tool_results_section() {
        let builder = PromptBuilder::default();
        let body = builder.computer_message("book a flight", "- [ ] step one", &[], "screen unchanged", &[("click({\"x\":1})".to_string(), "ok".to_string())], None, false);
        assert!(body.contains("book a flight"));
        assert!(body.contains("## Tool Execution Results"));
        assert!(body.contains("click({\"x\":1})"));
    }

    #[test]
    fn computer_message_prepends_quote_when_user_message_present() {
        let builder = PromptBuilder::default();
        let body = builder.computer_message("t", "", &[], "s", &[], None, true);
        assert!(body.starts_with("<quote>"));
    }

    #[test]
    fn recent_steps_render_one_line_each() {
        let steps = vec![Step {
            timestamp: "now".into(),
            screenshot_path: None,
            thought: Some("clicking the button".into()),
            tool_call: ToolCall { id: "1".into(), name: "click".into(), arguments: serde_json::json!({"coordinate": [1, 2]}) },
            outcome: StepOutcome::Success,
        }];
        let rendered = render_recent_steps(&steps);
        assert!(rendered.contains("click"));
        assert!(rendered.contains("clicking the button"));
    }
}
