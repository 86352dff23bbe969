//! No-tool-call handling (step 12) and the repeated-click reminder (steps 4/5).

use crate::prompt::{COMPLETION_CHECKLIST_REMINDER, REPEATED_CLICK_REMINDER};
use crate::types::RoundClicks;

use super::LoopState;

/// How many consecutive rounds with the same point counts as "stuck" (§8
/// property 7 checks the two most recent rounds).
const REPETITION_WINDOW: usize = 2;
const REPETITION_TOLERANCE: f64 = 50.0;

pub fn repetition_reminder(round_clicks: &RoundClicks) -> Option<&'static str> {
    round_clicks.is_stuck_on_point(REPETITION_WINDOW, REPETITION_TOLERANCE).then_some(REPEATED_CLICK_REMINDER)
}

pub enum NoToolCallOutcome {
    /// Inject the completion checklist and keep looping.
    Nudge,
    /// Non-interactive mode has given up; exit the loop.
    Finished,
    /// Interactive mode cleared the task; the next iteration falls into idle wait.
    ClearedTask,
}

/// Step 12. `interactive` toggles whether hitting the no-tool-call ceiling
/// exits the loop or just clears the current task and waits for more input.
pub fn handle_no_tool_call(state: &mut LoopState, interactive: bool) -> NoToolCallOutcome {
    state.no_tool_call_count += 1;
    state.last_had_tool_call = false;

    if state.no_tool_call_count < 2 {
        return NoToolCallOutcome::Nudge;
    }

    if interactive {
        state.current_task.clear();
        NoToolCallOutcome::ClearedTask
    } else {
        NoToolCallOutcome::Finished
    }
}

pub fn completion_checklist() -> &'static str {
    COMPLETION_CHECKLIST_REMINDER
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoundClicks;

    fn state() -> LoopState {
        LoopState::default()
    }

    #[test]
    fn first_no_tool_call_nudges() {
        let mut s = state();
        assert!(matches!(handle_no_tool_call(&mut s, false), NoToolCallOutcome::Nudge));
        assert_eq!(s.no_tool_call_count, 1);
    }

    #[test]
    fn second_no_tool_call_finishes_non_interactive() {
        let mut s = state();
        s.no_tool_call_count = 1;
        assert!(matches!(handle_no_tool_call(&mut s, false), NoToolCallOutcome::Finished));
    }

    #[test]
    fn second_no_tool_call_clears_task_interactive() {
        let mut s = state();
        s.no_tool_call_count = 1;
        s.current_task = "do the thing".to_string();
        assert!(matches!(handle_no_tool_call(&mut s, true), NoToolCallOutcome::ClearedTask));
        assert!(s.current_task.is_empty());
    }

    #[test]
    fn repetition_reminder_fires_only_when_stuck() {
        let mut rc = RoundClicks::new(10);
        rc.push_round(vec![(100.0, 100.0)]);
        rc.push_round(vec![(110.0, 105.0)]);
        assert!(repetition_reminder(&rc).is_some());

        let mut rc2 = RoundClicks::new(10);
        rc2.push_round(vec![(100.0, 100.0)]);
        rc2.push_round(vec![(900.0, 900.0)]);
        assert!(repetition_reminder(&rc2).is_none());
    }
}
