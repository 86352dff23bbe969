//! Persisted state layout under the data root (§6):
//!
//! ```text
//! data/memory/steps/YYYY-MM-DD/<unix-ms>.json
//! data/memory/screenshots/YYYY-MM-DD/<ts>.png
//! data/traces/<local-timestamp>.md
//! data/TODOLIST.md
//! data/mail-uids.json
//! data/queue/inbound.jsonl
//! data/queue/outbound.jsonl
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;

use crate::types::Step;

pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn steps_dir(&self) -> PathBuf {
        self.root.join("memory/steps")
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join("memory/screenshots")
    }

    pub fn traces_dir(&self) -> PathBuf {
        self.root.join("traces")
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.root.join("queue")
    }

    pub fn todolist_path(&self) -> PathBuf {
        self.root.join("TODOLIST.md")
    }

    pub fn mail_uids_path(&self) -> PathBuf {
        self.root.join("mail-uids.json")
    }

    /// Today's screenshot directory, created on demand.
    pub fn today_screenshots_dir(&self) -> Result<PathBuf> {
        let dir = self.screenshots_dir().join(Local::now().format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&dir).context("creating screenshot directory")?;
        Ok(dir)
    }

    /// Append one step record to today's per-day file.
    pub fn append_step(&self, step: &Step) -> Result<()> {
        let day_dir = self.steps_dir().join(Local::now().format("%Y-%m-%d").to_string());
        std::fs::create_dir_all(&day_dir).context("creating steps directory")?;
        let file_name = format!("{}.json", chrono::Utc::now().timestamp_millis());
        let path = day_dir.join(file_name);
        let json = serde_json::to_string_pretty(step).context("serializing step")?;
        std::fs::write(path, json).context("writing step file")
    }

    /// Append a line to the human-readable trace log for today.
    pub fn append_trace(&self, line: &str) -> Result<()> {
        use std::io::Write;
        std::fs::create_dir_all(self.traces_dir()).context("creating traces directory")?;
        let path = self.traces_dir().join(format!("{}.md", Local::now().format("%Y-%m-%d")));
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path).context("opening trace file")?;
        writeln!(file, "{line}").context("writing trace line")
    }

    pub fn write_todolist(&self, markdown: &str) -> Result<()> {
        std::fs::write(self.todolist_path(), markdown).context("writing TODOLIST.md")
    }

    pub fn read_todolist(&self) -> String {
        std::fs::read_to_string(self.todolist_path()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_step_creates_per_day_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let step = Step {
            timestamp: "2026-01-01T00:00:00Z".into(),
            screenshot_path: None,
            thought: None,
            tool_call: crate::types::ToolCall { id: "1".into(), name: "wait".into(), arguments: serde_json::json!({}) },
            outcome: crate::types::StepOutcome::Success,
        };
        storage.append_step(&step).unwrap();
        let day_dir = storage.steps_dir().join(Local::now().format("%Y-%m-%d").to_string());
        assert_eq!(std::fs::read_dir(day_dir).unwrap().count(), 1);
    }

    #[test]
    fn todolist_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        storage.write_todolist("- [ ] buy milk").unwrap();
        assert_eq!(storage.read_todolist(), "- [ ] buy milk");
    }
}
