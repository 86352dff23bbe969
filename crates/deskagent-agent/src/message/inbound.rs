//! Durable inbound queue: `push` → `pending` → `processing` → `consumed`.
//!
//! Persisted as JSON Lines under `queue/inbound.jsonl`. Every mutation
//! rewrites the file compactly (one line per live message) rather than
//! appending forever, so a long-running agent doesn't accumulate an
//! unbounded log of consumed entries.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::QueueError;
use crate::types::{InboundSource, QueueState, QueuedMessage};

pub struct InboundQueue {
    path: PathBuf,
    messages: Mutex<Vec<QueuedMessage>>,
}

impl InboundQueue {
    /// Load the queue from disk, tolerating corrupt lines (§7): each
    /// unparseable line is skipped with a warning rather than failing startup.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let messages = read_jsonl(&path);
        Ok(Self { path, messages: Mutex::new(messages) })
    }

    /// Enqueue a new message. FIFO across all sources (§4.4: sources are not
    /// serialised separately).
    pub async fn push(&self, source: InboundSource, content: impl Into<String>) -> Result<QueuedMessage> {
        let msg = QueuedMessage {
            id: Uuid::new_v4().to_string(),
            source,
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
            state: QueueState::Pending,
        };
        let mut guard = self.messages.lock().await;
        guard.push(msg.clone());
        self.persist(&guard)?;
        Ok(msg)
    }

    pub async fn get_pending(&self) -> Vec<QueuedMessage> {
        self.messages.lock().await.iter().filter(|m| m.state == QueueState::Pending).cloned().collect()
    }

    pub async fn mark_processing(&self, ids: &[String]) -> Result<()> {
        let mut guard = self.messages.lock().await;
        for m in guard.iter_mut() {
            if ids.contains(&m.id) && m.state == QueueState::Pending {
                m.state = QueueState::Processing;
            }
        }
        self.persist(&guard)
    }

    /// Remove the given ids entirely. Called once the step that drained them
    /// into the conversation has concluded.
    pub async fn consume_all(&self, ids: &[String]) -> Result<()> {
        let mut guard = self.messages.lock().await;
        guard.retain(|m| !ids.contains(&m.id));
        self.persist(&guard)
    }

    /// Recover from a crash mid-step: anything left `processing` goes back to
    /// `pending`. Called once at startup.
    pub async fn reset_processing(&self) -> Result<()> {
        let mut guard = self.messages.lock().await;
        for m in guard.iter_mut() {
            if m.state == QueueState::Processing {
                m.state = QueueState::Pending;
            }
        }
        self.persist(&guard)
    }

    /// `--clear`: drop every pending message, keep anything mid-flight.
    pub async fn clear_pending(&self) -> Result<()> {
        let mut guard = self.messages.lock().await;
        guard.retain(|m| m.state != QueueState::Pending);
        self.persist(&guard)
    }

    /// Render all pending messages into a single `<chat>` block grouped by
    /// source, per §4.4/§6.
    pub fn format_pending_as_chat(pending: &[QueuedMessage]) -> String {
        if pending.is_empty() {
            return String::new();
        }
        let mut by_source: Vec<(InboundSource, Vec<&QueuedMessage>)> = Vec::new();
        for msg in pending {
            match by_source.iter_mut().find(|(s, _)| *s == msg.source) {
                Some((_, v)) => v.push(msg),
                None => by_source.push((msg.source, vec![msg])),
            }
        }
        let mut out = String::from("<chat>\n");
        for (source, msgs) in by_source {
            out.push_str(&format!("  <{}>\n", source_tag(source)));
            for m in msgs {
                out.push_str(&format!("    {}\n", m.content));
            }
            out.push_str(&format!("  </{}>\n", source_tag(source)));
        }
        out.push_str("</chat>");
        out
    }

    fn persist(&self, messages: &[QueuedMessage]) -> Result<()> {
        write_jsonl(&self.path, messages)
    }
}

fn source_tag(source: InboundSource) -> &'static str {
    match source {
        InboundSource::Tui => "tui",
        InboundSource::Gui => "gui",
        InboundSource::Mail => "mail",
        InboundSource::Notification => "notification",
        InboundSource::Terminal => "terminal",
    }
}

fn read_jsonl(path: &Path) -> Vec<QueuedMessage> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<QueuedMessage>(line) {
            Ok(msg) => out.push(msg),
            Err(e) => tracing::warn!(path = %path.display(), lineno, error = %e, "skipping corrupt inbound queue line"),
        }
    }
    out
}

fn write_jsonl(path: &Path, messages: &[QueuedMessage]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("creating queue directory")?;
    }
    let tmp = path.with_extension("jsonl.tmp");
    let persist = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        for msg in messages {
            let line = serde_json::to_string(msg).expect("QueuedMessage always serializes");
            writeln!(file, "{line}")?;
        }
        std::fs::rename(&tmp, path)
    };
    persist().map_err(|source| QueueError::PersistFailed { path: path.display().to_string(), source }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_pending_then_consume_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue/inbound.jsonl");
        let queue = InboundQueue::load(path.clone()).await.unwrap();
        let msg = queue.push(InboundSource::Tui, "hello").await.unwrap();
        assert_eq!(queue.get_pending().await.len(), 1);

        queue.mark_processing(&[msg.id.clone()]).await.unwrap();
        assert!(queue.get_pending().await.is_empty());

        let reloaded = InboundQueue::load(path).await.unwrap();
        reloaded.reset_processing().await.unwrap();
        assert_eq!(reloaded.get_pending().await.len(), 1);

        reloaded.consume_all(&[msg.id]).await.unwrap();
        assert!(reloaded.get_pending().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbound.jsonl");
        std::fs::write(&path, "{not json}\n{\"id\":\"1\"}\n").unwrap();
        let queue = InboundQueue::load(path).await.unwrap();
        assert!(queue.get_pending().await.is_empty());
    }

    #[test]
    fn format_pending_as_chat_groups_by_source() {
        let pending = vec![
            QueuedMessage { id: "1".into(), source: InboundSource::Tui, content: "hi".into(), timestamp: "t".into(), state: QueueState::Pending },
            QueuedMessage { id: "2".into(), source: InboundSource::Mail, content: "yo".into(), timestamp: "t".into(), state: QueueState::Pending },
        ];
        let rendered = InboundQueue::format_pending_as_chat(&pending);
        assert!(rendered.contains("<tui>"));
        assert!(rendered.contains("<mail>"));
        assert!(rendered.starts_with("<chat>"));
    }
}
