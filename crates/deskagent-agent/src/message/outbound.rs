//! Durable outbound queue with exponential-backoff retry and dead-lettering
//! (§4.4). A single delivery loop dequeues and calls whichever deliverer the
//! target names; on exhausting retries the message is converted into a
//! `notification` inbound message so the agent learns delivery failed.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::message::inbound::InboundQueue;
use crate::ports::{GuiDeliverer, MailDeliverer, TuiDeliverer};
use crate::types::{InboundSource, OutboundMessage, OutboundTarget};

/// Retry ceiling before dead-lettering (§4.4 calls 5-8 typical).
const MAX_ATTEMPTS: u32 = 6;
const BASE_BACKOFF_SECS: i64 = 2;

pub struct Deliverers {
    pub tui: Option<Arc<dyn TuiDeliverer>>,
    pub gui: Option<Arc<dyn GuiDeliverer>>,
    pub mail: Option<Arc<dyn MailDeliverer>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Retrying,
    DeadLettered,
}

pub struct OutboundRouter {
    path: PathBuf,
    queue: Mutex<Vec<OutboundMessage>>,
}

impl OutboundRouter {
    pub async fn load(path: PathBuf) -> Result<Self> {
        let queue = read_jsonl(&path);
        Ok(Self { path, queue: Mutex::new(queue) })
    }

    pub async fn push(
        &self,
        target: OutboundTarget,
        content: impl Into<String>,
        attachments: Vec<String>,
    ) -> Result<OutboundMessage> {
        let msg = OutboundMessage {
            id: Uuid::new_v4().to_string(),
            target,
            content: content.into(),
            attempts: 0,
            next_attempt_at: Utc::now().to_rfc3339(),
            attachments,
        };
        let mut guard = self.queue.lock().await;
        guard.push(msg.clone());
        self.persist(&guard)?;
        Ok(msg)
    }

    /// Drive one delivery pass: attempt every due message once. Messages that
    /// fail are rescheduled with exponential backoff; messages that exhaust
    /// `MAX_ATTEMPTS` are dead-lettered into `inbound` as a `notification`.
    pub async fn drive(&self, deliverers: &Deliverers, inbound: &InboundQueue) -> Result<Vec<DeliveryOutcome>> {
        let due: Vec<OutboundMessage> = {
            let guard = self.queue.lock().await;
            let now = Utc::now();
            guard.iter().filter(|m| is_due(m, now)).cloned().collect()
        };
        let mut outcomes = Vec::with_capacity(due.len());
        for msg in due {
            let outcome = self.attempt_one(&msg, deliverers, inbound).await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn attempt_one(&self, msg: &OutboundMessage, deliverers: &Deliverers, inbound: &InboundQueue) -> Result<DeliveryOutcome> {
        let delivered = match &msg.target {
            OutboundTarget::Tui => match &deliverers.tui {
                Some(d) => {
                    d.deliver(&msg.content, &msg.attachments);
                    true
                }
                None => false,
            },
            OutboundTarget::Gui => match &deliverers.gui {
                Some(d) => d.deliver("assistant", &msg.content, &msg.attachments, &[]).await,
                None => false,
            },
            OutboundTarget::Mail { to, subject } => match &deliverers.mail {
                Some(d) => d.deliver(to, subject, &msg.content, &msg.attachments).await,
                None => false,
            },
        };

        if delivered {
            let mut guard = self.queue.lock().await;
            guard.retain(|m| m.id != msg.id);
            self.persist(&guard)?;
            return Ok(DeliveryOutcome::Delivered);
        }

        let attempts = msg.attempts + 1;
        if attempts >= MAX_ATTEMPTS {
            let mut guard = self.queue.lock().await;
            guard.retain(|m| m.id != msg.id);
            self.persist(&guard)?;
            inbound
                .push(InboundSource::Notification, format!("delivery failed after {attempts} attempts: {}", msg.content))
                .await?;
            tracing::warn!(id = %msg.id, attempts, "dead-lettering outbound message");
            return Ok(DeliveryOutcome::DeadLettered);
        }

        let mut guard = self.queue.lock().await;
        if let Some(m) = guard.iter_mut().find(|m| m.id == msg.id) {
            m.attempts = attempts;
            m.next_attempt_at = (Utc::now() + backoff(attempts)).to_rfc3339();
        }
        self.persist(&guard)?;
        Ok(DeliveryOutcome::Retrying)
    }

    fn persist(&self, queue: &[OutboundMessage]) -> Result<()> {
        write_jsonl(&self.path, queue)
    }
}

fn is_due(msg: &OutboundMessage, now: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(&msg.next_attempt_at).map(|t| t <= now).unwrap_or(true)
}

fn backoff(attempts: u32) -> Duration {
    Duration::seconds(BASE_BACKOFF_SECS.saturating_pow(attempts.min(6)))
}

fn read_jsonl(path: &Path) -> Vec<OutboundMessage> {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<OutboundMessage>(line) {
            Ok(msg) => out.push(msg),
            Err(e) => tracing::warn!(path = %path.display(), lineno, error = %e, "skipping corrupt outbound queue line"),
        }
    }
    out
}

fn write_jsonl(path: &Path, queue: &[OutboundMessage]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("creating queue directory")?;
    }
    let tmp = path.with_extension("jsonl.tmp");
    {
        let mut file = std::fs::File::create(&tmp).context("creating temp queue file")?;
        for msg in queue {
            let line = serde_json::to_string(msg).context("serializing outbound message")?;
            writeln!(file, "{line}").context("writing queue line")?;
        }
    }
    std::fs::rename(&tmp, path).context("committing queue file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct AlwaysFailGui {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GuiDeliverer for AlwaysFailGui {
        async fn deliver(&self, _role: &str, _content: &str, _attachments: &[String], _tool_calls: &[String]) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    struct AlwaysOkTui {
        called: AtomicBool,
    }

    #[async_trait]
    impl TuiDeliverer for AlwaysOkTui {
        fn deliver(&self, _content: &str, _attachments: &[String]) {
            self.called.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn successful_delivery_removes_from_queue() {
        let dir = tempfile::tempdir().unwrap();
        let router = OutboundRouter::load(dir.path().join("outbound.jsonl")).await.unwrap();
        let inbound = InboundQueue::load(dir.path().join("inbound.jsonl")).await.unwrap();
        router.push(OutboundTarget::Tui, "hi", vec![]).await.unwrap();

        let tui = Arc::new(AlwaysOkTui { called: AtomicBool::new(false) });
        let deliverers = Deliverers { tui: Some(tui.clone()), gui: None, mail: None };
        let outcomes = router.drive(&deliverers, &inbound).await.unwrap();

        assert_eq!(outcomes, vec![DeliveryOutcome::Delivered]);
        assert!(tui.called.load(Ordering::SeqCst));
        assert!(router.queue.lock().await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter_into_inbound() {
        let dir = tempfile::tempdir().unwrap();
        let router = OutboundRouter::load(dir.path().join("outbound.jsonl")).await.unwrap();
        let inbound = InboundQueue::load(dir.path().join("inbound.jsonl")).await.unwrap();
        router.push(OutboundTarget::Gui, "nope", vec![]).await.unwrap();

        let gui = Arc::new(AlwaysFailGui { calls: AtomicUsize::new(0) });
        let deliverers = Deliverers { tui: None, gui: Some(gui.clone()), mail: None };

        // Force every attempt immediately due by resetting next_attempt_at.
        for _ in 0..MAX_ATTEMPTS {
            {
                let mut guard = router.queue.lock().await;
                for m in guard.iter_mut() {
                    m.next_attempt_at = Utc::now().to_rfc3339();
                }
            }
            router.drive(&deliverers, &inbound).await.unwrap();
        }

        assert!(router.queue.lock().await.is_empty());
        assert_eq!(inbound.get_pending().await.len(), 1);
        assert_eq!(gui.calls.load(Ordering::SeqCst) as u32, MAX_ATTEMPTS);
    }
}
