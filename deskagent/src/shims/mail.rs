//! Mail deliverer (SMTP) and watcher (IMAP poll) shim.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use deskagent_agent::message::InboundQueue;
use deskagent_agent::ports::MailDeliverer;
use deskagent_agent::types::InboundSource;
use lettre::message::Message as LettreMessage;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};

pub struct SmtpMailDeliverer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailDeliverer {
    pub fn new(smtp_host: &str, smtp_port: u16, username: &str, password: &str, from: String) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
            .context("building SMTP transport")?
            .port(smtp_port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl MailDeliverer for SmtpMailDeliverer {
    async fn deliver(&self, to: &str, subject: &str, body: &str, _attachments: &[String]) -> bool {
        let from = match self.from.parse() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!(from = %self.from, error = %e, "invalid mail sender configured");
                return false;
            }
        };
        let to = match to.parse() {
            Ok(addr) => addr,
            Err(e) => {
                tracing::warn!(to, error = %e, "invalid mail recipient");
                return false;
            }
        };
        let email = match LettreMessage::builder().from(from).to(to).subject(subject).body(body.to_string()) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "building mail message failed");
                return false;
            }
        };
        match self.transport.send(email).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "SMTP send failed");
                false
            }
        }
    }
}

/// `data/mail-uids.json`: dedupe state across watcher restarts, trimmed to
/// the last 1000 seen UIDs (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MailUidState {
    uids: Vec<String>,
    #[serde(default)]
    last_check: Option<String>,
}

const MAX_TRACKED_UIDS: usize = 1000;

fn load_uid_state(path: &PathBuf) -> MailUidState {
    std::fs::read_to_string(path).ok().and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

fn save_uid_state(path: &PathBuf, state: &MailUidState) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("creating mail state directory")?;
    }
    std::fs::write(path, serde_json::to_string_pretty(state)?).context("writing mail-uids.json")
}

/// Poll an IMAP mailbox once, pushing any unseen message as an inbound
/// `mail` message. Restart this on a fixed 5 s delay when it errors (§5).
pub async fn poll_once(imap_host: &str, imap_port: u16, username: &str, password: &str, uid_state_path: PathBuf, inbound: &Arc<InboundQueue>) -> Result<()> {
    let tcp = tokio::net::TcpStream::connect((imap_host, imap_port)).await.context("connecting to IMAP host")?;
    let native_connector = native_tls::TlsConnector::new().context("building TLS connector")?;
    let connector = tokio_native_tls::TlsConnector::from(native_connector);
    let tls_stream = connector.connect(imap_host, tcp).await.context("IMAP TLS handshake")?;
    let client = async_imap::Client::new(tls_stream);
    let mut session = client.login(username, password).await.map_err(|(e, _)| e).context("IMAP login")?;
    session.select("INBOX").await.context("selecting INBOX")?;

    let mut state = load_uid_state(&uid_state_path);
    let messages = session.fetch("1:*", "(UID ENVELOPE)").await.context("IMAP fetch")?;
    use futures::stream::StreamExt;
    let fetched: Vec<_> = messages.collect().await;

    for msg in fetched {
        let msg = msg.context("reading IMAP fetch response")?;
        let Some(uid) = msg.uid else { continue };
        let uid = uid.to_string();
        if state.uids.contains(&uid) {
            continue;
        }
        let subject = msg.envelope().and_then(|e| e.subject.as_ref()).map(|s| String::from_utf8_lossy(s).to_string()).unwrap_or_default();
        let from = msg.envelope().and_then(|e| e.from.as_ref()).and_then(|f| f.first()).and_then(|a| a.mailbox.as_ref()).map(|m| String::from_utf8_lossy(m).to_string()).unwrap_or_default();
        inbound.push(InboundSource::Mail, format!("From: {from}\nSubject: {subject}")).await.context("pushing mail to inbound queue")?;
        state.uids.push(uid);
    }

    if state.uids.len() > MAX_TRACKED_UIDS {
        let overflow = state.uids.len() - MAX_TRACKED_UIDS;
        state.uids.drain(0..overflow);
    }
    state.last_check = Some(chrono::Utc::now().to_rfc3339());
    save_uid_state(&uid_state_path, &state)?;

    session.logout().await.context("IMAP logout")?;
    Ok(())
}
