//! Overlay UI protocol (§6): a loopback TCP socket, one newline-framed JSON
//! object per line. The agent pushes `{role, content, timestamp, ...}`
//! frames out; the overlay pushes `{command, content?}` frames back.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use deskagent_agent::message::InboundQueue;
use deskagent_agent::ports::GuiDeliverer;
use deskagent_agent::types::InboundSource;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize)]
struct OverlayFrame<'a> {
    role: &'a str,
    content: &'a str,
    timestamp: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<String>,
    #[serde(rename = "toolCalls", skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OverlayCommand {
    command: String,
    #[serde(default)]
    content: Option<String>,
}

pub struct OverlayServer {
    sender: broadcast::Sender<String>,
    connections: Arc<AtomicUsize>,
    /// Flipped by a `stop_agent` frame; the agent loop polls it at the next
    /// step boundary rather than having the task aborted out from under it.
    pub abort_requested: Arc<AtomicBool>,
}

impl OverlayServer {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender, connections: Arc::new(AtomicUsize::new(0)), abort_requested: Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_connected(&self) -> bool {
        self.connections.load(Ordering::SeqCst) > 0
    }

    /// Accept connections in the background, forwarding `send_to_agent`
    /// frames into `inbound` and `stop_agent` into `abort_requested`.
    pub async fn serve(self: Arc<Self>, port: u16, inbound: Arc<InboundQueue>) -> Result<()> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.context("binding overlay socket")?;
        tracing::info!(port, "overlay socket listening");
        loop {
            let (socket, _) = listener.accept().await.context("accepting overlay connection")?;
            let this = self.clone();
            let inbound = inbound.clone();
            tokio::spawn(async move {
                this.connections.fetch_add(1, Ordering::SeqCst);
                if let Err(e) = this.handle_connection(socket, inbound).await {
                    tracing::warn!(error = %e, "overlay connection ended with error");
                }
                this.connections.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    async fn handle_connection(&self, socket: tokio::net::TcpStream, inbound: Arc<InboundQueue>) -> Result<()> {
        let (read_half, mut write_half) = socket.into_split();
        let mut receiver = self.sender.subscribe();
        let mut lines = BufReader::new(read_half).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("reading overlay frame")? else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<OverlayCommand>(&line) {
                        Ok(cmd) if cmd.command == "send_to_agent" => {
                            if let Some(content) = cmd.content {
                                let _ = inbound.push(InboundSource::Gui, content).await;
                            }
                        }
                        Ok(cmd) if cmd.command == "stop_agent" => {
                            self.abort_requested.store(true, Ordering::SeqCst);
                        }
                        Ok(cmd) => tracing::warn!(command = %cmd.command, "unknown overlay command"),
                        Err(e) => tracing::warn!(error = %e, "malformed overlay frame"),
                    }
                }
                frame = receiver.recv() => {
                    match frame {
                        Ok(frame) => {
                            write_half.write_all(frame.as_bytes()).await.context("writing overlay frame")?;
                            write_half.write_all(b"\n").await.context("writing overlay frame")?;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for OverlayServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GuiDeliverer for OverlayServer {
    async fn deliver(&self, role: &str, content: &str, attachments: &[String], tool_calls: &[String]) -> bool {
        if !self.is_connected() {
            return false;
        }
        let frame = OverlayFrame {
            role,
            content,
            timestamp: chrono::Utc::now().to_rfc3339(),
            attachments: attachments.to_vec(),
            tool_calls: tool_calls.to_vec(),
        };
        match serde_json::to_string(&frame) {
            Ok(json) => self.sender.send(json).is_ok(),
            Err(_) => false,
        }
    }
}
