mod cli;
mod overlay;
mod shims;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use deskagent_agent::agent_loop::{AgentConfig, AgentLoop, LoopOutcome};
use deskagent_agent::llm::parse_call_mode;
use deskagent_agent::message::Deliverers;
use deskagent_agent::tools::ToolRegistry;
use deskagent_agent::types::{InboundSource, OverlayAwareEventSink, TerminalEventSink};
use deskagent_core::config::{AccessibilityConfig, AgentFeatureFlags, ChannelConfig, LlmConfig, PathsConfig};

use cli::Cli;
use overlay::OverlayServer;
use shims::accessibility::SubprocessAccessibility;
use shims::input::EnigoInputController;
use shims::mail::SmtpMailDeliverer;
use shims::screenshot::XcapScreenshotProvider;
use shims::tui::StdoutTuiDeliverer;

fn main() -> Result<()> {
    deskagent_core::observability::init();
    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new().context("building tokio runtime")?;
    match rt.block_on(run(cli)) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut llm_config = LlmConfig::from_env();
    if let Some(provider) = cli.provider_name() {
        apply_provider_defaults(&mut llm_config, &provider);
    }
    if llm_config.api_key.is_empty() {
        anyhow::bail!("no API key configured; set the provider's API key env var");
    }

    let paths = PathsConfig::from_env();
    let ax_config = AccessibilityConfig::from_env();
    let channel_config = ChannelConfig::from_env();
    let feature_flags = AgentFeatureFlags::from_env();
    let temperature = std::env::var("DESKAGENT_TEMPERATURE").ok().and_then(|s| s.trim().parse::<f64>().ok());

    let workspace = PathBuf::from(&paths.workspace);
    let data_dir = paths.data_dir.clone();

    let interactive = cli.interactive || cli.task.is_none();

    let config = AgentConfig {
        api_base: llm_config.api_base.clone(),
        api_key: llm_config.api_key.clone(),
        model: llm_config.model.clone(),
        call_mode_override: parse_call_mode(llm_config.forced_tool_mode.as_deref()),
        temperature,
        workspace: workspace.clone(),
        data_dir: data_dir.clone(),
        platform: std::env::consts::OS.to_string(),
        interactive,
        max_steps: feature_flags.max_steps as u64,
        ax_whitelist: ax_config.watched_apps.clone(),
        overlay_active: !cli.no_ui,
        idle_poll_ms: feature_flags.idle_poll_ms,
        step_delay_ms: feature_flags.step_delay_ms,
    };

    let tools = ToolRegistry::with_builtins();
    let screenshot = Arc::new(XcapScreenshotProvider);
    let input = Arc::new(EnigoInputController::new().context("initializing input controller")?);
    let accessibility: Option<Arc<dyn deskagent_agent::ports::AccessibilityBackend>> = ax_config.backend_bin.clone().map(|bin| {
        Arc::new(SubprocessAccessibility::new(bin, ax_config.query_timeout_ms, ax_config.search_timeout_ms, ax_config.snapshot_timeout_ms)) as Arc<dyn deskagent_agent::ports::AccessibilityBackend>
    });

    let overlay = Arc::new(OverlayServer::new());
    let tui = Arc::new(StdoutTuiDeliverer);
    let mail: Option<Arc<dyn deskagent_agent::ports::MailDeliverer>> = if channel_config.mail_send_configured() {
        match SmtpMailDeliverer::new(
            channel_config.smtp_host.as_deref().unwrap(),
            channel_config.smtp_port,
            channel_config.mail_username.as_deref().unwrap(),
            channel_config.mail_password.as_deref().unwrap(),
            channel_config.mail_from.clone().unwrap(),
        ) {
            Ok(deliverer) => Some(Arc::new(deliverer) as Arc<dyn deskagent_agent::ports::MailDeliverer>),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build SMTP deliverer, mail sending disabled");
                None
            }
        }
    } else {
        None
    };
    let deliverers = Deliverers { tui: Some(tui), gui: if cli.no_ui { None } else { Some(overlay.clone()) }, mail };

    let mut agent = AgentLoop::new(config, tools, screenshot, input, accessibility, deliverers).await.context("constructing agent loop")?;

    if cli.clear {
        agent.clear_queues().await.context("clearing queues")?;
    }

    let inbound = agent.inbound_handle();

    if !cli.no_ui {
        let overlay_server = overlay.clone();
        let overlay_inbound = inbound.clone();
        tokio::spawn(async move {
            if let Err(e) = overlay_server.serve(channel_config.overlay_port, overlay_inbound).await {
                tracing::warn!(error = %e, "overlay socket server stopped");
            }
        });
    }

    if interactive {
        spawn_terminal_reader(inbound.clone());
    }

    if channel_config.mail_watch_configured() {
        spawn_mail_watcher(channel_config.clone(), data_dir.clone(), inbound.clone());
    }

    let task = cli.task.clone();
    let verbose = cli.verbose;
    let cancel = overlay.abort_requested.clone();
    let run_cancel = cancel.clone();
    let (status_tx, mut status_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let status_gui = if !cli.no_ui { Some(overlay.clone() as Arc<dyn deskagent_agent::ports::GuiDeliverer>) } else { None };
    tokio::spawn(async move {
        while let Some(text) = status_rx.recv().await {
            if let Some(gui) = &status_gui {
                let _ = gui.deliver("status", &text, &[], &[]).await;
            }
        }
    });
    let run_handle = tokio::spawn(async move {
        let mut sink = OverlayAwareEventSink { terminal: TerminalEventSink { verbose }, status_tx: Some(status_tx) };
        agent.run(task, &mut sink, &run_cancel).await
    });

    let outcome = run_handle.await.context("agent task panicked")??;
    if cancel.load(std::sync::atomic::Ordering::SeqCst) {
        tracing::info!("stop_agent received from overlay, run exited at the next step boundary");
    }

    match outcome {
        LoopOutcome::Finished { steps } => tracing::info!(steps, "agent finished"),
        LoopOutcome::MaxStepsReached { steps } => tracing::warn!(steps, "agent stopped: max steps reached"),
    }

    Ok(())
}

/// `--provider`/shorthand flags override the base URL and default model;
/// the API key still comes from that provider's own env var via `LlmConfig`.
fn apply_provider_defaults(config: &mut LlmConfig, provider: &str) {
    match provider.to_lowercase().as_str() {
        "anthropic" | "claude" => {
            config.api_base = "https://api.anthropic.com/v1".to_string();
            if config.model == "gpt-4o" {
                config.model = "claude-sonnet-4-5".to_string();
            }
        }
        "openai" => {
            config.api_base = "https://api.openai.com/v1".to_string();
        }
        other => tracing::warn!(provider = other, "unknown provider name, using configured defaults"),
    }
}

/// Background watcher task: polls IMAP on a fixed interval and restarts
/// with a 5 s delay if a poll errors (§5).
fn spawn_mail_watcher(channel_config: deskagent_core::config::ChannelConfig, data_dir: PathBuf, inbound: Arc<deskagent_agent::message::InboundQueue>) {
    tokio::spawn(async move {
        let uid_state_path = data_dir.join("mail-uids.json");
        let host = channel_config.imap_host.clone().expect("mail_watch_configured checked imap_host");
        let username = channel_config.mail_username.clone().expect("mail_watch_configured checked username");
        let password = channel_config.mail_password.clone().expect("mail_watch_configured checked password");
        loop {
            if let Err(e) = shims::mail::poll_once(&host, channel_config.imap_port, &username, &password, uid_state_path.clone(), &inbound).await {
                tracing::warn!(error = %e, "mail watcher poll failed, retrying in 5s");
            }
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        }
    });
}

/// Background deliverer task: a `rustyline` prompt on a blocking thread,
/// forwarding each line to an inbound `terminal` message (§5).
fn spawn_terminal_reader(inbound: Arc<deskagent_agent::message::InboundQueue>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match rustyline::DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::warn!(error = %e, "failed to start terminal line editor");
                return;
            }
        };
        loop {
            match rl.readline("You> ") {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(line.as_str());
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(rustyline::error::ReadlineError::Interrupted) | Err(rustyline::error::ReadlineError::Eof) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "terminal reader error");
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = inbound.push(InboundSource::Terminal, line).await {
                tracing::warn!(error = %e, "failed to enqueue terminal input");
            }
        }
    });
}
