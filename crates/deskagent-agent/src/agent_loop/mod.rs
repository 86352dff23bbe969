//! Core agent loop: a single cooperative task cycling observe → think → act
//! (§4.5). No parallelism inside the loop itself; every I/O call is awaited
//! to completion before the next numbered step runs.
//!
//! Sub-modules:
//!   - `helpers`    — external-change detection, idle wait, observation capture
//!   - `execution`  — tool-call batch dispatch and round bookkeeping
//!   - `reflection` — no-tool-call handling and the repeated-click reminder

mod execution;
mod helpers;
mod reflection;

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::llm::{CallMode, ChatOptions, LlmClient};
use crate::message::{parse_reply, mirror_tui_to_gui_if_overlay_active, Deliverers, InboundQueue, OutboundRouter};
use crate::ports::{AccessibilityBackend, InputController, ScreenshotProvider};
use crate::prompt::PromptBuilder;
use crate::storage::Storage;
use crate::tools::{ToolContext, ToolRegistry};
use crate::types::{EventSink, ImageInput, MediaType, Message, OutboundTarget, StateSnapshot, Step, ToolDefinition};

use reflection::NoToolCallOutcome;

pub struct AgentConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub call_mode_override: Option<CallMode>,
    pub temperature: Option<f64>,
    pub workspace: PathBuf,
    /// Root for steps/screenshots/traces/queues, distinct from the
    /// tool-visible workspace (`~/.deskagent` by default).
    pub data_dir: PathBuf,
    pub platform: String,
    /// Interactive mode never exits autonomously (§4.5.3).
    pub interactive: bool,
    pub max_steps: u64,
    /// App names eligible for external-change tracking; empty = watch all.
    pub ax_whitelist: Vec<String>,
    pub overlay_active: bool,
    /// Poll interval for step 3's idle wait (`AgentFeatureFlags::idle_poll_ms`).
    pub idle_poll_ms: u64,
    /// Pause after each tool-call batch (`AgentFeatureFlags::step_delay_ms`),
    /// throttling how fast the loop re-observes after acting.
    pub step_delay_ms: u64,
}

/// State carried from one step to the next (§4.5.1).
pub struct LoopState {
    pub current_task: String,
    pub todo_summary: String,
    pub screen_enabled: bool,
    pub pending_tool_screenshots: Vec<ImageInput>,
    pub round_clicks: crate::types::RoundClicks,
    pub no_tool_call_count: u32,
    pub last_had_tool_call: bool,
    pub screen_context: (u32, u32),
    pub messages: Vec<Message>,
    pub ax_diff_baseline: Option<StateSnapshot>,
    pub ax_tool_diff_added: HashMap<String, u32>,
    pub step_count: u64,
    /// Last 5 steps, shown in the computer message's "recent steps" section.
    pub recent_steps: VecDeque<Step>,
    /// Rendered tool results from the previous round's tool-call batch,
    /// shown in this round's "Tool Execution Results" section.
    pub last_tool_results: Vec<(String, String)>,
}

impl Default for LoopState {
    fn default() -> Self {
        Self {
            current_task: String::new(),
            todo_summary: String::new(),
            screen_enabled: true,
            pending_tool_screenshots: Vec::new(),
            round_clicks: crate::types::RoundClicks::new(10),
            no_tool_call_count: 0,
            last_had_tool_call: false,
            screen_context: (0, 0),
            messages: Vec::new(),
            ax_diff_baseline: None,
            ax_tool_diff_added: HashMap::new(),
            step_count: 0,
            recent_steps: VecDeque::with_capacity(5),
            last_tool_results: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub enum LoopOutcome {
    Finished { steps: u64 },
    MaxStepsReached { steps: u64 },
}

pub struct AgentLoop {
    config: AgentConfig,
    llm: LlmClient,
    tools: ToolRegistry,
    screenshot: Arc<dyn ScreenshotProvider>,
    input: Arc<dyn InputController>,
    accessibility: Option<Arc<dyn AccessibilityBackend>>,
    inbound: Arc<InboundQueue>,
    outbound: Arc<OutboundRouter>,
    deliverers: Deliverers,
    storage: Storage,
    prompt: PromptBuilder,
    pub state: LoopState,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        config: AgentConfig,
        tools: ToolRegistry,
        screenshot: Arc<dyn ScreenshotProvider>,
        input: Arc<dyn InputController>,
        accessibility: Option<Arc<dyn AccessibilityBackend>>,
        deliverers: Deliverers,
    ) -> Result<Self> {
        let storage = Storage::new(config.data_dir.clone());
        let inbound = Arc::new(InboundQueue::load(storage.queue_dir().join("inbound.jsonl")).await?);
        let outbound = Arc::new(OutboundRouter::load(storage.queue_dir().join("outbound.jsonl")).await?);
        inbound.reset_processing().await?;

        Ok(Self {
            llm: LlmClient::new(&config.api_base, &config.api_key),
            config,
            tools,
            screenshot,
            input,
            accessibility,
            inbound,
            outbound,
            deliverers,
            storage,
            prompt: PromptBuilder::default(),
            state: LoopState::default(),
        })
    }

    /// Shared handle background deliverer tasks (terminal reader, overlay
    /// socket, mail watcher) push arriving messages into (§5).
    pub fn inbound_handle(&self) -> Arc<InboundQueue> {
        self.inbound.clone()
    }

    /// `--clear`: drop queued inbound messages before the first step.
    pub async fn clear_queues(&self) -> Result<()> {
        self.inbound.clear_pending().await
    }

    /// Runs until termination or `cancel` flips true. `cancel` is only
    /// checked at the top of the step loop — the next suspension boundary —
    /// so a tool-call batch already in flight always runs to completion (§5).
    pub async fn run(
        &mut self,
        initial_task: Option<String>,
        event_sink: &mut dyn EventSink,
        cancel: &std::sync::atomic::AtomicBool,
    ) -> Result<LoopOutcome> {
        if let Some(task) = initial_task {
            self.state.current_task = task;
        }
        if self.state.messages.is_empty() {
            let tools_desc = describe_tools(&self.tools.definitions());
            self.state.messages.push(Message::system(self.prompt.system_prompt(&tools_desc, &self.config.platform)));
        }

        let mut first_step = true;

        loop {
            if cancel.load(std::sync::atomic::Ordering::SeqCst) {
                event_sink.on_status("stop requested, exiting at step boundary");
                return Ok(LoopOutcome::Finished { steps: self.state.step_count });
            }

            if self.state.step_count >= self.config.max_steps {
                event_sink.on_status("reached max steps");
                return Ok(LoopOutcome::MaxStepsReached { steps: self.state.step_count });
            }

            // Step 1: surface any change that wasn't ours.
            helpers::external_change_check(&mut self.state, self.accessibility.as_ref(), &self.config.ax_whitelist, &self.inbound).await?;

            // Step 2: drain inbound, or step 3: idle-wait without advancing stepCount.
            // A task already set (CLI arg, or the `task` tool) has somewhere to go even
            // with nothing queued, so it skips idle-wait on both the first iteration and
            // the no-tool-call ceiling; an idle agent with no task waits for something to do.
            let pending = self.inbound.get_pending().await;
            let has_user_message = if !pending.is_empty() {
                let ids: Vec<String> = pending.iter().map(|m| m.id.clone()).collect();
                self.inbound.mark_processing(&ids).await?;
                let rendered = InboundQueue::format_pending_as_chat(&pending);
                self.state.messages.push(Message::user(rendered.clone()));
                self.inbound.consume_all(&ids).await?;
                if let Some(gui) = &self.deliverers.gui {
                    let _ = gui.deliver("user", &rendered, &[], &[]).await;
                }
                self.state.no_tool_call_count = 0;
                self.state.last_had_tool_call = true;
                true
            } else if self.state.current_task.is_empty() && (first_step || (!self.state.last_had_tool_call && self.state.no_tool_call_count >= 2)) {
                helpers::idle_wait(
                    self.accessibility.as_ref(),
                    &self.config.ax_whitelist,
                    &self.inbound,
                    &mut self.state.ax_diff_baseline,
                    std::time::Duration::from_millis(self.config.idle_poll_ms),
                    cancel,
                )
                .await?;
                continue;
            } else {
                false
            };
            first_step = false;
            self.state.step_count += 1;

            // Step 4: observation.
            let screen_status = helpers::capture_observation(&self.input, self.state.screen_context.0, self.state.screen_context.1, self.state.screen_enabled).await;
            let reminder = reflection::repetition_reminder(&self.state.round_clicks);

            // Step 6 (image list) computed before step 5's text, since the
            // primary screenshot result feeds screenStatus too.
            let mut images = Vec::new();
            if self.state.screen_enabled {
                match self.screenshot.capture(&self.storage.today_screenshots_dir()?).await {
                    Ok(info) => {
                        self.state.screen_context = (info.screen_width, info.screen_height);
                        images.push(ImageInput { source: crate::types::ImageSource::Path(info.path), media_type: MediaType::Png, label: Some("screen".to_string()) });
                    }
                    Err(e) => {
                        event_sink.on_status(&format!("screenshot failed: {e}"));
                        anyhow::bail!("screenshot capture failed: {e}");
                    }
                }
            }
            images.append(&mut self.state.pending_tool_screenshots);

            // Step 5: compose the computer message.
            let recent: Vec<Step> = self.state.recent_steps.iter().cloned().collect();
            let content = self.prompt.computer_message(
                &self.state.current_task,
                &self.state.todo_summary,
                &recent,
                &screen_status,
                &self.state.last_tool_results,
                reminder,
                has_user_message,
            );
            self.state.last_tool_results.clear();

            let computer_msg = Message::computer(content.clone(), images.clone());
            self.state.messages.push(computer_msg);
            if let Some(gui) = &self.deliverers.gui {
                let _ = gui.deliver("computer", &content, &[], &[]).await;
            }

            // Step 7: baseline for next iteration's external-change check.
            if let Some(ax) = &self.accessibility {
                self.state.ax_diff_baseline = ax.capture_state(None).await.ok();
            }

            // Step 8: LLM call, racing the cancel flag so stop_agent can
            // abort an in-flight request rather than wait for it (§4.2 abort()).
            let mode = self.config.call_mode_override.unwrap_or(CallMode::Native);
            let opts = ChatOptions { model: &self.config.model, mode, tools: &self.tools.definitions(), temperature: self.config.temperature };
            let reply = tokio::select! {
                r = self.llm.chat(&self.state.messages, &images, &opts) => r?,
                _ = helpers::wait_for_cancel(cancel) => {
                    event_sink.on_status("stop requested, aborting in-flight LLM call");
                    return Ok(LoopOutcome::Finished { steps: self.state.step_count });
                }
            };
            if let Some(usage) = &reply.usage {
                tracing::info!(prompt_tokens = usage.prompt_tokens, completion_tokens = usage.completion_tokens, "llm usage");
            }

            // Step 9: dispatch reply through the message layer, then forward
            // the raw reply (and any tool-call names) to the GUI so it can
            // render the assistant turn even when no <chat> block is present.
            if let Some(raw) = &reply.content {
                event_sink.on_text(raw);
                self.dispatch_reply(raw).await?;
            }
            if let Some(gui) = &self.deliverers.gui {
                let tool_call_names: Vec<String> = reply.tool_calls.iter().map(|t| t.name.clone()).collect();
                if reply.content.is_some() || !tool_call_names.is_empty() {
                    let content = reply.content.clone().unwrap_or_default();
                    let _ = gui.deliver("assistant", &content, &[], &tool_call_names).await;
                }
            }

            // Step 10: append assistant message.
            self.state.messages.push(Message::assistant(reply.content.clone(), reply.tool_calls.clone()));

            // Step 11: parse error recovery. Surfaces both the human-readable
            // message and the raw payload so the model can see exactly what
            // it sent and self-correct.
            if let Some(err) = &reply.parse_error {
                let notice = format!("<error>{}\n\nRaw output:\n{}</error>", err.message, err.raw);
                self.state.last_tool_results.push(("system_error".to_string(), notice));
                continue;
            }

            if reply.tool_calls.is_empty() {
                // Step 12: no tool call.
                match reflection::handle_no_tool_call(&mut self.state, self.config.interactive) {
                    NoToolCallOutcome::Nudge => {
                        self.state.last_tool_results.push(("system_reminder".to_string(), reflection::completion_checklist().to_string()));
                        continue;
                    }
                    NoToolCallOutcome::Finished => return Ok(LoopOutcome::Finished { steps: self.state.step_count }),
                    NoToolCallOutcome::ClearedTask => continue,
                }
            }

            // Step 13 + 14: execute tools and do round bookkeeping.
            let ctx = ToolContext {
                screenshot: self.screenshot.clone(),
                input: self.input.clone(),
                accessibility: self.accessibility.clone(),
                workspace: self.config.workspace.clone(),
                screenshot_dir: self.storage.today_screenshots_dir()?,
                screen_width: self.state.screen_context.0,
                screen_height: self.state.screen_context.1,
                step_count: self.state.step_count,
            };
            let batch = execution::execute_tool_batch(
                &mut self.state,
                &self.tools,
                &ctx,
                &reply.tool_calls,
                self.accessibility.as_ref(),
                &self.config.ax_whitelist,
                &self.storage,
                event_sink,
                &self.deliverers,
                self.config.step_delay_ms,
            )
            .await?;

            self.state.last_tool_results = batch.rendered_results;

            if batch.need_user_input {
                event_sink.on_status("agent requested user input");
            }
            if batch.finished {
                if self.config.interactive {
                    self.state.current_task.clear();
                } else {
                    event_sink.on_status(&format!("Task completed in {} steps", self.state.step_count));
                    return Ok(LoopOutcome::Finished { steps: self.state.step_count });
                }
            }
        }
    }

    async fn dispatch_reply(&self, raw: &str) -> Result<()> {
        let parsed = parse_reply(raw);
        let parsed = mirror_tui_to_gui_if_overlay_active(parsed, self.config.overlay_active);

        if let Some(tui) = &parsed.tui {
            self.outbound.push(OutboundTarget::Tui, tui.clone(), parsed.attachments.clone()).await?;
        }
        if let Some(gui) = &parsed.gui {
            self.outbound.push(OutboundTarget::Gui, gui.clone(), parsed.attachments.clone()).await?;
        }
        if let Some(mail) = &parsed.mail {
            self.outbound
                .push(OutboundTarget::Mail { to: mail.recipient.clone(), subject: mail.title.clone() }, mail.content.clone(), parsed.attachments.clone())
                .await?;
        }

        self.outbound.drive(&self.deliverers, &self.inbound).await?;
        Ok(())
    }
}

fn describe_tools(defs: &[ToolDefinition]) -> String {
    defs.iter().map(|d| format!("- {}: {}", d.name, d.description)).collect::<Vec<_>>().join("\n")
}
