//! End-to-end scenario tests (S1-S6): a real `AgentLoop` driven against a
//! stubbed OpenAI-compatible endpoint (`wiremock`) and fake platform ports,
//! the way `skilllite-artifact`'s own integration tests stub its HTTP
//! dependencies rather than mocking at the function-call level.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use deskagent_agent::llm::CallMode;
use deskagent_agent::message::{DeliveryOutcome, Deliverers, InboundQueue, OutboundRouter};
use deskagent_agent::ports::{
    AccessibilityBackend, GuiDeliverer, InputController, MouseButton, ScreenshotInfo, ScreenshotProvider, SearchHit, TuiDeliverer,
};
use deskagent_agent::prompt::REPEATED_CLICK_REMINDER;
use deskagent_agent::tools::ToolRegistry;
use deskagent_agent::types::{EventSink, InboundSource, OutboundTarget, StateSnapshot};
use deskagent_agent::{AgentConfig, AgentLoop, LoopOutcome};

// ─── Shared fakes ───────────────────────────────────────────────────────────

struct FakeScreenshot;

#[async_trait]
impl ScreenshotProvider for FakeScreenshot {
    async fn capture(&self, dest_dir: &Path) -> anyhow::Result<ScreenshotInfo> {
        Ok(ScreenshotInfo { path: dest_dir.join("fake.png").display().to_string(), screen_width: 1000, screen_height: 1000 })
    }
}

struct FakeInput;

#[async_trait]
impl InputController for FakeInput {
    async fn mouse_move(&self, _x: i32, _y: i32) -> anyhow::Result<()> {
        Ok(())
    }
    async fn mouse_click(&self, _x: i32, _y: i32, _button: MouseButton, _double: bool) -> anyhow::Result<()> {
        Ok(())
    }
    async fn mouse_drag(&self, _from: (i32, i32), _to: (i32, i32)) -> anyhow::Result<()> {
        Ok(())
    }
    async fn scroll(&self, _dx: i32, _dy: i32) -> anyhow::Result<()> {
        Ok(())
    }
    async fn type_text(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn hotkey(&self, _keys: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn mouse_position(&self) -> anyhow::Result<(i32, i32)> {
        Ok((0, 0))
    }
    async fn screen_size(&self) -> anyhow::Result<(u32, u32)> {
        Ok((1000, 1000))
    }
    async fn focused_window_title(&self) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

/// Returns `before` for its first `switch_after` calls, `after` from then on,
/// regardless of which method or point was asked about — good enough to
/// script a single pre/post accessibility transition around one tool call.
struct ScriptedAx {
    switch_after: usize,
    calls: AtomicUsize,
    before: StateSnapshot,
    after: StateSnapshot,
}

impl ScriptedAx {
    fn current(&self) -> StateSnapshot {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.switch_after {
            self.before.clone()
        } else {
            self.after.clone()
        }
    }
}

#[async_trait]
impl AccessibilityBackend for ScriptedAx {
    async fn capture_state(&self, _point: Option<(i32, i32)>) -> anyhow::Result<StateSnapshot> {
        Ok(self.current())
    }
    async fn element_at_point(&self, _x: i32, _y: i32) -> anyhow::Result<Option<deskagent_agent::types::Element>> {
        Ok(None)
    }
    async fn search(&self, _keyword: &str, _max_results: usize) -> anyhow::Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
    async fn nearby_elements(&self, _x: i32, _y: i32, _count: usize, _distance: u32) -> anyhow::Result<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

struct NullEventSink;

impl EventSink for NullEventSink {
    fn on_text(&mut self, _text: &str) {}
    fn on_tool_call(&mut self, _name: &str, _arguments: &serde_json::Value) {}
    fn on_tool_result(&mut self, _name: &str, _result: &deskagent_agent::types::ToolResult) {}
    fn on_status(&mut self, _text: &str) {}
}

#[derive(Default)]
struct CapturingEventSink {
    statuses: Vec<String>,
}

impl EventSink for CapturingEventSink {
    fn on_text(&mut self, _text: &str) {}
    fn on_tool_call(&mut self, _name: &str, _arguments: &serde_json::Value) {}
    fn on_tool_result(&mut self, _name: &str, _result: &deskagent_agent::types::ToolResult) {}
    fn on_status(&mut self, text: &str) {
        self.statuses.push(text.to_string());
    }
}

#[derive(Default)]
struct CapturingTui {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl TuiDeliverer for CapturingTui {
    fn deliver(&self, content: &str, _attachments: &[String]) {
        self.messages.lock().unwrap().push(content.to_string());
    }
}

#[derive(Default)]
struct CapturingGui {
    frames: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl GuiDeliverer for CapturingGui {
    async fn deliver(&self, role: &str, content: &str, _attachments: &[String], _tool_calls: &[String]) -> bool {
        self.frames.lock().unwrap().push((role.to_string(), content.to_string()));
        true
    }
}

/// Returns a different stubbed body on each call, clamping to the last entry
/// once the scenario has exhausted the scripted sequence.
struct SequencedJson {
    bodies: Vec<serde_json::Value>,
    idx: AtomicUsize,
}

impl Respond for SequencedJson {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let i = self.idx.fetch_add(1, Ordering::SeqCst);
        let body = self.bodies.get(i).or_else(|| self.bodies.last()).cloned().unwrap_or_else(|| json!({}));
        ResponseTemplate::new(200).set_body_json(body)
    }
}

fn base_config(api_base: String, data_dir: std::path::PathBuf, interactive: bool, max_steps: u64) -> AgentConfig {
    AgentConfig {
        api_base,
        api_key: "test-key".to_string(),
        model: "gpt-4o-mini".to_string(),
        call_mode_override: None,
        temperature: None,
        workspace: data_dir.clone(),
        data_dir,
        platform: "test".to_string(),
        interactive,
        max_steps,
        ax_whitelist: Vec::new(),
        overlay_active: false,
        idle_poll_ms: 5,
        step_delay_ms: 0,
    }
}

// ─── S1: single task completes cleanly ──────────────────────────────────────

#[tokio::test]
async fn s1_single_task_completes_cleanly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": null, "tool_calls": [
                { "id": "1", "type": "function", "function": { "name": "finished", "arguments": "{}" } }
            ] } }]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(server.uri(), dir.path().to_path_buf(), false, 5);
    let mut agent = AgentLoop::new(config, ToolRegistry::with_builtins(), Arc::new(FakeScreenshot), Arc::new(FakeInput), None, Deliverers { tui: None, gui: None, mail: None })
        .await
        .unwrap();

    let mut sink = CapturingEventSink::default();
    let cancel = AtomicBool::new(false);
    let outcome = agent.run(Some("greet me".to_string()), &mut sink, &cancel).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::Finished { steps: 1 }));
    assert!(sink.statuses.iter().any(|s| s.contains("Task completed in 1 steps")));
    assert!(matches!(agent.state.last_tool_results.first(), Some((name, _)) if name.starts_with("finished(")));

    let day_dirs: Vec<_> = std::fs::read_dir(dir.path().join("memory/steps")).unwrap().collect();
    assert_eq!(day_dirs.len(), 1);
    let files: Vec<_> = std::fs::read_dir(day_dirs[0].as_ref().unwrap().path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

// ─── S2: interactive echo ────────────────────────────────────────────────────

#[tokio::test]
async fn s2_interactive_echo() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(SequencedJson {
            bodies: vec![
                json!({ "choices": [{ "message": { "content": "<chat><tui>pong</tui></chat>" } }] }),
                json!({ "choices": [{ "message": { "content": null } }] }),
            ],
            idx: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(server.uri(), dir.path().to_path_buf(), true, 1000);
    let tui = Arc::new(CapturingTui::default());
    let mut agent = AgentLoop::new(
        config,
        ToolRegistry::with_builtins(),
        Arc::new(FakeScreenshot),
        Arc::new(FakeInput),
        None,
        Deliverers { tui: Some(tui.clone()), gui: None, mail: None },
    )
    .await
    .unwrap();

    let inbound = agent.inbound_handle();
    inbound.push(InboundSource::Tui, "ping").await.unwrap();

    let cancel = Arc::new(AtomicBool::new(false));
    let run_cancel = cancel.clone();
    let mut sink = NullEventSink;
    let handle = tokio::spawn(async move { agent.run(None, &mut sink, &run_cancel).await });

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    cancel.store(true, Ordering::SeqCst);
    let outcome = handle.await.unwrap().unwrap();

    assert!(matches!(outcome, LoopOutcome::Finished { .. }));
    let delivered = tui.messages.lock().unwrap();
    assert_eq!(delivered.as_slice(), ["pong".to_string()]);
}

// ─── S3: click with diff ─────────────────────────────────────────────────────

#[tokio::test]
async fn s3_click_with_diff() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": null, "tool_calls": [
                { "id": "1", "type": "function", "function": { "name": "click", "arguments": "{\"coordinate\":[500,500]}" } }
            ] } }]
        })))
        .mount(&server)
        .await;

    let before = StateSnapshot { focused_application: Some("Finder".to_string()), ..Default::default() };
    let after = StateSnapshot { focused_application: Some("TextEdit".to_string()), ..Default::default() };
    let ax: Arc<dyn AccessibilityBackend> = Arc::new(ScriptedAx { switch_after: 3, calls: AtomicUsize::new(0), before, after });

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(server.uri(), dir.path().to_path_buf(), false, 1);
    let mut agent = AgentLoop::new(
        config,
        ToolRegistry::with_builtins(),
        Arc::new(FakeScreenshot),
        Arc::new(FakeInput),
        Some(ax),
        Deliverers { tui: None, gui: None, mail: None },
    )
    .await
    .unwrap();

    let mut sink = NullEventSink;
    let cancel = AtomicBool::new(false);
    let outcome = agent.run(Some("switch apps".to_string()), &mut sink, &cancel).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::MaxStepsReached { steps: 1 }));
    let (_, projection) = agent.state.last_tool_results.first().expect("click produced a rendered result");
    assert!(projection.contains("Active application changed: Finder -> TextEdit"), "got: {projection}");
}

// ─── S4: parse error recovery ────────────────────────────────────────────────

#[tokio::test]
async fn s4_parse_error_recovery() {
    let server = MockServer::start().await;
    let truncated = "<Action>[ {\"name\": \"click\"";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": truncated } }]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(server.uri(), dir.path().to_path_buf(), false, 1);
    config.call_mode_override = Some(CallMode::Text);
    let mut agent = AgentLoop::new(config, ToolRegistry::with_builtins(), Arc::new(FakeScreenshot), Arc::new(FakeInput), None, Deliverers { tui: None, gui: None, mail: None })
        .await
        .unwrap();

    let mut sink = NullEventSink;
    let cancel = AtomicBool::new(false);
    let outcome = agent.run(Some("do something".to_string()), &mut sink, &cancel).await.unwrap();

    assert!(matches!(outcome, LoopOutcome::MaxStepsReached { steps: 1 }));
    let (name, body) = agent.state.last_tool_results.first().expect("parse error recorded a result");
    assert_eq!(name, "system_error");
    assert!(body.contains("not valid JSON"), "got: {body}");
    assert!(body.contains(truncated), "got: {body}");
}

// ─── S5: repeated-click reminder ─────────────────────────────────────────────

#[tokio::test]
async fn s5_repeated_click_reminder() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": null, "tool_calls": [
                { "id": "1", "type": "function", "function": { "name": "click", "arguments": "{\"coordinate\":[100,100]}" } }
            ] } }]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = base_config(server.uri(), dir.path().to_path_buf(), false, 3);
    let gui = Arc::new(CapturingGui::default());
    let mut agent = AgentLoop::new(
        config,
        ToolRegistry::with_builtins(),
        Arc::new(FakeScreenshot),
        Arc::new(FakeInput),
        None,
        Deliverers { tui: None, gui: Some(gui.clone()), mail: None },
    )
    .await
    .unwrap();

    let mut sink = NullEventSink;
    let cancel = AtomicBool::new(false);
    let outcome = agent.run(Some("click repeatedly".to_string()), &mut sink, &cancel).await.unwrap();
    assert!(matches!(outcome, LoopOutcome::MaxStepsReached { steps: 3 }));

    let frames = gui.frames.lock().unwrap();
    let computer_frames: Vec<&String> = frames.iter().filter(|(role, _)| role == "computer").map(|(_, c)| c).collect();
    assert_eq!(computer_frames.len(), 3);
    assert!(computer_frames[2].contains(REPEATED_CLICK_REMINDER), "third round should carry the reminder");
}

// ─── S6: outbound retry ──────────────────────────────────────────────────────

struct FlakyGui {
    calls: AtomicUsize,
    fail_for: usize,
}

#[async_trait]
impl GuiDeliverer for FlakyGui {
    async fn deliver(&self, _role: &str, _content: &str, _attachments: &[String], _tool_calls: &[String]) -> bool {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        n >= self.fail_for
    }
}

#[tokio::test]
async fn s6_outbound_retry_then_success() {
    let dir = tempfile::tempdir().unwrap();
    let router = OutboundRouter::load(dir.path().join("outbound.jsonl")).await.unwrap();
    let inbound = InboundQueue::load(dir.path().join("inbound.jsonl")).await.unwrap();
    router.push(OutboundTarget::Gui, "hello", vec![]).await.unwrap();

    // Fails its first two attempts, then succeeds. `queue`'s next_attempt_at
    // backoff is private to `message::outbound`, so rather than forcing due
    // times the way its own unit tests do, this just waits out the real
    // exponential backoff (2s, then 4s) between drive() passes.
    let gui = Arc::new(FlakyGui { calls: AtomicUsize::new(0), fail_for: 2 });
    let deliverers = Deliverers { tui: None, gui: Some(gui.clone()), mail: None };

    let mut delivered = false;
    let mut retries = 0u32;
    for _ in 0..6 {
        let outcomes = router.drive(&deliverers, &inbound).await.unwrap();
        if outcomes.contains(&DeliveryOutcome::Delivered) {
            delivered = true;
            break;
        }
        if outcomes.contains(&DeliveryOutcome::Retrying) {
            retries += 1;
            let wait_secs = 2i64.saturating_pow(retries.min(6)) + 1;
            tokio::time::sleep(std::time::Duration::from_secs(wait_secs as u64)).await;
        }
    }

    assert!(delivered);
    assert_eq!(gui.calls.load(Ordering::SeqCst), 3);
    assert!(inbound.get_pending().await.is_empty());
}
