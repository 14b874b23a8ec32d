//! Test doubles for the platform boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use rb_domain::error::{Error, Result};
use rb_domain::event::{AgentEvent, BoxStream};
use rb_domain::message::{ButtonRow, MessageRef, PlatformMessage, SendOutcome};
use rb_domain::trigger::Trigger;

use super::{BackendSession, Listener, PermissionGate, ReplySink, TriggerHandler};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recording sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reply sink that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<PlatformMessage>>,
    with_buttons: Mutex<Vec<(PlatformMessage, Vec<ButtonRow>)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain-text bodies of everything sent, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|m| match m {
                PlatformMessage::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn button_messages(&self) -> Vec<(PlatformMessage, Vec<ButtonRow>)> {
        self.with_buttons.lock().clone()
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send(&self, message: PlatformMessage) -> SendOutcome {
        let mut sent = self.sent.lock();
        sent.push(message);
        SendOutcome::Sent(MessageRef(format!("m{}", sent.len())))
    }

    async fn edit(&self, target: &MessageRef, message: PlatformMessage) -> SendOutcome {
        self.sent.lock().push(message);
        SendOutcome::Sent(target.clone())
    }

    async fn send_with_buttons(
        &self,
        message: PlatformMessage,
        buttons: Vec<ButtonRow>,
    ) -> SendOutcome {
        let mut with_buttons = self.with_buttons.lock();
        with_buttons.push((message, buttons));
        SendOutcome::Sent(MessageRef(format!("b{}", with_buttons.len())))
    }

    async fn typing(&self) {}
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the next turn behaves.
#[derive(Clone)]
pub enum TurnMode {
    /// Stream one text delta, then end the turn cleanly.
    Instant(String),
    /// Stream several text deltas, then end the turn cleanly.
    Stream(Vec<String>),
    /// Stream one delta, then park until soft-interrupted.
    Hang,
    /// Park forever and ignore soft interrupts; only an abort stops it.
    HangIgnoring,
    /// Ask the gate for a tool, then report the verdict as text.
    NeedsTool(String),
    /// Fail to start the turn at all.
    FailToStart,
}

pub struct MockBackend {
    mode: Mutex<TurnMode>,
    session_id: Mutex<Option<String>>,
    started: Mutex<Vec<String>>,
    interrupted: Arc<Notify>,
    gate: Mutex<Option<Arc<dyn PermissionGate>>>,
}

impl MockBackend {
    pub fn new(mode: TurnMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            session_id: Mutex::new(None),
            started: Mutex::new(Vec::new()),
            interrupted: Arc::new(Notify::new()),
            gate: Mutex::new(None),
        }
    }

    pub fn set_mode(&self, mode: TurnMode) {
        *self.mode.lock() = mode;
    }

    pub fn set_gate(&self, gate: Arc<dyn PermissionGate>) {
        *self.gate.lock() = Some(gate);
    }

    /// Prompts of every turn started, in order.
    pub fn started_turns(&self) -> Vec<String> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl BackendSession for MockBackend {
    async fn start_turn(&self, prompt: String) -> Result<BoxStream<'static, Result<AgentEvent>>> {
        let mode = self.mode.lock().clone();
        if matches!(mode, TurnMode::FailToStart) {
            return Err(Error::Backend("mock backend refused the turn".into()));
        }
        self.started.lock().push(prompt);
        let interrupted = self.interrupted.clone();
        let gate = self.gate.lock().clone();

        let stream = async_stream::stream! {
            match mode {
                TurnMode::Instant(reply) => {
                    yield Ok(AgentEvent::TextDelta { text: reply });
                    yield Ok(AgentEvent::TurnEnded {
                        backend_session_id: Some("mock-session".to_owned()),
                        usage: None,
                    });
                }
                TurnMode::Stream(deltas) => {
                    for delta in deltas {
                        yield Ok(AgentEvent::TextDelta { text: delta });
                    }
                    yield Ok(AgentEvent::TurnEnded {
                        backend_session_id: Some("mock-session".to_owned()),
                        usage: None,
                    });
                }
                TurnMode::Hang => {
                    yield Ok(AgentEvent::TextDelta { text: "working".to_owned() });
                    interrupted.notified().await;
                    // Wind down without a TurnEnded, like a cancelled turn.
                }
                TurnMode::HangIgnoring => {
                    std::future::pending::<()>().await;
                }
                TurnMode::NeedsTool(tool) => {
                    let allowed = match gate {
                        Some(gate) => gate.check_tool(&tool, &serde_json::json!({})).await,
                        None => false,
                    };
                    let verdict = if allowed { "tool allowed" } else { "tool denied" };
                    yield Ok(AgentEvent::TextDelta { text: verdict.to_owned() });
                    yield Ok(AgentEvent::TurnEnded {
                        backend_session_id: Some("mock-session".to_owned()),
                        usage: None,
                    });
                }
                TurnMode::FailToStart => unreachable!(),
            }
        };
        Ok(Box::pin(stream))
    }

    async fn interrupt(&self) -> Result<()> {
        // notify_one stores a permit, so an interrupt that lands before the
        // stream reaches its park point is not lost.
        self.interrupted.notify_one();
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    fn set_session_id(&self, id: String) {
        *self.session_id.lock() = Some(id);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mock listener
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct MockListener {
    platform: String,
    pub sink: Arc<RecordingSink>,
    pub backend: Arc<MockBackend>,
    cwd: Option<PathBuf>,
    fail_create: Mutex<bool>,
    handler: Mutex<Option<TriggerHandler>>,
}

impl MockListener {
    pub fn new(platform: &str, mode: TurnMode) -> Self {
        Self {
            platform: platform.to_owned(),
            sink: Arc::new(RecordingSink::new()),
            backend: Arc::new(MockBackend::new(mode)),
            cwd: Some(PathBuf::from("/work")),
            fail_create: Mutex::new(false),
            handler: Mutex::new(None),
        }
    }

    pub fn without_cwd(mut self) -> Self {
        self.cwd = None;
        self
    }

    /// Make the next `create_session` calls fail.
    pub fn fail_session_creation(&self, fail: bool) {
        *self.fail_create.lock() = fail;
    }
}

#[async_trait]
impl Listener for MockListener {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn start(&self, on_trigger: TriggerHandler) -> Result<()> {
        *self.handler.lock() = Some(on_trigger);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.handler.lock() = None;
        Ok(())
    }

    fn create_reply_sink(&self, _reply_context: &serde_json::Value) -> Result<Arc<dyn ReplySink>> {
        Ok(self.sink.clone())
    }

    async fn create_session(
        &self,
        _trigger: &Trigger,
        _cwd: &Path,
        gate: Arc<dyn PermissionGate>,
    ) -> Result<Arc<dyn BackendSession>> {
        if *self.fail_create.lock() {
            return Err(Error::Backend("mock session creation failure".into()));
        }
        self.backend.set_gate(gate);
        Ok(self.backend.clone())
    }

    fn resolve_cwd(&self, _trigger: &Trigger) -> Option<PathBuf> {
        self.cwd.clone()
    }
}
