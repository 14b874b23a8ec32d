//! Per-conversation session actor.
//!
//! One actor owns all state for one conversation: an unbounded mailbox, a
//! monotonically increasing generation counter, the handle to the turn in
//! flight (at most one), and the slot of the permission request that turn
//! may be parked on. The mailbox loop interrupts a running turn whenever
//! new input arrives, so the latest message always wins.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rb_domain::error::Result;
use rb_domain::message::PlatformMessage;
use rb_domain::trigger::{SessionStats, Trigger};
use rb_sessions::SessionStore;

use crate::platform::commands::{
    parse_command_name, CommandRegistry, CommandResolution, LocalCommand,
};
use crate::platform::{BackendSession, ReplySink};
use crate::runtime::permission::{PendingSlot, PermissionBroker};
use crate::runtime::turn;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared collaborators
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process-wide collaborators every actor is built with.
#[derive(Clone)]
pub struct ActorContext {
    pub broker: Arc<PermissionBroker>,
    pub store: Arc<SessionStore>,
    pub commands: Arc<CommandRegistry>,
    /// How long a soft interrupt may take before the turn task is aborted.
    pub soft_timeout: Duration,
    /// How long an aborted task may take to actually stop.
    pub hard_timeout: Duration,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stats
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) struct ActorStats {
    created_at: DateTime<Utc>,
    last_activity: Mutex<DateTime<Utc>>,
    message_count: AtomicU64,
    turn_count: AtomicU64,
    interrupt_count: AtomicU64,
    error_count: AtomicU64,
}

impl ActorStats {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_activity: Mutex::new(now),
            message_count: AtomicU64::new(0),
            turn_count: AtomicU64::new(0),
            interrupt_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    fn record_message(&self) {
        self.message_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_turn(&self) {
        self.turn_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_interrupt(&self) {
        self.interrupt_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SessionStats {
        SessionStats {
            created_at: self.created_at,
            last_activity: *self.last_activity.lock(),
            message_count: self.message_count.load(Ordering::Relaxed),
            turn_count: self.turn_count.load(Ordering::Relaxed),
            interrupt_count: self.interrupt_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Actor internals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) struct RunningTurn {
    pub(crate) generation: u64,
    pub(crate) task: JoinHandle<()>,
}

/// State shared between the mailbox loop, spawned turn tasks, and the
/// public [`SessionActor`] handle.
pub(crate) struct ActorShared {
    pub(crate) session_key: String,
    pub(crate) platform: String,
    pub(crate) cwd: PathBuf,
    pub(crate) sink: Arc<dyn ReplySink>,
    pub(crate) backend: Arc<dyn BackendSession>,
    pub(crate) ctx: ActorContext,
    pub(crate) stats: ActorStats,
    active: AtomicBool,
    generation: AtomicU64,
    current_turn: Mutex<Option<RunningTurn>>,
    pending_permission: PendingSlot,
    pending_media: Mutex<Option<String>>,
    mailbox_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Trigger>>>,
}

impl ActorShared {
    pub(crate) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn has_unfinished_turn(&self) -> bool {
        self.current_turn
            .lock()
            .as_ref()
            .is_some_and(|t| !t.task.is_finished())
    }

    /// Soft-interrupt the backend, give the turn task a deadline to wind
    /// down, abort it if the deadline passes, then withdraw any permission
    /// request the turn was parked on.
    async fn cancel_current_turn(&self) {
        let Some(mut running) = self.current_turn.lock().take() else {
            return;
        };
        if !running.task.is_finished() {
            tracing::info!(
                session_key = %self.session_key,
                generation = running.generation,
                "interrupting running turn"
            );
            if let Err(e) = self.backend.interrupt().await {
                tracing::warn!(session_key = %self.session_key, error = %e, "backend interrupt failed");
            }
            match tokio::time::timeout(self.ctx.soft_timeout, &mut running.task).await {
                Ok(_) => {
                    tracing::debug!(session_key = %self.session_key, "turn stopped after soft interrupt");
                }
                Err(_) => {
                    tracing::warn!(
                        session_key = %self.session_key,
                        "turn ignored soft interrupt, aborting task"
                    );
                    running.task.abort();
                    if tokio::time::timeout(self.ctx.hard_timeout, &mut running.task)
                        .await
                        .is_err()
                    {
                        tracing::error!(
                            session_key = %self.session_key,
                            "turn task did not stop after abort"
                        );
                    }
                }
            }
        }
        self.cancel_pending_permission();
    }

    /// Withdraw the permission request the current turn is parked on, if
    /// any. The parked waiter sees a denial; an aborted waiter is simply
    /// cleaned out of the broker table.
    fn cancel_pending_permission(&self) {
        if let Some(pending) = self.pending_permission.lock().take() {
            tracing::info!(
                session_key = %self.session_key,
                request_id = %pending.request_id,
                tool = %pending.tool_name,
                "cancelling pending permission for interrupted turn"
            );
            self.ctx.broker.cancel(&pending.request_id);
        }
    }

    /// Interrupt the turn in flight, if one is. Bumps the generation so
    /// any output the old turn still produces is recognizably stale.
    async fn interrupt_running_turn(&self) -> bool {
        if !self.has_unfinished_turn() {
            // Reap a finished handle so it does not linger.
            let _ = self.current_turn.lock().take();
            return false;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.stats.record_interrupt();
        self.cancel_current_turn().await;
        true
    }

    async fn handle_trigger(self: &Arc<Self>, trigger: Trigger, generation: u64) -> Result<()> {
        self.stats.touch();
        let text = trigger.prompt.trim().to_owned();

        // Media with no caption: hold it until the user says what to do
        // with it.
        if text.is_empty() && !trigger.media.is_empty() {
            let first = trigger.media[0].clone();
            tracing::debug!(
                session_key = %self.session_key,
                media = %first,
                "buffering media until text arrives"
            );
            *self.pending_media.lock() = Some(first);
            return Ok(());
        }

        let mut prompt = text;
        if let Some(buffered) = self.pending_media.lock().take() {
            prompt = format!("{buffered}\n\n{prompt}");
        }
        if !trigger.media.is_empty() {
            prompt = format!("{}\n\n{}", trigger.media.join("\n"), prompt);
        }

        if prompt.starts_with('/') {
            if let Some(name) = parse_command_name(&prompt) {
                match self
                    .ctx
                    .commands
                    .resolve(name, &self.backend.contextual_commands())
                {
                    CommandResolution::Prompt(expansion) => prompt = expansion,
                    CommandResolution::Local(LocalCommand::ShowStatus) => {
                        self.send_status().await;
                        return Ok(());
                    }
                    CommandResolution::PassThrough => {}
                }
            }
        }

        if prompt.trim().is_empty() {
            return Ok(());
        }

        self.stats.record_message();
        let task = turn::spawn(self.clone(), prompt, generation);
        *self.current_turn.lock() = Some(RunningTurn { generation, task });
        Ok(())
    }

    async fn send_status(&self) {
        let stats = self.stats.snapshot();
        let resumable = if self.backend.session_id().is_some() {
            "yes"
        } else {
            "not yet"
        };
        let status = format!(
            "📊 Session status\nmessages: {}\nturns: {}\ninterrupts: {}\nerrors: {}\nresumable: {resumable}",
            stats.message_count, stats.turn_count, stats.interrupt_count, stats.error_count
        );
        let _ = self.sink.send(PlatformMessage::text(status)).await;
    }
}

async fn run_loop(shared: Arc<ActorShared>) {
    let mut rx = shared.mailbox_rx.clone().lock_owned().await;
    tracing::debug!(session_key = %shared.session_key, "session actor loop started");
    loop {
        if !shared.active.load(Ordering::Acquire) {
            break;
        }
        let Some(trigger) = rx.recv().await else {
            break;
        };
        if !shared.active.load(Ordering::Acquire) {
            break;
        }

        shared.interrupt_running_turn().await;
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            session_key = %shared.session_key,
            generation,
            source = ?trigger.source,
            "processing trigger"
        );

        if let Err(e) = shared.handle_trigger(trigger, generation).await {
            shared.stats.record_error();
            tracing::error!(session_key = %shared.session_key, error = %e, "failed to process trigger");
            let _ = shared
                .sink
                .send(PlatformMessage::text(
                    "⚠️ Something went wrong processing that message. Please try again.",
                ))
                .await;
        }
    }
    tracing::debug!(session_key = %shared.session_key, "session actor loop stopped");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle to one conversation's actor, shared by the coordinator and the
/// control API.
pub struct SessionActor {
    shared: Arc<ActorShared>,
    mailbox_tx: mpsc::UnboundedSender<Trigger>,
    run_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_key: String,
        platform: String,
        cwd: PathBuf,
        sink: Arc<dyn ReplySink>,
        backend: Arc<dyn BackendSession>,
        pending_permission: PendingSlot,
        ctx: ActorContext,
    ) -> Self {
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(ActorShared {
                session_key,
                platform,
                cwd,
                sink,
                backend,
                ctx,
                stats: ActorStats::new(),
                active: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                current_turn: Mutex::new(None),
                pending_permission,
                pending_media: Mutex::new(None),
                mailbox_rx: Arc::new(tokio::sync::Mutex::new(mailbox_rx)),
            }),
            mailbox_tx,
            run_task: Mutex::new(None),
        }
    }

    /// Spawn the mailbox loop. Idempotent while the loop is alive.
    pub fn start(&self) {
        let mut guard = self.run_task.lock();
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        *guard = Some(tokio::spawn(run_loop(self.shared.clone())));
    }

    /// Append a trigger to the mailbox. Returns false once the actor is
    /// closed.
    pub fn enqueue(&self, trigger: Trigger) -> bool {
        if !self.shared.active.load(Ordering::Acquire) {
            tracing::warn!(session_key = %self.session_key(), "trigger for closed session dropped");
            return false;
        }
        self.mailbox_tx.send(trigger).is_ok()
    }

    /// Interrupt the turn in flight. Returns false if nothing was running.
    pub async fn interrupt(&self) -> bool {
        self.shared.interrupt_running_turn().await
    }

    /// Deliver a verdict to the permission wait this session's turn is
    /// parked on. Returns false when nothing is pending, meaning the
    /// answer arrived too late.
    pub fn resolve_permission(&self, allowed: bool, always: bool) -> bool {
        match self.shared.pending_permission.lock().take() {
            Some(pending) => self
                .shared
                .ctx
                .broker
                .resolve(&pending.request_id, allowed, always),
            None => false,
        }
    }

    /// Stop the actor: interrupt any running turn, withdraw pending
    /// permissions, and tear down the mailbox loop. Idempotent.
    pub async fn close(&self) {
        if !self.shared.active.swap(false, Ordering::SeqCst) {
            return;
        }
        // The mailbox loop stops first: a trigger already past the active
        // check must not spawn a fresh turn behind the cancellation.
        let task = self.run_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        self.shared.cancel_current_turn().await;
        tracing::info!(session_key = %self.session_key(), "session actor closed");
    }

    pub fn session_key(&self) -> &str {
        &self.shared.session_key
    }

    pub fn platform(&self) -> &str {
        &self.shared.platform
    }

    pub fn cwd(&self) -> &std::path::Path {
        &self.shared.cwd
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn has_running_turn(&self) -> bool {
        self.shared.has_unfinished_turn()
    }

    pub fn generation(&self) -> u64 {
        self.shared.current_generation()
    }

    pub fn backend_session_id(&self) -> Option<String> {
        self.shared.backend.session_id()
    }

    pub fn stats(&self) -> SessionStats {
        self.shared.stats.snapshot()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
