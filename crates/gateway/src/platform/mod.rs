//! Boundary traits between the runtime core and the outside world.
//!
//! Concrete chat platforms (Telegram, Discord) and agent backends plug in
//! behind these traits. The runtime core never names a platform or a
//! backend implementation directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use rb_domain::error::Result;
use rb_domain::event::{AgentEvent, BoxStream};
use rb_domain::message::{ButtonRow, MessageRef, PlatformMessage, SendOutcome};
use rb_domain::trigger::Trigger;

pub mod commands;
#[cfg(test)]
pub mod mock;

/// Callback a listener invokes for every inbound trigger it produces.
pub type TriggerHandler = Arc<dyn Fn(Trigger) -> BoxFuture<'static, ()> + Send + Sync>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Listener
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One inbound chat platform.
///
/// A listener turns platform messages into [`Trigger`]s and knows how to
/// build the per-conversation collaborators (reply sink, backend session)
/// the coordinator needs when it creates an actor.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Stable platform name ("telegram", "discord"). Also the first
    /// component of every session key this listener produces.
    fn platform(&self) -> &str;

    /// Start receiving; every inbound message is handed to `on_trigger`.
    async fn start(&self, on_trigger: TriggerHandler) -> Result<()>;

    /// Stop receiving. Idempotent.
    async fn stop(&self) -> Result<()>;

    /// Build a sink that replies into the conversation `reply_context`
    /// points at.
    fn create_reply_sink(&self, reply_context: &serde_json::Value) -> Result<Arc<dyn ReplySink>>;

    /// Create a fresh backend session for a conversation, wired to `gate`
    /// for tool permission checks.
    async fn create_session(
        &self,
        trigger: &Trigger,
        cwd: &Path,
        gate: Arc<dyn PermissionGate>,
    ) -> Result<Arc<dyn BackendSession>>;

    /// Platform-specific working directory for this conversation, if the
    /// listener can derive one (e.g. from a chat-to-project mapping).
    fn resolve_cwd(&self, trigger: &Trigger) -> Option<PathBuf>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reply sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Write half of one conversation.
///
/// Send/edit failures come back as [`SendOutcome::Failed`] rather than an
/// error so a flaky platform never aborts a turn.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, message: PlatformMessage) -> SendOutcome;

    async fn edit(&self, target: &MessageRef, message: PlatformMessage) -> SendOutcome;

    /// Send a message with interactive buttons attached.
    async fn send_with_buttons(
        &self,
        message: PlatformMessage,
        buttons: Vec<ButtonRow>,
    ) -> SendOutcome;

    /// Best-effort "typing…" indicator.
    async fn typing(&self);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One long-lived agent conversation on the backend side.
#[async_trait]
pub trait BackendSession: Send + Sync {
    /// Submit a prompt and stream the resulting events until the turn ends
    /// or the stream errors.
    async fn start_turn(&self, prompt: String) -> Result<BoxStream<'static, Result<AgentEvent>>>;

    /// Ask the backend to stop the current turn cooperatively. Returning
    /// does not guarantee the turn stopped; callers enforce their own
    /// deadline.
    async fn interrupt(&self) -> Result<()>;

    /// Resumable session id the backend issued, if any yet.
    fn session_id(&self) -> Option<String>;

    /// Adopt a previously persisted session id so the next turn resumes
    /// that conversation.
    fn set_session_id(&self, id: String);

    /// Slash commands this backend understands natively; the command
    /// registry passes these through untouched.
    fn contextual_commands(&self) -> Vec<String> {
        Vec::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Permission gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decides whether the backend may use a tool mid-turn.
///
/// The backend calls this before each tool invocation and awaits the
/// verdict; the call may park for as long as a human takes to answer.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn check_tool(&self, tool_name: &str, input: &serde_json::Value) -> bool;
}
