//! Tool permission broker.
//!
//! When the backend wants a tool that is not on the allowlist, the gate
//! registers a pending request with the broker, posts an approval prompt
//! into the conversation, and parks the turn on a oneshot until someone
//! answers, via a chat button or the control API. Exactly one resolution
//! wins; late answers report "expired". Cancelling a request (interrupt,
//! session close) drops the sender, which the waiter observes as a denial.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use rb_domain::config::PermissionsConfig;
use rb_domain::message::{ButtonSpec, PlatformMessage};

use crate::platform::{PermissionGate, ReplySink};

/// Callback-data verbs encoded into approval buttons as
/// `perm:<verb>:<request_id>:<tool>`.
pub const VERB_ALLOW: &str = "allow";
pub const VERB_DENY: &str = "deny";
pub const VERB_ALWAYS: &str = "always";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Allowlist
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tools allowed without asking: configured defaults plus user-granted
/// "always allow" entries persisted as a JSON array.
struct AllowList {
    defaults: HashSet<String>,
    granted: Mutex<HashSet<String>>,
    path: PathBuf,
}

impl AllowList {
    fn load(config: &PermissionsConfig, state_path: &Path) -> Self {
        let path = state_path.join(&config.allowlist_file);
        let granted: HashSet<String> = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(tools) => tools.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "unreadable tool allowlist, ignoring");
                    HashSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "failed to read tool allowlist");
                HashSet::new()
            }
        };
        Self {
            defaults: config.default_allowed.iter().cloned().collect(),
            granted: Mutex::new(granted),
            path,
        }
    }

    fn is_allowed(&self, tool_name: &str) -> bool {
        self.defaults.contains(tool_name) || self.granted.lock().contains(tool_name)
    }

    fn grant(&self, tool_name: &str) {
        let snapshot: Vec<String> = {
            let mut granted = self.granted.lock();
            if !granted.insert(tool_name.to_owned()) {
                return;
            }
            let mut tools: Vec<String> = granted.iter().cloned().collect();
            tools.sort();
            tools
        };
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::error!(error = %e, path = %self.path.display(), "failed to persist tool allowlist");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize tool allowlist"),
        }
        tracing::info!(tool = tool_name, "tool added to persistent allowlist");
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Broker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct PendingRequest {
    tool_name: String,
    session_key: String,
    created_at: DateTime<Utc>,
    respond: oneshot::Sender<bool>,
}

/// Read-only snapshot of a pending request, for the control API.
#[derive(Debug, Clone, Serialize)]
pub struct PendingSnapshot {
    pub request_id: String,
    pub tool_name: String,
    pub session_key: String,
    pub created_at: DateTime<Utc>,
}

/// Process-wide permission state: the allowlist plus all requests
/// currently waiting for a verdict.
pub struct PermissionBroker {
    allowlist: AllowList,
    pending: Mutex<HashMap<String, PendingRequest>>,
}

impl PermissionBroker {
    pub fn new(config: &PermissionsConfig, state_path: &Path) -> Self {
        Self {
            allowlist: AllowList::load(config, state_path),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// True if the tool needs no human approval.
    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        self.allowlist.is_allowed(tool_name)
    }

    /// Register a pending request. Returns its short id and the receiver
    /// the caller parks on.
    pub fn begin(&self, tool_name: &str, session_key: &str) -> (String, oneshot::Receiver<bool>) {
        let request_id = Uuid::new_v4().simple().to_string()[..8].to_owned();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            request_id.clone(),
            PendingRequest {
                tool_name: tool_name.to_owned(),
                session_key: session_key.to_owned(),
                created_at: Utc::now(),
                respond: tx,
            },
        );
        tracing::info!(
            request_id = %request_id,
            tool = tool_name,
            session_key,
            "permission request pending"
        );
        (request_id, rx)
    }

    /// Deliver a verdict. Returns false if the request is unknown or was
    /// already resolved; the first answer wins.
    pub fn resolve(&self, request_id: &str, allowed: bool, always: bool) -> bool {
        let entry = match self.pending.lock().remove(request_id) {
            Some(entry) => entry,
            None => {
                tracing::debug!(request_id, "permission resolution for unknown request");
                return false;
            }
        };
        if allowed && always {
            self.allowlist.grant(&entry.tool_name);
        }
        tracing::info!(
            request_id,
            tool = %entry.tool_name,
            session_key = %entry.session_key,
            allowed,
            always,
            "permission request resolved"
        );
        // Receiver may already be gone (turn aborted); nothing to do then.
        let _ = entry.respond.send(allowed);
        true
    }

    /// Withdraw a pending request. The parked waiter observes a denial.
    pub fn cancel(&self, request_id: &str) -> bool {
        match self.pending.lock().remove(request_id) {
            Some(entry) => {
                tracing::info!(
                    request_id,
                    tool = %entry.tool_name,
                    session_key = %entry.session_key,
                    "permission request cancelled"
                );
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn list_pending(&self) -> Vec<PendingSnapshot> {
        let mut snapshots: Vec<PendingSnapshot> = self
            .pending
            .lock()
            .iter()
            .map(|(id, req)| PendingSnapshot {
                request_id: id.clone(),
                tool_name: req.tool_name.clone(),
                session_key: req.session_key.clone(),
                created_at: req.created_at,
            })
            .collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        snapshots
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-session gate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handle to the request a session's turn is currently parked on, shared
/// between the gate (which sets it) and the actor (which cancels it when
/// the turn is interrupted or the session closes).
#[derive(Debug, Clone)]
pub struct PendingRef {
    pub request_id: String,
    pub tool_name: String,
}

pub type PendingSlot = Arc<Mutex<Option<PendingRef>>>;

/// The [`PermissionGate`] handed to one conversation's backend session.
pub struct SessionPermissionGate {
    broker: Arc<PermissionBroker>,
    sink: Arc<dyn ReplySink>,
    session_key: String,
    slot: PendingSlot,
}

impl SessionPermissionGate {
    pub fn new(
        broker: Arc<PermissionBroker>,
        sink: Arc<dyn ReplySink>,
        session_key: String,
        slot: PendingSlot,
    ) -> Self {
        Self {
            broker,
            sink,
            session_key,
            slot,
        }
    }

    fn approval_prompt(&self, tool_name: &str, input: &serde_json::Value, request_id: &str) -> PlatformMessage {
        let mut detail = input.to_string();
        if detail.len() > 200 {
            detail.truncate(200);
            detail.push('…');
        }
        PlatformMessage::text(format!(
            "🔐 Permission needed: {tool_name}\n{detail}\nRequest {request_id}"
        ))
    }

    fn approval_buttons(request_id: &str, tool_name: &str) -> Vec<Vec<ButtonSpec>> {
        let button = |label: &str, verb: &str| ButtonSpec {
            label: label.to_owned(),
            data: format!("perm:{verb}:{request_id}:{tool_name}"),
        };
        vec![
            vec![button("Allow", VERB_ALLOW), button("Deny", VERB_DENY)],
            vec![button("Always allow", VERB_ALWAYS)],
        ]
    }
}

#[async_trait]
impl PermissionGate for SessionPermissionGate {
    async fn check_tool(&self, tool_name: &str, input: &serde_json::Value) -> bool {
        if self.broker.is_tool_allowed(tool_name) {
            return true;
        }

        let (request_id, rx) = self.broker.begin(tool_name, &self.session_key);
        *self.slot.lock() = Some(PendingRef {
            request_id: request_id.clone(),
            tool_name: tool_name.to_owned(),
        });

        let prompt = self.approval_prompt(tool_name, input, &request_id);
        let buttons = Self::approval_buttons(&request_id, tool_name);
        if let rb_domain::message::SendOutcome::Failed(reason) =
            self.sink.send_with_buttons(prompt, buttons).await
        {
            // Keep waiting; the request is still resolvable via the API.
            tracing::warn!(
                request_id = %request_id,
                error = %reason,
                "failed to post approval prompt"
            );
        }

        // A dropped sender (cancel, interrupt) reads as a denial.
        let allowed = rx.await.unwrap_or(false);

        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|p| p.request_id == request_id) {
            *slot = None;
        }
        allowed
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn broker_in(dir: &tempfile::TempDir) -> PermissionBroker {
        PermissionBroker::new(&PermissionsConfig::default(), dir.path())
    }

    #[test]
    fn defaults_are_allowed_without_asking() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker_in(&dir);
        assert!(broker.is_tool_allowed("Read"));
        assert!(broker.is_tool_allowed("Bash"));
        assert!(!broker.is_tool_allowed("WebFetch"));
    }

    #[tokio::test]
    async fn first_resolution_wins() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker_in(&dir);

        let (id, rx) = broker.begin("WebFetch", "telegram:1");
        assert_eq!(broker.pending_count(), 1);

        assert!(broker.resolve(&id, true, false));
        assert!(!broker.resolve(&id, false, false));
        assert_eq!(broker.pending_count(), 0);
        assert_eq!(rx.await, Ok(true));
        // A plain allow does not touch the allowlist.
        assert!(!broker.is_tool_allowed("WebFetch"));
    }

    #[tokio::test]
    async fn cancel_reads_as_denial() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker_in(&dir);

        let (id, rx) = broker.begin("WebFetch", "telegram:1");
        assert!(broker.cancel(&id));
        assert!(rx.await.is_err());
        assert!(!broker.resolve(&id, true, false));
    }

    #[tokio::test]
    async fn always_allow_persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let broker = broker_in(&dir);
            let (id, rx) = broker.begin("WebFetch", "telegram:1");
            assert!(broker.resolve(&id, true, true));
            assert_eq!(rx.await, Ok(true));
            assert!(broker.is_tool_allowed("WebFetch"));
        }
        let reloaded = broker_in(&dir);
        assert!(reloaded.is_tool_allowed("WebFetch"));
    }

    #[test]
    fn deny_with_always_does_not_grant() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker_in(&dir);
        let (id, _rx) = broker.begin("WebFetch", "telegram:1");
        assert!(broker.resolve(&id, false, true));
        assert!(!broker.is_tool_allowed("WebFetch"));
    }

    #[test]
    fn pending_snapshots_are_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let broker = broker_in(&dir);
        let (first, _rx1) = broker.begin("WebFetch", "telegram:1");
        let (_second, _rx2) = broker.begin("Delete", "discord:2");

        let pending = broker.list_pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].request_id, first);
    }
}
