//! Session coordinator.
//!
//! Owns the registry of live session actors and the listeners that feed
//! them. Actors are created lazily on the first trigger for a conversation
//! key; creation is serialized by the registry lock so concurrent triggers
//! for the same key get the same actor. A failed creation registers
//! nothing, so the next trigger simply retries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use rb_domain::error::{Error, Result};
use rb_domain::trigger::{SessionStats, Trigger};

use crate::platform::{Listener, TriggerHandler};
use crate::runtime::actor::{ActorContext, SessionActor};
use crate::runtime::dispatcher::EventDispatcher;
use crate::runtime::enqueue_trigger;
use crate::runtime::permission::{PendingSlot, SessionPermissionGate};

/// Snapshot of one live session for the control API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_key: String,
    pub platform: String,
    pub cwd: String,
    pub active: bool,
    pub has_running_turn: bool,
    pub generation: u64,
    pub resumable: bool,
    pub stats: SessionStats,
}

pub struct Coordinator {
    listeners: RwLock<HashMap<String, Arc<dyn Listener>>>,
    actors: tokio::sync::Mutex<HashMap<String, Arc<SessionActor>>>,
    ctx: ActorContext,
}

impl Coordinator {
    pub fn new(ctx: ActorContext) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            actors: tokio::sync::Mutex::new(HashMap::new()),
            ctx,
        }
    }

    /// Register a platform listener. Each platform name registers once.
    pub fn register_listener(&self, listener: Arc<dyn Listener>) -> Result<()> {
        let platform = listener.platform().to_owned();
        let mut listeners = self.listeners.write();
        if listeners.contains_key(&platform) {
            return Err(Error::Platform {
                platform,
                message: "listener already registered".into(),
            });
        }
        tracing::info!(platform = %platform, "platform listener registered");
        listeners.insert(platform, listener);
        Ok(())
    }

    pub fn listener(&self, platform: &str) -> Option<Arc<dyn Listener>> {
        self.listeners.read().get(platform).cloned()
    }

    /// Start every registered listener, wiring its triggers into the
    /// ingress dispatcher.
    pub async fn start_listeners(self: &Arc<Self>, dispatcher: EventDispatcher) -> Result<()> {
        let listeners: Vec<Arc<dyn Listener>> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            let handler = self.trigger_handler(dispatcher.clone());
            listener.start(handler).await?;
            tracing::info!(platform = %listener.platform(), "listener started");
        }
        Ok(())
    }

    fn trigger_handler(self: &Arc<Self>, dispatcher: EventDispatcher) -> TriggerHandler {
        let coordinator = self.clone();
        Arc::new(move |trigger: Trigger| {
            let coordinator = coordinator.clone();
            let dispatcher = dispatcher.clone();
            Box::pin(async move {
                enqueue_trigger(&dispatcher, coordinator, trigger);
            })
        })
    }

    /// Deliver one trigger: find or lazily create the actor for its key,
    /// then mailbox it. Runs under the dispatcher's per-key serialization.
    pub async fn route(&self, trigger: Trigger) {
        let session_key = trigger.session_key.clone();
        let actor = {
            let mut actors = self.actors.lock().await;
            match actors.get(&session_key) {
                Some(actor) => actor.clone(),
                None => match self.create_actor(&trigger).await {
                    Ok(actor) => {
                        actor.start();
                        actors.insert(session_key.clone(), actor.clone());
                        tracing::info!(
                            session_key = %session_key,
                            platform = %trigger.platform,
                            "session actor created"
                        );
                        actor
                    }
                    Err(e) => {
                        tracing::warn!(
                            session_key = %session_key,
                            error = %e,
                            "dropping trigger, session creation failed"
                        );
                        return;
                    }
                },
            }
        };
        if !actor.enqueue(trigger) {
            tracing::warn!(session_key = %session_key, "trigger rejected by closed actor");
        }
    }

    async fn create_actor(&self, trigger: &Trigger) -> Result<Arc<SessionActor>> {
        let listener = self.listener(&trigger.platform).ok_or_else(|| Error::Platform {
            platform: trigger.platform.clone(),
            message: "no listener registered".into(),
        })?;

        // An explicit cwd in the reply context wins over the listener's
        // platform mapping.
        let cwd = trigger
            .reply_context
            .get("cwd")
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .or_else(|| listener.resolve_cwd(trigger))
            .ok_or_else(|| Error::Platform {
                platform: trigger.platform.clone(),
                message: format!("no working directory for {}", trigger.session_key),
            })?;

        let sink = listener.create_reply_sink(&trigger.reply_context)?;
        let slot = PendingSlot::default();
        let gate = Arc::new(SessionPermissionGate::new(
            self.ctx.broker.clone(),
            sink.clone(),
            trigger.session_key.clone(),
            slot.clone(),
        ));
        let backend = listener.create_session(trigger, &cwd, gate).await?;

        if let Some(persisted) = self.ctx.store.get(&trigger.session_key) {
            tracing::info!(
                session_key = %trigger.session_key,
                backend_session_id = %persisted.backend_session_id,
                "restoring persisted backend session"
            );
            backend.set_session_id(persisted.backend_session_id);
        }

        Ok(Arc::new(SessionActor::new(
            trigger.session_key.clone(),
            trigger.platform.clone(),
            cwd,
            sink,
            backend,
            slot,
            self.ctx.clone(),
        )))
    }

    /// Interrupt a session's running turn. `None` if the key is unknown.
    pub async fn interrupt(&self, session_key: &str) -> Option<bool> {
        let actor = self.actors.lock().await.get(session_key).cloned()?;
        Some(actor.interrupt().await)
    }

    /// Answer the permission wait a session's turn is parked on, e.g.
    /// from a platform button callback. `None` if the key is unknown.
    pub async fn resolve_permission(
        &self,
        session_key: &str,
        allowed: bool,
        always: bool,
    ) -> Option<bool> {
        let actor = self.actors.lock().await.get(session_key).cloned()?;
        Some(actor.resolve_permission(allowed, always))
    }

    pub async fn describe(&self, session_key: &str) -> Option<SessionInfo> {
        let actor = self.actors.lock().await.get(session_key).cloned()?;
        Some(info_for(&actor))
    }

    pub async fn snapshot(&self) -> Vec<SessionInfo> {
        let actors: Vec<Arc<SessionActor>> =
            self.actors.lock().await.values().cloned().collect();
        let mut infos: Vec<SessionInfo> = actors.iter().map(|a| info_for(a)).collect();
        infos.sort_by(|a, b| a.session_key.cmp(&b.session_key));
        infos
    }

    pub async fn session_count(&self) -> usize {
        self.actors.lock().await.len()
    }

    /// Close every actor and stop every listener.
    pub async fn stop(&self) {
        let actors: Vec<Arc<SessionActor>> =
            self.actors.lock().await.drain().map(|(_, a)| a).collect();
        for actor in actors {
            actor.close().await;
        }
        let listeners: Vec<Arc<dyn Listener>> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            if let Err(e) = listener.stop().await {
                tracing::warn!(platform = %listener.platform(), error = %e, "listener stop failed");
            }
        }
        tracing::info!("coordinator stopped");
    }
}

fn info_for(actor: &SessionActor) -> SessionInfo {
    SessionInfo {
        session_key: actor.session_key().to_owned(),
        platform: actor.platform().to_owned(),
        cwd: actor.cwd().to_string_lossy().into_owned(),
        active: actor.is_active(),
        has_running_turn: actor.has_running_turn(),
        generation: actor.generation(),
        resumable: actor.backend_session_id().is_some(),
        stats: actor.stats(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
