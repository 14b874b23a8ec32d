//! Wires configuration into a running application state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};

use rb_domain::config::{Config, ConfigSeverity};
use rb_sessions::SessionStore;

use crate::platform::commands::CommandRegistry;
use crate::runtime::actor::ActorContext;
use crate::runtime::coordinator::Coordinator;
use crate::runtime::dispatcher::EventDispatcher;
use crate::runtime::permission::PermissionBroker;
use crate::state::AppState;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
const LOCK_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Validate the configuration and build every subsystem.
pub fn build_app_state(config: Config) -> anyhow::Result<AppState> {
    let mut fatal = false;
    for finding in config.validate() {
        match finding.severity {
            ConfigSeverity::Error => {
                fatal = true;
                tracing::error!(field = %finding.field, "config error: {}", finding.message);
            }
            ConfigSeverity::Warning => {
                tracing::warn!(field = %finding.field, "config warning: {}", finding.message);
            }
        }
    }
    if fatal {
        anyhow::bail!("configuration has errors, refusing to start");
    }
    let config = Arc::new(config);

    let store = Arc::new(
        SessionStore::open(&config.sessions.state_path, config.sessions.ttl_days)
            .context("opening session store")?,
    );
    let broker = Arc::new(PermissionBroker::new(
        &config.permissions,
        &config.sessions.state_path,
    ));
    let dispatcher = EventDispatcher::new(&config.dispatcher);
    tracing::info!(
        workers = config.dispatcher.workers,
        max_queue = config.dispatcher.max_queue,
        "ingress dispatcher configured"
    );

    let ctx = ActorContext {
        broker: broker.clone(),
        store: store.clone(),
        commands: Arc::new(CommandRegistry::new()),
        soft_timeout: Duration::from_millis(config.sessions.interrupt_soft_timeout_ms),
        hard_timeout: Duration::from_millis(config.sessions.interrupt_hard_timeout_ms),
    };
    let coordinator = Arc::new(Coordinator::new(ctx));

    let api_token_hash = match std::env::var(&config.server.api_token_env) {
        Ok(token) if !token.trim().is_empty() => {
            Some(Sha256::digest(token.trim().as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!(
                env = %config.server.api_token_env,
                "api token not set, protected endpoints are disabled"
            );
            None
        }
    };

    Ok(AppState {
        config,
        store,
        broker,
        dispatcher,
        coordinator,
        api_token_hash,
    })
}

/// Periodic maintenance: expire stale persisted sessions and drop idle
/// per-key serialization locks.
pub fn spawn_background_tasks(state: &AppState) {
    let store = state.store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            let evicted = store.cleanup_expired();
            tracing::debug!(evicted, "session sweep finished");
        }
    });

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LOCK_PRUNE_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            dispatcher.prune_idle_locks();
        }
    });
}
