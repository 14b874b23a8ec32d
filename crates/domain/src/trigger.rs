//! Inbound work units.
//!
//! A [`Trigger`] is one unit of user or programmatic input routed to a
//! conversation. Listeners create one per inbound event; it is consumed
//! exactly once by the owning session actor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Real user input from a chat platform.
    User,
    /// Programmatic injection (control API, scheduled work).
    Injected,
}

/// One inbound event from any platform.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Platform identifier, e.g. `"telegram"` or `"discord"`.
    pub platform: String,
    /// Globally unique conversation key (`"telegram:<chat>[:<thread>]"`).
    pub session_key: String,
    /// Free-text prompt. May be empty when only media arrived.
    pub prompt: String,
    /// Attached media references (local paths or URLs), in arrival order.
    pub media: Vec<String>,
    /// Opaque reply-routing context, interpreted only by the owning listener.
    pub reply_context: serde_json::Value,
    pub source: TriggerSource,
}

impl Trigger {
    /// Build a user-sourced trigger with no media and an empty reply context.
    pub fn user(platform: &str, session_key: &str, prompt: &str) -> Self {
        Self {
            platform: platform.to_owned(),
            session_key: session_key.to_owned(),
            prompt: prompt.to_owned(),
            media: Vec::new(),
            reply_context: serde_json::Value::Null,
            source: TriggerSource::User,
        }
    }

    /// Build a programmatically injected trigger.
    pub fn injected(platform: &str, session_key: &str, prompt: &str) -> Self {
        Self {
            source: TriggerSource::Injected,
            ..Self::user(platform, session_key, prompt)
        }
    }
}

/// Point-in-time statistics snapshot for one session actor.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: u64,
    pub turn_count: u64,
    pub interrupt_count: u64,
    pub error_count: u64,
}
