//! Durable session state for relaybot.
//!
//! Persists the backend session id per conversation key so a conversation
//! can resume across process restarts, plus the typed session-key
//! constructors shared by listeners and the control API.

pub mod session_key;
pub mod store;

pub use session_key::{discord_key, telegram_key};
pub use store::{PersistedSession, SessionStore};
