//! Shared application state handed to the control API and background
//! tasks.

use std::sync::Arc;

use rb_domain::config::Config;
use rb_sessions::SessionStore;

use crate::runtime::coordinator::Coordinator;
use crate::runtime::dispatcher::EventDispatcher;
use crate::runtime::permission::PermissionBroker;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SessionStore>,
    pub broker: Arc<PermissionBroker>,
    pub dispatcher: EventDispatcher,
    pub coordinator: Arc<Coordinator>,
    /// SHA-256 of the API bearer token. `None` means the token env var is
    /// unset and the protected API surface stays off.
    pub api_token_hash: Option<Vec<u8>>,
}
