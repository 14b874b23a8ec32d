use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Control API server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8787")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Environment variable holding the API bearer token for protected
    /// endpoints. If the env var is set and non-empty, every endpoint except
    /// `/health` requires `Authorization: Bearer <token>`. If unset, the
    /// server logs a warning and protected endpoints answer 503 until a
    /// token is configured; only `/health` stays reachable.
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    /// Maximum concurrently-served HTTP requests.
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// Optional path for a PID file. When set, the server writes its PID on
    /// startup and removes the file on shutdown. An exclusive lock prevents
    /// two instances sharing one PID file.
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8787,
            host: "127.0.0.1".into(),
            api_token_env: d_api_token_env(),
            max_concurrent_requests: d_max_concurrent(),
            pid_file: None,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8787() -> u16 {
    8787
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_api_token_env() -> String {
    "RELAYBOT_API_TOKEN".into()
}
fn d_max_concurrent() -> usize {
    64
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
