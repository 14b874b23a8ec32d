use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding the persisted session file and the tool allow-list.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
    /// Persisted sessions idle longer than this are evicted on the
    /// periodic cleanup sweep.
    #[serde(default = "d_ttl_days")]
    pub ttl_days: u64,
    /// How long the interrupt procedure waits for a turn to observe the
    /// cooperative stop signal before falling back to a hard cancel.
    #[serde(default = "d_interrupt_timeout_ms")]
    pub interrupt_soft_timeout_ms: u64,
    /// How long the hard-cancel fallback waits for the cancelled turn to
    /// acknowledge before giving up (logged, not fatal).
    #[serde(default = "d_interrupt_timeout_ms")]
    pub interrupt_hard_timeout_ms: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
            ttl_days: d_ttl_days(),
            interrupt_soft_timeout_ms: d_interrupt_timeout_ms(),
            interrupt_hard_timeout_ms: d_interrupt_timeout_ms(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_state_path() -> PathBuf {
    PathBuf::from("./data")
}
fn d_ttl_days() -> u64 {
    7
}
fn d_interrupt_timeout_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SessionsConfig::default();
        assert_eq!(cfg.ttl_days, 7);
        assert_eq!(cfg.interrupt_soft_timeout_ms, 2000);
        assert_eq!(cfg.interrupt_hard_timeout_ms, 2000);
    }

    #[test]
    fn timeouts_are_tunable() {
        let cfg: SessionsConfig = toml::from_str(
            r#"
            interrupt_soft_timeout_ms = 50
            interrupt_hard_timeout_ms = 75
        "#,
        )
        .unwrap();
        assert_eq!(cfg.interrupt_soft_timeout_ms, 50);
        assert_eq!(cfg.interrupt_hard_timeout_ms, 75);
    }
}
