use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Ingress dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tuning for the shared inbound work queue.
///
/// The queue protects platform event loops from bursts: total outstanding
/// work is bounded at `max_queue`, and items sharing a serialization key
/// execute one at a time regardless of which worker picks them up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "d_workers")]
    pub workers: usize,
    #[serde(default = "d_max_queue")]
    pub max_queue: usize,
    /// A depth warning is logged every time queue depth crosses a multiple
    /// of this threshold.
    #[serde(default = "d_warn_queue")]
    pub warn_queue: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: d_workers(),
            max_queue: d_max_queue(),
            warn_queue: d_warn_queue(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_workers() -> usize {
    4
}
fn d_max_queue() -> usize {
    1000
}
fn d_warn_queue() -> usize {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_tuning() {
        let cfg = DispatcherConfig::default();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.max_queue, 1000);
        assert_eq!(cfg.warn_queue, 200);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: DispatcherConfig = toml::from_str("workers = 2").unwrap();
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.max_queue, 1000);
    }
}
