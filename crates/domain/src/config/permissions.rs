use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool permissions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Tools that never prompt for approval.
    #[serde(default = "d_default_allowed")]
    pub default_allowed: Vec<String>,
    /// File name of the persisted always-allow list, relative to
    /// `sessions.state_path`.
    #[serde(default = "d_allowlist_file")]
    pub allowlist_file: String,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            default_allowed: d_default_allowed(),
            allowlist_file: d_allowlist_file(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_default_allowed() -> Vec<String> {
    [
        "Read", "Write", "Edit", "Bash", "Glob", "Grep", "Task", "WebSearch",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn d_allowlist_file() -> String {
    "tool_allowlist.json".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_includes_core_tools() {
        let cfg = PermissionsConfig::default();
        assert!(cfg.default_allowed.iter().any(|t| t == "Read"));
        assert!(cfg.default_allowed.iter().any(|t| t == "Bash"));
        assert_eq!(cfg.allowlist_file, "tool_allowlist.json");
    }

    #[test]
    fn allowed_list_is_overridable() {
        let cfg: PermissionsConfig = toml::from_str(r#"default_allowed = ["Read"]"#).unwrap();
        assert_eq!(cfg.default_allowed, vec!["Read".to_string()]);
    }
}
