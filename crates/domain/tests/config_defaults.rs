//! Whole-config parsing checks: an empty file must yield a fully usable
//! default configuration, and section defaults must survive partial TOML.

use rb_domain::config::{Config, ConfigSeverity};

#[test]
fn empty_toml_gives_valid_defaults() {
    let cfg: Config = toml::from_str("").unwrap();
    assert_eq!(cfg.server.port, 8787);
    assert_eq!(cfg.dispatcher.workers, 4);
    assert_eq!(cfg.sessions.ttl_days, 7);
    assert!(!cfg.permissions.default_allowed.is_empty());
    assert!(cfg.validate().is_empty());
}

#[test]
fn partial_sections_fill_in() {
    let cfg: Config = toml::from_str(
        r#"
        [server]
        port = 9999

        [dispatcher]
        max_queue = 10
        warn_queue = 5
    "#,
    )
    .unwrap();
    assert_eq!(cfg.server.port, 9999);
    assert_eq!(cfg.server.host, "127.0.0.1");
    assert_eq!(cfg.dispatcher.max_queue, 10);
    assert_eq!(cfg.dispatcher.workers, 4);
}

#[test]
fn validation_reports_severity() {
    let cfg: Config = toml::from_str(
        r#"
        [server]
        port = 0

        [sessions]
        ttl_days = 0
    "#,
    )
    .unwrap();
    let issues = cfg.validate();
    assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Warning));
}
