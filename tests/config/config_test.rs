//! Coverage for config file loading and path resolution.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bane::config::{bane_dir, BaneConfig, RuntimePaths};

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = BaneConfig::load_from(&dir.path().join("bane.toml")).expect("defaults");
    assert_eq!(config.dispatch.timeout(), Duration::from_secs(30));
    assert!(config.audit.log_path.is_none());
    assert!(config.policy.bundle_path.is_none());
}

#[test]
fn full_file_is_parsed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bane.toml");
    fs::write(
        &path,
        r#"
[audit]
log_path = "/var/lib/bane/audit.jsonl"
chain = true

[dispatch]
timeout_secs = 12

[policy]
bundle_path = "/etc/bane/field.json"

[network]
user_agent = "inspector-app/2.1"
connect_timeout_secs = 3

[logging]
level = "bane=debug,warn"
logs_dir = "/var/log/bane"
"#,
    )
    .expect("write");

    let config = BaneConfig::load_from(&path).expect("config");
    assert!(config.audit.chain);
    assert_eq!(config.dispatch.timeout_secs, 12);
    assert_eq!(config.network.user_agent, "inspector-app/2.1");
    assert_eq!(config.network.connect_timeout_secs, 3);
    assert_eq!(config.logging.level, "bane=debug,warn");

    let paths = RuntimePaths::resolve_under(Path::new("/unused"), &config);
    assert_eq!(paths.audit_log, PathBuf::from("/var/lib/bane/audit.jsonl"));
    assert_eq!(paths.bundle, PathBuf::from("/etc/bane/field.json"));
    assert_eq!(paths.logs_dir, PathBuf::from("/var/log/bane"));
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bane.toml");
    fs::write(&path, "[dispatch]\ntimeout_secs = \"thirty\"\n").expect("write");
    let err = BaneConfig::load_from(&path).expect_err("should fail");
    assert!(format!("{err:#}").contains("bane.toml"));
}

#[test]
fn file_values_yield_to_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bane.toml");
    fs::write(&path, "[dispatch]\ntimeout_secs = 12\n").expect("write");

    let mut config = BaneConfig::load_from(&path).expect("config");
    config.apply_overrides(|key| (key == "BANE_DISPATCH_TIMEOUT_SECS").then(|| "4".to_owned()));
    assert_eq!(config.dispatch.timeout_secs, 4);
}

#[test]
fn bane_dir_resolves() {
    let dir = bane_dir().expect("home directory");
    assert!(dir.ends_with(".bane"));
}
