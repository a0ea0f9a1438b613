//! Channel wiring used by `bane invoke`, `verify-log` and `check-bundle`.

use std::fs;

use bane::audit::{read_jsonl_log, verify_log_file};
use bane::config::{BaneConfig, RuntimePaths};
use bane::context::{Context, DevicePosture, UserRole};
use bane::decision::{DecisionType, ReasonCode};
use bane::runtime::{build_channel, check_bundle};

const BUNDLE: &str = r#"
id = "field"
version = 2

[[sensors]]
sensor = "camera"
allowedPostures = ["HEALTHY"]
"#;

fn inspector() -> Context {
    Context::new("lari-vision", UserRole::Inspector, DevicePosture::Healthy)
}

#[tokio::test]
async fn missing_bundle_still_audits_every_request() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = BaneConfig::default();
    let paths = RuntimePaths::resolve_under(dir.path(), &config);

    let channel = build_channel(&config, &paths).expect("channel without bundle");

    let rejected = channel
        .invoke("camera.capture", "auto", &Context::default())
        .await;
    assert_eq!(rejected.decision.reason_code(), ReasonCode::ContextInvalid);

    let denied = channel.invoke("camera.capture", "auto", &inspector()).await;
    assert_eq!(denied.decision.kind(), DecisionType::Deny);
    assert_eq!(denied.decision.reason_code(), ReasonCode::PolicyUnavailable);
    assert!(denied.sdr_hash.is_some());

    let records = read_jsonl_log(&paths.audit_log).expect("log");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].actor, "system");
    assert_eq!(records[1].actor, "lari-vision");
}

#[tokio::test]
async fn invalid_bundle_is_denied_with_load_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = BaneConfig::default();
    let paths = RuntimePaths::resolve_under(dir.path(), &config);
    fs::write(&paths.bundle, "id = \"\"\n").expect("write bundle");

    let channel = build_channel(&config, &paths).expect("channel");
    let result = channel.invoke("camera.capture", "auto", &inspector()).await;

    assert_eq!(result.decision.reason_code(), ReasonCode::PolicyUnavailable);
    assert!(result
        .decision
        .reason_detail()
        .is_some_and(|d| d.contains("bundle id is empty")));
}

#[tokio::test]
async fn loaded_bundle_authorizes_requests() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = BaneConfig::default();
    let paths = RuntimePaths::resolve_under(dir.path(), &config);
    fs::write(&paths.bundle, BUNDLE).expect("write bundle");

    let channel = build_channel(&config, &paths).expect("channel");
    let result = channel.invoke("camera.capture", "auto", &inspector()).await;

    assert!(result.ok);
    assert_eq!(verify_log_file(&paths.audit_log).expect("verify").records, 1);
}

#[tokio::test]
async fn enabling_chaining_on_existing_log_keeps_it_verifiable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = BaneConfig::default();
    let paths = RuntimePaths::resolve_under(dir.path(), &config);
    fs::write(&paths.bundle, BUNDLE).expect("write bundle");

    let plain = build_channel(&config, &paths).expect("channel");
    plain.invoke("camera.capture", "a", &inspector()).await;
    plain.invoke("lidar.scan", "b", &inspector()).await;

    config.audit.chain = true;
    let chained = build_channel(&config, &paths).expect("chained channel");
    chained.invoke("camera.capture", "c", &inspector()).await;
    chained.invoke("camera.capture", "d", &inspector()).await;

    let summary = verify_log_file(&paths.audit_log).expect("mixed log verifies");
    assert_eq!(summary.records, 4);
    assert_eq!(summary.linked, 2);

    // A restart resumes from the last chained record.
    let resumed = build_channel(&config, &paths).expect("resumed channel");
    resumed.invoke("camera.capture", "e", &inspector()).await;
    assert_eq!(verify_log_file(&paths.audit_log).expect("verifies").linked, 3);
}

#[test]
fn check_bundle_summarizes_or_reports_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bundle.toml");
    fs::write(&path, BUNDLE).expect("write bundle");

    let summary = check_bundle(&path).expect("valid bundle");
    assert!(summary.starts_with("bundle field v2"));
    assert!(summary.contains("1 sensor rules"));

    assert!(check_bundle(&dir.path().join("absent.toml")).is_err());
}
