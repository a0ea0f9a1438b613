//! End-to-end invocation paths: context rejection, denial, success.

use bane::audit::verify_record;
use bane::bundle::PolicyBundle;
use bane::channel::{InvocationState, SYSTEM_ACTOR};
use bane::context::{Context, DevicePosture, UserRole};
use bane::decision::{DecisionMode, DecisionType, ReasonCode};

use crate::support::{adapters, bundle, harness, harness_with, inspector, NetBehavior, ScriptedNetwork};

// ---------- context validation ----------

#[tokio::test]
async fn missing_subject_is_rejected_and_audited_as_system() {
    let h = harness(NetBehavior::Succeed);
    let ctx = Context::new("", UserRole::Inspector, DevicePosture::Healthy);

    let result = h
        .channel
        .invoke("net.call", "https://api.example.com/data", &ctx)
        .await;

    assert!(!result.ok);
    assert_eq!(result.decision.kind(), DecisionType::Deny);
    assert_eq!(result.decision.reason_code(), ReasonCode::ContextInvalid);
    assert_eq!(result.error.as_deref(), Some("Invalid context"));
    assert_eq!(h.network.calls(), 0);

    let records = h.sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].actor, SYSTEM_ACTOR);
    assert_eq!(result.sdr_hash.as_deref(), Some(records[0].hash.as_str()));
}

#[tokio::test]
async fn missing_role_or_posture_is_rejected() {
    for (role, posture) in [
        (None, Some(DevicePosture::Healthy)),
        (Some(UserRole::Admin), None),
        (None, None),
    ] {
        let h = harness(NetBehavior::Succeed);
        let ctx = Context {
            subject: "lari-vision".to_owned(),
            user_role: role,
            device_posture: posture,
            ..Context::default()
        };

        let result = h.channel.invoke("camera.capture", "iso=100", &ctx).await;

        assert!(!result.ok);
        assert_eq!(result.decision.reason_code(), ReasonCode::ContextInvalid);
        assert_eq!(result.decision.mode(), DecisionMode::Normal);
        let records = h.sink.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].actor, "system");
    }
}

// ---------- policy denials ----------

#[tokio::test]
async fn rooted_device_is_denied_even_for_allowlisted_domain() {
    let h = harness(NetBehavior::Succeed);

    let result = h
        .channel
        .invoke(
            "net.call",
            "https://api.example.com/data",
            &inspector(DevicePosture::Rooted),
        )
        .await;

    assert!(!result.ok);
    assert_eq!(result.decision.reason_code(), ReasonCode::DevicePostureRooted);
    assert_eq!(result.error.as_deref(), Some("DEVICE_POSTURE_ROOTED"));
    assert_eq!(result.terminal_state(), InvocationState::Denied);
    assert_eq!(h.network.calls(), 0);

    let records = h.sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].actor, "lari-vision");
}

#[tokio::test]
async fn unknown_action_is_denied_without_dispatch() {
    let h = harness(NetBehavior::Succeed);
    let result = h
        .channel
        .invoke("shell.exec", "rm -rf /", &inspector(DevicePosture::Healthy))
        .await;
    assert_eq!(result.decision.reason_code(), ReasonCode::ActionNotDefined);
    assert_eq!(h.sink.len().await, 1);
}

#[tokio::test]
async fn demon_mode_propagates_to_denials() {
    let network = ScriptedNetwork::new(NetBehavior::Succeed);
    let mut b = bundle("/data/");
    b.demon_mode = true;
    let h = harness_with(b, adapters(network.clone()), network);

    let result = h
        .channel
        .invoke("net.call", "https://other.example.com/", &inspector(DevicePosture::Healthy))
        .await;

    assert_eq!(result.decision.reason_code(), ReasonCode::DomainNotAllowlisted);
    assert_eq!(result.decision.mode(), DecisionMode::Demon);
    assert_eq!(h.sink.records().await[0].decision.mode(), DecisionMode::Demon);
}

// ---------- success ----------

#[tokio::test]
async fn allowlisted_call_succeeds_with_data_and_receipt() {
    let h = harness(NetBehavior::Succeed);

    let result = h
        .channel
        .invoke(
            "net.call",
            "https://api.example.com/data",
            &inspector(DevicePosture::Healthy),
        )
        .await;

    assert!(result.ok);
    assert_eq!(result.decision.kind(), DecisionType::Allow);
    assert_eq!(result.decision.reason_code(), ReasonCode::Ok);
    assert_eq!(result.error, None);
    assert_eq!(result.terminal_state(), InvocationState::Succeeded);
    let data = result.data.clone().expect("data");
    assert_eq!(data["url"], "https://api.example.com/data");
    assert_eq!(h.network.calls(), 1);

    let records = h.sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].decision.kind(), DecisionType::Allow);
    assert!(verify_record(&records[0]).expect("verify"));
    assert_eq!(result.sdr_hash, Some(records[0].hash.clone()));
}

#[tokio::test]
async fn decode_maps_data_into_typed_result() {
    #[derive(serde::Deserialize)]
    struct Listing {
        items: Vec<u32>,
    }

    let h = harness(NetBehavior::Succeed);
    let result = h
        .channel
        .invoke(
            "net.call",
            "https://api.example.com/data",
            &inspector(DevicePosture::Healthy),
        )
        .await
        .decode::<Listing>()
        .expect("decode");
    assert_eq!(result.data.map(|l| l.items), Some(vec![1, 2, 3]));
}

#[tokio::test]
async fn file_write_with_payload_then_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let prefix = format!("{}/", dir.path().display());
    let network = ScriptedNetwork::new(NetBehavior::Succeed);
    let h = harness_with(bundle(&prefix), adapters(network.clone()), network);
    let ctx = inspector(DevicePosture::Healthy);
    let target = dir.path().join("report.txt");

    let written = h
        .channel
        .invoke_with_payload(
            "file.handle",
            &format!("write:{}", target.display()),
            Some(b"roof: ok".to_vec()),
            &ctx,
        )
        .await;
    assert!(written.ok, "write failed: {:?}", written.error);

    let read = h
        .channel
        .invoke("file.handle", &format!("read:{}", target.display()), &ctx)
        .await;
    assert!(read.ok);
    assert_eq!(read.data, Some(serde_json::json!("roof: ok")));
    assert_eq!(h.sink.len().await, 2);
}

#[tokio::test]
async fn file_outside_prefix_is_denied() {
    let h = harness(NetBehavior::Succeed);
    let result = h
        .channel
        .invoke("file.handle", "read:/etc/passwd", &inspector(DevicePosture::Healthy))
        .await;
    assert_eq!(result.decision.reason_code(), ReasonCode::PathNotAllowlisted);
    assert!(!result.ok);
}

#[tokio::test]
async fn sensors_follow_posture_matrix() {
    let h = harness(NetBehavior::Succeed);

    let shot = h
        .channel
        .invoke("camera.capture", "iso=200", &inspector(DevicePosture::Degraded))
        .await;
    assert!(shot.ok);

    let scan = h
        .channel
        .invoke("lidar.scan", "high", &inspector(DevicePosture::Degraded))
        .await;
    assert_eq!(
        scan.decision.reason_code(),
        ReasonCode::SensorNotAllowedForPosture
    );
    assert_eq!(h.sink.len().await, 2);
}

#[tokio::test]
async fn deny_all_bundle_denies_everything_allowed_elsewhere() {
    let network = ScriptedNetwork::new(NetBehavior::Succeed);
    let h = harness_with(
        PolicyBundle::deny_all("locked"),
        adapters(network.clone()),
        network,
    );
    let ctx = inspector(DevicePosture::Healthy);
    for (action, resource, code) in [
        ("net.call", "https://api.example.com/data", ReasonCode::DomainNotAllowlisted),
        ("file.handle", "read:/data/a", ReasonCode::PathNotAllowlisted),
        ("camera.capture", "auto", ReasonCode::SensorNotAllowedForPosture),
    ] {
        let result = h.channel.invoke(action, resource, &ctx).await;
        assert_eq!(result.decision.reason_code(), code, "{action}");
    }
    assert_eq!(h.sink.len().await, 3);
}
