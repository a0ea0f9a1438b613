//! Parallel invocations against one channel and one sink.

use std::sync::Arc;
use std::time::Duration;

use bane::audit::{verify_chain, verify_records, Audit, MemoryAuditSink};
use bane::bundle::StaticBundleSource;
use bane::channel::Channel;
use bane::context::DevicePosture;
use bane::decision::{DecisionType, ReasonCode};
use bane::policy::PolicyEngine;

use crate::support::{adapters, bundle, inspector, NetBehavior, ScriptedNetwork};

const INVOCATIONS: usize = 32;

fn channel(audit: Audit) -> Arc<Channel> {
    let network = ScriptedNetwork::new(NetBehavior::Succeed);
    let engine = PolicyEngine::new(Arc::new(StaticBundleSource::new(bundle("/data/"))));
    Arc::new(Channel::new(engine, adapters(network), audit))
}

async fn run_mixed(channel: Arc<Channel>) {
    let mut handles = Vec::with_capacity(INVOCATIONS);
    for i in 0..INVOCATIONS {
        let channel = Arc::clone(&channel);
        handles.push(tokio::spawn(async move {
            let (action, resource) = match i % 4 {
                0 => ("net.call", "https://api.example.com/items".to_owned()),
                1 => ("net.call", "https://evil.example.net/".to_owned()),
                2 => ("camera.capture", format!("frame-{i}")),
                _ => ("file.handle", format!("read:/etc/{i}")),
            };
            channel
                .invoke(action, &resource, &inspector(DevicePosture::Healthy))
                .await
        }));
    }
    for handle in handles {
        let result = handle.await.expect("invocation task");
        assert!(result.sdr_hash.is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_concurrent_invocation_writes_one_record() {
    let sink = Arc::new(MemoryAuditSink::new());
    run_mixed(channel(Audit::new(sink.clone()))).await;

    let records = sink.records().await;
    assert_eq!(records.len(), INVOCATIONS);
    assert!(verify_records(&records).is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_chained_appends_stay_linked() {
    let sink = Arc::new(MemoryAuditSink::new());
    run_mixed(channel(Audit::chained(sink.clone(), None))).await;

    let records = sink.records().await;
    assert_eq!(records.len(), INVOCATIONS);
    assert!(verify_chain(&records).is_ok());
}

fn recorded_channel(behavior: NetBehavior) -> (Channel, Arc<MemoryAuditSink>, Arc<ScriptedNetwork>) {
    let network = ScriptedNetwork::new(behavior);
    let sink = Arc::new(MemoryAuditSink::new());
    let engine = PolicyEngine::new(Arc::new(StaticBundleSource::new(bundle("/data/"))));
    let channel = Channel::new(engine, adapters(network.clone()), Audit::new(sink.clone()));
    (channel, sink, network)
}

#[tokio::test(start_paused = true)]
async fn abandoned_invocation_is_still_recorded() {
    let (channel, sink, network) = recorded_channel(NetBehavior::Slow);
    let ctx = inspector(DevicePosture::Healthy);

    let waited = tokio::time::timeout(
        Duration::from_millis(50),
        channel.invoke("net.call", "https://api.example.com/data", &ctx),
    )
    .await;
    assert!(waited.is_err(), "caller should give up first");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(network.completed(), 1);
    let records = sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].decision.kind(), DecisionType::Allow);
}

#[tokio::test(start_paused = true)]
async fn abandoned_hung_invocation_is_recorded_as_timeout() {
    let (channel, sink, network) = recorded_channel(NetBehavior::Hang);
    let channel = channel.with_dispatch_timeout(Duration::from_secs(1));
    let ctx = inspector(DevicePosture::Healthy);

    let waited = tokio::time::timeout(
        Duration::from_millis(50),
        channel.invoke("net.call", "https://api.example.com/data", &ctx),
    )
    .await;
    assert!(waited.is_err());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(network.completed(), 0);
    let records = sink.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].decision.reason_code(), ReasonCode::ExecutionTimeout);
}
