//! Wiring from configuration to a running channel, shared by the CLI.
//!
//! The audit sink is opened before the bundle is loaded. A bundle that
//! cannot be loaded does not stop the channel from being built: requests are
//! still validated, denied with `POLICY_UNAVAILABLE` and recorded.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{error, info};

use crate::adapters::Adapters;
use crate::audit::{read_jsonl_log, Audit, JsonlAuditSink};
use crate::bundle::{
    load_bundle, BundleError, BundleSource, StaticBundleSource, UnavailableBundleSource,
};
use crate::channel::Channel;
use crate::config::{BaneConfig, RuntimePaths};
use crate::policy::PolicyEngine;

/// Build a channel writing to the configured audit log.
///
/// With chaining enabled the chain resumes from the last record already in
/// the log.
///
/// # Errors
///
/// Fails if the audit log cannot be opened or read, or the HTTP client cannot
/// be built. A missing or invalid bundle is not an error.
pub fn build_channel(config: &BaneConfig, paths: &RuntimePaths) -> anyhow::Result<Channel> {
    let audit = open_audit(config, &paths.audit_log)?;
    let bundles = bundle_source(&paths.bundle);

    let adapters = Adapters::with_defaults(
        &config.network.user_agent,
        Duration::from_secs(config.network.connect_timeout_secs),
    )?;

    Ok(Channel::new(PolicyEngine::new(bundles), adapters, audit)
        .with_dispatch_timeout(config.dispatch.timeout()))
}

fn open_audit(config: &BaneConfig, log: &Path) -> anyhow::Result<Audit> {
    if let Some(parent) = log.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let head = if config.audit.chain && log.exists() {
        read_jsonl_log(log)
            .with_context(|| format!("failed to read {}", log.display()))?
            .last()
            .map(|r| r.hash.clone())
    } else {
        None
    };
    let sink = Arc::new(
        JsonlAuditSink::open(log).with_context(|| format!("failed to open {}", log.display()))?,
    );
    Ok(if config.audit.chain {
        Audit::chained(sink, head)
    } else {
        Audit::new(sink)
    })
}

/// Static source over the bundle at `path`, or a failing source when it
/// cannot be loaded.
pub fn bundle_source(path: &Path) -> Arc<dyn BundleSource> {
    match load_bundle(path) {
        Ok(bundle) => {
            info!(bundle = %bundle.id, version = bundle.version, "policy bundle loaded");
            Arc::new(StaticBundleSource::new(bundle))
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "policy bundle unavailable, all requests will be denied");
            Arc::new(UnavailableBundleSource::new(e.to_string()))
        }
    }
}

/// Load and validate the bundle at `path` and describe it in one line.
///
/// # Errors
///
/// Returns the load or validation error.
pub fn check_bundle(path: &Path) -> Result<String, BundleError> {
    let bundle = load_bundle(path)?;
    Ok(format!(
        "bundle {} v{}: {} domains, {} path prefixes, {} sensor rules, demon mode {}",
        bundle.id,
        bundle.version,
        bundle.allowlisted_domains.len(),
        bundle.file_paths.len(),
        bundle.sensors.len(),
        if bundle.demon_mode { "on" } else { "off" }
    ))
}
