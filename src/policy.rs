//! Policy decision point.
//!
//! [`evaluate_with_bundle`] is a pure function of its inputs: the same
//! action, resource, context and bundle always produce the same
//! [`Decision`]. [`PolicyEngine`] wraps it with a per-request bundle fetch.
//!
//! Rules are checked in order and the first match wins:
//! 1. rooted devices are denied everything;
//! 2. `net.call` needs an exact host match in the domain allowlist;
//! 3. `file.handle` needs the path (or the whole resource) under an
//!    allowlisted prefix, and no `..` component;
//! 4. `camera.capture` / `lidar.scan` need a sensor rule admitting the posture;
//! 5. anything else is denied.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use url::Url;

use crate::bundle::{BundleSource, PolicyBundle, Sensor};
use crate::context::{Context, DevicePosture};
use crate::decision::{Decision, DecisionMode, ReasonCode};
use crate::resource::{file_path_of, has_parent_traversal};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Capability actions the engine knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Outbound HTTP call; resource is an absolute URL.
    NetCall,
    /// File access; resource is `"<op>:<path>"`.
    FileHandle,
    /// Camera capture; resource is a settings descriptor.
    CameraCapture,
    /// LiDAR scan; resource is a resolution descriptor.
    LidarScan,
}

impl Action {
    /// Parse a wire action name. Unknown names yield `None`.
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "net.call" => Some(Self::NetCall),
            "file.handle" => Some(Self::FileHandle),
            "camera.capture" => Some(Self::CameraCapture),
            "lidar.scan" => Some(Self::LidarScan),
            _ => None,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetCall => "net.call",
            Self::FileHandle => "file.handle",
            Self::CameraCapture => "camera.capture",
            Self::LidarScan => "lidar.scan",
        }
    }

    /// Sensor gated by this action, if it is a sensor action.
    pub fn sensor(self) -> Option<Sensor> {
        match self {
            Self::CameraCapture => Some(Sensor::Camera),
            Self::LidarScan => Some(Sensor::Lidar),
            Self::NetCall | Self::FileHandle => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Pure evaluation
// ---------------------------------------------------------------------------

/// Evaluate a request against a bundle.
///
/// A context without a posture is never treated as rooted, but it cannot
/// satisfy a sensor rule either. The channel rejects such contexts before
/// they get here.
pub fn evaluate_with_bundle(
    action: &str,
    resource: &str,
    context: &Context,
    bundle: &PolicyBundle,
) -> Decision {
    let mode = DecisionMode::from_demon_flag(bundle.demon_mode);

    if context.device_posture == Some(DevicePosture::Rooted) {
        return Decision::deny(ReasonCode::DevicePostureRooted, mode);
    }

    match Action::parse(action) {
        Some(Action::NetCall) => check_domain(resource, bundle, mode),
        Some(Action::FileHandle) => check_file_path(resource, bundle, mode),
        Some(a @ (Action::CameraCapture | Action::LidarScan)) => {
            check_sensor(a, context.device_posture, bundle, mode)
        }
        None => Decision::deny(ReasonCode::ActionNotDefined, mode),
    }
}

/// Exact hostname match against the domain allowlist.
fn check_domain(resource: &str, bundle: &PolicyBundle, mode: DecisionMode) -> Decision {
    let parsed = match Url::parse(resource) {
        Ok(u) => u,
        Err(e) => {
            return Decision::deny(ReasonCode::DomainNotAllowlisted, mode)
                .with_detail(format!("invalid URL: {e}"))
        }
    };
    let Some(host) = parsed.host_str() else {
        return Decision::deny(ReasonCode::DomainNotAllowlisted, mode)
            .with_detail("URL has no host");
    };

    if bundle.allowlisted_domains.iter().any(|r| r.domain == host) {
        Decision::allow(mode)
    } else {
        Decision::deny(ReasonCode::DomainNotAllowlisted, mode)
    }
}

/// Prefix match of the requested path, or of the whole resource so that
/// rules written as `read:/data/` keep matching. Any `..` component denies.
fn check_file_path(resource: &str, bundle: &PolicyBundle, mode: DecisionMode) -> Decision {
    let path = file_path_of(resource);
    if has_parent_traversal(path) {
        return Decision::deny(ReasonCode::PathNotAllowlisted, mode)
            .with_detail("path contains '..'");
    }
    let matched = bundle
        .file_paths
        .iter()
        .any(|r| path.starts_with(&r.prefix) || resource.starts_with(&r.prefix));
    if matched {
        Decision::allow(mode)
    } else {
        Decision::deny(ReasonCode::PathNotAllowlisted, mode)
    }
}

/// Sensor rule lookup plus posture membership.
fn check_sensor(
    action: Action,
    posture: Option<DevicePosture>,
    bundle: &PolicyBundle,
    mode: DecisionMode,
) -> Decision {
    let allowed = action
        .sensor()
        .and_then(|s| bundle.sensor_rule(s))
        .zip(posture)
        .is_some_and(|(rule, p)| rule.allowed_postures.contains(&p));

    if allowed {
        Decision::allow(mode)
    } else {
        Decision::deny(ReasonCode::SensorNotAllowedForPosture, mode)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Policy decision point backed by an injected bundle source.
///
/// Holds no state of its own; share it freely across tasks.
pub struct PolicyEngine {
    bundles: Arc<dyn BundleSource>,
}

impl PolicyEngine {
    /// Engine reading bundles from `bundles`.
    pub fn new(bundles: Arc<dyn BundleSource>) -> Self {
        Self { bundles }
    }

    /// Fetch the tenant's bundle and evaluate.
    ///
    /// A failed fetch is a `POLICY_UNAVAILABLE` denial, not an error.
    pub async fn evaluate(&self, action: &str, resource: &str, context: &Context) -> Decision {
        let bundle = match self.bundles.active_bundle(context.client_id.as_deref()).await {
            Ok(b) => b,
            Err(e) => {
                warn!(
                    tenant = context.client_id.as_deref().unwrap_or(""),
                    trace_id = context.trace(),
                    error = %e,
                    "policy bundle unavailable, denying"
                );
                return Decision::deny(ReasonCode::PolicyUnavailable, DecisionMode::Normal)
                    .with_detail(e.to_string());
            }
        };

        let decision = evaluate_with_bundle(action, resource, context, &bundle);
        debug!(
            action,
            bundle = %bundle.id,
            version = bundle.version,
            decision = ?decision.kind(),
            reason_code = %decision.reason_code(),
            trace_id = context.trace(),
            "policy evaluated"
        );
        decision
    }
}
