//! Policy bundles: versioned, tenant-scoped rulesets.
//!
//! A bundle is plain data. The engine never caches one; every evaluation
//! asks a [`BundleSource`] for the tenant's active bundle.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::context::{DevicePosture, UserRole};

pub mod source;

pub use source::{BundleSource, StaticBundleSource, TenantBundleSource, UnavailableBundleSource};

/// Errors from loading or resolving a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    /// No bundle is registered for the tenant and there is no default.
    #[error("no policy bundle for tenant '{0}'")]
    UnknownTenant(String),
    /// Bundle file could not be read.
    #[error("failed to read bundle at {path}: {source}")]
    Read {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Bundle file could not be parsed.
    #[error("failed to parse bundle at {path}: {reason}")]
    Parse {
        /// File that failed.
        path: String,
        /// Parser message.
        reason: String,
    },
    /// Bundle parsed but is structurally invalid.
    #[error("invalid bundle: {0}")]
    Invalid(String),
    /// Backing store is unreachable.
    #[error("bundle source unavailable: {0}")]
    Unavailable(String),
}

/// Operation a file rule may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    /// Read the whole file.
    Read,
    /// Create or truncate, then write.
    Write,
    /// Append to the end.
    Append,
}

impl FileOperation {
    /// Parse the lowercase wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "append" => Some(Self::Append),
            _ => None,
        }
    }
}

/// Sensor class gated by the sensor matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensor {
    /// RGB / thermal camera.
    Camera,
    /// LiDAR scanner.
    Lidar,
}

/// Allowlisted outbound host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    /// Exact hostname.
    pub domain: String,
    /// HTTP methods. Reserved: not consulted by evaluation.
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Allowlisted filesystem prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePathRule {
    /// Path prefix, matched with plain string `starts_with`.
    pub prefix: String,
    /// Operations. Reserved: not consulted by evaluation.
    #[serde(default)]
    pub operations: Vec<FileOperation>,
}

/// Which device postures may use a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorRule {
    /// Sensor the rule applies to.
    pub sensor: Sensor,
    /// Postures permitted to capture.
    #[serde(default)]
    pub allowed_postures: Vec<DevicePosture>,
}

/// Versioned, tenant-scoped ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBundle {
    /// Bundle identifier.
    pub id: String,
    /// Monotonic version number.
    #[serde(default)]
    pub version: u64,
    /// Roles the bundle was authored for. Reserved: not consulted by evaluation.
    #[serde(default)]
    pub roles: Vec<UserRole>,
    /// Outbound host allowlist.
    #[serde(default)]
    pub allowlisted_domains: Vec<DomainRule>,
    /// Filesystem prefix allowlist.
    #[serde(default)]
    pub file_paths: Vec<FilePathRule>,
    /// Sensor / posture matrix.
    #[serde(default)]
    pub sensors: Vec<SensorRule>,
    /// Propagated onto every decision as [`crate::decision::DecisionMode::Demon`].
    #[serde(default)]
    pub demon_mode: bool,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PolicyBundle {
    /// Empty bundle that denies every action.
    pub fn deny_all(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 0,
            roles: Vec::new(),
            allowlisted_domains: Vec::new(),
            file_paths: Vec::new(),
            sensors: Vec::new(),
            demon_mode: false,
            updated_at: None,
        }
    }

    /// Rule for `sensor`, if any. The first rule wins when several exist.
    pub fn sensor_rule(&self, sensor: Sensor) -> Option<&SensorRule> {
        self.sensors.iter().find(|r| r.sensor == sensor)
    }

    /// Domains, path prefixes and sensors listed more than once, as
    /// `"<kind> <value>"` strings in bundle order.
    pub fn duplicate_entries(&self) -> Vec<String> {
        let mut duplicates = Vec::new();

        let mut seen = HashSet::new();
        for rule in &self.allowlisted_domains {
            if !seen.insert(rule.domain.as_str()) {
                duplicates.push(format!("domain {}", rule.domain));
            }
        }
        let mut seen = HashSet::new();
        for rule in &self.file_paths {
            if !seen.insert(rule.prefix.as_str()) {
                duplicates.push(format!("prefix {}", rule.prefix));
            }
        }
        let mut seen = HashSet::new();
        for rule in &self.sensors {
            if !seen.insert(rule.sensor) {
                duplicates.push(format!("sensor {:?}", rule.sensor).to_lowercase());
            }
        }
        duplicates
    }

    /// Structural checks run when a bundle is loaded.
    ///
    /// Duplicate domains, prefixes and sensors are tolerated but logged.
    ///
    /// # Errors
    ///
    /// Rejects an empty id, blank domains, and blank prefixes. A blank
    /// prefix would match every path.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.id.trim().is_empty() {
            return Err(BundleError::Invalid("bundle id is empty".to_owned()));
        }
        for rule in &self.allowlisted_domains {
            if rule.domain.trim().is_empty() {
                return Err(BundleError::Invalid(format!(
                    "bundle {} has a blank allowlisted domain",
                    self.id
                )));
            }
        }
        for rule in &self.file_paths {
            if rule.prefix.trim().is_empty() {
                return Err(BundleError::Invalid(format!(
                    "bundle {} has a blank file path prefix",
                    self.id
                )));
            }
        }

        for duplicate in self.duplicate_entries() {
            warn!(bundle = %self.id, entry = %duplicate, "duplicate bundle entry, first one wins");
        }
        Ok(())
    }
}

/// Load and validate a bundle from a `.toml` or `.json` file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_bundle(path: &Path) -> Result<PolicyBundle, BundleError> {
    let display = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| BundleError::Read {
        path: display.clone(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let bundle: PolicyBundle = if is_json {
        serde_json::from_str(&contents).map_err(|e| BundleError::Parse {
            path: display.clone(),
            reason: e.to_string(),
        })?
    } else {
        toml::from_str(&contents).map_err(|e| BundleError::Parse {
            path: display.clone(),
            reason: e.to_string(),
        })?
    };

    bundle.validate()?;
    Ok(bundle)
}
