//! Configuration loading.
//!
//! Loads `bane.toml` (or `$BANE_CONFIG_PATH`). Every section has defaults,
//! so a missing or empty file is valid.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BaneConfig {
    /// Audit log settings.
    pub audit: AuditConfig,
    /// Adapter dispatch settings.
    pub dispatch: DispatchConfig,
    /// Policy bundle location.
    pub policy: PolicyConfig,
    /// HTTP adapter settings.
    pub network: NetworkConfig,
    /// Tracing settings.
    pub logging: LoggingConfig,
}

impl BaneConfig {
    /// Load with precedence env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = config_path_with(|key| std::env::var(key).ok());
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path` only, no env overrides. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                toml::from_str(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability (avoids unsafe `set_var` in tests).
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("BANE_AUDIT_LOG") {
            self.audit.log_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("BANE_AUDIT_CHAIN") {
            match parse_bool(&v) {
                Some(b) => self.audit.chain = b,
                None => tracing::warn!(
                    var = "BANE_AUDIT_CHAIN",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("BANE_DISPATCH_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.dispatch.timeout_secs = n,
                Err(_) => tracing::warn!(
                    var = "BANE_DISPATCH_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("BANE_BUNDLE_PATH") {
            self.policy.bundle_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("BANE_LOG_LEVEL") {
            self.logging.level = v;
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Resolve config file path: `$BANE_CONFIG_PATH`, else `./bane.toml`.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    env("BANE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("bane.toml"))
}

// ── Sections ────────────────────────────────────────────────────

/// Audit log settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSONL audit log. Defaults to `~/.bane/audit.jsonl`.
    pub log_path: Option<PathBuf>,
    /// Link each record to the previous one's hash.
    pub chain: bool,
}

/// Adapter dispatch settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Deadline for a single adapter call, in seconds.
    pub timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl DispatchConfig {
    /// Deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Policy bundle location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Bundle file (`.toml` or `.json`). Defaults to `~/.bane/bundle.toml`.
    pub bundle_path: Option<PathBuf>,
}

/// HTTP adapter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `User-Agent` header for outbound calls.
    pub user_agent: String,
    /// TCP connect timeout, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("bane/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: 10,
        }
    }
}

/// Tracing settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rolling JSON logs. Defaults to `~/.bane/logs`.
    pub logs_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            logs_dir: None,
        }
    }
}

// ── Runtime paths ───────────────────────────────────────────────

/// Resolved filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Root directory (`~/.bane`).
    pub root: PathBuf,
    /// Audit log file.
    pub audit_log: PathBuf,
    /// Policy bundle file.
    pub bundle: PathBuf,
    /// Log directory.
    pub logs_dir: PathBuf,
}

impl RuntimePaths {
    /// Fill unset paths from `root`.
    pub fn resolve_under(root: &Path, config: &BaneConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            audit_log: config
                .audit
                .log_path
                .clone()
                .unwrap_or_else(|| root.join("audit.jsonl")),
            bundle: config
                .policy
                .bundle_path
                .clone()
                .unwrap_or_else(|| root.join("bundle.toml")),
            logs_dir: config
                .logging
                .logs_dir
                .clone()
                .unwrap_or_else(|| root.join("logs")),
        }
    }

    /// Fill unset paths from `~/.bane`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn resolve(config: &BaneConfig) -> Result<Self> {
        Ok(Self::resolve_under(&bane_dir()?, config))
    }
}

/// Default root directory (`~/.bane/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn bane_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".bane"))
}
