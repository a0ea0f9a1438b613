//! Request context: who is asking, from what kind of device, for which tenant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of the caller issuing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Field inspector operating a capture device.
    Inspector,
    /// Tenant administrator.
    Admin,
    /// Read-mostly reviewer of inspection output.
    Auditor,
    /// Internal service identity.
    System,
}

/// Trust classification of the calling device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DevicePosture {
    /// Attested and unmodified.
    Healthy,
    /// Usable but with failing or stale attestation signals.
    Degraded,
    /// Jailbroken / rooted. Never allowed to perform sensitive actions.
    Rooted,
    /// No attestation available.
    Unknown,
}

/// Errors raised when a context is incomplete or a field cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    /// `subject` is empty or whitespace.
    #[error("context subject is missing")]
    MissingSubject,
    /// `userRole` is absent.
    #[error("context user role is missing")]
    MissingRole,
    /// `devicePosture` is absent.
    #[error("context device posture is missing")]
    MissingPosture,
    /// A role string did not name a known role.
    #[error("unknown user role: {0}")]
    UnknownRole(String),
    /// A posture string did not name a known posture.
    #[error("unknown device posture: {0}")]
    UnknownPosture(String),
}

/// Identity and environment descriptor accompanying every request.
///
/// Role and posture are optional on the wire so that an incomplete context
/// can still be represented, rejected and audited instead of failing to
/// deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// Caller identity.
    #[serde(default)]
    pub subject: String,
    /// Caller role.
    #[serde(default)]
    pub user_role: Option<UserRole>,
    /// Device trust state.
    #[serde(default)]
    pub device_posture: Option<DevicePosture>,
    /// Inspection the request belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspection_id: Option<String>,
    /// Tenant identifier used to select the policy bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Correlation id propagated into logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl Context {
    /// Build a complete context for `subject`.
    pub fn new(subject: impl Into<String>, role: UserRole, posture: DevicePosture) -> Self {
        Self {
            subject: subject.into(),
            user_role: Some(role),
            device_posture: Some(posture),
            ..Self::default()
        }
    }

    /// Set the tenant.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the trace id.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Set the inspection id.
    pub fn with_inspection_id(mut self, inspection_id: impl Into<String>) -> Self {
        self.inspection_id = Some(inspection_id.into());
        self
    }

    /// Check that subject, role and posture are all present.
    ///
    /// # Errors
    ///
    /// Returns the first missing field, in subject, role, posture order.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.subject.trim().is_empty() {
            return Err(ContextError::MissingSubject);
        }
        if self.user_role.is_none() {
            return Err(ContextError::MissingRole);
        }
        if self.device_posture.is_none() {
            return Err(ContextError::MissingPosture);
        }
        Ok(())
    }

    /// Trace id for log correlation, empty when unset.
    pub fn trace(&self) -> &str {
        self.trace_id.as_deref().unwrap_or("")
    }
}

impl FromStr for UserRole {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INSPECTOR" => Ok(Self::Inspector),
            "ADMIN" => Ok(Self::Admin),
            "AUDITOR" => Ok(Self::Auditor),
            "SYSTEM" => Ok(Self::System),
            _ => Err(ContextError::UnknownRole(s.to_owned())),
        }
    }
}

impl FromStr for DevicePosture {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HEALTHY" => Ok(Self::Healthy),
            "DEGRADED" => Ok(Self::Degraded),
            "ROOTED" => Ok(Self::Rooted),
            "UNKNOWN" => Ok(Self::Unknown),
            _ => Err(ContextError::UnknownPosture(s.to_owned())),
        }
    }
}

impl fmt::Display for DevicePosture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Rooted => "ROOTED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}
