//! Policy decisions and their machine-readable reason codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome category of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    /// The action may proceed.
    Allow,
    /// The action is refused.
    Deny,
    /// The action is held for review.
    Quarantine,
    /// The action was allowed but failed during execution.
    Rollback,
}

/// Machine-readable reason attached to every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Allowed.
    Ok,
    /// Subject, role or posture missing from the request context.
    ContextInvalid,
    /// Caller device is rooted.
    DevicePostureRooted,
    /// URL host is not on the bundle's domain allowlist.
    DomainNotAllowlisted,
    /// File path is not under an allowlisted prefix.
    PathNotAllowlisted,
    /// No sensor rule, or the caller's posture is not permitted for it.
    SensorNotAllowedForPosture,
    /// Action is not one the engine knows how to evaluate.
    ActionNotDefined,
    /// The adapter failed after an allow decision.
    ExecutionError,
    /// The adapter did not finish before the dispatch deadline.
    ExecutionTimeout,
    /// No policy bundle could be obtained for the tenant.
    PolicyUnavailable,
}

impl ReasonCode {
    /// Wire form of the code, e.g. `DOMAIN_NOT_ALLOWLISTED`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::ContextInvalid => "CONTEXT_INVALID",
            Self::DevicePostureRooted => "DEVICE_POSTURE_ROOTED",
            Self::DomainNotAllowlisted => "DOMAIN_NOT_ALLOWLISTED",
            Self::PathNotAllowlisted => "PATH_NOT_ALLOWLISTED",
            Self::SensorNotAllowedForPosture => "SENSOR_NOT_ALLOWED_FOR_POSTURE",
            Self::ActionNotDefined => "ACTION_NOT_DEFINED",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::ExecutionTimeout => "EXECUTION_TIMEOUT",
            Self::PolicyUnavailable => "POLICY_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging mode inherited from the active bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionMode {
    /// Regular handling.
    Normal,
    /// Bundle has demon mode on; downstream consumers apply stricter handling.
    Demon,
}

impl DecisionMode {
    /// Mode matching a bundle's `demonMode` flag.
    pub fn from_demon_flag(demon_mode: bool) -> Self {
        if demon_mode {
            Self::Demon
        } else {
            Self::Normal
        }
    }
}

/// Typed, immutable outcome of a policy evaluation.
///
/// Field order is the serialization order and therefore part of the audit
/// hash input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    #[serde(rename = "type")]
    kind: DecisionType,
    reason_code: ReasonCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason_detail: Option<String>,
    mode: DecisionMode,
}

impl Decision {
    /// Allow with reason `OK`.
    pub fn allow(mode: DecisionMode) -> Self {
        Self {
            kind: DecisionType::Allow,
            reason_code: ReasonCode::Ok,
            reason_detail: None,
            mode,
        }
    }

    /// Deny with the given reason.
    pub fn deny(reason_code: ReasonCode, mode: DecisionMode) -> Self {
        Self {
            kind: DecisionType::Deny,
            reason_code,
            reason_detail: None,
            mode,
        }
    }

    /// Hold for review with the given reason.
    pub fn quarantine(reason_code: ReasonCode, mode: DecisionMode) -> Self {
        Self {
            kind: DecisionType::Quarantine,
            reason_code,
            reason_detail: None,
            mode,
        }
    }

    /// Roll back a previously allowed action that failed to execute.
    pub fn rollback(reason_code: ReasonCode, detail: impl Into<String>, mode: DecisionMode) -> Self {
        Self {
            kind: DecisionType::Rollback,
            reason_code,
            reason_detail: Some(detail.into()),
            mode,
        }
    }

    /// Same decision with a human-readable detail attached.
    pub fn with_detail(self, detail: impl Into<String>) -> Self {
        Self {
            reason_detail: Some(detail.into()),
            ..self
        }
    }

    /// Outcome category.
    pub fn kind(&self) -> DecisionType {
        self.kind
    }

    /// Machine-readable reason.
    pub fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    /// Optional human-readable detail.
    pub fn reason_detail(&self) -> Option<&str> {
        self.reason_detail.as_deref()
    }

    /// Mode inherited from the bundle.
    pub fn mode(&self) -> DecisionMode {
        self.mode
    }

    /// `true` for [`DecisionType::Allow`].
    pub fn is_allow(&self) -> bool {
        self.kind == DecisionType::Allow
    }
}
