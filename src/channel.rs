//! The channel: single entry point for every gated side effect.
//!
//! Per invocation the channel moves through
//! `Validating → Evaluating → {Denied | Dispatching → {Succeeded | RolledBack}}`
//! and writes exactly one audit record on reaching a terminal state.
//! [`Channel::invoke`] never fails: every outcome is an [`InvokeResult`].
//!
//! Each invocation runs on its own task. A caller that stops waiting does not
//! stop the invocation, so an adapter that already started is still bounded
//! by the dispatch deadline and its outcome is still recorded.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::adapters::{AdapterError, Adapters};
use crate::audit::Audit;
use crate::context::Context;
use crate::decision::{Decision, DecisionMode, DecisionType, ReasonCode};
use crate::policy::{Action, PolicyEngine};
use crate::resource::FileRequest;

/// Actor recorded for requests rejected before the subject can be trusted.
pub const SYSTEM_ACTOR: &str = "system";

/// Default adapter deadline.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Invocation states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Checking context completeness.
    Validating,
    /// Asking the policy engine.
    Evaluating,
    /// Terminal: refused before any side effect.
    Denied,
    /// Running the adapter.
    Dispatching,
    /// Terminal: adapter finished.
    Succeeded,
    /// Terminal: adapter failed or timed out.
    RolledBack,
}

/// Structured outcome of [`Channel::invoke`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResult<T = serde_json::Value> {
    /// `true` only when the adapter ran and succeeded.
    pub ok: bool,
    /// Final decision (the rollback decision when execution failed).
    pub decision: Decision,
    /// Adapter output on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Reason code, or `"Invalid context"` for rejected contexts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Audit receipt. `None` when the sink rejected the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdr_hash: Option<String>,
}

impl<T> InvokeResult<T> {
    /// Terminal state this result was produced in.
    pub fn terminal_state(&self) -> InvocationState {
        match self.decision.kind() {
            DecisionType::Rollback => InvocationState::RolledBack,
            DecisionType::Allow if self.ok => InvocationState::Succeeded,
            _ => InvocationState::Denied,
        }
    }
}

impl InvokeResult {
    /// Decode the adapter output into `U`.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error when `data` does not fit `U`.
    pub fn decode<U: DeserializeOwned>(self) -> Result<InvokeResult<U>, serde_json::Error> {
        let data = self.data.map(serde_json::from_value).transpose()?;
        Ok(InvokeResult {
            ok: self.ok,
            decision: self.decision,
            data,
            error: self.error,
            sdr_hash: self.sdr_hash,
        })
    }
}

/// Policy enforcement point tying engine, adapters and audit together.
///
/// Cloning is cheap and clones share the engine, adapters and audit trail.
#[derive(Clone)]
pub struct Channel {
    policy: Arc<PolicyEngine>,
    adapters: Adapters,
    audit: Arc<Audit>,
    dispatch_timeout: Duration,
}

impl Channel {
    /// Channel with the default dispatch deadline.
    pub fn new(policy: PolicyEngine, adapters: Adapters, audit: Audit) -> Self {
        Self {
            policy: Arc::new(policy),
            adapters,
            audit: Arc::new(audit),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    /// Override the adapter deadline.
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Authorize, execute and audit one request.
    pub async fn invoke(&self, action: &str, resource: &str, context: &Context) -> InvokeResult {
        self.invoke_with_payload(action, resource, None, context)
            .await
    }

    /// Like [`Channel::invoke`], carrying bytes for `file.handle` writes and
    /// appends. Other actions ignore the payload.
    ///
    /// The payload is not part of the audit record. Dropping the returned
    /// future does not cancel the invocation.
    pub async fn invoke_with_payload(
        &self,
        action: &str,
        resource: &str,
        payload: Option<Vec<u8>>,
        context: &Context,
    ) -> InvokeResult {
        let channel = self.clone();
        let action = action.to_owned();
        let resource = resource.to_owned();
        let context = context.clone();

        let task = tokio::spawn(async move {
            channel.run(&action, &resource, payload, &context).await
        });
        match task.await {
            Ok(result) => result,
            Err(join) => {
                error!(error = %join, "invocation task failed before completing");
                let decision = Decision::rollback(
                    ReasonCode::ExecutionError,
                    format!("invocation task failed: {join}"),
                    DecisionMode::Normal,
                );
                let error = Some(decision.reason_code().to_string());
                InvokeResult {
                    ok: false,
                    decision,
                    data: None,
                    error,
                    sdr_hash: None,
                }
            }
        }
    }

    /// One invocation, from validation to the audit write.
    async fn run(
        &self,
        action: &str,
        resource: &str,
        payload: Option<Vec<u8>>,
        context: &Context,
    ) -> InvokeResult {
        let trace_id = context.trace();

        debug!(action, trace_id, state = ?InvocationState::Validating, "invocation started");
        if let Err(e) = context.validate() {
            warn!(action, trace_id, error = %e, state = ?InvocationState::Denied, "context rejected");
            let decision = Decision::deny(ReasonCode::ContextInvalid, DecisionMode::Normal);
            let sdr_hash = self.seal(&decision, SYSTEM_ACTOR, resource).await;
            return InvokeResult {
                ok: false,
                decision,
                data: None,
                error: Some("Invalid context".to_owned()),
                sdr_hash,
            };
        }
        let actor = context.subject.as_str();

        debug!(action, actor, trace_id, state = ?InvocationState::Evaluating, "context accepted");
        let decision = self.policy.evaluate(action, resource, context).await;
        if decision.mode() == DecisionMode::Demon {
            warn!(action, actor, trace_id, reason_code = %decision.reason_code(), "demon mode decision");
        }
        if !decision.is_allow() {
            info!(
                action,
                actor,
                trace_id,
                reason_code = %decision.reason_code(),
                state = ?InvocationState::Denied,
                "request denied"
            );
            let sdr_hash = self.seal(&decision, actor, resource).await;
            let error = Some(decision.reason_code().to_string());
            return InvokeResult {
                ok: false,
                decision,
                data: None,
                error,
                sdr_hash,
            };
        }

        debug!(action, actor, trace_id, state = ?InvocationState::Dispatching, "request allowed");
        match self
            .dispatch(action, resource, payload, context, &decision)
            .await
        {
            Ok(data) => {
                info!(action, actor, trace_id, state = ?InvocationState::Succeeded, "request executed");
                let sdr_hash = self.seal(&decision, actor, resource).await;
                InvokeResult {
                    ok: true,
                    decision,
                    data: Some(data),
                    error: None,
                    sdr_hash,
                }
            }
            Err(failure) => {
                warn!(
                    action,
                    actor,
                    trace_id,
                    reason_code = %failure.reason_code(),
                    detail = failure.reason_detail().unwrap_or(""),
                    state = ?InvocationState::RolledBack,
                    "execution failed, rolled back"
                );
                let sdr_hash = self.seal(&failure, actor, resource).await;
                let error = Some(failure.reason_code().to_string());
                InvokeResult {
                    ok: false,
                    decision: failure,
                    data: None,
                    error,
                    sdr_hash,
                }
            }
        }
    }

    /// Run the adapter on its own task under the dispatch deadline.
    ///
    /// Errors, panics and timeouts all come back as a rollback decision
    /// inheriting the allow decision's mode.
    async fn dispatch(
        &self,
        action: &str,
        resource: &str,
        payload: Option<Vec<u8>>,
        context: &Context,
        decision: &Decision,
    ) -> Result<serde_json::Value, Decision> {
        let mode = decision.mode();
        let adapters = self.adapters.clone();
        let action = action.to_owned();
        let resource = resource.to_owned();
        let context = context.clone();
        let decision = decision.clone();

        let mut task = tokio::spawn(async move {
            run_adapter(&adapters, &action, &resource, payload, &context, &decision).await
        });

        match tokio::time::timeout(self.dispatch_timeout, &mut task).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(e))) => Err(Decision::rollback(
                ReasonCode::ExecutionError,
                e.to_string(),
                mode,
            )),
            Ok(Err(join)) => {
                error!(error = %join, "adapter task aborted");
                Err(Decision::rollback(
                    ReasonCode::ExecutionError,
                    format!("adapter task failed: {join}"),
                    mode,
                ))
            }
            Err(_) => {
                task.abort();
                Err(Decision::rollback(
                    ReasonCode::ExecutionTimeout,
                    format!(
                        "adapter exceeded {}ms deadline",
                        self.dispatch_timeout.as_millis()
                    ),
                    mode,
                ))
            }
        }
    }

    /// Write the audit record. Sink failures are logged, never propagated.
    async fn seal(&self, decision: &Decision, actor: &str, resource: &str) -> Option<String> {
        match self.audit.create_signed_sdr(decision, actor, resource).await {
            Ok(hash) => Some(hash),
            Err(e) => {
                error!(actor, reason_code = %decision.reason_code(), error = %e, "audit append failed");
                None
            }
        }
    }
}

/// Route to the adapter for `action`.
async fn run_adapter(
    adapters: &Adapters,
    action: &str,
    resource: &str,
    payload: Option<Vec<u8>>,
    context: &Context,
    decision: &Decision,
) -> Result<serde_json::Value, AdapterError> {
    match Action::parse(action) {
        Some(Action::NetCall) => adapters.network.call(resource, context, decision).await,
        Some(Action::FileHandle) => {
            let request = FileRequest::parse(resource)?.with_payload(payload);
            adapters.file.handle(&request, context, decision).await
        }
        Some(Action::CameraCapture) => adapters.camera.capture(resource, context, decision).await,
        Some(Action::LidarScan) => adapters.lidar.scan(resource, context, decision).await,
        None => Err(AdapterError::UnknownAction(action.to_owned())),
    }
}
