//! BANE CLI entry point.
//!
//! Provides `invoke`, `evaluate`, `verify-log` and `check-bundle`
//! subcommands for running a gated request, dry-running a policy decision,
//! checking an audit log, or validating a policy bundle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use bane::audit::verify_log_file;
use bane::config::{BaneConfig, RuntimePaths};
use bane::context::{Context, DevicePosture, UserRole};
use bane::policy::PolicyEngine;
use bane::{logging, runtime};

/// BANE: capability mediation and audit.
#[derive(Parser)]
#[command(name = "bane", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Authorize, execute and audit a single request.
    Invoke {
        /// Request to run.
        #[command(flatten)]
        request: RequestArgs,
        /// Bytes to write for `file.handle` write/append requests.
        #[arg(long)]
        payload: Option<String>,
    },
    /// Print the policy decision for a request without executing or auditing it.
    Evaluate {
        /// Request to evaluate.
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Verify record hashes (and links, when present) in an audit log.
    VerifyLog {
        /// Log file. Defaults to the configured audit log.
        path: Option<PathBuf>,
    },
    /// Load and validate a policy bundle.
    CheckBundle {
        /// Bundle file. Defaults to the configured bundle.
        path: Option<PathBuf>,
    },
}

/// Action, resource and caller context.
#[derive(Args)]
struct RequestArgs {
    /// Action, e.g. `net.call` or `file.handle`.
    #[arg(long)]
    action: String,
    /// Resource descriptor for the action.
    #[arg(long)]
    resource: String,
    /// Caller identity.
    #[arg(long, default_value = "")]
    subject: String,
    /// Caller role (INSPECTOR, ADMIN, AUDITOR, SYSTEM).
    #[arg(long)]
    role: Option<UserRole>,
    /// Device posture (HEALTHY, DEGRADED, ROOTED, UNKNOWN).
    #[arg(long)]
    posture: Option<DevicePosture>,
    /// Tenant id.
    #[arg(long)]
    client_id: Option<String>,
    /// Inspection id.
    #[arg(long)]
    inspection_id: Option<String>,
    /// Trace id for log correlation.
    #[arg(long)]
    trace_id: Option<String>,
}

impl RequestArgs {
    fn context(&self) -> Context {
        Context {
            subject: self.subject.clone(),
            user_role: self.role,
            device_posture: self.posture,
            inspection_id: self.inspection_id.clone(),
            client_id: self.client_id.clone(),
            trace_id: self.trace_id.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = BaneConfig::load().context("failed to load configuration")?;
    let paths = RuntimePaths::resolve(&config)?;

    match cli.command {
        Command::Invoke { request, payload } => {
            handle_invoke(&config, &paths, &request, payload).await
        }
        Command::Evaluate { request } => {
            logging::init_cli(&config.logging.level);
            handle_evaluate(&paths, &request).await
        }
        Command::VerifyLog { path } => {
            logging::init_cli(&config.logging.level);
            handle_verify_log(path.as_deref().unwrap_or(&paths.audit_log))
        }
        Command::CheckBundle { path } => {
            logging::init_cli(&config.logging.level);
            handle_check_bundle(path.as_deref().unwrap_or(&paths.bundle))
        }
    }
}

/// Run one request through a fully wired channel.
async fn handle_invoke(
    config: &BaneConfig,
    paths: &RuntimePaths,
    request: &RequestArgs,
    payload: Option<String>,
) -> anyhow::Result<ExitCode> {
    let _logging_guard = logging::init_production(&paths.logs_dir, &config.logging.level)?;

    let channel = runtime::build_channel(config, paths)?;
    let result = channel
        .invoke_with_payload(
            &request.action,
            &request.resource,
            payload.map(String::into_bytes),
            &request.context(),
        )
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Print the decision only. No adapter runs and nothing is audited.
async fn handle_evaluate(paths: &RuntimePaths, request: &RequestArgs) -> anyhow::Result<ExitCode> {
    let engine = PolicyEngine::new(runtime::bundle_source(&paths.bundle));

    let context = request.context();
    if let Err(e) = context.validate() {
        warn!(error = %e, "context is incomplete; the channel would reject it");
    }
    let decision = engine
        .evaluate(&request.action, &request.resource, &context)
        .await;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(if decision.is_allow() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Verify hashes, and links from the point the log became chained.
fn handle_verify_log(path: &Path) -> anyhow::Result<ExitCode> {
    match verify_log_file(path) {
        Ok(summary) => {
            println!(
                "{} records verified{}",
                summary.records,
                if summary.is_chained() {
                    " (hash chain intact)"
                } else {
                    ""
                }
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("audit log verification failed for {}: {e}", path.display());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Load and validate a bundle, printing a summary.
fn handle_check_bundle(path: &Path) -> anyhow::Result<ExitCode> {
    match runtime::check_bundle(path) {
        Ok(summary) => {
            println!("{summary}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
