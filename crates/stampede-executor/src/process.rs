//! Execution through an external load-testing binary.
//!
//! The step context is serialized to JSON and passed to the binary as a
//! script environment variable:
//!
//! ```text
//! <binary> run <script> -econtext=<json> [--out experimental-opentelemetry] [binary args...]
//! ```
//!
//! Metrics export settings reach the child through its environment only;
//! the harness's own environment is left untouched.

use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use rand::seq::SliceRandom;
use stampede_core::{ExecutorType, ProcessExecutorConfig, StepContext};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{info, warn};

/// How long the child gets to exit after SIGTERM before it is killed
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(1);

const DEFAULT_METRICS_PREFIX: &str = "k6_";
const DEFAULT_GRPC_ENDPOINT: &str = "localhost:4317";
const OTLP_OUTPUT: &str = "experimental-opentelemetry";

/// A fully resolved child command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    grace_period: Duration,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn kind(&self) -> ExecutorType {
        ExecutorType::Process
    }

    async fn run(&self, context: StepContext, shutdown: &Shutdown) -> Result<(), ExecutorError> {
        let step = context.step.as_ref().ok_or(ExecutorError::StepNotSet)?;
        let config = context
            .config
            .process_executor
            .clone()
            .ok_or(ExecutorError::ConfigNotSet { executor: "process" })?;

        let mut payload = context.clone();
        if step.async_ {
            shuffle_work(&mut payload);
        }
        let invocation = build_invocation(&payload, &config)?;
        info!(
            binary = %invocation.program,
            script = %config.script_path,
            step = %step.name,
            "Starting load generator"
        );

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true)
            .spawn()?;

        let token = shutdown.token();
        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    info!(step = %step.name, "Load generator finished");
                    Ok(())
                } else {
                    Err(ExecutorError::ProcessFailed { status })
                }
            }
            _ = token.cancelled() => {
                terminate(&mut child, self.grace_period).await;
                Err(ExecutorError::Cancelled)
            }
        }
    }
}

/// Resolve the child command for `context`.
pub fn build_invocation(
    context: &StepContext,
    config: &ProcessExecutorConfig,
) -> Result<Invocation, ExecutorError> {
    let serialized = context.to_json()?;

    let mut args = vec![
        "run".to_string(),
        config.script_path.clone(),
        format!("-econtext={serialized}"),
    ];
    let mut envs = vec![
        (
            "LOG_LEVEL".to_string(),
            context.config.logger.level.as_str().to_string(),
        ),
        (
            "LOG_MODE".to_string(),
            context.config.logger.mode.as_str().to_string(),
        ),
    ];

    if let Some(otlp) = &config.otlp_export {
        let service_name = format!("{}_{}", context.benchmark.name, context.step_name());
        envs.extend([
            ("K6_OTEL_GRPC_EXPORTER_INSECURE".to_string(), "true".to_string()),
            (
                "K6_OTEL_METRIC_PREFIX".to_string(),
                otlp.metrics_prefix
                    .clone()
                    .unwrap_or_else(|| DEFAULT_METRICS_PREFIX.to_string()),
            ),
            ("K6_OTEL_SERVICE_NAME".to_string(), service_name),
            (
                "K6_OTEL_GRPC_EXPORTER_ENDPOINT".to_string(),
                otlp.grpc_endpoint
                    .clone()
                    .unwrap_or_else(|| DEFAULT_GRPC_ENDPOINT.to_string()),
            ),
        ]);
        args.push("--out".to_string());
        args.push(OTLP_OUTPUT.to_string());
    }
    args.extend(config.binary_args.iter().cloned());

    Ok(Invocation {
        program: config.binary_path.clone(),
        args,
        envs,
    })
}

/// Randomize unit and query order so concurrent virtual users do not all
/// start on the same work.
fn shuffle_work(context: &mut StepContext) {
    if let Some(step) = context.step.as_mut() {
        let mut rng = rand::thread_rng();
        step.units.shuffle(&mut rng);
        step.queries.shuffle(&mut rng);
    }
}

/// SIGTERM, then SIGKILL if the child outlives `grace_period`.
async fn terminate(child: &mut Child, grace_period: Duration) {
    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        return;
    };

    info!(pid, "Stopping load generator");
    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(pid, "Failed to send SIGTERM: {e}");
    }

    if tokio::time::timeout(grace_period, child.wait()).await.is_err() {
        warn!(pid, "Load generator ignored SIGTERM, killing it");
        if let Err(e) = child.kill().await {
            warn!(pid, "Failed to kill load generator: {e}");
        }
    }
}
