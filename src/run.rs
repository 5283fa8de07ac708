//! `stampede run`: execute one step from a step context file.

use anyhow::Context;
use clap::Args;
use stampede_core::{DriverConfig, ExecutorType, NativeExecutorConfig, StepContext};
use stampede_executor::{run_step, Shutdown};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Step context file (YAML, or JSON with a .json extension)
    #[arg(long)]
    pub context: PathBuf,

    /// Override the step's executor (native or process)
    #[arg(long)]
    pub executor: Option<ExecutorType>,

    /// Override the driver plugin command
    #[arg(long, env = "STAMPEDE_DRIVER")]
    pub driver: Option<String>,

    /// Override the data generation seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the native executor's per-unit transaction concurrency
    #[arg(long)]
    pub max_parallelism: Option<usize>,

    /// Cancel remaining work after the first failure
    #[arg(long)]
    pub cancel_on_error: bool,
}

/// Read the context file and apply command-line overrides.
pub fn load_context(args: &RunArgs) -> anyhow::Result<StepContext> {
    let mut context = StepContext::from_file(&args.context).with_context(|| {
        format!("Failed to load step context '{}'", args.context.display())
    })?;
    apply_overrides(&mut context, args)?;
    Ok(context)
}

fn apply_overrides(context: &mut StepContext, args: &RunArgs) -> anyhow::Result<()> {
    if let Some(seed) = args.seed {
        context.config.seed = seed;
    }
    if let Some(path) = &args.driver {
        let args = context
            .config
            .driver
            .take()
            .map(|driver| driver.args)
            .unwrap_or_default();
        context.config.driver = Some(DriverConfig {
            path: path.clone(),
            args,
        });
    }
    if args.max_parallelism.is_some() || args.cancel_on_error {
        let native = context
            .config
            .native_executor
            .get_or_insert_with(NativeExecutorConfig::default);
        if let Some(max_parallelism) = args.max_parallelism {
            native.max_parallelism = max_parallelism;
        }
        native.cancel_on_error |= args.cancel_on_error;
    }
    if let Some(executor) = args.executor {
        let step = context
            .step
            .as_mut()
            .context("Step context has no step to run")?;
        step.executor = executor;
    }
    Ok(())
}

/// Run the step until it finishes or a quit signal arrives.
pub async fn run(context: StepContext) -> anyhow::Result<()> {
    let shutdown = Shutdown::new();
    let watcher = shutdown.clone();
    let signals = tokio::spawn(async move {
        if let Err(e) = watcher.wait_signal().await {
            warn!("Failed to listen for quit signals: {e}");
        }
    });

    info!(
        benchmark = %context.benchmark.name,
        step = %context.step_name(),
        seed = context.config.seed,
        "Starting step"
    );
    let step = context.step_name().to_string();
    let result = run_step(context, &shutdown).await;
    signals.abort();
    shutdown.close().await;

    result.with_context(|| format!("Step '{step}' failed"))
}
