//! In-process execution against a driver plugin.
//!
//! ```text
//!            ┌────────────── unit pool (one slot per unit) ─────────────┐
//!            │                                                          │
//!  unit ──▶ build stream ──▶ drainer task ──▶ handoff ──▶ transaction pool
//!            │               (recv_with_cancel)  (bounded)  (max_parallelism)
//!            └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The drainer runs on its own task so a slow transaction pool never stalls
//! the driver's stream, and the pool never waits on anything but the
//! handoff channel.

use crate::asyncer::Asyncer;
use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use stampede_core::{
    BuildQueriesContext, DriverConfig, DriverQuery, ExecutorType, NativeExecutorConfig,
    StepContext, StepDescriptor, StepQueryDescriptor, Transaction, UnitBuildContext,
};
use stampede_plugin::{Driver, Sidecar, TransactionStream};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Minimum number of concurrent transactions per unit in async mode
const MIN_TRANSACTION_POOL: usize = 2;

/// Opens a connection to the step's driver.
#[async_trait]
pub trait DriverConnector: Send + Sync {
    /// Connect, registering any cleanup with `shutdown`.
    async fn connect(
        &self,
        config: &DriverConfig,
        shutdown: &Shutdown,
    ) -> Result<Arc<dyn Driver>, ExecutorError>;
}

/// Launches the driver as a plugin subprocess.
#[derive(Debug, Default)]
pub struct PluginConnector;

#[async_trait]
impl DriverConnector for PluginConnector {
    async fn connect(
        &self,
        config: &DriverConfig,
        shutdown: &Shutdown,
    ) -> Result<Arc<dyn Driver>, ExecutorError> {
        let client = Arc::new(stampede_plugin::connect(config).await?);
        let process = Arc::clone(&client);
        shutdown.register("driver plugin", move || async move {
            process.kill().await;
        });
        Ok(client)
    }
}

pub struct NativeExecutor {
    connector: Arc<dyn DriverConnector>,
    sidecars: Vec<Arc<dyn Sidecar>>,
}

impl NativeExecutor {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(PluginConnector))
    }

    pub fn with_connector(connector: Arc<dyn DriverConnector>) -> Self {
        Self {
            connector,
            sidecars: Vec::new(),
        }
    }

    /// Add a sidecar notified at step start and end.
    pub fn with_sidecar(mut self, sidecar: Arc<dyn Sidecar>) -> Self {
        self.sidecars.push(sidecar);
        self
    }

    /// Start every sidecar's start hooks in the background.
    fn notify_start(&self, context: &StepContext) -> Vec<JoinHandle<()>> {
        self.sidecars
            .iter()
            .map(|sidecar| {
                let sidecar = Arc::clone(sidecar);
                let context = context.clone();
                tokio::spawn(async move {
                    let result = match sidecar.initialize().await {
                        Ok(()) => sidecar.on_step_start(&context).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        warn!(sidecar = sidecar.name(), "Sidecar start hook failed: {e}");
                    }
                })
            })
            .collect()
    }

    /// Run each sidecar's end hooks once its start hooks are done.
    fn notify_end(&self, context: &StepContext, started: Vec<JoinHandle<()>>) {
        for (sidecar, start) in self.sidecars.iter().zip(started) {
            let sidecar = Arc::clone(sidecar);
            let context = context.clone();
            tokio::spawn(async move {
                if let Err(e) = start.await {
                    warn!(sidecar = sidecar.name(), "Sidecar start hook panicked: {e}");
                }
                if let Err(e) = sidecar.on_step_end(&context).await {
                    warn!(sidecar = sidecar.name(), "Sidecar end hook failed: {e}");
                }
                if let Err(e) = sidecar.teardown().await {
                    warn!(sidecar = sidecar.name(), "Sidecar teardown failed: {e}");
                }
            });
        }
    }
}

impl Default for NativeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for NativeExecutor {
    fn kind(&self) -> ExecutorType {
        ExecutorType::Native
    }

    async fn run(&self, context: StepContext, shutdown: &Shutdown) -> Result<(), ExecutorError> {
        let step = context.step.clone().ok_or(ExecutorError::StepNotSet)?;
        let settings = context
            .config
            .native_executor
            .clone()
            .ok_or(ExecutorError::ConfigNotSet { executor: "native" })?;
        let driver_config = context
            .config
            .driver
            .clone()
            .ok_or(ExecutorError::ConfigNotSet { executor: "driver" })?;

        info!(
            benchmark = %context.benchmark.name,
            step = %step.name,
            units = step.units.len(),
            queries = step.queries.len(),
            "Running step natively"
        );

        let driver = self.connector.connect(&driver_config, shutdown).await?;
        let started = self.notify_start(&context);

        if let Err(e) = driver.initialize(&context).await {
            self.notify_end(&context, started);
            return Err(e.into());
        }

        let run = Run {
            driver: Arc::clone(&driver),
            context: context.clone(),
            settings,
            token: shutdown.token(),
        };
        let result = if step.is_legacy() {
            run.queries(&step).await
        } else {
            run.units(&step).await
        };

        let teardown = driver.teardown().await;
        self.notify_end(&context, started);

        match (result, teardown) {
            (Err(e), Err(teardown_err)) => {
                warn!("Driver teardown failed after step error: {teardown_err}");
                Err(ExecutorError::Joined(vec![e, teardown_err.into()]))
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), teardown) => {
                teardown?;
                info!(step = %step.name, "Step completed");
                Ok(())
            }
        }
    }
}

/// Per-unit knobs shared by the unit tasks.
#[derive(Debug, Clone, Copy)]
struct UnitOptions {
    concurrent: bool,
    cancel_on_error: bool,
    pool_size: usize,
    handoff_capacity: usize,
}

struct Run {
    driver: Arc<dyn Driver>,
    context: StepContext,
    settings: NativeExecutorConfig,
    token: CancellationToken,
}

impl Run {
    async fn units(&self, step: &StepDescriptor) -> Result<(), ExecutorError> {
        let options = UnitOptions {
            concurrent: step.async_,
            cancel_on_error: self.settings.cancel_on_error,
            pool_size: self.settings.max_parallelism.max(MIN_TRANSACTION_POOL),
            handoff_capacity: self.context.config.handoff_capacity.max(1),
        };

        let mut units = Asyncer::new(
            step.async_,
            step.units.len(),
            self.settings.cancel_on_error,
            &self.token,
        );
        for unit in &step.units {
            let driver = Arc::clone(&self.driver);
            let build = UnitBuildContext {
                context: self.context.clone(),
                unit: unit.clone(),
            };
            units
                .go(move |token| run_unit(driver, build, options, token))
                .await;
        }
        units.wait().await
    }

    /// Steps without units: each query descriptor is built into a batch of
    /// queries and run through its own pool.
    async fn queries(&self, step: &StepDescriptor) -> Result<(), ExecutorError> {
        let concurrent = step.async_;
        let cancel_on_error = self.settings.cancel_on_error;

        let mut batches = Asyncer::new(concurrent, step.queries.len(), cancel_on_error, &self.token);
        for query in &step.queries {
            let driver = Arc::clone(&self.driver);
            let build = BuildQueriesContext {
                context: self.context.clone(),
                query: query.clone(),
            };
            batches
                .go(move |token| run_query_batch(driver, build, concurrent, cancel_on_error, token))
                .await;
        }
        batches.wait().await
    }
}

async fn run_unit(
    driver: Arc<dyn Driver>,
    build: UnitBuildContext,
    options: UnitOptions,
    token: CancellationToken,
) -> Result<(), ExecutorError> {
    let unit_name = build.unit.name.clone();
    debug!(unit = %unit_name, count = build.unit.count, "Building unit");

    let stream =
        until_cancelled(&token, driver.build_transactions_from_unit_stream(&build)).await??;

    let (handoff, mut queue) = mpsc::channel::<Transaction>(options.handoff_capacity);
    let drain_token = token.child_token();
    let drainer = tokio::spawn(drain(stream, handoff, drain_token.clone()));

    let mut pool = Asyncer::new(
        options.concurrent,
        options.pool_size,
        options.cancel_on_error,
        &token,
    );
    let pool_token = pool.token().clone();
    let mut submitted = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = pool_token.cancelled() => None,
            next = queue.recv() => next,
        };
        let Some(transaction) = next else {
            break;
        };
        submitted += 1;
        let driver = Arc::clone(&driver);
        pool.go(move |token| run_transaction(driver, transaction, token))
            .await;
    }

    // Stop the drainer if the pool gave up before the stream ended
    drop(queue);
    drain_token.cancel();

    let pool_result = pool.wait().await;
    let drain_result = drainer
        .await
        .unwrap_or_else(|e| Err(ExecutorError::TaskPanicked(e.to_string())));

    debug!(unit = %unit_name, submitted, "Unit finished");
    match (pool_result, drain_result) {
        (Err(e), _) => Err(e),
        // Our own stop request, the stream had nothing left to hand over
        (Ok(()), Err(e)) if e.is_cancelled() && !token.is_cancelled() => Ok(()),
        (Ok(()), drained) => drained,
    }
}

/// Move transactions from the driver's stream into the handoff channel
/// until the stream ends or the consumer goes away.
async fn drain(
    mut stream: TransactionStream,
    handoff: mpsc::Sender<Transaction>,
    token: CancellationToken,
) -> Result<(), ExecutorError> {
    while let Some(transaction) = stream.recv_with_cancel(&token).await? {
        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ExecutorError::Cancelled),
            sent = handoff.send(transaction) => sent,
        };
        if sent.is_err() {
            break;
        }
    }
    Ok(())
}

async fn run_transaction(
    driver: Arc<dyn Driver>,
    transaction: Transaction,
    token: CancellationToken,
) -> Result<(), ExecutorError> {
    until_cancelled(&token, driver.run_transaction(&transaction)).await??;
    Ok(())
}

async fn run_query_batch(
    driver: Arc<dyn Driver>,
    build: BuildQueriesContext,
    concurrent: bool,
    cancel_on_error: bool,
    token: CancellationToken,
) -> Result<(), ExecutorError> {
    let pool_size = expected_pool_size(&build.query);
    let queries = until_cancelled(&token, driver.build_queries(&build)).await??;
    debug!(query = build.query.name(), built = queries.len(), "Running query batch");

    let mut pool = Asyncer::new(concurrent, pool_size, cancel_on_error, &token);
    for query in queries {
        let driver = Arc::clone(&driver);
        pool.go(move |token| run_query(driver, query, token)).await;
    }
    pool.wait().await
}

async fn run_query(
    driver: Arc<dyn Driver>,
    query: DriverQuery,
    token: CancellationToken,
) -> Result<(), ExecutorError> {
    until_cancelled(&token, driver.run_query(&query)).await??;
    Ok(())
}

/// Every built query of a batch may run at once.
fn expected_pool_size(query: &StepQueryDescriptor) -> usize {
    query.expected_query_count().max(1)
}

async fn until_cancelled<F: Future>(
    token: &CancellationToken,
    future: F,
) -> Result<F::Output, ExecutorError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ExecutorError::Cancelled),
        output = future => Ok(output),
    }
}
