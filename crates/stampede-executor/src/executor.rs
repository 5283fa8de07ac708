//! Executor selection and the step entry point.

use crate::error::ExecutorError;
use crate::native::NativeExecutor;
use crate::process::ProcessExecutor;
use crate::shutdown::Shutdown;
use async_trait::async_trait;
use stampede_core::{ExecutorType, StepContext};
use tracing::{error, info};

/// Runs one step.
#[async_trait]
pub trait Executor: Send + Sync {
    fn kind(&self) -> ExecutorType;

    /// Run the step described by `context`. Cleanup that must outlive the
    /// call is registered with `shutdown`, whose token also stops the run.
    async fn run(&self, context: StepContext, shutdown: &Shutdown) -> Result<(), ExecutorError>;
}

/// The default executor of the given type.
pub fn new_executor(kind: ExecutorType) -> Result<Box<dyn Executor>, ExecutorError> {
    match kind {
        ExecutorType::Native => Ok(Box::new(NativeExecutor::new())),
        ExecutorType::Process => Ok(Box::new(ProcessExecutor::new())),
        ExecutorType::Unspecified => Err(ExecutorError::UnknownExecutorType(kind)),
    }
}

/// Run `context` with `executor` inside its own shutdown scope.
///
/// Cleanup registered during the run happens before this returns, whatever
/// the outcome.
pub async fn execute_step(
    executor: &dyn Executor,
    context: StepContext,
    shutdown: &Shutdown,
) -> Result<(), ExecutorError> {
    let step = context.step_name().to_string();
    let scope = shutdown.scope();
    info!(step = %step, executor = %executor.kind(), "Executing step");

    let result = executor.run(context, &scope).await;
    scope.close().await;

    if let Err(e) = &result {
        error!(step = %step, "Step failed: {e}");
    }
    result
}

/// Run `context` with the executor its step asks for.
pub async fn run_step(context: StepContext, shutdown: &Shutdown) -> Result<(), ExecutorError> {
    let kind = context
        .step
        .as_ref()
        .ok_or(ExecutorError::StepNotSet)?
        .executor;
    let executor = new_executor(kind)?;
    execute_step(executor.as_ref(), context, shutdown).await
}
