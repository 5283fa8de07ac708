//! Sidecars: optional observers of a step's lifecycle.
//!
//! Sidecar hooks are fire-and-forget. A failing hook is logged and never
//! fails the step it observes.

use crate::error::DriverError;
use async_trait::async_trait;
use stampede_core::StepContext;
use tracing::info;

/// Lifecycle observer. Every hook defaults to doing nothing.
#[async_trait]
pub trait Sidecar: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn initialize(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn on_step_start(&self, _context: &StepContext) -> Result<(), DriverError> {
        Ok(())
    }

    async fn on_step_end(&self, _context: &StepContext) -> Result<(), DriverError> {
        Ok(())
    }

    async fn teardown(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Sidecar that logs step boundaries.
#[derive(Debug, Default)]
pub struct LoggingSidecar;

#[async_trait]
impl Sidecar for LoggingSidecar {
    fn name(&self) -> &str {
        "logging"
    }

    async fn on_step_start(&self, context: &StepContext) -> Result<(), DriverError> {
        info!(
            benchmark = %context.benchmark.name,
            step = %context.step_name(),
            "Step started"
        );
        Ok(())
    }

    async fn on_step_end(&self, context: &StepContext) -> Result<(), DriverError> {
        info!(
            benchmark = %context.benchmark.name,
            step = %context.step_name(),
            "Step finished"
        );
        Ok(())
    }
}
