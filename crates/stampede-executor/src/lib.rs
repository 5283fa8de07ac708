//! Step executors for the stampede load-testing harness.
//!
//! Two strategies run a step:
//!
//! - [`NativeExecutor`] drives a driver plugin in-process, pulling
//!   transactions from each unit's stream into bounded worker pools.
//! - [`ProcessExecutor`] hands the serialized step to an external
//!   load-testing binary and supervises the child.
//!
//! [`run_step`] picks the executor named by the step and runs it inside a
//! [`Shutdown`] scope.

pub mod asyncer;
pub mod error;
pub mod executor;
pub mod native;
pub mod process;
pub mod shutdown;

// Re-exports for convenience
pub use asyncer::Asyncer;
pub use error::ExecutorError;
pub use executor::{execute_step, new_executor, run_step, Executor};
pub use native::{DriverConnector, NativeExecutor, PluginConnector};
pub use process::{build_invocation, Invocation, ProcessExecutor};
pub use shutdown::Shutdown;
