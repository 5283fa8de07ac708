//! Error types for step execution.

use stampede_core::ExecutorType;
use stampede_plugin::DriverError;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Step is not set in the step context")]
    StepNotSet,

    #[error("Configuration for '{executor}' is not set")]
    ConfigNotSet { executor: &'static str },

    #[error("Unknown executor type: {0}")]
    UnknownExecutorType(ExecutorType),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Failed to serialize step context: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Load generator exited with {status}")]
    ProcessFailed { status: ExitStatus },

    #[error("Step cancelled")]
    Cancelled,

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("{}", join_messages(.0))]
    Joined(Vec<ExecutorError>),
}

impl ExecutorError {
    /// Collapse collected errors: none is success, one is itself.
    pub fn join(mut errors: Vec<ExecutorError>) -> Result<(), ExecutorError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ExecutorError::Joined(errors)),
        }
    }

    /// Whether this error only reports a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            ExecutorError::Cancelled | ExecutorError::Driver(DriverError::Cancelled) => true,
            ExecutorError::Joined(errors) => errors.iter().all(ExecutorError::is_cancelled),
            _ => false,
        }
    }
}

fn join_messages(errors: &[ExecutorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
