//! Core types for the stampede load-testing harness.
//!
//! This crate provides the foundational types shared by the generator,
//! the driver plugin contract and the executors:
//!
//! - [`TypedValue`] - One generated value as exchanged with a driver
//! - [`GenerationRule`] - Declarative description of how to generate a value
//! - [`StepContext`] - Everything an executor needs to run one benchmark step
//! - [`Transaction`] / [`DriverQuery`] - Units of work built by a driver
//! - [`RunConfig`] - Run-wide configuration (driver, executors, logging)
//!
//! # Architecture
//!
//! ```text
//! stampede-core (this crate)
//!    │
//!    ├─── stampede-generator  (compiles GenerationRule into value generators)
//!    ├─── stampede-plugin     (driver contract and RPC transport)
//!    └─── stampede-executor   (native and process executors)
//! ```
//!
//! # Example
//!
//! ```rust
//! use stampede_core::StepContext;
//!
//! let context = StepContext::from_yaml(r#"
//! benchmark:
//!   name: tpcb
//! step:
//!   name: load
//!   async: true
//!   executor: native
//!   units:
//!     - name: insert_accounts
//!       count: 10
//!       descriptor:
//!         type: query
//!         name: insert_account
//!         request: "INSERT INTO accounts VALUES (${id})"
//!         params:
//!           - name: id
//!             generation_rule:
//!               type: int64
//!               range: { min: 1, max: 10 }
//!               unique: true
//! config:
//!   driver:
//!     path: ./driver
//!   native_executor:
//!     max_parallelism: 8
//! "#).unwrap();
//!
//! assert_eq!(context.step.unwrap().units.len(), 1);
//! ```

pub mod config;
pub mod rules;
pub mod step;
pub mod values;

// Re-exports for convenience
pub use config::{
    ConfigError, DriverConfig, ExecutorType, LogLevel, LogMode, LoggerConfig,
    NativeExecutorConfig, OtlpExport, ProcessExecutorConfig, RunConfig,
};
pub use rules::{
    CharRange, DateTimeRange, DecimalRange, DistributionKind, DistributionSpec, GenerationRule,
    NumericRange, PlatformTimestamp, RuleKind,
};
pub use step::{
    BenchmarkDescriptor, BuildQueriesContext, ColumnDescriptor, DriverQuery, IndexDescriptor,
    QueryDescriptor, QueryParam, QueryParamDescriptor, StepContext, StepDescriptor,
    StepQueryDescriptor, TableDescriptor, Transaction, TransactionDescriptor, UnitBuildContext,
    UnitDescriptor, UnitKind,
};
pub use values::TypedValue;
