//! Stampede
//!
//! A load-testing harness. A benchmark is split into steps; each step names
//! units of work whose queries carry generation rules for their parameters.
//!
//! # Crates
//!
//! - `stampede_core` - descriptors, generation rules, typed values, configuration
//! - `stampede_generator` - seeded value generators compiled from rules
//! - `stampede_plugin` - the driver contract and its subprocess RPC protocol
//! - `stampede_executor` - native and process step executors
//!
//! # CLI Usage
//!
//! ```bash
//! # Run a step through its driver plugin
//! stampede run --context steps/load.yaml
//!
//! # Override the executor and concurrency
//! stampede run --context steps/load.yaml --executor native --max-parallelism 32 --cancel-on-error
//!
//! # Preview values produced by a rule file
//! stampede generate --rule rules/user_id.yaml --seed 42 --count 5
//! ```

pub mod generate;
pub mod logging;
pub mod run;

pub use generate::GenerateArgs;
pub use run::RunArgs;
