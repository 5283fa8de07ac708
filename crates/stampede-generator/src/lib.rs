//! Value generation for the stampede load-testing harness.
//!
//! This crate compiles declarative [`GenerationRule`](stampede_core::GenerationRule)s
//! into [`ValueGenerator`]s producing one [`TypedValue`](stampede_core::TypedValue)
//! per call. All randomness comes from seeded ChaCha streams, so the same
//! seed always yields the same values.
//!
//! # Architecture
//!
//! ```text
//! GenerationRule
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │      compile()      │
//! │                     │
//! │  constant?  ────────┼──▶ ConstantGenerator
//! │  Distribution<D>    │
//! │   + transform D→V   │
//! │  null quota         │
//! └──────────┬──────────┘
//!            │
//!            ▼
//!   Box<dyn ValueGenerator>
//! ```
//!
//! # Example
//!
//! ```rust
//! use stampede_core::GenerationRule;
//! use stampede_generator::compile;
//!
//! let rule = GenerationRule::from_yaml(r#"
//! type: int32
//! range: { min: 1, max: 6 }
//! distribution: { kind: normal }
//! "#).unwrap();
//!
//! let mut dice = compile(42, 100, &rule).unwrap();
//! let value = dice.next_value().unwrap();
//! assert!((1..=6).contains(&value.as_i64().unwrap()));
//! ```

pub mod compile;
pub mod distribution;
pub mod error;
pub mod query;
pub mod randstr;
pub mod uuid_v4;
pub mod value;

// Re-exports for convenience
pub use compile::{compile, compile_named, Generatable};
pub use distribution::{
    new_distribution, Distribution, NormalDistribution, Numeric, UniformDistribution,
    UniqueDistribution, ZipfDistribution,
};
pub use error::GenerateError;
pub use query::{derive_seed, QueryBuilder, TransactionBuilder};
pub use randstr::{CharTape, StringGenerator, Tape};
pub use uuid_v4::UuidGenerator;
pub use value::{ConstantGenerator, NullQuota, ValueGenerator};
