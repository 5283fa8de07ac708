//! Driver plugin contract for the stampede load-testing harness.
//!
//! A driver knows how to talk to one backend. The harness reaches it as a
//! subprocess speaking a JSON-lines RPC protocol over stdin/stdout:
//!
//! ```text
//!  harness                                   plugin process
//! ┌──────────────────┐   handshake line    ┌──────────────────┐
//! │  DriverClient    │◀────────────────────│  serve()         │
//! │  (impl Driver)   │   Request {id,call} │                  │
//! │                  │────────────────────▶│  your Driver     │
//! │                  │  Response {id,reply}│                  │
//! │                  │◀────────────────────│                  │
//! └──────────────────┘                     └──────────────────┘
//! ```
//!
//! Implement [`Driver`] in the plugin binary and hand it to
//! [`serve_stdio`]; the harness side uses [`connect`].

pub mod client;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod server;
pub mod sidecar;
pub mod stream;

// Re-exports for convenience
pub use client::{connect, DriverClient};
pub use driver::Driver;
pub use error::DriverError;
pub use server::{serve, serve_stdio};
pub use sidecar::{LoggingSidecar, Sidecar};
pub use stream::TransactionStream;
