//! End-to-end tests for x402test.
//!
//! A real axum server is started on an ephemeral port, backed by the
//! in-memory ledger, and driven by the real client driver.
//!
//! ## Running
//!
//! ```bash
//! cargo test --test e2e
//! ```

mod harness;

#[cfg(test)]
mod payment_flow;

#[cfg(test)]
mod server_behavior;

pub use harness::{HarnessConfig, HarnessError, TestHarness, NETWORK};
