//! txnflow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient pieces shared by every txnflow process.
//!
//! - **Error Handling**: retryable / non-retryable classification and the common error type
//! - **Logging**: one-shot `tracing` subscriber setup driven by the environment
//! - **Metrics**: counters and timers emitted as structured events
//! - **Format**: string normalisation used when mapping source records
//!
//! # Example
//!
//! ```no_run
//! use txnflow_common::logging::{init_logging, LogConfig};
//! use txnflow_common::metrics::{self, Metric};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     metrics::count(Metric::ConfigurationCount, 3, &[]);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod format;
pub mod logging;
pub mod metrics;

// Re-export commonly used types
pub use error::{Classify, ErrorClass, Result, TxnError};
