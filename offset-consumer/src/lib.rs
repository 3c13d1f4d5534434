//! Kafka group consumer with explicit offset management.
//!
//! Records are delivered to a [`MessageHandler`] one at a time. Committed
//! positions move by periodic plain commits and by timestamp-driven
//! rollbacks, which rewind committed offsets so recently delivered records
//! are replayed after a restart.
//!
//! ## Error logging
//!
//! Log errors as structured fields with `error = ?e` so the source chain is
//! kept. Fatal faults are returned to the owner of the poll loop, which is the
//! only place allowed to terminate the process.

pub mod codec;
pub mod config;
pub mod consumer;
pub mod diagnostics;
pub mod error;
pub mod kafka;
pub mod metrics_consts;
pub mod reconciler;
pub mod runner;
pub mod scheduler;
pub mod timestamps;

// Re-export commonly used types for convenience
pub use config::{Config, ConsumerSettings};
pub use consumer::{Meta, MessageHandler, OffsetConsumer};
pub use error::{ConsumeError, FatalFault, ReconcileError, SetupError};
