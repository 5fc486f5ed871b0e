//! Relay daemon: tokio job runtime + axum webhook listener.

mod error;
pub mod http;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use runtime::{execute, run, start_blocking, JobOutcome, Runtime, Services};
pub use scheduler::{QueuedJob, TokioScheduler};
