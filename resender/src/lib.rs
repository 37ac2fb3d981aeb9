//! A scheduler for recurring dispatches.
//!
//! Each recipient owns at most one dispatch chain. Starting a job performs one dispatch
//! immediately, reports its outcome to the caller, and then repeats the dispatch every
//! interval until the job is stopped or replaced. The next attempt is only armed once the
//! previous one has finished, so attempts for a single recipient never overlap.
//!
//! # Example
//!
//! ```
//! # use resender::prelude::*;
//! # use chrono::TimeDelta;
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! use resender::testing::RecordingDispatcher;
//!
//! let dispatcher = RecordingDispatcher::new();
//! let scheduler = Scheduler::new(dispatcher.clone());
//!
//! let request = JobRequest::builder()
//!     .for_recipient("a@example.com")
//!     .with_subject("Hi")
//!     .with_content("<p>Hello</p>")
//!     .every(TimeDelta::minutes(5))
//!     .build()
//!     .unwrap();
//!
//! let report = scheduler.start(request).await.unwrap();
//! assert_eq!(report.outcome, StartOutcome::Created);
//! assert_eq!(dispatcher.calls().len(), 1);
//!
//! let key = JobKey::new("a@example.com").unwrap();
//! assert_eq!(scheduler.stop(&key).unwrap(), StopOutcome::Stopped);
//! # });
//! ```

pub mod dispatch;
pub mod job;
pub mod prelude;
pub mod query;
pub mod registry;
pub mod scheduler;
pub mod testing;

use thiserror::Error;

/// Errors returned by the scheduler and its registry.
#[derive(Debug, Error)]
pub enum ResenderError {
    /// A start request failed validation. Nothing was installed or armed.
    #[error("{field} {reason}")]
    InvalidInput {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// The registry lock was poisoned by a panicking holder.
    #[error("Job registry is in a bad state")]
    RegistryUnavailable,
    /// The dispatch chain went away before reporting the outcome of its first attempt.
    ///
    /// This only happens while the runtime is shutting down.
    #[error("Dispatch chain ended before reporting its first attempt")]
    FirstAttemptLost,
    /// A chain task could not be joined during shutdown.
    #[error("Failed to gracefully shut down")]
    GracefulShutdownFailed,
}

impl ResenderError {
    pub(crate) const fn invalid_input(field: &'static str, reason: &'static str) -> Self {
        Self::InvalidInput { field, reason }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ResenderError>;
